//! Keyset page assembly.
//!
//! The store fetches `limit + 1` rows past the cursor. [`assemble`] trims the
//! look-ahead row, restores `(timestamp DESC, id DESC)` order for backward
//! windows, and issues the boundary cursors.

use crate::cursor::{CursorCodec, SortKey};
use crate::types::RegistrationId;
use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 20;

/// Largest page a caller may ask for.
pub const MAX_LIMIT: u32 = 100;

/// Traversal direction relative to the cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Older rows (further down the listing)
    #[default]
    Next,
    /// Newer rows (back up the listing)
    Prev,
}

/// Caller's page request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Cursor from a previous page, if any
    pub cursor: Option<String>,
    /// Which way to walk from the cursor
    pub direction: Direction,
    /// Requested page size; clamped by the paginator
    pub limit: Option<u32>,
}

/// Boundary cursors and total count of a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Cursor for the following (older) page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Cursor for the preceding (newer) page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    /// Rows matching the filter; approximate under concurrent writes
    pub total: u64,
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows in `(timestamp DESC, id DESC)` order
    pub items: Vec<T>,
    /// Navigation
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Convert the items, keeping the pagination.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Clamp a requested limit into `[1, max]`, falling back to `default`.
#[must_use]
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    let max = max.max(1);
    requested.unwrap_or(default).clamp(1, max)
}

/// Build a page from rows fetched past the cursor.
///
/// `rows` must be in fetch order: descending for [`Direction::Next`], ascending
/// (nearest the cursor first) for [`Direction::Prev`], and hold at most
/// `limit + 1` entries. `after` is the decoded request cursor.
///
/// A page requested with a cursor always links back, even when it came back
/// empty: the back-link then starts right past `after`, so the row the cursor
/// was taken from is included again.
pub fn assemble<T>(
    mut rows: Vec<T>,
    limit: u32,
    direction: Direction,
    after: Option<SortKey>,
    total: u64,
    codec: &CursorCodec,
    key: impl Fn(&T) -> SortKey,
) -> Page<T> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    if direction == Direction::Prev {
        rows.reverse();
    }

    let first = rows.first().map(|row| codec.encode(&key(row)));
    let last = rows.last().map(|row| codec.encode(&key(row)));

    let back_link = |edge: Option<String>, step: i64| {
        after.map(|after| {
            edge.unwrap_or_else(|| {
                let id = RegistrationId::new(after.id.get().saturating_add(step));
                codec.encode(&SortKey::new(after.timestamp, id))
            })
        })
    };

    let (next_cursor, prev_cursor) = match direction {
        Direction::Next => (last.filter(|_| has_more), back_link(first, -1)),
        Direction::Prev => (back_link(last, 1), first.filter(|_| has_more)),
    };

    Page {
        items: rows,
        pagination: Pagination {
            next_cursor,
            prev_cursor,
            total,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RegistrationId;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    /// 25 keys, newest first.
    fn rows() -> Vec<SortKey> {
        (1..=25)
            .rev()
            .map(|i| SortKey::new(base() + Duration::minutes(i), RegistrationId::new(i)))
            .collect()
    }

    /// Mimics the store: rows strictly past the cursor, `fetch` of them.
    fn fetch(all: &[SortKey], after: Option<SortKey>, direction: Direction, fetch: usize) -> Vec<SortKey> {
        match direction {
            Direction::Next => all
                .iter()
                .filter(|k| after.is_none_or(|a| **k < a))
                .take(fetch)
                .copied()
                .collect(),
            Direction::Prev => all
                .iter()
                .rev()
                .filter(|k| after.is_none_or(|a| **k > a))
                .take(fetch)
                .copied()
                .collect(),
        }
    }

    fn page(all: &[SortKey], cursor: Option<&str>, direction: Direction, limit: u32) -> Page<SortKey> {
        let codec = CursorCodec::new("s");
        let after = cursor.map(|c| codec.decode(c).unwrap());
        let fetched = fetch(all, after, direction, limit as usize + 1);
        assemble(fetched, limit, direction, after, all.len() as u64, &codec, |k| *k)
    }

    #[test]
    fn twenty_five_rows_in_pages_of_ten() {
        let all = rows();

        let first = page(&all, None, Direction::Next, 10);
        assert_eq!(first.items.len(), 10);
        assert!(first.pagination.prev_cursor.is_none());
        assert_eq!(first.pagination.total, 25);

        let second = page(&all, first.pagination.next_cursor.as_deref(), Direction::Next, 10);
        assert_eq!(second.items.len(), 10);
        assert!(second.pagination.prev_cursor.is_some());

        let third = page(&all, second.pagination.next_cursor.as_deref(), Direction::Next, 10);
        assert_eq!(third.items.len(), 5);
        assert!(third.pagination.next_cursor.is_none());

        let seen: Vec<SortKey> = first
            .items
            .into_iter()
            .chain(second.items)
            .chain(third.items)
            .collect();
        assert_eq!(seen, all);
    }

    #[test]
    fn backward_page_returns_the_preceding_rows_in_descending_order() {
        let all = rows();
        let first = page(&all, None, Direction::Next, 10);
        let second = page(&all, first.pagination.next_cursor.as_deref(), Direction::Next, 10);

        let back = page(&all, second.pagination.prev_cursor.as_deref(), Direction::Prev, 10);
        assert_eq!(back.items, first.items);
        assert!(back.pagination.prev_cursor.is_none());
        assert!(back.pagination.next_cursor.is_some());
    }

    #[test]
    fn backward_page_reports_more_when_rows_remain() {
        let all = rows();
        let codec = CursorCodec::new("s");
        let cursor = codec.encode(&all[20]);
        let back = page(&all, Some(&cursor), Direction::Prev, 5);
        assert_eq!(back.items, all[15..20].to_vec());
        assert!(back.pagination.prev_cursor.is_some());
    }

    #[test]
    fn empty_result_has_no_cursors() {
        let page = page(&[], None, Direction::Next, 10);
        assert!(page.items.is_empty());
        assert!(page.pagination.next_cursor.is_none());
        assert!(page.pagination.prev_cursor.is_none());
    }

    #[test]
    fn empty_page_after_a_cursor_links_back_to_the_cursor_row() {
        let all = rows();
        let codec = CursorCodec::new("s");
        let first = page(&all, None, Direction::Next, 10);

        // Everything past the first page disappeared before the next request.
        let remaining = all[..10].to_vec();
        let empty = page(&remaining, first.pagination.next_cursor.as_deref(), Direction::Next, 10);
        assert!(empty.items.is_empty());
        assert!(empty.pagination.next_cursor.is_none());

        let back_cursor = empty.pagination.prev_cursor.unwrap();
        codec.decode(&back_cursor).unwrap();
        let back = page(&remaining, Some(&back_cursor), Direction::Prev, 10);
        assert_eq!(back.items, first.items);
    }

    #[test]
    fn empty_backward_page_links_forward_to_the_cursor_row() {
        let all = rows();
        let codec = CursorCodec::new("s");
        let cursor = codec.encode(&all[0]);

        let empty = page(&all, Some(&cursor), Direction::Prev, 10);
        assert!(empty.items.is_empty());
        assert!(empty.pagination.prev_cursor.is_none());

        let forward = page(&all, empty.pagination.next_cursor.as_deref(), Direction::Next, 10);
        assert_eq!(forward.items, all[..10].to_vec());
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None, DEFAULT_LIMIT, MAX_LIMIT), 20);
        assert_eq!(clamp_limit(Some(0), DEFAULT_LIMIT, MAX_LIMIT), 1);
        assert_eq!(clamp_limit(Some(500), DEFAULT_LIMIT, MAX_LIMIT), 100);
    }

    #[test]
    fn pagination_serializes_camel_case_without_absent_cursors() {
        let json = serde_json::to_value(Pagination {
            next_cursor: Some("abc".to_string()),
            prev_cursor: None,
            total: 3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"nextCursor": "abc", "total": 3}));
    }
}
