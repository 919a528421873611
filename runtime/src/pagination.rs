//! Keyset paginator for registration listings.

use seatline_core::cursor::CursorCodec;
use seatline_core::error::Result;
use seatline_core::page::{DEFAULT_LIMIT, MAX_LIMIT, Page, PageRequest, assemble, clamp_limit};
use seatline_core::store::{KeysetWindow, RegistrationFilter, RegistrationQuery};
use seatline_core::types::RegistrationRecord;
use std::sync::Arc;

/// Builds pages of registrations ordered `(registered_at DESC, id DESC)`.
///
/// Raw offsets are never accepted; callers resume with the cursors of the
/// previous page.
pub struct KeysetPaginator<Q> {
    query: Arc<Q>,
    codec: CursorCodec,
    default_limit: u32,
    max_limit: u32,
}

impl<Q> Clone for KeysetPaginator<Q> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
            codec: self.codec.clone(),
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}

impl<Q: RegistrationQuery> KeysetPaginator<Q> {
    /// Create a paginator with the default limits (20, at most 100).
    #[must_use]
    pub const fn new(query: Arc<Q>, codec: CursorCodec) -> Self {
        Self {
            query,
            codec,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }

    /// Override the page size limits.
    #[must_use]
    pub const fn with_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    /// Fetch one page.
    ///
    /// The total is counted by a separate query and can drift from the page
    /// under concurrent writes.
    ///
    /// # Errors
    ///
    /// - `InvalidCursor` if the cursor does not decode
    /// - `Internal` on store failure
    #[tracing::instrument(skip(self, request), fields(instance = %filter.instance_code, direction = ?request.direction))]
    pub async fn page(
        &self,
        filter: &RegistrationFilter,
        request: &PageRequest,
    ) -> Result<Page<RegistrationRecord>> {
        let limit = clamp_limit(request.limit, self.default_limit, self.max_limit);
        let after = request
            .cursor
            .as_deref()
            .map(|cursor| self.codec.decode(cursor))
            .transpose()?;

        let window = KeysetWindow {
            after,
            direction: request.direction,
            fetch: limit.saturating_add(1),
        };
        let (rows, total) = tokio::try_join!(
            self.query.fetch_window(filter, &window),
            self.query.count(filter)
        )?;
        tracing::debug!(rows = rows.len(), total, "Page fetched");

        Ok(assemble(
            rows,
            limit,
            request.direction,
            after,
            total,
            &self.codec,
            RegistrationRecord::sort_key,
        ))
    }
}
