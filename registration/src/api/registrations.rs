//! Registration endpoints.
//!
//! - POST /api/instances/:code/registrations - admit a registration
//! - GET /api/instances/:code/registrations - list registrations (keyset pages)

use super::RegistrationView;
use crate::error::AppError;
use crate::server::{AppState, RegistrationBackend};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use seatline_core::error::RegistrationError;
use seatline_core::page::{Direction, Page, PageRequest};
use seatline_core::store::{AdmissionStore, RegistrationFilter};
use seatline_core::types::{FlowKind, InstanceCode, RegistrationStatus};
use seatline_runtime::{Admission, AdmissionRequest};
use serde::Deserialize;

/// Header carrying the client's request id.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const MIN_KEY_LEN: usize = 16;
const MAX_KEY_LEN: usize = 128;

// ============================================================================
// Request Types
// ============================================================================

/// Body of an admission request; the instance comes from the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitBody {
    /// Seats requested
    pub quantity: u32,
    /// Registrant identity
    pub registrant: String,
    /// Flow to count against
    #[serde(default)]
    pub flow: Option<FlowKind>,
}

/// Query string of a listing request.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Cursor from a previous page
    pub cursor: Option<String>,
    /// `next` (default) or `prev`
    pub direction: Option<Direction>,
    /// Page size
    pub limit: Option<u32>,
    /// Only this status
    pub status: Option<RegistrationStatus>,
    /// Case-insensitive registrant substring
    pub search: Option<String>,
}

fn idempotency_key(headers: &HeaderMap) -> Result<String, AppError> {
    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .ok_or_else(|| AppError::bad_request("Missing Idempotency-Key header"))?
        .to_str()
        .map_err(|_| AppError::bad_request("Invalid Idempotency-Key header value"))?;

    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&key.len()) {
        return Err(AppError::bad_request(format!(
            "Idempotency-Key must be between {MIN_KEY_LEN} and {MAX_KEY_LEN} characters"
        )));
    }
    Ok(key.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Admit a registration.
///
/// Requires an `Idempotency-Key` header. A repeated key is rejected with
/// `409 DUPLICATE_REQUEST`. A rejected attempt releases its key so the client
/// can retry with the same one; an internal failure keeps it.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/instances/WS-01/registrations \
///   -H 'Idempotency-Key: 6f1c2d4e-9a8b-4c7d-8e6f-5a4b3c2d1e0f' \
///   -H 'Content-Type: application/json' \
///   -d '{"quantity": 2, "registrant": "ada@example.com"}'
/// ```
pub async fn admit<S: RegistrationBackend>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AdmitBody>,
) -> Result<(StatusCode, Json<Admission>), AppError> {
    let key = idempotency_key(&headers)?;
    let scoped_key = format!("{code}:{key}");

    if !state.idempotency.mark_seen(&scoped_key).await? {
        return Err(RegistrationError::DuplicateRequest.into());
    }

    let request = AdmissionRequest {
        instance_code: InstanceCode::new(code),
        quantity: body.quantity,
        registrant: body.registrant,
        flow: body.flow,
    };

    match state.admission.admit(request, state.admission_deadline).await {
        Ok(admission) => Ok((StatusCode::CREATED, Json(admission))),
        // An internal error can come from a commit whose outcome is unknown, so
        // its key stays marked.
        Err(err @ RegistrationError::Internal(_)) => Err(err.into()),
        Err(err) => {
            if let Err(forget_err) = state.idempotency.forget(&scoped_key).await {
                tracing::warn!(key = %scoped_key, error = %forget_err, "Failed to release idempotency key");
            }
            Err(err.into())
        }
    }
}

/// List registrations of an instance, newest first.
///
/// ```bash
/// curl 'http://localhost:8080/api/instances/WS-01/registrations?limit=10&status=booked&search=ada'
/// ```
pub async fn list<S: RegistrationBackend>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<RegistrationView>>, AppError> {
    let instance_code = InstanceCode::new(code);
    if state.store.load_instance(&instance_code).await?.is_none() {
        return Err(RegistrationError::instance_not_found(&instance_code).into());
    }

    let filter = RegistrationFilter {
        instance_code,
        status: params.status,
        search: params.search.filter(|s| !s.trim().is_empty()),
    };
    let request = PageRequest {
        cursor: params.cursor.filter(|c| !c.is_empty()),
        direction: params.direction.unwrap_or_default(),
        limit: params.limit,
    };

    let page = state.paginator.page(&filter, &request).await?;
    Ok(Json(page.map(RegistrationView::from)))
}
