//! Contact form endpoint
//!
//! - POST /api/contact - Send a message to the site owners (5 per IP per 10 minutes)

use axum::{extract::State, routing::post, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, ClientIp, ValidatedJson};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::ContactInput;

const CONTACT_RETRY_SECS: u64 = 10 * 60;

#[derive(Debug, Serialize)]
pub struct ContactReceived {
    pub id: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/contact", post(submit_contact))
}

/// POST /api/contact - Send a message
async fn submit_contact(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(input): ValidatedJson<ContactInput>,
) -> ApiResult<ContactReceived> {
    if let Some(ip) = ip {
        if !state.contact_limiter.check(ip).await {
            tracing::warn!(%ip, "Contact form rate limit exceeded");
            return Err(ApiError::rate_limited(
                "You have sent several messages already. Please try again later.",
                CONTACT_RETRY_SECS,
            ));
        }
    }

    let contact = state.contact_service.submit(input).await?;
    Ok(ApiResponse::created(ContactReceived { id: contact.id }))
}
