//! Bearer authentication for the scheduled regeneration endpoint

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::app::AppContext;

/// Token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Compare in constant time so response timing does not leak the secret
pub fn token_matches(token: &str, secret: &str) -> bool {
    token.as_bytes().ct_eq(secret.as_bytes()).into()
}

/// Reject requests without the configured cron secret.
///
/// An unset secret is a server misconfiguration and answers 500 rather than
/// letting every request through.
pub async fn cron_auth_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = ctx.config.require_cron_secret()?;

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(ApiError::unauthorized)?;

    if !token_matches(token, secret) {
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(request).await)
}
