use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::typed_header::TypedHeaderRejection;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use dreamvault_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Validates the bearer JWT and stores its claims in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Missing and non-Bearer headers both land here.
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|e| {
        debug!("Rejected authorization header: {}", e);
        ApiError::Unauthorized
    })?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
