use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use tribute_core::policy::AuthUser;
use tribute_types::api::Claims;

use crate::error::ApiError;

/// Claims wrapper for routes that tolerate anonymous callers.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

pub fn auth_user(claims: &Claims) -> AuthUser {
    AuthUser {
        id: claims.sub,
        role: claims.role,
    }
}

fn jwt_secret() -> String {
    std::env::var("TRIBUTE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into())
}

fn decode_bearer(req: &Request) -> Result<Option<Claims>, ApiError> {
    let Some(auth_header) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header."))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthorized("Invalid or expired token."))?;

    Ok(Some(token_data.claims))
}

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = decode_bearer(&req)?
        .ok_or_else(|| ApiError::unauthorized("Action is not allowed for anonymous!"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Anonymous-tolerant variant: a missing header yields an anonymous caller,
/// but a present-and-invalid token is still rejected.
pub async fn optional_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = decode_bearer(&req)?;
    req.extensions_mut().insert(MaybeUser(claims));
    Ok(next.run(req).await)
}
