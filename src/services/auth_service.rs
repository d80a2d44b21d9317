use axum::extract::Query;
use axum::http::{self};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::websocket::handler::RelayQuery;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Option<String> {
    // 1. Try the Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().ok()?;
        return Some(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim().to_string());
    }

    // 2. Try the auth_token cookie
    if let Some(cookie_header) = req.headers().get(http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
            if cookie.name() == "auth_token" {
                return Some(cookie.value().to_string());
            }
        }
    }

    // 3. Fall back to the token query parameter, as used by socket clients
    Query::<RelayQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Verify a user token and extract the user id it was issued for.
pub fn authenticate_token(token: Option<&str>, secret: &str) -> Result<Uuid, AuthError> {
    let token = match token.map(str::trim) {
        None | Some("") => return Err(AuthError::MissingToken),
        Some(token) => token,
    };

    let token_data = validate_jwt(token, secret).map_err(|e| classify_jwt_error(&e))?;
    user_id_from_claims(&token_data.claims).ok_or(AuthError::InvalidToken)
}

/// Separate tokens that are not JWTs at all from tokens that fail verification.
pub fn classify_jwt_error(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::MalformedToken
        }
        _ => AuthError::InvalidToken,
    }
}

// The user id lives in "id", or in "sub" for standard issuers
pub fn user_id_from_claims(claims: &serde_json::Value) -> Option<Uuid> {
    claims
        .get("id")
        .or_else(|| claims.get("sub"))
        .and_then(|v| v.as_str())
        .and_then(|id| Uuid::parse_str(id).ok())
}
