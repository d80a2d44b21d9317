use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::error_response;
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

/// Id of the user a request was authenticated as.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Get the auth token from the request (header, cookie or query)
    let token = get_auth_token(&req);

    // 2. Validate it
    let user_id = match state.authorizer.authenticate(token.as_deref()) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("Request authentication failed: {}", e);
            return reject(e);
        }
    };
    debug!("User token validated successfully: user={}", user_id);

    // 3. Hand the user id to downstream handlers
    req.extensions_mut().insert(AuthUser(user_id));
    next.run(req).await
}

fn reject(err: AuthError) -> Response {
    error_response(err.status(), err.to_string()).into_response()
}
