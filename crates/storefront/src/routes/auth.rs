//! Authentication route handlers.
//!
//! Email and password accounts. A successful register or login stores a
//! [`CurrentUser`] in the session; logout removes it but keeps the cart.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{AppJson, RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User, UserProfile};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Registration request. Not `Debug` so the password never reaches a log.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login request.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
#[instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let user = state
        .auth_service()
        .register(&body.name, &body.email, &body.password)
        .await?;

    sign_in(&session, &user).await?;
    tracing::info!(user_id = %user.id, "Account registered");

    Ok((StatusCode::CREATED, Json(UserProfile::new(user, Vec::new()))))
}

/// Sign in with email and password.
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<UserProfile>> {
    let user = match state.auth_service().login(&body.email, &body.password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!("Login failed");
            return Err(e.into());
        }
    };

    sign_in(&session, &user).await?;
    let wishlist = state.users().wishlist(user.id).await?;
    tracing::info!(user_id = %user.id, "Signed in");

    Ok(Json(UserProfile::new(user, wishlist)))
}

/// Sign out. The cart and checkout progress stay in the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<impl IntoResponse> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Json(json!({ "message": "Logged out" })))
}

/// The signed-in user, straight from the session.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<CurrentUser> {
    Json(user)
}

async fn sign_in(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user))
        .await
        .map_err(|e| AppError::Internal(format!("failed to store session: {e}")))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}
