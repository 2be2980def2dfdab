use axum::{
    extract::{FromRef, State},
    routing::post,
    Form, Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{TokenRequest, TokenResponse},
        jwt::JwtKeys,
        password,
    },
    error::ApiError,
    state::AppState,
    users::repo::UserStore,
};

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/auth/token", post(token))
}

/// Form-encoded credential exchange. Unknown usernames and wrong passwords
/// are indistinguishable in both status and timing.
#[instrument(skip(state, payload))]
pub async fn token(
    State(state): State<AppState>,
    Form(payload): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = match state.store.find_by_username(&payload.username).await? {
        Some(u) => u,
        None => {
            password::dummy_verify(&payload.password);
            warn!(username = %payload.username, "token request for unknown username");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let ok = password::verify_password(&payload.password, &user.password_hash)
        .map_err(ApiError::Internal)?;
    if !ok {
        warn!(user_id = user.id, "token request with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys
        .sign(user.id, &user.username)
        .map_err(ApiError::Internal)?;

    info!(user_id = user.id, username = %user.username, "token issued");
    Ok(Json(TokenResponse::bearer(token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::memory_state;
    use crate::users::repo::NewUser;

    async fn seed_alice(state: &AppState) -> i64 {
        let hash = password::hash_password("p").unwrap();
        state
            .store
            .create(NewUser {
                username: "alice".into(),
                email: "a@x.com".into(),
                password_hash: hash,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn correct_credentials_issue_token_with_username() {
        let state = memory_state().await;
        let alice_id = seed_alice(&state).await;

        let response = token(
            State(state.clone()),
            Form(TokenRequest {
                username: "alice".into(),
                password: "p".into(),
            }),
        )
        .await
        .expect("token issued");

        assert_eq!(response.token_type, "bearer");
        let keys = JwtKeys::from_ref(&state);
        let claims = keys.verify(&response.access_token).expect("valid jwt");
        assert_eq!(claims.sub, alice_id);
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let state = memory_state().await;
        seed_alice(&state).await;

        let err = token(
            State(state),
            Form(TokenRequest {
                username: "alice".into(),
                password: "nope".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_username_is_invalid_credentials_not_not_found() {
        let state = memory_state().await;

        let err = token(
            State(state),
            Form(TokenRequest {
                username: "ghost".into(),
                password: "p".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }
}
