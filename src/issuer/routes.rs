use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use time::OffsetDateTime;

use super::config::IssuerConfig;
use super::cookies;
use super::error::AuthError;
use super::extractor::AuthUser;
use super::state::AuthState;
use super::traits::{IdentityVerifier, UserStore};
use super::types::{LoginRequest, LoginUpdate};
use crate::secret;
use crate::types::{MessageBody, SessionResponse, UserProfile};

/// Create the session issuer router.
///
/// Mounts `POST {auth_path}/google`, `POST {auth_path}/refresh`,
/// `POST {auth_path}/logout` and `GET {auth_path}/me`.
pub fn auth_routes<V, S>(config: IssuerConfig, verifier: V, store: S) -> Router
where
    V: IdentityVerifier,
    S: UserStore,
{
    let auth_path = config.settings.auth_path.clone();

    let state = AuthState {
        verifier: Arc::new(verifier),
        store: Arc::new(store),
        signer: config.signer,
        cipher: config.cipher,
        settings: config.settings,
    };

    Router::new()
        .route(&format!("{auth_path}/google"), post(google_login::<V, S>))
        .route(&format!("{auth_path}/refresh"), post(refresh::<V, S>))
        .route(&format!("{auth_path}/logout"), post(logout::<V, S>))
        .route(&format!("{auth_path}/me"), get(me))
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn google_login<V: IdentityVerifier, S: UserStore>(
    State(state): State<AuthState<V, S>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), AuthError> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable login body");
        AuthError::MissingAssertion
    })?;
    let assertion = request.into_assertion().ok_or(AuthError::MissingAssertion)?;

    let identity = state
        .verifier
        .verify(&assertion)
        .await
        .map_err(AuthError::Verification)?;

    let google_grant = identity
        .grant
        .as_deref()
        .map(|grant| state.cipher.seal(grant))
        .transpose()?;

    let refresh_token = secret::generate_refresh_token();

    let record = state
        .store
        .upsert_login(LoginUpdate {
            profile: identity.profile,
            refresh_token_hash: secret::hash_refresh_token(&refresh_token),
            google_grant,
            at: OffsetDateTime::now_utc(),
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "User upsert failed");
            AuthError::Store(e.to_string())
        })?;

    let user_data = record.profile();
    let access_token = state.signer.issue(&user_data)?;

    tracing::info!(
        sub = %user_data.sub,
        grant_stored = record.google_grant.is_some(),
        "Google login successful"
    );

    let cookie = cookies::refresh_cookie(
        &state.settings.refresh_cookie_name,
        &refresh_token,
        state.settings.refresh_ttl_days,
        state.settings.secure_cookies,
    );

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            access_token,
            user_data,
        }),
    ))
}

// ── Refresh ────────────────────────────────────────────────────────

async fn refresh<V: IdentityVerifier, S: UserStore>(
    State(state): State<AuthState<V, S>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), AuthError> {
    let presented = cookies::get_refresh_token(&jar, &state.settings.refresh_cookie_name)
        .ok_or(AuthError::MissingRefreshToken)?;
    let current = secret::hash_refresh_token(&presented);

    let record = state
        .store
        .find_by_refresh_hash(&current)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?
        .ok_or_else(|| {
            tracing::debug!("Refresh token matches no session");
            AuthError::InvalidRefreshToken
        })?;

    let next_token = secret::generate_refresh_token();
    let rotated = state
        .store
        .rotate_refresh_hash(&current, &secret::hash_refresh_token(&next_token))
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;
    if !rotated {
        tracing::warn!(sub = %record.sub, "Refresh token superseded during rotation");
        return Err(AuthError::InvalidRefreshToken);
    }

    let user_data = record.profile();
    let access_token = state.signer.issue(&user_data)?;

    tracing::debug!(sub = %user_data.sub, "Session refreshed");

    let cookie = cookies::refresh_cookie(
        &state.settings.refresh_cookie_name,
        &next_token,
        state.settings.refresh_ttl_days,
        state.settings.secure_cookies,
    );

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            access_token,
            user_data,
        }),
    ))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<V: IdentityVerifier, S: UserStore>(
    State(state): State<AuthState<V, S>>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageBody>) {
    if let Some(token) = cookies::get_refresh_token(&jar, &state.settings.refresh_cookie_name) {
        match state
            .store
            .clear_refresh_hash(&secret::hash_refresh_token(&token))
            .await
        {
            Ok(true) => tracing::info!("Session terminated"),
            Ok(false) => tracing::debug!("Logout with unknown refresh token"),
            Err(e) => tracing::warn!(error = %e, "Refresh token invalidation failed during logout"),
        }
    }

    // Always emitted, even when the request carried no cookie.
    let clear_cookie = cookies::clear_refresh_cookie(&state.settings.refresh_cookie_name);
    (jar.add(clear_cookie), Json(MessageBody::new("user logged out")))
}

// ── Me ─────────────────────────────────────────────────────────────

async fn me(user: AuthUser) -> Json<UserProfile> {
    Json(user.profile)
}
