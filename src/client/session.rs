use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{oneshot, watch};
use url::Url;

use super::config::ClientConfig;
use super::error::ClientError;
use crate::types::{MessageBody, SessionResponse, UserProfile};

type RefreshOutcome = Result<String, ClientError>;

/// Session state as seen by the client.
///
/// `Unknown` until the first login or [`restore`](SessionClient::restore);
/// `Unauthenticated` after a failed refresh or logout, until the next login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Authenticated(UserProfile),
    Unauthenticated,
}

/// An API call routed through [`SessionClient::send`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Default)]
struct State {
    access_token: Option<String>,
    /// `Some` while a refresh is in flight, holding the requests waiting on it.
    refresh_waiters: Option<Vec<oneshot::Sender<RefreshOutcome>>>,
    /// Bumped on login, logout and failed refresh. A refresh that started
    /// under an older epoch must not touch the session.
    epoch: u64,
}

/// What a request that got `401` should do next.
enum Refresh {
    /// The token was replaced since the request was sent.
    Ready(String),
    /// The session was cleared since the request was sent.
    Ended,
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// Refresh under the given epoch.
    Lead(u64),
}

struct Shared {
    http: reqwest::Client,
    config: ClientConfig,
    state: Mutex<State>,
    status: watch::Sender<SessionStatus>,
}

/// Client for the Backtime API that owns one user session.
///
/// Cheap to clone; clones share the session. The access token lives only in
/// memory, the refresh token only in the HTTP client's cookie store.
#[derive(Clone)]
pub struct SessionClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.shared.config.base_url.as_str())
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client with its own cookie store.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        let (status, _) = watch::channel(SessionStatus::Unknown);
        Ok(Self {
            shared: Arc::new(Shared {
                http,
                config,
                state: Mutex::default(),
                status,
            }),
        })
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.status.borrow().clone()
    }

    /// Watch session status changes, e.g. to show the login view on
    /// `Unauthenticated`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state().access_token.clone()
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Log in with a Google ID token.
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] with status 401 when Google rejects the credential.
    pub async fn login_with_credential(&self, credential: &str) -> Result<UserProfile, ClientError> {
        self.login(json!({ "credential": credential })).await
    }

    /// Log in with a Google authorization code.
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] with status 401 when the code exchange fails.
    pub async fn login_with_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<UserProfile, ClientError> {
        let mut body = json!({ "code": code });
        if let Some(uri) = redirect_uri {
            body["redirectUri"] = json!(uri);
        }
        self.login(body).await
    }

    async fn login(&self, body: Value) -> Result<UserProfile, ClientError> {
        let url = self.url(&self.shared.config.login_path())?;
        let response = self.shared.http.post(url).json(&body).send().await?;
        let session: SessionResponse = ensure_success(response).await?.json().await?;
        tracing::info!(sub = %session.user_data.sub, "Logged in");
        Ok(self.establish(session))
    }

    fn establish(&self, session: SessionResponse) -> UserProfile {
        let mut state = self.state();
        state.access_token = Some(session.access_token);
        state.epoch += 1;
        self.shared
            .status
            .send_replace(SessionStatus::Authenticated(session.user_data.clone()));
        session.user_data
    }

    /// Re-establish the session from the refresh cookie, e.g. at startup.
    ///
    /// Always asks the server, even when a token is held. Joins a refresh
    /// already in flight. A rejected refresh is not an error: it yields
    /// `Unauthenticated`.
    ///
    /// # Errors
    ///
    /// Only on an invalid base URL.
    pub async fn restore(&self) -> Result<SessionStatus, ClientError> {
        let held = self.access_token();
        match self.fresh_token(held.as_deref()).await {
            Ok(_) => Ok(self.status()),
            Err(ClientError::RefreshFailed(reason)) => {
                tracing::debug!(reason = %reason, "No session to restore");
                Ok(SessionStatus::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// End the session on the server and locally.
    ///
    /// Local state is cleared even when the request fails.
    ///
    /// # Errors
    ///
    /// Returns the logout request's error, after clearing local state.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.post_logout().await;
        self.end_session();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Logout request failed; local session cleared");
        }
        result
    }

    /// Status is published under the state lock so it cannot interleave with
    /// a concurrent refresh.
    fn end_session(&self) {
        let mut state = self.state();
        state.access_token = None;
        state.epoch += 1;
        self.shared.status.send_replace(SessionStatus::Unauthenticated);
    }

    async fn post_logout(&self) -> Result<(), ClientError> {
        let url = self.url(&self.shared.config.logout_path())?;
        let response = self.shared.http.post(url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    // ── Requests ───────────────────────────────────────────────────

    /// Send an API request with the session's bearer token.
    ///
    /// On `401` the session is refreshed (at most one refresh at a time across
    /// all callers) and the request retried once.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RefreshFailed`] if the session could not be refreshed.
    /// - [`ClientError::Unauthorized`] if the retry is rejected as well.
    /// - [`ClientError::Api`] for any other non-success status.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, ClientError> {
        let sent_with = self.access_token();
        let response = self.dispatch(&request, sent_with.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.is_session_endpoint(&request.path)
        {
            return ensure_success(response).await;
        }

        tracing::debug!(path = %request.path, "Request unauthorized, refreshing session");
        let token = self.fresh_token(sent_with.as_deref()).await?;

        let retried = self.dispatch(&request, Some(&token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %request.path, "Request still unauthorized after refresh");
            return Err(ClientError::Unauthorized(error_message(retried).await));
        }
        ensure_success(retried).await
    }

    /// `GET path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send); [`ClientError::Decode`] on an unexpected body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Ok(self.send(ApiRequest::get(path)).await?.json().await?)
    }

    /// `POST path` with a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send); [`ClientError::Encode`] if `body` cannot be
    /// serialized.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Encode(e.to_string()))?;
        Ok(self
            .send(ApiRequest::post(path).with_json(body))
            .await?
            .json()
            .await?)
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.url(&request.path)?;
        let mut builder = self.shared.http.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    // ── Single-flight refresh ──────────────────────────────────────

    /// A token newer than `stale`, refreshing the session if needed.
    async fn fresh_token(&self, stale: Option<&str>) -> RefreshOutcome {
        let step = {
            let mut guard = self.state();
            let state = &mut *guard;
            if let Some(waiters) = state.refresh_waiters.as_mut() {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Refresh::Wait(rx)
            } else {
                match (state.access_token.as_deref(), stale) {
                    (Some(current), Some(stale)) if current != stale => {
                        Refresh::Ready(current.to_string())
                    }
                    (Some(current), None) => Refresh::Ready(current.to_string()),
                    (None, Some(_)) => Refresh::Ended,
                    _ => {
                        state.refresh_waiters = Some(Vec::new());
                        Refresh::Lead(state.epoch)
                    }
                }
            }
        };

        match step {
            Refresh::Ready(token) => Ok(token),
            Refresh::Ended => Err(session_ended()),
            Refresh::Wait(rx) => {
                tracing::debug!("Waiting on in-flight session refresh");
                rx.await
                    .unwrap_or_else(|_| Err(ClientError::RefreshFailed("refresh abandoned".into())))
            }
            Refresh::Lead(epoch) => self.lead_refresh(epoch).await,
        }
    }

    async fn lead_refresh(&self, started: u64) -> RefreshOutcome {
        let leader = LeaderGuard {
            state: &self.shared.state,
            armed: true,
        };
        let outcome = self.request_refresh().await;
        leader.disarm();

        let (waiters, result) = {
            let mut state = self.state();
            let waiters = state.refresh_waiters.take().unwrap_or_default();
            let result = if state.epoch != started {
                tracing::debug!(
                    waiters = waiters.len(),
                    "Session changed during refresh, discarding result"
                );
                Err(session_ended())
            } else {
                match outcome {
                    Ok(session) => {
                        tracing::debug!(
                            sub = %session.user_data.sub,
                            waiters = waiters.len(),
                            "Session refreshed"
                        );
                        state.access_token = Some(session.access_token.clone());
                        self.shared
                            .status
                            .send_replace(SessionStatus::Authenticated(session.user_data));
                        Ok(session.access_token)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, waiters = waiters.len(), "Session refresh failed");
                        state.access_token = None;
                        state.epoch += 1;
                        self.shared.status.send_replace(SessionStatus::Unauthenticated);
                        Err(e)
                    }
                }
            };
            (waiters, result)
        };

        for waiter in waiters {
            // Receiver gone means the waiting request was cancelled.
            let _ = waiter.send(result.clone());
        }
        result
    }

    async fn request_refresh(&self) -> Result<SessionResponse, ClientError> {
        let url = self.url(&self.shared.config.refresh_path())?;
        let response = self
            .shared
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::RefreshFailed(error_message(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.shared.config.base_url.join(path)?)
    }

    /// Endpoints whose `401` is reported as is, never answered by a refresh.
    fn is_session_endpoint(&self, path: &str) -> bool {
        let config = &self.shared.config;
        path == config.refresh_path() || path == config.me_path() || path == config.login_path()
    }
}

/// Clears the in-flight marker if the leading request is dropped mid-refresh,
/// so waiters fail instead of hanging and the next `401` can lead again.
struct LeaderGuard<'a> {
    state: &'a Mutex<State>,
    armed: bool,
}

impl LeaderGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            // Dropping the senders wakes every waiter with an error.
            state.refresh_waiters = None;
        }
    }
}

fn session_ended() -> ClientError {
    ClientError::RefreshFailed("session ended".into())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    Err(ClientError::Api {
        status,
        message: error_message(response).await,
    })
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<MessageBody>().await {
        Ok(body) => body.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
