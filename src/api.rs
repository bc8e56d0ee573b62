//! Authenticated demo data API.

use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::issuer::{AuthError, AuthUser, DataStore};
use crate::token::AccessTokenSigner;

/// Body of `GET /data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesResponse {
    pub sales: Vec<serde_json::Value>,
}

struct DataState<D> {
    signer: Arc<AccessTokenSigner>,
    store: Arc<D>,
}

impl<D> Clone for DataState<D> {
    fn clone(&self) -> Self {
        Self {
            signer: self.signer.clone(),
            store: self.store.clone(),
        }
    }
}

impl<D> FromRef<DataState<D>> for Arc<AccessTokenSigner> {
    fn from_ref(state: &DataState<D>) -> Self {
        state.signer.clone()
    }
}

/// Create the data router: `GET /data`, bearer-authenticated.
///
/// Pass the signer from [`IssuerConfig::signer`](crate::issuer::IssuerConfig::signer)
/// so tokens issued by the auth routes are accepted here.
pub fn data_routes<D: DataStore>(signer: Arc<AccessTokenSigner>, store: D) -> Router {
    let state = DataState {
        signer,
        store: Arc::new(store),
    };
    Router::new()
        .route("/data", get(sales::<D>))
        .with_state(state)
}

async fn sales<D: DataStore>(
    State(state): State<DataState<D>>,
    user: AuthUser,
) -> Result<Json<SalesResponse>, AuthError> {
    let sales = state
        .store
        .sample_sales(1)
        .await
        .map_err(|e| AuthError::Data(e.to_string()))?;
    tracing::debug!(sub = %user.sub(), count = sales.len(), "Served sales data");
    Ok(Json(SalesResponse { sales }))
}
