use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::issuer::{BoxError, DataStore, LoginUpdate, UserRecord, UserStore};
use crate::types::{RefreshTokenHash, Subject};

/// In-process store for development and tests.
///
/// Clones share the same records, so one store can back both the issuer
/// routes and the data routes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<Subject, UserRecord>>>,
    sales: Arc<Vec<Value>>,
}

impl MemoryStore {
    /// Empty store with one demo sales document.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sales(vec![demo_sale()])
    }

    /// Empty store serving `sales` from `/data`.
    #[must_use]
    pub fn with_sales(sales: Vec<Value>) -> Self {
        Self {
            users: Arc::default(),
            sales: Arc::new(sales),
        }
    }
}

impl UserStore for MemoryStore {
    async fn upsert_login(&self, login: LoginUpdate) -> Result<UserRecord, BoxError> {
        let mut users = self.users.write().await;
        let profile = login.profile;
        let record = users
            .entry(profile.sub.clone())
            .or_insert_with(|| UserRecord {
                sub: profile.sub.clone(),
                email: String::new(),
                name: String::new(),
                picture: String::new(),
                refresh_token_hash: None,
                google_grant: None,
                created_at: login.at,
                last_login_at: login.at,
            });
        record.email = profile.email;
        record.name = profile.name;
        record.picture = profile.picture;
        record.refresh_token_hash = Some(login.refresh_token_hash);
        record.last_login_at = login.at;
        if login.google_grant.is_some() {
            record.google_grant = login.google_grant;
        }
        Ok(record.clone())
    }

    async fn find_by_refresh_hash(
        &self,
        hash: &RefreshTokenHash,
    ) -> Result<Option<UserRecord>, BoxError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|r| r.refresh_token_hash.as_ref() == Some(hash))
            .cloned())
    }

    async fn find_by_subject(&self, sub: &Subject) -> Result<Option<UserRecord>, BoxError> {
        Ok(self.users.read().await.get(sub).cloned())
    }

    async fn rotate_refresh_hash(
        &self,
        current: &RefreshTokenHash,
        next: &RefreshTokenHash,
    ) -> Result<bool, BoxError> {
        let mut users = self.users.write().await;
        match users
            .values_mut()
            .find(|r| r.refresh_token_hash.as_ref() == Some(current))
        {
            Some(record) => {
                record.refresh_token_hash = Some(next.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_refresh_hash(&self, hash: &RefreshTokenHash) -> Result<bool, BoxError> {
        let mut users = self.users.write().await;
        match users
            .values_mut()
            .find(|r| r.refresh_token_hash.as_ref() == Some(hash))
        {
            Some(record) => {
                record.refresh_token_hash = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl DataStore for MemoryStore {
    async fn sample_sales(&self, limit: i64) -> Result<Vec<Value>, BoxError> {
        let limit = usize::try_from(limit.max(0))?;
        Ok(self.sales.iter().take(limit).cloned().collect())
    }
}

/// Shaped like a document from the `sample_supplies.sales` collection.
fn demo_sale() -> Value {
    json!({
        "_id": "5bd761dcae323e45a93ccfe8",
        "saleDate": "2015-03-23T21:06:49.506Z",
        "items": [
            {
                "name": "printer paper",
                "tags": ["office", "stationary"],
                "price": 40.01,
                "quantity": 2
            },
            {
                "name": "notepad",
                "tags": ["office", "writing", "school"],
                "price": 35.29,
                "quantity": 2
            }
        ],
        "storeLocation": "Denver",
        "customer": {
            "gender": "M",
            "age": 42,
            "email": "cauho@witwuta.sv",
            "satisfaction": 4
        },
        "couponUsed": true,
        "purchaseMethod": "Online"
    })
}
