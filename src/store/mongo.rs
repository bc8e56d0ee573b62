use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;

use crate::issuer::{BoxError, DataStore, LoginUpdate, UserRecord, UserStore};
use crate::types::{RefreshTokenHash, Subject};

/// MongoDB-backed store.
///
/// Users live in `backtime.users`, keyed by `sub`. `/data` reads
/// `sample_supplies.sales` from the Atlas sample dataset.
#[derive(Debug, Clone)]
pub struct MongoStore {
    users: Collection<UserRecord>,
    sales: Collection<Document>,
}

impl MongoStore {
    /// Connect, ping and ensure indexes.
    ///
    /// # Errors
    ///
    /// Fails if the URI is invalid, the server is unreachable or index
    /// creation is rejected.
    pub async fn connect(uri: &str) -> Result<Self, BoxError> {
        let client = Client::with_uri_str(uri).await?;
        client.database("admin").run_command(doc! { "ping": 1 }).await?;
        tracing::info!("Connected to MongoDB");
        Self::from_client(&client).await
    }

    /// Use an existing client.
    ///
    /// # Errors
    ///
    /// Fails if index creation is rejected.
    pub async fn from_client(client: &Client) -> Result<Self, BoxError> {
        let users = client.database("backtime").collection::<UserRecord>("users");
        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sub": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "refreshTokenHash": 1 })
                    .build(),
            )
            .await?;

        let sales = client
            .database("sample_supplies")
            .collection::<Document>("sales");

        Ok(Self { users, sales })
    }
}

impl UserStore for MongoStore {
    async fn upsert_login(&self, login: LoginUpdate) -> Result<UserRecord, BoxError> {
        let at = login.at.format(&Rfc3339)?;
        let profile = login.profile;

        let mut set = doc! {
            "email": profile.email,
            "name": profile.name,
            "picture": profile.picture,
            "refreshTokenHash": login.refresh_token_hash.0,
            "lastLoginAt": at.clone(),
        };
        if let Some(grant) = login.google_grant {
            set.insert("googleGrant", grant.0);
        }

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let record = self
            .users
            .find_one_and_update(
                doc! { "sub": profile.sub.as_str() },
                doc! { "$set": set, "$setOnInsert": { "createdAt": at } },
            )
            .with_options(options)
            .await?
            .ok_or("upsert returned no document")?;
        Ok(record)
    }

    async fn find_by_refresh_hash(
        &self,
        hash: &RefreshTokenHash,
    ) -> Result<Option<UserRecord>, BoxError> {
        Ok(self
            .users
            .find_one(doc! { "refreshTokenHash": hash.as_str() })
            .await?)
    }

    async fn find_by_subject(&self, sub: &Subject) -> Result<Option<UserRecord>, BoxError> {
        Ok(self.users.find_one(doc! { "sub": sub.as_str() }).await?)
    }

    async fn rotate_refresh_hash(
        &self,
        current: &RefreshTokenHash,
        next: &RefreshTokenHash,
    ) -> Result<bool, BoxError> {
        let result = self
            .users
            .update_one(
                doc! { "refreshTokenHash": current.as_str() },
                doc! { "$set": { "refreshTokenHash": next.as_str() } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn clear_refresh_hash(&self, hash: &RefreshTokenHash) -> Result<bool, BoxError> {
        let result = self
            .users
            .update_one(
                doc! { "refreshTokenHash": hash.as_str() },
                doc! { "$unset": { "refreshTokenHash": "" } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

impl DataStore for MongoStore {
    async fn sample_sales(&self, limit: i64) -> Result<Vec<Value>, BoxError> {
        let cursor = self.sales.find(doc! {}).limit(limit).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::secret::{generate_refresh_token, hash_refresh_token};
    use crate::types::{SealedGrant, UserProfile};

    fn fresh_hash() -> RefreshTokenHash {
        hash_refresh_token(&generate_refresh_token())
    }

    #[tokio::test]
    #[ignore = "requires MONGODB_URI"]
    async fn user_lifecycle_against_live_server() {
        let Ok(uri) = std::env::var("MONGODB_URI") else {
            return;
        };
        let store = MongoStore::connect(&uri).await.unwrap();
        let sub = format!("test-{}", &generate_refresh_token()[..16]);

        let h1 = fresh_hash();
        let first = store
            .upsert_login(LoginUpdate {
                profile: UserProfile::new(sub.as_str()).with_email("mongo@example.com"),
                refresh_token_hash: h1.clone(),
                google_grant: Some(SealedGrant("sealed-grant".into())),
                at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        assert_eq!(first.sub.as_str(), sub);
        assert_eq!(first.refresh_token_hash.as_ref(), Some(&h1));

        // A login without a new grant keeps the stored one.
        let h2 = fresh_hash();
        let second = store
            .upsert_login(LoginUpdate {
                profile: UserProfile::new(sub.as_str()).with_email("mongo@example.com"),
                refresh_token_hash: h2.clone(),
                google_grant: None,
                at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.google_grant, Some(SealedGrant("sealed-grant".into())));
        assert!(store.find_by_refresh_hash(&h1).await.unwrap().is_none());

        let h3 = fresh_hash();
        assert!(store.rotate_refresh_hash(&h2, &h3).await.unwrap());
        assert!(!store.rotate_refresh_hash(&h2, &fresh_hash()).await.unwrap());
        let found = store.find_by_refresh_hash(&h3).await.unwrap().unwrap();
        assert_eq!(found.sub.as_str(), sub);

        assert!(store.clear_refresh_hash(&h3).await.unwrap());
        assert!(!store.clear_refresh_hash(&h3).await.unwrap());
        let user = store
            .find_by_subject(&Subject::from(sub.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.refresh_token_hash, None);

        store.users.delete_one(doc! { "sub": sub.as_str() }).await.unwrap();
    }
}
