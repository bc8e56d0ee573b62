//! Backtime API server.
//!
//! Serves the session issuer routes, `/data` and `/health`.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use backtime_auth::google::{GoogleClient, GoogleConfig};
use backtime_auth::issuer::{DataStore, IssuerConfig, UserStore};
use backtime_auth::{auth_routes, data_routes};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backtime_auth=debug,backtime=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IssuerConfig::from_env()?;
    let google = GoogleClient::new(GoogleConfig::from_env()?);

    let app = match std::env::var("MONGODB_URI") {
        #[cfg(feature = "mongodb")]
        Ok(uri) => {
            let store = backtime_auth::store::MongoStore::connect(&uri)
                .await
                .map_err(|e| anyhow::anyhow!("MongoDB connection failed: {e}"))?;
            create_router(config, google, store)
        }
        #[cfg(not(feature = "mongodb"))]
        Ok(_) => {
            tracing::warn!("MONGODB_URI is set but the mongodb feature is disabled; using the in-memory store");
            create_router(config, google, backtime_auth::MemoryStore::new())
        }
        Err(_) => {
            tracing::warn!("MONGODB_URI not set; using the in-memory store");
            create_router(config, google, backtime_auth::MemoryStore::new())
        }
    };

    let port: u16 = match std::env::var("PORT") {
        Ok(raw) => raw.parse()?,
        Err(_) => 3000,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Backtime listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router<S>(config: IssuerConfig, google: GoogleClient, store: S) -> Router
where
    S: UserStore + DataStore + Clone,
{
    let signer = config.signer();
    Router::new()
        .merge(auth_routes(config, google, store.clone()))
        .merge(data_routes(signer, store))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}
