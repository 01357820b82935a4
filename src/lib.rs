//! fedifetch - signed fetches and graph storage for ActivityPub
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Federation Layer                         │
//! │  - Dereferencer (cache -> local graph -> signed GET)         │
//! │  - HTTP Signatures (sign / verify with replay window)        │
//! │  - RSA keypairs                                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Dereference cache (memory / moka)                         │
//! │  - Triple store (memory / SQLite via sqlx)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `federation`: keypairs, HTTP Signatures, transport, dereferencing
//! - `data`: caches, triples and triple stores
//! - `clock`: injectable time source
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across commands and tasks
///
/// Cheap to clone; every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Time source for signatures and cache expiry
    pub clock: Arc<dyn clock::Clock>,

    /// HTTP Signature signer/verifier
    pub signatures: federation::SignatureService,

    /// Signing keypair, when `signature.private_key_path` is set
    pub keypair: Option<Arc<federation::Keypair>>,

    /// Persistent triple store
    pub store: Arc<data::SqliteTripleStore>,

    /// Dereference cache
    pub cache: Arc<dyn data::Cache>,

    /// Read-through resolver for IRIs
    pub dereferencer: federation::Dereferencer,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Load the signing key
    /// 2. Connect to the SQLite triple store
    /// 3. Initialize the dereference cache
    /// 4. Build the HTTP transport and dereferencer
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);
        let signatures = federation::SignatureService::new(clock.clone())
            .with_replay_threshold(config.signature.replay_threshold_seconds);

        // 1. Signing key
        let keypair = match &config.signature.private_key_path {
            Some(path) => {
                let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
                    error::AppError::Key(format!(
                        "Failed to read private key {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let keypair = federation::Keypair::from_private_key_pem(&pem)?;
                tracing::info!(path = %path.display(), "Signing key loaded");
                Some(Arc::new(keypair))
            }
            None => {
                tracing::info!("No signing key configured; fetches will be unsigned");
                None
            }
        };

        // 2. Triple store
        let store = Arc::new(data::SqliteTripleStore::connect(&config.database.path).await?);
        tracing::info!("Triple store connected");

        // 3. Cache
        let cache: Arc<dyn data::Cache> = match config.cache.backend {
            config::CacheBackend::Memory => Arc::new(data::MemoryCache::new(clock.clone())),
            config::CacheBackend::Moka => {
                Arc::new(data::MokaCache::new(config.cache.max_capacity))
            }
        };
        tracing::info!(backend = ?config.cache.backend, "Cache initialized");

        // 4. Transport and dereferencer
        let transport = Arc::new(federation::ReqwestTransport::from_config(&config.http)?);
        let local_source = Arc::new(data::TripleStoreNodeSource::new(store.clone()));

        let mut dereferencer =
            federation::Dereferencer::new(transport, cache.clone(), signatures.clone())
                .with_ttl(Duration::from_secs(config.cache.ttl_seconds))
                .with_local_source(&config.instance.base_url(), local_source)?;

        if let (Some(key_id), Some(keypair)) = (&config.signature.key_id, &keypair) {
            dereferencer = dereferencer.with_signing_key(key_id.clone(), keypair.clone())?;
        }

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            clock,
            signatures,
            keypair,
            store,
            cache,
            dereferencer,
        })
    }
}
