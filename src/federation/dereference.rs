//! IRI dereferencing
//!
//! Read-through cache in front of signed HTTP fetches:
//! 1. Cache lookup by normalized IRI
//! 2. Local persistence for IRIs under the local origin
//! 3. `GET` with `Accept: application/ld+json`, signed when a key is configured
//! 4. Cache population on success
//!
//! Concurrent misses for the same IRI each fetch; there is no single-flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{ACCEPT, DATE, HOST};
use http::{Method, Request, Uri};
use serde_json::Value;

use super::keypair::Keypair;
use super::signature::SignatureService;
use super::transport::HttpTransport;
use crate::clock::http_date;
use crate::data::{Cache, DEFAULT_TTL, LocalNodeSource, normalize_cache_key};
use crate::error::AppError;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, observe_fetch};

/// Media type requested on every fetch
pub const LD_JSON: &str = "application/ld+json";

const CACHE_NAME: &str = "dereference";

#[derive(Clone)]
struct SigningIdentity {
    key_id: String,
    keypair: Arc<Keypair>,
}

#[derive(Clone)]
struct LocalOrigin {
    origin: url::Origin,
    source: Arc<dyn LocalNodeSource>,
}

impl LocalOrigin {
    fn contains(&self, iri: &str) -> bool {
        url::Url::parse(iri)
            .map(|url| url.origin() == self.origin)
            .unwrap_or(false)
    }
}

/// Resolves IRIs to graph nodes
#[derive(Clone)]
pub struct Dereferencer {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn Cache>,
    signatures: SignatureService,
    signing: Option<SigningIdentity>,
    local: Option<LocalOrigin>,
    ttl: Duration,
}

impl Dereferencer {
    /// Unsigned dereferencer with no local origin and the default TTL
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn Cache>,
        signatures: SignatureService,
    ) -> Self {
        Self {
            transport,
            cache,
            signatures,
            signing: None,
            local: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// Sign outgoing fetches as `key_id`
    ///
    /// # Errors
    /// `OperationNotPermitted` if `keypair` has no private key
    pub fn with_signing_key(
        mut self,
        key_id: impl Into<String>,
        keypair: Arc<Keypair>,
    ) -> Result<Self, AppError> {
        if !keypair.has_private_key() {
            return Err(AppError::OperationNotPermitted);
        }
        self.signing = Some(SigningIdentity {
            key_id: key_id.into(),
            keypair,
        });
        Ok(self)
    }

    /// Resolve IRIs under `base_url` from `source` instead of the network
    pub fn with_local_source(
        mut self,
        base_url: &str,
        source: Arc<dyn LocalNodeSource>,
    ) -> Result<Self, AppError> {
        let origin = url::Url::parse(base_url)
            .map_err(|e| AppError::Validation(format!("Invalid local origin: {}", e)))?
            .origin();
        self.local = Some(LocalOrigin { origin, source });
        Ok(self)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolve `iri` to its node
    ///
    /// # Errors
    /// `NodeNotFound` when the fetch fails, the status is 400 or above, or
    /// the body is empty or not a JSON object/array. Nothing is cached in
    /// those cases.
    pub async fn dereference(&self, iri: &str) -> Result<Value, AppError> {
        let key = normalize_cache_key(iri);

        match self.cache.get(&key).await {
            Ok(Some(node)) => {
                CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                tracing::debug!(iri = %iri, "Dereference cache hit");
                return Ok(node);
            }
            Ok(None) => {
                tracing::debug!(iri = %iri, "Dereference cache miss");
            }
            Err(e) => {
                tracing::warn!(iri = %iri, error = %e, "Dereference cache read failed");
            }
        }
        CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();

        if let Some(local) = self.local.as_ref().filter(|local| local.contains(iri)) {
            return match local.source.load(iri).await? {
                Some(node) => Ok(node),
                None => {
                    tracing::debug!(iri = %iri, "Local node not found");
                    Err(AppError::node_not_found(iri))
                }
            };
        }

        let node = self.fetch(iri).await?;

        if let Err(e) = self.cache.set(&key, node.clone(), self.ttl).await {
            tracing::warn!(iri = %iri, error = %e, "Dereference cache write failed");
        }
        Ok(node)
    }

    async fn fetch(&self, iri: &str) -> Result<Value, AppError> {
        let request = self.build_request(iri)?;
        let started = Instant::now();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                observe_fetch("error", started.elapsed());
                tracing::error!(iri = %iri, error = %e, "Dereference request failed");
                return Err(AppError::node_not_found(iri).record());
            }
        };

        let status = response.status();
        observe_fetch(status.as_str(), started.elapsed());

        if status.as_u16() >= 400 {
            tracing::error!(iri = %iri, status = %status, "Dereference failed");
            return Err(AppError::node_not_found(iri).record());
        }

        decode_node(iri, response.body()).inspect_err(|_| {
            tracing::error!(iri = %iri, status = %status, "Dereference returned no usable node");
        })
    }

    fn build_request(&self, iri: &str) -> Result<Request<Vec<u8>>, AppError> {
        // IDNA hosts and non-ASCII paths are encoded before reaching http::Uri
        let url = url::Url::parse(iri).map_err(|e| {
            tracing::error!(iri = %iri, error = %e, "Cannot dereference malformed IRI");
            AppError::node_not_found(iri)
        })?;
        let uri: Uri = url.as_str().parse().map_err(|e| {
            tracing::error!(iri = %iri, error = %e, "Cannot dereference malformed IRI");
            AppError::node_not_found(iri)
        })?;
        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .ok_or_else(|| {
                tracing::error!(iri = %iri, "Cannot dereference IRI without a host");
                AppError::node_not_found(iri)
            })?;

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(ACCEPT, LD_JSON)
            .header(HOST, host)
            .header(DATE, http_date(self.signatures.clock().now()))
            .body(Vec::new())
            .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

        if let Some(signing) = &self.signing {
            self.signatures
                .sign_request(&mut request, &signing.keypair, &signing.key_id)?;
        }

        Ok(request)
    }

    /// Fetch the public key behind a signature `keyId`
    ///
    /// The actor document (keyId without fragment) is dereferenced through
    /// the cache. When the keyId carries a fragment the actor must advertise
    /// exactly that key id.
    ///
    /// # Returns
    /// Verify-only keypair
    pub async fn fetch_public_key(&self, key_id: &str) -> Result<Keypair, AppError> {
        let actor_iri = key_id.split('#').next().unwrap_or(key_id);
        let actor = self.dereference(actor_iri).await?;

        let public_key = select_public_key(&actor, key_id)
            .ok_or_else(|| AppError::Validation("Missing publicKey in actor".to_string()))?;

        if key_id.contains('#') {
            let advertised_key_id = public_key
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::Validation("Missing publicKey.id in actor".to_string()))?;

            if advertised_key_id != key_id {
                return Err(AppError::Validation(
                    "Signature keyId does not match actor public key id".to_string(),
                ));
            }
        }

        let public_key_pem = public_key
            .get("publicKeyPem")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation("Missing publicKeyPem in actor".to_string()))?;

        Keypair::from_public_key(public_key_pem)
    }
}

/// `publicKey` entry for `key_id`; a key document is its own entry
fn select_public_key<'a>(actor: &'a Value, key_id: &str) -> Option<&'a Value> {
    match actor.get("publicKey") {
        Some(Value::Array(keys)) => keys
            .iter()
            .find(|key| key.get("id").and_then(Value::as_str) == Some(key_id))
            .or_else(|| keys.first()),
        Some(key) => Some(key),
        None if actor.get("publicKeyPem").is_some() => Some(actor),
        None => None,
    }
}

fn decode_node(iri: &str, body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::node_not_found(iri).record());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(node @ (Value::Object(_) | Value::Array(_))) => Ok(node),
        Ok(_) => Err(AppError::node_not_found(iri)),
        Err(e) => {
            tracing::debug!(iri = %iri, error = %e, "Response body is not JSON");
            Err(AppError::node_not_found(iri))
        }
    }
}
