//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! The signing string is always rebuilt from the request's own header values.
//! A signed `digest` header is only accepted by [`SignatureService::verify_with_body`],
//! which checks its `SHA-256` entry against the body.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::DateTime;
use http::{HeaderValue, Request};
use sha2::{Digest, Sha256};

use super::keypair::Keypair;
use crate::clock::{Clock, http_date};
use crate::error::AppError;
use crate::metrics::{SIGNATURE_REJECTIONS_TOTAL, SIGNATURES_TOTAL};

/// Headers covered by outgoing signatures unless the caller picks others
pub const DEFAULT_HEADERS: [&str; 3] = ["(request-target)", "host", "date"];

/// Maximum allowed distance between the `Date` header and now, in seconds
pub const REPLAY_THRESHOLD_SECONDS: i64 = 300;

/// Algorithm name emitted on outgoing signatures
pub const ALGORITHM: &str = "rsa-sha256";

/// Algorithms accepted on incoming signatures; both mean RSA-SHA256 here
const ACCEPTED_ALGORITHMS: [&str; 2] = ["rsa-sha256", "hs2019"];

const REQUEST_TARGET: &str = "(request-target)";

const DIGEST: &str = "digest";

/// Parsed `Signature` parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm (usually rsa-sha256)
    pub algorithm: String,
    /// Signed header names, lower-cased, in signing order
    pub headers: Vec<String>,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
}

impl SignatureParams {
    /// Parse a parameter string
    ///
    /// # Format
    /// ```text
    /// keyId="...",algorithm="...",headers="...",signature="..."
    /// ```
    ///
    /// `headers` defaults to `date` and `algorithm` to `hs2019` when absent.
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;

        for (name, value) in parse_parameters(input)? {
            let slot = match name.as_str() {
                "keyId" => &mut key_id,
                "algorithm" => &mut algorithm,
                "headers" => &mut headers,
                "signature" => &mut signature,
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(malformed(format!("duplicate parameter {}", name)));
            }
        }

        let key_id = key_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed("missing keyId"))?;

        let headers: Vec<String> = match headers {
            Some(list) => list
                .split_whitespace()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            None => vec!["date".to_string()],
        };
        if headers.is_empty() {
            return Err(malformed("empty headers list"));
        }

        let encoded = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("missing signature"))?;
        let signature = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| malformed("invalid signature encoding"))?;

        Ok(Self {
            key_id,
            algorithm: algorithm
                .map(|a| a.to_ascii_lowercase())
                .unwrap_or_else(|| "hs2019".to_string()),
            headers,
            signature,
        })
    }

    /// Read parameters from `Signature`, falling back to `Authorization: Signature ...`
    pub fn from_request<B>(request: &Request<B>) -> Result<Self, AppError> {
        let headers = request.headers();

        if let Some(value) = headers.get("signature") {
            let value = value
                .to_str()
                .map_err(|_| malformed("Signature header is not visible ASCII"))?;
            return Self::parse(value);
        }

        for value in headers.get_all("authorization") {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let value = value.trim_start();
            if let Some((scheme, params)) = value.split_once(' ') {
                if scheme.eq_ignore_ascii_case("signature") {
                    return Self::parse(params);
                }
            }
        }

        Err(AppError::SignatureMissing)
    }

    /// Render as a `Signature` header value
    pub fn to_header_value(&self) -> String {
        format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
            escape_quoted(&self.key_id),
            escape_quoted(&self.algorithm),
            self.headers.join(" "),
            BASE64.encode(&self.signature)
        )
    }
}

fn malformed(reason: impl Into<String>) -> AppError {
    AppError::SignatureMalformed(reason.into())
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Split `name=value` pairs; values are tokens or quoted strings with `\` escapes
fn parse_parameters(input: &str) -> Result<Vec<(String, String)>, AppError> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',') {
            name.push(c);
        }
        let name = name.trim().to_string();
        if name.is_empty() || chars.next() != Some('=') {
            return Err(malformed("expected name=value"));
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(malformed("unterminated quoted string")),
                    },
                    Some(c) => value.push(c),
                    None => return Err(malformed("unterminated quoted string")),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
            value = value.trim().to_string();
        }
        params.push((name, value));

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(malformed(format!("unexpected character {:?}", c))),
        }
    }

    if params.is_empty() {
        return Err(malformed("empty parameter string"));
    }
    Ok(params)
}

/// Build the canonical signing string for `headers` over `request`
///
/// One `name: value` line per header, joined with `\n`. Repeated headers are
/// joined with `", "`. `host` falls back to the URI authority when the request
/// has no `Host` header; any other absent header contributes an empty value
/// here, though verification rejects a signature naming one.
pub fn signing_string<B, S: AsRef<str>>(request: &Request<B>, headers: &[S]) -> String {
    headers
        .iter()
        .map(|name| {
            let name = name.as_ref().to_ascii_lowercase();
            let value = header_value(request, &name);
            format!("{}: {}", name, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn header_value<B>(request: &Request<B>, name: &str) -> String {
    if name == REQUEST_TARGET {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        return format!(
            "{} {}",
            request.method().as_str().to_lowercase(),
            path_and_query
        );
    }

    let values: Vec<String> = request
        .headers()
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
        .collect();

    if values.is_empty() && name == "host" {
        return request
            .uri()
            .authority()
            .map(|authority| authority.as_str().to_string())
            .unwrap_or_default();
    }

    values.join(", ")
}

/// `Digest` header value for `body`: `SHA-256=<base64>`
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Match the `SHA-256` entry of a `Digest` header against `body`
fn check_digest<B>(request: &Request<B>, body: &[u8]) -> Result<(), AppError> {
    let header = request
        .headers()
        .get(DIGEST)
        .ok_or_else(|| AppError::DigestMismatch("missing Digest header".to_string()))?
        .to_str()
        .map_err(|_| AppError::DigestMismatch("not visible ASCII".to_string()))?;

    let expected = BASE64.encode(Sha256::digest(body));
    let mut has_sha256 = false;
    for entry in header.split(',') {
        let Some((algorithm, value)) = entry.trim().split_once('=') else {
            continue;
        };
        if algorithm.trim().eq_ignore_ascii_case("sha-256") {
            has_sha256 = true;
            if value.trim() == expected {
                return Ok(());
            }
        }
    }

    Err(AppError::DigestMismatch(if has_sha256 {
        "body does not match".to_string()
    } else {
        format!("no supported algorithm in {:?}", header)
    }))
}

/// Validate that signature keyId points to the same actor as the activity actor.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}

/// Signs outgoing requests and verifies incoming ones
#[derive(Clone)]
pub struct SignatureService {
    clock: Arc<dyn Clock>,
    replay_threshold_seconds: i64,
}

impl SignatureService {
    /// Service with the default 300 second replay window
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            replay_threshold_seconds: REPLAY_THRESHOLD_SECONDS,
        }
    }

    /// Override the replay window
    pub fn with_replay_threshold(mut self, seconds: i64) -> Self {
        self.replay_threshold_seconds = seconds;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Produce a `Signature` header value covering `headers`
    ///
    /// # Errors
    /// `OperationNotPermitted` if `private_key` cannot sign
    pub fn sign<B, S: AsRef<str>>(
        &self,
        request: &Request<B>,
        private_key: &Keypair,
        key_id: &str,
        headers: &[S],
    ) -> Result<String, AppError> {
        let headers: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        let signing_string = signing_string(request, &headers);

        let signature = match private_key.sign(signing_string.as_bytes()) {
            Ok(signature) => signature,
            Err(e) => {
                SIGNATURES_TOTAL.with_label_values(&["sign", "error"]).inc();
                return Err(e);
            }
        };
        SIGNATURES_TOTAL.with_label_values(&["sign", "ok"]).inc();

        Ok(SignatureParams {
            key_id: key_id.to_string(),
            algorithm: ALGORITHM.to_string(),
            headers,
            signature,
        }
        .to_header_value())
    }

    /// Sign `request` in place with the default header set
    ///
    /// Inserts `Host` (from the URI authority) and `Date` (from the clock)
    /// when absent, then attaches the `Signature` header.
    pub fn sign_request<B>(
        &self,
        request: &mut Request<B>,
        private_key: &Keypair,
        key_id: &str,
    ) -> Result<(), AppError> {
        if !request.headers().contains_key(http::header::HOST) {
            let authority = request
                .uri()
                .authority()
                .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?
                .as_str()
                .to_string();
            let host = HeaderValue::from_str(&authority)
                .map_err(|e| AppError::Validation(format!("Invalid host: {}", e)))?;
            request.headers_mut().insert(http::header::HOST, host);
        }

        if !request.headers().contains_key(http::header::DATE) {
            let date = HeaderValue::from_str(&http_date(self.clock.now()))
                .map_err(|e| AppError::Validation(format!("Invalid date: {}", e)))?;
            request.headers_mut().insert(http::header::DATE, date);
        }

        let signature = self.sign(request, private_key, key_id, &DEFAULT_HEADERS)?;
        let signature = HeaderValue::from_str(&signature)
            .map_err(|e| AppError::Validation(format!("Invalid signature header: {}", e)))?;
        request.headers_mut().insert("signature", signature);

        Ok(())
    }

    /// Whether `request` carries a valid, fresh signature by `public_key`
    ///
    /// Fails closed: every rejection is `false`. The reason is logged and
    /// counted but never returned. The body is not available here, so a
    /// signature covering `digest` is rejected; use [`Self::verify_with_body`].
    pub fn verify<B>(&self, request: &Request<B>, public_key: &Keypair) -> bool {
        self.report(request, self.check(request, public_key, None))
    }

    /// [`Self::verify`], additionally checking a signed `Digest` against the body
    pub fn verify_with_body<B: AsRef<[u8]>>(
        &self,
        request: &Request<B>,
        public_key: &Keypair,
    ) -> bool {
        let body = request.body().as_ref();
        self.report(request, self.check(request, public_key, Some(body)))
    }

    fn report<B>(&self, request: &Request<B>, outcome: Result<SignatureParams, AppError>) -> bool {
        match outcome {
            Ok(params) => {
                SIGNATURES_TOTAL.with_label_values(&["verify", "accepted"]).inc();
                tracing::debug!(key_id = %params.key_id, "HTTP signature accepted");
                true
            }
            Err(reason) => {
                SIGNATURES_TOTAL.with_label_values(&["verify", "rejected"]).inc();
                SIGNATURE_REJECTIONS_TOTAL
                    .with_label_values(&[reason.error_type()])
                    .inc();
                tracing::debug!(
                    reason = %reason,
                    method = %request.method(),
                    uri = %request.uri(),
                    "HTTP signature rejected"
                );
                false
            }
        }
    }

    /// Verification with the typed rejection reason
    fn check<B>(
        &self,
        request: &Request<B>,
        public_key: &Keypair,
        body: Option<&[u8]>,
    ) -> Result<SignatureParams, AppError> {
        // 1. Date must be present and parseable.
        let date = request
            .headers()
            .get(http::header::DATE)
            .ok_or(AppError::DateMissing)?
            .to_str()
            .map_err(|_| AppError::DateInvalid("not visible ASCII".to_string()))?;
        let date = DateTime::parse_from_rfc2822(date.trim())
            .map_err(|e| AppError::DateInvalid(e.to_string()))?;

        // 2. Replay window.
        let skew_seconds = (self.clock.now().timestamp() - date.timestamp()).abs();
        if skew_seconds > self.replay_threshold_seconds {
            return Err(AppError::ClockSkewExceeded { skew_seconds });
        }

        // 3. Signature parameters.
        let params = SignatureParams::from_request(request)?;
        if !ACCEPTED_ALGORITHMS.contains(&params.algorithm.as_str()) {
            return Err(AppError::UnsupportedAlgorithm(params.algorithm));
        }

        // 4. Every signed header must be on the request.
        for name in &params.headers {
            let present = match name.as_str() {
                REQUEST_TARGET => true,
                "host" => {
                    request.headers().contains_key(http::header::HOST)
                        || request.uri().authority().is_some()
                }
                other => request.headers().contains_key(other),
            };
            if !present {
                return Err(malformed(format!("signed header {} is missing", name)));
            }
        }

        // 5. Rebuild from the live request and verify.
        let signing_string = signing_string(request, &params.headers);
        if !public_key.verify(signing_string.as_bytes(), &params.signature) {
            return Err(AppError::VerificationFailed);
        }

        // 6. A signed digest must match the body.
        if params.headers.iter().any(|h| h == DIGEST) {
            let body = body.ok_or_else(|| {
                AppError::DigestMismatch("body not available to check".to_string())
            })?;
            check_digest(request, body)?;
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    const ALICE_PRIVATE: &str = include_str!("../../tests/fixtures/alice.private.pem");
    const ALICE_PUBLIC: &str = include_str!("../../tests/fixtures/alice.public.pem");
    const BOB_PUBLIC: &str = include_str!("../../tests/fixtures/bob.public.pem");
    const KEY_ID: &str = "https://example.com/users/alice#main-key";

    fn fixed_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 5, 21, 31, 40).unwrap()
    }

    fn service() -> (SignatureService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(fixed_time()));
        (SignatureService::new(clock.clone()), clock)
    }

    fn alice() -> Keypair {
        Keypair::from_private_key_pem(ALICE_PRIVATE).expect("alice private key")
    }

    fn alice_public() -> Keypair {
        Keypair::from_public_key(ALICE_PUBLIC).expect("alice public key")
    }

    fn sally_request(date: chrono::DateTime<Utc>) -> Request<()> {
        Request::builder()
            .method("GET")
            .uri("https://example.com/sally")
            .header("host", "example.com")
            .header("date", http_date(date))
            .body(())
            .expect("request")
    }

    fn signed_sally_request(date: chrono::DateTime<Utc>) -> Request<()> {
        let (service, _) = service();
        let mut request = sally_request(date);
        let signature = service
            .sign(&request, &alice(), KEY_ID, &DEFAULT_HEADERS)
            .expect("signature");
        request
            .headers_mut()
            .insert("signature", HeaderValue::from_str(&signature).unwrap());
        request
    }

    #[test]
    fn signing_string_matches_known_vector() {
        let request = sally_request(fixed_time());
        assert_eq!(
            signing_string(&request, &DEFAULT_HEADERS),
            "(request-target): get /sally\nhost: example.com\ndate: Sun, 05 Jan 2014 21:31:40 GMT"
        );
    }

    #[test]
    fn known_vector_verifies_only_against_matching_key() {
        let (service, _) = service();
        let request = signed_sally_request(fixed_time());

        assert!(service.verify(&request, &alice_public()));
        assert!(!service.verify(
            &request,
            &Keypair::from_public_key(BOB_PUBLIC).expect("bob public key")
        ));
    }

    #[test]
    fn signature_header_has_expected_shape() {
        let request = signed_sally_request(fixed_time());
        let header = request.headers().get("signature").unwrap().to_str().unwrap();

        assert!(header.starts_with(&format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"(request-target) host date\",signature=\"",
            KEY_ID
        )));
        let params = SignatureParams::parse(header).expect("parsed");
        assert_eq!(params.signature.len(), 256);
    }

    #[test]
    fn signing_string_lowercases_names_and_joins_repeated_headers() {
        let request = Request::builder()
            .method("POST")
            .uri("https://example.com/inbox?page=2")
            .header("X-Forwarded-For", "10.0.0.1")
            .header("X-Forwarded-For", "10.0.0.2")
            .body(())
            .unwrap();

        assert_eq!(
            signing_string(&request, &["(Request-Target)", "Host", "X-Forwarded-For"]),
            "(request-target): post /inbox?page=2\nhost: example.com\nx-forwarded-for: 10.0.0.1, 10.0.0.2"
        );
    }

    #[test]
    fn signing_with_public_only_key_is_not_permitted() {
        let (service, _) = service();
        let request = sally_request(fixed_time());

        match service.sign(&request, &alice_public(), KEY_ID, &DEFAULT_HEADERS) {
            Err(AppError::OperationNotPermitted) => {}
            other => panic!("expected OperationNotPermitted, got: {other:?}"),
        }
    }

    #[test]
    fn sign_request_fills_host_and_date() {
        let (service, _) = service();
        let mut request = Request::builder()
            .method("GET")
            .uri("https://example.com/sally")
            .body(())
            .unwrap();

        service
            .sign_request(&mut request, &alice(), KEY_ID)
            .expect("signed");

        assert_eq!(request.headers()["host"], "example.com");
        assert_eq!(request.headers()["date"], "Sun, 05 Jan 2014 21:31:40 GMT");
        assert!(service.verify(&request, &alice_public()));
    }

    #[test]
    fn tampered_signature_bytes_are_rejected() {
        let (service, _) = service();
        let request = signed_sally_request(fixed_time());
        let header = request.headers()["signature"].to_str().unwrap().to_string();
        let params = SignatureParams::parse(&header).unwrap();

        for index in [0, params.signature.len() / 2, params.signature.len() - 1] {
            let mut tampered = params.clone();
            tampered.signature[index] ^= 0x01;

            let mut request = sally_request(fixed_time());
            request.headers_mut().insert(
                "signature",
                HeaderValue::from_str(&tampered.to_header_value()).unwrap(),
            );
            assert!(
                !service.verify(&request, &alice_public()),
                "flipping byte {index} must fail verification"
            );
        }
    }

    #[test]
    fn changed_header_value_is_rejected() {
        let (service, _) = service();
        let mut request = signed_sally_request(fixed_time());
        request
            .headers_mut()
            .insert("host", HeaderValue::from_static("evil.example"));

        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::VerificationFailed)
        ));
    }

    #[test]
    fn missing_date_is_rejected() {
        let (service, _) = service();
        let mut request = signed_sally_request(fixed_time());
        request.headers_mut().remove("date");

        assert!(!service.verify(&request, &alice_public()));
        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::DateMissing)
        ));
    }

    #[test]
    fn replay_window_boundary() {
        let (service, _) = service();

        let stale = signed_sally_request(fixed_time() - chrono::Duration::seconds(301));
        assert!(matches!(
            service.check(&stale, &alice_public(), None),
            Err(AppError::ClockSkewExceeded { skew_seconds: 301 })
        ));
        assert!(!service.verify(&stale, &alice_public()));

        let fresh = signed_sally_request(fixed_time() - chrono::Duration::seconds(299));
        assert!(service.verify(&fresh, &alice_public()));

        let future = signed_sally_request(fixed_time() + chrono::Duration::seconds(301));
        assert!(!service.verify(&future, &alice_public()));
    }

    #[test]
    fn replay_window_follows_the_clock() {
        let (service, clock) = service();
        let request = signed_sally_request(fixed_time());
        assert!(service.verify(&request, &alice_public()));

        clock.advance(chrono::Duration::minutes(10));
        assert!(!service.verify(&request, &alice_public()));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let (service, _) = service();
        let request = sally_request(fixed_time());

        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::SignatureMissing)
        ));
    }

    #[test]
    fn authorization_signature_header_is_accepted() {
        let (service, _) = service();
        let signed = signed_sally_request(fixed_time());
        let params = signed.headers()["signature"].to_str().unwrap().to_string();

        let mut request = sally_request(fixed_time());
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Signature {}", params)).unwrap(),
        );
        assert!(service.verify(&request, &alice_public()));
    }

    #[test]
    fn malformed_signature_header_is_rejected() {
        let (service, _) = service();
        let mut request = sally_request(fixed_time());
        request.headers_mut().insert(
            "signature",
            HeaderValue::from_static("keyId=\"x\",signature=\"%%%not-base64%%%\""),
        );

        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::SignatureMalformed(_))
        ));
        assert!(!service.verify(&request, &alice_public()));
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let (service, _) = service();
        let signed = signed_sally_request(fixed_time());
        let mut params =
            SignatureParams::parse(signed.headers()["signature"].to_str().unwrap()).unwrap();
        params.algorithm = "ed25519".to_string();

        let mut request = sally_request(fixed_time());
        request.headers_mut().insert(
            "signature",
            HeaderValue::from_str(&params.to_header_value()).unwrap(),
        );
        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn headers_default_to_date() {
        let (service, _) = service();
        let mut request = sally_request(fixed_time());
        let signature = service
            .sign(&request, &alice(), KEY_ID, &["date"])
            .expect("signature");
        let params = SignatureParams::parse(&signature).unwrap();
        let without_headers = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",signature=\"{}\"",
            KEY_ID,
            BASE64.encode(&params.signature)
        );
        assert_eq!(
            SignatureParams::parse(&without_headers).unwrap().headers,
            vec!["date".to_string()]
        );

        request.headers_mut().insert(
            "signature",
            HeaderValue::from_str(&without_headers).unwrap(),
        );
        assert!(service.verify(&request, &alice_public()));
    }

    #[test]
    fn parse_handles_spacing_escapes_and_unknown_fields() {
        let params = SignatureParams::parse(
            " keyId = \"https://a.example/u#k\\\"1\" , created=1402170695, algorithm=\"RSA-SHA256\",headers=\"(request-target) Host\",signature=\"ZmFrZQ==\" ",
        )
        .expect("parsed");

        assert_eq!(params.key_id, "https://a.example/u#k\"1");
        assert_eq!(params.algorithm, "rsa-sha256");
        assert_eq!(params.headers, vec!["(request-target)", "host"]);
        assert_eq!(params.signature, b"fake");

        let reparsed = SignatureParams::parse(&params.to_header_value()).unwrap();
        assert_eq!(reparsed, params);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for input in [
            "",
            "   ",
            "keyId",
            "keyId=\"unterminated",
            "signature=\"ZmFrZQ==\"",
            "keyId=\"a\"",
            "keyId=\"a\",signature=\"\"",
            "keyId=\"a\",headers=\"\",signature=\"ZmFrZQ==\"",
            "keyId=\"a\",keyId=\"b\",signature=\"ZmFrZQ==\"",
            "keyId=\"a\" junk,signature=\"ZmFrZQ==\"",
        ] {
            assert!(
                matches!(
                    SignatureParams::parse(input),
                    Err(AppError::SignatureMalformed(_))
                ),
                "expected malformed for {input:?}"
            );
        }
    }

    const DIGEST_HEADERS: [&str; 4] = ["(request-target)", "host", "date", "digest"];

    fn signed_post(digest: &str, body: &str) -> Request<String> {
        let (service, _) = service();
        let mut request = Request::builder()
            .method("POST")
            .uri("https://example.com/inbox")
            .header("host", "example.com")
            .header("date", http_date(fixed_time()))
            .header("digest", digest)
            .body(body.to_string())
            .expect("request");
        let signature = service
            .sign(&request, &alice(), KEY_ID, &DIGEST_HEADERS)
            .expect("signature");
        request
            .headers_mut()
            .insert("signature", HeaderValue::from_str(&signature).unwrap());
        request
    }

    #[test]
    fn digest_header_of_empty_body() {
        assert_eq!(
            digest_header(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn signed_digest_matching_body_is_accepted() {
        let (service, _) = service();
        let body = r#"{"type":"Follow"}"#;
        let request = signed_post(&digest_header(body.as_bytes()), body);

        assert!(service.verify_with_body(&request, &alice_public()));
    }

    #[test]
    fn signed_digest_with_replaced_body_is_rejected() {
        let (service, _) = service();
        let body = r#"{"attacker":"controlled body"}"#;
        let request = signed_post(&digest_header(b""), body);

        assert!(!service.verify_with_body(&request, &alice_public()));
        assert!(matches!(
            service.check(&request, &alice_public(), Some(body.as_bytes())),
            Err(AppError::DigestMismatch(_))
        ));
    }

    #[test]
    fn signed_digest_without_body_is_rejected() {
        let (service, _) = service();
        let body = r#"{"type":"Follow"}"#;
        let request = signed_post(&digest_header(body.as_bytes()), body);

        assert!(!service.verify(&request, &alice_public()));
        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::DigestMismatch(_))
        ));
    }

    #[test]
    fn signed_digest_with_unknown_algorithm_is_rejected() {
        let (service, _) = service();
        let body = r#"{"type":"Follow"}"#;
        let request = signed_post("MD5=HUXZLQLMuI/KZ5KDcJPcOA==", body);

        assert!(matches!(
            service.check(&request, &alice_public(), Some(body.as_bytes())),
            Err(AppError::DigestMismatch(_))
        ));
    }

    #[test]
    fn digest_entries_are_matched_case_insensitively() {
        let (service, _) = service();
        let body = r#"{"type":"Follow"}"#;
        let sha256 = digest_header(body.as_bytes()).replacen("SHA-256", "sha-256", 1);
        let request = signed_post(&format!("MD5=abc=, {}", sha256), body);

        assert!(service.verify_with_body(&request, &alice_public()));
    }

    #[test]
    fn signed_header_missing_from_request_is_rejected() {
        let (service, _) = service();
        let mut request = sally_request(fixed_time());
        let signature = service
            .sign(&request, &alice(), KEY_ID, &["date", "x-missing"])
            .expect("signature");
        request
            .headers_mut()
            .insert("signature", HeaderValue::from_str(&signature).unwrap());

        assert!(!service.verify(&request, &alice_public()));
        assert!(matches!(
            service.check(&request, &alice_public(), None),
            Err(AppError::SignatureMalformed(_))
        ));
    }

    #[test]
    fn key_id_matches_actor_accepts_same_actor() {
        assert!(key_id_matches_actor(
            "https://remote.example/users/alice#main-key",
            "https://remote.example/users/alice",
        ));
    }

    #[test]
    fn key_id_matches_actor_rejects_different_actor() {
        assert!(!key_id_matches_actor(
            "https://remote.example/users/bob#main-key",
            "https://remote.example/users/alice",
        ));
    }
}
