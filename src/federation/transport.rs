//! Outbound HTTP transport
//!
//! The dereferencer talks to the network only through [`HttpTransport`].
//! Timeouts and cancellation belong to the transport.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use http::{Request, Response};

use crate::config::HttpConfig;
use crate::error::AppError;

/// Send one request, return status, headers and body
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, AppError>;
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(domain) => {
            let normalized = domain.trim_end_matches('.').to_ascii_lowercase();
            normalized == "localhost" || normalized.ends_with(".localhost")
        }
        url::Host::Ipv4(v4) => is_disallowed_ip(IpAddr::V4(*v4)),
        url::Host::Ipv6(v6) => is_disallowed_ip(IpAddr::V6(*v6)),
    }
}

/// Reject non-HTTP(S) destinations and hosts that are, or resolve to, local addresses
async fn check_destination(uri: &str) -> Result<(), AppError> {
    let parsed =
        url::Url::parse(uri).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    if is_disallowed_host(&host) {
        return Err(AppError::Forbidden);
    }

    let url::Host::Domain(domain) = host else {
        return Ok(());
    };
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| AppError::Validation("Missing port in URL".to_string()))?;

    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((domain.trim_end_matches('.'), port))
        .await
        .map_err(|e| AppError::Validation(format!("Failed to resolve host: {}", e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Forbidden);
        }
    }

    if !resolved_any {
        return Err(AppError::Validation("No DNS records for host".to_string()));
    }

    Ok(())
}

/// [`HttpTransport`] over `reqwest`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl ReqwestTransport {
    /// Wrap an existing client; private destinations are refused
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            allow_private_hosts: false,
        }
    }

    /// Build a client from the `http` configuration section
    pub fn from_config(config: &HttpConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self::new(client).allow_private_hosts(config.allow_private_hosts))
    }

    /// Permit loopback and private-network destinations
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, AppError> {
        if !self.allow_private_hosts {
            check_destination(&request.uri().to_string()).await?;
        }

        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
