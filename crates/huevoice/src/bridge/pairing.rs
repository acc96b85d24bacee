//! Bridge discovery and link-button pairing.
//!
//! Runs once at startup: find the bridge, check the stored key, and if the
//! bridge does not accept it, ask the operator to press the link button
//! while polling for a fresh key.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::api_error;
use super::client::decode;
use super::model::BridgeCredential;
use super::model::BridgeReply;
use super::model::DiscoveredBridge;
use super::model::ERROR_LINK_BUTTON_NOT_PRESSED;
use super::model::ERROR_UNAUTHORIZED_USER;
use super::BridgeError;
use crate::config::BridgeConfig;

/// HTTP calls made while pairing
///
/// This trait allows for mocking the bridge and discovery service in tests
#[async_trait]
pub trait PairingTransport: Send + Sync {
    /// List bridges known to the discovery service
    async fn discover(&self, discovery_url: &str) -> Result<Vec<DiscoveredBridge>, BridgeError>;

    /// `GET /api/<key>`, returned as raw JSON
    async fn probe(&self, bridge_ip: &str, api_key: &str)
        -> Result<serde_json::Value, BridgeError>;

    /// `POST /api` asking for a new user
    async fn create_user(
        &self,
        bridge_ip: &str,
        device_type: &str,
    ) -> Result<Vec<BridgeReply>, BridgeError>;
}

/// Pairing transport backed by reqwest
#[derive(Debug, Default)]
pub struct HttpPairingTransport {
    http: reqwest::Client,
}

impl HttpPairingTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingTransport for HttpPairingTransport {
    async fn discover(&self, discovery_url: &str) -> Result<Vec<DiscoveredBridge>, BridgeError> {
        let body = self
            .http
            .get(discovery_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        decode(&body)
    }

    async fn probe(
        &self,
        bridge_ip: &str,
        api_key: &str,
    ) -> Result<serde_json::Value, BridgeError> {
        let url = format!("http://{}/api/{}", bridge_ip, api_key);
        let body = self.http.get(&url).send().await?.bytes().await?;
        serde_json::from_slice(&body).map_err(BridgeError::Malformed)
    }

    async fn create_user(
        &self,
        bridge_ip: &str,
        device_type: &str,
    ) -> Result<Vec<BridgeReply>, BridgeError> {
        let url = format!("http://{}/api", bridge_ip);
        let body = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "devicetype": device_type }))
            .send()
            .await?
            .bytes()
            .await?;
        serde_json::from_slice(&body).map_err(BridgeError::Malformed)
    }
}

/// How the link-button poll loop paces itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPolicy {
    /// Wait between two pairing requests
    pub interval: Duration,

    /// Stop after this many requests; `None` polls until the button is pressed
    pub max_attempts: Option<u32>,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

/// What the bridge said about a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Authorized,
    Unauthorized,
    /// Neither a light list nor an error came back
    Unknown,
}

/// Outcome of [`BridgePairing::establish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub credential: BridgeCredential,

    /// The credential differs from what was stored and must be persisted
    pub changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Bridge discovery failed: {0}")]
    Discovery(#[source] BridgeError),

    #[error("Discovery service returned no bridges")]
    NoBridgeFound,

    #[error("Bridge at {ip} unreachable: {source}")]
    Unreachable {
        ip: String,
        #[source]
        source: BridgeError,
    },

    #[error("Bridge refused pairing (error {kind}): {description}")]
    Rejected { kind: u16, description: String },

    #[error("Bridge sent a pairing reply without a username")]
    MissingUsername,

    #[error("Link button was not pressed within {0} attempts")]
    GaveUp(u32),
}

/// Drives discovery, key validation and pairing against one bridge
pub struct BridgePairing<T: PairingTransport> {
    transport: T,
    discovery_url: String,
    device_type: String,
    policy: PairingPolicy,
}

impl<T: PairingTransport> BridgePairing<T> {
    pub fn new(transport: T, config: &BridgeConfig) -> Self {
        Self {
            transport,
            discovery_url: config.discovery_url.clone(),
            device_type: config.device_type.clone(),
            policy: config.pairing_policy(),
        }
    }

    /// Produce a working credential from whatever was stored
    ///
    /// A stored key is only trusted together with a stored address; when the
    /// address has to be discovered the key is discarded.
    pub async fn establish(
        &self,
        stored_ip: Option<String>,
        stored_key: Option<String>,
    ) -> Result<Pairing, PairingError> {
        let (bridge_ip, stored_key, mut changed) = match stored_ip {
            Some(ip) => (ip, stored_key, false),
            None => (self.discover_bridge_address().await?, None, true),
        };

        let authorized_key = match stored_key {
            Some(key) if self.is_authorized(&bridge_ip, &key).await? => Some(key),
            _ => None,
        };

        let api_key = match authorized_key {
            Some(key) => key,
            None => {
                changed = true;
                self.pair_new_credential(&bridge_ip).await?
            }
        };

        Ok(Pairing {
            credential: BridgeCredential { bridge_ip, api_key },
            changed,
        })
    }

    /// Ask the discovery service for the bridge address; the first entry wins
    pub async fn discover_bridge_address(&self) -> Result<String, PairingError> {
        info!("Discovering bridge via {}", self.discovery_url);
        let bridges = self
            .transport
            .discover(&self.discovery_url)
            .await
            .map_err(PairingError::Discovery)?;

        let first = bridges.into_iter().next().ok_or(PairingError::NoBridgeFound)?;
        info!(
            "Found bridge {} at {}",
            first.id.as_deref().unwrap_or("<unnamed>"),
            first.internal_ip_address
        );
        Ok(first.internal_ip_address)
    }

    /// Whether the bridge accepts `api_key`
    pub async fn is_authorized(&self, bridge_ip: &str, api_key: &str) -> Result<bool, PairingError> {
        Ok(self.check_key(bridge_ip, api_key).await? == AuthStatus::Authorized)
    }

    pub async fn check_key(&self, bridge_ip: &str, api_key: &str) -> Result<AuthStatus, PairingError> {
        let response = self
            .transport
            .probe(bridge_ip, api_key)
            .await
            .map_err(|source| PairingError::Unreachable {
                ip: bridge_ip.to_string(),
                source,
            })?;

        let status = auth_status(&response);
        match status {
            AuthStatus::Authorized => info!("Connected to bridge at {}", bridge_ip),
            AuthStatus::Unauthorized => info!("Stored key rejected by bridge at {}", bridge_ip),
            AuthStatus::Unknown => warn!(
                "Bridge at {} returned neither lights nor an error: {}",
                bridge_ip, response
            ),
        }
        Ok(status)
    }

    /// Poll the bridge for a new key until the link button is pressed
    ///
    /// Any bridge error other than "link button not pressed" aborts pairing.
    pub async fn pair_new_credential(&self, bridge_ip: &str) -> Result<String, PairingError> {
        info!("Please press the link button on the bridge at {}", bridge_ip);

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let replies = self
                .transport
                .create_user(bridge_ip, &self.device_type)
                .await
                .map_err(|source| PairingError::Unreachable {
                    ip: bridge_ip.to_string(),
                    source,
                })?;

            match replies.into_iter().next() {
                Some(reply @ BridgeReply::Success(_)) => {
                    let username = reply.username().ok_or(PairingError::MissingUsername)?;
                    info!("Paired with bridge at {}", bridge_ip);
                    return Ok(username.to_string());
                }
                Some(BridgeReply::Error(e)) if e.kind == ERROR_LINK_BUTTON_NOT_PRESSED => {
                    debug!("Link button not pressed yet (attempt {})", attempts);
                }
                Some(BridgeReply::Error(e)) => {
                    return Err(PairingError::Rejected {
                        kind: e.kind,
                        description: e.description,
                    });
                }
                None => return Err(PairingError::MissingUsername),
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(PairingError::GaveUp(attempts));
                }
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }
}

fn auth_status(response: &serde_json::Value) -> AuthStatus {
    if response.get("lights").is_some() {
        return AuthStatus::Authorized;
    }
    match api_error(response) {
        Some(e) if e.kind == ERROR_UNAUTHORIZED_USER => AuthStatus::Unauthorized,
        _ => AuthStatus::Unknown,
    }
}
