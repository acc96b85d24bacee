//! Lighting bridge access: REST client, wire model and pairing.

mod client;
mod model;
mod pairing;

pub use client::HttpBridge;
pub use client::HueBridge;
#[cfg(test)]
pub(crate) use client::MockBridge;
pub use model::ApiError;
pub use model::BridgeCredential;
pub use model::BridgeReply;
pub use model::DiscoveredBridge;
pub use model::GroupAction;
pub use model::GroupSnapshot;
pub use model::GroupState;
pub use model::GroupStatus;
pub use model::SceneSnapshot;
pub use model::ERROR_LINK_BUTTON_NOT_PRESSED;
pub use model::ERROR_UNAUTHORIZED_USER;
pub use pairing::AuthStatus;
pub use pairing::BridgePairing;
pub use pairing::HttpPairingTransport;
pub use pairing::Pairing;
pub use pairing::PairingError;
pub use pairing::PairingPolicy;
pub use pairing::PairingTransport;

/// Failure talking to the bridge or a discovery endpoint
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Bridge returned error {} at {}: {}", .0.kind, .0.address.as_deref().unwrap_or("-"), .0.description)]
    Api(ApiError),
}
