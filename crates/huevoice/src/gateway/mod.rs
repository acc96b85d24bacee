//! Hermes session gateway.
//!
//! Subscribes to the dialogue engine's intent topics, hands every intent to
//! the [`CommandProcessor`] and ends the originating session with the
//! resulting feedback. Intents are processed one at a time, in arrival order.

mod client;

pub use client::MqttClient;
pub use client::MqttMessage;
pub use client::RumqttcClient;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::bridge::HueBridge;
use crate::intent::Intent;
use crate::processor::CommandProcessor;
use crate::processor::Feedback;

/// Every intent recognised by the dialogue engine
pub const INTENT_TOPIC: &str = "hermes/intent/#";

/// Where sessions are terminated
pub const END_SESSION_TOPIC: &str = "hermes/dialogueManager/endSession";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("MQTT client not connected. Call connect() first.")]
    NotConnected,

    #[error("MQTT request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Failed to encode endSession: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Body of `hermes/dialogueManager/endSession`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndSession<'a> {
    session_id: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

pub struct SessionGateway<C: MqttClient, B: HueBridge> {
    client: C,
    processor: CommandProcessor<B>,
}

impl<C: MqttClient, B: HueBridge> SessionGateway<C, B> {
    pub fn new(client: C, processor: CommandProcessor<B>) -> Self {
        Self { client, processor }
    }

    /// Connect to the broker and subscribe to intents
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        self.client.connect().await?;
        info!("Subscribing to {}", INTENT_TOPIC);
        self.client.subscribe(INTENT_TOPIC).await
    }

    /// Handle intents until the connection ends
    pub async fn run(&mut self) -> Result<(), GatewayError> {
        while let Some(msg) = self.client.poll_message().await {
            self.handle_message(&msg).await?;
        }
        info!("Intent stream closed");
        Ok(())
    }

    /// Process one bus message
    ///
    /// Malformed payloads and foreign intents are skipped without ending a
    /// session; only publishing the feedback can fail.
    pub async fn handle_message(&mut self, msg: &MqttMessage) -> Result<(), GatewayError> {
        let intent = match Intent::from_hermes(&msg.payload) {
            Ok(Some(intent)) => intent,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Dropping message on {}: {}", msg.topic, e);
                return Ok(());
            }
        };

        let feedback = self.processor.handle(&intent).await;
        self.end_session(&intent.session_id, feedback).await
    }

    async fn end_session(&mut self, session_id: &str, feedback: Feedback) -> Result<(), GatewayError> {
        let payload = serde_json::to_vec(&EndSession {
            session_id,
            text: feedback.text(),
        })?;
        debug!("Ending session {} with {:?}", session_id, feedback);
        self.client.publish(END_SESSION_TOPIC, &payload).await
    }

    pub fn processor(&self) -> &CommandProcessor<B> {
        &self.processor
    }
}
