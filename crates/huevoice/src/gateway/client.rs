use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use super::GatewayError;
use crate::config::MqttConfig;

/// Message received on a subscribed topic
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Trait for the bus operations the gateway needs
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), GatewayError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), GatewayError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), GatewayError>;

    /// Wait for the next message from subscribed topics
    ///
    /// Returns None once the connection is gone for good
    async fn poll_message(&mut self) -> Option<MqttMessage>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub messages: std::collections::VecDeque<MqttMessage>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub is_connected: bool,
}

#[cfg(test)]
impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for delivery
    pub fn add_message(&mut self, topic: &str, payload: &[u8]) {
        self.messages.push_back(MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), GatewayError> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), GatewayError> {
        if !self.is_connected {
            return Err(GatewayError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), GatewayError> {
        if !self.is_connected {
            return Err(GatewayError::NotConnected);
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        self.messages.pop_front()
    }
}

/// MQTT client backed by rumqttc
pub struct RumqttcClient {
    /// Connection options (kept until connect())
    mqtt_options: MqttOptions,

    client: Option<AsyncClient>,

    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,

    /// Topics to restore after the broker drops the session
    topics: Arc<Mutex<Vec<String>>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            message_rx: None,
            topics: Arc::default(),
            event_loop_task: None,
        }
    }

    fn connected(&self) -> Result<&AsyncClient, GatewayError> {
        self.client.as_ref().ok_or(GatewayError::NotConnected)
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), GatewayError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let resubscriber = client.clone();
        let topics = self.topics.clone();

        // rumqttc reconnects on the next poll after an error; with a clean
        // session the subscriptions have to be sent again on every ConnAck.
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        let restore = topics.lock().map(|t| t.clone()).unwrap_or_default();
                        for topic in restore {
                            if let Err(e) = resubscriber.try_subscribe(&topic, QoS::AtLeastOnce) {
                                warn!("Failed to resubscribe to {}: {}", topic, e);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), GatewayError> {
        self.connected()?
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(GatewayError::Client)?;

        if let Ok(mut topics) = self.topics.lock() {
            topics.push(topic.to_string());
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), GatewayError> {
        self.connected()?
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(GatewayError::Client)
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
