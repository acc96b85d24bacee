use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use super::model::ApiError;
use super::model::BridgeCredential;
use super::model::BridgeReply;
use super::model::GroupSnapshot;
use super::model::GroupState;
use super::model::GroupStatus;
use super::model::SceneSnapshot;
use super::BridgeError;

/// Trait for the bridge operations the command pipeline needs
///
/// This trait allows for mocking the bridge for testing purposes
#[async_trait]
pub trait HueBridge: Send + Sync {
    /// Fetch every group (room/zone) known to the bridge
    async fn fetch_groups(&self) -> Result<GroupSnapshot, BridgeError>;

    /// Fetch every stored scene
    async fn fetch_scenes(&self) -> Result<SceneSnapshot, BridgeError>;

    /// Apply a state change to a group
    ///
    /// Best effort: delivery failures are logged and never reported back.
    async fn set_group_state(&self, group_id: &str, state: &GroupState);

    /// Query the current status of a group, `None` if it cannot be read
    async fn get_group_status(&self, group_id: &str) -> Option<GroupStatus>;
}

/// Bridge client talking to the REST API over HTTP
pub struct HttpBridge {
    http: reqwest::Client,

    /// `http://<ip>/api/<key>`
    base_url: String,
}

impl HttpBridge {
    pub fn new(credential: &BridgeCredential) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!(
                "http://{}/api/{}",
                credential.bridge_ip, credential.api_key
            ),
        }
    }

    fn groups_url(&self) -> String {
        format!("{}/groups", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, BridgeError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        decode(&body)
    }

    async fn put_group_state(
        &self,
        group_id: &str,
        state: &GroupState,
    ) -> Result<Vec<BridgeReply>, BridgeError> {
        let url = format!("{}/{}/action", self.groups_url(), group_id);
        let response = self
            .http
            .put(&url)
            .json(state)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(BridgeError::Malformed)
    }
}

#[async_trait]
impl HueBridge for HttpBridge {
    async fn fetch_groups(&self) -> Result<GroupSnapshot, BridgeError> {
        self.get_json(&self.groups_url()).await
    }

    async fn fetch_scenes(&self) -> Result<SceneSnapshot, BridgeError> {
        self.get_json(&format!("{}/scenes", self.base_url)).await
    }

    async fn set_group_state(&self, group_id: &str, state: &GroupState) {
        debug!("Setting state for group {}: {:?}", group_id, state);

        match self.put_group_state(group_id, state).await {
            Ok(replies) => {
                for reply in replies {
                    match reply {
                        BridgeReply::Success(value) => debug!("Bridge accepted {}", value),
                        BridgeReply::Error(e) => warn!(
                            "Bridge rejected update of group {} ({}): {}",
                            group_id, e.kind, e.description
                        ),
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to update group {}: {}. Is the bridge reachable?",
                    group_id, e
                );
            }
        }
    }

    async fn get_group_status(&self, group_id: &str) -> Option<GroupStatus> {
        let url = format!("{}/{}/", self.groups_url(), group_id);
        match self.get_json(&url).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(
                    "Failed to read status of group {}: {}. Is the bridge reachable?",
                    group_id, e
                );
                None
            }
        }
    }
}

/// Parse a bridge response body into `T`
///
/// The bridge reports failures on GET endpoints as a `[{"error": ...}]`
/// array with status 200, so that shape is turned into `BridgeError::Api`.
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, BridgeError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(BridgeError::Malformed)?;

    if let Some(e) = api_error(&value) {
        return Err(BridgeError::Api(e));
    }

    serde_json::from_value(value).map_err(BridgeError::Malformed)
}

/// The leading error entry of a reply array, if that is what `value` is
pub(crate) fn api_error(value: &serde_json::Value) -> Option<ApiError> {
    let first = value.as_array()?.first()?;
    match serde_json::from_value::<BridgeReply>(first.clone()).ok()? {
        BridgeReply::Error(e) => Some(e),
        BridgeReply::Success(_) => None,
    }
}

/// Mock bridge for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockBridge {
    pub groups: GroupSnapshot,
    pub scenes: SceneSnapshot,
    pub statuses: std::collections::HashMap<String, GroupStatus>,
    pub writes: std::sync::Mutex<Vec<(String, GroupState)>>,
}

#[cfg(test)]
impl MockBridge {
    /// Build a mock from raw `GET /groups` and `GET /scenes` bodies
    pub fn from_json(groups: &str, scenes: &str) -> Self {
        Self {
            groups: serde_json::from_str(groups).unwrap(),
            scenes: serde_json::from_str(scenes).unwrap(),
            ..Self::default()
        }
    }

    /// Report the given brightness for a group
    pub fn with_brightness(mut self, group_id: &str, bri: u8) -> Self {
        self.statuses.insert(
            group_id.to_string(),
            GroupStatus {
                action: super::model::GroupAction {
                    on: Some(true),
                    bri: Some(bri),
                },
            },
        );
        self
    }

    pub fn writes(&self) -> Vec<(String, GroupState)> {
        self.writes.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl HueBridge for MockBridge {
    async fn fetch_groups(&self) -> Result<GroupSnapshot, BridgeError> {
        Ok(self.groups.clone())
    }

    async fn fetch_scenes(&self) -> Result<SceneSnapshot, BridgeError> {
        Ok(self.scenes.clone())
    }

    async fn set_group_state(&self, group_id: &str, state: &GroupState) {
        self.writes
            .lock()
            .unwrap()
            .push((group_id.to_string(), state.clone()));
    }

    async fn get_group_status(&self, group_id: &str) -> Option<GroupStatus> {
        self.statuses.get(group_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::net::TcpStream;

    use super::*;
    use crate::bridge::model::ERROR_UNAUTHORIZED_USER;
    use crate::intent::Intent;
    use crate::intent::IntentKind;
    use crate::intent::ROOM_SLOT;
    use crate::processor::CommandProcessor;
    use crate::processor::Feedback;

    /// Local HTTP endpoint answering every request with `response`
    async fn serve(response: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (addr, hits)
    }

    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn bridge_at(addr: &str) -> HttpBridge {
        HttpBridge::new(&BridgeCredential {
            bridge_ip: addr.to_string(),
            api_key: "key".to_string(),
        })
    }

    /// Address nothing is listening on
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_swallowed() {
        let bridge = bridge_at(&closed_port().await);

        bridge.set_group_state("1", &GroupState::power(true)).await;
        assert!(bridge.get_group_status("1").await.is_none());
        assert!(matches!(bridge.fetch_groups().await, Err(BridgeError::Http(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_swallowed() {
        let (addr, hits) = serve(http_response("500 Internal Server Error", "")).await;
        let bridge = bridge_at(&addr);

        bridge.set_group_state("1", &GroupState::brightness(127)).await;
        assert!(bridge.get_group_status("1").await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_garbage_body_is_swallowed() {
        let (addr, hits) = serve(http_response("200 OK", "not json!")).await;
        let bridge = bridge_at(&addr);

        bridge.set_group_state("1", &GroupState::power(false)).await;
        assert!(bridge.get_group_status("1").await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_entries_are_swallowed() {
        let body = r#"[{"success": {"/groups/1/action/on": true}}, {"error": {"type": 201, "address": "/groups/1/action/bri", "description": "parameter, bri, is not modifiable. Device is set to off."}}]"#;
        let (addr, hits) = serve(http_response("200 OK", body)).await;
        let bridge = bridge_at(&addr);

        bridge.set_group_state("1", &GroupState::brightness(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_group_status_over_http() {
        let body = r#"{"name": "Kitchen", "action": {"on": true, "bri": 200, "hue": 8418}}"#;
        let (addr, _) = serve(http_response("200 OK", body)).await;

        let status = bridge_at(&addr).get_group_status("2").await.unwrap();
        assert_eq!(status.action.bri, Some(200));
    }

    #[tokio::test]
    async fn test_handle_survives_failing_bridge() {
        let (addr, hits) = serve(http_response("500 Internal Server Error", "")).await;
        let groups: GroupSnapshot = serde_json::from_str(r#"{"2": {"name": "Kitchen"}}"#).unwrap();
        let processor =
            CommandProcessor::with_snapshots(bridge_at(&addr), &groups, SceneSnapshot::default());

        let turn_on = Intent::new(IntentKind::TurnOn, "s").with_text(ROOM_SLOT, "kitchen");
        assert_eq!(processor.handle(&turn_on).await, Feedback::Done);

        let shift = Intent::new(IntentKind::ShiftUp, "s").with_text(ROOM_SLOT, "kitchen");
        assert_eq!(processor.handle(&shift).await, Feedback::Failed);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decode_groups() {
        let groups: GroupSnapshot =
            decode(br#"{"1": {"name": "Office", "lights": ["7"]}}"#).unwrap();
        assert_eq!(groups.groups["1"].name, "Office");
    }

    #[test]
    fn test_decode_error_array() {
        let body = br#"[{"error": {"type": 1, "address": "/groups", "description": "unauthorized user"}}]"#;
        match decode::<GroupSnapshot>(body) {
            Err(BridgeError::Api(e)) => assert_eq!(e.kind, ERROR_UNAUTHORIZED_USER),
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_array_before_struct() {
        let body = br#"[{"error": {"type": 3, "address": "/groups/9/", "description": "resource, /groups/9/, not available"}}]"#;
        assert!(matches!(
            decode::<GroupStatus>(body),
            Err(BridgeError::Api(ApiError { kind: 3, .. }))
        ));
    }

    #[test]
    fn test_api_error_ignores_success() {
        let value = serde_json::json!([{"success": {"/groups/1/action/on": true}}]);
        assert!(api_error(&value).is_none());
        assert!(api_error(&serde_json::json!({"lights": {}})).is_none());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode::<GroupStatus>(b"<html>nope</html>"),
            Err(BridgeError::Malformed(_))
        ));
        assert!(matches!(
            decode::<GroupStatus>(br#"{"action": {"bri": "high"}}"#),
            Err(BridgeError::Malformed(_))
        ));
    }

    #[test]
    fn test_http_bridge_urls() {
        let bridge = HttpBridge::new(&BridgeCredential {
            bridge_ip: "192.168.1.20".to_string(),
            api_key: "key".to_string(),
        });
        assert_eq!(bridge.groups_url(), "http://192.168.1.20/api/key/groups");
    }
}
