//! Intent dispatch: room resolution, brightness math and bridge writes.

use tracing::error;
use tracing::info;

use crate::bridge::BridgeError;
use crate::bridge::GroupSnapshot;
use crate::bridge::GroupState;
use crate::bridge::HueBridge;
use crate::bridge::SceneSnapshot;
use crate::brightness;
use crate::brightness::Shift;
use crate::intent::Intent;
use crate::intent::IntentKind;
use crate::intent::PERCENT_SLOT;
use crate::intent::ROOM_SLOT;
use crate::intent::SCENE_SLOT;
use crate::resolver::Catalog;
use crate::resolver::EntityResolver;

/// How a dialogue session is closed after an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// Handled; the session ends silently
    Done,
    NoRoom,
    NoScene,
    Failed,
}

impl Feedback {
    /// Text spoken back to the user, `None` for silent success
    pub fn text(&self) -> Option<&'static str> {
        match self {
            Feedback::Done => None,
            Feedback::NoRoom => Some("Sorry, no fitting room was detected."),
            Feedback::NoScene => Some("Sorry, no matching scene found."),
            Feedback::Failed => Some("Unknown exception detected. Please consult log files."),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No room matched {0:?}")]
    RoomNotFound(Option<String>),

    #[error("No scene in room {room} matched {spoken:?}")]
    SceneNotFound { room: String, spoken: Option<String> },

    #[error("Intent {0} needs a {1} slot")]
    MissingSlot(IntentKind, &'static str),

    #[error("Current brightness of room {0} is unavailable")]
    BrightnessUnavailable(String),
}

impl From<&CommandError> for Feedback {
    fn from(e: &CommandError) -> Self {
        match e {
            CommandError::RoomNotFound(_) => Feedback::NoRoom,
            CommandError::SceneNotFound { .. } => Feedback::NoScene,
            _ => Feedback::Failed,
        }
    }
}

/// The room an intent targets
struct Room<'a> {
    name: &'a str,
    id: &'a str,
}

/// Turns intents into bridge commands
///
/// Holds the room and scene snapshots taken at construction; they are not
/// refreshed while the processor lives.
pub struct CommandProcessor<B: HueBridge> {
    bridge: B,
    rooms: Catalog,
    scenes: SceneSnapshot,
    resolver: EntityResolver,
}

impl<B: HueBridge> CommandProcessor<B> {
    /// Fetch the group and scene snapshots and build the room catalog
    pub async fn new(bridge: B) -> Result<Self, BridgeError> {
        let groups = bridge.fetch_groups().await?;
        let scenes = bridge.fetch_scenes().await?;
        Ok(Self::with_snapshots(bridge, &groups, scenes))
    }

    pub fn with_snapshots(bridge: B, groups: &GroupSnapshot, scenes: SceneSnapshot) -> Self {
        let rooms = groups.rooms();
        info!(
            "Loaded {} rooms and {} scenes from the bridge",
            rooms.len(),
            scenes.scenes.len()
        );
        Self {
            bridge,
            rooms,
            scenes,
            resolver: EntityResolver::default(),
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn rooms(&self) -> &Catalog {
        &self.rooms
    }

    /// Handle one intent to completion
    ///
    /// Never fails: every error is logged and mapped to the feedback that
    /// closes the session.
    pub async fn handle(&self, intent: &Intent) -> Feedback {
        info!(
            "Received {} from site {} (session {})",
            intent.kind,
            intent.site_id.as_deref().unwrap_or("default"),
            intent.session_id
        );

        match self.dispatch(intent).await {
            Ok(()) => Feedback::Done,
            Err(e) => {
                let feedback = Feedback::from(&e);
                if feedback == Feedback::Failed {
                    error!("Failed to handle {}: {}", intent.kind, e);
                } else {
                    info!("{}", e);
                }
                feedback
            }
        }
    }

    async fn dispatch(&self, intent: &Intent) -> Result<(), CommandError> {
        let room = self.resolve_room(intent)?;

        match intent.kind {
            IntentKind::TurnOn => {
                info!("Turning on lights in room {}", room.name);
                self.bridge
                    .set_group_state(room.id, &GroupState::power(true))
                    .await;
            }
            IntentKind::TurnOff => {
                info!("Turning off lights in room {}", room.name);
                self.bridge
                    .set_group_state(room.id, &GroupState::power(false))
                    .await;
            }
            IntentKind::SetBrightness => {
                let percent = intent
                    .number(PERCENT_SLOT)
                    .ok_or(CommandError::MissingSlot(intent.kind, PERCENT_SLOT))?;
                let percent = brightness::clamp_percent(percent);
                info!("Setting brightness to {}% in room {}", percent, room.name);

                let bri = brightness::percent_to_bridge_scale(percent);
                self.bridge
                    .set_group_state(room.id, &GroupState::brightness(bri))
                    .await;
            }
            IntentKind::SetScene => {
                let scenes = self.scenes.scenes_for_room(room.id);
                let spoken = intent.text(SCENE_SLOT);
                let scene = spoken
                    .and_then(|s| self.resolver.resolve(s, &scenes))
                    .ok_or_else(|| CommandError::SceneNotFound {
                        room: room.name.to_string(),
                        spoken: spoken.map(str::to_string),
                    })?;

                info!("Setting scene {} in room {}", scene.name, room.name);
                self.bridge
                    .set_group_state(room.id, &GroupState::scene(scene.id))
                    .await;
            }
            IntentKind::ShiftUp => self.shift(intent, &room, Shift::Up).await?,
            IntentKind::ShiftDown => self.shift(intent, &room, Shift::Down).await?,
        }

        Ok(())
    }

    fn resolve_room(&self, intent: &Intent) -> Result<Room<'_>, CommandError> {
        let spoken = intent.text(ROOM_SLOT);
        let found = spoken
            .and_then(|s| self.resolver.resolve(s, &self.rooms))
            .ok_or_else(|| CommandError::RoomNotFound(spoken.map(str::to_string)))?;
        Ok(Room {
            name: found.name,
            id: found.id,
        })
    }

    async fn shift(&self, intent: &Intent, room: &Room<'_>, shift: Shift) -> Result<(), CommandError> {
        let percent = brightness::clamp_percent(
            intent
                .number(PERCENT_SLOT)
                .unwrap_or(brightness::DEFAULT_SHIFT_PERCENT),
        );
        info!(
            "Shifting {} by {}% in room {}",
            if shift == Shift::Up { "up" } else { "down" },
            percent,
            room.name
        );

        let current = self
            .bridge
            .get_group_status(room.id)
            .await
            .and_then(|status| status.action.bri)
            .ok_or_else(|| CommandError::BrightnessUnavailable(room.name.to_string()))?;

        let bri = brightness::shifted_brightness(current, percent, shift);
        self.bridge
            .set_group_state(room.id, &GroupState::brightness(bri))
            .await;
        Ok(())
    }
}
