use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Privacy flag attached to a caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    #[default]
    Allowed,
    Restricted,
    Payphone,
    Unknown,
}

/// Snapshot of a caller identity as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerInfo {
    pub name: Option<String>,
    pub number: Option<String>,
    pub number_type: Option<String>,
    /// Encoded image bytes, opaque to this crate.
    #[serde(skip)]
    pub photo: Option<Arc<Vec<u8>>>,
    pub presentation: Presentation,
}

impl CallerInfo {
    /// Name if known, otherwise the number.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.number.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    Speaker,
    Bluetooth,
    #[default]
    Earpiece,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectCause {
    #[default]
    Normal,
    Local,
    Busy,
    Congestion,
    Unreachable,
    IncomingMissed,
    IncomingRejected,
    Unknown,
}

/// Lifecycle state broadcast by the telephony service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Started but handling no calls.
    Idle,
    Active,
    Stopped,
}

/// CallEvent is the normalized form of a single backend notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    IncomingRinging {
        is_waiting: bool,
    },
    OutgoingAlerting {
        is_alerting: bool,
    },
    Active {
        has_background_call: bool,
        is_emergency: bool,
        is_voice_mail: bool,
        is_conference: bool,
    },
    Held {
        is_voice_mail: bool,
        is_conference: bool,
    },
    Disconnecting,
    AllDisconnected {
        cause: DisconnectCause,
    },
    MuteChanged {
        is_muted: bool,
    },
    AudioRouteChanged {
        route: AudioRoute,
    },
    ElapsedTimeTick {
        text: String,
    },
    ForegroundCallerInfoUpdated {
        info: Arc<CallerInfo>,
    },
    BackgroundCallerInfoUpdated {
        info: Arc<CallerInfo>,
    },
}

/// Discriminant of [`CallEvent`], used to key cancellation in the dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    IncomingRinging,
    OutgoingAlerting,
    Active,
    Held,
    Disconnecting,
    AllDisconnected,
    MuteChanged,
    AudioRouteChanged,
    ElapsedTimeTick,
    ForegroundCallerInfoUpdated,
    BackgroundCallerInfoUpdated,
}

impl CallEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CallEvent::IncomingRinging { .. } => EventKind::IncomingRinging,
            CallEvent::OutgoingAlerting { .. } => EventKind::OutgoingAlerting,
            CallEvent::Active { .. } => EventKind::Active,
            CallEvent::Held { .. } => EventKind::Held,
            CallEvent::Disconnecting => EventKind::Disconnecting,
            CallEvent::AllDisconnected { .. } => EventKind::AllDisconnected,
            CallEvent::MuteChanged { .. } => EventKind::MuteChanged,
            CallEvent::AudioRouteChanged { .. } => EventKind::AudioRouteChanged,
            CallEvent::ElapsedTimeTick { .. } => EventKind::ElapsedTimeTick,
            CallEvent::ForegroundCallerInfoUpdated { .. } => EventKind::ForegroundCallerInfoUpdated,
            CallEvent::BackgroundCallerInfoUpdated { .. } => EventKind::BackgroundCallerInfoUpdated,
        }
    }
}

impl EventKind {
    /// Kinds that move the screen state. A later one of these supersedes a
    /// pending debounced Active.
    pub fn is_call_state(&self) -> bool {
        matches!(
            self,
            EventKind::IncomingRinging
                | EventKind::OutgoingAlerting
                | EventKind::Active
                | EventKind::Held
                | EventKind::Disconnecting
                | EventKind::AllDisconnected
        )
    }
}
