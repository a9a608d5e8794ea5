use super::{CallFlags, MachineState, ScreenState};
use crate::event::{AudioRoute, CallerInfo};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationIcon {
    Ringing,
    OnHold,
    InCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationPriority {
    Default,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    EndCall,
}

/// Everything the platform needs to draw the in-call notification.
/// Rebuilt from scratch on every relevant event.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationState {
    pub icon: NotificationIcon,
    pub title: String,
    pub content_text: String,
    pub ticker: Option<String>,
    pub priority: NotificationPriority,
    pub actions: Vec<NotificationAction>,
    pub chronometer_start: Option<DateTime<Utc>>,
    pub large_icon: Option<Arc<Vec<u8>>>,
    pub ongoing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusBarIconState {
    pub mute_icon_shown: bool,
    pub speaker_icon_shown: bool,
}

pub const TEXT_INCOMING_CALL: &str = "Incoming call";
pub const TEXT_ON_HOLD: &str = "On hold";
pub const TEXT_DIALING: &str = "Dialing";
pub const TEXT_ONGOING_CALL: &str = "Ongoing call";

/// Ringing dominates holding-only, which dominates the default in-call icon.
pub fn icon_for(flags: &CallFlags) -> NotificationIcon {
    if flags.has_ringing {
        NotificationIcon::Ringing
    } else if flags.has_holding && !flags.has_active {
        NotificationIcon::OnHold
    } else {
        NotificationIcon::InCall
    }
}

pub fn compose(state: &MachineState, caller: Option<&CallerInfo>) -> NotificationState {
    let label = caller.and_then(|c| c.label());
    let title = label.unwrap_or_default().to_string();
    let large_icon = caller.and_then(|c| c.photo.clone());
    let icon = icon_for(&state.flags);

    match icon {
        NotificationIcon::Ringing => NotificationState {
            icon,
            ticker: label.map(str::to_string),
            title,
            content_text: TEXT_INCOMING_CALL.to_string(),
            priority: NotificationPriority::High,
            actions: vec![],
            chronometer_start: None,
            large_icon,
            ongoing: true,
        },
        NotificationIcon::OnHold => NotificationState {
            icon,
            title,
            content_text: TEXT_ON_HOLD.to_string(),
            ticker: None,
            priority: NotificationPriority::High,
            actions: vec![],
            chronometer_start: None,
            large_icon,
            ongoing: true,
        },
        NotificationIcon::InCall => {
            let content_text = if state.screen == ScreenState::Dialing {
                TEXT_DIALING
            } else {
                TEXT_ONGOING_CALL
            };
            NotificationState {
                icon,
                title,
                content_text: content_text.to_string(),
                ticker: None,
                priority: NotificationPriority::High,
                actions: vec![NotificationAction::EndCall],
                chronometer_start: state.call_started_at,
                large_icon,
                ongoing: true,
            }
        }
    }
}

pub fn icons_for(state: &MachineState) -> StatusBarIconState {
    let in_call = state.screen != ScreenState::Idle;
    StatusBarIconState {
        mute_icon_shown: in_call && state.muted,
        speaker_icon_shown: in_call && state.audio_route == AudioRoute::Speaker,
    }
}
