//! # Call State Machine
//!
//! [`step`] is a pure transition function: given the current
//! [`MachineState`], one [`CallEvent`] and a [`StepContext`] (clock, cached
//! caller, device capabilities) it returns the next state and the ordered
//! list of [`Effect`]s for the presentation drivers.
//!
//! | Event | Flags | Screen |
//! |-------|-------|--------|
//! | IncomingRinging | ringing | Ringing |
//! | OutgoingAlerting | active | Dialing |
//! | Active | active, not ringing, not holding | Active |
//! | Held | holding, not active | OnHold |
//! | Disconnecting | unchanged | Disconnecting (Idle if no call left) |
//! | AllDisconnected | none | Idle |
//!
//! Every pair of (state, event) is accepted: the backend is authoritative.

use crate::event::{AudioRoute, CallEvent, CallerInfo, DisconnectCause};
use crate::policy::{power_mode_for, status_bar_for, PowerMode, StatusBarPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub mod notification;

pub use notification::{
    NotificationAction, NotificationIcon, NotificationPriority, NotificationState,
    StatusBarIconState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    #[default]
    Idle,
    Dialing,
    Ringing,
    Active,
    OnHold,
    Disconnecting,
    Disconnected,
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenState::Idle => write!(f, "idle"),
            ScreenState::Dialing => write!(f, "dialing"),
            ScreenState::Ringing => write!(f, "ringing"),
            ScreenState::Active => write!(f, "active"),
            ScreenState::OnHold => write!(f, "on_hold"),
            ScreenState::Disconnecting => write!(f, "disconnecting"),
            ScreenState::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags {
    pub has_ringing: bool,
    pub has_active: bool,
    pub has_holding: bool,
}

impl CallFlags {
    pub fn any(&self) -> bool {
        self.has_ringing || self.has_active || self.has_holding
    }
}

/// Attributes of the foreground call as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallDetails {
    pub has_background_call: bool,
    pub is_emergency: bool,
    pub is_voice_mail: bool,
    pub is_conference: bool,
}

/// Widget visibility for one screen state, before any overlay is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetSet {
    /// Call state banner text; `None` hides the banner.
    pub label: Option<&'static str>,
    pub primary_call_info: bool,
    pub elapsed_time: bool,
    pub in_call_controls: bool,
    pub incoming_widget: bool,
    pub photo_dimmed: bool,
    pub end_button_enabled: bool,
}

pub fn widgets_for(screen: ScreenState) -> WidgetSet {
    let base = WidgetSet {
        label: None,
        primary_call_info: true,
        elapsed_time: false,
        in_call_controls: true,
        incoming_widget: false,
        photo_dimmed: false,
        end_button_enabled: true,
    };
    match screen {
        ScreenState::Idle => WidgetSet {
            primary_call_info: false,
            in_call_controls: false,
            ..base
        },
        ScreenState::Dialing => WidgetSet {
            label: Some("DIALING"),
            ..base
        },
        ScreenState::Ringing => WidgetSet {
            label: Some("INCOMING CALL"),
            in_call_controls: false,
            incoming_widget: true,
            ..base
        },
        ScreenState::Active => WidgetSet {
            elapsed_time: true,
            ..base
        },
        ScreenState::OnHold => WidgetSet {
            label: Some("ON HOLD"),
            photo_dimmed: true,
            ..base
        },
        ScreenState::Disconnecting => WidgetSet {
            label: Some("HANG UP"),
            elapsed_time: true,
            ..base
        },
        ScreenState::Disconnected => WidgetSet {
            label: Some("CALL ENDED"),
            elapsed_time: true,
            end_button_enabled: false,
            ..base
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct MachineState {
    pub screen: ScreenState,
    pub flags: CallFlags,
    pub details: CallDetails,
    pub muted: bool,
    pub audio_route: AudioRoute,
    pub call_started_at: Option<DateTime<Utc>>,
    pub power_mode: PowerMode,
    pub notification: Option<NotificationState>,
    pub icons: StatusBarIconState,
}

/// Inputs to [`step`] that do not come from the event itself.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub now: DateTime<Utc>,
    /// Current caller-info cache snapshot.
    pub caller: Option<Arc<CallerInfo>>,
    pub proximity_sensor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Screen {
        screen: ScreenState,
        widgets: WidgetSet,
        details: CallDetails,
    },
    CallEnded {
        cause: DisconnectCause,
        widgets: WidgetSet,
    },
    PowerMode(PowerMode),
    StatusBar(StatusBarPolicy),
    StartPing,
    StopPing,
    /// `None` clears the cache.
    ForegroundCaller(Option<Arc<CallerInfo>>),
    BackgroundCaller(Arc<CallerInfo>),
    RequestCallerInfo,
    Mute(bool),
    AudioRoute(AudioRoute),
    ElapsedTime(String),
    Notification(NotificationState),
    CancelNotification,
    StatusIcons(StatusBarIconState),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub state: MachineState,
    pub effects: Vec<Effect>,
}

pub fn step(state: &MachineState, event: &CallEvent, ctx: &StepContext) -> Transition {
    let mut next = state.clone();
    let mut caller = ctx.caller.clone();
    let mut event_effects = Vec::new();
    let mut entered = None;
    let mut ended = None;
    let mut recompute = true;

    match event {
        CallEvent::IncomingRinging { .. } => {
            next.flags.has_ringing = true;
            entered = Some(ScreenState::Ringing);
        }
        CallEvent::OutgoingAlerting { .. } => {
            // the dialing call is the foreground call
            next.flags.has_active = true;
            entered = Some(ScreenState::Dialing);
        }
        CallEvent::Active {
            has_background_call,
            is_emergency,
            is_voice_mail,
            is_conference,
        } => {
            next.flags = CallFlags {
                has_ringing: false,
                has_active: true,
                has_holding: false,
            };
            next.details = CallDetails {
                has_background_call: *has_background_call,
                is_emergency: *is_emergency,
                is_voice_mail: *is_voice_mail,
                is_conference: *is_conference,
            };
            if next.call_started_at.is_none() {
                next.call_started_at = Some(ctx.now);
            }
            entered = Some(ScreenState::Active);
        }
        CallEvent::Held {
            is_voice_mail,
            is_conference,
        } => {
            next.flags.has_active = false;
            next.flags.has_holding = true;
            next.details.is_voice_mail = *is_voice_mail;
            next.details.is_conference = *is_conference;
            entered = Some(ScreenState::OnHold);
        }
        CallEvent::Disconnecting => {
            entered = Some(if next.flags.any() {
                ScreenState::Disconnecting
            } else {
                ScreenState::Idle
            });
        }
        CallEvent::AllDisconnected { cause } => {
            next.flags = CallFlags::default();
            next.details = CallDetails::default();
            next.muted = false;
            next.audio_route = AudioRoute::default();
            next.call_started_at = None;
            caller = None;
            ended = Some(*cause);
            entered = Some(ScreenState::Idle);
            event_effects.push(Effect::ForegroundCaller(None));
            // the next call starts from the backend's defaults
            if state.muted {
                event_effects.push(Effect::Mute(false));
            }
            if state.audio_route != AudioRoute::default() {
                event_effects.push(Effect::AudioRoute(AudioRoute::default()));
            }
        }
        CallEvent::MuteChanged { is_muted } => {
            next.muted = *is_muted;
            event_effects.push(Effect::Mute(*is_muted));
        }
        CallEvent::AudioRouteChanged { route } => {
            next.audio_route = *route;
            event_effects.push(Effect::AudioRoute(*route));
        }
        CallEvent::ElapsedTimeTick { text } => {
            recompute = false;
            event_effects.push(Effect::ElapsedTime(text.clone()));
        }
        CallEvent::ForegroundCallerInfoUpdated { info } => {
            caller = Some(info.clone());
            event_effects.push(Effect::ForegroundCaller(Some(info.clone())));
        }
        CallEvent::BackgroundCallerInfoUpdated { info } => {
            recompute = false;
            event_effects.push(Effect::BackgroundCaller(info.clone()));
        }
    }

    let mut effects = Vec::new();
    if let Some(screen) = entered {
        next.screen = screen;
        next.power_mode = power_mode_for(screen);
        match ended {
            Some(cause) => effects.push(Effect::CallEnded {
                cause,
                widgets: widgets_for(ScreenState::Disconnected),
            }),
            None => effects.push(Effect::Screen {
                screen,
                widgets: widgets_for(screen),
                details: next.details,
            }),
        }
        effects.push(Effect::PowerMode(next.power_mode));
        if let Some(policy) = status_bar_for(screen, ctx.proximity_sensor) {
            effects.push(Effect::StatusBar(policy));
        }
        if screen == ScreenState::Ringing && state.screen != ScreenState::Ringing {
            effects.push(Effect::StartPing);
        } else if screen != ScreenState::Ringing && state.screen == ScreenState::Ringing {
            effects.push(Effect::StopPing);
        }
    }
    effects.extend(event_effects);

    if recompute {
        if next.screen == ScreenState::Idle {
            next.notification = None;
            effects.push(Effect::CancelNotification);
        } else {
            if caller.is_none() {
                effects.push(Effect::RequestCallerInfo);
            }
            let composed = notification::compose(&next, caller.as_deref());
            next.notification = Some(composed.clone());
            effects.push(Effect::Notification(composed));
        }
        next.icons = notification::icons_for(&next);
        effects.push(Effect::StatusIcons(next.icons));
    }

    Transition {
        state: next,
        effects,
    }
}
