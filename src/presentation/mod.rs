//! Presentation drivers.
//!
//! A driver receives the ordered [`Effect`] list of every transition and
//! pushes it into its sink. Two drivers exist: [`ScreenDriver`] for the
//! foreground call screen and [`NotificationDriver`] for the status-bar
//! notification. Drivers run on their controller's consumer loop only, so
//! they hold plain mutable state.

use crate::backend::CommandRelay;
use crate::config::TimingConfig;
use crate::dispatch::{Dispatcher, TimerKind};
use crate::machine::Effect;
use serde::Deserialize;

pub mod notification;
pub mod screen;

pub use notification::{NotificationDriver, NotificationPlatform, StatusIcon};
pub use screen::{ScreenDriver, ScreenRenderer, ScreenView};

/// A user interaction coming from the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiAction {
    Answer,
    /// Reject the ringing call and close the screen.
    Decline,
    EndCall,
    ToggleMute,
    ToggleHold,
    ToggleSpeaker,
    ToggleKeypad,
    StartDtmf(char),
    StopDtmf,
    /// The screen was resumed (`true`) or paused (`false`).
    Foreground(bool),
    /// End-call button on the notification.
    NotificationEndCall,
}

/// Handles a driver may use while reacting to an effect, timer or action.
pub struct DriverContext<'a> {
    pub dispatcher: &'a Dispatcher,
    pub commands: &'a CommandRelay,
    pub timing: &'a TimingConfig,
}

pub trait PresentationDriver: Send + 'static {
    fn name(&self) -> &'static str;

    /// Called once per session before the first message is delivered.
    fn on_attach(&mut self, _ctx: &DriverContext<'_>) {}

    fn apply(&mut self, effect: &Effect, ctx: &DriverContext<'_>);

    fn on_timer(&mut self, _timer: TimerKind, _ctx: &DriverContext<'_>) {}

    fn on_action(&mut self, action: &UiAction, ctx: &DriverContext<'_>);

    /// Called after every delivered message, once all its effects are applied.
    fn flush(&mut self) {}

    /// Called when the session ends. The driver outlives the session and may
    /// be attached again.
    fn on_detach(&mut self);
}
