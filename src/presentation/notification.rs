use super::{DriverContext, PresentationDriver, UiAction};
use crate::backend::BackendCommand;
use crate::machine::{Effect, NotificationState, StatusBarIconState};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Mute,
    Speaker,
}

/// Platform notification manager and status-bar icon slots.
pub trait NotificationPlatform: Send + Sync {
    fn notify(&self, state: &NotificationState);
    fn cancel(&self);
    fn show_icon(&self, icon: StatusIcon);
    fn remove_icon(&self, icon: StatusIcon);
}

/// Mirrors the machine's notification projection into the platform.
///
/// Only differences reach the platform: re-posting an identical
/// notification or re-showing a visible icon is a no-op.
pub struct NotificationDriver {
    platform: Arc<dyn NotificationPlatform>,
    posted: Option<NotificationState>,
    icons: StatusBarIconState,
}

impl NotificationDriver {
    pub fn new(platform: Arc<dyn NotificationPlatform>) -> Self {
        Self {
            platform,
            posted: None,
            icons: StatusBarIconState::default(),
        }
    }

    pub fn posted(&self) -> Option<&NotificationState> {
        self.posted.as_ref()
    }

    pub fn icons(&self) -> StatusBarIconState {
        self.icons
    }

    fn set_icon(&self, icon: StatusIcon, shown: bool, was_shown: bool) {
        match (shown, was_shown) {
            (true, false) => self.platform.show_icon(icon),
            (false, true) => self.platform.remove_icon(icon),
            _ => {}
        }
    }

    fn update_icons(&mut self, icons: StatusBarIconState) {
        self.set_icon(StatusIcon::Mute, icons.mute_icon_shown, self.icons.mute_icon_shown);
        self.set_icon(
            StatusIcon::Speaker,
            icons.speaker_icon_shown,
            self.icons.speaker_icon_shown,
        );
        self.icons = icons;
    }

    fn cancel(&mut self) {
        if self.posted.take().is_some() {
            self.platform.cancel();
        }
    }
}

impl PresentationDriver for NotificationDriver {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn apply(&mut self, effect: &Effect, _ctx: &DriverContext<'_>) {
        match effect {
            Effect::Notification(state) => {
                if self.posted.as_ref() == Some(state) {
                    return;
                }
                debug!(icon = ?state.icon, text = %state.content_text, "post notification");
                self.platform.notify(state);
                self.posted = Some(state.clone());
            }
            Effect::CancelNotification => self.cancel(),
            Effect::StatusIcons(icons) => self.update_icons(*icons),
            _ => {}
        }
    }

    fn on_action(&mut self, action: &UiAction, ctx: &DriverContext<'_>) {
        if *action == UiAction::NotificationEndCall {
            ctx.commands.send(BackendCommand::Hangup);
        }
    }

    fn on_detach(&mut self) {
        self.cancel();
        self.update_icons(StatusBarIconState::default());
    }
}
