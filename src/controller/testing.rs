//! Test harness for the controllers.
//!
//! [`TestStack`] assembles an [`InCallUi`] over a [`ScriptedBackend`] with
//! recording sinks, so tests can inject backend events and inspect what each
//! platform surface was asked to do (with issue counts).
//!
//! ```rust,ignore
//! let stack = TestStack::attached().await;
//! stack.emit(CallEvent::IncomingRinging { is_waiting: false }).await;
//! assert_eq!(stack.notifications.notify_count(), 1);
//! ```

use super::InCallUi;
use crate::config::Config;
use crate::event::CallEvent;
use crate::event::ServiceState;
use crate::machine::NotificationState;
use crate::policy::{DisableFlags, PowerPlatform, StatusBarPlatform, WakeLockLevel};
use crate::presentation::{
    NotificationDriver, NotificationPlatform, ScreenDriver, ScreenRenderer, ScreenView, StatusIcon,
};
use crate::simulator::ScriptedBackend;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct RecordingScreen {
    pub renders: Mutex<Vec<ScreenView>>,
    pub pings: Mutex<usize>,
    pub dismissals: Mutex<usize>,
}

impl RecordingScreen {
    pub fn last(&self) -> Option<ScreenView> {
        self.renders.lock().unwrap().last().cloned()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn ping_count(&self) -> usize {
        *self.pings.lock().unwrap()
    }

    pub fn dismiss_count(&self) -> usize {
        *self.dismissals.lock().unwrap()
    }
}

impl ScreenRenderer for RecordingScreen {
    fn render(&self, view: &ScreenView) {
        self.renders.lock().unwrap().push(view.clone());
    }

    fn ping_incoming(&self) {
        *self.pings.lock().unwrap() += 1;
    }

    fn dismiss(&self) {
        *self.dismissals.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingPower {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingPower {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Lock level currently held according to the recorded calls.
    pub fn held(&self) -> Option<WakeLockLevel> {
        let mut held = None;
        for call in self.calls.lock().unwrap().iter() {
            match call.as_str() {
                "acquire Full" => held = Some(WakeLockLevel::Full),
                "acquire Partial" => held = Some(WakeLockLevel::Partial),
                "release Full" if held == Some(WakeLockLevel::Full) => held = None,
                "release Partial" if held == Some(WakeLockLevel::Partial) => held = None,
                _ => {}
            }
        }
        held
    }
}

impl PowerPlatform for RecordingPower {
    fn acquire(&self, level: WakeLockLevel) {
        self.calls.lock().unwrap().push(format!("acquire {:?}", level));
    }

    fn release(&self, level: WakeLockLevel) {
        self.calls.lock().unwrap().push(format!("release {:?}", level));
    }

    fn wake_up(&self) {
        self.calls.lock().unwrap().push("wake_up".to_string());
    }
}

#[derive(Default)]
pub struct RecordingStatusBar {
    pub calls: Mutex<Vec<DisableFlags>>,
}

impl RecordingStatusBar {
    pub fn last(&self) -> Option<DisableFlags> {
        self.calls.lock().unwrap().last().copied()
    }
}

impl StatusBarPlatform for RecordingStatusBar {
    fn disable(&self, flags: DisableFlags) {
        self.calls.lock().unwrap().push(flags);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationCall {
    Notify(NotificationState),
    Cancel,
    ShowIcon(StatusIcon),
    RemoveIcon(StatusIcon),
}

#[derive(Default)]
pub struct RecordingNotifications {
    pub calls: Mutex<Vec<NotificationCall>>,
}

impl RecordingNotifications {
    pub fn calls(&self) -> Vec<NotificationCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn notify_count(&self) -> usize {
        self.count(|c| matches!(c, NotificationCall::Notify(_)))
    }

    pub fn count(&self, pred: impl Fn(&NotificationCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn last_posted(&self) -> Option<NotificationState> {
        self.calls.lock().unwrap().iter().rev().find_map(|c| match c {
            NotificationCall::Notify(state) => Some(state.clone()),
            _ => None,
        })
    }
}

impl NotificationPlatform for RecordingNotifications {
    fn notify(&self, state: &NotificationState) {
        self.calls
            .lock()
            .unwrap()
            .push(NotificationCall::Notify(state.clone()));
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push(NotificationCall::Cancel);
    }

    fn show_icon(&self, icon: StatusIcon) {
        self.calls.lock().unwrap().push(NotificationCall::ShowIcon(icon));
    }

    fn remove_icon(&self, icon: StatusIcon) {
        self.calls.lock().unwrap().push(NotificationCall::RemoveIcon(icon));
    }
}

/// Fully assembled in-memory call UI.
pub struct TestStack {
    pub backend: Arc<ScriptedBackend>,
    pub ui: InCallUi,
    pub screen: Arc<RecordingScreen>,
    pub power: Arc<RecordingPower>,
    pub status_bar: Arc<RecordingStatusBar>,
    pub notifications: Arc<RecordingNotifications>,
    pub config: Arc<Config>,
}

impl TestStack {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let backend = Arc::new(ScriptedBackend::new());
        let screen = Arc::new(RecordingScreen::default());
        let power = Arc::new(RecordingPower::default());
        let status_bar = Arc::new(RecordingStatusBar::default());
        let notifications = Arc::new(RecordingNotifications::default());

        let ui = InCallUi::new(
            backend.clone(),
            config.clone(),
            ScreenDriver::new(
                screen.clone(),
                power.clone(),
                status_bar.clone(),
                &config.screen,
            ),
            NotificationDriver::new(notifications.clone()),
        );
        Self {
            backend,
            ui,
            screen,
            power,
            status_bar,
            notifications,
            config,
        }
    }

    /// Default configuration, service active, screen in the foreground.
    pub async fn attached() -> Self {
        let stack = Self::new(Config::default());
        stack.ui.screen().set_foreground(true).await;
        stack
            .ui
            .on_service_state_changed(ServiceState::Active)
            .await
            .expect("attach");
        stack.settle().await;
        stack
    }

    /// Let every spawned task run until idle without crossing any timer.
    pub async fn settle(&self) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    pub async fn emit(&self, event: CallEvent) {
        self.backend.emit(&event);
        self.settle().await;
    }

    /// Emit and wait out the Active debounce window.
    pub async fn emit_active(&self, event: CallEvent) {
        self.backend.emit(&event);
        tokio::time::sleep(self.config.timing.active_debounce() + Duration::from_millis(10)).await;
        self.settle().await;
    }

    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.settle().await;
    }
}
