//! Scenario replay.
//!
//! [`ScriptedBackend`] is an in-memory telephony service: it keeps the
//! registered callbacks, answers commands the way a real backend would
//! (holding emits Held, muting emits MuteChanged, ...) and lets a script
//! inject raw events. [`LogSink`] implements every platform sink by logging
//! what it is asked to draw.

use crate::backend::{
    BackendCommand, BackendError, CallbackId, TelephonyBackend, TelephonyCallback,
};
use crate::controller::InCallUi;
use crate::event::{AudioRoute, CallEvent, CallerInfo, DisconnectCause, ServiceState};
use crate::machine::NotificationState;
use crate::policy::{DisableFlags, PowerPlatform, StatusBarPlatform, WakeLockLevel};
use crate::presentation::{NotificationPlatform, ScreenRenderer, ScreenView, StatusIcon, UiAction};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Invoke the callback method matching `event`.
pub fn deliver(callback: &dyn TelephonyCallback, event: &CallEvent) {
    match event {
        CallEvent::IncomingRinging { is_waiting } => callback.on_incoming(*is_waiting),
        CallEvent::OutgoingAlerting { is_alerting } => callback.on_outgoing(*is_alerting),
        CallEvent::Active {
            has_background_call,
            is_emergency,
            is_voice_mail,
            is_conference,
        } => callback.on_active(
            *has_background_call,
            *is_emergency,
            *is_voice_mail,
            *is_conference,
        ),
        CallEvent::Held {
            is_voice_mail,
            is_conference,
        } => callback.on_hold(*is_voice_mail, *is_conference),
        CallEvent::Disconnecting => callback.on_disconnecting(),
        CallEvent::AllDisconnected { cause } => callback.on_all_calls_disconnected(*cause),
        CallEvent::MuteChanged { is_muted } => callback.on_mic_mute_state_change(*is_muted),
        CallEvent::AudioRouteChanged { route } => callback.on_sound_routed(*route),
        CallEvent::ElapsedTimeTick { text } => callback.on_elapsed_time_updated(text.clone()),
        CallEvent::ForegroundCallerInfoUpdated { info } => {
            callback.on_foreground_caller_info_updated(info.as_ref().clone())
        }
        CallEvent::BackgroundCallerInfoUpdated { info } => {
            callback.on_background_caller_info_updated(info.as_ref().clone())
        }
    }
}

#[derive(Debug, Default)]
struct LineState {
    muted: bool,
    route: AudioRoute,
    caller: Option<CallerInfo>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    callbacks: Mutex<HashMap<CallbackId, Arc<dyn TelephonyCallback>>>,
    line: Mutex<LineState>,
    received: Mutex<Vec<BackendCommand>>,
    failing: AtomicBool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<CallbackId> {
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.keys().copied().collect()
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<BackendCommand> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Send `event` to every registered callback.
    pub fn emit(&self, event: &CallEvent) {
        {
            let mut line = self.line.lock().unwrap_or_else(|e| e.into_inner());
            match event {
                CallEvent::MuteChanged { is_muted } => line.muted = *is_muted,
                CallEvent::AudioRouteChanged { route } => line.route = *route,
                CallEvent::ForegroundCallerInfoUpdated { info } => {
                    line.caller = Some(info.as_ref().clone())
                }
                CallEvent::AllDisconnected { .. } => {
                    line.caller = None;
                    line.muted = false;
                }
                _ => {}
            }
        }
        let callbacks: Vec<_> = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            deliver(callback.as_ref(), event);
        }
    }

    /// Caller the backend will report on request, without broadcasting it.
    pub fn set_caller(&self, caller: Option<CallerInfo>) {
        self.line.lock().unwrap_or_else(|e| e.into_inner()).caller = caller;
    }

    fn record(&self, command: BackendCommand) -> Result<(), BackendError> {
        info!(?command, "backend received command");
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("scripted failure".to_string()));
        }
        Ok(())
    }

    fn active() -> CallEvent {
        CallEvent::Active {
            has_background_call: false,
            is_emergency: false,
            is_voice_mail: false,
            is_conference: false,
        }
    }
}

#[async_trait]
impl TelephonyBackend for ScriptedBackend {
    async fn register_callback(
        &self,
        id: CallbackId,
        callback: Arc<dyn TelephonyCallback>,
    ) -> Result<(), BackendError> {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.insert(id, callback);
        info!(%id, total = callbacks.len(), "callback registered");
        Ok(())
    }

    async fn unregister_callback(&self, id: CallbackId) -> Result<(), BackendError> {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        if callbacks.remove(&id).is_none() {
            return Err(BackendError::Rejected(format!("unknown callback {}", id)));
        }
        info!(%id, total = callbacks.len(), "callback unregistered");
        Ok(())
    }

    async fn answer_call(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::Answer)?;
        self.emit(&Self::active());
        Ok(())
    }

    async fn hangup_call(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::Hangup)?;
        self.emit(&CallEvent::Disconnecting);
        self.emit(&CallEvent::AllDisconnected {
            cause: DisconnectCause::Local,
        });
        Ok(())
    }

    async fn hold_call(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::Hold)?;
        self.emit(&CallEvent::Held {
            is_voice_mail: false,
            is_conference: false,
        });
        Ok(())
    }

    async fn retrieve_call(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::Retrieve)?;
        self.emit(&Self::active());
        Ok(())
    }

    async fn mute_mic(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::ToggleMute)?;
        let muted = !self.line.lock().unwrap_or_else(|e| e.into_inner()).muted;
        self.emit(&CallEvent::MuteChanged { is_muted: muted });
        Ok(())
    }

    async fn route_sound(&self, route: AudioRoute) -> Result<(), BackendError> {
        self.record(BackendCommand::RouteSound(route))?;
        self.emit(&CallEvent::AudioRouteChanged { route });
        Ok(())
    }

    async fn get_sound_route(&self) -> Result<AudioRoute, BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("scripted failure".to_string()));
        }
        Ok(self.line.lock().unwrap_or_else(|e| e.into_inner()).route)
    }

    async fn start_dtmf(&self, digit: char) -> Result<(), BackendError> {
        self.record(BackendCommand::StartDtmf(digit))
    }

    async fn stop_dtmf(&self) -> Result<(), BackendError> {
        self.record(BackendCommand::StopDtmf)
    }

    async fn request_foreground_caller_info(&self, id: CallbackId) -> Result<(), BackendError> {
        self.record(BackendCommand::RequestForegroundCallerInfo)?;
        let caller = self
            .line
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .caller
            .clone();
        let callback = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned();
        match (caller, callback) {
            (Some(caller), Some(callback)) => callback.on_foreground_caller_info_updated(caller),
            (_, None) => return Err(BackendError::Rejected(format!("unknown callback {}", id))),
            _ => {}
        }
        Ok(())
    }

    async fn call_ui_activated(&self, active: bool) -> Result<(), BackendError> {
        self.record(BackendCommand::CallUiActivated(active))
    }
}

/// Logs everything the controllers ask the platform to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ScreenRenderer for LogSink {
    fn render(&self, view: &ScreenView) {
        info!(
            screen = %view.screen,
            label = view.widgets.label.unwrap_or("-"),
            caller = view.caller.as_ref().and_then(|c| c.label()).unwrap_or("-"),
            elapsed = view.elapsed_time.as_deref().unwrap_or("-"),
            muted = view.mute_checked,
            route = ?view.audio_route,
            keypad = view.keypad_open,
            "render screen"
        );
    }

    fn ping_incoming(&self) {
        info!("ping incoming widget");
    }

    fn dismiss(&self) {
        info!("dismiss screen");
    }
}

impl PowerPlatform for LogSink {
    fn acquire(&self, level: WakeLockLevel) {
        info!(?level, "acquire wake lock");
    }

    fn release(&self, level: WakeLockLevel) {
        info!(?level, "release wake lock");
    }

    fn wake_up(&self) {
        info!("wake up screen");
    }
}

impl StatusBarPlatform for LogSink {
    fn disable(&self, flags: DisableFlags) {
        info!(%flags, "status bar disable");
    }
}

impl NotificationPlatform for LogSink {
    fn notify(&self, state: &NotificationState) {
        info!(
            icon = ?state.icon,
            title = %state.title,
            text = %state.content_text,
            priority = ?state.priority,
            actions = ?state.actions,
            chronometer = ?state.chronometer_start,
            "post notification"
        );
    }

    fn cancel(&self) {
        info!("cancel notification");
    }

    fn show_icon(&self, icon: StatusIcon) {
        info!(?icon, "show status icon");
    }

    fn remove_icon(&self, icon: StatusIcon) {
        info!(?icon, "remove status icon");
    }
}

/// One timed input of a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    /// Wait before applying this step.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub input: ScenarioInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum ScenarioInput {
    /// Raw backend notification.
    Event { event: CallEvent },
    /// User interaction on the screen or the notification.
    Action { action: UiAction },
    Foreground { foreground: bool },
    Service { state: ServiceState },
    /// Caller identity known to the backend.
    Caller { caller: CallerInfo },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub steps: Vec<ScenarioStep>,
    /// Extra time to keep running after the last step.
    #[serde(default)]
    pub linger_ms: u64,
}

impl Scenario {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub async fn replay(scenario: &Scenario, backend: &ScriptedBackend, ui: &InCallUi) -> Result<()> {
    for (index, step) in scenario.steps.iter().enumerate() {
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        info!(index, input = ?step.input, "scenario step");
        match &step.input {
            ScenarioInput::Event { event } => backend.emit(event),
            ScenarioInput::Action { action } => {
                if let Err(e) = ui.perform(*action).await {
                    tracing::warn!(?action, "action not delivered: {}", e);
                }
            }
            ScenarioInput::Foreground { foreground } => ui.screen().set_foreground(*foreground).await,
            ScenarioInput::Service { state } => ui.on_service_state_changed(*state).await?,
            ScenarioInput::Caller { caller } => backend.set_caller(Some(caller.clone())),
        }
    }
    tokio::time::sleep(Duration::from_millis(scenario.linger_ms)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "steps": [
                    {"input": "service", "state": "active"},
                    {"input": "caller", "caller": {"name": "Alice", "number": "5550100"}},
                    {"input": "event", "event": {"type": "incoming_ringing", "is_waiting": false}},
                    {"input": "foreground", "foreground": true},
                    {"delay_ms": 1500, "input": "action", "action": "answer"},
                    {"input": "action", "action": {"start_dtmf": "5"}}
                ],
                "linger_ms": 200
            }"#,
        )
        .expect("scenario");
        assert_eq!(scenario.steps.len(), 6);
        assert_eq!(scenario.steps[4].delay_ms, 1500);
        assert!(matches!(
            scenario.steps[4].input,
            ScenarioInput::Action {
                action: UiAction::Answer
            }
        ));
        assert!(matches!(
            scenario.steps[5].input,
            ScenarioInput::Action {
                action: UiAction::StartDtmf('5')
            }
        ));
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CallEvent>>,
    }

    impl TelephonyCallback for Recorder {
        fn on_incoming(&self, is_waiting: bool) {
            self.events.lock().unwrap().push(CallEvent::IncomingRinging { is_waiting });
        }
        fn on_outgoing(&self, _is_alerting: bool) {}
        fn on_active(&self, has_background_call: bool, is_emergency: bool, is_voice_mail: bool, is_conference: bool) {
            self.events.lock().unwrap().push(CallEvent::Active {
                has_background_call,
                is_emergency,
                is_voice_mail,
                is_conference,
            });
        }
        fn on_hold(&self, _is_voice_mail: bool, _is_conference: bool) {}
        fn on_disconnecting(&self) {}
        fn on_all_calls_disconnected(&self, _cause: DisconnectCause) {}
        fn on_mic_mute_state_change(&self, is_muted: bool) {
            self.events.lock().unwrap().push(CallEvent::MuteChanged { is_muted });
        }
        fn on_sound_routed(&self, _route: AudioRoute) {}
        fn on_elapsed_time_updated(&self, _elapsed: String) {}
        fn on_foreground_caller_info_updated(&self, info: CallerInfo) {
            self.events
                .lock()
                .unwrap()
                .push(CallEvent::ForegroundCallerInfoUpdated { info: Arc::new(info) });
        }
        fn on_background_caller_info_updated(&self, _info: CallerInfo) {}
    }

    #[tokio::test]
    async fn test_backend_reacts_to_commands() {
        let backend = ScriptedBackend::new();
        let recorder = Arc::new(Recorder::default());
        let id = uuid::Uuid::new_v4();
        backend.register_callback(id, recorder.clone()).await.unwrap();

        backend.emit(&CallEvent::IncomingRinging { is_waiting: false });
        backend.answer_call().await.unwrap();
        backend.mute_mic().await.unwrap();
        backend.mute_mic().await.unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 4);
        assert_eq!(events[1], ScriptedBackend::active());
        assert_eq!(events[2], CallEvent::MuteChanged { is_muted: true });
        assert_eq!(events[3], CallEvent::MuteChanged { is_muted: false });
    }

    #[tokio::test]
    async fn test_caller_request_goes_to_requester_only() {
        let backend = ScriptedBackend::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let first_id = uuid::Uuid::new_v4();
        backend.register_callback(first_id, first.clone()).await.unwrap();
        backend
            .register_callback(uuid::Uuid::new_v4(), second.clone())
            .await
            .unwrap();

        // nothing known yet
        backend.request_foreground_caller_info(first_id).await.unwrap();
        assert!(first.events.lock().unwrap().is_empty());

        backend.set_caller(Some(CallerInfo {
            name: Some("Alice".to_string()),
            ..Default::default()
        }));
        backend.request_foreground_caller_info(first_id).await.unwrap();
        assert_eq!(first.events.lock().unwrap().len(), 1);
        assert!(second.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_backend_records_but_does_not_react() {
        let backend = ScriptedBackend::new();
        let recorder = Arc::new(Recorder::default());
        backend
            .register_callback(uuid::Uuid::new_v4(), recorder.clone())
            .await
            .unwrap();
        backend.set_failing(true);
        assert!(matches!(
            backend.answer_call().await,
            Err(BackendError::Transport(_))
        ));
        assert!(recorder.events.lock().unwrap().is_empty());
        assert_eq!(backend.received(), vec![BackendCommand::Answer]);
    }
}
