use crate::event::{AudioRoute, CallerInfo, DisconnectCause};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registration identity of one controller instance at the backend.
pub type CallbackId = Uuid;

pub type BackendHandle = Arc<dyn TelephonyBackend>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend is not bound")]
    Unbound,
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Call-control capabilities of the remote telephony service.
///
/// Every call may fail with a transport error. Callers treat failure as a
/// no-op: the callback stream is the source of truth for resulting state.
#[async_trait]
pub trait TelephonyBackend: Send + Sync {
    async fn register_callback(
        &self,
        id: CallbackId,
        callback: Arc<dyn TelephonyCallback>,
    ) -> Result<(), BackendError>;
    async fn unregister_callback(&self, id: CallbackId) -> Result<(), BackendError>;
    async fn answer_call(&self) -> Result<(), BackendError>;
    async fn hangup_call(&self) -> Result<(), BackendError>;
    async fn hold_call(&self) -> Result<(), BackendError>;
    async fn retrieve_call(&self) -> Result<(), BackendError>;
    /// Toggles the microphone mute state.
    async fn mute_mic(&self) -> Result<(), BackendError>;
    async fn route_sound(&self, route: AudioRoute) -> Result<(), BackendError>;
    async fn get_sound_route(&self) -> Result<AudioRoute, BackendError>;
    async fn start_dtmf(&self, digit: char) -> Result<(), BackendError>;
    async fn stop_dtmf(&self) -> Result<(), BackendError>;
    /// Asks the backend to deliver the foreground caller to the callback
    /// registered under `id`.
    async fn request_foreground_caller_info(&self, id: CallbackId) -> Result<(), BackendError>;
    async fn call_ui_activated(&self, active: bool) -> Result<(), BackendError>;
}

/// Raw notifications emitted by the backend.
///
/// Invoked from arbitrary threads, possibly concurrently. Implementations
/// must not block.
pub trait TelephonyCallback: Send + Sync {
    fn on_incoming(&self, is_waiting: bool);
    fn on_outgoing(&self, is_alerting: bool);
    fn on_active(
        &self,
        has_background_call: bool,
        is_emergency: bool,
        is_voice_mail: bool,
        is_conference: bool,
    );
    fn on_hold(&self, is_voice_mail: bool, is_conference: bool);
    fn on_disconnecting(&self);
    fn on_all_calls_disconnected(&self, cause: DisconnectCause);
    fn on_mic_mute_state_change(&self, is_muted: bool);
    fn on_sound_routed(&self, route: AudioRoute);
    fn on_elapsed_time_updated(&self, elapsed: String);
    fn on_foreground_caller_info_updated(&self, info: CallerInfo);
    fn on_background_caller_info_updated(&self, info: CallerInfo);
}

/// A user action relayed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Answer,
    Hangup,
    Hold,
    Retrieve,
    ToggleMute,
    RouteSound(AudioRoute),
    /// Speaker goes to earpiece, anything else goes to speaker.
    ToggleSpeaker,
    StartDtmf(char),
    StopDtmf,
    RequestForegroundCallerInfo,
    CallUiActivated(bool),
}

/// Ordered, fire-and-forget command channel toward the backend.
///
/// Commands are executed one at a time in submission order by a background
/// task. Failures are logged and dropped.
#[derive(Clone)]
pub struct CommandRelay {
    tx: mpsc::UnboundedSender<BackendCommand>,
}

impl CommandRelay {
    pub fn spawn(
        backend: BackendHandle,
        callback_id: CallbackId,
        cancel_token: CancellationToken,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackendCommand>();
        tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    command = rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                    _ = cancel_token.cancelled() => break,
                };
                if let Err(e) = execute(backend.as_ref(), callback_id, &command).await {
                    warn!(controller = %callback_id, ?command, "backend command failed: {}", e);
                }
            }
            debug!(controller = %callback_id, "command relay stopped");
        });
        Self { tx }
    }

    pub fn send(&self, command: BackendCommand) {
        if self.tx.send(command).is_err() {
            debug!("command relay closed, dropping command");
        }
    }
}

async fn execute(
    backend: &dyn TelephonyBackend,
    callback_id: CallbackId,
    command: &BackendCommand,
) -> Result<(), BackendError> {
    match command {
        BackendCommand::Answer => backend.answer_call().await,
        BackendCommand::Hangup => backend.hangup_call().await,
        BackendCommand::Hold => backend.hold_call().await,
        BackendCommand::Retrieve => backend.retrieve_call().await,
        BackendCommand::ToggleMute => backend.mute_mic().await,
        BackendCommand::RouteSound(route) => backend.route_sound(*route).await,
        BackendCommand::ToggleSpeaker => {
            let next = match backend.get_sound_route().await? {
                AudioRoute::Speaker => AudioRoute::Earpiece,
                _ => AudioRoute::Speaker,
            };
            backend.route_sound(next).await
        }
        BackendCommand::StartDtmf(digit) => backend.start_dtmf(*digit).await,
        BackendCommand::StopDtmf => backend.stop_dtmf().await,
        BackendCommand::RequestForegroundCallerInfo => {
            backend.request_foreground_caller_info(callback_id).await
        }
        BackendCommand::CallUiActivated(active) => backend.call_ui_activated(*active).await,
    }
}
