//! # Controllers
//!
//! A [`Controller`] binds one presentation driver to the backend. Each
//! attach creates a session: a fresh callback identity registered at the
//! backend, a dispatch queue, a command relay and a consumer loop. Detach
//! tears all of it down and takes the driver back, so the controller can be
//! attached again.
//!
//! [`InCallUi`] owns the screen and notification controllers and follows
//! the telephony service lifecycle.

use crate::backend::{BackendHandle, CallbackId, CommandRelay};
use crate::cache::CallerInfoCache;
use crate::config::Config;
use crate::dispatch::{self, DispatchError, Dispatcher, Message};
use crate::event::{CallerInfo, ServiceState};
use crate::machine::MachineState;
use crate::normalizer::EventNormalizer;
use crate::presentation::{NotificationDriver, PresentationDriver, ScreenDriver, UiAction};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod event_loop;
#[cfg(test)]
pub(crate) mod testing;

use event_loop::ControllerLoop;

struct Session<D> {
    id: CallbackId,
    cancel_token: CancellationToken,
    dispatcher: Dispatcher,
    handle: JoinHandle<D>,
}

struct Presence<D> {
    /// Present while detached.
    driver: Option<D>,
    session: Option<Session<D>>,
    foreground: bool,
}

pub struct Controller<D: PresentationDriver> {
    name: &'static str,
    backend: BackendHandle,
    config: Arc<Config>,
    cache: CallerInfoCache,
    state_tx: watch::Sender<MachineState>,
    presence: Mutex<Presence<D>>,
}

impl<D: PresentationDriver> Controller<D> {
    pub fn new(backend: BackendHandle, config: Arc<Config>, driver: D) -> Self {
        let (state_tx, _) = watch::channel(MachineState::default());
        Self {
            name: driver.name(),
            backend,
            config,
            cache: CallerInfoCache::default(),
            state_tx,
            presence: Mutex::new(Presence {
                driver: Some(driver),
                session: None,
                foreground: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register with the backend and start consuming events. No-op when
    /// already attached.
    pub async fn attach(&self) -> Result<()> {
        let mut presence = self.presence.lock().await;
        if presence.session.is_some() {
            debug!(controller = self.name, "already attached");
            return Ok(());
        }
        let driver = presence
            .driver
            .take()
            .ok_or_else(|| anyhow!("{} driver was lost by a previous session", self.name))?;

        let id = Uuid::new_v4();
        let cancel_token = CancellationToken::new();
        let (dispatcher, queue) = dispatch::channel(cancel_token.clone());
        // delivered ahead of any backend event
        dispatcher
            .enqueue(Message::Action(UiAction::Foreground(presence.foreground)))
            .ok();
        let normalizer = Arc::new(EventNormalizer::new(
            dispatcher.clone(),
            self.config.timing.active_debounce(),
        ));
        if let Err(e) = self.backend.register_callback(id, normalizer).await {
            cancel_token.cancel();
            presence.driver = Some(driver);
            return Err(anyhow!("{} failed to register callback: {}", self.name, e));
        }

        let commands = CommandRelay::spawn(self.backend.clone(), id, cancel_token.child_token());
        let event_loop = ControllerLoop {
            callback_id: id,
            driver,
            queue,
            dispatcher: dispatcher.clone(),
            commands,
            cache: self.cache.clone(),
            state_tx: self.state_tx.clone(),
            timing: self.config.timing.clone(),
            proximity_sensor: self.config.screen.proximity_sensor,
        };
        let handle = tokio::spawn(event_loop.run());

        info!(controller = self.name, %id, "attached");
        presence.session = Some(Session {
            id,
            cancel_token,
            dispatcher,
            handle,
        });
        Ok(())
    }

    /// Cancel every pending message, unregister from the backend and wait
    /// for the loop to hand the driver back. No-op when detached.
    pub async fn detach(&self) -> Result<()> {
        let mut presence = self.presence.lock().await;
        let Some(session) = presence.session.take() else {
            debug!(controller = self.name, "already detached");
            return Ok(());
        };
        session.cancel_token.cancel();
        if let Err(e) = self.backend.unregister_callback(session.id).await {
            warn!(controller = self.name, id = %session.id, "unregister failed: {}", e);
        }
        let driver = session
            .handle
            .await
            .map_err(|e| anyhow!("{} loop failed: {}", self.name, e))?;
        presence.driver = Some(driver);
        info!(controller = self.name, id = %session.id, "detached");
        Ok(())
    }

    pub async fn is_attached(&self) -> bool {
        self.presence.lock().await.session.is_some()
    }

    pub async fn callback_id(&self) -> Option<CallbackId> {
        self.presence.lock().await.session.as_ref().map(|s| s.id)
    }

    /// Queue a user action behind every event already received.
    pub async fn perform(&self, action: UiAction) -> Result<(), DispatchError> {
        let presence = self.presence.lock().await;
        let session = presence.session.as_ref().ok_or(DispatchError::Closed)?;
        session.dispatcher.enqueue(Message::Action(action))
    }

    /// Record whether the UI is resumed. Remembered across sessions and
    /// reported again on every attach.
    pub async fn set_foreground(&self, foreground: bool) {
        let mut presence = self.presence.lock().await;
        presence.foreground = foreground;
        if let Some(session) = presence.session.as_ref() {
            session
                .dispatcher
                .enqueue(Message::Action(UiAction::Foreground(foreground)))
                .ok();
        }
    }

    /// Machine state after the last applied event.
    pub fn state(&self) -> MachineState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MachineState> {
        self.state_tx.subscribe()
    }

    pub fn caller_info(&self) -> Option<Arc<CallerInfo>> {
        self.cache.current()
    }
}

/// The screen and notification controllers, sharing one backend.
pub struct InCallUi {
    screen: Controller<ScreenDriver>,
    notification: Controller<NotificationDriver>,
}

impl InCallUi {
    pub fn new(
        backend: BackendHandle,
        config: Arc<Config>,
        screen: ScreenDriver,
        notification: NotificationDriver,
    ) -> Self {
        Self {
            screen: Controller::new(backend.clone(), config.clone(), screen),
            notification: Controller::new(backend, config, notification),
        }
    }

    pub fn screen(&self) -> &Controller<ScreenDriver> {
        &self.screen
    }

    pub fn notification(&self) -> &Controller<NotificationDriver> {
        &self.notification
    }

    /// Attach both controllers when the service becomes active, detach both
    /// when it stops. One failing does not stop the other.
    pub async fn on_service_state_changed(&self, state: ServiceState) -> Result<()> {
        info!(?state, "telephony service state changed");
        match state {
            ServiceState::Active => {
                let (screen, notification) =
                    futures::join!(self.screen.attach(), self.notification.attach());
                screen.and(notification)
            }
            ServiceState::Stopped => {
                let (screen, notification) =
                    futures::join!(self.screen.detach(), self.notification.detach());
                screen.and(notification)
            }
            ServiceState::Idle => Ok(()),
        }
    }

    /// Route `action` to the controller owning its sink.
    pub async fn perform(&self, action: UiAction) -> Result<(), DispatchError> {
        match action {
            UiAction::NotificationEndCall => self.notification.perform(action).await,
            _ => self.screen.perform(action).await,
        }
    }
}
