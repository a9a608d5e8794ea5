use super::{DriverContext, PresentationDriver, UiAction};
use crate::backend::BackendCommand;
use crate::config::ScreenConfig;
use crate::dispatch::{Message, MessageKind, TimerKind};
use crate::event::{AudioRoute, CallerInfo, DisconnectCause};
use crate::machine::{widgets_for, CallDetails, Effect, ScreenState, WidgetSet};
use crate::policy::{
    PowerMode, PowerPlatform, StatusBarHelper, StatusBarPlatform, StatusBarPolicy,
    WakeLockManager,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the rendering layer needs to draw the call screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenView {
    /// Displayed screen. `Disconnected` while the ended view lingers.
    pub screen: ScreenState,
    /// Widget visibility with the keypad overlay already applied.
    pub widgets: WidgetSet,
    pub details: CallDetails,
    pub caller: Option<Arc<CallerInfo>>,
    pub secondary_caller: Option<Arc<CallerInfo>>,
    pub elapsed_time: Option<String>,
    pub mute_checked: bool,
    pub audio_route: AudioRoute,
    pub keypad_open: bool,
    pub keypad_button_enabled: bool,
    pub busy_artwork: bool,
}

impl Default for ScreenView {
    fn default() -> Self {
        Self {
            screen: ScreenState::Idle,
            widgets: widgets_for(ScreenState::Idle),
            details: CallDetails::default(),
            caller: None,
            secondary_caller: None,
            elapsed_time: None,
            mute_checked: false,
            audio_route: AudioRoute::default(),
            keypad_open: false,
            keypad_button_enabled: true,
            busy_artwork: false,
        }
    }
}

/// Rendering layer of the call screen.
pub trait ScreenRenderer: Send + Sync {
    /// Draw `view`. Each view is a full snapshot.
    fn render(&self, view: &ScreenView);
    /// Animate the incoming-call widget once.
    fn ping_incoming(&self);
    /// Close the call screen.
    fn dismiss(&self);
}

pub struct ScreenDriver {
    renderer: Arc<dyn ScreenRenderer>,
    wake_locks: WakeLockManager,
    status_bar: StatusBarHelper,
    ping_auto_repeat: bool,
    foreground: bool,
    /// Power mode of the current machine state, applied only in the foreground.
    power_mode: PowerMode,
    pinging: bool,
    /// Set by Decline: nothing is drawn until another call shows up and
    /// the ended view is skipped.
    declined: bool,
    base_widgets: WidgetSet,
    view: ScreenView,
    rendered: Option<ScreenView>,
}

impl ScreenDriver {
    pub fn new(
        renderer: Arc<dyn ScreenRenderer>,
        power: Arc<dyn PowerPlatform>,
        status_bar: Arc<dyn StatusBarPlatform>,
        config: &ScreenConfig,
    ) -> Self {
        let view = ScreenView::default();
        Self {
            renderer,
            wake_locks: WakeLockManager::new(power),
            status_bar: StatusBarHelper::new(status_bar),
            ping_auto_repeat: config.ping_auto_repeat,
            foreground: false,
            power_mode: PowerMode::None,
            pinging: false,
            declined: false,
            base_widgets: view.widgets,
            view,
            rendered: None,
        }
    }

    pub fn view(&self) -> &ScreenView {
        &self.view
    }

    pub fn power_mode(&self) -> PowerMode {
        self.wake_locks.mode()
    }

    pub fn status_bar(&self) -> StatusBarPolicy {
        self.status_bar.current()
    }

    fn lingering(&self) -> bool {
        self.view.screen == ScreenState::Disconnected
    }

    /// Keypad overlay hides the call info block, plus the dialing banner
    /// or the elapsed time depending on the screen.
    fn refresh_widgets(&mut self) {
        let mut widgets = self.base_widgets;
        if self.view.keypad_open {
            widgets.primary_call_info = false;
            match self.view.screen {
                ScreenState::Dialing => widgets.label = None,
                ScreenState::Active => widgets.elapsed_time = false,
                _ => {}
            }
        }
        self.view.widgets = widgets;
    }

    fn reset_view(&mut self) {
        self.view = ScreenView::default();
        self.base_widgets = self.view.widgets;
        self.rendered = Some(self.view.clone());
    }

    fn schedule_ping(&self, ctx: &DriverContext<'_>, delay: std::time::Duration) {
        ctx.dispatcher
            .replace_delayed(Message::Timer(TimerKind::IncomingPing), delay)
            .ok();
    }

    fn finish(&mut self) {
        info!(screen = %self.view.screen, "dismissing call screen");
        self.renderer.dismiss();
        self.reset_view();
    }
}

impl PresentationDriver for ScreenDriver {
    fn name(&self) -> &'static str {
        "screen"
    }

    fn on_attach(&mut self, ctx: &DriverContext<'_>) {
        self.wake_locks.wake_up_screen();
        // the lookup may have finished before this registration existed
        ctx.commands.send(BackendCommand::RequestForegroundCallerInfo);
    }

    fn apply(&mut self, effect: &Effect, ctx: &DriverContext<'_>) {
        match effect {
            Effect::Screen {
                screen,
                widgets,
                details,
            } => {
                if self.lingering() && *screen != ScreenState::Idle {
                    ctx.dispatcher
                        .cancel_pending(MessageKind::Timer(TimerKind::Finish));
                }
                if !matches!(screen, ScreenState::Idle | ScreenState::Disconnecting) {
                    self.declined = false;
                }
                match screen {
                    ScreenState::Active => self.view.keypad_button_enabled = true,
                    ScreenState::OnHold => {
                        self.view.keypad_open = false;
                        self.view.keypad_button_enabled = false;
                    }
                    _ => {}
                }
                self.view.busy_artwork = false;
                self.view.screen = *screen;
                self.view.details = *details;
                self.base_widgets = *widgets;
                self.refresh_widgets();
            }
            Effect::CallEnded { cause, widgets } => {
                if self.declined {
                    debug!("call declined, skipping ended view");
                    self.reset_view();
                    return;
                }
                self.view.screen = ScreenState::Disconnected;
                self.view.busy_artwork = *cause == DisconnectCause::Busy;
                self.view.keypad_open = false;
                self.view.keypad_button_enabled = false;
                self.base_widgets = *widgets;
                self.refresh_widgets();
                ctx.dispatcher
                    .replace_delayed(Message::Timer(TimerKind::Finish), ctx.timing.finish_delay())
                    .ok();
            }
            Effect::PowerMode(mode) => {
                self.power_mode = *mode;
                if self.foreground {
                    self.wake_locks.request(*mode);
                }
            }
            Effect::StatusBar(policy) => self.status_bar.apply(*policy),
            Effect::StartPing => {
                self.pinging = true;
                self.schedule_ping(ctx, ctx.timing.ping_warmup());
            }
            Effect::StopPing => {
                self.pinging = false;
                ctx.dispatcher
                    .cancel_pending(MessageKind::Timer(TimerKind::IncomingPing));
            }
            Effect::ForegroundCaller(caller) => {
                // the ended view keeps the last caller until dismissed
                if caller.is_some() || !self.lingering() {
                    self.view.caller = caller.clone();
                }
            }
            Effect::BackgroundCaller(info) => self.view.secondary_caller = Some(info.clone()),
            Effect::Mute(muted) => self.view.mute_checked = *muted,
            Effect::AudioRoute(route) => self.view.audio_route = *route,
            Effect::ElapsedTime(text) => self.view.elapsed_time = Some(text.clone()),
            Effect::RequestCallerInfo
            | Effect::Notification(_)
            | Effect::CancelNotification
            | Effect::StatusIcons(_) => {}
        }
    }

    fn on_timer(&mut self, timer: TimerKind, ctx: &DriverContext<'_>) {
        match timer {
            TimerKind::IncomingPing => {
                if !self.pinging || !self.view.widgets.incoming_widget || !self.foreground {
                    return;
                }
                self.renderer.ping_incoming();
                if self.ping_auto_repeat {
                    self.schedule_ping(ctx, ctx.timing.ping_repeat());
                }
            }
            TimerKind::Finish => {
                if self.lingering() {
                    self.finish();
                }
            }
        }
    }

    fn on_action(&mut self, action: &UiAction, ctx: &DriverContext<'_>) {
        debug!(?action, screen = %self.view.screen, "screen action");
        match action {
            UiAction::Answer => ctx.commands.send(BackendCommand::Answer),
            UiAction::Decline => {
                ctx.commands.send(BackendCommand::Hangup);
                self.declined = true;
                self.finish();
            }
            UiAction::EndCall => ctx.commands.send(BackendCommand::Hangup),
            UiAction::ToggleMute => ctx.commands.send(BackendCommand::ToggleMute),
            UiAction::ToggleHold => {
                if self.view.screen == ScreenState::OnHold {
                    ctx.commands.send(BackendCommand::Retrieve);
                    self.view.keypad_button_enabled = true;
                } else {
                    ctx.commands.send(BackendCommand::Hold);
                    self.view.keypad_open = false;
                    self.view.keypad_button_enabled = false;
                }
                self.refresh_widgets();
            }
            UiAction::ToggleSpeaker => ctx.commands.send(BackendCommand::ToggleSpeaker),
            UiAction::ToggleKeypad => {
                if self.view.keypad_button_enabled {
                    self.view.keypad_open = !self.view.keypad_open;
                    self.refresh_widgets();
                }
            }
            UiAction::StartDtmf(digit) => ctx.commands.send(BackendCommand::StartDtmf(*digit)),
            UiAction::StopDtmf => ctx.commands.send(BackendCommand::StopDtmf),
            UiAction::Foreground(foreground) => {
                self.foreground = *foreground;
                ctx.commands
                    .send(BackendCommand::CallUiActivated(*foreground));
                if *foreground {
                    self.wake_locks.request(self.power_mode);
                    if self.pinging {
                        self.schedule_ping(ctx, ctx.timing.ping_warmup());
                    }
                } else {
                    self.wake_locks.release_all();
                }
            }
            UiAction::NotificationEndCall => {}
        }
    }

    fn flush(&mut self) {
        if self.declined || self.rendered.as_ref() == Some(&self.view) {
            return;
        }
        self.renderer.render(&self.view);
        self.rendered = Some(self.view.clone());
    }

    fn on_detach(&mut self) {
        self.wake_locks.release_all();
        self.status_bar.apply(StatusBarPolicy::default());
        self.power_mode = PowerMode::None;
        self.pinging = false;
        self.declined = false;
        self.view = ScreenView::default();
        self.base_widgets = self.view.widgets;
        self.rendered = None;
    }
}
