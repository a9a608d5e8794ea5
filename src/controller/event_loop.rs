use crate::backend::{BackendCommand, CallbackId, CommandRelay};
use crate::cache::CallerInfoCache;
use crate::config::TimingConfig;
use crate::dispatch::{DispatchQueue, Dispatcher, Message};
use crate::machine::{step, Effect, MachineState, StepContext};
use crate::presentation::{DriverContext, PresentationDriver};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Single consumer of one controller session.
///
/// Every event, timer and user action of the session goes through
/// [`ControllerLoop::run`], which is the only place machine state and driver
/// state are mutated. The driver is handed back when the queue closes so the
/// controller can attach it again later.
pub(crate) struct ControllerLoop<D> {
    pub callback_id: CallbackId,
    pub driver: D,
    pub queue: DispatchQueue,
    pub dispatcher: Dispatcher,
    pub commands: CommandRelay,
    pub cache: CallerInfoCache,
    pub state_tx: watch::Sender<MachineState>,
    pub timing: TimingConfig,
    pub proximity_sensor: bool,
}

impl<D: PresentationDriver> ControllerLoop<D> {
    pub async fn run(self) -> D {
        let ControllerLoop {
            callback_id,
            mut driver,
            mut queue,
            dispatcher,
            commands,
            cache,
            state_tx,
            timing,
            proximity_sensor,
        } = self;
        let sink = driver.name();
        let ctx = DriverContext {
            dispatcher: &dispatcher,
            commands: &commands,
            timing: &timing,
        };

        let mut state = MachineState::default();
        state_tx.send_replace(state.clone());
        driver.on_attach(&ctx);
        driver.flush();

        while let Some(message) = queue.next().await {
            match message {
                Message::Event(event) => {
                    let step_ctx = StepContext {
                        now: Utc::now(),
                        caller: cache.current(),
                        proximity_sensor,
                    };
                    let transition = step(&state, &event, &step_ctx);
                    debug!(
                        controller = %callback_id,
                        sink,
                        kind = ?event.kind(),
                        from = %state.screen,
                        to = %transition.state.screen,
                        effects = transition.effects.len(),
                        "call event"
                    );
                    for effect in &transition.effects {
                        match effect {
                            Effect::ForegroundCaller(Some(info)) => cache.update(info.clone()),
                            Effect::ForegroundCaller(None) => cache.clear(),
                            Effect::RequestCallerInfo => {
                                commands.send(BackendCommand::RequestForegroundCallerInfo)
                            }
                            _ => {}
                        }
                        driver.apply(effect, &ctx);
                    }
                    state = transition.state;
                    state_tx.send_replace(state.clone());
                }
                Message::Timer(timer) => {
                    debug!(controller = %callback_id, sink, ?timer, "timer fired");
                    driver.on_timer(timer, &ctx);
                }
                Message::Action(action) => {
                    debug!(controller = %callback_id, sink, ?action, "user action");
                    driver.on_action(&action, &ctx);
                }
            }
            driver.flush();
        }

        driver.on_detach();
        cache.clear();
        state_tx.send_replace(MachineState::default());
        info!(controller = %callback_id, sink, "controller loop stopped");
        driver
    }
}
