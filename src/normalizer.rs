use crate::backend::TelephonyCallback;
use crate::dispatch::{Dispatcher, Message, MessageKind};
use crate::event::{AudioRoute, CallEvent, CallerInfo, DisconnectCause, EventKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Turns raw backend callbacks into [`CallEvent`]s on a controller's queue.
///
/// Callbacks may run on any thread; this type never touches controller
/// state, it only enqueues. Once the queue is torn down every callback is
/// dropped without error.
pub struct EventNormalizer {
    dispatcher: Dispatcher,
    active_debounce: Duration,
}

impl EventNormalizer {
    pub fn new(dispatcher: Dispatcher, active_debounce: Duration) -> Self {
        Self {
            dispatcher,
            active_debounce,
        }
    }

    pub fn submit(&self, event: CallEvent) {
        let kind = event.kind();
        if self.dispatcher.is_closed() {
            debug!(?kind, "controller detached, dropping event");
            return;
        }
        // a debounced Active still in flight lands before any later call state
        if kind.is_call_state() && kind != EventKind::Active {
            if let Err(e) = self
                .dispatcher
                .expedite(MessageKind::Event(EventKind::Active))
            {
                debug!(?kind, "dropping event: {}", e);
                return;
            }
        }
        let message = Message::Event(event);
        let result = match kind {
            EventKind::Active => self
                .dispatcher
                .replace_delayed(message, self.active_debounce),
            EventKind::ElapsedTimeTick => self.dispatcher.enqueue(message),
            _ => self.dispatcher.replace(message),
        };
        if let Err(e) = result {
            debug!(?kind, "dropping event: {}", e);
        }
    }
}

impl TelephonyCallback for EventNormalizer {
    fn on_incoming(&self, is_waiting: bool) {
        self.submit(CallEvent::IncomingRinging { is_waiting });
    }

    fn on_outgoing(&self, is_alerting: bool) {
        self.submit(CallEvent::OutgoingAlerting { is_alerting });
    }

    fn on_active(
        &self,
        has_background_call: bool,
        is_emergency: bool,
        is_voice_mail: bool,
        is_conference: bool,
    ) {
        self.submit(CallEvent::Active {
            has_background_call,
            is_emergency,
            is_voice_mail,
            is_conference,
        });
    }

    fn on_hold(&self, is_voice_mail: bool, is_conference: bool) {
        self.submit(CallEvent::Held {
            is_voice_mail,
            is_conference,
        });
    }

    fn on_disconnecting(&self) {
        self.submit(CallEvent::Disconnecting);
    }

    fn on_all_calls_disconnected(&self, cause: DisconnectCause) {
        self.submit(CallEvent::AllDisconnected { cause });
    }

    fn on_mic_mute_state_change(&self, is_muted: bool) {
        self.submit(CallEvent::MuteChanged { is_muted });
    }

    fn on_sound_routed(&self, route: AudioRoute) {
        self.submit(CallEvent::AudioRouteChanged { route });
    }

    fn on_elapsed_time_updated(&self, elapsed: String) {
        self.submit(CallEvent::ElapsedTimeTick { text: elapsed });
    }

    fn on_foreground_caller_info_updated(&self, info: CallerInfo) {
        self.submit(CallEvent::ForegroundCallerInfoUpdated {
            info: Arc::new(info),
        });
    }

    fn on_background_caller_info_updated(&self, info: CallerInfo) {
        self.submit(CallEvent::BackgroundCallerInfoUpdated {
            info: Arc::new(info),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, DispatchQueue};
    use tokio_util::sync::CancellationToken;

    fn setup() -> (EventNormalizer, DispatchQueue, CancellationToken) {
        let token = CancellationToken::new();
        let (dispatcher, queue) = dispatch::channel(token.clone());
        (
            EventNormalizer::new(dispatcher, Duration::from_millis(1000)),
            queue,
            token,
        )
    }

    async fn next_event(queue: &mut DispatchQueue) -> CallEvent {
        match queue.next().await {
            Some(Message::Event(event)) => event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_burst_keeps_latest_payload() {
        let (normalizer, mut queue, _token) = setup();
        let start = tokio::time::Instant::now();
        normalizer.on_active(false, false, false, false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        normalizer.on_active(true, false, false, false);

        let event = next_event(&mut queue).await;
        assert!(start.elapsed() >= Duration::from_millis(1200));
        assert_eq!(
            event,
            CallEvent::Active {
                has_background_call: true,
                is_emergency: false,
                is_voice_mail: false,
                is_conference: false,
            }
        );

        normalizer.on_hold(false, false);
        assert_eq!(next_event(&mut queue).await.kind(), EventKind::Held);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_call_state_flushes_pending_active() {
        let (normalizer, mut queue, _token) = setup();
        let start = tokio::time::Instant::now();
        normalizer.on_incoming(false);
        normalizer.on_active(false, false, false, false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        normalizer.on_incoming(true);

        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::IncomingRinging { is_waiting: false }
        );
        assert_eq!(next_event(&mut queue).await.kind(), EventKind::Active);
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::IncomingRinging { is_waiting: true }
        );
        let late = tokio::time::timeout(Duration::from_secs(5), queue.next()).await;
        assert!(late.is_err(), "Active must be delivered exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_active_keeps_order() {
        let (normalizer, mut queue, _token) = setup();
        normalizer.on_active(false, false, false, false);
        normalizer.on_disconnecting();
        normalizer.on_all_calls_disconnected(DisconnectCause::Normal);

        assert_eq!(next_event(&mut queue).await.kind(), EventKind::Active);
        assert_eq!(next_event(&mut queue).await, CallEvent::Disconnecting);
        assert_eq!(
            next_event(&mut queue).await.kind(),
            EventKind::AllDisconnected
        );
        let late = tokio::time::timeout(Duration::from_secs(5), queue.next()).await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn test_active_from_backend_thread_is_delivered() {
        let token = CancellationToken::new();
        let (dispatcher, mut queue) = dispatch::channel(token.clone());
        let normalizer = Arc::new(EventNormalizer::new(dispatcher, Duration::from_millis(20)));

        let callback = normalizer.clone();
        std::thread::spawn(move || {
            callback.on_incoming(false);
            callback.on_active(false, true, false, false);
        })
        .join()
        .expect("backend thread");

        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::IncomingRinging { is_waiting: false }
        );
        let active = tokio::time::timeout(Duration::from_secs(5), next_event(&mut queue))
            .await
            .expect("debounced Active delivered");
        assert_eq!(
            active,
            CallEvent::Active {
                has_background_call: false,
                is_emergency: true,
                is_voice_mail: false,
                is_conference: false,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_producers_keep_their_order() {
        let token = CancellationToken::new();
        let (dispatcher, mut queue) = dispatch::channel(token.clone());
        let normalizer = Arc::new(EventNormalizer::new(dispatcher, Duration::from_millis(50)));

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let callback = normalizer.clone();
                std::thread::spawn(move || {
                    for seq in 0..25 {
                        callback.on_elapsed_time_updated(format!("{}:{}", producer, seq));
                    }
                })
            })
            .collect();
        let debouncer = {
            let callback = normalizer.clone();
            std::thread::spawn(move || callback.on_active(true, false, false, false))
        };
        for handle in producers {
            handle.join().expect("producer thread");
        }
        debouncer.join().expect("debounce thread");

        let mut last_seen = [None::<u32>; 4];
        let mut ticks = 0;
        let mut actives = 0;
        while ticks < 100 || actives == 0 {
            let event = tokio::time::timeout(Duration::from_secs(5), next_event(&mut queue))
                .await
                .expect("event delivered");
            match event {
                CallEvent::ElapsedTimeTick { text } => {
                    let (producer, seq) = text.split_once(':').expect("tick text");
                    let producer: usize = producer.parse().expect("producer");
                    let seq: u32 = seq.parse().expect("seq");
                    if let Some(previous) = last_seen[producer] {
                        assert_eq!(seq, previous + 1, "producer {} out of order", producer);
                    } else {
                        assert_eq!(seq, 0);
                    }
                    last_seen[producer] = Some(seq);
                    ticks += 1;
                }
                CallEvent::Active {
                    has_background_call,
                    ..
                } => {
                    assert!(has_background_call);
                    actives += 1;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(ticks, 100);
        assert_eq!(actives, 1);
        assert!(last_seen.iter().all(|seen| *seen == Some(24)));
        let extra = tokio::time::timeout(Duration::from_millis(200), queue.next()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_mute_burst_collapses_to_latest() {
        let (normalizer, mut queue, _token) = setup();
        normalizer.on_mic_mute_state_change(true);
        normalizer.on_mic_mute_state_change(false);
        normalizer.on_mic_mute_state_change(true);
        normalizer.on_sound_routed(AudioRoute::Speaker);

        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::MuteChanged { is_muted: true }
        );
        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::AudioRouteChanged {
                route: AudioRoute::Speaker
            }
        );
    }

    #[tokio::test]
    async fn test_elapsed_ticks_are_not_collapsed() {
        let (normalizer, mut queue, _token) = setup();
        normalizer.on_elapsed_time_updated("00:01".to_string());
        normalizer.on_elapsed_time_updated("00:02".to_string());
        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::ElapsedTimeTick {
                text: "00:01".to_string()
            }
        );
        assert_eq!(
            next_event(&mut queue).await,
            CallEvent::ElapsedTimeTick {
                text: "00:02".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_events_after_teardown_are_dropped() {
        let (normalizer, mut queue, token) = setup();
        token.cancel();
        normalizer.on_incoming(false);
        normalizer.on_foreground_caller_info_updated(CallerInfo::default());
        assert!(queue.next().await.is_none());
    }
}
