//! # Dispatch Queue
//!
//! Serializes backend events, internal timers and user actions onto a single
//! consumer. Producers hold a cloneable [`Dispatcher`]; the controller event
//! loop owns the [`DispatchQueue`].
//!
//! Every message carries the generation of its kind at enqueue time.
//! [`Dispatcher::cancel_pending`] bumps that generation, so anything of the
//! kind still in flight (queued or sleeping on a delay) is dropped on
//! delivery. This is the only way a later message may supersede an earlier
//! one; everything else is delivered in arrival order.
//! [`Dispatcher::expedite`] moves a delayed message forward instead of
//! dropping it.

use crate::event::{CallEvent, EventKind};
use crate::presentation::UiAction;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;


/// Internal timers scheduled by the presentation drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// One ping of the incoming-call widget.
    IncomingPing,
    /// Dismiss the ended-call screen.
    Finish,
}

#[derive(Debug, Clone)]
pub enum Message {
    Event(CallEvent),
    Timer(TimerKind),
    Action(UiAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Event(EventKind),
    Timer(TimerKind),
    Action,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Event(event) => MessageKind::Event(event.kind()),
            Message::Timer(timer) => MessageKind::Timer(*timer),
            Message::Action(_) => MessageKind::Action,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch queue closed")]
    Closed,
}

struct Envelope {
    message: Message,
    generation: u64,
}

struct Parked {
    kind: MessageKind,
    generation: u64,
    message: Message,
}

#[derive(Default)]
struct LedgerInner {
    generations: HashMap<MessageKind, u64>,
    delayed: BTreeMap<u64, Parked>,
    next_seq: u64,
}

impl LedgerInner {
    fn current(&self, kind: MessageKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or_default()
    }

    fn bump(&mut self, kind: MessageKind) -> u64 {
        self.delayed.retain(|_, parked| parked.kind != kind);
        let generation = self.generations.entry(kind).or_default();
        *generation += 1;
        *generation
    }

    fn send(
        &self,
        tx: &mpsc::UnboundedSender<Envelope>,
        parked: Parked,
    ) -> Result<(), DispatchError> {
        if self.current(parked.kind) != parked.generation {
            return Ok(());
        }
        tx.send(Envelope {
            message: parked.message,
            generation: parked.generation,
        })
        .map_err(|_| DispatchError::Closed)
    }
}

/// Generations per kind plus the delayed messages still waiting out their
/// delay. Delayed sends happen under the lock so an expedited message can
/// never overtake or duplicate its own timer.
#[derive(Default)]
struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self, kind: MessageKind) -> u64 {
        self.lock().current(kind)
    }

    fn bump(&self, kind: MessageKind) -> u64 {
        self.lock().bump(kind)
    }

    fn park(&self, message: Message, generation: u64) -> u64 {
        let mut inner = self.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.delayed.insert(
            seq,
            Parked {
                kind: message.kind(),
                generation,
                message,
            },
        );
        seq
    }

    fn fire(&self, seq: u64, tx: &mpsc::UnboundedSender<Envelope>) {
        let mut inner = self.lock();
        if let Some(parked) = inner.delayed.remove(&seq) {
            inner.send(tx, parked).ok();
        }
    }

    fn expedite(
        &self,
        kind: MessageKind,
        tx: &mpsc::UnboundedSender<Envelope>,
    ) -> Result<(), DispatchError> {
        let mut inner = self.lock();
        let due: Vec<u64> = inner
            .delayed
            .iter()
            .filter(|(_, parked)| parked.kind == kind)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in due {
            if let Some(parked) = inner.delayed.remove(&seq) {
                inner.send(tx, parked)?;
            }
        }
        Ok(())
    }
}

/// Producer side of the queue. Cheap to clone, safe to use from any thread,
/// including threads outside the runtime.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    ledger: Arc<Ledger>,
    cancel_token: CancellationToken,
    runtime: Handle,
}

/// Consumer side of the queue.
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<Envelope>,
    ledger: Arc<Ledger>,
    cancel_token: CancellationToken,
}

/// Create a queue whose lifetime is bound to `cancel_token`.
///
/// Must be called from within a Tokio runtime: delayed messages are timed on
/// that runtime whichever thread schedules them.
pub fn channel(cancel_token: CancellationToken) -> (Dispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ledger = Arc::new(Ledger::default());
    (
        Dispatcher {
            tx,
            ledger: ledger.clone(),
            cancel_token: cancel_token.clone(),
            runtime: Handle::current(),
        },
        DispatchQueue {
            rx,
            ledger,
            cancel_token,
        },
    )
}

impl Dispatcher {
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.tx.is_closed()
    }

    /// Append to the tail of the queue.
    pub fn enqueue(&self, message: Message) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let generation = self.ledger.current(message.kind());
        self.tx
            .send(Envelope {
                message,
                generation,
            })
            .map_err(|_| DispatchError::Closed)
    }

    /// Deliver no earlier than `delay` from now.
    pub fn enqueue_delayed(&self, message: Message, delay: Duration) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let generation = self.ledger.current(message.kind());
        self.schedule(message, generation, delay);
        Ok(())
    }

    /// Drop every not-yet-delivered message of `kind`, delayed ones included.
    pub fn cancel_pending(&self, kind: MessageKind) {
        self.ledger.bump(kind);
    }

    /// Deliver every delayed message of `kind` now, ahead of anything
    /// enqueued afterwards.
    pub fn expedite(&self, kind: MessageKind) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        self.ledger.expedite(kind, &self.tx)
    }

    /// Cancel pending messages of the same kind, then enqueue.
    pub fn replace(&self, message: Message) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let generation = self.ledger.bump(message.kind());
        self.tx
            .send(Envelope {
                message,
                generation,
            })
            .map_err(|_| DispatchError::Closed)
    }

    /// Cancel pending messages of the same kind, then enqueue after `delay`.
    /// At most one message of the kind is pending afterwards.
    pub fn replace_delayed(&self, message: Message, delay: Duration) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let generation = self.ledger.bump(message.kind());
        self.schedule(message, generation, delay);
        Ok(())
    }

    fn schedule(&self, message: Message, generation: u64, delay: Duration) {
        let seq = self.ledger.park(message, generation);
        let tx = self.tx.clone();
        let ledger = self.ledger.clone();
        let cancel_token = self.cancel_token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => ledger.fire(seq, &tx),
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

impl DispatchQueue {
    /// Wait for the next live message. Returns `None` once the queue is torn down.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return None,
                envelope = self.rx.recv() => envelope?,
            };
            let kind = envelope.message.kind();
            if self.ledger.current(kind) == envelope.generation {
                return Some(envelope.message);
            }
            debug!(?kind, "dropping superseded message");
        }
    }
}
