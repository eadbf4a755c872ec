//! Command dispatcher
//!
//! Runs device operations off the event loop and reports their results back
//! to it. Each [`CommandKind`] has one slot: while an operation of that kind
//! is in flight, further requests of the same kind are rejected. Distinct
//! kinds run concurrently.
//!
//! Results are delivered as [`DispatchEvent`]s on an unbounded channel that
//! the event loop drains once per tick. The in-flight slot is released
//! before the completion is sent, so whatever reacts to a completion may
//! immediately invoke the same kind again.

use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use crate::error::RemoteError;
use crate::models::{CommandKind, DeviceRecord, NowPlaying, RemoteCommand};
use crate::pairing::{PairingEvent, PairingReport};
use crate::session::DeviceSession;

/// Identifies one invocation
pub type Ticket = u64;

/// Successful result of an operation
#[derive(Debug, Clone)]
pub enum Outcome {
    Discovered(Vec<DeviceRecord>),
    Connected(Arc<DeviceSession>),
    Paired(PairingReport),
    CommandSent(RemoteCommand),
    NowPlaying(NowPlaying),
}

/// A finished operation
#[derive(Debug, Clone)]
pub struct Completion {
    pub kind: CommandKind,
    pub ticket: Ticket,
    pub result: Result<Outcome, RemoteError>,
}

/// Everything background work reports to the event loop
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Finished(Completion),
    Pairing(PairingEvent),
}

struct Slot {
    ticket: Ticket,
    abort: Option<AbortHandle>,
}

type Slots = Arc<Mutex<HashMap<CommandKind, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<CommandKind, Slot>> {
    // A panic never happens while the map is held, but don't wedge the UI if it did
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a slot when its task ends, however it ends
struct SlotGuard {
    slots: Slots,
    kind: CommandKind,
    ticket: Ticket,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if slots.get(&self.kind).map(|s| s.ticket) == Some(self.ticket) {
            slots.remove(&self.kind);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Per-kind single-flight task runner
pub struct Dispatcher {
    slots: Slots,
    next_ticket: Ticket,
    /// Most recent ticket issued per kind
    latest: HashMap<CommandKind, Ticket>,
    /// Ticket whose completion was already accepted, per kind
    settled: HashMap<CommandKind, Ticket>,
    events: mpsc::UnboundedSender<DispatchEvent>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiving end of its event channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                slots: Arc::new(Mutex::new(HashMap::new())),
                next_ticket: 0,
                latest: HashMap::new(),
                settled: HashMap::new(),
                events,
            },
            rx,
        )
    }

    /// Sender for progress events from long-running operations
    pub fn sender(&self) -> mpsc::UnboundedSender<DispatchEvent> {
        self.events.clone()
    }

    pub fn is_in_flight(&self, kind: CommandKind) -> bool {
        lock(&self.slots).contains_key(&kind)
    }

    pub fn in_flight(&self) -> Vec<CommandKind> {
        lock(&self.slots).keys().copied().collect()
    }

    /// Start `operation` as `kind`.
    ///
    /// Returns [`RemoteError::ConcurrencyRejected`] without running anything
    /// if `kind` is already in flight. Must be called inside a tokio runtime.
    pub fn invoke<F>(&mut self, kind: CommandKind, operation: F) -> Result<Ticket, RemoteError>
    where
        F: Future<Output = Result<Outcome, RemoteError>> + Send + 'static,
    {
        let ticket = {
            let mut slots = lock(&self.slots);
            if slots.contains_key(&kind) {
                debug!("{} rejected: already in flight", kind);
                return Err(RemoteError::ConcurrencyRejected(kind.to_string()));
            }
            self.next_ticket += 1;
            let ticket = self.next_ticket;
            slots.insert(
                kind,
                Slot {
                    ticket,
                    abort: None,
                },
            );
            ticket
        };
        self.latest.insert(kind, ticket);

        let guard = SlotGuard {
            slots: Arc::clone(&self.slots),
            kind,
            ticket,
        };
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("{} task panicked: {}", kind, message);
                    Err(RemoteError::Protocol(format!("internal error: {}", message)))
                }
            };
            drop(guard);
            if events
                .send(DispatchEvent::Finished(Completion {
                    kind,
                    ticket,
                    result,
                }))
                .is_err()
            {
                debug!("{} finished after the event loop closed", kind);
            }
        });

        // The task may already be done, in which case its slot is gone
        if let Some(slot) = lock(&self.slots).get_mut(&kind) {
            if slot.ticket == ticket {
                slot.abort = Some(handle.abort_handle());
            }
        }

        debug!(ticket, "{} started", kind);
        Ok(ticket)
    }

    /// Cancel the in-flight operation of `kind`.
    ///
    /// The slot is free as soon as this returns. A `Cancelled` completion is
    /// queued for the event loop. Returns false if nothing was running.
    pub fn cancel(&mut self, kind: CommandKind) -> bool {
        let slot = lock(&self.slots).remove(&kind);
        let Some(slot) = slot else {
            return false;
        };
        if let Some(abort) = slot.abort {
            abort.abort();
        }
        debug!(ticket = slot.ticket, "{} cancelled", kind);
        if self
            .events
            .send(DispatchEvent::Finished(Completion {
                kind,
                ticket: slot.ticket,
                result: Err(RemoteError::Cancelled),
            }))
            .is_err()
        {
            warn!("Event loop closed while cancelling {}", kind);
        }
        true
    }

    /// Cancel everything in flight (shutdown)
    pub fn cancel_all(&mut self) {
        for kind in self.in_flight() {
            self.cancel(kind);
        }
    }

    /// Whether a completion should be applied.
    ///
    /// Completions from superseded invocations, and the second of two
    /// completions for the same ticket (a result racing its cancellation),
    /// are dropped.
    pub fn accept(&mut self, completion: &Completion) -> bool {
        let kind = completion.kind;
        if self.latest.get(&kind) != Some(&completion.ticket) {
            debug!(ticket = completion.ticket, "dropping stale {} result", kind);
            return false;
        }
        if self.settled.get(&kind) == Some(&completion.ticket) {
            debug!(ticket = completion.ticket, "dropping duplicate {} result", kind);
            return false;
        }
        self.settled.insert(kind, completion.ticket);
        true
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.in_flight())
            .field("next_ticket", &self.next_ticket)
            .finish()
    }
}
