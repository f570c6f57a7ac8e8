use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

const CLEAR: u8 = 0;
const STOP: u8 = 1;
const STATUS: u8 = 2;
const DUMP: u8 = 3;

/// Request observed when polling a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrupt {
    /// Nothing pending; keep running.
    None,
    /// Stop cleanly at the current sweep boundary.
    Stop,
    /// Report progress, then keep running.
    Status,
    /// Persist a snapshot, then keep running.
    Dump,
}

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Clones share state. A stop request is sticky; status and dump requests
/// are consumed by the poll that observes them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    /// Creates a token with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop at its next poll.
    pub fn request_stop(&self) {
        self.state.store(STOP, Ordering::SeqCst);
    }

    /// Asks the run to fire its status hooks at its next poll.
    pub fn request_status(&self) {
        self.request_side_effect(STATUS);
    }

    /// Asks the run to fire its dump hooks at its next poll.
    pub fn request_dump(&self) {
        self.request_side_effect(DUMP);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STOP
    }

    /// Clears any pending request, including a stop.
    pub fn reset(&self) {
        self.state.store(CLEAR, Ordering::SeqCst);
    }

    /// Observes the pending request.
    pub fn poll(&self) -> Interrupt {
        match self.state.load(Ordering::SeqCst) {
            STOP => Interrupt::Stop,
            pending @ (STATUS | DUMP) => {
                // a concurrent stop must survive the consume
                let _ = self.state.compare_exchange(
                    pending,
                    CLEAR,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                if pending == STATUS {
                    Interrupt::Status
                } else {
                    Interrupt::Dump
                }
            }
            _ => Interrupt::None,
        }
    }

    fn request_side_effect(&self, request: u8) {
        let _ = self
            .state
            .compare_exchange(CLEAR, request, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// How a run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The convergence criterion was met.
    Completed,
    /// A stop request ended the run; state is consistent and may be persisted.
    Stopped,
}

impl RunStatus {
    /// Whether the run was interrupted.
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunStatus::Stopped)
    }
}

/// Call sites at which registered hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// End of each sweep or batch.
    Sweep,
    /// Each modification factor change.
    ModificationFactor,
    /// Each replica exchange attempt, whatever its outcome.
    Exchange,
    /// Each measurement.
    Measurement,
    /// End of each weight refinement iteration.
    Iteration,
    /// A status request was observed.
    Status,
    /// A dump request was observed.
    Dump,
    /// A stop request was observed.
    Terminate,
}

/// Callback invoked with the simulation after its state was mutated.
pub type Hook<S> = Box<dyn FnMut(&S) + Send>;

/// Registered hooks of a simulation of type `S`.
pub struct Hooks<S> {
    registered: BTreeMap<HookEvent, Vec<Hook<S>>>,
}

impl<S> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            registered: BTreeMap::new(),
        }
    }
}

impl<S> fmt::Debug for Hooks<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self
            .registered
            .iter()
            .map(|(event, hooks)| (*event, hooks.len()))
            .collect();
        f.debug_struct("Hooks").field("registered", &counts).finish()
    }
}

impl<S> Hooks<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` for `event`. Hooks fire in registration order.
    pub fn register(&mut self, event: HookEvent, hook: impl FnMut(&S) + Send + 'static) {
        self.registered
            .entry(event)
            .or_default()
            .push(Box::new(hook));
    }

    /// Number of hooks registered for `event`.
    pub fn count(&self, event: HookEvent) -> usize {
        self.registered.get(&event).map_or(0, Vec::len)
    }

    /// Invokes every hook registered for `event`.
    pub fn fire(&mut self, event: HookEvent, subject: &S) {
        if let Some(hooks) = self.registered.get_mut(&event) {
            for hook in hooks.iter_mut() {
                hook(subject);
            }
        }
    }

    /// Polls `token` and fires the matching hooks.
    ///
    /// Returns true when the run must stop.
    pub fn check_interrupt(&mut self, token: &CancellationToken, subject: &S) -> bool {
        match token.poll() {
            Interrupt::None => false,
            Interrupt::Status => {
                self.fire(HookEvent::Status, subject);
                false
            }
            Interrupt::Dump => {
                self.fire(HookEvent::Dump, subject);
                false
            }
            Interrupt::Stop => {
                warn!("stop requested, leaving run loop");
                self.fire(HookEvent::Terminate, subject);
                true
            }
        }
    }
}
