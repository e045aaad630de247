use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Wake-ups delivered to the supervising loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SupervisorEvent {
    WorkerFinished(String),
    Interrupted,
}

#[derive(Default)]
struct Shared {
    triggered: AtomicBool,
    waker: Mutex<Option<Sender<SupervisorEvent>>>,
}

/// Operator cancellation, shared by the supervisor and every worker.
///
/// Triggering is advisory: the supervisor stops waiting and drains with what
/// has been committed, and workers are expected to notice `is_triggered()` and
/// return on their own. Nothing is forcibly stopped.
#[derive(Clone, Default)]
pub struct Interrupt {
    shared: Arc<Shared>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        // flag and wake-up change under the waker lock so `attach` never misses one
        let waker = self.shared.waker.lock();
        if let Ok(waker) = &waker {
            if let Some(tx) = waker.as_ref() {
                let _ = tx.send(SupervisorEvent::Interrupted);
            }
        }
        self.shared.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.shared.triggered.load(Ordering::SeqCst)
    }

    /// Route future triggers to a supervisor. An earlier trigger is delivered immediately.
    pub(crate) fn attach(&self, tx: Sender<SupervisorEvent>) {
        if let Ok(mut waker) = self.shared.waker.lock() {
            if self.is_triggered() {
                let _ = tx.send(SupervisorEvent::Interrupted);
            }
            *waker = Some(tx);
        }
    }

    pub(crate) fn detach(&self) {
        if let Ok(mut waker) = self.shared.waker.lock() {
            waker.take();
        }
    }
}
