//! Main-thread marshaling
//!
//! Runner threads never touch the registry. They post boxed tasks through a
//! [`MainThreadHandle`]; the thread that owns the registry drains the
//! [`MainQueue`] and runs each task against it in arrival order.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use super::registry::ExecutionRegistry;

/// Work to run on the main thread against the registry
pub type MainTask = Box<dyn FnOnce(&mut ExecutionRegistry) + Send + 'static>;

/// Cloneable, thread-safe sender for main-thread work
#[derive(Clone)]
pub struct MainThreadHandle {
    tx: Sender<MainTask>,
}

impl MainThreadHandle {
    /// Queue `task` for the main thread.
    ///
    /// Returns false if the main queue is gone (application shutting down).
    pub fn dispatch(&self, task: impl FnOnce(&mut ExecutionRegistry) + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }
}

/// Receiving end, owned by the main thread
pub struct MainQueue {
    tx: Sender<MainTask>,
    rx: Receiver<MainTask>,
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> MainThreadHandle {
        MainThreadHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every task already queued. Never blocks.
    pub fn drain(&self, registry: &mut ExecutionRegistry) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(registry);
            ran += 1;
        }
        ran
    }

    /// Block up to `timeout` for the first task, then drain the rest
    pub fn wait_and_drain(&self, registry: &mut ExecutionRegistry, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task(registry);
                1 + self.drain(registry)
            }
            // The queue holds its own sender, so Disconnected can't happen in practice
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

/// Fixed-interval timer driven by the main loop
#[derive(Debug, Clone)]
pub struct TickTimer {
    interval: Duration,
    last: Instant,
}

impl TickTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the next tick is due
    pub fn until_next(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last))
    }

    /// True (and re-armed) if a tick is due at `now`
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
