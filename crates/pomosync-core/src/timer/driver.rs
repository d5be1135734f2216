//! Background task that ticks a shared [`TimerEngine`].

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use super::engine::TimerEngine;

/// Owns the tick loop. Dropping the driver cancels it.
pub struct TimerDriver {
    handle: JoinHandle<()>,
}

impl TimerDriver {
    /// Spawn the tick loop on the current tokio runtime.
    ///
    /// The loop sleeps until the engine's next tick is due and re-reads the
    /// schedule whenever the engine signals a change (start, pause, ...).
    pub fn spawn(engine: Arc<Mutex<TimerEngine>>) -> Self {
        let wake = match engine.lock() {
            Ok(e) => e.wake_handle(),
            Err(poisoned) => poisoned.into_inner().wake_handle(),
        };

        let handle = tokio::spawn(async move {
            loop {
                let delay = match engine.lock() {
                    Ok(e) => e.next_tick_delay(),
                    Err(_) => {
                        tracing::error!("timer engine lock poisoned; tick loop exiting");
                        return;
                    }
                };
                match delay {
                    Some(delay) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {
                                if let Ok(mut e) = engine.lock() {
                                    e.tick();
                                }
                            }
                            _ = wake.notified() => {}
                        }
                    }
                    None => wake.notified().await,
                }
            }
        });
        Self { handle }
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
