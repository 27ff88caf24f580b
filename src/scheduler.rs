//! Periodic background tasks.
//!
//! Each task runs on its own interval in a tokio task. All of them watch a
//! shared shutdown channel and exit on the next select, so
//! [`Scheduler::shutdown`] returns only once every loop has stopped.

use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<(), TaskError>;
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Runs `task` every `every`, first run one interval from now.
    /// A failing run is logged and the loop carries on.
    pub fn spawn(&mut self, task: Arc<dyn Task>, every: Duration) {
        let mut stop = self.shutdown.subscribe();
        info!("Task {} will run every {:?}", task.name(), every);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Running task {}", task.name());
                        if let Err(e) = task.run().await {
                            error!("Task {} failed: {}", task.name(), e);
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            debug!("Task {} stopped", task.name());
        });
        self.handles.push(handle);
    }

    /// Signals every task to stop and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Background task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Task for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run(&self) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_shutdown() {
        let counter = Arc::new(Counter {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let mut scheduler = Scheduler::new();
        scheduler.spawn(counter.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.shutdown().await;
        let runs = counter.runs.load(Ordering::SeqCst);
        assert_eq!(runs, 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), runs);
    }
}
