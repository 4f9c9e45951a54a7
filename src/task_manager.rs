//! Manages the lifecycle of the long-running tasks spawned by an `App`.
use crate::utils::sync::lock;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Tracks named tasks and awaits them on shutdown.
///
/// Tasks are expected to watch the shared shutdown receiver and exit on
/// their own; `shutdown` only waits for them.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a task and keeps its handle.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        lock(&self.handles).push((name, handle));
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Names of the tasks spawned so far.
    pub fn task_names(&self) -> Vec<&'static str> {
        lock(&self.handles).iter().map(|(name, _)| *name).collect()
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles = lock(&self.handles).drain(..).collect::<Vec<_>>();
        info!(tasks = handles.len(), "TaskManager shutting down, waiting for tasks");

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut panicked = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name = name, error = %e, "Task failed during shutdown.");
                    panicked.push(name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(tasks = ?panicked, "Some tasks did not shut down cleanly");
        }
    }
}
