//! Orchestrator: starts one worker per enabled client and supervises them.
//!
//! ```text
//!   start_clients()            spawn workers in config order
//!        ↓
//!   monitor loop (1s poll)     reap exited workers, log exit codes
//!        ↓ all exited                  ↓ SIGINT / SIGTERM
//!   return                     request stop → wait ≤ shutdown_timeout → kill
//! ```
//!
//! A worker that fails to start is logged and skipped; its siblings run
//! regardless. Workers are never restarted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::FleetConfig;

pub mod worker;

pub use worker::{ProcessSpawner, Spawner, WorkerHandle, WorkerProcess, WorkerState, RUN_ID_ENV};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Orchestrator {
    config: FleetConfig,
    spawner: Arc<dyn Spawner>,
    workers: Vec<WorkerHandle>,
}

impl Orchestrator {
    pub fn new(config: FleetConfig, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            config,
            spawner,
            workers: Vec::new(),
        }
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn running(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Spawn a worker for every enabled client. Returns how many started.
    pub fn start_clients(&mut self) -> usize {
        let mut started = 0;
        for entry in &self.config.clients {
            if entry.config.disabled {
                info!(client = %entry.name, "Client disabled — skipping");
                continue;
            }
            let config = self.config.worker_config(entry);
            match self.spawner.spawn(&entry.name, &config, self.config.auth.as_ref()) {
                Ok(process) => {
                    let pid = process.pid();
                    info!(client = %entry.name, pid = pid.unwrap_or(0), "🚀 Client started");
                    self.workers.push(WorkerHandle {
                        name: entry.name.clone(),
                        pid,
                        config,
                        state: WorkerState::Running,
                        process,
                    });
                    started += 1;
                }
                Err(e) => {
                    error!(client = %entry.name, error = %e, "Failed to start client process");
                }
            }
        }

        info!(started, configured = self.config.clients.len(), "Fleet launched");
        started
    }

    // ── Monitor Loop ────────────────────────────────────────────────

    /// Supervise workers until they have all exited or `shutdown`
    /// resolves, in which case the stop protocol runs first.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.tick().await;

        loop {
            if self.running() == 0 {
                info!("All clients have finished");
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(running = self.running(), "🛑 Termination requested — stopping clients");
                    self.stop_all().await;
                    info!("All client processes terminated");
                    return Ok(());
                }
                _ = poll.tick() => self.reap(),
            }
        }
    }

    fn reap(&mut self) {
        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            match worker.process.try_wait() {
                Ok(Some(code)) => {
                    worker.state = WorkerState::Exited(code);
                    info!(client = %worker.name, pid = worker.pid.unwrap_or(0), exit_code = code, "Client exited");
                }
                Ok(None) => {}
                Err(e) => warn!(client = %worker.name, error = %e, "Failed to poll client process"),
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────

    async fn stop_all(&mut self) {
        self.reap();

        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            info!(client = %worker.name, pid = worker.pid.unwrap_or(0), "Requesting client stop");
            if let Err(e) = worker.process.request_stop() {
                warn!(client = %worker.name, error = %e, "Failed to signal client");
            }
        }

        let deadline = Instant::now() + self.config.shutdown_timeout();
        for worker in self.workers.iter_mut().filter(|w| w.is_running()) {
            let code = match tokio::time::timeout_at(deadline, worker.process.wait()).await {
                Ok(Ok(code)) => code,
                Ok(Err(e)) => {
                    error!(client = %worker.name, error = %e, "Failed to wait for client");
                    continue;
                }
                Err(_) => {
                    warn!(
                        client = %worker.name,
                        timeout_secs = self.config.shutdown_timeout,
                        "Client did not stop in time — killing"
                    );
                    if let Err(e) = worker.process.kill() {
                        error!(client = %worker.name, error = %e, "Failed to kill client");
                        continue;
                    }
                    match worker.process.wait().await {
                        Ok(code) => code,
                        Err(e) => {
                            error!(client = %worker.name, error = %e, "Failed to reap killed client");
                            continue;
                        }
                    }
                }
            };
            worker.state = WorkerState::Exited(code);
            info!(client = %worker.name, exit_code = code, "Client exited");
        }
    }
}
