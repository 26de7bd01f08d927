//! Periodic dispatch/reconcile scheduler.
//!
//! Runs both loops on one background thread with its own current-thread
//! runtime. Besides the two intervals it listens on the engine's trigger
//! channel, so a new job is dispatched right away and a dispatch that
//! submitted tasks is followed by a reconciliation pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};

use super::{DispatchOutcome, Engine, Trigger};
use crate::config::SchedulerConfig;

pub struct Scheduler {
    engine: Arc<Engine>,
    dispatch_interval: Duration,
    reconcile_interval: Duration,
    max_jobs_per_tick: u32,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        dispatch_interval: Duration,
        reconcile_interval: Duration,
        max_jobs_per_tick: u32,
    ) -> Self {
        Self {
            engine,
            dispatch_interval,
            reconcile_interval,
            max_jobs_per_tick: max_jobs_per_tick.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(engine: Arc<Engine>, config: &SchedulerConfig) -> Self {
        Self::new(
            engine,
            Duration::from_secs(config.dispatch_interval_secs),
            Duration::from_secs(config.reconcile_interval_secs),
            config.max_jobs_per_tick,
        )
    }

    /// Starts the loop in a background thread.
    ///
    /// `trigger_rx` should come from `Engine::subscribe` before any job is
    /// created so that no signal is missed.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<Trigger>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let dispatch_interval = self.dispatch_interval;
        let reconcile_interval = self.reconcile_interval;
        let max_jobs = self.max_jobs_per_tick;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to build scheduler runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut dispatch_timer = tokio::time::interval(dispatch_interval);
                let mut reconcile_timer = tokio::time::interval(reconcile_interval);
                dispatch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                reconcile_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                log::info!(
                    "Scheduler started (dispatch every {:?}, reconcile every {:?})",
                    dispatch_interval,
                    reconcile_interval
                );

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    let (dispatch, reconcile) = tokio::select! {
                        _ = dispatch_timer.tick() => (true, false),
                        _ = reconcile_timer.tick() => (false, true),
                        msg = trigger_rx.recv() => match msg {
                            Ok(Trigger::Dispatch) => (true, false),
                            Ok(Trigger::Reconcile) => (false, true),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                log::warn!("Scheduler missed {} triggers, running both loops", skipped);
                                (true, true)
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                        _ = wake.notified() => (false, false),
                    };

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    if dispatch {
                        dispatch_tick(&engine, max_jobs).await;
                    }
                    if reconcile {
                        reconcile_tick(&engine).await;
                    }
                }

                log::info!("Scheduler stopped");
            });
        })
    }

    /// Signals the scheduler to stop after the current pass.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

async fn dispatch_tick(engine: &Engine, max_jobs: u32) {
    for _ in 0..max_jobs {
        match engine.run_dispatch_once().await {
            Ok(DispatchOutcome::Idle) => break,
            Ok(outcome) => log::debug!("Dispatch: {:?}", outcome),
            Err(e) => {
                log::error!("Dispatch failed: {}", e);
                break;
            }
        }
    }
}

async fn reconcile_tick(engine: &Engine) {
    match engine.run_reconciliation_once().await {
        Ok(report) if !report.errors.is_empty() => {
            log::warn!(
                "Reconciliation finished with {} task errors",
                report.errors.len()
            );
        }
        Ok(report) if report.resolved + report.failed + report.expired > 0 => {
            log::info!(
                "Reconciliation: {} resolved, {} failed, {} expired",
                report.resolved,
                report.failed,
                report.expired
            );
        }
        Err(e) => log::error!("Reconciliation failed: {}", e),
        _ => {}
    }
}
