//! Controller lifecycle and event loop.
//!
//! [`ClusterController::start`] opens the ConfigMap watch and spawns a
//! single event loop task. The loop owns the watch and the resync timer
//! and reacts to:
//!
//! - timer ticks: a reconciliation pass (the first tick fires at once),
//!   plus re-establishing the watch if an earlier attempt failed
//! - watch notifications: chains for document changes, a pass on errors
//! - watch closure: a replacement watch and one reconciliation pass
//! - the stop signal
//!
//! Passes, chains and watch re-establishment run on their own tasks, so
//! the loop never waits on the cluster and always sees the stop signal.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::controller::context::{Context, ControllerConfig};
use crate::controller::dispatcher::{Dispatch, dispatch};
use crate::controller::error::{Error, Result};
use crate::controller::reconciler::{ReconcileTrigger, reconcile_all};
use crate::gateway::{ClusterGateway, WatchHandle, WatchNotification};
use crate::health::HealthState;

/// Capacity of the watch notification channel
const NOTIFICATION_BUFFER: usize = 256;

/// An open watch and the channel it delivers to.
struct ActiveWatch {
    handle: WatchHandle,
    notifications: mpsc::Receiver<WatchNotification>,
    /// Set once an error on this watch has triggered a pass.
    reconciled_on_error: bool,
}

impl ActiveWatch {
    fn close(self) {
        self.handle.close();
    }
}

/// Open a watch over the controller's scope, bounded by the operation timeout.
async fn open_watch(ctx: &Context) -> Result<ActiveWatch> {
    let (sink, notifications) = mpsc::channel(NOTIFICATION_BUFFER);
    let timeout = ctx.config.operation_timeout;
    let handle = tokio::time::timeout(
        timeout,
        ctx.gateway
            .watch(&ctx.config.namespace, &ctx.config.selector, sink),
    )
    .await
    .map_err(|_| Error::Timeout {
        operation: "watch".to_string(),
        after: timeout,
    })??;
    Ok(ActiveWatch {
        handle,
        notifications,
        reconciled_on_error: false,
    })
}

/// Next notification from the active watch, or never if there is none.
///
/// A dropped sender reads as a closed watch.
async fn next_notification(watch: &mut Option<ActiveWatch>) -> WatchNotification {
    match watch {
        Some(active) => active
            .notifications
            .recv()
            .await
            .unwrap_or(WatchNotification::Closed(None)),
        None => std::future::pending().await,
    }
}

/// Watch-driven reconciliation controller for Kafka and Kafka Connect clusters.
pub struct ClusterController {
    context: Arc<Context>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ClusterController {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        config: ControllerConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            context: Arc::new(Context::new(gateway, config, health_state)),
            shutdown: None,
            task: None,
        }
    }

    /// Open the watch and start the event loop.
    ///
    /// Fails, leaving nothing running, if the watch cannot be opened.
    /// Starting a running controller is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let ctx = self.context.clone();
        info!(
            namespace = %ctx.config.namespace,
            selector = %ctx.config.selector,
            "Starting cluster controller"
        );

        let watch = open_watch(&ctx).await.map_err(|e| {
            error!(error = %e, "Failed to open ConfigMap watch");
            e
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(event_loop(ctx.clone(), watch, shutdown_rx)));

        if let Some(ref health) = ctx.health_state {
            health.set_ready(true).await;
        }
        Ok(())
    }

    /// Stop the event loop and close the watch.
    ///
    /// Chains already running finish on their own.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(ref health) = self.context.health_state {
            health.set_ready(false).await;
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::TaskFailed(format!("event loop: {}", e)))?;
            info!("Cluster controller stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// A watch being re-established in the background.
type PendingWatch = JoinHandle<Result<ActiveWatch>>;

/// Result of the pending re-establishment, or never if there is none.
async fn reopened(pending: &mut Option<PendingWatch>) -> Result<ActiveWatch> {
    match pending {
        Some(task) => task
            .await
            .unwrap_or_else(|e| Err(Error::TaskFailed(format!("watch: {}", e)))),
        None => std::future::pending().await,
    }
}

async fn event_loop(ctx: Arc<Context>, watch: ActiveWatch, mut shutdown: oneshot::Receiver<()>) {
    let mut watch = Some(watch);
    let mut pending: Option<PendingWatch> = None;
    let mut ticker = tokio::time::interval(ctx.config.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut trigger = ReconcileTrigger::Startup;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if watch.is_none() && pending.is_none() {
                    pending = Some(spawn_reopen(&ctx));
                }
                spawn_reconcile(&ctx, trigger);
                trigger = ReconcileTrigger::Periodic;
            }
            result = reopened(&mut pending) => {
                pending = None;
                match result {
                    Ok(active) => {
                        info!("ConfigMap watch re-established");
                        if let Some(ref health) = ctx.health_state {
                            health.metrics.record_watch_restart();
                        }
                        watch = Some(active);
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to re-establish ConfigMap watch, retrying on next tick");
                    }
                }
            }
            notification = next_notification(&mut watch) => {
                match dispatch(notification, &ctx.config.namespace, &ctx.config.selector) {
                    Dispatch::Chain(chain) => {
                        debug!(chain = %chain, "Watch notification");
                        ctx.runner.spawn(chain);
                    }
                    Dispatch::Reconcile => {
                        if let Some(active) = watch.as_mut() {
                            if !active.reconciled_on_error {
                                active.reconciled_on_error = true;
                                warn!("ConfigMap watch reported an error, reconciling");
                                spawn_reconcile(&ctx, ReconcileTrigger::WatchError);
                            }
                        }
                    }
                    Dispatch::Ignored(reason) => {
                        warn!(reason = %reason, "Ignoring watch notification");
                    }
                    Dispatch::Closed(reason) => {
                        let already_reconciled = watch
                            .take()
                            .map(|active| {
                                let reconciled = active.reconciled_on_error;
                                active.close();
                                reconciled
                            })
                            .unwrap_or(false);
                        warn!(reason = ?reason, "ConfigMap watch closed, re-establishing");
                        if pending.is_none() {
                            pending = Some(spawn_reopen(&ctx));
                        }
                        if !already_reconciled {
                            spawn_reconcile(&ctx, ReconcileTrigger::WatchClosed);
                        }
                    }
                }
            }
        }
    }

    if let Some(task) = pending.take() {
        task.abort();
    }
    if let Some(active) = watch.take() {
        active.close();
    }
    debug!("Event loop exited");
}

/// Start replacing a closed watch in the background.
fn spawn_reopen(ctx: &Arc<Context>) -> PendingWatch {
    let ctx = ctx.clone();
    tokio::spawn(async move { open_watch(&ctx).await })
}

fn spawn_reconcile(ctx: &Arc<Context>, trigger: ReconcileTrigger) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        reconcile_all(ctx, trigger).await;
    });
}
