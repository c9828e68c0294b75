//! Campaign lifecycle controller.
//!
//! Owns start/stop/reset orchestration for the single active campaign and
//! emits events for presentation layers.

use super::command::{CommandOutcome, ControlCommand};
use crate::engine::{RunnerControl, TrialRunner};
use crate::error::HarnessError;
use crate::evaluator::RecoveryEvaluator;
use crate::health::HealthCheck;
use crate::model::{AppSnapshot, CampaignSummary, HarnessEvent, RunnerConfig};
use crate::registry::AppRegistry;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// How long a stop may take before the user is told it is still in progress.
const STOP_WATCHDOG: Duration = Duration::from_secs(3);

/// Internal handle for a running campaign task.
struct RunCtx {
    app_id: usize,
    ctrl_tx: UnboundedSender<RunnerControl>,
    handle: Option<JoinHandle<CampaignSummary>>,
}

impl RunCtx {
    fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Translates control commands into campaign lifecycle calls.
///
/// At most one campaign runs at a time across the whole registry. Dropping the
/// plane closes the runner's control channel, which cancels the campaign at
/// its next checkpoint; call [`ControlPlane::shutdown`] to also wait for it.
pub struct ControlPlane {
    registry: Arc<AppRegistry>,
    cfg: RunnerConfig,
    evaluator: Arc<dyn RecoveryEvaluator>,
    health: Arc<dyn HealthCheck>,
    event_tx: UnboundedSender<HarnessEvent>,
    active: Mutex<Option<RunCtx>>,
}

impl ControlPlane {
    pub fn new(
        registry: Arc<AppRegistry>,
        cfg: RunnerConfig,
        evaluator: Arc<dyn RecoveryEvaluator>,
        health: Arc<dyn HealthCheck>,
        event_tx: UnboundedSender<HarnessEvent>,
    ) -> Self {
        Self {
            registry,
            cfg,
            evaluator,
            health,
            event_tx,
            active: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    /// Parse and run one command line.
    ///
    /// Malformed input, unknown verbs and out-of-range indices are ignored.
    /// Only a failure to launch the campaign task is returned as an error.
    pub async fn execute(&self, line: &str) -> Result<CommandOutcome, HarnessError> {
        let cmd = match ControlCommand::parse(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!("ignoring command {:?}: {e}", line.trim());
                return Ok(CommandOutcome::Ignored {
                    reason: e.to_string(),
                });
            }
        };

        match cmd {
            ControlCommand::Start(id) => match self.start(id).await {
                Err(e @ HarnessError::OutOfRange { .. }) => {
                    tracing::debug!("ignoring start: {e}");
                    Ok(CommandOutcome::Ignored {
                        reason: e.to_string(),
                    })
                }
                other => other,
            },
            ControlCommand::Stop => Ok(self.stop().await),
            ControlCommand::Reset(None) => {
                self.reset();
                Ok(CommandOutcome::Reset { id: None })
            }
            ControlCommand::Reset(Some(id)) => match self.registry.reset(id) {
                Ok(()) => {
                    tracing::info!("statistics reset for app {id}");
                    Ok(CommandOutcome::Reset { id: Some(id) })
                }
                Err(e) => {
                    tracing::debug!("ignoring reset: {e}");
                    Ok(CommandOutcome::Ignored {
                        reason: e.to_string(),
                    })
                }
            },
            ControlCommand::Status => Ok(CommandOutcome::Report(self.report())),
        }
    }

    /// Launch a campaign for app `id` unless one is already active.
    pub async fn start(&self, id: usize) -> Result<CommandOutcome, HarnessError> {
        let app = self.registry.get(id)?;
        let mut active = self.active.lock().await;

        if let Some(ctx) = active.as_ref() {
            if ctx.is_live() {
                if ctx.app_id == id {
                    tracing::warn!("App {id} is already running");
                    return Ok(CommandOutcome::AlreadyRunning { id });
                }
                tracing::warn!("App {} is running; ignoring start {id}", ctx.app_id);
                return Ok(CommandOutcome::Busy {
                    active: ctx.app_id,
                });
            }
        }
        // A campaign that ended on its own is reaped before the slot is reused.
        if let Some(ctx) = active.take() {
            self.join(ctx).await;
        }
        if self.registry.is_running(id)? {
            tracing::warn!("App {id} is already running");
            return Ok(CommandOutcome::AlreadyRunning { id });
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(e) => {
                tracing::error!("Failed to start app test task: {e}");
                return Err(HarnessError::Spawn(e.to_string()));
            }
        };

        self.registry.mark_running(id, true)?;
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<RunnerControl>();
        let runner = TrialRunner::new(
            app,
            self.cfg.clone(),
            self.registry.clone(),
            self.evaluator.clone(),
            self.health.clone(),
        );
        let event_tx = self.event_tx.clone();
        let handle = runtime.spawn(async move { runner.run(event_tx, ctrl_rx).await });
        *active = Some(RunCtx {
            app_id: id,
            ctrl_tx,
            handle: Some(handle),
        });

        tracing::info!("Started app {id}");
        Ok(CommandOutcome::Started { id })
    }

    /// Cancel the active campaign and wait until its task has exited.
    pub async fn stop(&self) -> CommandOutcome {
        let mut active = self.active.lock().await;
        let Some(ctx) = active.take() else {
            return CommandOutcome::NotRunning;
        };
        if !ctx.is_live() {
            self.join(ctx).await;
            return CommandOutcome::NotRunning;
        }

        let _ = ctx.ctrl_tx.send(RunnerControl::Cancel);
        let _ = self
            .event_tx
            .send(HarnessEvent::Info("Stopping…".into()));
        let summary = self.join(ctx).await;
        CommandOutcome::Stopped { summary }
    }

    /// Zero every app's counters. Does not affect a running campaign.
    pub fn reset(&self) {
        self.registry.reset_all();
        tracing::info!("statistics reset");
    }

    pub fn report(&self) -> Vec<AppSnapshot> {
        self.registry.report()
    }

    /// App id of the campaign currently running, if any.
    pub async fn active_app(&self) -> Option<usize> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|ctx| ctx.is_live())
            .map(|ctx| ctx.app_id)
    }

    /// Stop any active campaign before the owner releases shared resources.
    pub async fn shutdown(&self) {
        if let CommandOutcome::Stopped { .. } = self.stop().await {
            tracing::info!("active campaign stopped for shutdown");
        }
    }

    async fn join(&self, mut ctx: RunCtx) -> Option<CampaignSummary> {
        let mut handle = ctx.handle.take()?;
        let watchdog = tokio::time::sleep(STOP_WATCHDOG);
        tokio::pin!(watchdog);
        let mut warned = false;

        let res = loop {
            tokio::select! {
                res = &mut handle => break res,
                // If the task is stuck in a slow health check, keep the user informed.
                _ = &mut watchdog, if !warned => {
                    warned = true;
                    let _ = self.event_tx.send(HarnessEvent::Info("Still stopping…".into()));
                }
            }
        };
        // The runner clears the flag itself; this covers a task that panicked
        // before its guard was created.
        let _ = self.registry.mark_running(ctx.app_id, false);

        match res {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("app test task join failed: {e}");
                let _ = self
                    .event_tx
                    .send(HarnessEvent::Info(format!("Campaign task failed: {e}")));
                None
            }
        }
    }
}
