mod checkpoint;
mod trial;

pub use trial::{trial_label, TrialState};

use crate::evaluator::RecoveryEvaluator;
use crate::health::HealthCheck;
use crate::model::{CampaignSummary, HarnessEvent, RecoveryOutcome, RecoveryPhase, RunnerConfig};
use crate::registry::{AppDefinition, AppRegistry};
use checkpoint::{wait_or_cancel, Checkpoint};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum RunnerControl {
    /// Stop the campaign at the next checkpoint
    Cancel,
}

/// Clears the subject's running flag when the campaign task ends, however it ends.
struct RunningGuard {
    registry: Arc<AppRegistry>,
    id: usize,
}

impl RunningGuard {
    fn new(registry: Arc<AppRegistry>, id: usize) -> Self {
        let _ = registry.mark_running(id, true);
        Self { registry, id }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let _ = self.registry.mark_running(self.id, false);
    }
}

/// Runs one campaign of trials against a single registry entry.
pub struct TrialRunner {
    app: AppDefinition,
    cfg: RunnerConfig,
    registry: Arc<AppRegistry>,
    evaluator: Arc<dyn RecoveryEvaluator>,
    health: Arc<dyn HealthCheck>,
}

impl TrialRunner {
    pub fn new(
        app: AppDefinition,
        cfg: RunnerConfig,
        registry: Arc<AppRegistry>,
        evaluator: Arc<dyn RecoveryEvaluator>,
        health: Arc<dyn HealthCheck>,
    ) -> Self {
        Self {
            app,
            cfg,
            registry,
            evaluator,
            health,
        }
    }

    /// Run trials until the limit is reached or a cancel is requested.
    ///
    /// Closing `control_rx`'s sender counts as a cancel request, so the task
    /// never outlives the controller that launched it.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<HarnessEvent>,
        mut control_rx: mpsc::UnboundedReceiver<RunnerControl>,
    ) -> CampaignSummary {
        let _running = RunningGuard::new(self.registry.clone(), self.app.id);
        let cancel = Arc::new(AtomicBool::new(false));

        // Control listener.
        let cancel2 = cancel.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    RunnerControl::Cancel => break,
                }
            }
            cancel2.store(true, Ordering::Relaxed);
        });

        tracing::info!(
            app = %self.app.name,
            driver_class = %self.app.driver_class,
            max_trials = self.cfg.max_trials,
            "campaign started"
        );

        let summary = self.run_trials(&cancel, &event_tx).await;

        // Dropping a JoinHandle does not cancel the task; abort the listener explicitly.
        control_handle.abort();

        tracing::info!(
            app = %summary.app,
            trials = summary.trials_completed,
            cancelled = summary.cancelled,
            "campaign finished"
        );
        let _ = event_tx.send(HarnessEvent::CampaignFinished {
            summary: Box::new(summary.clone()),
        });
        summary
    }

    async fn pause(&self, duration: Duration, cancel: &AtomicBool) -> Checkpoint {
        wait_or_cancel(duration, self.cfg.poll_interval, cancel).await
    }

    async fn run_trials(
        &self,
        cancel: &AtomicBool,
        event_tx: &mpsc::UnboundedSender<HarnessEvent>,
    ) -> CampaignSummary {
        let mut state = TrialState::SteadyState;
        let mut trial: u64 = 0;
        let mut label = String::new();
        let mut record_open = false;
        let mut cancelled = false;

        loop {
            tracing::debug!(app = %self.app.name, trial, state = %state, "trial state");
            state = match state {
                TrialState::SteadyState => {
                    if trial >= self.cfg.max_trials {
                        TrialState::Stopped
                    } else if cancel.load(Ordering::Relaxed) {
                        cancelled = true;
                        TrialState::Stopped
                    } else {
                        label = trial_label(&self.app.name, trial);
                        self.evaluator.start_test(&label, self.app.driver_class);
                        record_open = true;
                        let _ = event_tx.send(HarnessEvent::TrialStarted {
                            label: label.clone(),
                        });
                        match self.pause(self.cfg.workload_duration, cancel).await {
                            Checkpoint::Elapsed => TrialState::FaultInjected,
                            Checkpoint::Cancelled => TrialState::Abandoned,
                        }
                    }
                }
                TrialState::FaultInjected => {
                    self.evaluator.add_event(
                        None,
                        RecoveryPhase::FailureDetected,
                        &format!("Injected fault in {}", self.app.driver_class),
                    );
                    TrialState::AwaitingRecovery
                }
                TrialState::AwaitingRecovery => {
                    match self.pause(self.cfg.recovery_delay, cancel).await {
                        Checkpoint::Elapsed => TrialState::Verify,
                        Checkpoint::Cancelled => TrialState::Abandoned,
                    }
                }
                TrialState::Verify => {
                    if self.health.check(&self.app).await {
                        TrialState::AutoSuccess
                    } else {
                        TrialState::ManualAttempt
                    }
                }
                TrialState::ManualAttempt => {
                    self.evaluator.add_event(
                        None,
                        RecoveryPhase::DriverRestarting,
                        "Attempting manual recovery",
                    );
                    match self.pause(self.cfg.manual_recovery_delay, cancel).await {
                        Checkpoint::Cancelled => TrialState::Abandoned,
                        Checkpoint::Elapsed => {
                            if self.health.check(&self.app).await {
                                TrialState::ManualSuccess
                            } else {
                                TrialState::ManualFailed
                            }
                        }
                    }
                }
                TrialState::AutoSuccess => {
                    self.complete_trial(&label, RecoveryOutcome::Automatic, event_tx);
                    record_open = false;
                    trial += 1;
                    TrialState::Cooldown
                }
                TrialState::ManualSuccess => {
                    self.complete_trial(&label, RecoveryOutcome::Manual, event_tx);
                    record_open = false;
                    trial += 1;
                    TrialState::Cooldown
                }
                TrialState::ManualFailed => {
                    self.complete_trial(&label, RecoveryOutcome::Failed, event_tx);
                    record_open = false;
                    trial += 1;
                    TrialState::Cooldown
                }
                TrialState::Cooldown => match self.pause(self.cfg.cooldown, cancel).await {
                    Checkpoint::Cancelled => {
                        cancelled = true;
                        TrialState::Stopped
                    }
                    Checkpoint::Elapsed if trial >= self.cfg.max_trials => TrialState::Stopped,
                    Checkpoint::Elapsed => TrialState::SteadyState,
                },
                TrialState::Abandoned => {
                    if record_open {
                        self.evaluator.end_test(false);
                        record_open = false;
                    }
                    tracing::info!(app = %self.app.name, test = %label, "trial abandoned");
                    let _ = event_tx.send(HarnessEvent::TrialAbandoned {
                        label: label.clone(),
                    });
                    cancelled = true;
                    TrialState::Stopped
                }
                TrialState::Stopped => break,
            };
        }

        CampaignSummary {
            app_id: self.app.id,
            app: self.app.name.clone(),
            trials_completed: trial,
            cancelled,
        }
    }

    /// Record, report and close a classified trial.
    fn complete_trial(
        &self,
        label: &str,
        outcome: RecoveryOutcome,
        event_tx: &mpsc::UnboundedSender<HarnessEvent>,
    ) {
        if let Err(e) = self.registry.record_outcome(self.app.id, outcome) {
            tracing::warn!("failed to record outcome for {label}: {e}");
        }
        let (phase, message) = match outcome {
            RecoveryOutcome::Automatic => {
                (RecoveryPhase::RecoveryComplete, "Automatic recovery successful")
            }
            RecoveryOutcome::Manual => (RecoveryPhase::RecoveryComplete, "Manual recovery successful"),
            RecoveryOutcome::Failed => (RecoveryPhase::RecoveryFailed, "Recovery failed"),
        };
        self.evaluator.add_event(None, phase, message);
        self.evaluator.end_test(outcome.is_success());
        let _ = event_tx.send(HarnessEvent::TrialCompleted {
            label: label.to_string(),
            outcome,
        });
    }
}
