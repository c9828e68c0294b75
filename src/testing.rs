//! Deterministic fakes shared by unit tests.

use crate::evaluator::RecoveryEvaluator;
use crate::health::HealthCheck;
use crate::model::{DriverClass, RecoveryPhase, RunnerConfig};
use crate::registry::AppDefinition;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorCall {
    Start {
        label: String,
        driver_class: DriverClass,
    },
    Event {
        test: Option<String>,
        phase: RecoveryPhase,
        message: String,
    },
    End {
        success: bool,
    },
}

/// Records every evaluator call in order.
#[derive(Debug, Default)]
pub struct RecordingEvaluator {
    calls: Mutex<Vec<EvaluatorCall>>,
}

impl RecordingEvaluator {
    pub fn calls(&self) -> Vec<EvaluatorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started_labels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EvaluatorCall::Start { label, .. } => Some(label),
                _ => None,
            })
            .collect()
    }
}

impl RecoveryEvaluator for RecordingEvaluator {
    fn start_test(&self, label: &str, driver_class: DriverClass) {
        self.calls.lock().unwrap().push(EvaluatorCall::Start {
            label: label.to_string(),
            driver_class,
        });
    }

    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str) {
        self.calls.lock().unwrap().push(EvaluatorCall::Event {
            test: test.map(str::to_string),
            phase,
            message: message.to_string(),
        });
    }

    fn end_test(&self, success: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(EvaluatorCall::End { success });
    }
}

/// Returns queued answers in order, then passes.
#[derive(Debug)]
pub struct ScriptedHealth {
    answers: Mutex<VecDeque<bool>>,
}

impl ScriptedHealth {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl HealthCheck for ScriptedHealth {
    async fn check(&self, _app: &AppDefinition) -> bool {
        self.answers.lock().unwrap().pop_front().unwrap_or(true)
    }
}

/// Default trial timings with a custom trial limit.
///
/// One trial takes 1s workload + 2s recovery window, then 1s cooldown.
pub fn trial_config(max_trials: u64) -> RunnerConfig {
    RunnerConfig {
        max_trials,
        workload_duration: Duration::from_secs(1),
        recovery_delay: Duration::from_secs(2),
        manual_recovery_delay: Duration::from_secs(1),
        cooldown: Duration::from_secs(1),
        poll_interval: Duration::from_millis(100),
    }
}
