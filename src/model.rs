use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timing and limits for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub max_trials: u64,
    #[serde(with = "humantime_serde")]
    pub workload_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub recovery_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub manual_recovery_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_trials: 400,
            workload_duration: Duration::from_secs(1),
            recovery_delay: Duration::from_secs(2),
            manual_recovery_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Category of target component a test subject exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverClass {
    Sound,
    Network,
    Storage,
}

impl DriverClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverClass::Sound => "sound",
            DriverClass::Network => "network",
            DriverClass::Storage => "storage",
        }
    }
}

impl fmt::Display for DriverClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverClass {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sound" => Ok(DriverClass::Sound),
            "network" => Ok(DriverClass::Network),
            "storage" => Ok(DriverClass::Storage),
            other => Err(HarnessError::UnknownDriverClass(other.to_string())),
        }
    }
}

/// How a single trial recovered. Exactly one is recorded per completed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    Automatic,
    Manual,
    Failed,
}

impl RecoveryOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, RecoveryOutcome::Failed)
    }
}

/// Lifecycle milestones reported to the recovery evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryPhase {
    FailureDetected,
    DriverRestarting,
    RecoveryComplete,
    RecoveryFailed,
}

impl RecoveryPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryPhase::FailureDetected => "failure_detected",
            RecoveryPhase::DriverRestarting => "driver_restarting",
            RecoveryPhase::RecoveryComplete => "recovery_complete",
            RecoveryPhase::RecoveryFailed => "recovery_failed",
        }
    }
}

/// Timestamped record written by evaluator sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseEvent {
    TestStarted {
        timestamp_utc: String,
        test: String,
        driver_class: DriverClass,
    },
    Phase {
        timestamp_utc: String,
        test: Option<String>,
        phase: RecoveryPhase,
        message: String,
    },
    TestEnded {
        timestamp_utc: String,
        test: Option<String>,
        success: bool,
    },
}

/// RFC 3339 wall-clock timestamp for event records.
pub fn now_utc_string() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

/// Progress events emitted by the runner and controller for presentation layers.
#[derive(Debug, Clone)]
pub enum HarnessEvent {
    TrialStarted {
        label: String,
    },
    TrialCompleted {
        label: String,
        outcome: RecoveryOutcome,
    },
    TrialAbandoned {
        label: String,
    },
    CampaignFinished {
        // Box keeps the enum small; the summary is only sent once per campaign.
        summary: Box<CampaignSummary>,
    },
    Info(String),
}

impl HarnessEvent {
    /// Render a human-readable progress line.
    pub fn to_message(&self) -> String {
        match self {
            HarnessEvent::TrialStarted { label } => format!("== {label} =="),
            HarnessEvent::TrialCompleted { label, outcome } => {
                format!("{label}: {outcome:?} recovery")
            }
            HarnessEvent::TrialAbandoned { label } => format!("{label}: abandoned"),
            HarnessEvent::CampaignFinished { summary } => format!(
                "Campaign for {} finished after {} trials{}",
                summary.app,
                summary.trials_completed,
                if summary.cancelled { " (stopped)" } else { "" }
            ),
            HarnessEvent::Info(msg) => msg.clone(),
        }
    }
}

/// What a runner reports when its task exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub app_id: usize,
    pub app: String,
    pub trials_completed: u64,
    pub cancelled: bool,
}

/// Recovery counts for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCounts {
    pub trials: u64,
    pub automatic: u64,
    pub manual: u64,
    pub failed: u64,
}

/// Percentages of trials, one decimal place, 0 when no trials have run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPercentages {
    pub automatic: f64,
    pub manual: f64,
    pub failed: f64,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub id: usize,
    pub name: String,
    pub driver_class: DriverClass,
    pub is_running: bool,
    pub counts: RecoveryCounts,
    pub percentages: RecoveryPercentages,
}
