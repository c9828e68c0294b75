use std::fmt;

/// States of a single trial.
///
/// `Abandoned` is entered when a checkpoint observes cancellation while a test
/// record is open; it closes the record without classifying the trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    SteadyState,
    FaultInjected,
    AwaitingRecovery,
    Verify,
    ManualAttempt,
    AutoSuccess,
    ManualSuccess,
    ManualFailed,
    Cooldown,
    Abandoned,
    Stopped,
}

impl TrialState {
    pub fn as_str(self) -> &'static str {
        match self {
            TrialState::SteadyState => "STEADY_STATE",
            TrialState::FaultInjected => "FAULT_INJECTED",
            TrialState::AwaitingRecovery => "AWAITING_RECOVERY",
            TrialState::Verify => "VERIFY",
            TrialState::ManualAttempt => "MANUAL_ATTEMPT",
            TrialState::AutoSuccess => "AUTO_SUCCESS",
            TrialState::ManualSuccess => "MANUAL_SUCCESS",
            TrialState::ManualFailed => "MANUAL_FAILED",
            TrialState::Cooldown => "COOLDOWN",
            TrialState::Abandoned => "ABANDONED",
            TrialState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label for the `trial`-th trial of `app`, unique within a campaign.
pub fn trial_label(app: &str, trial: u64) -> String {
    format!("{app}_trial_{trial}")
}
