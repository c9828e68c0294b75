//! Line grammar of the control surface.

use crate::model::{AppSnapshot, CampaignSummary};
use thiserror::Error;

/// Parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start(usize),
    Stop,
    /// Zero counters of one app, or of every app when no index is given.
    Reset(Option<usize>),
    /// Read the status document. Accepted as `status` or `report`.
    Status,
}

/// Why a line was not understood. Never surfaced as a failure of the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownVerb(String),
    #[error("start needs an app index")]
    MissingIndex,
    #[error("invalid app index: {0}")]
    BadIndex(String),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().ok_or(CommandError::Empty)?;
        match verb {
            "start" => {
                let index = tokens.next().ok_or(CommandError::MissingIndex)?;
                index
                    .parse::<usize>()
                    .map(ControlCommand::Start)
                    .map_err(|_| CommandError::BadIndex(index.to_string()))
            }
            "stop" => Ok(ControlCommand::Stop),
            "reset" => match tokens.next() {
                None => Ok(ControlCommand::Reset(None)),
                Some(index) => index
                    .parse::<usize>()
                    .map(|id| ControlCommand::Reset(Some(id)))
                    .map_err(|_| CommandError::BadIndex(index.to_string())),
            },
            "status" | "report" => Ok(ControlCommand::Status),
            other => Err(CommandError::UnknownVerb(other.to_string())),
        }
    }
}

/// What a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Started { id: usize },
    /// The targeted app already has an active campaign.
    AlreadyRunning { id: usize },
    /// Another app's campaign holds the single slot.
    Busy { active: usize },
    Stopped { summary: Option<CampaignSummary> },
    NotRunning,
    Reset { id: Option<usize> },
    Report(Vec<AppSnapshot>),
    Ignored { reason: String },
}

impl CommandOutcome {
    /// One-line acknowledgement for the transport; `None` for silent outcomes.
    pub fn to_message(&self) -> Option<String> {
        match self {
            CommandOutcome::Started { id } => Some(format!("Started app {id}")),
            CommandOutcome::AlreadyRunning { id } => Some(format!("App {id} is already running")),
            CommandOutcome::Busy { active } => {
                Some(format!("App {active} is running; stop it first"))
            }
            CommandOutcome::Stopped { summary: Some(s) } => Some(format!(
                "Stopped {} after {} trials",
                s.app, s.trials_completed
            )),
            CommandOutcome::Stopped { summary: None } => Some("Stopped".to_string()),
            CommandOutcome::Reset { id: None } => Some("Statistics reset".to_string()),
            CommandOutcome::Reset { id: Some(id) } => Some(format!("Statistics reset for app {id}")),
            CommandOutcome::NotRunning
            | CommandOutcome::Report(_)
            | CommandOutcome::Ignored { .. } => None,
        }
    }
}
