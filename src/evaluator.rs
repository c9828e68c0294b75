//! Sinks for recovery lifecycle events.
//!
//! The runner only talks to [`RecoveryEvaluator`]; where the events end up is
//! the sink's concern.

use crate::model::{now_utc_string, DriverClass, PhaseEvent, RecoveryPhase};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Consumer of test records and phase events.
///
/// `start_test` and `end_test` are strictly paired by the caller. `add_event`
/// with no explicit test applies to the currently open record.
pub trait RecoveryEvaluator: Send + Sync {
    fn start_test(&self, label: &str, driver_class: DriverClass);
    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str);
    fn end_test(&self, success: bool);
}

impl<T: RecoveryEvaluator + ?Sized> RecoveryEvaluator for Arc<T> {
    fn start_test(&self, label: &str, driver_class: DriverClass) {
        (**self).start_test(label, driver_class)
    }

    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str) {
        (**self).add_event(test, phase, message)
    }

    fn end_test(&self, success: bool) {
        (**self).end_test(success)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Logs every evaluator call through `tracing`.
#[derive(Debug, Default)]
pub struct LogEvaluator {
    current: Mutex<Option<String>>,
}

impl LogEvaluator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecoveryEvaluator for LogEvaluator {
    fn start_test(&self, label: &str, driver_class: DriverClass) {
        *lock(&self.current) = Some(label.to_string());
        tracing::info!(test = label, driver_class = %driver_class, "test started");
    }

    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str) {
        let current = lock(&self.current);
        let test = test.or(current.as_deref()).unwrap_or("-");
        tracing::info!(test, phase = phase.as_str(), "{message}");
    }

    fn end_test(&self, success: bool) {
        let label = lock(&self.current).take();
        tracing::info!(test = label.as_deref().unwrap_or("-"), success, "test ended");
    }
}

struct JsonLinesState {
    out: BufWriter<File>,
    current: Option<String>,
}

/// Appends one JSON record per evaluator call to a file.
pub struct JsonLinesEvaluator {
    state: Mutex<JsonLinesState>,
}

impl JsonLinesEvaluator {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event log at {}", path.display()))?;
        Ok(Self {
            state: Mutex::new(JsonLinesState {
                out: BufWriter::new(file),
                current: None,
            }),
        })
    }

    fn write(state: &mut JsonLinesState, event: &PhaseEvent) {
        let res = serde_json::to_writer(&mut state.out, event)
            .map_err(anyhow::Error::from)
            .and_then(|_| writeln!(state.out).map_err(anyhow::Error::from))
            .and_then(|_| state.out.flush().map_err(anyhow::Error::from));
        if let Err(e) = res {
            tracing::warn!("failed to write evaluator event: {e:#}");
        }
    }
}

impl RecoveryEvaluator for JsonLinesEvaluator {
    fn start_test(&self, label: &str, driver_class: DriverClass) {
        let mut state = lock(&self.state);
        state.current = Some(label.to_string());
        let event = PhaseEvent::TestStarted {
            timestamp_utc: now_utc_string(),
            test: label.to_string(),
            driver_class,
        };
        Self::write(&mut state, &event);
    }

    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str) {
        let mut state = lock(&self.state);
        let test = test.map(str::to_string).or_else(|| state.current.clone());
        let event = PhaseEvent::Phase {
            timestamp_utc: now_utc_string(),
            test,
            phase,
            message: message.to_string(),
        };
        Self::write(&mut state, &event);
    }

    fn end_test(&self, success: bool) {
        let mut state = lock(&self.state);
        let test = state.current.take();
        let event = PhaseEvent::TestEnded {
            timestamp_utc: now_utc_string(),
            test,
            success,
        };
        Self::write(&mut state, &event);
    }
}

/// Fans each call out to several sinks.
pub struct FanoutEvaluator {
    sinks: Vec<Box<dyn RecoveryEvaluator>>,
}

impl FanoutEvaluator {
    pub fn new(sinks: Vec<Box<dyn RecoveryEvaluator>>) -> Self {
        Self { sinks }
    }
}

impl RecoveryEvaluator for FanoutEvaluator {
    fn start_test(&self, label: &str, driver_class: DriverClass) {
        for sink in &self.sinks {
            sink.start_test(label, driver_class);
        }
    }

    fn add_event(&self, test: Option<&str>, phase: RecoveryPhase, message: &str) {
        for sink in &self.sinks {
            sink.add_event(test, phase, message);
        }
    }

    fn end_test(&self, success: bool) {
        for sink in &self.sinks {
            sink.end_test(success);
        }
    }
}
