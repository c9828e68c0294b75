//! Catalog of test subjects and their accumulated recovery statistics.
//!
//! The registry is shared by the control plane and the single active runner.
//! Each outcome counter is its own atomic: writers for an entry are limited to
//! the one runner bound to it, and readers may observe a snapshot taken between
//! two updates. The trial count is the sum of the outcome counters, so no
//! interleaving of record and reset can make them disagree.

use crate::error::HarnessError;
use crate::metrics;
use crate::model::{AppSnapshot, DriverClass, RecoveryCounts, RecoveryOutcome};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Immutable definition of a test subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDefinition {
    pub id: usize,
    pub name: String,
    pub driver_class: DriverClass,
}

#[derive(Debug, Default)]
struct AppCounters {
    automatic: AtomicU64,
    manual: AtomicU64,
    failed: AtomicU64,
    running: AtomicBool,
}

impl AppCounters {
    fn load(&self) -> RecoveryCounts {
        let automatic = self.automatic.load(Ordering::Relaxed);
        let manual = self.manual.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        RecoveryCounts {
            trials: automatic + manual + failed,
            automatic,
            manual,
            failed,
        }
    }

    fn zero(&self) {
        self.automatic.store(0, Ordering::Relaxed);
        self.manual.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct AppEntry {
    definition: AppDefinition,
    counters: AppCounters,
}

#[derive(Debug)]
pub struct AppRegistry {
    entries: Vec<AppEntry>,
}

impl AppRegistry {
    /// Build a registry from `(name, class)` pairs; ids follow registration order.
    pub fn new<I, S>(catalog: I) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = (S, DriverClass)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (id, (name, driver_class)) in catalog.into_iter().enumerate() {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(HarnessError::DuplicateApp(name));
            }
            entries.push(AppEntry {
                definition: AppDefinition {
                    id,
                    name,
                    driver_class,
                },
                counters: AppCounters::default(),
            });
        }
        if entries.is_empty() {
            return Err(HarnessError::EmptyCatalog);
        }
        Ok(Self { entries })
    }

    /// The stock catalog of simulated applications.
    pub fn with_default_catalog() -> Self {
        let catalog = [
            ("mp3_player", DriverClass::Sound),
            ("audio_recorder", DriverClass::Sound),
            ("network_file_transfer", DriverClass::Network),
            ("network_analyzer", DriverClass::Network),
            ("compiler", DriverClass::Storage),
            ("database", DriverClass::Storage),
        ];
        let entries = catalog
            .into_iter()
            .enumerate()
            .map(|(id, (name, driver_class))| AppEntry {
                definition: AppDefinition {
                    id,
                    name: name.to_string(),
                    driver_class,
                },
                counters: AppCounters::default(),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, id: usize) -> Result<&AppEntry, HarnessError> {
        self.entries.get(id).ok_or(HarnessError::OutOfRange {
            id,
            len: self.entries.len(),
        })
    }

    pub fn get(&self, id: usize) -> Result<AppDefinition, HarnessError> {
        Ok(self.entry(id)?.definition.clone())
    }

    pub fn is_running(&self, id: usize) -> Result<bool, HarnessError> {
        Ok(self.entry(id)?.counters.running.load(Ordering::Acquire))
    }

    /// Set the running flag. The controller keeps this true for at most one id.
    pub fn mark_running(&self, id: usize, running: bool) -> Result<(), HarnessError> {
        self.entry(id)?
            .counters
            .running
            .store(running, Ordering::Release);
        Ok(())
    }

    /// Count one completed trial and its outcome.
    pub fn record_outcome(&self, id: usize, outcome: RecoveryOutcome) -> Result<(), HarnessError> {
        let counters = &self.entry(id)?.counters;
        let slot = match outcome {
            RecoveryOutcome::Automatic => &counters.automatic,
            RecoveryOutcome::Manual => &counters.manual,
            RecoveryOutcome::Failed => &counters.failed,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Zero one entry's counters. Does not touch the running flag.
    pub fn reset(&self, id: usize) -> Result<(), HarnessError> {
        self.entry(id)?.counters.zero();
        Ok(())
    }

    pub fn reset_all(&self) {
        for entry in &self.entries {
            entry.counters.zero();
        }
    }

    /// Snapshots in registration order.
    pub fn report(&self) -> Vec<AppSnapshot> {
        self.entries
            .iter()
            .map(|entry| {
                let counts = entry.counters.load();
                AppSnapshot {
                    id: entry.definition.id,
                    name: entry.definition.name.clone(),
                    driver_class: entry.definition.driver_class,
                    is_running: entry.counters.running.load(Ordering::Acquire),
                    percentages: metrics::compute_percentages(&counts),
                    counts,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_ordered_and_idle() {
        let registry = AppRegistry::with_default_catalog();
        assert_eq!(registry.len(), 6);
        let app = registry.get(0).unwrap();
        assert_eq!(app.name, "mp3_player");
        assert_eq!(app.driver_class, DriverClass::Sound);
        assert_eq!(registry.get(5).unwrap().name, "database");
        assert!(registry.report().iter().all(|s| !s.is_running));
    }

    #[test]
    fn get_rejects_out_of_range() {
        let registry = AppRegistry::with_default_catalog();
        assert!(matches!(
            registry.get(6),
            Err(HarnessError::OutOfRange { id: 6, len: 6 })
        ));
        assert!(registry.record_outcome(99, RecoveryOutcome::Manual).is_err());
    }

    #[test]
    fn custom_catalog_rejects_duplicates_and_empty() {
        let dup = AppRegistry::new([("a", DriverClass::Sound), ("a", DriverClass::Network)]);
        assert!(matches!(dup, Err(HarnessError::DuplicateApp(name)) if name == "a"));

        let empty = AppRegistry::new(Vec::<(String, DriverClass)>::new());
        assert!(matches!(empty, Err(HarnessError::EmptyCatalog)));

        let ok = AppRegistry::new([("a", DriverClass::Sound), ("b", DriverClass::Storage)]).unwrap();
        assert_eq!(ok.get(1).unwrap().id, 1);
    }

    #[test]
    fn record_outcome_keeps_trials_equal_to_sum() {
        let registry = AppRegistry::with_default_catalog();
        registry.record_outcome(2, RecoveryOutcome::Automatic).unwrap();
        registry.record_outcome(2, RecoveryOutcome::Automatic).unwrap();
        registry.record_outcome(2, RecoveryOutcome::Manual).unwrap();
        registry.record_outcome(2, RecoveryOutcome::Failed).unwrap();

        let snap = &registry.report()[2];
        assert_eq!(snap.counts.trials, 4);
        assert_eq!(
            snap.counts.automatic + snap.counts.manual + snap.counts.failed,
            snap.counts.trials
        );
        assert_eq!(snap.percentages.automatic, 50.0);
        assert_eq!(snap.percentages.failed, 25.0);
        assert_eq!(registry.report()[0].counts, RecoveryCounts::default());
    }

    #[test]
    fn trials_track_outcomes_across_interleaved_resets() {
        let registry = AppRegistry::with_default_catalog();
        for round in 0..4u64 {
            registry.record_outcome(0, RecoveryOutcome::Automatic).unwrap();
            if round % 2 == 0 {
                registry.reset(0).unwrap();
            } else {
                registry.reset_all();
            }
            registry.record_outcome(0, RecoveryOutcome::Failed).unwrap();

            let c = registry.report()[0].counts;
            assert_eq!(c.trials, 1);
            assert_eq!(c.failed, 1);
            assert_eq!(c.automatic + c.manual + c.failed, c.trials);
        }
    }

    #[test]
    fn reset_zeroes_counters_but_keeps_running_flag() {
        let registry = AppRegistry::with_default_catalog();
        registry.mark_running(1, true).unwrap();
        registry.record_outcome(1, RecoveryOutcome::Failed).unwrap();
        registry.record_outcome(3, RecoveryOutcome::Manual).unwrap();

        registry.reset(1).unwrap();
        assert_eq!(registry.report()[1].counts.trials, 0);
        assert_eq!(registry.report()[3].counts.trials, 1);

        registry.reset_all();
        registry.reset_all();
        let report = registry.report();
        assert!(report.iter().all(|s| s.counts == RecoveryCounts::default()));
        assert!(report.iter().all(|s| s.percentages.automatic == 0.0));
        assert!(report[1].is_running);
    }
}
