//! Post-recovery health checks.
//!
//! A check answers one question: does the application still work after the
//! driver recovered? The runner asks once after the recovery window and once
//! more after a manual recovery attempt.

use crate::error::HarnessError;
use crate::registry::AppDefinition;
use async_trait::async_trait;
use rand::Rng;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, app: &AppDefinition) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPass;

#[async_trait]
impl HealthCheck for AlwaysPass {
    async fn check(&self, _app: &AppDefinition) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFail;

#[async_trait]
impl HealthCheck for AlwaysFail {
    async fn check(&self, _app: &AppDefinition) -> bool {
        false
    }
}

/// Passes the first `pass` of every `every` calls.
#[derive(Debug)]
pub struct Flaky {
    pass: u64,
    every: u64,
    calls: AtomicU64,
}

impl Flaky {
    pub fn new(pass: u64, every: u64) -> Result<Self, HarnessError> {
        if every == 0 || pass > every {
            return Err(HarnessError::InvalidHealthCheck(format!(
                "flaky:{pass}/{every} needs 0 <= N <= M and M > 0"
            )));
        }
        Ok(Self {
            pass,
            every,
            calls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl HealthCheck for Flaky {
    async fn check(&self, _app: &AppDefinition) -> bool {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        n % self.every < self.pass
    }
}

/// Passes with a fixed probability.
#[derive(Debug, Clone, Copy)]
pub struct RandomCheck {
    probability: f64,
}

impl RandomCheck {
    pub fn new(probability: f64) -> Result<Self, HarnessError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(HarnessError::InvalidHealthCheck(format!(
                "random:{probability} must be within 0..=1"
            )));
        }
        Ok(Self { probability })
    }
}

#[async_trait]
impl HealthCheck for RandomCheck {
    async fn check(&self, _app: &AppDefinition) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

/// CLI-facing description of which health check to build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthCheckKind {
    AlwaysPass,
    AlwaysFail,
    Flaky { pass: u64, every: u64 },
    Random { probability: f64 },
}

impl HealthCheckKind {
    pub fn build(self) -> Result<Arc<dyn HealthCheck>, HarnessError> {
        Ok(match self {
            HealthCheckKind::AlwaysPass => Arc::new(AlwaysPass),
            HealthCheckKind::AlwaysFail => Arc::new(AlwaysFail),
            HealthCheckKind::Flaky { pass, every } => Arc::new(Flaky::new(pass, every)?),
            HealthCheckKind::Random { probability } => Arc::new(RandomCheck::new(probability)?),
        })
    }
}

impl FromStr for HealthCheckKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarnessError::InvalidHealthCheck(s.to_string());
        let s = s.trim();
        match s {
            "always-pass" => return Ok(HealthCheckKind::AlwaysPass),
            "always-fail" => return Ok(HealthCheckKind::AlwaysFail),
            _ => {}
        }
        if let Some(rest) = s.strip_prefix("flaky:") {
            let (pass, every) = rest.split_once('/').ok_or_else(invalid)?;
            let pass = pass.trim().parse().map_err(|_| invalid())?;
            let every = every.trim().parse().map_err(|_| invalid())?;
            Flaky::new(pass, every)?;
            return Ok(HealthCheckKind::Flaky { pass, every });
        }
        if let Some(rest) = s.strip_prefix("random:") {
            let probability = rest.trim().parse().map_err(|_| invalid())?;
            RandomCheck::new(probability)?;
            return Ok(HealthCheckKind::Random { probability });
        }
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverClass;

    fn app() -> AppDefinition {
        AppDefinition {
            id: 0,
            name: "mp3_player".into(),
            driver_class: DriverClass::Sound,
        }
    }

    #[tokio::test]
    async fn flaky_passes_first_n_of_every_m() {
        let check = Flaky::new(2, 3).unwrap();
        let mut got = Vec::new();
        for _ in 0..7 {
            got.push(check.check(&app()).await);
        }
        assert_eq!(got, vec![true, true, false, true, true, false, true]);
    }

    #[tokio::test]
    async fn random_extremes_are_deterministic() {
        let app = app();
        assert!(RandomCheck::new(1.0).unwrap().check(&app).await);
        assert!(!RandomCheck::new(0.0).unwrap().check(&app).await);
        assert!(RandomCheck::new(1.5).is_err());
    }

    #[test]
    fn health_check_arg_parsing() {
        assert_eq!(
            "always-pass".parse::<HealthCheckKind>().unwrap(),
            HealthCheckKind::AlwaysPass
        );
        assert_eq!(
            "flaky:1/4".parse::<HealthCheckKind>().unwrap(),
            HealthCheckKind::Flaky { pass: 1, every: 4 }
        );
        assert_eq!(
            "random:0.25".parse::<HealthCheckKind>().unwrap(),
            HealthCheckKind::Random { probability: 0.25 }
        );
        assert!("flaky:5/4".parse::<HealthCheckKind>().is_err());
        assert!("flaky:1".parse::<HealthCheckKind>().is_err());
        assert!("sometimes".parse::<HealthCheckKind>().is_err());
    }
}
