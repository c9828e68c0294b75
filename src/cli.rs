use crate::error::HarnessError;
use crate::evaluator::{FanoutEvaluator, JsonLinesEvaluator, LogEvaluator, RecoveryEvaluator};
use crate::health::HealthCheckKind;
use crate::model::{DriverClass, HarnessEvent, RunnerConfig};
use crate::orchestrator::{CommandOutcome, ControlPlane};
use crate::registry::AppRegistry;
use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// `name=class` entry for a custom app catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppArg {
    pub name: String,
    pub driver_class: DriverClass,
}

fn parse_app_arg(s: &str) -> Result<AppArg, String> {
    let (name, class) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=CLASS, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("app name must not be empty".into());
    }
    let driver_class = class.parse().map_err(|e: HarnessError| e.to_string())?;
    Ok(AppArg {
        name: name.to_string(),
        driver_class,
    })
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "app-test-harness",
    version,
    about = "Drive simulated applications through fault injection and classify how they recover",
    after_help = "Commands are read from stdin, one per line: start <index>, stop, reset [index], status"
)]
pub struct Cli {
    /// Trials per campaign
    #[arg(long, default_value_t = 400)]
    pub max_trials: u64,

    /// Simulated application workload before each fault
    #[arg(long, default_value = "1s")]
    pub workload_duration: humantime::Duration,

    /// Wait after injecting a fault before verifying recovery
    #[arg(long, default_value = "2s")]
    pub recovery_delay: humantime::Duration,

    /// Wait during the manual recovery attempt
    #[arg(long, default_value = "1s")]
    pub manual_recovery_delay: humantime::Duration,

    /// Delay between trials
    #[arg(long, default_value = "1s")]
    pub cooldown: humantime::Duration,

    /// How often delays check for a stop request
    #[arg(long, default_value = "100ms")]
    pub poll_interval: humantime::Duration,

    /// Post-recovery check: always-pass, always-fail, flaky:N/M or random:P
    #[arg(long, default_value = "always-pass")]
    pub health_check: HealthCheckKind,

    /// Custom app catalog entry NAME=CLASS (sound, network, storage); repeatable
    #[arg(long = "app", value_parser = parse_app_arg)]
    pub apps: Vec<AppArg>,

    /// Start a campaign for this app index on launch
    #[arg(long)]
    pub start: Option<usize>,

    /// Exit once the active campaign finishes instead of at end of input
    #[arg(long)]
    pub exit_on_finish: bool,

    /// Print status reports as JSON
    #[arg(long)]
    pub json: bool,

    /// Append evaluator events as JSON lines to this file
    #[arg(long)]
    pub events_out: Option<std::path::PathBuf>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Build a `RunnerConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunnerConfig {
    RunnerConfig {
        max_trials: args.max_trials,
        workload_duration: Duration::from(args.workload_duration),
        recovery_delay: Duration::from(args.recovery_delay),
        manual_recovery_delay: Duration::from(args.manual_recovery_delay),
        cooldown: Duration::from(args.cooldown),
        poll_interval: Duration::from(args.poll_interval),
    }
}

fn build_registry(args: &Cli) -> Result<AppRegistry> {
    if args.apps.is_empty() {
        return Ok(AppRegistry::with_default_catalog());
    }
    let catalog = args
        .apps
        .iter()
        .map(|a| (a.name.clone(), a.driver_class));
    AppRegistry::new(catalog).context("invalid app catalog")
}

fn build_evaluator(args: &Cli) -> Result<Arc<dyn RecoveryEvaluator>> {
    let Some(path) = args.events_out.as_deref() else {
        return Ok(Arc::new(LogEvaluator::new()));
    };
    let json = JsonLinesEvaluator::create(path)?;
    Ok(Arc::new(FanoutEvaluator::new(vec![
        Box::new(LogEvaluator::new()),
        Box::new(json),
    ])))
}

/// Render a command outcome to the output writer.
fn emit_outcome(
    args: &Cli,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    outcome: &CommandOutcome,
) -> Result<()> {
    match outcome {
        CommandOutcome::Report(snapshots) => {
            if args.json {
                let _ = out_tx.send(OutputLine::Stdout(crate::report::build_json_report(
                    snapshots,
                )?));
            } else {
                for line in crate::report::build_text_report(snapshots).lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
        }
        other => {
            if let Some(msg) = other.to_message() {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
        }
    }
    Ok(())
}

/// Whether `ev` ends the command loop.
///
/// Single-flight means a finished campaign is the one that was launched, so the
/// event alone decides; the task may not have returned yet.
fn ends_session(ev: &HarnessEvent, exit_on_finish: bool) -> bool {
    exit_on_finish && matches!(ev, HarnessEvent::CampaignFinished { .. })
}

/// Feed command lines to the control plane and print runner events until input
/// ends, the campaign finishes under `--exit-on-finish`, or `interrupt` resolves.
async fn serve<R, F>(
    args: &Cli,
    control: &ControlPlane,
    input: R,
    event_rx: &mut mpsc::UnboundedReceiver<HarnessEvent>,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    interrupt: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    // Polled across iterations so a signal that arrives mid-command is kept.
    tokio::pin!(interrupt);
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) => match control.execute(&line).await {
                        Ok(outcome) => emit_outcome(args, out_tx, &outcome)?,
                        Err(e) => {
                            let _ = out_tx.send(OutputLine::Stderr(format!("Error: {e}")));
                        }
                    },
                    Ok(None) => {
                        input_open = false;
                        if !args.exit_on_finish || control.active_app().await.is_none() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("stdin read failed: {e}");
                        input_open = false;
                        if !args.exit_on_finish || control.active_app().await.is_none() {
                            break;
                        }
                    }
                }
            }
            Some(ev) = event_rx.recv() => {
                let done = ends_session(&ev, args.exit_on_finish);
                let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
                if done {
                    break;
                }
            }
            _ = &mut interrupt => {
                let _ = out_tx.send(OutputLine::Stderr("Interrupted, stopping…".into()));
                break;
            }
        }
    }
    Ok(())
}

pub async fn run(args: Cli) -> Result<()> {
    let registry = Arc::new(build_registry(&args)?);
    let evaluator = build_evaluator(&args)?;
    let health = args
        .health_check
        .build()
        .context("invalid --health-check")?;

    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<HarnessEvent>();
    let control = ControlPlane::new(registry, build_config(&args), evaluator, health, event_tx);

    tracing::info!(
        apps = control.registry().len(),
        "App Test Harness loaded; send commands on stdin"
    );

    if let Some(id) = args.start {
        let outcome = control
            .execute(&format!("start {id}"))
            .await
            .context("failed to start campaign")?;
        emit_outcome(&args, &out_tx, &outcome)?;
    }

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    serve(
        &args,
        &control,
        BufReader::new(tokio::io::stdin()),
        &mut event_rx,
        &out_tx,
        interrupted,
    )
    .await?;

    control.shutdown().await;
    while let Ok(ev) = event_rx.try_recv() {
        let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
    }
    emit_outcome(&args, &out_tx, &CommandOutcome::Report(control.report()))?;

    drop(out_tx);
    let _ = out_handle.await;
    tracing::info!("App Test Harness unloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::AlwaysPass;
    use crate::testing::{trial_config, RecordingEvaluator};
    use tokio::io::AsyncWriteExt;

    struct Session {
        control: ControlPlane,
        event_rx: mpsc::UnboundedReceiver<HarnessEvent>,
        out_tx: mpsc::UnboundedSender<OutputLine>,
        out_rx: mpsc::UnboundedReceiver<OutputLine>,
    }

    fn session(max_trials: u64) -> Session {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let control = ControlPlane::new(
            Arc::new(AppRegistry::with_default_catalog()),
            trial_config(max_trials),
            Arc::new(RecordingEvaluator::default()),
            Arc::new(AlwaysPass),
            event_tx,
        );
        Session {
            control,
            event_rx,
            out_tx,
            out_rx,
        }
    }

    fn stderr_lines(rx: &mut mpsc::UnboundedReceiver<OutputLine>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            if let OutputLine::Stderr(msg) = line {
                lines.push(msg);
            }
        }
        lines
    }

    #[test]
    fn only_a_finished_campaign_ends_the_session() {
        let finished = HarnessEvent::CampaignFinished {
            summary: Box::new(crate::model::CampaignSummary {
                app_id: 0,
                app: "mp3_player".into(),
                trials_completed: 1,
                cancelled: false,
            }),
        };
        assert!(ends_session(&finished, true));
        assert!(!ends_session(&finished, false));
        assert!(!ends_session(&HarnessEvent::Info("Stopping…".into()), true));
    }

    #[tokio::test(start_paused = true)]
    async fn exit_on_finish_returns_once_campaign_finishes_with_input_open() {
        let args = Cli::parse_from(["app-test-harness", "--exit-on-finish"]);
        let mut s = session(1);
        let (input, mut writer) = tokio::io::duplex(64);
        writer.write_all(b"start 0\n").await.unwrap();

        let served = tokio::time::timeout(
            Duration::from_secs(60),
            serve(
                &args,
                &s.control,
                BufReader::new(input),
                &mut s.event_rx,
                &s.out_tx,
                std::future::pending(),
            ),
        )
        .await;
        assert!(served.is_ok(), "command loop kept waiting after the campaign ended");
        served.unwrap().unwrap();

        assert_eq!(s.control.report()[0].counts.trials, 1);
        let lines = stderr_lines(&mut s.out_rx);
        assert!(lines.iter().any(|l| l.contains("finished after 1 trials")));
        s.control.shutdown().await;
        drop(writer);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_on_finish_waits_for_campaign_after_input_ends() {
        let args = Cli::parse_from(["app-test-harness", "--exit-on-finish"]);
        let mut s = session(2);

        let served = tokio::time::timeout(
            Duration::from_secs(60),
            serve(
                &args,
                &s.control,
                &b"start 0\n"[..],
                &mut s.event_rx,
                &s.out_tx,
                std::future::pending(),
            ),
        )
        .await;
        served.unwrap().unwrap();
        assert_eq!(s.control.report()[0].counts.trials, 2);
        s.control.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_ends_session_with_input_open() {
        let args = Cli::parse_from(["app-test-harness"]);
        let mut s = session(400);
        let (input, mut writer) = tokio::io::duplex(64);
        writer.write_all(b"start 1\nstop\nstart 1\n").await.unwrap();

        let served = tokio::time::timeout(
            Duration::from_secs(60),
            serve(
                &args,
                &s.control,
                BufReader::new(input),
                &mut s.event_rx,
                &s.out_tx,
                tokio::time::sleep(Duration::from_secs(5)),
            ),
        )
        .await;
        served.unwrap().unwrap();

        let lines = stderr_lines(&mut s.out_rx);
        assert_eq!(lines.last().map(String::as_str), Some("Interrupted, stopping…"));
        assert_eq!(s.control.active_app().await, Some(1));
        s.control.shutdown().await;
        assert!(!s.control.report()[1].is_running);
        drop(writer);
    }

    #[test]
    fn defaults_match_runner_config() {
        let args = Cli::parse_from(["app-test-harness"]);
        let cfg = build_config(&args);
        let default = RunnerConfig::default();
        assert_eq!(cfg.max_trials, default.max_trials);
        assert_eq!(cfg.workload_duration, default.workload_duration);
        assert_eq!(cfg.recovery_delay, default.recovery_delay);
        assert_eq!(cfg.manual_recovery_delay, default.manual_recovery_delay);
        assert_eq!(cfg.cooldown, default.cooldown);
        assert_eq!(cfg.poll_interval, default.poll_interval);
        assert_eq!(args.health_check, HealthCheckKind::AlwaysPass);
    }

    #[test]
    fn durations_and_catalog_parse() {
        let args = Cli::parse_from([
            "app-test-harness",
            "--recovery-delay",
            "500ms",
            "--health-check",
            "flaky:3/4",
            "--app",
            "player=sound",
            "--app",
            "nfs=network",
        ]);
        assert_eq!(build_config(&args).recovery_delay, Duration::from_millis(500));
        assert_eq!(args.health_check, HealthCheckKind::Flaky { pass: 3, every: 4 });

        let registry = build_registry(&args).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().driver_class, DriverClass::Network);
    }

    #[test]
    fn bad_app_args_are_rejected() {
        assert!(parse_app_arg("player").is_err());
        assert!(parse_app_arg("=sound").is_err());
        assert!(parse_app_arg("player=gpu").is_err());
        assert!(Cli::try_parse_from(["app-test-harness", "--health-check", "maybe"]).is_err());

        let dup = Cli::parse_from(["app-test-harness", "--app", "a=sound", "--app", "a=storage"]);
        assert!(build_registry(&dup).is_err());
    }
}
