//! Subcommand implementations.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitStatus;
use std::sync::mpsc;
use thiserror::Error;
use tripwire_core::{
    Breaker, BreakerConfig, BreakerError, BreakerEvent, BreakerState, ManualClock,
};

use crate::script::Step;
use crate::store::{MemoryStore, SnapshotStore};

/// Exit code when the circuit refuses to run the command (sysexits `EX_TEMPFAIL`).
pub const EXIT_CIRCUIT_OPEN: i32 = 75;

/// Exit code when the command could not be started.
const EXIT_SPAWN_FAILED: i32 = 127;

/// Why a wrapped command counted as a failure.
#[derive(Error, Debug)]
pub enum CommandFailure {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    Exit { program: String, status: ExitStatus },
}

impl CommandFailure {
    fn exit_code(&self) -> i32 {
        match self {
            CommandFailure::Spawn { .. } => EXIT_SPAWN_FAILED,
            CommandFailure::Exit { status, .. } => status.code().unwrap_or(1),
        }
    }
}

/// Load a config file, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<BreakerConfig> {
    match path {
        Some(path) => BreakerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(BreakerConfig::default()),
    }
}

/// Run `command` behind a breaker seeded from `store`, then persist the new state.
///
/// Returns the process exit code to use.
pub async fn run(
    config: BreakerConfig,
    store: &dyn SnapshotStore,
    name: Option<String>,
    command: &[String],
) -> Result<i32> {
    let (program, args) = command.split_first().context("no command given")?;

    let initial = store.load().await?;
    let mut breaker = Breaker::new(config, initial)?;
    if let Some(name) = name {
        breaker = breaker.named(name);
    }

    let outcome = breaker.execute(|| run_command(program, args)).await;
    store.save(&breaker.export_state()).await?;

    match outcome {
        Ok(()) => Ok(0),
        Err(BreakerError::Open(err)) => {
            eprintln!("tripwire: {err}");
            Ok(EXIT_CIRCUIT_OPEN)
        }
        Err(BreakerError::Operation(failure)) => {
            eprintln!("tripwire: {failure}");
            Ok(failure.exit_code())
        }
    }
}

async fn run_command(program: &str, args: &[String]) -> Result<(), CommandFailure> {
    tracing::debug!(program, ?args, "Running command");

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| CommandFailure::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandFailure::Exit {
            program: program.to_string(),
            status,
        })
    }
}

/// Pretty JSON of the stored snapshot, or of a fresh state if none exists.
///
/// The snapshot is shown as stored; an expired cooldown still reads OPEN
/// until the next `run`.
pub async fn status(store: &dyn SnapshotStore) -> Result<String> {
    let state = store.load().await?.unwrap_or_default();
    Ok(serde_json::to_string_pretty(&state)?)
}

/// Overwrite the stored snapshot with a fresh CLOSED state.
pub async fn reset(store: &dyn SnapshotStore) -> Result<()> {
    store.save(&BreakerState::closed()).await
}

/// Replay a script against a breaker on a manual clock.
///
/// Returns one transcript line per call or restart, followed by the final
/// snapshot as JSON.
pub async fn simulate(config: BreakerConfig, steps: &[Step], start: u64) -> Result<Vec<String>> {
    let clock = ManualClock::new(start);
    let store = MemoryStore::new();
    let (tx, rx) = mpsc::channel();

    let attach = |initial: Option<BreakerState>| -> Result<Breaker> {
        let breaker = Breaker::new(config.clone(), initial)?.with_clock(clock.clone());
        let tx = tx.clone();
        breaker.subscribe_all(move |event| {
            let _ = tx.send(*event);
        });
        Ok(breaker)
    };

    let mut breaker = attach(None)?;
    let mut elapsed = 0u64;
    let mut transcript = Vec::new();

    for step in steps {
        match *step {
            Step::Advance(by) => {
                clock.advance(by);
                elapsed = elapsed.saturating_add(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
            }
            Step::Restart => {
                store.save(&breaker.export_state()).await?;
                breaker = attach(store.load().await?)?;
                transcript.push(format!("{:>9}  r  restored {}", format!("+{elapsed}ms"), breaker.state()));
            }
            Step::Succeed(times) | Step::Fail(times) => {
                let succeed = matches!(step, Step::Succeed(_));
                for _ in 0..times {
                    let outcome = breaker
                        .execute(|| async { if succeed { Ok(()) } else { Err(()) } })
                        .await;
                    let call = match outcome {
                        Ok(()) => "s",
                        Err(BreakerError::Open(_)) => "x",
                        Err(BreakerError::Operation(())) => "f",
                    };
                    let events: Vec<String> = rx.try_iter().map(|e| describe(&e)).collect();
                    transcript.push(format!(
                        "{:>9}  {}  {:<9} {}",
                        format!("+{elapsed}ms"),
                        call,
                        breaker.state().to_string(),
                        events.join(" ")
                    ));
                }
            }
        }
    }

    transcript.push(serde_json::to_string_pretty(&breaker.export_state())?);
    Ok(transcript)
}

fn describe(event: &BreakerEvent) -> String {
    match event {
        BreakerEvent::OpenCircuit { next_attempt } => format!("openCircuit(nextAttempt={next_attempt})"),
        BreakerEvent::Success { success_count } => format!("success({success_count})"),
        BreakerEvent::Failure { failure_count } => format!("failure({failure_count})"),
        other => other.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script;
    use std::time::Duration;
    use tripwire_core::Phase;

    fn config() -> BreakerConfig {
        BreakerConfig::new(0.5, Duration::from_secs(10), Duration::from_secs(5))
            .with_min_attempts(3)
    }

    #[tokio::test]
    async fn test_simulate_full_cycle() {
        let steps = script::parse("3f s +5s s").unwrap();
        let transcript = simulate(config(), &steps, 1_000).await.unwrap();

        assert_eq!(transcript.len(), 6);
        assert!(transcript[2].contains("OPEN"));
        assert!(transcript[2].contains("openCircuit(nextAttempt=6000)"));
        assert!(transcript[3].contains("  x  "));
        assert!(transcript[4].contains("halfOpen closeCircuit success(1)"));

        let last: BreakerState = serde_json::from_str(&transcript[5]).unwrap();
        assert_eq!(last, BreakerState::closed());
    }

    #[tokio::test]
    async fn test_simulate_restart_keeps_open_state() {
        let steps = script::parse("3f r s").unwrap();
        let transcript = simulate(config(), &steps, 1_000).await.unwrap();

        assert!(transcript[3].contains("restored OPEN"));
        assert!(transcript[4].contains("  x  "));
    }

    #[tokio::test]
    async fn test_run_persists_across_invocations() {
        let store = MemoryStore::new();
        let failing = vec!["false".to_string()];

        for _ in 0..3 {
            let code = run(config(), &store, None, &failing).await.unwrap();
            assert_ne!(code, 0);
        }

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.phase, Phase::Open);

        let code = run(config(), &store, Some("job".into()), &["true".to_string()])
            .await
            .unwrap();
        assert_eq!(code, EXIT_CIRCUIT_OPEN);
    }

    #[tokio::test]
    async fn test_run_missing_program_counts_as_failure() {
        let store = MemoryStore::new();
        let command = vec!["tripwire-test-no-such-program".to_string()];

        let code = run(config(), &store, None, &command).await.unwrap();
        assert_eq!(code, EXIT_SPAWN_FAILED);
        assert_eq!(store.load().await.unwrap().unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_run_requires_a_command() {
        assert!(run(config(), &MemoryStore::new(), None, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_and_status() {
        let store = MemoryStore::new();
        reset(&store).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&status(&store).await.unwrap()).unwrap();
        assert_eq!(json["phase"], "CLOSED");
        assert_eq!(json["failureCount"], 0);
    }
}
