//! CLI argument parsing and subcommand dispatch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use evgate_core::Config;
use evgate_registry::run_registry_lint;
use evgate_reliability::{run_and_store, Corpus, FixtureResponder, Responder, RunType};

use crate::gates;
use crate::startup::{self, ModelContext};

/// Evidence-gated publication pipeline.
#[derive(Parser, Debug)]
#[command(name = "evgate", version, about = "Evidence-gated publication pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server with maintenance and nightly reliability runs.
    Serve {
        /// Bind address (overrides HOST).
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Lint the source registry. Exits non-zero on errors.
    Lint,
    /// Evaluate the release gate. Exits non-zero when blocked.
    ReleaseGate,
    /// Return stale RUNNING jobs to PENDING.
    ResetStuck,
    /// Run the reliability corpus once and record the run.
    ReliabilityRun {
        #[arg(long, value_enum, default_value_t = RunKind::Manual)]
        run_type: RunKind,
        /// YAML answers keyed by case_id, instead of the configured model.
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Only run the first N cases.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Check the deployment gate. Exits non-zero when deployment is blocked.
    DeployCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunKind {
    Nightly,
    Release,
    Manual,
}

impl From<RunKind> for RunType {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Nightly => RunType::Nightly,
            RunKind::Release => RunType::Release,
            RunKind::Manual => RunType::Manual,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_for(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run one subcommand to completion.
pub async fn dispatch(command: Command, mut config: Config) -> anyhow::Result<ExitCode> {
    if let Command::Serve { host, port } = &command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }

    let models = ModelContext::from_config(&config)?;
    let state = startup::build_app_state(config, &models).await?;

    match command {
        Command::Serve { .. } => {
            startup::serve(state, models, None).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Lint => {
            let sources = state.enforcer.sources().list().await?;
            let report = run_registry_lint(&sources);
            print_json(&report)?;
            if !report.passed {
                warn!(errors = report.errors.len(), "registry lint failed");
            }
            Ok(exit_for(report.passed))
        }
        Command::ReleaseGate => {
            let report = gates::release_gate_report(&state).await?;
            print_json(&report)?;
            for check in report.failed_checks() {
                warn!(check = %check.name, measured = %check.measured, threshold = %check.threshold, "release check failed");
            }
            Ok(exit_for(report.passed))
        }
        Command::ResetStuck => {
            let reset = state.queue.reset_stuck_jobs().await?;
            print_json(&serde_json::json!({ "reset": reset }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ReliabilityRun {
            run_type,
            fixtures,
            limit,
        } => {
            let responder: Arc<dyn Responder> = match fixtures {
                Some(path) => Arc::new(
                    FixtureResponder::load(&path).with_context(|| format!("loading fixtures {}", path.display()))?,
                ),
                None => match startup::model_responder(&state.config, &models) {
                    Some(r) => r,
                    None => bail!("no LLM provider configured; pass --fixtures to answer from a file"),
                },
            };
            let mut corpus = Corpus::load_or_builtin(state.config.reliability.corpus_file.as_deref())?;
            if let Some(limit) = limit {
                corpus.cases.truncate(limit);
            }
            let harness = startup::build_harness(&state.config, &models, responder);
            let run = run_and_store(&harness, &corpus, state.runs.as_ref(), run_type.into()).await?;
            info!(
                run_id = %run.run_id,
                score = run.reliability_score,
                threshold = run.score_threshold,
                passed = run.passed,
                total = run.total_cases,
                "reliability run recorded"
            );
            print_json(&serde_json::json!({
                "run_id": run.run_id,
                "run_type": run.run_type,
                "reliability_score": run.reliability_score,
                "score_threshold": run.score_threshold,
                "meets_threshold": run.meets_threshold(),
                "total_cases": run.total_cases,
                "passed": run.passed,
                "pass_rate": run.pass_rate,
                "avg_citation_coverage": run.avg_citation_coverage,
                "contradiction_resolution_rate": run.contradiction_resolution_rate,
                "hallucination_rate": run.hallucination_rate,
                "by_category": run.by_category,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::DeployCheck => {
            let decision = gates::deploy_decision(&state)?;
            print_json(&decision)?;
            Ok(exit_for(decision.allowed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reliability_run_flags() {
        let cli = Cli::parse_from(["evgate", "reliability-run", "--run-type", "release", "--limit", "5"]);
        match cli.command {
            Command::ReliabilityRun {
                run_type,
                fixtures,
                limit,
            } => {
                assert_eq!(run_type, RunKind::Release);
                assert_eq!(fixtures, None);
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_gate_commands() {
        assert!(matches!(Cli::parse_from(["evgate", "deploy-check"]).command, Command::DeployCheck));
        assert!(matches!(Cli::parse_from(["evgate", "release-gate"]).command, Command::ReleaseGate));
        assert!(matches!(
            Cli::parse_from(["evgate", "serve", "--port", "8080"]).command,
            Command::Serve { port: Some(8080), .. }
        ));
    }
}
