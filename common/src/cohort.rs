use core::fmt;
use std::{
    collections::HashMap,
    io,
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    time::{Duration, Instant},
};

use futures::future::join_all;
use itertools::Itertools;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("Cohort already ran")]
    AlreadyRan,
    #[error("Empty command in {0} phase")]
    EmptyCommand(Phase),
    #[error("Could not spawn `{cmd}`")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not wait for `{cmd}`")]
    Wait {
        cmd: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preparation,
    Main,
    Finalization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preparation => write!(f, "preparation"),
            Phase::Main => write!(f, "main"),
            Phase::Finalization => write!(f, "finalization"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { elapsed: Duration },
    /// `codes` holds only the non-zero exit codes, in command order
    Failure { elapsed: Duration, codes: Vec<i32> },
}

impl Outcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Outcome::Success { elapsed } | Outcome::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn codes(&self) -> &[i32] {
        match self {
            Outcome::Success { .. } => &[],
            Outcome::Failure { codes, .. } => codes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { elapsed } => write!(f, "succeeded in {:.3}s", elapsed.as_secs_f64()),
            Outcome::Failure { codes, .. } => {
                write!(f, "failed with exit codes {}", codes.iter().join(" "))
            }
        }
    }
}

/// Worker processes of one trial, started together and timed together.
///
/// * preparation: all commands concurrently, exit codes ignored
/// * main: all commands concurrently and timed from the first launch to the last exit
/// * finalization: only after every main command exited 0, exit codes ignored
#[derive(Debug, Default)]
pub struct Cohort {
    main: Vec<String>,
    preparation: Vec<String>,
    finalization: Vec<String>,
    env: HashMap<String, String>,
    has_run: bool,
    outcome: Option<Outcome>,
}

impl Cohort {
    pub fn new(main: Vec<String>) -> Self {
        Self {
            main,
            ..Default::default()
        }
    }

    pub fn with_preparation(mut self, cmds: Vec<String>) -> Self {
        self.preparation = cmds;
        self
    }

    pub fn with_finalization(mut self, cmds: Vec<String>) -> Self {
        self.finalization = cmds;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn main(&self) -> &[String] {
        &self.main
    }

    pub fn preparation(&self) -> &[String] {
        &self.preparation
    }

    pub fn finalization(&self) -> &[String] {
        &self.finalization
    }

    pub fn has_run(&self) -> bool {
        self.has_run
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Runs the cohort. A failing worker is reported through [`Outcome::Failure`],
    /// only usage and spawn problems are errors.
    pub async fn run(&mut self) -> Result<Outcome, CohortError> {
        if self.has_run {
            return Err(CohortError::AlreadyRan);
        }
        self.has_run = true;

        self.best_effort(Phase::Preparation, &self.preparation).await;

        let start = Instant::now();
        let codes = self.execute_main().await?;
        let elapsed = start.elapsed();

        let failed = codes.into_iter().filter(|c| *c != 0).collect::<Vec<_>>();
        let outcome = if failed.is_empty() {
            self.best_effort(Phase::Finalization, &self.finalization)
                .await;
            Outcome::Success { elapsed }
        } else {
            Outcome::Failure {
                elapsed,
                codes: failed,
            }
        };
        debug!("Cohort of {} workers {outcome}", self.main.len());

        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    async fn execute_main(&self) -> Result<Vec<i32>, CohortError> {
        let mut children = Vec::with_capacity(self.main.len());
        for cmd in &self.main {
            match spawn(cmd, &self.env, Phase::Main) {
                Ok(child) => children.push(child),
                Err(err) => {
                    for child in &mut children {
                        _ = child.start_kill();
                    }
                    join_all(children.iter_mut().map(Child::wait)).await;
                    return Err(err);
                }
            }
        }

        join_all(children.iter_mut().map(Child::wait))
            .await
            .into_iter()
            .zip(&self.main)
            .map(|(status, cmd)| {
                status.map(exit_code).map_err(|source| CohortError::Wait {
                    cmd: cmd.clone(),
                    source,
                })
            })
            .collect()
    }

    async fn best_effort(&self, phase: Phase, cmds: &[String]) {
        let mut children = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            match spawn(cmd, &self.env, phase) {
                Ok(child) => children.push((cmd, child)),
                Err(err) => warn!("Skipping {phase} command: {err:#}"),
            }
        }

        let statuses = join_all(children.iter_mut().map(|(_, c)| c.wait())).await;
        for ((cmd, _), status) in children.iter().zip(statuses) {
            match status.map(exit_code) {
                Ok(0) => {}
                Ok(code) => debug!("{phase} command `{cmd}` exited with {code}"),
                Err(err) => warn!("Could not wait for {phase} command `{cmd}`: {err}"),
            }
        }
    }
}

fn spawn(cmd: &str, env: &HashMap<String, String>, phase: Phase) -> Result<Child, CohortError> {
    let mut parts = cmd.split_whitespace();
    let program = parts.next().ok_or(CohortError::EmptyCommand(phase))?;
    debug!("{phase}: {cmd}");
    Command::new(program)
        .args(parts)
        .envs(env)
        .spawn()
        .map_err(|source| CohortError::Spawn {
            cmd: cmd.to_owned(),
            source,
        })
}

/// Signal terminations are reported as `128 + signal`
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}
