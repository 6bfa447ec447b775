use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use chrono::Local;
use common::{
    bench::{Bench, CmdBuilder, names, scramble_cmds},
    cohort::{Cohort, Outcome},
    config::{Config, FailurePolicy, InnerBench},
    result::{Medium, ResultRow, ResultTable, bandwidth},
    space::{Combination, CombinationSpace},
    util::{resolve_program, scratch_cleanup_cmds, unique_mounts},
};
use eyre::{Context, ContextCompat, Result, bail};
use itertools::Itertools;
use tokio::fs::{copy, create_dir_all, read_to_string};
use tracing::{debug, error, info, warn};

pub async fn load_config(config_file: &Path) -> Result<Config> {
    let content = read_to_string(config_file)
        .await
        .context(format!("Read config {}", config_file.display()))?;
    serde_yml::from_str(&content).context(format!("Parse config {}", config_file.display()))
}

/// Runs every bench of the config and returns the folder holding its results
pub async fn run_benchmark(config_file: &Path, results_dir: &Path) -> Result<PathBuf> {
    let config = load_config(config_file).await?;
    let env = config.settings.env.clone().unwrap_or_default();

    // every program and space is checked before the first process starts
    let mut sweeps = Vec::with_capacity(config.benches.len());
    for experiment in &config.benches {
        let sweep = Sweep::new(experiment, &config, &env)?;
        let program = resolve_program(sweep.builder.program())
            .context(format!("Program of bench {}", experiment.name))?;
        debug!("{} uses {}", experiment.name, program.display());
        sweeps.push(sweep);
    }

    let file_prefix = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let results_path = results_dir.join(format!("{}-{file_prefix}", config.name));
    create_dir_all(&results_path).await?;
    copy(config_file, results_path.join("config.yaml")).await?;
    println!("Results created in folder: {}", results_path.display());

    for sweep in sweeps {
        let table = ResultTable::new(
            results_path.join(format!("{}.csv", sweep.experiment.name)),
            sweep.space.headers(),
        );
        sweep.run(table).await?;
    }

    debug!("Exiting");
    Ok(results_path)
}

/// One bench entry of a config, ready to run
pub struct Sweep<'a> {
    experiment: &'a InnerBench,
    space: CombinationSpace,
    builder: CmdBuilder<'a>,
    env: &'a HashMap<String, String>,
}

impl<'a> Sweep<'a> {
    pub fn new(
        experiment: &'a InnerBench,
        config: &'a Config,
        env: &'a HashMap<String, String>,
    ) -> Result<Self> {
        let bench = &*experiment.bench;
        let bench_args = config.bench_args(bench);
        let builder = CmdBuilder::new(bench, &*bench_args, &config.settings.placement)?;
        let space = bench.space(experiment.extra_rules.as_slice())?;
        Ok(Self {
            experiment,
            space,
            builder,
            env,
        })
    }

    pub fn space(&self) -> &CombinationSpace {
        &self.space
    }

    pub fn builder(&self) -> &CmdBuilder<'a> {
        &self.builder
    }

    fn bench(&self) -> &dyn Bench {
        &*self.experiment.bench
    }

    fn cleanup_cmds(&self) -> Vec<String> {
        let mounts = unique_mounts(self.bench().mount_descriptions().iter().map(String::as_str));
        scratch_cleanup_cmds(&mounts)
    }

    async fn cleanup(&self) {
        let mut cohort = Cohort::new(self.cleanup_cmds()).with_env(self.env.clone());
        match cohort.run().await {
            Ok(Outcome::Success { .. }) => {}
            Ok(outcome) => warn!("Cleanup of {} {outcome}", self.experiment.name),
            Err(err) => warn!("Cleanup of {}: {err:#}", self.experiment.name),
        }
    }

    async fn initialize(&self, init_args: &[String]) -> Result<()> {
        let workers = self.bench().thread_counts().iter().copied().max().unwrap_or(1);
        let cmds = self
            .builder
            .init_cmds(workers, init_args, self.bench().mount_descriptions());
        let mut cohort = Cohort::new(cmds).with_env(self.env.clone());
        let outcome = cohort.run().await?;
        if !outcome.is_success() {
            bail!("Initialization of {} {outcome}", self.experiment.name);
        }
        info!(
            "Initialized {} for {workers} workers in {:.3}s",
            self.experiment.name,
            outcome.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn row(
        &self,
        combination: &Combination<'_>,
        threads: usize,
        outcome: &Outcome,
    ) -> Result<ResultRow> {
        let mounts = combination.label(names::MOUNT_DESCRIPTION).unwrap_or_default();
        let labels = self
            .space
            .headers()
            .zip(combination.labels())
            .map(|(axis, label)| {
                if axis == names::MOUNT_DESCRIPTION {
                    Medium::from_mounts(label).to_string()
                } else {
                    label.to_owned()
                }
            })
            .collect();

        let per_worker = combination
            .label(names::WORKLOAD)
            .context("Combination has no workload axis")?;
        let per_worker = per_worker
            .parse::<u64>()
            .context(format!("Workload {per_worker} is not a number"))?;
        let total_workload = per_worker * threads as u64;
        let elapsed = outcome.elapsed().as_secs_f64();

        Ok(ResultRow {
            labels,
            thread_count: threads,
            worker_groups: mounts.split_whitespace().count(),
            elapsed,
            total_workload,
            bandwidth: bandwidth(total_workload, elapsed),
        })
    }

    /// Runs every trial, then flushes and cleans up. Rows recorded before an
    /// error are flushed before the error is returned.
    pub async fn run(self, mut table: ResultTable) -> Result<()> {
        let name = &self.experiment.name;
        let thread_counts = self.bench().thread_counts();

        info!(
            "{name}: running {} combinations x {} thread counts {} times",
            self.space.valid().count(),
            thread_counts.len(),
            self.experiment.repeat
        );
        let cpus = num_cpus::get();
        if let Some(max) = thread_counts.iter().max()
            && *max > cpus
        {
            warn!("{name}: {max} threads exceed the {cpus} available cpus");
        }

        if let Err(err) = self.trials(&mut table).await {
            if let Err(flush_err) = table.flush().await {
                error!("{name}: {flush_err:#}");
            }
            return Err(err);
        }

        table.flush().await?;
        self.cleanup().await;
        info!("{name}: recorded {} rows", table.rows().len());
        Ok(())
    }

    /// Combination outer, thread count inner, repetitions innermost. The table
    /// is flushed after every combination.
    async fn trials(&self, table: &mut ResultTable) -> Result<()> {
        let name = &self.experiment.name;
        let bench = self.bench();

        if bench.cleanup_after_trial() {
            self.cleanup().await;
        }
        if let Some(init_args) = bench.initialization_args() {
            self.initialize(&init_args).await?;
        }

        for combination in self.space.valid() {
            let description = combination.labels().join(" ");
            for &threads in bench.thread_counts() {
                for i in 0..self.experiment.repeat {
                    let main = self.builder.worker_cmds(&combination, threads)?;
                    let preparation = if bench.scramble() {
                        scramble_cmds(&main)
                    } else {
                        Vec::new()
                    };
                    let mut cohort = Cohort::new(main)
                        .with_preparation(preparation)
                        .with_env(self.env.clone());

                    let outcome = cohort.run().await?;
                    debug!("{name} [{description}] threads={threads} iter={i} {outcome}");

                    if bench.cleanup_after_trial() {
                        self.cleanup().await;
                    }

                    if outcome.is_success() {
                        table.push(self.row(&combination, threads, &outcome)?)?;
                        continue;
                    }

                    error!("{name} [{description}] with {threads} threads {outcome}");
                    if self.experiment.on_failure == FailurePolicy::Abort {
                        bail!("Trial of {name} with {threads} threads {outcome}");
                    }
                }
            }
            table.flush().await?;
        }
        Ok(())
    }
}

/// Worker commands of every trial, without running anything
pub fn dry_run(config: &Config) -> Result<Vec<(String, Vec<String>)>> {
    let env = HashMap::new();
    let mut lines = Vec::new();
    for experiment in &config.benches {
        let sweep = Sweep::new(experiment, config, &env)?;
        let bench = sweep.bench();
        let mut cmds = Vec::new();
        if let Some(init_args) = bench.initialization_args() {
            let workers = bench.thread_counts().iter().copied().max().unwrap_or(1);
            cmds.extend(
                sweep
                    .builder()
                    .init_cmds(workers, &init_args, bench.mount_descriptions()),
            );
        }
        for combination in sweep.space().valid() {
            for &threads in bench.thread_counts() {
                cmds.extend(sweep.builder().worker_cmds(&combination, threads)?);
            }
        }
        lines.push((experiment.name.clone(), cmds));
    }
    Ok(lines)
}
