use core::fmt::Debug;
use std::iter::once;

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::{Context, ContextCompat, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    axis::Axis,
    placement::Placement,
    space::{Combination, CombinationSpace, Rule},
    util::unique_mounts,
};

/// Axis names shared by every bench; they double as result column headers.
pub mod names {
    pub const IO_WRAPPER: &str = "IOWrapper";
    pub const DONT_NEED: &str = "DontNeedFlag";
    pub const MOUNT_DESCRIPTION: &str = "MountDescription";
    pub const BUFFER_SIZE: &str = "Buffersize";
    pub const PAGE_SIZE: &str = "Pagesize";
    pub const LOG_ENTRY_SIZE: &str = "LogEntrySize";
    pub const RANDOM_PAGE_POOL_SIZE: &str = "RandomPagePoolSize";
    pub const WORKLOAD: &str = "Workload";
    pub const WRITE_RATIO: &str = "WriteRatio";
    pub const PMEM_GRANULARITY: &str = "PmemGranularityFlag";
    pub const MMAP_SYNC: &str = "MmapSyncFlag";
    pub const MMAP_POPULATE: &str = "MmapPopulateFlag";
    pub const FADV_RANDOM: &str = "FAdvRandomFlag";
    pub const FADV_SEQUENTIAL: &str = "FAdvSequentialFlag";
}

/// How the mounts of a combination reach the workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountLayout {
    /// Every worker receives the whole mount description
    #[default]
    Shared,
    /// Worker `i` receives mount `i mod |mounts|` as its last argument
    RoundRobin,
}

#[typetag::serde(tag = "type")]
pub trait BenchArgs: Debug + DynClone + Downcast + Send + Sync {
    fn name(&self) -> &'static str;
    /// Path or name of the benchmark executable
    fn program(&self) -> &str;
}
clone_trait_object!(BenchArgs);
impl_downcast!(BenchArgs);

#[typetag::serde(tag = "type")]
pub trait Bench: Debug + DynClone + Downcast + Send + Sync {
    /// Name of the bench, for identification
    fn name(&self) -> &'static str;

    fn default_bench_args(&self) -> Box<dyn BenchArgs>;

    /// Axes in column order
    fn axes(&self) -> Vec<Axis>;

    /// Built-in validity rules, referencing axes by name
    fn rules(&self) -> Vec<Rule>;

    fn thread_counts(&self) -> &[usize];

    /// Every mount description this bench sweeps over
    fn mount_descriptions(&self) -> &[String];

    /// Arguments placed between the program and the axis fragments
    fn base_args(&self, _bench_args: &dyn BenchArgs) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Arguments placed after the axis fragments
    fn workload_args(&self) -> Vec<String> {
        Vec::new()
    }

    fn mount_layout(&self) -> MountLayout {
        MountLayout::Shared
    }

    /// Run every worker command with `--scramble` before each trial
    fn scramble(&self) -> bool {
        false
    }

    /// Extra arguments of the one-time initialization cohort, `None` to skip it
    fn initialization_args(&self) -> Option<Vec<String>> {
        None
    }

    /// Remove scratch files after every trial instead of only at the end
    fn cleanup_after_trial(&self) -> bool {
        false
    }

    fn space(&self, extra_rules: &[Rule]) -> Result<CombinationSpace> {
        let space = CombinationSpace::new(self.axes())
            .context(format!("Axes of {}", self.name()))?
            .with_rules(self.rules().into_iter().chain(extra_rules.iter().cloned()))
            .context(format!("Rules of {}", self.name()))?;
        Ok(space)
    }
}
clone_trait_object!(Bench);
impl_downcast!(Bench);

/// Turns combinations into worker command lines
#[derive(Debug, Clone)]
pub struct CmdBuilder<'a> {
    program: String,
    base_args: Vec<String>,
    workload_args: Vec<String>,
    layout: MountLayout,
    placement: &'a Placement,
}

impl<'a> CmdBuilder<'a> {
    pub fn new(
        bench: &dyn Bench,
        bench_args: &dyn BenchArgs,
        placement: &'a Placement,
    ) -> Result<Self> {
        Ok(Self {
            program: bench_args.program().to_owned(),
            base_args: bench.base_args(bench_args)?,
            workload_args: bench.workload_args(),
            layout: bench.mount_layout(),
            placement,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `[prefix] <program> [base args] [fragments] [workload args] --suffix <i> [mount]`
    pub fn worker_cmds(&self, combination: &Combination<'_>, threads: usize) -> Result<Vec<String>> {
        let exclude: &[&str] = match self.layout {
            MountLayout::Shared => &[],
            MountLayout::RoundRobin => &[names::MOUNT_DESCRIPTION],
        };
        let command = once(self.program.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .chain(combination.fragments(exclude))
            .chain(self.workload_args.iter().map(String::as_str))
            .join(" ");

        let mounts = match self.layout {
            MountLayout::Shared => Vec::new(),
            MountLayout::RoundRobin => combination
                .label(names::MOUNT_DESCRIPTION)
                .context("Round robin mount layout without a mount description")?
                .split_whitespace()
                .collect(),
        };

        Ok((0..threads)
            .map(|i| {
                let mut parts = Vec::with_capacity(4);
                if let Some(prefix) = self.placement.prefix_for(i) {
                    parts.push(prefix);
                }
                parts.push(command.clone());
                parts.push(format!("--suffix {i}"));
                if !mounts.is_empty() {
                    parts.push(mounts[i % mounts.len()].to_owned());
                }
                parts.join(" ")
            })
            .collect())
    }

    /// Pre-sizes the backing files of every worker slot
    pub fn init_cmds(
        &self,
        workers: usize,
        init_args: &[String],
        mount_descriptions: &[String],
    ) -> Vec<String> {
        let mounts = unique_mounts(mount_descriptions.iter().map(String::as_str)).join(" ");
        (0..workers)
            .map(|i| {
                self.placement
                    .prefix_for(i)
                    .into_iter()
                    .chain(once(self.program.clone()))
                    .chain(once(format!("--suffix {i}")))
                    .chain(init_args.iter().cloned())
                    .chain(once("--initialize".to_owned()))
                    .chain(once(mounts.clone()))
                    .join(" ")
            })
            .collect()
    }
}

pub fn scramble_cmds(main: &[String]) -> Vec<String> {
    main.iter().map(|cmd| format!("{cmd} --scramble")).collect()
}
