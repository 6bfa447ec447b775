use common::{
    axis::Axis,
    bench::{Bench, BenchArgs, MountLayout, names},
    space::{Condition, Rule},
};
use serde::{Deserialize, Serialize};

const DEFAULT_PROGRAM: &str = "bufman";

/// Append-only logging sweep. Every worker appends to its own log on one mount,
/// so the mounts of a description are handed out round robin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub io_engines: Vec<String>,
    pub mounts: Vec<String>,
    pub buffer_sizes: Vec<u64>,
    /// Bytes per log entry
    pub log_entry_sizes: Vec<u64>,
    pub random_pages: Vec<u64>,
    pub workloads: Vec<u64>,
    pub write_ratios: Vec<u8>,
    pub thread_counts: Vec<usize>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            io_engines: vec!["LINUX".to_owned()],
            mounts: vec![
                "/mnt/nvme0/pvn".to_owned(),
                "/mnt/nvme0/pvn /mnt/nvme1/pvn /mnt/nvme2/pvn /mnt/nvme3/pvn".to_owned(),
                "/mnt/pmem2/pvn".to_owned(),
            ],
            buffer_sizes: vec![2],
            log_entry_sizes: vec![128, 1 << 13],
            random_pages: vec![16],
            workloads: vec![1],
            write_ratios: vec![0],
            thread_counts: vec![1, 8, 16, 32, 64],
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub program: Option<String>,
}

#[typetag::serde(name = "logging")]
impl BenchArgs for LoggingConfig {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(DEFAULT_PROGRAM)
    }
}

#[typetag::serde(name = "logging")]
impl Bench for Logging {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn default_bench_args(&self) -> Box<dyn BenchArgs> {
        Box::new(LoggingConfig::default())
    }

    fn axes(&self) -> Vec<Axis> {
        vec![
            Axis::values(names::IO_WRAPPER, "--ioengine", &self.io_engines),
            Axis::flag(names::DONT_NEED, "--dontneed"),
            Axis::values(names::MOUNT_DESCRIPTION, "", &self.mounts),
            Axis::values(names::BUFFER_SIZE, "-b", &self.buffer_sizes),
            Axis::values(names::LOG_ENTRY_SIZE, "--le", &self.log_entry_sizes),
            Axis::values(names::RANDOM_PAGE_POOL_SIZE, "--randompages", &self.random_pages),
            Axis::values(names::WORKLOAD, "-t", &self.workloads),
            Axis::values(names::WRITE_RATIO, "-w", &self.write_ratios),
            Axis::flag(names::PMEM_GRANULARITY, "--pmcl"),
            Axis::flag(names::MMAP_SYNC, "--mapsync"),
        ]
    }

    fn rules(&self) -> Vec<Rule> {
        vec![
            // the log is never read back and libpmemlog has no granularity switch
            Rule::Forbid(Condition::Active(names::MMAP_SYNC.to_owned())),
            Rule::Forbid(Condition::Active(names::PMEM_GRANULARITY.to_owned())),
            Rule::Implies {
                when: Condition::TokenCount {
                    axis: names::MOUNT_DESCRIPTION.to_owned(),
                    count: 1,
                },
                then: Condition::LabelIn {
                    axis: names::IO_WRAPPER.to_owned(),
                    labels: vec!["LINUX_PREALLOC".to_owned()],
                },
            },
            Rule::Require(Condition::Active(names::DONT_NEED.to_owned())),
        ]
    }

    fn thread_counts(&self) -> &[usize] {
        &self.thread_counts
    }

    fn mount_descriptions(&self) -> &[String] {
        &self.mounts
    }

    fn workload_args(&self) -> Vec<String> {
        vec!["--workload logging2".to_owned()]
    }

    fn mount_layout(&self) -> MountLayout {
        MountLayout::RoundRobin
    }

    fn cleanup_after_trial(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::{bench::CmdBuilder, placement::Placement};

    #[test]
    fn test_single_mount_needs_prealloc() {
        let bench = Logging::default();
        let space = bench.space(&[]).unwrap();
        let valid = space.valid().collect::<Vec<_>>();

        // LINUX only survives on the four-mount description, once per entry size
        assert_eq!(valid.len(), 2);
        assert!(valid.iter().all(|c| c.label(names::MOUNT_DESCRIPTION)
            == Some("/mnt/nvme0/pvn /mnt/nvme1/pvn /mnt/nvme2/pvn /mnt/nvme3/pvn")));

        let prealloc = Logging {
            io_engines: vec!["LINUX".to_owned(), "LINUX_PREALLOC".to_owned()],
            ..Default::default()
        };
        assert_eq!(prealloc.space(&[]).unwrap().valid().count(), 2 + 3 * 2);
    }

    #[test]
    fn test_workers_get_one_mount_each() {
        let bench = Logging {
            mounts: vec!["/mnt/nvme0/pvn /mnt/nvme1/pvn".to_owned()],
            log_entry_sizes: vec![128],
            ..Default::default()
        };
        let space = bench.space(&[]).unwrap();
        let combination = space.valid().next().unwrap();
        let placement = Placement::None;
        let builder = CmdBuilder::new(&bench, &LoggingConfig::default(), &placement).unwrap();

        assert_eq!(
            builder.worker_cmds(&combination, 3).unwrap(),
            vec![
                "bufman --ioengine LINUX --dontneed -b 2 --le 128 --randompages 16 -t 1 -w 0 --workload logging2 --suffix 0 /mnt/nvme0/pvn",
                "bufman --ioengine LINUX --dontneed -b 2 --le 128 --randompages 16 -t 1 -w 0 --workload logging2 --suffix 1 /mnt/nvme1/pvn",
                "bufman --ioengine LINUX --dontneed -b 2 --le 128 --randompages 16 -t 1 -w 0 --workload logging2 --suffix 2 /mnt/nvme0/pvn",
            ]
        );
    }
}
