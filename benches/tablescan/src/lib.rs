use common::{
    axis::Axis,
    bench::{Bench, BenchArgs, names},
    space::{Condition, Rule},
};
use serde::{Deserialize, Serialize};

const DEFAULT_PROGRAM: &str = "bufman";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tablescan {
    pub io_engines: Vec<String>,
    pub mounts: Vec<String>,
    pub buffer_sizes: Vec<u64>,
    pub page_sizes: Vec<u64>,
    pub random_pages: Vec<u64>,
    pub workloads: Vec<u64>,
    pub write_ratios: Vec<u8>,
    /// Also sweep `--mmap-populate`, only meaningful for MMAP
    pub mmap_populate: bool,
    pub thread_counts: Vec<usize>,
}

impl Default for Tablescan {
    fn default() -> Self {
        Self {
            io_engines: vec!["LINUX".to_owned(), "MMAP".to_owned()],
            mounts: vec![
                "/mnt/nvme0/pvn".to_owned(),
                "/mnt/nvme0/pvn /mnt/nvme1/pvn /mnt/nvme2/pvn /mnt/nvme3/pvn".to_owned(),
                "/mnt/pmem2/pvn".to_owned(),
            ],
            buffer_sizes: vec![5],
            page_sizes: vec![1 << 12, 1 << 14],
            random_pages: vec![16],
            workloads: vec![5],
            write_ratios: vec![0],
            mmap_populate: false,
            thread_counts: vec![1, 8, 16, 32, 64],
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablescanConfig {
    pub program: Option<String>,
}

#[typetag::serde(name = "tablescan")]
impl BenchArgs for TablescanConfig {
    fn name(&self) -> &'static str {
        "tablescan"
    }

    fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(DEFAULT_PROGRAM)
    }
}

fn linux_only(flag: &str) -> Rule {
    Rule::Implies {
        when: Condition::Active(flag.to_owned()),
        then: Condition::LabelIn {
            axis: names::IO_WRAPPER.to_owned(),
            labels: vec!["LINUX".to_owned()],
        },
    }
}

#[typetag::serde(name = "tablescan")]
impl Bench for Tablescan {
    fn name(&self) -> &'static str {
        "tablescan"
    }

    fn default_bench_args(&self) -> Box<dyn BenchArgs> {
        Box::new(TablescanConfig::default())
    }

    fn axes(&self) -> Vec<Axis> {
        let mut axes = vec![
            Axis::values(names::IO_WRAPPER, "--ioengine", &self.io_engines),
            Axis::flag(names::DONT_NEED, "--dontneed"),
            Axis::values(names::MOUNT_DESCRIPTION, "", &self.mounts),
            Axis::values(names::BUFFER_SIZE, "-b", &self.buffer_sizes),
            Axis::values(names::PAGE_SIZE, "-p", &self.page_sizes),
            Axis::values(names::RANDOM_PAGE_POOL_SIZE, "--randompages", &self.random_pages),
            Axis::values(names::WORKLOAD, "-t", &self.workloads),
            Axis::values(names::WRITE_RATIO, "-w", &self.write_ratios),
            Axis::flag(names::FADV_RANDOM, "--fadv-random"),
            Axis::flag(names::FADV_SEQUENTIAL, "--fadv-sequential"),
        ];
        if self.mmap_populate {
            axes.push(Axis::flag(names::MMAP_POPULATE, "--mmap-populate"));
        }
        axes
    }

    fn rules(&self) -> Vec<Rule> {
        let mut rules = vec![
            Rule::Require(Condition::Active(names::DONT_NEED.to_owned())),
            linux_only(names::FADV_RANDOM),
            linux_only(names::FADV_SEQUENTIAL),
            Rule::Exclusive(vec![
                names::FADV_RANDOM.to_owned(),
                names::FADV_SEQUENTIAL.to_owned(),
            ]),
        ];
        if self.mmap_populate {
            rules.push(Rule::Implies {
                when: Condition::Active(names::MMAP_POPULATE.to_owned()),
                then: Condition::LabelIn {
                    axis: names::IO_WRAPPER.to_owned(),
                    labels: vec!["MMAP".to_owned()],
                },
            });
        }
        rules
    }

    fn thread_counts(&self) -> &[usize] {
        &self.thread_counts
    }

    fn mount_descriptions(&self) -> &[String] {
        &self.mounts
    }

    fn workload_args(&self) -> Vec<String> {
        vec!["--workload tablescan".to_owned()]
    }

    fn scramble(&self) -> bool {
        true
    }

    fn initialization_args(&self) -> Option<Vec<String>> {
        let max_buffer = self.buffer_sizes.iter().max()?;
        Some(vec![format!("-b {max_buffer}")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fadvise_rules() {
        let bench = Tablescan {
            mounts: vec!["/mnt/nvme0/pvn".to_owned()],
            page_sizes: vec![4096],
            ..Default::default()
        };
        let space = bench.space(&[]).unwrap();
        let valid = space.valid().collect::<Vec<_>>();

        // LINUX: none, random, sequential; MMAP: none
        assert_eq!(valid.len(), 4);
        for c in &valid {
            assert!(c.is_active(names::DONT_NEED));
            assert!(!(c.is_active(names::FADV_RANDOM) && c.is_active(names::FADV_SEQUENTIAL)));
            if c.is_active(names::FADV_RANDOM) || c.is_active(names::FADV_SEQUENTIAL) {
                assert_eq!(c.label(names::IO_WRAPPER), Some("LINUX"));
            }
        }
    }

    #[test]
    fn test_mmap_populate_axis_is_optional() {
        let mut bench = Tablescan {
            mounts: vec!["/mnt/nvme0/pvn".to_owned()],
            page_sizes: vec![4096],
            ..Default::default()
        };
        assert_eq!(bench.axes().len(), 10);

        bench.mmap_populate = true;
        assert_eq!(bench.axes().len(), 11);
        let space = bench.space(&[]).unwrap();
        // previous 4 with the flag off, plus MMAP with it on
        assert_eq!(space.valid().count(), 5);
    }

    #[test]
    fn test_extra_rules_narrow_the_sweep() {
        let bench = Tablescan::default();
        let all = bench.space(&[]).unwrap().valid().count();
        let linux_only = bench
            .space(&[Rule::Require(Condition::LabelIn {
                axis: names::IO_WRAPPER.to_owned(),
                labels: vec!["LINUX".to_owned()],
            })])
            .unwrap()
            .valid()
            .count();
        assert!(linux_only < all);
        assert!(bench
            .space(&[Rule::Require(Condition::Active("Nope".to_owned()))])
            .is_err());
    }
}
