use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    bench::{Bench, BenchArgs},
    placement::Placement,
    space::Rules,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub benches: Vec<InnerBench>,
    #[serde(default)]
    pub bench_args: Vec<Box<dyn BenchArgs>>,
}

impl Config {
    /// The configured args for `bench`, or its defaults
    pub fn bench_args(&self, bench: &dyn Bench) -> Box<dyn BenchArgs> {
        for args in &self.bench_args {
            if args.name() == bench.name() {
                return args.clone();
            }
        }
        bench.default_bench_args()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub placement: Placement,
    pub env: Option<HashMap<String, String>>,
}

/// What a failed trial does to the rest of its bench
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failing exit codes, record no row and move on
    #[default]
    Continue,
    /// Flush what was recorded and stop the whole run
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnerBench {
    pub name: String,
    pub repeat: usize,
    pub bench: Box<dyn Bench>,
    /// Added to the bench's own validity rules
    #[serde(default)]
    pub extra_rules: Rules,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}
