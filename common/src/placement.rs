use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("Core group {0} is empty")]
    EmptyGroup(&'static str),
}

/// A set of cores sharing one memory node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreGroup {
    pub cores: Vec<usize>,
    pub mem_node: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RawCoreTable {
    group_a: CoreGroup,
    group_b: CoreGroup,
}

/// Two disjoint core groups that workers alternate between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCoreTable", into = "RawCoreTable")]
pub struct CoreTable {
    group_a: CoreGroup,
    group_b: CoreGroup,
}

impl TryFrom<RawCoreTable> for CoreTable {
    type Error = PlacementError;

    fn try_from(raw: RawCoreTable) -> Result<Self, Self::Error> {
        CoreTable::new(raw.group_a, raw.group_b)
    }
}

impl From<CoreTable> for RawCoreTable {
    fn from(table: CoreTable) -> Self {
        RawCoreTable {
            group_a: table.group_a,
            group_b: table.group_b,
        }
    }
}

impl CoreTable {
    pub fn new(group_a: CoreGroup, group_b: CoreGroup) -> Result<Self, PlacementError> {
        if group_a.cores.is_empty() {
            return Err(PlacementError::EmptyGroup("group_a"));
        }
        if group_b.cores.is_empty() {
            return Err(PlacementError::EmptyGroup("group_b"));
        }
        Ok(Self { group_a, group_b })
    }

    pub fn len(&self) -> usize {
        self.group_a.cores.len() + self.group_b.cores.len()
    }

    /// `(core, mem_node)` for a worker: even workers walk group A, odd workers
    /// walk group B, wrapping after the combined table size.
    pub fn slot(&self, worker: usize) -> (usize, usize) {
        let t = worker % self.len();
        let group = if t % 2 == 0 {
            &self.group_a
        } else {
            &self.group_b
        };
        (group.cores[(t / 2) % group.cores.len()], group.mem_node)
    }
}

/// Maps a worker index to the locality prefix of its command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Placement {
    #[default]
    None,
    /// Every worker bound to the same CPU and memory nodes
    Zone { cpu_nodes: String, mem_nodes: String },
    Pinned(CoreTable),
}

impl Placement {
    pub fn prefix_for(&self, worker: usize) -> Option<String> {
        match self {
            Placement::None => None,
            Placement::Zone {
                cpu_nodes,
                mem_nodes,
            } => Some(format!(
                "numactl --cpunodebind={cpu_nodes} --membind={mem_nodes}"
            )),
            Placement::Pinned(table) => {
                let (core, mem) = table.slot(worker);
                Some(format!("numactl --physcpubind={core} --membind={mem}"))
            }
        }
    }
}
