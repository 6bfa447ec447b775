use serde::{Deserialize, Serialize};

/// One selected value of an axis: the label written to the results and the
/// fragment placed on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Setting {
    pub label: String,
    pub fragment: String,
}

impl Setting {
    pub fn new(label: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fragment: fragment.into(),
        }
    }

    /// A setting is active when it contributes something to the command line.
    pub fn is_active(&self) -> bool {
        !self.fragment.trim().is_empty()
    }
}

/// A tunable sweep dimension.
///
/// * [`Axis::Values`] yields `flag + " " + value` for every value, in order
/// * [`Axis::Flag`] yields `("no", "")` followed by `("yes", flag)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Axis {
    Values {
        name: String,
        flag: String,
        values: Vec<String>,
    },
    Flag {
        name: String,
        flag: String,
    },
}

pub const FLAG_OFF: &str = "no";
pub const FLAG_ON: &str = "yes";

impl Axis {
    pub fn values<I, V>(name: &str, flag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Axis::Values {
            name: name.to_owned(),
            flag: flag.to_owned(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn flag(name: &str, flag: &str) -> Self {
        Axis::Flag {
            name: name.to_owned(),
            flag: flag.to_owned(),
        }
    }

    /// Column header for this axis
    pub fn name(&self) -> &str {
        match self {
            Axis::Values { name, .. } | Axis::Flag { name, .. } => name,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Axis::Values { values, .. } => values.len(),
            Axis::Flag { .. } => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered `(label, fragment)` pairs. Iteration order is stable.
    pub fn settings(&self) -> impl Iterator<Item = Setting> + Clone + '_ {
        (0..self.len()).map(move |i| self.setting(i))
    }

    fn setting(&self, i: usize) -> Setting {
        match self {
            Axis::Values { flag, values, .. } => {
                Setting::new(values[i].clone(), format!("{flag} {}", values[i]))
            }
            Axis::Flag { flag, .. } => {
                if i == 0 {
                    Setting::new(FLAG_OFF, "")
                } else {
                    Setting::new(FLAG_ON, flag.clone())
                }
            }
        }
    }
}
