use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yml::with::singleton_map_recursive;
use thiserror::Error;

use crate::axis::{Axis, Setting};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("Axis {0} is declared more than once")]
    DuplicateAxis(String),
    #[error("Rule {rule} references unknown axis {axis}")]
    UnknownAxis { rule: String, axis: String },
}

/// One setting per axis, in axis declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination<'a> {
    axes: &'a [Axis],
    settings: Vec<Setting>,
}

impl<'a> Combination<'a> {
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    pub fn get(&self, axis: &str) -> Option<&Setting> {
        self.axes
            .iter()
            .position(|a| a.name() == axis)
            .map(|idx| &self.settings[idx])
    }

    pub fn label(&self, axis: &str) -> Option<&str> {
        self.get(axis).map(|s| s.label.as_str())
    }

    pub fn is_active(&self, axis: &str) -> bool {
        self.get(axis).is_some_and(Setting::is_active)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.settings.iter().map(|s| s.label.as_str())
    }

    /// Non-empty command line fragments, skipping the axes in `exclude`
    pub fn fragments<'s>(&'s self, exclude: &'s [&str]) -> impl Iterator<Item = &'s str> {
        self.axes
            .iter()
            .zip(self.settings.iter())
            .filter(|(axis, _)| !exclude.iter().any(|e| *e == axis.name()))
            .map(|(_, s)| s.fragment.trim())
            .filter(|f| !f.is_empty())
    }
}

/// A predicate over a single axis of a combination.
///
/// `contains` and `token_count` inspect the label, which for value axes is the
/// fragment without its flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Active(String),
    Inactive(String),
    LabelIn { axis: String, labels: Vec<String> },
    Contains { axis: String, pattern: String },
    TokenCount { axis: String, count: usize },
}

impl Condition {
    pub fn axis(&self) -> &str {
        match self {
            Condition::Active(axis) | Condition::Inactive(axis) => axis,
            Condition::LabelIn { axis, .. }
            | Condition::Contains { axis, .. }
            | Condition::TokenCount { axis, .. } => axis,
        }
    }

    /// `None` when the combination has no such axis
    pub fn eval(&self, combination: &Combination<'_>) -> Option<bool> {
        let setting = combination.get(self.axis())?;
        Some(match self {
            Condition::Active(_) => setting.is_active(),
            Condition::Inactive(_) => !setting.is_active(),
            Condition::LabelIn { labels, .. } => labels.iter().any(|l| *l == setting.label),
            Condition::Contains { pattern, .. } => setting.label.contains(pattern.as_str()),
            Condition::TokenCount { count, .. } => {
                setting.label.split_whitespace().count() == *count
            }
        })
    }
}

/// Declarative validity rule. Rules compose by logical AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Require(Condition),
    Forbid(Condition),
    Implies { when: Condition, then: Condition },
    /// At most one of the listed axes may be active
    Exclusive(Vec<String>),
}

impl Rule {
    pub fn axes(&self) -> Vec<&str> {
        match self {
            Rule::Require(c) | Rule::Forbid(c) => vec![c.axis()],
            Rule::Implies { when, then } => vec![when.axis(), then.axis()],
            Rule::Exclusive(axes) => axes.iter().map(String::as_str).collect(),
        }
    }

    /// Total over every combination: an unknown axis rejects.
    pub fn accepts(&self, combination: &Combination<'_>) -> bool {
        match self {
            Rule::Require(c) => c.eval(combination) == Some(true),
            Rule::Forbid(c) => c.eval(combination) == Some(false),
            Rule::Implies { when, then } => match when.eval(combination) {
                Some(false) => true,
                Some(true) => then.eval(combination) == Some(true),
                None => false,
            },
            Rule::Exclusive(axes) => {
                axes.iter().all(|a| combination.get(a).is_some())
                    && axes.iter().filter(|a| combination.is_active(a)).count() <= 1
            }
        }
    }
}

/// A list of rules, written in YAML as single-key maps (`- require: { active: X }`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rules(Vec<Rule>);

impl Serialize for Rules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        singleton_map_recursive::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Rules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        singleton_map_recursive::deserialize(deserializer).map(Rules)
    }
}

impl Rules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn accepts(&self, combination: &Combination<'_>) -> bool {
        self.0.iter().all(|r| r.accepts(combination))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.0
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.0.extend(rules);
    }
}

/// Lazily applies `predicate`; a combination is kept iff it returns true.
pub fn filter<'a, I, F>(combinations: I, predicate: F) -> impl Iterator<Item = Combination<'a>>
where
    I: Iterator<Item = Combination<'a>>,
    F: Fn(&Combination<'a>) -> bool,
{
    combinations.filter(move |c| predicate(c))
}

/// Cartesian product over an ordered list of axes, pruned by [`Rules`].
#[derive(Debug, Clone)]
pub struct CombinationSpace {
    axes: Vec<Axis>,
    rules: Rules,
}

impl CombinationSpace {
    pub fn new(axes: Vec<Axis>) -> Result<Self, SpaceError> {
        let mut seen = HashSet::new();
        for axis in &axes {
            if !seen.insert(axis.name()) {
                return Err(SpaceError::DuplicateAxis(axis.name().to_owned()));
            }
        }
        Ok(Self {
            axes,
            rules: Rules::default(),
        })
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Result<Self, SpaceError> {
        for rule in rules {
            if let Some(axis) = rule
                .axes()
                .into_iter()
                .find(|a| !self.axes.iter().any(|x| x.name() == *a))
            {
                return Err(SpaceError::UnknownAxis {
                    rule: format!("{rule:?}"),
                    axis: axis.to_owned(),
                });
            }
            self.rules.extend([rule]);
        }
        Ok(self)
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(Axis::name)
    }

    /// Number of combinations before filtering
    pub fn size(&self) -> usize {
        self.axes.iter().map(Axis::len).product()
    }

    /// Full product, first axis varying slowest. Restartable by calling again.
    pub fn combinations(&self) -> impl Iterator<Item = Combination<'_>> {
        self.axes
            .iter()
            .map(Axis::settings)
            .multi_cartesian_product()
            .map(|settings| Combination {
                axes: &self.axes,
                settings,
            })
    }

    pub fn valid(&self) -> impl Iterator<Item = Combination<'_>> {
        filter(self.combinations(), |c| self.rules.accepts(c))
    }
}
