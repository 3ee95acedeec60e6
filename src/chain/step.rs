//! The six selection steps and their ordering

use serde::{Deserialize, Serialize};
use std::fmt;

/// One level of the selection hierarchy.
///
/// The discriminant is the step's position in the chain, so range
/// operations over steps are plain index ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    City = 0,
    Brand = 1,
    Model = 2,
    Generation = 3,
    Specification = 4,
    Maintenance = 5,
}

impl Step {
    pub const COUNT: usize = 6;

    /// All steps in chain order
    pub const ALL: [Step; Step::COUNT] = [
        Step::City,
        Step::Brand,
        Step::Model,
        Step::Generation,
        Step::Specification,
        Step::Maintenance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Step> {
        Self::ALL.get(index).copied()
    }

    /// The step whose selection scopes this one
    pub fn parent(self) -> Option<Step> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn next(self) -> Option<Step> {
        Self::from_index(self.index() + 1)
    }

    /// Resolving the terminal step finalizes the chain
    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Maintenance)
    }

    /// Steps in precedence order, highest first
    pub fn precedence() -> impl Iterator<Item = Step> {
        Self::ALL.into_iter().rev()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::City => "city",
            Step::Brand => "brand",
            Step::Model => "model",
            Step::Generation => "generation",
            Step::Specification => "specification",
            Step::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
