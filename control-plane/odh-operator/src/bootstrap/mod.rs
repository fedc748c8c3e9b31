//! Operator creation and lifecycle.

mod factory;
mod operator;

use std::fmt;
use std::str::FromStr;

pub use factory::Factory;
pub use operator::{MainOperator, Operator, cache_exclusions};

use crate::error::Error;

/// Closed set of operator implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Main,
    CloudManager,
}

impl OperatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::Main => "main",
            OperatorKind::CloudManager => "cloud-manager",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(OperatorKind::Main),
            "cloud-manager" => Ok(OperatorKind::CloudManager),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Created,
    Configuring,
    /// Setup finished; ready to start.
    Ready,
    Running,
    Stopped,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_their_tags() {
        for kind in [OperatorKind::Main, OperatorKind::CloudManager] {
            assert_eq!(kind.as_str().parse::<OperatorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_tag_is_named_in_error() {
        let err = "bogus".parse::<OperatorKind>().unwrap_err();
        assert!(matches!(&err, Error::UnknownKind(v) if v == "bogus"));
        assert!(err.to_string().contains("bogus"));
    }
}
