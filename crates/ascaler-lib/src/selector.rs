//! Equality-based label selectors (`name=eapPod,tier!=cache`)

use crate::error::ScaleError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    value: String,
}

/// Parsed label query identifying the managed pod group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector string. An empty string selects everything.
    pub fn parse(input: &str) -> Result<Self, ScaleError> {
        let mut requirements = Vec::new();

        for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, operator, value) = if let Some((k, v)) = term.split_once("!=") {
                (k, Operator::NotEquals, v)
            } else if let Some((k, v)) = term.split_once("==") {
                (k, Operator::Equals, v)
            } else if let Some((k, v)) = term.split_once('=') {
                (k, Operator::Equals, v)
            } else {
                return Err(ScaleError::Config(format!(
                    "invalid selector term '{}': expected key=value or key!=value",
                    term
                )));
            };

            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || !key.chars().all(is_key_char) {
                return Err(ScaleError::Config(format!(
                    "invalid label key '{}' in selector '{}'",
                    key, input
                )));
            }
            if !value.chars().all(is_value_char) {
                return Err(ScaleError::Config(format!(
                    "invalid label value '{}' in selector '{}'",
                    value, input
                )));
            }

            requirements.push(Requirement {
                key: key.to_string(),
                operator,
                value: value.to_string(),
            });
        }

        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| {
            let actual = labels.get(&req.key).map(String::as_str);
            match req.operator {
                Operator::Equals => actual == Some(req.value.as_str()),
                Operator::NotEquals => actual != Some(req.value.as_str()),
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl FromStr for LabelSelector {
    type Err = ScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical form, as sent to the orchestrator
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .requirements
            .iter()
            .map(|req| match req.operator {
                Operator::Equals => format!("{}={}", req.key, req.value),
                Operator::NotEquals => format!("{}!={}", req.key, req.value),
            })
            .collect();
        write!(f, "{}", terms.join(","))
    }
}
