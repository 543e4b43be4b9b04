//! Analysis configuration.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::predicate::PredicateScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `cpa.norefinement` (inverted): check error paths and refine.
    pub refinement: bool,
    /// `analysis.bfs`: breadth-first waitlist, refinement restarts at the root.
    pub breadth_first: bool,
    /// `cpa.predicates.scope`
    pub predicate_scope: PredicateScope,
    /// `cpa.predicates.file`: fixed predicates instead of refined ones.
    pub predicate_file: Option<PathBuf>,
    /// `analysis.reached.indexed`
    pub location_indexed_reached: bool,
    /// `cegar.max_refinements`
    pub max_refinements: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refinement: true,
            breadth_first: false,
            predicate_scope: PredicateScope::Location,
            predicate_file: None,
            location_indexed_reached: true,
            max_refinements: None,
        }
    }
}

impl Config {
    pub fn with_refinement(mut self, refinement: bool) -> Self {
        self.refinement = refinement;
        self
    }

    pub fn with_breadth_first(mut self, breadth_first: bool) -> Self {
        self.breadth_first = breadth_first;
        self
    }

    pub fn with_predicate_scope(mut self, scope: PredicateScope) -> Self {
        self.predicate_scope = scope;
        self
    }

    pub fn with_predicate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.predicate_file = Some(path.into());
        self
    }

    pub fn with_location_indexed_reached(mut self, indexed: bool) -> Self {
        self.location_indexed_reached = indexed;
        self
    }

    pub fn with_max_refinements(mut self, limit: usize) -> Self {
        self.max_refinements = Some(limit);
        self
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for (i, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::MalformedLine { line: i + 1 })?;
            config.set(key.trim(), value.trim())?;
        }
        Ok(config)
    }

    /// Set a single property.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "cpa.norefinement" => self.refinement = !parse_bool(value).ok_or_else(invalid)?,
            "analysis.bfs" => self.breadth_first = parse_bool(value).ok_or_else(invalid)?,
            "cpa.predicates.scope" => {
                self.predicate_scope = PredicateScope::parse(value).ok_or_else(invalid)?;
            }
            "cpa.predicates.file" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.predicate_file = Some(PathBuf::from(value));
            }
            "analysis.reached.indexed" => {
                self.location_indexed_reached = parse_bool(value).ok_or_else(invalid)?;
            }
            "cegar.max_refinements" => {
                self.max_refinements = Some(value.parse().map_err(|_| invalid())?);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
