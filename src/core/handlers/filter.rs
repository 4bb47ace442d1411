//! Inclusion filtering at the handler boundary.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when an include pattern does not compile.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid include filter {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Include filters as written in configuration: a single pattern or a list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum IncludeFilters {
    One(String),
    Many(Vec<String>),
}

impl Default for IncludeFilters {
    fn default() -> Self {
        IncludeFilters::Many(vec!["^.*".to_string()])
    }
}

impl IncludeFilters {
    /// Normalizes both forms to an ordered list of patterns.
    pub fn into_patterns(self) -> Vec<String> {
        match self {
            IncludeFilters::One(pattern) => vec![pattern],
            IncludeFilters::Many(patterns) => patterns,
        }
    }
}

/// Decides whether a `collector.metric` path may be emitted.
///
/// A path passes if any pattern matches at its start. Without patterns
/// every path passes.
#[derive(Debug, Clone)]
pub struct SinkFilter {
    include: Option<Regex>,
}

impl SinkFilter {
    /// Compiles the patterns once.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidPattern` naming the first pattern that
    /// does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut alternatives = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            // Compile each one alone so the error names the culprit.
            Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            alternatives.push(format!("(?:{})", pattern));
        }

        if alternatives.is_empty() {
            return Ok(SinkFilter { include: None });
        }

        let combined = format!("^(?:{})", alternatives.join("|"));
        let include = Regex::new(&combined).map_err(|source| FilterError::InvalidPattern {
            pattern: combined.clone(),
            source,
        })?;
        Ok(SinkFilter {
            include: Some(include),
        })
    }

    /// A filter that lets everything through.
    pub fn allow_all() -> Self {
        SinkFilter { include: None }
    }

    pub fn should_emit(&self, path: &str) -> bool {
        self.include
            .as_ref()
            .map_or(true, |include| include.is_match(path))
    }
}

impl TryFrom<IncludeFilters> for SinkFilter {
    type Error = FilterError;

    fn try_from(filters: IncludeFilters) -> Result<Self, Self::Error> {
        SinkFilter::new(filters.into_patterns())
    }
}
