//! Compiled topic filters
//!
//! Patterns are split on `/` once at registration time. In strict mode `+`
//! matches exactly one level and `#` matches one or more trailing levels. Legacy
//! mode reproduces the permissive prefix matching some deployments rely on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How subscription patterns are matched against inbound topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Per-level hierarchical matching
    #[default]
    Strict,
    /// Topic starts with the pattern, or the pattern contains any wildcard
    Legacy,
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("Topic filter is empty")]
    Empty,
    #[error("Multi-level wildcard '#' must be the last level in '{0}'")]
    MultiLevelNotLast(String),
    #[error("Wildcard mixed into level '{level}' of '{pattern}'")]
    WildcardInLevel { pattern: String, level: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Level {
    Literal(String),
    /// `+`
    Single,
    /// `#`
    Multi,
}

#[derive(Debug, Clone, PartialEq)]
enum Matcher {
    Strict(Vec<Level>),
    Legacy,
}

/// A subscription pattern compiled for repeated matching
#[derive(Debug, Clone, PartialEq)]
pub struct TopicFilter {
    pattern: String,
    matcher: Matcher,
}

impl TopicFilter {
    pub fn parse(pattern: &str, mode: MatchMode) -> Result<Self, FilterError> {
        if pattern.is_empty() {
            return Err(FilterError::Empty);
        }

        let matcher = match mode {
            MatchMode::Legacy => Matcher::Legacy,
            MatchMode::Strict => Matcher::Strict(Self::parse_levels(pattern)?),
        };

        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    fn parse_levels(pattern: &str) -> Result<Vec<Level>, FilterError> {
        let raw: Vec<&str> = pattern.split('/').collect();
        let last = raw.len() - 1;

        raw.iter()
            .enumerate()
            .map(|(i, level)| match *level {
                "+" => Ok(Level::Single),
                "#" if i == last => Ok(Level::Multi),
                "#" => Err(FilterError::MultiLevelNotLast(pattern.to_string())),
                other if other.contains(['+', '#']) => Err(FilterError::WildcardInLevel {
                    pattern: pattern.to_string(),
                    level: other.to_string(),
                }),
                other => Ok(Level::Literal(other.to_string())),
            })
            .collect()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_wildcards(&self) -> bool {
        self.pattern.contains(['+', '#'])
    }

    pub fn matches(&self, topic: &str) -> bool {
        match &self.matcher {
            Matcher::Legacy => topic.starts_with(&self.pattern) || self.has_wildcards(),
            Matcher::Strict(levels) => Self::matches_levels(levels, topic),
        }
    }

    fn matches_levels(levels: &[Level], topic: &str) -> bool {
        let mut topic_levels = topic.split('/');

        for level in levels {
            match level {
                // at least one level must remain
                Level::Multi => return topic_levels.next().is_some(),
                Level::Single => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                Level::Literal(expected) => match topic_levels.next() {
                    Some(actual) if actual == expected => {}
                    _ => return false,
                },
            }
        }

        topic_levels.next().is_none()
    }
}
