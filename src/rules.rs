//! Publisher rules
//!
//! A deployment can restrict which program may publish which topics. The
//! policy is loaded once from a small text file and evaluated on every
//! advertise call. File format, one directive per line:
//!
//! ```text
//! # comment
//! module: navigator
//! restrict_topics: vehicle_command, vehicle_attitude_setpoint
//! ignore_others: false
//! ```
//!
//! With `ignore_others: false` (the default) the named module is denied the
//! listed topics and everyone else is unaffected. With `ignore_others: true`
//! the named module may publish *only* the listed topics, while every other
//! program may publish anything *except* them.

use std::fs;
use std::path::Path;

use crate::error::{OrbitError, Result};

const MODULE_DIRECTIVE: &str = "module:";
const TOPICS_DIRECTIVE: &str = "restrict_topics:";
const IGNORE_DIRECTIVE: &str = "ignore_others:";

/// Parsed publisher rule, evaluated per advertise call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherRule {
    /// Program name the rule applies to
    pub module_name: String,
    /// Topics the rule restricts
    pub topics: Vec<String>,
    /// Flips the rule from a deny-list into an exclusive allow-list
    pub ignore_other_topics: bool,
}

impl PublisherRule {
    /// Load a rule from a text file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| OrbitError::from_io(e, &format!("reading rules file {}", path.display())))?;
        Self::from_str_contents(&contents)
    }

    /// Parse a rule from file contents.
    pub fn from_str_contents(contents: &str) -> Result<Self> {
        let mut module_name: Option<String> = None;
        let mut topics: Vec<String> = Vec::new();
        let mut ignore_other_topics = false;

        for line in contents.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix(TOPICS_DIRECTIVE) {
                topics = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
            } else if let Some(rest) = line.strip_prefix(MODULE_DIRECTIVE) {
                module_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix(IGNORE_DIRECTIVE) {
                ignore_other_topics = match rest.trim() {
                    "true" => true,
                    "false" => false,
                    other => {
                        log::error!("publisher rules: bad ignore_others value: {}", other);
                        return Err(OrbitError::invalid_parameter(
                            "ignore_others",
                            format!("expected true or false, got '{}'", other),
                        ));
                    }
                };
            } else {
                log::error!("publisher rules: unrecognized line: {}", line);
                return Err(OrbitError::invalid_parameter(
                    "rules",
                    format!("unrecognized directive: {}", line),
                ));
            }
        }

        let module_name = module_name.filter(|m| !m.is_empty());

        match module_name {
            Some(module_name) if !topics.is_empty() => Ok(Self {
                module_name,
                topics,
                ignore_other_topics,
            }),
            _ => Err(OrbitError::invalid_parameter(
                "rules",
                "both module and restrict_topics are required",
            )),
        }
    }

    /// Whether the rule names this topic.
    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Whether `module` may advertise `topic` under this rule.
    pub fn allows(&self, module: &str, topic: &str) -> bool {
        let listed = self.contains_topic(topic);

        if self.ignore_other_topics {
            if module == self.module_name {
                listed
            } else {
                !listed
            }
        } else if module == self.module_name {
            !listed
        } else {
            true
        }
    }
}
