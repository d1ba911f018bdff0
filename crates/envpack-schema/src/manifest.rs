use crate::{PythonVersion, SchemaError};
use serde::Serialize;
use std::fs;
use std::path::Path;

const DEPENDENCIES_MARKER: &str = "dependencies:";
const PREFIX_MARKER: &str = "prefix:";

/// Raw text of an environment export (`conda env export`).
///
/// The text is captured once and never rewritten. Header fields are read
/// leniently: an export without a `name:` line still has a usable dependency
/// region, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentManifest {
    text: String,
}

/// How the dependency region was delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStatus {
    /// Both `dependencies:` and a later `prefix:` line were found.
    Complete,
    /// No line trims to exactly `dependencies:`.
    MissingDependencies,
    /// `dependencies:` was found but no `prefix:` line follows it.
    MissingPrefix,
}

impl MarkerStatus {
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

impl std::fmt::Display for MarkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::MissingDependencies => write!(f, "missing 'dependencies:' marker"),
            Self::MissingPrefix => write!(f, "missing 'prefix:' marker"),
        }
    }
}

/// Trimmed, non-empty dependency lines in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRegion<'a> {
    pub lines: Vec<&'a str>,
    pub markers: MarkerStatus,
}

impl EnvironmentManifest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Value of the top-level `name:` line, if any.
    pub fn name(&self) -> Option<&str> {
        self.header_value("name:")
    }

    /// Value of the `prefix:` line, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.header_value(PREFIX_MARKER)
    }

    /// Entries of the `channels:` list.
    pub fn channels(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut in_channels = false;
        for line in self.text.lines() {
            let trimmed = line.trim();
            if trimmed == "channels:" {
                in_channels = true;
                continue;
            }
            if !in_channels || trimmed.is_empty() {
                continue;
            }
            match trimmed.strip_prefix('-') {
                Some(channel) => out.push(channel.trim()),
                None => break,
            }
        }
        out
    }

    /// Extract the dependency region.
    ///
    /// The first line trimming to `dependencies:` opens the region; the first
    /// later line whose trimmed form starts with `prefix:` closes it. If either
    /// marker is absent the region is empty and the status says which one.
    pub fn dependency_region(&self) -> DependencyRegion<'_> {
        let lines: Vec<&str> = self.text.lines().collect();

        let Some(start) = lines.iter().position(|l| l.trim() == DEPENDENCIES_MARKER) else {
            return DependencyRegion {
                lines: Vec::new(),
                markers: MarkerStatus::MissingDependencies,
            };
        };

        let Some(end) = lines[start + 1..]
            .iter()
            .position(|l| l.trim().starts_with(PREFIX_MARKER))
            .map(|offset| start + 1 + offset)
        else {
            return DependencyRegion {
                lines: Vec::new(),
                markers: MarkerStatus::MissingPrefix,
            };
        };

        DependencyRegion {
            lines: lines[start + 1..end]
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .collect(),
            markers: MarkerStatus::Complete,
        }
    }

    /// Interpreter version pinned by the `python=X.Y.Z=build` dependency, if
    /// the region has one.
    pub fn python_version(&self) -> Option<PythonVersion> {
        self.dependency_region().lines.iter().find_map(|line| {
            let spec = line.trim_start_matches('-').trim();
            let version = spec.strip_prefix("python=")?;
            version.split('=').next()?.parse().ok()
        })
    }

    fn header_value(&self, key: &str) -> Option<&str> {
        self.text
            .lines()
            .filter(|l| !l.starts_with(char::is_whitespace))
            .find_map(|l| l.strip_prefix(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

pub fn parse_manifest_str(text: &str) -> EnvironmentManifest {
    EnvironmentManifest::new(text)
}

pub fn parse_manifest_file(path: &Path) -> Result<EnvironmentManifest, SchemaError> {
    let text = fs::read_to_string(path)?;
    Ok(EnvironmentManifest::new(text))
}
