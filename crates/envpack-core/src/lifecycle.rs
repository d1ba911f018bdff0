use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Where a packaging job is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    ManifestExported,
    FingerprintChecked,
    /// An equivalent artifact already existed; nothing was built.
    ShortCircuitDone,
    Building,
    Archived,
    Staged,
    Registered,
    Cleaned,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShortCircuitDone | Self::Cleaned | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::ManifestExported => "manifest_exported",
            Self::FingerprintChecked => "fingerprint_checked",
            Self::ShortCircuitDone => "short_circuit_done",
            Self::Building => "building",
            Self::Archived => "archived",
            Self::Staged => "staged",
            Self::Registered => "registered",
            Self::Cleaned => "cleaned",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: PipelineState, to: PipelineState) -> Result<(), CoreError> {
    use PipelineState::{
        Archived, Building, Cleaned, Failed, FingerprintChecked, Idle, ManifestExported,
        Registered, ShortCircuitDone, Staged,
    };

    let valid = matches!(
        (from, to),
        (Idle, ManifestExported)
            | (ManifestExported, FingerprintChecked)
            | (FingerprintChecked, ShortCircuitDone | Building)
            | (Building, Archived)
            | (Archived, Staged)
            | (Staged, Registered)
            | (Registered, Cleaned)
    ) || (to == Failed && !from.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
