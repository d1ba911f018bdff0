//! JSON payloads exchanged with the gateway. Field names are camelCase on the
//! wire.

use envpack_schema::ProjectId;
use serde::{Deserialize, Serialize};

/// Canonical storage location and metadata of a registered environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvMeta {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub hdfs_path: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub create_by: String,
    #[serde(default)]
    pub create_time: String,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReuseCheckRequest {
    pub project_id: ProjectId,
    pub manifest_text: String,
}

/// Whether an artifact for a dependency set already exists, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuseDecision {
    pub exists: bool,
    #[serde(rename = "environmentDirectory", default)]
    pub artifact_path: String,
    #[serde(rename = "envName", default)]
    pub artifact_name: String,
}

impl ReuseDecision {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn found(artifact_path: &str, artifact_name: &str) -> Self {
        Self {
            exists: true,
            artifact_path: artifact_path.to_owned(),
            artifact_name: artifact_name.to_owned(),
        }
    }

    /// `exists` with a path to point at. A positive answer without a path
    /// cannot be reused.
    pub fn is_reusable(&self) -> bool {
        self.exists && !self.artifact_path.trim().is_empty()
    }
}

/// Metadata record that makes an environment discoverable by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEnvironment {
    pub project_id: ProjectId,
    pub name: String,
    pub remote_path: String,
    pub manifest_text: String,
    pub created_by: String,
    pub level: u32,
    pub python_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Asks the gateway to adopt a staged package at its canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPackageRequest {
    pub project_id: ProjectId,
    pub name: String,
    pub src_path: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegistrationStatus {
    Ok,
    Failed,
}

/// Only an explicit success counts; unknown or empty statuses are failures.
impl From<String> for RegistrationStatus {
    fn from(s: String) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("success") {
            Self::Ok
        } else {
            Self::Failed
        }
    }
}

impl From<RegistrationStatus> for String {
    fn from(s: RegistrationStatus) -> Self {
        match s {
            RegistrationStatus::Ok => "ok".to_owned(),
            RegistrationStatus::Failed => "failed".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub status: RegistrationStatus,
    #[serde(default)]
    pub message: String,
}

impl RegistrationResult {
    pub fn ok(message: &str) -> Self {
        Self {
            status: RegistrationStatus::Ok,
            message: message.to_owned(),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            status: RegistrationStatus::Failed,
            message: message.to_owned(),
        }
    }
}

/// Outcome of a name-collision check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameCheck {
    Available,
    /// The requested name is already taken.
    NameTaken,
    /// An identical package is already registered under another name.
    DuplicateOf(String),
}

impl NameCheck {
    /// Interpret the gateway's answer for `requested`.
    pub fn from_response(requested: &str, response: &str) -> Self {
        let response = response.trim();
        if response.is_empty() {
            Self::Available
        } else if response == requested {
            Self::NameTaken
        } else {
            Self::DuplicateOf(response.to_owned())
        }
    }
}
