//! In-memory gateway for tests and offline runs.

use crate::{
    EnvMeta, GatewayApi, RegisterEnvironment, RegisterResponse, RegistrationResult, RemoteError,
    ReuseCheckRequest, ReuseDecision, UploadPackageRequest,
};
use envpack_schema::ProjectId;
use std::sync::Mutex;

/// How the mock answers reuse checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReuseBehavior {
    NotFound,
    Found { path: String, name: String },
    Unreachable,
}

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    EnvMeta {
        project: String,
        name: String,
        level: u32,
    },
    ReusableCheck {
        project: String,
        manifest_text: String,
    },
    Register(RegisterEnvironment),
    Upload(UploadPackageRequest),
    CheckName {
        project: String,
        name: String,
    },
}

struct MockState {
    reuse: ReuseBehavior,
    upload: Result<RegistrationResult, String>,
    register: Result<RegisterResponse, String>,
    check_name: String,
    meta: Option<EnvMeta>,
    calls: Vec<GatewayCall>,
}

/// Gateway double with scripted answers. Errors are scripted as strings and
/// surface as [`RemoteError::Transport`].
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                reuse: ReuseBehavior::NotFound,
                upload: Ok(RegistrationResult::ok("")),
                register: Ok(RegisterResponse {
                    success: true,
                    message: String::new(),
                }),
                check_name: String::new(),
                meta: None,
                calls: Vec::new(),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_reuse(&self, behavior: ReuseBehavior) {
        self.with_state(|s| s.reuse = behavior);
    }

    pub fn set_upload_result(&self, result: Result<RegistrationResult, String>) {
        self.with_state(|s| s.upload = result);
    }

    pub fn set_register_response(&self, result: Result<RegisterResponse, String>) {
        self.with_state(|s| s.register = result);
    }

    pub fn set_check_name(&self, answer: &str) {
        self.with_state(|s| s.check_name = answer.to_owned());
    }

    pub fn set_meta(&self, meta: EnvMeta) {
        self.with_state(|s| s.meta = Some(meta));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.with_state(|s| s.calls.clone())
    }
}

impl GatewayApi for MockGateway {
    fn env_meta(
        &self,
        project: &ProjectId,
        name: &str,
        level: u32,
    ) -> Result<EnvMeta, RemoteError> {
        self.with_state(|s| {
            s.calls.push(GatewayCall::EnvMeta {
                project: project.to_string(),
                name: name.to_owned(),
                level,
            });
            s.meta
                .clone()
                .ok_or_else(|| RemoteError::NotFound(format!("environment {name}")))
        })
    }

    fn reusable_check(&self, request: &ReuseCheckRequest) -> Result<ReuseDecision, RemoteError> {
        self.with_state(|s| {
            s.calls.push(GatewayCall::ReusableCheck {
                project: request.project_id.to_string(),
                manifest_text: request.manifest_text.clone(),
            });
            match &s.reuse {
                ReuseBehavior::NotFound => Ok(ReuseDecision::not_found()),
                ReuseBehavior::Found { path, name } => Ok(ReuseDecision::found(path, name)),
                ReuseBehavior::Unreachable => Err(RemoteError::Transport(
                    "connection refused".to_owned(),
                )),
            }
        })
    }

    fn register_environment(
        &self,
        request: &RegisterEnvironment,
    ) -> Result<RegisterResponse, RemoteError> {
        self.with_state(|s| {
            s.calls.push(GatewayCall::Register(request.clone()));
            s.register.clone().map_err(RemoteError::Transport)
        })
    }

    fn upload_package(
        &self,
        request: &UploadPackageRequest,
    ) -> Result<RegistrationResult, RemoteError> {
        self.with_state(|s| {
            s.calls.push(GatewayCall::Upload(request.clone()));
            s.upload.clone().map_err(RemoteError::Transport)
        })
    }

    fn check_name(
        &self,
        project: &ProjectId,
        name: &str,
        _manifest_text: &str,
    ) -> Result<String, RemoteError> {
        self.with_state(|s| {
            s.calls.push(GatewayCall::CheckName {
                project: project.to_string(),
                name: name.to_owned(),
            });
            Ok(s.check_name.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let gw = MockGateway::new();
        let p = ProjectId::new("1");
        let _ = gw.env_meta(&p, "a", 1);
        let _ = gw.check_name(&p, "a", "");
        let calls = gw.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], GatewayCall::EnvMeta { .. }));
        assert!(matches!(calls[1], GatewayCall::CheckName { .. }));
    }

    #[test]
    fn meta_defaults_to_not_found() {
        let gw = MockGateway::new();
        assert!(matches!(
            gw.env_meta(&ProjectId::new("1"), "a", 1),
            Err(RemoteError::NotFound(_))
        ));
    }
}
