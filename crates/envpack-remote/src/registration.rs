use crate::{
    GatewayApi, RegisterEnvironment, RegistrationStatus, RemoteError, UploadPackageRequest,
};

/// Strict wrapper over the gateway's registration endpoints.
///
/// Unlike reuse, registration failures are never swallowed: a transport error
/// or a 2xx answer that reports failure both come back as `Err`.
pub struct RegistrationClient<'a> {
    gateway: &'a dyn GatewayApi,
}

impl<'a> RegistrationClient<'a> {
    pub fn new(gateway: &'a dyn GatewayApi) -> Self {
        Self { gateway }
    }

    /// Ask the gateway to adopt a staged package at its canonical path.
    pub fn adopt_package(&self, request: &UploadPackageRequest) -> Result<(), RemoteError> {
        let result = self.gateway.upload_package(request)?;
        match result.status {
            RegistrationStatus::Ok => {
                tracing::info!("package {} adopted at {}", request.name, request.target_path);
                Ok(())
            }
            RegistrationStatus::Failed => Err(RemoteError::Logic(if result.message.is_empty() {
                format!("gateway refused package {}", request.name)
            } else {
                result.message
            })),
        }
    }

    /// Record the environment's metadata so it can be found by name.
    pub fn register(&self, request: &RegisterEnvironment) -> Result<(), RemoteError> {
        let response = self.gateway.register_environment(request)?;
        if response.success {
            tracing::info!("environment {} registered", request.name);
            Ok(())
        } else {
            Err(RemoteError::Logic(if response.message.is_empty() {
                format!("gateway refused to register environment {}", request.name)
            } else {
                response.message
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockGateway, RegisterResponse, RegistrationResult};
    use envpack_schema::ProjectId;

    fn upload() -> UploadPackageRequest {
        UploadPackageRequest {
            project_id: ProjectId::new("7"),
            name: "pri_7_a.tar.gz".to_owned(),
            src_path: "hdfs://dptestservice1/tmp/j_pri_7_a.tar.gz".to_owned(),
            target_path: "/dsp/python_env_resource/pri_7_a.tar.gz".to_owned(),
        }
    }

    #[test]
    fn failed_status_with_message_becomes_logic_error() {
        let gw = MockGateway::new();
        gw.set_upload_result(Ok(RegistrationResult::failed("duplicate name")));
        let err = RegistrationClient::new(&gw)
            .adopt_package(&upload())
            .unwrap_err();
        match err {
            RemoteError::Logic(msg) => assert_eq!(msg, "duplicate name"),
            other => panic!("expected Logic, got {other:?}"),
        }
    }

    #[test]
    fn transport_error_is_propagated() {
        let gw = MockGateway::new();
        gw.set_upload_result(Err("HTTP 503".to_owned()));
        let err = RegistrationClient::new(&gw)
            .adopt_package(&upload())
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }

    #[test]
    fn ok_status_succeeds() {
        let gw = MockGateway::new();
        RegistrationClient::new(&gw).adopt_package(&upload()).unwrap();
        assert_eq!(gw.calls().len(), 1);
    }

    #[test]
    fn unsuccessful_register_is_logic_error() {
        let gw = MockGateway::new();
        gw.set_register_response(Ok(RegisterResponse {
            success: false,
            message: String::new(),
        }));
        let err = RegistrationClient::new(&gw)
            .register(&RegisterEnvironment {
                project_id: ProjectId::new("7"),
                name: "a".to_owned(),
                remote_path: "/p".to_owned(),
                manifest_text: String::new(),
                created_by: "alice".to_owned(),
                level: 1,
                python_version: "3.8.0".to_owned(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("refused to register environment a"));
    }
}
