use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the gateway lives and which credentials to present.
///
/// Credentials are injected once here; individual calls never build their own
/// auth headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub operator_id: Option<String>,
}

impl GatewayConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
            operator_id: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator: &str) -> Self {
        self.operator_id = Some(operator.to_owned());
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Check the URL is usable before any request is made.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if !self.is_configured() {
            return Err(RemoteError::Config("gateway url is not set".to_owned()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(RemoteError::Config(format!(
                "gateway url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("invalid gateway config: {e}")))?;
        config.url = config.url.trim_end_matches('/').to_owned();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_strips_trailing_slash() {
        let config = GatewayConfig::new("https://gw.example.com/api/v1/");
        assert_eq!(config.url, "https://gw.example.com/api/v1");
    }

    #[test]
    fn load_reads_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(
            &path,
            r#"{"url":"http://gw:8080/","auth_token":"t0k","operator_id":"ops@example.com"}"#,
        )
        .unwrap();

        let loaded = GatewayConfig::load(&path).unwrap();
        assert_eq!(loaded.url, "http://gw:8080");
        assert_eq!(loaded.auth_token.as_deref(), Some("t0k"));
        assert_eq!(loaded.operator_id.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            GatewayConfig::load(&path),
            Err(RemoteError::Config(_))
        ));
    }

    #[test]
    fn validate_requires_http_url() {
        assert!(GatewayConfig::default().validate().is_err());
        assert!(GatewayConfig::new("ftp://gw").validate().is_err());
        assert!(GatewayConfig::new("http://gw")
            .with_token("x")
            .with_operator("y")
            .validate()
            .is_ok());
    }
}
