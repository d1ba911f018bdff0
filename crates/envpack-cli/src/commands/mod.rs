pub mod check_name;
pub mod completions;
pub mod doctor;
pub mod download;
pub mod fingerprint;
pub mod package;
pub mod submit;

use envpack_core::{CoreError, EnvpackConfig, ErrorKind, Pipeline, PipelineSettings};
use envpack_remote::HttpGateway;
use envpack_schema::SessionContext;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION_ERROR: u8 = 2;
pub const EXIT_REMOTE_ERROR: u8 = 3;
/// Run stopped by Ctrl-C after cleanup.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Resolved configuration plus the per-invocation values from flags.
pub struct Context {
    pub config: EnvpackConfig,
    pub config_path: Option<PathBuf>,
    pub project: Option<String>,
}

impl Context {
    /// Layer config file, `ENVPACK_*` variables, then flags.
    pub fn load(
        config_path: Option<&Path>,
        gateway: Option<&str>,
        backend: Option<&str>,
        project: Option<&str>,
    ) -> Result<Self, String> {
        let (mut config, path) = match config_path {
            Some(path) => (
                EnvpackConfig::load(path).map_err(|e| describe(&e))?,
                Some(path.to_path_buf()),
            ),
            None => (
                EnvpackConfig::load_default().map_err(|e| describe(&e))?,
                envpack_core::default_config_path(),
            ),
        };
        config.apply_env_overrides();
        if let Some(url) = gateway {
            config.gateway.url = url.trim_end_matches('/').to_owned();
        }
        if let Some(name) = backend {
            name.clone_into(&mut config.backend);
        }
        Ok(Self {
            config,
            config_path: path,
            project: project.map(str::to_owned),
        })
    }

    pub fn session(&self) -> Result<SessionContext, String> {
        match self.project.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Ok(SessionContext::new(p)),
            _ => Err("validation error: no project given (use --project)".to_owned()),
        }
    }

    pub fn pipeline(&self) -> Result<Pipeline, String> {
        self.config
            .gateway
            .validate()
            .map_err(|e| describe(&e.into()))?;
        let backend = envpack_runtime::select_backend(&self.config.backend, &self.config.tools)
            .map_err(|e| describe(&e.into()))?;
        let gateway = HttpGateway::new(self.config.gateway.clone());
        Ok(Pipeline::new(
            Arc::new(gateway),
            Arc::from(backend),
            PipelineSettings::from(&self.config),
        ))
    }
}

/// Render a pipeline error with the prefix `main` maps to an exit code.
pub fn describe(err: &CoreError) -> String {
    match err.kind() {
        ErrorKind::Validation => format!("validation error: {err}"),
        ErrorKind::Transport | ErrorKind::RemoteLogic => format!("gateway error: {err}"),
        ErrorKind::Cancelled => format!("cancelled: {err}"),
        ErrorKind::Subprocess | ErrorKind::Timeout | ErrorKind::Io => err.to_string(),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Progress sink that shows the latest tool line on the spinner.
pub fn progress_to(pb: &ProgressBar) -> impl Fn(&str) + Send + Sync {
    let pb = pb.clone();
    move |line: &str| {
        tracing::debug!("{line}");
        pb.set_message(line.trim().to_owned());
    }
}

pub fn highlight(text: &str, ok: bool) -> String {
    use console::Style;
    if ok {
        Style::new().green().apply_to(text).to_string()
    } else {
        Style::new().yellow().bold().apply_to(text).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envpack_remote::RemoteError;
    use envpack_runtime::RuntimeError;

    fn context(backend: Option<&str>, gateway: Option<&str>) -> Context {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        EnvpackConfig::default().save(&path).unwrap();
        Context::load(Some(&path), gateway, backend, Some("42")).unwrap()
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_VALIDATION_ERROR);
        assert_ne!(EXIT_VALIDATION_ERROR, EXIT_REMOTE_ERROR);
        assert_ne!(EXIT_REMOTE_ERROR, EXIT_INTERRUPTED);
    }

    #[test]
    fn describe_prefixes_by_error_kind() {
        let validation = CoreError::Validation("bad name".to_owned());
        assert!(describe(&validation).starts_with("validation error:"));

        let remote: CoreError = RemoteError::Logic("duplicate name".to_owned()).into();
        assert!(describe(&remote).starts_with("gateway error:"));

        let tool: CoreError = RuntimeError::Subprocess {
            program: "conda-pack".to_owned(),
            code: Some(1),
            tail: Vec::new(),
        }
        .into();
        assert!(!describe(&tool).starts_with("gateway error:"));
        assert!(!describe(&tool).starts_with("validation error:"));
    }

    #[test]
    fn flags_override_config() {
        let ctx = context(Some("mock"), Some("http://gw.local:8080/"));
        assert_eq!(ctx.config.backend, "mock");
        assert_eq!(ctx.config.gateway.url, "http://gw.local:8080");
    }

    #[test]
    fn session_requires_project() {
        let mut ctx = context(None, None);
        assert_eq!(ctx.session().unwrap().project_id.as_str(), "42");
        ctx.project = Some("  ".to_owned());
        assert!(ctx.session().unwrap_err().starts_with("validation error:"));
    }

    #[test]
    fn pipeline_requires_gateway_url() {
        let mut ctx = context(Some("mock"), None);
        ctx.config.gateway.url.clear();
        let err = ctx.pipeline().err().unwrap();
        assert!(err.starts_with("validation error:"), "{err}");
    }

    #[test]
    fn pipeline_rejects_unknown_backend() {
        let ctx = context(Some("docker"), Some("http://gw.local"));
        let err = ctx.pipeline().err().unwrap();
        assert!(err.contains("docker"), "{err}");
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        progress_to(&pb)("Collecting packages...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
