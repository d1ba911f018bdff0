use super::{describe, json_pretty, progress_to, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use envpack_core::CoreError;
use envpack_runtime::CancelToken;
use envpack_schema::PythonVersion;

pub async fn run(
    ctx: &super::Context,
    env_name: &str,
    python: Option<&str>,
    level: Option<u32>,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let mut session = ctx.session()?;
    if let Some(level) = level {
        session = session.with_level(level);
    }
    let python = python
        .map(str::parse::<PythonVersion>)
        .transpose()
        .map_err(|e| describe(&CoreError::from(e)))?;
    let pipeline = ctx.pipeline()?;

    let pb = spinner(&format!("submitting {env_name}…"));
    let progress = progress_to(&pb);
    let outcome = pipeline
        .submit(&session, env_name, python, &progress, cancel)
        .await
        .map_err(|e| {
            spin_fail(&pb, "submit failed");
            describe(&e)
        })?;
    spin_ok(&pb, "environment registered");

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        println!(
            "submitted {} for project {} (python {}, level {}, by {})",
            outcome.package.env_name,
            session.project_id,
            outcome.python_version,
            outcome.level,
            outcome.created_by
        );
        if outcome.package.reused {
            println!("reused existing package {}", outcome.package.artifact_path);
        } else {
            println!("path: {}", outcome.package.artifact_path);
        }
    }
    Ok(EXIT_SUCCESS)
}
