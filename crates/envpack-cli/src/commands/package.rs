use super::{describe, json_pretty, progress_to, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use envpack_runtime::CancelToken;

pub async fn run(
    ctx: &super::Context,
    env_name: &str,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let session = ctx.session()?;
    let pipeline = ctx.pipeline()?;

    let pb = spinner(&format!("packaging {env_name}…"));
    let progress = progress_to(&pb);
    let outcome = pipeline
        .package(&session, env_name, &progress, cancel)
        .await
        .map_err(|e| {
            spin_fail(&pb, "packaging failed");
            describe(&e)
        })?;

    if outcome.reused {
        spin_ok(&pb, "identical package already published");
    } else {
        spin_ok(&pb, "package published");
    }

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        let verb = if outcome.reused { "reused" } else { "packaged" };
        println!(
            "{verb} {} (fingerprint {}, markers {})",
            outcome.env_name,
            outcome.fingerprint.short(),
            outcome.markers
        );
        println!("path: {}", outcome.artifact_path);
        if let Some(report) = outcome.cleanup.as_ref().filter(|r| !r.is_clean()) {
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
