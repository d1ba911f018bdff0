use super::{describe, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use envpack_runtime::CancelToken;

pub async fn run(
    ctx: &super::Context,
    env_name: &str,
    level: Option<u32>,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let session = ctx.session()?;
    let pipeline = ctx.pipeline()?;

    let pb = spinner(&format!("downloading {env_name}…"));
    let outcome = pipeline
        .download(&session, env_name, level, cancel)
        .await
        .map_err(|e| {
            spin_fail(&pb, "download failed");
            describe(&e)
        })?;
    spin_ok(&pb, "download complete");

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        println!(
            "installed {} from {} into {}",
            outcome.env_name,
            outcome.remote_path,
            outcome.install_dir.display()
        );
        println!("activate with: conda activate {}", outcome.env_name);
    }
    Ok(EXIT_SUCCESS)
}
