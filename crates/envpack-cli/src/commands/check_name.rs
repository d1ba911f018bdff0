use super::{describe, highlight, json_pretty, EXIT_SUCCESS, EXIT_VALIDATION_ERROR};
use envpack_remote::NameCheck;
use envpack_runtime::CancelToken;

pub async fn run(
    ctx: &super::Context,
    env_name: &str,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, String> {
    let session = ctx.session()?;
    let pipeline = ctx.pipeline()?;

    let manifest = pipeline
        .export_manifest(env_name, cancel)
        .await
        .map_err(|e| describe(&e))?;
    let answer = pipeline
        .check_name(&session, env_name, &manifest)
        .await
        .map_err(|e| describe(&e))?;

    let (status, conflict) = match &answer {
        NameCheck::Available => ("available", None),
        NameCheck::NameTaken => ("taken", Some(env_name.to_owned())),
        NameCheck::DuplicateOf(existing) => ("duplicate", Some(existing.clone())),
    };

    if json {
        let payload = serde_json::json!({
            "env_name": env_name,
            "project_id": session.project_id,
            "status": status,
            "conflict": conflict,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        match &answer {
            NameCheck::Available => {
                println!("{} is {}", env_name, highlight("available", true));
            }
            NameCheck::NameTaken => {
                println!(
                    "{} is {} in project {}",
                    env_name,
                    highlight("already taken", false),
                    session.project_id
                );
            }
            NameCheck::DuplicateOf(existing) => {
                println!(
                    "{} is {} as '{existing}'",
                    env_name,
                    highlight("already registered", false)
                );
            }
        }
    }

    Ok(if answer == NameCheck::Available {
        EXIT_SUCCESS
    } else {
        EXIT_VALIDATION_ERROR
    })
}
