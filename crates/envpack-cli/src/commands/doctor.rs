use super::{Context, EXIT_FAILURE, EXIT_SUCCESS};

pub fn run(ctx: &Context, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_config_file(ctx, &mut checks);
    check_backend(ctx, &mut checks, &mut all_pass);
    check_gateway(ctx, &mut checks, &mut all_pass);
    check_storage(ctx, &mut checks);
    check_tmp_dir(ctx, &mut checks, &mut all_pass);

    if ctx.project.is_none() {
        checks.push(Check::info(
            "project",
            "No project given; package, submit and download need --project",
        ));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_config_file(ctx: &Context, checks: &mut Vec<Check>) {
    match &ctx.config_path {
        Some(path) if path.exists() => checks.push(Check::pass(
            "config_file",
            &format!("Config loaded from {}", path.display()),
        )),
        Some(path) => checks.push(Check::info(
            "config_file",
            &format!("No config at {} (using defaults)", path.display()),
        )),
        None => checks.push(Check::info(
            "config_file",
            "No config location (HOME unset); using defaults",
        )),
    }
}

fn check_backend(ctx: &Context, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match ctx.config.backend.as_str() {
        "conda" => {
            let missing = envpack_runtime::check_packaging_prereqs(&ctx.config.tools);
            if missing.is_empty() {
                checks.push(Check::pass(
                    "tool_prereqs",
                    "conda, conda-pack, hdfs and tar found",
                ));
            } else {
                *all_pass = false;
                checks.push(Check::fail(
                    "tool_prereqs",
                    &envpack_runtime::format_missing(&missing),
                ));
            }
        }
        "mock" => checks.push(Check::warn(
            "tool_prereqs",
            "Mock backend selected; no real environments will be packaged",
        )),
        other => {
            *all_pass = false;
            checks.push(Check::fail(
                "tool_prereqs",
                &format!("Unknown backend '{other}' (expected conda or mock)"),
            ));
        }
    }
}

fn check_gateway(ctx: &Context, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let gateway = &ctx.config.gateway;
    match gateway.validate() {
        Ok(()) => checks.push(Check::pass(
            "gateway",
            &format!("Gateway configured at {}", gateway.url),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("gateway", &format!("Gateway not usable: {e}")));
        }
    }
    if gateway.auth_token.is_none() {
        checks.push(Check::info(
            "gateway_auth",
            "No auth token configured (set ENVPACK_TOKEN if the gateway requires one)",
        ));
    }
}

fn check_storage(ctx: &Context, checks: &mut Vec<Check>) {
    let storage = &ctx.config.storage;
    checks.push(Check::info(
        "storage",
        &format!(
            "Staging in {}{}, packages in {}{}",
            storage.namenode(),
            storage.staging_dir,
            storage.namenode(),
            storage.final_dir
        ),
    ));
}

fn check_tmp_dir(ctx: &Context, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let dir = &ctx.config.local_tmp_dir;
    match tempfile::tempfile_in(dir) {
        Ok(_) => checks.push(Check::pass(
            "local_tmp_dir",
            &format!("Scratch directory {} is writable", dir.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "local_tmp_dir",
                &format!("Scratch directory {} is not writable: {e}", dir.display()),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("envpack doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
