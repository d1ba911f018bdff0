mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    Context, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_REMOTE_ERROR, EXIT_VALIDATION_ERROR,
};
use envpack_core::{install_signal_handler, shutdown_requested};
use envpack_runtime::CancelToken;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "envpack",
    version,
    about = "Package, share and fetch conda environments through the environment gateway"
)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/envpack/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL (overrides config and ENVPACK_GATEWAY).
    #[arg(long, global = true)]
    gateway: Option<String>,

    /// Packaging backend: conda or mock.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Project the environment belongs to.
    #[arg(long, global = true)]
    project: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the canonical dependency list and fingerprint of an export.
    Fingerprint {
        /// Export file to read; reads stdin when omitted or "-".
        manifest: Option<PathBuf>,
    },
    /// Ask the gateway whether a name can be used for an environment.
    CheckName {
        /// Local environment name.
        env_name: String,
    },
    /// Package a local environment, reusing an identical published archive.
    Package {
        /// Local environment name.
        env_name: String,
    },
    /// Package a local environment and register it by name.
    Submit {
        /// Local environment name.
        env_name: String,
        /// Python version to record (e.g. 3.8.19); read from the export when omitted.
        #[arg(long)]
        python: Option<String>,
        /// Visibility level recorded with the environment.
        #[arg(long)]
        level: Option<u32>,
    },
    /// Fetch a registered environment into the local envs directory.
    Download {
        /// Registered environment name.
        env_name: String,
        /// Visibility level to resolve (defaults to 1).
        #[arg(long)]
        level: Option<u32>,
    },
    /// Run diagnostic checks on tools and configuration.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ENVPACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = run(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if shutdown_requested() {
                EXIT_INTERRUPTED
            } else if msg.starts_with("validation error:") || msg.starts_with("config error:")
            {
                EXIT_VALIDATION_ERROR
            } else if msg.starts_with("gateway error:") {
                EXIT_REMOTE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    match &cli.command {
        Commands::Fingerprint { manifest } => {
            return commands::fingerprint::run(manifest.as_deref(), json);
        }
        Commands::Completions { shell } => return commands::completions::run::<Cli>(*shell),
        _ => {}
    }

    let ctx = Context::load(
        cli.config.as_deref(),
        cli.gateway.as_deref(),
        cli.backend.as_deref(),
        cli.project.as_deref(),
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;

    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone());

    match cli.command {
        Commands::CheckName { env_name } => {
            runtime.block_on(commands::check_name::run(&ctx, &env_name, &cancel, json))
        }
        Commands::Package { env_name } => {
            runtime.block_on(commands::package::run(&ctx, &env_name, &cancel, json))
        }
        Commands::Submit {
            env_name,
            python,
            level,
        } => runtime.block_on(commands::submit::run(
            &ctx,
            &env_name,
            python.as_deref(),
            level,
            &cancel,
            json,
        )),
        Commands::Download { env_name, level } => runtime.block_on(commands::download::run(
            &ctx, &env_name, level, &cancel, json,
        )),
        Commands::Doctor => commands::doctor::run(&ctx, json),
        Commands::Fingerprint { .. } | Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "envpack", "submit", "analytics", "--project", "42", "--python", "3.8.19", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.project.as_deref(), Some("42"));
        assert!(matches!(
            cli.command,
            Commands::Submit { ref env_name, ref python, level: None }
                if env_name == "analytics" && python.as_deref() == Some("3.8.19")
        ));
    }
}
