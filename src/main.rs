//! alc - command-line client for the alchemy administration console.

use std::process;

use alchemy_console::api::ApiClient;
use alchemy_console::cli::{Cli, Commands, ConfigCommands, MissionCommands};
use alchemy_console::commands::{self, Output};
use alchemy_console::config::{ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use alchemy_console::logging;
use clap::Parser;

fn main() {
    let cli = Cli::parse();

    let log_guard = match logging::init(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    };

    let mut overrides = ConfigOverrides::new();
    if let Some(ref path) = cli.config_path {
        overrides = overrides.with_config_path(path);
    }
    if let Some(ref url) = cli.api_url {
        overrides = overrides.with_api_url(url);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let (result, human) = match resolve_config(&overrides) {
        Ok(config) => {
            let human = config.output_format() == OutputFormat::Human;
            (run_command(cli.command, config, human), human)
        }
        Err(e) => (Err(e), cli.human_readable),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        // process::exit skips destructors; flush the log file first
        drop(log_guard);
        process::exit(1);
    }
}

fn run_command(
    command: Commands,
    config: ResolvedConfig,
    human: bool,
) -> Result<(), alchemy_console::Error> {
    if let Commands::Config {
        command: ConfigCommands::Show,
    } = command
    {
        output(&commands::config_show(config), human);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| alchemy_console::Error::Other(format!("Failed to create runtime: {}", e)))?;

    runtime.block_on(async {
        let api = ApiClient::new(config.api_url(), config.request_timeout())?;
        match command {
            Commands::Login { email, password } => {
                let result = commands::login(&api, &email, &password).await?;
                output(&result, human);
            }
            Commands::Register {
                email,
                password,
                role,
                name,
                specialty,
            } => {
                let result =
                    commands::register(&api, &email, &password, &role, name, specialty).await?;
                output(&result, human);
            }
            Commands::List { resource, token } => {
                let result = commands::list(&api, &resource, &token).await?;
                output(&result, human);
            }
            Commands::Mission {
                command: MissionCommands::Status { id, status, token },
            } => {
                let result = commands::mission_status(&api, id, &status, &token).await?;
                output(&result, human);
            }
            Commands::Watch { token } => {
                commands::watch(&config, &token, |summary| output(summary, human)).await?;
            }
            Commands::Config { .. } => {}
        }
        Ok::<(), alchemy_console::Error>(())
    })
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
