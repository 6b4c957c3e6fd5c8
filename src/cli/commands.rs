use anyhow::Result;
use tracing::info;

use crate::console;
use crate::runner::RelayRunner;

use super::config::{check_config, expand_path, load_config};
use super::template;

/// Execute CLI commands
pub fn execute_command(cli: &super::Cli) -> Result<()> {
    use super::Commands;

    match &cli.command {
        Commands::Check { config, format } => {
            let config_path = expand_path(config)?;
            check_config(&config_path, format)?;
        }
        Commands::Template { output } => {
            template::generate_config_template(output.as_deref())?;
        }
        Commands::Run {
            config,
            next_port,
            default_relays,
            exec,
        } => {
            run_relays(config.as_deref(), *next_port, *default_relays, exec)?;
        }
    }

    Ok(())
}

fn run_relays(
    config: Option<&str>,
    next_port: Option<u16>,
    default_relays: bool,
    exec: &[String],
) -> Result<()> {
    if let Some(path) = config {
        info!("Loading relay configuration from: {}", path);
    }
    let mut app_config = load_config(config)?;
    if let Some(port) = next_port {
        app_config.relay.first_port = port;
    }

    let mut runner = RelayRunner::start(app_config)?;

    let mut startup: Vec<&str> = Vec::new();
    if default_relays {
        startup.push("adddefaultrelays");
    }
    startup.extend(exec.iter().map(String::as_str));
    for line in startup {
        let output = runner.execute_line(line);
        if !output.is_empty() {
            println!("{}", output);
        }
    }

    if !runner.registry().exit_requested() {
        console::run_stdio(&runner)?;
    }

    runner.shutdown();
    Ok(())
}
