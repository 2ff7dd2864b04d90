use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use switchyard_core::{ComponentType, Environment};

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — zero-downtime blue/green releases with automatic rollback",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter switchyard.toml
    Init {
        #[arg(short, long, default_value = "switchyard.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run one health check against an environment.
    ///
    /// Exits with status 1 when the environment is unhealthy.
    Check {
        #[arg(short, long, default_value = "switchyard.toml")]
        config: PathBuf,
        /// Environment to probe (blue or green)
        #[arg(short, long)]
        environment: Environment,
        /// Only probe the API, primary store and cache
        #[arg(long)]
        critical_only: bool,
        /// Restrict to these components (repeatable)
        #[arg(long = "component")]
        components: Vec<ComponentType>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deploy to the inactive environment.
    ///
    /// Exits with status 1 when the deployment failed and was rolled back,
    /// and 2 when an operator has to intervene.
    Deploy {
        #[arg(short, long, default_value = "switchyard.toml")]
        config: PathBuf,
        /// Target environment (default: the inactive one)
        #[arg(short, long)]
        target: Option<Environment>,
        /// Environment currently serving traffic (overrides the config)
        #[arg(long)]
        active: Option<Environment>,
        #[arg(long)]
        skip_migration: bool,
        #[arg(long)]
        skip_smoke_tests: bool,
        /// Print the status report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,switchyard=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Init { path, force } => commands::init::init(&path, force),
        Commands::Check {
            config,
            environment,
            critical_only,
            components,
            json,
        } => commands::check::check(&config, environment, critical_only, &components, json).await,
        Commands::Deploy {
            config,
            target,
            active,
            skip_migration,
            skip_smoke_tests,
            json,
        } => {
            let options = switchyard_rollout::DeployOptions {
                skip_migration,
                skip_smoke_tests,
            };
            commands::deploy::deploy(&config, target, active, options, json).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_arguments() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "check",
            "--environment",
            "GREEN",
            "--component",
            "api",
            "--component",
            "cache",
            "--critical-only",
        ])
        .unwrap();
        match cli.command {
            Commands::Check {
                environment,
                components,
                critical_only,
                ..
            } => {
                assert_eq!(environment, Environment::Green);
                assert_eq!(components, vec![ComponentType::Api, ComponentType::Cache]);
                assert!(critical_only);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn parses_deploy_with_global_flag() {
        let cli = Cli::try_parse_from(["switchyard", "deploy", "--target", "blue", "--log-json"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                target: Some(Environment::Blue),
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(Cli::try_parse_from(["switchyard", "check", "--environment", "red"]).is_err());
    }
}
