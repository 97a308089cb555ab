use app::{commands, context::ClientContext, notifier::ConsoleNotifier};
use clap::{Parser, Subcommand};
use config::{AppConfig, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "restate", about = "Sign in to the Restate account service")]
struct Cli {
    /// Where the session cookies are kept between invocations
    #[arg(long, env = "RESTATE_SESSION_FILE", default_value = ".restate_session")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in through the OAuth provider in the system browser
    Login,
    /// Delete the current session
    Logout,
    /// Show the signed-in user
    Whoami {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let context = ClientContext::build(&config, cli.session_file)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to initialize client");
            std::process::exit(1);
        });

    if let Err(e) = run(&context, cli.command).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}

async fn run(context: &ClientContext, command: Command) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    match command {
        Command::Login => {
            commands::login(&context.auth, &mut out).await?;
            context.persist_session().await
        }
        Command::Logout => {
            commands::logout(&context.auth, &mut out).await?;
            context.forget_session()
        }
        Command::Whoami { json } => {
            commands::whoami(&context.auth, Arc::new(ConsoleNotifier), json, &mut out).await
        }
    }
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_whoami_json() {
        let cli = Cli::try_parse_from(["restate", "whoami", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Whoami { json: true }));
    }

    #[test]
    fn test_cli_session_file_flag() {
        let cli = Cli::try_parse_from(["restate", "--session-file", "/tmp/s", "logout"]).unwrap();
        assert_eq!(cli.session_file, PathBuf::from("/tmp/s"));
        assert!(matches!(cli.command, Command::Logout));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["restate"]).is_err());
    }
}
