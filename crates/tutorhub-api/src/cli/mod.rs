//! CLI command definitions for the `tutorhub` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod drafts;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Institution signup wizard service.
#[derive(Parser)]
#[command(name = "tutorhub", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "TUTORHUB_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (default from config, 8470).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config, 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },

    /// Inspect and clean up stored drafts.
    Drafts {
        #[command(subcommand)]
        action: drafts::DraftsCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_drafts_clear() {
        let cli = Cli::try_parse_from(["tutorhub", "-vv", "drafts", "clear", "institution-signup/abc"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Drafts {
                action: drafts::DraftsCommand::Clear { ref form, .. }
            } if form == "institution-signup/abc"
        ));
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["tutorhub", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { port: Some(9000), host: None }
        ));
    }
}
