use clap::{Parser, Subcommand};
use kart_status::commands::*;
use kart_status::core::print_error;
use std::env;

#[derive(Parser)]
#[command(name = "kart-status")]
#[command(about = "Show the status of a kart repository")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the working copy status
    Status {
        /// Output format
        #[arg(short = 'o', long = "output-format", value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();

    // Configure logging based on --debug flag
    if cli.debug {
        env::set_var("RUST_LOG", "debug");
    } else {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match cli.command {
        Commands::Status { output_format } => {
            if let Err(e) = execute_status(output_format) {
                print_error(&e.to_string());
                std::process::exit(1);
            }
        }
    }
}
