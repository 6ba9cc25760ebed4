//! Emit the execution descriptor for one realization as JSON.

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use varde_config::Config;
use varde_tools::{init_logging, site_config_source};

#[derive(Parser, Debug)]
#[command(name = "varde-emit")]
#[command(about = "Emit the forward model execution descriptor as JSON")]
struct Cli {
    /// Path to the configuration file
    config: PathBuf,

    /// Run identifier stamped into the descriptor
    #[arg(long, default_value = "manual-run")]
    run_id: String,

    /// Realization index
    #[arg(long, default_value = "0")]
    realization: usize,

    /// Iteration index
    #[arg(long, default_value = "0")]
    iteration: usize,

    /// Write to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    init_logging("varde_emit=warn");
    let cli = Cli::parse();

    let site = match site_config_source() {
        Ok(site) => site,
        Err(err) => {
            eprintln!("could not read site configuration: {err}");
            std::process::exit(1);
        }
    };

    let config = match Config::from_file_with_site(&cli.config, &site) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.cli_message());
            std::process::exit(1);
        }
    };

    let descriptor =
        match config.forward_model_data(&cli.run_id, cli.realization, cli.iteration) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                eprintln!("{}", err.cli_message());
                std::process::exit(1);
            }
        };

    let json = match serde_json::to_string_pretty(&descriptor) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("could not serialize descriptor: {err}");
            std::process::exit(1);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(err) = fs::write(path, json) {
                eprintln!("could not write {}: {err}", path.display());
                std::process::exit(1);
            }
        }
        None => println!("{json}"),
    }
}
