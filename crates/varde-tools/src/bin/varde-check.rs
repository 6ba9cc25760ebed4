//! Validate a configuration file and report every problem found.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use varde_config::Config;
use varde_tools::{init_logging, site_config_source};

#[derive(Parser, Debug)]
#[command(name = "varde-check")]
#[command(about = "Validate a varde configuration file")]
struct Cli {
    /// Path to the configuration file
    config: PathBuf,
}

fn main() {
    init_logging("varde_check=info");
    let cli = Cli::parse();

    let site = match site_config_source() {
        Ok(site) => site,
        Err(err) => {
            eprintln!("could not read site configuration: {err}");
            std::process::exit(1);
        }
    };

    match Config::from_file_with_site(&cli.config, &site) {
        Ok(config) => {
            info!(
                realizations = config.ensemble.num_realizations,
                jobs = config.jobs.len(),
                forward_model_steps = config.forward_model.len(),
                workflows = config.workflows.len(),
                "configuration is valid"
            );
            for warning in &config.warnings {
                println!("warning: {warning}");
            }
        }
        Err(err) => {
            eprintln!("{}", err.cli_message());
            std::process::exit(1);
        }
    }
}
