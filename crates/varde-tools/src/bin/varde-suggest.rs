//! Print the advisory suggestions a configuration accumulates while
//! loading, without failing on them.

use std::path::PathBuf;

use clap::Parser;

use varde_config::Config;
use varde_tools::init_logging;

#[derive(Parser, Debug)]
#[command(name = "varde-suggest")]
#[command(about = "Show advisory warnings for a varde configuration file")]
struct Cli {
    /// Path to the configuration file
    config: PathBuf,
}

fn main() {
    init_logging("varde_suggest=warn");
    let cli = Cli::parse();

    let suggestions = Config::suggestions(&cli.config);
    if suggestions.is_empty() {
        println!("no suggestions");
        return;
    }
    for suggestion in suggestions {
        println!("{suggestion}");
    }
}
