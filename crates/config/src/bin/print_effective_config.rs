//! Print the effective stats config (defaults + file + env overrides) as JSON.
//!
//! Usage: `print_effective_config [CONFIG_PATH]`, or `print_effective_config --schema`
//! to print the config JSON Schema instead.

use entity_stats_config::{load_stats_config_std_env, stats_config_schema, to_pretty_json};
use std::io;
use std::io::Write;
use std::path::PathBuf;

fn main() -> std::process::ExitCode {
    match run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::ExitCode::from(1)
        },
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argument = std::env::args().nth(1);

    let output = if argument.as_deref() == Some("--schema") {
        let mut output = serde_json::to_string_pretty(&stats_config_schema())?;
        output.push('\n');
        output
    } else {
        let path = argument.map(PathBuf::from);
        let config = load_stats_config_std_env(path.as_deref())?;
        to_pretty_json(config.as_ref())?
    };

    let mut stdout = io::stdout();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;

    Ok(())
}
