//! Configuration command.

use scanlayer::config::config_search_paths;
use scanlayer::Settings;

use crate::cli::icons::dim_arrow;

/// Print the effective settings as TOML.
pub fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    match &settings.source_path {
        Some(path) => eprintln!("# Loaded from {}", path.display()),
        None => {
            eprintln!("# No config file found, showing defaults. Searched:");
            for path in config_search_paths() {
                eprintln!("#  {} {}", dim_arrow(), path.display());
            }
        }
    }
    print!("{}", settings.to_toml()?);
    Ok(())
}
