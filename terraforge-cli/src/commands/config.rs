//! Config command - inspect and edit `config.ini`.
//!
//! Keys are addressed as `section.key` (see `terraforge config list`).
//! `set` validates the value with the same rules used when the file is
//! loaded, so a saved file always loads again.

use clap::Subcommand;
use console::style;
use terraforge::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value
    Get {
        /// Key as section.key, e.g. fetch.workers
        key: String,
    },

    /// Change one value and save the file
    Set {
        /// Key as section.key, e.g. fetch.workers
        key: String,

        /// New value; an empty string clears optional settings
        value: String,
    },

    /// Print every setting, marking those changed from the default
    List,

    /// Print the config file location
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            println!("{}", display_value(&key.get(&load())));
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = load();
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key.name(), display_value(&key.get(&config)));
        }
        ConfigCommands::List => print_all(&load()),
        ConfigCommands::Path => println!("{}", config_file_path().display()),
    }
    Ok(())
}

/// Loads the config file, falling back to defaults if it is unreadable.
fn load() -> ConfigFile {
    ConfigFile::load().unwrap_or_else(|e| {
        eprintln!("{} {}; using defaults", style("warning:").yellow(), e);
        ConfigFile::default()
    })
}

fn parse_key(name: &str) -> Result<ConfigKey, CliError> {
    name.parse().map_err(|_| {
        CliError::Config(format!(
            "No setting named '{}'. Run 'terraforge config list' for the full list.",
            name
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

fn print_all(config: &ConfigFile) {
    let defaults = ConfigFile::default();
    let width = ConfigKey::all()
        .iter()
        .map(|key| key.key_name().len())
        .max()
        .unwrap_or(0);

    println!("# {}", config_file_path().display());
    let mut section = None;
    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            println!();
            println!("[{}]", style(key.section()).bold());
            section = Some(key.section());
        }

        let value = key.get(config);
        let changed = value != key.get(&defaults);
        let marker = if changed { "*" } else { " " };
        println!(
            "{} {:<width$} = {}",
            marker,
            key.key_name(),
            display_value(&value),
            width = width
        );
    }
    println!();
    println!("* changed from default");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("fetch.workers").unwrap(), ConfigKey::FetchWorkers);
        assert!(matches!(parse_key("fetch.nope"), Err(CliError::Config(_))));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(""), "(unset)");
        assert_eq!(display_value("25"), "25");
    }
}
