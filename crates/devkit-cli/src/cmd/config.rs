use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use devkit_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (file values over defaults)
    Show,
    /// Check the configuration for invalid or surprising values
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    match subcmd {
        ConfigSubcommand::Show => {
            if json {
                return print_json(&config);
            }
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        ConfigSubcommand::Validate => {
            let warnings = config.validate();
            if json {
                print_json(&warnings)?;
            } else if warnings.is_empty() {
                println!("Config OK.");
            } else {
                for w in &warnings {
                    let level = match w.level {
                        WarnLevel::Warning => "warning",
                        WarnLevel::Error => "error",
                    };
                    println!("{level}: {}", w.message);
                }
            }
            if warnings.iter().any(|w| w.level == WarnLevel::Error) {
                anyhow::bail!("config has errors");
            }
            Ok(())
        }
    }
}
