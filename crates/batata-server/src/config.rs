//! Command line handling for the Batata server
//!
//! Command line flags are applied as overrides on top of the configuration file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use batata_common::BatataError;
use batata_core::Configuration;

/// Startup mode of the node
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Standalone,
    Cluster,
}

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "batata-server", version, about)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config", env = "BATATA_CONFIG")]
    pub config: Option<PathBuf>,
    /// Startup mode
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<Mode>,
    /// Main server port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

impl Cli {
    /// Configuration keys overridden by command line flags
    pub fn overrides(&self) -> Vec<(String, config::Value)> {
        let mut overrides = Vec::new();
        if let Some(mode) = self.mode {
            overrides.push((
                "batata.standalone".to_string(),
                config::Value::from(mode == Mode::Standalone),
            ));
        }
        if let Some(port) = self.port {
            overrides.push((
                "batata.server.main.port".to_string(),
                config::Value::from(port as i64),
            ));
        }
        overrides
    }

    /// Load the configuration file, if any, with command line overrides applied
    pub fn load_configuration(&self) -> Result<Configuration, BatataError> {
        Configuration::load(self.config.as_deref(), self.overrides())
    }
}
