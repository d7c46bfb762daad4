//! Shared argument types for CLI commands.

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::error::Result;

/// Arguments common to every command.
#[derive(Args, Clone)]
pub struct CommonArgs {
    /// Directory tree to browse
    pub root: PathBuf,

    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CommonArgs {
    /// Resolves the effective configuration: file values (if any) overlaid
    /// with the command-line root.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        config.root_path = self.root.clone();
        Ok(config)
    }
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Port to serve on (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Watch the root for changes and invalidate caches on the fly
    #[arg(short, long)]
    pub watch: bool,
}
