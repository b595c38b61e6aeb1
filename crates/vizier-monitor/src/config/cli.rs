use clap::{Parser, Subcommand};
use utils::version;

use crate::config::monitor::MonitorArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch the Vizier pods and keep the Vizier status up to date
    Run(Box<MonitorArgs>),
    /// Print the Vizier CustomResourceDefinition as YAML
    Crd,
}
