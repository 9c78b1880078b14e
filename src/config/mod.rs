pub mod toml_config;

pub use toml_config::SimConfig;

#[cfg(feature = "cli")]
pub use cli_config::{CliConfig, Command};

#[cfg(feature = "cli")]
mod cli_config {
    use super::SimConfig;
    use crate::domain::model::SimultonKind;
    use crate::utils::error::Result;
    use crate::utils::validation::{validate_port, Validate};
    use clap::{Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "simultons")]
    #[command(about = "A simulation made of independent HTTP services")]
    pub struct CliConfig {
        /// TOML configuration file
        #[arg(long, global = true)]
        pub config: Option<PathBuf>,

        #[arg(short, long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, help = "Log as JSON lines")]
        pub json: bool,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Run the simulation service
        Simulation {
            #[arg(long)]
            host: Option<String>,
            #[arg(long)]
            port: Option<u16>,
            #[arg(long)]
            base_port: Option<u16>,
            #[arg(long)]
            socket: Option<PathBuf>,
        },
        /// Run one simulton service (started by the simulation)
        Simulton {
            #[arg(value_enum)]
            kind: SimultonKind,
            #[arg(long, default_value = "127.0.0.1")]
            host: String,
            #[arg(long)]
            port: u16,
        },
        /// Start a simulation process, wait for it, then shut it down
        Launch {
            #[arg(long)]
            host: Option<String>,
            #[arg(long)]
            port: Option<u16>,
            #[arg(long)]
            socket: Option<PathBuf>,
        },
        /// Print simulation state broadcasts
        Subscribe {
            #[arg(long)]
            socket: Option<PathBuf>,
        },
    }

    impl CliConfig {
        /// File config (or defaults) with this command's flags on top.
        pub fn resolve(&self) -> Result<SimConfig> {
            let mut config = match &self.config {
                Some(path) => SimConfig::from_file(path)?,
                None => SimConfig::default(),
            };
            match &self.command {
                Command::Simulation {
                    host,
                    port,
                    base_port,
                    socket,
                } => config.apply_overrides(host.as_deref(), *port, *base_port, socket.as_deref()),
                Command::Launch { host, port, socket } => {
                    config.apply_overrides(host.as_deref(), *port, None, socket.as_deref())
                }
                Command::Subscribe { socket } => {
                    config.apply_overrides(None, None, None, socket.as_deref())
                }
                // simulton 只用自己的 --port, 不動 simulation 的埠
                Command::Simulton { host, port, .. } => {
                    config.apply_overrides(Some(host), None, None, None);
                    validate_port("port", *port)?;
                }
            }
            config.logging.verbose |= self.verbose;
            config.logging.json |= self.json;
            config.validate()?;
            Ok(config)
        }
    }

}
