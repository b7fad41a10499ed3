//! Command-line flags, the last configuration layer

use crate::config::{ConfigError, LogFormat, ServerConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gazette")]
#[command(about = "GraphQL content API server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "GAZETTE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Log filter directives, e.g. `gazette=debug,info`
    #[arg(long)]
    pub log: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Maximum estimated cost of one operation
    #[arg(long)]
    pub max_cost: Option<u64>,

    /// Maximum selection depth of one operation
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Disable the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Rate limit on the first X-Forwarded-For address
    #[arg(long)]
    pub trust_forwarded_for: bool,
}

impl Cli {
    /// Load every configuration layer and validate the result
    pub fn load_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(filter) = &self.log {
            config.logging.filter = filter.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(max_cost) = self.max_cost {
            config.cost.max_cost = max_cost;
        }
        if let Some(max_depth) = self.max_depth {
            config.cost.max_depth = max_depth;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.trust_forwarded_for {
            config.server.trust_forwarded_for = true;
        }
    }
}
