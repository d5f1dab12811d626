//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback, and `main` loads a `.env` file
//! before parsing.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use renderer::RenderSettings;
use tile_common::is_power_of_two;

#[derive(Parser, Debug, Clone)]
#[command(name = "tile-server")]
#[command(about = "Mandelbrot tile server with distributed sub-tile compositing")]
pub struct Args {
    /// First port to listen on
    #[arg(long, env = "PORT_BASE", default_value = "8900")]
    pub port_base: u16,

    /// Number of consecutive ports to listen on, all serving the same tiles
    #[arg(long, env = "NUM_PORTS", default_value = "10")]
    pub num_ports: u32,

    /// Comma-separated downstream tile servers (host:port)
    #[arg(long, env = "TILE_SERVERS", default_value = "")]
    pub tile_servers: String,

    /// Bind address
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long, env = "TOKIO_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// Escape-time iteration budget
    #[arg(long, env = "MAX_ITERATIONS", default_value = "1000")]
    pub max_iterations: u32,

    /// Samples per axis per output pixel
    #[arg(long, env = "PIXEL_OVERSAMPLE", default_value = "3")]
    pub oversample: u32,

    /// Smallest tile size rendered directly when downstream servers exist
    #[arg(long, env = "LEAF_TILE_SIZE", default_value = "32")]
    pub leaf_tile_size: u32,

    /// Tile size used when a request omits `tile-size`
    #[arg(long, env = "DEFAULT_TILE_SIZE", default_value = "256")]
    pub default_tile_size: u32,

    /// Largest accepted `tile-size`
    #[arg(long, env = "MAX_TILE_SIZE", default_value = "1024")]
    pub max_tile_size: u32,

    /// Per sub-tile fetch timeout in milliseconds
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value = "10000")]
    pub fetch_timeout_ms: u64,

    /// Upper bound on in-flight sub-tile fetches per composite
    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value = "64")]
    pub max_concurrent_fetches: usize,
}

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TileServerConfig {
    pub listen_host: String,
    pub port_base: u16,
    pub num_ports: u32,
    pub tile_servers: Vec<String>,
    pub max_iterations: u32,
    pub oversample: u32,
    pub leaf_tile_size: u32,
    pub default_tile_size: u32,
    pub max_tile_size: u32,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for TileServerConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            port_base: 8900,
            num_ports: 10,
            tile_servers: Vec::new(),
            max_iterations: 1000,
            oversample: 3,
            leaf_tile_size: 32,
            default_tile_size: 256,
            max_tile_size: 1024,
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 64,
        }
    }
}

impl TileServerConfig {
    /// Build from parsed arguments and validate.
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            listen_host: args.listen_host.clone(),
            port_base: args.port_base,
            num_ports: args.num_ports,
            tile_servers: parse_tile_servers(&args.tile_servers),
            max_iterations: args.max_iterations,
            oversample: args.oversample,
            leaf_tile_size: args.leaf_tile_size,
            default_tile_size: args.default_tile_size,
            max_tile_size: args.max_tile_size,
            fetch_timeout: Duration::from_millis(args.fetch_timeout_ms),
            max_concurrent_fetches: args.max_concurrent_fetches,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_ports == 0 {
            bail!("num-ports must be at least 1");
        }
        let last_port = self.port_base as u64 + self.num_ports as u64 - 1;
        if last_port > u16::MAX as u64 {
            bail!(
                "port range {}..={} exceeds {}",
                self.port_base,
                last_port,
                u16::MAX
            );
        }
        if self.oversample == 0 {
            bail!("oversample must be at least 1");
        }
        if self.max_iterations == 0 {
            bail!("max-iterations must be at least 1");
        }
        for (name, size) in [
            ("leaf-tile-size", self.leaf_tile_size),
            ("default-tile-size", self.default_tile_size),
            ("max-tile-size", self.max_tile_size),
        ] {
            if !is_power_of_two(size as i64) {
                bail!("{} must be a power of two, got {}", name, size);
            }
        }
        if self.leaf_tile_size > self.max_tile_size {
            bail!(
                "leaf-tile-size {} exceeds max-tile-size {}",
                self.leaf_tile_size,
                self.max_tile_size
            );
        }
        if self.default_tile_size > self.max_tile_size {
            bail!(
                "default-tile-size {} exceeds max-tile-size {}",
                self.default_tile_size,
                self.max_tile_size
            );
        }
        if self.max_concurrent_fetches == 0 {
            bail!("max-concurrent-fetches must be at least 1");
        }
        Ok(())
    }

    /// Ports to bind, in order.
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        let base = self.port_base as u32;
        (base..base + self.num_ports).filter_map(|p| u16::try_from(p).ok())
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            max_iterations: self.max_iterations,
            oversample: self.oversample,
            ..RenderSettings::default()
        }
    }
}

/// Split a comma-separated host list, trimming whitespace and dropping
/// empty entries.
pub fn parse_tile_servers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
