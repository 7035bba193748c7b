/// Configuration management
use crate::error::{AskError, Result};
use crate::utils::event_emitter::DEFAULT_EVENT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 8790;
const DEFAULT_OBSERVER_PORT: u16 = 8791;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the sled state DB
    pub data_dir: PathBuf,

    /// Base URL of the answering proxy
    pub backend_url: String,

    /// Upper bound on a single backend call
    pub backend_timeout: Duration,

    /// Line-JSON command API (capture surface, CLI)
    pub api_addr: SocketAddr,

    /// HTTP + SSE API for observer views
    pub observer_addr: SocketAddr,

    /// Events buffered per observer before it is considered lagging
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".askpanel"),
            backend_url: "http://localhost:8787".to_string(),
            backend_timeout: Duration::from_secs(30),
            api_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            observer_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_OBSERVER_PORT)),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Create config from command line arguments, then apply env overrides
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--data-dir" => {
                    config.data_dir = PathBuf::from(flag_value(args, i)?);
                }
                "--backend-url" => {
                    config.backend_url = flag_value(args, i)?.to_string();
                }
                "--timeout-secs" => {
                    config.backend_timeout = parse_timeout(flag_value(args, i)?)?;
                }
                "--api-port" => {
                    config.api_addr = local_addr(parse_port(flag, flag_value(args, i)?)?);
                }
                "--observer-port" => {
                    config.observer_addr = local_addr(parse_port(flag, flag_value(args, i)?)?);
                }
                "--event-capacity" => {
                    config.event_capacity = flag_value(args, i)?
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| {
                            AskError::Config(
                                "--event-capacity must be a positive number".to_string(),
                            )
                        })?;
                }
                other => {
                    return Err(AskError::Config(format!(
                        "Unknown argument: {}\nUsage: {} [--data-dir <path>] [--backend-url <url>] [--timeout-secs <n>] [--api-port <port>] [--observer-port <port>] [--event-capacity <n>]",
                        other,
                        args.first().map(String::as_str).unwrap_or("askpanel")
                    )));
                }
            }
            i += 2;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Env overrides (nice for scripts)
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("ASKPANEL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("ASKPANEL_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(secs) = std::env::var("ASKPANEL_TIMEOUT_SECS") {
            self.backend_timeout = parse_timeout(&secs)?;
        }
        if let Ok(p) = std::env::var("ASKPANEL_API_PORT") {
            self.api_addr = local_addr(parse_port("ASKPANEL_API_PORT", &p)?);
        }
        if let Ok(p) = std::env::var("ASKPANEL_OBSERVER_PORT") {
            self.observer_addr = local_addr(parse_port("ASKPANEL_OBSERVER_PORT", &p)?);
        }
        Ok(())
    }
}

fn flag_value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| AskError::Config(format!("{} requires a value", args[i])))
}

fn parse_port(name: &str, s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| AskError::Config(format!("{} must be a valid port (0-65535)", name)))
}

fn parse_timeout(s: &str) -> Result<Duration> {
    match s.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(AskError::Config(
            "timeout must be a positive number of seconds".to_string(),
        )),
    }
}

fn local_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
