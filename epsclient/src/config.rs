//! TOML configuration for feed subscribers, consumed by the demo binary.

use crate::spi::{ConnMode, MktType};
use crate::support::{EpsError, EpsResult};
use serde_derive::Deserialize;
use sloggers::LoggerConfig;
use std::path::Path;

#[derive(Deserialize)]
pub struct ClientConfig {
    /// "tcp" or "udp".
    pub mode: String,
    /// TCP: `host:port`; UDP: `mcAddr:mcPort;localAddr`.
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_heartbeat_intl")]
    pub heartbeat_intl: u16,
    /// "all", "stk" or "dev".
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default)]
    pub logger: Option<LoggerConfig>,
}

fn default_heartbeat_intl() -> u16 {
    30
}

fn default_market() -> String {
    "all".to_string()
}

impl ClientConfig {
    pub fn from_toml_str(toml: &str) -> EpsResult<ClientConfig> {
        serdeconv::from_toml_str(toml).map_err(|err| EpsError::OperSystem(err.to_string()))
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> EpsResult<ClientConfig> {
        serdeconv::from_toml_file(path).map_err(|err| EpsError::OperSystem(err.to_string()))
    }

    pub fn conn_mode(&self) -> EpsResult<ConnMode> {
        match self.mode.as_str() {
            "tcp" => Ok(ConnMode::Tcp),
            "udp" => Ok(ConnMode::Udp),
            _ => Err(EpsError::InvalidConnMode),
        }
    }

    pub fn mkt_type(&self) -> EpsResult<MktType> {
        match self.market.as_str() {
            "all" => Ok(MktType::All),
            "stk" => Ok(MktType::Stk),
            "dev" => Ok(MktType::Dev),
            _ => Err(EpsError::InvalidMktType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = ClientConfig::from_toml_str(
            r#"
mode = "tcp"
address = "196.123.1.1:8000"
username = "u001"
password = "secret"
heartbeat_intl = 20
market = "stk"

[logger]
type = "terminal"
level = "debug"
destination = "stderr"
"#,
        )
        .unwrap();

        assert_eq!(config.conn_mode().unwrap(), ConnMode::Tcp);
        assert_eq!(config.address, "196.123.1.1:8000");
        assert_eq!(config.heartbeat_intl, 20);
        assert_eq!(config.mkt_type().unwrap(), MktType::Stk);
        assert!(config.logger.is_some());
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
mode = "udp"
address = "230.11.1.1:3333;196.123.71.1"
"#,
        )
        .unwrap();

        assert_eq!(config.conn_mode().unwrap(), ConnMode::Udp);
        assert_eq!(config.heartbeat_intl, 30);
        assert_eq!(config.mkt_type().unwrap(), MktType::All);
        assert!(config.username.is_empty());
        assert!(config.logger.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let config = ClientConfig::from_toml_str(
            r#"
mode = "ipc"
address = "x"
market = "bonds"
"#,
        )
        .unwrap();

        assert_eq!(config.conn_mode().unwrap_err(), EpsError::InvalidConnMode);
        assert_eq!(config.mkt_type().unwrap_err(), EpsError::InvalidMktType);

        assert!(ClientConfig::from_toml_str("mode = 3").is_err());
    }
}
