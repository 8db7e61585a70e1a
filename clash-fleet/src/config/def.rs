use std::{collections::HashMap, fmt::Display, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::Error;

#[derive(Serialize, Deserialize, Default, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    #[serde(alias = "off")]
    Silent,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Silent => write!(f, "off"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "off" | "silent" => Ok(LogLevel::Silent),
            _ => Err(Error::InvalidConfig(format!("invalid log level: {}", s))),
        }
    }
}

/// Example
/// ```yaml
/// ---
/// log-level: info
/// log-file: clash-fleet.log
///
/// proxies:
///   - name: "ss1"
///     type: ss
///     server: 10.0.0.13
///     port: 8388
///     cipher: aes-256-gcm
///     password: "password"
///
/// proxy-providers:
///   file-provider:
///     type: file
///     path: ./ss.yaml
///     interval: 300
///     health-check:
///       enable: true
///       url: http://www.gstatic.com/generate_204
///       interval: 300
///   http-provider:
///     type: http
///     url: https://example.com/subscription.yaml
///     interval: 3600
///     path: ./providers/http-provider.yaml
///     health-check:
///       enable: true
///       url: http://www.gstatic.com/generate_204
///       interval: 300
///       lazy: true
///       timeout: 5000
/// ```
#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// log level for both the console and the log file
    #[serde(default)]
    pub log_level: LogLevel,
    /// relative paths are resolved against the working directory
    pub log_file: Option<String>,
    /// static proxies, served by the reserved `default` provider
    #[serde(default)]
    pub proxies: Option<Vec<HashMap<String, Value>>>,
    /// provider name to provider definition
    #[serde(default)]
    pub proxy_providers: Option<HashMap<String, HashMap<String, Value>>>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "could not read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        content.parse()
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).map_err(|x| {
            Error::InvalidConfig(format!("could not parse config content: {}", x))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Config, LogLevel};

    #[test]
    fn test_parse_config() {
        let cfg: Config = r#"
log-level: debug
proxies:
  - name: ss1
    type: ss
    server: 10.0.0.13
    port: 8388
    cipher: aes-256-gcm
    password: password
proxy-providers:
  sub:
    type: http
    url: https://example.com/sub.yaml
    interval: 3600
    path: ./providers/sub.yaml
"#
        .parse()
        .expect("should parse");

        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert!(cfg.log_file.is_none());
        assert_eq!(cfg.proxies.as_ref().map(|x| x.len()), Some(1));
        assert!(cfg.proxy_providers.unwrap().contains_key("sub"));
    }

    #[test]
    fn test_empty_config() {
        let cfg: Config = "{}".parse().unwrap();
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(cfg.proxies.is_none());
        assert!(cfg.proxy_providers.is_none());

        assert!("log-level: [".parse::<Config>().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn").unwrap();

        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Warning);

        assert!(Config::from_file("/definitely/not/here.yaml").is_err());
    }

    #[test]
    fn test_log_level() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert_eq!(LogLevel::Warning.to_string(), "warn");
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
