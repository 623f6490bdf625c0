//! Server configuration: a TOML file, overridable by CLI flags, falling
//! back to an in-process default when no file is present.

use std::collections::HashMap;
use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

fn default_listen_addr() -> String {
    "127.0.0.1:5060".to_string()
}

fn default_realm() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default)]
    pub accounts: HashMap<String, String>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            listen_addr: default_listen_addr(),
            realm: default_realm(),
            accounts: HashMap::new(),
            log_level: None,
        }
    }
}

/// Resolved configuration the binary runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub realm: String,
    pub accounts: HashMap<String, String>,
    pub log_level: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "sipgate")]
#[command(about = "A dual-transport SIP registrar and INVITE dialog bridge")]
pub struct Cli {
    /// Path to a TOML config file. Missing file falls back to built-in defaults.
    #[arg(short, long, default_value = "sipgate.toml")]
    pub config: String,

    /// Overrides `listen_addr` from the config file.
    #[arg(short, long)]
    pub listen_addr: Option<String>,

    /// Overrides `realm` from the config file.
    #[arg(short, long)]
    pub realm: Option<String>,

    /// Overrides `log_level` from the config file (falls back to `RUST_LOG`/`info`).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Config {
    /// Loads the config file named by `cli.config` (silently falling back to
    /// defaults if it's missing or unreadable), then applies CLI overrides.
    pub fn load(cli: &Cli) -> anyhow::Result<Config> {
        let file = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(_) => FileConfig::default(),
        };

        let listen_addr = cli.listen_addr.clone().unwrap_or(file.listen_addr);
        let realm = cli.realm.clone().unwrap_or(file.realm);
        let log_level = cli.log_level.clone().or(file.log_level);

        Ok(Config {
            listen_addr: listen_addr.parse()?,
            realm,
            accounts: file.accounts,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_defaults_to_loopback_and_empty_accounts() {
        let file = FileConfig::default();
        assert_eq!(file.listen_addr, "127.0.0.1:5060");
        assert_eq!(file.realm, "localhost");
        assert!(file.accounts.is_empty());
    }

    #[test]
    fn toml_parses_accounts_table() {
        let toml_text = r#"
            listen_addr = "0.0.0.0:5060"
            realm = "example.com"

            [accounts]
            alice = "secret"
        "#;
        let file: FileConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(file.realm, "example.com");
        assert_eq!(file.accounts.get("alice"), Some(&"secret".to_string()));
    }
}
