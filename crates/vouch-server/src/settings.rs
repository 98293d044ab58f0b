//! Server configuration, deserialised from `config.toml` and `VOUCH_*`
//! environment variables.
//!
//! ```toml
//! host       = "127.0.0.1"
//! port       = 8080
//! store_path = "~/.local/share/vouch/records.db"
//! seed_admin = "0x00000000000000000000000000000000000000ad"
//!
//! [coordinator]
//! min_confirmations = 2
//! role_ttl_secs     = 60
//!
//! [dev_ledger]
//! polls_to_mine = 1
//! ```
//!
//! Nested keys are set from the environment with a double underscore, e.g.
//! `VOUCH_COORDINATOR__ROLE_TTL_SECS=30`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use vouch_core::config::CoordinatorConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:        String,
  pub port:        u16,
  pub store_path:  PathBuf,
  /// Address granted the admin role on the development ledger at startup.
  pub seed_admin:  Option<String>,
  pub coordinator: CoordinatorConfig,
  pub dev_ledger:  DevLedgerConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:        "127.0.0.1".to_owned(),
      port:        8080,
      store_path:  PathBuf::from("vouch.db"),
      seed_admin:  None,
      coordinator: CoordinatorConfig::default(),
      dev_ledger:  DevLedgerConfig::default(),
    }
  }
}

/// Behaviour of the in-process ledger the server runs against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevLedgerConfig {
  /// Receipt polls answered "unknown" before a transaction is mined.
  pub polls_to_mine: u32,
  pub confirmations: u64,
}

impl Default for DevLedgerConfig {
  fn default() -> Self { Self { polls_to_mine: 1, confirmations: 12 } }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under `VOUCH_*` variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("VOUCH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.coordinator, CoordinatorConfig::default());
    assert!(cfg.seed_admin.is_none());
  }

  #[test]
  fn nested_tables_override_defaults() {
    let cfg = from_toml(
      r#"
      port = 9000

      [coordinator]
      min_confirmations = 6
      role_ttl_secs = 5

      [dev_ledger]
      polls_to_mine = 0
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.coordinator.min_confirmations, 6);
    assert_eq!(cfg.coordinator.role_ttl_secs, 5);
    assert_eq!(
      cfg.coordinator.ledger_max_attempts,
      CoordinatorConfig::default().ledger_max_attempts
    );
    assert_eq!(cfg.dev_ledger.polls_to_mine, 0);
    assert_eq!(cfg.dev_ledger.confirmations, 12);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = ServerConfig::load(Path::new("/nonexistent/vouch.toml")).unwrap();
    assert_eq!(cfg.host, "127.0.0.1");
  }
}
