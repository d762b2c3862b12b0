//! Store and process configuration.
//!
//! [`LwsConfig`] has a default for every field. Values can be overridden by
//! an optional TOML/JSON file and then by `LWS_*` environment variables
//! (`LWS_DATA_DIR`, `LWS_LOG_LEVEL`, ...).

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LwsConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "lws_db=trace").
    pub log_level: String,
    /// Log output format: "text" or "json".
    pub log_format: String,
    pub max_open_files: i32,
    pub create_if_missing: bool,
}

impl Default for LwsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("lws");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            max_open_files: 512,
            create_if_missing: true,
        }
    }
}

impl LwsConfig {
    /// Layer `file` (if any) and the environment over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder.add_source(Environment::with_prefix("LWS")).build()?.try_deserialize()
    }

    /// Path to the RocksDB directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("light_wallet_server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_log_level_is_info() {
        let cfg = LwsConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, "text");
    }

    #[test]
    fn default_data_dir_ends_with_lws() {
        let cfg = LwsConfig::default();
        assert!(
            cfg.data_dir.ends_with("lws"),
            "data_dir should end with 'lws': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn db_path_appends_store_name() {
        let cfg = LwsConfig { data_dir: PathBuf::from("/tmp/lws-test"), ..LwsConfig::default() };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/lws-test/light_wallet_server"));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lws.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"log_level": "debug", "max_open_files": 64}}"#).unwrap();

        let cfg = LwsConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.max_open_files, 64);
        assert!(cfg.create_if_missing);
    }

    #[test]
    fn serde_round_trip() {
        let cfg = LwsConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: LwsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
