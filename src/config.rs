use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DEFAULT_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            level: Self::DEFAULT_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.level.clone();
        self.level = self.level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::DEFAULT_LEVEL
            );
            self.level = Self::DEFAULT_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Wrap each revision in a transaction. SQLite runs DDL transactionally,
    /// so this only needs turning off for engines that cannot.
    pub atomic_ddl: bool,
}

impl DatabaseConfig {
    const DB_FILENAME: &str = "modeling.db";
    const BUSY_TIMEOUT_MS: u64 = 5000;

    fn default_in(data_dir: &Path) -> Self {
        DatabaseConfig {
            path: data_dir.join(Self::DB_FILENAME),
            busy_timeout_ms: Self::BUSY_TIMEOUT_MS,
            atomic_ddl: true,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Config {
    const ENV_PREFIX: &str = "MMW_";

    pub fn default_in(data_dir: &Path) -> Self {
        Config {
            database: DatabaseConfig::default_in(data_dir),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the configuration from a TOML file located in the app's data directory,
    /// with `MMW_` environment variables layered on top.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let data_dir = project_dirs.data_local_dir();
        let config_path = data_dir.join("config.toml");
        let default_config = Config::default_in(data_dir);

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(&config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        Self::extract(&config_path, default_config)
    }

    fn extract(config_path: &Path, default_config: Config) -> Self {
        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serial_test::serial;

    fn load(jail: &Jail) -> Config {
        let dir = jail.directory().to_path_buf();
        Config::extract(&dir.join("config.toml"), Config::default_in(&dir))
    }

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        Jail::expect_with(|jail| {
            let config = load(jail);
            assert_eq!(config, Config::default_in(jail.directory()));
            assert!(config.database.atomic_ddl);
            assert_eq!(config.database.busy_timeout(), Duration::from_millis(5000));
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [database]
                path = "/srv/mmw/modeling.db"
                atomic_ddl = false

                [logging]
                level = " DEBUG "
                "#,
            )?;
            let config = load(jail);
            assert_eq!(config.database.path, PathBuf::from("/srv/mmw/modeling.db"));
            assert!(!config.database.atomic_ddl);
            assert_eq!(config.database.busy_timeout_ms, 5000);
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[database]\nbusy_timeout_ms = 100\n")?;
            jail.set_env("MMW_DATABASE__BUSY_TIMEOUT_MS", "250");
            jail.set_env("MMW_DATABASE__PATH", "/tmp/env.db");
            let config = load(jail);
            assert_eq!(config.database.busy_timeout_ms, 250);
            assert_eq!(config.database.path, PathBuf::from("/tmp/env.db"));
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_invalid_log_level_falls_back() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[logging]\nlevel = \"loud\"\n")?;
            assert_eq!(load(jail).logging.level, "info");
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_malformed_file_uses_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[database\npath = ")?;
            assert_eq!(load(jail), Config::default_in(jail.directory()));
            Ok(())
        });
    }
}
