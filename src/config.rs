use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::ids::IdScheme;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub sweeper: Sweeper,
    #[serde(default)]
    pub ids: Ids,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub kind: StoreKind,
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sql,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub recent_pastes: usize,
    pub max_upload_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sweeper {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ids {
    pub scheme: IdScheme,
}

impl Config {
    /// Read a TOML config file.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents).context("failed to deserialize config")
    }
}

impl Sweeper {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            database: Database::default(),
            limits: Limits::default(),
            sweeper: Sweeper::default(),
            ids: Ids::default(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Database {
            kind: StoreKind::Sql,
            url: "sqlite://pastes.db?mode=rwc".to_owned(),
            collection: "pastes".to_owned(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            recent_pastes: 10,
            max_upload_size: 1024 * 1024,
        }
    }
}

impl Default for Sweeper {
    fn default() -> Self {
        Sweeper {
            enabled: true,
            interval_secs: 60,
        }
    }
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
port = 9000

[database]
kind = "memory"

[sweeper]
enabled = false
interval_secs = 5

[ids]
scheme = "random"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database.kind, StoreKind::Memory);
        assert_eq!(config.database.collection, "pastes");
        assert_eq!(config.limits.recent_pastes, 10);
        assert!(!config.sweeper.enabled);
        assert_eq!(config.sweeper.interval(), Duration::from_secs(5));
        assert_eq!(config.ids.scheme, IdScheme::Random);
    }

    #[tokio::test]
    async fn empty_file_is_all_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database.kind, StoreKind::Sql);
        assert!(config.sweeper.enabled);
        assert_eq!(config.ids.scheme, IdScheme::Hash);
    }

    #[tokio::test]
    async fn rejects_unknown_store_kind() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[database]\nkind = \"mongo\"\n").unwrap();
        assert!(Config::load(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        assert!(Config::load("/definitely/not/here.toml").await.is_err());
    }
}
