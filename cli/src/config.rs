use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use savor_core::tasks::DEFAULT_MAX_IN_FLIGHT;

/// Settings read from `config.json` in the data directory.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub edamam_app_id: Option<String>,
    pub edamam_app_key: Option<String>,
    /// Base URL of a `savor serve` instance. Unset means a local mirror file.
    pub mirror_url: Option<String>,
    pub mirror_api_key: Option<String>,
    pub max_background_tasks: Option<usize>,
}

pub struct Config {
    pub db_path: PathBuf,
    pub mirror_db_path: PathBuf,
    pub data_dir: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "savor").context("Could not determine home directory")?;

        Self::load_from(proj_dirs.data_dir(), |name| std::env::var(name).ok())
    }

    /// Load from `data_dir`, letting `env` override file settings.
    pub fn load_from(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = data_dir.join("config.json");
        let mut settings = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config file: {}", config_path.display()))?
        } else {
            Settings::default()
        };

        let overrides = [
            ("EDAMAM_APP_ID", &mut settings.edamam_app_id),
            ("EDAMAM_APP_KEY", &mut settings.edamam_app_key),
            ("SAVOR_MIRROR_URL", &mut settings.mirror_url),
            ("SAVOR_MIRROR_API_KEY", &mut settings.mirror_api_key),
        ];
        for (name, slot) in overrides {
            if let Some(value) = env(name).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value.trim().to_string());
            }
        }

        Ok(Config {
            db_path: data_dir.join("savor.db"),
            mirror_db_path: data_dir.join("mirror.db"),
            data_dir: data_dir.to_path_buf(),
            settings,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Edamam `(app_id, app_key)`, required by anything that talks to the catalog.
    pub fn edamam_credentials(&self) -> Result<(&str, &str)> {
        match (
            self.settings.edamam_app_id.as_deref(),
            self.settings.edamam_app_key.as_deref(),
        ) {
            (Some(id), Some(key)) => Ok((id, key)),
            _ => bail!(
                "Edamam credentials missing. Set EDAMAM_APP_ID and EDAMAM_APP_KEY, \
                 or add edamam_app_id and edamam_app_key to {}",
                self.config_path().display()
            ),
        }
    }

    pub fn max_background_tasks(&self) -> usize {
        self.settings
            .max_background_tasks
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT)
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Set mirror_api_key (or SAVOR_MIRROR_API_KEY) to this on clients.");
        Ok((key, true))
    }
}
