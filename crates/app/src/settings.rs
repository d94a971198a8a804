use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use studychat_rag::RagClientConfig;
use studychat_session::SessionOptions;
use tempfile::NamedTempFile;

pub const SETTINGS_DIRECTORY_NAME: &str = "studychat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "STUDYCHAT_";
/// Overrides the settings file location.
pub const CONFIG_PATH_ENV: &str = "STUDYCHAT_CONFIG";
/// Keys accepted by [`AppSettings::with_value`].
pub const SETTABLE_KEYS: &[&str] = &[
    "service.base_url",
    "service.connect_timeout_ms",
    "service.request_timeout_ms",
    "session.accepted_extensions",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_welcome_on_ready")]
    pub welcome_on_ready: bool,
    /// File extensions the shell lets the user select for upload.
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            welcome_on_ready: default_welcome_on_ready(),
            accepted_extensions: default_accepted_extensions(),
        }
    }
}

impl SessionSettings {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            welcome_on_ready: self.welcome_on_ready,
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if self.accepted_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                self.accepted_extensions
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(extension))
            })
    }

    fn normalized(mut self) -> Self {
        // Keep extensions comparable by stripping dots and blank rows.
        self.accepted_extensions = self
            .accepted_extensions
            .into_iter()
            .map(|extension| extension.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|extension| !extension.is_empty())
            .collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub service: RagClientConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

impl AppSettings {
    pub fn normalized(mut self) -> Self {
        self.service = self.service.normalized();
        self.session = self.session.normalized();
        self
    }

    /// Layers defaults, the JSON file at `path` (if any), then `STUDYCHAT_*` variables.
    ///
    /// Nested keys use a double underscore, e.g. `STUDYCHAT_SERVICE__BASE_URL`.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppSettings::default()))
            .merge(Json::file(path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["CONFIG", "STUDY_TASK", "LOG"])
                    .split("__"),
            )
    }

    /// Returns a copy with one setting replaced.
    ///
    /// `service.request_timeout_ms` accepts `off` to remove the limit; extensions are a comma list.
    pub fn with_value(mut self, key: &str, value: &str) -> Result<Self, SettingsError> {
        let stage = "apply-setting";
        let value = value.trim();
        match key {
            "service.base_url" => {
                ensure!(
                    !value.is_empty(),
                    InvalidValueSnafu {
                        stage,
                        key: "service.base_url",
                        value,
                        details: "must not be empty",
                    }
                );
                self.service.base_url = value.to_string();
            }
            "service.connect_timeout_ms" => {
                self.service.connect_timeout_ms =
                    parse_millis("service.connect_timeout_ms", value)?;
            }
            "service.request_timeout_ms" => {
                self.service.request_timeout_ms = match value {
                    "off" | "none" => None,
                    millis => Some(parse_millis("service.request_timeout_ms", millis)?),
                };
            }
            "session.accepted_extensions" => {
                self.session.accepted_extensions =
                    value.split(',').map(str::to_string).collect();
            }
            other => {
                return UnknownKeySnafu {
                    stage,
                    key: other.to_string(),
                }
                .fail();
            }
        }
        Ok(self.normalized())
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<u64, SettingsError> {
    value.parse::<u64>().map_err(|error| {
        InvalidValueSnafu {
            stage: "parse-milliseconds",
            key,
            value,
            details: error.to_string(),
        }
        .build()
    })
}

pub struct SettingsStore {
    settings: ArcSwap<AppSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".studychat"))
    }

    pub fn default_config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::default_config_dir().join(SETTINGS_FILE_NAME))
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: ArcSwap::from_pointee(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    /// Writes `settings` to disk, then publishes them as the live snapshot.
    pub fn save(&self, settings: AppSettings) -> Result<Arc<AppSettings>, SettingsError> {
        let settings = Arc::new(settings.normalized());
        self.write_file(&settings)?;
        self.settings.store(settings.clone());
        Ok(settings)
    }

    fn load_from_disk(path: &Path) -> AppSettings {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults and environment");
        }

        match AppSettings::figment(path).extract::<AppSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                AppSettings::default().normalized()
            }
        }
    }

    // Stage next to the target so the final rename never crosses filesystems.
    fn write_file(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        let directory = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory).context(PrepareDirectorySnafu {
            stage: "prepare-settings-directory",
            path: directory.clone(),
        })?;

        let encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-settings",
        })?;
        let mut staged = NamedTempFile::new_in(&directory).context(StageSettingsSnafu {
            stage: "create-staged-settings",
            path: directory.clone(),
        })?;
        staged.write_all(&encoded).context(StageSettingsSnafu {
            stage: "write-staged-settings",
            path: staged.path().to_path_buf(),
        })?;
        staged.persist(&self.config_path).context(ReplaceSettingsSnafu {
            stage: "replace-settings-file",
            path: self.config_path.clone(),
        })?;

        tracing::info!(path = %self.config_path.display(), "settings written");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("unknown setting `{key}`, settable keys: {}", SETTABLE_KEYS.join(", ")))]
    UnknownKey { stage: &'static str, key: String },
    #[snafu(display("invalid value `{value}` for `{key}`: {details}"))]
    InvalidValue {
        stage: &'static str,
        key: &'static str,
        value: String,
        details: String,
    },
    #[snafu(display("cannot prepare settings directory {path:?} on `{stage}`: {source}"))]
    PrepareDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot stage settings at {path:?} on `{stage}`: {source}"))]
    StageSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot replace {path:?} on `{stage}`: {source}"))]
    ReplaceSettings {
        stage: &'static str,
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

fn default_welcome_on_ready() -> bool {
    true
}

fn default_accepted_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}
