use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inkpost_core::BreakerPolicy;
use inkpost_engine::render::{LinkStyle, MathNotation, DEFAULT_THEME_CSS};
use inkpost_engine::{
    Account, AccountBook, ApiSettings, EngineSettings, PublishSettings, RenderOptions,
};
use inkpost_logging::{ink_info, ink_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILENAME: &str = "inkpost.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub accounts: Vec<AccountConfig>,
    pub default_account: Option<String>,
    pub render: RenderConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub server_url: String,
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub app_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    #[default]
    Latex,
    AsciiMath,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Links {
    #[default]
    Inline,
    Footnote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub line_numbers: bool,
    pub math_notation: Notation,
    pub code_theme: String,
    pub vault_root: Option<PathBuf>,
    pub links: Links,
    pub figcaption: bool,
    /// Inline the built-in article theme.
    pub builtin_theme: bool,
    /// Extra CSS, applied after the built-in theme.
    pub theme_css: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let options = RenderOptions::default();
        Self {
            line_numbers: options.line_numbers,
            math_notation: Notation::Latex,
            code_theme: options.code_theme,
            vault_root: None,
            links: Links::Inline,
            figcaption: options.figcaption,
            builtin_theme: true,
            theme_css: None,
        }
    }
}

impl RenderConfig {
    /// The stylesheet to inline, or `None` when theming is off.
    fn stylesheet(&self) -> Result<Option<String>, ConfigError> {
        let mut css = String::new();
        if self.builtin_theme {
            css.push_str(DEFAULT_THEME_CSS);
        }
        if let Some(path) = &self.theme_css {
            let custom = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            css.push('\n');
            css.push_str(&custom);
        }
        Ok((!css.trim().is_empty()).then_some(css))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub draft_page_size: u32,
    pub draft_pages: u32,
    pub batch_delay_ms: u64,
    pub breaker_cooldown_ms: u64,
    pub notice_interval_ms: u64,
    pub focus_yield_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            draft_page_size: 20,
            draft_pages: 1,
            batch_delay_ms: 5000,
            breaker_cooldown_ms: 5000,
            notice_interval_ms: 3000,
            focus_yield_ms: 100,
        }
    }
}

/// Reads the config from `explicit`, else `./inkpost.ron`. A missing default
/// file yields defaults; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
            ink_warn!("No config at {:?}, using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config: AppConfig = ron::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.clone(),
        message: err.to_string(),
    })?;
    ink_info!("Loaded config from {:?}", path);
    Ok(config)
}

impl AppConfig {
    /// Backend settings must be usable before anything talks to the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_settings()
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(name) = &self.default_account {
            if self.account_book().select(Some(name), None).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "default account {name:?} is not configured"
                )));
            }
        }
        Ok(())
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            server_url: self.backend.server_url.clone(),
            api_key: self.backend.api_key.clone(),
            connect_timeout: Duration::from_secs(self.backend.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.backend.request_timeout_secs),
        }
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let publish = &self.publish;
        Ok(EngineSettings {
            api: self.api_settings(),
            render: RenderOptions {
                line_numbers: self.render.line_numbers,
                math_notation: match self.render.math_notation {
                    Notation::Latex => MathNotation::Latex,
                    Notation::AsciiMath => MathNotation::AsciiMath,
                },
                code_theme: self.render.code_theme.clone(),
                link_style: match self.render.links {
                    Links::Inline => LinkStyle::Inline,
                    Links::Footnote => LinkStyle::Footnote,
                },
                figcaption: self.render.figcaption,
                theme_css: self.render.stylesheet()?,
            },
            publish: PublishSettings {
                draft_page_size: publish.draft_page_size,
                draft_pages: publish.draft_pages,
                batch_delay: Duration::from_millis(publish.batch_delay_ms),
                ..PublishSettings::default()
            },
            breaker: BreakerPolicy {
                cooldown: Duration::from_millis(publish.breaker_cooldown_ms),
                notice_interval: Duration::from_millis(publish.notice_interval_ms),
            },
            focus_yield: Duration::from_millis(publish.focus_yield_ms),
            vault_root: self.render.vault_root.clone(),
        })
    }

    pub fn account_book(&self) -> AccountBook {
        let accounts = self
            .accounts
            .iter()
            .map(|account| Account {
                name: account.name.clone(),
                app_id: account.app_id.clone(),
                app_secret: account.secret.clone(),
            })
            .collect();
        AccountBook::new(accounts, self.default_account.clone())
    }
}
