//! Application configuration.
//!
//! Two separate inputs:
//!
//! - [`AssistantSettings`]: the two required secrets, read straight from the
//!   environment. Startup aborts if either is missing.
//! - [`AppConfig`]: everything else, layered from defaults, an optional config
//!   file, `CHAT_`-prefixed environment variables and CLI flags.

use clap::Parser;
use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{ChatError, Result};

/// Environment variable holding the API credential.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable holding the assistant identifier.
pub const ASSISTANT_ID_VAR: &str = "ASSISTANT_ID";
/// Older name for [`ASSISTANT_ID_VAR`], still honoured.
pub const LEGACY_ASSISTANT_ID_VAR: &str = "Assist_id";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the assistants API
    #[arg(long, env = "ASSISTANTS_BASE_URL")]
    pub base_url: Option<String>,

    /// Re-apply the assistant configuration before every run
    #[arg(long, env = "RESYNC_BEFORE_RUN")]
    pub resync_before_run: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub polling: PollingConfig,
    pub assistant: AssistantConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Idle time after which a local session is forgotten.
    pub session_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Value of the `OpenAI-Beta` header; empty disables it.
    pub beta_header: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub max_elapsed_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    pub resync_before_run: bool,
    /// Model pushed to the assistant instead of the one it was created with.
    #[serde(default)]
    pub model_override: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    pub title: String,
    pub thinking_label: String,
}

impl ServerConfig {
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl AppConfig {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> std::result::Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.session_ttl_secs", 30 * 60)?
            .set_default("remote.base_url", "https://api.openai.com/v1")?
            .set_default("remote.beta_header", "assistants=v2")?
            .set_default("remote.timeout_secs", 60)?
            .set_default("polling.interval_ms", 3000)?
            .set_default("polling.max_attempts", 200)?
            .set_default("polling.max_elapsed_secs", 600)?
            .set_default("assistant.resync_before_run", true)?
            .set_default("ui.title", "Lawyer Assistant")?
            .set_default("ui.thinking_label", "Assistant is thinking...")?;

        // Config file: explicit path, else ./config.{yaml,toml,json} if present
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // CHAT_SERVER__PORT=8000, CHAT_POLLING__INTERVAL_MS=500, ...
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their clap env fallbacks) win over everything
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(base_url) = cli.base_url {
            builder = builder.set_override("remote.base_url", base_url)?;
        }
        if let Some(resync) = cli.resync_before_run {
            builder = builder.set_override("assistant.resync_before_run", resync)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// The two secrets the service cannot start without.
#[derive(Debug)]
pub struct AssistantSettings {
    /// API credential. Never logged.
    pub api_key: SecretString,
    /// Identifier of the remote assistant to chat with.
    pub assistant_id: String,
}

impl AssistantSettings {
    /// Read the secrets from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the secrets through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank(API_KEY_VAR).ok_or_else(|| {
            ChatError::Configuration(format!("{API_KEY_VAR} not found in the environment"))
        })?;
        let assistant_id = non_blank(ASSISTANT_ID_VAR)
            .or_else(|| non_blank(LEGACY_ASSISTANT_ID_VAR))
            .ok_or_else(|| {
                ChatError::Configuration(format!("{ASSISTANT_ID_VAR} not found in the environment"))
            })?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            assistant_id: assistant_id.trim().to_string(),
        })
    }
}
