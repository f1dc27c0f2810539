use std::path::Path;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm;
use crate::memory::{DEFAULT_USER_ID, mem0};
use crate::session::DEFAULT_SESSION_TIMEOUT;

/// Prefix of environment variables read into [`AppConfig`],
/// e.g. `MEMCHAT_SERVER__PORT=8000`.
pub const ENV_PREFIX: &str = "MEMCHAT";

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// User id under which memories are stored
    #[arg(long)]
    pub user_id: Option<String>,

    /// Completion model
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub memory: MemoryConfig,
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Idle time after which a session is discarded.
    pub session_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub base_url: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Timeout applied to every outbound request.
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                session_timeout_secs: DEFAULT_SESSION_TIMEOUT.as_secs(),
            },
            memory: MemoryConfig {
                base_url: mem0::DEFAULT_BASE_URL.to_string(),
                user_id: DEFAULT_USER_ID.to_string(),
            },
            completion: CompletionConfig {
                base_url: llm::DEFAULT_BASE_URL.to_string(),
                model: llm::DEFAULT_MODEL.to_string(),
                max_tokens: llm::DEFAULT_MAX_TOKENS,
                temperature: llm::DEFAULT_TEMPERATURE,
                request_timeout_secs: 60,
                azure_deployment: None,
                azure_api_version: None,
            },
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layer defaults, the config file, `MEMCHAT_` environment variables and
    /// CLI flags, in increasing priority.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("server.port", defaults.server.port)?
            .set_default("server.host", defaults.server.host)?
            .set_default("server.session_timeout_secs", defaults.server.session_timeout_secs)?
            .set_default("memory.base_url", defaults.memory.base_url)?
            .set_default("memory.user_id", defaults.memory.user_id)?
            .set_default("completion.base_url", defaults.completion.base_url)?
            .set_default("completion.model", defaults.completion.model)?
            .set_default("completion.max_tokens", defaults.completion.max_tokens)?
            .set_default("completion.temperature", f64::from(defaults.completion.temperature))?
            .set_default(
                "completion.request_timeout_secs",
                defaults.completion.request_timeout_secs,
            )?;

        match &cli.config {
            Some(path) => {
                builder = builder.add_source(File::with_name(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(user_id) = cli.user_id {
            builder = builder.set_override("memory.user_id", user_id)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("completion.model", model)?;
        }

        builder.build()?.try_deserialize()
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
