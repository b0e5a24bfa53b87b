//! Command line and configuration file handling.
//!
//! Settings are resolved from three layers: command line flags win over the TOML file, which wins
//! over built-in defaults. The API key is taken from the `OPENAI_API_KEY` environment variable,
//! falling back to `openai_api_key` in the file.
//!
//! ```toml
//! model = "gpt-4o"
//! stream = true
//! autosave = false
//! max_tokens = 1024
//! endpoint_host = "api.openai.com"
//! endpoint_tls = true
//! openai_api_key = "sk-..."
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::Parser;
use serde::Deserialize;

use crate::{Api, openai, session::SessionConfig};

/// Chat with an OpenAI-compatible model from the terminal.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about)]
pub struct Args {
    /// Model identifier passed to the API.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Load the conversation from this file at startup.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Save the conversation to this file when the session ends.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Load from and save to the same file. Overrides --input and --output.
    #[arg(long, value_name = "PATH")]
    pub io: Option<PathBuf>,

    /// Print replies as they are generated.
    #[arg(short, long)]
    pub stream: bool,

    /// Also save after every completed round.
    #[arg(long)]
    pub autosave: bool,

    /// Upper bound on the length of a reply, in tokens.
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// TOML configuration file.
    #[arg(short, long, value_name = "PATH", env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Contents of the configuration file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub autosave: Option<bool>,
    pub max_tokens: Option<u32>,
    /// Host of an OpenAI-compatible endpoint, without scheme or path.
    pub endpoint_host: Option<String>,
    /// Set to `false` for servers that only speak plain HTTP.
    pub endpoint_tls: Option<bool>,
    pub openai_api_key: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("No API key found: set OPENAI_API_KEY or `openai_api_key` in the config file")]
    MissingCredential,
}

/// Everything needed to start a session.
#[derive(Debug)]
pub struct Settings {
    pub api: Api,
    pub session: SessionConfig,
}

impl Settings {
    /// Resolves settings from parsed arguments, the config file they name and the environment.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        let env_key = std::env::var(openai::API_KEY_VAR).ok();

        Self::resolve(args, file, env_key)
    }

    /// Merges the layers. Blank keys count as missing.
    pub fn resolve(
        args: Args,
        file: FileConfig,
        env_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = env_key
            .filter(|key| !key.trim().is_empty())
            .or(file.openai_api_key.filter(|key| !key.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential)?;

        let model = args
            .model
            .or(file.model)
            .unwrap_or_else(|| openai::DEFAULT_MODEL.to_owned());

        let (input, output) = match args.io {
            Some(path) => {
                if args.input.is_some() || args.output.is_some() {
                    tracing::warn!("--io overrides --input and --output");
                }
                (Some(path.clone()), Some(path))
            }
            None => (args.input, args.output),
        };

        let mut api = Api::new(api_key.trim())
            .default_model(model.as_str())
            .default_max_tokens(args.max_tokens.or(file.max_tokens));
        if let Some(host) = file.endpoint_host {
            api = api.endpoint_host(host);
        }
        if let Some(use_tls) = file.endpoint_tls {
            api = api.use_tls(use_tls);
        }

        let session = SessionConfig {
            model,
            input,
            output,
            streaming: args.stream || file.stream.unwrap_or(false),
            autosave: args.autosave || file.autosave.unwrap_or(false),
        };

        Ok(Self { api, session })
    }
}
