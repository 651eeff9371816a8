//! Environment-driven configuration
//!
//! Settings come from environment variables, with a `.env` file picked up
//! from the working directory when present. Everything has a default except
//! the OpenAI API key, which is only required when serving.

use std::path::PathBuf;
use std::str::FromStr;

use crate::{CacheError, Result};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7878";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;
pub const DEFAULT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub embedding_dim: usize,
    pub threshold: f32,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub completion_model: String,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        // A missing .env file is fine; explicit env vars still apply
        dotenvy::dotenv().ok();

        Ok(Config {
            data_dir: PathBuf::from(var_or("SEMCACHE_DATA_DIR", DEFAULT_DATA_DIR)),
            bind_addr: var_or("SEMCACHE_BIND", DEFAULT_BIND_ADDR),
            embedding_dim: parsed_var("SEMCACHE_EMBED_DIM", DEFAULT_EMBEDDING_DIM)?,
            threshold: parsed_var("SEMCACHE_THRESHOLD", DEFAULT_THRESHOLD)?,
            openai_base_url: var_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            embedding_model: var_or("SEMCACHE_EMBED_MODEL", DEFAULT_EMBEDDING_MODEL),
            completion_model: var_or("SEMCACHE_CHAT_MODEL", DEFAULT_COMPLETION_MODEL),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CacheError::Config(format!("{} has an unparseable value: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
