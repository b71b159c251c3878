use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::warn;

pub const DEFAULT_JWT_SECRET: &str = "dev-insecure-secret";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub max_body_bytes: usize,
    /// Single allowed browser origin; any origin when unset.
    pub cors_origin: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/diet_planner.db".into(),
            jwt_secret: DEFAULT_JWT_SECRET.into(),
            token_ttl_seconds: 7 * 24 * 3600,
            llm_base_url: "https://api.openai.com".into(),
            llm_api_key: None,
            llm_model: "gpt-4o-mini".into(),
            llm_temperature: 0.7,
            llm_max_tokens: 2048,
            max_body_bytes: 64 * 1024,
            cors_origin: None,
        }
    }
}

/// File key and the environment variables that override it, lowest
/// precedence first.
const ENV_OVERRIDES: &[(&str, &[&str])] = &[
    ("bind_addr", &["SERVER_BIND", "APP__BIND_ADDR"]),
    ("database_url", &["DATABASE_URL", "APP__DATABASE_URL"]),
    ("jwt_secret", &["JWT_SECRET", "APP__JWT_SECRET"]),
    ("token_ttl_seconds", &["TOKEN_TTL_SECONDS", "APP__TOKEN_TTL_SECONDS"]),
    ("llm_base_url", &["LLM_BASE_URL", "APP__LLM_BASE_URL"]),
    ("llm_api_key", &["OPENAI_API_KEY", "LLM_API_KEY", "APP__LLM_API_KEY"]),
    ("llm_model", &["LLM_MODEL", "APP__LLM_MODEL"]),
    ("llm_temperature", &["APP__LLM_TEMPERATURE"]),
    ("llm_max_tokens", &["APP__LLM_MAX_TOKENS"]),
    ("max_body_bytes", &["APP__MAX_BODY_BYTES"]),
    ("cors_origin", &["CORS_ORIGIN", "APP__CORS_ORIGIN"]),
];

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

pub(crate) fn settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut values = file.map(parse_file).unwrap_or_default();
    for (key, vars) in ENV_OVERRIDES {
        for var in *vars {
            if let Some(value) = env(var) {
                values.insert((*key).to_string(), value);
            }
        }
    }

    let mut settings = Settings::default();
    for (key, value) in &values {
        settings.apply(key, value.trim());
    }
    settings
}

fn parse_file(raw: &str) -> HashMap<String, String> {
    match toml::from_str::<toml::Table>(raw) {
        Ok(table) => table
            .into_iter()
            .map(|(key, value)| match value {
                toml::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect(),
        Err(error) => {
            warn!(%error, "ignoring unparsable server.toml");
            HashMap::new()
        }
    }
}

impl Settings {
    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "bind_addr" => self.server_bind = value.to_string(),
            "database_url" => self.database_url = value.to_string(),
            "jwt_secret" => self.jwt_secret = value.to_string(),
            "token_ttl_seconds" => set_parsed(&mut self.token_ttl_seconds, key, value),
            "llm_base_url" => self.llm_base_url = value.to_string(),
            "llm_api_key" => {
                self.llm_api_key = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "llm_model" => self.llm_model = value.to_string(),
            "llm_temperature" => set_parsed(&mut self.llm_temperature, key, value),
            "llm_max_tokens" => set_parsed(&mut self.llm_max_tokens, key, value),
            "max_body_bytes" => set_parsed(&mut self.max_body_bytes, key, value),
            "cors_origin" => self.cors_origin = Some(value.to_string()).filter(|v| !v.is_empty()),
            _ => {}
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring invalid setting"),
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    format!("sqlite://{}", path.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
