use std::collections::HashMap;
use std::{env, fs};

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::config::settings::SettingsConfig;
use crate::upstream::Credentials;

pub const SESSIONS_PATH_DEFAULT: &str = "/sessions";
pub const GRADES_PATH_DEFAULT: &str = "/grades";
pub const UPSTREAM_TIMEOUT_MS_DEFAULT: u64 = 5000;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub upstream: UpstreamConfig,
}

/// ================================
/// Upstream portal
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// e.g. https://portal.example.edu/api
    pub base_url: String,
    #[serde(default = "default_sessions_path")]
    pub sessions_path: String,
    #[serde(default = "default_grades_path")]
    pub grades_path: String,
    /// extra query parameters for the grades request (school year, period)
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// static headers sent with every upstream request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// shared identity used for all callers without override credentials
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    pub username: SecretValue,
    pub password: SecretValue,
}

/// Where a credential value comes from
#[derive(Deserialize, Clone)]
#[serde(untagged)]
pub enum SecretValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretValue::Literal { .. } => f.write_str("Literal { value: \"***\" }"),
            SecretValue::FromEnv { from_env } => f.debug_struct("FromEnv").field("from_env", from_env).finish(),
            SecretValue::FromFile { path } => f.debug_struct("FromFile").field("path", path).finish(),
        }
    }
}

impl SecretValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            SecretValue::Literal { value } => Ok(value.to_owned()),
            SecretValue::FromEnv { from_env } => {
                env::var(from_env).map_err(|err| anyhow!("env '{}': {}", from_env, err))
            }
            SecretValue::FromFile { path } => fs::read_to_string(path)
                .map(|content| content.trim().to_string())
                .map_err(|err| anyhow!("file '{}': {}", path, err)),
        }
    }
}

impl IdentityConfig {
    pub fn resolve(&self) -> Result<Credentials> {
        let username = self
            .username
            .resolve()
            .map_err(|err| anyhow!("upstream.identity.username: {}", err))?;
        let password = self
            .password
            .resolve()
            .map_err(|err| anyhow!("upstream.identity.password: {}", err))?;
        Ok(Credentials::new(username, password))
    }
}

fn default_sessions_path() -> String {
    SESSIONS_PATH_DEFAULT.to_string()
}

fn default_grades_path() -> String {
    GRADES_PATH_DEFAULT.to_string()
}

fn default_timeout_ms() -> u64 {
    UPSTREAM_TIMEOUT_MS_DEFAULT
}
