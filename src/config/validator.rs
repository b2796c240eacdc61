//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Checks upstream URL and paths, cache/store invariants,
//!   server, metrics and logging settings
//! - Route collisions between the metrics path and the relay routes

use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{SettingsConfig, StoreType};
use crate::config::upstream::{IdentityConfig, SecretValue, ServiceConfig, UpstreamConfig};
use crate::observability::metrics::get_metrics;
use crate::server::routes::RESERVED_PATHS;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_upstream(&cfg.upstream, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.cache.freshness_window_seconds == 0 {
        errors.push("settings.cache.freshness_window_seconds must be > 0".to_string());
    }

    let store = &settings.store;
    if store.key.trim().is_empty() {
        errors.push("settings.store.key cannot be empty".to_string());
    } else if !store
        .key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push(format!(
            "settings.store.key '{}' may only contain [A-Za-z0-9_-]",
            store.key
        ));
    }
    if store.store_type == StoreType::File
        && store.path.as_ref().filter(|p| !p.trim().is_empty()).is_none()
    {
        errors.push("settings.store.path is required for store type 'file'".to_string());
    }

    if settings.server.host.is_empty() {
        errors.push(format!(
            "settings.server.host '{}' must be valid",
            settings.server.host
        ));
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }
    if metrics.is_enabled && RESERVED_PATHS.contains(&metrics.path.as_str()) {
        errors.push(format!(
            "settings.metrics.path '{}' collides with a relay route",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

/// UPSTREAM VALIDATION
fn validate_upstream(upstream: &UpstreamConfig, errors: &mut Vec<String>) {
    match Url::parse(&upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!(
            "upstream.base_url scheme '{}' must be http or https",
            url.scheme()
        )),
        Err(err) => errors.push(format!(
            "upstream.base_url '{}' is not a valid URL: {}",
            upstream.base_url, err
        )),
    }

    for (name, path) in [
        ("sessions_path", &upstream.sessions_path),
        ("grades_path", &upstream.grades_path),
    ] {
        if !path.starts_with('/') {
            errors.push(format!("upstream.{} '{}' must start with '/'", name, path));
        }
    }

    if upstream.timeout_ms == 0 {
        errors.push("upstream.timeout_ms must be > 0".to_string());
    }

    for (name, value) in &upstream.headers {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(format!("upstream.headers: '{}' is not a valid header name", name));
        }
        if http::HeaderValue::from_str(value).is_err() {
            errors.push(format!("upstream.headers.{}: value is not a valid header value", name));
        }
    }

    validate_identity(&upstream.identity, errors);
}

fn validate_identity(identity: &IdentityConfig, errors: &mut Vec<String>) {
    validate_secret_value("upstream.identity.username", &identity.username, errors);
    validate_secret_value("upstream.identity.password", &identity.password, errors);
}

fn validate_secret_value(path: &str, v: &SecretValue, errors: &mut Vec<String>) {
    match v {
        SecretValue::Literal { value } => {
            if value.trim().is_empty() {
                errors.push(format!("{}: literal value cannot be empty", path));
            }
        }
        SecretValue::FromEnv { from_env } => {
            if from_env.trim().is_empty() {
                errors.push(format!("{}: env name cannot be empty", path));
            }
        }
        SecretValue::FromFile { path: p } => {
            if p.trim().is_empty() {
                errors.push(format!("{}: file path cannot be empty", path));
            }
        }
    }
}
