use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub session_cookie: String,
    /// Sessions idle longer than this expire and are purged from the store.
    pub session_idle_minutes: i64,
    pub audit_table: String,
    pub default_page_size: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/server.db".into(),
            session_cookie: "grid_session".into(),
            session_idle_minutes: 30,
            audit_table: "log_active_record".into(),
            default_page_size: 10,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_settings(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("APP__SESSION_COOKIE") {
        settings.session_cookie = v;
    }
    if let Ok(v) = std::env::var("APP__SESSION_IDLE_MINUTES") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_idle_minutes = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__AUDIT_TABLE") {
        settings.audit_table = v;
    }
    if let Ok(v) = std::env::var("APP__DEFAULT_PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.default_page_size = parsed;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    let text = |key: &str| file_cfg.get(key).and_then(toml::Value::as_str).map(str::to_string);

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("session_cookie") {
        settings.session_cookie = v;
    }
    if let Some(v) = text("audit_table") {
        settings.audit_table = v;
    }
    if let Some(v) = file_cfg
        .get("session_idle_minutes")
        .and_then(toml::Value::as_integer)
    {
        settings.session_idle_minutes = v;
    }
    if let Some(v) = file_cfg
        .get("default_page_size")
        .and_then(toml::Value::as_integer)
    {
        settings.default_page_size = v;
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

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
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

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
