use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<String>,
    /// `path[:name],path[:name],...`; empty serves `./public/audio`.
    pub audio_dir: String,
    pub db_path: String,
    /// Cron expression or `@every <n><s|m|h>`; empty disables scheduling.
    pub index_schedule: String,
    pub index_on_startup: bool,
    pub cache_ttl_secs: u64,
    pub lock_stale_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            port: 8080,
            bind_addr: None,
            audio_dir: String::new(),
            db_path: "./audio-share.db".to_string(),
            index_schedule: String::new(),
            index_on_startup: false,
            cache_ttl_secs: 300,
            lock_stale_secs: 60 * 60,
        }
    }
}

impl ServerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Deployment variables win over the file. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("PORT") {
            self.port = parse_number("PORT", &value)?;
        }
        if let Some(value) = get("AUDIO_DIR") {
            self.audio_dir = value;
        }
        if let Some(value) = get("DB_PATH") {
            self.db_path = value;
        }
        if let Some(value) = get("INDEX_SCHEDULE") {
            self.index_schedule = value;
        }
        if let Some(value) = get("CACHE_TTL") {
            self.cache_ttl_secs = parse_number("CACHE_TTL", &value)?;
        }
        if let Some(value) = get("INDEX_ON_STARTUP") {
            self.index_on_startup = parse_flag("INDEX_ON_STARTUP", &value)?;
        }
        if let Some(value) = get("LOCK_STALE_SECS") {
            self.lock_stale_secs = parse_number("LOCK_STALE_SECS", &value)?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        match self.bind_addr.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => format!("{}:{}", host, self.port),
            _ => format!("0.0.0.0:{}", self.port),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got {:?}", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "{} must be true or false, got {:?}",
            key, value
        ))),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("AUDIOSHARE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Reads the config file, writing a default one when it does not exist.
/// The flag is true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = ServerConfig::default().port;
        }
        if config.db_path.trim().is_empty() {
            config.db_path = ServerConfig::default().db_path;
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

/// Resolves each relative root path in an `AUDIO_DIR` style list against the
/// config file's directory, leaving display names untouched.
pub fn resolve_audio_dirs(config_path: &Path, value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (path, name) = split_root_entry(entry);
            let resolved = resolve_path(config_path, path).display().to_string();
            match name {
                Some(name) => format!("{}:{}", resolved, name),
                None => resolved,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn split_root_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.rfind(':') {
        Some(1) if entry.as_bytes()[0].is_ascii_alphabetic() => (entry, None),
        Some(idx) => (&entry[..idx], Some(&entry[idx + 1..])),
        None => (entry, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config, ServerConfig::default());
        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "port: 9000\nindex_schedule: \"*/15 * * * *\"\n").unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.index_schedule, "*/15 * * * *");
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.db_path, "./audio-share.db");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("PORT", "9090"),
                ("AUDIO_DIR", "/a:A,/b"),
                ("DB_PATH", "/data/x.db"),
                ("INDEX_SCHEDULE", "@every 10m"),
                ("CACHE_TTL", "0"),
                ("INDEX_ON_STARTUP", "true"),
                ("LOCK_STALE_SECS", ""),
            ]))
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.audio_dir, "/a:A,/b");
        assert_eq!(config.db_path, "/data/x.db");
        assert_eq!(config.index_schedule, "@every 10m");
        assert_eq!(config.cache_ttl(), Duration::ZERO);
        assert!(config.index_on_startup);
        assert_eq!(config.lock_stale_secs, 3600);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn relative_audio_dirs_resolve_against_config() {
        let config_path = Path::new("/srv/share/config.yaml");
        assert_eq!(
            resolve_audio_dirs(config_path, "music:Music, /abs/podcasts ,"),
            "/srv/share/music:Music,/abs/podcasts"
        );
    }
}
