//! Configuration loading and resolution for Parley.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! this crate; [`Settings`] is the resolved form handed to the rest of the
//! application. Resolution order, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. `~/.config/parley/config.toml`
//! 3. `PARLEY_*` environment variables
//!
//! Configuration problems never abort startup. A malformed file or an
//! incomplete Firebase bundle logs a warning and degrades: the application
//! starts unconfigured (anonymous) and sign-in fails fast with a
//! descriptive error instead of a doomed network call.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Default backend address for local development, matching the backend's
/// default uvicorn bind.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Identity-provider configuration bundle.
///
/// Existence of this struct is proof the bundle is complete: an absent or
/// empty API key resolves to `Settings::firebase == None` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseSettings {
    /// Web API key passed as the `key` query parameter on every
    /// Identity Toolkit call.
    pub api_key: String,
}

/// Fully resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base address of the platform backend.
    pub api_base_url: Url,
    /// Identity-provider bundle; `None` means "run unconfigured".
    pub firebase: Option<FirebaseSettings>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Optional bound on waiting for session restoration before a request
    /// fails outright. `None` preserves the unbounded wait.
    pub ready_timeout: Option<Duration>,
    /// Override for the persisted-session file location (tests, mostly).
    pub session_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            firebase: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            ready_timeout: None,
            session_file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
    ready_timeout_secs: Option<u64>,
    session_file: Option<PathBuf>,
    #[serde(default)]
    firebase: RawFirebase,
}

#[derive(Debug, Default, Deserialize)]
struct RawFirebase {
    api_key: Option<String>,
}

/// Path of the user config file, if a config directory exists on this
/// platform.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
}

/// Load settings from the default config file plus process environment.
#[must_use]
pub fn load() -> Settings {
    let raw = config_path().map_or_else(RawSettings::default, |path| read_raw(&path));
    resolve(raw, &env_snapshot())
}

/// Load settings from an explicit file plus process environment.
#[must_use]
pub fn load_from(path: &std::path::Path) -> Settings {
    resolve(read_raw(path), &env_snapshot())
}

fn read_raw(path: &std::path::Path) -> RawSettings {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RawSettings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read config file: {e}");
            return RawSettings::default();
        }
    };
    match toml::from_str(&contents) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Malformed config file, using defaults: {e}");
            RawSettings::default()
        }
    }
}

/// Environment overrides, captured once so resolution is a pure function.
#[derive(Debug, Default)]
struct EnvOverrides {
    api_url: Option<String>,
    firebase_api_key: Option<String>,
    session_file: Option<String>,
    ready_timeout_secs: Option<String>,
}

fn env_snapshot() -> EnvOverrides {
    EnvOverrides {
        api_url: std::env::var("PARLEY_API_URL").ok(),
        firebase_api_key: std::env::var("PARLEY_FIREBASE_API_KEY").ok(),
        session_file: std::env::var("PARLEY_SESSION_FILE").ok(),
        ready_timeout_secs: std::env::var("PARLEY_READY_TIMEOUT_SECS").ok(),
    }
}

fn resolve(raw: RawSettings, env: &EnvOverrides) -> Settings {
    let defaults = Settings::default();

    let api_base_url = env
        .api_url
        .clone()
        .or(raw.api_url)
        .and_then(|s| match Url::parse(&s) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Ignoring invalid api_url {s:?}: {e}");
                None
            }
        })
        .unwrap_or(defaults.api_base_url);

    let api_key = env
        .firebase_api_key
        .clone()
        .or(raw.firebase.api_key)
        .filter(|key| !key.trim().is_empty());
    let firebase = api_key.map(|api_key| FirebaseSettings { api_key });
    if firebase.is_none() {
        tracing::warn!("Firebase is not configured; starting in anonymous mode");
    }

    let ready_timeout = env
        .ready_timeout_secs
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .or(raw.ready_timeout_secs)
        .map(Duration::from_secs);

    Settings {
        api_base_url,
        firebase,
        request_timeout: raw
            .request_timeout_secs
            .map_or(defaults.request_timeout, Duration::from_secs),
        ready_timeout,
        session_file: env
            .session_file
            .clone()
            .map(PathBuf::from)
            .or(raw.session_file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_unconfigured() {
        let settings = resolve(RawSettings::default(), &EnvOverrides::default());
        assert_eq!(settings.api_base_url.as_str(), "http://localhost:8000/");
        assert!(settings.firebase.is_none());
        assert!(settings.ready_timeout.is_none());
    }

    #[test]
    fn file_values_resolve() {
        let file = write_config(
            r#"
            api_url = "https://api.example.com"
            request_timeout_secs = 5
            ready_timeout_secs = 10

            [firebase]
            api_key = "AIzaTest"
            "#,
        );
        let raw = read_raw(file.path());
        let settings = resolve(raw, &EnvOverrides::default());
        assert_eq!(settings.api_base_url.as_str(), "https://api.example.com/");
        assert_eq!(
            settings.firebase,
            Some(FirebaseSettings {
                api_key: "AIzaTest".into()
            })
        );
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.ready_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn env_overrides_file() {
        let file = write_config(
            r#"
            api_url = "https://file.example.com"

            [firebase]
            api_key = "file-key"
            "#,
        );
        let env = EnvOverrides {
            api_url: Some("https://env.example.com".into()),
            firebase_api_key: Some("env-key".into()),
            ..EnvOverrides::default()
        };
        let settings = resolve(read_raw(file.path()), &env);
        assert_eq!(settings.api_base_url.as_str(), "https://env.example.com/");
        assert_eq!(settings.firebase.unwrap().api_key, "env-key");
    }

    #[test]
    fn blank_api_key_means_unconfigured() {
        let file = write_config("[firebase]\napi_key = \"   \"\n");
        let settings = resolve(read_raw(file.path()), &EnvOverrides::default());
        assert!(settings.firebase.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let file = write_config("api_url = [not toml");
        let settings = resolve(read_raw(file.path()), &EnvOverrides::default());
        assert_eq!(settings.api_base_url.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn invalid_api_url_is_ignored() {
        let file = write_config("api_url = \"not a url\"\n");
        let settings = resolve(read_raw(file.path()), &EnvOverrides::default());
        assert_eq!(settings.api_base_url.as_str(), "http://localhost:8000/");
    }
}
