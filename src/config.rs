//! Connection configuration loaded from the process environment.

use std::path::{Path, PathBuf};

/// Environment variable holding the push API event-stream URL.
pub const PUSH_API_URL: &str = "PUSH_API_URL";

/// Environment variable holding the value sent verbatim as the `Authorization` header.
pub const COCO_API_AUTHORIZATION: &str = "COCO_API_AUTHORIZATION";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("{0} env var missing")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// The URL is not an absolute http(s) URL.
    #[error("{var} is not a valid http(s) URL: {reason}")]
    InvalidUrl { var: String, reason: String },
}

/// Target URL and authorization token for the stream connection.
///
/// Built once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    url: String,
    authorization: String,
}

impl ConnectionConfig {
    /// Create a configuration from explicit values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyValue`] if either value is empty, and
    /// [`ConfigError::InvalidUrl`] if the URL does not parse or is not http(s).
    pub fn new(url: impl Into<String>, authorization: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let authorization = authorization.into();
        if url.is_empty() {
            return Err(ConfigError::EmptyValue(PUSH_API_URL.to_string()));
        }
        validate_url(&url)?;
        if authorization.is_empty() {
            return Err(ConfigError::EmptyValue(COCO_API_AUTHORIZATION.to_string()));
        }
        Ok(Self { url, authorization })
    }

    /// Load configuration from `PUSH_API_URL` and `COCO_API_AUTHORIZATION`.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is unset, empty, or the URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env). Missing keys are reported URL first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url =
            lookup(PUSH_API_URL).ok_or_else(|| ConfigError::MissingEnvVar(PUSH_API_URL.to_string()))?;
        let authorization = lookup(COCO_API_AUTHORIZATION)
            .ok_or_else(|| ConfigError::MissingEnvVar(COCO_API_AUTHORIZATION.to_string()))?;

        Self::new(url, authorization)
    }

    /// The event-stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The raw `Authorization` header value.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("authorization", &"[REDACTED]")
            .finish()
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        var: PUSH_API_URL.to_string(),
        reason,
    };
    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

/// The first `.env` file found in `start` or one of its ancestors.
fn find_dotenv(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|path| path.is_file())
}

/// Load the nearest `.env` file, searching from the working directory upwards.
///
/// Variables already present in the environment are left untouched. Returns the
/// path that was loaded, or `None` if there is no `.env` file.
///
/// # Errors
///
/// Returns an error if the working directory is unreadable or the file cannot be parsed.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    let cwd = std::env::current_dir().map_err(dotenvy::Error::Io)?;
    let Some(path) = find_dotenv(&cwd) else {
        return Ok(None);
    };
    dotenvy::from_path(&path)?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn loads_both_variables() {
        let config = ConnectionConfig::from_lookup(lookup(&[
            (PUSH_API_URL, "https://push.example.com/events"),
            (COCO_API_AUTHORIZATION, "Bearer abc"),
        ]))
        .unwrap();

        assert_eq!(config.url(), "https://push.example.com/events");
        assert_eq!(config.authorization(), "Bearer abc");
    }

    #[test]
    fn missing_url_is_reported_first() {
        let err = ConnectionConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar(PUSH_API_URL.to_string()));
        assert_eq!(err.to_string(), "PUSH_API_URL env var missing");
    }

    #[test]
    fn missing_authorization() {
        let err = ConnectionConfig::from_lookup(lookup(&[(PUSH_API_URL, "http://localhost")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvVar(COCO_API_AUTHORIZATION.to_string())
        );
    }

    #[test]
    fn empty_values_are_rejected() {
        let err = ConnectionConfig::from_lookup(lookup(&[
            (PUSH_API_URL, ""),
            (COCO_API_AUTHORIZATION, "token"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue(PUSH_API_URL.to_string()));

        let err = ConnectionConfig::new("http://localhost", "").unwrap_err();
        assert_eq!(
            err,
            ConfigError::EmptyValue(COCO_API_AUTHORIZATION.to_string())
        );
    }

    #[test]
    fn unparseable_url_is_a_config_error() {
        let err = ConnectionConfig::new("not a url", "token").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidUrl { ref var, .. } if var == PUSH_API_URL
        ));

        let err = ConnectionConfig::from_lookup(lookup(&[
            (PUSH_API_URL, "ftp://push.example.com/events"),
            (COCO_API_AUTHORIZATION, "token"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme `ftp`"));
    }

    #[test]
    fn dotenv_is_found_in_an_ancestor() {
        let root = std::env::temp_dir().join(format!("push-api-client-dotenv-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(".env"), "PUSH_API_URL=http://localhost\n").unwrap();

        assert_eq!(find_dotenv(&nested), Some(root.join(".env")));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn debug_redacts_token() {
        let config = ConnectionConfig::new("http://localhost", "secret-token").unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));
    }
}
