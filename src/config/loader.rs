//! Configuration resolution at startup.
//!
//! The broker takes at most one config source: an explicit TOML file, or
//! the built-in defaults when none is given. Both paths go through the same
//! semantic validation, so a broker that starts is always running a config
//! that would also have validated from disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::BrokerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why the startup configuration could not be resolved.
#[derive(Debug)]
pub struct ConfigError {
    /// The file involved, when the failure came from disk.
    path: Option<PathBuf>,
    kind: ConfigErrorKind,
}

#[derive(Debug)]
enum ConfigErrorKind {
    Read(std::io::Error),
    Parse(toml::de::Error),
    Invalid(Vec<ValidationError>),
}

impl ConfigError {
    fn reading(path: &Path, err: std::io::Error) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            kind: ConfigErrorKind::Read(err),
        }
    }

    fn parsing(path: &Path, err: toml::de::Error) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            kind: ConfigErrorKind::Parse(err),
        }
    }

    fn invalid(path: Option<&Path>, errors: Vec<ValidationError>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            kind: ConfigErrorKind::Invalid(errors),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: ", path.display())?;
        }
        match &self.kind {
            ConfigErrorKind::Read(err) => write!(f, "cannot read config: {err}"),
            ConfigErrorKind::Parse(err) => write!(f, "cannot parse config: {err}"),
            ConfigErrorKind::Invalid(errors) => {
                write!(f, "config rejected with {} problem(s):", errors.len())?;
                for err in errors {
                    write!(f, "\n  - {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ConfigErrorKind::Read(err) => Some(err),
            ConfigErrorKind::Parse(err) => Some(err),
            ConfigErrorKind::Invalid(_) => None,
        }
    }
}

/// Resolve the startup configuration.
///
/// With a path, reads and parses that TOML file; without one, starts from
/// `BrokerConfig::default()`. Either way the result must pass
/// `validate_config` before the broker will bind a socket with it.
pub fn resolve_config(path: Option<&Path>) -> Result<BrokerConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content =
                fs::read_to_string(path).map_err(|err| ConfigError::reading(path, err))?;
            toml::from_str(&content).map_err(|err| ConfigError::parsing(path, err))?
        }
        None => BrokerConfig::default(),
    };

    validate_config(&config).map_err(|errors| ConfigError::invalid(path, errors))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scratch file dropped on test exit.
    struct TempConfig(PathBuf);

    impl TempConfig {
        fn write(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!("burrow-{name}-{}.toml", std::process::id()));
            fs::write(&path, content).unwrap();
            Self(path)
        }
    }

    impl Drop for TempConfig {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_no_path_yields_validated_defaults() {
        let config = resolve_config(None).unwrap();
        assert_eq!(config.listener.port, 3000);
    }

    #[test]
    fn test_file_overrides_are_applied() {
        let file = TempConfig::write(
            "overrides",
            r#"
            [listener]
            port = 4100

            [rate_limit]
            max_requests_per_minute = 7
            "#,
        );
        let config = resolve_config(Some(&file.0)).unwrap();
        assert_eq!(config.listener.port, 4100);
        assert_eq!(config.rate_limit.max_requests_per_minute, 7);
        // Untouched sections keep their defaults.
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_missing_file_error_names_the_path() {
        let err = resolve_config(Some(Path::new("/nonexistent/burrow.toml"))).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("/nonexistent/burrow.toml"));
        assert!(rendered.contains("cannot read config"));
    }

    #[test]
    fn test_parse_failure_is_not_a_validation_failure() {
        let file = TempConfig::write("garbled", "listener = not-a-table");
        let err = resolve_config(Some(&file.0)).unwrap_err();
        assert!(err.to_string().contains("cannot parse config"));
    }

    #[test]
    fn test_invalid_file_lists_every_problem() {
        // require_auth with both placeholder credentials: two problems.
        let file = TempConfig::write(
            "placeholder-creds",
            r#"
            [auth]
            require_auth = true
            "#,
        );
        let err = resolve_config(Some(&file.0)).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("2 problem(s)"));
        assert!(rendered.contains("admin_password"));
        assert!(rendered.contains("token_secret"));
    }
}
