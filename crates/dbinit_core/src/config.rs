//! Connection settings resolved from the process environment.
//!
//! # Responsibility
//! - Load an optional dotenv-style settings file before the environment is read.
//! - Resolve root credentials and the fixed connection target.
//!
//! # Invariants
//! - Variables already present in the process environment win over the file.
//! - The password never appears in `Debug` output or log events.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const USERNAME_VAR: &str = "MONGO_INITDB_ROOT_USERNAME";
pub const PASSWORD_VAR: &str = "MONGO_INITDB_ROOT_PASSWORD";

/// Docker Compose service name of the database container.
pub const DEFAULT_HOST: &str = "mongodb";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_AUTH_SOURCE: &str = "admin";
pub const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidPort(String),
    EnvFile {
        path: Option<PathBuf>,
        source: dotenvy::Error,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "environment variable {name} is not set"),
            Self::InvalidPort(value) => write!(f, "invalid port `{value}`"),
            Self::EnvFile {
                path: Some(path),
                source,
            } => write!(f, "failed to load env file `{}`: {source}", path.display()),
            Self::EnvFile { path: None, source } => write!(f, "failed to load .env: {source}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EnvFile { source, .. } => Some(source),
            Self::MissingVar(_) | Self::InvalidPort(_) => None,
        }
    }
}

/// Loads a settings file into the process environment without overriding.
///
/// Returns the path that was loaded, or `None` when no `.env` was found while
/// searching implicitly.
///
/// # Errors
/// - An explicit `path` that cannot be read or parsed.
/// - An implicitly found `.env` that cannot be parsed.
pub fn load_env_file(path: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
                path: Some(path.to_path_buf()),
                source,
            })?;
            info!(
                "event=env_file_load module=config status=ok path={}",
                path.display()
            );
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => {
                info!(
                    "event=env_file_load module=config status=ok path={}",
                    found.display()
                );
                Ok(Some(found))
            }
            Err(err) if err.not_found() => {
                info!("event=env_file_load module=config status=skipped reason=not_found");
                Ok(None)
            }
            Err(source) => Err(ConfigError::EnvFile { path: None, source }),
        },
    }
}

/// Everything needed to reach and authenticate against the database server.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: String,
    pub server_selection_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            auth_source: DEFAULT_AUTH_SOURCE.to_string(),
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
        }
    }
}

impl Debug for ConnectionSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_source", &self.auth_source)
            .field("server_selection_timeout", &self.server_selection_timeout)
            .finish()
    }
}

impl ConnectionSettings {
    /// Reads credentials from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads credentials through `lookup`; empty values count as unset.
    ///
    /// # Errors
    /// - Only one of username/password is set.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let username = read(USERNAME_VAR);
        let password = read(PASSWORD_VAR);

        match (&username, &password) {
            (Some(_), None) => return Err(ConfigError::MissingVar(PASSWORD_VAR)),
            (None, Some(_)) => return Err(ConfigError::MissingVar(USERNAME_VAR)),
            (None, None) => {
                warn!("event=config_load module=config status=ok auth=none reason=credentials_unset");
            }
            (Some(_), Some(_)) => {}
        }

        Ok(Self {
            username,
            password,
            ..Self::default()
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// # Errors
    /// - `port` is zero.
    pub fn with_port(mut self, port: u16) -> ConfigResult<Self> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port.to_string()));
        }
        self.port = port;
        Ok(self)
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    /// `host:port` label used in logs and progress output.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
