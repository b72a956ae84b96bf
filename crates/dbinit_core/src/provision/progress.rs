use super::ProvisionError;
use crate::store::StoreError;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// One human-facing step of a provisioning run.
#[derive(Debug)]
pub enum Progress<'a> {
    ConnectAttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: &'a StoreError,
        /// `None` after the final attempt.
        retry_in: Option<Duration>,
    },
    Connected {
        attempt: u32,
    },
    ConnectionExhausted {
        attempts: u32,
    },
    CollectionCreated(&'a str),
    CollectionExists(&'a str),
    IndexesEnsured(&'a str),
    Complete,
    Failed(&'a ProvisionError),
    ConnectionClosed,
}

impl Display for Progress<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectAttemptFailed {
                attempt,
                max_attempts,
                error,
                retry_in: Some(delay),
            } => write!(
                f,
                "Connection failed (attempt {attempt}/{max_attempts}): {error}. Retrying in {} seconds...",
                delay.as_secs()
            ),
            Self::ConnectAttemptFailed {
                attempt,
                max_attempts,
                error,
                retry_in: None,
            } => write!(f, "Connection failed (attempt {attempt}/{max_attempts}): {error}."),
            Self::Connected { .. } => f.write_str("MongoDB connection successful."),
            Self::ConnectionExhausted { .. } => {
                f.write_str("Could not connect to MongoDB after several attempts. Exiting.")
            }
            Self::CollectionCreated(name) => write!(f, "Collection '{name}' created."),
            Self::CollectionExists(name) => write!(f, "Collection '{name}' already exists."),
            Self::IndexesEnsured(name) => {
                write!(f, "Indexes created/ensured for '{name}' collection.")
            }
            Self::Complete => f.write_str("Database initialization complete!"),
            Self::Failed(err) => {
                write!(f, "An error occurred during database initialization: {err}")
            }
            Self::ConnectionClosed => f.write_str("MongoDB connection closed."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Progress;
    use crate::store::StoreError;
    use std::time::Duration;

    #[test]
    fn retry_line_names_attempt_and_delay() {
        let error = StoreError::Unreachable("timeout".to_string());
        let line = Progress::ConnectAttemptFailed {
            attempt: 2,
            max_attempts: 5,
            error: &error,
            retry_in: Some(Duration::from_secs(10)),
        }
        .to_string();

        assert_eq!(
            line,
            "Connection failed (attempt 2/5): server unreachable: timeout. Retrying in 10 seconds..."
        );
    }

    #[test]
    fn collection_lines_quote_the_name() {
        assert_eq!(
            Progress::CollectionExists("users").to_string(),
            "Collection 'users' already exists."
        );
    }
}
