use thiserror::Error;

/// Failure kinds raised while moving device data from source to sink.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("{store} store is unavailable: {reason}")]
    ConnectionUnavailable { store: String, reason: String },

    #[error("cannot connect to {store} store: {reason}")]
    Connection { store: String, reason: String },

    #[error("record for device '{device_id}' has malformed {field}: {reason}")]
    Parse {
        device_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[allow(dead_code)]
    #[error("failed to close {store} store: {reason}")]
    Close { store: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Whether retrying the same connection attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::ConnectionUnavailable { .. })
    }

    /// Maps a connect failure onto the transient or fatal variant.
    pub fn from_connect(store: &str, err: sqlx::Error) -> Self {
        let reason = err.to_string();
        if is_retryable_connect_error(&err) {
            EtlError::ConnectionUnavailable {
                store: store.to_string(),
                reason,
            }
        } else {
            EtlError::Connection {
                store: store.to_string(),
                reason,
            }
        }
    }
}

/// Classifies sqlx connect errors as "server not reachable yet".
///
/// Network and pool errors are retryable. Malformed connection strings,
/// missing drivers and similar configuration mistakes are not.
pub fn is_retryable_connect_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        // Servers that are still starting up reject logins for a while.
        sqlx::Error::Database(db) => {
            let message = db.message().to_lowercase();
            ["starting up", "shutting down", "too many connections"]
                .iter()
                .any(|p| message.contains(p))
        }
        _ => false,
    }
}
