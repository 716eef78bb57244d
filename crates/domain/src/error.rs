/// Shared error type used across all murmur crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A value the turn needs (user id, conversation id, chat type) was
    /// never attached to the turn context. Always a wiring defect.
    #[error("turn context is missing {0}")]
    ContextMissing(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    /// The stored generation moved on between load and save.
    #[error("history conflict on {conversation_id}: expected generation {expected}, found {actual}")]
    Conflict {
        conversation_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("{service}: {message}")]
    Dependency {
        service: &'static str,
        message: String,
    },

    #[error("turn cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("{}", render_aggregate(.0))]
    Aggregate(Vec<Error>),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn dependency(service: &'static str, message: impl Into<String>) -> Self {
        Self::Dependency {
            service,
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn render_aggregate(errors: &[Error]) -> String {
    let joined = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} error(s): {joined}", errors.len())
}

pub type Result<T> = std::result::Result<T, Error>;
