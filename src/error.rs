use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A version constraint that cannot serve the request, e.g. a range where
    /// a getter needs an exact version.
    #[error("{0}")]
    Constraint(String),

    #[error("failed to get {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The source cannot serve this kind of requirement at all
    #[error("{0}")]
    Unsupported(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("{what}: no source could satisfy the request{}",
            format_attempts(.attempts))]
    ChainExhausted { what: String, attempts: Vec<String> },

    #[error("{0}")]
    Other(String),
}

fn format_attempts(attempts: &[String]) -> String {
    attempts.iter().map(|a| format!("\n  - {}", a)).collect()
}

impl Error {
    /// Whether the next getter in the chain should be asked instead.
    ///
    /// Transport, constraint and unsupported-source failures are local to one
    /// source; everything else is fatal for the requirement being installed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::Http(_)
                | Error::Constraint(_)
                | Error::Unsupported(_)
        )
    }
}
