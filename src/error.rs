use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job `{job}` has no tunnel to fail into: {reason}")]
    NoTunnel { job: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to scan folder: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Error)]
pub enum NestError {
    #[error("Nest `{0}` is not registered to a tunnel")]
    Unregistered(String),

    #[error("Nest `{nest}` is already registered to tunnel `{tunnel}`")]
    AlreadyRegistered { nest: String, tunnel: String },

    #[error("Nest `{0}` cannot take jobs")]
    NotASink(String),

    #[error("Job `{0}` has no backing asset to move")]
    NoBackingAsset(String),

    #[error("Destination already exists: {0}")]
    DestinationExists(String),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Nest error: {0}")]
    Nest(#[from] NestError),
}

#[derive(Debug, Error)]
pub enum PackError {
    #[error("Archive has no ticket entry")]
    MissingTicket,

    #[error("Ticket could not be parsed: {0}")]
    InvalidTicket(String),

    #[error("Ticket has unrecognized job kind `{0}`")]
    UnknownKind(String),

    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("Refusing unsafe archive entry `{0}`")]
    UnsafeEntry(String),

    #[error("Job `{0}` has no archive to unpack")]
    NotPacked(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The reason a stage gave up on a job.
///
/// Stages return this instead of throwing; the tunnel turns it into a single
/// failure dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct StageError {
    pub reason: String,
}

impl StageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<&str> for StageError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for StageError {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<PackError> for StageError {
    fn from(err: PackError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<NestError> for StageError {
    fn from(err: NestError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<JobError> for StageError {
    fn from(err: JobError) -> Self {
        Self::new(err.to_string())
    }
}
