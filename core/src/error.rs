use thiserror::Error;

/// Discriminant of a [`LoadError`], for callers that branch on the kind of
/// failure rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ReferenceParse,
    GithubNeedsLogin,
    NeedsLogin,
    RemoteFetch,
    Serialization,
    LoadTransport,
    ResponseRead,
    Daemon,
    Timeout,
    Config,
    Credential,
    Io,
    Json,
}

/// imgload error types
#[derive(Error, Debug)]
pub enum LoadError {
    /// Image reference could not be parsed
    #[error("parsing reference: {0}")]
    ReferenceParse(String),

    /// GitHub's Docker registry requires a login for this image.
    ///
    /// Carries the registry's message verbatim.
    #[error("{0}")]
    GithubNeedsLogin(String),

    /// The registry answered UNAUTHORIZED.
    ///
    /// Carries the registry's message verbatim.
    #[error("{0}")]
    NeedsLogin(String),

    /// Any other failure while fetching the remote image
    #[error("getting remote image: {0}")]
    RemoteFetch(String),

    /// Producing the image archive failed
    #[error("serializing image archive: {0}")]
    Serialization(String),

    /// The daemon load call could not be started
    #[error("error loading image: {0}")]
    LoadTransport(String),

    /// The load call started but its response body could not be read in full.
    ///
    /// `partial` holds whatever text was read before the failure.
    #[error("error reading load response body: {message}")]
    ResponseRead { partial: String, message: String },

    /// Daemon answered with a non-success status
    #[error("daemon returned {status}: {message}")]
    Daemon { status: u16, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential store error
    #[error("Credential error: {0}")]
    Credential(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON or YAML (de)serialization error
    #[error("Serialization error: {0}")]
    Json(String),

    /// `source` with the step that failed in front of it
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        source: Box<LoadError>,
    },
}

impl LoadError {
    /// Kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::ReferenceParse(_) => ErrorKind::ReferenceParse,
            LoadError::GithubNeedsLogin(_) => ErrorKind::GithubNeedsLogin,
            LoadError::NeedsLogin(_) => ErrorKind::NeedsLogin,
            LoadError::RemoteFetch(_) => ErrorKind::RemoteFetch,
            LoadError::Serialization(_) => ErrorKind::Serialization,
            LoadError::LoadTransport(_) => ErrorKind::LoadTransport,
            LoadError::ResponseRead { .. } => ErrorKind::ResponseRead,
            LoadError::Daemon { .. } => ErrorKind::Daemon,
            LoadError::Timeout(_) => ErrorKind::Timeout,
            LoadError::Config(_) => ErrorKind::Config,
            LoadError::Credential(_) => ErrorKind::Credential,
            LoadError::Io(_) => ErrorKind::Io,
            LoadError::Json(_) => ErrorKind::Json,
            LoadError::Context { source, .. } => source.kind(),
        }
    }

    /// True for both registry login errors.
    pub fn needs_login(&self) -> bool {
        matches!(self.kind(), ErrorKind::GithubNeedsLogin | ErrorKind::NeedsLogin)
    }

    /// Response text read before a body read failure, if any.
    pub fn partial_response(&self) -> Option<&str> {
        match self {
            LoadError::ResponseRead { partial, .. } => Some(partial),
            LoadError::Context { source, .. } => source.partial_response(),
            _ => None,
        }
    }
}

impl LoadError {
    /// Prefix this error with the step that failed. The kind is unchanged.
    pub fn context(self, context: &'static str) -> Self {
        LoadError::Context {
            context,
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(err: serde_yaml::Error) -> Self {
        LoadError::Json(err.to_string())
    }
}

/// Result type alias for imgload operations
pub type Result<T> = std::result::Result<T, LoadError>;
