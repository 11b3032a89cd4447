/// Error types for corpus ingestion and mirror maintenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    /// File system error, with the path it happened on
    Io(String),
    /// Translation store could not be opened, read or written
    Store(String),
    /// A Go source file could not be parsed
    Parse(String),
    /// A corpus file could not be read or segmented
    Corpus(String),
    /// The file system notifier failed or its channel closed
    Watch(String),
    /// An upstream pull failed
    Pull(String),
    /// Invalid configuration
    Config(String),
    /// A package path that does not name a directory below a source root
    Package(String),
    /// The external source formatter rejected its input
    Format(String),
}

impl DocError {
    /// Build an `Io` error carrying the path that failed
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        DocError::Io(format!("{}: {}", path.display(), err))
    }
}

impl std::fmt::Display for DocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::Io(msg) => write!(f, "I/O error: {}", msg),
            DocError::Store(msg) => write!(f, "Store error: {}", msg),
            DocError::Parse(msg) => write!(f, "Parse error: {}", msg),
            DocError::Corpus(msg) => write!(f, "Corpus error: {}", msg),
            DocError::Watch(msg) => write!(f, "Watch error: {}", msg),
            DocError::Pull(msg) => write!(f, "Pull error: {}", msg),
            DocError::Config(msg) => write!(f, "Config error: {}", msg),
            DocError::Package(msg) => write!(f, "Invalid package: {}", msg),
            DocError::Format(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl std::error::Error for DocError {}

impl From<sled::Error> for DocError {
    fn from(err: sled::Error) -> Self {
        DocError::Store(err.to_string())
    }
}

impl From<notify::Error> for DocError {
    fn from(err: notify::Error) -> Self {
        DocError::Watch(err.to_string())
    }
}

/// Result type for ingestion and conversion operations
pub type DocResult<T> = Result<T, DocError>;
