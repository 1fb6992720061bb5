//! Error types and handling for the orbit message bus

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, OrbitError>;

/// Error kinds surfaced by the bus core
#[derive(Debug, thiserror::Error)]
pub enum OrbitError {
    /// Unknown topic metadata or missing node
    #[error("topic not found: {topic}")]
    NotFound { topic: String },

    /// Invalid parameters (wrong payload size, bad instance, malformed input)
    #[error("invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Operation not permitted on this handle (e.g. write on a subscriber)
    #[error("operation not permitted: {message}")]
    Permission { message: String },

    /// A node with an advertiser already exists at this (topic, instance)
    #[error("topic already advertised: {topic} instance {instance}")]
    Exists { topic: String, instance: usize },

    /// Queue sizing attempted after the first publish locked it
    #[error("queue size locked after first publish: {topic}")]
    AlreadyStarted { topic: String },

    /// Nothing new for this subscriber
    #[error("no unseen data available")]
    NoData,

    /// I/O related errors (rules file loading, short transfers)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Resource exhaustion (poll-set growth, instance table full)
    #[error("out of resources: {message}")]
    NoMem { message: String },
}

impl OrbitError {
    /// Create a not-found error
    pub fn not_found(topic: impl Into<String>) -> Self {
        Self::NotFound {
            topic: topic.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a permission error
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create an exists error
    pub fn exists(topic: impl Into<String>, instance: usize) -> Self {
        Self::Exists {
            topic: topic.into(),
            instance,
        }
    }

    /// Create an already-started error
    pub fn already_started(topic: impl Into<String>) -> Self {
        Self::AlreadyStarted {
            topic: topic.into(),
        }
    }

    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an out-of-resources error
    pub fn no_mem(message: impl Into<String>) -> Self {
        Self::NoMem {
            message: message.into(),
        }
    }

    /// Classic errno value for the host boundary.
    ///
    /// Embedders exposing a C-style surface return `-1` with this value; the
    /// Rust API keeps the typed variants.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,          // ENOENT
            Self::InvalidParameter { .. } => 22, // EINVAL
            Self::Permission { .. } => 1,        // EPERM
            Self::Exists { .. } => 17,           // EEXIST
            Self::AlreadyStarted { .. } => 16,   // EBUSY
            Self::NoData => 11,                  // EAGAIN
            Self::Io { .. } => 5,                // EIO
            Self::NoMem { .. } => 12,            // ENOMEM
        }
    }
}

impl From<std::io::Error> for OrbitError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}
