use thiserror::Error;

/// Stable error taxonomy for the whole crate. Every fallible operation in the
/// public API resolves to one of these variants; nothing here is retried.
#[derive(Debug, Error)]
pub enum PhdiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed XML at byte offset {offset}: {detail}")]
    MalformedXml { offset: usize, detail: String },

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("corrupt image: {0}")]
    CorruptImage(String),

    #[error("dangling reference to GUID {guid}")]
    DanglingReference { guid: String },

    #[error("cycle detected at GUID {guid}")]
    CycleDetected { guid: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, PhdiError>;

impl From<uuid::Error> for PhdiError {
    fn from(err: uuid::Error) -> Self {
        PhdiError::MalformedDescriptor(format!("invalid GUID: {err}"))
    }
}
