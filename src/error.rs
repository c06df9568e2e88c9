use crate::types::{DataType, GroupType, Rank};

pub type Result<T> = std::result::Result<T, AdasumError>;

/// Broad failure classes for a reduction call.
///
/// Every [`AdasumError`] variant maps onto exactly one kind; callers that
/// only care about the class (abort the job vs. re-form the group vs. fix
/// the model) can branch on [`AdasumError::kind`] instead of the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Topology or group resolution problems; nothing was sent.
    Configuration,
    /// Cross-worker disagreement about the call's tensor set.
    Protocol,
    /// Communication failure mid-collective; group state is suspect.
    Transport,
    /// Unsupported element type; nothing was sent.
    Numeric,
}

#[derive(Debug, thiserror::Error)]
pub enum AdasumError {
    #[error("worker group {group} is not registered in this context")]
    UnknownGroup { group: GroupType },

    #[error("invalid distributed configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid rank {rank}: group size is {group_size}")]
    InvalidRank { rank: Rank, group_size: u32 },

    #[error("no operator registered under name {name:?}")]
    OpNotRegistered { name: String },

    #[error("tensor set disagrees with rank {rank}: {reason}")]
    DescriptorMismatch { rank: Rank, reason: String },

    #[error("tensor count mismatch: {inputs} inputs vs {outputs} outputs")]
    TensorCountMismatch { inputs: usize, outputs: usize },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("connection to rank {rank} failed: {reason}")]
    ConnectionFailed { rank: Rank, reason: String },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported data type {dtype} for operation {op}")]
    UnsupportedDType { dtype: DataType, op: &'static str },
}

impl AdasumError {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdasumError::UnknownGroup { .. }
            | AdasumError::InvalidConfig { .. }
            | AdasumError::InvalidRank { .. }
            | AdasumError::OpNotRegistered { .. } => ErrorKind::Configuration,

            AdasumError::DescriptorMismatch { .. }
            | AdasumError::TensorCountMismatch { .. }
            | AdasumError::BufferSizeMismatch { .. } => ErrorKind::Protocol,

            AdasumError::ConnectionFailed { .. }
            | AdasumError::PeerDisconnected { .. }
            | AdasumError::CollectiveFailed { .. }
            | AdasumError::Transport { .. }
            | AdasumError::Io(_) => ErrorKind::Transport,

            AdasumError::UnsupportedDType { .. } => ErrorKind::Numeric,
        }
    }

    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }
}
