use opal_interfaces::{ExecutionError, ProviderError};

/// Faults surfaced on the RPC-error channel, as opposed to chain-semantic rejections which
/// travel inside a `PayloadStatus`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request parameters were well-formed JSON but semantically unacceptable.
    #[error("{0}")]
    InvalidParams(String),
    /// No in-flight build (or blob bundle) exists for the given payload id.
    #[error("Unknown payload")]
    UnknownPayload,
    /// A referenced forkchoice block cannot be resolved against canonical storage.
    #[error("{0} block not available")]
    ChainUnresolvable(&'static str),
    /// Chain storage failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Execution collaborator failure outside of block validation.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// Anything else; reported as an internal JSON-RPC error.
    #[error("{0}")]
    Internal(String),
}
