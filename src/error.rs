//! Error types for pipework.

use crate::node::Signature;
use crate::request::ResourceKind;
use thiserror::Error;

/// Result type alias using pipework's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for runtime operations.
///
/// An unrecognized command or event is not an error: see
/// [`ControlResult::Unhandled`](crate::node::ControlResult) and
/// [`ProbeOutcome::Unhandled`](crate::event::ProbeOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The backing allocator could not provide memory.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// No probe in the chain claimed a resource request.
    #[error("resource unavailable: {0:?}")]
    ResourceUnavailable(ResourceKind),

    /// A probe provided a resource of the wrong kind.
    #[error("resource mismatch: requested {expected:?}, provided {provided:?}")]
    ResourceMismatch {
        /// Kind carried by the request.
        expected: ResourceKind,
        /// Kind of the resource that was offered.
        provided: ResourceKind,
    },

    /// A second probe tried to answer an already answered request.
    #[error("resource request for {0:?} was already answered")]
    AlreadyProvided(ResourceKind),

    /// The cross-thread queue is at capacity.
    #[error("queue is full")]
    QueueFull,

    /// The cross-thread queue no longer accepts buffers.
    #[error("queue is closed")]
    QueueClosed,

    /// A downstream node refused a flow format.
    #[error("flow format refused: {0}")]
    Refused(String),

    /// `allocate` was called with a signature the manager does not own.
    #[error("signature mismatch: manager is {expected}, got {got}")]
    SignatureMismatch {
        /// Signature of the manager.
        expected: Signature,
        /// Signature passed by the caller.
        got: Signature,
    },

    /// A node was entered while it was already dispatching.
    #[error("node {0} is already dispatching")]
    Reentrant(String),

    /// A usage contract of the runtime was broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not supported by this node type.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
