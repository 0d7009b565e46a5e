//! Control commands and their replies.

use super::{Node, Signature};
use crate::format::FlowFormat;

/// A control command sent to a node.
///
/// Generic commands are understood by every node (the runtime answers
/// `SetOutput`, `GetOutput` and `GetFlowFormat` itself when the node's
/// behavior leaves them unhandled). Commands specific to a node type travel
/// as [`Command::Local`], namespaced by the type's [`Signature`] so wrapper
/// nodes can pass them along without misinterpreting them.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Command {
    /// Replace the output link (`None` detaches it).
    SetOutput(Option<Node>),
    /// Query the output link.
    GetOutput,
    /// Announce the flow format of the buffers that will follow.
    ///
    /// A node refusing the format answers with
    /// [`Error::Refused`](crate::Error::Refused).
    SetFlowFormat(FlowFormat),
    /// Query the node's current output flow format.
    GetFlowFormat,
    /// Query the maximum number of buffers a node can hold.
    GetMaxLength,
    /// Query the number of buffers a node holds (advisory).
    GetLength,
    /// Release buffers the node is holding back.
    Flush,
    /// Command private to the node type owning `signature`.
    Local {
        /// Node type the command belongs to.
        signature: Signature,
        /// Command identifier within that node type.
        id: u32,
        /// Argument.
        arg: CommandArg,
    },
}

impl Command {
    /// Build a node-type-specific command.
    pub fn local(signature: Signature, id: u32, arg: CommandArg) -> Self {
        Self::Local { signature, id, arg }
    }

    /// If this is a local command of node type `signature`, get its id and argument.
    pub fn local_for(&self, signature: Signature) -> Option<(u32, &CommandArg)> {
        match self {
            Self::Local {
                signature: sig,
                id,
                arg,
            } if *sig == signature => Some((*id, arg)),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetOutput(_) => "set_output",
            Self::GetOutput => "get_output",
            Self::SetFlowFormat(_) => "set_flow_format",
            Self::GetFlowFormat => "get_flow_format",
            Self::GetMaxLength => "get_max_length",
            Self::GetLength => "get_length",
            Self::Flush => "flush",
            Self::Local { .. } => "local",
        }
    }
}

/// Argument of a [`Command::Local`] or manager command.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CommandArg {
    /// No argument.
    #[default]
    None,
    /// Integer argument.
    Int(u64),
    /// Text argument.
    Text(String),
    /// Flow format argument.
    Format(FlowFormat),
}

/// Value returned by a handled command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Command applied, nothing to return.
    Done,
    /// Answer to [`Command::GetOutput`].
    Output(Option<Node>),
    /// Answer to [`Command::GetFlowFormat`].
    Format(Option<FlowFormat>),
    /// Numeric answer (lengths, counters).
    Value(u64),
    /// Text answer.
    Text(String),
}

impl Reply {
    /// Numeric payload, if any.
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// Outcome of a control command.
///
/// `Unhandled` is a normal result: delegation chains use it to try the next
/// handler.
#[derive(Debug, Clone)]
pub enum ControlResult {
    /// The command was recognized and applied.
    Handled(Reply),
    /// The command is not known to this handler.
    Unhandled,
}

impl ControlResult {
    /// Shorthand for `Handled(Reply::Done)`.
    pub const DONE: Self = Self::Handled(Reply::Done);

    /// Check whether the command was recognized.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// Get the reply of a handled command.
    pub fn reply(self) -> Option<Reply> {
        match self {
            Self::Handled(reply) => Some(reply),
            Self::Unhandled => None,
        }
    }
}
