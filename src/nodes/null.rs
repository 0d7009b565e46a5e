//! Null sink: releases every buffer it receives.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::FlowFormat;
use crate::node::{Command, ControlResult, Manager, Node, NodeBehavior, Reply, Signature};
use crate::sched::SchedContext;

/// Signature of [`NullSinkManager`] nodes.
pub const NULL_SINK: Signature = Signature::fourcc(b"nsnk");

/// Local command: number of buffers received (`Reply::Value`).
pub const NULL_SINK_GET_COUNT: u32 = 0;
/// Local command: number of bytes received (`Reply::Value`).
pub const NULL_SINK_GET_BYTES: u32 = 1;

/// Configuration of a null sink.
#[derive(Debug, Clone, Default)]
pub struct NullSinkConfig {
    /// Accept only flow formats starting with this prefix. `None` accepts all.
    pub accept: Option<String>,
}

impl NullSinkConfig {
    /// Accept every flow format.
    pub fn any() -> Self {
        Self::default()
    }

    /// Accept only flow formats starting with `prefix`.
    pub fn accepting(prefix: impl Into<String>) -> Self {
        Self {
            accept: Some(prefix.into()),
        }
    }
}

/// Manager of null sinks.
///
/// Useful for benchmarking, for testing sources, and for terminating a
/// branch of the graph without side effects.
///
/// # Example
///
/// ```rust
/// use pipework::buffer::Buffer;
/// use pipework::node::{Command, CommandArg, Node};
/// use pipework::nodes::null::{NULL_SINK, NULL_SINK_GET_COUNT, NullSinkConfig, NullSinkManager};
/// use pipework::probe::ProbeChain;
/// use pipework::sched::SchedContext;
/// use std::sync::Arc;
///
/// let sink = Node::allocate(&Arc::new(NullSinkManager), ProbeChain::new(), NULL_SINK, NullSinkConfig::any())?;
/// sink.input(Buffer::from_vec(vec![0; 188]), &mut SchedContext::new())?;
///
/// let count = sink
///     .control(Command::local(NULL_SINK, NULL_SINK_GET_COUNT, CommandArg::None))?
///     .reply()
///     .and_then(|r| r.value());
/// assert_eq!(count, Some(1));
/// # Ok::<(), pipework::Error>(())
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSinkManager;

impl Manager for NullSinkManager {
    type Args = NullSinkConfig;

    fn signature(&self) -> Signature {
        NULL_SINK
    }

    fn name(&self) -> &str {
        "nullsink"
    }

    fn allocate(&self, config: NullSinkConfig) -> Result<Box<dyn NodeBehavior>> {
        Ok(Box::new(NullSink {
            accept: config.accept,
            format: None,
            count: 0,
            bytes: 0,
        }))
    }
}

struct NullSink {
    accept: Option<String>,
    format: Option<FlowFormat>,
    count: u64,
    bytes: u64,
}

impl NodeBehavior for NullSink {
    fn control(&mut self, node: &Node, command: &Command) -> Result<ControlResult> {
        match command {
            Command::SetFlowFormat(format) => {
                if let Some(prefix) = &self.accept {
                    if !format.matches_prefix(prefix) {
                        return Err(Error::Refused(format!(
                            "{} accepts {}, got {}",
                            node.name(),
                            prefix,
                            format.def()
                        )));
                    }
                }
                tracing::debug!(node = %node.name(), format = %format, "flow format accepted");
                self.format = Some(format.clone());
                Ok(ControlResult::DONE)
            }
            _ => match command.local_for(NULL_SINK) {
                Some((NULL_SINK_GET_COUNT, _)) => Ok(ControlResult::Handled(Reply::Value(self.count))),
                Some((NULL_SINK_GET_BYTES, _)) => Ok(ControlResult::Handled(Reply::Value(self.bytes))),
                _ => Ok(ControlResult::Unhandled),
            },
        }
    }

    fn input(&mut self, _node: &Node, buffer: Buffer, _sched: &mut SchedContext) -> Result<()> {
        self.count += 1;
        self.bytes += buffer.len() as u64;
        buffer.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CommandArg;
    use crate::probe::ProbeChain;
    use std::sync::Arc;

    fn sink(config: NullSinkConfig) -> Node {
        Node::allocate(&Arc::new(NullSinkManager), ProbeChain::new(), NULL_SINK, config).unwrap()
    }

    fn local(node: &Node, id: u32) -> Option<u64> {
        node.control(Command::local(NULL_SINK, id, CommandArg::None))
            .unwrap()
            .reply()
            .and_then(|r| r.value())
    }

    #[test]
    fn test_counts_and_releases() {
        let node = sink(NullSinkConfig::any());
        let buffer = Buffer::from_vec(vec![0; 100]);
        let watch = buffer.duplicate();

        node.input(buffer, &mut SchedContext::new()).unwrap();
        assert!(watch.is_exclusive());
        assert_eq!(local(&node, NULL_SINK_GET_COUNT), Some(1));
        assert_eq!(local(&node, NULL_SINK_GET_BYTES), Some(100));
    }

    #[test]
    fn test_accepts_by_prefix() {
        let node = sink(NullSinkConfig::accepting("block."));
        assert!(node
            .control(Command::SetFlowFormat(FlowFormat::new("block.mpegts.")))
            .unwrap()
            .is_handled());

        let err = node
            .control(Command::SetFlowFormat(FlowFormat::new("pic.")))
            .unwrap_err();
        assert!(matches!(err, Error::Refused(_)));
    }
}
