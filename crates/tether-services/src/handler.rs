//! Frame handlers — the extension point for application traffic.
//!
//! The router resolves responses and pongs itself and answers pings. Every
//! other frame is offered to the registry, which picks a handler by query
//! method first and frame kind second. Messages whose `type` the bridge does
//! not know go to the handler registered for that type.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tether_core::{Frame, FrameKind};

/// Trait for components that consume inbound frames.
///
/// Handlers run on the connection's driver task and must not block.
pub trait FrameHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one frame. A returned frame is sent back on the connection the
    /// original arrived on.
    fn handle_frame(&self, frame: &Frame) -> Result<Option<Frame>>;

    /// Handle an application message of type `kind`. `body` is the whole
    /// message. A returned value is sent back as-is.
    fn handle_custom(&self, _kind: &str, _body: &Value) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// What happened to a dispatched frame.
#[derive(Debug, PartialEq)]
pub enum Dispatched {
    Unclaimed,
    Handled,
    Reply(Frame),
    /// Reply to a custom message, already in wire shape.
    RawReply(Value),
}

#[derive(Default)]
pub struct HandlerRegistry {
    by_method: HashMap<String, Arc<dyn FrameHandler>>,
    by_kind: HashMap<FrameKind, Arc<dyn FrameHandler>>,
    by_custom: HashMap<String, Arc<dyn FrameHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every frame of `kind` to `handler`.
    pub fn register(&mut self, kind: FrameKind, handler: Arc<dyn FrameHandler>) {
        self.by_kind.insert(kind, handler);
    }

    /// Route inbound queries for one method to `handler`. Takes precedence
    /// over a handler registered for [`FrameKind::Query`].
    pub fn register_method(&mut self, method: impl Into<String>, handler: Arc<dyn FrameHandler>) {
        self.by_method.insert(method.into(), handler);
    }

    /// Route application messages whose `type` is `kind` to `handler`.
    pub fn register_custom(&mut self, kind: impl Into<String>, handler: Arc<dyn FrameHandler>) {
        self.by_custom.insert(kind.into(), handler);
    }

    fn lookup(&self, frame: &Frame) -> Option<&Arc<dyn FrameHandler>> {
        if let Frame::Query { method, .. } = frame {
            if let Some(handler) = self.by_method.get(method) {
                return Some(handler);
            }
        }
        self.by_kind.get(&frame.kind())
    }

    /// Hand `frame` to its handler. Handler errors are logged here and never
    /// reach the caller.
    pub fn dispatch(&self, frame: &Frame) -> Dispatched {
        let Some(handler) = self.lookup(frame) else {
            return Dispatched::Unclaimed;
        };
        match handler.handle_frame(frame) {
            Ok(Some(reply)) => Dispatched::Reply(reply),
            Ok(None) => Dispatched::Handled,
            Err(e) => {
                tracing::warn!(
                    handler = handler.name(),
                    kind = frame.kind().as_str(),
                    error = %e,
                    "frame handler failed"
                );
                Dispatched::Handled
            }
        }
    }

    /// Hand a custom message to the handler registered for `kind`.
    pub fn dispatch_custom(&self, kind: &str, body: &Value) -> Dispatched {
        let Some(handler) = self.by_custom.get(kind) else {
            return Dispatched::Unclaimed;
        };
        match handler.handle_custom(kind, body) {
            Ok(Some(reply)) => Dispatched::RawReply(reply),
            Ok(None) => Dispatched::Handled,
            Err(e) => {
                tracing::warn!(handler = handler.name(), kind, error = %e, "custom handler failed");
                Dispatched::Handled
            }
        }
    }
}
