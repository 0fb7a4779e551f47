//! Message router — decodes inbound traffic and decides where it goes.

use std::sync::Arc;

use serde_json::Value;

use tether_core::wire::parse_inbound;
use tether_core::{Frame, Inbound, ProtocolError, QueryError};

use crate::bridge::Bridge;
use crate::handler::{Dispatched, HandlerRegistry};
use crate::reassembly::Accept;
use crate::signaling::Signaler;
use crate::slot::{TransportHandle, TransportKind};

pub struct Router {
    bridge: Arc<Bridge>,
    handlers: HandlerRegistry,
    signaler: Option<Arc<Signaler>>,
}

impl Router {
    pub fn new(
        bridge: Arc<Bridge>,
        handlers: HandlerRegistry,
        signaler: Option<Arc<Signaler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            handlers,
            signaler,
        })
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Process one raw text message received on `conn`.
    ///
    /// Malformed input is logged and dropped; the connection stays up.
    pub async fn handle_inbound(self: &Arc<Self>, conn: &TransportHandle, text: &str) {
        match self.decode(text) {
            Ok(Some(Inbound::Frame(frame))) => self.route(conn, frame).await,
            Ok(Some(Inbound::Custom { kind, body })) => self.route_custom(conn, &kind, &body).await,
            Ok(Some(Inbound::Chunk(_))) | Ok(None) => {}
            Err(err) => {
                tracing::warn!(connection = conn.id, error = %err, "inbound message rejected");
            }
        }
    }

    /// Parse `text`, feeding chunk envelopes to the store. `None` while a
    /// chunk set is still incomplete.
    fn decode(&self, text: &str) -> Result<Option<Inbound>, ProtocolError> {
        let malformed = |e: serde_json::Error| ProtocolError::Malformed(e.to_string());
        let chunk = match parse_inbound(text).map_err(malformed)? {
            Inbound::Chunk(chunk) => chunk,
            whole => return Ok(Some(whole)),
        };
        let Accept::Complete(full) = self.bridge.store.accept(chunk)? else {
            return Ok(None);
        };
        match parse_inbound(&full).map_err(malformed)? {
            Inbound::Chunk(_) => Err(ProtocolError::Malformed(
                "chunk set reassembled into another envelope".into(),
            )),
            whole => Ok(Some(whole)),
        }
    }

    async fn route(self: &Arc<Self>, conn: &TransportHandle, frame: Frame) {
        match frame {
            Frame::Response {
                id,
                success,
                data,
                error,
            } => {
                let outcome = if success {
                    Ok(data.unwrap_or(Value::Null))
                } else {
                    Err(QueryError::Remote(error.unwrap_or(Value::Null)))
                };
                if !self.bridge.pending.resolve(&id, outcome).await {
                    tracing::info!(id = %id, "late response, discarding");
                }
            }
            Frame::Pong { id } => {
                if !self.bridge.pending.resolve(&id, Ok(Value::Null)).await {
                    tracing::debug!(id = %id, "unsolicited pong");
                }
            }
            Frame::Ping { id } => self.reply(conn, Frame::Pong { id }).await,
            Frame::SignalOffer { offer } => self.signal(conn, offer),
            other => match self.handlers.dispatch(&other) {
                Dispatched::Reply(reply) => self.reply(conn, reply).await,
                Dispatched::Handled | Dispatched::RawReply(_) => {}
                Dispatched::Unclaimed => {
                    tracing::debug!(
                        connection = conn.id,
                        kind = other.kind().as_str(),
                        "no handler for frame, dropping"
                    );
                }
            },
        }
    }

    async fn route_custom(&self, conn: &TransportHandle, kind: &str, body: &Value) {
        match self.handlers.dispatch_custom(kind, body) {
            Dispatched::RawReply(reply) => {
                if let Err(e) = self.bridge.send_raw(conn, &reply).await {
                    tracing::warn!(connection = conn.id, kind, error = %e, "failed to send reply");
                }
            }
            Dispatched::Reply(frame) => self.reply(conn, frame).await,
            Dispatched::Handled => {}
            Dispatched::Unclaimed => {
                tracing::debug!(connection = conn.id, kind, "no handler for message type, dropping");
            }
        }
    }

    /// In-band signaling. Negotiation runs on its own task so the socket
    /// keeps flowing while ICE gathers.
    fn signal(self: &Arc<Self>, conn: &TransportHandle, offer: Value) {
        if conn.kind == TransportKind::PeerChannel {
            tracing::warn!(connection = conn.id, "signal-offer over peer channel ignored");
            return;
        }
        let Some(signaler) = self.signaler.clone() else {
            tracing::warn!(connection = conn.id, "signal-offer received but peer channels are disabled");
            return;
        };
        let router = self.clone();
        let conn = conn.clone();
        tokio::spawn(async move {
            let reply = match signaler.handle_offer(offer, Some(conn.id), &router).await {
                Ok(answer) => Frame::SignalAnswer { answer },
                Err(e) => {
                    tracing::warn!(connection = conn.id, error = %e, "in-band signaling failed");
                    Frame::SignalError {
                        error: e.to_string(),
                    }
                }
            };
            router.reply(&conn, reply).await;
        });
    }

    async fn reply(&self, conn: &TransportHandle, frame: Frame) {
        if let Err(e) = self.bridge.send_frame(conn, &frame).await {
            tracing::warn!(
                connection = conn.id,
                kind = frame.kind().as_str(),
                error = %e,
                "failed to send reply"
            );
        }
    }
}
