//! Request/response bridge over the extension's WebSocket.
//!
//! One logical channel carries many concurrent requests. Each `send` gets a
//! fresh correlation ID and a pending entry; the connection's read loop hands
//! every inbound frame to [`SocketBridge::handle_frame`], which completes the
//! matching entry. Replies may arrive in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tabwire_core::config::BridgeConfig;
use tabwire_core::protocol::{BrowserCommand, InboundMessage, OutboundMessage};
use tabwire_core::BridgeError;

use crate::metrics;

/// What `send` does when no extension is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    FailFast,
    Wait(Duration),
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub request_timeout: Duration,
    pub connect: ConnectPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            connect: config
                .connect_wait()
                .map(ConnectPolicy::Wait)
                .unwrap_or(ConnectPolicy::FailFast),
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub timeout: Option<Duration>,
}

impl SendOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Identifies one attached extension connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How an inbound frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Completed the pending call with this correlation ID.
    Resolved(String),
    /// No pending call has this correlation ID (late reply or desync).
    Unmatched(String),
    /// Frame carried no correlation ID.
    Unsolicited,
    /// Frame carried a pending correlation ID but an undecodable body;
    /// the call was failed with `UndecodableReply`.
    Rejected(String),
    /// Frame was not valid JSON of the expected shape.
    Malformed,
}

/// Diagnostic view of an in-flight call.
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub correlation_id: String,
    pub message_type: &'static str,
    pub age: Duration,
    pub remaining: Duration,
}

type Reply = Result<Value, BridgeError>;

struct PendingCall {
    message_type: &'static str,
    created_at: Instant,
    deadline: Instant,
    reply: oneshot::Sender<Reply>,
}

struct Link {
    id: ConnectionId,
    writer: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct BridgeState {
    link: Option<Link>,
    pending: HashMap<String, PendingCall>,
}

impl BridgeState {
    /// Reject every in-flight call with `ChannelClosed` and empty the table.
    fn fail_all_pending(&mut self) -> usize {
        let drained: Vec<_> = self.pending.drain().collect();
        let count = drained.len();
        for (correlation_id, call) in drained {
            debug!(correlation_id = %correlation_id, message_type = call.message_type, "Rejecting pending call: channel closed");
            metrics::record_bridge_failure("channel_closed");
            let _ = call.reply.send(Err(BridgeError::ChannelClosed));
        }
        count
    }
}

/// Owns the extension channel and the pending-call table.
pub struct SocketBridge {
    settings: BridgeSettings,
    state: Mutex<BridgeState>,
    connected: watch::Sender<bool>,
    next_connection: AtomicU64,
    unmatched_replies: AtomicU64,
    malformed_frames: AtomicU64,
}

impl SocketBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            settings,
            state: Mutex::new(BridgeState::default()),
            connected,
            next_connection: AtomicU64::new(1),
            unmatched_replies: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection's outbound queue as the live channel.
    ///
    /// Replaces any previous connection; calls in flight on it are rejected.
    pub fn attach(&self, writer: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::SeqCst));
        let mut state = self.lock_state();
        if let Some(previous) = state.link.replace(Link { id, writer }) {
            let rejected = state.fail_all_pending();
            warn!(old = %previous.id, new = %id, rejected, "Extension connection replaced");
        }
        drop(state);
        self.connected.send_replace(true);
        info!(conn = %id, "Extension attached");
        id
    }

    /// Channel closure: drop the link and reject everything still pending.
    ///
    /// A stale ID (connection already replaced) is ignored.
    pub fn detach(&self, id: ConnectionId) {
        let mut state = self.lock_state();
        match &state.link {
            Some(link) if link.id == id => {
                state.link = None;
                let rejected = state.fail_all_pending();
                drop(state);
                self.connected.send_replace(false);
                info!(conn = %id, rejected, "Extension detached");
            }
            _ => debug!(conn = %id, "Ignoring detach of stale connection"),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn pending_calls(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        self.lock_state()
            .pending
            .iter()
            .map(|(id, call)| PendingInfo {
                correlation_id: id.clone(),
                message_type: call.message_type,
                age: now.saturating_duration_since(call.created_at),
                remaining: call.deadline.saturating_duration_since(now),
            })
            .collect()
    }

    /// Replies that matched no pending call since startup.
    pub fn unmatched_replies(&self) -> u64 {
        self.unmatched_replies.load(Ordering::Relaxed)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Send with the default deadline.
    pub async fn send_default(&self, command: BrowserCommand) -> Result<Value, BridgeError> {
        self.send(command, SendOptions::default()).await
    }

    /// Send a command and wait for its correlated reply.
    ///
    /// Resolves with the reply's `result`, or fails with one of the
    /// [`BridgeError`] kinds.
    pub async fn send(
        &self,
        command: BrowserCommand,
        options: SendOptions,
    ) -> Result<Value, BridgeError> {
        let message_type = command.message_type();
        let correlation_id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&OutboundMessage {
            command,
            correlation_id: correlation_id.clone(),
        })
        .map_err(|e| BridgeError::Serialization(e.to_string()))?;

        self.wait_for_link().await?;

        let timeout = options.timeout.unwrap_or(self.settings.request_timeout);
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut state = self.lock_state();
            let writer = match &state.link {
                Some(link) => link.writer.clone(),
                None => return Err(BridgeError::ChannelUnavailable),
            };
            let now = Instant::now();
            state.pending.insert(
                correlation_id.clone(),
                PendingCall {
                    message_type,
                    created_at: now,
                    deadline: now + timeout,
                    reply: reply_tx,
                },
            );
            // Written under the table lock so wire order matches call order.
            if writer.send(frame).is_err() {
                state.pending.remove(&correlation_id);
                return Err(BridgeError::ChannelClosed);
            }
        }

        debug!(correlation_id = %correlation_id, message_type, "Sent to extension");

        let guard = PendingGuard {
            bridge: self,
            correlation_id: &correlation_id,
        };

        let outcome = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => {
                metrics::record_bridge_failure("timeout");
                warn!(
                    correlation_id = %correlation_id,
                    message_type,
                    timeout_ms = timeout.as_millis() as u64,
                    "Extension reply timed out"
                );
                Err(BridgeError::Timeout {
                    message_type,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        drop(guard);
        outcome
    }

    async fn wait_for_link(&self) -> Result<(), BridgeError> {
        if self.is_connected() {
            return Ok(());
        }
        match self.settings.connect {
            ConnectPolicy::FailFast => Err(BridgeError::ChannelUnavailable),
            ConnectPolicy::Wait(limit) => {
                debug!(wait_ms = limit.as_millis() as u64, "Waiting for extension to connect");
                let mut rx = self.connected.subscribe();
                match tokio::time::timeout(limit, rx.wait_for(|connected| *connected)).await {
                    Ok(Ok(_)) => Ok(()),
                    _ => Err(BridgeError::ChannelUnavailable),
                }
            }
        }
    }

    /// Route one inbound text frame to its pending call.
    pub fn handle_frame(&self, text: &str) -> FrameOutcome {
        let message: InboundMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => return self.reject_undecodable(text, e),
        };

        let Some(correlation_id) = message.correlation_id else {
            debug!(frame = %text, "Unsolicited frame from extension");
            return FrameOutcome::Unsolicited;
        };

        let Some(call) = self.take_pending(&correlation_id) else {
            return FrameOutcome::Unmatched(correlation_id);
        };

        let reply = match message.error {
            Some(error) => Err(BridgeError::Remote(error)),
            None => Ok(message.result.unwrap_or(Value::Null)),
        };
        debug!(
            correlation_id = %correlation_id,
            message_type = call.message_type,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            ok = reply.is_ok(),
            "Reply received"
        );
        let _ = call.reply.send(reply);
        FrameOutcome::Resolved(correlation_id)
    }

    /// A frame that failed typed decoding still fails its caller at once
    /// when it carries a recognizable correlation ID.
    fn reject_undecodable(&self, text: &str, error: serde_json::Error) -> FrameOutcome {
        let correlation_id = serde_json::from_str::<Value>(text).ok().and_then(|v| {
            v.get("correlationId")
                .and_then(Value::as_str)
                .map(String::from)
        });
        let Some(correlation_id) = correlation_id else {
            self.malformed_frames.fetch_add(1, Ordering::Relaxed);
            metrics::record_malformed_frame();
            warn!(%error, "Malformed frame from extension");
            return FrameOutcome::Malformed;
        };

        let Some(call) = self.take_pending(&correlation_id) else {
            return FrameOutcome::Unmatched(correlation_id);
        };
        warn!(
            correlation_id = %correlation_id,
            message_type = call.message_type,
            %error,
            "Undecodable reply from extension"
        );
        metrics::record_bridge_failure("undecodable_reply");
        let _ = call
            .reply
            .send(Err(BridgeError::UndecodableReply(error.to_string())));
        FrameOutcome::Rejected(correlation_id)
    }

    fn take_pending(&self, correlation_id: &str) -> Option<PendingCall> {
        let call = self.lock_state().pending.remove(correlation_id);
        if call.is_none() {
            self.unmatched_replies.fetch_add(1, Ordering::Relaxed);
            metrics::record_unmatched_reply();
            warn!(correlation_id = %correlation_id, "Discarding reply with no pending call");
        }
        call
    }
}

/// Removes the pending entry when the caller stops waiting, whether it
/// finished, timed out, or was dropped mid-await.
struct PendingGuard<'a> {
    bridge: &'a SocketBridge,
    correlation_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.bridge.lock_state().pending.remove(self.correlation_id);
    }
}
