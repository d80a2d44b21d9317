//! One relay session per connection.
//!
//! The session subscribes to its club's broker channel, then runs two loops
//! over the split socket:
//! - inbound: reads client frames, validates them, persists through the store
//!   and publishes the canonical broadcast to the club channel
//! - outbound: forwards broker messages and error replies to the client and
//!   sends keep-alive pings
//!
//! Only the outbound loop writes to the socket and only the inbound loop reads
//! from it. A cancellation token is the shutdown signal: whichever loop stops
//! first cancels it and the other one follows. Subscription and socket are
//! released once, by [`ClientSession::run`], after both loops are done.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::Authorized;
use crate::broker::{Broker, Subscription};
use crate::config::RelayTimings;
use crate::db::{Store, StoreError};
use crate::models::{Broadcast, Frame};
use crate::websocket::codec::{self, ProtocolError};
use crate::websocket::msg_chatmessage_handler::handle_chat_message;
use crate::websocket::msg_comment_handler::handle_comment;
use crate::websocket::msg_like_handler::{handle_like_chat_message, handle_like_comment};

/// Error replies waiting for the outbound loop.
const REPLY_QUEUE: usize = 32;

/// Most broker messages folded into a single socket write.
const MAX_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read deadline exceeded")]
    ReadTimeout,
    #[error("write deadline exceeded")]
    WriteTimeout,
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),
}

/// Why a loop stopped.
#[derive(Debug)]
enum CloseReason {
    PeerClosed,
    Shutdown,
    Transport(TransportError),
}

/// Failure of a single client action. Never fatal to the session.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Could not {action}")]
    Persistence {
        action: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("Something went wrong")]
    Encode(#[from] serde_json::Error),
}

/// Identity and storage an action runs against.
pub struct SessionContext {
    pub club_id: Uuid,
    pub user_id: Uuid,
    pub store: Arc<dyn Store>,
}

/// What the inbound loop does with one client frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Outcome {
    /// Canonical broadcast for the club channel
    Publish(String),
    /// Error frame for the sender only
    Reply(String),
}

pub struct ClientSession {
    ctx: SessionContext,
    broker: Arc<dyn Broker>,
    timings: RelayTimings,
    state: SessionState,
}

impl ClientSession {
    pub fn new(
        authorized: Authorized,
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        timings: RelayTimings,
    ) -> Self {
        Self {
            ctx: SessionContext {
                club_id: authorized.club_id,
                user_id: authorized.user_id,
                store,
            },
            broker,
            timings,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            club_id = %self.ctx.club_id,
            user_id = %self.ctx.user_id,
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
    }

    /// Drive the session until either side stops. Returns the final state.
    pub async fn run(mut self, mut socket: WebSocket) -> SessionState {
        let channel = self.ctx.club_id.to_string();

        let subscription = match self.broker.subscribe(&channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(club_id = %self.ctx.club_id, "Failed to subscribe to club channel: {}", e);
                let frame = codec::encode_error("Something went wrong");
                let _ = timeout(self.timings.write_wait, socket.send(Message::Text(frame))).await;
                self.transition(SessionState::Closed);
                return self.state;
            }
        };
        self.transition(SessionState::Active);
        info!(club_id = %self.ctx.club_id, user_id = %self.ctx.user_id, "Relay session active");

        let (sink, stream) = socket.split();
        let shutdown = CancellationToken::new();
        let (reply_tx, reply_rx) = mpsc::channel::<String>(REPLY_QUEUE);

        let outbound = tokio::spawn(outbound_loop(
            sink,
            subscription,
            reply_rx,
            shutdown.clone(),
            self.timings,
        ));

        let reason = inbound_loop(
            stream,
            &self.ctx,
            self.broker.as_ref(),
            &channel,
            reply_tx,
            &shutdown,
            self.timings.pong_wait,
        )
        .await;
        shutdown.cancel();
        self.transition(SessionState::Closing);
        log_close(&self.ctx, "inbound", &reason);

        match outbound.await {
            Ok((mut sink, subscription)) => {
                let _ = timeout(self.timings.write_wait, sink.close()).await;
                subscription.close();
            }
            Err(e) => {
                // The subscription was dropped, and released, with the task.
                error!(club_id = %self.ctx.club_id, "Outbound loop aborted: {}", e);
            }
        }

        self.transition(SessionState::Closed);
        info!(club_id = %self.ctx.club_id, user_id = %self.ctx.user_id, "Relay session closed");
        self.state
    }
}

fn log_close(ctx: &SessionContext, side: &str, reason: &CloseReason) {
    match reason {
        CloseReason::PeerClosed => {
            debug!(club_id = %ctx.club_id, user_id = %ctx.user_id, side, "Peer closed the connection")
        }
        CloseReason::Shutdown => {
            debug!(club_id = %ctx.club_id, user_id = %ctx.user_id, side, "Loop stopped by shutdown signal")
        }
        CloseReason::Transport(e) => {
            warn!(club_id = %ctx.club_id, user_id = %ctx.user_id, side, error = %e, "Relay transport failure")
        }
    }
}

async fn inbound_loop(
    mut stream: SplitStream<WebSocket>,
    ctx: &SessionContext,
    broker: &dyn Broker,
    channel: &str,
    replies: mpsc::Sender<String>,
    shutdown: &CancellationToken,
    pong_wait: Duration,
) -> CloseReason {
    loop {
        // Any frame, pongs included, pushes the read deadline forward.
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return CloseReason::Shutdown,
            next = timeout(pong_wait, stream.next()) => next,
        };

        let message = match next {
            Err(_) => return CloseReason::Transport(TransportError::ReadTimeout),
            Ok(None) => return CloseReason::PeerClosed,
            Ok(Some(Err(e))) if is_peer_disconnect(&e) => return CloseReason::PeerClosed,
            Ok(Some(Err(e))) => return CloseReason::Transport(TransportError::Socket(e)),
            Ok(Some(Ok(message))) => message,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    let reply = codec::encode_error(&ProtocolError::MalformedFrame.to_string());
                    if replies.send(reply).await.is_err() {
                        return CloseReason::Shutdown;
                    }
                    continue;
                }
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                debug!(club_id = %ctx.club_id, user_id = %ctx.user_id, ?frame, "Close frame received");
                return CloseReason::PeerClosed;
            }
        };

        match process_text(&text, ctx).await {
            Outcome::Publish(payload) => {
                if let Err(e) = broker.publish(channel, payload).await {
                    error!(club_id = %ctx.club_id, "Failed to publish broadcast: {}", e);
                }
            }
            Outcome::Reply(reply) => {
                if replies.send(reply).await.is_err() {
                    return CloseReason::Shutdown;
                }
            }
        }
    }
}

/// Peers that drop the TCP connection under us. Only the io error kind is
/// consulted; anything else is an unexpected transport failure.
fn is_peer_disconnect(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        source = e.source();
    }
    false
}

/// Decode, validate and apply one client frame.
pub(crate) async fn process_text(text: &str, ctx: &SessionContext) -> Outcome {
    let normalized = codec::normalize(text);
    let result = match codec::decode(normalized.as_bytes()) {
        Ok(frame) => dispatch(frame, ctx).await,
        Err(e) => Err(ActionError::from(e)),
    };

    match result.and_then(|broadcast| codec::encode(&broadcast).map_err(ActionError::from)) {
        Ok(payload) => Outcome::Publish(payload),
        Err(e) => {
            debug!(club_id = %ctx.club_id, user_id = %ctx.user_id, error = %e, "Rejected client frame");
            Outcome::Reply(codec::encode_error(&e.to_string()))
        }
    }
}

async fn dispatch(frame: Frame, ctx: &SessionContext) -> Result<Broadcast, ActionError> {
    debug!(club_id = %ctx.club_id, user_id = %ctx.user_id, action = %frame.action(), "Dispatching frame");
    match frame {
        Frame::ChatMessage(text) => handle_chat_message(text, ctx).await,
        Frame::LikeChatMessage(id) => handle_like_chat_message(id, ctx).await,
        Frame::Comment(comment) => handle_comment(comment, ctx).await,
        Frame::LikeComment(id) => handle_like_comment(id, ctx).await,
    }
}

async fn outbound_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    mut replies: mpsc::Receiver<String>,
    shutdown: CancellationToken,
    timings: RelayTimings,
) -> (SplitSink<WebSocket, Message>, Subscription) {
    let mut ticker = interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            payload = subscription.recv() => match payload {
                Some(first) => {
                    let batch = coalesce(&first, &mut subscription);
                    write(&mut sink, Message::Text(batch), timings.write_wait).await
                }
                None => break CloseReason::Shutdown,
            },
            reply = replies.recv() => match reply {
                Some(reply) => write(&mut sink, Message::Text(reply), timings.write_wait).await,
                None => break CloseReason::Shutdown,
            },
            _ = ticker.tick() => write(&mut sink, Message::Ping(Vec::new()), timings.write_wait).await,
        };

        if let Err(e) = result {
            break CloseReason::Transport(e);
        }
    };

    if let CloseReason::Transport(e) = &reason {
        warn!(channel = %subscription.channel(), error = %e, "Relay write failed");
    }
    shutdown.cancel();
    (sink, subscription)
}

/// Join the given payload with whatever is already queued, one per line.
fn coalesce(first: &str, subscription: &mut Subscription) -> String {
    let mut batch = first.to_string();
    for _ in 1..MAX_BATCH {
        match subscription.try_recv() {
            Some(next) => {
                batch.push('\n');
                batch.push_str(&next);
            }
            None => break,
        }
    }
    batch
}

async fn write(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_wait: Duration,
) -> Result<(), TransportError> {
    match timeout(write_wait, sink.send(message)).await {
        Ok(result) => result.map_err(TransportError::from),
        Err(_) => Err(TransportError::WriteTimeout),
    }
}
