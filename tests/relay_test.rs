use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use club_relay::auth::JwtAuthorizer;
use club_relay::broker::{Broker, BrokerError, BrokerStats, LocalBroker, Subscription};
use club_relay::config::RelayTimings;
use club_relay::db::{MemoryStore, Store};
use club_relay::models::Club;
use club_relay::routes::build_router;
use club_relay::AppState;

const SECRET: &str = "relay-test-secret";
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    broker: Arc<LocalBroker>,
    state: AppState,
    club_id: Uuid,
    host: Uuid,
    member: Uuid,
}

impl TestServer {
    async fn start(timings: RelayTimings) -> Self {
        Self::start_with(timings, |local| local as Arc<dyn Broker>).await
    }

    /// Start with the relay talking to a broker built around the local one.
    async fn start_with(
        timings: RelayTimings,
        wrap: impl FnOnce(Arc<LocalBroker>) -> Arc<dyn Broker>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let host = Uuid::new_v4();
        let member = Uuid::new_v4();
        let club_id = Uuid::new_v4();
        store
            .insert_club(Club {
                id: club_id,
                club_name: "Night readers".to_string(),
                club_pic: String::new(),
                file_url: "https://files.test/novel.pdf".to_string(),
                page_no: 1,
                host_id: Some(host),
                page_sync: false,
                private: false,
            })
            .await;
        store.add_member(club_id, member).await;

        let broker = Arc::new(LocalBroker::new(64));
        let authorizer = Arc::new(JwtAuthorizer::new(store.clone(), SECRET, Duration::ZERO));
        let state = AppState::new(store.clone(), wrap(broker.clone()), authorizer, timings);
        let app = build_router(state.clone(), CorsLayer::new());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, store, broker, state, club_id, host, member }
    }

    async fn with_defaults() -> Self {
        Self::start(RelayTimings::default()).await
    }

    fn relay_url(&self, token: Option<&str>) -> String {
        self.url_for("relay", &self.club_id.to_string(), token)
    }

    fn url_for(&self, prefix: &str, club_id: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/{}/{}?token={}", self.addr, prefix, club_id, token),
            None => format!("ws://{}/{}/{}", self.addr, prefix, club_id),
        }
    }

    async fn join(&self, user_id: Uuid) -> Client {
        Client::connect(&self.relay_url(Some(&token_for(user_id)))).await
    }

    /// Block until the club channel has exactly `n` live subscriptions.
    async fn wait_for_subscribers(&self, n: usize) {
        let channel = self.club_id.to_string();
        wait_until(|| self.broker.subscriber_count(&channel) == n).await;
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Local broker whose subscribe and publish can be switched to failing.
struct FlakyBroker {
    inner: Arc<LocalBroker>,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
}

impl FlakyBroker {
    fn around(inner: Arc<LocalBroker>) -> Self {
        Self {
            inner,
            fail_subscribe: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::Backend("subscribe refused".to_string()));
        }
        self.inner.subscribe(channel).await
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Backend("publish refused".to_string()));
        }
        self.inner.publish(channel, payload).await
    }

    fn stats(&self) -> BrokerStats {
        self.inner.stats()
    }
}

/// Server plus a handle on its flaky broker.
async fn flaky_server() -> (TestServer, Arc<FlakyBroker>) {
    let mut flaky = None;
    let server = TestServer::start_with(RelayTimings::default(), |local| {
        let broker = Arc::new(FlakyBroker::around(local));
        flaky = Some(broker.clone());
        broker as Arc<dyn Broker>
    })
    .await;
    (server, flaky.expect("broker was built"))
}

fn token_for(user_id: Uuid) -> String {
    let claims = json!({"id": user_id.to_string(), "exp": Utc::now().timestamp() + 600});
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
}

impl Client {
    async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("websocket handshake failed");
        Self { ws, pending: VecDeque::new() }
    }

    async fn send(&mut self, frame: Value) {
        self.send_raw(frame.to_string()).await;
    }

    async fn send_raw(&mut self, text: String) {
        self.ws.send(Message::text(text)).await.unwrap();
    }

    /// Next JSON frame. Batched writes are split on newlines.
    async fn next_json(&mut self) -> Value {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return value;
            }
            let message = timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("websocket error");
            match message {
                Message::Text(text) => {
                    for line in text.as_str().split('\n') {
                        self.pending.push_back(serde_json::from_str(line).unwrap());
                    }
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Assert nothing but keep-alives arrives for `period`.
    async fn expect_silence(&mut self, period: Duration) {
        assert!(self.pending.is_empty(), "unexpected queued frame: {:?}", self.pending);
        let deadline = tokio::time::Instant::now() + period;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(other) => panic!("expected silence, got {other:?}"),
            }
        }
    }

    /// Read until the server closes, returning the close code if one was sent.
    async fn expect_close(&mut self) -> Option<CloseCode> {
        loop {
            let next = timeout(WAIT, self.ws.next()).await.expect("timed out waiting for close");
            match next {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => panic!("expected close, got {other:?}"),
                None | Some(Err(_)) => return None,
            }
        }
    }
}

#[tokio::test]
async fn chat_message_reaches_every_member_with_persisted_id() {
    let server = TestServer::with_defaults().await;
    let mut alice = server.join(server.host).await;
    let mut bob = server.join(server.member).await;
    server.wait_for_subscribers(2).await;

    alice.send(json!({"action": "chatmessage", "data": "hello"})).await;

    let to_alice = alice.next_json().await;
    let to_bob = bob.next_json().await;
    assert_eq!(to_alice, to_bob);
    assert_eq!(to_bob["action"], "chatmessage");
    assert_eq!(to_bob["user_id"], server.host.to_string());
    assert_eq!(to_bob["data"]["message"], "hello");
    assert_eq!(to_bob["data"]["likes"], 0);

    let stored = server.store.get_chat_messages(server.club_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(to_bob["data"]["id"], stored[0].id.to_string());
}

#[tokio::test]
async fn overlong_message_is_rejected_for_the_sender_only() {
    let server = TestServer::with_defaults().await;
    let mut alice = server.join(server.host).await;
    let mut bob = server.join(server.member).await;
    server.wait_for_subscribers(2).await;

    alice.send(json!({"action": "chatmessage", "data": "x".repeat(151)})).await;

    let reply = alice.next_json().await;
    assert_eq!(reply["action"], "error");
    bob.expect_silence(Duration::from_millis(300)).await;
    assert!(server.store.get_chat_messages(server.club_id).await.unwrap().is_empty());

    alice.send(json!({"action": "chatmessage", "data": "x".repeat(150)})).await;
    assert_eq!(bob.next_json().await["action"], "chatmessage");
}

#[tokio::test]
async fn each_like_adds_one() {
    let server = TestServer::with_defaults().await;
    let message = server
        .store
        .create_chat_message(server.host, server.club_id, "like this")
        .await
        .unwrap();

    let mut alice = server.join(server.host).await;
    let mut bob = server.join(server.member).await;
    server.wait_for_subscribers(2).await;

    for _ in 0..3 {
        bob.send(json!({"action": "like_chatmessage", "data": message.id.to_string()})).await;
    }
    for _ in 0..3 {
        let like = alice.next_json().await;
        assert_eq!(
            like,
            json!({
                "action": "like_chatmessage",
                "user_id": server.member.to_string(),
                "chatmessage_id": message.id.to_string()
            })
        );
    }
    assert_eq!(server.store.chat_message(message.id).await.unwrap().likes, 3);
}

#[tokio::test]
async fn comment_is_broadcast_with_session_owner() {
    let server = TestServer::with_defaults().await;
    let mut alice = server.join(server.host).await;
    let mut bob = server.join(server.member).await;
    server.wait_for_subscribers(2).await;

    bob.send(json!({
        "action": "comment",
        "data": {"message": "that twist", "page_no": 42, "user_id": server.host.to_string()}
    }))
    .await;

    let comment = alice.next_json().await;
    assert_eq!(comment["action"], "comment");
    assert_eq!(comment["user_id"], server.member.to_string());
    assert_eq!(comment["data"]["user_id"], server.member.to_string());
    assert_eq!(comment["data"]["page_no"], 42);
    assert_eq!(comment["data"]["parent_id"], Value::Null);
    assert_eq!(bob.next_json().await, comment);
}

#[tokio::test]
async fn malformed_frames_keep_the_session_open() {
    let server = TestServer::with_defaults().await;
    let mut alice = server.join(server.host).await;
    server.wait_for_subscribers(1).await;

    alice.send_raw("{oops".to_string()).await;
    assert_eq!(
        alice.next_json().await,
        json!({"action": "error", "message": "Invalid JSON frame"})
    );

    alice.send(json!({"action": "wave", "data": null})).await;
    assert_eq!(
        alice.next_json().await,
        json!({"action": "error", "message": "Unknown action 'wave'"})
    );

    alice.send(json!({"action": "chatmessage", "data": "still here"})).await;
    assert_eq!(alice.next_json().await["data"]["message"], "still here");
}

#[tokio::test]
async fn non_member_gets_one_error_then_policy_close() {
    let server = TestServer::with_defaults().await;
    let mut stranger = server.join(Uuid::new_v4()).await;

    assert_eq!(
        stranger.next_json().await,
        json!({"action": "error", "message": "You are not a member of this club"})
    );
    assert_eq!(stranger.expect_close().await, Some(CloseCode::Policy));
    assert_eq!(server.broker.subscriber_count(&server.club_id.to_string()), 0);
    assert_eq!(server.state.open_sessions(), 0);
}

#[tokio::test]
async fn gate_reports_club_before_token() {
    let server = TestServer::with_defaults().await;

    let url = server.url_for("relay", &Uuid::new_v4().to_string(), None);
    let mut client = Client::connect(&url).await;
    assert_eq!(client.next_json().await["message"], "Club not found");
    assert_eq!(client.expect_close().await, Some(CloseCode::Policy));

    let mut client = Client::connect(&server.relay_url(None)).await;
    assert_eq!(client.next_json().await["message"], "Missing or malformed JWT");

    let mut client = Client::connect(&server.relay_url(Some("garbage"))).await;
    assert_eq!(client.next_json().await["message"], "Missing or malformed JWT");
}

#[tokio::test]
async fn api_ws_route_serves_the_same_relay() {
    let server = TestServer::with_defaults().await;
    let token = token_for(server.member);
    let url = server.url_for("api/ws", &server.club_id.to_string(), Some(&token));
    let mut bob = Client::connect(&url).await;
    server.wait_for_subscribers(1).await;

    bob.send(json!({"action": "chatmessage", "data": "via api"})).await;
    assert_eq!(bob.next_json().await["data"]["message"], "via api");
}

#[tokio::test]
async fn client_close_releases_subscription() {
    let server = TestServer::with_defaults().await;
    let mut alice = server.join(server.host).await;
    server.wait_for_subscribers(1).await;
    assert_eq!(server.state.open_sessions(), 1);

    alice.ws.close(None).await.unwrap();

    server.wait_for_subscribers(0).await;
    wait_until(|| server.state.open_sessions() == 0).await;
    assert_eq!(server.broker.channel_count(), 0);
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_deadline() {
    let server = TestServer::start(RelayTimings {
        write_wait: Duration::from_secs(1),
        pong_wait: Duration::from_millis(500),
        ping_period: Duration::from_millis(400),
        max_message_size: 2048,
    })
    .await;

    // Never polled, so pings go unanswered.
    let _silent = server.join(server.host).await;
    server.wait_for_subscribers(1).await;

    server.wait_for_subscribers(0).await;
    wait_until(|| server.state.open_sessions() == 0).await;
}

#[tokio::test]
async fn responsive_client_survives_keep_alive_rounds() {
    let server = TestServer::start(RelayTimings {
        write_wait: Duration::from_secs(1),
        pong_wait: Duration::from_millis(500),
        ping_period: Duration::from_millis(200),
        max_message_size: 2048,
    })
    .await;

    let mut alice = server.join(server.host).await;
    server.wait_for_subscribers(1).await;

    // Reading answers the pings.
    alice.expect_silence(Duration::from_millis(1200)).await;
    assert_eq!(server.broker.subscriber_count(&server.club_id.to_string()), 1);

    alice.send(json!({"action": "chatmessage", "data": "awake"})).await;
    assert_eq!(alice.next_json().await["data"]["message"], "awake");
}

#[tokio::test]
async fn oversized_frame_ends_the_session() {
    let server = TestServer::start(RelayTimings {
        max_message_size: 256,
        ..RelayTimings::default()
    })
    .await;

    let mut alice = server.join(server.host).await;
    server.wait_for_subscribers(1).await;

    alice.send_raw("y".repeat(1024)).await;
    server.wait_for_subscribers(0).await;
    wait_until(|| server.state.open_sessions() == 0).await;
}

#[tokio::test]
async fn publish_failure_keeps_the_session_open() {
    let (server, flaky) = flaky_server().await;
    let mut alice = server.join(server.host).await;
    server.wait_for_subscribers(1).await;

    flaky.fail_publish.store(true, Ordering::SeqCst);
    alice.send(json!({"action": "chatmessage", "data": "lost in transit"})).await;
    alice.expect_silence(Duration::from_millis(300)).await;
    assert_eq!(server.broker.subscriber_count(&server.club_id.to_string()), 1);

    // Persisted even though nobody saw it.
    let stored = server.store.get_chat_messages(server.club_id).await.unwrap();
    assert_eq!(stored.len(), 1);

    flaky.fail_publish.store(false, Ordering::SeqCst);
    alice.send(json!({"action": "chatmessage", "data": "back again"})).await;
    assert_eq!(alice.next_json().await["data"]["message"], "back again");
    assert_eq!(server.state.open_sessions(), 1);
}

#[tokio::test]
async fn subscribe_failure_sends_an_error_and_closes() {
    let (server, flaky) = flaky_server().await;
    flaky.fail_subscribe.store(true, Ordering::SeqCst);

    let mut alice = server.join(server.host).await;
    assert_eq!(
        alice.next_json().await,
        json!({"action": "error", "message": "Something went wrong"})
    );
    alice.expect_close().await;

    wait_until(|| server.state.open_sessions() == 0).await;
    assert_eq!(server.broker.channel_count(), 0);
}

#[tokio::test]
async fn history_accepts_percent_encoded_query_token() {
    let server = TestServer::with_defaults().await;
    let token = token_for(server.member).replace('.', "%2E");

    let response = reqwest::Client::new()
        .get(format!(
            "http://{}/api/clubs/{}?token={}",
            server.addr, server.club_id, token
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn history_endpoint_is_member_only() {
    let server = TestServer::with_defaults().await;
    server
        .store
        .create_chat_message(server.host, server.club_id, "first")
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let url = format!("http://{}/api/clubs/{}", server.addr, server.club_id);

    let response = http
        .get(&url)
        .bearer_auth(token_for(server.member))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["club"]["id"], server.club_id.to_string());
    assert_eq!(body["chat"][0]["message"], "first");
    assert_eq!(body["members"].as_array().unwrap().len(), 2);

    let response = http
        .get(&url)
        .bearer_auth(token_for(Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);

    let response = http.get(&url).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_and_ready_respond() {
    let server = TestServer::with_defaults().await;
    let http = reqwest::Client::new();

    for path in ["health", "ready"] {
        let response = http
            .get(format!("http://{}/api/{}", server.addr, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn diagnostics_count_sessions_and_channels() {
    let server = TestServer::with_defaults().await;
    let _alice = server.join(server.host).await;
    let _bob = server.join(server.member).await;
    server.wait_for_subscribers(2).await;

    let body: Value = reqwest::Client::new()
        .get(format!("http://{}/api/v1/diagnostics", server.addr))
        .bearer_auth(token_for(server.host))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["n_sessions"], 2);
    assert_eq!(body["n_channels"], 1);
    assert_eq!(body["n_subscriptions"], 2);
}
