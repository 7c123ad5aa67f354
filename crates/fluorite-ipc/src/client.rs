//! JSON-RPC client
//!
//! Requests get monotonically increasing numeric ids and wait on a oneshot
//! in the pending map until the reader task sees the matching response.
//! Responses that arrive after a timeout find no entry and are dropped.
//!
//! When the transport closes every pending request fails with
//! [`IpcError::ConnectionLost`]. With `reconnect` enabled a single timer is
//! scheduled; a failed attempt schedules the next one.
//!
//! Connecting is serialized, so clones and the reconnect timer never open a
//! second socket. Each link carries a generation and a reader only tears down
//! the link it was started for.

use fluorite_core::ProtocolConfig;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{IpcError, Result};
use crate::framing::{Frame, LineBuffer};
use crate::protocol::{
    decode_server_message, RpcId, RpcNotification, RpcRequest, RpcResponse, ServerMessage,
    CHUNK_SUFFIX,
};
use crate::server::AUTH_LOGIN;
use crate::transport::{self, spawn_writer, BoxedReader, Endpoint, WriterHandle};

const EVENT_CAPACITY: usize = 256;
const READ_CHUNK: usize = 8 * 1024;
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// Sent with `auth.login` right after connecting
    pub auth_token: Option<String>,
    /// Per-request limit; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub reconnect: bool,
    pub reconnect_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            auth_token: None,
            timeout: None,
            reconnect: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    pub fn from_protocol(protocol: &ProtocolConfig) -> Self {
        Self {
            endpoint: Endpoint::from_protocol(protocol),
            auth_token: protocol.auth_token.clone(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_reconnect(mut self, interval: Duration) -> Self {
        self.reconnect = true;
        self.reconnect_interval = interval;
        self
    }
}

/// Connection lifecycle and server-pushed messages
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Notification { method: String, params: Value },
    ParseError { line: String, message: String },
    Error { message: String },
}

type ChunkHandler = Box<dyn FnMut(Value) + Send>;
type Reply = oneshot::Sender<Result<Value>>;

struct Link {
    generation: u64,
    outbound: mpsc::Sender<String>,
    writer: WriterHandle,
    reader: Option<JoinHandle<()>>,
}

struct Shared {
    config: ClientConfig,
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, Reply>>,
    streams: Mutex<HashMap<i64, ChunkHandler>>,
    link: Mutex<Option<Link>>,
    /// Held while a connection is being opened and logged in
    connecting: AsyncMutex<()>,
    generation: AtomicU64,
    connected: AtomicBool,
    authenticated: AtomicBool,
    manual_close: AtomicBool,
    reconnect_scheduled: AtomicBool,
    reconnect_attempts: AtomicU32,
    events: broadcast::Sender<ClientEvent>,
}

/// Cheap to clone; clones share one connection
#[derive(Clone)]
pub struct IpcClient {
    shared: Arc<Shared>,
}

impl IpcClient {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                streams: Mutex::new(HashMap::new()),
                link: Mutex::new(None),
                connecting: AsyncMutex::new(()),
                generation: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                authenticated: AtomicBool::new(false),
                manual_close: AtomicBool::new(false),
                reconnect_scheduled: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                events,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Open the transport and, when a token is configured, authenticate.
    ///
    /// A rejected token returns [`IpcError::AuthenticationFailed`] and leaves
    /// the socket open but unauthenticated; calling `connect` again retries
    /// the login on that socket.
    pub async fn connect(&self) -> Result<()> {
        self.shared.manual_close.store(false, Ordering::SeqCst);
        let _connecting = self.shared.connecting.lock().await;

        if !self.is_connected() {
            return establish(&self.shared).await;
        }
        if self.is_authenticated() {
            return Ok(());
        }
        login(&self.shared).await
    }

    /// Close the connection without reconnecting and fail pending requests
    pub async fn disconnect(&self) {
        self.shared.manual_close.store(true, Ordering::SeqCst);
        let reader = lock(&self.shared.link)
            .as_mut()
            .and_then(|link| link.reader.take());
        if let Some(reader) = reader {
            reader.abort();
        }
        close_link(&self.shared, None).await;
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request(method, params, None).await
    }

    /// Like [`call`](Self::call), feeding each `<method>.chunk` for this
    /// request to `on_chunk` until the final response arrives
    pub async fn call_stream<F>(&self, method: &str, params: Option<Value>, on_chunk: F) -> Result<Value>
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.request(method, params, Some(Box::new(on_chunk))).await
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Connected and past `auth.login` (or no token is configured)
    pub fn is_authenticated(&self) -> bool {
        self.is_connected() && self.shared.authenticated.load(Ordering::SeqCst)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        on_chunk: Option<ChunkHandler>,
    ) -> Result<Value> {
        let outbound = self.shared.outbound().ok_or(IpcError::NotConnected)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        lock(&self.shared.pending).insert(id, tx);
        if let Some(handler) = on_chunk {
            lock(&self.shared.streams).insert(id, handler);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        // A close that drained the map before our insert would leave us waiting
        if !self.is_connected() {
            return Err(IpcError::ConnectionLost);
        }

        let line = serde_json::to_string(&RpcRequest::new(id, method, params))?;
        debug!("-> {}", line);
        if outbound.send(line).await.is_err() {
            return Err(IpcError::ConnectionLost);
        }
        drop(outbound);

        let received = match self.shared.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(id, method, "Request timed out after {:?}", limit);
                    return Err(IpcError::Timeout {
                        method: method.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };
        received.unwrap_or(Err(IpcError::ConnectionLost))
    }
}

/// Drops the pending entry and stream handler on every exit path
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.shared.pending).remove(&self.id);
        lock(&self.shared.streams).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn outbound(&self) -> Option<mpsc::Sender<String>> {
        lock(&self.link).as_ref().map(|link| link.outbound.clone())
    }

    fn dispatch(&self, line: String) {
        debug!("<- {}", line);
        match decode_server_message(&line) {
            Ok(ServerMessage::Response(response)) => self.resolve(response),
            Ok(ServerMessage::Notification(notification)) => self.notify(notification),
            Err(message) => {
                warn!("Unparseable frame from server: {}", message);
                self.emit(ClientEvent::ParseError { line, message });
            }
        }
    }

    fn resolve(&self, response: RpcResponse) {
        let Some(RpcId::Num(id)) = response.id else {
            debug!("Dropping response with unknown id {:?}", response.id);
            return;
        };

        lock(&self.streams).remove(&id);
        let reply = lock(&self.pending).remove(&id);
        match reply {
            Some(reply) => {
                let _ = reply.send(response.into_result().map_err(IpcError::from));
            }
            None => debug!(id, "Dropping stale response"),
        }
    }

    fn notify(&self, notification: RpcNotification) {
        if notification.method.ends_with(CHUNK_SUFFIX) {
            if let Some(id) = notification.params.get("id").and_then(Value::as_i64) {
                let mut streams = lock(&self.streams);
                if let Some(on_chunk) = streams.get_mut(&id) {
                    on_chunk(notification.params.get("data").cloned().unwrap_or(Value::Null));
                    return;
                }
            }
        }

        self.emit(ClientEvent::Notification {
            method: notification.method,
            params: notification.params,
        });
    }
}

/// Open a new link. Callers hold `connecting`.
async fn establish(shared: &Arc<Shared>) -> Result<()> {
    let (reader, writer) = transport::connect(&shared.config.endpoint).await?;
    let (outbound, writer) = spawn_writer(writer);
    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

    *lock(&shared.link) = Some(Link {
        generation,
        outbound,
        writer,
        reader: None,
    });
    shared
        .authenticated
        .store(shared.config.auth_token.is_none(), Ordering::SeqCst);
    shared.connected.store(true, Ordering::SeqCst);

    let reader = tokio::spawn(read_loop(shared.clone(), reader, generation));
    if let Some(link) = lock(&shared.link).as_mut().filter(|l| l.generation == generation) {
        link.reader = Some(reader);
    }

    shared.reconnect_attempts.store(0, Ordering::SeqCst);
    info!(endpoint = %shared.config.endpoint, generation, "Connected to IPC server");
    shared.emit(ClientEvent::Connected);

    login(shared).await
}

/// Present the configured token on the current link
async fn login(shared: &Arc<Shared>) -> Result<()> {
    let Some(token) = &shared.config.auth_token else {
        shared.authenticated.store(true, Ordering::SeqCst);
        return Ok(());
    };

    let client = IpcClient {
        shared: shared.clone(),
    };
    client
        .call(AUTH_LOGIN, Some(json!({ "token": token })))
        .await
        .map_err(|e| IpcError::AuthenticationFailed(e.to_string()))?;
    shared.authenticated.store(true, Ordering::SeqCst);
    debug!("Authenticated with IPC server");
    Ok(())
}

async fn read_loop(shared: Arc<Shared>, mut reader: BoxedReader, generation: u64) {
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for frame in buffer.push(&chunk[..n]) {
                    match frame {
                        Frame::Line(line) => shared.dispatch(line),
                        Frame::Oversized { len } => {
                            warn!(len, "Dropping oversized frame from server");
                            shared.emit(ClientEvent::ParseError {
                                line: String::new(),
                                message: format!("frame exceeds {} bytes", buffer.max_frame()),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                debug!("Read failed: {}", e);
                break;
            }
        }
    }

    close_link(&shared, Some(generation)).await;
}

/// Tear down the current link once, however many paths notice the close.
/// With `generation` set, a link opened since then is left alone.
async fn close_link(shared: &Arc<Shared>, generation: Option<u64>) {
    let link = {
        let mut slot = lock(&shared.link);
        let current = slot.as_ref().map(|link| link.generation);
        if generation.is_some() && current.is_some() && current != generation {
            debug!(?generation, ?current, "Ignoring close from a replaced link");
            return;
        }
        if !shared.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        shared.authenticated.store(false, Ordering::SeqCst);
        slot.take()
    };
    let orphaned: Vec<Reply> = lock(&shared.pending).drain().map(|(_, reply)| reply).collect();
    for reply in orphaned {
        let _ = reply.send(Err(IpcError::ConnectionLost));
    }
    lock(&shared.streams).clear();

    info!("Disconnected from IPC server");
    shared.emit(ClientEvent::Disconnected);

    if let Some(link) = link {
        drop(link.outbound);
        link.writer.finish().await;
    }

    if shared.config.reconnect && !shared.manual_close.load(Ordering::SeqCst) {
        schedule_reconnect(shared.clone());
    }
}

/// Arm the reconnect timer unless one is already pending
fn schedule_reconnect(shared: Arc<Shared>) {
    if shared
        .reconnect_scheduled
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("Reconnect already scheduled");
        return;
    }

    let attempt = shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = shared.config.reconnect_interval;
    info!(attempt, "Reconnecting in {:?}", delay);
    shared.emit(ClientEvent::Reconnecting { attempt });

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        shared.reconnect_scheduled.store(false, Ordering::SeqCst);

        let _connecting = shared.connecting.lock().await;
        if shared.manual_close.load(Ordering::SeqCst) || shared.connected.load(Ordering::SeqCst) {
            return;
        }

        if let Err(e) = establish(&shared).await {
            warn!(attempt, "Reconnect failed: {}", e);
            shared.emit(ClientEvent::Error {
                message: e.to_string(),
            });
            // A failed login leaves the socket open; only retry dead links
            if !shared.connected.load(Ordering::SeqCst) && !shared.manual_close.load(Ordering::SeqCst)
            {
                schedule_reconnect(shared.clone());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: ClientConfig) -> IpcClient {
        IpcClient::new(config)
    }

    #[tokio::test]
    async fn test_call_before_connect() {
        let client = client(ClientConfig::default());
        let err = client.call("system.ping", None).await.unwrap_err();
        assert!(matches!(err, IpcError::NotConnected));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_single_reconnect_timer() {
        let client = client(
            ClientConfig::new(Endpoint::tcp("127.0.0.1", 9))
                .with_reconnect(Duration::from_secs(60)),
        );
        let mut events = client.subscribe();

        for _ in 0..5 {
            schedule_reconnect(client.shared.clone());
        }

        assert_eq!(client.reconnect_attempts(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Reconnecting { attempt: 1 }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replaced_link_ignores_stale_close() {
        let client = client(ClientConfig::default());
        let (_peer, ours) = tokio::io::duplex(64);
        let (outbound, writer) = spawn_writer(Box::new(ours));
        *lock(&client.shared.link) = Some(Link {
            generation: 2,
            outbound,
            writer,
            reader: None,
        });
        client.shared.connected.store(true, Ordering::SeqCst);
        client.shared.authenticated.store(true, Ordering::SeqCst);

        // A reader from generation 1 finishing late must not take down generation 2
        close_link(&client.shared, Some(1)).await;
        assert!(client.is_connected());
        assert!(client.is_authenticated());

        close_link(&client.shared, Some(2)).await;
        assert!(!client.is_connected());
        assert!(!client.is_authenticated());
        assert!(lock(&client.shared.link).is_none());
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let client = client(ClientConfig::default());
        let (tx, mut rx) = oneshot::channel();
        lock(&client.shared.pending).insert(7, tx);

        client
            .shared
            .dispatch(r#"{"jsonrpc":"2.0","id":99,"result":true}"#.to_string());
        assert_eq!(client.pending_count(), 1);

        client
            .shared
            .dispatch(r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope"}}"#.to_string());
        assert_eq!(client.pending_count(), 0);
        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.code(), Some(-32601));
    }

    #[test]
    fn test_chunks_route_to_stream_handler() {
        let client = client(ClientConfig::default());
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = seen.clone();
        lock(&client.shared.streams).insert(
            3,
            Box::new(move |data: Value| sink.lock().unwrap().push(data)),
        );
        let mut events = client.subscribe();

        client.shared.dispatch(
            r#"{"jsonrpc":"2.0","method":"dashboard.watch.chunk","params":{"id":3,"data":1}}"#
                .to_string(),
        );
        client.shared.dispatch(
            r#"{"jsonrpc":"2.0","method":"dashboard.watch.chunk","params":{"id":4,"data":2}}"#
                .to_string(),
        );

        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        match events.try_recv().unwrap() {
            ClientEvent::Notification { params, .. } => assert_eq!(params["id"], 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_garbage_frame_emits_parse_error() {
        let client = client(ClientConfig::default());
        let mut events = client.subscribe();
        client.shared.dispatch("not json".to_string());
        assert!(matches!(
            events.try_recv().unwrap(),
            ClientEvent::ParseError { .. }
        ));
    }
}
