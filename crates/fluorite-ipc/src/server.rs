//! JSON-RPC server
//!
//! One accept loop per server and one task per connection. Each connection
//! reads newline-delimited frames, gates everything except `auth.login`
//! behind the configured token, and dispatches requests concurrently.
//! Responses go out through the connection's single writer task in the order
//! handlers finish, not the order requests arrived.
//!
//! ```text
//! accept loop ──spawn──▶ connection task ──spawn──▶ handler task
//!                              │                          │
//!                              └──── mpsc ──▶ writer ◀────┘
//! ```

use fluorite_core::ProtocolConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IpcError, Result};
use crate::framing::{Frame, LineBuffer};
use crate::protocol::{decode_request, Inbound, RpcError, RpcId, RpcNotification, RpcRequest, RpcResponse};
use crate::transport::{spawn_writer, BoxedReader, BoxedWriter, Endpoint, Listener};

/// Method handled by the connection itself rather than the registry
pub const AUTH_LOGIN: &str = "auth.login";

const EVENT_CAPACITY: usize = 256;
const READ_CHUNK: usize = 8 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of a method handler
pub type HandlerResult = std::result::Result<Value, RpcError>;

type Handler =
    Arc<dyn Fn(Option<Value>, CallContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Maps method names to async handlers
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, replacing any previous handler
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params, ctx| handler(params, ctx).boxed());
        self.handlers.insert(method.into(), handler);
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).cloned()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Per-call context handed to handlers
#[derive(Clone)]
pub struct CallContext {
    connection_id: Arc<str>,
    method: String,
    id: Option<RpcId>,
    outbound: mpsc::Sender<String>,
}

impl CallContext {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn request_id(&self) -> Option<&RpcId> {
        self.id.as_ref()
    }

    /// Emit a `<method>.chunk` notification ahead of the final response.
    ///
    /// Returns `false` for notifications (nothing to correlate with) and once
    /// the connection is gone, so streaming handlers know to stop.
    pub async fn send_chunk(&self, data: Value) -> bool {
        let Some(id) = &self.id else {
            return false;
        };
        match serde_json::to_string(&RpcNotification::chunk(&self.method, id, data)) {
            Ok(line) => self.outbound.send(line).await.is_ok(),
            Err(e) => {
                warn!("Failed to encode chunk for {}: {}", self.method, e);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Server settings
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub endpoint: Endpoint,
    /// Token required by `auth.login`; `None` leaves connections open
    pub auth_token: Option<String>,
}

impl ServerConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn from_protocol(protocol: &ProtocolConfig) -> Self {
        Self {
            endpoint: Endpoint::from_protocol(protocol),
            auth_token: protocol.auth_token.clone(),
        }
    }
}

/// Lifecycle and diagnostic events
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Listening { address: String, auth_required: bool },
    Connection { id: String, peer: String },
    Disconnection { id: String },
    ParseError {
        connection: String,
        line: String,
        message: String,
    },
    Error { message: String },
}

struct Shared {
    methods: MethodRegistry,
    auth_token: Option<String>,
    events: broadcast::Sender<ServerEvent>,
    connections: AtomicUsize,
}

struct Running {
    address: String,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    socket_path: Option<PathBuf>,
}

/// JSON-RPC server over TCP or a Unix domain socket
pub struct IpcServer {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl IpcServer {
    /// Build a server around `methods`; the `system.*` built-ins are added
    pub fn new(config: ServerConfig, mut methods: MethodRegistry) -> Self {
        register_system_methods(&mut methods, Instant::now());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let auth_token = config.auth_token.filter(|token| !token.is_empty());

        Self {
            endpoint: config.endpoint,
            shared: Arc::new(Shared {
                methods,
                auth_token,
                events,
                connections: AtomicUsize::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// Bind and start accepting; returns the bound address
    pub async fn start(&self) -> Result<String> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(IpcError::Server("server is already running".to_string()));
        }

        let listener = Listener::bind(&self.endpoint).await?;
        let address = listener.local_address()?;
        let socket_path = listener.socket_path();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let auth_required = self.shared.auth_token.is_some();
        info!(%address, auth_required, "IPC server listening");
        self.shared.emit(ServerEvent::Listening {
            address: address.clone(),
            auth_required,
        });

        let accept_task = tokio::spawn(accept_loop(listener, self.shared.clone(), shutdown_rx));
        *running = Some(Running {
            address: address.clone(),
            shutdown,
            accept_task,
            socket_path,
        });
        Ok(address)
    }

    /// Close every connection, unlink the socket file and wait for the
    /// connection tasks. Stopping a stopped server is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.accept_task.await {
            error!("Accept loop failed: {}", e);
        }

        if let Some(path) = running.socket_path {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove socket {}: {}", path.display(), e);
                }
            }
        }
        info!("IPC server stopped");
    }

    pub async fn local_address(&self) -> Option<String> {
        self.running.lock().await.as_ref().map(|r| r.address.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn auth_required(&self) -> bool {
        self.shared.auth_token.is_some()
    }

    /// Every method a client can call, `auth.login` included
    pub fn methods(&self) -> Vec<String> {
        let mut names = self.shared.methods.methods();
        names.push(AUTH_LOGIN.to_string());
        names.sort();
        names
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }
}

fn register_system_methods(methods: &mut MethodRegistry, started: Instant) {
    methods.register("system.ping", |_, _| async {
        Ok(json!({
            "pong": true,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
    });

    methods.register("system.version", |_, _| async {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "runtime": "rust",
        }))
    });

    methods.register("system.info", move |_, _| async move {
        Ok(json!({
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": env!("CARGO_PKG_VERSION"),
            "pid": std::process::id(),
            "uptimeMs": started.elapsed().as_millis() as u64,
        }))
    });
}

async fn accept_loop(listener: Listener, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((reader, writer, peer)) => {
                    let id = Uuid::new_v4().to_string();
                    connections.spawn(serve_connection(
                        shared.clone(),
                        id,
                        peer,
                        reader,
                        writer,
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    shared.emit(ServerEvent::Error { message: e.to_string() });
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

/// Connection-local state
struct Session {
    id: Arc<str>,
    authenticated: bool,
    outbound: mpsc::Sender<String>,
    inflight: JoinSet<()>,
}

impl Session {
    async fn respond(&self, response: RpcResponse) {
        send_response(&self.id, &self.outbound, response).await;
    }
}

async fn send_response(connection: &str, outbound: &mpsc::Sender<String>, response: RpcResponse) {
    match serde_json::to_string(&response) {
        Ok(line) => {
            debug!(%connection, "-> {}", line);
            if outbound.send(line).await.is_err() {
                debug!(%connection, "Connection closed before response was written");
            }
        }
        Err(e) => error!(%connection, "Failed to encode response: {}", e),
    }
}

async fn serve_connection(
    shared: Arc<Shared>,
    id: String,
    peer: String,
    mut reader: BoxedReader,
    writer: BoxedWriter,
    mut shutdown: watch::Receiver<bool>,
) {
    shared.connections.fetch_add(1, Ordering::SeqCst);
    info!(connection = %id, %peer, "Client connected");
    shared.emit(ServerEvent::Connection {
        id: id.clone(),
        peer,
    });

    let (outbound, writer) = spawn_writer(writer);
    let mut session = Session {
        id: Arc::from(id.as_str()),
        authenticated: shared.auth_token.is_none(),
        outbound,
        inflight: JoinSet::new(),
    };
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for frame in buffer.push(&chunk[..n]) {
                        match frame {
                            Frame::Line(line) => shared.handle_line(&mut session, line).await,
                            Frame::Oversized { len } => {
                                warn!(connection = %id, len, "Dropping oversized frame");
                                shared.emit(ServerEvent::ParseError {
                                    connection: id.clone(),
                                    line: String::new(),
                                    message: format!(
                                        "frame exceeds {} bytes",
                                        buffer.max_frame()
                                    ),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(connection = %id, "Read failed: {}", e);
                    break;
                }
            },
            Some(_) = session.inflight.join_next(), if !session.inflight.is_empty() => {}
        }
    }

    session.inflight.abort_all();
    drop(session);
    writer.finish().await;

    shared.connections.fetch_sub(1, Ordering::SeqCst);
    info!(connection = %id, "Client disconnected");
    shared.emit(ServerEvent::Disconnection { id });
}

/// Aborts the wrapped task when dropped, so aborting a dispatch also stops
/// its handler
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Shared {
    fn emit(&self, event: ServerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn handle_line(&self, session: &mut Session, line: String) {
        debug!(connection = %session.id, "<- {}", line);

        let request = match decode_request(&line) {
            Ok(Inbound::Request(request)) => request,
            Ok(Inbound::Invalid { id, reason }) => {
                session
                    .respond(RpcResponse::failure(id, RpcError::invalid_request(reason)))
                    .await;
                return;
            }
            Err(e) => {
                warn!(connection = %session.id, "Malformed frame: {}", e);
                self.emit(ServerEvent::ParseError {
                    connection: session.id.to_string(),
                    line,
                    message: e.to_string(),
                });
                return;
            }
        };

        // Handled inline so requests after it see the new auth state
        if request.method == AUTH_LOGIN {
            let outcome = self.login(session, request.params.as_ref());
            if let Some(id) = request.id {
                session.respond(into_response(Some(id), outcome)).await;
            }
            return;
        }

        if !session.authenticated {
            debug!(connection = %session.id, method = %request.method, "Rejected unauthenticated call");
            if let Some(id) = request.id {
                session
                    .respond(RpcResponse::failure(Some(id), RpcError::unauthorized()))
                    .await;
            }
            return;
        }

        let Some(handler) = self.methods.get(&request.method) else {
            if let Some(id) = request.id {
                let error = RpcError::method_not_found(&request.method);
                session.respond(RpcResponse::failure(Some(id), error)).await;
            }
            return;
        };

        let RpcRequest {
            id, method, params, ..
        } = request;
        let ctx = CallContext {
            connection_id: session.id.clone(),
            method: method.clone(),
            id: id.clone(),
            outbound: session.outbound.clone(),
        };
        let connection = session.id.clone();
        let outbound = session.outbound.clone();

        session.inflight.spawn(async move {
            let mut task = AbortOnDrop(tokio::spawn(handler(params, ctx)));
            let outcome = match (&mut task.0).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%connection, %method, "Handler failed: {}", e);
                    Err(RpcError::internal(format!("Handler for {} failed", method)))
                }
            };
            if id.is_some() {
                send_response(&connection, &outbound, into_response(id, outcome)).await;
            }
        });
    }

    fn login(&self, session: &mut Session, params: Option<&Value>) -> HandlerResult {
        let Some(expected) = &self.auth_token else {
            session.authenticated = true;
            return Ok(json!({ "authenticated": true }));
        };

        let token = params
            .and_then(|p| p.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("auth.login requires a token"))?;

        if token == expected {
            session.authenticated = true;
            info!(connection = %session.id, "Client authenticated");
            Ok(json!({ "authenticated": true }))
        } else {
            warn!(connection = %session.id, "Rejected auth.login with an invalid token");
            Err(RpcError::new(crate::error::UNAUTHORIZED, "Invalid token"))
        }
    }
}

fn into_response(id: Option<RpcId>, outcome: HandlerResult) -> RpcResponse {
    match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{INTERNAL_ERROR, METHOD_NOT_FOUND, UNAUTHORIZED};

    fn session(authenticated: bool) -> (Session, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(16);
        let session = Session {
            id: Arc::from("test"),
            authenticated,
            outbound,
            inflight: JoinSet::new(),
        };
        (session, rx)
    }

    fn shared(methods: MethodRegistry, token: Option<&str>) -> Shared {
        let mut methods = methods;
        register_system_methods(&mut methods, Instant::now());
        Shared {
            methods,
            auth_token: token.map(String::from),
            events: broadcast::channel(16).0,
            connections: AtomicUsize::new(0),
        }
    }

    async fn next_response(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[test]
    fn test_registry_lists_methods() {
        let mut methods = MethodRegistry::new();
        methods.register("b.two", |_, _| async { Ok(Value::Null) });
        methods.register("a.one", |_, _| async { Ok(Value::Null) });
        assert_eq!(methods.methods(), vec!["a.one", "b.two"]);
        assert!(methods.contains("a.one"));
        assert!(!methods.contains("c"));
    }

    #[tokio::test]
    async fn test_gate_until_login() {
        let shared = shared(MethodRegistry::new(), Some("secret"));
        let (mut session, mut rx) = session(false);

        let ping = r#"{"jsonrpc":"2.0","id":1,"method":"system.ping"}"#.to_string();
        shared.handle_line(&mut session, ping.clone()).await;
        assert_eq!(next_response(&mut rx).await["error"]["code"], UNAUTHORIZED);

        let bad = r#"{"jsonrpc":"2.0","id":2,"method":"auth.login","params":{"token":"nope"}}"#;
        shared.handle_line(&mut session, bad.to_string()).await;
        assert_eq!(next_response(&mut rx).await["error"]["code"], UNAUTHORIZED);
        assert!(!session.authenticated);

        let good = r#"{"jsonrpc":"2.0","id":3,"method":"auth.login","params":{"token":"secret"}}"#;
        shared.handle_line(&mut session, good.to_string()).await;
        assert_eq!(next_response(&mut rx).await["result"]["authenticated"], true);

        shared.handle_line(&mut session, ping).await;
        let response = next_response(&mut rx).await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["pong"], true);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let shared = shared(MethodRegistry::new(), None);
        let (mut session, mut rx) = session(true);
        let line = r#"{"jsonrpc":"2.0","id":"x","method":"nope"}"#.to_string();
        shared.handle_line(&mut session, line).await;

        let response = next_response(&mut rx).await;
        assert_eq!(response["id"], "x");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let mut methods = MethodRegistry::new();
        methods.register("boom", |_, _| async {
            if true {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        });
        let shared = shared(methods, None);
        let (mut session, mut rx) = session(true);

        let line = r#"{"jsonrpc":"2.0","id":9,"method":"boom"}"#.to_string();
        shared.handle_line(&mut session, line).await;

        let response = next_response(&mut rx).await;
        assert_eq!(response["id"], 9);
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let shared = shared(MethodRegistry::new(), None);
        let (mut session, mut rx) = session(true);
        shared
            .handle_line(&mut session, r#"{"jsonrpc":"2.0","method":"system.ping"}"#.to_string())
            .await;
        while session.inflight.join_next().await.is_some() {}
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_line_emits_event_only() {
        let shared = shared(MethodRegistry::new(), None);
        let mut events = shared.events.subscribe();
        let (mut session, mut rx) = session(true);

        shared.handle_line(&mut session, "{oops".to_string()).await;
        assert!(rx.try_recv().is_err());
        match events.recv().await.unwrap() {
            ServerEvent::ParseError { line, .. } => assert_eq!(line, "{oops"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let server = IpcServer::new(
            ServerConfig::new(Endpoint::tcp("127.0.0.1", 0)),
            MethodRegistry::new(),
        );
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
        server.stop().await;
        assert!(!server.is_running().await);
        server.stop().await;
    }
}
