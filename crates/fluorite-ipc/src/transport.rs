//! Socket transports and the per-connection writer task

use fluorite_core::ProtocolConfig;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Frames queued per connection before senders wait
const OUTBOUND_CAPACITY: usize = 256;

/// How long a closing writer may spend flushing queued frames
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a server listens or a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket path wins over host/port when both are configured
    pub fn from_protocol(protocol: &ProtocolConfig) -> Self {
        match &protocol.socket_path {
            Some(path) => Self::Unix(path.clone()),
            None => Self::tcp(protocol.host.clone(), protocol.port),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::from_protocol(&ProtocolConfig::default())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Open a client connection
pub async fn connect(endpoint: &Endpoint) -> io::Result<(BoxedReader, BoxedWriter)> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(unix_unsupported()),
    }
}

#[cfg(not(unix))]
fn unix_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "unix domain sockets are not available on this platform",
    )
}

/// A bound server socket
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    /// Bind `endpoint`. A stale socket file left by a previous run is removed
    /// first.
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port)).await?;
                Ok(Self::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    debug!("Removing stale socket {}", path.display());
                    std::fs::remove_file(path)?;
                }
                let listener = tokio::net::UnixListener::bind(path)?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(unix_unsupported()),
        }
    }

    /// Bound address; for TCP this resolves port 0 to the real port
    pub fn local_address(&self) -> io::Result<String> {
        match self {
            Self::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(path.display().to_string()),
        }
    }

    /// Socket file to unlink on shutdown
    pub fn socket_path(&self) -> Option<PathBuf> {
        match self {
            Self::Tcp(_) => None,
            #[cfg(unix)]
            Self::Unix { path, .. } => Some(path.clone()),
        }
    }

    /// Accept one connection, returning its halves and a peer description
    pub async fn accept(&self) -> io::Result<(BoxedReader, BoxedWriter, String)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer), peer.to_string()))
            }
            #[cfg(unix)]
            Self::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((
                    Box::new(reader),
                    Box::new(writer),
                    format!("unix:{}", path.display()),
                ))
            }
        }
    }
}

/// Owner side of a writer task
///
/// Frames go through the `mpsc::Sender` returned by [`spawn_writer`]; a single
/// task writes them so frames never interleave.
pub struct WriterHandle {
    close: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WriterHandle {
    /// Flush frames already queued, then shut the socket down
    pub async fn finish(self) {
        let _ = self.close.send(());
        if tokio::time::timeout(FLUSH_TIMEOUT, self.task).await.is_err() {
            warn!("Writer did not flush within {:?}", FLUSH_TIMEOUT);
        }
    }
}

/// Spawn the single writer for one connection
pub fn spawn_writer(mut writer: BoxedWriter) -> (mpsc::Sender<String>, WriterHandle) {
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = rx.recv() => match frame {
                    Some(line) => {
                        if let Err(e) = write_frame(&mut writer, &line).await {
                            debug!("Write failed: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut close_rx => {
                    while let Ok(line) = rx.try_recv() {
                        if write_frame(&mut writer, &line).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    });

    (tx, WriterHandle { close: close_tx, task })
}

async fn write_frame(writer: &mut BoxedWriter, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_protocol() {
        let mut protocol = ProtocolConfig::default();
        assert_eq!(
            Endpoint::from_protocol(&protocol),
            Endpoint::tcp("127.0.0.1", fluorite_core::DEFAULT_IPC_PORT)
        );

        protocol.socket_path = Some(PathBuf::from("/tmp/fluorite.sock"));
        let endpoint = Endpoint::from_protocol(&protocol);
        assert_eq!(endpoint, Endpoint::Unix(PathBuf::from("/tmp/fluorite.sock")));
        assert_eq!(endpoint.to_string(), "/tmp/fluorite.sock");
    }

    #[tokio::test]
    async fn test_tcp_port_zero_resolves() {
        let listener = Listener::bind(&Endpoint::tcp("127.0.0.1", 0)).await.unwrap();
        let address = listener.local_address().unwrap();
        assert!(!address.ends_with(":0"));
        assert!(listener.socket_path().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipc.sock");
        std::fs::write(&path, b"stale").unwrap();

        let listener = Listener::bind(&Endpoint::Unix(path.clone())).await.unwrap();
        assert_eq!(listener.socket_path(), Some(path));
    }
}
