//! Listening and dialing per endpoint scheme.

#[cfg(unix)]
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Endpoint, Result, TransportContext, TransportError};

/// Buffer size of each direction of an in-process stream.
const INPROC_BUFFER: usize = 64 * 1024;

/// A connected byte stream to one peer.
pub(crate) trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub(crate) type BoxedStream = Box<dyn PeerStream>;

/// Accepts peer connections on a bound endpoint.
#[async_trait]
pub(crate) trait Acceptor: Send {
    /// Wait for the next peer. `Ok(None)` means the listener is gone for good.
    async fn accept(&mut self) -> Result<Option<(BoxedStream, String)>>;

    /// The endpoint actually bound (resolves `tcp://host:0`).
    fn local_endpoint(&self) -> Endpoint;
}

struct TcpAcceptor {
    listener: TcpListener,
    local: Endpoint,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Option<(BoxedStream, String)>> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(Some((Box::new(stream), peer.to_string())))
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }
}

/// Listener on a socket file. The file is removed when the acceptor goes.
#[cfg(unix)]
struct UnixAcceptor {
    listener: tokio::net::UnixListener,
    path: PathBuf,
    local: Endpoint,
}

#[cfg(unix)]
impl UnixAcceptor {
    /// Bind `path`, replacing a socket file left behind by an earlier run.
    ///
    /// Anything at `path` that is not a socket is left alone and the bind fails.
    fn bind(path: &Path, local: Endpoint) -> std::io::Result<Self> {
        use std::os::unix::fs::FileTypeExt;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_socket() => {
                debug!(path = %path.display(), "Replacing stale socket file");
                std::fs::remove_file(path)?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = tokio::net::UnixListener::bind(path)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            local,
        })
    }
}

#[cfg(unix)]
impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl Acceptor for UnixAcceptor {
    async fn accept(&mut self) -> Result<Option<(BoxedStream, String)>> {
        let (stream, _) = self.listener.accept().await?;
        Ok(Some((Box::new(stream), self.local.to_string())))
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }
}

struct InprocAcceptor {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
    name: String,
    context: TransportContext,
}

#[async_trait]
impl Acceptor for InprocAcceptor {
    async fn accept(&mut self) -> Result<Option<(BoxedStream, String)>> {
        Ok(self
            .incoming
            .recv()
            .await
            .map(|stream| (Box::new(stream) as BoxedStream, format!("inproc://{}", self.name))))
    }

    fn local_endpoint(&self) -> Endpoint {
        Endpoint::Inproc(self.name.clone())
    }
}

impl Drop for InprocAcceptor {
    fn drop(&mut self) {
        self.incoming.close();
        self.context.unregister_inproc(&self.name);
    }
}

/// Bind a listener on the endpoint.
pub(crate) async fn bind(
    context: &TransportContext,
    endpoint: &Endpoint,
) -> Result<Box<dyn Acceptor>> {
    let bind_err = |source: std::io::Error| TransportError::Bind {
        endpoint: endpoint.to_string(),
        source,
    };

    match endpoint {
        Endpoint::Tcp(addr) => {
            let addr = match addr.strip_prefix("*:") {
                Some(port) => format!("0.0.0.0:{}", port),
                None => addr.clone(),
            };
            let listener = TcpListener::bind(&addr).await.map_err(bind_err)?;
            let local = Endpoint::Tcp(listener.local_addr().map_err(bind_err)?.to_string());
            info!(endpoint = %local, transport = "tcp", "Listening");
            Ok(Box::new(TcpAcceptor { listener, local }))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let acceptor = UnixAcceptor::bind(path, endpoint.clone()).map_err(bind_err)?;
            info!(endpoint = %endpoint, transport = "ipc", "Listening");
            Ok(Box::new(acceptor))
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
        Endpoint::Inproc(name) => {
            let incoming = context.register_inproc(name)?;
            info!(endpoint = %endpoint, transport = "inproc", "Listening");
            Ok(Box::new(InprocAcceptor {
                incoming,
                name: name.clone(),
                context: context.clone(),
            }))
        }
    }
}

/// Make one connection attempt to the endpoint.
pub(crate) async fn dial(context: &TransportContext, endpoint: &Endpoint) -> Result<BoxedStream> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(TransportError::InvalidEndpoint(endpoint.to_string())),
        Endpoint::Inproc(name) => Ok(Box::new(context.dial_inproc(name, INPROC_BUFFER)?)),
    }
}
