//! Listener implementation for admin and service sockets.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use tracing::{info, warn};

use guild_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Listener bound to, or inherited for, a socket endpoint.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl ListenerKind {
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(listener) => listener.try_clone().map(Self::Tcp),
            Self::Unix(listener) => listener.try_clone().map(Self::Unix),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(nonblocking),
            Self::Unix(listener) => listener.set_nonblocking(nonblocking),
        }
    }

    fn raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(listener) => listener.as_raw_fd(),
            Self::Unix(listener) => listener.as_raw_fd(),
        }
    }
}

impl SocketListener {
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            SocketEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Takes ownership of a listening descriptor inherited from a predecessor.
    ///
    /// The descriptor is marked close-on-exec so it does not leak into later
    /// children unless explicitly passed on again.
    pub(crate) fn adopt(endpoint: &SocketEndpoint, fd: RawFd) -> Result<Self, ListenerError> {
        let inherit_error = |source: io::Error| ListenerError::Inherit {
            fd,
            endpoint: endpoint.to_string(),
            source,
        };
        let flags = fcntl(fd, FcntlArg::F_GETFD).map_err(|errno| inherit_error(errno.into()))?;
        let flags = FdFlag::from_bits_truncate(flags) | FdFlag::FD_CLOEXEC;
        fcntl(fd, FcntlArg::F_SETFD(flags)).map_err(|errno| inherit_error(errno.into()))?;

        let listener = match endpoint {
            SocketEndpoint::Tcp { .. } => {
                // SAFETY: `fd` is open (checked above) and was handed to this
                // process for exclusive use; nothing else wraps it.
                let listener = unsafe { TcpListener::from_raw_fd(fd) };
                listener.local_addr().map_err(inherit_error)?;
                ListenerKind::Tcp(listener)
            }
            SocketEndpoint::Unix { .. } => {
                // SAFETY: as above.
                let listener = unsafe { UnixListener::from_raw_fd(fd) };
                listener.local_addr().map_err(inherit_error)?;
                ListenerKind::Unix(listener)
            }
        };
        info!(
            target: LISTENER_TARGET,
            endpoint = %endpoint,
            fd,
            "adopted inherited listener"
        );
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    #[cfg(test)]
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            ListenerKind::Unix(_) => None,
        }
    }

    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.listener.set_nonblocking(true) {
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let socket = self
            .listener
            .try_clone()
            .map_err(|source| ListenerError::Duplicate {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        let endpoint = self.endpoint.clone();
        let state = Arc::new(LoopState::default());
        let handle = {
            let state = Arc::clone(&state);
            thread::spawn(move || run_accept_loop(&self, &state, handler))
        };
        Ok(ListenerHandle {
            endpoint,
            socket,
            state,
            handle: Some(handle),
        })
    }
}

#[derive(Debug, Default)]
struct LoopState {
    shutdown: AtomicBool,
    released: AtomicBool,
    active: AtomicUsize,
}

/// Handle to a running listener thread.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    endpoint: SocketEndpoint,
    socket: ListenerKind,
    state: Arc<LoopState>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Listening descriptor to pass to a successor.
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.socket.raw_fd()
    }

    /// Connections accepted and still being handled.
    pub(crate) fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Stops accepting without removing the socket file, which now belongs
    /// to a successor.
    pub(crate) fn release(&self) {
        self.state.released.store(true, Ordering::SeqCst);
        self.shutdown();
    }

    pub(crate) fn shutdown(&self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for in-flight connections to finish.
    ///
    /// Returns `false` if some were still open when `timeout` elapsed.
    pub(crate) fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let active = self.active_connections();
            if active == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    target: LISTENER_TARGET,
                    endpoint = %self.endpoint,
                    active,
                    "connections still open after drain timeout"
                );
                return false;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
    }
}

struct ActiveGuard(Arc<LoopState>);

impl ActiveGuard {
    fn enter(state: &Arc<LoopState>) -> Self {
        state.active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(state))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    state: &Arc<LoopState>,
    handler: Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !state.shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let guard = ActiveGuard::enter(state);
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    let _guard = guard;
                    handler.handle(stream);
                });
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    if !state.released.load(Ordering::SeqCst) {
        cleanup_unix_socket(&listener.endpoint);
    }
}

fn accept_connection(listener: &SocketListener) -> Result<Option<ConnectionStream>, io::Error> {
    match &listener.listener {
        ListenerKind::Tcp(tcp) => match tcp.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Tcp(stream)))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        },
        ListenerKind::Unix(unix) => match unix.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Unix(stream)))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        },
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_string(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata =
            fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
                path: path.display().to_string(),
                source,
            })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::UnixConnect {
                    path: path.display().to_string(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
