//! TCP connect prober.
//!
//! Each probe builds its own socket with an abortive close (linger 0) and,
//! on Linux, a single SYN with no retransmissions, so closed and filtered
//! ports fail fast. The socket is dropped, and therefore closed, on every
//! exit path.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::trace;

use crate::error::{ScanError, ScanResult};
use crate::model::PortProbeResult;
use crate::scanner::traits::PortProber;
use crate::types::Port;

/// SYN attempts per connection: the initial one only.
#[cfg(any(target_os = "linux", target_os = "android"))]
const SYN_ATTEMPTS: libc::c_int = 1;

/// Prober that performs full TCP handshakes through the OS socket API.
///
/// Does not require elevated privileges.
#[derive(Debug, Clone)]
pub struct TcpConnectProber {
    timeout: Duration,
}

impl TcpConnectProber {
    /// `timeout` bounds a single connection attempt.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn open_socket(target: Ipv4Addr) -> ScanResult<TcpSocket> {
        let creation = |source: io::Error| ScanError::SocketCreation { target, source };

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(creation)?;
        socket.set_linger(Some(Duration::ZERO)).map_err(creation)?;
        set_single_syn(&socket).map_err(creation)?;
        socket.set_nonblocking(true).map_err(creation)?;

        let std_stream: std::net::TcpStream = socket.into();
        Ok(TcpSocket::from_std_stream(std_stream))
    }

    async fn attempt_connect(&self, socket: TcpSocket, addr: SocketAddr) -> Result<TcpStream, i32> {
        match timeout(self.timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.raw_os_error().unwrap_or(libc::ECONNABORTED)),
            Err(_) => Err(libc::ETIMEDOUT),
        }
    }
}

#[async_trait]
impl PortProber for TcpConnectProber {
    async fn connect(&self, target: Ipv4Addr, port: Port) -> ScanResult<PortProbeResult> {
        let socket = Self::open_socket(target)?;
        let addr = SocketAddr::from((target, port.as_u16()));

        let result = match self.attempt_connect(socket, addr).await {
            Ok(stream) => {
                drop(stream);
                PortProbeResult::open(port)
            }
            Err(reason) => PortProbeResult::closed(port, reason),
        };
        trace!(%target, %port, open = result.open, reason = result.reason, "connect probe");
        Ok(result)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_single_syn(socket: &Socket) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let value = SYN_ATTEMPTS;
    // SAFETY: the fd is owned by `socket` for the duration of the call and the
    // option value points to a live c_int of the advertised length.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_SYNCNT,
            (&value as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_single_syn(_socket: &Socket) -> io::Result<()> {
    Ok(())
}
