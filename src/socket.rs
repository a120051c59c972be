//! UDP socket setup
//!
//! Low-level socket operations shared by listeners and transmitters. Every
//! socket the daemon opens is a non-blocking IPv4 `SOCK_DGRAM` socket with
//! `SO_REUSEADDR` enabled and a large receive buffer to absorb bursts when
//! user space falls behind. Transmitter sockets additionally get a large
//! send buffer.
//!
//! There is no cap on the number of sockets: entities are catalogued by id
//! in hash maps rather than by raw file descriptor value, so the only limit
//! is the process fd rlimit.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::debug;

use crate::error::SocketError;

/// Receive buffer size requested for every socket (5 MiB)
pub const RECV_BUFFER_SIZE: usize = 5 * 1024 * 1024;

/// Send buffer size requested for transmitter sockets (5 MiB)
pub const SEND_BUFFER_SIZE: usize = 5 * 1024 * 1024;

/// Open a non-blocking UDP socket, optionally bound to `(addr, port)`.
///
/// The socket has `SO_REUSEADDR` enabled and `SO_RCVBUF` set to
/// [`RECV_BUFFER_SIZE`]. If `addr` is unspecified and `port` is zero the
/// socket is returned unbound; otherwise it is bound, with an unspecified
/// `addr` meaning "any interface".
///
/// # Errors
///
/// Returns [`SocketError::Creation`] if socket creation fails,
/// [`SocketError::Option`] if option setting fails, and
/// [`SocketError::Bind`] if the bind fails.
pub fn open_udp_socket(addr: Ipv4Addr, port: u16) -> Result<UdpSocket, SocketError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| SocketError::Creation(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| SocketError::option("SO_REUSEADDR", e.to_string()))?;

    socket
        .set_recv_buffer_size(RECV_BUFFER_SIZE)
        .map_err(|e| SocketError::option("SO_RCVBUF", e.to_string()))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| SocketError::option("O_NONBLOCK", e.to_string()))?;

    // Fully unbound transmitter socket: the kernel picks address and port at
    // first send.
    if addr.is_unspecified() && port == 0 {
        debug!("Opened unbound UDP socket");
        return Ok(socket.into());
    }

    let bind_addr = SocketAddrV4::new(addr, port);
    socket
        .bind(&SocketAddr::V4(bind_addr).into())
        .map_err(|e| SocketError::bind(bind_addr, e.to_string()))?;

    debug!("Opened UDP socket bound to {}", bind_addr);
    Ok(socket.into())
}

/// Set `SO_SNDBUF` on an already-open socket to [`SEND_BUFFER_SIZE`].
///
/// # Errors
///
/// Returns [`SocketError::Option`] if setting the option fails.
pub fn set_send_buffer(socket: &UdpSocket) -> Result<(), SocketError> {
    SockRef::from(socket)
        .set_send_buffer_size(SEND_BUFFER_SIZE)
        .map_err(|e| SocketError::option("SO_SNDBUF", e.to_string()))
}

/// Read back the effective receive buffer size.
///
/// The kernel may clamp or double the requested size, so the effective
/// value is worth logging at startup.
///
/// # Errors
///
/// Returns the underlying `getsockopt` error.
pub fn recv_buffer_size(socket: &UdpSocket) -> io::Result<usize> {
    SockRef::from(socket).recv_buffer_size()
}

/// Read back the effective send buffer size.
///
/// # Errors
///
/// Returns the underlying `getsockopt` error.
pub fn send_buffer_size(socket: &UdpSocket) -> io::Result<usize> {
    SockRef::from(socket).send_buffer_size()
}
