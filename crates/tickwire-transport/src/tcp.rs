use std::net::{SocketAddr, TcpListener};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::socket::NetSocket;

/// Listening TCP socket.
///
/// Accepted connections come back as [`NetSocket`]s ready to be attached to
/// a channel.
pub struct NetListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl NetListener {
    /// Bind and listen on `addr`. Port `0` picks an ephemeral port.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening on tcp socket");

        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<NetSocket> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        NetSocket::from_stream(stream)
    }

    /// Toggle non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Bound address, with the real port when `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl std::fmt::Debug for NetListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetListener")
            .field("addr", &self.addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::net::Shutdown;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::family::AddressFamily;
    use crate::socket::SocketOptions;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn bind_reports_ephemeral_port() {
        let listener = NetListener::bind(loopback()).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn connect_accept_roundtrip() {
        let listener = NetListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();

        let server = thread::spawn(move || {
            let mut socket = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(&buf).unwrap();
        });

        let mut client = NetSocket::connect(addr).unwrap();
        assert_eq!(client.family(), AddressFamily::Ipv4);
        assert_eq!(client.peer_addr().unwrap(), addr);

        client.write_all(b"ping").unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"ping");

        server.join().unwrap();
    }

    #[test]
    fn bind_twice_on_same_port_fails() {
        let first = NetListener::bind(loopback()).unwrap();
        let err = NetListener::bind(first.local_addr()).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn connect_refused_maps_to_connect_error() {
        let addr = {
            let listener = NetListener::bind(loopback()).unwrap();
            listener.local_addr()
        };
        let err = NetSocket::connect(addr).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert_eq!(err.io_kind(), Some(ErrorKind::ConnectionRefused));
    }

    #[test]
    fn shutdown_wakes_cloned_reader() {
        let listener = NetListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();
        let connector = thread::spawn(move || NetSocket::connect(addr).unwrap());
        let server_side = listener.accept().unwrap();
        let _client = connector.join().unwrap();

        let mut reader = server_side.try_clone().unwrap();
        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(20));
        server_side.shutdown(Shutdown::Both).unwrap();

        let read = blocked.join().unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[test]
    fn applies_socket_options() {
        let listener = NetListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();
        let connector = thread::spawn(move || NetSocket::connect(addr).unwrap());
        let _server_side = listener.accept().unwrap();
        let client = connector.join().unwrap();

        let options = SocketOptions {
            nodelay: true,
            receive_buffer_size: 32 * 1024,
            send_buffer_size: 32 * 1024,
        };
        options.apply(&client).unwrap();

        #[cfg(target_os = "linux")]
        {
            assert!(client.receive_buffer_size().unwrap() >= 32 * 1024);
            assert!(client.send_buffer_size().unwrap() >= 32 * 1024);
        }
    }

    #[test]
    fn nonblocking_read_would_block_when_idle() {
        let listener = NetListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();
        let connector = thread::spawn(move || NetSocket::connect(addr).unwrap());
        let mut server_side = listener.accept().unwrap();
        let _client = connector.join().unwrap();

        server_side.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 8];
        let err = server_side.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }
}
