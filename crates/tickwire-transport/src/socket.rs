use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::family::AddressFamily;

/// A connected TCP socket. Implements Read + Write.
///
/// This is the fundamental I/O type handed to a channel. It is owned by
/// exactly one channel; reader and writer threads get their own handles via
/// [`NetSocket::try_clone`].
pub struct NetSocket {
    stream: TcpStream,
    family: AddressFamily,
}

/// Options applied to a socket right after it connects or is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
    /// `SO_RCVBUF` in bytes. Zero keeps the OS default.
    pub receive_buffer_size: usize,
    /// `SO_SNDBUF` in bytes. Zero keeps the OS default.
    pub send_buffer_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            receive_buffer_size: 0,
            send_buffer_size: 0,
        }
    }
}

impl SocketOptions {
    /// Apply every option to `socket`.
    pub fn apply(&self, socket: &NetSocket) -> Result<()> {
        socket.set_nodelay(self.nodelay)?;
        if self.receive_buffer_size > 0 {
            socket.set_receive_buffer_size(self.receive_buffer_size)?;
        }
        if self.send_buffer_size > 0 {
            socket.set_send_buffer_size(self.send_buffer_size)?;
        }
        Ok(())
    }
}

impl Read for NetSocket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for NetSocket {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl NetSocket {
    /// Connect to `addr` (blocking).
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected tcp socket");
        Ok(Self {
            stream,
            family: AddressFamily::of_addr(&addr),
        })
    }

    /// Connect to `addr`, giving up after `timeout`.
    pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, ?timeout, "connected tcp socket");
        Ok(Self {
            stream,
            family: AddressFamily::of_addr(&addr),
        })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let family = AddressFamily::of_addr(&stream.local_addr()?);
        Ok(Self { stream, family })
    }

    /// Address family of the local endpoint.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream
            .set_nodelay(nodelay)
            .map_err(|source| TransportError::SocketOption {
                option: "TCP_NODELAY",
                source,
            })
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.stream.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this socket (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            family: self.family,
        })
    }

    /// Shut down one or both directions.
    ///
    /// Every handle cloned from this socket observes the shutdown, which is
    /// how a blocked reader thread gets woken on close.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        self.stream.shutdown(how).map_err(Into::into)
    }

    /// Set `SO_RCVBUF`.
    pub fn set_receive_buffer_size(&self, size: usize) -> Result<()> {
        self.set_buffer_option(BufferOption::Receive, size)
    }

    /// Set `SO_SNDBUF`.
    pub fn set_send_buffer_size(&self, size: usize) -> Result<()> {
        self.set_buffer_option(BufferOption::Send, size)
    }

    /// Current `SO_RCVBUF`, or `None` where the platform does not expose it.
    pub fn receive_buffer_size(&self) -> Option<usize> {
        self.buffer_option(BufferOption::Receive)
    }

    /// Current `SO_SNDBUF`, or `None` where the platform does not expose it.
    pub fn send_buffer_size(&self) -> Option<usize> {
        self.buffer_option(BufferOption::Send)
    }

    #[cfg(unix)]
    fn set_buffer_option(&self, option: BufferOption, size: usize) -> Result<()> {
        use std::os::fd::AsRawFd;

        let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
        // SAFETY: `value` lives for the duration of the call and its size is
        // passed alongside; the descriptor is an open socket owned by `self`.
        let rc = unsafe {
            libc::setsockopt(
                self.stream.as_raw_fd(),
                libc::SOL_SOCKET,
                option.raw(),
                (&value as *const libc::c_int).cast::<libc::c_void>(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(TransportError::SocketOption {
                option: option.name(),
                source: std::io::Error::last_os_error(),
            })
        }
    }

    #[cfg(not(unix))]
    fn set_buffer_option(&self, option: BufferOption, size: usize) -> Result<()> {
        debug!(option = option.name(), size, "socket buffer sizing unsupported");
        Ok(())
    }

    #[cfg(unix)]
    fn buffer_option(&self, option: BufferOption) -> Option<usize> {
        use std::os::fd::AsRawFd;

        let mut value: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        // SAFETY: `value` and `len` are valid writable pointers for the
        // provided sizes; the descriptor is an open socket owned by `self`.
        let rc = unsafe {
            libc::getsockopt(
                self.stream.as_raw_fd(),
                libc::SOL_SOCKET,
                option.raw(),
                (&mut value as *mut libc::c_int).cast::<libc::c_void>(),
                &mut len,
            )
        };
        if rc == 0 && len as usize == std::mem::size_of::<libc::c_int>() {
            usize::try_from(value).ok()
        } else {
            None
        }
    }

    #[cfg(not(unix))]
    fn buffer_option(&self, _option: BufferOption) -> Option<usize> {
        None
    }
}

#[derive(Clone, Copy)]
enum BufferOption {
    Receive,
    Send,
}

impl BufferOption {
    fn name(self) -> &'static str {
        match self {
            BufferOption::Receive => "SO_RCVBUF",
            BufferOption::Send => "SO_SNDBUF",
        }
    }

    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            BufferOption::Receive => libc::SO_RCVBUF,
            BufferOption::Send => libc::SO_SNDBUF,
        }
    }
}

impl std::fmt::Debug for NetSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetSocket")
            .field("family", &self.family)
            .field("local", &self.stream.local_addr().ok())
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}
