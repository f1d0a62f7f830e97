use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use thiserror::Error;

/// Pending connections the listener queues while a client is being served.
pub const ACCEPT_BACKLOG: i32 = 1;

/// Errors that can occur while setting up the client transport
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to configure listener: {0}")]
    Listener(#[source] io::Error),
}

/// A freshly accepted client stream, already non-blocking.
pub struct Accepted<S> {
    pub stream: S,
    pub peer: String,
}

/// Source of client byte streams.
///
/// `accept` must not block: `Ok(None)` means nobody is waiting.
pub trait Transport {
    type Stream: Read + Write;

    fn accept(&mut self) -> io::Result<Option<Accepted<Self::Stream>>>;
}

/// Non-blocking TCP listener standing in for the serial-over-radio socket.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub fn bind(addr: &str) -> Result<Self, LinkError> {
        let bind_error = |source: io::Error| LinkError::Bind {
            addr: addr.to_string(),
            source,
        };
        let resolved = addr
            .to_socket_addrs()
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "address resolved to nothing",
                ))
            })?;

        let socket = Socket::new(
            Domain::for_address(resolved),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(bind_error)?;
        #[cfg(unix)]
        socket.set_reuse_address(true).map_err(LinkError::Listener)?;
        socket.bind(&resolved.into()).map_err(bind_error)?;
        socket.listen(ACCEPT_BACKLOG).map_err(bind_error)?;
        socket.set_nonblocking(true).map_err(LinkError::Listener)?;
        Ok(Self {
            listener: socket.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn accept(&mut self) -> io::Result<Option<Accepted<TcpStream>>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                Ok(Some(Accepted {
                    stream,
                    peer: addr.to_string(),
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}
