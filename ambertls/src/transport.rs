//! The byte-stream transport consumed by a [`crate::Connection`].

use ambertls_core::{Error, Result};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex};

/// A reliable byte stream.
///
/// The connection only ever needs exact reads and complete writes; no
/// framing semantics are required. Both calls block; cancellation is
/// expressed by returning an error, which terminally fails the
/// connection.
pub trait Transport {
    /// Fill `buf` completely from the stream.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` to the stream.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

/// Any blocking reader/writer (a `TcpStream`, a unix socket, an
/// in-memory [`Pipe`]) is a transport.
impl<T: Read + Write> Transport for T {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Read::read_exact(self, buf).map_err(|e| Error::IoError(e.to_string()))
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf).map_err(|e| Error::IoError(e.to_string()))?;
        self.flush().map_err(|e| Error::IoError(e.to_string()))
    }
}

/// In-memory duplex pipe: two endpoints, each reading what the other
/// wrote. Used by tests and useful for loopback handshakes.
#[derive(Debug)]
pub struct Pipe {
    incoming: Arc<Shared>,
    outgoing: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    buffer: Mutex<PipeBuffer>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct PipeBuffer {
    data: VecDeque<u8>,
    closed: bool,
}

impl Pipe {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (Pipe, Pipe) {
        let a = Arc::new(Shared::default());
        let b = Arc::new(Shared::default());
        (
            Pipe {
                incoming: Arc::clone(&a),
                outgoing: Arc::clone(&b),
            },
            Pipe {
                incoming: b,
                outgoing: a,
            },
        )
    }

    /// Close this endpoint's outgoing direction; the peer's reads fail
    /// once the buffer drains.
    pub fn close(&self) {
        if let Ok(mut buffer) = self.outgoing.buffer.lock() {
            buffer.closed = true;
        }
        self.outgoing.available.notify_all();
    }
}

impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut buffer = self
            .incoming
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "pipe lock poisoned"))?;
        loop {
            if !buffer.data.is_empty() {
                let mut filled = 0;
                while filled < buf.len() {
                    match buffer.data.pop_front() {
                        Some(byte) => {
                            buf[filled] = byte;
                            filled += 1;
                        }
                        None => break,
                    }
                }
                return Ok(filled);
            }
            if buffer.closed {
                return Ok(0); // EOF
            }
            buffer = self.incoming.available.wait(buffer).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::Other, "pipe lock poisoned")
            })?;
        }
    }
}

impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        {
            let mut buffer = self.outgoing.buffer.lock().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::Other, "pipe lock poisoned")
            })?;
            if buffer.closed {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pipe closed",
                ));
            }
            buffer.data.extend(buf.iter().copied());
        }
        self.outgoing.available.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
