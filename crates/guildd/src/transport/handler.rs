//! Connection handling abstractions for the listeners.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

/// Stream types accepted by the listeners.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Reads one newline-terminated line, or whatever arrives before EOF.
///
/// Returns `None` when the peer closed without sending anything.
pub(crate) fn read_request_line(stream: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = read_chunk_with_retry(stream, &mut chunk)?;
        if bytes_read == 0 {
            return Ok((!buffer.is_empty()).then_some(buffer));
        }

        let received = chunk.get(..bytes_read).unwrap_or_default();
        if let Some(pos) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(received.get(..=pos).unwrap_or_default());
            enforce_request_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(received);
        enforce_request_limit(buffer.len())?;
    }
}

fn read_chunk_with_retry(stream: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

fn enforce_request_limit(size: usize) -> io::Result<()> {
    if size > MAX_REQUEST_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "request exceeds maximum size",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::terminated(b"{\"command\":\"list\"}\nrest".as_slice(), Some(b"{\"command\":\"list\"}\n".to_vec()))]
    #[case::unterminated(b"GET / HTTP/1.1".as_slice(), Some(b"GET / HTTP/1.1".to_vec()))]
    #[case::empty(b"".as_slice(), None)]
    fn reads_first_line(#[case] input: &[u8], #[case] expected: Option<Vec<u8>>) {
        let mut reader = input;
        let line = read_request_line(&mut reader).expect("read line");
        assert_eq!(line, expected);
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let input = vec![b'a'; MAX_REQUEST_BYTES + 1];
        let mut reader = input.as_slice();
        let error = read_request_line(&mut reader).expect_err("limit");
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
