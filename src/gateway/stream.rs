/*!
Output streaming: forward child output to the client as it is produced.

The 200 prelude is committed before any output is known, so everything that happens
afterwards (exit status, timeout, manifest) is reported inside the body or in the
`X-Exit-Code` trailer.
*/

use std::io::{self, Write};

/// Receives merged child output, one line (or line fragment) at a time.
pub trait OutputSink {
    /// Forward a chunk immediately. An error means the client is gone.
    fn forward(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Chunked `text/plain` response body with an `X-Exit-Code` trailer.
pub struct ChunkedBody<'a, W: Write> {
    w: &'a mut W,
    bytes: u64,
}

impl<'a, W: Write> ChunkedBody<'a, W> {
    /// Write the status line and headers; the response is committed to 200 from here on.
    pub fn start(w: &'a mut W) -> io::Result<Self> {
        w.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nTransfer-Encoding: chunked\r\nTrailer: X-Exit-Code\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        )?;
        w.flush()?;
        Ok(Self { w, bytes: 0 })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !chunk.is_empty() {
            write!(self.w, "{:X}\r\n", chunk.len())?;
            self.w.write_all(chunk)?;
            self.w.write_all(b"\r\n")?;
            self.w.flush()?;
            self.bytes += chunk.len() as u64;
        }
        Ok(())
    }

    /// Body bytes written so far (excluding chunk framing).
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Terminate the body and send the exit code trailer.
    pub fn finish(self, exit_code: i32) -> io::Result<()> {
        self.w.write_all(b"0\r\n")?;
        let trailer = format!("X-Exit-Code: {exit_code}\r\n\r\n");
        self.w.write_all(trailer.as_bytes())?;
        self.w.flush()
    }
}

impl<W: Write> OutputSink for ChunkedBody<'_, W> {
    fn forward(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.write_chunk(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_chunks_and_trailer() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut body = ChunkedBody::start(&mut out).unwrap();
            body.forward(b"Hello World\n").unwrap();
            body.forward(b"").unwrap();
            body.forward(&[b'x'; 26]).unwrap();
            assert_eq!(body.bytes_written(), 38);
            body.finish(0).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Transfer-Encoding: chunked"));
        assert!(head.contains("Trailer: X-Exit-Code"));
        assert_eq!(
            body,
            format!("C\r\nHello World\n\r\n1A\r\n{}\r\n0\r\nX-Exit-Code: 0\r\n\r\n", "x".repeat(26))
        );
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_surface() {
        let mut w = Broken;
        assert_eq!(
            ChunkedBody::start(&mut w).err().map(|e| e.kind()),
            Some(io::ErrorKind::BrokenPipe)
        );
    }
}
