//! Capture buffers and their reader threads.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use os_pipe::PipeReader;
use tokio::sync::oneshot;

use super::plumbing::StdStream;

/// Chunk size for draining capture pipes.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Default)]
struct CaptureInner {
    bytes: Vec<u8>,
    sealed: bool,
}

/// Raw bytes captured from one stream.
///
/// Once sealed, further bytes are dropped: the result has been frozen.
#[derive(Debug, Default)]
pub(crate) struct CaptureBuffer {
    inner: Mutex<CaptureInner>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns false if the buffer is already sealed.
    pub fn push(&self, chunk: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.sealed {
            return false;
        }
        inner.bytes.extend_from_slice(chunk);
        true
    }

    pub fn seal(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).sealed = true;
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).bytes.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).bytes.is_empty()
    }
}

/// The read end of a capture pipe, not yet being drained.
pub(crate) struct CaptureStream {
    pub reader: PipeReader,
    pub buffer: Arc<CaptureBuffer>,
    pub stream: StdStream,
}

impl CaptureStream {
    /// Drain the pipe on its own thread. `tee` also copies every chunk to
    /// the shell's own stream. The receiver fires at end of stream.
    pub fn spawn_reader(self, tee: bool) -> std::io::Result<oneshot::Receiver<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        let CaptureStream {
            mut reader,
            buffer,
            stream,
        } = self;
        std::thread::Builder::new()
            .name(format!("pipesh-capture-{stream}"))
            .spawn(move || {
                let mut chunk = [0u8; CHUNK_SIZE];
                loop {
                    let n = match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::debug!(%stream, "capture read failed: {}", e);
                            break;
                        }
                    };
                    // Keep draining after sealing so late writers never block.
                    let kept = buffer.push(&chunk[..n]);
                    if tee && kept {
                        tee_chunk(stream, &chunk[..n]);
                    }
                }
                let _ = done_tx.send(());
            })?;
        Ok(done_rx)
    }
}

fn tee_chunk(stream: StdStream, bytes: &[u8]) {
    let result = match stream {
        StdStream::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(bytes).and_then(|()| out.flush())
        }
        StdStream::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(bytes).and_then(|()| err.flush())
        }
    };
    if let Err(e) = result {
        tracing::trace!(%stream, "tee to terminal failed: {}", e);
    }
}
