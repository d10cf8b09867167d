use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::sequencer::Shared;
use crate::{Error, Result};

/// Continuous byte view over the reassembled frames.
///
/// `read` never produces a partial read: it blocks until the requested
/// number of bytes can be served, pulling frames out of the sequenced
/// queue as they complete. Already-read bytes accumulate in the internal
/// buffer until a flush discards them, which happens automatically once
/// the buffer outgrows the configured threshold.
///
/// The stream is read-only and unseekable: [`io::Read`] is implemented,
/// [`io::Seek`] always fails with [`io::ErrorKind::Unsupported`], and
/// there is no write surface at all.
pub struct FrameStream {
    shared: Arc<Shared>,
    auto_flush: bool,
    auto_flush_threshold: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    data: Vec<u8>,
    read_position: usize,
}

impl State {
    fn discard_read(&mut self) {
        self.data.drain(..self.read_position);
        self.read_position = 0;
    }

    fn unread(&self) -> usize {
        self.data.len() - self.read_position
    }
}

impl FrameStream {
    pub(crate) fn new(shared: Arc<Shared>, config: &Config) -> Self {
        Self {
            shared,
            auto_flush: config.stream.auto_flush,
            auto_flush_threshold: config.stream.auto_flush_threshold,
            state: Mutex::new(State::default()),
        }
    }

    /// Fill `dst` completely, blocking until enough frame bytes arrive.
    ///
    /// Fails with `InvalidState` when the listener stops (or was never
    /// started) and the bytes already buffered cannot cover the request;
    /// no partial read is produced in that case.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();

        if self.auto_flush && state.data.len() > self.auto_flush_threshold {
            state.discard_read();
        }

        while state.unread() < dst.len() {
            if let Some(frame) = self.shared.next_frame() {
                state.data.extend_from_slice(&frame);
                continue;
            }

            {
                let mut sequenced = self.shared.sequenced.lock();
                // re-check under the lock so a frame completed between
                // the failed pull and this point is not slept through
                if sequenced.marker_count == 0 {
                    if !self.shared.running() {
                        return Err(Error::InvalidState("listener is not running"));
                    }

                    self.shared.sequenced_available.wait(&mut sequenced);
                }
            }
        }

        let position = state.read_position;
        dst.copy_from_slice(&state.data[position..position + dst.len()]);
        state.read_position += dst.len();
        Ok(dst.len())
    }

    /// Discard the already-read prefix of the internal buffer.
    pub fn flush(&self) {
        self.state.lock().discard_read();
    }

    /// Bytes buffered and not yet read.
    pub fn buffered(&self) -> usize {
        self.state.lock().unread()
    }
}

impl io::Read for FrameStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FrameStream::read(self, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))
    }
}

impl io::Seek for FrameStream {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(io::ErrorKind::Unsupported.into())
    }
}
