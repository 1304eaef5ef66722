//! Bounded output buffer with caller-driven backpressure.
//!
//! Responses are pre-rendered strings; [`OutputBuffer::send`] copies them
//! into a fixed-capacity queue and only touches the client sink when the
//! queue would otherwise overflow. Messages larger than the whole buffer
//! are chunked through the sink, but bytes are never reordered or dropped:
//! the concatenation of everything the sink observes equals the
//! concatenation of every message sent.

use thiserror::Error;

/// Destination for drained response bytes, supplied by the host.
///
/// `write` reports how many bytes the client accepted. `Ok(0)` means the
/// client cannot make progress right now; an error means the connection is
/// unusable.
pub trait ResponseSink {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError>;
}

/// Failure reported by a [`ResponseSink`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    /// Builds a sink error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while queueing or draining responses.
#[derive(Debug, Error)]
pub enum SendError {
    /// The sink accepted nothing; the in-flight response was abandoned
    /// without corrupting the stream. The session may continue.
    #[error("client is not accepting data")]
    Stalled,
    /// The sink failed, or stalled after part of a response already went
    /// out. The session must be torn down by the host.
    #[error("client connection failed: {0}")]
    Fatal(String),
}

/// Fixed-capacity byte queue between the dispatcher and the client socket.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl OutputBuffer {
    /// Creates a buffer holding at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            start: 0,
            end: 0,
        }
    }

    /// Number of bytes currently queued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.end - self.start
    }

    /// Queues one complete pre-rendered message, draining through the sink
    /// whenever the buffer is full.
    ///
    /// # Errors
    ///
    /// [`SendError::Stalled`] when the sink accepted nothing and no byte of
    /// `message` had reached it yet; the buffer is rolled back to its state
    /// before the call. [`SendError::Fatal`] when the sink failed, or
    /// stalled after part of `message` was already written out.
    pub fn send(
        &mut self,
        message: &[u8],
        sink: &mut dyn ResponseSink,
    ) -> Result<(), SendError> {
        self.compact();
        // Drains are FIFO, so bytes of `message` reach the sink only after
        // every byte queued before this call has gone out.
        let preexisting = self.end;
        let mut accepted_total = 0usize;
        let mut offset = 0;

        while offset < message.len() {
            self.compact();
            let room = self.data.len() - self.end;
            if room == 0 {
                match self.drain_once(sink) {
                    Ok(accepted) => accepted_total += accepted,
                    Err(SendError::Stalled) if accepted_total <= preexisting => {
                        // Nothing of this message escaped; the queued part
                        // of it sits at the tail. Forget it.
                        self.end -= offset;
                        return Err(SendError::Stalled);
                    }
                    Err(SendError::Stalled) => {
                        return Err(SendError::Fatal(
                            "client stalled mid-response".to_string(),
                        ));
                    }
                    Err(fatal) => return Err(fatal),
                }
                continue;
            }
            let take = room.min(message.len() - offset);
            let slot = self
                .data
                .get_mut(self.end..self.end + take)
                .unwrap_or_default();
            slot.copy_from_slice(&message[offset..offset + take]);
            self.end += take;
            offset += take;
        }
        Ok(())
    }

    /// Drains every queued byte through the sink.
    ///
    /// # Errors
    ///
    /// Propagates [`SendError::Stalled`] or [`SendError::Fatal`] from the
    /// sink; queued bytes that were not yet accepted stay queued.
    pub fn flush(&mut self, sink: &mut dyn ResponseSink) -> Result<(), SendError> {
        while self.queued() > 0 {
            self.drain_once(sink)?;
        }
        Ok(())
    }

    /// Discards everything queued. Used when tearing a session down.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Offers the queued bytes to the sink once, returning how many it took.
    fn drain_once(&mut self, sink: &mut dyn ResponseSink) -> Result<usize, SendError> {
        let queued = self.data.get(self.start..self.end).unwrap_or_default();
        debug_assert!(!queued.is_empty(), "drain_once called on an empty buffer");
        let len = queued.len();
        match sink.write(queued) {
            Ok(0) => Err(SendError::Stalled),
            Ok(accepted) => {
                self.start += accepted.min(len);
                if self.start == self.end {
                    self.start = 0;
                    self.end = 0;
                }
                Ok(accepted.min(len))
            }
            Err(error) => Err(SendError::Fatal(error.to_string())),
        }
    }
}
