//! Destinations for flushed output messages.

use std::io::{self, Write};

/// Receives one message per flush.
///
/// In buffered mode a message is a whole transaction; in chunked mode the
/// envelope header, every change and the envelope closer are separate
/// messages.
pub trait OutputSink {
    /// # Arguments
    /// * `data` - message text
    /// * `last_write` - whether this is the final message of the transaction
    fn write(&mut self, data: &str, last_write: bool) -> io::Result<()>;
}

impl<T: OutputSink + ?Sized> OutputSink for &mut T {
    fn write(&mut self, data: &str, last_write: bool) -> io::Result<()> {
        (**self).write(data, last_write)
    }
}

/// Writes each message followed by a newline and flushes.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    inner: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> OutputSink for WriterSink<W> {
    fn write(&mut self, data: &str, _last_write: bool) -> io::Result<()> {
        self.inner.write_all(data.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()
    }
}

/// Collects messages in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySink {
    messages: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// All messages concatenated, as a reader of a chunked stream sees them
    pub fn concatenated(&self) -> String {
        self.messages.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, data: &str, _last_write: bool) -> io::Result<()> {
        self.messages.push(data.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_terminates_messages() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write("{\"change\":[]}", true).unwrap();
        sink.write("{}", true).unwrap();
        assert_eq!(sink.into_inner(), b"{\"change\":[]}\n{}\n");
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write("a", false).unwrap();
        sink.write("b", true).unwrap();
        assert_eq!(sink.messages(), ["a", "b"]);
        assert_eq!(sink.concatenated(), "ab");
    }
}
