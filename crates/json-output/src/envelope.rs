//! Per-transaction JSON wrapper around the encoded changes.
//!
//! The envelope is opened either when the transaction begins (when empty
//! transactions are emitted) or right before its first surviving change.
//! A transaction that never opens its envelope writes nothing at all.

use std::io;

use relfeed_types::{format_timestamptz, TxnInfo};

use crate::options::DecoderOptions;
use crate::sink::OutputSink;

/// Framing state of the transaction being decoded.
#[derive(Debug)]
pub struct TransactionEnvelope {
    options: DecoderOptions,
    buffer: String,
    nr_changes: u64,
    open: bool,
}

impl TransactionEnvelope {
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            options,
            buffer: String::new(),
            nr_changes: 0,
            open: false,
        }
    }

    /// Forget everything about the previous transaction
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.nr_changes = 0;
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Changes appended so far in this transaction
    pub fn nr_changes(&self) -> u64 {
        self.nr_changes
    }

    /// Write the opening brace, header fields and the start of the change
    /// array.
    pub fn open(
        &mut self,
        txn: &TxnInfo,
        sink: &mut dyn OutputSink,
        last_write: bool,
    ) -> io::Result<()> {
        let pretty = self.options.pretty_print;
        let out = &mut self.buffer;

        out.push_str(if pretty { "{\n" } else { "{" });

        if self.options.include_xids {
            if pretty {
                out.push_str(&format!("\t\"xid\": {},\n", txn.xid));
            } else {
                out.push_str(&format!("\"xid\":{},", txn.xid));
            }
        }

        if self.options.include_lsn {
            if pretty {
                out.push_str(&format!("\t\"nextlsn\": \"{}\",\n", txn.end_lsn));
            } else {
                out.push_str(&format!("\"nextlsn\":\"{}\",", txn.end_lsn));
            }
        }

        if self.options.include_timestamp {
            let timestamp = format_timestamptz(&txn.commit_time);
            if pretty {
                out.push_str(&format!("\t\"timestamp\": \"{timestamp}\",\n"));
            } else {
                out.push_str(&format!("\"timestamp\":\"{timestamp}\","));
            }
        }

        out.push_str(if pretty { "\t\"change\": [" } else { "\"change\":[" });
        self.open = true;

        if self.options.write_in_chunks {
            self.flush(sink, last_write)?;
        }
        Ok(())
    }

    /// Append one encoded change, wrapping it in braces and preceding it
    /// with a separator unless it is the first.
    ///
    /// # Arguments
    /// * `body` - members written by the change encoder
    pub fn append(&mut self, body: &str, sink: &mut dyn OutputSink) -> io::Result<()> {
        self.nr_changes += 1;
        let first = self.nr_changes == 1;
        let out = &mut self.buffer;

        if self.options.pretty_print {
            if !self.options.write_in_chunks {
                out.push('\n');
            }
            out.push_str("\t\t");
            if !first {
                out.push(',');
            }
            out.push_str("{\n");
            out.push_str(body);
            out.push_str("\t\t}");
        } else {
            out.push_str(if first { "{" } else { ",{" });
            out.push_str(body);
            out.push('}');
        }

        if self.options.write_in_chunks {
            self.flush(sink, true)?;
        }
        Ok(())
    }

    /// Close the change array and the object, and flush.
    ///
    /// Returns `false` without writing anything if the envelope was never
    /// opened.
    pub fn close(&mut self, sink: &mut dyn OutputSink) -> io::Result<bool> {
        if !self.open {
            self.reset();
            return Ok(false);
        }

        if self.options.pretty_print {
            if !self.options.write_in_chunks {
                self.buffer.push('\n');
            }
            self.buffer.push_str("\t]\n}");
        } else {
            self.buffer.push_str("]}");
        }

        self.flush(sink, true)?;
        self.reset();
        Ok(true)
    }

    fn flush(&mut self, sink: &mut dyn OutputSink, last_write: bool) -> io::Result<()> {
        sink.write(&self.buffer, last_write)?;
        self.buffer.clear();
        Ok(())
    }
}
