//! Decoding session.
//!
//! [`JsonDecoder`] is driven by a change source with one call per
//! transaction begin, one per change and one per commit. It owns the
//! relation cache, arms it for the duration of each transaction and writes
//! every transaction that has surviving changes to its sink.

use relfeed_types::{ChangeEvent, ChangeOp, RelationId, RelationInfo, TxnInfo};
use tracing::{debug, warn};

use crate::encoder::{ChangeEncoder, EncodeError};
use crate::envelope::TransactionEnvelope;
use crate::error::{DecodeError, RowAnomaly};
use crate::filter::{ComparisonCompiler, FilterCompiler};
use crate::options::{DecoderConfig, DecoderOptions};
use crate::reldata::RelationCache;
use crate::sink::OutputSink;

/// What happened to one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Appended to the transaction's output
    Emitted,
    /// The relation is excluded by the rules
    Excluded,
    /// The row filter evaluated to false or NULL
    Filtered,
    /// Dropped because of a problem with the row
    Skipped(RowAnomaly),
}

/// A streaming session producing one JSON document per transaction.
pub struct JsonDecoder<S: OutputSink> {
    config: DecoderConfig,
    compiler: Box<dyn FilterCompiler>,
    cache: RelationCache,
    encoder: ChangeEncoder,
    envelope: TransactionEnvelope,
    current: Option<TxnInfo>,
    scratch: String,
    sink: S,
}

impl<S: OutputSink> JsonDecoder<S> {
    /// Create a session using the built-in comparison filter compiler.
    pub fn new(config: DecoderConfig, sink: S) -> Self {
        Self::with_compiler(config, Box::new(ComparisonCompiler), sink)
    }

    /// Create a session with a host-provided row filter compiler.
    pub fn with_compiler(
        config: DecoderConfig,
        compiler: Box<dyn FilterCompiler>,
        sink: S,
    ) -> Self {
        let options = config.options;
        Self {
            config,
            compiler,
            cache: RelationCache::new(options.pretty_print),
            encoder: ChangeEncoder::new(&options),
            envelope: TransactionEnvelope::new(options),
            current: None,
            scratch: String::new(),
            sink,
        }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.config.options
    }

    pub fn cache(&self) -> &RelationCache {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Transaction currently being decoded
    pub fn current_transaction(&self) -> Option<&TxnInfo> {
        self.current.as_ref()
    }

    /// Start decoding a transaction.
    ///
    /// Arms the relation cache; with `include-empty-xacts` the envelope is
    /// opened right away.
    pub fn begin(&mut self, txn: TxnInfo) -> Result<(), DecodeError> {
        if let Some(current) = &self.current {
            return Err(DecodeError::NestedTransaction {
                current: current.xid,
                new: txn.xid,
            });
        }

        self.envelope.reset();
        self.cache.arm();

        if self.config.options.include_empty_xacts {
            self.envelope.open(&txn, &mut self.sink, true)?;
        }
        self.current = Some(txn);
        Ok(())
    }

    /// Decode one change of the current transaction.
    ///
    /// # Returns
    /// * what happened to the change; row-level problems are reported as
    ///   [`ChangeOutcome::Skipped`] and do not end the stream
    ///
    /// # Errors
    /// * `DecodeError::FilterCompile` - the relation's row filter does not compile
    /// * `DecodeError::UnknownType` - a column type has no output routine
    /// * `DecodeError::Output` - the sink failed
    pub fn change(
        &mut self,
        relation: &RelationInfo,
        event: &ChangeEvent,
    ) -> Result<ChangeOutcome, DecodeError> {
        let txn = self
            .current
            .as_ref()
            .ok_or(DecodeError::NoTransaction("change"))?;

        let descriptor =
            self.cache
                .resolve(relation, &self.config.rules, self.compiler.as_ref())?;
        if !descriptor.is_included() {
            return Ok(ChangeOutcome::Excluded);
        }

        if let Some(anomaly) = sanity_check(relation, event) {
            warn!("{}", anomaly);
            return Ok(ChangeOutcome::Skipped(anomaly));
        }

        if descriptor.has_row_filter() {
            let keep = event
                .filter_row()
                .is_some_and(|row| descriptor.evaluate_filter(row));
            if !keep {
                debug!("{} on table \"{}\" filtered out", event.op(), relation.name);
                return Ok(ChangeOutcome::Filtered);
            }
        }

        self.scratch.clear();
        let encoded = match self
            .encoder
            .encode(&mut self.scratch, relation, event, descriptor)
        {
            Ok(encoded) => encoded,
            Err(EncodeError::Skip(anomaly)) => {
                warn!("{}", anomaly);
                return Ok(ChangeOutcome::Skipped(anomaly));
            }
            Err(EncodeError::Fatal(err)) => return Err(err),
        };

        if !self.envelope.is_open() {
            self.envelope.open(txn, &mut self.sink, false)?;
        }
        self.envelope.append(&self.scratch, &mut self.sink)?;

        if encoded.row_schema {
            descriptor.mark_row_schema_emitted();
        }
        if encoded.key_schema {
            descriptor.mark_key_schema_emitted();
        }
        Ok(ChangeOutcome::Emitted)
    }

    /// Finish the current transaction.
    ///
    /// Disarms the relation cache and closes the envelope. Returns whether
    /// anything was written: a transaction without surviving changes writes
    /// nothing unless `include-empty-xacts` is set.
    pub fn commit(&mut self) -> Result<bool, DecodeError> {
        let txn = self
            .current
            .take()
            .ok_or(DecodeError::NoTransaction("commit"))?;
        self.cache.disarm();

        debug!(
            "transaction {} committed with {} changes",
            txn.xid,
            self.envelope.nr_changes()
        );
        Ok(self.envelope.close(&mut self.sink)?)
    }

    /// Relay a catalog invalidation for a relation.
    ///
    /// Only takes effect while a transaction is being decoded.
    pub fn invalidate(&mut self, relid: RelationId) -> bool {
        self.cache.invalidate(relid)
    }
}

/// Per-row checks made before any filtering or encoding work
fn sanity_check(relation: &RelationInfo, event: &ChangeEvent) -> Option<RowAnomaly> {
    let op = event.op();

    if matches!(op, ChangeOp::Update | ChangeOp::Delete) && !relation.has_identity() {
        return Some(RowAnomaly::NoIdentity {
            op,
            relation: relation.name.clone(),
        });
    }

    let required = match op {
        ChangeOp::Insert | ChangeOp::Update => event.new_row(),
        ChangeOp::Delete => event.old_row(),
    };
    let Some(row) = required else {
        return Some(RowAnomaly::MissingTuple {
            op,
            relation: relation.name.clone(),
        });
    };

    let widest = row.len().max(event.old_row().map_or(0, |old| old.len()));
    if widest > relation.columns.len() {
        return Some(RowAnomaly::ShapeMismatch {
            relation: relation.id,
            columns: relation.columns.len(),
        });
    }

    None
}
