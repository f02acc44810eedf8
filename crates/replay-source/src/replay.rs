//! Replay driver: feeds event log records to a decoding session in order.

use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

use anyhow::{Context, Result};
use relfeed_json::{ChangeOutcome, JsonDecoder, OutputSink};
use relfeed_types::{RelationId, RelationInfo};
use tracing::{debug, info, warn};

use crate::event::{Event, EventReader, SourceError};

/// Counters of a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Committed transactions
    pub transactions: u64,
    /// Transactions that produced output
    pub written: u64,
    pub emitted: u64,
    pub excluded: u64,
    pub filtered: u64,
    pub skipped: u64,
    /// Invalidations that dropped a cached descriptor
    pub invalidations: u64,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions ({} written), {} changes emitted, {} excluded, {} filtered, {} skipped",
            self.transactions, self.written, self.emitted, self.excluded, self.filtered, self.skipped
        )
    }
}

/// Plays an event log against a [`JsonDecoder`].
///
/// The replayer stands in for the host's change source: it keeps the latest
/// catalog snapshot of every relation and relays begin, change, commit and
/// invalidation events to the session.
pub struct Replayer<S: OutputSink> {
    decoder: JsonDecoder<S>,
    relations: HashMap<RelationId, RelationInfo>,
    summary: ReplaySummary,
}

impl<S: OutputSink> Replayer<S> {
    pub fn new(decoder: JsonDecoder<S>) -> Self {
        Self {
            decoder,
            relations: HashMap::new(),
            summary: ReplaySummary::default(),
        }
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    pub fn decoder(&self) -> &JsonDecoder<S> {
        &self.decoder
    }

    pub fn into_decoder(self) -> JsonDecoder<S> {
        self.decoder
    }

    /// Replay every event of a log.
    ///
    /// Stops at the first malformed record or fatal decoding error. A log
    /// that ends inside a transaction leaves that transaction uncommitted;
    /// nothing of it is written.
    ///
    /// # Arguments
    /// * `reader` - the event log, one JSON record per line
    /// * `source_name` - name of the log for messages
    pub fn replay<R: BufRead>(&mut self, reader: R, source_name: &str) -> Result<ReplaySummary> {
        info!("Replaying events from: {source_name}");

        for item in EventReader::new(reader) {
            let (line, event) = item.with_context(|| format!("Failed to read {source_name}"))?;
            self.apply(line, event)
                .with_context(|| format!("Failed to replay line {line} of {source_name}"))?;
        }

        if let Some(txn) = self.decoder.current_transaction() {
            warn!(
                "event log ended inside transaction {}, its changes are discarded",
                txn.xid
            );
        }

        info!("Completed replay of {}: {}", source_name, self.summary);
        Ok(self.summary)
    }

    /// Apply a single event.
    pub fn apply(&mut self, line: usize, event: Event) -> Result<()> {
        match &event {
            Event::Relation(record) => {
                let relation = record.to_relation(line)?;
                debug!("catalog snapshot for {} ({})", relation.qualified_name(), relation.id);
                self.relations.insert(relation.id, relation);
            }
            Event::Begin(record) => {
                self.decoder.begin(record.to_txn(line)?)?;
            }
            Event::Insert(_) | Event::Update(_) | Event::Delete(_) => {
                if let Some((relid, change)) = event.to_change(line)? {
                    let relation = self
                        .relations
                        .get(&RelationId(relid))
                        .ok_or(SourceError::UnknownRelation { line, relid })?;
                    match self.decoder.change(relation, &change)? {
                        ChangeOutcome::Emitted => self.summary.emitted += 1,
                        ChangeOutcome::Excluded => self.summary.excluded += 1,
                        ChangeOutcome::Filtered => self.summary.filtered += 1,
                        ChangeOutcome::Skipped(_) => self.summary.skipped += 1,
                    }
                }
            }
            Event::Invalidate { relid } => {
                if self.decoder.invalidate(RelationId(*relid)) {
                    self.summary.invalidations += 1;
                }
            }
            Event::Commit => {
                if self.decoder.commit()? {
                    self.summary.written += 1;
                }
                self.summary.transactions += 1;
            }
        }
        Ok(())
    }
}
