//! Batch accumulation under document-count and token-sum thresholds.
//!
//! The aggregator only decides *when* a flush happens; talking to the
//! vector store and persisting resume state stay with the indexer.
//! Each buffered document carries its stream position so the post-flush
//! checkpoint can point at the last row actually contained in the batch.

use std::fmt;

use vectorize_types::Document;

/// Why a batch was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Adding the next document would exceed a threshold
    ThresholdReached,
    /// A single document alone exceeds the token safety ceiling
    SingleOverSafety,
    /// End of the source stream
    Eof,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::ThresholdReached => "threshold-reached",
            FlushReason::SingleOverSafety => "single-over-safety",
            FlushReason::Eof => "eof",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document plus the stream position it came from.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub document: Document,
    /// 1-based data row index in the source file
    pub row_index: u64,
    /// First byte after this row in the source file
    pub source_offset: u64,
}

/// An emitted batch.
#[derive(Debug)]
pub struct Flush {
    pub documents: Vec<PendingDocument>,
    pub reason: FlushReason,
    pub token_total: usize,
}

impl Flush {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Stream position of the last row in this batch.
    pub fn last_position(&self) -> Option<(u64, u64)> {
        self.documents
            .last()
            .map(|d| (d.row_index, d.source_offset))
    }
}

/// Accumulates documents and emits flush decisions.
pub struct BatchAggregator {
    pending: Vec<PendingDocument>,
    token_total: usize,
    max_docs: usize,
    max_tokens: usize,
}

impl BatchAggregator {
    /// `max_docs` bounds documents per flush, `max_tokens` bounds the
    /// token sum per flush.
    pub fn new(max_docs: usize, max_tokens: usize) -> Self {
        Self {
            pending: Vec::new(),
            token_total: 0,
            max_docs: max_docs.max(1),
            max_tokens,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self, reason: FlushReason) -> Flush {
        let token_total = self.token_total;
        self.token_total = 0;
        Flush {
            documents: std::mem::take(&mut self.pending),
            reason,
            token_total,
        }
    }

    /// Offer the next document; returns the flushes it forced, in order.
    pub fn push(&mut self, pending: PendingDocument) -> Vec<Flush> {
        let mut flushes = Vec::new();
        let tokens = pending.document.token_count;

        if tokens > self.max_tokens {
            // The document cannot share a batch with anything.
            if !self.pending.is_empty() {
                flushes.push(self.take(FlushReason::ThresholdReached));
            }
            flushes.push(Flush {
                token_total: tokens,
                documents: vec![pending],
                reason: FlushReason::SingleOverSafety,
            });
            return flushes;
        }

        let would_overflow = self.pending.len() + 1 > self.max_docs
            || self.token_total + tokens > self.max_tokens;
        if would_overflow && !self.pending.is_empty() {
            flushes.push(self.take(FlushReason::ThresholdReached));
        }

        self.token_total += tokens;
        self.pending.push(pending);
        flushes
    }

    /// Emit whatever remains at end-of-stream.
    pub fn finish(&mut self) -> Option<Flush> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take(FlushReason::Eof))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vectorize_types::Metadata;

    fn doc(row: u64, tokens: usize) -> PendingDocument {
        PendingDocument {
            document: Document {
                id: format!("Table:{row:016x}"),
                text: "text".to_string(),
                metadata: Metadata::new(),
                token_count: tokens,
            },
            row_index: row,
            source_offset: row * 100,
        }
    }

    #[test]
    fn test_doc_threshold_flush() {
        let mut agg = BatchAggregator::new(3, 1_000);
        assert!(agg.push(doc(1, 10)).is_empty());
        assert!(agg.push(doc(2, 10)).is_empty());
        assert!(agg.push(doc(3, 10)).is_empty());

        // Fourth doc would exceed the count bound: flush first.
        let flushes = agg.push(doc(4, 10));
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].reason, FlushReason::ThresholdReached);
        assert_eq!(flushes[0].len(), 3);
        assert_eq!(flushes[0].token_total, 30);
        assert_eq!(flushes[0].last_position(), Some((3, 300)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_token_threshold_flush() {
        let mut agg = BatchAggregator::new(100, 50);
        assert!(agg.push(doc(1, 30)).is_empty());
        let flushes = agg.push(doc(2, 30));
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].reason, FlushReason::ThresholdReached);
        assert_eq!(flushes[0].len(), 1);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_single_over_safety_flushes_alone() {
        let mut agg = BatchAggregator::new(100, 50);
        assert!(agg.push(doc(1, 10)).is_empty());

        let flushes = agg.push(doc(2, 80));
        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].reason, FlushReason::ThresholdReached);
        assert_eq!(flushes[0].len(), 1);
        assert_eq!(flushes[1].reason, FlushReason::SingleOverSafety);
        assert_eq!(flushes[1].len(), 1);
        assert_eq!(flushes[1].token_total, 80);
        assert!(agg.is_empty());
    }

    #[test]
    fn test_single_over_safety_on_empty_buffer() {
        let mut agg = BatchAggregator::new(100, 50);
        let flushes = agg.push(doc(1, 80));
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].reason, FlushReason::SingleOverSafety);
    }

    #[test]
    fn test_finish_emits_eof() {
        let mut agg = BatchAggregator::new(100, 1_000);
        assert!(agg.finish().is_none());
        agg.push(doc(1, 10));
        agg.push(doc(2, 10));
        let flush = agg.finish().unwrap();
        assert_eq!(flush.reason, FlushReason::Eof);
        assert_eq!(flush.len(), 2);
        assert!(agg.finish().is_none());
    }

    #[test]
    fn test_exact_fit_does_not_flush_early() {
        let mut agg = BatchAggregator::new(2, 20);
        assert!(agg.push(doc(1, 10)).is_empty());
        assert!(agg.push(doc(2, 10)).is_empty());
        let flush = agg.finish().unwrap();
        assert_eq!(flush.len(), 2);
        assert_eq!(flush.token_total, 20);
    }
}
