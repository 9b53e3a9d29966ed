use std::fmt;
use std::time::Duration;

use chatlens_domain::FailureKind;

/// Outcome counts of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Zero-based batch number within the run.
    pub index: usize,
    /// Range of conversation indices the batch covered.
    pub start: usize,
    pub end: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub timed_out: usize,
    pub retries: usize,
}

impl BatchReport {
    pub fn new(index: usize, start: usize, end: usize) -> Self {
        Self { index, start, end, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn record_failure(&mut self, kind: FailureKind) {
        self.failed += 1;
        match kind {
            FailureKind::RateLimited => self.rate_limited += 1,
            FailureKind::Timeout => self.timed_out += 1,
            FailureKind::Other => {}
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} [{}..{}): {} ok, {} failed",
            self.index + 1,
            self.start,
            self.end,
            self.succeeded,
            self.failed
        )
    }
}

/// Aggregate over every batch processed by one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    /// Conversations already done before this invocation started.
    pub skipped: usize,
    pub batches: Vec<BatchReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.batches.iter().map(BatchReport::len).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed).sum()
    }

    pub fn rate_limited(&self) -> usize {
        self.batches.iter().map(|b| b.rate_limited).sum()
    }

    pub fn timed_out(&self) -> usize {
        self.batches.iter().map(|b| b.timed_out).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped + self.processed() >= self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversations: {}", self.total)?;
        if self.skipped > 0 {
            writeln!(f, "Resumed after: {}", self.skipped)?;
        }
        writeln!(f, "Processed:     {} in {} batches", self.processed(), self.batches.len())?;
        writeln!(f, "Analyzed:      {}", self.succeeded())?;
        write!(
            f,
            "Unanalyzed:    {} (rate limited {}, timed out {})",
            self.failed(),
            self.rate_limited(),
            self.timed_out()
        )?;
        if self.elapsed > Duration::ZERO {
            write!(f, "\nElapsed:       {:.1}s", self.elapsed.as_secs_f64())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_summary_totals() {
        let mut first = BatchReport::new(0, 0, 3);
        first.succeeded = 2;
        first.record_failure(FailureKind::Timeout);
        let mut second = BatchReport::new(1, 3, 5);
        second.succeeded = 1;
        second.record_failure(FailureKind::RateLimited);

        let fixture = RunSummary { total: 7, skipped: 2, batches: vec![first, second], ..Default::default() };

        assert_eq!(
            (fixture.processed(), fixture.succeeded(), fixture.failed()),
            (5, 3, 2)
        );
        assert!(fixture.is_complete());
    }

    #[test]
    fn test_batch_report_display() {
        let mut fixture = BatchReport::new(2, 50, 75);
        fixture.succeeded = 24;
        fixture.failed = 1;
        assert_eq!(fixture.to_string(), "batch 3 [50..75): 24 ok, 1 failed");
    }
}
