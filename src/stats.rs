//! Per-source outcome accounting

use std::fmt;

use crate::config::Source;

/// Terminal result of processing one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Filtered out by include/exclude patterns
    Skipped,
    /// New mirror cloned and fully prepared
    Mirrored,
    /// Existing mirror fetched
    Updated,
    /// Mirror path could not be inspected
    Failed,
    /// New mirror failed part-way and was rolled back
    FailedMirror,
    /// Existing mirror could not be updated; left untouched
    FailedUpdate,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Skipped => "skipped",
            Outcome::Mirrored => "mirrored",
            Outcome::Updated => "updated",
            Outcome::Failed => "failed",
            Outcome::FailedMirror => "failed_mirror",
            Outcome::FailedUpdate => "failed_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skipped" => Some(Outcome::Skipped),
            "mirrored" => Some(Outcome::Mirrored),
            "updated" => Some(Outcome::Updated),
            "failed" => Some(Outcome::Failed),
            "failed_mirror" => Some(Outcome::FailedMirror),
            "failed_update" => Some(Outcome::FailedUpdate),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Failed | Outcome::FailedMirror | Outcome::FailedUpdate
        )
    }

    /// True if the mirror is known-good after this outcome
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Mirrored | Outcome::Updated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub source: Source,
    pub repos: usize,
    pub skipped: usize,
    pub mirrored: usize,
    pub updated: usize,
    pub failed: usize,
    pub failed_mirror: usize,
    pub failed_update: usize,
    /// Set when the source's repositories could not be listed
    pub listing_error: Option<String>,
}

impl Stat {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            repos: 0,
            skipped: 0,
            mirrored: 0,
            updated: 0,
            failed: 0,
            failed_mirror: 0,
            failed_update: 0,
            listing_error: None,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.repos += 1;
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Mirrored => self.mirrored += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::FailedMirror => self.failed_mirror += 1,
            Outcome::FailedUpdate => self.failed_update += 1,
        }
    }

    /// Sum of the six outcome counters; always equals `repos`
    pub fn outcome_total(&self) -> usize {
        self.skipped
            + self.mirrored
            + self.updated
            + self.failed
            + self.failed_mirror
            + self.failed_update
    }

    pub fn failures(&self) -> usize {
        self.failed + self.failed_mirror + self.failed_update
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source [{}] stats: repos:{} skipped:{} mirrored:{} updated:{} failed:{} failed_mirror:{} failed_update:{}",
            self.source,
            self.repos,
            self.skipped,
            self.mirrored,
            self.updated,
            self.failed,
            self.failed_mirror,
            self.failed_update
        )
    }
}

/// Accumulates one [`Stat`] per source, in configured order
#[derive(Debug, Default)]
pub struct StatsAggregator {
    stats: Vec<Stat>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting for `source`; returns the index to record against
    pub fn begin(&mut self, source: &Source) -> usize {
        self.stats.push(Stat::new(source.clone()));
        self.stats.len() - 1
    }

    pub fn record(&mut self, index: usize, outcome: Outcome) {
        if let Some(stat) = self.stats.get_mut(index) {
            stat.record(outcome);
        }
    }

    pub fn listing_failed(&mut self, index: usize, error: impl fmt::Display) {
        if let Some(stat) = self.stats.get_mut(index) {
            stat.listing_error = Some(error.to_string());
        }
    }

    pub fn report(&self) -> &[Stat] {
        &self.stats
    }

    pub fn into_report(self) -> Vec<Stat> {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    const ALL: [Outcome; 6] = [
        Outcome::Skipped,
        Outcome::Mirrored,
        Outcome::Updated,
        Outcome::Failed,
        Outcome::FailedMirror,
        Outcome::FailedUpdate,
    ];

    impl Arbitrary for Outcome {
        fn arbitrary(g: &mut Gen) -> Self {
            *g.choose(&ALL).unwrap()
        }
    }

    #[test]
    fn test_outcome_round_trip_names() {
        for outcome in ALL {
            assert_eq!(Outcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(Outcome::parse("bogus"), None);
    }

    #[test]
    fn test_failure_and_success_partition() {
        for outcome in ALL {
            assert!(!(outcome.is_failure() && outcome.is_success()));
        }
        assert!(!Outcome::Skipped.is_failure());
        assert!(!Outcome::Skipped.is_success());
    }

    #[test]
    fn test_report_keeps_source_order() {
        let mut agg = StatsAggregator::new();
        let a = agg.begin(&Source::new("a.example.com"));
        let b = agg.begin(&Source::new("b.example.com"));

        agg.record(b, Outcome::Updated);
        agg.record(a, Outcome::Mirrored);
        agg.record(a, Outcome::Skipped);
        agg.listing_failed(b, "HTTP 500");

        let report = agg.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].source.domain, "a.example.com");
        assert_eq!(report[0].repos, 2);
        assert_eq!(report[0].mirrored, 1);
        assert_eq!(report[0].skipped, 1);
        assert_eq!(report[1].updated, 1);
        assert_eq!(report[1].listing_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_stat_display_line() {
        let mut source = Source::new("gitlab.example.com");
        source.username = Some("alice".to_string());
        let mut stat = Stat::new(source);
        stat.record(Outcome::Mirrored);
        stat.record(Outcome::FailedUpdate);

        assert_eq!(
            stat.to_string(),
            "Source [alice@gitlab.example.com] stats: repos:2 skipped:0 mirrored:1 updated:0 failed:0 failed_mirror:0 failed_update:1"
        );
        assert_eq!(stat.failures(), 1);
    }

    #[quickcheck]
    fn prop_outcomes_are_exhaustive_and_exclusive(outcomes: Vec<Outcome>) -> bool {
        let mut stat = Stat::new(Source::new("gitlab.example.com"));
        for outcome in &outcomes {
            stat.record(*outcome);
        }
        stat.repos == outcomes.len() && stat.outcome_total() == outcomes.len()
    }
}
