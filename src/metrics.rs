use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// An id as it appears between the dots of a counter name.
///
/// `.` and `%` are percent-encoded, so one id's prefix never covers another
/// id's counters.
pub(crate) fn name_segment(id: &str) -> Cow<'_, str> {
    if !id.contains(['.', '%']) {
        return Cow::Borrowed(id);
    }
    let mut escaped = String::with_capacity(id.len() + 4);
    for c in id.chars() {
        match c {
            '.' => escaped.push_str("%2E"),
            '%' => escaped.push_str("%25"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// A monotonically increasing counter, safe to bump from any thread.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Destination for rule, stage and pipeline counters.
///
/// `counter` returns the same handle for the same name, so several rule
/// instances registering under one name share the count.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    fn counter(&self, name: &str) -> Arc<Counter>;

    /// Forget every counter whose name starts with `prefix`.
    fn remove_matching(&self, prefix: &str);
}

/// In-memory [`MetricsSink`].
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, `None` if it was never registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|c| c.get())
    }

    /// All counters and their values, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, c)| (name.clone(), c.get()))
            .collect()
    }
}

impl MetricsSink for MetricsRegistry {
    fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(existing) = self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(existing);
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(counters.entry(name.to_owned()).or_default())
    }

    fn remove_matching(&self, prefix: &str) {
        self.counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|name, _| !name.starts_with(prefix));
    }
}

/// The four per-rule counters.
#[derive(Debug, Clone, Default)]
pub struct RuleMetrics {
    executed: Arc<Counter>,
    matched: Arc<Counter>,
    not_matched: Arc<Counter>,
    failed: Arc<Counter>,
}

impl RuleMetrics {
    /// Counters private to one rule instance, not visible in any sink.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn registered(sink: &dyn MetricsSink, prefix: &str) -> Self {
        Self {
            executed: sink.counter(&format!("{prefix}.executed")),
            matched: sink.counter(&format!("{prefix}.matched")),
            not_matched: sink.counter(&format!("{prefix}.not-matched")),
            failed: sink.counter(&format!("{prefix}.failed")),
        }
    }

    pub(crate) fn mark_executed(&self) {
        self.executed.increment();
    }

    pub(crate) fn mark_matched(&self) {
        self.matched.increment();
    }

    pub(crate) fn mark_not_matched(&self) {
        self.not_matched.increment();
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.increment();
    }

    #[must_use]
    pub fn snapshot(&self) -> RuleMetricsSnapshot {
        RuleMetricsSnapshot {
            executed: self.executed.get(),
            matched: self.matched.get(),
            not_matched: self.not_matched.get(),
            failed: self.failed.get(),
        }
    }
}

/// Point-in-time copy of [`RuleMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RuleMetricsSnapshot {
    pub executed: u64,
    pub matched: u64,
    pub not_matched: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_segments_escape_separators() {
        assert_eq!(name_segment("r1"), "r1");
        assert_eq!(name_segment("a.b"), "a%2Eb");
        assert_eq!(name_segment("50%"), "50%25");
        assert_ne!(name_segment("a.b"), name_segment("a%2Eb"));
    }

    #[test]
    fn counter_increments() {
        let c = Counter::default();
        c.increment();
        c.increment();
        assert_eq!(c.get(), 2);
    }

    #[test]
    fn registry_returns_shared_handles() {
        let registry = MetricsRegistry::new();
        let a = registry.counter("x");
        let b = registry.counter("x");
        a.increment();
        b.increment();
        assert_eq!(registry.get("x"), Some(2));
        assert_eq!(registry.get("y"), None);
    }

    #[test]
    fn remove_matching_prefix() {
        let registry = MetricsRegistry::new();
        registry.counter("rule.a.executed").increment();
        registry.counter("rule.ab.executed").increment();
        registry.counter("pipeline.p.executed").increment();
        registry.remove_matching("rule.a.");
        let names: Vec<String> = registry.snapshot().into_keys().collect();
        assert_eq!(names, vec!["pipeline.p.executed", "rule.ab.executed"]);
    }

    #[test]
    fn rule_metrics_register_under_prefix() {
        let registry = MetricsRegistry::new();
        let m = RuleMetrics::registered(&registry, "rule.r1");
        m.mark_matched();
        m.mark_executed();
        m.mark_failed();
        assert_eq!(registry.get("rule.r1.matched"), Some(1));
        assert_eq!(registry.get("rule.r1.not-matched"), Some(0));
        assert_eq!(
            m.snapshot(),
            RuleMetricsSnapshot {
                executed: 1,
                matched: 1,
                not_matched: 0,
                failed: 1,
            }
        );
    }

    #[test]
    fn detached_metrics_are_independent() {
        let a = RuleMetrics::detached();
        let b = RuleMetrics::detached();
        a.mark_matched();
        assert_eq!(a.snapshot().matched, 1);
        assert_eq!(b.snapshot().matched, 0);
    }
}
