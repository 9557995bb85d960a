//! Ordering markers for post-processors, advisors and listeners.

use std::cmp::Ordering;

/// Highest precedence order value.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;
/// Lowest precedence order value.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Ordering capability declared on a bean definition.
///
/// Processors are partitioned by variant first: every `PriorityOrdered`
/// processor runs before any `Ordered` one, and `Ordered` before
/// `Unordered`. Within a tier lower values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderMarker {
    /// Highest tier, sorted by value
    PriorityOrdered(i32),
    /// Middle tier, sorted by value
    Ordered(i32),
    /// Discovery order
    #[default]
    Unordered,
}

impl OrderMarker {
    /// Order value used for sorting within a tier.
    pub fn value(&self) -> i32 {
        match self {
            OrderMarker::PriorityOrdered(v) | OrderMarker::Ordered(v) => *v,
            OrderMarker::Unordered => LOWEST_PRECEDENCE,
        }
    }

    pub fn is_priority(&self) -> bool {
        matches!(self, OrderMarker::PriorityOrdered(_))
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, OrderMarker::Ordered(_))
    }

    fn tier(&self) -> u8 {
        match self {
            OrderMarker::PriorityOrdered(_) => 0,
            OrderMarker::Ordered(_) => 1,
            OrderMarker::Unordered => 2,
        }
    }
}

impl PartialOrd for OrderMarker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderMarker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier()
            .cmp(&other.tier())
            .then_with(|| self.value().cmp(&other.value()))
    }
}

/// Stable sort by order marker; equal markers keep discovery order.
pub(crate) fn sort_by_order<T>(items: &mut [T], marker: impl Fn(&T) -> OrderMarker) {
    if items.len() <= 1 {
        return;
    }
    items.sort_by(|a, b| marker(a).cmp(&marker(b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_tier_beats_lower_values_in_other_tiers() {
        assert!(OrderMarker::PriorityOrdered(100) < OrderMarker::Ordered(-100));
        assert!(OrderMarker::Ordered(LOWEST_PRECEDENCE) < OrderMarker::Unordered);
    }

    #[test]
    fn sort_is_stable_for_equal_markers() {
        let mut items = vec![("b", OrderMarker::Ordered(1)), ("a", OrderMarker::Ordered(1)), ("c", OrderMarker::Ordered(0))];
        sort_by_order(&mut items, |(_, m)| *m);
        let names: Vec<_> = items.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }
}
