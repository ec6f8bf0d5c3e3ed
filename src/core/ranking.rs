use std::cmp::Ordering;

use crate::core::distance::distance_meters;
use crate::models::{MatchQuery, Signal, SignalMatch};

/// Whether a signal may be offered as a match for the query
///
/// Exact category, `active` status, and within the radius by the shared distance.
#[inline]
pub fn is_candidate(query: &MatchQuery, signal: &Signal, distance: f64) -> bool {
    signal.is_active() && signal.category == query.category && distance <= query.radius_meters
}

/// Total order used by every tier: priority desc, distance asc, id asc
pub fn compare_matches(a: &SignalMatch, b: &SignalMatch) -> Ordering {
    b.signal
        .priority
        .cmp(&a.signal.priority)
        .then_with(|| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.signal.id.cmp(&b.signal.id))
}

/// Filter, measure, order and cap raw store rows
pub fn rank_matches<I>(query: &MatchQuery, signals: I) -> Vec<SignalMatch>
where
    I: IntoIterator<Item = Signal>,
{
    let measured = signals.into_iter().map(|signal| {
        let distance = distance_meters(query.location, signal.location);
        (signal, distance)
    });
    rank_measured(query, measured)
}

/// Same as [`rank_matches`] for rows that already carry a distance
pub fn rank_measured<I>(query: &MatchQuery, measured: I) -> Vec<SignalMatch>
where
    I: IntoIterator<Item = (Signal, f64)>,
{
    let mut matches: Vec<SignalMatch> = measured
        .into_iter()
        .filter(|(signal, distance)| is_candidate(query, signal, *distance))
        .map(|(signal, distance_meters)| SignalMatch {
            signal,
            distance_meters,
        })
        .collect();

    matches.sort_by(compare_matches);

    // Duplicate ids across a store's rows keep the best-ranked entry only
    let mut seen = std::collections::HashSet::new();
    matches.retain(|m| seen.insert(m.signal.id.clone()));

    matches.truncate(query.limit);
    matches
}

/// True when `matches` satisfies the cross-tier ordering invariant
pub fn is_ranked(matches: &[SignalMatch]) -> bool {
    matches
        .windows(2)
        .all(|pair| compare_matches(&pair[0], &pair[1]) != Ordering::Greater)
}
