use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::color::{histogram_bins, score_color, HISTOGRAM_BUCKETS};
use crate::places::LatLng;

/// Monotonic search-session generation. Every store write carries the session
/// it was produced under; writes from a superseded session are dropped, so an
/// analysis that outlives its search cannot land in the next session's store.
pub type SessionId = u64;

pub const UNSCORED_MARKER_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Unqueued,
    Queued,
    Analyzing,
    Done,
    Failed,
}

impl AnalysisStatus {
    fn can_become(self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Unqueued, AnalysisStatus::Queued)
                | (AnalysisStatus::Queued, AnalysisStatus::Analyzing)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Done)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionScore {
    pub value: f64,
    pub excerpt: String,
}

/// One place's display and analysis state. Display fields are immutable once
/// fetched; the score, failure message, marker color, and status are mutated
/// by the queue worker as analysis progresses.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceRecord {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub rating: Option<f64>,
    pub location: LatLng,
    pub reviews: Vec<String>,
    pub score: Option<CriterionScore>,
    pub failure: Option<String>,
    pub marker_color: String,
    pub status: AnalysisStatus,
    pub fetched_at: DateTime<Utc>,
}

impl PlaceRecord {
    pub fn new(
        place_id: String,
        name: String,
        address: Option<String>,
        rating: Option<f64>,
        location: LatLng,
        reviews: Vec<String>,
    ) -> Self {
        Self {
            place_id,
            name,
            address,
            rating,
            location,
            reviews,
            score: None,
            failure: None,
            marker_color: UNSCORED_MARKER_COLOR.to_string(),
            status: AnalysisStatus::Unqueued,
            fetched_at: Utc::now(),
        }
    }

    fn marker(&self) -> Marker {
        Marker {
            place_id: self.place_id.clone(),
            position: self.location,
            label: self
                .name
                .chars()
                .next()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "\u{2022}".to_string()),
            color: self.marker_color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub place_id: String,
    pub position: LatLng,
    pub label: String,
    pub color: String,
}

#[derive(Default)]
struct Inner {
    session: SessionId,
    records: HashMap<String, PlaceRecord>,
    order: Vec<String>,
}

/// Shared map from place id to its current state, replaced wholesale at the
/// start of each search session.
#[derive(Default)]
pub struct ResultStore {
    inner: Mutex<Inner>,
}

impl ResultStore {
    /// Discards every prior record and returns the fresh session id.
    pub fn begin_session(&self) -> SessionId {
        let mut inner = self.inner.lock();
        inner.session += 1;
        inner.records.clear();
        inner.order.clear();
        inner.session
    }

    pub fn current_session(&self) -> SessionId {
        self.inner.lock().session
    }

    /// Returns false (and drops the record) when `session` is stale.
    pub fn insert(&self, session: SessionId, record: PlaceRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.session != session {
            return false;
        }
        if !inner.records.contains_key(&record.place_id) {
            inner.order.push(record.place_id.clone());
        }
        inner.records.insert(record.place_id.clone(), record);
        true
    }

    pub fn status_of(&self, place_id: &str) -> Option<AnalysisStatus> {
        self.inner
            .lock()
            .records
            .get(place_id)
            .map(|record| record.status)
    }

    pub fn score_of(&self, place_id: &str) -> Option<CriterionScore> {
        self.inner
            .lock()
            .records
            .get(place_id)
            .and_then(|record| record.score.clone())
    }

    pub fn mark_queued(&self, session: SessionId, place_id: &str) -> bool {
        self.transition(session, place_id, AnalysisStatus::Queued)
    }

    pub fn mark_analyzing(&self, session: SessionId, place_id: &str) -> bool {
        self.transition(session, place_id, AnalysisStatus::Analyzing)
    }

    /// Records a successful analysis: score, excerpt, derived marker color,
    /// terminal `Done` status.
    pub fn apply_score(&self, session: SessionId, place_id: &str, score: CriterionScore) -> bool {
        let mut inner = self.inner.lock();
        if inner.session != session {
            return false;
        }
        let Some(record) = inner.records.get_mut(place_id) else {
            return false;
        };
        if !record.status.can_become(AnalysisStatus::Done) {
            return false;
        }
        record.marker_color = score_color(Some(score.value), true);
        record.score = Some(score);
        record.failure = None;
        record.status = AnalysisStatus::Done;
        true
    }

    /// Records a failed analysis with its user-facing message; terminal.
    pub fn mark_failed(&self, session: SessionId, place_id: &str, message: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.session != session {
            return false;
        }
        let Some(record) = inner.records.get_mut(place_id) else {
            return false;
        };
        if !record.status.can_become(AnalysisStatus::Failed) {
            return false;
        }
        record.failure = Some(message.to_string());
        record.status = AnalysisStatus::Failed;
        true
    }

    /// Records in insertion order.
    pub fn snapshot(&self) -> Vec<PlaceRecord> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    pub fn markers(&self) -> Vec<Marker> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).map(PlaceRecord::marker))
            .collect()
    }

    pub fn histogram(&self) -> [usize; HISTOGRAM_BUCKETS] {
        let inner = self.inner.lock();
        histogram_bins(
            inner
                .records
                .values()
                .filter_map(|record| record.score.as_ref().map(|score| score.value)),
        )
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    fn transition(&self, session: SessionId, place_id: &str, next: AnalysisStatus) -> bool {
        let mut inner = self.inner.lock();
        if inner.session != session {
            return false;
        }
        let Some(record) = inner.records.get_mut(place_id) else {
            return false;
        };
        if !record.status.can_become(next) {
            return false;
        }
        record.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> PlaceRecord {
        PlaceRecord::new(
            id.to_string(),
            format!("Place {id}"),
            Some("1 Test St".to_string()),
            Some(4.2),
            LatLng { lat: 35.7, lng: 139.7 },
            vec!["nice spot".to_string()],
        )
    }

    #[test]
    fn new_session_discards_prior_records() {
        let store = ResultStore::default();
        let first = store.begin_session();
        assert!(store.insert(first, record("a")));
        assert_eq!(store.len(), 1);

        let second = store.begin_session();
        assert_ne!(first, second);
        assert!(store.is_empty());
    }

    #[test]
    fn stale_writes_are_dropped() {
        let store = ResultStore::default();
        let stale = store.begin_session();
        assert!(store.insert(stale, record("a")));
        assert!(store.mark_queued(stale, "a"));

        let current = store.begin_session();
        assert!(store.insert(current, record("a")));

        assert!(!store.mark_analyzing(stale, "a"));
        assert!(!store.apply_score(
            stale,
            "a",
            CriterionScore {
                value: 5.0,
                excerpt: "late".to_string(),
            },
        ));
        assert_eq!(store.status_of("a"), Some(AnalysisStatus::Unqueued));
    }

    #[test]
    fn status_only_moves_forward() {
        let store = ResultStore::default();
        let session = store.begin_session();
        store.insert(session, record("a"));

        assert!(!store.mark_analyzing(session, "a"));
        assert!(store.mark_queued(session, "a"));
        assert!(!store.mark_queued(session, "a"));
        assert!(store.mark_analyzing(session, "a"));
        assert!(store.apply_score(
            session,
            "a",
            CriterionScore {
                value: 4.0,
                excerpt: "good".to_string(),
            },
        ));
        assert_eq!(store.status_of("a"), Some(AnalysisStatus::Done));
        assert!(!store.mark_failed(session, "a", "too late"));
    }

    #[test]
    fn scoring_tints_the_marker() {
        let store = ResultStore::default();
        let session = store.begin_session();
        store.insert(session, record("a"));
        store.mark_queued(session, "a");
        store.mark_analyzing(session, "a");
        store.apply_score(
            session,
            "a",
            CriterionScore {
                value: 5.0,
                excerpt: "outlets at every seat".to_string(),
            },
        );

        let markers = store.markers();
        assert_eq!(markers.len(), 1);
        // highest score lands on the cool end of the inverted gradient
        assert_eq!(markers[0].color, "#4285f4");
    }

    #[test]
    fn histogram_counts_scored_records_only() {
        let store = ResultStore::default();
        let session = store.begin_session();
        for (id, value) in [("a", 1.2), ("b", 2.9), ("c", 5.0), ("d", 3.4), ("e", 3.5)] {
            store.insert(session, record(id));
            store.mark_queued(session, id);
            store.mark_analyzing(session, id);
            store.apply_score(
                session,
                id,
                CriterionScore {
                    value,
                    excerpt: String::new(),
                },
            );
        }
        store.insert(session, record("unscored"));

        assert_eq!(store.histogram(), [1, 1, 2, 0, 1]);
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let store = ResultStore::default();
        let session = store.begin_session();
        for id in ["c", "a", "b"] {
            store.insert(session, record(id));
        }
        let ids: Vec<_> = store
            .snapshot()
            .into_iter()
            .map(|r| r.place_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
