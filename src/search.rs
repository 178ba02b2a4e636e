use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::llm::{CriterionExamples, LlmService};
use crate::places::{PlacesService, Viewport};
use crate::queue::{AnalysisJob, AnalysisQueue};
use crate::results::{Marker, PlaceRecord, ResultStore, SessionId};

/// Runs one search session: derives the query, finds places, enriches them
/// with details, and seeds the analysis queue for every place with reviews.
pub struct SearchOrchestrator {
    places: PlacesService,
    llm: LlmService,
    store: Arc<ResultStore>,
    queue: Arc<AnalysisQueue>,
    max_reviews_per_analysis: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub session: SessionId,
    pub query: String,
    pub examples: CriterionExamples,
    pub markers: Vec<Marker>,
    pub bounds: Option<Viewport>,
    pub places_found: usize,
    pub enqueued: usize,
    pub completed_at: DateTime<Utc>,
}

impl SearchOrchestrator {
    pub fn new(
        places: PlacesService,
        llm: LlmService,
        store: Arc<ResultStore>,
        queue: Arc<AnalysisQueue>,
        config: &AppConfig,
    ) -> Self {
        Self {
            places,
            llm,
            store,
            queue,
            max_reviews_per_analysis: config.max_reviews_per_analysis,
        }
    }

    /// Replaces the result store with a fresh session and seeds it from one
    /// text search. Any failure before places are fetched aborts the whole
    /// attempt; a failed detail fetch skips that one place.
    ///
    /// Each accepted enqueue starts the analysis worker in the background;
    /// call [`AnalysisQueue::join`] to wait for the scores.
    pub async fn run_search(
        &self,
        term: &str,
        criterion: &str,
        viewport: Option<Viewport>,
    ) -> AppResult<SearchOutcome> {
        let session = self.store.begin_session();

        let examples = self.llm.generate_examples(term, criterion).await?;
        let summaries = self
            .places
            .text_search(&examples.search_query, viewport.as_ref())
            .await?;
        debug!(
            query = %examples.search_query,
            hits = summaries.len(),
            "place search returned"
        );

        // all detail fetches settle before the marker set is finalized
        let details = join_all(
            summaries
                .iter()
                .map(|summary| self.places.place_details(&summary.place_id)),
        )
        .await;

        let mut enqueued = 0;
        for (summary, details) in summaries.into_iter().zip(details) {
            let details = match details {
                Ok(details) => details,
                Err(err) => {
                    warn!(?err, place_id = %summary.place_id, "detail fetch failed; skipping place");
                    continue;
                }
            };

            let name = if details.name.is_empty() {
                summary.name
            } else {
                details.name
            };
            let record = PlaceRecord::new(
                summary.place_id.clone(),
                name,
                details.formatted_address,
                details.rating.or(summary.rating),
                summary.location,
                details.reviews.clone(),
            );
            if !self.store.insert(session, record) {
                debug!(place_id = %summary.place_id, "session superseded mid-search");
                continue;
            }

            if !details.reviews.is_empty() {
                let job = AnalysisJob {
                    session,
                    place_id: summary.place_id,
                    review_texts: details
                        .reviews
                        .into_iter()
                        .take(self.max_reviews_per_analysis)
                        .collect(),
                    metric: criterion.to_string(),
                    examples: examples.clone(),
                };
                if self.queue.enqueue(job) {
                    enqueued += 1;
                }
            }
        }

        let snapshot = self.store.snapshot();
        let bounds = Viewport::fit(snapshot.iter().map(|record| record.location));

        Ok(SearchOutcome {
            session,
            query: examples.search_query.clone(),
            examples,
            markers: self.store.markers(),
            bounds,
            places_found: snapshot.len(),
            enqueued,
            completed_at: Utc::now(),
        })
    }
}
