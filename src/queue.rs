use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::llm::{CriterionExamples, LlmService};
use crate::results::{AnalysisStatus, CriterionScore, ResultStore, SessionId};

pub const ANALYSIS_FAILURE_MESSAGE: &str = "Something went wrong while analyzing the reviews.";
const REVIEW_SEPARATOR: &str = "\n\n---\n\n";

/// One place's pending review-analysis work unit.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub session: SessionId,
    pub place_id: String,
    pub review_texts: Vec<String>,
    pub metric: String,
    pub examples: CriterionExamples,
}

/// FIFO queue of analysis jobs drained by at most one worker loop at a time.
///
/// The controller owns its job list and drain lock; callers share it via
/// `Arc` and may call `enqueue` and `drain` from any task. Every accepted
/// enqueue triggers a drain, and `drain` returns immediately when another
/// drain is already running, so the loop starts at most once per burst.
pub struct AnalysisQueue {
    jobs: Mutex<VecDeque<AnalysisJob>>,
    drain_lock: tokio::sync::Mutex<()>,
    store: Arc<ResultStore>,
    llm: LlmService,
}

impl AnalysisQueue {
    pub fn new(store: Arc<ResultStore>, llm: LlmService) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            drain_lock: tokio::sync::Mutex::new(()),
            store,
            llm,
        }
    }

    /// Adds a job unless that place is already queued or being analyzed, and
    /// kicks off the worker loop if it is not already running. Returns
    /// whether the job was accepted.
    pub fn enqueue(self: &Arc<Self>, job: AnalysisJob) -> bool {
        if matches!(
            self.store.status_of(&job.place_id),
            Some(AnalysisStatus::Queued) | Some(AnalysisStatus::Analyzing)
        ) {
            debug!(place_id = %job.place_id, "analysis already pending; enqueue refused");
            return false;
        }
        if !self.store.mark_queued(job.session, &job.place_id) {
            debug!(place_id = %job.place_id, "place not eligible for queueing");
            return false;
        }
        self.jobs.lock().push_back(job);
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.drain().await });
        true
    }

    pub fn depth(&self) -> usize {
        self.jobs.lock().len()
    }

    /// The worker loop: processes jobs strictly in enqueue order until the
    /// queue is empty. Re-entrant calls return immediately while a drain is
    /// active; the lock is released only once the queue has emptied.
    pub async fn drain(&self) {
        loop {
            {
                let Ok(_running) = self.drain_lock.try_lock() else {
                    return;
                };
                self.run_jobs().await;
            }

            // a job enqueued while the lock was being released
            if self.jobs.lock().is_empty() {
                return;
            }
        }
    }

    /// Waits until the queue has gone idle, processing any jobs an active
    /// drain has not picked up yet.
    pub async fn join(&self) {
        loop {
            {
                let _running = self.drain_lock.lock().await;
                self.run_jobs().await;
            }

            if self.jobs.lock().is_empty() {
                return;
            }
        }
    }

    async fn run_jobs(&self) {
        loop {
            let job = self.jobs.lock().front().cloned();
            let Some(job) = job else {
                break;
            };
            self.process(job).await;
            // removed regardless of outcome
            self.jobs.lock().pop_front();
        }
    }

    async fn process(&self, job: AnalysisJob) {
        if job.session != self.store.current_session() {
            debug!(place_id = %job.place_id, "discarding job from a superseded session");
            return;
        }
        if self.store.score_of(&job.place_id).is_some() {
            debug!(place_id = %job.place_id, "place already scored; skipping");
            return;
        }
        if !self.store.mark_analyzing(job.session, &job.place_id) {
            return;
        }

        let joined = job.review_texts.join(REVIEW_SEPARATOR);
        match self
            .llm
            .score_reviews(&joined, &job.metric, &job.examples)
            .await
        {
            Ok(score) => {
                let applied = self.store.apply_score(
                    job.session,
                    &job.place_id,
                    CriterionScore {
                        value: score.value,
                        excerpt: score.related_review,
                    },
                );
                if !applied {
                    debug!(place_id = %job.place_id, "score arrived for a superseded record");
                }
            }
            Err(err) => {
                warn!(?err, place_id = %job.place_id, "review analysis failed");
                self.store
                    .mark_failed(job.session, &job.place_id, ANALYSIS_FAILURE_MESSAGE);
            }
        }
    }
}
