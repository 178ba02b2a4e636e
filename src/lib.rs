mod color;
mod config;
mod errors;
mod llm;
mod places;
mod queue;
mod results;
mod search;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use color::{histogram_bins, score_color, HISTOGRAM_BUCKETS};
pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use llm::{
    ChatBackend, ChatPrompt, CriterionExamples, HttpChatClient, LlmService, ReviewScore,
    ReviewSummary,
};
pub use places::{LatLng, PlaceDetails, PlaceDirectory, PlaceSummary, PlacesService, Viewport};
pub use queue::{AnalysisJob, AnalysisQueue, ANALYSIS_FAILURE_MESSAGE};
pub use results::{
    AnalysisStatus, CriterionScore, Marker, PlaceRecord, ResultStore, SessionId,
    UNSCORED_MARKER_COLOR,
};
pub use search::{SearchOrchestrator, SearchOutcome};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,review_scout=info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
