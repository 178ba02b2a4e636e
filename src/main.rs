use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use review_scout::{
    AnalysisQueue, AnalysisStatus, AppConfig, LatLng, LlmService, PlaceRecord, PlacesService,
    ResultStore, SearchOrchestrator, Viewport,
};

const DEFAULT_CENTER_LAT: f64 = 35.7;
const DEFAULT_CENTER_LNG: f64 = 139.7;

#[derive(Parser, Debug)]
#[command(
    name = "review-scout",
    about = "Find places and score each one's reviews against a free-text criterion"
)]
struct Cli {
    /// Place-type search term
    #[arg(default_value = "cafe")]
    term: String,

    /// Criterion to score each place against
    #[arg(default_value = "has power outlets")]
    criterion: String,

    /// Latitude of the viewport center
    #[arg(long, default_value_t = DEFAULT_CENTER_LAT)]
    lat: f64,

    /// Longitude of the viewport center
    #[arg(long, default_value_t = DEFAULT_CENTER_LNG)]
    lng: f64,

    /// Viewport span in degrees; 0 searches without a viewport
    #[arg(long, default_value_t = 0.25)]
    span: f64,

    /// Print a bullet-point summary of each place's reviews as well
    #[arg(long)]
    summaries: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    review_scout::init_tracing();
    let args = Cli::parse();
    let config = AppConfig::from_env();

    let llm = LlmService::new(&config)?;
    let places = PlacesService::new(&config)?;
    let store = Arc::new(ResultStore::default());
    let queue = Arc::new(AnalysisQueue::new(store.clone(), llm.clone()));
    let orchestrator =
        SearchOrchestrator::new(places, llm.clone(), store.clone(), queue.clone(), &config);

    let viewport = (args.span > 0.0).then(|| {
        Viewport::around(
            LatLng {
                lat: args.lat,
                lng: args.lng,
            },
            args.span,
        )
    });

    let outcome = match orchestrator
        .run_search(&args.term, &args.criterion, viewport)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            // same posture as the UI: log it and show nothing
            warn!(?err, "search aborted");
            return Ok(());
        }
    };

    println!(
        "query \"{}\": {} places, {} queued for analysis",
        outcome.query, outcome.places_found, outcome.enqueued
    );
    // analysis started as jobs were enqueued; wait for the queue to go idle
    queue.join().await;

    let mut records = store.snapshot();
    records.sort_by(|a, b| {
        let a_value = a.score.as_ref().map(|s| s.value);
        let b_value = b.score.as_ref().map(|s| s.value);
        b_value
            .partial_cmp(&a_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for record in &records {
        print_record(record);
    }
    print_histogram(&store.histogram());

    if args.summaries {
        print_summaries(&llm, &records, config.max_reviews_per_analysis).await;
    }

    Ok(())
}

fn print_record(record: &PlaceRecord) {
    let address = record.address.as_deref().unwrap_or("-");
    let rating = record
        .rating
        .map(|r| format!("{r:.1}/5"))
        .unwrap_or_else(|| "N/A".to_string());
    println!();
    println!("{}  [{}]", record.name, record.marker_color);
    println!("  {address}  rating {rating}");
    match record.status {
        AnalysisStatus::Done => {
            if let Some(score) = &record.score {
                println!("  criterion {:.1}/5  \"{}\"", score.value, score.excerpt);
            }
        }
        AnalysisStatus::Failed => {
            if let Some(failure) = &record.failure {
                println!("  {failure}");
            }
        }
        _ => println!("  (no reviews to analyze)"),
    }
}

fn print_histogram(bins: &[usize]) {
    println!();
    println!("score distribution:");
    for (index, count) in bins.iter().enumerate() {
        println!("  {}\u{2605}  {}  {}", index + 1, "#".repeat(*count), count);
    }
}

async fn print_summaries(llm: &LlmService, records: &[PlaceRecord], max_reviews: usize) {
    for record in records {
        if record.reviews.is_empty() {
            continue;
        }
        let joined = record
            .reviews
            .iter()
            .take(max_reviews)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        match llm.summarize_reviews(&joined).await {
            Ok(summary) => {
                println!();
                println!("{}:", record.name);
                println!("{}", summary.analysis);
            }
            Err(err) => warn!(?err, place_id = %record.place_id, "summary failed"),
        }
    }
}
