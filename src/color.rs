//! Marker and histogram tinting.
//!
//! Scores live on a 0..=5 axis. The gradient runs from blue (#4285F4) to red
//! (#DB4437); with `invert` set, a high score lands on the blue end, which is
//! what criterion scores use so strong matches read as "cool".

const LOW_COLOR: Rgb = Rgb {
    r: 66,
    g: 133,
    b: 244,
};
const HIGH_COLOR: Rgb = Rgb {
    r: 219,
    g: 68,
    b: 55,
};

const SCORE_MAX: f64 = 5.0;
const DEFAULT_SCORE: f64 = 3.0;

pub const HISTOGRAM_BUCKETS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

/// Maps a score in `[0, 5]` to a `#rrggbb` string by linear interpolation
/// between the two endpoint colors. Out-of-range inputs clamp to the nearest
/// boundary; a missing score falls back to the midpoint.
pub fn score_color(score: Option<f64>, invert: bool) -> String {
    let score = score.unwrap_or(DEFAULT_SCORE);
    let normalized = score.clamp(0.0, SCORE_MAX) / SCORE_MAX;
    let t = if invert { 1.0 - normalized } else { normalized };

    let r = lerp_channel(LOW_COLOR.r, HIGH_COLOR.r, t);
    let g = lerp_channel(LOW_COLOR.g, HIGH_COLOR.g, t);
    let b = lerp_channel(LOW_COLOR.b, HIGH_COLOR.b, t);

    format!("#{r:02x}{g:02x}{b:02x}")
}

fn lerp_channel(low: u8, high: u8, t: f64) -> u8 {
    let value = low as f64 + (high as f64 - low as f64) * t;
    value.round() as u8
}

/// Bins scores into five buckets by `floor(score) - 1`; floors outside 1..=5
/// are dropped.
pub fn histogram_bins(scores: impl IntoIterator<Item = f64>) -> [usize; HISTOGRAM_BUCKETS] {
    let mut bins = [0_usize; HISTOGRAM_BUCKETS];
    for score in scores {
        let index = score.floor() as i64 - 1;
        if (0..HISTOGRAM_BUCKETS as i64).contains(&index) {
            bins[index as usize] += 1;
        }
    }
    bins
}
