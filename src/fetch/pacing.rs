use rand::distr::{Distribution, Uniform};
use std::time::Duration;

/// Uniformly drawn pause in `[min, max)`; a degenerate window yields `min`.
pub fn pacing_delay(min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    if hi <= lo {
        return min;
    }
    let Ok(dist) = Uniform::new(lo, hi) else {
        return min;
    };
    let mut rng = rand::rng();
    Duration::from_millis(dist.sample(&mut rng))
}
