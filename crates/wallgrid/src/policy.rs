//! Skip heuristics and the random source they draw from.
//!
//! Every probabilistic decision in the crate goes through [`Sampler`] so tests
//! can script exact draws. Production code hands in a seeded `StdRng`.

use rand::Rng;

/// Half of the "sign my guestbook" gifs are dropped before download.
pub const GUESTBOOK_SKIP: f32 = 0.5;
/// Same treatment for "new" badges.
pub const NEW_SKIP: f32 = 0.5;
/// Banner-shaped gifs are mostly dropped after decode.
pub const WIDE_RATIO: f32 = 3.0;
pub const WIDE_SKIP: f32 = 0.8;
/// Extremely wide ones draw a second, harsher check.
pub const ULTRA_WIDE_RATIO: f32 = 4.0;
pub const ULTRA_WIDE_SKIP: f32 = 0.9;

/// Source of uniform random draws. A skip with probability `p` triggers when
/// a unit draw lands below `p`.
pub trait Sampler {
    /// Uniform draw in `[0, 1)`.
    fn unit(&mut self) -> f32;

    /// Uniform draw in `[lo, hi)`.
    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.unit()
    }
}

impl<R: Rng> Sampler for R {
    fn unit(&mut self) -> f32 {
        self.gen()
    }

    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        self.gen_range(lo..hi)
    }
}

/// URL-based skips, applied before a download task is created.
pub fn should_skip_url(url: &str, sampler: &mut dyn Sampler) -> bool {
    if url.contains("guestbook") {
        return sampler.unit() < GUESTBOOK_SKIP;
    }
    if url.contains("new") {
        return sampler.unit() < NEW_SKIP;
    }
    false
}

/// Aspect-ratio skips, applied once the image has decoded. The two threshold
/// checks draw independently; an image past both thresholds has to survive
/// both draws.
pub fn should_skip_aspect(ratio: f32, sampler: &mut dyn Sampler) -> bool {
    if ratio > WIDE_RATIO && sampler.unit() < WIDE_SKIP {
        return true;
    }
    if ratio > ULTRA_WIDE_RATIO && sampler.unit() < ULTRA_WIDE_SKIP {
        return true;
    }
    false
}

/// Replays a fixed script of draws, then falls back to a default. Lives here
/// rather than in a test module because grid tests script draws too.
#[cfg(test)]
pub(crate) struct Scripted {
    draws: std::collections::VecDeque<f32>,
    fallback: f32,
}

#[cfg(test)]
impl Scripted {
    pub(crate) fn new(draws: &[f32], fallback: f32) -> Self {
        Self {
            draws: draws.iter().copied().collect(),
            fallback,
        }
    }
}

#[cfg(test)]
impl Sampler for Scripted {
    fn unit(&mut self) -> f32 {
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guestbook_skip_triggers_below_probability() {
        let mut sampler = Scripted::new(&[0.4], 0.99);
        assert!(should_skip_url("/api/gif/guestbook_fire.gif", &mut sampler));

        let mut sampler = Scripted::new(&[0.6], 0.99);
        assert!(!should_skip_url("/api/gif/guestbook_fire.gif", &mut sampler));
    }

    #[test]
    fn new_skip_only_checked_when_guestbook_missing() {
        // "new" match draws once; a non-matching url draws nothing
        let mut sampler = Scripted::new(&[0.2], 0.99);
        assert!(should_skip_url("/api/gif/new_construction.gif", &mut sampler));

        let mut sampler = Scripted::new(&[], 0.0);
        assert!(!should_skip_url("/api/gif/dancing_baby.gif", &mut sampler));
    }

    #[test]
    fn wide_aspect_skips_on_first_draw_without_second() {
        let mut sampler = Scripted::new(&[0.15], 0.99);
        assert!(should_skip_aspect(5.0, &mut sampler));
        assert!(
            sampler.draws.is_empty(),
            "first check consumed the only draw"
        );
    }

    #[test]
    fn ultra_wide_draws_compound() {
        // survives the 0.8 check, caught by the 0.9 check
        let mut sampler = Scripted::new(&[0.85, 0.5], 0.99);
        assert!(should_skip_aspect(5.0, &mut sampler));

        // survives both
        let mut sampler = Scripted::new(&[0.85, 0.95], 0.0);
        assert!(!should_skip_aspect(5.0, &mut sampler));
    }

    #[test]
    fn moderate_ratios_never_draw() {
        let mut sampler = Scripted::new(&[], 0.0);
        assert!(!should_skip_aspect(2.5, &mut sampler));
    }
}
