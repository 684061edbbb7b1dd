//! Decorative starfield drifting behind the grid.

use crate::policy::Sampler;

/// One star per this many square pixels of viewport.
pub const STAR_DENSITY: f32 = 1000.0;
pub const MAX_STARS: usize = 2000;
/// Stars render white at this alpha.
pub const STAR_ALPHA: u8 = 150;

const SIZE_MIN: f32 = 0.5;
const SIZE_MAX: f32 = 3.0;
const SPEED_MIN: f32 = 0.1;
const SPEED_MAX: f32 = 0.5;

pub struct Star {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub speed: f32,
}

pub struct Starfield {
    stars: Vec<Star>,
    width: f32,
    height: f32,
}

impl Starfield {
    pub fn new(viewport: (f32, f32), sampler: &mut dyn Sampler) -> Self {
        let mut field = Self {
            stars: Vec::new(),
            width: 0.0,
            height: 0.0,
        };
        field.rebuild(viewport, sampler);
        field
    }

    /// Regenerates the field for a new viewport, star count scaled to area.
    pub fn rebuild(&mut self, viewport: (f32, f32), sampler: &mut dyn Sampler) {
        self.width = viewport.0;
        self.height = viewport.1;

        let count = ((self.width * self.height / STAR_DENSITY) as usize).min(MAX_STARS);
        self.stars = (0..count)
            .map(|_| Star {
                x: sampler.range(0.0, self.width),
                y: sampler.range(0.0, self.height),
                size: sampler.range(SIZE_MIN, SIZE_MAX),
                speed: sampler.range(SPEED_MIN, SPEED_MAX),
            })
            .collect();
    }

    /// Drifts every star left; stars leaving the viewport wrap back to the
    /// right edge at a fresh vertical position.
    pub fn tick(&mut self, sampler: &mut dyn Sampler) {
        for star in &mut self.stars {
            star.x -= star.speed;
            if star.x < 0.0 {
                star.x = self.width;
                star.y = sampler.range(0.0, self.height);
            }
        }
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn star_count_scales_with_area_up_to_the_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let small = Starfield::new((100.0, 100.0), &mut rng);
        assert_eq!(small.stars().len(), 10);

        let huge = Starfield::new((4000.0, 4000.0), &mut rng);
        assert_eq!(huge.stars().len(), MAX_STARS);
    }

    #[test]
    fn stars_wrap_to_the_right_edge() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut field = Starfield::new((50.0, 50.0), &mut rng);
        field.stars[0].x = 0.05;
        field.stars[0].speed = 0.5;

        field.tick(&mut rng);
        assert_eq!(field.stars[0].x, 50.0);
        assert!((0.0..=50.0).contains(&field.stars[0].y));
    }

    #[test]
    fn parameters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let field = Starfield::new((500.0, 300.0), &mut rng);
        for star in field.stars() {
            assert!((0.0..=500.0).contains(&star.x));
            assert!((0.0..=300.0).contains(&star.y));
            assert!((SIZE_MIN..SIZE_MAX).contains(&star.size));
            assert!((SPEED_MIN..SPEED_MAX).contains(&star.speed));
        }
    }
}
