use super::terrain::{Terrain, FLAT_START_HEIGHT, SEGMENT_WIDTH};
use bevy::math::Vec2;

const DEGENERATE_SEGMENT_EPSILON: f32 = 1e-6;

/// Ground under a single x coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub ground_y: f32,
    /// Unit normal pointing away from the ground (`y <= 0`).
    pub normal: Vec2,
    /// Rise over run of the bracketing segment.
    pub slope: f32,
}

impl SurfaceSample {
    pub const FLAT: Self = Self {
        ground_y: FLAT_START_HEIGHT,
        normal: Vec2::NEG_Y,
        slope: 0.0,
    };
}

impl Terrain {
    /// Interpolated surface at `x`; outside the generated range the flat
    /// spawn plateau is returned.
    pub fn surface_at(&self, x: f32) -> SurfaceSample {
        let points = self.points();
        let Some(first) = points.first() else {
            return SurfaceSample::FLAT;
        };

        let offset = (x - first.x) / SEGMENT_WIDTH;
        if !offset.is_finite() || offset < 0.0 {
            return SurfaceSample::FLAT;
        }
        let index = offset.floor() as usize;
        if index >= points.len() - 1 {
            return SurfaceSample::FLAT;
        }

        let p0 = points[index];
        let p1 = points[index + 1];
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;
        if dx.abs() <= DEGENERATE_SEGMENT_EPSILON {
            return SurfaceSample {
                ground_y: p0.y,
                normal: Vec2::NEG_Y,
                slope: 0.0,
            };
        }

        let t = ((x - p0.x) / dx).clamp(0.0, 1.0);
        let length = dx.hypot(dy);
        let mut normal = Vec2::new(-dy / length, dx / length);
        if normal.y > 0.0 {
            normal = -normal;
        }

        SurfaceSample {
            ground_y: p0.y + dy * t,
            normal,
            slope: dy / dx,
        }
    }

    pub fn ground_y_at(&self, x: f32) -> f32 {
        self.surface_at(x).ground_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::level::LevelTheme;
    use crate::sim::terrain::height_at;

    #[test]
    fn outside_generated_range_returns_flat_fallback() {
        let terrain = Terrain::new(LevelTheme::Grassland, 4);
        for x in [
            -0.5,
            -1_000.0,
            terrain.frontier(),
            terrain.frontier() + 250.0,
            1e12,
            1e30,
            f32::MAX,
            f32::INFINITY,
            f32::NAN,
        ] {
            assert_eq!(terrain.surface_at(x), SurfaceSample::FLAT);
        }
    }

    #[test]
    fn normals_point_up_and_are_unit_length() {
        for level in LevelTheme::ALL {
            let mut terrain = Terrain::new(level, 21);
            terrain.ensure_generated(6_000.0);

            let mut x = 0.0;
            while x < terrain.frontier() {
                let sample = terrain.surface_at(x);
                assert!(sample.normal.y <= 0.0, "normal at x={x} points down");
                assert!((sample.normal.length() - 1.0).abs() < 1e-4);
                x += 7.3;
            }
        }
    }

    #[test]
    fn samples_on_points_match_the_height_function() {
        let terrain = Terrain::new(LevelTheme::Snow, 2);
        for index in [0_usize, 10, 57, 199] {
            let x = index as f32 * SEGMENT_WIDTH;
            let sample = terrain.surface_at(x);
            assert!((sample.ground_y - height_at(x, LevelTheme::Snow)).abs() < 1e-3);
        }
    }

    #[test]
    fn interpolates_between_points_with_segment_slope() {
        let terrain = Terrain::new(LevelTheme::Desert, 2);
        let points = terrain.points();
        let (p0, p1) = (points[40], points[41]);

        let sample = terrain.surface_at(p0.x + SEGMENT_WIDTH * 0.25);
        let expected_y = p0.y + (p1.y - p0.y) * 0.25;
        assert!((sample.ground_y - expected_y).abs() < 1e-3);
        assert!((sample.slope - (p1.y - p0.y) / SEGMENT_WIDTH).abs() < 1e-5);
    }

    #[test]
    fn flat_plateau_has_straight_up_normal() {
        let terrain = Terrain::new(LevelTheme::Grassland, 0);
        let sample = terrain.surface_at(60.0);
        assert_eq!(sample.ground_y, FLAT_START_HEIGHT);
        assert_eq!(sample.slope, 0.0);
        assert!((sample.normal - Vec2::NEG_Y).length() < 1e-6);
    }
}
