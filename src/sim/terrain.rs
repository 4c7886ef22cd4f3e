use super::level::{LevelParams, LevelTheme};
use bevy::log::debug;
use bevy::math::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::f32::consts::TAU;

pub const SEGMENT_WIDTH: f32 = 15.0;
pub const FLAT_START_HEIGHT: f32 = 400.0;
pub const FLAT_START_END_X: f32 = 150.0;
pub const ROUGHNESS_RAMP_WIDTH: f32 = 200.0;
pub const INITIAL_GENERATION_X: f32 = 3_000.0;
pub const LOOKAHEAD_MARGIN: f32 = 1_500.0;
pub const GENERATION_CHUNK: f32 = 3_000.0;
pub const COIN_RADIUS: f32 = 12.0;
pub const FUEL_CAN_SIZE: Vec2 = Vec2::new(20.0, 25.0);

const DISTANCE_DIFFICULTY_RATE: f32 = 0.000_15;
const DISTANCE_DIFFICULTY_CAP: f32 = 2.5;
const COIN_MIN_X: f32 = 200.0;
const FUEL_CAN_MIN_X: f32 = 400.0;
const COIN_BASE_LIFT: f32 = 40.0;
const COIN_LIFT_BAND: f32 = 30.0;
const FUEL_CAN_LIFT: f32 = 35.0;

/// `(frequency, phase, amplitude)` of the always-on wave layers.
const BASE_WAVES: [(f32, f32, f32); 4] = [
    (0.005, 0.0, 80.0),
    (0.012, 1.3, 50.0),
    (0.025, 2.7, 30.0),
    (0.003, 0.5, 100.0),
];
/// Layers whose amplitude also grows with distance.
const STEEPENING_WAVES: [(f32, f32, f32); 2] = [(0.008, 4.1, 60.0), (0.018, 3.3, 25.0)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectibleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectibleKind {
    Coin,
    FuelCan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collectible {
    pub id: CollectibleId,
    pub kind: CollectibleKind,
    pub position: Vec2,
    pub collected: bool,
    /// Starting spin phase for coin rendering. Zero for fuel cans.
    pub spin_phase: f32,
}

/// Ground height at `x` for `level`. Y grows downward.
pub fn height_at(x: f32, level: LevelTheme) -> f32 {
    if x < FLAT_START_END_X {
        return FLAT_START_HEIGHT;
    }

    let ramp = ((x - FLAT_START_END_X) / ROUGHNESS_RAMP_WIDTH).min(1.0);
    let scale = ramp * level.params().difficulty;
    let steepening = (1.0 + x * DISTANCE_DIFFICULTY_RATE).min(DISTANCE_DIFFICULTY_CAP);

    let base: f32 = BASE_WAVES
        .iter()
        .map(|(frequency, phase, amplitude)| (x * frequency + phase).sin() * amplitude)
        .sum();
    let steep: f32 = STEEPENING_WAVES
        .iter()
        .map(|(frequency, phase, amplitude)| (x * frequency + phase).sin() * amplitude)
        .sum();

    FLAT_START_HEIGHT + (base * scale) + (steep * steepening * scale)
}

/// Append-only height field plus the collectibles placed along it.
#[derive(Debug, Clone)]
pub struct Terrain {
    points: Vec<TerrainPoint>,
    coins: Vec<Collectible>,
    fuel_cans: Vec<Collectible>,
    generated_up_to: f32,
    level: LevelTheme,
    params: LevelParams,
    rng: Pcg32,
    next_collectible_id: u32,
}

impl Terrain {
    pub fn new(level: LevelTheme, seed: u64) -> Self {
        let mut terrain = Self {
            points: Vec::new(),
            coins: Vec::new(),
            fuel_cans: Vec::new(),
            generated_up_to: 0.0,
            level,
            params: level.params(),
            rng: Pcg32::seed_from_u64(seed),
            next_collectible_id: 0,
        };
        terrain.generate(INITIAL_GENERATION_X);
        terrain
    }

    pub fn level(&self) -> LevelTheme {
        self.level
    }

    pub fn params(&self) -> LevelParams {
        self.params
    }

    /// Largest x covered by a terrain point.
    pub fn frontier(&self) -> f32 {
        self.generated_up_to
    }

    pub fn points(&self) -> &[TerrainPoint] {
        &self.points
    }

    pub fn coins(&self) -> &[Collectible] {
        &self.coins
    }

    pub fn fuel_cans(&self) -> &[Collectible] {
        &self.fuel_cans
    }

    /// Points covering `[min_x, max_x]`, padded by one point on each side so
    /// the caller can draw edge segments.
    pub fn points_in_range(&self, min_x: f32, max_x: f32) -> &[TerrainPoint] {
        let Some(first) = self.points.first() else {
            return &[];
        };
        if min_x.is_nan() || max_x.is_nan() || min_x > max_x {
            return &[];
        }

        let last_index = self.points.len() - 1;
        let start = ((min_x - first.x) / SEGMENT_WIDTH).floor().max(0.0) as usize;
        let end = (((max_x - first.x) / SEGMENT_WIDTH).ceil().max(0.0) as usize).min(last_index);
        if start > last_index {
            return &[];
        }

        &self.points[start.saturating_sub(1)..=end]
    }

    /// Extends the height field up to `to_x`, rolling collectible spawns for
    /// every new point.
    pub fn generate(&mut self, to_x: f32) {
        let before = self.points.len();
        loop {
            let x = self.points.len() as f32 * SEGMENT_WIDTH;
            if x > to_x {
                break;
            }

            let y = height_at(x, self.level);
            self.points.push(TerrainPoint { x, y });
            self.generated_up_to = x;
            self.roll_spawns(x, y);
        }

        let added = self.points.len() - before;
        if added > 0 {
            debug!(
                "Generated {added} terrain points up to x={:.0} ({} coins, {} fuel cans total).",
                self.generated_up_to,
                self.coins.len(),
                self.fuel_cans.len()
            );
        }
    }

    /// Keeps at least [`LOOKAHEAD_MARGIN`] of terrain ahead of `car_x`.
    pub fn ensure_generated(&mut self, car_x: f32) {
        if !car_x.is_finite() {
            return;
        }
        while car_x + LOOKAHEAD_MARGIN > self.generated_up_to {
            self.generate(self.generated_up_to + GENERATION_CHUNK);
        }
    }

    pub fn spawn_collectible(&mut self, kind: CollectibleKind, position: Vec2) -> CollectibleId {
        let id = CollectibleId(self.next_collectible_id);
        self.next_collectible_id = self.next_collectible_id.wrapping_add(1);

        let spin_phase = match kind {
            CollectibleKind::Coin => self.rng.random::<f32>() * TAU,
            CollectibleKind::FuelCan => 0.0,
        };
        let collectible = Collectible {
            id,
            kind,
            position,
            collected: false,
            spin_phase,
        };

        let list = self.list_mut(kind);
        let index = list.partition_point(|item| item.position.x <= position.x);
        list.insert(index, collectible);
        id
    }

    /// Marks every uncollected item of `kind` closer than `radius` to
    /// `center` as collected and returns them.
    pub fn collect_within(
        &mut self,
        kind: CollectibleKind,
        center: Vec2,
        radius: f32,
    ) -> Vec<Collectible> {
        let list = self.list_mut(kind);
        let start = list.partition_point(|item| item.position.x <= center.x - radius);
        let mut collected = Vec::new();

        for item in &mut list[start..] {
            if item.position.x >= center.x + radius {
                break;
            }
            if item.collected || item.position.distance(center) >= radius {
                continue;
            }
            item.collected = true;
            collected.push(*item);
        }

        collected
    }

    fn roll_spawns(&mut self, x: f32, y: f32) {
        let coin_roll = self.rng.random::<f32>();
        if coin_roll < self.params.coin_chance && x > COIN_MIN_X {
            let lift = COIN_BASE_LIFT + self.rng.random::<f32>() * COIN_LIFT_BAND;
            self.spawn_collectible(CollectibleKind::Coin, Vec2::new(x, y - lift));
        }

        let fuel_roll = self.rng.random::<f32>();
        if fuel_roll < self.params.fuel_chance && x > FUEL_CAN_MIN_X {
            self.spawn_collectible(CollectibleKind::FuelCan, Vec2::new(x, y - FUEL_CAN_LIFT));
        }
    }

    fn list_mut(&mut self, kind: CollectibleKind) -> &mut Vec<Collectible> {
        match kind {
            CollectibleKind::Coin => &mut self.coins,
            CollectibleKind::FuelCan => &mut self.fuel_cans,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_flat_before_the_ramp_for_every_level() {
        for level in LevelTheme::ALL {
            for x in [-500.0, 0.0, 75.0, 149.9] {
                assert_eq!(height_at(x, level), FLAT_START_HEIGHT);
            }
        }
    }

    #[test]
    fn height_is_deterministic() {
        for level in LevelTheme::ALL {
            for step in 0..400 {
                let x = step as f32 * 37.3;
                assert_eq!(height_at(x, level), height_at(x, level));
            }
        }
    }

    #[test]
    fn harder_levels_amplify_the_same_profile() {
        let x = 2_345.0;
        let grass_offset = height_at(x, LevelTheme::Grassland) - FLAT_START_HEIGHT;
        let snow_offset = height_at(x, LevelTheme::Snow) - FLAT_START_HEIGHT;
        assert!((snow_offset - grass_offset * 1.35).abs() < 1e-2);
    }

    #[test]
    fn initial_terrain_reaches_the_first_chunk() {
        let terrain = Terrain::new(LevelTheme::Grassland, 7);
        assert_eq!(terrain.frontier(), INITIAL_GENERATION_X);
        assert_eq!(terrain.points().len(), 201);
    }

    #[test]
    fn ensure_generated_keeps_lookahead_margin() {
        let mut terrain = Terrain::new(LevelTheme::Desert, 11);
        for car_x in [0.0, 1_499.0, 5_000.0, 100_000.0] {
            terrain.ensure_generated(car_x);
            assert!(terrain.frontier() >= car_x + LOOKAHEAD_MARGIN);
        }
    }

    #[test]
    fn points_stay_evenly_spaced_across_chunks() {
        let mut terrain = Terrain::new(LevelTheme::Snow, 3);
        terrain.ensure_generated(9_000.0);
        for pair in terrain.points().windows(2) {
            assert!((pair[1].x - pair[0].x - SEGMENT_WIDTH).abs() < 1e-3);
        }
    }

    #[test]
    fn frontier_never_moves_backwards() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 5);
        let before = terrain.frontier();
        terrain.generate(100.0);
        terrain.ensure_generated(-400.0);
        assert_eq!(terrain.frontier(), before);
    }

    #[test]
    fn collectible_placement_is_reproducible_per_seed() {
        let mut a = Terrain::new(LevelTheme::Grassland, 42);
        let mut b = Terrain::new(LevelTheme::Grassland, 42);
        a.ensure_generated(20_000.0);
        b.ensure_generated(20_000.0);

        assert_eq!(a.coins(), b.coins());
        assert_eq!(a.fuel_cans(), b.fuel_cans());
        assert!(!a.coins().is_empty());
    }

    #[test]
    fn collectibles_respect_minimum_offsets() {
        let mut terrain = Terrain::new(LevelTheme::Desert, 99);
        terrain.ensure_generated(30_000.0);

        for coin in terrain.coins() {
            assert!(coin.position.x > COIN_MIN_X);
            let lift = height_at(coin.position.x, LevelTheme::Desert) - coin.position.y;
            assert!(lift > COIN_BASE_LIFT - 1e-3);
            assert!(lift < COIN_BASE_LIFT + COIN_LIFT_BAND + 1e-3);
        }
        for can in terrain.fuel_cans() {
            assert!(can.position.x > FUEL_CAN_MIN_X);
            let lift = height_at(can.position.x, LevelTheme::Desert) - can.position.y;
            assert!((lift - FUEL_CAN_LIFT).abs() < 1e-3);
        }
    }

    #[test]
    fn points_in_range_covers_the_requested_window() {
        let terrain = Terrain::new(LevelTheme::Grassland, 1);
        let visible = terrain.points_in_range(400.0, 700.0);
        let first = visible.first().map(|p| p.x).unwrap_or(f32::NAN);
        let last = visible.last().map(|p| p.x).unwrap_or(f32::NAN);
        assert!(first <= 400.0);
        assert!(last >= 700.0);

        assert!(terrain.points_in_range(50_000.0, 60_000.0).is_empty());
        assert!(terrain.points_in_range(10.0, 5.0).is_empty());
    }

    #[test]
    fn collect_within_skips_items_already_taken() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 8);
        let center = Vec2::new(-1_000.0, -1_000.0);
        let id = terrain.spawn_collectible(CollectibleKind::Coin, center + Vec2::new(10.0, 0.0));

        let first = terrain.collect_within(CollectibleKind::Coin, center, 50.0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);
        assert!(terrain
            .collect_within(CollectibleKind::Coin, center, 50.0)
            .is_empty());
    }
}
