use super::level::{LevelParams, LevelTheme};
use super::terrain::{CollectibleId, CollectibleKind, Terrain};
use bevy::math::Vec2;
use serde::Deserialize;
use std::f32::consts::PI;

pub const START_POSITION: Vec2 = Vec2::new(100.0, 380.0);

const DISTANCE_ORIGIN_X: f32 = 100.0;
const DISTANCE_UNIT: f32 = 10.0;
const FLIP_BAND_MIN_RAD: f32 = PI * 0.6;
const FLIP_BAND_MAX_RAD: f32 = PI * 1.4;
const FLIP_RECOVERY_RATE: f32 = 2.0;
const IDLE_RPM: f32 = 0.1;
const THROTTLE_RPM_RISE: f32 = 0.05;
const BRAKE_RPM_DROP: f32 = 0.05;
const REVERSE_RPM_RISE: f32 = 0.03;
const REVERSE_RPM_CAP: f32 = 0.8;
const COAST_RPM_DROP: f32 = 0.02;
/// Forward push also lifts the body by half the vertical component.
const PROPULSION_LIFT_RATIO: f32 = 0.5;

/// Car constants. Velocities are in units per tick.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CarTuning {
    pub gravity: f32,
    pub air_resistance: f32,
    pub angular_damping: f32,
    pub body_width: f32,
    pub body_height: f32,
    pub wheel_base: f32,
    pub wheel_radius: f32,
    pub suspension_rest: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub suspension_torque: f32,
    pub slope_alignment_gain: f32,
    pub engine_power: f32,
    pub brake_power: f32,
    pub max_speed: f32,
    pub max_fuel: f32,
    pub fuel_consumption: f32,
    pub reverse_power_ratio: f32,
    pub reverse_speed_ratio: f32,
    pub reverse_fuel_ratio: f32,
    pub forward_motion_threshold: f32,
    pub brake_speed_threshold: f32,
    pub chassis_buffer: f32,
    pub scrape_bounce: f32,
    pub scrape_drag: f32,
    pub wheel_spin_rate: f32,
    pub flip_limit_seconds: f32,
    pub stall_speed: f32,
    pub coin_pickup_radius: f32,
    pub fuel_pickup_radius: f32,
    pub fuel_refill: f32,
}

impl Default for CarTuning {
    fn default() -> Self {
        Self {
            gravity: 0.35,
            air_resistance: 0.998,
            angular_damping: 0.96,
            body_width: 80.0,
            body_height: 30.0,
            wheel_base: 60.0,
            wheel_radius: 12.0,
            suspension_rest: 20.0,
            suspension_stiffness: 0.3,
            suspension_damping: 0.3,
            suspension_torque: 0.015,
            slope_alignment_gain: 0.08,
            engine_power: 1.5,
            brake_power: 0.2,
            max_speed: 16.0,
            max_fuel: 100.0,
            fuel_consumption: 0.03,
            reverse_power_ratio: 0.6,
            reverse_speed_ratio: 0.5,
            reverse_fuel_ratio: 0.5,
            forward_motion_threshold: -1.0,
            brake_speed_threshold: 0.5,
            chassis_buffer: 5.0,
            scrape_bounce: 0.1,
            scrape_drag: 0.9,
            wheel_spin_rate: 0.08,
            flip_limit_seconds: 1.5,
            stall_speed: 0.1,
            coin_pickup_radius: 50.0,
            fuel_pickup_radius: 45.0,
            fuel_refill: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashCause {
    Flipped,
    OutOfFuel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    CoinCollected { id: CollectibleId, position: Vec2 },
    FuelCollected { id: CollectibleId, position: Vec2 },
    Crashed(CrashCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelContact {
    pub world_x: f32,
    /// Wheel center, clamped so the tire never sinks below the ground.
    pub world_y: f32,
    pub ground_y: f32,
    pub grounded: bool,
    pub suspension_length: f32,
    /// Accumulated spin for rendering.
    pub visual_angle: f32,
}

/// Read-only view handed to the presentation layer after each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarSnapshot {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub crashed: bool,
    pub crash_cause: Option<CrashCause>,
    pub fuel: f32,
    pub max_fuel: f32,
    pub distance: u32,
    pub max_distance: u32,
    pub rpm: f32,
    pub flip_timer: f32,
    pub rear_wheel: WheelContact,
    pub front_wheel: WheelContact,
    pub engine_engaged: bool,
}

impl CarSnapshot {
    pub fn fuel_fraction(&self) -> f32 {
        if self.max_fuel <= 0.0 {
            return 0.0;
        }
        (self.fuel / self.max_fuel).clamp(0.0, 1.0)
    }
}

/// `max(0, 1 - speed / max_speed)`.
pub fn speed_fade_factor(speed: f32, max_speed: f32) -> f32 {
    if max_speed <= 0.0 {
        return 0.0;
    }
    (1.0 - speed / max_speed).max(0.0)
}

#[derive(Debug, Clone)]
pub struct Car {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub angular_velocity: f32,
    throttle: f32,
    brake: f32,
    fuel: f32,
    rpm: f32,
    crashed: Option<CrashCause>,
    flip_timer: f32,
    distance: u32,
    max_distance: u32,
    rear_wheel: WheelContact,
    front_wheel: WheelContact,
    engine_engaged: bool,
    tuning: CarTuning,
    level: LevelParams,
}

#[derive(Debug, Clone, Copy)]
struct WheelForce {
    contact_ground_y: f32,
    anchor: Vec2,
    grounded: bool,
    force: f32,
}

impl Car {
    pub fn new(level: LevelTheme, tuning: CarTuning) -> Self {
        Self {
            position: START_POSITION,
            velocity: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
            throttle: 0.0,
            brake: 0.0,
            fuel: tuning.max_fuel,
            rpm: 0.0,
            crashed: None,
            flip_timer: 0.0,
            distance: 0,
            max_distance: 0,
            rear_wheel: WheelContact::default(),
            front_wheel: WheelContact::default(),
            engine_engaged: false,
            tuning,
            level: level.params(),
        }
    }

    pub fn tuning(&self) -> &CarTuning {
        &self.tuning
    }

    /// Swaps tuning mid-race; fuel is capped to the new tank size.
    pub fn set_tuning(&mut self, tuning: CarTuning) {
        self.tuning = tuning;
        self.fuel = self.fuel.min(tuning.max_fuel);
    }

    pub fn fuel(&self) -> f32 {
        self.fuel
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.is_some()
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    pub fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// Inputs are clamped to `[0, 1]`.
    pub fn set_controls(&mut self, throttle: f32, brake: f32) {
        self.throttle = throttle.clamp(0.0, 1.0);
        self.brake = brake.clamp(0.0, 1.0);
    }

    pub fn snapshot(&self) -> CarSnapshot {
        CarSnapshot {
            position: self.position,
            velocity: self.velocity,
            angle: self.angle,
            crashed: self.crashed.is_some(),
            crash_cause: self.crashed,
            fuel: self.fuel,
            max_fuel: self.tuning.max_fuel,
            distance: self.distance,
            max_distance: self.max_distance,
            rpm: self.rpm,
            flip_timer: self.flip_timer,
            rear_wheel: self.rear_wheel,
            front_wheel: self.front_wheel,
            engine_engaged: self.engine_engaged,
        }
    }

    /// Advances one fixed tick. A crashed car is never mutated again.
    pub fn update(&mut self, terrain: &mut Terrain, dt: f32) -> Vec<TickEvent> {
        let mut events = Vec::new();
        if self.crashed.is_some() {
            return events;
        }

        let tuning = self.tuning;
        self.engine_engaged = false;
        self.velocity.y += tuning.gravity;

        let (sin_a, cos_a) = self.angle.sin_cos();
        let heading = Vec2::new(cos_a, sin_a);
        let half_base = heading * (tuning.wheel_base * 0.5);
        let rear = self.wheel_force(terrain, self.position - half_base);
        let front = self.wheel_force(terrain, self.position + half_base);

        self.velocity.y -= rear.force + front.force;
        self.angular_velocity += (front.force - rear.force) * tuning.suspension_torque;
        if rear.grounded && front.grounded {
            let target_angle =
                (front.contact_ground_y - rear.contact_ground_y).atan2(tuning.wheel_base);
            self.angular_velocity += (target_angle - self.angle) * tuning.slope_alignment_gain;
        }

        let grounded = rear.grounded || front.grounded;
        self.apply_drive(heading, grounded);
        self.resolve_chassis_contact(terrain);

        self.velocity.x *= tuning.air_resistance;
        self.position += self.velocity;
        self.angle += self.angular_velocity;
        self.angular_velocity *= tuning.angular_damping;

        let wheel_spin = self.velocity.x * tuning.wheel_spin_rate;
        self.rear_wheel = self.settle_wheel(self.rear_wheel, rear, wheel_spin);
        self.front_wheel = self.settle_wheel(self.front_wheel, front, wheel_spin);

        self.distance = ((self.position.x - DISTANCE_ORIGIN_X) / DISTANCE_UNIT)
            .floor()
            .max(0.0) as u32;
        self.max_distance = self.max_distance.max(self.distance);

        self.track_flip(dt, &mut events);
        self.check_fuel_exhaustion(&mut events);
        self.collect_pickups(terrain, &mut events);

        terrain.ensure_generated(self.position.x);
        events
    }

    fn wheel_force(&self, terrain: &Terrain, anchor: Vec2) -> WheelForce {
        let ground_y = terrain.ground_y_at(anchor.x);
        let wheel_bottom = anchor.y + self.tuning.suspension_rest + self.tuning.wheel_radius;
        let grounded = wheel_bottom >= ground_y;
        let force = if grounded {
            let compression = wheel_bottom - ground_y;
            (compression * self.tuning.suspension_stiffness
                + self.velocity.y * self.tuning.suspension_damping)
                .max(0.0)
        } else {
            0.0
        };

        WheelForce {
            contact_ground_y: ground_y,
            anchor,
            grounded,
            force,
        }
    }

    fn apply_drive(&mut self, heading: Vec2, grounded: bool) {
        let tuning = self.tuning;
        let friction = self.level.friction;
        let fuel_rate = tuning.fuel_consumption * self.level.fuel_consumption;
        let has_fuel = self.fuel > 0.0;

        if self.throttle > 0.0 && has_fuel {
            let forward_velocity = self.velocity.dot(heading);
            if grounded && forward_velocity > tuning.forward_motion_threshold {
                let fade = speed_fade_factor(self.velocity.length(), tuning.max_speed);
                let push = tuning.engine_power * self.throttle * fade * friction;
                self.velocity.x += heading.x * push;
                self.velocity.y += heading.y * push * PROPULSION_LIFT_RATIO;
                self.engine_engaged = true;
            }
            self.fuel -= fuel_rate * self.throttle;
            self.rpm = (self.rpm + THROTTLE_RPM_RISE).min(1.0);
        } else if self.brake > 0.0 && has_fuel {
            if !grounded {
                return;
            }
            let forward_velocity = self.velocity.dot(heading);
            if forward_velocity > tuning.brake_speed_threshold {
                self.velocity.x *= 1.0 - tuning.brake_power * self.brake * friction;
                self.rpm = (self.rpm - BRAKE_RPM_DROP).max(IDLE_RPM);
            } else {
                let fade = speed_fade_factor(
                    self.velocity.length(),
                    tuning.max_speed * tuning.reverse_speed_ratio,
                );
                let push =
                    tuning.engine_power * self.brake * tuning.reverse_power_ratio * fade * friction;
                self.velocity.x -= heading.x * push;
                self.velocity.y -= heading.y * push * PROPULSION_LIFT_RATIO;
                self.rpm = (self.rpm + REVERSE_RPM_RISE).min(REVERSE_RPM_CAP);
                self.fuel -= fuel_rate * tuning.reverse_fuel_ratio * self.brake;
            }
        } else {
            self.rpm = (self.rpm - COAST_RPM_DROP).max(IDLE_RPM);
        }
    }

    fn resolve_chassis_contact(&mut self, terrain: &Terrain) {
        let ground_y = terrain.ground_y_at(self.position.x);
        let clearance = self.tuning.body_height * 0.5 + self.tuning.chassis_buffer;
        if self.position.y + clearance <= ground_y {
            return;
        }

        self.position.y = ground_y - clearance;
        if self.velocity.y > 0.0 {
            self.velocity.y *= -self.tuning.scrape_bounce;
        }
        self.velocity.x *= self.tuning.scrape_drag;
    }

    fn settle_wheel(&self, previous: WheelContact, sample: WheelForce, spin: f32) -> WheelContact {
        let rest_y = sample.anchor.y + self.tuning.suspension_rest;
        let world_y = rest_y.min(sample.contact_ground_y - self.tuning.wheel_radius);
        WheelContact {
            world_x: sample.anchor.x,
            world_y,
            ground_y: sample.contact_ground_y,
            grounded: sample.grounded,
            suspension_length: world_y - sample.anchor.y,
            visual_angle: previous.visual_angle + spin,
        }
    }

    fn track_flip(&mut self, dt: f32, events: &mut Vec<TickEvent>) {
        let normalized = self.angle.rem_euclid(std::f32::consts::TAU);
        if normalized > FLIP_BAND_MIN_RAD && normalized < FLIP_BAND_MAX_RAD {
            self.flip_timer += dt;
            if self.flip_timer > self.tuning.flip_limit_seconds {
                self.crash(CrashCause::Flipped, events);
            }
        } else {
            self.flip_timer = (self.flip_timer - dt * FLIP_RECOVERY_RATE).max(0.0);
        }
    }

    fn check_fuel_exhaustion(&mut self, events: &mut Vec<TickEvent>) {
        if self.fuel > 0.0 {
            return;
        }
        self.fuel = 0.0;
        if self.velocity.x.abs() < self.tuning.stall_speed {
            self.crash(CrashCause::OutOfFuel, events);
        }
    }

    fn crash(&mut self, cause: CrashCause, events: &mut Vec<TickEvent>) {
        if self.crashed.is_some() {
            return;
        }
        self.crashed = Some(cause);
        events.push(TickEvent::Crashed(cause));
    }

    fn collect_pickups(&mut self, terrain: &mut Terrain, events: &mut Vec<TickEvent>) {
        for coin in terrain.collect_within(
            CollectibleKind::Coin,
            self.position,
            self.tuning.coin_pickup_radius,
        ) {
            events.push(TickEvent::CoinCollected {
                id: coin.id,
                position: coin.position,
            });
        }

        for can in terrain.collect_within(
            CollectibleKind::FuelCan,
            self.position,
            self.tuning.fuel_pickup_radius,
        ) {
            self.fuel = (self.fuel + self.tuning.fuel_refill).min(self.tuning.max_fuel);
            events.push(TickEvent::FuelCollected {
                id: can.id,
                position: can.position,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::terrain::FLAT_START_HEIGHT;

    const DT: f32 = 1.0 / 60.0;

    fn airborne_car(terrain_seed: u64) -> (Car, Terrain) {
        let terrain = Terrain::new(LevelTheme::Grassland, terrain_seed);
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());
        car.position = Vec2::new(100.0, 0.0);
        (car, terrain)
    }

    #[test]
    fn crashed_car_is_frozen() {
        let (mut car, mut terrain) = airborne_car(1);
        car.velocity = Vec2::new(3.0, -2.0);
        car.crashed = Some(CrashCause::Flipped);
        car.set_controls(1.0, 0.0);
        let before = car.snapshot();

        for _ in 0..10 {
            assert!(car.update(&mut terrain, DT).is_empty());
        }
        assert_eq!(car.snapshot(), before);
    }

    #[test]
    fn upside_down_car_crashes_after_flip_limit() {
        let (mut car, mut terrain) = airborne_car(2);
        car.angle = PI;

        for _ in 0..10 {
            car.update(&mut terrain, 0.1);
        }
        assert!(!car.is_crashed());

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(car.update(&mut terrain, 0.1));
        }
        assert!(car.is_crashed());
        assert_eq!(events, vec![TickEvent::Crashed(CrashCause::Flipped)]);
    }

    #[test]
    fn flip_timer_recovers_twice_as_fast() {
        let (mut car, mut terrain) = airborne_car(3);
        car.angle = PI;
        for _ in 0..10 {
            car.update(&mut terrain, 0.1);
        }
        assert!((car.snapshot().flip_timer - 1.0).abs() < 1e-4);

        car.angle = 0.0;
        for _ in 0..5 {
            car.update(&mut terrain, 0.1);
        }
        assert!(car.snapshot().flip_timer.abs() < 1e-4);

        car.angle = PI;
        for _ in 0..10 {
            car.update(&mut terrain, 0.1);
        }
        assert!(!car.is_crashed());
    }

    #[test]
    fn negative_angles_use_the_same_flip_band() {
        let (mut car, mut terrain) = airborne_car(4);
        car.angle = -PI;
        car.update(&mut terrain, 0.1);
        assert!(car.snapshot().flip_timer > 0.0);

        let (mut upright, mut terrain) = airborne_car(4);
        upright.angle = -0.5 * PI;
        upright.update(&mut terrain, 0.1);
        assert_eq!(upright.snapshot().flip_timer, 0.0);
    }

    #[test]
    fn empty_tank_at_standstill_crashes_same_tick() {
        let (mut car, mut terrain) = airborne_car(5);
        car.fuel = 0.0;

        let events = car.update(&mut terrain, DT);
        assert!(car.is_crashed());
        assert_eq!(events, vec![TickEvent::Crashed(CrashCause::OutOfFuel)]);
        assert_eq!(car.fuel(), 0.0);
    }

    #[test]
    fn empty_tank_while_coasting_keeps_rolling() {
        let (mut car, mut terrain) = airborne_car(6);
        car.fuel = 0.0;
        car.velocity.x = 5.0;

        car.update(&mut terrain, DT);
        assert!(!car.is_crashed());
    }

    #[test]
    fn last_drop_of_fuel_stalls_a_stopped_car() {
        let (mut car, mut terrain) = airborne_car(7);
        car.fuel = 0.03;
        car.set_controls(1.0, 0.0);

        let events = car.update(&mut terrain, DT);
        assert_eq!(car.fuel(), 0.0);
        assert_eq!(events, vec![TickEvent::Crashed(CrashCause::OutOfFuel)]);
    }

    #[test]
    fn fuel_never_goes_negative() {
        let (mut car, mut terrain) = airborne_car(8);
        car.fuel = 0.01;
        car.velocity.x = 6.0;
        car.set_controls(1.0, 0.0);

        car.update(&mut terrain, DT);
        assert_eq!(car.fuel(), 0.0);
    }

    #[test]
    fn coin_pickup_boundary_is_fifty_units() {
        let (mut car, mut terrain) = airborne_car(9);
        car.position = Vec2::new(-2_000.0, -2_000.0);
        let near = terrain.spawn_collectible(
            CollectibleKind::Coin,
            car.position + Vec2::new(49.0, 0.0),
        );
        let far = terrain.spawn_collectible(
            CollectibleKind::Coin,
            car.position + Vec2::new(0.0, 51.0),
        );

        let mut events = Vec::new();
        car.collect_pickups(&mut terrain, &mut events);

        let collected: Vec<CollectibleId> = events
            .iter()
            .filter_map(|event| match event {
                TickEvent::CoinCollected { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert!(collected.contains(&near));
        assert!(!collected.contains(&far));
    }

    #[test]
    fn fuel_can_refill_is_capped() {
        let (mut car, mut terrain) = airborne_car(10);
        car.position = Vec2::new(-2_000.0, -2_000.0);
        car.fuel = 90.0;
        let can = terrain.spawn_collectible(
            CollectibleKind::FuelCan,
            car.position + Vec2::new(10.0, 0.0),
        );

        let mut events = Vec::new();
        car.collect_pickups(&mut terrain, &mut events);

        assert_eq!(car.fuel(), 100.0);
        assert!(events
            .iter()
            .any(|event| matches!(event, TickEvent::FuelCollected { id, .. } if *id == can)));
    }

    #[test]
    fn speed_fade_is_zero_at_top_speed() {
        assert_eq!(speed_fade_factor(16.0, 16.0), 0.0);
        assert_eq!(speed_fade_factor(20.0, 16.0), 0.0);
        assert_eq!(speed_fade_factor(0.0, 16.0), 1.0);
        assert!((speed_fade_factor(8.0, 16.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn idle_car_on_the_plateau_stays_put() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 11);
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());

        for _ in 0..300 {
            car.update(&mut terrain, DT);
        }
        assert!(!car.is_crashed());
        assert_eq!(car.position.x, START_POSITION.x);
        assert_eq!(car.distance(), 0);
        assert!(car.angle.abs() < 1e-6);
    }

    #[test]
    fn throttle_burns_fuel_and_moves_forward() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 12);
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());
        car.set_controls(1.0, 0.0);

        for _ in 0..60 {
            car.update(&mut terrain, DT);
        }
        assert!(car.position.x > START_POSITION.x);
        assert!((car.fuel() - (100.0 - 0.03 * 60.0)).abs() < 1e-3);
    }

    #[test]
    fn brake_slows_a_forward_moving_car_without_fuel_cost() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 13);
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());
        car.velocity.x = 10.0;
        car.set_controls(0.0, 1.0);

        car.update(&mut terrain, DT);
        assert!((car.velocity.x - 10.0 * 0.8 * 0.998).abs() < 1e-4);
        assert_eq!(car.fuel(), 100.0);
    }

    #[test]
    fn brake_at_standstill_reverses_at_half_fuel_cost() {
        let mut terrain = Terrain::new(LevelTheme::Grassland, 14);
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());
        car.set_controls(0.0, 1.0);

        car.update(&mut terrain, DT);
        assert!(car.velocity.x < 0.0);
        assert!((car.fuel() - (100.0 - 0.015)).abs() < 1e-4);
    }

    #[test]
    fn slippery_levels_push_less() {
        let mut grass_terrain = Terrain::new(LevelTheme::Grassland, 15);
        let mut snow_terrain = Terrain::new(LevelTheme::Snow, 15);
        let mut grass = Car::new(LevelTheme::Grassland, CarTuning::default());
        let mut snow = Car::new(LevelTheme::Snow, CarTuning::default());
        grass.set_controls(1.0, 0.0);
        snow.set_controls(1.0, 0.0);

        grass.update(&mut grass_terrain, DT);
        snow.update(&mut snow_terrain, DT);
        assert!(snow.velocity.x < grass.velocity.x);
        assert!(snow.fuel() < grass.fuel());
    }

    #[test]
    fn distance_tracks_the_furthest_point() {
        let (mut car, mut terrain) = airborne_car(16);
        car.position.x = 1_100.0;
        car.update(&mut terrain, DT);
        assert_eq!(car.distance(), 100);

        car.position.x = 600.0;
        car.update(&mut terrain, DT);
        assert_eq!(car.distance(), 50);
        assert_eq!(car.max_distance(), 100);
    }

    fn plateau_car(tuning: CarTuning, position: Vec2, angle: f32) -> (Car, Terrain) {
        let terrain = Terrain::new(LevelTheme::Grassland, 17);
        let mut car = Car::new(LevelTheme::Grassland, tuning);
        car.position = position;
        car.angle = angle;
        (car, terrain)
    }

    #[test]
    fn wheel_spring_damps_on_body_velocity_and_never_pulls() {
        let (mut car, terrain) = plateau_car(CarTuning::default(), START_POSITION, 0.0);
        let anchor = START_POSITION;

        car.velocity.y = 2.0;
        let sinking = car.wheel_force(&terrain, anchor);
        assert!(sinking.grounded);
        assert!((sinking.force - (12.0 * 0.3 + 2.0 * 0.3)).abs() < 1e-5);

        car.velocity.y = -1.0;
        let rising = car.wheel_force(&terrain, anchor);
        assert!((rising.force - (12.0 * 0.3 - 1.0 * 0.3)).abs() < 1e-5);

        car.velocity.y = -20.0;
        let launched = car.wheel_force(&terrain, anchor);
        assert!(launched.grounded);
        assert_eq!(launched.force, 0.0);

        let airborne = car.wheel_force(&terrain, Vec2::new(100.0, 300.0));
        assert!(!airborne.grounded);
        assert_eq!(airborne.force, 0.0);
        assert_eq!(airborne.contact_ground_y, FLAT_START_HEIGHT);
    }

    #[test]
    fn uneven_spring_forces_pitch_the_body() {
        let tuning = CarTuning {
            slope_alignment_gain: 0.0,
            ..CarTuning::default()
        };
        let (mut car, mut terrain) = plateau_car(tuning, START_POSITION, 0.1);

        let mut before_tick = Car::new(LevelTheme::Grassland, tuning);
        before_tick.position = car.position;
        before_tick.angle = car.angle;
        before_tick.velocity.y = tuning.gravity;
        let half_base = Vec2::new(0.1_f32.cos(), 0.1_f32.sin()) * (tuning.wheel_base * 0.5);
        let rear = before_tick.wheel_force(&terrain, car.position - half_base);
        let front = before_tick.wheel_force(&terrain, car.position + half_base);
        assert!(front.force > rear.force);

        car.update(&mut terrain, DT);

        let spin = (front.force - rear.force) * tuning.suspension_torque;
        assert!((car.angle - (0.1 + spin)).abs() < 1e-5);
        assert!((car.angular_velocity - spin * tuning.angular_damping).abs() < 1e-5);
    }

    #[test]
    fn grounded_wheels_steer_the_body_towards_the_ground_slope() {
        let tuning = CarTuning {
            suspension_torque: 0.0,
            ..CarTuning::default()
        };
        let (mut car, mut terrain) = plateau_car(tuning, START_POSITION, 0.1);

        car.update(&mut terrain, DT);

        let correction = (0.0 - 0.1) * tuning.slope_alignment_gain;
        assert!((car.angle - (0.1 + correction)).abs() < 1e-6);
        assert!((car.angular_velocity - correction * tuning.angular_damping).abs() < 1e-6);
    }

    #[test]
    fn one_grounded_wheel_gets_no_slope_alignment() {
        let tuning = CarTuning {
            suspension_torque: 0.0,
            ..CarTuning::default()
        };
        // Nose down: only the front tire reaches the plateau.
        let (mut car, mut terrain) = plateau_car(tuning, Vec2::new(100.0, 372.0), 0.3);

        car.update(&mut terrain, DT);

        assert!(car.snapshot().front_wheel.grounded);
        assert!(!car.snapshot().rear_wheel.grounded);
        assert_eq!(car.angle, 0.3);
        assert_eq!(car.angular_velocity, 0.0);
    }

    #[test]
    fn sunken_chassis_is_lifted_and_scraped() {
        let (mut car, terrain) = plateau_car(CarTuning::default(), Vec2::new(100.0, 395.0), 0.0);
        car.velocity = Vec2::new(10.0, 4.0);

        car.resolve_chassis_contact(&terrain);

        assert_eq!(car.position.y, 400.0 - (15.0 + 5.0));
        assert!((car.velocity.y - (-0.4)).abs() < 1e-6);
        assert!((car.velocity.x - 9.0).abs() < 1e-5);
    }

    #[test]
    fn scraping_while_rising_keeps_vertical_velocity() {
        let (mut car, terrain) = plateau_car(CarTuning::default(), Vec2::new(100.0, 395.0), 0.0);
        car.velocity = Vec2::new(10.0, -3.0);

        car.resolve_chassis_contact(&terrain);

        assert_eq!(car.position.y, 380.0);
        assert_eq!(car.velocity.y, -3.0);
        assert!((car.velocity.x - 9.0).abs() < 1e-5);
    }

    #[test]
    fn chassis_clear_of_the_ground_is_untouched() {
        let (mut car, terrain) = plateau_car(CarTuning::default(), Vec2::new(100.0, 380.0), 0.0);
        car.velocity = Vec2::new(10.0, 4.0);

        car.resolve_chassis_contact(&terrain);

        assert_eq!(car.position, Vec2::new(100.0, 380.0));
        assert_eq!(car.velocity, Vec2::new(10.0, 4.0));
    }

    #[test]
    fn drawn_wheels_sit_on_the_ground_when_compressed() {
        let (mut car, mut terrain) =
            plateau_car(CarTuning::default(), Vec2::new(100.0, 385.0), 0.0);

        car.update(&mut terrain, DT);

        for wheel in [car.snapshot().rear_wheel, car.snapshot().front_wheel] {
            assert!(wheel.grounded);
            assert_eq!(wheel.world_y, 400.0 - 12.0);
            assert_eq!(wheel.suspension_length, 3.0);
        }
    }

    #[test]
    fn airborne_wheels_hang_at_rest_length() {
        let (mut car, mut terrain) = airborne_car(18);

        car.update(&mut terrain, DT);

        let wheel = car.snapshot().rear_wheel;
        assert!(!wheel.grounded);
        assert_eq!(wheel.world_y, 20.0);
        assert_eq!(wheel.suspension_length, 20.0);
    }

    #[test]
    fn throttle_adds_nothing_at_top_speed() {
        let (mut driven, mut driven_terrain) =
            plateau_car(CarTuning::default(), START_POSITION, 0.0);
        let (mut coasting, mut coasting_terrain) =
            plateau_car(CarTuning::default(), START_POSITION, 0.0);
        driven.velocity = Vec2::new(16.0, 0.0);
        coasting.velocity = Vec2::new(16.0, 0.0);
        driven.set_controls(1.0, 0.0);

        driven.update(&mut driven_terrain, DT);
        coasting.update(&mut coasting_terrain, DT);

        assert!(driven.snapshot().rear_wheel.grounded);
        assert_eq!(driven.velocity, coasting.velocity);
        assert!((driven.velocity.x - 16.0 * 0.998).abs() < 1e-5);
        assert!(driven.fuel() < coasting.fuel());
    }

    #[test]
    fn spinning_into_a_roll_crashes_after_flip_limit() {
        let (mut car, mut terrain) = airborne_car(19);
        // Damped spin that settles upside down.
        car.angular_velocity = PI * (1.0 - CarTuning::default().angular_damping);

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(car.update(&mut terrain, 0.1));
        }
        assert!(!car.is_crashed());
        assert!(events.is_empty());

        for _ in 0..25 {
            events.extend(car.update(&mut terrain, 0.1));
        }
        assert!(car.is_crashed());
        assert_eq!(events, vec![TickEvent::Crashed(CrashCause::Flipped)]);
        let normalized = car.angle.rem_euclid(std::f32::consts::TAU);
        assert!(normalized > FLIP_BAND_MIN_RAD && normalized < FLIP_BAND_MAX_RAD);
    }

    #[test]
    fn retuning_caps_fuel_to_the_new_tank() {
        let mut car = Car::new(LevelTheme::Grassland, CarTuning::default());
        let small_tank = CarTuning {
            max_fuel: 40.0,
            ..CarTuning::default()
        };
        car.set_tuning(small_tank);
        assert_eq!(car.fuel(), 40.0);
        assert_eq!(car.tuning().max_fuel, 40.0);

        car.set_tuning(CarTuning::default());
        assert_eq!(car.fuel(), 40.0);
    }
}
