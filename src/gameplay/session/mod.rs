//! Owns the running race: terrain, car and coin count, stepped on the fixed
//! timestep.

use crate::config::GameConfig;
use crate::gameplay::vehicle::VehicleInputState;
use crate::sim::terrain::CollectibleId;
use crate::sim::{Car, CarSnapshot, CollectibleKind, LevelTheme, Terrain, TickEvent};
use crate::states::{GameState, RaceSelection};
use bevy::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct RaceSessionPlugin;

impl Plugin for RaceSessionPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<CollectibleCollected>()
            .add_systems(
                Update,
                apply_fixed_timestep.run_if(resource_exists_and_changed::<GameConfig>),
            )
            .add_systems(OnEnter(GameState::Playing), start_race_session)
            .add_systems(
                FixedUpdate,
                step_race_session
                    .run_if(in_state(GameState::Playing))
                    .run_if(resource_exists::<RaceSession>)
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Message, Debug, Clone, Copy)]
pub struct CollectibleCollected {
    pub kind: CollectibleKind,
    pub id: CollectibleId,
    pub world_position: Vec2,
}

#[derive(Resource, Debug, Clone)]
pub struct RaceSession {
    pub terrain: Terrain,
    pub car: Car,
    pub level: LevelTheme,
    pub skin_id: String,
    pub seed: u64,
    pub coins: u32,
    pub fuel_cans: u32,
    pub ticks: u64,
}

impl RaceSession {
    pub fn new(level: LevelTheme, skin_id: String, config: &GameConfig, seed: u64) -> Self {
        Self {
            terrain: Terrain::new(level, seed),
            car: Car::new(level, config.vehicle.car),
            level,
            skin_id,
            seed,
            coins: 0,
            fuel_cans: 0,
            ticks: 0,
        }
    }

    pub fn snapshot(&self) -> CarSnapshot {
        self.car.snapshot()
    }

    /// Runs one physics tick and folds pickups into the race totals.
    pub fn step(&mut self, throttle: f32, brake: f32, dt: f32) -> Vec<TickEvent> {
        self.car.set_controls(throttle, brake);
        let events = self.car.update(&mut self.terrain, dt);
        for event in &events {
            match event {
                TickEvent::CoinCollected { .. } => self.coins = self.coins.saturating_add(1),
                TickEvent::FuelCollected { .. } => {
                    self.fuel_cans = self.fuel_cans.saturating_add(1)
                }
                TickEvent::Crashed(_) => {}
            }
        }
        self.ticks += 1;
        events
    }
}

fn apply_fixed_timestep(config: Res<GameConfig>, mut fixed_time: ResMut<Time<Fixed>>) {
    let hz = f64::from(config.game.app.fixed_timestep_hz);
    fixed_time.set_timestep_hz(hz);
    debug!("Physics tick rate set to {hz:.0} Hz.");
}

fn start_race_session(
    mut commands: Commands,
    config: Res<GameConfig>,
    selection: Res<RaceSelection>,
) {
    let seed = race_seed();
    let session = RaceSession::new(selection.level, selection.skin_id.clone(), &config, seed);
    info!(
        "Race started on {} (seed {seed:#018x}, {} terrain points, {} coins, {} fuel cans).",
        selection.level.label(),
        session.terrain.points().len(),
        session.terrain.coins().len(),
        session.terrain.fuel_cans().len()
    );
    commands.insert_resource(session);
}

fn step_race_session(
    time: Res<Time>,
    config: Res<GameConfig>,
    input: Res<VehicleInputState>,
    mut session: ResMut<RaceSession>,
    mut collected: MessageWriter<CollectibleCollected>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if session.car.is_crashed() {
        return;
    }

    let dt = time.delta_secs().min(config.game.app.max_tick_dt);
    let throttle = if input.accelerate { 1.0 } else { 0.0 };
    let brake = if input.brake { 1.0 } else { 0.0 };

    for event in session.step(throttle, brake, dt) {
        match event {
            TickEvent::CoinCollected { id, position } => {
                collected.write(CollectibleCollected {
                    kind: CollectibleKind::Coin,
                    id,
                    world_position: position,
                });
            }
            TickEvent::FuelCollected { id, position } => {
                collected.write(CollectibleCollected {
                    kind: CollectibleKind::FuelCan,
                    id,
                    world_position: position,
                });
            }
            TickEvent::Crashed(cause) => {
                info!("Car crashed ({cause:?}) after {} ticks.", session.ticks);
                next_state.set(GameState::GameOver);
            }
        }
    }
}

fn race_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5EED_CAFE)
}
