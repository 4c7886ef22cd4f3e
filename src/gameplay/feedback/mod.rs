use crate::config::GameConfig;
use crate::gameplay::session::{CollectibleCollected, RaceSession};
use crate::gameplay::vehicle::sim_to_world;
use crate::sim::CollectibleKind;
use crate::states::GameState;
use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::time::{SystemTime, UNIX_EPOCH};

const DUST_Z: f32 = 12.0;
const POPUP_Z: f32 = 13.0;
const DUST_GROUND_OFFSET: f32 = 5.0;
const DUST_SIZE_MIN: f32 = 3.0;
const DUST_SIZE_MAX: f32 = 7.0;
const DUST_BACKSPRAY_RATIO: f32 = 0.3;
/// Per-tick gravity on dust in simulation units.
const DUST_GRAVITY_PER_TICK: f32 = 0.05;
const DUST_COLOR: Color = Color::srgba(139.0 / 255.0, 119.0 / 255.0, 101.0 / 255.0, 0.4);
const POPUP_OFFSET_Y: f32 = 20.0;
const COIN_POPUP_COLOR: Color = Color::srgb(1.0, 0.84, 0.0);
const FUEL_POPUP_COLOR: Color = Color::srgb(0.18, 0.80, 0.44);

pub struct FeedbackGameplayPlugin;

impl Plugin for FeedbackGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(FeedbackRng(Pcg32::seed_from_u64(0x8A37_2BC1_D9E4_1023)))
            .add_systems(
                OnEnter(GameState::Playing),
                (cleanup_feedback_entities, reseed_feedback_rng),
            )
            .add_systems(OnEnter(GameState::Menu), cleanup_feedback_entities)
            .add_systems(
                FixedUpdate,
                spawn_dust_particles
                    .run_if(in_state(GameState::Playing))
                    .run_if(resource_exists::<RaceSession>)
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                (spawn_pickup_popups, update_feedback_particles, update_score_popups)
                    .chain()
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

/// Cosmetic randomness, kept apart from the terrain's seeded generator.
#[derive(Resource)]
struct FeedbackRng(Pcg32);

#[derive(Component, Debug, Clone, Copy)]
struct FeedbackParticle {
    velocity: Vec2,
    gravity: f32,
    remaining_s: f32,
    total_s: f32,
    initial_alpha: f32,
}

#[derive(Component, Debug, Clone, Copy)]
struct ScorePopup {
    rise_speed: f32,
    remaining_s: f32,
    total_s: f32,
}

fn reseed_feedback_rng(mut rng: ResMut<FeedbackRng>) {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    rng.0 = Pcg32::seed_from_u64(seed);
}

fn cleanup_feedback_entities(
    mut commands: Commands,
    particle_query: Query<Entity, Or<(With<FeedbackParticle>, With<ScorePopup>)>>,
) {
    for entity in &particle_query {
        commands.entity(entity).try_despawn();
    }
}

/// Kicks up dust behind the rear wheel while the engine drives it on the
/// ground.
fn spawn_dust_particles(
    mut commands: Commands,
    config: Res<GameConfig>,
    fixed_time: Res<Time<Fixed>>,
    session: Res<RaceSession>,
    mut rng: ResMut<FeedbackRng>,
) {
    let snapshot = session.snapshot();
    if snapshot.crashed || !snapshot.engine_engaged || !snapshot.rear_wheel.grounded {
        return;
    }
    let feedback = &config.game.feedback;
    let rng = &mut rng.0;
    if !rng.random_bool(f64::from(feedback.dust_spawn_chance.clamp(0.0, 1.0))) {
        return;
    }

    let ticks_per_second = 1.0 / fixed_time.timestep().as_secs_f32().max(0.001);
    let tick_velocity = Vec2::new(
        -snapshot.velocity.x * DUST_BACKSPRAY_RATIO + (rng.random::<f32>() - 0.5) * 2.0,
        -rng.random::<f32>() * 2.0 - 1.0,
    );
    let size = rng.random_range(DUST_SIZE_MIN..DUST_SIZE_MAX);
    let origin = Vec2::new(
        snapshot.rear_wheel.world_x,
        snapshot.rear_wheel.ground_y - DUST_GROUND_OFFSET,
    );

    commands.spawn((
        Name::new("Dust"),
        FeedbackParticle {
            velocity: sim_to_world(tick_velocity) * ticks_per_second,
            gravity: DUST_GRAVITY_PER_TICK * ticks_per_second * ticks_per_second,
            remaining_s: feedback.dust_lifetime_seconds,
            total_s: feedback.dust_lifetime_seconds,
            initial_alpha: DUST_COLOR.alpha(),
        },
        Sprite::from_color(DUST_COLOR, Vec2::splat(size)),
        Transform::from_translation(sim_to_world(origin).extend(DUST_Z)),
    ));
}

fn spawn_pickup_popups(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut collected: MessageReader<CollectibleCollected>,
) {
    let feedback = &config.game.feedback;
    for event in collected.read() {
        let (label, color) = popup_label(event.kind, config.game.scoring.points_per_coin);
        let anchor = event.world_position - Vec2::new(0.0, POPUP_OFFSET_Y);
        commands.spawn((
            Name::new("ScorePopup"),
            ScorePopup {
                rise_speed: feedback.popup_rise_speed,
                remaining_s: feedback.popup_lifetime_seconds,
                total_s: feedback.popup_lifetime_seconds,
            },
            Text2d::new(label),
            TextFont {
                font_size: 20.0,
                ..default()
            },
            TextColor(color),
            Transform::from_translation(sim_to_world(anchor).extend(POPUP_Z)),
        ));
    }
}

fn popup_label(kind: CollectibleKind, points_per_coin: u32) -> (String, Color) {
    match kind {
        CollectibleKind::Coin => (format!("+{points_per_coin}"), COIN_POPUP_COLOR),
        CollectibleKind::FuelCan => ("+FUEL".to_string(), FUEL_POPUP_COLOR),
    }
}

fn update_feedback_particles(
    mut commands: Commands,
    time: Res<Time>,
    mut particle_query: Query<(Entity, &mut Transform, &mut Sprite, &mut FeedbackParticle)>,
) {
    let dt = time.delta_secs().max(0.000_1);
    for (entity, mut transform, mut sprite, mut particle) in &mut particle_query {
        particle.velocity.y -= particle.gravity * dt;
        transform.translation += (particle.velocity * dt).extend(0.0);

        particle.remaining_s -= dt;
        let life_t = (particle.remaining_s / particle.total_s.max(0.001)).clamp(0.0, 1.0);
        let mut color = sprite.color;
        color.set_alpha(particle.initial_alpha * life_t);
        sprite.color = color;

        if particle.remaining_s <= 0.0 {
            commands.entity(entity).try_despawn();
        }
    }
}

fn update_score_popups(
    mut commands: Commands,
    time: Res<Time>,
    mut popup_query: Query<(Entity, &mut Transform, &mut TextColor, &mut ScorePopup)>,
) {
    let dt = time.delta_secs().max(0.000_1);
    for (entity, mut transform, mut text_color, mut popup) in &mut popup_query {
        transform.translation.y += popup.rise_speed * dt;
        popup.remaining_s -= dt;
        let life_t = (popup.remaining_s / popup.total_s.max(0.001)).clamp(0.0, 1.0);
        text_color.0.set_alpha(life_t);

        if popup.remaining_s <= 0.0 {
            commands.entity(entity).try_despawn();
        }
    }
}
