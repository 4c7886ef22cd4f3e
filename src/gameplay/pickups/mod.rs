use crate::gameplay::session::RaceSession;
use crate::gameplay::vehicle::{sim_to_world, CameraFollowState};
use crate::sim::terrain::{CollectibleId, COIN_RADIUS, FUEL_CAN_SIZE};
use crate::sim::{Collectible, CollectibleKind};
use crate::states::GameState;
use bevy::math::primitives::Circle;
use bevy::prelude::*;
use std::collections::HashMap;

const PICKUP_Z: f32 = 5.0;
const COIN_SPIN_RATE_RAD_S: f32 = 3.0;
const COIN_MIN_WIDTH_SCALE: f32 = 0.15;
/// Pickups are materialized this far either side of the camera.
const PICKUP_VIEW_HALF_WIDTH: f32 = 1_400.0;

pub struct PickupGameplayPlugin;

impl Plugin for PickupGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PickupVisuals>()
            .add_systems(OnEnter(GameState::Playing), (cleanup_pickups, load_pickup_assets).chain())
            .add_systems(OnEnter(GameState::Menu), cleanup_pickups)
            .add_systems(
                Update,
                (sync_pickup_entities, animate_coins)
                    .chain()
                    .run_if(resource_exists::<RaceSession>)
                    .run_if(resource_exists::<PickupAssets>),
            );
    }
}

#[derive(Component, Debug, Clone, Copy)]
struct PickupVisual {
    kind: CollectibleKind,
    spin_phase: f32,
}

/// Live pickup entities keyed by collectible id.
#[derive(Resource, Debug, Default)]
struct PickupVisuals {
    by_id: HashMap<CollectibleId, Entity>,
}

#[derive(Resource, Debug, Clone)]
struct PickupAssets {
    coin_mesh: Handle<Mesh>,
    coin_material: Handle<ColorMaterial>,
    coin_inner_mesh: Handle<Mesh>,
    coin_inner_material: Handle<ColorMaterial>,
}

fn load_pickup_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
) {
    commands.insert_resource(PickupAssets {
        coin_mesh: meshes.add(Circle::new(COIN_RADIUS)),
        coin_material: materials.add(ColorMaterial::from(Color::srgb(1.0, 0.84, 0.0))),
        coin_inner_mesh: meshes.add(Circle::new(COIN_RADIUS * 0.6)),
        coin_inner_material: materials.add(ColorMaterial::from(Color::srgb(0.85, 0.65, 0.05))),
    });
}

fn cleanup_pickups(
    mut commands: Commands,
    mut visuals: ResMut<PickupVisuals>,
    pickup_query: Query<Entity, With<PickupVisual>>,
) {
    for entity in &pickup_query {
        commands.entity(entity).try_despawn();
    }
    visuals.by_id.clear();
}

fn sync_pickup_entities(
    mut commands: Commands,
    session: Res<RaceSession>,
    follow: Res<CameraFollowState>,
    assets: Res<PickupAssets>,
    mut visuals: ResMut<PickupVisuals>,
) {
    let min_x = follow.position.x - PICKUP_VIEW_HALF_WIDTH;
    let max_x = follow.position.x + PICKUP_VIEW_HALF_WIDTH;

    visuals.by_id.retain(|id, entity| {
        let keep = find_collectible(&session, *id)
            .is_some_and(|item| !item.collected && (min_x..=max_x).contains(&item.position.x));
        if !keep {
            commands.entity(*entity).try_despawn();
        }
        keep
    });

    let terrain = &session.terrain;
    for item in visible_slice(terrain.coins(), min_x, max_x)
        .iter()
        .chain(visible_slice(terrain.fuel_cans(), min_x, max_x))
    {
        if item.collected || visuals.by_id.contains_key(&item.id) {
            continue;
        }
        let entity = spawn_pickup_visual(&mut commands, &assets, item);
        visuals.by_id.insert(item.id, entity);
    }
}

fn animate_coins(time: Res<Time>, mut coin_query: Query<(&PickupVisual, &mut Transform)>) {
    let elapsed = time.elapsed_secs();
    for (visual, mut transform) in &mut coin_query {
        if visual.kind != CollectibleKind::Coin {
            continue;
        }
        let width = (elapsed * COIN_SPIN_RATE_RAD_S + visual.spin_phase)
            .cos()
            .abs()
            .max(COIN_MIN_WIDTH_SCALE);
        transform.scale.x = width;
    }
}

fn spawn_pickup_visual(
    commands: &mut Commands,
    assets: &PickupAssets,
    item: &Collectible,
) -> Entity {
    let translation = sim_to_world(item.position).extend(PICKUP_Z);
    let visual = PickupVisual {
        kind: item.kind,
        spin_phase: item.spin_phase,
    };

    match item.kind {
        CollectibleKind::Coin => commands
            .spawn((
                Name::new("Coin"),
                visual,
                Mesh2d(assets.coin_mesh.clone()),
                MeshMaterial2d(assets.coin_material.clone()),
                Transform::from_translation(translation),
            ))
            .with_children(|coin| {
                coin.spawn((
                    Mesh2d(assets.coin_inner_mesh.clone()),
                    MeshMaterial2d(assets.coin_inner_material.clone()),
                    Transform::from_xyz(0.0, 0.0, 0.1),
                ));
            })
            .id(),
        CollectibleKind::FuelCan => commands
            .spawn((
                Name::new("FuelCan"),
                visual,
                Sprite::from_color(Color::srgb(0.91, 0.30, 0.24), FUEL_CAN_SIZE),
                Transform::from_translation(translation),
            ))
            .with_children(|can| {
                can.spawn((
                    Sprite::from_color(
                        Color::srgb(0.55, 0.12, 0.10),
                        Vec2::new(FUEL_CAN_SIZE.x * 0.4, FUEL_CAN_SIZE.y * 0.2),
                    ),
                    Transform::from_xyz(FUEL_CAN_SIZE.x * 0.2, FUEL_CAN_SIZE.y * 0.6, 0.1),
                ));
                can.spawn((
                    Text2d::new("F"),
                    TextFont {
                        font_size: 14.0,
                        ..default()
                    },
                    TextColor(Color::WHITE),
                    Transform::from_xyz(0.0, 0.0, 0.2),
                ));
            })
            .id(),
    }
}

/// Collectibles are stored sorted by x.
fn visible_slice(items: &[Collectible], min_x: f32, max_x: f32) -> &[Collectible] {
    let start = items.partition_point(|item| item.position.x < min_x);
    let end = items.partition_point(|item| item.position.x <= max_x);
    &items[start..end.max(start)]
}

fn find_collectible(session: &RaceSession, id: CollectibleId) -> Option<&Collectible> {
    session
        .terrain
        .coins()
        .iter()
        .chain(session.terrain.fuel_cans())
        .find(|item| item.id == id)
}
