use super::*;
use crate::states::RaceSelection;
use bevy::math::primitives::{Circle, RegularPolygon};

const CABIN_WIDTH_RATIO: f32 = 0.45;
const CABIN_HEIGHT_RATIO: f32 = 0.8;
const CABIN_OFFSET_X_RATIO: f32 = -0.05;
const HUB_RADIUS_RATIO: f32 = 0.35;

pub(super) fn spawn_vehicle_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    config: Res<GameConfig>,
    selection: Res<RaceSelection>,
) {
    let Some(skin) = config.skin(&selection.skin_id) else {
        warn!(
            "No skin `{}` or default skin configured; car will not be drawn.",
            selection.skin_id
        );
        return;
    };
    let tuning = &config.vehicle.car;
    let body_size = Vec2::new(tuning.body_width, tuning.body_height);
    let cabin_size = Vec2::new(
        tuning.body_width * CABIN_WIDTH_RATIO,
        tuning.body_height * CABIN_HEIGHT_RATIO,
    );

    commands
        .spawn((
            Name::new("PlayerCar"),
            PlayerCar,
            Transform::from_xyz(0.0, 0.0, CAR_Z),
            Visibility::default(),
        ))
        .with_children(|car| {
            car.spawn((
                Name::new("CarBody"),
                Sprite::from_color(skin_color(skin.body_color), body_size),
                Transform::default(),
            ));
            car.spawn((
                Name::new("CarCabin"),
                Sprite::from_color(skin_color(skin.cabin_color), cabin_size),
                Transform::from_xyz(
                    tuning.body_width * CABIN_OFFSET_X_RATIO,
                    (body_size.y + cabin_size.y) * 0.5,
                    -0.1,
                ),
            ));
        });

    let tire_mesh = meshes.add(RegularPolygon::new(tuning.wheel_radius, 10));
    let hub_mesh = meshes.add(Circle::new(tuning.wheel_radius * HUB_RADIUS_RATIO));
    let tire_material = materials.add(ColorMaterial::from(skin_color(skin.wheel_color)));
    let hub_material = materials.add(ColorMaterial::from(Color::srgb(0.72, 0.74, 0.78)));

    for (axle, name) in [(WheelAxle::Rear, "RearWheel"), (WheelAxle::Front, "FrontWheel")] {
        commands
            .spawn((
                Name::new(name),
                CarWheelVisual { axle },
                Mesh2d(tire_mesh.clone()),
                MeshMaterial2d(tire_material.clone()),
                Transform::from_xyz(0.0, 0.0, WHEEL_Z),
            ))
            .with_children(|wheel| {
                wheel.spawn((
                    Mesh2d(hub_mesh.clone()),
                    MeshMaterial2d(hub_material.clone()),
                    Transform::from_xyz(tuning.wheel_radius * 0.3, 0.0, 0.1),
                ));
            });
    }

    info!("Spawned car with skin `{}`.", skin.id);
}

pub(super) fn cleanup_vehicle_scene(
    mut commands: Commands,
    car_query: Query<Entity, With<PlayerCar>>,
    wheel_query: Query<Entity, With<CarWheelVisual>>,
) {
    for entity in car_query.iter().chain(wheel_query.iter()) {
        commands.entity(entity).try_despawn();
    }
}

fn skin_color(rgb: [f32; 3]) -> Color {
    Color::srgb(rgb[0], rgb[1], rgb[2])
}
