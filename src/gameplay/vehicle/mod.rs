mod camera;
mod scene;

use crate::config::GameConfig;
use crate::gameplay::session::RaceSession;
use crate::states::GameState;
use bevy::prelude::*;

pub use camera::{sim_to_world, CameraFollowState};

const CAR_Z: f32 = 10.0;
const WHEEL_Z: f32 = 11.0;

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleInputState>()
            .init_resource::<VehicleInputBindings>()
            .init_resource::<CameraFollowState>()
            .add_systems(
                OnEnter(GameState::Playing),
                (
                    scene::cleanup_vehicle_scene,
                    camera::configure_camera_zoom,
                    camera::reset_camera_follow_state,
                    scene::spawn_vehicle_scene,
                )
                    .chain(),
            )
            .add_systems(OnExit(GameState::Playing), reset_vehicle_input)
            .add_systems(OnEnter(GameState::Menu), scene::cleanup_vehicle_scene)
            .add_systems(
                Update,
                read_vehicle_input
                    .run_if(in_state(GameState::Playing))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                (sync_car_visuals, camera::camera_follow_car)
                    .chain()
                    .after(read_vehicle_input)
                    .run_if(resource_exists::<RaceSession>)
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
pub struct PlayerCar;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
enum WheelAxle {
    Front,
    Rear,
}

#[derive(Component, Debug, Clone, Copy)]
struct CarWheelVisual {
    axle: WheelAxle,
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct VehicleInputState {
    pub accelerate: bool,
    pub brake: bool,
}

#[derive(Resource, Debug, Clone)]
struct VehicleInputBindings {
    accelerate: Vec<KeyCode>,
    brake: Vec<KeyCode>,
}

impl Default for VehicleInputBindings {
    fn default() -> Self {
        Self {
            accelerate: vec![KeyCode::KeyW, KeyCode::ArrowUp],
            brake: vec![KeyCode::KeyS, KeyCode::ArrowDown],
        }
    }
}

fn read_vehicle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<VehicleInputBindings>,
    mut input: ResMut<VehicleInputState>,
) {
    input.accelerate = bindings.accelerate.iter().any(|key| keyboard.pressed(*key));
    input.brake = bindings.brake.iter().any(|key| keyboard.pressed(*key));
}

fn reset_vehicle_input(mut input: ResMut<VehicleInputState>) {
    *input = VehicleInputState::default();
}

#[allow(clippy::type_complexity)]
fn sync_car_visuals(
    session: Res<RaceSession>,
    mut car_query: Query<&mut Transform, (With<PlayerCar>, Without<CarWheelVisual>)>,
    mut wheel_query: Query<(&CarWheelVisual, &mut Transform), Without<PlayerCar>>,
) {
    let snapshot = session.snapshot();

    if let Ok(mut transform) = car_query.single_mut() {
        transform.translation = sim_to_world(snapshot.position).extend(CAR_Z);
        transform.rotation = Quat::from_rotation_z(-snapshot.angle);
    }

    for (wheel, mut transform) in &mut wheel_query {
        let contact = match wheel.axle {
            WheelAxle::Front => snapshot.front_wheel,
            WheelAxle::Rear => snapshot.rear_wheel,
        };
        transform.translation =
            sim_to_world(Vec2::new(contact.world_x, contact.world_y)).extend(WHEEL_Z);
        transform.rotation = Quat::from_rotation_z(-contact.visual_angle);
    }
}
