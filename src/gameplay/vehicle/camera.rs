use super::*;

const CAMERA_Z: f32 = 999.9;
/// Blend factors in `game.toml` are tuned per 60 Hz frame.
const REFERENCE_FRAME_RATE: f32 = 60.0;

/// Smoothed camera target in simulation coordinates.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CameraFollowState {
    initialized: bool,
    pub position: Vec2,
}

/// Simulation space is y-down; the renderer is y-up.
pub fn sim_to_world(position: Vec2) -> Vec2 {
    Vec2::new(position.x, -position.y)
}

pub(super) fn configure_camera_zoom(
    config: Res<GameConfig>,
    mut camera_query: Query<&mut Projection, With<Camera2d>>,
) {
    let Ok(mut projection) = camera_query.single_mut() else {
        return;
    };

    if let Projection::Orthographic(ortho) = &mut *projection {
        ortho.scale = 1.0 / config.game.camera.zoom.max(0.05);
    }
}

pub(super) fn reset_camera_follow_state(mut state: ResMut<CameraFollowState>) {
    *state = CameraFollowState::default();
}

pub(super) fn camera_follow_car(
    time: Res<Time>,
    config: Res<GameConfig>,
    session: Res<RaceSession>,
    mut follow_state: ResMut<CameraFollowState>,
    mut camera_query: Query<&mut Transform, (With<Camera2d>, Without<PlayerCar>)>,
) {
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let snapshot = session.snapshot();
    let camera_cfg = &config.game.camera;
    let target = follow_target(
        snapshot.position,
        snapshot.velocity,
        camera_cfg.look_ahead_per_speed,
        camera_cfg.look_ahead_offset,
        camera_cfg.look_up,
    );

    if !follow_state.initialized {
        follow_state.initialized = true;
        follow_state.position = target;
    } else {
        let blend = frame_blend(camera_cfg.follow_lerp, time.delta_secs());
        follow_state.position = follow_state.position.lerp(target, blend);
    }

    camera_transform.translation = sim_to_world(follow_state.position).extend(CAMERA_Z);
}

/// Point the camera eases toward: ahead of the car in its direction of
/// travel and slightly above it.
fn follow_target(
    position: Vec2,
    velocity: Vec2,
    look_ahead_per_speed: f32,
    look_ahead_offset: f32,
    look_up: f32,
) -> Vec2 {
    Vec2::new(
        position.x + velocity.x * look_ahead_per_speed + look_ahead_offset,
        position.y - look_up,
    )
}

/// Converts a per-reference-frame lerp factor into one for `dt`.
fn frame_blend(lerp_per_frame: f32, dt: f32) -> f32 {
    let frames = (dt * REFERENCE_FRAME_RATE).max(0.0);
    (1.0 - (1.0 - lerp_per_frame.clamp(0.0, 1.0)).powf(frames)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_y_axis_is_flipped() {
        assert_eq!(sim_to_world(Vec2::new(10.0, 400.0)), Vec2::new(10.0, -400.0));
    }

    #[test]
    fn target_leads_in_direction_of_travel_and_looks_up() {
        let target = follow_target(Vec2::new(100.0, 380.0), Vec2::new(5.0, 0.0), 30.0, 45.0, 80.0);
        assert_eq!(target, Vec2::new(295.0, 300.0));

        let reversing =
            follow_target(Vec2::new(100.0, 380.0), Vec2::new(-2.0, 0.0), 30.0, 45.0, 80.0);
        assert!(reversing.x < target.x);
    }

    #[test]
    fn blend_matches_config_at_reference_rate() {
        assert!((frame_blend(0.08, 1.0 / 60.0) - 0.08).abs() < 1e-5);
        let two_frames = frame_blend(0.08, 2.0 / 60.0);
        assert!((two_frames - (1.0 - 0.92_f32 * 0.92)).abs() < 1e-5);
        assert_eq!(frame_blend(0.08, 0.0), 0.0);
        assert!((frame_blend(1.0, 0.5) - 1.0).abs() < 1e-6);
    }
}
