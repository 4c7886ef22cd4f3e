mod synth;

use crate::config::{GameConfig, SfxConfig};
use crate::gameplay::session::{CollectibleCollected, RaceSession};
use crate::gameplay::vehicle::VehicleInputState;
use crate::sim::CollectibleKind;
use crate::states::GameState;
use bevy::audio::{
    AudioPlayer, AudioSink, AudioSinkPlayback, AudioSource, PlaybackSettings, Volume,
};
use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::time::{SystemTime, UNIX_EPOCH};

const MIN_PLAYBACK_SPEED: f32 = 0.05;

pub struct GameplaySfxPlugin;

impl Plugin for GameplaySfxPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SfxMute>()
            .insert_resource(SfxRng(Pcg32::seed_from_u64(0x7C5E_A48B_D113_90F2)))
            .add_systems(Startup, build_sfx_bank)
            .add_systems(OnEnter(GameState::Playing), reseed_sfx_rng)
            .add_systems(OnExit(GameState::Playing), cleanup_sfx_entities)
            .add_systems(
                OnEnter(GameState::GameOver),
                play_crash_sfx
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<SfxBank>),
            )
            .add_systems(
                Update,
                toggle_sfx_mute.run_if(not(in_state(GameState::Login))),
            )
            .add_systems(
                Update,
                (
                    ensure_engine_loop_audio,
                    update_engine_loop_audio,
                    play_pickup_sfx,
                )
                    .chain()
                    .run_if(in_state(GameState::Playing))
                    .run_if(resource_exists::<GameConfig>)
                    .run_if(resource_exists::<SfxBank>),
            );
    }
}

/// Global mute; keeps the engine loop running silently.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SfxMute {
    pub muted: bool,
}

#[derive(Resource)]
struct SfxRng(Pcg32);

/// Handles to the synthesized clips.
#[derive(Resource, Debug, Clone)]
struct SfxBank {
    engine_loop: Handle<AudioSource>,
    coin: Handle<AudioSource>,
    fuel: Handle<AudioSource>,
    crash: Handle<AudioSource>,
}

#[derive(Component)]
struct EngineLoopAudio;

#[derive(Component, Debug, Clone, Copy, Default)]
struct EngineLoopRuntime {
    smoothed_rpm: f32,
    smoothed_throttle: f32,
}

#[derive(Component)]
struct GameplaySfxTransient;

fn build_sfx_bank(mut commands: Commands, mut audio_sources: ResMut<Assets<AudioSource>>) {
    let mut add = |samples: Vec<f32>| {
        audio_sources.add(AudioSource {
            bytes: synth::encode_wav_pcm16(&samples, synth::SAMPLE_RATE).into(),
        })
    };
    let bank = SfxBank {
        engine_loop: add(synth::engine_loop_samples(synth::SAMPLE_RATE)),
        coin: add(synth::coin_samples(synth::SAMPLE_RATE)),
        fuel: add(synth::fuel_samples(synth::SAMPLE_RATE)),
        crash: add(synth::crash_samples(synth::SAMPLE_RATE)),
    };
    commands.insert_resource(bank);
    info!("Synthesized sound bank at {} Hz.", synth::SAMPLE_RATE);
}

fn reseed_sfx_rng(mut rng: ResMut<SfxRng>) {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    rng.0 = Pcg32::seed_from_u64(seed);
}

fn toggle_sfx_mute(keyboard: Res<ButtonInput<KeyCode>>, mut mute: ResMut<SfxMute>) {
    if keyboard.just_pressed(KeyCode::KeyM) {
        mute.muted = !mute.muted;
        info!("Sound {}.", if mute.muted { "muted" } else { "unmuted" });
    }
}

#[allow(clippy::type_complexity)]
fn cleanup_sfx_entities(
    mut commands: Commands,
    sfx_query: Query<Entity, Or<(With<EngineLoopAudio>, With<GameplaySfxTransient>)>>,
) {
    for entity in &sfx_query {
        commands.entity(entity).try_despawn();
    }
}

fn ensure_engine_loop_audio(
    mut commands: Commands,
    config: Res<GameConfig>,
    bank: Res<SfxBank>,
    mute: Res<SfxMute>,
    existing_query: Query<Entity, With<EngineLoopAudio>>,
) {
    let sfx = &config.game.sfx;
    if !sfx.enabled {
        for entity in &existing_query {
            commands.entity(entity).try_despawn();
        }
        return;
    }

    if !existing_query.is_empty() {
        return;
    }

    let runtime = EngineLoopRuntime::default();
    let initial_volume = engine_volume(sfx, runtime.smoothed_throttle, mute.muted);
    let initial_speed = engine_playback_speed(sfx, runtime.smoothed_rpm);

    commands.spawn((
        Name::new("SfxEngineLoop"),
        EngineLoopAudio,
        runtime,
        AudioPlayer::new(bank.engine_loop.clone()),
        PlaybackSettings::LOOP
            .with_volume(Volume::Linear(initial_volume))
            .with_speed(initial_speed),
    ));
}

fn update_engine_loop_audio(
    time: Res<Time>,
    config: Res<GameConfig>,
    mute: Res<SfxMute>,
    input: Res<VehicleInputState>,
    session: Option<Res<RaceSession>>,
    mut engine_query: Query<(&mut AudioSink, &mut EngineLoopRuntime), With<EngineLoopAudio>>,
) {
    let sfx = &config.game.sfx;
    if !sfx.enabled {
        return;
    }
    let Some(session) = session else {
        return;
    };

    let snapshot = session.snapshot();
    let throttle = if input.accelerate && !snapshot.crashed { 1.0 } else { 0.0 };
    let blend = (time.delta_secs().max(0.0) * sfx.engine_response_per_second).clamp(0.0, 1.0);

    for (mut sink, mut runtime) in &mut engine_query {
        runtime.smoothed_rpm = lerp(runtime.smoothed_rpm, snapshot.rpm, blend);
        runtime.smoothed_throttle = lerp(runtime.smoothed_throttle, throttle, blend);

        sink.set_speed(engine_playback_speed(sfx, runtime.smoothed_rpm));
        sink.set_volume(Volume::Linear(engine_volume(
            sfx,
            runtime.smoothed_throttle,
            mute.muted,
        )));
    }
}

fn play_pickup_sfx(
    mut commands: Commands,
    config: Res<GameConfig>,
    bank: Res<SfxBank>,
    mute: Res<SfxMute>,
    mut rng: ResMut<SfxRng>,
    mut collected: MessageReader<CollectibleCollected>,
) {
    let sfx = &config.game.sfx;
    if !sfx.enabled || mute.muted {
        let _ = collected.read().count();
        return;
    }

    for pickup in collected.read() {
        let (handle, relative_volume) = match pickup.kind {
            CollectibleKind::Coin => (&bank.coin, sfx.coin_volume),
            CollectibleKind::FuelCan => (&bank.fuel, sfx.fuel_volume),
        };
        play_sfx(&mut commands, sfx, handle, relative_volume, &mut rng.0);
    }
}

fn play_crash_sfx(
    mut commands: Commands,
    config: Res<GameConfig>,
    bank: Res<SfxBank>,
    mute: Res<SfxMute>,
    mut rng: ResMut<SfxRng>,
) {
    let sfx = &config.game.sfx;
    if !sfx.enabled || mute.muted {
        return;
    }
    play_sfx(&mut commands, sfx, &bank.crash, sfx.crash_volume, &mut rng.0);
}

fn play_sfx(
    commands: &mut Commands,
    sfx: &SfxConfig,
    handle: &Handle<AudioSource>,
    relative_volume: f32,
    rng: &mut Pcg32,
) {
    let volume = (sfx.master_volume * relative_volume).max(0.0);
    if volume <= f32::EPSILON {
        return;
    }

    let pitch = lerp(sfx.pitch_random_min, sfx.pitch_random_max, rng.random::<f32>()).max(0.01);

    commands.spawn((
        Name::new("GameplaySfxShot"),
        GameplaySfxTransient,
        AudioPlayer::new(handle.clone()),
        PlaybackSettings::DESPAWN
            .with_volume(Volume::Linear(volume))
            .with_speed(pitch),
    ));
}

/// Loop speed that puts the engine at `idle_hz + rpm * rev_hz`.
fn engine_playback_speed(sfx: &SfxConfig, rpm: f32) -> f32 {
    let pitch_hz = sfx.engine_idle_hz + rpm.clamp(0.0, 1.0) * sfx.engine_rev_hz;
    (pitch_hz / synth::ENGINE_LOOP_BASE_HZ).max(MIN_PLAYBACK_SPEED)
}

fn engine_volume(sfx: &SfxConfig, throttle: f32, muted: bool) -> f32 {
    if muted {
        return 0.0;
    }
    let gain = sfx.engine_idle_gain + throttle.clamp(0.0, 1.0) * sfx.engine_throttle_gain;
    (sfx.master_volume * sfx.engine_volume * gain).max(0.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + ((b - a) * t.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_pitch_tracks_rpm() {
        let sfx = SfxConfig::default();
        let idle = engine_playback_speed(&sfx, 0.0);
        let redline = engine_playback_speed(&sfx, 1.0);

        assert!((idle - 60.0 / synth::ENGINE_LOOP_BASE_HZ).abs() < 1e-6);
        assert!((redline - 180.0 / synth::ENGINE_LOOP_BASE_HZ).abs() < 1e-6);
        assert!(engine_playback_speed(&sfx, 0.5) > idle);
        assert_eq!(engine_playback_speed(&sfx, 7.0), redline);
    }

    #[test]
    fn engine_gain_rises_with_throttle() {
        let sfx = SfxConfig::default();
        let idle = engine_volume(&sfx, 0.0, false);
        let full = engine_volume(&sfx, 1.0, false);

        assert!((idle - 0.3 * 0.02).abs() < 1e-6);
        assert!((full - 0.3 * 0.10).abs() < 1e-6);
    }

    #[test]
    fn muted_engine_is_silent() {
        let sfx = SfxConfig::default();
        assert_eq!(engine_volume(&sfx, 1.0, true), 0.0);
    }

    #[test]
    fn zero_idle_pitch_keeps_a_playable_speed() {
        let sfx = SfxConfig {
            engine_idle_hz: 0.0,
            ..SfxConfig::default()
        };
        assert_eq!(engine_playback_speed(&sfx, 0.0), MIN_PLAYBACK_SPEED);
    }

    #[test]
    fn m_key_toggles_mute() {
        let mut app = App::new();
        app.init_resource::<SfxMute>()
            .init_resource::<ButtonInput<KeyCode>>()
            .add_systems(Update, toggle_sfx_mute);

        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .press(KeyCode::KeyM);
        app.update();
        assert!(app.world().resource::<SfxMute>().muted);

        let mut keyboard = app.world_mut().resource_mut::<ButtonInput<KeyCode>>();
        keyboard.release(KeyCode::KeyM);
        keyboard.clear();
        keyboard.press(KeyCode::KeyM);
        app.update();
        assert!(!app.world().resource::<SfxMute>().muted);
    }
}
