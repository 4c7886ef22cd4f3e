use crate::sim::{CarTuning, LevelTheme};
use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreStartup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey);
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {:.0} Hz ticks, level `{}`, skin `{}`, {} skins, leaderboard {}.",
        config.game.app.fixed_timestep_hz,
        config.game.app.default_level,
        config.game.app.default_skin,
        config.skins_by_id.len(),
        if config.game.leaderboard.enabled {
            config.game.leaderboard.api_base_url.as_str()
        } else {
            "disabled"
        }
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicle: VehicleFile,
    pub skins: SkinsFile,
    pub skins_by_id: HashMap<String, SkinConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let vehicle: VehicleFile = read_toml(&config_dir.join("vehicle.toml"))?;
        let skins: SkinsFile = read_toml(&config_dir.join("skins.toml"))?;

        let config = Self {
            skins_by_id: to_index("skins.toml::skins", &skins.skins)?,
            game,
            vehicle,
            skins,
        };

        config.validate_references()?;
        Ok(config)
    }

    pub fn default_level(&self) -> LevelTheme {
        LevelTheme::from_id(&self.game.app.default_level)
    }

    /// Skin by id, falling back to the configured default skin.
    pub fn skin(&self, id: &str) -> Option<&SkinConfig> {
        self.skins_by_id
            .get(id)
            .or_else(|| self.skins_by_id.get(&self.game.app.default_skin))
    }

    fn validate_references(&self) -> Result<(), ConfigError> {
        let app = &self.game.app;
        if app.fixed_timestep_hz <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.fixed_timestep_hz must be > 0".to_string(),
            ));
        }
        if !(app.max_tick_dt > 0.0 && app.max_tick_dt <= 0.25) {
            return Err(ConfigError::Validation(
                "game.toml::app.max_tick_dt must be in (0, 0.25]".to_string(),
            ));
        }
        if LevelTheme::parse(&app.default_level).is_none() {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_level references unknown level id `{}` (expected grassland/desert/snow)",
                app.default_level
            )));
        }
        if !self.skins_by_id.contains_key(&app.default_skin) {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_skin references unknown skin id `{}`",
                app.default_skin
            )));
        }

        let camera = &self.game.camera;
        if !(camera.follow_lerp > 0.0 && camera.follow_lerp <= 1.0) {
            return Err(ConfigError::Validation(
                "game.toml::camera.follow_lerp must be in (0, 1]".to_string(),
            ));
        }
        if camera.zoom <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::camera.zoom must be > 0".to_string(),
            ));
        }

        let leaderboard = &self.game.leaderboard;
        if leaderboard.enabled && leaderboard.api_base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "game.toml::leaderboard.api_base_url cannot be empty when the leaderboard is enabled"
                    .to_string(),
            ));
        }
        if leaderboard.top_n == 0 {
            return Err(ConfigError::Validation(
                "game.toml::leaderboard.top_n must be >= 1".to_string(),
            ));
        }
        if leaderboard.connect_timeout_seconds == 0 || leaderboard.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "game.toml::leaderboard timeouts must be >= 1 second".to_string(),
            ));
        }
        if leaderboard.retry_backoff_seconds < 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::leaderboard.retry_backoff_seconds must be >= 0".to_string(),
            ));
        }

        let feedback = &self.game.feedback;
        if !(0.0..=1.0).contains(&feedback.dust_spawn_chance) {
            return Err(ConfigError::Validation(
                "game.toml::feedback.dust_spawn_chance must be in [0, 1]".to_string(),
            ));
        }
        if feedback.popup_lifetime_seconds <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::feedback.popup_lifetime_seconds must be > 0".to_string(),
            ));
        }

        let sfx = &self.game.sfx;
        for (field, value) in [
            ("master_volume", sfx.master_volume),
            ("engine_volume", sfx.engine_volume),
            ("engine_idle_gain", sfx.engine_idle_gain),
            ("engine_throttle_gain", sfx.engine_throttle_gain),
            ("engine_rev_hz", sfx.engine_rev_hz),
            ("coin_volume", sfx.coin_volume),
            ("fuel_volume", sfx.fuel_volume),
            ("crash_volume", sfx.crash_volume),
        ] {
            if !(0.0..).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "game.toml::sfx.{field} must be >= 0"
                )));
            }
        }
        if !(sfx.engine_idle_hz > 0.0 && sfx.engine_response_per_second > 0.0) {
            return Err(ConfigError::Validation(
                "game.toml::sfx.engine_idle_hz and engine_response_per_second must be > 0"
                    .to_string(),
            ));
        }
        if !(sfx.pitch_random_min > 0.0 && sfx.pitch_random_min <= sfx.pitch_random_max) {
            return Err(ConfigError::Validation(
                "game.toml::sfx.pitch_random_min must be > 0 and <= pitch_random_max".to_string(),
            ));
        }

        let car = &self.vehicle.car;
        for (field, value) in [
            ("wheel_base", car.wheel_base),
            ("wheel_radius", car.wheel_radius),
            ("body_width", car.body_width),
            ("body_height", car.body_height),
            ("max_speed", car.max_speed),
            ("max_fuel", car.max_fuel),
            ("flip_limit_seconds", car.flip_limit_seconds),
            ("coin_pickup_radius", car.coin_pickup_radius),
            ("fuel_pickup_radius", car.fuel_pickup_radius),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicle.toml::car.{field} must be > 0"
                )));
            }
        }
        for (field, value) in [
            ("air_resistance", car.air_resistance),
            ("angular_damping", car.angular_damping),
            ("scrape_drag", car.scrape_drag),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "vehicle.toml::car.{field} must be in [0, 1]"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    #[error("{0}")]
    Validation(String),
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub sfx: SfxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fixed_timestep_hz: f32,
    #[serde(default = "default_max_tick_dt")]
    pub max_tick_dt: f32,
    pub default_level: String,
    pub default_skin: String,
    pub debug_overlay: bool,
}

fn default_max_tick_dt() -> f32 {
    0.05
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub follow_lerp: f32,
    /// Horizontal lead per unit of per-tick velocity.
    pub look_ahead_per_speed: f32,
    pub look_ahead_offset: f32,
    pub look_up: f32,
    pub zoom: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            follow_lerp: 0.08,
            look_ahead_per_speed: 30.0,
            look_ahead_offset: 45.0,
            look_up: 80.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub points_per_coin: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points_per_coin: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    pub enabled: bool,
    pub api_base_url: String,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_seconds")]
    pub retry_backoff_seconds: f32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_stale_request_timeout_seconds")]
    pub stale_request_timeout_seconds: f32,
}

fn default_connect_timeout_seconds() -> u32 {
    4
}

fn default_request_timeout_seconds() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_seconds() -> f32 {
    0.5
}

fn default_top_n() -> usize {
    10
}

fn default_stale_request_timeout_seconds() -> f32 {
    45.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub dust_spawn_chance: f32,
    pub dust_lifetime_seconds: f32,
    pub popup_lifetime_seconds: f32,
    pub popup_rise_speed: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            dust_spawn_chance: 0.3,
            dust_lifetime_seconds: 0.5,
            popup_lifetime_seconds: 1.0,
            popup_rise_speed: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SfxConfig {
    pub enabled: bool,
    pub master_volume: f32,
    pub engine_volume: f32,
    /// Engine gain with the throttle released.
    pub engine_idle_gain: f32,
    /// Extra engine gain at full throttle.
    pub engine_throttle_gain: f32,
    /// Engine pitch at zero rpm.
    pub engine_idle_hz: f32,
    /// Pitch added between zero and full rpm.
    pub engine_rev_hz: f32,
    /// How fast the engine loop follows rpm and throttle changes.
    pub engine_response_per_second: f32,
    pub coin_volume: f32,
    pub fuel_volume: f32,
    pub crash_volume: f32,
    pub pitch_random_min: f32,
    pub pitch_random_max: f32,
}

impl Default for SfxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            master_volume: 0.3,
            engine_volume: 1.0,
            engine_idle_gain: 0.02,
            engine_throttle_gain: 0.08,
            engine_idle_hz: 60.0,
            engine_rev_hz: 120.0,
            engine_response_per_second: 10.0,
            coin_volume: 0.15,
            fuel_volume: 0.1,
            crash_volume: 0.3,
            pitch_random_min: 0.97,
            pitch_random_max: 1.03,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VehicleFile {
    #[serde(default)]
    pub car: CarTuning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkinsFile {
    pub skins: Vec<SkinConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkinConfig {
    pub id: String,
    pub label: String,
    pub body_color: [f32; 3],
    pub cabin_color: [f32; 3],
    #[serde(default = "default_wheel_color")]
    pub wheel_color: [f32; 3],
}

fn default_wheel_color() -> [f32; 3] {
    [0.12, 0.12, 0.14]
}

impl HasId for SkinConfig {
    fn id(&self) -> &str {
        &self.id
    }
}
