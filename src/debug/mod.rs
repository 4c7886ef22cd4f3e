use crate::config::GameConfig;
use crate::gameplay::session::RaceSession;
use crate::gameplay::vehicle::VehicleInputState;
use crate::sim::CarTuning;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

const CONFIG_DIR: &str = "config";
const VEHICLE_FILE: &str = "vehicle.toml";
const TUNING_GROUPS: [&str; 4] = ["Chassis", "Suspension", "Engine + Fuel", "Limits + Pickups"];

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugOverlayState>()
            .init_resource::<KeybindOverlayState>()
            .init_resource::<CarTuningPanelState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(
                Update,
                (
                    toggle_debug_overlay,
                    toggle_keybind_overlay,
                    toggle_car_tuning_panel,
                    sync_overlay_visibility,
                )
                    .chain(),
            )
            .add_systems(Update, update_debug_overlay_text)
            .add_systems(
                EguiPrimaryContextPass,
                car_tuning_panel_ui.run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct DebugOverlayState {
    visible: bool,
}

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

#[derive(Resource, Debug, Default)]
struct CarTuningPanelState {
    visible: bool,
    params: Option<CarTuning>,
    status: String,
}

/// One editable float on the tuning panel, keyed as in `vehicle.toml`.
struct TuningField<'a> {
    group: &'static str,
    key: &'static str,
    value: &'a mut f32,
    range: RangeInclusive<f32>,
    drag_speed: f32,
}

fn field<'a>(
    group: &'static str,
    key: &'static str,
    value: &'a mut f32,
    range: RangeInclusive<f32>,
    drag_speed: f32,
) -> TuningField<'a> {
    TuningField {
        group,
        key,
        value,
        range,
        drag_speed,
    }
}

fn tuning_fields(tuning: &mut CarTuning) -> Vec<TuningField<'_>> {
    let [chassis, suspension, engine, limits] = TUNING_GROUPS;
    vec![
        field(chassis, "gravity", &mut tuning.gravity, 0.0..=2.0, 0.005),
        field(chassis, "air_resistance", &mut tuning.air_resistance, 0.9..=1.0, 0.0005),
        field(chassis, "angular_damping", &mut tuning.angular_damping, 0.5..=1.0, 0.001),
        field(chassis, "body_width", &mut tuning.body_width, 20.0..=200.0, 0.5),
        field(chassis, "body_height", &mut tuning.body_height, 10.0..=80.0, 0.5),
        field(chassis, "wheel_base", &mut tuning.wheel_base, 20.0..=160.0, 0.5),
        field(chassis, "wheel_radius", &mut tuning.wheel_radius, 4.0..=40.0, 0.1),
        field(chassis, "chassis_buffer", &mut tuning.chassis_buffer, 0.0..=30.0, 0.1),
        field(chassis, "scrape_bounce", &mut tuning.scrape_bounce, 0.0..=1.0, 0.005),
        field(chassis, "scrape_drag", &mut tuning.scrape_drag, 0.0..=1.0, 0.005),
        field(chassis, "wheel_spin_rate", &mut tuning.wheel_spin_rate, 0.0..=0.5, 0.001),
        field(suspension, "suspension_rest", &mut tuning.suspension_rest, 0.0..=60.0, 0.1),
        field(
            suspension,
            "suspension_stiffness",
            &mut tuning.suspension_stiffness,
            0.0..=2.0,
            0.005,
        ),
        field(
            suspension,
            "suspension_damping",
            &mut tuning.suspension_damping,
            0.0..=2.0,
            0.005,
        ),
        field(
            suspension,
            "suspension_torque",
            &mut tuning.suspension_torque,
            0.0..=0.1,
            0.0005,
        ),
        field(
            suspension,
            "slope_alignment_gain",
            &mut tuning.slope_alignment_gain,
            0.0..=0.5,
            0.001,
        ),
        field(engine, "engine_power", &mut tuning.engine_power, 0.0..=6.0, 0.01),
        field(engine, "brake_power", &mut tuning.brake_power, 0.0..=1.0, 0.005),
        field(engine, "max_fuel", &mut tuning.max_fuel, 1.0..=500.0, 0.5),
        field(engine, "fuel_consumption", &mut tuning.fuel_consumption, 0.0..=0.5, 0.001),
        field(engine, "fuel_refill", &mut tuning.fuel_refill, 0.0..=200.0, 0.5),
        field(
            engine,
            "reverse_power_ratio",
            &mut tuning.reverse_power_ratio,
            0.0..=1.0,
            0.005,
        ),
        field(
            engine,
            "reverse_speed_ratio",
            &mut tuning.reverse_speed_ratio,
            0.0..=1.0,
            0.005,
        ),
        field(
            engine,
            "reverse_fuel_ratio",
            &mut tuning.reverse_fuel_ratio,
            0.0..=1.0,
            0.005,
        ),
        field(limits, "max_speed", &mut tuning.max_speed, 1.0..=60.0, 0.1),
        field(
            limits,
            "forward_motion_threshold",
            &mut tuning.forward_motion_threshold,
            -10.0..=10.0,
            0.05,
        ),
        field(
            limits,
            "brake_speed_threshold",
            &mut tuning.brake_speed_threshold,
            0.0..=5.0,
            0.01,
        ),
        field(limits, "stall_speed", &mut tuning.stall_speed, 0.0..=2.0, 0.005),
        field(
            limits,
            "flip_limit_seconds",
            &mut tuning.flip_limit_seconds,
            0.1..=10.0,
            0.05,
        ),
        field(
            limits,
            "coin_pickup_radius",
            &mut tuning.coin_pickup_radius,
            0.0..=200.0,
            0.5,
        ),
        field(
            limits,
            "fuel_pickup_radius",
            &mut tuning.fuel_pickup_radius,
            0.0..=200.0,
            0.5,
        ),
    ]
}

fn spawn_debug_overlay(
    mut commands: Commands,
    mut overlay_state: ResMut<DebugOverlayState>,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };
    overlay_state.visible = config.game.app.debug_overlay;

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        BackgroundColor(Color::srgba(0.04, 0.05, 0.07, 0.7)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            bottom: Val::Px(12.0),
            padding: UiRect::axes(Val::Px(8.0), Val::Px(6.0)),
            ..default()
        },
        visibility_for(overlay_state.visible),
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            right: Val::Px(12.0),
            bottom: Val::Px(12.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        visibility_for(keybind_overlay.visible),
        ZIndex(100),
    ));
}

fn visibility_for(visible: bool) -> Visibility {
    if visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

fn toggle_debug_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<DebugOverlayState>,
) {
    if keyboard.just_pressed(KeyCode::F3) {
        state.visible = !state.visible;
        info!(
            "Debug overlay {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
) {
    if keyboard.just_pressed(KeyCode::KeyH) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_overlay_visibility(
    overlay_state: Res<DebugOverlayState>,
    keybind_state: Res<KeybindOverlayState>,
    mut overlay_query: Query<&mut Visibility, (With<DebugOverlayText>, Without<KeybindOverlayText>)>,
    mut keybind_query: Query<&mut Visibility, (With<KeybindOverlayText>, Without<DebugOverlayText>)>,
) {
    if overlay_state.is_changed() {
        for mut visibility in &mut overlay_query {
            *visibility = visibility_for(overlay_state.visible);
        }
    }
    if keybind_state.is_changed() {
        for mut visibility in &mut keybind_query {
            *visibility = visibility_for(keybind_state.visible);
        }
    }
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    overlay_state: Res<DebugOverlayState>,
    session: Option<Res<RaceSession>>,
    input_state: Option<Res<VehicleInputState>>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    if !overlay_state.visible {
        return;
    }
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);

    let Some(session) = session else {
        *text = Text::new(format!("FPS: {fps:>5.1}\nNo race running."));
        return;
    };

    let snapshot = session.snapshot();
    let (input_accel, input_brake) = input_state
        .map(|state| (state.accelerate, state.brake))
        .unwrap_or((false, false));

    *text = Text::new(format!(
        "FPS: {fps:>5.1}\nPos: ({x:>8.1}, {y:>7.1}) | Angle: {angle:>6.1} deg\nVel: ({vx:>6.2}, {vy:>6.2}) /tick | Spin: {spin:>6.3}\nFlip timer: {flip:>4.2}s | RPM: {rpm:>5.0}\nGrounded: rear={rear} front={front}\nInput: accel={accel} brake={brake}\nFuel: {fuel:>5.1}/{max_fuel:.0}\nFrontier: {frontier:>8.0} | Points: {points}\nLevel: {level} | Seed: {seed} | Ticks: {ticks}",
        x = snapshot.position.x,
        y = snapshot.position.y,
        angle = snapshot.angle.to_degrees(),
        vx = snapshot.velocity.x,
        vy = snapshot.velocity.y,
        spin = session.car.angular_velocity,
        flip = snapshot.flip_timer,
        rpm = snapshot.rpm,
        rear = yes_no(snapshot.rear_wheel.grounded),
        front = yes_no(snapshot.front_wheel.grounded),
        accel = yes_no(input_accel),
        brake = yes_no(input_brake),
        fuel = snapshot.fuel,
        max_fuel = snapshot.max_fuel,
        frontier = session.terrain.frontier(),
        points = session.terrain.points().len(),
        level = session.level.id(),
        seed = session.seed,
        ticks = session.ticks,
    ));
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn toggle_car_tuning_panel(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut panel_state: ResMut<CarTuningPanelState>,
    config: Option<Res<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::KeyV) {
        return;
    }

    panel_state.visible = !panel_state.visible;
    if panel_state.visible {
        if let Some(config) = config {
            panel_state.params = Some(config.vehicle.car);
        }
        info!("Car tuning panel shown.");
    } else {
        info!("Car tuning panel hidden.");
    }
}

fn car_tuning_panel_ui(
    mut egui_contexts: EguiContexts,
    mut panel_state: ResMut<CarTuningPanelState>,
    mut config: ResMut<GameConfig>,
    session: Option<ResMut<RaceSession>>,
) {
    if !panel_state.visible {
        return;
    }

    let mut params = panel_state.params.unwrap_or(config.vehicle.car);
    let mut window_open = panel_state.visible;
    let mut params_changed = false;
    let mut reload_clicked = false;
    let mut apply_clicked = false;
    let status = panel_state.status.clone();

    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };
    egui::Window::new("Car Tuning")
        .open(&mut window_open)
        .resizable(true)
        .default_width(560.0)
        .show(ctx, |ui| {
            ui.label("Changes apply to the running car immediately.");
            ui.separator();

            let mut fields = tuning_fields(&mut params);
            for group in TUNING_GROUPS {
                ui.collapsing(group, |ui| {
                    for field in fields.iter_mut().filter(|field| field.group == group) {
                        params_changed |= tuning_slider_row(
                            ui,
                            field.key,
                            &mut *field.value,
                            field.range.clone(),
                            field.drag_speed,
                        );
                    }
                });
            }

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Reload From Config").clicked() {
                    reload_clicked = true;
                }
                if ui.button("Apply To vehicle.toml").clicked() {
                    apply_clicked = true;
                }
            });

            if !status.is_empty() {
                ui.separator();
                ui.label(status);
            }
        });

    panel_state.visible = window_open;

    if reload_clicked {
        panel_state.params = Some(config.vehicle.car);
        panel_state.status = "Reloaded values from current config.".to_string();
        return;
    }

    panel_state.params = Some(params);

    if params_changed {
        config.vehicle.car = params;
        if let Some(mut session) = session {
            session.car.set_tuning(params);
        }
        panel_state.status = "Live-tuning active (in-memory config updated).".to_string();
    }

    if apply_clicked {
        match persist_car_tuning_and_reload(&mut config, &params) {
            Ok(message) => {
                panel_state.params = Some(config.vehicle.car);
                panel_state.status = message;
            }
            Err(error) => {
                warn!("{error}");
                panel_state.status = error;
            }
        }
    }
}

fn tuning_slider_row(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut f32,
    slider_range: RangeInclusive<f32>,
    drag_speed: f32,
) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui
            .add(egui::Slider::new(value, slider_range).show_value(false))
            .changed();
        changed |= ui
            .add(egui::DragValue::new(value).speed(drag_speed as f64))
            .changed();
    });
    changed
}

fn persist_car_tuning_and_reload(
    config: &mut GameConfig,
    params: &CarTuning,
) -> Result<String, String> {
    let config_dir = Path::new(CONFIG_DIR);
    let path = config_dir.join(VEHICLE_FILE);
    let original_raw = fs::read_to_string(&path)
        .map_err(|error| format!("Failed reading `{}`: {error}", path.display()))?;
    let mut root: toml::Value = toml::from_str(&original_raw)
        .map_err(|error| format!("Failed parsing `{}`: {error}", path.display()))?;

    write_tuning_to_toml_value(&mut root, params)?;

    let updated_raw = toml::to_string_pretty(&root)
        .map_err(|error| format!("Failed serializing vehicle TOML: {error}"))?;
    fs::write(&path, updated_raw)
        .map_err(|error| format!("Failed writing `{}`: {error}", path.display()))?;

    match GameConfig::load_from_dir(config_dir) {
        Ok(new_config) => {
            *config = new_config;
            info!("Saved car tuning to `{}`.", path.display());
            Ok(format!("Applied tuning and saved to {}.", path.display()))
        }
        Err(error) => {
            if !restore_vehicle_file(&path, &original_raw) {
                return Err(format!(
                    "Apply failed validation: {error}. Could not revert `{}`.",
                    path.display()
                ));
            }
            if let Ok(restored) = GameConfig::load_from_dir(config_dir) {
                *config = restored;
            }
            Err(format!(
                "Apply failed validation: {error}. Reverted `{}`.",
                path.display()
            ))
        }
    }
}

/// Puts the pre-save vehicle file back; false when the write failed.
fn restore_vehicle_file(path: &Path, original_raw: &str) -> bool {
    match fs::write(path, original_raw) {
        Ok(()) => true,
        Err(error) => {
            warn!(
                "Failed reverting `{}` after a rejected tuning save: {error}",
                path.display()
            );
            false
        }
    }
}

fn write_tuning_to_toml_value(root: &mut toml::Value, params: &CarTuning) -> Result<(), String> {
    let Some(root_table) = root.as_table_mut() else {
        return Err("vehicle.toml: document root is not a table".to_string());
    };
    let car_value = root_table
        .entry("car")
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    let Some(car_table) = car_value.as_table_mut() else {
        return Err("vehicle.toml: `car` is not a table".to_string());
    };

    let mut params = *params;
    for field in tuning_fields(&mut params) {
        set_toml_float(car_table, field.key, *field.value)?;
    }
    Ok(())
}

fn set_toml_float(
    table: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    value: f32,
) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("`{key}` is not a finite number"));
    }

    table.insert(key.to_string(), toml::Value::Float(value as f64));
    Ok(())
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
H - Toggle this panel\n\
F3 - Toggle debug overlay\n\
V - Toggle car tuning panel\n\
F5 - Hot-reload config\n\
W / Up - Throttle\n\
S / Down - Brake / reverse\n\
Esc - Abandon race -> menu\n\
Enter - Menu -> race\n\
Space / Enter - Results -> new run\n\
Esc - Results -> menu\n\
M - Mute / unmute sound\n\
Q - Quit from results"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleFile;

    #[test]
    fn tuning_fields_have_unique_keys_in_known_groups() {
        let mut tuning = CarTuning::default();
        let fields = tuning_fields(&mut tuning);
        let mut keys: Vec<&str> = fields.iter().map(|field| field.key).collect();
        keys.sort_unstable();
        keys.dedup();

        assert_eq!(keys.len(), fields.len());
        assert!(fields.iter().all(|field| TUNING_GROUPS.contains(&field.group)));
    }

    #[test]
    fn written_tuning_parses_back_and_keeps_other_keys() {
        let mut root: toml::Value =
            toml::from_str("note = \"keep\"\n[car]\nwheel_base = 60.0\n").expect("valid toml");
        let tuning = CarTuning {
            wheel_base: 72.5,
            engine_power: 2.0,
            ..CarTuning::default()
        };

        write_tuning_to_toml_value(&mut root, &tuning).expect("write should succeed");

        assert_eq!(root.get("note").and_then(toml::Value::as_str), Some("keep"));
        let raw = toml::to_string_pretty(&root).expect("serialize");
        let parsed: VehicleFile = toml::from_str(&raw).expect("parse back");
        assert_eq!(parsed.car, tuning);
    }

    #[test]
    fn missing_car_table_is_created() {
        let mut root = toml::Value::Table(toml::map::Map::new());
        write_tuning_to_toml_value(&mut root, &CarTuning::default()).expect("write");
        assert!(root.get("car").and_then(toml::Value::as_table).is_some());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut table = toml::map::Map::new();
        assert!(set_toml_float(&mut table, "gravity", f32::NAN).is_err());
        assert!(set_toml_float(&mut table, "gravity", 0.35).is_ok());
    }

    #[test]
    fn restoring_vehicle_file_reports_write_failures() {
        let dir =
            std::env::temp_dir().join(format!("ridge_runner_restore_{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        let path = dir.join(VEHICLE_FILE);

        assert!(restore_vehicle_file(&path, "[car]\nwheel_base = 60.0\n"));
        assert_eq!(
            fs::read_to_string(&path).expect("restored file"),
            "[car]\nwheel_base = 60.0\n"
        );

        let unwritable = dir.join("missing_dir").join(VEHICLE_FILE);
        assert!(!restore_vehicle_file(&unwritable, "[car]\n"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn keybind_text_lists_debug_toggles() {
        let text = keybind_overlay_text();
        assert!(text.contains("F3"));
        assert!(text.contains("V - Toggle car tuning panel"));
        assert!(text.contains("M - Mute / unmute sound"));
    }
}
