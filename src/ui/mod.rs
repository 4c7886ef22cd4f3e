//! Player-facing screens: login and menu windows drawn with egui, and the
//! in-race HUD built from Bevy UI nodes.

use crate::config::GameConfig;
use crate::gameplay::session::RaceSession;
use crate::gameplay::sfx::SfxMute;
use crate::leaderboard::{
    validate_player_name, LeaderboardEntry, LeaderboardRequest, LeaderboardState, RequestStatus,
};
use crate::sim::LevelTheme;
use crate::states::{GameState, PlayerProfile, RaceSelection};
use bevy::app::AppExit;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};

const HUD_PANEL_Z_INDEX: i32 = 190;
const HUD_PANEL_BG: Color = Color::srgba(0.06, 0.09, 0.12, 0.86);
const HUD_PANEL_BORDER: Color = Color::srgba(0.58, 0.68, 0.76, 0.92);
const HUD_TEXT_PRIMARY: Color = Color::srgb(0.94, 0.97, 1.0);
const HUD_TEXT_MUTED: Color = Color::srgb(0.76, 0.83, 0.9);
const HUD_FUEL_BAR_WIDTH_PX: f32 = 220.0;
const FUEL_GREEN: Color = Color::srgb(0.18, 0.80, 0.44);
const FUEL_ORANGE: Color = Color::srgb(0.95, 0.61, 0.07);
const FUEL_RED: Color = Color::srgb(0.91, 0.30, 0.24);
const OFFLINE_NAME: &str = "Guest";
const NAME_FIELD_CHAR_LIMIT: usize = 32;

pub struct GameUiPlugin;

impl Plugin for GameUiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LoginScreenState>()
            .init_resource::<MenuScreenState>()
            .add_systems(
                OnEnter(GameState::Playing),
                (cleanup_game_hud, spawn_game_hud).chain(),
            )
            .add_systems(OnExit(GameState::Playing), cleanup_game_hud)
            .add_systems(
                Update,
                update_game_hud
                    .run_if(in_state(GameState::Playing))
                    .run_if(resource_exists::<RaceSession>),
            )
            .add_systems(Update, menu_hotkeys.run_if(in_state(GameState::Menu)))
            .add_systems(
                EguiPrimaryContextPass,
                (
                    login_screen_ui.run_if(in_state(GameState::Login)),
                    menu_screen_ui.run_if(in_state(GameState::Menu)),
                )
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Resource, Debug, Clone, Default)]
struct LoginScreenState {
    name_input: String,
    error: Option<String>,
}

#[derive(Resource, Debug, Clone, Default)]
struct MenuScreenState {
    scoreboard_open: bool,
}

#[derive(Component)]
struct GameHudRoot;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
enum HudTextKind {
    Distance,
    Coins,
    Fuel,
    Best,
}

#[derive(Component)]
struct HudFuelFill;

/// Fuel bar color for a fill fraction in `[0, 1]`.
pub fn fuel_bar_color(fraction: f32) -> Color {
    if fraction > 0.5 {
        FUEL_GREEN
    } else if fraction > 0.25 {
        FUEL_ORANGE
    } else {
        FUEL_RED
    }
}

/// Plain-text ranking; the row for `highlight_name` is marked.
pub fn format_leaderboard_rows(entries: &[LeaderboardEntry], highlight_name: &str) -> String {
    if entries.is_empty() {
        return "No scores yet.".to_string();
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let marker = if !highlight_name.is_empty() && entry.name == highlight_name {
                ">"
            } else {
                " "
            };
            format!(
                "{marker}{rank:>2}. {name:<16} {score:>7.0}  {distance:>6.0} m",
                rank = index + 1,
                name = entry.name,
                score = entry.score_statistics,
                distance = entry.distance_statistics,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn login_screen_ui(
    mut egui_contexts: EguiContexts,
    mut screen: ResMut<LoginScreenState>,
    leaderboard: Res<LeaderboardState>,
    mut profile: ResMut<PlayerProfile>,
    mut requests: MessageWriter<LeaderboardRequest>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };

    let pending = leaderboard.login.is_pending();
    let mut login_clicked = false;
    let mut offline_clicked = false;

    egui::Window::new("Ridge Runner")
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .default_width(340.0)
        .show(ctx, |ui| {
            ui.label("Enter a player name to track your best runs.");
            ui.add_space(6.0);
            let response = ui.add_enabled(
                !pending,
                egui::TextEdit::singleline(&mut screen.name_input)
                    .char_limit(NAME_FIELD_CHAR_LIMIT)
                    .hint_text("Player name"),
            );
            if response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter)) {
                login_clicked = true;
            }

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                if ui.add_enabled(!pending, egui::Button::new("Login")).clicked() {
                    login_clicked = true;
                }
                if ui.add_enabled(!pending, egui::Button::new("Play offline")).clicked() {
                    offline_clicked = true;
                }
            });

            ui.add_space(4.0);
            match (&screen.error, &leaderboard.login) {
                (Some(error), _) => {
                    ui.colored_label(egui::Color32::from_rgb(231, 76, 60), error);
                }
                (None, RequestStatus::Pending) => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Connecting...");
                    });
                }
                (None, RequestStatus::Failed(error)) => {
                    ui.colored_label(egui::Color32::from_rgb(231, 76, 60), error);
                    ui.label("Retry, or play offline without saving scores.");
                }
                _ => {}
            }
        });

    if login_clicked && !pending {
        match validate_player_name(&screen.name_input) {
            Ok(name) => {
                screen.error = None;
                requests.write(LeaderboardRequest::Login { name });
            }
            Err(error) => screen.error = Some(error.to_string()),
        }
    }

    if offline_clicked {
        profile.name = validate_player_name(&screen.name_input)
            .unwrap_or_else(|_| OFFLINE_NAME.to_string());
        profile.online = false;
        screen.error = None;
        info!("Continuing offline as `{}`.", profile.name);
        next_state.set(GameState::Menu);
    }
}

#[allow(clippy::too_many_arguments)]
fn menu_screen_ui(
    mut egui_contexts: EguiContexts,
    config: Res<GameConfig>,
    leaderboard: Res<LeaderboardState>,
    mut screen: ResMut<MenuScreenState>,
    mut selection: ResMut<RaceSelection>,
    mut profile: ResMut<PlayerProfile>,
    mut requests: MessageWriter<LeaderboardRequest>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exit: MessageWriter<AppExit>,
) {
    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };

    let mut start_clicked = false;
    let mut scoreboard_clicked = false;
    let mut logout_clicked = false;
    let mut quit_clicked = false;

    egui::Window::new("Ridge Runner")
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .default_width(380.0)
        .show(ctx, |ui| {
            let mode = if profile.online { "online" } else { "offline" };
            ui.heading(format!("Driver: {} ({mode})", profile.name));
            ui.label(format!(
                "Best score {} | Best distance {} m",
                profile.best_score, profile.best_distance
            ));
            ui.separator();

            ui.label("Level");
            ui.horizontal(|ui| {
                for level in LevelTheme::ALL {
                    ui.selectable_value(&mut selection.level, level, level.label());
                }
            });

            ui.add_space(6.0);
            ui.label("Car");
            ui.horizontal_wrapped(|ui| {
                for skin in &config.skins.skins {
                    let [r, g, b] = skin.body_color;
                    let label = egui::RichText::new(&skin.label).color(egui::Color32::from_rgb(
                        (r * 255.0) as u8,
                        (g * 255.0) as u8,
                        (b * 255.0) as u8,
                    ));
                    ui.selectable_value(&mut selection.skin_id, skin.id.clone(), label);
                }
            });

            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("Start Race").clicked() {
                    start_clicked = true;
                }
                if ui.button("Scoreboard").clicked() {
                    scoreboard_clicked = true;
                }
                if ui.button("Change Driver").clicked() {
                    logout_clicked = true;
                }
                if ui.button("Quit").clicked() {
                    quit_clicked = true;
                }
            });
            ui.label(
                egui::RichText::new("Enter starts | W/Up gas | S/Down brake | Esc back to menu | M mute")
                    .small(),
            );
        });

    if screen.scoreboard_open {
        let mut open = screen.scoreboard_open;
        let mut refresh_clicked = false;
        egui::Window::new("Scoreboard")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                match &leaderboard.top {
                    RequestStatus::Pending => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Loading...");
                        });
                    }
                    RequestStatus::Failed(error) => {
                        ui.colored_label(egui::Color32::from_rgb(231, 76, 60), error);
                    }
                    _ => {}
                }
                scoreboard_grid(ui, &leaderboard.entries, &profile.name);
                if ui.button("Refresh").clicked() {
                    refresh_clicked = true;
                }
            });
        screen.scoreboard_open = open;
        if refresh_clicked {
            requests.write(LeaderboardRequest::FetchTop);
        }
    }

    if scoreboard_clicked {
        screen.scoreboard_open = true;
        requests.write(LeaderboardRequest::FetchTop);
    }
    if start_clicked {
        next_state.set(GameState::Playing);
    }
    if logout_clicked {
        *profile = PlayerProfile::default();
        screen.scoreboard_open = false;
        next_state.set(GameState::Login);
    }
    if quit_clicked {
        exit.write(AppExit::Success);
    }
}

fn scoreboard_grid(ui: &mut egui::Ui, entries: &[LeaderboardEntry], highlight_name: &str) {
    if entries.is_empty() {
        ui.label("No scores yet.");
        return;
    }

    egui::Grid::new("scoreboard_grid")
        .striped(true)
        .num_columns(5)
        .show(ui, |ui| {
            for header in ["#", "Name", "Score", "Distance", "Coins"] {
                ui.strong(header);
            }
            ui.end_row();

            for (index, entry) in entries.iter().enumerate() {
                let name = if entry.name == highlight_name {
                    egui::RichText::new(&entry.name).strong()
                } else {
                    egui::RichText::new(&entry.name)
                };
                ui.label(format!("{}", index + 1));
                ui.label(name);
                ui.label(format!("{:.0}", entry.score_statistics));
                ui.label(format!("{:.0} m", entry.distance_statistics));
                ui.label(format!("{:.0}", entry.coin));
                ui.end_row();
            }
        });
}

fn menu_hotkeys(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Enter) {
        next_state.set(GameState::Playing);
    }
}

fn spawn_game_hud(mut commands: Commands, selection: Res<RaceSelection>) {
    commands
        .spawn((
            Name::new("GameHudRoot"),
            GameHudRoot,
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(12.0),
                right: Val::Px(12.0),
                top: Val::Px(10.0),
                justify_content: JustifyContent::SpaceBetween,
                align_items: AlignItems::FlexStart,
                ..default()
            },
            ZIndex(HUD_PANEL_Z_INDEX),
        ))
        .with_children(|root| {
            root.spawn((
                Name::new("GameHudFuelPanel"),
                Node {
                    width: Val::Px(HUD_FUEL_BAR_WIDTH_PX + 24.0),
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(6.0),
                    padding: UiRect::all(Val::Px(12.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    ..default()
                },
                BackgroundColor(HUD_PANEL_BG),
                BorderColor::all(HUD_PANEL_BORDER),
            ))
            .with_children(|panel| {
                panel.spawn((
                    HudTextKind::Fuel,
                    Text::new("FUEL 100%"),
                    TextFont {
                        font_size: 18.0,
                        ..default()
                    },
                    TextColor(HUD_TEXT_PRIMARY),
                ));
                panel
                    .spawn((
                        Name::new("HudFuelBar"),
                        Node {
                            width: Val::Px(HUD_FUEL_BAR_WIDTH_PX),
                            height: Val::Px(14.0),
                            border: UiRect::all(Val::Px(1.0)),
                            ..default()
                        },
                        BackgroundColor(Color::srgba(0.02, 0.03, 0.04, 0.84)),
                        BorderColor::all(Color::srgba(0.56, 0.64, 0.70, 0.9)),
                    ))
                    .with_children(|bar| {
                        bar.spawn((
                            HudFuelFill,
                            Node {
                                width: Val::Px(HUD_FUEL_BAR_WIDTH_PX),
                                height: Val::Percent(100.0),
                                ..default()
                            },
                            BackgroundColor(FUEL_GREEN),
                        ));
                    });
                panel.spawn((
                    Text::new(selection.level.label()),
                    TextFont {
                        font_size: 14.0,
                        ..default()
                    },
                    TextColor(HUD_TEXT_MUTED),
                ));
            });

            root.spawn((
                Name::new("GameHudStatsPanel"),
                Node {
                    min_width: Val::Px(200.0),
                    flex_direction: FlexDirection::Column,
                    align_items: AlignItems::FlexEnd,
                    row_gap: Val::Px(4.0),
                    padding: UiRect::all(Val::Px(12.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    ..default()
                },
                BackgroundColor(HUD_PANEL_BG),
                BorderColor::all(HUD_PANEL_BORDER),
            ))
            .with_children(|panel| {
                panel.spawn((
                    HudTextKind::Distance,
                    Text::new("0 m"),
                    TextFont {
                        font_size: 30.0,
                        ..default()
                    },
                    TextColor(HUD_TEXT_PRIMARY),
                ));
                panel.spawn((
                    HudTextKind::Coins,
                    Text::new("COINS 0"),
                    TextFont {
                        font_size: 18.0,
                        ..default()
                    },
                    TextColor(Color::srgb(1.0, 0.84, 0.0)),
                ));
                panel.spawn((
                    HudTextKind::Best,
                    Text::new("BEST 0"),
                    TextFont {
                        font_size: 15.0,
                        ..default()
                    },
                    TextColor(HUD_TEXT_MUTED),
                ));
            });
        });
}

fn cleanup_game_hud(mut commands: Commands, hud_query: Query<Entity, With<GameHudRoot>>) {
    for entity in &hud_query {
        commands.entity(entity).try_despawn();
    }
}

fn update_game_hud(
    session: Res<RaceSession>,
    profile: Res<PlayerProfile>,
    mute: Res<SfxMute>,
    mut text_query: Query<(&HudTextKind, &mut Text)>,
    mut fuel_fill_query: Query<(&mut Node, &mut BackgroundColor), With<HudFuelFill>>,
) {
    let snapshot = session.snapshot();
    let fuel_fraction = snapshot.fuel_fraction();

    if let Ok((mut bar_node, mut bar_color)) = fuel_fill_query.single_mut() {
        bar_node.width = Val::Px(HUD_FUEL_BAR_WIDTH_PX * fuel_fraction);
        *bar_color = BackgroundColor(fuel_bar_color(fuel_fraction));
    }

    for (kind, mut text) in &mut text_query {
        match kind {
            HudTextKind::Distance => {
                *text = Text::new(format!("{} m", snapshot.distance));
            }
            HudTextKind::Coins => {
                *text = Text::new(format!("COINS {}", session.coins));
            }
            HudTextKind::Fuel => {
                *text = Text::new(format!("FUEL {:.0}%", fuel_fraction * 100.0));
            }
            HudTextKind::Best => {
                *text = Text::new(hud_best_line(&profile, mute.muted));
            }
        }
    }
}

fn hud_best_line(profile: &PlayerProfile, muted: bool) -> String {
    let line = format!("BEST {} | {} m", profile.best_score, profile.best_distance);
    if muted {
        format!("{line} | MUTED")
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, score: f64, distance: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            name: name.to_string(),
            coin: 0.0,
            distance_statistics: distance,
            score_statistics: score,
        }
    }

    #[test]
    fn hud_best_line_flags_muted_sound() {
        let profile = PlayerProfile {
            best_score: 640,
            best_distance: 410,
            ..PlayerProfile::default()
        };
        assert_eq!(hud_best_line(&profile, false), "BEST 640 | 410 m");
        assert_eq!(hud_best_line(&profile, true), "BEST 640 | 410 m | MUTED");
    }

    #[test]
    fn fuel_bar_color_thresholds() {
        assert_eq!(fuel_bar_color(1.0), FUEL_GREEN);
        assert_eq!(fuel_bar_color(0.51), FUEL_GREEN);
        assert_eq!(fuel_bar_color(0.5), FUEL_ORANGE);
        assert_eq!(fuel_bar_color(0.26), FUEL_ORANGE);
        assert_eq!(fuel_bar_color(0.25), FUEL_RED);
        assert_eq!(fuel_bar_color(0.0), FUEL_RED);
    }

    #[test]
    fn leaderboard_rows_are_ranked_and_highlighted() {
        let rows = format_leaderboard_rows(
            &[entry("Ann", 1400.0, 900.0), entry("Mali", 800.0, 620.0)],
            "Mali",
        );
        let lines: Vec<&str> = rows.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  1. Ann"));
        assert!(lines[1].starts_with("> 2. Mali"));
        assert!(lines[1].contains("620 m"));
    }

    #[test]
    fn empty_leaderboard_has_placeholder() {
        assert_eq!(format_leaderboard_rows(&[], "Mali"), "No scores yet.");
    }
}
