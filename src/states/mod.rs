mod bests;

use crate::config::GameConfig;
use crate::gameplay::session::RaceSession;
use crate::leaderboard::{
    LeaderboardRequest, LeaderboardResponse, LeaderboardState, RequestStatus, ScoreSubmission,
};
use crate::sim::{CarSnapshot, CrashCause, LevelTheme};
use crate::ui::format_leaderboard_rows;
use bevy::app::AppExit;
use bevy::prelude::*;
use bests::{load_saved_bests, write_saved_bests, SavedBests, BESTS_FILE};
use std::path::Path;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Login,
    Menu,
    Playing,
    GameOver,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RunSummary>()
            .init_resource::<PlayerProfile>()
            .init_resource::<RaceSelection>()
            .add_systems(Startup, (setup_camera, load_player_bests))
            .add_systems(OnEnter(GameState::Login), enter_login)
            .add_systems(
                Update,
                apply_login_responses.run_if(in_state(GameState::Login)),
            )
            .add_systems(OnEnter(GameState::Menu), enter_menu)
            .add_systems(OnEnter(GameState::Playing), enter_playing)
            .add_systems(
                Update,
                playing_controls.run_if(in_state(GameState::Playing)),
            )
            .add_systems(OnEnter(GameState::GameOver), (finalize_run, spawn_results_screen).chain())
            .add_systems(OnExit(GameState::GameOver), cleanup_results_screen)
            .add_systems(
                Update,
                (sync_results_leaderboard_text, results_controls)
                    .run_if(in_state(GameState::GameOver)),
            )
            .add_systems(Update, apply_saved_score_responses);
    }
}

#[derive(Component)]
struct ResultsScreenRoot;

#[derive(Component)]
struct ResultsLeaderboardText;

/// Who is playing and their best results so far.
#[derive(Resource, Debug, Clone, Default)]
pub struct PlayerProfile {
    pub name: String,
    /// False when the player continued without a server login.
    pub online: bool,
    pub best_score: u32,
    pub best_distance: u32,
}

/// Level and skin picked on the menu; used for every restart.
#[derive(Resource, Debug, Clone, Default)]
pub struct RaceSelection {
    pub level: LevelTheme,
    pub skin_id: String,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct RunSummary {
    pub level: LevelTheme,
    pub distance: u32,
    pub max_distance: u32,
    pub coins: u32,
    pub score: u32,
    pub crash_cause: Option<CrashCause>,
    pub new_best_score: bool,
    pub new_best_distance: bool,
}

impl PlayerProfile {
    fn saved_bests(&self) -> SavedBests {
        SavedBests {
            best_score: self.best_score,
            best_distance: self.best_distance,
        }
    }

    /// Folds in bests from disk or the server; true when either grew.
    fn merge_bests(&mut self, score: u32, distance: u32) -> bool {
        let before = self.saved_bests();
        self.best_score = self.best_score.max(score);
        self.best_distance = self.best_distance.max(distance);
        self.saved_bests() != before
    }
}

/// Distance where the run ended plus a fixed bonus per coin.
pub fn run_score(distance: u32, coins: u32, points_per_coin: u32) -> u32 {
    distance.saturating_add(coins.saturating_mul(points_per_coin))
}

/// Scores the run and compares it against the profile's bests. The score
/// uses the final distance; the distance best uses the farthest point.
fn summarize_run(
    level: LevelTheme,
    snapshot: &CarSnapshot,
    coins: u32,
    points_per_coin: u32,
    profile: &PlayerProfile,
) -> RunSummary {
    let score = run_score(snapshot.distance, coins, points_per_coin);
    RunSummary {
        level,
        distance: snapshot.distance,
        max_distance: snapshot.max_distance,
        coins,
        score,
        crash_cause: snapshot.crash_cause,
        new_best_score: score > profile.best_score,
        new_best_distance: snapshot.max_distance > profile.best_distance,
    }
}

fn load_player_bests(mut profile: ResMut<PlayerProfile>) {
    match load_saved_bests(Path::new(BESTS_FILE)) {
        Ok(Some(saved)) => {
            profile.merge_bests(saved.best_score, saved.best_distance);
            info!(
                "Loaded local bests: score {}, distance {} m.",
                profile.best_score, profile.best_distance
            );
        }
        Ok(None) => info!("No local bests saved yet at `{BESTS_FILE}`."),
        Err(error) => warn!("Ignoring local bests: {error}"),
    }
}

fn persist_player_bests(profile: &PlayerProfile) {
    if let Err(error) = write_saved_bests(Path::new(BESTS_FILE), &profile.saved_bests()) {
        warn!("Could not save local bests: {error}");
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn enter_login() {
    info!("Entered state: Login");
}

fn apply_login_responses(
    mut responses: MessageReader<LeaderboardResponse>,
    mut profile: ResMut<PlayerProfile>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    for response in responses.read() {
        let LeaderboardResponse::LoggedIn(login) = response else {
            continue;
        };
        profile.name = login.player.name.clone();
        profile.online = true;
        if profile.merge_bests(
            login.player.score_statistics.max(0.0) as u32,
            login.player.distance_statistics.max(0.0) as u32,
        ) {
            persist_player_bests(&profile);
        }
        next_state.set(GameState::Menu);
    }
}

fn enter_menu(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut selection: ResMut<RaceSelection>,
) {
    if !config.skins_by_id.contains_key(&selection.skin_id) {
        selection.skin_id = config.game.app.default_skin.clone();
        selection.level = config.default_level();
    }
    commands.remove_resource::<RaceSession>();
    info!("Entered state: Menu");
}

fn enter_playing(selection: Res<RaceSelection>, profile: Res<PlayerProfile>) {
    info!(
        "Entered state: Playing ({} level, {} skin, player `{}`)",
        selection.level.label(),
        selection.skin_id,
        profile.name
    );
}

fn playing_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        info!("Race abandoned; returning to menu.");
        next_state.set(GameState::Menu);
    }
}

fn finalize_run(
    config: Res<GameConfig>,
    session: Option<Res<RaceSession>>,
    mut profile: ResMut<PlayerProfile>,
    mut run_summary: ResMut<RunSummary>,
    mut requests: MessageWriter<LeaderboardRequest>,
) {
    let Some(session) = session else {
        warn!("Entered game over without a race session.");
        return;
    };

    let snapshot = session.car.snapshot();
    *run_summary = summarize_run(
        session.level,
        &snapshot,
        session.coins,
        config.game.scoring.points_per_coin,
        &profile,
    );
    let score = run_summary.score;
    if profile.merge_bests(score, snapshot.max_distance) {
        persist_player_bests(&profile);
    }

    info!(
        "Race over ({:?}): {} m (farthest {} m), {} coins, score {}.",
        snapshot.crash_cause, snapshot.distance, snapshot.max_distance, session.coins, score
    );

    if profile.online {
        requests.write(LeaderboardRequest::SubmitScore(ScoreSubmission {
            name: profile.name.clone(),
            coin: session.coins,
            distance: snapshot.max_distance,
            score,
        }));
    }
    requests.write(LeaderboardRequest::FetchTop);
}

fn apply_saved_score_responses(
    mut responses: MessageReader<LeaderboardResponse>,
    mut profile: ResMut<PlayerProfile>,
    mut requests: MessageWriter<LeaderboardRequest>,
) {
    for response in responses.read() {
        let LeaderboardResponse::ScoreSaved(player) = response else {
            continue;
        };
        if profile.merge_bests(
            player.score_statistics.max(0.0) as u32,
            player.distance_statistics.max(0.0) as u32,
        ) {
            persist_player_bests(&profile);
        }
        // The first fetch may have raced the submission.
        requests.write(LeaderboardRequest::FetchTop);
    }
}

fn results_title(cause: Option<CrashCause>) -> &'static str {
    match cause {
        Some(CrashCause::Flipped) => "CRASHED!",
        Some(CrashCause::OutOfFuel) => "OUT OF FUEL",
        None => "RACE OVER",
    }
}

fn spawn_results_screen(
    mut commands: Commands,
    run_summary: Res<RunSummary>,
    profile: Res<PlayerProfile>,
) {
    let best_score_tag = if run_summary.new_best_score { "  NEW BEST!" } else { "" };
    let best_distance_tag = if run_summary.new_best_distance { "  NEW BEST!" } else { "" };
    let summary_text = format!(
        "{level}\n\
Distance: {distance} m\n\
Coins: {coins}\n\
Score: {score}{best_score_tag}\n\n\
Best Score: {best_score}\n\
Best Distance: {best_distance} m{best_distance_tag}\n\n\
Space / Enter - Race Again\n\
Esc - Menu\n\
Q - Quit",
        level = run_summary.level.label(),
        distance = run_summary.max_distance,
        coins = run_summary.coins,
        score = run_summary.score,
        best_score = profile.best_score,
        best_distance = profile.best_distance,
    );

    commands
        .spawn((
            Name::new("ResultsOverlay"),
            ResultsScreenRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.82)),
            ZIndex(300),
        ))
        .with_children(|parent| {
            parent
                .spawn((
                    Node {
                        width: Val::Percent(64.0),
                        max_width: Val::Px(860.0),
                        min_width: Val::Px(480.0),
                        flex_direction: FlexDirection::Row,
                        column_gap: Val::Px(24.0),
                        padding: UiRect::all(Val::Px(16.0)),
                        border: UiRect::all(Val::Px(1.0)),
                        ..default()
                    },
                    BackgroundColor(Color::srgba(0.08, 0.10, 0.13, 0.96)),
                    BorderColor::all(Color::srgba(0.56, 0.62, 0.68, 0.92)),
                ))
                .with_children(|panel| {
                    panel
                        .spawn(Node {
                            flex_direction: FlexDirection::Column,
                            row_gap: Val::Px(10.0),
                            flex_grow: 1.0,
                            ..default()
                        })
                        .with_children(|column| {
                            column.spawn((
                                Text::new(results_title(run_summary.crash_cause)),
                                TextFont {
                                    font_size: 48.0,
                                    ..default()
                                },
                                TextColor(Color::srgb(0.94, 0.97, 1.00)),
                            ));
                            column.spawn((
                                Text::new(summary_text),
                                TextFont {
                                    font_size: 22.0,
                                    ..default()
                                },
                                TextColor(Color::srgb(0.90, 0.94, 0.98)),
                            ));
                        });
                    panel.spawn((
                        ResultsLeaderboardText,
                        Text::new("Leaderboard\n\nLoading..."),
                        TextFont {
                            font_size: 18.0,
                            ..default()
                        },
                        TextColor(Color::srgb(0.84, 0.88, 0.92)),
                        Node {
                            min_width: Val::Px(260.0),
                            ..default()
                        },
                    ));
                });
        });

    info!("Entered state: GameOver");
}

fn sync_results_leaderboard_text(
    leaderboard: Res<LeaderboardState>,
    profile: Res<PlayerProfile>,
    mut text_query: Query<&mut Text, With<ResultsLeaderboardText>>,
) {
    if !leaderboard.is_changed() {
        return;
    }
    let Ok(mut text) = text_query.single_mut() else {
        return;
    };

    let submit_line = match (&leaderboard.submit, profile.online) {
        (_, false) => "Playing offline; score kept locally.".to_string(),
        (RequestStatus::Pending, true) => "Saving score...".to_string(),
        (RequestStatus::Done, true) => "Score saved.".to_string(),
        (RequestStatus::Failed(error), true) => format!("Score not saved: {error}"),
        (RequestStatus::Idle, true) => String::new(),
    };
    let board = match &leaderboard.top {
        RequestStatus::Failed(error) => format!("Unavailable: {error}"),
        RequestStatus::Pending if leaderboard.entries.is_empty() => "Loading...".to_string(),
        _ => format_leaderboard_rows(&leaderboard.entries, &profile.name),
    };

    text.0 = format!("Leaderboard\n\n{board}\n\n{submit_line}");
}

fn cleanup_results_screen(
    mut commands: Commands,
    results_screen_query: Query<Entity, With<ResultsScreenRoot>>,
) {
    for entity in &results_screen_query {
        commands.entity(entity).try_despawn();
    }
}

fn results_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exit: MessageWriter<AppExit>,
) {
    if keyboard.any_just_pressed([KeyCode::Space, KeyCode::Enter]) {
        next_state.set(GameState::Playing);
    }

    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Menu);
    }

    if keyboard.just_pressed(KeyCode::KeyQ) {
        exit.write(AppExit::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_adds_coin_bonus_to_distance() {
        assert_eq!(run_score(0, 0, 50), 0);
        assert_eq!(run_score(412, 7, 50), 762);
        assert_eq!(run_score(100, 3, 0), 100);
    }

    #[test]
    fn score_saturates_instead_of_wrapping() {
        assert_eq!(run_score(u32::MAX - 10, 1, 50), u32::MAX);
        assert_eq!(run_score(5, u32::MAX, 50), u32::MAX);
    }

    fn ended_run(distance: u32, max_distance: u32) -> CarSnapshot {
        let mut snapshot =
            crate::sim::Car::new(LevelTheme::Grassland, crate::sim::CarTuning::default())
                .snapshot();
        snapshot.distance = distance;
        snapshot.max_distance = max_distance;
        snapshot
    }

    #[test]
    fn score_uses_final_distance_and_best_uses_farthest() {
        let profile = PlayerProfile {
            best_score: 500,
            best_distance: 400,
            ..PlayerProfile::default()
        };
        let summary = summarize_run(LevelTheme::Desert, &ended_run(300, 420), 2, 50, &profile);

        assert_eq!(summary.score, 400);
        assert_eq!(summary.distance, 300);
        assert_eq!(summary.max_distance, 420);
        assert!(!summary.new_best_score);
        assert!(summary.new_best_distance);
    }

    #[test]
    fn merging_bests_reports_only_improvements() {
        let mut profile = PlayerProfile {
            best_score: 800,
            best_distance: 300,
            ..PlayerProfile::default()
        };

        assert!(!profile.merge_bests(700, 300));
        assert!(profile.merge_bests(700, 350));
        assert_eq!(profile.best_score, 800);
        assert_eq!(profile.best_distance, 350);
        assert_eq!(
            profile.saved_bests(),
            SavedBests {
                best_score: 800,
                best_distance: 350,
            }
        );
    }

    #[test]
    fn results_title_names_the_crash_cause() {
        assert_eq!(results_title(Some(CrashCause::Flipped)), "CRASHED!");
        assert_eq!(results_title(Some(CrashCause::OutOfFuel)), "OUT OF FUEL");
        assert_eq!(results_title(None), "RACE OVER");
    }
}
