//! Remote player profiles and high scores.
//!
//! Requests run on worker threads that shell out to `curl`; the game polls
//! their join handles once per frame so a slow or absent server never stalls
//! a race. Every failure ends up as a status string for the screens.

use crate::config::{GameConfig, LeaderboardConfig};
use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

const API_BASE_URL_ENV: &str = "RIDGE_RUNNER_API_URL";
const STATUS_MARKER: &str = "__HTTP_STATUS__:";
const MAX_NAME_CHARS: usize = 32;
const MAX_RETRY_DELAY_SECONDS: f64 = 8.0;

pub struct LeaderboardPlugin;

impl Plugin for LeaderboardPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LeaderboardState>()
            .add_message::<LeaderboardRequest>()
            .add_message::<LeaderboardResponse>()
            .add_systems(
                Update,
                (dispatch_leaderboard_requests, poll_leaderboard_requests)
                    .chain()
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("failed to execute curl: {0}")]
    Spawn(String),
    #[error("curl command failed: {0}")]
    CurlFailed(String),
    #[error("server answered {code}: {body}")]
    Status { code: u16, body: String },
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("payload encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidName(String),
    #[error("leaderboard is disabled in game.toml")]
    Disabled,
}

/// Row of the server's player table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerRecord {
    pub name: String,
    pub coin: f64,
    pub distance: f64,
    pub distance_statistics: f64,
    pub score: f64,
    pub score_statistics: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub player: PlayerRecord,
    #[serde(default)]
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ScoreResponse {
    player: PlayerRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    #[serde(default)]
    pub coin: f64,
    #[serde(default)]
    pub distance_statistics: f64,
    #[serde(default)]
    pub score_statistics: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LeaderboardListResponse {
    #[serde(default)]
    leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    name: &'a str,
}

/// One finished race as the server stores it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSubmission {
    pub name: String,
    pub coin: u32,
    pub distance: u32,
    pub score: u32,
}

#[derive(Message, Debug, Clone)]
pub enum LeaderboardRequest {
    Login { name: String },
    SubmitScore(ScoreSubmission),
    FetchTop,
}

#[derive(Message, Debug, Clone)]
pub enum LeaderboardResponse {
    LoggedIn(LoginResponse),
    LoginFailed(String),
    ScoreSaved(PlayerRecord),
    TopLoaded(Vec<LeaderboardEntry>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestStatus {
    #[default]
    Idle,
    Pending,
    Done,
    Failed(String),
}

impl RequestStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }
}

enum JobOutput {
    Login(LoginResponse),
    Score(PlayerRecord),
    Top(Vec<LeaderboardEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Login,
    Score,
    Top,
}

struct InFlightRequest {
    kind: JobKind,
    started_at_seconds: f64,
    handle: JoinHandle<Result<JobOutput, LeaderboardError>>,
}

#[derive(Resource, Default)]
pub struct LeaderboardState {
    inflight: Vec<InFlightRequest>,
    pub login: RequestStatus,
    pub submit: RequestStatus,
    pub top: RequestStatus,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone)]
struct RequestArgs {
    base_url: String,
    connect_timeout_seconds: u32,
    request_timeout_seconds: u32,
    max_retries: u32,
    retry_backoff_seconds: f32,
}

impl RequestArgs {
    fn from_config(config: &LeaderboardConfig) -> Self {
        let base_url = std::env::var(API_BASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| config.api_base_url.clone());
        Self {
            base_url,
            connect_timeout_seconds: config.connect_timeout_seconds,
            request_timeout_seconds: config.request_timeout_seconds,
            max_retries: config.max_retries,
            retry_backoff_seconds: config.retry_backoff_seconds,
        }
    }
}

/// Trims a typed player name and checks it against the server's limits.
pub fn validate_player_name(raw: &str) -> Result<String, LeaderboardError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LeaderboardError::InvalidName(
            "Please enter a player name.".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(LeaderboardError::InvalidName(format!(
            "Player names are limited to {MAX_NAME_CHARS} characters."
        )));
    }
    Ok(name.to_string())
}

fn dispatch_leaderboard_requests(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut requests: MessageReader<LeaderboardRequest>,
    mut responses: MessageWriter<LeaderboardResponse>,
    mut state: ResMut<LeaderboardState>,
) {
    let now = time.elapsed_secs_f64();
    let leaderboard_cfg = &config.game.leaderboard;

    for request in requests.read() {
        if !leaderboard_cfg.enabled {
            let message = LeaderboardError::Disabled.to_string();
            match request {
                LeaderboardRequest::Login { .. } => {
                    state.login = RequestStatus::Failed(message.clone());
                    responses.write(LeaderboardResponse::LoginFailed(message));
                }
                LeaderboardRequest::SubmitScore(_) => {
                    state.submit = RequestStatus::Failed(message);
                }
                LeaderboardRequest::FetchTop => state.top = RequestStatus::Failed(message),
            }
            continue;
        }

        let args = RequestArgs::from_config(leaderboard_cfg);
        let (kind, handle) = match request.clone() {
            LeaderboardRequest::Login { name } => {
                if state.login.is_pending() {
                    continue;
                }
                state.login = RequestStatus::Pending;
                info!("Logging in as `{name}` at {}.", args.base_url);
                let handle = std::thread::spawn(move || {
                    with_retries("login", &args, |args| {
                        run_login(args, &name).map(JobOutput::Login)
                    })
                });
                (JobKind::Login, handle)
            }
            LeaderboardRequest::SubmitScore(submission) => {
                state.submit = RequestStatus::Pending;
                info!(
                    "Submitting score {} ({} m, {} coins) for `{}`.",
                    submission.score, submission.distance, submission.coin, submission.name
                );
                let handle = std::thread::spawn(move || {
                    with_retries("score", &args, |args| {
                        run_submit_score(args, &submission).map(JobOutput::Score)
                    })
                });
                (JobKind::Score, handle)
            }
            LeaderboardRequest::FetchTop => {
                if state.top.is_pending() {
                    continue;
                }
                state.top = RequestStatus::Pending;
                let top_n = leaderboard_cfg.top_n;
                let handle = std::thread::spawn(move || {
                    with_retries("leaderboard", &args, |args| {
                        run_fetch_top(args, top_n).map(JobOutput::Top)
                    })
                });
                (JobKind::Top, handle)
            }
        };

        state.inflight.push(InFlightRequest {
            kind,
            started_at_seconds: now,
            handle,
        });
    }
}

fn poll_leaderboard_requests(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut responses: MessageWriter<LeaderboardResponse>,
    mut state: ResMut<LeaderboardState>,
) {
    if state.inflight.is_empty() {
        return;
    }

    let now = time.elapsed_secs_f64();
    let stale_timeout_seconds = config.game.leaderboard.stale_request_timeout_seconds.max(1.0) as f64;
    let mut still_running = Vec::with_capacity(state.inflight.len());

    for inflight in std::mem::take(&mut state.inflight) {
        if !inflight.handle.is_finished() {
            if now - inflight.started_at_seconds <= stale_timeout_seconds {
                still_running.push(inflight);
                continue;
            }
            let message = format!("request timed out after {stale_timeout_seconds:.0}s");
            warn!("Leaderboard {:?} {message}; abandoning worker.", inflight.kind);
            fail_request(&mut state, &mut responses, inflight.kind, message);
            continue;
        }

        let kind = inflight.kind;
        match inflight.handle.join() {
            Ok(Ok(JobOutput::Login(login))) => {
                info!(
                    "Logged in as `{}` (new player: {}, best score {:.0}).",
                    login.player.name, login.is_new, login.player.score_statistics
                );
                state.login = RequestStatus::Done;
                responses.write(LeaderboardResponse::LoggedIn(login));
            }
            Ok(Ok(JobOutput::Score(player))) => {
                info!(
                    "Score saved for `{}`; server best is {:.0}.",
                    player.name, player.score_statistics
                );
                state.submit = RequestStatus::Done;
                responses.write(LeaderboardResponse::ScoreSaved(player));
            }
            Ok(Ok(JobOutput::Top(entries))) => {
                debug!("Leaderboard loaded with {} entries.", entries.len());
                state.top = RequestStatus::Done;
                state.entries = entries.clone();
                responses.write(LeaderboardResponse::TopLoaded(entries));
            }
            Ok(Err(error)) => {
                warn!("Leaderboard {kind:?} request failed: {error}");
                fail_request(&mut state, &mut responses, kind, truncate(&error.to_string(), 140));
            }
            Err(join_error) => {
                let message = format!("worker panicked ({join_error:?})");
                warn!("Leaderboard {kind:?} {message}");
                fail_request(&mut state, &mut responses, kind, message);
            }
        }
    }

    state.inflight = still_running;
}

fn fail_request(
    state: &mut LeaderboardState,
    responses: &mut MessageWriter<LeaderboardResponse>,
    kind: JobKind,
    message: String,
) {
    match kind {
        JobKind::Login => {
            state.login = RequestStatus::Failed(message.clone());
            responses.write(LeaderboardResponse::LoginFailed(message));
        }
        JobKind::Score => state.submit = RequestStatus::Failed(message),
        JobKind::Top => state.top = RequestStatus::Failed(message),
    }
}

fn with_retries<T>(
    label: &str,
    args: &RequestArgs,
    mut attempt: impl FnMut(&RequestArgs) -> Result<T, LeaderboardError>,
) -> Result<T, LeaderboardError> {
    let total_attempts = args.max_retries.saturating_add(1).max(1);
    let mut delay_seconds = args.retry_backoff_seconds.max(0.0) as f64;

    let mut attempt_index = 0;
    loop {
        match attempt(args) {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt_index += 1;
                // 4xx answers are final; retrying cannot change them.
                let retryable = !matches!(
                    error,
                    LeaderboardError::Status { code, .. } if (400..500).contains(&code)
                );
                if !retryable || attempt_index >= total_attempts {
                    return Err(error);
                }
                warn!(
                    "Leaderboard {label} attempt {attempt_index}/{total_attempts} failed: {}",
                    truncate(&error.to_string(), 180)
                );
                if delay_seconds > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(delay_seconds));
                    delay_seconds = (delay_seconds * 2.0).min(MAX_RETRY_DELAY_SECONDS);
                }
            }
        }
    }
}

fn run_login(args: &RequestArgs, name: &str) -> Result<LoginResponse, LeaderboardError> {
    let payload = serde_json::to_string(&LoginPayload { name })?;
    let (status, body) = run_curl(args, &endpoint(&args.base_url, "/api/login"), Some(&payload))?;
    decode_response(status, &body)
}

fn run_submit_score(
    args: &RequestArgs,
    submission: &ScoreSubmission,
) -> Result<PlayerRecord, LeaderboardError> {
    let payload = serde_json::to_string(submission)?;
    let (status, body) = run_curl(args, &endpoint(&args.base_url, "/api/score"), Some(&payload))?;
    decode_response::<ScoreResponse>(status, &body).map(|response| response.player)
}

fn run_fetch_top(
    args: &RequestArgs,
    top_n: usize,
) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
    let (status, body) = run_curl(args, &endpoint(&args.base_url, "/api/leaderboard"), None)?;
    let mut entries = decode_response::<LeaderboardListResponse>(status, &body)?.leaderboard;
    entries.sort_by(|a, b| b.score_statistics.total_cmp(&a.score_statistics));
    entries.truncate(top_n);
    Ok(entries)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, LeaderboardError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|error| error.error)
            .unwrap_or_else(|_| truncate(body, 200));
        return Err(LeaderboardError::Status {
            code: status,
            body: message,
        });
    }

    serde_json::from_str(body).map_err(|error| {
        LeaderboardError::Decode(format!("{error}; body={}", truncate(body, 200)))
    })
}

/// POSTs `payload` when given, otherwise GETs.
fn run_curl(
    args: &RequestArgs,
    url: &str,
    payload_json: Option<&str>,
) -> Result<(u16, String), LeaderboardError> {
    let mut curl_args = vec![
        "-sS".to_string(),
        "-L".to_string(),
        "--connect-timeout".to_string(),
        args.connect_timeout_seconds.to_string(),
        "--max-time".to_string(),
        args.request_timeout_seconds.to_string(),
    ];
    if let Some(payload_json) = payload_json {
        curl_args.extend([
            "-X".to_string(),
            "POST".to_string(),
            url.to_string(),
            "-H".to_string(),
            "Content-Type: application/json".to_string(),
            "--data-raw".to_string(),
            payload_json.to_string(),
        ]);
    } else {
        curl_args.push(url.to_string());
    }
    curl_args.extend(["-w".to_string(), format!("\\n{STATUS_MARKER}%{{http_code}}")]);

    debug!("curl {url}");
    let output = run_curl_capture_stdout(&curl_args)?;
    split_status_marker(&output)
}

fn split_status_marker(output: &str) -> Result<(u16, String), LeaderboardError> {
    let marker_index = output.rfind(STATUS_MARKER).ok_or_else(|| {
        LeaderboardError::Decode("missing HTTP status marker in curl output".to_string())
    })?;
    let (body, status_suffix) = output.split_at(marker_index);
    let status_code = status_suffix[STATUS_MARKER.len()..]
        .trim()
        .parse::<u16>()
        .map_err(|e| LeaderboardError::Decode(format!("failed to parse curl status code: {e}")))?;
    Ok((status_code, body.trim().to_string()))
}

fn run_curl_capture_stdout(args: &[String]) -> Result<String, LeaderboardError> {
    let run = |binary: &str| Command::new(binary).args(args).output();
    let output = match run("curl.exe") {
        Ok(output) => output,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            run("curl").map_err(|fallback_error| {
                LeaderboardError::Spawn(format!(
                    "curl.exe: {error}; curl: {fallback_error}"
                ))
            })?
        }
        Err(error) => return Err(LeaderboardError::Spawn(format!("curl.exe: {error}"))),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LeaderboardError::CurlFailed(truncate(stderr.trim(), 240)));
    }

    String::from_utf8(output.stdout)
        .map_err(|error| LeaderboardError::Decode(format!("curl output was not valid UTF-8: {error}")))
}

pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut truncated: String = input.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_names_are_trimmed_and_bounded() {
        assert_eq!(validate_player_name("  Mali  ").expect("valid"), "Mali");
        assert!(matches!(
            validate_player_name("   "),
            Err(LeaderboardError::InvalidName(_))
        ));
        assert!(validate_player_name(&"x".repeat(32)).is_ok());
        assert!(validate_player_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn score_payload_uses_server_field_names() {
        let submission = ScoreSubmission {
            name: "Mali".to_string(),
            coin: 7,
            distance: 412,
            score: 762,
        };
        let value: serde_json::Value =
            serde_json::to_value(&submission).expect("payload should encode");
        assert_eq!(
            value,
            serde_json::json!({ "name": "Mali", "coin": 7, "distance": 412, "score": 762 })
        );
    }

    #[test]
    fn login_response_decodes_camel_case_flag() {
        let body = r#"{"player":{"id":4,"name":"Mali","coin":12,"distance":300,
            "distance_statistics":812,"score":900,"score_statistics":1412},"isNew":false}"#;
        let login: LoginResponse = decode_response(200, body).expect("should decode");
        assert!(!login.is_new);
        assert_eq!(login.player.score_statistics, 1412.0);
        assert_eq!(login.player.distance_statistics, 812.0);
    }

    #[test]
    fn error_status_surfaces_server_message() {
        let error = decode_response::<LoginResponse>(400, r#"{"error":"Missing player name"}"#)
            .expect_err("400 should fail");
        match error {
            LeaderboardError::Status { code, body } => {
                assert_eq!(code, 400);
                assert_eq!(body, "Missing player name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let error = decode_response::<LoginResponse>(200, "<html>").expect_err("should fail");
        assert!(matches!(error, LeaderboardError::Decode(_)));
    }

    #[test]
    fn leaderboard_list_tolerates_missing_numbers() {
        let body = r#"{"leaderboard":[{"name":"A","score_statistics":50},{"name":"B"}]}"#;
        let list: LeaderboardListResponse = decode_response(200, body).expect("should decode");
        assert_eq!(list.leaderboard.len(), 2);
        assert_eq!(list.leaderboard[1].score_statistics, 0.0);
    }

    #[test]
    fn status_marker_is_split_from_body() {
        let output = "{\"ok\":true}\n__HTTP_STATUS__:201";
        let (status, body) = split_status_marker(output).expect("marker present");
        assert_eq!(status, 201);
        assert_eq!(body, "{\"ok\":true}");
        assert!(split_status_marker("no marker").is_err());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:3000/", "/api/login"),
            "http://localhost:3000/api/login"
        );
    }

    #[test]
    fn client_errors_are_not_retried() {
        let args = RequestArgs {
            base_url: String::new(),
            connect_timeout_seconds: 1,
            request_timeout_seconds: 1,
            max_retries: 3,
            retry_backoff_seconds: 0.0,
        };
        let mut attempts = 0;
        let result: Result<(), _> = with_retries("test", &args, |_| {
            attempts += 1;
            Err(LeaderboardError::Status {
                code: 400,
                body: "bad".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(attempts, 1);

        let mut attempts = 0;
        let result: Result<(), _> = with_retries("test", &args, |_| {
            attempts += 1;
            Err(LeaderboardError::CurlFailed("down".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(attempts, 4);
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate("abcdef", 10), "abcdef");
        assert_eq!(truncate("abcdef", 4), "abc...");
    }
}
