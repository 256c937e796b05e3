use crate::application::bootstrap::BootstrapResult;
use crate::application::clock::Clock;
use crate::application::completion::{CompletionOrchestrator, CompletionReport};
use crate::application::session::{PomodoroSession, SessionSnapshot};
use crate::application::summary::{summarize_today, summarize_week, DaySummary, TodaySummary, WEEK_DAYS};
use crate::application::timer::{ResetOptions, TickOutcome, TimerSnapshot};
use crate::domain::models::{Task, TaskDraft, TimerConfig, TimerMode};
use crate::infrastructure::audio::{AlarmSound, AudioPlayer};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::presenter::{Presenter, StatusMessage};
use crate::infrastructure::prompt::ConfirmationPrompt;
use crate::infrastructure::storage::SqliteKeyValueStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

const SETTINGS_UPDATED_STATUS: &str =
    "Timer settings updated. New durations apply to the next session.";

/// Side-effect adapters handed to the application at startup.
pub struct Collaborators {
    pub audio: Arc<dyn AudioPlayer>,
    pub notifier: Arc<dyn Notifier>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub presenter: Arc<dyn Presenter>,
}

pub struct AppState {
    workspace_root: PathBuf,
    database_path: PathBuf,
    config: AppConfig,
    session: Mutex<PomodoroSession<SqliteKeyValueStore>>,
    audio: Arc<dyn AudioPlayer>,
    prompt: Arc<dyn ConfirmationPrompt>,
    presenter: Arc<dyn Presenter>,
    orchestrator: CompletionOrchestrator,
}

impl AppState {
    pub fn new(bootstrap: &BootstrapResult, collaborators: Collaborators) -> Result<Self, InfraError> {
        let clock = Clock::new(bootstrap.config.timezone()?);
        Ok(Self::with_clock(bootstrap, clock, collaborators))
    }

    pub fn with_clock(bootstrap: &BootstrapResult, clock: Clock, collaborators: Collaborators) -> Self {
        let store = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        let session = PomodoroSession::load(store, clock);
        let orchestrator = CompletionOrchestrator::new(
            Arc::clone(&collaborators.audio),
            collaborators.notifier,
            Arc::clone(&collaborators.prompt),
            Arc::clone(&collaborators.presenter),
            bootstrap.config.alarm_sound,
        );
        Self {
            workspace_root: bootstrap.workspace_root.clone(),
            database_path: bootstrap.database_path.clone(),
            config: bootstrap.config.clone(),
            session: Mutex::new(session),
            audio: collaborators.audio,
            prompt: collaborators.prompt,
            presenter: collaborators.presenter,
            orchestrator,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn alarm_sound(&self) -> AlarmSound {
        self.config.alarm_sound
    }

    pub fn presenter(&self) -> &dyn Presenter {
        self.presenter.as_ref()
    }

    /// Asks before a destructive command; a failed prompt counts as declined.
    pub async fn confirm(&self, message: &str, confirm_label: &str, cancel_label: &str) -> bool {
        match self.prompt.confirm(message, confirm_label, cancel_label).await {
            Ok(confirmed) => confirmed,
            Err(error) => {
                warn!(%error, "confirmation prompt failed");
                false
            }
        }
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
    }

    async fn lock_session(&self) -> MutexGuard<'_, PomodoroSession<SqliteKeyValueStore>> {
        self.session.lock().await
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TickResponse {
    pub timer: TimerSnapshot,
    pub completion: Option<CompletionReport>,
}

fn normalize_task_id(task_id: &str) -> Result<&str, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidInput(
            "task_id must not be empty".to_string(),
        ));
    }
    Ok(task_id)
}

fn parse_mode(mode: &str) -> Result<TimerMode, InfraError> {
    TimerMode::parse(mode)
        .ok_or_else(|| InfraError::InvalidInput(format!("unknown timer mode: {mode}")))
}

pub async fn start_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    if let Err(error) = state.audio.unlock().await {
        warn!(%error, "failed to unlock alarm audio");
    }
    let mut session = state.lock_session().await;
    let started = session.start_timer();
    let snapshot = session.timer().snapshot();
    drop(session);

    if started {
        state.log_info(
            "start_timer",
            &format!("started mode={} remaining={}", snapshot.mode.as_str(), snapshot.remaining_seconds),
        );
    }
    Ok(snapshot)
}

pub async fn pause_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let mut session = state.lock_session().await;
    let paused = session.pause_timer();
    let snapshot = session.timer().snapshot();
    drop(session);

    if paused {
        state.log_info("pause_timer", &format!("paused remaining={}", snapshot.remaining_seconds));
    }
    Ok(snapshot)
}

pub async fn reset_timer_impl(
    state: &AppState,
    mode: Option<String>,
    reset_streak: bool,
) -> Result<TimerSnapshot, InfraError> {
    let mode = mode.as_deref().map(parse_mode).transpose()?;
    let mut session = state.lock_session().await;
    session.reset_timer(ResetOptions { mode, reset_streak });
    let snapshot = session.timer().snapshot();
    drop(session);

    state.log_info(
        "reset_timer",
        &format!("reset mode={} reset_streak={reset_streak}", snapshot.mode.as_str()),
    );
    Ok(snapshot)
}

/// Unknown mode names leave the timer as it is.
pub async fn switch_mode_impl(state: &AppState, mode: String) -> Result<TimerSnapshot, InfraError> {
    let mut session = state.lock_session().await;
    if !session.timer_mut().switch_mode_named(&mode) {
        debug!(mode = mode.as_str(), "ignored unknown timer mode");
    }
    Ok(session.timer().snapshot())
}

/// Advances the running timer; a zero crossing runs the completion sequence
/// while the session stays locked.
pub async fn tick_impl(state: &AppState) -> Result<TickResponse, InfraError> {
    let mut session = state.lock_session().await;
    let completion = match session.tick() {
        TickOutcome::ReachedZero { mode } => state.orchestrator.run(&mut *session, mode).await,
        TickOutcome::Advanced { .. } => {
            state.presenter.render_timer(&session.timer().snapshot());
            None
        }
        TickOutcome::Idle | TickOutcome::Unchanged => None,
    };
    Ok(TickResponse {
        timer: session.timer().snapshot(),
        completion,
    })
}

pub async fn get_state_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.lock_session().await;
    Ok(session.snapshot())
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let mut session = state.lock_session().await;
    let today = session.today();
    Ok(session.scheduler_mut().tasks(&today))
}

pub async fn upsert_task_impl(state: &AppState, draft: TaskDraft) -> Result<Task, InfraError> {
    let mut session = state.lock_session().await;
    let today = session.today();
    let task = session.scheduler_mut().upsert_task(&today, draft)?;
    drop(session);

    state.log_info(
        "upsert_task",
        &format!("saved task_id={} round={}", task.id, task.assigned_round),
    );
    Ok(task)
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = normalize_task_id(&task_id)?;
    let mut session = state.lock_session().await;
    let today = session.today();
    let removed = session.scheduler_mut().delete_task(&today, task_id);
    drop(session);

    if removed {
        state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    }
    Ok(removed)
}

pub async fn toggle_task_done_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let task_id = normalize_task_id(&task_id)?;
    let mut session = state.lock_session().await;
    let today = session.today();
    let task = session.scheduler_mut().toggle_done(&today, task_id)?;
    drop(session);

    state.log_info("toggle_task_done", &format!("task_id={task_id} done={}", task.done));
    Ok(task)
}

pub async fn set_active_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let task_id = normalize_task_id(&task_id)?;
    let mut session = state.lock_session().await;
    let today = session.today();
    let task = session.scheduler_mut().set_active_task(&today, task_id)?;
    drop(session);

    state.log_info("set_active_task", &format!("active task_id={task_id}"));
    Ok(task)
}

pub async fn move_task_to_next_round_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let task_id = normalize_task_id(&task_id)?;
    let mut session = state.lock_session().await;
    let today = session.today();
    let task = session.scheduler_mut().move_to_next_round(&today, task_id)?;
    drop(session);

    state.log_info(
        "move_task_to_next_round",
        &format!("task_id={task_id} round={}", task.assigned_round),
    );
    Ok(task)
}

pub async fn increment_task_completion_impl(
    state: &AppState,
    task_id: String,
    delta: i64,
) -> Result<Task, InfraError> {
    let task_id = normalize_task_id(&task_id)?;
    let mut session = state.lock_session().await;
    let today = session.today();
    let task = session
        .scheduler_mut()
        .increment_completion(&today, task_id, delta)?;
    Ok(task)
}

pub async fn update_timer_config_impl(
    state: &AppState,
    config: TimerConfig,
) -> Result<TimerSnapshot, InfraError> {
    let mut session = state.lock_session().await;
    session.timer_mut().update_config(config)?;
    let snapshot = session.timer().snapshot();
    drop(session);

    state
        .presenter
        .show_status(&StatusMessage::muted(SETTINGS_UPDATED_STATUS));
    state.log_info(
        "update_timer_config",
        &format!(
            "focus={} short={} long={} sessions={}",
            config.focus_minutes,
            config.short_break_minutes,
            config.long_break_minutes,
            config.sessions_before_long_break
        ),
    );
    Ok(snapshot)
}

pub async fn reset_timer_config_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    update_timer_config_impl(state, TimerConfig::default()).await
}

pub async fn get_timer_config_impl(state: &AppState) -> Result<TimerConfig, InfraError> {
    let session = state.lock_session().await;
    Ok(*session.timer().config())
}

pub async fn get_today_summary_impl(state: &AppState) -> Result<TodaySummary, InfraError> {
    let mut session = state.lock_session().await;
    let today = session.today();
    Ok(summarize_today(session.scheduler_mut(), &today))
}

pub async fn get_week_summary_impl(state: &AppState) -> Result<Vec<DaySummary>, InfraError> {
    let session = state.lock_session().await;
    let day_keys = session.clock().trailing_day_keys(WEEK_DAYS);
    Ok(summarize_week(session.scheduler(), &day_keys))
}

/// Unlocks playback and plays the configured sound once.
pub async fn preview_alarm_impl(state: &AppState) -> Result<(), InfraError> {
    state.audio.unlock().await?;
    state.audio.play(state.config.alarm_sound).await?;
    state.log_info(
        "preview_alarm",
        &format!("played sound={}", state.config.alarm_sound.as_str()),
    );
    Ok(())
}

pub async fn clear_all_data_impl(state: &AppState) -> Result<usize, InfraError> {
    let mut session = state.lock_session().await;
    let removed = session.clear_all_data()?;
    drop(session);

    state.log_info("clear_all_data", &format!("removed keys={removed}"));
    Ok(removed)
}
