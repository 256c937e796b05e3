use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const PERSISTED_SCHEMA: u64 = 1;

pub const FOCUS_MINUTES_RANGE: (u32, u32) = (1, 180);
pub const SHORT_BREAK_MINUTES_RANGE: (u32, u32) = (1, 60);
pub const LONG_BREAK_MINUTES_RANGE: (u32, u32) = (1, 120);
pub const SESSIONS_BEFORE_LONG_BREAK_RANGE: (u32, u32) = (1, 12);

const DEFAULT_PLANNED: u32 = 1;
const DEFAULT_ASSIGNED_ROUND: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    /// Accepts the persisted camelCase names plus the kebab/short forms typed at the prompt.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "focus" => Some(Self::Focus),
            "shortBreak" | "short-break" | "short" => Some(Self::ShortBreak),
            "longBreak" | "long-break" | "long" => Some(Self::LongBreak),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    pub fn fallback_seconds(self) -> u32 {
        match self {
            Self::Focus => 25 * 60,
            Self::ShortBreak => 5 * 60,
            Self::LongBreak => 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub sessions_before_long_break: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_before_long_break: 4,
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_range(self.focus_minutes, FOCUS_MINUTES_RANGE, "focus_minutes")?;
        validate_range(
            self.short_break_minutes,
            SHORT_BREAK_MINUTES_RANGE,
            "short_break_minutes",
        )?;
        validate_range(
            self.long_break_minutes,
            LONG_BREAK_MINUTES_RANGE,
            "long_break_minutes",
        )?;
        validate_range(
            self.sessions_before_long_break,
            SESSIONS_BEFORE_LONG_BREAK_RANGE,
            "sessions_before_long_break",
        )?;
        Ok(())
    }

    pub fn clamped(&self) -> TimerConfig {
        TimerConfig {
            focus_minutes: clamp(self.focus_minutes, FOCUS_MINUTES_RANGE),
            short_break_minutes: clamp(self.short_break_minutes, SHORT_BREAK_MINUTES_RANGE),
            long_break_minutes: clamp(self.long_break_minutes, LONG_BREAK_MINUTES_RANGE),
            sessions_before_long_break: clamp(
                self.sessions_before_long_break,
                SESSIONS_BEFORE_LONG_BREAK_RANGE,
            ),
        }
    }

    pub fn minutes_for(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        }
    }
}

/// Full duration of `mode`; a missing config or a zero value falls back to 25/5/15 minutes.
pub fn duration_seconds(config: Option<&TimerConfig>, mode: TimerMode) -> u32 {
    match config.map(|config| config.minutes_for(mode)) {
        Some(minutes) if minutes > 0 => minutes.saturating_mul(60),
        _ => mode.fallback_seconds(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    pub mode: TimerMode,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub last_updated_at_ms: Option<i64>,
    pub focus_streak: u32,
}

impl TimerState {
    pub fn initial(config: &TimerConfig) -> Self {
        Self {
            mode: TimerMode::Focus,
            remaining_seconds: duration_seconds(Some(config), TimerMode::Focus),
            is_running: false,
            last_updated_at_ms: None,
            focus_streak: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_planned")]
    pub planned: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub done: bool,
    #[serde(default = "default_assigned_round")]
    pub assigned_round: u32,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.assigned_round < 1 {
            return Err("task.assigned_round must be >= 1".to_string());
        }
        Ok(())
    }
}

fn default_planned() -> u32 {
    DEFAULT_PLANNED
}

fn default_assigned_round() -> u32 {
    DEFAULT_ASSIGNED_ROUND
}

/// Task form payload. A draft with an `id` edits that task, otherwise a new one is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub planned: Option<u32>,
    pub assigned_round: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub tasks: Vec<Task>,
    pub active_task_id: Option<String>,
}

impl DayRecord {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == task_id)
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active_task_id
            .as_deref()
            .and_then(|task_id| self.task(task_id))
            .filter(|task| !task.done)
    }
}

pub type RoundMap = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unsupported schema {0}")]
    UnsupportedSchema(u64),
    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("unknown timer mode '{0}'")]
    UnknownMode(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTimerState {
    schema: u64,
    mode: String,
    remaining: i64,
    is_running: bool,
    last_updated: Option<i64>,
    #[serde(default)]
    focus_streak: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTimerConfig {
    schema: u64,
    #[serde(flatten)]
    config: TimerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedDayRecord {
    schema: u64,
    #[serde(flatten)]
    record: DayRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRoundMap {
    schema: u64,
    rounds: BTreeMap<String, i64>,
}

fn parse_envelope(raw: &str) -> Result<serde_json::Value, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|error| DecodeError::Malformed(error.to_string()))?;
    let schema = value
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| DecodeError::Malformed("missing schema".to_string()))?;
    if schema != PERSISTED_SCHEMA {
        return Err(DecodeError::UnsupportedSchema(schema));
    }
    Ok(value)
}

fn from_envelope<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|error| DecodeError::Malformed(error.to_string()))
}

pub fn encode_timer_state(state: &TimerState) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedTimerState {
        schema: PERSISTED_SCHEMA,
        mode: state.mode.as_str().to_string(),
        remaining: i64::from(state.remaining_seconds),
        is_running: state.is_running,
        last_updated: state.last_updated_at_ms,
        focus_streak: i64::from(state.focus_streak),
    })
}

/// Decodes the stored timer state as written, without elapsed-time recovery.
/// A remaining value above the configured duration is clamped down to it.
pub fn decode_timer_state(raw: &str, config: &TimerConfig) -> Result<TimerState, DecodeError> {
    let persisted: PersistedTimerState = from_envelope(parse_envelope(raw)?)?;
    let mode = TimerMode::parse(&persisted.mode)
        .ok_or_else(|| DecodeError::UnknownMode(persisted.mode.clone()))?;
    if persisted.remaining < 0 {
        return Err(DecodeError::OutOfRange {
            field: "remaining",
            value: persisted.remaining,
        });
    }
    let focus_streak = u32::try_from(persisted.focus_streak).map_err(|_| DecodeError::OutOfRange {
        field: "focusStreak",
        value: persisted.focus_streak,
    })?;
    let last_updated_at_ms = match (persisted.is_running, persisted.last_updated) {
        (true, Some(timestamp)) => Some(timestamp),
        (true, None) => {
            return Err(DecodeError::Malformed(
                "running timer without lastUpdated".to_string(),
            ));
        }
        (false, _) => None,
    };
    let full = i64::from(duration_seconds(Some(config), mode));

    Ok(TimerState {
        mode,
        remaining_seconds: persisted.remaining.min(full) as u32,
        is_running: persisted.is_running,
        last_updated_at_ms,
        focus_streak,
    })
}

pub fn encode_timer_config(config: &TimerConfig) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedTimerConfig {
        schema: PERSISTED_SCHEMA,
        config: *config,
    })
}

/// Persisted settings are clamped into their documented ranges rather than rejected.
pub fn decode_timer_config(raw: &str) -> Result<TimerConfig, DecodeError> {
    let persisted: PersistedTimerConfig = from_envelope(parse_envelope(raw)?)?;
    Ok(persisted.config.clamped())
}

pub fn encode_day_record(record: &DayRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedDayRecord {
        schema: PERSISTED_SCHEMA,
        record: record.clone(),
    })
}

/// An active id that no longer points at an open task is dropped instead of failing the day.
pub fn decode_day_record(raw: &str) -> Result<DayRecord, DecodeError> {
    let persisted: PersistedDayRecord = from_envelope(parse_envelope(raw)?)?;
    let mut record = persisted.record;
    for task in &record.tasks {
        if task.assigned_round < 1 {
            return Err(DecodeError::OutOfRange {
                field: "assignedRound",
                value: i64::from(task.assigned_round),
            });
        }
        task.validate().map_err(DecodeError::Malformed)?;
    }
    if record.active_task().is_none() {
        record.active_task_id = None;
    }
    Ok(record)
}

pub fn encode_round_map(rounds: &RoundMap) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedRoundMap {
        schema: PERSISTED_SCHEMA,
        rounds: rounds
            .iter()
            .map(|(date, round)| (date.clone(), i64::from(*round)))
            .collect(),
    })
}

/// Entries below 1 are raised to 1.
pub fn decode_round_map(raw: &str) -> Result<RoundMap, DecodeError> {
    let persisted: PersistedRoundMap = from_envelope(parse_envelope(raw)?)?;
    Ok(persisted
        .rounds
        .into_iter()
        .map(|(date, round)| (date, round.clamp(1, i64::from(u32::MAX)) as u32))
        .collect())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_range(value: u32, (min, max): (u32, u32), field_name: &str) -> Result<(), String> {
    if value < min || value > max {
        return Err(format!("{field_name} must be between {min} and {max}"));
    }
    Ok(())
}

fn clamp(value: u32, (min, max): (u32, u32)) -> u32 {
    value.clamp(min, max)
}
