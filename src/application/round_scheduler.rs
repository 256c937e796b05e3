use crate::application::clock::Clock;
use crate::domain::models::{
    decode_day_record, decode_round_map, encode_day_record, encode_round_map, DayRecord,
    RoundMap, Task, TaskDraft,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{day_key, rounds_key, KeyValueStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_PLANNED: u32 = 1;

pub const EMPTY_TITLE_MESSAGE: &str = "Please add a title for your task.";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Per-day task lists, active-task pointers and round counters.
pub struct RoundScheduler<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    clock: Clock,
    rounds: RoundMap,
    days: HashMap<String, DayRecord>,
}

impl<S> RoundScheduler<S>
where
    S: KeyValueStore,
{
    pub fn load(store: Arc<S>, clock: Clock) -> Self {
        let rounds = match store.get(&rounds_key()) {
            Ok(Some(raw)) => decode_round_map(&raw).unwrap_or_else(|error| {
                warn!(%error, "discarding malformed round counters");
                RoundMap::new()
            }),
            Ok(None) => RoundMap::new(),
            Err(error) => {
                warn!(%error, "failed to read round counters");
                RoundMap::new()
            }
        };
        Self {
            store,
            clock,
            rounds,
            days: HashMap::new(),
        }
    }

    pub fn get_current_round(&mut self, date: &str) -> u32 {
        if let Some(round) = self.rounds.get(date) {
            return *round;
        }
        self.rounds.insert(date.to_string(), 1);
        self.persist_rounds();
        1
    }

    pub fn advance_round(&mut self, date: &str) -> u32 {
        let next = self.get_current_round(date).saturating_add(1);
        self.rounds.insert(date.to_string(), next);
        self.persist_rounds();
        debug!(date, round = next, "advanced round");
        next
    }

    pub fn day(&mut self, date: &str) -> &DayRecord {
        self.day_mut(date)
    }

    pub fn tasks(&mut self, date: &str) -> Vec<Task> {
        self.day(date).tasks.clone()
    }

    pub fn active_task(&mut self, date: &str) -> Option<Task> {
        self.day(date).active_task().cloned()
    }

    /// Smallest `assigned_round` among open tasks, ties broken by list order.
    /// Prefers a task already due; otherwise offers the earliest future one.
    pub fn find_best_task_for_round(&mut self, date: &str) -> Option<Task> {
        let current_round = self.get_current_round(date);
        let open = self
            .day(date)
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| !task.done)
            .collect::<Vec<_>>();

        open.iter()
            .filter(|(_, task)| task.assigned_round <= current_round)
            .min_by_key(|(index, task)| (task.assigned_round, *index))
            .or_else(|| {
                open.iter()
                    .min_by_key(|(index, task)| (task.assigned_round, *index))
            })
            .map(|(_, task)| (*task).clone())
    }

    pub fn ensure_active_task_for_round(&mut self, date: &str) -> Option<Task> {
        let current_round = self.get_current_round(date);
        if let Some(active) = self.active_task(date) {
            if active.assigned_round <= current_round {
                return Some(active);
            }
        }

        let candidate = self.find_best_task_for_round(date);
        let candidate_id = candidate.as_ref().map(|task| task.id.clone());
        if self.day(date).active_task_id != candidate_id {
            self.day_mut(date).active_task_id = candidate_id;
            self.persist_day(date);
        }
        candidate
    }

    pub fn set_active_task(&mut self, date: &str, task_id: &str) -> Result<Task, InfraError> {
        let task = self
            .day(date)
            .task(task_id)
            .cloned()
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        if task.done {
            return Err(InfraError::InvalidInput(format!(
                "task is already done: {task_id}"
            )));
        }
        self.day_mut(date).active_task_id = Some(task.id.clone());
        self.persist_day(date);
        Ok(task)
    }

    pub fn upsert_task(&mut self, date: &str, draft: TaskDraft) -> Result<Task, InfraError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidInput(EMPTY_TITLE_MESSAGE.to_string()));
        }
        let assigned_round = match draft.assigned_round {
            Some(round) => round.max(1),
            None => self.get_current_round(date),
        };
        let description = draft.description.unwrap_or_default();
        let planned = draft.planned.unwrap_or(DEFAULT_PLANNED);

        let task = match draft.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(task_id) => {
                let existing = self
                    .day_mut(date)
                    .task_mut(task_id)
                    .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
                existing.title = title.to_string();
                existing.description = description;
                existing.planned = planned;
                existing.assigned_round = assigned_round;
                existing.clone()
            }
            None => {
                let task = Task {
                    id: self.next_task_id(),
                    title: title.to_string(),
                    description,
                    planned,
                    completed: 0,
                    done: false,
                    assigned_round,
                };
                self.day_mut(date).tasks.push(task.clone());
                task
            }
        };

        let day = self.day_mut(date);
        if day.active_task().is_none() && !task.done {
            day.active_task_id = Some(task.id.clone());
        }
        self.persist_day(date);
        Ok(task)
    }

    pub fn delete_task(&mut self, date: &str, task_id: &str) -> bool {
        let day = self.day_mut(date);
        let before = day.tasks.len();
        day.tasks.retain(|task| task.id != task_id);
        if day.tasks.len() == before {
            return false;
        }
        if day.active_task_id.as_deref() == Some(task_id) {
            day.active_task_id = None;
        }
        self.persist_day(date);
        true
    }

    pub fn toggle_done(&mut self, date: &str, task_id: &str) -> Result<Task, InfraError> {
        let done = self
            .day(date)
            .task(task_id)
            .map(|task| !task.done)
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        self.set_done(date, task_id, done)
    }

    pub fn set_done(&mut self, date: &str, task_id: &str, done: bool) -> Result<Task, InfraError> {
        let day = self.day_mut(date);
        let task = day
            .task_mut(task_id)
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        task.done = done;
        let task = task.clone();
        if done && day.active_task_id.as_deref() == Some(task_id) {
            day.active_task_id = None;
        }
        self.persist_day(date);
        Ok(task)
    }

    pub fn increment_completion(
        &mut self,
        date: &str,
        task_id: &str,
        delta: i64,
    ) -> Result<Task, InfraError> {
        let task = self
            .day_mut(date)
            .task_mut(task_id)
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        let completed = (i64::from(task.completed) + delta).clamp(0, i64::from(u32::MAX));
        task.completed = completed as u32;
        let task = task.clone();
        self.persist_day(date);
        Ok(task)
    }

    /// Carries a task to `round` (at least 1); a carried task is never left marked done.
    pub fn update_task_round(
        &mut self,
        date: &str,
        task_id: &str,
        round: u32,
    ) -> Result<Task, InfraError> {
        let task = self
            .day_mut(date)
            .task_mut(task_id)
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        task.assigned_round = round.max(1);
        task.done = false;
        let task = task.clone();
        self.persist_day(date);
        Ok(task)
    }

    pub fn move_to_next_round(&mut self, date: &str, task_id: &str) -> Result<Task, InfraError> {
        let round = self
            .day(date)
            .task(task_id)
            .map(|task| task.assigned_round.saturating_add(1))
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
        self.update_task_round(date, task_id, round)
    }

    /// Reads a day without creating it; used by rollups over past dates.
    pub fn peek_day(&self, date: &str) -> DayRecord {
        if let Some(day) = self.days.get(date) {
            return day.clone();
        }
        self.read_day(date)
    }

    #[cfg(test)]
    pub(crate) fn peek_round(&self, date: &str) -> Option<u32> {
        self.rounds.get(date).copied()
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
        self.days.clear();
    }

    fn day_mut(&mut self, date: &str) -> &mut DayRecord {
        if !self.days.contains_key(date) {
            let record = self.read_day(date);
            self.days.insert(date.to_string(), record);
        }
        self.days.entry(date.to_string()).or_default()
    }

    fn read_day(&self, date: &str) -> DayRecord {
        match self.store.get(&day_key(date)) {
            Ok(Some(raw)) => decode_day_record(&raw).unwrap_or_else(|error| {
                warn!(date, %error, "discarding malformed day record");
                DayRecord::default()
            }),
            Ok(None) => DayRecord::default(),
            Err(error) => {
                warn!(date, %error, "failed to read day record");
                DayRecord::default()
            }
        }
    }

    fn persist_day(&self, date: &str) {
        let Some(day) = self.days.get(date) else {
            return;
        };
        let result = encode_day_record(day)
            .map_err(InfraError::from)
            .and_then(|payload| self.store.set(&day_key(date), &payload));
        if let Err(error) = result {
            warn!(date, %error, "failed to persist day record");
        }
    }

    fn persist_rounds(&self) {
        let result = encode_round_map(&self.rounds)
            .map_err(InfraError::from)
            .and_then(|payload| self.store.set(&rounds_key(), &payload));
        if let Err(error) = result {
            warn!(%error, "failed to persist round counters");
        }
    }

    fn next_task_id(&self) -> String {
        let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        format!("task-{}-{sequence}", self.clock.now().timestamp_micros())
    }
}
