use crate::application::round_scheduler::RoundScheduler;
use crate::domain::models::Task;
use crate::infrastructure::storage::KeyValueStore;
use serde::Serialize;

pub const WEEK_DAYS: u64 = 7;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub planned: u32,
    pub completed: u32,
    pub done: bool,
    pub assigned_round: u32,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            planned: task.planned,
            completed: task.completed,
            done: task.done,
            assigned_round: task.assigned_round,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub date: String,
    pub current_round: u32,
    pub active_task_id: Option<String>,
    pub tasks: Vec<TaskSummary>,
    pub planned_total: u32,
    pub completed_total: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: String,
    pub planned: u32,
    pub completed: u32,
}

pub fn summarize_today<S>(scheduler: &mut RoundScheduler<S>, date: &str) -> TodaySummary
where
    S: KeyValueStore,
{
    let current_round = scheduler.get_current_round(date);
    let active_task_id = scheduler.active_task(date).map(|task| task.id);
    let tasks = scheduler
        .tasks(date)
        .iter()
        .map(TaskSummary::from)
        .collect::<Vec<_>>();
    let (planned_total, completed_total) = totals(tasks.iter().map(|task| (task.planned, task.completed)));
    TodaySummary {
        date: date.to_string(),
        current_round,
        active_task_id,
        tasks,
        planned_total,
        completed_total,
    }
}

/// Trailing days ending today, oldest first. Dates never touched report zeros.
pub fn summarize_week<S>(scheduler: &RoundScheduler<S>, day_keys: &[String]) -> Vec<DaySummary>
where
    S: KeyValueStore,
{
    day_keys
        .iter()
        .map(|date| {
            let day = scheduler.peek_day(date);
            let (planned, completed) =
                totals(day.tasks.iter().map(|task| (task.planned, task.completed)));
            DaySummary {
                date: date.clone(),
                planned,
                completed,
            }
        })
        .collect()
}

fn totals(values: impl Iterator<Item = (u32, u32)>) -> (u32, u32) {
    values.fold((0u32, 0u32), |(planned, completed), (task_planned, task_completed)| {
        (
            planned.saturating_add(task_planned),
            completed.saturating_add(task_completed),
        )
    })
}
