use crate::application::clock::Clock;
use crate::application::round_scheduler::RoundScheduler;
use crate::application::timer::{ResetOptions, TickOutcome, TimerSnapshot, TimerStateMachine};
use crate::domain::models::{Task, TimerMode};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{persisted_keys, KeyValueStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub date: String,
    pub current_round: u32,
    pub timer: TimerSnapshot,
    pub active_task: Option<Task>,
    pub tasks: Vec<Task>,
}

/// Owns the timer and the scheduler for one store; every mutation goes through here.
pub struct PomodoroSession<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    clock: Clock,
    timer: TimerStateMachine<S>,
    scheduler: RoundScheduler<S>,
}

impl<S> PomodoroSession<S>
where
    S: KeyValueStore,
{
    pub fn load(store: Arc<S>, clock: Clock) -> Self {
        let timer = TimerStateMachine::load(Arc::clone(&store), clock.clone());
        let scheduler = RoundScheduler::load(Arc::clone(&store), clock.clone());
        Self {
            store,
            clock,
            timer,
            scheduler,
        }
    }

    pub fn today(&self) -> String {
        self.clock.today_key()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn timer(&self) -> &TimerStateMachine<S> {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TimerStateMachine<S> {
        &mut self.timer
    }

    pub fn scheduler(&self) -> &RoundScheduler<S> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut RoundScheduler<S> {
        &mut self.scheduler
    }

    /// Focus starts pull the best task for the current round first.
    pub fn start_timer(&mut self) -> bool {
        if self.timer.is_running() {
            return false;
        }
        if self.timer.mode() == TimerMode::Focus {
            let today = self.today();
            self.scheduler.ensure_active_task_for_round(&today);
        }
        self.timer.start()
    }

    pub fn pause_timer(&mut self) -> bool {
        self.timer.pause()
    }

    pub fn reset_timer(&mut self, options: ResetOptions) {
        self.timer.reset(options);
    }

    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.timer.switch_mode(mode);
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.timer.tick()
    }

    /// Renders today's view; re-resolves the active task as every render does.
    pub fn snapshot(&mut self) -> SessionSnapshot {
        let date = self.today();
        let current_round = self.scheduler.get_current_round(&date);
        let active_task = self.scheduler.ensure_active_task_for_round(&date);
        SessionSnapshot {
            tasks: self.scheduler.tasks(&date),
            date,
            current_round,
            timer: self.timer.snapshot(),
            active_task,
        }
    }

    pub fn clear_all_data(&mut self) -> Result<usize, InfraError> {
        let keys = persisted_keys(&*self.store)?;
        let mut removed = 0;
        for key in &keys {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(error) => warn!(key = key.as_str(), %error, "failed to remove persisted key"),
            }
        }
        self.timer.restore_defaults();
        self.scheduler.clear();
        info!(removed, "cleared all persisted data");
        Ok(removed)
    }
}
