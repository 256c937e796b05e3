use crate::application::session::PomodoroSession;
use crate::domain::models::{Task, TimerMode};
use crate::infrastructure::audio::{AlarmSound, AudioPlayer};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::presenter::{Presenter, StatusMessage};
use crate::infrastructure::prompt::ConfirmationPrompt;
use crate::infrastructure::storage::KeyValueStore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const ALARM_LOCKED_STATUS: &str = "Tap Start or Preview to enable alarm audio.";
pub const ALARM_FAILED_STATUS: &str = "Unable to play the alarm sound.";
pub const CARRY_OVER_STATUS: &str = "Carrying this task over to the next round.";
pub const NO_ACTIVE_TASK_STATUS: &str = "Focus complete, but no active task was selected.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "task", rename_all = "camelCase")]
pub enum TaskOutcome {
    Completed(Task),
    CarriedOver(Task),
    NoActiveTask,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub completed_mode: TimerMode,
    pub next_mode: TimerMode,
    /// Only set for focus completions.
    pub task_outcome: Option<TaskOutcome>,
    pub round: u32,
}

/// Runs the fixed side-effect sequence when a phase reaches zero.
pub struct CompletionOrchestrator {
    audio: Arc<dyn AudioPlayer>,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn ConfirmationPrompt>,
    presenter: Arc<dyn Presenter>,
    alarm_sound: AlarmSound,
    in_progress: AtomicBool,
}

struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl CompletionOrchestrator {
    pub fn new(
        audio: Arc<dyn AudioPlayer>,
        notifier: Arc<dyn Notifier>,
        prompt: Arc<dyn ConfirmationPrompt>,
        presenter: Arc<dyn Presenter>,
        alarm_sound: AlarmSound,
    ) -> Self {
        Self {
            audio,
            notifier,
            prompt,
            presenter,
            alarm_sound,
            in_progress: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Returns `None` if another completion is still running.
    pub async fn run<S>(
        &self,
        session: &mut PomodoroSession<S>,
        completed_mode: TimerMode,
    ) -> Option<CompletionReport>
    where
        S: KeyValueStore,
    {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(mode = completed_mode.as_str(), "completion already in progress");
            return None;
        }
        let _guard = InProgressGuard {
            flag: &self.in_progress,
        };

        session.timer_mut().halt_at_zero();
        self.presenter.render_timer(&session.timer().snapshot());

        self.play_alarm().await;

        let report = match completed_mode {
            TimerMode::Focus => self.finish_focus(session).await,
            TimerMode::ShortBreak | TimerMode::LongBreak => self.finish_break(session, completed_mode).await,
        };
        info!(
            completed = report.completed_mode.as_str(),
            next = report.next_mode.as_str(),
            round = report.round,
            "phase completed"
        );
        Some(report)
    }

    async fn play_alarm(&self) {
        if !self.audio.is_unlocked() {
            self.presenter
                .show_status(&StatusMessage::warning(ALARM_LOCKED_STATUS));
            return;
        }
        if let Err(error) = self.audio.play(self.alarm_sound).await {
            warn!(%error, sound = self.alarm_sound.as_str(), "alarm playback failed");
            self.presenter
                .show_status(&StatusMessage::warning(ALARM_FAILED_STATUS));
        }
    }

    async fn finish_focus<S>(&self, session: &mut PomodoroSession<S>) -> CompletionReport
    where
        S: KeyValueStore,
    {
        let today = session.today();
        let round = session.scheduler_mut().get_current_round(&today);
        let active = session.scheduler_mut().active_task(&today);

        let task_outcome = match active {
            Some(task) => {
                let message = format!("Round {round} finished. Did you complete \"{}\"?", task.title);
                let confirmed = self
                    .prompt
                    .confirm(&message, "Yes, finished", "Not yet")
                    .await
                    .unwrap_or_else(|error| {
                        warn!(%error, "confirmation prompt failed");
                        false
                    });
                if confirmed {
                    self.complete_task(session, &today, task)
                } else {
                    self.presenter
                        .show_status(&StatusMessage::warning(CARRY_OVER_STATUS));
                    self.carry_over_task(session, &today, task, round)
                }
            }
            None => {
                self.presenter
                    .show_status(&StatusMessage::warning(NO_ACTIVE_TASK_STATUS));
                TaskOutcome::NoActiveTask
            }
        };

        let next_mode = session.timer_mut().record_focus_completion();
        let next_round = session.scheduler_mut().advance_round(&today);

        session.switch_mode(next_mode);
        session.start_timer();
        let snapshot = session.snapshot();
        self.presenter.render(&snapshot);
        let break_name = break_name(next_mode);
        let status = if task_outcome == TaskOutcome::NoActiveTask {
            StatusMessage::warning(format!(
                "{NO_ACTIVE_TASK_STATUS} Starting a {break_name} break."
            ))
        } else {
            StatusMessage::muted(format!("Focus complete! Starting a {break_name} break."))
        };
        self.presenter.show_status(&status);
        self.dispatch(
            "Focus complete",
            &format!("Starting your {break_name} break."),
        )
        .await;

        CompletionReport {
            completed_mode: TimerMode::Focus,
            next_mode,
            task_outcome: Some(task_outcome),
            round: next_round,
        }
    }

    async fn finish_break<S>(
        &self,
        session: &mut PomodoroSession<S>,
        completed_mode: TimerMode,
    ) -> CompletionReport
    where
        S: KeyValueStore,
    {
        session.switch_mode(TimerMode::Focus);
        session.start_timer();
        let snapshot = session.snapshot();
        self.presenter.render(&snapshot);
        self.presenter.show_status(&StatusMessage::muted(
            "Break finished. Starting the next focus session.",
        ));
        self.dispatch("Break finished", "Time to start your next focus session.")
            .await;

        CompletionReport {
            completed_mode,
            next_mode: TimerMode::Focus,
            task_outcome: None,
            round: snapshot.current_round,
        }
    }

    fn complete_task<S>(&self, session: &mut PomodoroSession<S>, date: &str, task: Task) -> TaskOutcome
    where
        S: KeyValueStore,
    {
        let scheduler = session.scheduler_mut();
        let result = scheduler
            .increment_completion(date, &task.id, 1)
            .and_then(|_| scheduler.set_done(date, &task.id, true));
        match result {
            Ok(updated) => TaskOutcome::Completed(updated),
            Err(error) => {
                warn!(task_id = task.id.as_str(), %error, "failed to record task completion");
                self.presenter
                    .show_status(&StatusMessage::error(error.to_string()));
                TaskOutcome::Completed(task)
            }
        }
    }

    fn carry_over_task<S>(
        &self,
        session: &mut PomodoroSession<S>,
        date: &str,
        task: Task,
        round: u32,
    ) -> TaskOutcome
    where
        S: KeyValueStore,
    {
        match session
            .scheduler_mut()
            .update_task_round(date, &task.id, round.saturating_add(1))
        {
            Ok(updated) => TaskOutcome::CarriedOver(updated),
            Err(error) => {
                warn!(task_id = task.id.as_str(), %error, "failed to carry task over");
                self.presenter
                    .show_status(&StatusMessage::error(error.to_string()));
                TaskOutcome::CarriedOver(task)
            }
        }
    }

    async fn dispatch(&self, title: &str, body: &str) {
        if let Err(error) = self.notifier.notify(title, body).await {
            warn!(%error, title, "notification failed");
        }
    }
}

fn break_name(mode: TimerMode) -> &'static str {
    match mode {
        TimerMode::LongBreak => "long",
        TimerMode::ShortBreak | TimerMode::Focus => "short",
    }
}
