use crate::application::session::SessionSnapshot;
use crate::application::timer::TimerSnapshot;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Muted,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub tone: StatusTone,
}

impl StatusMessage {
    pub fn muted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: StatusTone::Muted,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: StatusTone::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: StatusTone::Error,
        }
    }
}

pub trait Presenter: Send + Sync {
    fn render_timer(&self, timer: &TimerSnapshot);

    fn render(&self, snapshot: &SessionSnapshot);

    fn show_status(&self, status: &StatusMessage);
}

#[derive(Debug, Default)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    fn timer_line(timer: &TimerSnapshot) -> String {
        let state = if timer.is_running { "running" } else { "paused" };
        format!(
            "{} {} ({state}, streak {}/{})",
            timer.mode_label, timer.display, timer.focus_streak, timer.sessions_before_long_break
        )
    }
}

impl Presenter for TerminalPresenter {
    fn render_timer(&self, timer: &TimerSnapshot) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{}    ", Self::timer_line(timer));
        let _ = stdout.flush();
    }

    fn render(&self, snapshot: &SessionSnapshot) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout);
        let _ = writeln!(
            stdout,
            "{}  round {}  {}",
            snapshot.date,
            snapshot.current_round,
            Self::timer_line(&snapshot.timer)
        );
        if snapshot.tasks.is_empty() {
            let _ = writeln!(stdout, "  (no tasks for today)");
        }
        let active_id = snapshot.active_task.as_ref().map(|task| task.id.as_str());
        for task in &snapshot.tasks {
            let marker = if Some(task.id.as_str()) == active_id {
                '>'
            } else if task.done {
                'x'
            } else {
                ' '
            };
            let _ = writeln!(
                stdout,
                " {marker} [{}] {}  round {}  {}/{}",
                task.id, task.title, task.assigned_round, task.completed, task.planned
            );
        }
        let _ = stdout.flush();
    }

    fn show_status(&self, status: &StatusMessage) {
        let prefix = match status.tone {
            StatusTone::Muted => "",
            StatusTone::Warning => "warning: ",
            StatusTone::Error => "error: ",
        };
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "\n{prefix}{}", status.text);
        let _ = stdout.flush();
    }
}
