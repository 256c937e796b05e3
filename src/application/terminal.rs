use crate::application::commands::{
    clear_all_data_impl, delete_task_impl, get_state_impl, get_timer_config_impl,
    get_today_summary_impl, get_week_summary_impl, increment_task_completion_impl, list_tasks_impl,
    move_task_to_next_round_impl, pause_timer_impl, preview_alarm_impl, reset_timer_config_impl,
    reset_timer_impl, set_active_task_impl, start_timer_impl, switch_mode_impl, tick_impl,
    toggle_task_done_impl, update_timer_config_impl, upsert_task_impl, AppState,
};
use crate::application::summary::{DaySummary, TodaySummary};
use crate::domain::models::{TaskDraft, TimerConfig};
use crate::infrastructure::audio::AlarmSound;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::presenter::StatusMessage;
use crate::infrastructure::prompt::TerminalPrompt;
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const TICK_PERIOD: Duration = Duration::from_secs(1);

const DELETE_TASK_QUESTION: &str = "Delete this task?";
const CLEAR_DATA_QUESTION: &str = "This will erase all locally stored data. Continue?";

const HELP: &str = "\
commands:
  start | pause | reset [mode] [keep] | mode <focus|short|long>
  add <title> [--planned <n>] [--round <n>] [--desc <text>]
  edit <id> <title> | describe <id> [text] | plan <id> <planned> | round <id> <n>
  done <id> | activate <id> | next <id> | count <id> <delta> | delete <id>
  tasks | status | today | week
  settings | settings <focus> <short> <long> <sessions> | settings reset
  preview | clear | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Start,
    Pause,
    Reset { mode: Option<String>, reset_streak: bool },
    Mode(String),
    Add(TaskDraft),
    Edit { task_id: String, title: String },
    Describe { task_id: String, description: String },
    Plan { task_id: String, planned: u32 },
    Round { task_id: String, round: u32 },
    Done(String),
    Activate(String),
    Next(String),
    Count { task_id: String, delta: i64 },
    Delete(String),
    Tasks,
    Status,
    Today,
    Week,
    ShowSettings,
    Settings(TimerConfig),
    SettingsReset,
    Preview,
    Clear,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<TerminalCommand, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));
    let args = rest.split_whitespace().collect::<Vec<_>>();

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" | "s" => TerminalCommand::Start,
        "pause" | "p" => TerminalCommand::Pause,
        "reset" => TerminalCommand::Reset {
            mode: args.iter().find(|arg| **arg != "keep").map(|arg| arg.to_string()),
            reset_streak: !args.contains(&"keep"),
        },
        "mode" => TerminalCommand::Mode(required(&args, 0, "mode")?.to_string()),
        "add" => TerminalCommand::Add(parse_task_form(rest)?),
        "edit" => {
            let (task_id, title) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: edit <id> <title>".to_string())?;
            TerminalCommand::Edit {
                task_id: task_id.to_string(),
                title: non_empty(title, "title")?,
            }
        }
        "describe" => {
            let (task_id, description) = rest
                .split_once(char::is_whitespace)
                .map(|(task_id, description)| (task_id, description.trim()))
                .unwrap_or((rest, ""));
            TerminalCommand::Describe {
                task_id: non_empty(task_id, "task id")?,
                description: description.to_string(),
            }
        }
        "plan" => TerminalCommand::Plan {
            task_id: required(&args, 0, "task id")?.to_string(),
            planned: number(required(&args, 1, "planned")?)?,
        },
        "round" => TerminalCommand::Round {
            task_id: required(&args, 0, "task id")?.to_string(),
            round: number(required(&args, 1, "round")?)?,
        },
        "done" => TerminalCommand::Done(required(&args, 0, "task id")?.to_string()),
        "activate" => TerminalCommand::Activate(required(&args, 0, "task id")?.to_string()),
        "next" => TerminalCommand::Next(required(&args, 0, "task id")?.to_string()),
        "count" => TerminalCommand::Count {
            task_id: required(&args, 0, "task id")?.to_string(),
            delta: number(args.get(1).copied().unwrap_or("1"))?,
        },
        "delete" | "rm" => TerminalCommand::Delete(required(&args, 0, "task id")?.to_string()),
        "tasks" => TerminalCommand::Tasks,
        "status" | "" => TerminalCommand::Status,
        "today" => TerminalCommand::Today,
        "week" => TerminalCommand::Week,
        "settings" if args.is_empty() => TerminalCommand::ShowSettings,
        "settings" if args.first() == Some(&"reset") => TerminalCommand::SettingsReset,
        "settings" => {
            if args.len() != 4 {
                return Err("usage: settings <focus> <short> <long> <sessions>".to_string());
            }
            TerminalCommand::Settings(TimerConfig {
                focus_minutes: number(args[0])?,
                short_break_minutes: number(args[1])?,
                long_break_minutes: number(args[2])?,
                sessions_before_long_break: number(args[3])?,
            })
        }
        "preview" => TerminalCommand::Preview,
        "clear" => TerminalCommand::Clear,
        "help" | "?" => TerminalCommand::Help,
        "quit" | "exit" | "q" => TerminalCommand::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(command)
}

/// `<title> [--planned <n>] [--round <n>] [--desc <text>]`
fn parse_task_form(rest: &str) -> Result<TaskDraft, String> {
    let mut segments = rest.split(" --");
    let title = non_empty(segments.next().unwrap_or_default(), "title")?;
    if title.starts_with("--") {
        return Err("missing title".to_string());
    }

    let mut draft = TaskDraft {
        title,
        ..TaskDraft::default()
    };
    for segment in segments {
        let (option, value) = segment
            .split_once(char::is_whitespace)
            .map(|(option, value)| (option, value.trim()))
            .unwrap_or((segment.trim(), ""));
        match option {
            "planned" => draft.planned = Some(number(value)?),
            "round" => draft.assigned_round = Some(number(value)?),
            "desc" => draft.description = Some(value.to_string()),
            other => return Err(format!("unknown option: --{other}")),
        }
    }
    Ok(draft)
}

fn required<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing {name}"))
}

fn non_empty(value: &str, name: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("missing {name}"));
    }
    Ok(value.to_string())
}

fn number<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("not a number: {value}"))
}

/// Reads input on its own task so a pending confirmation can be answered while
/// the completion sequence holds the session.
fn spawn_line_reader<R>(input: R, prompt: Arc<TerminalPrompt>) -> mpsc::Receiver<String>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) if error.kind() == ErrorKind::InvalidData => {
                    warn!(%error, "skipping undecodable input line");
                    continue;
                }
                Err(error) => {
                    warn!(%error, "terminal input failed");
                    break;
                }
            };
            if prompt.answer(&line) {
                continue;
            }
            if sender.send(line).await.is_err() {
                break;
            }
        }
        prompt.dismiss();
    });
    receiver
}

pub async fn run_terminal(state: Arc<AppState>, prompt: Arc<TerminalPrompt>) -> Result<(), InfraError> {
    let mut lines = spawn_line_reader(BufReader::new(tokio::io::stdin()), prompt);
    let mut ticker = tokio::time::interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    println!("{HELP}");
    render_state(&state).await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(error) = tick_impl(&state).await {
                    state.command_error("tick", &error);
                }
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(TerminalCommand::Quit) => break,
                    Ok(command) => execute(&state, command).await,
                    Err(message) => state.presenter().show_status(&StatusMessage::warning(message)),
                }
            }
        }
    }

    info!("terminal session finished");
    Ok(())
}

async fn execute(state: &AppState, command: TerminalCommand) {
    debug!(?command, "terminal command");
    let (name, result) = match command {
        TerminalCommand::Start => ("start_timer", start_timer_impl(state).await.map(drop)),
        TerminalCommand::Pause => ("pause_timer", pause_timer_impl(state).await.map(drop)),
        TerminalCommand::Reset { mode, reset_streak } => (
            "reset_timer",
            reset_timer_impl(state, mode, reset_streak).await.map(drop),
        ),
        TerminalCommand::Mode(mode) => ("switch_mode", switch_mode_impl(state, mode).await.map(drop)),
        TerminalCommand::Add(draft) => (
            "upsert_task",
            upsert_task_impl(state, draft).await.map(drop),
        ),
        TerminalCommand::Edit { task_id, title } => (
            "upsert_task",
            edit_task(state, &task_id, |draft| draft.title = title).await,
        ),
        TerminalCommand::Describe {
            task_id,
            description,
        } => (
            "upsert_task",
            edit_task(state, &task_id, |draft| draft.description = Some(description)).await,
        ),
        TerminalCommand::Plan { task_id, planned } => (
            "upsert_task",
            edit_task(state, &task_id, |draft| draft.planned = Some(planned)).await,
        ),
        TerminalCommand::Round { task_id, round } => (
            "upsert_task",
            edit_task(state, &task_id, |draft| draft.assigned_round = Some(round)).await,
        ),
        TerminalCommand::Done(task_id) => (
            "toggle_task_done",
            toggle_task_done_impl(state, task_id).await.map(drop),
        ),
        TerminalCommand::Activate(task_id) => (
            "set_active_task",
            set_active_task_impl(state, task_id).await.map(drop),
        ),
        TerminalCommand::Next(task_id) => (
            "move_task_to_next_round",
            move_task_to_next_round_impl(state, task_id).await.map(drop),
        ),
        TerminalCommand::Count { task_id, delta } => (
            "increment_task_completion",
            increment_task_completion_impl(state, task_id, delta)
                .await
                .map(drop),
        ),
        TerminalCommand::Delete(task_id) => {
            if !state.confirm(DELETE_TASK_QUESTION, "Delete", "Cancel").await {
                return;
            }
            let result = delete_task_impl(state, task_id.clone()).await.and_then(|removed| {
                if removed {
                    Ok(())
                } else {
                    Err(InfraError::InvalidInput(format!("task not found: {task_id}")))
                }
            });
            ("delete_task", result)
        }
        TerminalCommand::Tasks | TerminalCommand::Status => ("get_state", Ok(())),
        TerminalCommand::Today => match get_today_summary_impl(state).await {
            Ok(summary) => {
                print_today(&summary);
                return;
            }
            Err(error) => ("get_today_summary", Err(error)),
        },
        TerminalCommand::Week => match get_week_summary_impl(state).await {
            Ok(days) => {
                print_week(&days);
                return;
            }
            Err(error) => ("get_week_summary", Err(error)),
        },
        TerminalCommand::ShowSettings => match get_timer_config_impl(state).await {
            Ok(config) => {
                print_settings(&config, state.alarm_sound());
                return;
            }
            Err(error) => ("get_timer_config", Err(error)),
        },
        TerminalCommand::Settings(config) => (
            "update_timer_config",
            update_timer_config_impl(state, config).await.map(drop),
        ),
        TerminalCommand::SettingsReset => (
            "reset_timer_config",
            reset_timer_config_impl(state).await.map(drop),
        ),
        TerminalCommand::Preview => ("preview_alarm", preview_alarm_impl(state).await),
        TerminalCommand::Clear => {
            if !state.confirm(CLEAR_DATA_QUESTION, "Confirm", "Cancel").await {
                return;
            }
            ("clear_all_data", clear_all_data_impl(state).await.map(drop))
        }
        TerminalCommand::Help => {
            println!("{HELP}");
            return;
        }
        TerminalCommand::Quit => return,
    };

    match result {
        Ok(()) => render_state(state).await,
        Err(error) => {
            let message = state.command_error(name, &error);
            let status = match error {
                InfraError::InvalidInput(reason) => StatusMessage::warning(reason),
                _ => StatusMessage::error(message),
            };
            state.presenter().show_status(&status);
        }
    }
}

/// Resubmits the whole task form so fields not being edited keep their values.
async fn edit_task(
    state: &AppState,
    task_id: &str,
    apply: impl FnOnce(&mut TaskDraft),
) -> Result<(), InfraError> {
    let task = list_tasks_impl(state)
        .await?
        .into_iter()
        .find(|task| task.id == task_id.trim())
        .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {task_id}")))?;
    let mut draft = TaskDraft {
        id: Some(task.id),
        title: task.title,
        description: Some(task.description),
        planned: Some(task.planned),
        assigned_round: Some(task.assigned_round),
    };
    apply(&mut draft);
    upsert_task_impl(state, draft).await.map(drop)
}

async fn render_state(state: &AppState) {
    match get_state_impl(state).await {
        Ok(snapshot) => state.presenter().render(&snapshot),
        Err(error) => {
            state.command_error("get_state", &error);
        }
    }
}

fn print_today(summary: &TodaySummary) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(
        stdout,
        "\n{}  round {}  completed {}/{} planned",
        summary.date, summary.current_round, summary.completed_total, summary.planned_total
    );
    for task in &summary.tasks {
        let active = summary.active_task_id.as_deref() == Some(task.id.as_str());
        let _ = writeln!(
            stdout,
            "  {}{} {}  round {}  {}/{}{}",
            if active { '>' } else { ' ' },
            if task.done { 'x' } else { ' ' },
            task.title,
            task.assigned_round,
            task.completed,
            task.planned,
            if task.done { "  done" } else { "" }
        );
    }
}

fn print_settings(config: &TimerConfig, alarm_sound: AlarmSound) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(
        stdout,
        "\nfocus {}m  short break {}m  long break {}m  long break every {} sessions  alarm {}",
        config.focus_minutes,
        config.short_break_minutes,
        config.long_break_minutes,
        config.sessions_before_long_break,
        alarm_sound.as_str()
    );
}

fn print_week(days: &[DaySummary]) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout);
    for day in days {
        let _ = writeln!(
            stdout,
            "  {}  planned {:>3}  completed {:>3}",
            day.date, day.planned, day.completed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::test_support::ManualClock;
    use crate::application::commands::test_support::{quiet_collaborators, TempWorkspace};
    use crate::application::commands::Collaborators;
    use crate::application::session::SessionSnapshot;
    use crate::application::timer::TimerSnapshot;
    use crate::infrastructure::presenter::{Presenter, StatusTone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StatusLog {
        statuses: Mutex<Vec<StatusMessage>>,
    }

    impl StatusLog {
        fn last(&self) -> Option<StatusMessage> {
            self.statuses.lock().expect("status log").last().cloned()
        }
    }

    impl Presenter for StatusLog {
        fn render_timer(&self, _timer: &TimerSnapshot) {}

        fn render(&self, _snapshot: &SessionSnapshot) {}

        fn show_status(&self, status: &StatusMessage) {
            self.statuses.lock().expect("status log").push(status.clone());
        }
    }

    fn add(title: &str) -> TerminalCommand {
        TerminalCommand::Add(TaskDraft {
            title: title.to_string(),
            ..TaskDraft::default()
        })
    }

    #[test]
    fn parses_timer_commands() {
        assert_eq!(parse_command(" start "), Ok(TerminalCommand::Start));
        assert_eq!(parse_command(""), Ok(TerminalCommand::Status));
        assert_eq!(
            parse_command("reset"),
            Ok(TerminalCommand::Reset {
                mode: None,
                reset_streak: true
            })
        );
        assert_eq!(
            parse_command("reset long keep"),
            Ok(TerminalCommand::Reset {
                mode: Some("long".to_string()),
                reset_streak: false
            })
        );
        assert!(parse_command("mode").is_err());
    }

    #[test]
    fn parses_task_commands_keeping_title_spacing() {
        assert_eq!(parse_command("add  Write the  report "), Ok(add("Write the  report")));
        assert_eq!(
            parse_command("edit task-1 New title"),
            Ok(TerminalCommand::Edit {
                task_id: "task-1".to_string(),
                title: "New title".to_string()
            })
        );
        assert_eq!(
            parse_command("count task-1"),
            Ok(TerminalCommand::Count {
                task_id: "task-1".to_string(),
                delta: 1
            })
        );
        assert_eq!(
            parse_command("count task-1 -2"),
            Ok(TerminalCommand::Count {
                task_id: "task-1".to_string(),
                delta: -2
            })
        );
        assert!(parse_command("add   ").is_err());
        assert!(parse_command("plan task-1 many").is_err());
    }

    #[test]
    fn parses_task_form_options() {
        assert_eq!(
            parse_command("add Write report --planned 3 --round 2 --desc Draft the  intro"),
            Ok(TerminalCommand::Add(TaskDraft {
                title: "Write report".to_string(),
                description: Some("Draft the  intro".to_string()),
                planned: Some(3),
                assigned_round: Some(2),
                ..TaskDraft::default()
            }))
        );
        assert!(parse_command("add --planned 2").is_err());
        assert!(parse_command("add Report --round soon").is_err());
        assert!(parse_command("add Report --colour red").is_err());
    }

    #[test]
    fn parses_describe_and_round() {
        assert_eq!(
            parse_command("describe task-1 Outline, then  draft"),
            Ok(TerminalCommand::Describe {
                task_id: "task-1".to_string(),
                description: "Outline, then  draft".to_string()
            })
        );
        assert_eq!(
            parse_command("describe task-1"),
            Ok(TerminalCommand::Describe {
                task_id: "task-1".to_string(),
                description: String::new()
            })
        );
        assert_eq!(
            parse_command("round task-1 4"),
            Ok(TerminalCommand::Round {
                task_id: "task-1".to_string(),
                round: 4
            })
        );
        assert!(parse_command("describe").is_err());
        assert!(parse_command("round task-1").is_err());
    }

    #[test]
    fn parses_settings() {
        assert_eq!(
            parse_command("settings 50 10 30 3"),
            Ok(TerminalCommand::Settings(TimerConfig {
                focus_minutes: 50,
                short_break_minutes: 10,
                long_break_minutes: 30,
                sessions_before_long_break: 3,
            }))
        );
        assert_eq!(parse_command("settings reset"), Ok(TerminalCommand::SettingsReset));
        assert_eq!(parse_command("settings"), Ok(TerminalCommand::ShowSettings));
        assert!(parse_command("settings 50 10").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[tokio::test]
    async fn reader_skips_undecodable_lines() {
        let input: &'static [u8] = b"status\n\xff\xfe\nquit\n";
        let mut lines = spawn_line_reader(input, Arc::new(TerminalPrompt::default()));

        assert_eq!(lines.recv().await.as_deref(), Some("status"));
        assert_eq!(lines.recv().await.as_deref(), Some("quit"));
        assert_eq!(lines.recv().await, None);
    }

    #[tokio::test]
    async fn declined_confirmation_keeps_tasks_and_data() {
        let workspace = TempWorkspace::new();
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let state = workspace.app_state(&manual, false);
        execute(&state, add("Write report")).await;
        let task_id = list_tasks_impl(&state).await.expect("list")[0].id.clone();

        execute(&state, TerminalCommand::Delete(task_id.clone())).await;
        execute(&state, TerminalCommand::Clear).await;
        let tasks = list_tasks_impl(&state).await.expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, task_id);
        drop(state);

        let state = workspace.app_state(&manual, true);
        execute(&state, TerminalCommand::Delete(task_id)).await;
        assert!(list_tasks_impl(&state).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn rejected_input_is_shown_as_a_warning() {
        let workspace = TempWorkspace::new();
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let statuses = Arc::new(StatusLog::default());
        let state = workspace.app_state_with(
            &manual,
            Collaborators {
                presenter: Arc::clone(&statuses) as Arc<dyn Presenter>,
                ..quiet_collaborators(true)
            },
        );

        execute(&state, add("   ")).await;
        assert_eq!(
            statuses.last(),
            Some(StatusMessage::warning("Please add a title for your task."))
        );

        let out_of_range = TimerConfig {
            focus_minutes: 500,
            ..TimerConfig::default()
        };
        execute(&state, TerminalCommand::Settings(out_of_range)).await;
        assert_eq!(statuses.last().map(|status| status.tone), Some(StatusTone::Warning));
    }

    #[tokio::test]
    async fn task_form_commands_fill_every_field() {
        let workspace = TempWorkspace::new();
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let state = workspace.app_state(&manual, true);
        let command = parse_command("add Write report --planned 2 --round 3").expect("parse");
        execute(&state, command).await;
        let task = list_tasks_impl(&state).await.expect("list")[0].clone();
        assert_eq!(task.assigned_round, 3);
        assert_eq!(task.planned, 2);

        execute(
            &state,
            TerminalCommand::Describe {
                task_id: task.id.clone(),
                description: "Outline first".to_string(),
            },
        )
        .await;
        execute(
            &state,
            TerminalCommand::Round {
                task_id: task.id.clone(),
                round: 1,
            },
        )
        .await;

        let task = list_tasks_impl(&state).await.expect("list")[0].clone();
        assert_eq!(task.description, "Outline first");
        assert_eq!(task.assigned_round, 1);
        assert_eq!(task.planned, 2);
        assert_eq!(task.title, "Write report");
    }
}
