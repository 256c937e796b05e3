use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "pomodoro.log";

/// Logs go to `logs/pomodoro.log` so they do not interleave with the terminal UI.
/// `RUST_LOG` is honored only when debug logging is enabled in `app.json`.
pub fn init(debug: bool, logs_dir: &Path) {
    let level = if debug { "debug" } else { "info" };
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);
    let _ = match file {
        Ok(file) => builder.with_writer(Mutex::new(file)).try_init(),
        Err(_) => builder.with_writer(std::io::stderr).try_init(),
    };
}
