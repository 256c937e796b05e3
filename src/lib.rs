pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::{bootstrap_workspace, resolve_workspace_root};
use application::commands::{AppState, Collaborators};
use application::terminal::run_terminal;
use infrastructure::audio::TerminalBellPlayer;
use infrastructure::error::InfraError;
use infrastructure::logging;
use infrastructure::notifier::TerminalNotifier;
use infrastructure::presenter::TerminalPresenter;
use infrastructure::prompt::TerminalPrompt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// Stdin is read on a blocking thread that only returns on the next line.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

pub fn run() -> Result<(), InfraError> {
    let workspace_root = resolve_workspace_root()?;
    let bootstrap = bootstrap_workspace(&workspace_root)?;
    logging::init(bootstrap.config.debug_logging, &bootstrap.logs_dir);

    let prompt = Arc::new(TerminalPrompt::default());
    let collaborators = Collaborators {
        audio: Arc::new(TerminalBellPlayer::default()),
        notifier: Arc::new(TerminalNotifier::new(bootstrap.config.notifications_enabled)),
        prompt: prompt.clone(),
        presenter: Arc::new(TerminalPresenter),
    };
    let state = Arc::new(AppState::new(&bootstrap, collaborators)?);
    info!(
        workspace = %state.workspace_root().display(),
        database = %state.database_path().display(),
        timezone = bootstrap.config.timezone.as_str(),
        "workspace ready"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_terminal(state, prompt));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
