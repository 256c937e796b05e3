pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod presenter;
pub mod prompt;
pub mod storage;
