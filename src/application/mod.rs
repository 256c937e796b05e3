pub mod bootstrap;
pub mod clock;
pub mod commands;
pub mod completion;
pub mod round_scheduler;
pub mod session;
pub mod summary;
pub mod terminal;
pub mod timer;
