pub mod commands;
pub mod context;
pub mod notifier;
pub mod session;
