//! Surfaces shared with the host environment.
//!
//! The supervisor never talks to a terminal or an editor directly. It reports
//! through a [`Notifier`] (log lines, a user-facing warning, the status
//! indicator) and receives [`HostCommand`]s from whoever embeds it.

mod commands;
mod notifier;

pub use commands::HostCommand;
pub use notifier::{LogLevel, Notifier, OutputBuffer, TracingNotifier};
