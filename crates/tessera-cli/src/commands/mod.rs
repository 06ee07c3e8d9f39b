//! CLI commands

pub mod chat;
pub mod tasks;
pub mod watch;

use tessera_core::events::Event;

use crate::console::CliConsole;

/// Surface retry and session notices; everything else only in verbose mode
pub(crate) fn report_event(console: &CliConsole, event: Event) {
    match event {
        Event::RetryScheduled {
            operation,
            next_attempt,
            max_attempts,
            delay,
            ..
        } => console.warn(&format!(
            "{operation}: retrying ({next_attempt}/{max_attempts}) in {:.1}s",
            delay.as_secs_f64()
        )),
        Event::SessionExpired { reason } => console.error(&reason),
        other => console.info(&format!("{other:?}")),
    }
}
