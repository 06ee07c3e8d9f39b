//! Live task view

use std::sync::Arc;
use std::time::Duration;

use colored::*;
use tessera_core::tasks::{StatusFilter, TaskSync};
use tokio_util::sync::CancellationToken;

use crate::app::Engine;
use crate::commands::report_event;
use crate::commands::tasks::{print_rollups, print_totals, print_tree};
use crate::console::CliConsole;

/// Poll until Ctrl+C, redrawing whenever the store changes
pub async fn run(engine: &Engine, console: &CliConsole, interval: Option<u64>) -> anyhow::Result<()> {
    let poll_interval = interval
        .map(Duration::from_secs)
        .unwrap_or(engine.config.tasks.poll_interval);
    if poll_interval.is_zero() {
        anyhow::bail!("poll interval must be at least one second");
    }

    let sync = Arc::new(engine.task_sync_every(poll_interval));
    let mut changes = sync.store().subscribe();
    let mut events = engine.events.subscribe();
    let cancel = CancellationToken::new();

    let poller = tokio::spawn({
        let sync = sync.clone();
        let cancel = cancel.clone();
        async move { sync.run(cancel).await }
    });

    // Failed refreshes keep the old snapshot and do not bump the version.
    let mut shown_error = None;
    let mut error_check = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw(&sync, console);
            }
            Ok(event) = events.recv() => report_event(console, event),
            _ = error_check.tick() => {
                let error = sync.store().last_error();
                if error != shown_error {
                    if let Some(message) = &error {
                        console.warn(message);
                    }
                    shown_error = error;
                }
            }
        }
    }

    cancel.cancel();
    poller.await?;
    Ok(())
}

fn redraw(sync: &TaskSync, console: &CliConsole) {
    let store = sync.store();
    print!("\x1B[2J\x1B[H");
    console.print_header("Agents");
    print_rollups(store);
    console.print_header("Tasks");
    print_tree(store, StatusFilter::All);
    print_totals(store);
    if let Some(error) = store.last_error() {
        console.warn(&error);
    }
    println!("\n{}", "Ctrl+C to exit".dimmed());
}
