//! Task listing, agent summaries and cancellation

use colored::*;
use tessera_core::tasks::{
    ActivityLogEntry, AgentRollup, AgentStatus, StatusFilter, StepStatus, Task, TaskStatus, TaskStore,
};

use crate::app::Engine;
use crate::console::CliConsole;

pub async fn list(engine: &Engine, console: &CliConsole, status: &str, tree: bool) -> anyhow::Result<()> {
    let filter: StatusFilter = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let sync = engine.task_sync();
    sync.refresh().await?;

    let store = sync.store();
    console.print_header(&format!("Tasks ({filter})"));
    if tree {
        print_tree(store, filter);
    } else {
        let tasks = store.filtered(filter);
        if tasks.is_empty() {
            println!("  {}", "No tasks".dimmed());
        }
        for task in &tasks {
            println!("{}", task_line(task, 0));
        }
    }
    print_totals(store);
    Ok(())
}

pub async fn agents(engine: &Engine, console: &CliConsole) -> anyhow::Result<()> {
    let sync = engine.task_sync();
    sync.refresh().await?;

    console.print_header("Agents");
    print_rollups(sync.store());
    Ok(())
}

pub async fn logs(engine: &Engine, console: &CliConsole, task_id: &str) -> anyhow::Result<()> {
    let sync = engine.task_sync();
    sync.refresh().await?;
    let store = sync.store();
    let task = store
        .get(task_id)
        .ok_or_else(|| anyhow::anyhow!("no task with id {task_id}"))?;

    // No-op when the refresh already merged the log of a running task.
    sync.expand(task_id).await?;

    console.print_header(&format!("{} [{}]", task.label(), task.status));
    let timeline = store.timeline(task_id);
    if timeline.is_empty() {
        println!("  {}", "No steps recorded".dimmed());
    }
    for entry in &timeline {
        println!("{}", step_line(entry, 1));
    }
    if let Some(error) = &task.error {
        console.error(error);
    }
    Ok(())
}

pub async fn cancel(engine: &Engine, console: &CliConsole, task_id: &str) -> anyhow::Result<()> {
    engine.task_sync().cancel(task_id).await?;
    console.success(&format!("Cancellation requested for {task_id}"));
    Ok(())
}

pub async fn stop_all(engine: &Engine, console: &CliConsole) -> anyhow::Result<()> {
    let sync = engine.task_sync();
    sync.refresh().await?;

    let report = sync.stop_all().await;
    if report.requested.is_empty() && report.failed.is_empty() {
        println!("Nothing to stop.");
        return Ok(());
    }
    if !report.requested.is_empty() {
        console.success(&format!("Cancellation requested for {} task(s)", report.requested.len()));
    }
    for (task_id, error) in &report.failed {
        console.warn(&format!("{task_id}: {error}"));
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} cancellation(s) were not delivered", report.failed.len())
    }
}

/// Top-level tasks with their children indented beneath
pub(crate) fn print_tree(store: &TaskStore, filter: StatusFilter) {
    let roots = store.top_level(filter);
    if roots.is_empty() {
        println!("  {}", "No tasks".dimmed());
    }
    for root in &roots {
        print_subtree(store, root, 0);
    }
}

fn print_subtree(store: &TaskStore, task: &Task, depth: usize) {
    println!("{}", task_line(task, depth));
    if store.is_expanded(&task.id) {
        for entry in store.timeline(&task.id) {
            println!("{}", step_line(&entry, depth + 2));
        }
    }
    for child in store.children_of(&task.id) {
        print_subtree(store, &child, depth + 1);
    }
}

pub(crate) fn print_rollups(store: &TaskStore) {
    let rollups = store.rollups();
    if rollups.is_empty() {
        println!("  {}", "No agents".dimmed());
    }
    for rollup in rollups.values() {
        println!("{}", rollup_line(rollup));
    }
}

pub(crate) fn print_totals(store: &TaskStore) {
    let totals = store.totals();
    println!(
        "\n{} tasks · ${:.4} · {} tokens in · {} tokens out",
        totals.tasks, totals.cost_usd, totals.tokens_in, totals.tokens_out
    );
}

fn task_line(task: &Task, depth: usize) -> String {
    let mut line = format!(
        "{}{} {:<10} {}",
        "  ".repeat(depth + 1),
        status_badge(task.status),
        task.agent.as_deref().unwrap_or("-").cyan(),
        task.label()
    );
    if task.is_recurring() {
        line.push_str(&format!(" {}", "(recurring)".dimmed()));
    }
    line.push_str(&format!(" {}", task.id.dimmed()));
    line
}

fn step_line(entry: &ActivityLogEntry, depth: usize) -> String {
    let symbol = match entry.status {
        StepStatus::Started => "…".yellow(),
        StepStatus::Completed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Skipped => "-".dimmed(),
    };
    let mut line = format!("{}{} {}", "  ".repeat(depth + 1), symbol, entry.step);
    if let Some(ms) = entry.duration_ms {
        line.push_str(&format!(" {}", format!("{ms}ms").dimmed()));
    }
    if let Some(count) = entry.result_count() {
        line.push_str(&format!(" ({count} results)"));
    }
    if let Some(error) = entry.error() {
        line.push_str(&format!(" {}", error.red()));
    }
    line
}

fn rollup_line(rollup: &AgentRollup) -> String {
    let status = match rollup.status {
        AgentStatus::Idle => rollup.status.as_str().dimmed(),
        AgentStatus::Working => rollup.status.as_str().yellow(),
        AgentStatus::Done => rollup.status.as_str().green(),
        AgentStatus::Failed => rollup.status.as_str().red(),
    };
    let detail = rollup
        .current_task
        .as_deref()
        .or(rollup.last_result.as_deref())
        .unwrap_or("");
    format!(
        "  {:<12} {:<8} {:>3} done  {}",
        rollup.agent.bold(),
        status,
        rollup.task_count,
        detail
    )
}

fn status_badge(status: TaskStatus) -> ColoredString {
    let label = format!("{:<9}", status.as_str());
    match status {
        TaskStatus::Pending | TaskStatus::Queued => label.dimmed(),
        TaskStatus::Running => label.yellow(),
        TaskStatus::Completed => label.green(),
        TaskStatus::Failed => label.red(),
        TaskStatus::Cancelled => label.magenta(),
    }
}
