//! One-shot chat command

use std::io::Write;
use std::time::Duration;

use colored::*;
use tessera_core::chat::{ChatSession, ExchangeOutcome, InputOrigin};
use tessera_core::error::{TesseraResult, UserFriendlyError};
use tessera_core::events::Event;
use tessera_core::stream::SourceRef;
use tokio::sync::broadcast;

use crate::app::Engine;
use crate::commands::report_event;
use crate::console::CliConsole;

const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// Send `message` and print the reply as it streams in
pub async fn run(engine: &Engine, console: &CliConsole, message: &str) -> anyhow::Result<()> {
    let session = engine.chat_session();
    let events = engine.events.subscribe();

    let result = stream_reply(&session, message, events, console).await;

    match result {
        Ok(outcome) => {
            if let Some(reply) = session.last_reply() {
                print_sources(&reply.sources.unwrap_or_default());
            }
            if outcome == ExchangeOutcome::Interrupted {
                console.warn("The reply is incomplete.");
            }
            Ok(())
        }
        Err(error) => {
            let notice = session
                .last_reply()
                .and_then(|reply| reply.notice)
                .unwrap_or_else(|| UserFriendlyError::from(&error).title);
            Err(anyhow::Error::new(error).context(notice))
        }
    }
}

/// Drive one exchange, echoing new content and honouring Ctrl+C
async fn stream_reply(
    session: &ChatSession,
    message: &str,
    mut events: broadcast::Receiver<Event>,
    console: &CliConsole,
) -> TesseraResult<ExchangeOutcome> {
    let send = session.send(message, InputOrigin::Typed);
    tokio::pin!(send);

    let mut printed = 0;
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let exchange = loop {
        tokio::select! {
            result = &mut send => break result?,
            _ = redraw.tick() => print_new_content(session, &mut printed),
            Ok(event) = events.recv() => report_event(console, event),
            _ = tokio::signal::ctrl_c() => session.cancel_current(),
        }
    };

    print_new_content(session, &mut printed);
    if printed > 0 {
        println!();
    }
    Ok(exchange.outcome)
}

fn print_new_content(session: &ChatSession, printed: &mut usize) {
    let Some(reply) = session.last_reply() else {
        return;
    };
    if let Some(fresh) = reply.content.get(*printed..).filter(|s| !s.is_empty()) {
        print!("{fresh}");
        let _ = std::io::stdout().flush();
        *printed = reply.content.len();
    }
}

fn print_sources(sources: &[SourceRef]) {
    if sources.is_empty() {
        return;
    }
    println!();
    println!("{}", "Sources".bold());
    for (index, source) in sources.iter().enumerate() {
        let title = source
            .title
            .as_deref()
            .or(source.id.as_deref())
            .unwrap_or("untitled");
        match &source.url {
            Some(url) => println!("  {}. {} {}", index + 1, title, url.dimmed()),
            None => println!("  {}. {}", index + 1, title),
        }
    }
}
