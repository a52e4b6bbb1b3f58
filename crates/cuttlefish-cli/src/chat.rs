//! Follow a running generation in the terminal

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use cuttlefish_core::agent::ApprovalRequest;
use cuttlefish_core::storage::Message;
use cuttlefish_core::{App, AppEvent};

/// Prints messages incrementally; content only ever grows by appends
#[derive(Default)]
struct Printer {
    printed: HashMap<i64, usize>,
    current: Option<i64>,
}

impl Printer {
    fn render(&mut self, messages: &[Message], after: i64) -> Result<()> {
        let mut out = std::io::stdout().lock();
        for message in messages.iter().filter(|m| m.id > after) {
            let done = self.printed.get(&message.id).copied();
            if done.is_none() {
                if self.current.is_some() {
                    writeln!(out)?;
                }
                writeln!(out, "── {} ──", message.author)?;
                self.current = Some(message.id);
            }
            let done = done.unwrap_or(0);
            if let Some(rest) = message.content.get(done..) {
                write!(out, "{}", rest)?;
            }
            self.printed.insert(message.id, message.content.len());
        }
        out.flush()?;
        Ok(())
    }
}

/// Stream the conversation's new messages until its run ends.
///
/// Ctrl-C cancels the run. A pending approval is answered by typing `y`.
/// Fails if the run reported an error.
pub async fn follow(
    app: &App,
    mut events: mpsc::UnboundedReceiver<AppEvent>,
    conversation_id: i64,
    after_message: i64,
) -> Result<()> {
    let mut printer = Printer::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut asked: Option<ApprovalRequest> = None;
    let mut errors = 0usize;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::ConversationUpdated { conversation_id: id } if id == conversation_id => {
                        printer.render(&app.messages(conversation_id)?, after_message)?;
                        if !app.is_generating(conversation_id) {
                            break;
                        }
                    }
                    AppEvent::ApprovalsUpdated { conversation_id: id } if id == conversation_id => {
                        asked = app.list_approval_requests(conversation_id).pop();
                        if let Some(request) = &asked {
                            println!("\n[approval] {} - type y to approve", request.message);
                        }
                    }
                    AppEvent::AsyncError { error } => {
                        eprintln!("\nerror: {}", error);
                        errors += 1;
                    }
                    _ => {}
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line? {
                    Some(answer) if answer.trim().eq_ignore_ascii_case("y") => {
                        if let Some(request) = asked.take() {
                            if !app.approve(conversation_id, &request.id) {
                                println!("[approval] request is no longer pending");
                            }
                        }
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if app.cancel_generation(conversation_id) {
                    eprintln!("\ncancelling...");
                } else {
                    break;
                }
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        if let AppEvent::AsyncError { error } = event {
            eprintln!("error: {}", error);
            errors += 1;
        }
    }

    println!();
    if errors > 0 {
        anyhow::bail!("generation failed");
    }
    Ok(())
}
