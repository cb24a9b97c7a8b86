//! stdin/stdout REPL for local drafting sessions.
//!
//! Free text submits a request; slash commands drive the approval loop.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use crate::pipeline::{Contact, Request, RoundOutcome};
use crate::session::{ApprovalStateMachine, Decision, Session, SessionState};

pub const HELP: &str = "\
Commands:
  <text>           submit a sales request
  /approve         send the current draft to every contact
  /reject          discard the draft and generate a new one
  /retry           rerun a blocked or failed request
  /show            print the session state and current draft
  /sender <name>   set the sender name
  /quit            exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Approve,
    Reject,
    Retry,
    Show,
    Sender(String),
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Submit(line.to_string()));
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        Some(match name {
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            "retry" => Self::Retry,
            "show" => Self::Show,
            "sender" => Self::Sender(arg.trim().to_string()),
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

pub struct Repl {
    machine: Arc<ApprovalStateMachine>,
    session: Session,
    sender_name: Option<String>,
    contacts: Vec<Contact>,
}

impl Repl {
    pub fn new(
        machine: Arc<ApprovalStateMachine>,
        sender_name: Option<String>,
        contacts: Vec<Contact>,
    ) -> Self {
        Self {
            machine,
            session: Session::new(),
            sender_name,
            contacts,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one command. `None` means quit.
    pub async fn handle(&mut self, command: Command) -> Option<String> {
        let decision = match command {
            Command::Quit => return None,
            Command::Help => return Some(HELP.to_string()),
            Command::Unknown(name) => return Some(format!("Unknown command /{name}. Try /help.")),
            Command::Show => return Some(render_session(&self.session)),
            Command::Sender(name) if name.is_empty() => {
                return Some("Usage: /sender <name>".to_string());
            }
            Command::Sender(name) => {
                let reply = format!("Sender set to {name}.");
                self.sender_name = Some(name);
                return Some(reply);
            }
            Command::Submit(text) => {
                let Some(sender) = self.sender_name.clone() else {
                    return Some("Set a sender first with /sender <name>.".to_string());
                };
                let request = match Request::new(text, sender, self.contacts.clone()) {
                    Ok(request) => request,
                    Err(e) => return Some(e.to_string()),
                };
                // A finished session starts over.
                if self.session.state == SessionState::Sent {
                    self.session = Session::new();
                }
                self.machine.submit(&mut self.session, request).await
            }
            Command::Approve => self.machine.approve(&mut self.session).await,
            Command::Reject => self.machine.reject(&mut self.session).await,
            Command::Retry => self.machine.retry(&mut self.session).await,
        };
        Some(render_decision(&decision))
    }

    /// Read stdin until EOF or `/quit`.
    pub async fn run(mut self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        eprint!("> ");
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(command) = Command::parse(&line) {
                        match self.handle(command).await {
                            Some(reply) => println!("\n{reply}\n"),
                            None => break,
                        }
                    }
                    eprint!("> ");
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    }
}

pub fn render_decision(decision: &Decision) -> String {
    match decision {
        Decision::Ignored { state, reason } => format!("Not now ({state}): {reason}"),
        Decision::Drafted { round } => match &round.outcome {
            RoundOutcome::Complete(draft) => {
                let mut out = format!(
                    "Draft from {} (score {:.2}):\n\n{}\n\n/approve, /reject or /show",
                    draft.chosen.strategy_id, draft.chosen.score, draft.chosen.text
                );
                for failure in &round.failures {
                    let _ = write!(out, "\n({} unavailable: {})", failure.strategy_id, failure.reason);
                }
                out
            }
            other => format!("Round ended: {}", other.label()),
        },
        Decision::Blocked { round } => {
            let verdict = match &round.outcome {
                RoundOutcome::BlockedInput { verdict } => verdict,
                RoundOutcome::BlockedOutput { output_verdict, .. } => output_verdict,
                other => return format!("Round ended: {}", other.label()),
            };
            let mut out = format!(
                "Blocked ({}), risk {:.2}:",
                round.outcome.label(),
                verdict.risk_score
            );
            for f in &verdict.findings {
                let _ = write!(
                    out,
                    "\n  - {} [{}] confidence {:.2}",
                    f.pattern_id, f.category, f.confidence
                );
            }
            out.push_str("\nEdit the request and submit again, or /retry.");
            out
        }
        Decision::Failed { round } => {
            let mut out = "No draft could be produced:".to_string();
            for failure in &round.failures {
                let _ = write!(out, "\n  - {}: {}", failure.strategy_id, failure.reason);
            }
            out.push_str("\n/retry to try again.");
            out
        }
        Decision::Sent { subject, outcomes } => {
            let delivered = outcomes.iter().filter(|o| o.delivered).count();
            let mut out = format!(
                "Sent \"{subject}\" to {delivered}/{} contacts.",
                outcomes.len()
            );
            for o in outcomes.iter().filter(|o| !o.delivered) {
                let _ = write!(
                    out,
                    "\n  - {}: {}",
                    o.recipient.email,
                    o.error_detail.as_deref().unwrap_or("unknown error")
                );
            }
            out
        }
    }
}

pub fn render_session(session: &Session) -> String {
    let mut out = format!(
        "Session {} is {} ({} drafts so far)",
        session.id,
        session.state,
        session.history.len()
    );
    if let Some(draft) = &session.current_draft {
        let _ = write!(out, "\n\nCurrent draft ({}):\n\n{}", draft.chosen.strategy_id, draft.chosen.text);
    }
    if let Some(request) = &session.request {
        let _ = write!(out, "\n\nRecipients: {}", request.recipients.len());
    }
    out
}
