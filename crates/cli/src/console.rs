//! Terminal I/O for `mcplink chat`.
//!
//! Reads stdin line by line on a plain thread: a blocking stdin read would
//! otherwise hold up runtime shutdown after Ctrl+C.

use std::io::{self, BufRead, Write};
use mcplink_core::event::DomainEvent;
use tokio::sync::mpsc;

/// What one line of operator input means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Quit,
}

/// Classify a raw line. Blank lines are ignored.
pub fn parse_line(raw: &str) -> Option<Input> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }

    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        Some(Input::Quit)
    } else {
        Some(Input::Message(line.to_string()))
    }
}

/// Forward operator messages from `reader`. The channel closes on quit or EOF.
pub fn spawn_reader<R>(reader: R) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    std::thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            };

            match parse_line(&line) {
                None => continue,
                Some(Input::Quit) => break,
                Some(Input::Message(text)) => {
                    if tx.blocking_send(Ok(text)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}

pub fn stdin_lines() -> mpsc::Receiver<io::Result<String>> {
    spawn_reader(io::BufReader::new(io::stdin()))
}

pub fn prompt() -> io::Result<()> {
    print!("  You > ");
    io::stdout().flush()
}

pub fn print_answer(answer: &str) {
    println!();
    for line in answer.lines() {
        println!("  Assistant > {line}");
    }
    println!();
}

/// One-line description of tool activity, for `--show-tools`.
pub fn describe_activity(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::ToolDispatched {
            tool_name,
            arguments,
            success,
            output_preview,
            duration_ms,
            ..
        } => {
            let status = if *success { "ok" } else { "failed" };
            Some(format!(
                "  [tool] {tool_name}({arguments}) {status} in {duration_ms}ms → {output_preview}"
            ))
        }
        _ => None,
    }
}
