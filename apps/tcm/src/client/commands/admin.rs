use std::io::Write;

use anyhow::Result;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use tcm_core::proto::{AdminAction, Event, Outbound, Request, Response, Topic};

use crate::client::{into_result, unexpected, Daemon};
use crate::render::print_log_line;

/// Hand one action to the world service and return the console line it became.
pub async fn dispatch(action: AdminAction) -> Result<String> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::Admin { action }).await? {
        Response::Dispatched { command } => Ok(command),
        other => Err(unexpected(other)),
    }
}

/// Read console commands from stdin and print server output as it arrives.
/// Ends on EOF or `quit`.
pub async fn console_interactive() -> Result<()> {
    let mut daemon = Daemon::connect().await?;
    daemon
        .call(Request::Subscribe {
            topics: vec![Topic::Logs],
        })
        .await?;

    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let command = line.trim();
                if command == "quit" || command == "exit" {
                    return Ok(());
                }
                if !command.is_empty() {
                    daemon
                        .send(Request::Console {
                            command: command.to_string(),
                        })
                        .await?;
                }
                prompt();
            }

            outbound = daemon.next_outbound() => match outbound? {
                Outbound::Event(Event::Log(line)) => print_log_line(&line),
                Outbound::Event(_) => {}
                Outbound::Response(env) => {
                    if let Err(err) = into_result(env.payload) {
                        eprintln!("error: {err}");
                        prompt();
                    }
                }
            },
        }
    }
}

fn prompt() {
    print!("tc> ");
    std::io::stdout().flush().ok();
}
