use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) enum CommandEnd {
    Exited(ExitStatus),
    Cancelled,
}

/// Run `cmd`, handing every stdout/stderr line to `on_line` as it arrives.
///
/// Lines are split on `\n` and `\r` so carriage-return progress output shows
/// up incrementally. The child is killed once `cancel` fires.
pub(crate) async fn run_streaming(
    mut cmd: Command,
    cancel: &CancellationToken,
    mut on_line: impl FnMut(&str),
) -> std::io::Result<CommandEnd> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx.clone()));
    }
    drop(tx);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => on_line(&line),
                None => break,
            },
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(CommandEnd::Cancelled);
            }
        }
    }

    tokio::select! {
        status = child.wait() => status.map(CommandEnd::Exited),
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Ok(CommandEnd::Cancelled)
        }
    }
}

async fn pump(mut reader: impl AsyncRead + Unpin, tx: mpsc::UnboundedSender<String>) {
    let mut chunk = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        for byte in &chunk[..read] {
            if *byte == b'\n' || *byte == b'\r' {
                flush(&mut pending, &tx);
            } else {
                pending.push(*byte);
            }
        }
    }
    flush(&mut pending, &tx);
}

fn flush(pending: &mut Vec<u8>, tx: &mpsc::UnboundedSender<String>) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    if !line.is_empty() {
        let _ = tx.send(line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn carriage_returns_split_lines() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'a 10%%\\ra 50%%\\rdone\\n'; exit 3");
        let mut lines = Vec::new();
        let end = run_streaming(cmd, &CancellationToken::new(), |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(lines, vec!["a 10%", "a 50%", "done"]);
        match end {
            CommandEnd::Exited(status) => assert_eq!(status.code(), Some(3)),
            CommandEnd::Cancelled => panic!("not cancelled"),
        }
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo started; sleep 30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let end = run_streaming(cmd, &cancel, move |_| trigger.cancel()).await.unwrap();
        assert!(matches!(end, CommandEnd::Cancelled));
    }
}
