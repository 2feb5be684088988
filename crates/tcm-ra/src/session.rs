use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

const PROMPT: &str = "TC>";

#[derive(Clone)]
pub struct RaCredentials {
    pub username: String,
    pub password: String,
}

/// An authenticated remote-access console session.
///
/// Commands are written line by line; whatever the server prints back is
/// published to subscribers without request correlation.
pub struct RaSession {
    address: String,
    writer: Mutex<OwnedWriteHalf>,
    lines: broadcast::Sender<String>,
    open: Arc<AtomicBool>,
    closed_rx: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl RaSession {
    pub async fn connect(
        address: &str,
        credentials: &RaCredentials,
        connect_timeout: Duration,
        lines: broadcast::Sender<String>,
    ) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| anyhow!("timed out connecting to {address}"))?
            .with_context(|| format!("failed to connect to {address}"))?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        timeout(connect_timeout, login(&mut reader, &mut writer, credentials))
            .await
            .map_err(|_| anyhow!("timed out logging in to {address}"))??;
        debug!("ra session established with {address}");

        let open = Arc::new(AtomicBool::new(true));
        let (closed_tx, closed_rx) = watch::channel(false);
        let reader = tokio::spawn(pump_lines(reader, lines.clone(), open.clone(), closed_tx));

        Ok(Self {
            address: address.to_string(),
            writer: Mutex::new(writer),
            lines,
            open,
            closed_rx,
            reader,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.lines.subscribe()
    }

    /// Resolves to `true` once the server side has closed the session.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    pub async fn send(&self, command: &str) -> Result<()> {
        if !self.is_open() {
            bail!("ra session to {} is closed", self.address);
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{command}\r\n").as_bytes())
            .await
            .with_context(|| format!("failed to write to {}", self.address))?;
        writer.flush().await?;
        Ok(())
    }

    /// Log out and drop the connection. Safe to call on a closed session.
    pub async fn close(&self) -> Result<()> {
        if self.is_open() {
            let mut writer = self.writer.lock().await;
            let _ = writer.write_all(b"quit\r\n").await;
            let _ = writer.shutdown().await;
        }
        self.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        Ok(())
    }
}

impl Drop for RaSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn login(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    credentials: &RaCredentials,
) -> Result<()> {
    let mut seen = String::new();

    read_until_any(reader, &mut seen, &["username:"]).await?;
    writer
        .write_all(format!("{}\r\n", credentials.username).as_bytes())
        .await?;

    seen.clear();
    read_until_any(reader, &mut seen, &["password:"]).await?;
    writer
        .write_all(format!("{}\r\n", credentials.password).as_bytes())
        .await?;

    seen.clear();
    match read_until_any(reader, &mut seen, &["+logged in", "authentication failed"]).await? {
        0 => Ok(()),
        _ => bail!("authentication failed for {}", credentials.username),
    }
}

/// Read until one of `needles` (lowercase) shows up; returns the matching index.
async fn read_until_any(
    reader: &mut BufReader<OwnedReadHalf>,
    seen: &mut String,
    needles: &[&str],
) -> Result<usize> {
    let mut chunk = [0u8; 512];
    loop {
        let lowered = seen.to_ascii_lowercase();
        if let Some(index) = needles.iter().position(|needle| lowered.contains(needle)) {
            return Ok(index);
        }
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            bail!("connection closed during login");
        }
        seen.push_str(&String::from_utf8_lossy(&chunk[..read]));
    }
}

async fn pump_lines(
    mut reader: BufReader<OwnedReadHalf>,
    lines: broadcast::Sender<String>,
    open: Arc<AtomicBool>,
    closed_tx: watch::Sender<bool>,
) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                if let Some(line) = clean_line(&text) {
                    let _ = lines.send(line);
                }
            }
        }
    }
    open.store(false, Ordering::SeqCst);
    let _ = closed_tx.send(true);
}

/// Strip line endings and the console prompt that prefixes output.
fn clean_line(raw: &str) -> Option<String> {
    let mut line = raw.trim_end_matches(['\r', '\n']);
    while let Some(rest) = line.strip_prefix(PROMPT) {
        line = rest;
    }
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}
