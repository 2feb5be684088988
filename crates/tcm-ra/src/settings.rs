use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

const DEFAULT_RA_PORT: u16 = 3443;

pub struct RaSettings {
    pub address: String,
}

/// Read the remote-access endpoint from a `worldserver.conf`.
///
/// Returns `Ok(None)` when the file is absent or remote access is disabled.
pub async fn load_ra_settings(config_path: &Path) -> Result<Option<RaSettings>> {
    let content = match fs::read_to_string(config_path).await {
        Ok(value) => value,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", config_path.display()));
        }
    };

    let mut enabled = false;
    let mut ip: Option<String> = None;
    let mut port: Option<u16> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "Ra.Enable" => enabled = value == "1",
            "Ra.IP" => ip = Some(value.to_string()).filter(|v| !v.is_empty()),
            "Ra.Port" => {
                port = Some(
                    value
                        .parse::<u16>()
                        .with_context(|| format!("invalid Ra.Port: {value}"))?,
                )
            }
            _ => {}
        }
    }

    if !enabled {
        return Ok(None);
    }

    // a wildcard bind address is reachable locally
    let host = match ip.as_deref() {
        None | Some("0.0.0.0") => "127.0.0.1".to_string(),
        Some(value) => value.to_string(),
    };
    Ok(Some(RaSettings {
        address: format!("{host}:{}", port.unwrap_or(DEFAULT_RA_PORT)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enabled_ra_resolves_wildcard_to_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldserver.conf");
        std::fs::write(
            &path,
            "# RA\nRa.Enable = 1\nRa.IP = \"0.0.0.0\"\nRa.Port = 3444\nRealmID = 1\n",
        )
        .unwrap();

        let settings = load_ra_settings(&path).await.unwrap().unwrap();
        assert_eq!(settings.address, "127.0.0.1:3444");
    }

    #[tokio::test]
    async fn disabled_or_missing_config_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldserver.conf");
        assert!(load_ra_settings(&path).await.unwrap().is_none());

        std::fs::write(&path, "Ra.Enable = 0\nRa.Port = 3443\n").unwrap();
        assert!(load_ra_settings(&path).await.unwrap().is_none());
    }
}
