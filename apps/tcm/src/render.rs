use chrono::{Local, TimeZone};
use tcm_core::proto::{
    readable_duration, AccountBan, BackupEvent, BackupStatus, BuildEvent, BuildOutcome, ClientStatus, LogLine,
    LogStream, PlayerInfo, ServerStatus, UnixMillis,
};

pub fn print_log_line(line: &LogLine) {
    println!("{}", log_line(line));
}

fn log_line(line: &LogLine) -> String {
    let stream = match line.stream {
        LogStream::Stdout => "stdout",
        LogStream::Stderr => "stderr",
    };
    match line.service {
        Some(service) => format!("[{service}/{stream}] {}", line.line.trim_end()),
        None => format!("[{stream}] {}", line.line.trim_end()),
    }
}

pub fn print_build_event(event: &BuildEvent) {
    match event {
        BuildEvent::StageStarted { stage, .. } => println!("==> {stage:?}"),
        BuildEvent::Progress { percent, .. } => println!("    {percent}%"),
        BuildEvent::Output { line, .. } => println!("    {line}"),
        BuildEvent::Finished { outcome, .. } => println!("{}", outcome_text(outcome)),
    }
}

pub fn outcome_text(outcome: &BuildOutcome) -> String {
    match outcome {
        BuildOutcome::Succeeded { message } => message.clone(),
        BuildOutcome::Failed { stage, message } => format!("{stage:?} failed: {message}"),
        BuildOutcome::Cancelled { message } => message.clone(),
    }
}

pub fn countdown_text(remaining_secs: u64) -> String {
    format!("Next backup: {}", readable_duration(remaining_secs))
}

pub fn backup_event_text(event: &BackupEvent) -> String {
    match event {
        BackupEvent::Countdown { remaining_secs, .. } => countdown_text(*remaining_secs),
        BackupEvent::Triggered { stores, .. } => format!("Backup started: {}", join(stores)),
        BackupEvent::Completed { store, path } => format!("{store} backup written to {path}"),
        BackupEvent::Failed { store, message } => format!("{store} backup failed: {message}"),
        BackupEvent::Stopped {} => "Backups disabled".to_string(),
    }
}

pub fn print_backup_status(status: &BackupStatus) {
    let stores = status.schedule.enabled_stores();
    if stores.is_empty() {
        println!("Backups disabled");
        return;
    }
    println!(
        "Backing up {} every {}",
        join(&stores),
        readable_duration(status.schedule.interval().as_secs())
    );
    if let Some(next_at_ms) = status.next_at_ms {
        println!("Next backup at {}", local_time(next_at_ms));
    }
}

pub fn print_server_status(server: &ServerStatus) {
    let state = if server.online {
        "online"
    } else if server.attached {
        "attached, not online"
    } else {
        "offline"
    };
    println!("server: {state} ({:?} mode)", server.mode);
    for client in [&server.auth, &server.world].into_iter().flatten() {
        println!("  {}", client_line(client));
    }
}

pub fn client_line(client: &ClientStatus) -> String {
    let state = if client.online { "online" } else { "offline" };
    match client.pid {
        Some(pid) => format!("{}: {state} pid={pid} {}", client.service, client.endpoint),
        None => format!("{}: {state} {}", client.service, client.endpoint),
    }
}

pub fn print_player_info(info: &PlayerInfo) {
    println!("Character:   {}", info.character_name);
    println!("Account:     {} (#{})", info.account_name, info.account_id);
    println!("Email:       {}", info.email);
    println!("Last IP:     {}", info.last_ip);
    println!("Last login:  {}", info.last_login);
    println!("GM level:    {}", info.gm_level);
    println!("Level {} {} {}", info.level, info.race, info.class);
    println!("Money:       {}", info.money);
    println!("Played:      {}", readable_duration(info.played_secs));
    println!("Kills:       {}", info.total_kills);
}

pub fn print_bans(bans: &[AccountBan]) {
    if bans.is_empty() {
        println!("No active bans.");
        return;
    }
    for ban in bans {
        let until = if ban.unbanned_at <= ban.banned_at {
            "permanent".to_string()
        } else {
            local_time(ban.unbanned_at * 1000)
        };
        println!(
            "#{} banned {} until {} by {}: {}",
            ban.account_id,
            local_time(ban.banned_at * 1000),
            until,
            ban.banned_by,
            ban.reason
        );
    }
}

fn local_time(at_ms: UnixMillis) -> String {
    match Local.timestamp_millis_opt(at_ms as i64).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => at_ms.to_string(),
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcm_core::proto::{BackupStore, BuildStage, ServiceKind};

    #[test]
    fn countdown_reads_in_words() {
        assert_eq!(countdown_text(3_723), "Next backup: 1 hour, 2 minutes, 3 seconds");
    }

    #[test]
    fn server_lines_name_their_service() {
        let line = LogLine {
            at_ms: 0,
            stream: LogStream::Stderr,
            service: Some(ServiceKind::World),
            line: "Loading maps...\r\n".into(),
        };
        assert_eq!(log_line(&line), "[worldserver/stderr] Loading maps...");
    }

    #[test]
    fn failed_outcome_names_the_stage() {
        let outcome = BuildOutcome::Failed {
            stage: BuildStage::Generate,
            message: "cmake exited with 1".into(),
        };
        assert_eq!(outcome_text(&outcome), "Generate failed: cmake exited with 1");
    }

    #[test]
    fn backup_events_render_per_store() {
        let event = BackupEvent::Triggered {
            stores: vec![BackupStore::Auth, BackupStore::World],
            at_ms: 0,
        };
        assert_eq!(backup_event_text(&event), "Backup started: auth, world");
    }
}
