//! Host and container uptime.
//!
//! Host boot time comes from `/proc/uptime`, falling back to `uptime -s`.
//! Container start time is whatever the entrypoint wrote into the configured
//! timestamp file (seconds since the epoch, possibly fractional).

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const BOOT_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeInfo {
    pub boot_time: Option<i64>,
    pub boot_time_str: Option<String>,
    pub uptime_seconds: Option<i64>,
    pub uptime_str: Option<String>,
}

impl UptimeInfo {
    pub fn unknown() -> Self {
        Self {
            boot_time: None,
            boot_time_str: None,
            uptime_seconds: None,
            uptime_str: None,
        }
    }

    pub fn since(boot: Option<i64>, now: i64) -> Self {
        let Some(boot) = boot else {
            return Self::unknown();
        };
        let uptime = now - boot;
        Self {
            boot_time: Some(boot),
            boot_time_str: Local
                .timestamp_opt(boot, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            uptime_seconds: Some(uptime),
            uptime_str: Some(format_duration(uptime)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeReport {
    pub host_uptime: UptimeInfo,
    pub container_uptime: UptimeInfo,
    pub generated_at: i64,
}

/// `3 days, 4:05:06`, `1 day, 0:00:09`, `0:05:00`. Negative spans clamp to zero.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (days, rest) = (seconds / 86_400, seconds % 86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, rest % 3600 / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

pub async fn report(container_start_file: &Path) -> UptimeReport {
    let now = Utc::now().timestamp();
    let host = host_boot_time(now).await;
    let container = container_start_time(container_start_file).await;
    UptimeReport {
        host_uptime: UptimeInfo::since(host, now),
        container_uptime: UptimeInfo::since(container, now),
        generated_at: now,
    }
}

pub async fn host_boot_time(now: i64) -> Option<i64> {
    if let Ok(raw) = tokio::fs::read_to_string("/proc/uptime").await {
        if let Some(seconds) = parse_proc_uptime(&raw) {
            return Some(now - seconds as i64);
        }
    }
    debug!("/proc/uptime unavailable; trying `uptime -s`");
    let output = tokio::process::Command::new("uptime")
        .arg("-s")
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_boot_timestamp(&String::from_utf8_lossy(&output.stdout))
}

pub async fn container_start_time(path: &Path) -> Option<i64> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    raw.trim().parse::<f64>().ok().map(|t| t as i64)
}

fn parse_proc_uptime(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Local wall-clock time as printed by `uptime -s`.
fn parse_boot_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    BOOT_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|t: DateTime<Local>| t.timestamp())
}
