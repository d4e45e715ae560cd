//! History command - lists recorded check results
//! Usage: watchkeep history [--since <RFC 3339>] [--json]

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;

use super::common::check_log;
use super::status::availability_label;
use crate::config::AppConfig;
use crate::store::CheckLog;

/// Print check records, optionally only those at or after `since`.
pub fn execute(config: &AppConfig, since: Option<DateTime<Utc>>, json: bool) -> Result<()> {
    let log = CheckLog::new(check_log(config));
    let records = match since {
        Some(since) => log.get_since(since)?,
        None => log.get_all()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No check records".dimmed());
        return Ok(());
    }

    for record in &records {
        let line = format!(
            "{}  {}",
            record.timestamp.to_rfc3339(),
            availability_label(record.status)
        );
        match &record.error {
            Some(error) => println!("{line} {}", error.red()),
            None => println!("{line}"),
        }
    }
    println!("\n{} records", records.len());
    Ok(())
}
