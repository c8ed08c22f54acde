//! Output formatting utilities for the CLI.

use chrono::{DateTime, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::QuotaRecord;

/// Command result that renders as text or JSON.
pub trait CommandOutput: Serialize {
    /// Human-readable rendering.
    fn to_human(&self) -> String;

    /// JSON rendering; the serialized struct by default.
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Print a result to stdout in the selected mode.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

/// UTC timestamp, or `-` when absent.
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Render quota records; rows exhausted at `now` are highlighted.
pub fn format_quota_table(records: &[QuotaRecord], now: DateTime<Utc>) -> String {
    let mut table = base_table();
    table.set_header(header(&["Key", "Daily", "Cooldown until", "Failures", "Backoff", "Last failure"]));

    for record in records {
        let key = if record.is_exhausted_at(now) {
            Cell::new(&record.key_id).fg(Color::Red)
        } else {
            Cell::new(&record.key_id).fg(Color::Green)
        };
        table.add_row(vec![
            key,
            Cell::new(if record.daily_exhausted { "yes" } else { "no" }),
            Cell::new(format_timestamp(record.temporary_exhausted_until)),
            Cell::new(record.consecutive_failures),
            Cell::new(record.backoff_count),
            Cell::new(format_timestamp(record.last_failure)),
        ]);
    }
    table.to_string()
}

/// Render `(fingerprint, available)` rows.
pub fn format_availability_table(rows: &[(String, bool)]) -> String {
    let mut table = base_table();
    table.set_header(header(&["Credential", "Available"]));
    for (fingerprint, available) in rows {
        let status = if *available {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::Red)
        };
        table.add_row(vec![Cell::new(fingerprint), status]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quota_table_lists_keys() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let records = vec![
            QuotaRecord {
                key_id: "abc123def456_model-a".to_string(),
                daily_exhausted: true,
                ..QuotaRecord::default()
            },
            QuotaRecord {
                key_id: "abc123def456_model-b".to_string(),
                ..QuotaRecord::default()
            },
        ];
        let rendered = format_quota_table(&records, now);
        assert!(rendered.contains("abc123def456_model-a"));
        assert!(rendered.contains("abc123def456_model-b"));
        assert!(rendered.contains("Cooldown until"));
    }

    #[test]
    fn test_format_timestamp_placeholder() {
        assert_eq!(format_timestamp(None), "-");
    }
}
