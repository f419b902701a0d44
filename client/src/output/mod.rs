//! Output and display management

use anyhow::Result;
use protocol::{AlertLogEntry, Channel, FeedMessage, Rule};
use std::io::Write;
use std::path::Path;

const VARIABLE_SEPARATOR: &str = "; ";

/// Print alert entries as a table, one line per entry
pub fn print_alerts<W: Write>(out: &mut W, entries: &[AlertLogEntry]) -> Result<()> {
    if entries.is_empty() {
        writeln!(out, "No alerts logged")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<36}  {:<24}  {:<20}  {:<24}  VARIABLES",
        "ID", "LOGGED AT", "DATA TIMESTAMP", "TITLE"
    )?;
    for entry in entries {
        writeln!(
            out,
            "{:<36}  {:<24}  {:<20}  {:<24}  {}",
            entry.id,
            entry.logged_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.data_timestamp,
            entry.title,
            entry.variables.join(VARIABLE_SEPARATOR)
        )?;
    }
    writeln!(out, "{} alert(s)", entries.len())?;
    Ok(())
}

/// Print rules with their thresholds
pub fn print_rules<W: Write>(out: &mut W, rules: &[Rule]) -> Result<()> {
    if rules.is_empty() {
        writeln!(out, "No rules configured")?;
        return Ok(());
    }

    for rule in rules {
        let state = if rule.enabled { "enabled" } else { "disabled" };
        writeln!(out, "{} [{}]", rule.title, state)?;
        if !rule.description.is_empty() {
            writeln!(out, "  {}", rule.description)?;
        }
        for (name, threshold) in &rule.variables {
            writeln!(out, "  {:<24} {} - {}", name, threshold.min, threshold.max)?;
        }
    }
    Ok(())
}

/// One line per pushed channel message
pub fn format_message(channel: Channel, message: &FeedMessage) -> String {
    let now = chrono::Local::now().format("%H:%M:%S");
    match message {
        FeedMessage::Reading { ds, values, .. } => {
            let values: Vec<String> = values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("[{}] {} {} {}", now, channel, ds, values.join(" "))
        }
        FeedMessage::Alert(event) => {
            let variables: Vec<String> = event
                .out_of_range_variables
                .iter()
                .map(|(name, v)| protocol::models::format_violation(name, v))
                .collect();
            format!(
                "[{}] {} {} ALERT {}: {}",
                now,
                channel,
                event.timestamp,
                event.title,
                variables.join(VARIABLE_SEPARATOR)
            )
        }
    }
}

/// Export alert entries as CSV
pub fn export_csv(entries: &[AlertLogEntry], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)?;

    // Write header
    writer.write_record(["id", "logged_at", "data_timestamp", "title", "description", "variables"])?;

    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.logged_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            entry.data_timestamp.clone(),
            entry.title.clone(),
            entry.description.clone(),
            entry.variables.join(VARIABLE_SEPARATOR),
        ])?;
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use protocol::{AlertEvent, Threshold, VariableViolation};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(title: &str) -> AlertLogEntry {
        AlertLogEntry {
            id: Uuid::new_v4(),
            logged_at: DateTime::parse_from_rfc3339("2024-03-02T10:00:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
            data_timestamp: "2024-03-02T09:59:00".to_string(),
            title: title.to_string(),
            description: "Too hot, check cooling".to_string(),
            variables: vec![
                "temp: 95 (expected 0 - 80)".to_string(),
                "ambient: 50 (expected -20 - 45)".to_string(),
            ],
        }
    }

    #[test]
    fn test_export_csv_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.csv");
        let entries = vec![entry("Temp")];

        export_csv(&entries, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, ["id", "logged_at", "data_timestamp", "title", "description", "variables"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], entries[0].id.to_string());
        assert_eq!(&rows[0][1], "2024-03-02T10:00:00.250Z");
        assert_eq!(&rows[0][4], "Too hot, check cooling");
        assert_eq!(&rows[0][5], "temp: 95 (expected 0 - 80); ambient: 50 (expected -20 - 45)");
    }

    #[test]
    fn test_print_alerts_table() {
        let mut out = Vec::new();
        print_alerts(&mut out, &[entry("Temp"), entry("Output")]).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("ID"));
        assert!(text.contains("Temp"));
        assert!(text.contains("2024-03-02 10:00:00.250"));
        assert!(text.trim_end().ends_with("2 alert(s)"));

        let mut out = Vec::new();
        print_alerts(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No alerts logged\n");
    }

    #[test]
    fn test_print_rules() {
        let rule = Rule::new("Temp", "Module too hot").with_variable("temp", 0.0, 80.0);
        let mut out = Vec::new();
        print_rules(&mut out, &[rule.disabled()]).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Temp [disabled]\n"));
        assert!(text.contains("temp"));
        assert!(text.contains("0 - 80"));
    }

    #[test]
    fn test_format_alert_message() {
        let mut variables = indexmap::IndexMap::new();
        variables.insert(
            "temp".to_string(),
            VariableViolation {
                actual_value: 95.0,
                expected_range: Threshold::new(0.0, 80.0),
            },
        );
        let message = FeedMessage::Alert(AlertEvent {
            timestamp: "2024-01-01T00:00:00".to_string(),
            title: "Temp".to_string(),
            description: String::new(),
            out_of_range_variables: variables,
        });

        let line = format_message(Channel::Alerts, &message);

        assert!(line.ends_with("alerts 2024-01-01T00:00:00 ALERT Temp: temp: 95 (expected 0 - 80)"));
    }
}
