//! Read-only transcript exports.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

use super::types::Transcript;

/// End time given to the last subtitle entry, which has no successor.
const LAST_SUBTITLE_DURATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
    Csv,
    Subtitle,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            "subtitle" | "srt" => Ok(ExportFormat::Subtitle),
            other => anyhow::bail!("unknown export format: {}", other),
        }
    }
}

/// Render transcripts in the requested format.
pub fn export(transcripts: &[Transcript], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(transcripts)?),
        ExportFormat::Text => Ok(export_text(transcripts)),
        ExportFormat::Csv => Ok(export_csv(transcripts)),
        ExportFormat::Subtitle => Ok(export_subtitle(transcripts)),
    }
}

fn export_text(transcripts: &[Transcript]) -> String {
    let mut out = String::new();
    for t in transcripts {
        let _ = writeln!(out, "[{}] {}: {}", format_clock(t.timestamp_ms), t.speaker, t.text);
    }
    out
}

fn export_csv(transcripts: &[Transcript]) -> String {
    let mut out = String::from("id,speaker,text,confidence,timestamp_ms\n");
    for t in transcripts {
        let _ = writeln!(
            out,
            "{},{},{},{:.3},{}",
            t.id,
            csv_field(&t.speaker),
            csv_field(&t.text),
            t.confidence,
            t.timestamp_ms
        );
    }
    out
}

/// SRT-style subtitles. Each entry ends where the next one starts; the
/// last entry gets a fixed default duration.
fn export_subtitle(transcripts: &[Transcript]) -> String {
    let mut out = String::new();
    for (i, t) in transcripts.iter().enumerate() {
        let end_ms = transcripts
            .get(i + 1)
            .map(|next| next.timestamp_ms.max(t.timestamp_ms))
            .unwrap_or(t.timestamp_ms + LAST_SUBTITLE_DURATION_MS);
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_time(t.timestamp_ms),
            format_srt_time(end_ms)
        );
        let _ = writeln!(out, "{}: {}", t.speaker, t.text);
        let _ = writeln!(out);
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_clock(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

fn format_srt_time(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}
