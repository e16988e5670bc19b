use crate::error::Result;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, CellAlignment, ContentArrangement, Table};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
    Raw,
    Jsonl,
}

pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Pretty JSON for `json`, one compact line per record otherwise.
    pub fn write_json<T: Serialize>(&mut self, data: &T) -> Result<()> {
        let json = match self.format {
            OutputFormat::Json | OutputFormat::Table => serde_json::to_string_pretty(data)?,
            OutputFormat::Raw | OutputFormat::Jsonl => serde_json::to_string(data)?,
        };
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_table(&mut self, table: Table) -> Result<()> {
        writeln!(self.writer, "{}", table)?;
        Ok(())
    }

    pub fn writeln(&mut self, text: &str) -> Result<()> {
        writeln!(self.writer, "{}", text)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Right-aligns every column after the first.
pub fn align_numeric_columns(table: &mut Table) {
    let count = table.column_count();
    for index in 1..count {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
}

/// Remaining-quota percentage, colored by how much headroom is left.
pub fn colored_percent(percent: u8) -> String {
    let text = format!("{}%", percent);
    match percent {
        50..=100 => text.green().to_string(),
        20..=49 => text.yellow().to_string(),
        _ => text.red().bold().to_string(),
    }
}

pub fn format_reset(reset: Option<DateTime<Utc>>) -> String {
    reset
        .map(|t| {
            t.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}
