//! Batch Export
//!
//! Writes the final record table as a semicolon separated CSV (UTF-8 with
//! BOM, so spreadsheet tools pick the right encoding) or as JSON.

use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::core::annotations::MediaRecord;
use crate::core::assets::relative_display;
use crate::core::fs::{atomic_write_bytes, atomic_write_json_pretty};
use crate::core::{format_length, CoreError, CoreResult};

pub const CSV_DELIMITER: char = ';';

const UTF8_BOM: &str = "\u{FEFF}";

/// Fixed column order of every export
pub const COLUMNS: [&str; 9] = [
    "File", "Type", "Date", "Lat", "Lon", "Length", "Address", "Image", "Audio",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(CoreError::InvalidConfig(format!(
                "Unknown export format: {}",
                other
            ))),
        }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// One exported row; field names follow the column headers
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportRow {
    pub file: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub date: String,
    pub lat: String,
    pub lon: String,
    pub length: String,
    pub address: String,
    pub image: String,
    pub audio: String,
}

impl ExportRow {
    pub fn from_record(record: &MediaRecord, root: &Path) -> Self {
        let fields = record.ai_fields();
        Self {
            file: relative_display(&record.path, root),
            kind: record.kind.label().to_string(),
            date: record.date.clone().unwrap_or_default(),
            lat: record.latitude.map(|v| format!("{:.6}", v)).unwrap_or_default(),
            lon: record.longitude.map(|v| format!("{:.6}", v)).unwrap_or_default(),
            length: record.length_seconds.map(format_length).unwrap_or_default(),
            address: fields.location_text(),
            image: fields.caption,
            audio: fields.transcript,
        }
    }

    fn cells(&self) -> [&str; 9] {
        [
            self.file.as_str(),
            self.kind.as_str(),
            self.date.as_str(),
            self.lat.as_str(),
            self.lon.as_str(),
            self.length.as_str(),
            self.address.as_str(),
            self.image.as_str(),
            self.audio.as_str(),
        ]
    }
}

/// Quotes a cell when it contains the delimiter, a quote or a line break
pub fn escape_csv(value: &str) -> String {
    if value.contains([CSV_DELIMITER, '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(cells: &[&str]) -> String {
    let escaped: Vec<String> = cells.iter().map(|c| escape_csv(c)).collect();
    escaped.join(&CSV_DELIMITER.to_string())
}

pub fn render_csv(rows: &[ExportRow]) -> String {
    let mut out = String::from(UTF8_BOM);
    out.push_str(&csv_line(&COLUMNS));
    out.push_str("\r\n");
    for row in rows {
        out.push_str(&csv_line(&row.cells()));
        out.push_str("\r\n");
    }
    out
}

/// Writes `records` to `output`, paths shown relative to `root`
pub fn export_records(
    records: &[MediaRecord],
    root: &Path,
    format: ExportFormat,
    output: &Path,
) -> CoreResult<()> {
    let rows: Vec<ExportRow> = records
        .iter()
        .map(|r| ExportRow::from_record(r, root))
        .collect();

    match format {
        ExportFormat::Csv => atomic_write_bytes(output, render_csv(&rows).as_bytes())?,
        ExportFormat::Json => atomic_write_json_pretty(output, &rows)?,
    }

    tracing::info!("Exported {} row(s) to {}", rows.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MediaKind;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_record(root: &Path) -> MediaRecord {
        let mut record = MediaRecord::new(0, root.join("trip").join("tower.jpg"), MediaKind::Image);
        record.date = Some("2024-05-01 10:00:00".to_string());
        record.latitude = Some(48.8584);
        record.longitude = Some(2.2945);
        record.address = "Paris; France".to_string();
        record.landmark = "Eiffel Tower".to_string();
        record.caption = "A \"tall\" tower".to_string();
        record
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a;b"), "\"a;b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_row_formatting() {
        let root = PathBuf::from("/media");
        let mut record = sample_record(&root);
        record.kind = MediaKind::Video;
        record.length_seconds = Some(125.7);
        record.transcript = "...".to_string();

        let row = ExportRow::from_record(&record, &root);
        assert_eq!(row.file, "trip/tower.jpg");
        assert_eq!(row.kind, "video");
        assert_eq!(row.lat, "48.858400");
        assert_eq!(row.lon, "2.294500");
        assert_eq!(row.length, "2:05");
        assert_eq!(row.address, "Paris; France|Eiffel Tower");
        // the pending sentinel never reaches an export
        assert!(row.audio.is_empty());
    }

    #[test]
    fn test_csv_export() {
        let dir = TempDir::new().unwrap();
        let record = sample_record(dir.path());
        let output = dir.path().join("_media_analysis.csv");

        export_records(&[record], dir.path(), ExportFormat::Csv, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with(UTF8_BOM));
        let lines: Vec<&str> = text.trim_start_matches(UTF8_BOM).lines().collect();
        assert_eq!(lines[0], "File;Type;Date;Lat;Lon;Length;Address;Image;Audio");
        assert_eq!(
            lines[1],
            "trip/tower.jpg;image;2024-05-01 10:00:00;48.858400;2.294500;;\"Paris; France|Eiffel Tower\";\"A \"\"tall\"\" tower\";"
        );
    }

    #[test]
    fn test_json_export() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("analysis.json");

        export_records(&[sample_record(dir.path())], dir.path(), ExportFormat::Json, &output)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value[0]["File"], "trip/tower.jpg");
        assert_eq!(value[0]["Type"], "image");
        assert_eq!(value[0]["Address"], "Paris; France|Eiffel Tower");
    }

    #[test]
    fn test_empty_export_has_header_only() {
        assert_eq!(render_csv(&[]).lines().count(), 1);
    }
}
