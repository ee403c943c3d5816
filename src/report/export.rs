//! Detection results export (CSV / JSON)
//!
//! Results are laid out as sheets: each row is prefixed with the tenant's
//! hospital code and name, and columns carry display labels. A sheet is
//! written as a CSV file, or as a key in a JSON document.

use crate::config::ExportSettings;
use crate::db::types::CellValue;
use crate::detect::{DetectionResult, group_by_query};
use crate::error::{SinkError, SinkResult};
use crate::labels::Labels;
use crate::report::Exporter;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Base name of every export file
pub const FILE_BASE_NAME: &str = "스케줄 감지";

/// Sheet name used when all results share one sheet
pub const COMBINED_SHEET_NAME: &str = "전체결과";

const HOSPITAL_CODE_COLUMN: &str = "병원코드";
const HOSPITAL_NAME_COLUMN: &str = "병원명";
const QUERY_COLUMN: &str = "감지유형";

/// Excel opens BOM-prefixed CSV as UTF-8
const UTF8_BOM: &str = "\u{feff}";

/// Export format selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// File extension for this format (without leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// A labeled table of detection rows
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    /// Build a sheet from results. Empty results contribute nothing.
    ///
    /// Columns are the hospital prefix followed by the union of result
    /// columns in first-seen order; missing cells are NULL.
    pub fn build(name: &str, results: &[&DetectionResult], labels: &Labels, tag_query: bool) -> Self {
        let mut raw_columns: Vec<&str> = Vec::new();
        for result in results {
            for row in result.rows() {
                for column in row.columns() {
                    if !raw_columns.contains(&column) {
                        raw_columns.push(column);
                    }
                }
            }
        }

        let mut columns = vec![
            HOSPITAL_CODE_COLUMN.to_string(),
            HOSPITAL_NAME_COLUMN.to_string(),
        ];
        if tag_query {
            columns.push(QUERY_COLUMN.to_string());
        }
        columns.extend(raw_columns.iter().map(|c| labels.field(c).to_string()));

        let mut rows = Vec::new();
        for result in results {
            let hospital = labels.hospitals.display_name(&result.schema);
            for row in result.rows() {
                let mut cells = vec![
                    CellValue::from(result.schema.as_str()),
                    CellValue::from(hospital),
                ];
                if tag_query {
                    cells.push(CellValue::from(labels.sheet_name(&result.query_name)));
                }
                cells.extend(
                    raw_columns
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(CellValue::Null)),
                );
                rows.push(cells);
            }
        }

        Self {
            name: name.to_string(),
            columns,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column label
    fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (column, cell) in self.columns.iter().zip(row) {
                    obj.insert(column.clone(), cell.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect()
    }
}

/// Write a sheet as RFC 4180 CSV, flushing every `batch_size` rows.
pub fn write_csv<W: Write>(out: &mut W, sheet: &Sheet, batch_size: usize) -> SinkResult<()> {
    let mut buf = String::from(UTF8_BOM);
    push_csv_line(&mut buf, sheet.columns.iter().map(String::as_str));
    out.write_all(buf.as_bytes())?;

    for chunk in sheet.rows.chunks(batch_size.max(1)) {
        buf.clear();
        for row in chunk {
            let texts: Vec<String> = row.iter().map(cell_to_export_string).collect();
            push_csv_line(&mut buf, texts.iter().map(String::as_str));
        }
        out.write_all(buf.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Write sheets as one JSON document: an array of row objects for a single
/// sheet, an object of sheet name → rows otherwise.
pub fn write_json<W: Write>(out: &mut W, sheets: &[Sheet]) -> SinkResult<()> {
    let value = match sheets {
        [sheet] => serde_json::Value::Array(sheet.to_json_rows()),
        _ => serde_json::Value::Object(
            sheets
                .iter()
                .map(|s| (s.name.clone(), serde_json::Value::Array(s.to_json_rows())))
                .collect(),
        ),
    };
    serde_json::to_writer_pretty(&mut *out, &value)?;
    out.flush()?;
    Ok(())
}

fn push_csv_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        csv_escape_into(out, field);
    }
    out.push('\n');
}

/// Full value string for CSV export (NULL → empty string)
fn cell_to_export_string(cell: &CellValue) -> String {
    if cell.is_null() {
        String::new()
    } else {
        cell.display_string()
    }
}

/// Quote a field if it contains `,` `"` or a newline (RFC 4180).
fn csv_escape_into(out: &mut String, field: &str) {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        out.push('"');
        for c in field.chars() {
            if c == '"' {
                out.push_str("\"\"");
            } else {
                out.push(c);
            }
        }
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// `base[_part][_YYYYMMDD_HHMM].ext`, with path separators and other
/// characters file systems reject replaced by `_`.
pub fn file_name(
    part: Option<&str>,
    timestamp: Option<DateTime<FixedOffset>>,
    format: ExportFormat,
) -> String {
    let mut name = FILE_BASE_NAME.to_string();
    if let Some(part) = part {
        name.push('_');
        name.extend(part.chars().map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        }));
    }
    if let Some(ts) = timestamp {
        name.push_str(&ts.format("_%Y%m%d_%H%M").to_string());
    }
    name.push('.');
    name.push_str(format.extension());
    name
}

/// Writes detection results to files under the configured directory
pub struct SpreadsheetExporter {
    settings: ExportSettings,
    batch_size: usize,
    labels: Arc<Labels>,
    utc_offset: FixedOffset,
}

impl SpreadsheetExporter {
    pub fn new(
        settings: ExportSettings,
        batch_size: usize,
        labels: Arc<Labels>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            settings,
            batch_size,
            labels,
            utc_offset,
        }
    }

    /// Sheets for these results: one per query with hits, or one combined
    pub fn sheets(&self, results: &[DetectionResult]) -> Vec<Sheet> {
        let with_rows: Vec<DetectionResult> =
            results.iter().filter(|r| !r.is_empty()).cloned().collect();

        if self.settings.separate_sheets {
            group_by_query(&with_rows)
                .into_iter()
                .map(|(query, members)| {
                    Sheet::build(self.labels.sheet_name(query), &members, &self.labels, false)
                })
                .collect()
        } else {
            let members: Vec<&DetectionResult> = with_rows.iter().collect();
            let sheet = Sheet::build(COMBINED_SHEET_NAME, &members, &self.labels, true);
            if sheet.is_empty() { Vec::new() } else { vec![sheet] }
        }
    }

    /// Export with an explicit clock, for deterministic file names.
    ///
    /// # Errors
    /// Returns `SinkError::Empty` if no result has rows
    pub fn export_at(
        &self,
        results: &[DetectionResult],
        now: DateTime<FixedOffset>,
    ) -> SinkResult<Vec<PathBuf>> {
        let sheets = self.sheets(results);
        if sheets.is_empty() {
            return Err(SinkError::Empty);
        }

        fs::create_dir_all(&self.settings.output_dir)?;
        let timestamp = self.settings.include_timestamp.then_some(now);
        let format = self.settings.format;

        let mut written = Vec::new();
        match format {
            ExportFormat::Csv if self.settings.separate_sheets => {
                for sheet in &sheets {
                    let path = self.path_for(file_name(Some(&sheet.name), timestamp, format));
                    self.write_file(&path, |w| write_csv(w, sheet, self.batch_size))?;
                    written.push(path);
                }
            }
            ExportFormat::Csv => {
                let path = self.path_for(file_name(None, timestamp, format));
                self.write_file(&path, |w| write_csv(w, &sheets[0], self.batch_size))?;
                written.push(path);
            }
            ExportFormat::Json => {
                let path = self.path_for(file_name(None, timestamp, format));
                self.write_file(&path, |w| write_json(w, &sheets))?;
                written.push(path);
            }
        }

        let total_rows: usize = sheets.iter().map(|s| s.rows.len()).sum();
        for path in &written {
            tracing::info!(path = %path.display(), rows = total_rows, "결과 파일이 생성되었습니다");
        }
        Ok(written)
    }

    fn path_for(&self, name: String) -> PathBuf {
        self.settings.output_dir.join(name)
    }

    fn write_file<F>(&self, path: &Path, write: F) -> SinkResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> SinkResult<()>,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        write(&mut writer)
    }
}

impl Exporter for SpreadsheetExporter {
    fn export(&self, results: &[DetectionResult]) -> SinkResult<Vec<PathBuf>> {
        self.export_at(results, Utc::now().with_timezone(&self.utc_offset))
    }
}
