//! Participant roster import from CSV files and Excel workbooks.
//!
//! Column headers vary wildly between spreadsheets, so they are matched after
//! normalization (lowercase, alphanumerics only) against a list of candidates.

use calamine::{open_workbook_auto_from_rs, Reader};
use serde_json::{Map, Value};
use std::io::Cursor;
use thiserror::Error;

const NAME_COLUMNS: &[&str] = &["name", "fullname", "studentname", "participantname"];
const EMAIL_COLUMNS: &[&str] = &["email", "emailid", "mail", "contactemail"];
const MES_ID_COLUMNS: &[&str] = &["mesid", "mes"];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheets,
    #[error("sheet must have a header row and at least one data row")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Csv,
    Workbook,
}

impl SheetKind {
    /// `.csv` files are parsed as CSV; everything else as a workbook.
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.to_ascii_lowercase().ends_with(".csv") {
            SheetKind::Csv
        } else {
            SheetKind::Workbook
        }
    }
}

/// One accepted roster row.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub full_name: String,
    /// Always lowercase.
    pub email: String,
    pub mes_id: Option<String>,
    /// The untouched row, keyed by original header.
    pub extra_data: Value,
}

#[derive(Debug, Default)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
    pub skipped: usize,
}

pub fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

type Row = Map<String, Value>;

fn pick(row: &Row, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        row.iter()
            .filter(|(key, _)| normalize_key(key) == *candidate)
            .find_map(|(_, value)| value.as_str().map(str::trim).filter(|v| !v.is_empty()))
            .map(str::to_string)
    })
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Row>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Row>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::NoSheets)?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut lines = range.rows();
    let headers: Vec<String> = match lines.next() {
        Some(cells) => cells.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    let rows = lines
        .filter(|cells| cells.iter().any(|c| !c.to_string().trim().is_empty()))
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), Value::String(cell.to_string().trim().to_string())))
                .collect::<Row>()
        })
        .collect();
    Ok(rows)
}

/// Parses a roster sheet. Rows without a name or an email are counted in
/// [`Roster::skipped`] rather than failing the import.
pub fn parse_roster(bytes: &[u8], kind: SheetKind) -> Result<Roster, ImportError> {
    let rows = match kind {
        SheetKind::Csv => read_csv(bytes)?,
        SheetKind::Workbook => read_workbook(bytes)?,
    };
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }

    let mut roster = Roster::default();
    for row in rows {
        let (Some(full_name), Some(email)) = (pick(&row, NAME_COLUMNS), pick(&row, EMAIL_COLUMNS)) else {
            roster.skipped += 1;
            continue;
        };
        roster.entries.push(RosterEntry {
            full_name,
            email: email.to_lowercase(),
            mes_id: pick(&row, MES_ID_COLUMNS),
            extra_data: Value::Object(row),
        });
    }

    tracing::info!(
        accepted = roster.entries.len(),
        skipped = roster.skipped,
        "parsed participant roster"
    );
    Ok(roster)
}
