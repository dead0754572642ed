//! Workbook export of a workspace snapshot.
//!
//! Export only ever reads the snapshot it is handed; the caller's state is
//! never touched.

use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::Value;

use crate::error::ExportError;
use crate::state::WorkspaceData;

const MAX_SHEET_NAME: usize = 31;

/// Convert a workspace to XLSX, one worksheet per sequence.
///
/// Array elements become rows. Object elements become rows too, with a header
/// row taken from the first object's keys. Anything else fills column A.
///
/// # Arguments
/// * `workspace` - Snapshot of the workspace sequences
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes or an error
pub fn to_xlsx(workspace: &WorkspaceData) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();

    for (name, rows) in &workspace.0 {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&sheet_name(name))?;

        for (r, cells) in table_rows(rows).iter().enumerate() {
            for (c, value) in cells.iter().enumerate() {
                write_cell(&mut worksheet, r as u32, c as u16, value)?;
            }
        }

        workbook.push_worksheet(worksheet);
    }

    if workspace.0.is_empty() {
        workbook.push_worksheet(Worksheet::new());
    }

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

/// Convert one named sequence to CSV.
///
/// Values containing commas, quotes or newlines are quoted and inner quotes
/// doubled.
pub fn to_csv(workspace: &WorkspaceData, sequence: &str) -> Result<String, ExportError> {
    let rows = workspace
        .sequence(sequence)
        .ok_or_else(|| ExportError::UnknownSequence(sequence.to_string()))?;

    let mut csv_content = String::new();
    for cells in table_rows(rows) {
        let line: Vec<String> = cells.iter().map(|value| escape_csv(&plain_text(value))).collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }
    Ok(csv_content)
}

/// Flatten a sequence into rows of cells, prefixing a header row when the
/// elements are objects.
fn table_rows(rows: &[Value]) -> Vec<Vec<Value>> {
    let header: Option<Vec<String>> = match rows.first() {
        Some(Value::Object(first)) => Some(first.keys().cloned().collect()),
        _ => None,
    };

    let mut table = Vec::with_capacity(rows.len() + 1);
    if let Some(keys) = &header {
        table.push(keys.iter().map(|k| Value::String(k.clone())).collect());
    }

    for row in rows {
        let cells = match (row, &header) {
            (Value::Array(cells), _) => cells.clone(),
            (Value::Object(fields), Some(keys)) => keys
                .iter()
                .map(|k| fields.get(k).cloned().unwrap_or(Value::Null))
                .collect(),
            (other, _) => vec![other.clone()],
        };
        table.push(cells);
    }
    table
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
) -> Result<(), ExportError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(number) => {
                worksheet.write_number(row, col, number)?;
            }
            None => {
                worksheet.write_string(row, col, &n.to_string())?;
            }
        },
        other => {
            worksheet.write_string(row, col, &plain_text(other))?;
        }
    }
    Ok(())
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Worksheet names are capped at 31 characters and may not contain `[]:*?/\`.
fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(MAX_SHEET_NAME)
        .collect();
    if cleaned.is_empty() {
        column_to_letter(1)
    } else {
        cleaned
    }
}

/// Convert column number to letter (A=1, B=2, etc.)
///
/// ```ignore
/// assert_eq!(column_to_letter(1), "A");
/// assert_eq!(column_to_letter(27), "AA");
/// ```
fn column_to_letter(col: u16) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}
