//! Workbook reader built on `calamine`.

use super::SourceKind;
use crate::error::{PipelineError, Result, ResultExt};
use calamine::{Data, Reader, open_workbook_auto};
use polars::prelude::*;
use std::path::Path;

/// Read `required` columns from a named sheet, header row after `skip_rows`.
///
/// `skip_rows` counts from the first row of the sheet, as a spreadsheet
/// user would, even when the used range starts further down.
pub(super) fn read_sheet(
    kind: SourceKind,
    path: &Path,
    sheet: &str,
    skip_rows: usize,
    required: &[&str],
) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)
        .context(format!("Failed to open {} workbook {}", kind, path.display()))?;

    let available = workbook.sheet_names();
    if !available.iter().any(|name| name == sheet) {
        return Err(PipelineError::SheetNotFound {
            kind,
            sheet: sheet.to_string(),
            available,
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .context(format!("Failed to read sheet '{}'", sheet))?;

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows().skip(skip_rows.saturating_sub(first_row));

    let header: Vec<String> = rows
        .next()
        .ok_or(PipelineError::MissingHeader { kind, skip_rows })?
        .iter()
        .map(|cell| cell_text(cell).map(|s| s.trim().to_string()).unwrap_or_default())
        .collect();
    if header.iter().all(String::is_empty) {
        return Err(PipelineError::MissingHeader { kind, skip_rows });
    }

    let positions = required
        .iter()
        .map(|&column| {
            header
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| PipelineError::ColumnNotFound {
                    kind,
                    column: column.to_string(),
                })
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); required.len()];
    for row in rows {
        let cells: Vec<Option<String>> = positions
            .iter()
            .map(|&idx| row.get(idx).and_then(cell_text))
            .collect();
        // Blank lines between the table and trailing notes.
        if cells.iter().all(Option::is_none) {
            continue;
        }
        for (column, cell) in values.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    let columns: Vec<Column> = required
        .iter()
        .zip(values)
        .map(|(&name, column)| Column::new(name.into(), column))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Render a cell as text; numbers use the shortest round-trip form.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_numbers() {
        assert_eq!(cell_text(&Data::Float(3205309.0)), Some("3205309".to_string()));
        assert_eq!(cell_text(&Data::Float(98.4)), Some("98.4".to_string()));
        assert_eq!(cell_text(&Data::Int(2)), Some("2".to_string()));
    }

    #[test]
    fn test_cell_text_blank() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String("   ".to_string())), None);
        assert_eq!(cell_text(&Data::String("-".to_string())), Some("-".to_string()));
    }

    #[test]
    fn test_missing_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let result = read_sheet(SourceKind::Index, &path, "IDEB", 0, &["REDE"]);
        assert!(result.is_err());
    }
}
