//! Delimited text reader: `encoding_rs` for decoding, polars for parsing.

use super::SourceKind;
use crate::config::SourceConfig;
use crate::error::{PipelineError, Result, ResultExt};
use encoding_rs::Encoding;
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::io::Cursor;
use tracing::warn;

/// Read `required` columns of a delimited file as text.
///
/// Header names are matched after trimming surrounding whitespace.
pub(super) fn read_delimited(
    kind: SourceKind,
    source: &SourceConfig,
    required: &[&str],
) -> Result<DataFrame> {
    let text = decode_file(source)?;

    let has_header = text
        .lines()
        .nth(source.skip_rows)
        .is_some_and(|line| !line.trim().is_empty());
    if !has_header {
        return Err(PipelineError::MissingHeader {
            kind,
            skip_rows: source.skip_rows,
        });
    }

    let separator = u8::try_from(source.separator).map_err(|_| {
        PipelineError::InvalidConfig(format!("separator {:?} is not ASCII", source.separator))
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_skip_rows(source.skip_rows)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"'))
                .with_truncate_ragged_lines(true),
        )
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()
        .context(format!("Failed to parse {} file {}", kind, source.path.display()))?;

    let mut columns = Vec::with_capacity(required.len());
    for &column in required {
        let actual = df
            .get_column_names()
            .into_iter()
            .find(|name| name.trim() == column)
            .cloned()
            .ok_or_else(|| PipelineError::ColumnNotFound {
                kind,
                column: column.to_string(),
            })?;
        let series = df
            .column(actual.as_str())?
            .as_materialized_series()
            .clone()
            .with_name(column.into());
        columns.push(Column::from(series));
    }

    Ok(DataFrame::new(columns)?)
}

fn decode_file(source: &SourceConfig) -> Result<String> {
    let label = source.encoding.trim();
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| PipelineError::UnsupportedEncoding(label.to_string()))?;

    let bytes = std::fs::read(&source.path)?;
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!(
            "{} contained bytes invalid in {}; they were replaced",
            source.path.display(),
            used.name()
        );
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(bytes: &[u8], encoding: &str, skip_rows: usize) -> (tempfile::TempDir, SourceConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.csv");
        std::fs::write(&path, bytes).unwrap();
        let mut source = SourceConfig::delimited(path, ';', encoding);
        source.skip_rows = skip_rows;
        (dir, source)
    }

    #[test]
    fn test_reads_latin1_as_text() {
        // "Vitória" with ó encoded as a single latin1 byte.
        let bytes = b"SG_UF;NO_MUNICIPIO;QT\nES;Vit\xf3ria;012\n";
        let (_dir, source) = write_source(bytes, "latin1", 0);

        let df = read_delimited(SourceKind::Enrollment, &source, &["NO_MUNICIPIO", "QT"]).unwrap();

        assert_eq!(df.get_column_names_str(), vec!["NO_MUNICIPIO", "QT"]);
        let names = df.column("NO_MUNICIPIO").unwrap().as_materialized_series().clone();
        assert_eq!(names.str().unwrap().get(0), Some("Vitória"));
        // Leading zeros survive because nothing is inferred.
        let counts = df.column("QT").unwrap().as_materialized_series().clone();
        assert_eq!(counts.str().unwrap().get(0), Some("012"));
    }

    #[test]
    fn test_skip_rows_and_trimmed_headers() {
        let bytes = b"Title line\nnotes\n SG_UF ;REDE\nES;Estadual\n";
        let (_dir, source) = write_source(bytes, "utf-8", 2);

        let df = read_delimited(SourceKind::Index, &source, &["SG_UF", "REDE"]).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.get_column_names_str(), vec!["SG_UF", "REDE"]);
    }

    #[test]
    fn test_missing_column() {
        let (_dir, source) = write_source(b"SG_UF;REDE\nES;Estadual\n", "utf-8", 0);

        let err = read_delimited(SourceKind::Rates, &source, &["NO_CATEGORIA"]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ColumnNotFound { kind: SourceKind::Rates, ref column } if column == "NO_CATEGORIA"
        ));
    }

    #[test]
    fn test_header_past_end() {
        let (_dir, source) = write_source(b"SG_UF\nES\n", "utf-8", 5);

        let err = read_delimited(SourceKind::Index, &source, &["SG_UF"]).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_HEADER");
    }

    #[test]
    fn test_unknown_encoding() {
        let (_dir, source) = write_source(b"SG_UF\nES\n", "klingon-8", 0);

        let err = read_delimited(SourceKind::Index, &source, &["SG_UF"]).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_ENCODING");
    }
}
