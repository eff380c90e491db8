use std::path::Path;

use survey_analysis::builder::TableBuilder;
use survey_analysis::ResponseTable;

use crate::report::config_reader::SourceConfig;
use crate::report::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Builds a table from a header and raw rows. Empty rows are dropped.
pub fn build_table(
    path: &str,
    header: &[String],
    rows: &[Vec<String>],
    source: &SourceConfig,
    phase_column: Option<&str>,
) -> ReportResult<ResponseTable> {
    let name = simplify_file_name(path);
    let mut builder = TableBuilder::new(&name);
    if let Some(rt) = source.respondent_type_override()? {
        builder.respondent_type(rt);
    }
    if let Some(p) = source.phase_override()? {
        builder.phase(p);
    }
    if let Some(pc) = phase_column {
        builder.phase_column(pc);
    }
    builder.columns(header);
    let mut skipped = 0;
    for (idx, row) in rows.iter().enumerate() {
        if row.iter().all(|c| c.trim().is_empty()) {
            skipped += 1;
            continue;
        }
        // Spreadsheets often carry empty trailing cells beyond the header.
        let width = row
            .iter()
            .rposition(|c| !c.trim().is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        builder
            .add_row(&row[..width])
            .context(IngestSnafu {
                path: path.to_string(),
                lineno: idx + 2,
            })?;
    }
    if skipped > 0 {
        debug!("build_table: {}: skipped {} empty rows", name, skipped);
    }
    let table = builder.build();
    info!(
        "build_table: {}: {} records, {} columns",
        name,
        table.len(),
        table.columns().len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_analysis::{Phase, RespondentType};

    #[test]
    fn overrides_and_trailing_cells() {
        let mut source = SourceConfig::from_path("dir/survey.csv");
        source.respondent_type = Some("investor".to_string());
        source.phase = Some("phase 3".to_string());
        let header = vec!["q1".to_string(), "q2".to_string()];
        let rows = vec![
            vec!["a".to_string(), "b".to_string(), "".to_string()],
            vec!["".to_string(), "".to_string()],
        ];
        let t = build_table("dir/survey.csv", &header, &rows, &source, None).unwrap();
        assert_eq!(t.name(), "survey.csv");
        assert_eq!(t.len(), 1);
        assert_eq!(t.records()[0].respondent_type(), RespondentType::Investor);
        assert_eq!(t.records()[0].phase(), Phase::Phase3);
    }

    #[test]
    fn overlong_rows_are_errors() {
        let source = SourceConfig::from_path("x.csv");
        let header = vec!["q1".to_string()];
        let rows = vec![vec!["a".to_string(), "b".to_string()]];
        assert!(build_table("x.csv", &header, &rows, &source, None).is_err());
    }
}
