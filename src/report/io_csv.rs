// Primitives for reading CSV files.

use survey_analysis::ResponseTable;

use crate::report::config_reader::SourceConfig;
use crate::report::io_common::build_table;
use crate::report::*;

/// Reads a CSV export. The first row is the header; rows may have different
/// lengths.
pub fn read_csv_table(
    path: &str,
    source: &SourceConfig,
    phase_column: Option<&str>,
) -> ReportResult<ResponseTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path.to_string(),
        })?;
    let mut records = rdr.into_records();
    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu {
                path: path.to_string(),
                lineno: 1_usize,
            })?
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                // Exports from spreadsheet programs start with a byte order mark.
                if idx == 0 {
                    s.trim_start_matches('\u{feff}').to_string()
                } else {
                    s.to_string()
                }
            })
            .collect(),
        None => {
            return EmptyFileSnafu {
                path: path.to_string(),
            }
            .fail()
        }
    };
    debug!("read_csv_table: header: {:?}", header);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {
            path: path.to_string(),
            lineno,
        })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    build_table(path, &header, &rows, source, phase_column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_multiline_cells_and_bom() {
        let dir = std::env::temp_dir().join(format!("survey_csv_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("公司問卷.csv");
        fs::write(
            &path,
            "\u{feff}【單選】是否設有審計委員會,資訊揭露管道\n是,\"網站\n年報\"\n否\n",
        )
        .unwrap();
        let p = path.display().to_string();
        let t = read_csv_table(&p, &SourceConfig::from_path(&p), None).unwrap();
        assert_eq!(
            t.columns(),
            &["是否設有審計委員會".to_string(), "資訊揭露管道".to_string()]
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.records()[0].get("資訊揭露管道"), Some("網站\n年報"));
        assert!(t.records()[1].is_missing("資訊揭露管道"));
        fs::remove_dir_all(&dir).unwrap();

        assert!(read_csv_table("/nonexistent/x.csv", &SourceConfig::from_path("x.csv"), None).is_err());
    }
}
