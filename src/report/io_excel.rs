use calamine::{open_workbook, DataType, Reader, Xlsx};

use survey_analysis::ResponseTable;

use crate::report::config_reader::SourceConfig;
use crate::report::io_common::build_table;
use crate::report::*;

fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Empty => String::new(),
        DataType::Int(i) => i.to_string(),
        // Whole numbers are stored as floats by most spreadsheet programs.
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::DateTime(f) => f.to_string(),
        _ => {
            warn!("cell_to_string: unreadable cell {:?}", cell);
            String::new()
        }
    }
}

fn get_range(path: &str, source: &SourceConfig) -> ReportResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, &source.worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
        path: path.to_string(),
    })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = &source.worksheet_name {
        workbook
            .worksheet_range(worksheet_name)
            .context(MissingWorksheetSnafu {
                path: path.to_string(),
                name: worksheet_name.clone(),
            })?
            .context(OpeningExcelSnafu {
                path: path.to_string(),
            })
    } else {
        workbook
            .worksheet_range_at(0)
            .context(EmptyFileSnafu {
                path: path.to_string(),
            })?
            .context(OpeningExcelSnafu {
                path: path.to_string(),
            })
    }
}

/// Reads an Excel export. The first row of the worksheet is the header.
pub fn read_excel_table(
    path: &str,
    source: &SourceConfig,
    phase_column: Option<&str>,
) -> ReportResult<ResponseTable> {
    let wrange = get_range(path, source)?;
    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(EmptyFileSnafu {
            path: path.to_string(),
        })?
        .iter()
        .map(cell_to_string)
        .collect();
    debug!("read_excel_table: header: {:?}", header);
    let rows: Vec<Vec<String>> = iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    build_table(path, &header, &rows, source, phase_column)
}
