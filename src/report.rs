use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use survey_analysis::builder::IngestError;
use survey_analysis::crosstab::NumericSummary;
use survey_analysis::report::{
    ChartKind, ChartSpec, FactorTest, GroupedView, Overall, QuestionOutcome, QuestionReport,
    SurveyOverview, ValueAxis,
};
use survey_analysis::stats::TestOutcome;
use survey_analysis::*;

use crate::args::Args;
use crate::report::config_reader::*;
use crate::report::io_csv::read_csv_table;
use crate::report::io_excel::read_excel_table;
use crate::report::markdown::{render_markdown, SpecFileRenderer};

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod markdown;

#[derive(Debug, Snafu)]
pub enum ReportError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {name} not found in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("No data found in {path}"))]
    EmptyFile { path: String },
    #[snafu(display("Error opening JSON file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Invalid row {lineno} in {path}"))]
    Ingest {
        source: IngestError,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The analysis could not start"))]
    Analysis { source: AnalysisError },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error rendering a chart"))]
    RenderingChart { source: std::io::Error },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

// Summaries are compared textually with reference files.
fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

pub fn chart_js(chart: &ChartSpec) -> JSValue {
    let kind = match chart.kind {
        ChartKind::GroupedBar => "groupedBar",
        ChartKind::StackedBar => "stackedBar",
        ChartKind::BoxPlot => "boxPlot",
    };
    let axis = match chart.value_axis {
        ValueAxis::Percent => "percent",
        ValueAxis::Count => "count",
        ValueAxis::Value => "value",
    };
    let series: Vec<JSValue> = chart
        .series
        .iter()
        .map(|s| {
            let values: Vec<f64> = s.values.iter().map(|v| round6(*v)).collect();
            json!({"name": s.name, "values": values, "labels": s.labels})
        })
        .collect();
    json!({
        "kind": kind,
        "title": chart.title,
        "categories": chart.categories,
        "valueAxis": axis,
        "series": series
    })
}

fn test_js(outcome: &TestOutcome) -> JSValue {
    match outcome {
        Ok(r) => json!({
            "method": r.method.name(),
            "statistic": round6(r.statistic),
            "pValue": round6(r.p_value),
            "dof": r.dof,
            "significance": r.tier().marker(),
            "effectSize": r.effect_size.map(|e| json!({
                "name": e.name(),
                "value": round6(e.value()),
                "magnitude": e.magnitude().label()
            })),
            "lowExpectedFraction": r.low_expected_fraction.map(round6)
        }),
        Err(a) => json!({ "notPerformed": a.to_string() }),
    }
}

fn numeric_summary_js(s: &NumericSummary) -> JSMap<String, JSValue> {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("count".to_string(), json!(s.count));
    m.insert("mean".to_string(), json!(round6(s.mean)));
    m.insert("stdDev".to_string(), json!(s.std_dev.map(round6)));
    m.insert("min".to_string(), json!(round6(s.min)));
    m.insert("q1".to_string(), json!(round6(s.q1)));
    m.insert("median".to_string(), json!(round6(s.median)));
    m.insert("q3".to_string(), json!(round6(s.q3)));
    m.insert("max".to_string(), json!(round6(s.max)));
    m
}

fn view_js(view: &GroupedView) -> JSValue {
    match view {
        GroupedView::Categorical(ct) => {
            let groups: Vec<String> = ct.groups().iter().map(|g| g.to_string()).collect();
            let percents: Vec<Vec<f64>> = (0..ct.categories().len())
                .map(|i| {
                    (0..ct.groups().len())
                        .map(|j| round6(ct.column_percent(i, j)))
                        .collect()
                })
                .collect();
            json!({
                "categories": ct.categories(),
                "groups": groups,
                "counts": ct.counts(),
                "columnPercents": percents
            })
        }
        GroupedView::Numeric(summaries) => {
            let groups: Vec<JSValue> = summaries
                .iter()
                .map(|(g, s)| {
                    let mut m = numeric_summary_js(s);
                    m.insert("group".to_string(), json!(g.to_string()));
                    JSValue::Object(m)
                })
                .collect();
            json!({ "groups": groups })
        }
        GroupedView::MultiSelect(ot) => {
            let groups: Vec<String> = ot.groups().iter().map(|g| g.to_string()).collect();
            let respondents: Vec<u64> = (0..ot.groups().len()).map(|j| ot.respondents(j)).collect();
            let mentions: Vec<Vec<u64>> = (0..ot.options().len())
                .map(|i| (0..ot.groups().len()).map(|j| ot.mentions(i, j)).collect())
                .collect();
            json!({
                "options": ot.options(),
                "groups": groups,
                "respondents": respondents,
                "mentions": mentions
            })
        }
    }
}

fn overall_js(overall: &Overall) -> JSValue {
    match overall {
        Overall::Categories(rows) => {
            let rows: Vec<JSValue> = rows
                .iter()
                .map(|(c, n, p)| json!({"answer": c, "count": n, "percent": round6(*p)}))
                .collect();
            JSValue::Array(rows)
        }
        Overall::Numeric(s) => JSValue::Object(numeric_summary_js(s)),
    }
}

fn question_js(q: &QuestionReport) -> JSValue {
    let sources: Vec<JSValue> = q
        .sources
        .iter()
        .map(|s| json!({"table": s.table, "column": s.column, "strategy": s.strategy}))
        .collect();
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("question".to_string(), json!(q.question));
    m.insert("title".to_string(), json!(q.title));
    m.insert("description".to_string(), json!(q.description));
    m.insert("sources".to_string(), JSValue::Array(sources));
    m.insert("answered".to_string(), json!(q.answered));
    m.insert("eligible".to_string(), json!(q.eligible));
    let status = match &q.outcome {
        QuestionOutcome::NotPresent => "notPresent",
        QuestionOutcome::NoValidResponses => "noValidResponses",
        QuestionOutcome::Failed(msg) => {
            m.insert("error".to_string(), json!(msg));
            "failed"
        }
        QuestionOutcome::Analyzed(a) => {
            let factors: Vec<JSValue> = a
                .factors
                .iter()
                .map(|f| {
                    let test = match &f.test {
                        FactorTest::Single(t) => test_js(t),
                        FactorTest::PerOption(tests) => JSValue::Array(
                            tests
                                .iter()
                                .map(|(o, t)| json!({"option": o, "test": test_js(t)}))
                                .collect(),
                        ),
                    };
                    json!({
                        "factor": f.factor.label(),
                        "view": view_js(&f.view),
                        "test": test,
                        "chart": chart_js(&f.chart),
                        "narrative": f.narrative
                    })
                })
                .collect();
            m.insert("kind".to_string(), json!(a.kind.label()));
            m.insert("respondents".to_string(), json!(a.respondents));
            m.insert("overall".to_string(), overall_js(&a.overall));
            m.insert("factors".to_string(), JSValue::Array(factors));
            "analyzed"
        }
    };
    m.insert("status".to_string(), json!(status));
    JSValue::Object(m)
}

fn overview_js(o: &SurveyOverview) -> JSValue {
    let respondents: Vec<JSValue> = o
        .respondents
        .iter()
        .map(|s| json!({"group": s.group.label(), "count": s.count, "percent": round6(s.percent)}))
        .collect();
    let phases: Vec<JSValue> = o
        .phases
        .iter()
        .map(|s| json!({"group": s.group.label(), "count": s.count, "percent": round6(s.percent)}))
        .collect();
    let completeness = o.completeness.as_ref().map(|c| {
        let high_missing: Vec<JSValue> = c
            .high_missing
            .iter()
            .map(|(t, p)| json!({"title": t, "missingPercent": round6(*p)}))
            .collect();
        json!({
            "questions": c.questions,
            "percent": round6(c.percent),
            "quality": c.quality.label(),
            "highMissing": high_missing
        })
    });
    let findings: Vec<JSValue> = o
        .key_findings
        .iter()
        .map(|k| {
            json!({
                "question": k.question,
                "title": k.title,
                "factor": k.factor.label(),
                "option": k.option,
                "method": k.method.name(),
                "pValue": round6(k.p_value),
                "significance": k.tier.marker()
            })
        })
        .collect();
    json!({
        "totalRecords": o.total_records,
        "respondents": respondents,
        "respondentRatio": o.respondent_ratio.map(round6),
        "phases": phases,
        "dominantPhase": o.dominant_phase.map(|s| s.group.label()),
        "completeness": completeness,
        "keyFindings": findings
    })
}

/// The JSON summary of a report.
pub fn summary_js(title: &str, report: &SurveyReport) -> JSValue {
    let merge_groups: Vec<JSValue> = report
        .merge_groups
        .iter()
        .filter(|g| g.is_merged())
        .map(|g| json!({"representative": g.representative, "members": g.members}))
        .collect();
    let questions: Vec<JSValue> = report.questions.iter().map(question_js).collect();
    json!({
        "config": { "reportTitle": title },
        "overview": overview_js(&report.overview),
        "questions": questions,
        "mergeGroups": merge_groups
    })
}

fn read_tables(
    sources: &[(PathBuf, SourceConfig)],
    phase_column: Option<&str>,
) -> ReportResult<Vec<ResponseTable>> {
    let mut tables: Vec<ResponseTable> = Vec::new();
    for (path, source) in sources.iter() {
        let p = path.display().to_string();
        info!("Attempting to read survey file {:?}", p);
        let table = match source.provider.as_str() {
            "csv" => read_csv_table(&p, source, phase_column)?,
            "xlsx" => read_excel_table(&p, source, phase_column)?,
            x => whatever!("Provider not implemented {:?}", x),
        };
        tables.push(table);
    }
    Ok(tables)
}

fn write_output(out: Option<&str>, contents: &str) -> ReportResult<()> {
    match out {
        None | Some("") | Some("stdout") => {
            println!("{}", contents);
            Ok(())
        }
        Some(p) => fs::write(p, contents).context(WritingOutputSnafu {
            path: p.to_string(),
        }),
    }
}

pub fn run_report(args: &Args) -> ReportResult<()> {
    let (config, root) = match &args.config {
        Some(config_path) => {
            let config_p = Path::new(config_path.as_str());
            let config = read_config(config_p)?;
            let root = config_p.parent().context(MissingParentDirSnafu {})?;
            (config, root.to_path_buf())
        }
        None if !args.input.is_empty() => (ReportConfig::for_inputs(&args.input), PathBuf::new()),
        None => whatever!("Either a configuration file or input files must be provided"),
    };
    info!("config: {:?}", config);

    // Files given on the command line are relative to the working directory.
    let sources: Vec<(PathBuf, SourceConfig)> = if args.input.is_empty() {
        config
            .sources
            .iter()
            .map(|s| (root.join(&s.file_path), s.clone()))
            .collect()
    } else {
        args.input
            .iter()
            .map(|p| (PathBuf::from(p), SourceConfig::from_path(p)))
            .collect()
    };
    if sources.is_empty() {
        whatever!("No survey file sources detected");
    }

    let tables = read_tables(&sources, config.phase_column.as_deref())?;
    let analysis_config = config.analysis_config(&root)?;
    let mode = config.analysis_mode(&root, args.mode.as_deref())?;
    debug!("run_report: mode: {:?}", mode);

    let report = run_survey_analysis(&tables, &mode, &analysis_config).context(AnalysisSnafu {})?;

    let summary = summary_js(&config.report_title, &report);
    let pretty_js_summary = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu {})?;

    let output = match args.format.as_deref().unwrap_or("json") {
        "json" => pretty_js_summary.clone(),
        "markdown" | "md" => {
            let mut renderer = SpecFileRenderer::in_temp_dir().context(RenderingChartSnafu {})?;
            render_markdown(&config.report_title, &report, &mut renderer)?
        }
        x => whatever!("Unknown output format {:?} (expected json or markdown)", x),
    };
    write_output(args.out.as_deref(), &output)?;

    // The reference summary, if provided for comparison
    if let Some(reference) = &args.reference {
        let summary_ref = read_summary(Path::new(reference))?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_str(),
                "\n",
            );
            whatever!("Difference detected between computed summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_analysis::builder::TableBuilder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("survey_report_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn in_memory_pipeline() {
        init();
        let company = {
            let mut b = TableBuilder::new("公司問卷.csv");
            b.columns(&["大股東合計持股比例"]);
            b.add_row(&["50-60%"]).unwrap();
            b.build()
        };
        let investor = {
            let mut b = TableBuilder::new("投資方問卷.csv");
            b.columns(&["您投資的公司之大股東合計持股比例"]);
            b.add_row(&["10-20%"]).unwrap();
            b.build()
        };
        let mode = AnalysisMode::Topics(vec![Topic::new("大股東合計持股比例", "Major shareholders")]);
        let report =
            run_survey_analysis(&[company, investor], &mode, &AnalysisConfig::default()).unwrap();
        let js = summary_js("Governance", &report);
        let q = &js["questions"][0];
        assert_eq!(q["status"], json!("analyzed"));
        let f = &q["factors"][0];
        assert_eq!(f["factor"], json!("respondent type"));
        assert_eq!(f["view"]["categories"], json!(["10-20%", "50-60%"]));
        assert_eq!(f["view"]["groups"], json!(["company", "investor"]));
        assert_eq!(f["view"]["counts"], json!([[0, 1], [1, 0]]));
        assert!(f["test"]["notPerformed"].is_string());
        assert!(f["narrative"]
            .as_str()
            .unwrap()
            .contains("test not performed"));
        assert_eq!(f["chart"]["kind"], json!("groupedBar"));
    }

    #[test]
    fn csv_files_end_to_end() {
        init();
        let dir = scratch_dir("e2e");
        fs::write(
            dir.join("公司問卷.csv"),
            "大股東合計持股比例,填答時間\n50-60%,2023/01/01\n",
        )
        .unwrap();
        fs::write(
            dir.join("投資方問卷.csv"),
            "您投資的公司之大股東合計持股比例\n１０％～２０％\n",
        )
        .unwrap();
        fs::write(
            dir.join("config.json"),
            r#"{
                "reportTitle": "Governance",
                "sources": [
                    { "filePath": "公司問卷.csv", "provider": "csv" },
                    { "filePath": "投資方問卷.csv", "provider": "csv" }
                ],
                "analysisMode": "topics",
                "topics": [
                    { "question": "大股東合計持股比例", "title": "Major shareholders" },
                    { "question": "董事會成員人數" }
                ]
            }"#,
        )
        .unwrap();
        let config = dir.join("config.json").display().to_string();
        let out_json = dir.join("out.json").display().to_string();
        let args = Args {
            config: Some(config.clone()),
            out: Some(out_json.clone()),
            ..Args::default()
        };
        run_report(&args).unwrap();
        let js: JSValue = serde_json::from_str(&fs::read_to_string(&out_json).unwrap()).unwrap();
        assert_eq!(js["questions"][0]["answered"], json!(2));
        assert_eq!(
            js["questions"][0]["factors"][0]["view"]["categories"],
            json!(["10-20%", "50-60%"])
        );
        assert_eq!(js["questions"][1]["status"], json!("notPresent"));

        // The output matches itself as a reference.
        let args_ref = Args {
            config: Some(config.clone()),
            out: Some(dir.join("out2.json").display().to_string()),
            reference: Some(out_json.clone()),
            ..Args::default()
        };
        assert!(run_report(&args_ref).is_ok());

        let bad_ref = dir.join("bad_ref.json");
        fs::write(&bad_ref, "{}").unwrap();
        let args_bad = Args {
            reference: Some(bad_ref.display().to_string()),
            ..args_ref.clone()
        };
        assert!(run_report(&args_bad).is_err());

        let out_md = dir.join("out.md").display().to_string();
        let args_md = Args {
            config: Some(config),
            out: Some(out_md.clone()),
            format: Some("markdown".to_string()),
            ..Args::default()
        };
        run_report(&args_md).unwrap();
        let md = fs::read_to_string(&out_md).unwrap();
        assert!(md.starts_with("# Governance"));
        assert!(md.contains("## 1. Major shareholders"));
        assert!(md.contains("\"kind\": \"groupedBar\""));
        assert!(md.contains("test not performed"));
        assert!(md.contains("not present in any of the sources"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn merged_mode_from_inputs() {
        init();
        let dir = scratch_dir("merged");
        let a = dir.join("公司問卷.csv");
        let b = dir.join("投資方問卷.csv");
        fs::write(&a, "大股東合計持股比例\n50-60%\n").unwrap();
        fs::write(&b, "您投資的公司之大股東合計持股比例\n10-20%\n").unwrap();
        let out = dir.join("out.json").display().to_string();
        let args = Args {
            input: vec![a.display().to_string(), b.display().to_string()],
            out: Some(out.clone()),
            ..Args::default()
        };
        run_report(&args).unwrap();
        let js: JSValue = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(js["questions"].as_array().map(|a| a.len()), Some(1));
        assert_eq!(
            js["mergeGroups"][0]["representative"],
            json!("大股東合計持股比例")
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_inputs_are_errors() {
        init();
        assert!(run_report(&Args::default()).is_err());
        let args = Args {
            config: Some("/nonexistent/config.json".to_string()),
            ..Args::default()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::OpeningJson { .. })
        ));
    }
}
