// Markdown rendering of an assembled report.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use survey_analysis::artifacts::{ArtifactGuard, ChartRenderer};
use survey_analysis::crosstab::NumericSummary;
use survey_analysis::report::{
    ChartSpec, FactorAnalysis, FactorTest, GroupedView, Overall, QuestionOutcome, QuestionReport,
    SurveyReport,
};
use survey_analysis::stats::TestOutcome;

use crate::report::*;

/// Writes each chart specification as a JSON file in a directory.
pub struct SpecFileRenderer {
    dir: PathBuf,
}

impl SpecFileRenderer {
    pub fn new(dir: PathBuf) -> SpecFileRenderer {
        SpecFileRenderer { dir }
    }

    /// A renderer writing into a fresh directory under the system temporary
    /// directory. The directory is removed with the renderer.
    pub fn in_temp_dir() -> io::Result<SpecFileRenderer> {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "survey-report-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&dir)?;
        Ok(SpecFileRenderer::new(dir))
    }
}

impl Drop for SpecFileRenderer {
    fn drop(&mut self) {
        // Only empty directories are removed.
        if let Err(e) = fs::remove_dir(&self.dir) {
            debug!("SpecFileRenderer: could not remove {:?}: {}", self.dir, e);
        }
    }
}

impl ChartRenderer for SpecFileRenderer {
    fn render(&mut self, chart: &ChartSpec, stem: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", stem));
        let contents = serde_json::to_string_pretty(&chart_js(chart))?;
        fs::write(&path, contents)?;
        Ok(path)
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " / ")
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |\n", cells.join(" | "))
}

fn table_header(cells: &[String]) -> String {
    let mut s = table_row(cells);
    s.push_str(&table_row(&vec!["---".to_string(); cells.len()]));
    s
}

fn test_line(outcome: &TestOutcome) -> String {
    match outcome {
        Ok(r) => {
            let mut s = format!(
                "{}: {} = {:.3}",
                r.method,
                r.method.statistic_symbol(),
                r.statistic
            );
            if let Some(dof) = r.dof {
                let _ = write!(s, ", df = {}", dof);
            }
            let _ = write!(s, ", p = {:.4} ({})", r.p_value, r.tier().marker());
            if let Some(e) = r.effect_size {
                let _ = write!(
                    s,
                    ", {} = {:.3} ({})",
                    e.name(),
                    e.value(),
                    e.magnitude().label()
                );
            }
            if let Some(f) = r.low_expected_fraction.filter(|f| *f > 0.0) {
                let _ = write!(s, ", {:.0}% of expected counts below 5", 100.0 * f);
            }
            s
        }
        Err(a) => format!("test not performed ({})", a),
    }
}

fn summary_cells(label: String, s: &NumericSummary) -> Vec<String> {
    vec![
        label,
        s.count.to_string(),
        format!("{:.2}", s.mean),
        s.std_dev
            .map(|x| format!("{:.2}", x))
            .unwrap_or_else(|| "-".to_string()),
        format!("{}", s.min),
        format!("{}", s.q1),
        format!("{}", s.median),
        format!("{}", s.q3),
        format!("{}", s.max),
    ]
}

fn summary_header(first: &str) -> String {
    table_header(
        &[first, "n", "mean", "sd", "min", "q1", "median", "q3", "max"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<String>>(),
    )
}

fn render_view(out: &mut String, factor: &FactorAnalysis) {
    match &factor.view {
        GroupedView::Categorical(ct) => {
            let mut header = vec!["Answer".to_string()];
            header.extend(ct.groups().iter().map(|g| g.to_string()));
            header.push("Total".to_string());
            out.push_str(&table_header(&header));
            for (i, c) in ct.categories().iter().enumerate() {
                let mut cells = vec![escape_cell(c)];
                for j in 0..ct.groups().len() {
                    cells.push(format!("{} ({:.1}%)", ct.count(i, j), ct.column_percent(i, j)));
                }
                cells.push(ct.row_total(i).to_string());
                out.push_str(&table_row(&cells));
            }
            let mut totals = vec!["Total".to_string()];
            totals.extend((0..ct.groups().len()).map(|j| ct.column_total(j).to_string()));
            totals.push(ct.grand_total().to_string());
            out.push_str(&table_row(&totals));
        }
        GroupedView::Numeric(summaries) => {
            out.push_str(&summary_header("Group"));
            for (g, s) in summaries.iter() {
                out.push_str(&table_row(&summary_cells(g.to_string(), s)));
            }
        }
        GroupedView::MultiSelect(ot) => {
            let mut header = vec!["Option".to_string()];
            header.extend(
                (0..ot.groups().len()).map(|j| format!("{} (n={})", ot.groups()[j], ot.respondents(j))),
            );
            out.push_str(&table_header(&header));
            for (i, o) in ot.options().iter().enumerate() {
                let mut cells = vec![escape_cell(o)];
                for j in 0..ot.groups().len() {
                    cells.push(format!("{} ({:.1}%)", ot.mentions(i, j), ot.percent(i, j)));
                }
                out.push_str(&table_row(&cells));
            }
        }
    }
    out.push('\n');
}

fn render_tests(out: &mut String, test: &FactorTest) {
    match test {
        FactorTest::Single(t) => {
            let _ = writeln!(out, "**Test:** {}\n", test_line(t));
        }
        FactorTest::PerOption(tests) => {
            out.push_str("**Tests per option:**\n\n");
            for (o, t) in tests.iter() {
                let _ = writeln!(out, "- {}: {}", escape_cell(o), test_line(t));
            }
            out.push('\n');
        }
    }
}

fn render_overall(out: &mut String, overall: &Overall) {
    match overall {
        Overall::Categories(rows) => {
            out.push_str(&table_header(&[
                "Answer".to_string(),
                "Count".to_string(),
                "Percent".to_string(),
            ]));
            for (c, n, p) in rows.iter() {
                out.push_str(&table_row(&[escape_cell(c), n.to_string(), format!("{:.1}%", p)]));
            }
        }
        Overall::Numeric(s) => {
            out.push_str(&summary_header(""));
            out.push_str(&table_row(&summary_cells("All".to_string(), s)));
        }
    }
    out.push('\n');
}

fn render_question<R: ChartRenderer>(
    out: &mut String,
    idx: usize,
    q: &QuestionReport,
    guard: &mut ArtifactGuard,
    renderer: &mut R,
) -> ReportResult<()> {
    let _ = writeln!(out, "## {}. {}\n", idx + 1, q.title);
    if q.title != q.question {
        let _ = writeln!(out, "_Question: {}_\n", q.question);
    }
    if let Some(d) = &q.description {
        let _ = writeln!(out, "{}\n", d);
    }
    if !q.sources.is_empty() {
        let sources: Vec<String> = q
            .sources
            .iter()
            .map(|s| format!("{} / {} ({})", s.table, s.column, s.strategy))
            .collect();
        let _ = writeln!(out, "Sources: {}\n", sources.join("; "));
    }
    match &q.outcome {
        QuestionOutcome::NotPresent => {
            out.push_str("> This question is not present in any of the sources.\n\n");
        }
        QuestionOutcome::NoValidResponses => {
            out.push_str("> No valid responses.\n\n");
        }
        QuestionOutcome::Failed(msg) => {
            let _ = writeln!(out, "> The analysis of this question failed: {}\n", msg);
        }
        QuestionOutcome::Analyzed(a) => {
            let _ = writeln!(
                out,
                "{} answers from {} of {} respondents ({}).\n",
                a.kind.label(),
                q.answered,
                q.eligible,
                format_percent(q.answered, q.eligible)
            );
            render_overall(out, &a.overall);
            for (fidx, f) in a.factors.iter().enumerate() {
                let _ = writeln!(out, "### By {}\n", f.factor);
                render_view(out, f);
                render_tests(out, &f.test);
                let stem = format!("chart_{:03}_{}", idx + 1, fidx + 1);
                let path = guard
                    .render_with(renderer, &f.chart, &stem)
                    .context(RenderingChartSnafu {})?;
                let contents = fs::read_to_string(path).context(RenderingChartSnafu {})?;
                let _ = writeln!(out, "```json\n{}\n```\n", contents);
                let _ = writeln!(out, "{}\n", f.narrative);
            }
        }
    }
    Ok(())
}

fn format_percent(n: usize, total: usize) -> String {
    if total == 0 {
        "-".to_string()
    } else {
        format!("{:.1}%", 100.0 * n as f64 / total as f64)
    }
}

fn render_overview(out: &mut String, report: &SurveyReport) {
    let o = &report.overview;
    out.push_str("## Overview\n\n");
    let _ = writeln!(out, "- Responses: {}", o.total_records);
    let types: Vec<String> = o
        .respondents
        .iter()
        .map(|s| format!("{} {} ({:.1}%)", s.group, s.count, s.percent))
        .collect();
    let _ = write!(out, "- Respondent types: {}", types.join(", "));
    if let Some(r) = o.respondent_ratio {
        let _ = write!(out, " (ratio {:.2})", r);
    }
    out.push('\n');
    if !o.phases.is_empty() {
        let phases: Vec<String> = o
            .phases
            .iter()
            .map(|s| format!("{} {} ({:.1}%)", s.group, s.count, s.percent))
            .collect();
        let _ = writeln!(out, "- Phases: {}", phases.join(", "));
    }
    if let Some(d) = o.dominant_phase {
        let _ = writeln!(out, "- Most common phase: {} ({:.1}%)", d.group, d.percent);
    }
    if let Some(c) = &o.completeness {
        let _ = writeln!(
            out,
            "- Data completeness: {:.1}% over {} questions ({})",
            c.percent,
            c.questions,
            c.quality.label()
        );
        for (title, missing) in c.high_missing.iter() {
            let _ = writeln!(out, "  - {}: {:.1}% missing", title, missing);
        }
    }
    out.push('\n');
    if !o.key_findings.is_empty() {
        out.push_str("### Key findings\n\n");
        out.push_str(&table_header(
            &["Question", "Factor", "Option", "Test", "p", ""]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>(),
        ));
        for k in o.key_findings.iter() {
            out.push_str(&table_row(&[
                escape_cell(&k.title),
                k.factor.to_string(),
                k.option.as_deref().map(escape_cell).unwrap_or_default(),
                k.method.to_string(),
                format!("{:.4}", k.p_value),
                k.tier.marker().to_string(),
            ]));
        }
        out.push('\n');
    }
}

/// Renders the report. The chart files produced by the renderer are removed
/// when the rendering ends.
pub fn render_markdown<R: ChartRenderer>(
    title: &str,
    report: &SurveyReport,
    renderer: &mut R,
) -> ReportResult<String> {
    let mut guard = ArtifactGuard::new();
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title);
    render_overview(&mut out, report);
    for (idx, q) in report.questions.iter().enumerate() {
        render_question(&mut out, idx, q, &mut guard, renderer)?;
    }
    debug!(
        "render_markdown: {} chart artifacts to remove",
        guard.paths().len()
    );
    Ok(out)
}
