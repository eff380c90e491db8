//! Report content: what is shown and said for each question.
//!
//! For every analysed question, and for each grouping factor (respondent
//! type, then phase), the assembler produces a grouped view of the answers,
//! the outcome of the significance test, a chart specification and a
//! templated narrative. The narrative branch only depends on the significance
//! tier and on the top category of each group.

use std::panic::{self, AssertUnwindSafe};

use log::{debug, info, warn};

use crate::categories::normalize;
use crate::config::{AnalysisConfig, AnalysisError, Phase, RespondentType, ResponseTable};
use crate::crosstab::{CrossTab, GroupLabel, GroupingFactor, NumericSummary, OptionTable};
use crate::merger::{merge_questions, MergeGroup};
use crate::resolver::resolve;
use crate::stats::{
    classify, parse_number, test_categorical, test_multi_select, test_numeric, SignificanceTier,
    TestMethod, TestOutcome, TestResult, VariableKind,
};

// ********* Inputs *********

/// A canonical question of the topic catalogue.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Topic {
    pub question: String,
    pub title: String,
    pub description: Option<String>,
}

impl Topic {
    pub fn new(question: &str, title: &str) -> Topic {
        Topic {
            question: question.to_string(),
            title: title.to_string(),
            description: None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisMode {
    /// Resolve each topic of the catalogue in every table.
    Topics(Vec<Topic>),
    /// Concatenate the tables, merge similar questions and analyse every
    /// representative column.
    Merged,
}

/// One answer with the tags of the record it comes from.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Answer {
    pub value: String,
    pub respondent_type: RespondentType,
    pub phase: Phase,
}

impl Answer {
    fn label(&self, factor: GroupingFactor) -> Option<GroupLabel> {
        match factor {
            GroupingFactor::RespondentType if self.respondent_type.is_known() => {
                Some(GroupLabel::Respondent(self.respondent_type))
            }
            GroupingFactor::Phase if self.phase.is_set() => Some(GroupLabel::Phase(self.phase)),
            _ => None,
        }
    }
}

/// Where the answers of a question were found.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceColumn {
    pub table: String,
    pub column: String,
    pub strategy: String,
}

// ********* Charts *********

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ChartKind {
    GroupedBar,
    StackedBar,
    BoxPlot,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ValueAxis {
    Percent,
    Count,
    Value,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
    pub labels: Vec<String>,
}

/// What to draw. Rendering is left to the caller.
#[derive(PartialEq, Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub value_axis: ValueAxis,
}

// ********* Per-question content *********

#[derive(PartialEq, Debug, Clone)]
pub enum GroupedView {
    Categorical(CrossTab),
    Numeric(Vec<(GroupLabel, NumericSummary)>),
    MultiSelect(OptionTable),
}

#[derive(PartialEq, Debug, Clone)]
pub enum FactorTest {
    Single(TestOutcome),
    PerOption(Vec<(String, TestOutcome)>),
}

impl FactorTest {
    /// The results of the tests that were performed, with the option they
    /// relate to for multi-select questions.
    pub fn results(&self) -> Vec<(Option<&str>, &TestResult)> {
        match self {
            FactorTest::Single(Ok(r)) => vec![(None, r)],
            FactorTest::Single(Err(_)) => Vec::new(),
            FactorTest::PerOption(v) => v
                .iter()
                .filter_map(|(o, t)| t.as_ref().ok().map(|r| (Some(o.as_str()), r)))
                .collect(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct FactorAnalysis {
    pub factor: GroupingFactor,
    pub view: GroupedView,
    pub test: FactorTest,
    pub chart: ChartSpec,
    pub narrative: String,
}

/// Distribution of the answers over all respondents.
#[derive(PartialEq, Debug, Clone)]
pub enum Overall {
    /// Category (or option), count and percent of respondents.
    Categories(Vec<(String, u64, f64)>),
    Numeric(NumericSummary),
}

#[derive(PartialEq, Debug, Clone)]
pub struct QuestionAnalysis {
    pub kind: VariableKind,
    pub respondents: usize,
    pub overall: Overall,
    pub factors: Vec<FactorAnalysis>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum QuestionOutcome {
    /// No table contains the question.
    NotPresent,
    /// The question was found but nobody answered it.
    NoValidResponses,
    Analyzed(QuestionAnalysis),
    /// The analysis of this question failed. The other questions are not
    /// affected.
    Failed(String),
}

#[derive(PartialEq, Debug, Clone)]
pub struct QuestionReport {
    pub question: String,
    pub title: String,
    pub description: Option<String>,
    pub sources: Vec<SourceColumn>,
    /// Number of records that answered the question.
    pub answered: usize,
    /// Number of records of the tables containing the question.
    pub eligible: usize,
    pub outcome: QuestionOutcome,
}

// ********* Overview *********

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Share<T> {
    pub group: T,
    pub count: usize,
    pub percent: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DataQuality {
    Excellent,
    Good,
    Caution,
}

impl DataQuality {
    pub fn from_percent(percent: f64) -> DataQuality {
        if percent >= 95.0 {
            DataQuality::Excellent
        } else if percent >= 85.0 {
            DataQuality::Good
        } else {
            DataQuality::Caution
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataQuality::Excellent => "excellent",
            DataQuality::Good => "good",
            DataQuality::Caution => "use with caution",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Completeness {
    pub questions: usize,
    pub percent: f64,
    pub quality: DataQuality,
    /// Questions missing more than 10% of their answers, with the missing
    /// percentage. At most five, worst first.
    pub high_missing: Vec<(String, f64)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct KeyFinding {
    pub question: String,
    pub title: String,
    pub factor: GroupingFactor,
    pub option: Option<String>,
    pub method: TestMethod,
    pub p_value: f64,
    pub tier: SignificanceTier,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SurveyOverview {
    pub total_records: usize,
    pub respondents: Vec<Share<RespondentType>>,
    /// Larger over smaller group, when exactly two respondent types are known.
    pub respondent_ratio: Option<f64>,
    pub phases: Vec<Share<Phase>>,
    pub dominant_phase: Option<Share<Phase>>,
    pub completeness: Option<Completeness>,
    pub key_findings: Vec<KeyFinding>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SurveyReport {
    pub overview: SurveyOverview,
    pub questions: Vec<QuestionReport>,
    /// The merge groups, in merged mode only.
    pub merge_groups: Vec<MergeGroup>,
}

// ********* Formatting helpers *********

fn format_p(p: f64) -> String {
    if p < 0.001 {
        "p < 0.001".to_string()
    } else {
        format!("p = {:.3}", p)
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        Some(f) => f.to_uppercase().chain(c).collect(),
        None => String::new(),
    }
}

fn test_sentence(outcome: &TestOutcome, factor: GroupingFactor) -> String {
    match outcome {
        Ok(r) => {
            let mut s = if r.tier().is_significant() {
                format!(
                    "The {} shows a statistically significant difference between {} groups ({} = {:.3}, {}, {}).",
                    r.method,
                    factor,
                    r.method.statistic_symbol(),
                    r.statistic,
                    format_p(r.p_value),
                    r.tier().marker()
                )
            } else {
                format!(
                    "The {} finds no statistically significant difference between {} groups ({} = {:.3}, {}, n.s.).",
                    r.method,
                    factor,
                    r.method.statistic_symbol(),
                    r.statistic,
                    format_p(r.p_value)
                )
            };
            if let Some(e) = r.effect_size {
                s.push_str(&format!(
                    " Effect size: {} ({} = {:.3}).",
                    e.magnitude().label(),
                    e.name(),
                    e.value()
                ));
            }
            if let Some(f) = r.low_expected_fraction.filter(|f| *f > 0.0) {
                s.push_str(&format!(
                    " {:.0}% of the expected counts are below 5; interpret with caution.",
                    100.0 * f
                ));
            }
            s
        }
        Err(a) => format!("Statistical test not performed: {}.", a),
    }
}

fn categorical_observations(table: &CrossTab) -> Vec<String> {
    (0..table.groups().len())
        .filter_map(|j| {
            table.top_category(j).map(|(c, p)| {
                format!(
                    "{} respondents mainly chose \"{}\" ({:.1}%).",
                    capitalize(&table.groups()[j].to_string()),
                    c,
                    p
                )
            })
        })
        .collect()
}

fn categorical_narrative(table: &CrossTab, outcome: &TestOutcome, factor: GroupingFactor) -> String {
    let mut parts = categorical_observations(table);
    parts.push(test_sentence(outcome, factor));
    parts.join(" ")
}

fn numeric_narrative(
    summaries: &[(GroupLabel, NumericSummary)],
    outcome: &TestOutcome,
    factor: GroupingFactor,
) -> String {
    let mut parts: Vec<String> = summaries
        .iter()
        .map(|(g, s)| {
            format!(
                "{} respondents: median {}, mean {:.2} (n = {}).",
                capitalize(&g.to_string()),
                s.median,
                s.mean,
                s.count
            )
        })
        .collect();
    parts.push(test_sentence(outcome, factor));
    parts.join(" ")
}

fn multi_select_narrative(
    table: &OptionTable,
    tests: &[(String, TestOutcome)],
    factor: GroupingFactor,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    for j in 0..table.groups().len() {
        let best = (0..table.options().len()).max_by(|a, b| {
            table
                .mentions(*a, j)
                .cmp(&table.mentions(*b, j))
                .then(b.cmp(a))
        });
        if let Some(i) = best.filter(|i| table.mentions(*i, j) > 0) {
            parts.push(format!(
                "{} respondents most often selected \"{}\" ({:.1}% of respondents).",
                capitalize(&table.groups()[j].to_string()),
                table.options()[i],
                table.percent(i, j)
            ));
        }
    }
    let significant: Vec<String> = tests
        .iter()
        .filter_map(|(o, t)| match t {
            Ok(r) if r.tier().is_significant() => Some(format!(
                "\"{}\" ({}, {})",
                o,
                format_p(r.p_value),
                r.tier().marker()
            )),
            _ => None,
        })
        .collect();
    let performed = tests.iter().filter(|(_, t)| t.is_ok()).count();
    if !significant.is_empty() {
        parts.push(format!(
            "Options with a statistically significant difference between {} groups: {}.",
            factor,
            significant.join(", ")
        ));
    } else if performed > 0 {
        parts.push(format!(
            "No option shows a statistically significant difference between {} groups.",
            factor
        ));
    } else {
        let reason = tests
            .iter()
            .find_map(|(_, t)| t.as_ref().err())
            .map(|a| a.to_string())
            .unwrap_or_else(|| "no option to compare".to_string());
        parts.push(format!("Statistical test not performed: {}.", reason));
    }
    parts.join(" ")
}

// ********* Charts *********

fn categorical_chart(table: &CrossTab, title: &str, factor: GroupingFactor) -> ChartSpec {
    let series = (0..table.groups().len())
        .map(|j| {
            let (values, labels): (Vec<f64>, Vec<String>) = (0..table.categories().len())
                .map(|i| {
                    let pct = table.column_percent(i, j);
                    match factor {
                        GroupingFactor::RespondentType => (pct, format!("{:.1}%", pct)),
                        GroupingFactor::Phase => {
                            let n = table.count(i, j);
                            (n as f64, format!("{} ({:.1}%)", n, pct))
                        }
                    }
                })
                .unzip();
            ChartSeries {
                name: table.groups()[j].to_string(),
                values,
                labels,
            }
        })
        .collect();
    ChartSpec {
        kind: ChartKind::GroupedBar,
        title: format!("{} by {}", title, factor),
        categories: table.categories().to_vec(),
        series,
        value_axis: match factor {
            GroupingFactor::RespondentType => ValueAxis::Percent,
            GroupingFactor::Phase => ValueAxis::Count,
        },
    }
}

fn multi_select_chart(table: &OptionTable, title: &str, factor: GroupingFactor) -> ChartSpec {
    let series = (0..table.groups().len())
        .map(|j| {
            let (values, labels): (Vec<f64>, Vec<String>) = (0..table.options().len())
                .map(|i| match factor {
                    GroupingFactor::RespondentType => {
                        let pct = table.percent(i, j);
                        (pct, format!("{:.1}%", pct))
                    }
                    GroupingFactor::Phase => {
                        let n = table.mentions(i, j);
                        (n as f64, n.to_string())
                    }
                })
                .unzip();
            ChartSeries {
                name: table.groups()[j].to_string(),
                values,
                labels,
            }
        })
        .collect();
    let (kind, value_axis) = match factor {
        GroupingFactor::RespondentType => (ChartKind::GroupedBar, ValueAxis::Percent),
        GroupingFactor::Phase => (ChartKind::StackedBar, ValueAxis::Count),
    };
    ChartSpec {
        kind,
        title: format!("{} by {}", title, factor),
        categories: table.options().to_vec(),
        series,
        value_axis,
    }
}

fn numeric_chart(
    summaries: &[(GroupLabel, NumericSummary)],
    title: &str,
    factor: GroupingFactor,
) -> ChartSpec {
    let series = summaries
        .iter()
        .map(|(g, s)| {
            let values = vec![s.min, s.q1, s.median, s.q3, s.max];
            ChartSeries {
                name: g.to_string(),
                labels: values.iter().map(|v| format!("{}", v)).collect(),
                values,
            }
        })
        .collect();
    ChartSpec {
        kind: ChartKind::BoxPlot,
        title: format!("{} by {}", title, factor),
        categories: ["min", "q1", "median", "q3", "max"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        series,
        value_axis: ValueAxis::Value,
    }
}

// ********* Analysis *********

fn split_options(value: &str, delimiter: char) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    for part in value.split(delimiter) {
        let o = normalize(part);
        if !o.is_empty() && !options.contains(&o) {
            options.push(o);
        }
    }
    options
}

fn analyze_factor(
    answers: &[Answer],
    kind: VariableKind,
    factor: GroupingFactor,
    title: &str,
    config: &AnalysisConfig,
) -> Option<FactorAnalysis> {
    let labelled: Vec<(GroupLabel, &Answer)> = answers
        .iter()
        .filter_map(|a| a.label(factor).map(|l| (l, a)))
        .collect();
    if labelled.is_empty() {
        debug!("analyze_factor: no {} tags for {:?}", factor, title);
        return None;
    }
    let analysis = match kind {
        VariableKind::Categorical => {
            let table =
                CrossTab::from_observations(labelled.iter().map(|(l, a)| (a.value.clone(), *l)));
            let outcome = test_categorical(&table, config);
            FactorAnalysis {
                factor,
                chart: categorical_chart(&table, title, factor),
                narrative: categorical_narrative(&table, &outcome, factor),
                test: FactorTest::Single(outcome),
                view: GroupedView::Categorical(table),
            }
        }
        VariableKind::Numeric => {
            let mut groups: Vec<(GroupLabel, Vec<f64>)> = Vec::new();
            for (l, a) in labelled.iter() {
                if let Some(x) = parse_number(&a.value) {
                    match groups.iter_mut().find(|(g, _)| g == l) {
                        Some((_, v)) => v.push(x),
                        None => groups.push((*l, vec![x])),
                    }
                }
            }
            groups.sort_by(|a, b| a.0.cmp(&b.0));
            let summaries: Vec<(GroupLabel, NumericSummary)> = groups
                .iter()
                .filter_map(|(g, v)| NumericSummary::from_values(v).map(|s| (*g, s)))
                .collect();
            let outcome = test_numeric(&groups, config);
            FactorAnalysis {
                factor,
                chart: numeric_chart(&summaries, title, factor),
                narrative: numeric_narrative(&summaries, &outcome, factor),
                test: FactorTest::Single(outcome),
                view: GroupedView::Numeric(summaries),
            }
        }
        VariableKind::MultiSelect => {
            let table = OptionTable::from_selections(labelled.iter().map(|(l, a)| {
                (split_options(&a.value, config.multi_select_delimiter), *l)
            }));
            let tests = test_multi_select(&table, config);
            FactorAnalysis {
                factor,
                chart: multi_select_chart(&table, title, factor),
                narrative: multi_select_narrative(&table, &tests, factor),
                test: FactorTest::PerOption(tests),
                view: GroupedView::MultiSelect(table),
            }
        }
    };
    Some(analysis)
}

fn overall_distribution(answers: &[Answer], kind: VariableKind, config: &AnalysisConfig) -> Overall {
    if kind == VariableKind::Numeric {
        let values: Vec<f64> = answers.iter().filter_map(|a| parse_number(&a.value)).collect();
        if let Some(s) = NumericSummary::from_values(&values) {
            return Overall::Numeric(s);
        }
    }
    let per_answer: Vec<Vec<String>> = answers
        .iter()
        .map(|a| match kind {
            VariableKind::MultiSelect => split_options(&a.value, config.multi_select_delimiter),
            _ => vec![a.value.clone()],
        })
        .collect();
    let mut categories: Vec<String> = Vec::new();
    for opts in per_answer.iter() {
        for o in opts.iter() {
            if !categories.contains(o) {
                categories.push(o.clone());
            }
        }
    }
    let n = answers.len() as f64;
    let rows = crate::categories::smart_sort(&categories)
        .into_iter()
        .map(|c| {
            let count = per_answer.iter().filter(|opts| opts.contains(&c)).count() as u64;
            let pct = if n > 0.0 { 100.0 * count as f64 / n } else { 0.0 };
            (c, count, pct)
        })
        .collect();
    Overall::Categories(rows)
}

/// Builds the content of one question from its pooled answers.
///
/// A failure inside the analysis is caught and reported as
/// `QuestionOutcome::Failed`.
pub fn analyze_answers(answers: &[Answer], title: &str, config: &AnalysisConfig) -> QuestionOutcome {
    if answers.is_empty() {
        return QuestionOutcome::NoValidResponses;
    }
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let values: Vec<&str> = answers.iter().map(|a| a.value.as_str()).collect();
        let kind = classify(&values, config);
        debug!("analyze_answers: {:?} is {}", title, kind.label());
        let factors: Vec<FactorAnalysis> = [GroupingFactor::RespondentType, GroupingFactor::Phase]
            .iter()
            .filter_map(|f| analyze_factor(answers, kind, *f, title, config))
            .collect();
        QuestionAnalysis {
            kind,
            respondents: answers.len(),
            overall: overall_distribution(answers, kind, config),
            factors,
        }
    }));
    match result {
        Ok(a) => QuestionOutcome::Analyzed(a),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("analyze_answers: analysis of {:?} failed: {}", title, msg);
            QuestionOutcome::Failed(msg)
        }
    }
}

fn answers_of(table: &ResponseTable, column: &str) -> Vec<Answer> {
    table
        .records()
        .iter()
        .filter_map(|r| {
            r.get(column).map(|v| Answer {
                value: v.to_string(),
                respondent_type: r.respondent_type(),
                phase: r.phase(),
            })
        })
        .collect()
}

/// Resolves a topic in every table, pools the answers of the matching
/// columns and analyses them.
pub fn analyze_topic(tables: &[ResponseTable], topic: &Topic, config: &AnalysisConfig) -> QuestionReport {
    let mut sources: Vec<SourceColumn> = Vec::new();
    let mut answers: Vec<Answer> = Vec::new();
    let mut eligible = 0;
    for t in tables.iter() {
        let resolution = resolve(t, &topic.question, config);
        if let Some(column) = resolution.column() {
            sources.push(SourceColumn {
                table: t.name().to_string(),
                column: column.to_string(),
                strategy: resolution.strategy().to_string(),
            });
            eligible += t.len();
            answers.extend(answers_of(t, column));
        }
    }
    let outcome = if sources.is_empty() {
        info!("analyze_topic: {:?} is not present in any table", topic.question);
        QuestionOutcome::NotPresent
    } else {
        analyze_answers(&answers, &topic.title, config)
    };
    QuestionReport {
        question: topic.question.clone(),
        title: topic.title.clone(),
        description: topic.description.clone(),
        sources,
        answered: answers.len(),
        eligible,
        outcome,
    }
}

// ********* Overview *********

fn shares<T: Copy + PartialEq>(values: &[T]) -> Vec<Share<T>> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for v in values.iter() {
        match counts.iter_mut().find(|(g, _)| g == v) {
            Some((_, c)) => *c += 1,
            None => counts.push((*v, 1)),
        }
    }
    let total = values.len() as f64;
    counts
        .into_iter()
        .map(|(group, count)| Share {
            group,
            count,
            percent: 100.0 * count as f64 / total,
        })
        .collect()
}

fn key_findings(questions: &[QuestionReport]) -> Vec<KeyFinding> {
    let mut findings: Vec<KeyFinding> = Vec::new();
    for q in questions.iter() {
        if let QuestionOutcome::Analyzed(a) = &q.outcome {
            for f in a.factors.iter() {
                for (option, r) in f.test.results() {
                    if r.tier().is_significant() {
                        findings.push(KeyFinding {
                            question: q.question.clone(),
                            title: q.title.clone(),
                            factor: f.factor,
                            option: option.map(|o| o.to_string()),
                            method: r.method,
                            p_value: r.p_value,
                            tier: r.tier(),
                        });
                    }
                }
            }
        }
    }
    findings.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then(a.p_value.total_cmp(&b.p_value))
    });
    findings
}

fn completeness(questions: &[QuestionReport]) -> Option<Completeness> {
    let analysed: Vec<&QuestionReport> = questions
        .iter()
        .filter(|q| matches!(q.outcome, QuestionOutcome::Analyzed(_)) && q.eligible > 0)
        .collect();
    if analysed.is_empty() {
        return None;
    }
    let answered: usize = analysed.iter().map(|q| q.answered).sum();
    let eligible: usize = analysed.iter().map(|q| q.eligible).sum();
    let percent = 100.0 * answered as f64 / eligible as f64;
    let mut high_missing: Vec<(String, f64)> = analysed
        .iter()
        .map(|q| {
            (
                q.title.clone(),
                100.0 * (1.0 - q.answered as f64 / q.eligible as f64),
            )
        })
        .filter(|(_, m)| *m > 10.0)
        .collect();
    high_missing.sort_by(|a, b| b.1.total_cmp(&a.1));
    high_missing.truncate(5);
    Some(Completeness {
        questions: analysed.len(),
        percent,
        quality: DataQuality::from_percent(percent),
        high_missing,
    })
}

/// The front matter of the report.
pub fn survey_overview(tables: &[ResponseTable], questions: &[QuestionReport]) -> SurveyOverview {
    let records: Vec<_> = tables.iter().flat_map(|t| t.records().iter()).collect();
    let mut types: Vec<RespondentType> = records.iter().map(|r| r.respondent_type()).collect();
    types.sort();
    let respondents = shares(&types);
    let known: Vec<&Share<RespondentType>> =
        respondents.iter().filter(|s| s.group.is_known()).collect();
    let respondent_ratio = match known.as_slice() {
        [a, b] => {
            let (hi, lo) = (a.count.max(b.count), a.count.min(b.count));
            Some(hi as f64 / lo as f64)
        }
        _ => None,
    };
    let mut phase_values: Vec<Phase> = records
        .iter()
        .map(|r| r.phase())
        .filter(|p| p.is_set())
        .collect();
    phase_values.sort();
    let phases = shares(&phase_values);
    let dominant_phase = phases
        .iter()
        .fold(None, |best: Option<Share<Phase>>, s| match best {
            Some(b) if b.count >= s.count => Some(b),
            _ => Some(*s),
        });
    SurveyOverview {
        total_records: records.len(),
        respondents,
        respondent_ratio,
        phases,
        dominant_phase,
        completeness: completeness(questions),
        key_findings: key_findings(questions),
    }
}

/// Builds the whole report.
pub fn build_report(
    tables: &[ResponseTable],
    mode: &AnalysisMode,
    config: &AnalysisConfig,
) -> Result<SurveyReport, AnalysisError> {
    config.validate()?;
    if tables.iter().all(|t| t.is_empty()) {
        return Err(AnalysisError::EmptySurvey);
    }
    match mode {
        AnalysisMode::Topics(topics) => {
            let questions: Vec<QuestionReport> = topics
                .iter()
                .map(|t| analyze_topic(tables, t, config))
                .collect();
            info!(
                "build_report: {} topics, {} found",
                questions.len(),
                questions
                    .iter()
                    .filter(|q| q.outcome != QuestionOutcome::NotPresent)
                    .count()
            );
            Ok(SurveyReport {
                overview: survey_overview(tables, &questions),
                questions,
                merge_groups: Vec::new(),
            })
        }
        AnalysisMode::Merged => {
            let mut combined = ResponseTable::concat("combined", tables);
            let mut excluded: Vec<String> = config.excluded_columns.clone();
            for c in combined.columns().iter() {
                if config.is_metadata(c) && !excluded.contains(c) {
                    excluded.push(c.clone());
                }
            }
            let groups = merge_questions(&mut combined, &excluded, config.similarity_threshold);
            let questions: Vec<QuestionReport> = groups
                .iter()
                .map(|g| {
                    let answers = answers_of(&combined, &g.representative);
                    QuestionReport {
                        question: g.representative.clone(),
                        title: g.representative.clone(),
                        description: None,
                        sources: g
                            .members
                            .iter()
                            .map(|m| SourceColumn {
                                table: combined.name().to_string(),
                                column: m.clone(),
                                strategy: if *m == g.representative {
                                    "representative".to_string()
                                } else {
                                    "merged".to_string()
                                },
                            })
                            .collect(),
                        answered: answers.len(),
                        eligible: combined.len(),
                        outcome: analyze_answers(&answers, &g.representative, config),
                    }
                })
                .collect();
            info!(
                "build_report: {} questions after merging {} columns",
                questions.len(),
                combined.columns().len()
            );
            Ok(SurveyReport {
                overview: survey_overview(tables, &questions),
                questions,
                merge_groups: groups,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> ResponseTable {
        let mut b = TableBuilder::new(name);
        b.columns(columns);
        for r in rows.iter() {
            b.add_row(*r).unwrap();
        }
        b.build()
    }

    fn two_sources() -> Vec<ResponseTable> {
        vec![
            table("公司問卷.csv", &["大股東合計持股比例"], &[&["50-60%"]]),
            table(
                "投資方問卷.csv",
                &["您投資的公司之大股東合計持股比例"],
                &[&["10-20%"]],
            ),
        ]
    }

    fn check_unified(q: &QuestionReport) {
        let a = match &q.outcome {
            QuestionOutcome::Analyzed(a) => a,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(a.respondents, 2);
        assert_eq!(a.kind, VariableKind::Categorical);
        assert_eq!(a.factors.len(), 1);
        let f = &a.factors[0];
        assert_eq!(f.factor, GroupingFactor::RespondentType);
        let ct = match &f.view {
            GroupedView::Categorical(ct) => ct,
            other => panic!("unexpected view {:?}", other),
        };
        assert_eq!(
            ct.categories(),
            &["10-20%".to_string(), "50-60%".to_string()]
        );
        let company = ct
            .groups()
            .iter()
            .position(|g| *g == GroupLabel::Respondent(RespondentType::Company))
            .unwrap();
        let investor = ct
            .groups()
            .iter()
            .position(|g| *g == GroupLabel::Respondent(RespondentType::Investor))
            .unwrap();
        assert_eq!(ct.count(1, company), 1);
        assert_eq!(ct.count(0, investor), 1);
        assert_eq!(ct.count(0, company), 0);
        assert!(matches!(f.test, FactorTest::Single(Err(_))));
        assert!(f.narrative.contains("test not performed"));
        assert_eq!(f.chart.categories, ct.categories().to_vec());
    }

    #[test]
    fn topics_unify_company_and_investor_phrasings() {
        let tables = two_sources();
        let mode = AnalysisMode::Topics(vec![Topic::new("大股東合計持股比例", "Major shareholders")]);
        let report = build_report(&tables, &mode, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.questions.len(), 1);
        let q = &report.questions[0];
        assert_eq!(q.sources.len(), 2);
        assert_eq!(q.sources[0].strategy, "exact");
        assert_eq!(q.sources[1].strategy, "normalized");
        check_unified(q);
    }

    #[test]
    fn merged_mode_unifies_too() {
        let tables = two_sources();
        let report = build_report(&tables, &AnalysisMode::Merged, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.merge_groups.len(), 1);
        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.questions[0].title, "大股東合計持股比例");
        check_unified(&report.questions[0]);
    }

    #[test]
    fn missing_topics_are_reported_in_order() {
        let tables = two_sources();
        let mode = AnalysisMode::Topics(vec![
            Topic::new("董事會成員人數", "Board"),
            Topic::new("大股東合計持股比例", "Major shareholders"),
            Topic::new("Please state the name of the company you represent", "Name"),
        ]);
        let report = build_report(&tables, &mode, &AnalysisConfig::default()).unwrap();
        let outcomes: Vec<bool> = report
            .questions
            .iter()
            .map(|q| q.outcome == QuestionOutcome::NotPresent)
            .collect();
        assert_eq!(outcomes, vec![true, false, true]);
    }

    fn staged(name: &str, rows: &[Vec<&str>]) -> ResponseTable {
        let mut b = TableBuilder::new(name);
        b.columns(&["設有審計委員會", "公司階段"]).phase_column("公司階段");
        for r in rows.iter() {
            b.add_row(r.as_slice()).unwrap();
        }
        b.build()
    }

    #[test]
    fn significant_findings_reach_the_overview() {
        let mut company_rows: Vec<Vec<&str>> = Vec::new();
        let mut investor_rows: Vec<Vec<&str>> = Vec::new();
        for i in 0..20 {
            company_rows.push(vec![if i < 18 { "是" } else { "否" }, "第一階段"]);
            investor_rows.push(vec![if i < 4 { "是" } else { "否" }, "第二階段"]);
        }
        let tables = vec![
            staged("公司問卷.csv", &company_rows),
            staged("投資方問卷.csv", &investor_rows),
        ];
        let config = AnalysisConfig {
            excluded_columns: vec!["公司階段".to_string()],
            ..AnalysisConfig::default()
        };
        let mode = AnalysisMode::Topics(vec![Topic::new("設有審計委員會", "Audit committee")]);
        let report = build_report(&tables, &mode, &config).unwrap();
        let overview = &report.overview;
        assert_eq!(overview.total_records, 40);
        assert_eq!(overview.respondent_ratio, Some(1.0));
        assert_eq!(overview.phases.len(), 2);
        assert_eq!(overview.dominant_phase.map(|s| s.group), Some(Phase::Phase1));
        let c = overview.completeness.as_ref().unwrap();
        assert_eq!(c.quality, DataQuality::Excellent);
        assert!(c.high_missing.is_empty());
        assert_eq!(overview.key_findings.len(), 2);
        assert_eq!(
            overview.key_findings[0].tier,
            SignificanceTier::VeryHighlySignificant
        );
        assert_eq!(overview.key_findings[0].method, TestMethod::ChiSquare);
    }

    fn board_sizes(name: &str, offset: usize) -> ResponseTable {
        let mut b = TableBuilder::new(name);
        b.columns(&["董事會成員人數"]);
        for i in 0..6 {
            b.add_row(&[(3 + i + offset).to_string()]).unwrap();
        }
        b.build()
    }

    #[test]
    fn numeric_questions_get_summaries() {
        let tables = vec![board_sizes("公司問卷.csv", 0), board_sizes("投資方問卷.csv", 10)];
        let mode = AnalysisMode::Topics(vec![Topic::new("董事會成員人數", "Board size")]);
        let report = build_report(&tables, &mode, &AnalysisConfig::default()).unwrap();
        let a = match &report.questions[0].outcome {
            QuestionOutcome::Analyzed(a) => a,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(a.kind, VariableKind::Numeric);
        let f = &a.factors[0];
        assert_eq!(f.chart.kind, ChartKind::BoxPlot);
        match &f.test {
            FactorTest::Single(Ok(r)) => {
                assert_eq!(r.method, TestMethod::MannWhitneyU);
                assert!(r.tier().is_significant());
            }
            other => panic!("unexpected test {:?}", other),
        }
        assert!(f.narrative.contains("median 5.5"));
    }

    #[test]
    fn multi_select_questions_are_split() {
        let mut b = TableBuilder::new("公司問卷.csv");
        b.columns(&["資訊揭露管道"]);
        b.add_row(&["網站\n年報"]).unwrap();
        b.add_row(&["網站"]).unwrap();
        let tables = vec![b.build()];
        let mode = AnalysisMode::Topics(vec![Topic::new("資訊揭露管道", "Disclosure")]);
        let report = build_report(&tables, &mode, &AnalysisConfig::default()).unwrap();
        let a = match &report.questions[0].outcome {
            QuestionOutcome::Analyzed(a) => a,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(a.kind, VariableKind::MultiSelect);
        assert_eq!(
            a.overall,
            Overall::Categories(vec![
                ("年報".to_string(), 1, 50.0),
                ("網站".to_string(), 2, 100.0)
            ])
        );
        assert!(a.factors[0].narrative.contains("test not performed"));
    }

    #[test]
    fn empty_survey_is_an_error() {
        let tables = vec![table("x.csv", &["q"], &[])];
        assert_eq!(
            build_report(&tables, &AnalysisMode::Merged, &AnalysisConfig::default()),
            Err(AnalysisError::EmptySurvey)
        );
    }
}
