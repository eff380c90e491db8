use std::fmt::Display;

use crate::categories::smart_sort;
use crate::config::{Phase, RespondentType};

/// The dimension along which answers are compared.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum GroupingFactor {
    RespondentType,
    Phase,
}

impl GroupingFactor {
    pub fn label(&self) -> &'static str {
        match self {
            GroupingFactor::RespondentType => "respondent type",
            GroupingFactor::Phase => "phase",
        }
    }
}

impl Display for GroupingFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One group of respondents for a grouping factor.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum GroupLabel {
    Respondent(RespondentType),
    Phase(Phase),
}

impl Display for GroupLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupLabel::Respondent(r) => write!(f, "{}", r),
            GroupLabel::Phase(p) => write!(f, "{}", p),
        }
    }
}

/// A contingency table of categories (rows) by groups (columns).
///
/// Categories are smart-sorted and groups follow their natural order. Only
/// the inner counts are stored; the margins are computed from them.
#[derive(PartialEq, Debug, Clone)]
pub struct CrossTab {
    categories: Vec<String>,
    groups: Vec<GroupLabel>,
    counts: Vec<Vec<u64>>,
}

impl CrossTab {
    /// Tallies (category, group) observations.
    pub fn from_observations<I>(observations: I) -> CrossTab
    where
        I: IntoIterator<Item = (String, GroupLabel)>,
    {
        let observations: Vec<(String, GroupLabel)> = observations.into_iter().collect();
        let mut categories: Vec<String> = Vec::new();
        let mut groups: Vec<GroupLabel> = Vec::new();
        for (c, g) in observations.iter() {
            if !categories.contains(c) {
                categories.push(c.clone());
            }
            if !groups.contains(g) {
                groups.push(*g);
            }
        }
        let categories = smart_sort(&categories);
        groups.sort();
        let mut counts = vec![vec![0u64; groups.len()]; categories.len()];
        for (c, g) in observations.iter() {
            let i = categories.iter().position(|x| x == c);
            let j = groups.iter().position(|x| x == g);
            if let (Some(i), Some(j)) = (i, j) {
                counts[i][j] += 1;
            }
        }
        CrossTab {
            categories,
            groups,
            counts,
        }
    }

    /// Builds a table from explicit counts. `counts[i][j]` is the count of
    /// category `i` in group `j`. Returns `None` if the shapes disagree.
    pub fn from_counts(
        categories: Vec<String>,
        groups: Vec<GroupLabel>,
        counts: Vec<Vec<u64>>,
    ) -> Option<CrossTab> {
        if counts.len() != categories.len() || counts.iter().any(|r| r.len() != groups.len()) {
            return None;
        }
        Some(CrossTab {
            categories,
            groups,
            counts,
        })
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn groups(&self) -> &[GroupLabel] {
        &self.groups
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn count(&self, category: usize, group: usize) -> u64 {
        self.counts[category][group]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.categories.len(), self.groups.len())
    }

    pub fn row_total(&self, category: usize) -> u64 {
        self.counts[category].iter().sum()
    }

    pub fn column_total(&self, group: usize) -> u64 {
        self.counts.iter().map(|r| r[group]).sum()
    }

    pub fn grand_total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Share of the group answering the category, in percent.
    pub fn column_percent(&self, category: usize, group: usize) -> f64 {
        let total = self.column_total(group);
        if total == 0 {
            0.0
        } else {
            100.0 * self.counts[category][group] as f64 / total as f64
        }
    }

    /// Expected counts under independence of categories and groups.
    pub fn expected(&self) -> Vec<Vec<f64>> {
        let n = self.grand_total() as f64;
        (0..self.categories.len())
            .map(|i| {
                (0..self.groups.len())
                    .map(|j| {
                        if n == 0.0 {
                            0.0
                        } else {
                            self.row_total(i) as f64 * self.column_total(j) as f64 / n
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// The most frequent category of a group with its column percentage.
    /// The first category in sorted order wins ties.
    pub fn top_category(&self, group: usize) -> Option<(&str, f64)> {
        let mut best: Option<usize> = None;
        for i in 0..self.categories.len() {
            let c = self.counts[i][group];
            if c > 0 && best.map(|b| c > self.counts[b][group]).unwrap_or(true) {
                best = Some(i);
            }
        }
        best.map(|i| (self.categories[i].as_str(), self.column_percent(i, group)))
    }
}

/// Mentions of each option of a multi-select question, by group.
///
/// Percentages are computed over the respondents of the group, so they do not
/// add up to 100.
#[derive(PartialEq, Debug, Clone)]
pub struct OptionTable {
    options: Vec<String>,
    groups: Vec<GroupLabel>,
    mentions: Vec<Vec<u64>>,
    respondents: Vec<u64>,
}

impl OptionTable {
    /// Builds the table from the selected options of each respondent.
    pub fn from_selections<I>(selections: I) -> OptionTable
    where
        I: IntoIterator<Item = (Vec<String>, GroupLabel)>,
    {
        let selections: Vec<(Vec<String>, GroupLabel)> = selections.into_iter().collect();
        let mut options: Vec<String> = Vec::new();
        let mut groups: Vec<GroupLabel> = Vec::new();
        for (opts, g) in selections.iter() {
            for o in opts.iter() {
                if !options.contains(o) {
                    options.push(o.clone());
                }
            }
            if !groups.contains(g) {
                groups.push(*g);
            }
        }
        let options = smart_sort(&options);
        groups.sort();
        let mut mentions = vec![vec![0u64; groups.len()]; options.len()];
        let mut respondents = vec![0u64; groups.len()];
        for (opts, g) in selections.iter() {
            let j = match groups.iter().position(|x| x == g) {
                Some(j) => j,
                None => continue,
            };
            respondents[j] += 1;
            for (i, o) in options.iter().enumerate() {
                if opts.contains(o) {
                    mentions[i][j] += 1;
                }
            }
        }
        OptionTable {
            options,
            groups,
            mentions,
            respondents,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn groups(&self) -> &[GroupLabel] {
        &self.groups
    }

    pub fn mentions(&self, option: usize, group: usize) -> u64 {
        self.mentions[option][group]
    }

    pub fn respondents(&self, group: usize) -> u64 {
        self.respondents[group]
    }

    pub fn percent(&self, option: usize, group: usize) -> f64 {
        let n = self.respondents[group];
        if n == 0 {
            0.0
        } else {
            100.0 * self.mentions[option][group] as f64 / n as f64
        }
    }

    /// The selected / not selected table of one option.
    pub fn option_crosstab(&self, option: usize) -> CrossTab {
        let selected: Vec<u64> = self.mentions[option].clone();
        let not_selected: Vec<u64> = selected
            .iter()
            .zip(self.respondents.iter())
            .map(|(m, n)| n - m)
            .collect();
        CrossTab {
            categories: vec!["selected".to_string(), "not selected".to_string()],
            groups: self.groups.clone(),
            counts: vec![selected, not_selected],
        }
    }
}

/// Descriptive statistics of a numeric sample.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation. Undefined for a single value.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

// Linear interpolation between the closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl NumericSummary {
    pub fn from_values(values: &[f64]) -> Option<NumericSummary> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let ss: f64 = sorted.iter().map(|x| (x - mean) * (x - mean)).sum();
            Some((ss / (n - 1) as f64).sqrt())
        } else {
            None
        };
        Some(NumericSummary {
            count: n,
            mean,
            std_dev,
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[n - 1],
        })
    }
}
