//! Normalization and ordering of categorical answers.
//!
//! Answers to the same question come in many spellings: full-width digits,
//! different range dashes, exclusive upper bounds written in words. The
//! `normalize` function folds these into one canonical form, and
//! `smart_sort` orders the canonical values the way a reader expects
//! (ranges by their lower bound, "below N" first, "N or more" last, Likert
//! scales from negative to positive...).

use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

/// Converts full-width ASCII variants and the ideographic space to ASCII.
pub(crate) fn to_halfwidth(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// "10%-未滿20%", "10~不到20%"
static PCT_EXCLUSIVE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*%?\s*[-~〜–—−至到]\s*(?:未滿|不到|少於|低於|<)\s*(\d+(?:\.\d+)?)\s*%$")
        .unwrap()
});

// "10-20%(不含20%)"
static PCT_EXCLUSIVE_NOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*%?\s*[-~〜–—−至到]\s*(\d+(?:\.\d+)?)\s*%\s*\(?\s*(?:不含|不包含|不包括)[^)]*\)?$")
        .unwrap()
});

static RANGE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)\s*(%|萬|百萬|千萬|億|年|個月|人)?\s*[-~〜–—−至到]\s*(\d)").unwrap());

static PCT_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)%-(\d+(?:\.\d+)?)%$").unwrap());

static NUMBER_UNIT_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)\s+(%|個月|年|月|人|名|萬|百萬|千萬|億)").unwrap());

const SYNONYMS: &[(&str, &str)] = &[
    ("不固定", "不定期"),
    ("無固定頻率", "不定期"),
    ("無固定", "不定期"),
    ("視需要", "不定期"),
    ("視需要而定", "不定期"),
    ("有需要時", "不定期"),
    ("ad hoc", "不定期"),
    ("ad-hoc", "不定期"),
    ("irregular", "不定期"),
    ("irregularly", "不定期"),
    ("每周", "每週"),
    ("每週一次", "每週"),
    ("每月一次", "每月"),
    ("每一季", "每季"),
    ("每季度", "每季"),
    ("每季一次", "每季"),
    ("每三個月", "每季"),
    ("每半年一次", "每半年"),
    ("每六個月", "每半年"),
    ("每年一次", "每年"),
];

/// Returns the canonical spelling of a categorical answer.
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(raw: &str) -> String {
    let s = to_halfwidth(raw);
    let s = WHITESPACE.replace_all(s.trim(), " ").to_string();
    let s = NUMBER_UNIT_SPACE.replace_all(&s, "$1$2").to_string();
    let s = PCT_EXCLUSIVE_WORD.replace(&s, "$1-$2%").to_string();
    let s = PCT_EXCLUSIVE_NOTE.replace(&s, "$1-$2%").to_string();
    let s = RANGE_SEPARATOR.replace_all(&s, "${1}${2}-${3}").to_string();
    let s = PCT_RANGE.replace(&s, "$1-$2%").to_string();
    let lower = s.to_lowercase();
    for (from, to) in SYNONYMS.iter() {
        if lower == *from {
            return to.to_string();
        }
    }
    s
}

// ********* Sort keys *********

/// The families of answers recognised by the sorter, in display order.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
enum Bucket {
    Percent,
    Years,
    Money,
    Months,
    Headcount,
    Frequency,
    Likert,
    Stage,
    Binary,
    Text,
}

/// Position of a value inside its family: open lower range, plain value or
/// range, open upper range.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
enum Position {
    Below,
    Within,
    Above,
}

/// The ordering key of a categorical answer.
#[derive(Debug, Clone)]
pub struct SortKey {
    bucket: Bucket,
    position: Position,
    value: f64,
    text: String,
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bucket
            .cmp(&other.bucket)
            .then(self.position.cmp(&other.position))
            .then(self.value.total_cmp(&other.value))
            .then_with(|| self.text.cmp(&other.text))
    }
}

const UNIT: &str = r"(%|個月|百萬|千萬|萬|億|元|年|月|人|名)";
const NUM: &str = r"(\d+(?:\.\d+)?)";

static BELOW_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:未滿|未達|低於|少於|不到|不足|小於|under|below|less than)\s*{}\s*{}",
        NUM, UNIT
    ))
    .unwrap()
});

static BELOW_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^{}\s*{}\s*(?:[(（]含[)）]\s*以下|及以下|以下|以內|未滿|or less|or below|or under)",
        NUM, UNIT
    ))
    .unwrap()
});

static ABOVE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:超過|高於|多於|大於|over|above|more than)\s*{}\s*{}",
        NUM, UNIT
    ))
    .unwrap()
});

static ABOVE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^{}\s*{}\s*(?:[(（]含[)）]\s*以上|及以上|以上|或以上|or more|or above|and above|\+)",
        NUM, UNIT
    ))
    .unwrap()
});

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*%?\s*(?:-\s*\d+(?:\.\d+)?\s*)?%").unwrap());

static YEARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*年?\s*(?:-\s*\d+(?:\.\d+)?\s*)?年").unwrap());

static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*(百萬|千萬|萬|億)?\s*元?\s*(?:-\s*\d+(?:\.\d+)?\s*(百萬|千萬|萬|億))?(百萬|千萬|萬|億)?")
        .unwrap()
});

static MONTHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*(?:個月|個|月)?\s*(?:-\s*\d+(?:\.\d+)?\s*)?個?月").unwrap()
});

static HEADCOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*[人名]?\s*(?:-\s*\d+(?:\.\d+)?\s*)?[人名]").unwrap());

static STAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)第([一二三四五1-5])階段|階段\s*([一二三四五1-5])|(?:stage|phase)\s*([1-5])").unwrap()
});

const FREQUENCIES: &[(&str, f64)] = &[
    ("每週", 1.0),
    ("每周", 1.0),
    ("weekly", 1.0),
    ("每月", 2.0),
    ("monthly", 2.0),
    ("每季", 3.0),
    ("quarterly", 3.0),
    ("每半年", 4.0),
    ("semi-annual", 4.0),
    ("semiannual", 4.0),
    ("每年", 5.0),
    ("annual", 5.0),
    ("yearly", 5.0),
    ("不定期", 6.0),
    ("ad hoc", 6.0),
    ("irregular", 6.0),
];

const NEVER: &[&str] = &["無", "從未", "never", "none"];

const LIKERT: &[(&str, f64)] = &[
    ("非常不同意", 1.0),
    ("非常不滿意", 1.0),
    ("非常不重要", 1.0),
    ("非常不符合", 1.0),
    ("完全不符合", 1.0),
    ("strongly disagree", 1.0),
    ("very dissatisfied", 1.0),
    ("not at all important", 1.0),
    ("不同意", 2.0),
    ("不滿意", 2.0),
    ("不重要", 2.0),
    ("不符合", 2.0),
    ("disagree", 2.0),
    ("dissatisfied", 2.0),
    ("unimportant", 2.0),
    ("普通", 3.0),
    ("中立", 3.0),
    ("尚可", 3.0),
    ("無意見", 3.0),
    ("部分符合", 3.0),
    ("neutral", 3.0),
    ("同意", 4.0),
    ("滿意", 4.0),
    ("重要", 4.0),
    ("符合", 4.0),
    ("agree", 4.0),
    ("satisfied", 4.0),
    ("important", 4.0),
    ("非常同意", 5.0),
    ("非常滿意", 5.0),
    ("非常重要", 5.0),
    ("非常符合", 5.0),
    ("完全符合", 5.0),
    ("strongly agree", 5.0),
    ("very satisfied", 5.0),
    ("very important", 5.0),
];

// Longest terms first, so "不同意" is not read as "同意".
static LIKERT_BY_LENGTH: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| {
    let mut v: Vec<(&'static str, f64)> = LIKERT.to_vec();
    v.sort_by_key(|(t, _)| std::cmp::Reverse(t.chars().count()));
    v
});

const BINARY_YES: &[&str] = &["是", "yes", "y", "有", "true"];
const BINARY_NO: &[&str] = &["否", "no", "n", "沒有", "false"];

fn unit_bucket(unit: &str) -> (Bucket, f64) {
    match unit {
        "%" => (Bucket::Percent, 1.0),
        "年" => (Bucket::Years, 1.0),
        "個月" | "月" => (Bucket::Months, 1.0),
        "人" | "名" => (Bucket::Headcount, 1.0),
        _ => (Bucket::Money, money_multiplier(unit)),
    }
}

fn money_multiplier(unit: &str) -> f64 {
    match unit {
        "萬" => 1e4,
        "百萬" => 1e6,
        "千萬" => 1e7,
        "億" => 1e8,
        _ => 1.0,
    }
}

fn han_digit(s: &str) -> f64 {
    match s {
        "一" | "1" => 1.0,
        "二" | "2" => 2.0,
        "三" | "3" => 3.0,
        "四" | "4" => 4.0,
        "五" | "5" => 5.0,
        _ => 0.0,
    }
}

fn number(s: &str) -> f64 {
    s.parse::<f64>().unwrap_or(0.0)
}

fn key(bucket: Bucket, position: Position, value: f64, text: &str) -> SortKey {
    SortKey {
        bucket,
        position,
        value,
        text: text.to_string(),
    }
}

fn threshold_key(caps: &regex::Captures, position: Position, text: &str) -> SortKey {
    let (bucket, multiplier) = unit_bucket(&caps[2]);
    key(bucket, position, number(&caps[1]) * multiplier, text)
}

/// Computes the ordering key of one answer.
///
/// Families are tried in a fixed order: open-ended thresholds, percentages,
/// years, amounts of money, months, headcounts, frequencies, Likert scales,
/// stages, yes/no and finally plain text.
pub fn sort_key(value: &str) -> SortKey {
    let text = value.trim();
    let lower = text.to_lowercase();

    if let Some(c) = BELOW_PREFIX
        .captures(text)
        .or_else(|| BELOW_SUFFIX.captures(text))
    {
        return threshold_key(&c, Position::Below, text);
    }
    if let Some(c) = ABOVE_PREFIX
        .captures(text)
        .or_else(|| ABOVE_SUFFIX.captures(text))
    {
        return threshold_key(&c, Position::Above, text);
    }
    if let Some(c) = PERCENT.captures(text) {
        return key(Bucket::Percent, Position::Within, number(&c[1]), text);
    }
    if let Some(c) = YEARS.captures(text) {
        return key(Bucket::Years, Position::Within, number(&c[1]), text);
    }
    if let Some(c) = MONEY.captures(text) {
        // The lower bound carries its own unit, or borrows the upper bound's.
        let unit = c
            .get(2)
            .or_else(|| c.get(3))
            .or_else(|| c.get(4))
            .map(|m| m.as_str());
        if let Some(unit) = unit {
            return key(
                Bucket::Money,
                Position::Within,
                number(&c[1]) * money_multiplier(unit),
                text,
            );
        }
    }
    if let Some(c) = MONTHS.captures(text) {
        return key(Bucket::Months, Position::Within, number(&c[1]), text);
    }
    if let Some(c) = HEADCOUNT.captures(text) {
        return key(Bucket::Headcount, Position::Within, number(&c[1]), text);
    }
    if NEVER.contains(&lower.as_str()) {
        return key(Bucket::Frequency, Position::Within, 7.0, text);
    }
    if let Some((_, rank)) = FREQUENCIES.iter().find(|(t, _)| lower.contains(t)) {
        return key(Bucket::Frequency, Position::Within, *rank, text);
    }
    if let Some((_, rank)) = LIKERT_BY_LENGTH.iter().find(|(t, _)| lower.contains(t)) {
        return key(Bucket::Likert, Position::Within, *rank, text);
    }
    if let Some(c) = STAGE.captures(&lower) {
        let n = c
            .get(1)
            .or_else(|| c.get(2))
            .or_else(|| c.get(3))
            .map(|m| han_digit(m.as_str()))
            .unwrap_or(0.0);
        return key(Bucket::Stage, Position::Within, n, text);
    }
    if BINARY_YES.contains(&lower.as_str()) {
        return key(Bucket::Binary, Position::Within, 1.0, text);
    }
    if BINARY_NO.contains(&lower.as_str()) {
        return key(Bucket::Binary, Position::Within, 2.0, text);
    }
    key(Bucket::Text, Position::Within, 0.0, text)
}

/// Compares two answers by their sort keys.
pub fn compare_categories(a: &str, b: &str) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

/// Sorts the values by their sort keys. The sort is stable.
///
/// If computing the keys fails for any reason, the values are returned in
/// their original order.
pub fn smart_sort<S: AsRef<str> + Clone>(values: &[S]) -> Vec<S> {
    sort_by_keys(values, sort_key)
}

fn sort_by_keys<S, F>(values: &[S], key_of: F) -> Vec<S>
where
    S: AsRef<str> + Clone,
    F: Fn(&str) -> SortKey,
{
    let sorted = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut keyed: Vec<(SortKey, S)> = values
            .iter()
            .map(|v| (key_of(v.as_ref()), v.clone()))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, v)| v).collect::<Vec<S>>()
    }));
    match sorted {
        Ok(v) => v,
        Err(_) => {
            warn!(
                "smart_sort: could not order {} values, keeping the original order",
                values.len()
            );
            values.to_vec()
        }
    }
}

/// Normalizes every answer and returns the distinct canonical values,
/// smart-sorted.
pub fn canonical_categories<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::new();
    for v in values.iter() {
        let n = normalize(v.as_ref());
        if !n.is_empty() && !distinct.contains(&n) {
            distinct.push(n);
        }
    }
    debug!("canonical_categories: {} distinct values", distinct.len());
    smart_sort(&distinct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_variants() {
        assert_eq!(normalize("１０％～２０％"), "10-20%");
        assert_eq!(normalize("10%-未滿20%"), "10-20%");
        assert_eq!(normalize("10-20%(不含20%)"), "10-20%");
        assert_eq!(normalize("10–20%"), "10-20%");
        assert_eq!(normalize("  5 至 10 人 "), "5-10人");
        assert_eq!(normalize("不固定"), "不定期");
        assert_eq!(normalize("Ad hoc"), "不定期");
        assert_eq!(normalize("每周"), "每週");
        assert_eq!(normalize("是"), "是");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "１０％～２０％",
            "10%-未滿20%",
            "10-20%(不含20%)",
            "3 年 以上",
            "100萬~500萬",
            "100 萬 ~ 500萬",
            "10 % - 20 %",
            "  非常　同意 ",
            "不固定",
            "每季度",
            "第一階段：種子期",
            "Strongly agree",
            "",
            "   ",
        ];
        for i in inputs.iter() {
            let once = normalize(i);
            assert_eq!(normalize(&once), once, "input {:?}", i);
        }
    }

    #[test]
    fn percent_ranges_with_open_ends() {
        let values = vec!["50%以上", "10-20%", "未滿10%", "20-50%"];
        assert_eq!(
            smart_sort(&values),
            vec!["未滿10%", "10-20%", "20-50%", "50%以上"]
        );
    }

    #[test]
    fn money_uses_absolute_lower_bound() {
        let values = vec!["1億以上", "500萬-1千萬", "1千萬-1億", "未滿500萬"];
        assert_eq!(
            smart_sort(&values),
            vec!["未滿500萬", "500萬-1千萬", "1千萬-1億", "1億以上"]
        );
    }

    #[test]
    fn years_and_months() {
        let values = vec!["10年以上", "3-5年", "1-3年", "未滿1年"];
        assert_eq!(
            smart_sort(&values),
            vec!["未滿1年", "1-3年", "3-5年", "10年以上"]
        );
        let values = vec!["12個月", "3個月", "6個月"];
        assert_eq!(smart_sort(&values), vec!["3個月", "6個月", "12個月"]);
    }

    #[test]
    fn frequencies() {
        let values = vec!["不定期", "每年", "每季", "無", "每月"];
        assert_eq!(
            smart_sort(&values),
            vec!["每月", "每季", "每年", "不定期", "無"]
        );
    }

    #[test]
    fn likert_negative_to_positive() {
        let values = vec!["同意", "非常不同意", "普通", "非常同意", "不同意"];
        assert_eq!(
            smart_sort(&values),
            vec!["非常不同意", "不同意", "普通", "同意", "非常同意"]
        );
    }

    #[test]
    fn stages_and_binary() {
        let values = vec!["第三階段", "第一階段", "第二階段"];
        assert_eq!(
            smart_sort(&values),
            vec!["第一階段", "第二階段", "第三階段"]
        );
        let values = vec!["否", "是"];
        assert_eq!(smart_sort(&values), vec!["是", "否"]);
    }

    #[test]
    fn sort_is_monotone_on_keys() {
        let values = vec![
            "其他", "是", "50%以上", "每月", "3-5年", "非常同意", "未滿10%", "否", "第二階段",
            "10-20%", "1億以上", "5人",
        ];
        let sorted = smart_sort(&values);
        assert_eq!(sorted.len(), values.len());
        for w in sorted.windows(2) {
            assert!(sort_key(w[0]) <= sort_key(w[1]), "{} > {}", w[0], w[1]);
        }
    }

    #[test]
    fn threshold_phrasings() {
        let values = vec!["50%及以上", "10-20%", "未達10%", "50-60%"];
        assert_eq!(
            smart_sort(&values),
            vec!["未達10%", "10-20%", "50-60%", "50%及以上"]
        );
        let values = vec!["5年(含)以上", "1-3年", "1年(含)以下", "3-5年"];
        assert_eq!(
            smart_sort(&values),
            vec!["1年(含)以下", "1-3年", "3-5年", "5年(含)以上"]
        );
        assert_eq!(sort_key("10人以上(含)").position, Position::Above);
        assert_eq!(sort_key("不足5人").position, Position::Below);
    }

    fn sorted_copy(values: &[String]) -> Vec<String> {
        let mut v = values.to_vec();
        v.sort();
        v
    }

    #[test]
    fn failed_classification_keeps_original_order() {
        let values: Vec<String> = vec!["50%以上", "10-20%", "未滿10%"]
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let res = sort_by_keys(&values, |v| {
            if v.starts_with("未滿") {
                panic!("cannot classify {}", v);
            }
            sort_key(v)
        });
        assert_eq!(res, values);
    }

    #[test]
    fn unusual_unicode_keeps_every_value() {
        let values: Vec<String> = vec![
            String::from_utf8_lossy(&[0xff, 0xfe, 0x31, 0x30, 0x25]).to_string(),
            "\u{0301}10-20%".to_string(),
            "\u{200b}\u{200f}".to_string(),
            "１０％～２０％".to_string(),
            "\u{FFFF}年".to_string(),
            "10-20%".to_string(),
            "10-20%".to_string(),
            "🙂以上".to_string(),
            String::new(),
        ];
        let res = smart_sort(&values);
        assert_eq!(sorted_copy(&res), sorted_copy(&values));
    }

    #[test]
    fn plain_text_after_known_families() {
        let values = vec!["b", "a", "是"];
        assert_eq!(smart_sort(&values), vec!["是", "a", "b"]);
    }

    #[test]
    fn canonical_categories_deduplicates() {
        let values = vec!["１０％～２０％", "10-20%", "未滿10%", " "];
        assert_eq!(canonical_categories(&values), vec!["未滿10%", "10-20%"]);
    }
}
