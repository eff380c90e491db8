//! Normalization and comparison of question texts.
//!
//! The company and investor questionnaires ask the same things with slightly
//! different phrasings ("大股東合計持股比例" vs "您投資的公司之大股東合計持股比例").
//! Two normalizations are available:
//! - the light form only removes markup, polite prefixes and trailing
//!   punctuation. Two questions with the same light form are the same question.
//! - the heavy form also collapses known paraphrases and drops punctuation.
//!   It is only used to score similarity.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::categories::to_halfwidth;

static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"【[^】]*】").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static CHOICE_NOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(?:可複選|複選|單選|多選|可多選)\s*\)").unwrap());
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\p{P}]+").unwrap());

const LEADING_PHRASES: &[&str] = &[
    "請問您投資的公司之",
    "請問您投資的公司的",
    "請問您投資的公司",
    "您投資的公司之",
    "您投資的公司的",
    "請問貴公司之",
    "請問貴公司的",
    "請問貴公司",
    "請問公司之",
    "請問公司的",
    "請問",
    "貴公司之",
    "貴公司的",
    "貴公司",
    "公司之",
    "公司的",
    "please state the company's ",
    "please indicate the company's ",
    "please state ",
    "please indicate ",
];

const TRAILING: &[char] = &['?', ':', '.', '。', '？', '：', ' '];

const PARAPHRASES: &[(&str, &str)] = &[
    ("您投資的公司", "公司"),
    ("被投資公司", "公司"),
    ("貴公司", "公司"),
    ("該公司", "公司"),
    ("在過去12個月內", "過去12個月"),
    ("過去12個月內", "過去12個月"),
    ("過去一年內", "過去12個月"),
    ("過去一年", "過去12個月"),
    ("最近一年", "過去12個月"),
    ("通常", ""),
    ("目前", ""),
    ("請問", ""),
];

/// Removes the `【...】` annotations and line breaks of a raw column header.
pub fn clean_column_name(raw: &str) -> String {
    let s = BRACKET_TAG.replace_all(raw, "");
    let s = s.replace(['\n', '\r'], " ");
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

/// The light form of a question text.
pub fn light_normalize(question: &str) -> String {
    let s = to_halfwidth(question);
    let s = BRACKET_TAG.replace_all(&s, "");
    let s = CHOICE_NOTE.replace_all(&s, "");
    let mut s = WHITESPACE.replace_all(s.trim(), " ").to_lowercase();
    let mut changed = true;
    while changed {
        changed = false;
        let trimmed = s.trim_end_matches(TRAILING).trim_start();
        if trimmed.len() != s.len() {
            s = trimmed.to_string();
            changed = true;
        }
        if let Some(p) = LEADING_PHRASES.iter().find(|p| s.starts_with(*p)) {
            s = s[p.len()..].to_string();
            changed = true;
        }
    }
    s
}

/// The heavy form of a question text: the light form with known paraphrases
/// collapsed and without any punctuation or whitespace.
pub fn heavy_normalize(question: &str) -> String {
    let mut s = light_normalize(question);
    for (from, to) in PARAPHRASES.iter() {
        s = s.replace(from, to);
    }
    PUNCTUATION.replace_all(&s, "").to_string()
}

/// Ratcliff/Obershelp similarity, `2 * M / T` where `M` is the number of
/// matched characters and `T` the total number of characters.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(&a, &b, alo, ahi, blo, bhi);
        if k > 0 {
            matched += k;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }
    }
    2.0 * matched as f64 / total as f64
}

// Earliest longest common block of a[alo..ahi] and b[blo..bhi].
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            cur[col] = if a[i] == b[j] { prev[col - 1] + 1 } else { 0 };
            if cur[col] > best.2 {
                best = (i + 1 - cur[col], j + 1 - cur[col], cur[col]);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

const STOP_BIGRAMS: &[&str] = &[
    "公司", "請問", "是否", "過去", "個月", "哪些", "多少", "為何", "您的", "如何", "情形", "相關",
];

const STOP_WORDS: &[&str] = &["the", "of", "and", "or", "company", "please", "your", "is", "are"];

fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// Content words of a text: ASCII words of at least two characters and
/// character bigrams of the Han runs, minus boilerplate.
pub fn content_words(text: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    let mut ascii = String::new();
    let mut han: Vec<char> = Vec::new();
    let flush_han = |han: &mut Vec<char>, words: &mut BTreeSet<String>| {
        for w in han.windows(2) {
            let bigram: String = w.iter().collect();
            if !STOP_BIGRAMS.contains(&bigram.as_str()) {
                words.insert(bigram);
            }
        }
        han.clear();
    };
    let flush_ascii = |ascii: &mut String, words: &mut BTreeSet<String>| {
        if ascii.chars().count() >= 2 && !STOP_WORDS.contains(&ascii.as_str()) {
            words.insert(ascii.clone());
        }
        ascii.clear();
    };
    for c in text.to_lowercase().chars() {
        if is_han(c) {
            flush_ascii(&mut ascii, &mut words);
            han.push(c);
        } else if c.is_ascii_alphanumeric() {
            flush_han(&mut han, &mut words);
            ascii.push(c);
        } else {
            flush_han(&mut han, &mut words);
            flush_ascii(&mut ascii, &mut words);
        }
    }
    flush_han(&mut han, &mut words);
    flush_ascii(&mut ascii, &mut words);
    words
}

/// `|A ∩ B| / min(|A|, |B|)` over the content words of both texts.
pub fn keyword_overlap(a: &str, b: &str) -> f64 {
    let wa = content_words(a);
    let wb = content_words(b);
    match (wa.is_empty(), wb.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let common = wa.intersection(&wb).count();
            common as f64 / wa.len().min(wb.len()) as f64
        }
    }
}

/// The similarity of two heavy-normalized texts: the sequence ratio,
/// attenuated when the texts share less than half of their content words.
pub fn adjusted_similarity(a: &str, b: &str) -> f64 {
    let ratio = sequence_ratio(a, b);
    let overlap = keyword_overlap(a, b);
    if overlap < 0.5 {
        ratio * (0.5 + overlap)
    } else {
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_headers() {
        assert_eq!(
            clean_column_name("【單選】董事會\n成員人數 "),
            "董事會 成員人數"
        );
    }

    #[test]
    fn light_form_strips_prefixes() {
        assert_eq!(
            light_normalize("您投資的公司之大股東合計持股比例？"),
            "大股東合計持股比例"
        );
        assert_eq!(light_normalize("大股東合計持股比例"), "大股東合計持股比例");
        assert_eq!(
            light_normalize("請問貴公司董事會成員人數：(可複選)"),
            "董事會成員人數"
        );
        assert_eq!(
            light_normalize("Please state the company's board size?"),
            "board size"
        );
    }

    #[test]
    fn heavy_form_collapses_paraphrases() {
        assert_eq!(
            heavy_normalize("在過去12個月內，您投資的公司通常召開幾次董事會?"),
            heavy_normalize("過去一年，公司召開幾次董事會")
        );
    }

    #[test]
    fn ratio_bounds() {
        assert_eq!(sequence_ratio("abc", "abc"), 1.0);
        assert_eq!(sequence_ratio("abc", "xyz"), 0.0);
        assert_eq!(sequence_ratio("", ""), 1.0);
        let r = sequence_ratio("abcd", "bcde");
        assert!((r - 0.75).abs() < 1e-12);
    }

    #[test]
    fn overlap_penalizes_unrelated_questions() {
        let a = heavy_normalize("公司董事會成員人數");
        let b = heavy_normalize("公司監察人成員人數");
        let c = heavy_normalize("公司董事會的成員人數");
        assert!(adjusted_similarity(&a, &c) > 0.9);
        assert!(adjusted_similarity(&a, &b) < adjusted_similarity(&a, &c));
    }

    #[test]
    fn content_words_skip_boilerplate() {
        let w = content_words("公司董事 board size");
        assert!(w.contains("董事"));
        assert!(w.contains("司董"));
        assert!(!w.contains("公司"));
        assert!(w.contains("board"));
    }
}
