use std::collections::HashMap;

use log::{debug, info};

use crate::config::ResponseTable;
use crate::similarity::{adjusted_similarity, heavy_normalize};

const UNTITLED_MARKERS: &[&str] = &["未命名", "untitled question", "untitled"];

/// A set of columns asking the same question.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct MergeGroup {
    /// The column under which the question is analysed.
    pub representative: String,
    /// All the columns of the group, representative included, in table order.
    pub members: Vec<String>,
}

impl MergeGroup {
    pub fn is_merged(&self) -> bool {
        self.members.len() > 1
    }
}

fn is_untitled(column: &str) -> bool {
    let lower = column.to_lowercase();
    UNTITLED_MARKERS.iter().any(|m| lower.contains(m))
}

// Shortest titled name, earliest on ties. Falls back to the first member.
fn pick_representative(members: &[String]) -> String {
    members
        .iter()
        .filter(|m| !is_untitled(m))
        .min_by_key(|m| m.chars().count())
        .unwrap_or(&members[0])
        .clone()
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> DisjointSets {
        DisjointSets {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    // The smaller index stays the root, so roots follow table order.
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra < rb {
            self.parent[rb] = ra;
        } else if rb < ra {
            self.parent[ra] = rb;
        }
    }
}

/// Groups the columns of a table that ask the same question.
///
/// Columns with the same heavy-normalized text always end up in the same
/// group. Distinct texts are grouped when their adjusted similarity reaches
/// the threshold; grouping is transitive. Excluded columns are left out.
/// Every other column belongs to exactly one group, and groups are listed in
/// the order of their first column.
pub fn plan_merge(
    table: &ResponseTable,
    excluded_columns: &[String],
    similarity_threshold: f64,
) -> Vec<MergeGroup> {
    let columns: Vec<&String> = table
        .columns()
        .iter()
        .filter(|c| !excluded_columns.contains(*c))
        .collect();

    // Identical normalized forms are handled once.
    let mut forms: Vec<String> = Vec::new();
    let mut form_of_column: Vec<usize> = Vec::with_capacity(columns.len());
    let mut form_index: HashMap<String, usize> = HashMap::new();
    for c in columns.iter() {
        let f = heavy_normalize(c);
        let idx = *form_index.entry(f.clone()).or_insert_with(|| {
            forms.push(f);
            forms.len() - 1
        });
        form_of_column.push(idx);
    }

    let mut sets = DisjointSets::new(forms.len());
    for i in 0..forms.len() {
        for j in (i + 1)..forms.len() {
            if forms[i].is_empty() || forms[j].is_empty() {
                continue;
            }
            let s = adjusted_similarity(&forms[i], &forms[j]);
            if s >= similarity_threshold {
                debug!(
                    "plan_merge: {:?} ~ {:?} (similarity {:.3})",
                    forms[i], forms[j], s
                );
                sets.union(i, j);
            }
        }
    }

    let mut groups: Vec<(usize, Vec<String>)> = Vec::new();
    for (c, form) in columns.iter().zip(form_of_column.iter()) {
        let root = sets.find(*form);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push((*c).clone()),
            None => groups.push((root, vec![(*c).clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| MergeGroup {
            representative: pick_representative(&members),
            members,
        })
        .collect()
}

/// Merges the columns of a table that ask the same question.
///
/// For each group, the missing answers of the representative are filled from
/// the other members, in member order. Answers already present are never
/// changed, and the other members keep their values.
pub fn merge_questions(
    table: &mut ResponseTable,
    excluded_columns: &[String],
    similarity_threshold: f64,
) -> Vec<MergeGroup> {
    let groups = plan_merge(table, excluded_columns, similarity_threshold);
    for g in groups.iter().filter(|g| g.is_merged()) {
        let mut filled = 0;
        for m in g.members.iter().filter(|m| **m != g.representative) {
            filled += table.fill_missing(&g.representative, m);
        }
        info!(
            "merge_questions: merged {} columns into {:?} ({} answers backfilled)",
            g.members.len(),
            g.representative,
            filled
        );
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;

    fn survey() -> ResponseTable {
        let company = {
            let mut b = TableBuilder::new("公司問卷.csv");
            b.columns(&["大股東合計持股比例", "董事會成員人數", "填答時間"]);
            b.add_row(&["50-60%", "5", "2023/01/01"]).unwrap();
            b.build()
        };
        let investor = {
            let mut b = TableBuilder::new("投資方問卷.csv");
            b.columns(&["您投資的公司之大股東合計持股比例", "您投資的公司之董事會成員人數"]);
            b.add_row(&["10-20%", "7"]).unwrap();
            b.build()
        };
        ResponseTable::concat("all", &[company, investor])
    }

    #[test]
    fn merges_company_and_investor_phrasings() {
        let mut t = survey();
        let groups = merge_questions(&mut t, &["填答時間".to_string()], 0.72);
        assert_eq!(
            groups,
            vec![
                MergeGroup {
                    representative: "大股東合計持股比例".to_string(),
                    members: vec![
                        "大股東合計持股比例".to_string(),
                        "您投資的公司之大股東合計持股比例".to_string()
                    ],
                },
                MergeGroup {
                    representative: "董事會成員人數".to_string(),
                    members: vec![
                        "董事會成員人數".to_string(),
                        "您投資的公司之董事會成員人數".to_string()
                    ],
                },
            ]
        );
        let values: Vec<Option<&str>> = t
            .records()
            .iter()
            .map(|r| r.get("大股東合計持股比例"))
            .collect();
        assert_eq!(values, vec![Some("50-60%"), Some("10-20%")]);
        // Non-representative members keep their own values.
        assert_eq!(
            t.records()[1].get("您投資的公司之大股東合計持股比例"),
            Some("10-20%")
        );
        assert!(t.records()[0].is_missing("您投資的公司之大股東合計持股比例"));
    }

    #[test]
    fn backfill_does_not_overwrite() {
        let mut b = TableBuilder::new("x.csv");
        b.columns(&["持股比例", "請問公司的持股比例"]);
        b.add_row(&["10%", "99%"]).unwrap();
        b.add_row(&["", "20%"]).unwrap();
        let mut t = b.build();
        let groups = merge_questions(&mut t, &[], 0.72);
        assert_eq!(groups.len(), 1);
        assert_eq!(t.records()[0].get("持股比例"), Some("10%"));
        assert_eq!(t.records()[1].get("持股比例"), Some("20%"));
    }

    #[test]
    fn untitled_columns_are_not_representatives() {
        let members = vec!["未命名3".to_string(), "持股比例問題".to_string()];
        assert_eq!(pick_representative(&members), "持股比例問題");
        let members = vec!["未命名3".to_string(), "未命名".to_string()];
        assert_eq!(pick_representative(&members), "未命名3");
    }

    #[test]
    fn unrelated_questions_stay_apart() {
        let mut b = TableBuilder::new("x.csv");
        b.columns(&["董事會成員人數", "監察人人數", "公司成立年數"]);
        let groups = plan_merge(&b.build(), &[], 0.72);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| !g.is_merged()));
    }
}
