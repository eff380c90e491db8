use std::collections::HashMap;

/// Curated equivalences between question phrasings.
///
/// Each pair declares that the two texts are the same question. The relation
/// is symmetric and transitive: all the phrasings linked by some chain of
/// pairs form one alias group.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct AliasTable {
    groups: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl AliasTable {
    pub fn new() -> AliasTable {
        AliasTable::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> AliasTable
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut t = AliasTable::new();
        for (a, b) in pairs {
            t.add_pair(a.as_ref(), b.as_ref());
        }
        t
    }

    /// Declares that `a` and `b` are the same question.
    pub fn add_pair(&mut self, a: &str, b: &str) {
        let a = a.trim();
        let b = b.trim();
        if a.is_empty() || b.is_empty() || a == b {
            return;
        }
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(ga), Some(gb)) if ga == gb => {}
            (Some(ga), Some(gb)) => {
                let moved = std::mem::take(&mut self.groups[gb]);
                for m in moved.iter() {
                    self.index.insert(m.clone(), ga);
                }
                self.groups[ga].extend(moved);
            }
            (Some(g), None) => self.insert(b, g),
            (None, Some(g)) => self.insert(a, g),
            (None, None) => {
                let g = self.groups.len();
                self.groups.push(Vec::new());
                self.insert(a, g);
                self.insert(b, g);
            }
        }
    }

    fn insert(&mut self, text: &str, group: usize) {
        self.index.insert(text.to_string(), group);
        self.groups[group].push(text.to_string());
    }

    /// All the declared equivalents of a question, in declaration order. The
    /// question itself is not included.
    pub fn aliases_of(&self, question: &str) -> Vec<&str> {
        let question = question.trim();
        match self.index.get(question) {
            Some(g) => self.groups[*g]
                .iter()
                .filter(|m| m.as_str() != question)
                .map(|m| m.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of alias groups.
    pub fn len(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
