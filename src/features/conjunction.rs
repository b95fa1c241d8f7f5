use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

/// Context conjunctions: for each configured offset group, the feature sets
/// of the units at those relative offsets are combined into new compound
/// features at the current position. This is how the window around a unit
/// enters the model without widening the chain itself.
///
/// The stage works on a snapshot of the features materialized by earlier
/// stages, so its own output never feeds back into itself. A group touching
/// a position outside the sentence emits nothing at that position; the
/// plain `(0)` group is a no-op (those features are already present).
pub(crate) struct ConjunctionPipe {
    groups: Vec<Vec<i32>>,
}

impl ConjunctionPipe {
    pub fn new(groups: Vec<Vec<i32>>) -> Self {
        Self { groups }
    }
}

fn offset_name(feat: &str, offset: i32) -> String {
    if offset == 0 {
        feat.to_string()
    } else {
        format!("{feat}@{offset}")
    }
}

impl TokenPipe for ConjunctionPipe {
    fn pipe(&self, sentence: &Sentence, _texts: &[String], feats: &mut [FeatSet]) {
        let snapshot: Vec<FeatSet> = feats.to_vec();
        let len = sentence.len() as i32;
        for t in 0..len {
            for group in &self.groups {
                if group.len() == 1 && group[0] == 0 {
                    continue;
                }
                if group.iter().any(|&o| t + o < 0 || t + o >= len) {
                    continue;
                }
                let mut combos: Vec<String> = vec![String::new()];
                for &o in group {
                    let here = &snapshot[(t + o) as usize];
                    let mut next = Vec::with_capacity(combos.len() * here.len());
                    for prefix in &combos {
                        for feat in here {
                            let part = offset_name(feat, o);
                            if prefix.is_empty() {
                                next.push(part);
                            } else {
                                next.push(format!("{prefix}_&_{part}"));
                            }
                        }
                    }
                    combos = next;
                }
                feats[t as usize].extend(combos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::Sentence;

    fn seeded(sets: &[&[&str]]) -> Vec<FeatSet> {
        sets.iter()
            .map(|fs| fs.iter().map(|f| f.to_string()).collect())
            .collect()
    }

    #[test]
    fn singleton_offsets_copy_neighbors() {
        let s = Sentence::from_tokens(&["a", "b", "c"]);
        let texts: Vec<String> = ["a", "b", "c"].iter().map(|x| x.to_string()).collect();
        let mut feats = seeded(&[&["W=a"], &["W=b"], &["W=c"]]);
        ConjunctionPipe::new(vec![vec![-1], vec![0], vec![1]]).pipe(&s, &texts, &mut feats);
        assert!(feats[1].contains("W=a@-1"));
        assert!(feats[1].contains("W=c@1"));
        // boundary positions: no out-of-range conjuncts
        assert!(!feats[0].iter().any(|f| f.ends_with("@-1")));
        assert!(!feats[2].iter().any(|f| f.ends_with("@1")));
    }

    #[test]
    fn zero_group_is_noop() {
        let s = Sentence::from_tokens(&["a"]);
        let texts = vec!["a".to_string()];
        let mut feats = seeded(&[&["W=a"]]);
        ConjunctionPipe::new(vec![vec![0]]).pipe(&s, &texts, &mut feats);
        assert_eq!(feats[0].len(), 1);
    }

    #[test]
    fn pair_groups_build_products() {
        let s = Sentence::from_tokens(&["a", "b"]);
        let texts: Vec<String> = ["a", "b"].iter().map(|x| x.to_string()).collect();
        let mut feats = seeded(&[&["W=a", "X"], &["W=b"]]);
        ConjunctionPipe::new(vec![vec![-1, 0]]).pipe(&s, &texts, &mut feats);
        assert!(feats[1].contains("W=a@-1_&_W=b"));
        assert!(feats[1].contains("X@-1_&_W=b"));
    }
}
