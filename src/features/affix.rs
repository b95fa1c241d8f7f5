use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

enum Side {
    Prefix,
    Suffix,
}

/// Character prefixes or suffixes of configured lengths. A token shorter
/// than a configured length contributes nothing for that length.
pub(crate) struct AffixPipe {
    side: Side,
    sizes: Vec<usize>,
}

impl AffixPipe {
    pub fn prefixes(sizes: Vec<usize>) -> Self {
        Self { side: Side::Prefix, sizes }
    }

    pub fn suffixes(sizes: Vec<usize>) -> Self {
        Self { side: Side::Suffix, sizes }
    }
}

impl TokenPipe for AffixPipe {
    fn pipe(&self, _sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        for (i, text) in texts.iter().enumerate() {
            let chars: Vec<char> = text.chars().collect();
            for &size in &self.sizes {
                if size == 0 || chars.len() < size {
                    continue;
                }
                let feat = match self.side {
                    Side::Prefix => {
                        format!("PREFIX={}", chars[..size].iter().collect::<String>())
                    }
                    Side::Suffix => {
                        format!("SUFFIX={}", chars[chars.len() - size..].iter().collect::<String>())
                    }
                };
                feats[i].insert(feat);
            }
        }
    }
}
