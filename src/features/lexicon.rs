use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

/// An external word list contributing a boolean membership feature.
/// Matching is case-insensitive; entries are folded at load time. The
/// loaded contents travel inside the stored model, so decoding never goes
/// back to the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lexicon {
    feature: String,
    entries: BTreeSet<String>,
}

impl Lexicon {
    pub fn from_path(key: &str, path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|_| ConfigError::LexiconNotFound {
            key: key.to_string(),
            path: path.to_path_buf(),
        })?;
        let mut entries = BTreeSet::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let entry = line.trim();
            if !entry.is_empty() {
                entries.insert(entry.to_lowercase());
            }
        }
        Ok(Self::from_entries(key, entries))
    }

    pub fn from_entries(key: &str, entries: BTreeSet<String>) -> Self {
        Self {
            feature: format!("{key}_membership"),
            entries,
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains(&token.to_lowercase())
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) struct LexiconPipe {
    lexicon: Lexicon,
}

impl LexiconPipe {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }
}

impl TokenPipe for LexiconPipe {
    fn pipe(&self, _sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        for (i, text) in texts.iter().enumerate() {
            if self.lexicon.contains(text) {
                feats[i].insert(self.lexicon.feature().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::Sentence;

    #[test]
    fn membership_is_case_insensitive() {
        let entries: BTreeSet<String> = ["il-2", "tnf"].iter().map(|s| s.to_string()).collect();
        let lex = Lexicon::from_entries("genes_lexicon", entries);
        let pipe = LexiconPipe::new(lex);
        let s = Sentence::from_tokens(&["IL-2", "binds"]);
        let texts = vec!["IL-2".to_string(), "binds".to_string()];
        let mut feats = vec![FeatSet::new(); 2];
        pipe.pipe(&s, &texts, &mut feats);
        assert!(feats[0].contains("genes_lexicon_membership"));
        assert!(feats[1].is_empty());
    }
}
