use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while interpreting a feature configuration or building the
/// pipeline from it. These are always fatal: a half-applied configuration
/// would make train-time and decode-time feature sets drift apart.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("value of `{key}` is not a comma-separated integer list: {value}")]
    BadIntList { key: String, value: String },
    #[error("malformed offset conjunction definition: {0}")]
    BadOffsetConjunctions(String),
    #[error("lexicon file for `{key}` not found: {path}")]
    LexiconNotFound { key: String, path: PathBuf },
    #[error("meta `{meta}` is enabled but `{key}` is missing")]
    MissingMetaKey { meta: String, key: String },
    #[error("token `{token}` has {actual} fields, configuration expects {expected}")]
    MetaColumnMismatch {
        token: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flat key/value map controlling which pipeline stages are active and how
/// they are parameterized. Unrecognized keys are ignored. The map is frozen
/// into the trained model so decoding always featurizes exactly like
/// training did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    options: BTreeMap<String, String>,
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `key = value` lines; `#`-prefixed lines and blanks are skipped.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, ConfigError> {
        let mut options = BTreeMap::new();
        for line in BufReader::new(rdr).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                options.insert(key.trim().to_string(), value.trim().to_string());
            } else {
                log::warn!("ignoring malformed configuration line: {line}");
            }
        }
        Ok(Self { options })
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|x| x.as_str())
    }

    /// True iff the key exists and is literally `true`.
    pub fn feature_active(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// Comma-separated integer list, e.g. `prefix_sizes = 2,3`.
    pub fn int_array(&self, key: &str) -> Result<Option<Vec<usize>>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value
            .trim()
            .split(',')
            .map(|s| s.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|_| ConfigError::BadIntList {
                key: key.to_string(),
                value: value.to_string(),
            })
    }

    /// Parses the feature-creation horizon from a string of the form
    /// `(-1) (0) (1)`, `(-1) (0) (1,2)` or `(-1) (0) (1 2)`.
    pub fn offset_conjunctions(&self) -> Result<Option<Vec<Vec<i32>>>, ConfigError> {
        let Some(value) = self.get("offset_conjunctions") else {
            return Ok(None);
        };
        let in_brackets = Regex::new(r"\(([-\d\s,]+)\)").unwrap();
        let mut groups = Vec::new();
        for caps in in_brackets.captures_iter(value) {
            let group = caps
                .get(1)
                .unwrap()
                .as_str()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<i32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::BadOffsetConjunctions(value.to_string()))?;
            if group.is_empty() {
                return Err(ConfigError::BadOffsetConjunctions(value.to_string()));
            }
            groups.push(group);
        }
        // Anything left outside brackets other than whitespace means the
        // definition did not parse the way the user intended.
        let residue = in_brackets.replace_all(value, "");
        if groups.is_empty() || !residue.trim().is_empty() {
            return Err(ConfigError::BadOffsetConjunctions(value.to_string()));
        }
        Ok(Some(groups))
    }

    /// Keys of the form `<name>_lexicon`; each names an external word list
    /// contributing a membership feature.
    pub fn lexicon_keys(&self) -> Vec<String> {
        self.options
            .keys()
            .filter(|k| {
                k.ends_with("_lexicon") && k[..k.len() - "_lexicon".len()]
                    .chars()
                    .all(|c| c.is_ascii_alphabetic())
                    && k.len() > "_lexicon".len()
            })
            .cloned()
            .collect()
    }

    /// Names of meta features switched on via `<meta>_feat_enabled = true`.
    pub fn enabled_metas(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|(k, v)| k.ends_with("_feat_enabled") && v.as_str() == "true")
            .map(|(k, _)| k[..k.len() - "_feat_enabled".len()].to_string())
            .filter(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_alphabetic()))
            .collect()
    }

    /// Unit-level feature name for an enabled meta, from `<meta>_feat_unit`.
    pub fn meta_unit_name(&self, meta: &str) -> Result<String, ConfigError> {
        let key = format!("{meta}_feat_unit");
        self.get(&key)
            .map(|s| s.to_string())
            .ok_or_else(|| ConfigError::MissingMetaKey {
                meta: meta.to_string(),
                key,
            })
    }

    /// Column position of an enabled meta in the piped input format, from
    /// `<meta>_feat_position`.
    pub fn meta_position(&self, meta: &str) -> Result<usize, ConfigError> {
        let key = format!("{meta}_feat_position");
        let value = self.get(&key).ok_or_else(|| ConfigError::MissingMetaKey {
            meta: meta.to_string(),
            key: key.clone(),
        })?;
        value.parse().map_err(|_| ConfigError::BadIntList {
            key,
            value: value.to_string(),
        })
    }

    /// Placeholder marking an absent meta value in the piped format.
    pub fn gap_character(&self) -> &str {
        self.get("gap_character").unwrap_or("@")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_toggles() {
        let mut c = FeatureConfig::new();
        c.set("feat_plural_enabled", "true");
        c.set("feat_wc_enabled", "false");
        assert!(c.feature_active("feat_plural_enabled"));
        assert!(!c.feature_active("feat_wc_enabled"));
        assert!(!c.feature_active("feat_bwc_enabled"));
    }

    #[test]
    fn int_arrays() {
        let mut c = FeatureConfig::new();
        c.set("prefix_sizes", "2,3");
        c.set("suffix_sizes", "oops");
        assert_eq!(c.int_array("prefix_sizes").unwrap(), Some(vec![2, 3]));
        assert_eq!(c.int_array("token_ngrams").unwrap(), None);
        assert!(c.int_array("suffix_sizes").is_err());
    }

    #[test]
    fn offset_conjunction_forms() {
        let mut c = FeatureConfig::new();
        c.set("offset_conjunctions", "(-1) (0) (1)");
        assert_eq!(
            c.offset_conjunctions().unwrap(),
            Some(vec![vec![-1], vec![0], vec![1]])
        );
        c.set("offset_conjunctions", "(-1)(0)(1,2)");
        assert_eq!(
            c.offset_conjunctions().unwrap(),
            Some(vec![vec![-1], vec![0], vec![1, 2]])
        );
        c.set("offset_conjunctions", "(-1) (0) (1 2)");
        assert_eq!(
            c.offset_conjunctions().unwrap(),
            Some(vec![vec![-1], vec![0], vec![1, 2]])
        );
        c.set("offset_conjunctions", "nonsense");
        assert!(c.offset_conjunctions().is_err());
    }

    #[test]
    fn lexicon_and_meta_discovery() {
        let mut c = FeatureConfig::new();
        c.set("genes_lexicon", "/some/where/genes.lst");
        c.set("pos_feat_enabled", "true");
        c.set("pos_feat_unit", "POS");
        c.set("pos_feat_position", "1");
        c.set("chunk_feat_enabled", "false");
        assert_eq!(c.lexicon_keys(), vec!["genes_lexicon".to_string()]);
        assert_eq!(c.enabled_metas(), vec!["pos".to_string()]);
        assert_eq!(c.meta_unit_name("pos").unwrap(), "POS");
        assert_eq!(c.meta_position("pos").unwrap(), 1);
        assert!(c.meta_unit_name("chunk").is_err());
    }

    #[test]
    fn reads_properties_lines() {
        let text = "# defaults\nfeat_plural_enabled = true\n\nprefix_sizes=2,3\n";
        let c = FeatureConfig::from_reader(text.as_bytes()).unwrap();
        assert!(c.feature_active("feat_plural_enabled"));
        assert_eq!(c.int_array("prefix_sizes").unwrap(), Some(vec![2, 3]));
    }
}
