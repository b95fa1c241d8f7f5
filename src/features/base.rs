use crate::config::{ConfigError, FeatureConfig};
use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

/// Lower-cases tokens with exactly one leading upper-case letter
/// ("Interleukin" but not "IL" or "RasGTP").
fn case_normalize(text: &str, lowercase: bool) -> String {
    if lowercase {
        let mut chars = text.chars();
        let initial_upper = chars.next().map(|c| c.is_uppercase()).unwrap_or(false);
        if initial_upper && !chars.any(|c| c.is_uppercase()) {
            return text.to_lowercase();
        }
    }
    text.to_string()
}

/// Strips common English plural endings. Deliberately conservative: a wrong
/// stem merges unrelated tokens, a missed plural only costs one feature.
pub(crate) fn stem(word: &str) -> String {
    let n = word.len();
    if word.ends_with("ies") && n > 4 {
        return format!("{}y", &word[..n - 3]);
    }
    if (word.ends_with("ses")
        || word.ends_with("xes")
        || word.ends_with("zes")
        || word.ends_with("ches")
        || word.ends_with("shes"))
        && n > 4
    {
        return word[..n - 2].to_string();
    }
    if word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
        && n > 3
    {
        return word[..n - 1].to_string();
    }
    word.to_string()
}

/// Case normalization plus stemming, applied once per unit before any stage
/// runs; all stages see this normalized form.
pub(crate) struct Normalizer {
    lowercase: bool,
}

impl Normalizer {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            lowercase: config.feature_active("feat_lowercase_enabled"),
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        stem(&case_normalize(text, self.lowercase))
    }
}

/// First pipeline stage: the literal (normalized) token, the plural
/// indicator, word-class abstractions and per-unit metadata features.
pub(crate) struct BasePipe {
    lowercase: bool,
    plural: bool,
    wc: bool,
    bwc: bool,
    /// Feature names of the enabled metas; each doubles as the key into the
    /// unit meta map.
    metas: Vec<String>,
}

impl BasePipe {
    pub fn new(config: &FeatureConfig) -> Result<Self, ConfigError> {
        let mut metas = Vec::new();
        for meta in config.enabled_metas() {
            metas.push(config.meta_unit_name(&meta)?);
        }
        Ok(Self {
            lowercase: config.feature_active("feat_lowercase_enabled"),
            plural: config.feature_active("feat_plural_enabled"),
            wc: config.feature_active("feat_wc_enabled"),
            bwc: config.feature_active("feat_bwc_enabled"),
            metas,
        })
    }
}

impl TokenPipe for BasePipe {
    fn pipe(&self, sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        for (i, unit) in sentence.units().iter().enumerate() {
            let text = &texts[i];
            feats[i].insert(format!("W={text}"));

            // Plural: the (case-normalized) surface form is the stem + "s".
            if self.plural {
                let surface = case_normalize(unit.text(), self.lowercase);
                if surface == format!("{text}s") {
                    feats[i].insert("PLURAL".to_string());
                }
            }

            for name in &self.metas {
                if let Some(value) = unit.meta(name) {
                    feats[i].insert(format!("{name}={value}"));
                }
            }

            if self.wc {
                feats[i].insert(format!("WC={}", word_class(text)));
            }
            if self.bwc {
                feats[i].insert(format!("BWC={}", brief_word_class(text)));
            }
        }
    }
}

/// Per-character abstraction: uppercase -> A, lowercase -> a, digit -> 0,
/// everything else -> x.
fn word_class(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_uppercase() {
                'A'
            } else if c.is_lowercase() {
                'a'
            } else if c.is_ascii_digit() {
                '0'
            } else {
                'x'
            }
        })
        .collect()
}

/// Like [`word_class`] with runs of equal classes collapsed.
fn brief_word_class(text: &str) -> String {
    let mut out = String::new();
    for c in word_class(text).chars() {
        if out.chars().last() != Some(c) {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::{Sentence, Unit};

    #[test]
    fn word_classes() {
        assert_eq!(word_class("IL-2"), "AAx0");
        assert_eq!(brief_word_class("IL-2"), "Ax0");
        assert_eq!(brief_word_class("Abc123"), "Aa0");
    }

    #[test]
    fn stemming() {
        assert_eq!(stem("receptors"), "receptor");
        assert_eq!(stem("bodies"), "body");
        assert_eq!(stem("classes"), "class");
        assert_eq!(stem("virus"), "virus");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn plural_fires_on_stem_plus_s() {
        let mut c = FeatureConfig::new();
        c.set("feat_plural_enabled", "true");
        let norm = Normalizer::new(&c);
        let pipe = BasePipe::new(&c).unwrap();
        let s = Sentence::from_tokens(&["receptors", "is"]);
        let texts: Vec<String> = s.units().iter().map(|u| norm.normalize(u.text())).collect();
        let mut feats = vec![FeatSet::new(); 2];
        pipe.pipe(&s, &texts, &mut feats);
        assert!(feats[0].contains("PLURAL"), "{:?}", feats[0]);
        assert!(feats[0].contains("W=receptor"));
        assert!(!feats[1].contains("PLURAL"));
    }

    #[test]
    fn plural_respects_case_normalization() {
        let mut c = FeatureConfig::new();
        c.set("feat_plural_enabled", "true");
        c.set("feat_lowercase_enabled", "true");
        let norm = Normalizer::new(&c);
        let pipe = BasePipe::new(&c).unwrap();
        let s = Sentence::from_tokens(&["Receptors"]);
        let texts: Vec<String> = s.units().iter().map(|u| norm.normalize(u.text())).collect();
        assert_eq!(texts[0], "receptor");
        let mut feats = vec![FeatSet::new()];
        pipe.pipe(&s, &texts, &mut feats);
        assert!(feats[0].contains("PLURAL"));
    }

    #[test]
    fn meta_features() {
        let mut c = FeatureConfig::new();
        c.set("pos_feat_enabled", "true");
        c.set("pos_feat_unit", "POS");
        let pipe = BasePipe::new(&c).unwrap();
        let mut u = Unit::new(0, 4, "cell");
        u.set_meta("POS", "NN");
        let s = Sentence::new(vec![u]);
        let texts = vec!["cell".to_string()];
        let mut feats = vec![FeatSet::new()];
        pipe.pipe(&s, &texts, &mut feats);
        assert!(feats[0].contains("POS=NN"));
    }
}
