use regex::Regex;

use crate::config::FeatureConfig;
use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

const GREEK: &str = "(alpha|beta|gamma|delta|epsilon|zeta|eta|theta|iota|kappa|lambda|mu|nu|xi|omicron|pi|rho|sigma|tau|upsilon|phi|chi|psi|omega)";

/// Fixed battery of surface-pattern features. Every pattern must match the
/// whole token (the regexes are compiled anchored).
pub(crate) struct SurfacePipe {
    patterns: Vec<(&'static str, Regex)>,
}

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!(r"\A(?:{pattern})\z")).unwrap()
}

impl SurfacePipe {
    pub fn new(config: &FeatureConfig) -> Self {
        let mut patterns = vec![
            ("INITLOWCAPS_ANYTHING_NONUMBER", anchored(r"\p{Ll}\p{Lu}[^0-9]*")),
            ("INITLOWCAPS_ANYTHING_WITHNUMBER", anchored(r"\p{Ll}\p{Lu}.*[0-9].*")),
            ("INITCAPS", anchored(r"\p{Lu}.*")),
            ("INITCAPSALPHA", anchored(r"\p{Lu}\p{Ll}.*")),
            ("ALLCAPS", anchored(r"\p{Lu}+")),
            ("CAPSMIX", anchored(r"[\p{Lu}\p{Ll}]+")),
            ("HASDIGIT", anchored(r".*[0-9].*")),
            ("SINGLEDIGIT", anchored(r"[0-9]")),
            ("DOUBLEDIGIT", anchored(r"[0-9][0-9]")),
            ("NATURALNUMBER", anchored(r"[0-9]+")),
            ("REALNUMBER", anchored(r"[-0-9]+[.,]+[0-9.,]+")),
            ("HASDASH", anchored(r".*-.*")),
            ("INITDASH", anchored(r"-.*")),
            ("ENDDASH", anchored(r".*-")),
            ("ALPHANUMERIC", anchored(r".*[\p{Lu}\p{Ll}].*[0-9].*")),
            ("ALPHANUMERIC", anchored(r".*[0-9].*[\p{Lu}\p{Ll}].*")),
            ("IS_PUNCTUATION_MARK", anchored(r"[,.;:?!]")),
            ("IS_MINUSDASHSLASH", anchored(r"[-_/]")),
        ];
        if config.feature_active("feat_bioregexp_enabled") {
            patterns.push(("ROMAN", anchored(r"[IVXDLCM]+")));
            patterns.push(("HASROMAN", anchored(r".*\b[IVXDLCM]+\b.*")));
            patterns.push(("GREEK", anchored(GREEK)));
            patterns.push(("HASGREEK", anchored(&format!(r".*\b{GREEK}\b.*"))));
        }
        Self { patterns }
    }
}

impl TokenPipe for SurfacePipe {
    fn pipe(&self, _sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        for (i, text) in texts.iter().enumerate() {
            for (name, re) in &self.patterns {
                if re.is_match(text) {
                    feats[i].insert((*name).to_string());
                }
            }
        }
    }
}
