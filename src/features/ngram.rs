use crate::sentence::Sentence;

use super::{FeatSet, TokenPipe};

/// Token n-grams anchored at each position: the window `[t, t+n)` is
/// emitted at position `t` and only when it fits inside the sentence, so no
/// n-gram ever spans past the first or last unit.
pub(crate) struct TokenNGramPipe {
    sizes: Vec<usize>,
}

impl TokenNGramPipe {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self { sizes }
    }
}

impl TokenPipe for TokenNGramPipe {
    fn pipe(&self, _sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        let len = texts.len();
        for t in 0..len {
            for &n in &self.sizes {
                if n == 0 || t + n > len {
                    continue;
                }
                let gram = texts[t..t + n].join("_");
                feats[t].insert(format!("TOK_NGRAM={gram}"));
            }
        }
    }
}

/// Character n-grams inside each token text.
pub(crate) struct CharNGramPipe {
    sizes: Vec<usize>,
}

impl CharNGramPipe {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self { sizes }
    }
}

impl TokenPipe for CharNGramPipe {
    fn pipe(&self, _sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]) {
        for (i, text) in texts.iter().enumerate() {
            let chars: Vec<char> = text.chars().collect();
            for &n in &self.sizes {
                if n == 0 || chars.len() < n {
                    continue;
                }
                for w in chars.windows(n) {
                    feats[i].insert(format!("CHAR_NGRAM={}", w.iter().collect::<String>()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::Sentence;

    #[test]
    fn token_trigrams_clip_at_bounds() {
        let s = Sentence::from_tokens(&["a", "b", "c", "d"]);
        let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|x| x.to_string()).collect();
        let mut feats = vec![FeatSet::new(); 4];
        TokenNGramPipe::new(vec![3]).pipe(&s, &texts, &mut feats);
        let total: usize = feats.iter().map(|f| f.len()).sum();
        assert_eq!(total, 2);
        assert!(feats[0].contains("TOK_NGRAM=a_b_c"));
        assert!(feats[1].contains("TOK_NGRAM=b_c_d"));
        assert!(feats[2].is_empty());
        assert!(feats[3].is_empty());
    }

    #[test]
    fn char_ngrams() {
        let s = Sentence::from_tokens(&["ras"]);
        let texts = vec!["ras".to_string()];
        let mut feats = vec![FeatSet::new()];
        CharNGramPipe::new(vec![2]).pipe(&s, &texts, &mut feats);
        assert!(feats[0].contains("CHAR_NGRAM=ra"));
        assert!(feats[0].contains("CHAR_NGRAM=as"));
        assert_eq!(feats[0].len(), 2);
    }
}
