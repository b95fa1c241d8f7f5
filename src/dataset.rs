use std::io::{BufRead, BufReader, Read};

use crate::alphabet::Alphabet;
use crate::config::{ConfigError, FeatureConfig};
use crate::sentence::{Sentence, Unit};

/// One attribute (feature) observation at a position. Pipeline features are
/// binary, so the value is 1; the field exists so continuous-valued
/// attributes stay representable.
#[derive(Debug, Clone)]
pub struct Attr {
    pub id: usize,
    pub value: f64,
}

impl Attr {
    pub fn new(id: usize, value: f64) -> Self {
        Self { id, value }
    }
}

pub type Item = Vec<Attr>;

/// A featurized training instance: one item (attribute set) and one gold
/// label id per position. The two rows grow in lockstep; `push` is the only
/// writer, so `|items| == |labels|` holds by construction.
#[derive(Debug, Default)]
pub struct Instance {
    pub items: Vec<Item>,
    pub labels: Vec<usize>,
}

impl Instance {
    pub fn push(&mut self, item: Item, label: usize) {
        self.items.push(item);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// An in-memory training set plus the dimensions of the alphabets it was
/// built against.
#[derive(Debug, Default)]
pub struct Dataset {
    pub instances: Vec<Instance>,
    n_labels: usize,
    n_attrs: usize,
}

impl Dataset {
    pub fn push(&mut self, instance: Instance) {
        if !instance.is_empty() {
            self.instances.push(instance);
        }
    }

    pub fn set_dims(&mut self, n_labels: usize, n_attrs: usize) {
        self.n_labels = n_labels;
        self.n_attrs = n_attrs;
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.n_labels
    }

    pub fn num_attrs(&self) -> usize {
        self.n_attrs
    }

    pub fn max_length(&self) -> usize {
        self.instances.iter().map(|x| x.len()).max().unwrap_or_default()
    }

    pub fn total_items(&self) -> usize {
        self.instances.iter().map(|x| x.len()).sum()
    }
}

/// Reads labeled sentences in the piped format: one sentence per line,
/// whitespace-separated tokens, each token `text|meta1|…|metaN|label`.
/// Which meta column feeds which unit meta comes from the configuration
/// (`<meta>_feat_position`, `<meta>_feat_unit`); the `gap_character` value
/// marks an absent meta. A token whose field count disagrees with the
/// configured meta count is a fatal configuration error.
pub fn read_piped<R: Read>(rdr: R, config: &FeatureConfig) -> Result<Vec<Sentence>, ConfigError> {
    let metas = config.enabled_metas();
    let mut columns = Vec::with_capacity(metas.len());
    for meta in &metas {
        columns.push((config.meta_position(meta)?, config.meta_unit_name(meta)?));
    }
    let expected = metas.len() + 2;
    let gap = config.gap_character().to_string();

    let mut sentences = Vec::new();
    for line in BufReader::new(rdr).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut sentence = Sentence::default();
        let mut begin = 0;
        for token in line.split_whitespace() {
            let fields: Vec<&str> = token.split('|').collect();
            if fields.len() != expected {
                return Err(ConfigError::MetaColumnMismatch {
                    token: token.to_string(),
                    expected,
                    actual: fields.len(),
                });
            }
            let text = fields[0];
            let label = fields[fields.len() - 1];
            let mut unit = Unit::with_label(begin, begin + text.len(), text, label);
            for (position, name) in &columns {
                let value = fields[*position];
                if value != gap {
                    unit.set_meta(name, value);
                }
            }
            begin += text.len() + 1;
            sentence.push(unit);
        }
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
    }
    Ok(sentences)
}

/// Builds a [`Dataset`] from feature-set/label-sequence pairs, growing the
/// supplied open alphabets. The caller freezes them afterwards.
pub fn build_dataset(
    featurized: &[(Vec<crate::features::FeatSet>, Vec<String>)],
    labels: &mut Alphabet,
    attrs: &mut Alphabet,
) -> Dataset {
    let mut ds = Dataset::default();
    for (feats, tags) in featurized {
        assert_eq!(
            feats.len(),
            tags.len(),
            "feature sequence and label sequence must be aligned"
        );
        let mut inst = Instance::default();
        for (fs, tag) in feats.iter().zip(tags) {
            let item: Item = fs
                .iter()
                .map(|f| Attr::new(attrs.find_or_insert(f), 1.0))
                .collect();
            inst.push(item, labels.find_or_insert(tag));
        }
        ds.push(inst);
    }
    ds.set_dims(labels.len(), attrs.len());
    ds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_piped_format_with_metas() {
        let mut c = FeatureConfig::new();
        c.set("pos_feat_enabled", "true");
        c.set("pos_feat_unit", "POS");
        c.set("pos_feat_position", "1");
        c.set("gap_character", "@");
        let text = "IL-2|NN|GENE binds|VBZ|O\nit|@|O works|VBZ|O\n";
        let sentences = read_piped(text.as_bytes(), &c).unwrap();
        assert_eq!(sentences.len(), 2);
        let s = &sentences[0];
        assert_eq!(s.units()[0].text(), "IL-2");
        assert_eq!(s.units()[0].label(), Some("GENE"));
        assert_eq!(s.units()[0].meta("POS"), Some("NN"));
        // the gap character leaves the meta unset
        assert_eq!(sentences[1].units()[0].meta("POS"), None);
    }

    #[test]
    fn field_count_mismatch_is_fatal() {
        let mut c = FeatureConfig::new();
        c.set("pos_feat_enabled", "true");
        c.set("pos_feat_unit", "POS");
        c.set("pos_feat_position", "1");
        let text = "oops|O\n";
        match read_piped(text.as_bytes(), &c) {
            Err(ConfigError::MetaColumnMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("expected MetaColumnMismatch, got {other:?}"),
        }
    }

    #[test]
    fn without_metas_two_fields_suffice() {
        let c = FeatureConfig::new();
        let sentences = read_piped("The|O cell|CELL\n".as_bytes(), &c).unwrap();
        assert_eq!(sentences[0].units()[1].label(), Some("CELL"));
    }
}
