use std::collections::HashMap;

/// One atomic text span (typically a token). Owned by its sentence; the
/// decode step is the only writer of `label` and `confidence`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unit {
    pub begin: usize,
    pub end: usize,
    text: String,
    label: Option<String>,
    confidence: Option<f64>,
    metas: HashMap<String, String>,
}

impl Unit {
    pub fn new(begin: usize, end: usize, text: &str) -> Self {
        Self {
            begin,
            end,
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(begin: usize, end: usize, text: &str, label: &str) -> Self {
        let mut this = Self::new(begin, end, text);
        this.label = Some(label.to_string());
        this
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = Some(label.to_string());
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = Some(confidence);
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        self.metas.get(name).map(|x| x.as_str())
    }

    pub fn set_meta(&mut self, name: &str, value: &str) {
        self.metas.insert(name.to_string(), value.to_string());
    }
}

/// Ordered unit sequence; the order defines the chain the model decodes
/// over and is never changed internally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sentence {
    units: Vec<Unit>,
}

impl Sentence {
    pub fn new(units: Vec<Unit>) -> Self {
        Self { units }
    }

    /// Convenience for building unlabeled sentences from plain tokens;
    /// offsets assume single spaces between tokens.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut units = Vec::with_capacity(tokens.len());
        let mut begin = 0;
        for t in tokens {
            let t = t.as_ref();
            units.push(Unit::new(begin, begin + t.len(), t));
            begin += t.len() + 1;
        }
        Self { units }
    }

    pub fn push(&mut self, unit: Unit) {
        self.units.push(unit);
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [Unit] {
        &mut self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Gold labels, in order. `None` if any unit is unlabeled.
    pub fn labels(&self) -> Option<Vec<&str>> {
        self.units.iter().map(|u| u.label()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tokens_assigns_offsets() {
        let s = Sentence::from_tokens(&["IL-2", "receptor"]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.units()[0].begin, 0);
        assert_eq!(s.units()[0].end, 4);
        assert_eq!(s.units()[1].begin, 5);
        assert_eq!(s.units()[1].end, 13);
    }

    #[test]
    fn labels_require_all_units_labeled() {
        let mut s = Sentence::from_tokens(&["a", "b"]);
        assert_eq!(s.labels(), None);
        s.units_mut()[0].set_label("O");
        s.units_mut()[1].set_label("GENE");
        assert_eq!(s.labels(), Some(vec!["O", "GENE"]));
    }
}
