use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Growable bijection between strings and dense ids.
///
/// An `Alphabet` is open: `find_or_insert` assigns the next free id to an
/// unseen entry. Training grows one alphabet for labels and one for feature
/// names, then calls [`Alphabet::freeze`]; from that point on only a
/// [`FrozenAlphabet`] exists and no code path can add entries.
#[derive(Debug, Default)]
pub struct Alphabet {
    v: Vec<String>,
    m: HashMap<String, usize>,
}

impl Alphabet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an alphabet with entries in order; ids follow insertion order.
    pub fn from_entries<I: IntoIterator<Item = S>, S: AsRef<str>>(entries: I) -> Self {
        let mut this = Self::default();
        for e in entries {
            this.find_or_insert(e.as_ref());
        }
        this
    }

    pub fn find_or_insert(&mut self, key: &str) -> usize {
        if let Some(&id) = self.m.get(key) {
            return id;
        }
        let id = self.v.len();
        self.m.insert(key.to_string(), id);
        self.v.push(key.to_string());
        id
    }

    pub fn to_id(&self, key: &str) -> Option<usize> {
        self.m.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    /// Ends the growth phase. All lookups from here on go through the
    /// returned frozen table.
    pub fn freeze(self) -> FrozenAlphabet {
        FrozenAlphabet { v: self.v, m: self.m }
    }
}

/// Immutable string↔id table produced by [`Alphabet::freeze`] or restored
/// from a stored model. Lookup of an unknown string yields `None`, never a
/// new id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FrozenAlphabet {
    v: Vec<String>,
    #[serde(skip)]
    m: HashMap<String, usize>,
}

impl From<Vec<String>> for FrozenAlphabet {
    fn from(v: Vec<String>) -> Self {
        let m = v.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect();
        Self { v, m }
    }
}

impl From<FrozenAlphabet> for Vec<String> {
    fn from(a: FrozenAlphabet) -> Self {
        a.v
    }
}

impl FrozenAlphabet {
    pub fn to_id(&self, key: &str) -> Option<usize> {
        self.m.get(key).copied()
    }

    pub fn to_str(&self, id: usize) -> Option<&str> {
        self.v.get(id).map(|x| x.as_str())
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.v.iter().map(|x| x.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_insert_is_stable() {
        let mut a = Alphabet::new();
        for (s, id) in [
            ("zero", 0),
            ("one", 1),
            ("two", 2),
            ("two", 2),
            ("one", 1),
            ("zero", 0),
            ("three", 3),
        ] {
            assert_eq!(id, a.find_or_insert(s), "{} != {}", s, id);
        }
    }

    #[test]
    fn frozen_lookup() {
        let mut a = Alphabet::new();
        a.find_or_insert("O");
        a.find_or_insert("EOS");
        let f = a.freeze();
        assert_eq!(f.to_id("O"), Some(0));
        assert_eq!(f.to_id("EOS"), Some(1));
        assert_eq!(f.to_id("never-seen"), None);
        assert_eq!(f.to_str(1), Some("EOS"));
        assert_eq!(f.to_str(2), None);
    }

    #[test]
    fn frozen_roundtrips_through_vec() {
        let f = Alphabet::from_entries(["a", "b", "c"]).freeze();
        let v: Vec<String> = f.clone().into();
        let g = FrozenAlphabet::from(v);
        assert_eq!(f, g);
        assert_eq!(g.to_id("c"), Some(2));
    }
}
