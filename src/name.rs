//! Canonical multi-word identifiers for declared types, fields and members.
//!
//! A [`Name`] is an ordered list of lowercase words. It renders to the registry key
//! (snake case) and to the casing conventions of a target language. Words must start
//! with a lowercase ASCII letter and contain only lowercase letters and digits, so
//! every rendering is injective: in upper camel case each uppercase letter marks
//! exactly one word start.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name has no words")]
    Empty,
    #[error("invalid word {word:?}: words must start with a-z and contain only a-z, 0-9")]
    InvalidWord { word: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    words: Vec<String>,
}

impl Name {
    pub fn new<I, S>(words: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        if words.is_empty() {
            return Err(NameError::Empty);
        }
        for word in &words {
            if !is_valid_word(word) {
                return Err(NameError::InvalidWord { word: word.clone() });
            }
        }
        Ok(Name { words })
    }

    /// Split a snake-case string (`"nested_struct_one"`) into words.
    pub fn parse(snake: &str) -> Result<Self, NameError> {
        if snake.is_empty() {
            return Err(NameError::Empty);
        }
        Self::new(snake.split('_'))
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Registry key: lowercase words joined by `_`.
    pub fn key(&self) -> String {
        self.words.join("_")
    }

    pub fn snake(&self) -> String {
        self.key()
    }

    /// `["nested", "struct", "one"]` → `NestedStructOne`.
    pub fn upper_camel(&self) -> String {
        self.words.iter().map(|w| capitalize(w)).collect()
    }

    /// `["nested", "struct", "one"]` → `nestedStructOne`.
    pub fn lower_camel(&self) -> String {
        let mut out = self.words[0].clone();
        for w in &self.words[1..] {
            out.push_str(&capitalize(w));
        }
        out
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn is_valid_word(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_casings() {
        let n = Name::new(["nested", "struct", "one"]).unwrap();
        assert_eq!(n.key(), "nested_struct_one");
        assert_eq!(n.upper_camel(), "NestedStructOne");
        assert_eq!(n.lower_camel(), "nestedStructOne");
        assert_eq!(n.to_string(), "nested_struct_one");
    }

    #[test]
    fn digits_stay_in_their_word() {
        let n = Name::new(["array5", "u32"]).unwrap();
        assert_eq!(n.upper_camel(), "Array5U32");
        assert_eq!(n.key(), "array5_u32");
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_eq!(Name::new(Vec::<String>::new()), Err(NameError::Empty));
        assert!(matches!(Name::new(["Upper"]), Err(NameError::InvalidWord { .. })));
        assert!(matches!(Name::new(["a_b"]), Err(NameError::InvalidWord { .. })));
        assert!(matches!(Name::new(["1st"]), Err(NameError::InvalidWord { .. })));
        assert!(matches!(Name::new([""]), Err(NameError::InvalidWord { .. })));
        assert_eq!(Name::parse(""), Err(NameError::Empty));
    }

    #[test]
    fn camel_rendering_is_injective() {
        let a = Name::new(["ab", "c"]).unwrap();
        let b = Name::new(["a", "bc"]).unwrap();
        let c = Name::new(["abc"]).unwrap();
        assert_ne!(a.upper_camel(), b.upper_camel());
        assert_ne!(a.upper_camel(), c.upper_camel());
        assert_ne!(b.key(), c.key());
    }

    #[test]
    fn parse_splits_snake_case() {
        let n = Name::parse("auto_unsized_variant").unwrap();
        assert_eq!(n.words().len(), 3);
        assert_eq!(n, Name::new(["auto", "unsized", "variant"]).unwrap());
    }
}
