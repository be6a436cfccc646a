//! Natural keys used to match records across KIS2 and KIS3

use serde::{Serialize, Serializer};

use super::entity::EntityKind;

/// Separator between composite key components
///
/// Components containing it are rejected, so `("AB", "C")` and `("A", "BC")`
/// can never encode to the same key.
pub const KEY_DELIMITER: char = '\u{1F}';

/// Error building a natural key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key component '{0}' contains the reserved key delimiter")]
    ReservedDelimiter(String),
    #[error("natural key is empty")]
    Empty,
}

/// A normalized, possibly composite natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    encoded: String,
}

impl NaturalKey {
    /// Build a key for `kind` from its components, applying the entity's key rule
    ///
    /// `None` and empty components are equivalent. A key whose components are
    /// all empty is rejected.
    pub fn new<S: AsRef<str>>(kind: EntityKind, parts: &[Option<S>]) -> Result<Self, KeyError> {
        let rule = kind.key_rule();
        let mut components = Vec::with_capacity(parts.len());

        for part in parts {
            let raw = part.as_ref().map(|p| p.as_ref()).unwrap_or("");
            if raw.contains(KEY_DELIMITER) {
                return Err(KeyError::ReservedDelimiter(raw.to_string()));
            }
            components.push(rule.apply(raw));
        }

        if components.iter().all(|c| c.is_empty()) {
            return Err(KeyError::Empty);
        }

        Ok(NaturalKey {
            encoded: components.join(&KEY_DELIMITER.to_string()),
        })
    }

    /// Build a single-component key
    pub fn single(kind: EntityKind, value: impl AsRef<str>) -> Result<Self, KeyError> {
        Self::new(kind, &[Some(value.as_ref())])
    }

    /// Key components after normalization
    pub fn components(&self) -> Vec<&str> {
        self.encoded.split(KEY_DELIMITER).collect()
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = self.components().into_iter().filter(|c| !c.is_empty()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

impl Serialize for NaturalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_keys_do_not_collide() {
        let a = NaturalKey::new(EntityKind::Person, &[Some("AB"), Some("C"), None]).unwrap();
        let b = NaturalKey::new(EntityKind::Person, &[Some("A"), Some("BC"), None]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_none_and_empty_component_are_equal() {
        let a = NaturalKey::new(EntityKind::Person, &[Some("Ivanov"), Some("Ivan"), None]).unwrap();
        let b = NaturalKey::new(EntityKind::Person, &[Some("Ivanov"), Some("Ivan"), Some("")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_delimiter_inside_component_is_rejected() {
        let bad = format!("Iva{}nov", KEY_DELIMITER);
        let result = NaturalKey::new(EntityKind::Person, &[Some(bad.as_str()), Some("Ivan"), None]);
        assert!(matches!(result, Err(KeyError::ReservedDelimiter(_))));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert_eq!(NaturalKey::single(EntityKind::Country, ""), Err(KeyError::Empty));
        let none: [Option<&str>; 3] = [None, None, None];
        assert_eq!(NaturalKey::new(EntityKind::Person, &none), Err(KeyError::Empty));
    }

    #[test]
    fn test_exact_rule_keeps_case_and_whitespace() {
        let plain = NaturalKey::single(EntityKind::Country, "Germany").unwrap();
        assert_ne!(plain, NaturalKey::single(EntityKind::Country, "germany").unwrap());
        assert_ne!(plain, NaturalKey::single(EntityKind::Country, " Germany ").unwrap());
    }

    #[test]
    fn test_currency_rule_normalizes() {
        let rub = NaturalKey::single(EntityKind::Currency, "RUB").unwrap();
        assert_eq!(rub, NaturalKey::single(EntityKind::Currency, " rub ").unwrap());
    }

    #[test]
    fn test_display_joins_components() {
        let key = NaturalKey::new(EntityKind::Person, &[Some("Ivanov"), Some("Ivan"), None]).unwrap();
        assert_eq!(key.to_string(), "Ivanov Ivan");
        assert_eq!(key.components(), vec!["Ivanov", "Ivan", ""]);
    }
}
