/// Answer types returned by queries
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// A concept bound to a query variable.
///
/// Only identity is carried; the concept graph itself lives on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    /// Server-assigned internal identifier
    pub iid: Bytes,
    /// Label of the concept's type, or of the type itself
    pub type_label: String,
    /// True when the concept is a type rather than an instance
    pub is_type: bool,
}

impl Concept {
    /// Hex form of the internal identifier, as shown by the console.
    pub fn iid_hex(&self) -> String {
        let mut hex = String::with_capacity(2 + self.iid.len() * 2);
        hex.push_str("0x");
        for byte in self.iid.iter() {
            hex.push_str(&format!("{:02x}", byte));
        }
        hex
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_type {
            write!(f, "type {}", self.type_label)
        } else {
            write!(f, "{} {}", self.type_label, self.iid_hex())
        }
    }
}

/// One answer to a match or insert query: variable name to concept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConceptMap {
    map: HashMap<String, Concept>,
}

impl ConceptMap {
    pub fn new(map: HashMap<String, Concept>) -> Self {
        Self { map }
    }

    /// Concept bound to `variable` (without the leading `$`)
    pub fn get(&self, variable: &str) -> Option<&Concept> {
        self.map.get(variable)
    }

    /// Variable names, sorted
    pub fn variables(&self) -> Vec<&str> {
        let mut variables: Vec<&str> = self.map.keys().map(String::as_str).collect();
        variables.sort_unstable();
        variables
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, Concept> {
        self.map
    }
}

/// Result of an aggregate query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Long(i64),
    Double(f64),
    /// Aggregate over an empty answer set (e.g. mean of nothing)
    NaN,
}

impl Numeric {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Numeric::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Long(v) => Some(*v as f64),
            Numeric::Double(v) => Some(*v),
            Numeric::NaN => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Numeric::NaN)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Long(v) => write!(f, "{}", v),
            Numeric::Double(v) => write!(f, "{}", v),
            Numeric::NaN => write!(f, "NaN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_display() {
        let thing = Concept {
            iid: Bytes::from_static(&[0x0a, 0xff]),
            type_label: "person".to_string(),
            is_type: false,
        };
        assert_eq!(thing.to_string(), "person 0x0aff");

        let kind = Concept {
            iid: Bytes::new(),
            type_label: "person".to_string(),
            is_type: true,
        };
        assert_eq!(kind.to_string(), "type person");
    }

    #[test]
    fn test_variables_sorted() {
        let concept = Concept {
            iid: Bytes::new(),
            type_label: "t".to_string(),
            is_type: true,
        };
        let mut map = HashMap::new();
        map.insert("y".to_string(), concept.clone());
        map.insert("x".to_string(), concept);

        let answer = ConceptMap::new(map);
        assert_eq!(answer.variables(), vec!["x", "y"]);
        assert!(answer.get("z").is_none());
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Numeric::Long(3).as_f64(), Some(3.0));
        assert_eq!(Numeric::Double(1.5).as_i64(), None);
        assert!(Numeric::NaN.is_nan());
        assert_eq!(Numeric::NaN.to_string(), "NaN");
    }
}
