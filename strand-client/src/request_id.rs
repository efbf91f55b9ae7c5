/// Request identifiers used to route responses on a shared transaction stream
use std::fmt;
use uuid::Uuid;

/// Opaque 128-bit correlation token, generated per outbound request.
///
/// Identifiers only live for the duration of a transaction and are never
/// persisted. On the wire they travel as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the wire form of an identifier
    ///
    /// Returns `None` for anything that is not a UUID, which the multiplexer
    /// treats as a protocol anomaly.
    pub fn parse(wire: &str) -> Option<Self> {
        Uuid::parse_str(wire).ok().map(Self)
    }

    /// Wire form of the identifier
    pub fn to_wire(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_distinct() {
        let ids: HashSet<RequestId> = (0..10_000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_parse_wire_form() {
        let id = RequestId::generate();
        assert_eq!(RequestId::parse(&id.to_wire()), Some(id));
        assert_eq!(id.to_string(), id.to_wire());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(RequestId::parse(""), None);
        assert_eq!(RequestId::parse("request-1"), None);
    }
}
