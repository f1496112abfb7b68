//! Redacting wrapper for values that must not reach logs
//!
//! Connection URLs and operator identities travel through spans and Debug
//! output; wrapping them keeps the raw value out of both.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::interceptor::redact::MASK;

const REDACTED: &str = "[REDACTED]";

/// Formats as `[REDACTED]` and serializes as the redaction mask.
/// Use [`Sensitive::expose`] to reach the inner value.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sensitive<U> {
        Sensitive(f(self.0))
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Debug for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Sensitive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(MASK)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_hides_value() {
        let url = Sensitive::new("postgres://app:hunter2@db/prod");
        assert_eq!(format!("{:?}", url), "[REDACTED]");
        assert_eq!(format!("{}", url), "[REDACTED]");
        assert_eq!(*url.expose(), "postgres://app:hunter2@db/prod");
    }

    #[test]
    fn serializes_as_mask_but_reads_raw() {
        let operator = Sensitive::new("alice".to_string());
        assert_eq!(serde_json::to_string(&operator).unwrap(), "\"***\"");

        let parsed: Sensitive<String> = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(parsed.into_inner(), "bob");
    }

    #[test]
    fn map_keeps_wrapper() {
        let len = Sensitive::from("secret".to_string()).map(|s| s.len());
        assert_eq!(*len.expose(), 6);
        assert_eq!(format!("{:?}", len), "[REDACTED]");
    }
}
