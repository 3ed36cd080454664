//! Shared primitive types used across the generator and downstream stages.

/// Intake cohort year.
pub type Year = i32;

/// A stable, unique client identifier (`C00001`).
pub type ClientId = String;

/// Sentinel destination for engagements without a completed exit interview.
pub const NO_EXIT_INTERVIEW: &str = "No Exit Interview completed";

/// Sentinel income range for engagements with no exit data.
pub const DATA_NOT_COLLECTED: &str = "Data Not Collected";

/// Build the client identifier for a 0-based population index.
pub fn client_id(index: usize) -> ClientId {
    format!("C{:05}", index + 1)
}

/// Column name for a disability indicator.
/// Spaces and slashes become underscores: "HIV/AIDS" -> "dis_HIV_AIDS".
pub fn disability_column(name: &str) -> String {
    format!("dis_{}", name.replace([' ', '/'], "_"))
}

/// Serde adapter writing booleans as 0/1 integers.
pub mod flag {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(D::Error::custom(format!("expected 0 or 1, got {other}"))),
        }
    }
}
