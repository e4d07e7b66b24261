//! Floats that may be NaN in serialized reports.
//!
//! serde_json writes non-finite floats as `null`; these readers turn `null`
//! back into NaN so a report survives a JSON round trip.

use serde::{Deserialize, Deserializer};

/// `null` reads as NaN.
pub fn null_as_nan<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Score {
        #[serde(deserialize_with = "null_as_nan")]
        value: f64,
    }

    #[test]
    fn null_and_numbers_both_read() {
        let nan: Score = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert!(nan.value.is_nan());
        let one: Score = serde_json::from_str(r#"{"value": 0.25}"#).unwrap();
        assert_eq!(one.value, 0.25);
    }

    #[test]
    fn nan_survives_json() {
        #[derive(serde::Serialize)]
        struct Out {
            value: f64,
        }
        let json = serde_json::to_string(&Out { value: f64::NAN }).unwrap();
        assert_eq!(json, r#"{"value":null}"#);
        let back: Score = serde_json::from_str(&json).unwrap();
        assert!(back.value.is_nan());
    }
}
