//! Session expiry parsing and validation.
//!
//! Hosts configure the expiry either as an integer Unix-epoch millisecond
//! value or as a date-time string (RFC 3339, or a bare number in string
//! form). The rule is deliberately simple: parse, then valid ⇔ the
//! timestamp is strictly in the future. An unparseable or non-future value
//! halts session setup.

use super::SessionError;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Raw expiry value as supplied by the host, before parsing.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExpirySpec {
    /// Unix epoch milliseconds.
    Millis(i64),
    /// A date-time string, or a number that arrived as a string.
    Text(String),
}

/// Parse an expiry to a UTC instant, without judging whether it has passed.
pub fn parse_expiry(spec: &ExpirySpec) -> Result<DateTime<Utc>, SessionError> {
    match spec {
        ExpirySpec::Millis(ms) => Utc
            .timestamp_millis_opt(*ms)
            .single()
            .ok_or_else(|| SessionError::InvalidExpiry {
                reason: format!("epoch value {ms} is out of range"),
            }),
        ExpirySpec::Text(text) => {
            let trimmed = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(ms) = trimmed.parse::<i64>() {
                return parse_expiry(&ExpirySpec::Millis(ms));
            }
            Err(SessionError::InvalidExpiry {
                reason: format!("{trimmed:?} is neither a date-time nor an epoch value"),
            })
        }
    }
}

/// Parse and validate: the expiry must be strictly in the future at `now`.
pub fn validate_expiry(
    spec: &ExpirySpec,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, SessionError> {
    let expiry = parse_expiry(spec)?;
    if expiry > now {
        Ok(expiry)
    } else {
        Err(SessionError::InvalidExpiry {
            reason: format!("{expiry} is already in the past"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn future_epoch_millis_is_valid() {
        let now = Utc::now();
        let spec = ExpirySpec::Millis((now + Duration::hours(1)).timestamp_millis());
        let expiry = validate_expiry(&spec, now).unwrap();
        assert!(expiry > now);
    }

    #[test]
    fn past_epoch_millis_is_invalid() {
        let now = Utc::now();
        let spec = ExpirySpec::Millis((now - Duration::hours(1)).timestamp_millis());
        assert!(matches!(
            validate_expiry(&spec, now),
            Err(SessionError::InvalidExpiry { .. })
        ));
    }

    #[test]
    fn expiry_exactly_now_is_invalid() {
        let now = Utc.timestamp_millis_opt(1_900_000_000_000).unwrap();
        let spec = ExpirySpec::Millis(now.timestamp_millis());
        assert!(validate_expiry(&spec, now).is_err());
    }

    #[test]
    fn rfc3339_string_parses() {
        let spec = ExpirySpec::Text("2099-01-01T00:00:00Z".into());
        let expiry = parse_expiry(&spec).unwrap();
        assert_eq!(expiry.timestamp(), 4070908800);
    }

    #[test]
    fn numeric_string_parses_as_epoch_millis() {
        let spec = ExpirySpec::Text("1900000000000".into());
        let expiry = parse_expiry(&spec).unwrap();
        assert_eq!(expiry.timestamp_millis(), 1_900_000_000_000);
    }

    #[test]
    fn garbage_string_is_invalid() {
        for text in ["not a date", "", "soon", "2099-99-99"] {
            let spec = ExpirySpec::Text(text.into());
            assert!(
                matches!(parse_expiry(&spec), Err(SessionError::InvalidExpiry { .. })),
                "{text:?} should not parse"
            );
        }
    }

    #[test]
    fn expiry_spec_deserializes_both_forms() {
        let millis: ExpirySpec = serde_json::from_str("4102444800000").unwrap();
        assert_eq!(millis, ExpirySpec::Millis(4102444800000));

        let text: ExpirySpec = serde_json::from_str("\"2099-01-01T00:00:00Z\"").unwrap();
        assert_eq!(text, ExpirySpec::Text("2099-01-01T00:00:00Z".into()));
    }
}
