//! Encoding rules for enum and timestamp preferences.

use chrono::NaiveDateTime;
use tracing::warn;

/// The fixed timestamp pattern used for persisted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An enum that can be stored as its zero-based position within a declared
/// value list.
///
/// Implementors only supply [`VALUES`](OrdinalEnum::VALUES); the ordinal
/// conversions are derived from it. A value missing from `VALUES` encodes as
/// `-1`, and an out-of-range ordinal decodes to `None`, which the store
/// resolves to the caller-supplied default.
///
/// ```
/// use dynfield_store::OrdinalEnum;
///
/// #[derive(Clone, Copy, PartialEq, Debug)]
/// enum Theme {
///     System,
///     Light,
///     Dark,
/// }
///
/// impl OrdinalEnum for Theme {
///     const VALUES: &'static [Self] = &[Theme::System, Theme::Light, Theme::Dark];
/// }
///
/// assert_eq!(Theme::Dark.ordinal(), 2);
/// assert_eq!(Theme::from_ordinal(1), Some(Theme::Light));
/// assert_eq!(Theme::from_ordinal(99), None);
/// ```
pub trait OrdinalEnum: Copy + PartialEq + 'static {
    /// The declared values, in ordinal order.
    const VALUES: &'static [Self];

    /// The zero-based position of `self` in [`VALUES`](OrdinalEnum::VALUES),
    /// or `-1` if it is not declared there.
    fn ordinal(self) -> i32 {
        Self::VALUES
            .iter()
            .position(|v| *v == self)
            .map(|i| i as i32)
            .unwrap_or(-1)
    }

    /// The value at the given ordinal, or `None` when out of range.
    fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::VALUES.get(i).copied())
    }
}

/// Formats a timestamp with the fixed pattern.
pub(crate) fn encode_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses fixed-pattern timestamp text; logs and returns `None` on mismatch.
pub(crate) fn decode_timestamp(key: &str, text: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, text, %error, "stored timestamp does not match pattern, substituting default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[derive(Clone, Copy, PartialEq, Debug)]
    enum Phase {
        First,
        Second,
        Third,
    }

    impl OrdinalEnum for Phase {
        const VALUES: &'static [Self] = &[Phase::First, Phase::Second, Phase::Third];
    }

    #[test]
    fn ordinals_round_trip() {
        for (i, phase) in Phase::VALUES.iter().enumerate() {
            assert_eq!(phase.ordinal(), i as i32);
            assert_eq!(Phase::from_ordinal(i as i32), Some(*phase));
        }
    }

    #[test]
    fn out_of_range_ordinals_decode_to_none() {
        assert_eq!(Phase::from_ordinal(3), None);
        assert_eq!(Phase::from_ordinal(99), None);
        assert_eq!(Phase::from_ordinal(-1), None);
    }

    #[test]
    fn timestamps_use_the_fixed_pattern() {
        let value = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 30, 5)
            .unwrap();
        let text = encode_timestamp(&value);
        assert_eq!(text, "2024-05-17T09:30:05");
        assert_eq!(decode_timestamp("k", &text), Some(value));
    }

    #[test]
    fn malformed_timestamp_text_decodes_to_none() {
        assert_eq!(decode_timestamp("k", "2024-05-17 09:30:05"), None);
        assert_eq!(decode_timestamp("k", "yesterday"), None);
        assert_eq!(decode_timestamp("k", ""), None);
    }
}
