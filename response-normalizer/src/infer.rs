//! Deterministic text inference for missing price fields.
//!
//! When the structured payload omits a level, the narrative section is
//! scanned for numbers adjacent to the field's lexical markers. A field
//! is filled only when the scan finds exactly one distinct candidate;
//! anything ambiguous is left absent rather than guessed.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Which price field is being inferred. Each variant has its own
/// keyword family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Entry,
    Stop,
    Target,
}

impl PriceField {
    pub fn name(&self) -> &'static str {
        match self {
            PriceField::Entry => "entry",
            PriceField::Stop => "stop",
            PriceField::Target => "target",
        }
    }
}

lazy_static! {
    // A keyword followed within a short window by a price-looking number.
    // The window excludes digits and newlines so an unrelated figure on
    // the next line is never picked up.
    static ref ENTRY_RE: Regex = Regex::new(
        r"(?i)\b(?:entry|enter|buy(?:\s+zone)?|long\s+from)\b[^0-9\n]{0,24}(\d[\d,]*(?:\.\d+)?)"
    )
    .expect("entry regex");
    static ref STOP_RE: Regex = Regex::new(
        r"(?i)\b(?:stop(?:\s*-?\s*loss)?|invalidation|invalid\s+below)\b[^0-9\n]{0,24}(\d[\d,]*(?:\.\d+)?)"
    )
    .expect("stop regex");
    static ref TARGET_RE: Regex = Regex::new(
        r"(?i)\b(?:target|take\s*-?\s*profit|tp\d?|objective)\b[^0-9\n]{0,24}(\d[\d,]*(?:\.\d+)?)"
    )
    .expect("target regex");
}

/// Scan `narrative` for a price adjacent to the field's keywords.
/// Returns `Some` only when exactly one distinct value is mentioned.
pub fn infer_price(narrative: &str, field: PriceField) -> Option<Decimal> {
    let pattern = match field {
        PriceField::Entry => &*ENTRY_RE,
        PriceField::Stop => &*STOP_RE,
        PriceField::Target => &*TARGET_RE,
    };

    let mut candidates: Vec<Decimal> = Vec::new();
    for captures in pattern.captures_iter(narrative) {
        let text = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let Ok(value) = Decimal::from_str(&text.replace(',', "")) else {
            continue;
        };
        if value <= Decimal::ZERO {
            continue;
        }
        if !candidates.contains(&value) {
            candidates.push(value);
        }
    }

    match candidates.as_slice() {
        [single] => Some(*single),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_mention_is_found() {
        let text = "I would look for an entry around 64,500 on a retest of the breakout.";
        assert_eq!(
            infer_price(text, PriceField::Entry),
            Some(Decimal::from_str("64500").unwrap())
        );
    }

    #[test]
    fn test_repeated_identical_mentions_still_count_as_one() {
        let text = "Stop loss at 61200. Keep the stop at 61200 no matter what.";
        assert_eq!(
            infer_price(text, PriceField::Stop),
            Some(Decimal::from_str("61200").unwrap())
        );
    }

    #[test]
    fn test_conflicting_mentions_yield_nothing() {
        let text = "Target 70000 first, though a wider target 75000 is possible.";
        assert_eq!(infer_price(text, PriceField::Target), None);
    }

    #[test]
    fn test_unrelated_numbers_are_ignored() {
        let text = "Volume rose 34% over the last 12 sessions; no trade setup yet.";
        assert_eq!(infer_price(text, PriceField::Entry), None);
        assert_eq!(infer_price(text, PriceField::Stop), None);
        assert_eq!(infer_price(text, PriceField::Target), None);
    }

    #[test]
    fn test_decimal_prices_parse() {
        let text = "take profit near 1.0925 on EUR strength";
        assert_eq!(
            infer_price(text, PriceField::Target),
            Some(Decimal::from_str("1.0925").unwrap())
        );
    }

    #[test]
    fn test_keyword_window_does_not_cross_lines() {
        let text = "entry zone discussed above\n64500 is last week's high";
        assert_eq!(infer_price(text, PriceField::Entry), None);
    }
}
