//! Pattern-based answer extraction from model output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric token, with optional thousands separators and exponent.
static NUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\d+(?:,\d{3})*(?:\.\d+)?(?:[eE][+-]?\d+)?").unwrap()
});

/// Explicit option statements like "option B", "answer is: C", "(D)".
static OPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:option|answer|choice)\b(?:\s+is)?\s*:?\s*\(?([A-Da-d])\b").unwrap()
});

/// Any standalone option letter.
static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Da-d])\b").unwrap());

/// Result of option-letter extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterMatch {
    /// Exactly one plausible option letter (uppercased).
    Unique(char),
    /// Several distinct letters; needs a judge to disambiguate.
    Ambiguous,
    /// No option letter found.
    None,
}

/// Extract the last numeric value from free text.
///
/// Numbers directly following `^` or `/` are unit exponents
/// ("m/s^2", "kg/m^3") and are not answers.
pub fn last_number(text: &str) -> Option<f64> {
    let mut last = None;

    for m in NUM_RE.find_iter(text) {
        let preceded_by = text[..m.start()].chars().next_back();
        if matches!(preceded_by, Some('^') | Some('/')) {
            continue;
        }
        last = Some(m.as_str().replace(',', ""));
    }

    last.and_then(|s| s.parse::<f64>().ok())
}

/// Extract the selected multiple-choice option from free text.
///
/// An explicit "option X" / "answer is X" statement wins. Otherwise the
/// distinct standalone letters decide: a single letter is unique; a
/// lowercase standalone "a" is discounted as the article unless it is the
/// only candidate letter in a very short reply.
pub fn option_letter(text: &str) -> LetterMatch {
    if let Some(caps) = OPTION_RE.captures_iter(text).last() {
        if let Some(m) = caps.get(1) {
            return LetterMatch::Unique(ascii_upper(m.as_str()));
        }
    }

    let mut letters: Vec<char> = Vec::new();
    for caps in LETTER_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let upper = ascii_upper(m.as_str());
            // Standalone lowercase "a" is almost always the article.
            if m.as_str() == "a" && text.split_whitespace().count() > 2 {
                continue;
            }
            if !letters.contains(&upper) {
                letters.push(upper);
            }
        }
    }

    match letters.len() {
        0 => LetterMatch::None,
        1 => LetterMatch::Unique(letters[0]),
        _ => {
            // Mixed case with a single uppercase candidate: trust the
            // uppercase one ("It is a ball, so C" -> C).
            let upper: Vec<char> = LETTER_RE
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .filter(|m| m.as_str().chars().all(|ch| ch.is_ascii_uppercase()))
                .map(|m| ascii_upper(m.as_str()))
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            if upper.len() == 1 {
                LetterMatch::Unique(upper[0])
            } else {
                LetterMatch::Ambiguous
            }
        }
    }
}

fn ascii_upper(s: &str) -> char {
    s.chars().next().unwrap_or('?').to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_number_basic() {
        assert_eq!(last_number("The velocity is 10.5 m/s"), Some(10.5));
        assert_eq!(last_number("velocity ≈ 10.4 m/s"), Some(10.4));
        assert_eq!(last_number("no numbers here"), None);
    }

    #[test]
    fn test_last_number_takes_last() {
        assert_eq!(last_number("v = 3 + 4 = 7"), Some(7.0));
        assert_eq!(last_number("First 10, finally 42"), Some(42.0));
    }

    #[test]
    fn test_last_number_ignores_unit_exponents() {
        assert_eq!(last_number("g is 9.8 m/s^2"), Some(9.8));
        assert_eq!(last_number("density 1000 kg/m^3"), Some(1000.0));
    }

    #[test]
    fn test_last_number_scientific_and_commas() {
        assert_eq!(last_number("about 3e8"), Some(3e8));
        assert_eq!(last_number("that is 1,234.5 joules"), Some(1234.5));
        assert_eq!(last_number("delta is -4.2"), Some(-4.2));
    }

    #[test]
    fn test_option_letter_explicit() {
        assert_eq!(option_letter("I believe it's option A"), LetterMatch::Unique('A'));
        assert_eq!(option_letter("The answer is b"), LetterMatch::Unique('B'));
        assert_eq!(option_letter("Choice: (C)"), LetterMatch::Unique('C'));
    }

    #[test]
    fn test_option_letter_standalone() {
        assert_eq!(option_letter("definitely C"), LetterMatch::Unique('C'));
        assert_eq!(option_letter("B"), LetterMatch::Unique('B'));
        assert_eq!(option_letter("b"), LetterMatch::Unique('B'));
    }

    #[test]
    fn test_option_letter_article_discounted() {
        assert_eq!(
            option_letter("It is a falling body, so C"),
            LetterMatch::Unique('C')
        );
    }

    #[test]
    fn test_option_letter_ambiguous_and_none() {
        assert_eq!(option_letter("Either B or C could work"), LetterMatch::Ambiguous);
        assert_eq!(option_letter("I am not sure at all"), LetterMatch::None);
    }
}
