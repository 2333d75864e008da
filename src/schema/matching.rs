//! Matching rule algorithms and three-valued match results.
//!
//! Every matching rule registered in a [`Schema`](super::Schema) is backed by
//! one of the closed set of [`MatchingAlgorithm`]s below. Normalization
//! failures surface as [`NormalizationError`] so that callers can degrade a
//! comparison to [`ConditionResult::Undefined`] without catching anything.

use crate::dn::Dn;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::cmp::Ordering;
use std::ops::Not;

/// Result of evaluating an assertion under LDAP's three-valued logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionResult {
    True,
    False,
    Undefined,
}

impl ConditionResult {
    pub fn is_true(self) -> bool {
        self == ConditionResult::True
    }
}

impl From<bool> for ConditionResult {
    fn from(value: bool) -> Self {
        if value {
            ConditionResult::True
        } else {
            ConditionResult::False
        }
    }
}

impl Not for ConditionResult {
    type Output = ConditionResult;

    fn not(self) -> Self::Output {
        match self {
            ConditionResult::True => ConditionResult::False,
            ConditionResult::False => ConditionResult::True,
            ConditionResult::Undefined => ConditionResult::Undefined,
        }
    }
}

/// A value could not be normalized by a matching rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot normalize value for {algorithm:?}: {reason}")]
pub struct NormalizationError {
    pub algorithm: MatchingAlgorithm,
    pub reason: String,
}

pub type NormalizationResult = Result<Vec<u8>, NormalizationError>;

/// The comparison semantics implemented by a matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingAlgorithm {
    CaseIgnore,
    CaseExact,
    CaseIgnoreIa5,
    CaseExactIa5,
    OctetString,
    Integer,
    NumericString,
    Boolean,
    DistinguishedName,
    ObjectIdentifier,
    GeneralizedTime,
    TelephoneNumber,
    /// Phonetic approximate matching over case-folded words.
    Phonetic,
}

impl MatchingAlgorithm {
    fn fail(self, reason: impl Into<String>) -> NormalizationError {
        NormalizationError {
            algorithm: self,
            reason: reason.into(),
        }
    }

    fn utf8(self, value: &[u8]) -> Result<&str, NormalizationError> {
        std::str::from_utf8(value).map_err(|_| self.fail("value is not valid UTF-8"))
    }

    /// Normalize an attribute or assertion value into its comparable form.
    pub fn normalize(self, value: &[u8]) -> NormalizationResult {
        match self {
            MatchingAlgorithm::CaseIgnore => {
                Ok(fold_whitespace(self.utf8(value)?, true, true).into_bytes())
            }
            MatchingAlgorithm::CaseExact => {
                Ok(fold_whitespace(self.utf8(value)?, false, true).into_bytes())
            }
            MatchingAlgorithm::CaseIgnoreIa5 | MatchingAlgorithm::CaseExactIa5 => {
                if !value.is_ascii() {
                    return Err(self.fail("value contains non-IA5 characters"));
                }
                let ignore_case = self == MatchingAlgorithm::CaseIgnoreIa5;
                Ok(fold_whitespace(self.utf8(value)?, ignore_case, true).into_bytes())
            }
            MatchingAlgorithm::OctetString => Ok(value.to_vec()),
            MatchingAlgorithm::Integer => normalize_integer(self.utf8(value)?)
                .map(String::into_bytes)
                .ok_or_else(|| self.fail("value is not an integer")),
            MatchingAlgorithm::NumericString => {
                let digits: String = self
                    .utf8(value)?
                    .chars()
                    .filter(|c| *c != ' ')
                    .collect();
                if digits.chars().all(|c| c.is_ascii_digit()) {
                    Ok(digits.into_bytes())
                } else {
                    Err(self.fail("value contains non-numeric characters"))
                }
            }
            MatchingAlgorithm::Boolean => {
                let text = self.utf8(value)?.trim();
                if text.eq_ignore_ascii_case("true") {
                    Ok(b"TRUE".to_vec())
                } else if text.eq_ignore_ascii_case("false") {
                    Ok(b"FALSE".to_vec())
                } else {
                    Err(self.fail("value is neither TRUE nor FALSE"))
                }
            }
            MatchingAlgorithm::DistinguishedName => {
                let dn = Dn::parse(self.utf8(value)?).map_err(|e| self.fail(e.to_string()))?;
                Ok(dn.normalized().into_bytes())
            }
            MatchingAlgorithm::ObjectIdentifier => {
                let text = self.utf8(value)?.trim();
                if text.is_empty() {
                    return Err(self.fail("empty object identifier"));
                }
                Ok(text.to_ascii_lowercase().into_bytes())
            }
            MatchingAlgorithm::GeneralizedTime => parse_generalized_time(self.utf8(value)?)
                .map(|t| t.format("%Y%m%d%H%M%S%.3fZ").to_string().into_bytes())
                .ok_or_else(|| self.fail("value is not a generalized time")),
            MatchingAlgorithm::TelephoneNumber => Ok(self
                .utf8(value)?
                .chars()
                .filter(|c| *c != ' ' && *c != '-')
                .flat_map(char::to_lowercase)
                .collect::<String>()
                .into_bytes()),
            MatchingAlgorithm::Phonetic => {
                let text = fold_whitespace(self.utf8(value)?, true, true);
                Ok(text
                    .split(' ')
                    .map(phonetic_key)
                    .collect::<Vec<_>>()
                    .join(" ")
                    .into_bytes())
            }
        }
    }

    /// Normalize one subInitial, subAny or subFinal segment.
    ///
    /// Segments keep their edge whitespace so that `(cn=Babs *)` does not
    /// degenerate into a prefix match on `Babs`.
    pub fn normalize_substring(self, value: &[u8]) -> NormalizationResult {
        match self {
            MatchingAlgorithm::CaseIgnore | MatchingAlgorithm::CaseIgnoreIa5 => {
                Ok(fold_whitespace(self.utf8(value)?, true, false).into_bytes())
            }
            MatchingAlgorithm::CaseExact | MatchingAlgorithm::CaseExactIa5 => {
                Ok(fold_whitespace(self.utf8(value)?, false, false).into_bytes())
            }
            MatchingAlgorithm::NumericString | MatchingAlgorithm::TelephoneNumber => {
                self.normalize(value)
            }
            _ => Ok(value.to_vec()),
        }
    }

    /// Order two normalized values.
    pub fn compare(self, left: &[u8], right: &[u8]) -> Ordering {
        match self {
            MatchingAlgorithm::Integer => compare_integers(left, right),
            _ => left.cmp(right),
        }
    }

    /// Test whether a normalized value satisfies normalized substring segments.
    pub fn substring_match(
        self,
        value: &[u8],
        sub_initial: Option<&[u8]>,
        sub_any: &[Vec<u8>],
        sub_final: Option<&[u8]>,
    ) -> bool {
        let mut position = 0;
        let mut end = value.len();

        if let Some(initial) = sub_initial {
            if !value.starts_with(initial) {
                return false;
            }
            position = initial.len();
        }

        if let Some(fin) = sub_final {
            if fin.len() > end - position || !value.ends_with(fin) {
                return false;
            }
            end -= fin.len();
        }

        for any in sub_any {
            match find(&value[position..end], any) {
                Some(offset) => position += offset + any.len(),
                None => return false,
            }
        }
        true
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Collapse runs of whitespace to a single space, optionally case folding
/// and trimming.
fn fold_whitespace(value: &str, ignore_case: bool, trim: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && (!trim || !out.is_empty()) {
            out.push(' ');
        }
        pending_space = false;
        if ignore_case {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    if pending_space && !trim {
        out.push(' ');
    }
    out
}

fn normalize_integer(value: &str) -> Option<String> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some("0".to_string());
    }
    Some(if negative {
        format!("-{digits}")
    } else {
        digits.to_string()
    })
}

fn compare_integers(left: &[u8], right: &[u8]) -> Ordering {
    let left_negative = left.first() == Some(&b'-');
    let right_negative = right.first() == Some(&b'-');
    match (left_negative, right_negative) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => left.len().cmp(&right.len()).then_with(|| left.cmp(right)),
        (true, true) => right.len().cmp(&left.len()).then_with(|| right.cmp(left)),
    }
}

/// Parse an RFC 4517 GeneralizedTime value (`YYYYMMDDHH[MM[SS]][.fff](Z|+hhmm)`).
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let (body, offset_seconds) = if let Some(body) = value.strip_suffix(|c| c == 'Z' || c == 'z') {
        (body, 0i64)
    } else if value.len() > 5 {
        let split = value.len() - 5;
        let (body, tz) = (value.get(..split)?, value.get(split..)?);
        let sign = match tz.as_bytes()[0] {
            b'+' => 1,
            b'-' => -1,
            _ => return None,
        };
        let hours: i64 = tz.get(1..3)?.parse().ok()?;
        let minutes: i64 = tz.get(3..5)?.parse().ok()?;
        (body, sign * (hours * 3600 + minutes * 60))
    } else {
        return None;
    };

    let (whole, fraction) = match body.find(|c| c == '.' || c == ',') {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, ""),
    };
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let field = |range: std::ops::Range<usize>| -> Option<u32> { whole.get(range)?.parse().ok() };
    let date = NaiveDate::from_ymd_opt(
        whole.get(0..4)?.parse().ok()?,
        field(4..6)?,
        field(6..8)?,
    )?;
    let hour = field(8..10)?;
    let (minute, second) = match whole.len() {
        10 => (0, 0),
        12 => (field(10..12)?, 0),
        14 => (field(10..12)?, field(12..14)?),
        _ => return None,
    };
    let millis = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<3}", &fraction[..fraction.len().min(3)]);
        padded.parse().ok()?
    };
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second.min(59), millis)?;
    let local = NaiveDateTime::new(date, time);
    let utc = local - chrono::Duration::seconds(offset_seconds);
    Some(DateTime::from_naive_utc_and_offset(utc, Utc))
}

/// A Soundex-style key: first letter plus up to three consonant-class digits.
fn phonetic_key(word: &str) -> String {
    let mut chars = word.chars().filter(|c| c.is_alphanumeric());
    let Some(first) = chars.next() else {
        return String::new();
    };
    let class = |c: char| match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    };
    let mut key = String::new();
    key.push(first);
    let mut last = class(first);
    for c in chars {
        let code = class(c);
        if let Some(digit) = code {
            if code != last {
                key.push(digit);
                if key.len() == 4 {
                    break;
                }
            }
        }
        if c != 'h' && c != 'w' {
            last = code;
        }
    }
    key
}
