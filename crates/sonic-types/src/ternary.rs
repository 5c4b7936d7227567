//! Ternary (value/mask) and range matchers for watchlist keys.

use crate::ParseError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::BitAnd;
use std::str::FromStr;

/// Unsigned field widths that can be matched ternarily.
pub trait TernaryWord:
    Copy + PartialEq + BitAnd<Output = Self> + Into<u64> + TryFrom<u64> + fmt::LowerHex
{
    /// Mask with every bit significant.
    const ALL_ONES: Self;
}

impl TernaryWord for u8 {
    const ALL_ONES: Self = u8::MAX;
}

impl TernaryWord for u16 {
    const ALL_ONES: Self = u16::MAX;
}

impl TernaryWord for u32 {
    const ALL_ONES: Self = u32::MAX;
}

/// A value matched under a mask: a field `x` matches iff
/// `x & mask == value & mask`.
///
/// Textual form is `value` (exact) or `value/mask`, each either decimal or
/// `0x`-prefixed hex, e.g. `6`, `0x0800`, `0x02/0x12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ternary<T> {
    value: T,
    mask: T,
}

impl<T: TernaryWord> Ternary<T> {
    /// Matches exactly one value.
    pub fn exact(value: T) -> Self {
        Self {
            value,
            mask: T::ALL_ONES,
        }
    }

    /// Matches every value whose masked bits equal `value`'s.
    pub fn masked(value: T, mask: T) -> Self {
        Self {
            value: value & mask,
            mask,
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn mask(&self) -> T {
        self.mask
    }

    /// Returns true if `field` matches.
    pub fn matches(&self, field: T) -> bool {
        field & self.mask == self.value
    }

    /// Number of significant (non-wildcard) bits.
    pub fn care_bits(&self) -> u32 {
        let mask: u64 = self.mask.into();
        mask.count_ones()
    }
}

impl<T: TernaryWord> fmt::Display for Ternary<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mask == T::ALL_ONES {
            write!(f, "{:#x}", self.value)
        } else {
            write!(f, "{:#x}/{:#x}", self.value, self.mask)
        }
    }
}

fn parse_word<T: TernaryWord>(text: &str, whole: &str) -> Result<T, ParseError> {
    let text = text.trim();
    let raw = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    }
    .map_err(|_| ParseError::InvalidTernary(whole.to_string()))?;

    T::try_from(raw).map_err(|_| ParseError::InvalidTernary(whole.to_string()))
}

impl<T: TernaryWord> FromStr for Ternary<T> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((value, mask)) => Ok(Ternary::masked(
                parse_word(value, s)?,
                parse_word(mask, s)?,
            )),
            None => Ok(Ternary::exact(parse_word(s, s)?)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

impl<T: TernaryWord> Serialize for Ternary<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: TernaryWord> Deserialize<'de> for Ternary<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => T::try_from(n)
                .map(Ternary::exact)
                .map_err(|_| D::Error::custom(format!("value {} out of range", n))),
            NumberOrText::Text(s) => s.parse().map_err(D::Error::custom),
        }
    }
}

/// Inclusive L4 port range (`min-max`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    /// Creates a range, rejecting `min > max`.
    pub fn new(min: u16, max: u16) -> Result<Self, ParseError> {
        if min > max {
            return Err(ParseError::InvalidPortRange(format!(
                "min ({}) > max ({})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Approximate significant bits: a range spanning 2^k ports counts as
    /// a ternary match with k wildcard bits.
    pub fn care_bits(&self) -> u32 {
        let span = self.max - self.min;
        u16::BITS - (u16::BITS - span.leading_zeros())
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for PortRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| ParseError::InvalidPortRange(s.to_string()))?;
        let min = min
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidPortRange(s.to_string()))?;
        let max = max
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidPortRange(s.to_string()))?;
        PortRange::new(min, max)
    }
}

impl Serialize for PortRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
