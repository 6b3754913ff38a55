use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::LazyLock;

use regex::Regex;

static RE_AFTER_DECIMALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\.\d\d).*").expect("Failed to create regex pattern for decimals"));

const CENTS_PER_UNIT: i64 = 100;

/// Money amount in euro cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Parse an amount written in German notation, e.g. `1.234,56` or `-12,30`.
    ///
    /// Anything after the second decimal digit is ignored,
    /// so trailing markup like `-12,30<br/>` is fine.
    /// Text that is not a number results in zero.
    ///
    /// ```rust
    /// use kontoauszug_tools::statement::Amount;
    ///
    /// assert_eq!(Amount::from_german("1.234,56").cents(), 123_456);
    /// assert_eq!(Amount::from_german("-12,30<br/>").cents(), -1230);
    /// assert_eq!(Amount::from_german("n/a"), Amount::ZERO);
    /// ```
    #[must_use]
    pub fn from_german(text: &str) -> Self {
        let normalized = text.replace('.', "").replace(',', ".");
        let truncated = RE_AFTER_DECIMALS.replace(&normalized, "$1");
        parse_cents(&truncated).map_or(Self::ZERO, Self)
    }
}

/// Parse a decimal number with at most two fraction digits into cents.
fn parse_cents(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, number) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (units, fraction) = number.split_once('.').unwrap_or((number, ""));

    if units.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > 2 || !units.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let units: i64 = if units.is_empty() { 0 } else { units.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    let cents = units.checked_mul(CENTS_PER_UNIT)?.checked_add(fraction)?;
    Some(if negative { -cents } else { cents })
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        let per_unit = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / per_unit, cents % per_unit)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
mod test_amount {
    use super::*;

    #[test]
    fn parses_thousands_separator() {
        assert_eq!(Amount::from_german("1.234,56").cents(), 123_456);
        assert_eq!(Amount::from_german("2.500,00").cents(), 250_000);
        assert_eq!(Amount::from_german("1.000.000,01").cents(), 100_000_001);
    }

    #[test]
    fn parses_negative_values() {
        assert_eq!(Amount::from_german("-45,67").cents(), -4567);
        assert_eq!(Amount::from_german("-0,50").cents(), -50);
    }

    #[test]
    fn ignores_trailing_markup() {
        assert_eq!(Amount::from_german("-80,50<br/>").cents(), -8050);
        assert_eq!(Amount::from_german("12,345 Euro").cents(), 1234);
    }

    #[test]
    fn parses_single_fraction_digit() {
        assert_eq!(Amount::from_german("12,3").cents(), 1230);
    }

    #[test]
    fn parses_whole_numbers() {
        assert_eq!(Amount::from_german("5").cents(), 500);
        assert_eq!(Amount::from_german(" 42 ").cents(), 4200);
    }

    #[test]
    fn invalid_text_is_zero() {
        assert_eq!(Amount::from_german(""), Amount::ZERO);
        assert_eq!(Amount::from_german("Euro"), Amount::ZERO);
        assert_eq!(Amount::from_german("12<br/>"), Amount::ZERO);
        assert_eq!(Amount::from_german("0,5<br/>"), Amount::ZERO);
        assert_eq!(Amount::from_german("-"), Amount::ZERO);
    }

    #[test]
    fn displays_with_two_decimals() {
        assert_eq!(Amount::from_cents(123_456).to_string(), "1234.56");
        assert_eq!(Amount::from_cents(-4567).to_string(), "-45.67");
        assert_eq!(Amount::from_cents(-50).to_string(), "-0.50");
        assert_eq!(Amount::from_cents(7).to_string(), "0.07");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn adds_up() {
        let mut total = Amount::from_german("1.234,56");
        total += Amount::from_german("-45,67");
        assert_eq!(total.to_string(), "1188.89");

        let sum: Amount = ["1,00", "2,50", "-0,25"].iter().map(|s| Amount::from_german(s)).sum();
        assert_eq!(sum.cents(), 325);
    }
}
