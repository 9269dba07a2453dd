// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::cmp::Ordering;

/// ParsedQuantity is the numeric value of a Kubernetes quantity string.
///
/// k8s-openapi keeps Quantity as an opaque string, so "1Gi" and "1073741824"
/// are different values to it. Bounds checks need a numeric comparison, so
/// the value is normalized to integer nano-units, which covers every suffix
/// from `n` up to `Ei` without floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParsedQuantity {
    nanos: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,
    #[error("quantity '{0}' has no numeric part")]
    MissingNumber(String),
    #[error("quantity '{0}' has an unknown suffix")]
    UnknownSuffix(String),
    #[error("quantity '{0}' is out of range")]
    Overflow(String),
}

const NANOS_PER_UNIT: i128 = 1_000_000_000;

impl ParsedQuantity {
    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

pub fn parse_quantity(input: &str) -> Result<ParsedQuantity, QuantityError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }
    let overflow = || QuantityError::Overflow(input.to_string());

    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(QuantityError::MissingNumber(input.to_string()));
    }
    if frac_part.contains('.') {
        return Err(QuantityError::MissingNumber(input.to_string()));
    }

    let mut nanos: i128 = 0;
    for digit in int_part.bytes() {
        nanos = nanos
            .checked_mul(10)
            .and_then(|n| n.checked_add((digit - b'0') as i128))
            .ok_or_else(overflow)?;
    }
    nanos = nanos.checked_mul(NANOS_PER_UNIT).ok_or_else(overflow)?;
    // Digits below nano precision are dropped.
    let mut scale = NANOS_PER_UNIT / 10;
    for digit in frac_part.bytes().take(9) {
        nanos = nanos
            .checked_add((digit - b'0') as i128 * scale)
            .ok_or_else(overflow)?;
        scale /= 10;
    }

    let nanos = apply_suffix(nanos, suffix).ok_or_else(|| {
        if suffix_is_known(suffix) {
            overflow()
        } else {
            QuantityError::UnknownSuffix(input.to_string())
        }
    })?;
    Ok(ParsedQuantity {
        nanos: if negative { -nanos } else { nanos },
    })
}

fn binary_multiplier(suffix: &str) -> Option<i128> {
    let power = match suffix {
        "Ki" => 1,
        "Mi" => 2,
        "Gi" => 3,
        "Ti" => 4,
        "Pi" => 5,
        "Ei" => 6,
        _ => return None,
    };
    Some(1024_i128.pow(power))
}

// Decimal SI suffixes as a power of ten.
fn decimal_exponent(suffix: &str) -> Option<i32> {
    match suffix {
        "n" => Some(-9),
        "u" => Some(-6),
        "m" => Some(-3),
        "" => Some(0),
        "k" => Some(3),
        "M" => Some(6),
        "G" => Some(9),
        "T" => Some(12),
        "P" => Some(15),
        "E" => Some(18),
        _ => None,
    }
}

fn scientific_exponent(suffix: &str) -> Option<i32> {
    let rest = suffix.strip_prefix('e').or_else(|| suffix.strip_prefix('E'))?;
    if rest.is_empty() {
        return None;
    }
    rest.parse::<i32>().ok()
}

fn suffix_is_known(suffix: &str) -> bool {
    binary_multiplier(suffix).is_some()
        || decimal_exponent(suffix).is_some()
        || scientific_exponent(suffix).is_some()
}

fn apply_suffix(nanos: i128, suffix: &str) -> Option<i128> {
    if let Some(multiplier) = binary_multiplier(suffix) {
        return nanos.checked_mul(multiplier);
    }
    let exponent = decimal_exponent(suffix).or_else(|| scientific_exponent(suffix))?;
    if exponent >= 0 {
        nanos.checked_mul(10_i128.checked_pow(exponent as u32)?)
    } else {
        Some(nanos / 10_i128.checked_pow((-exponent) as u32)?)
    }
}

/// Compares two quantities numerically.
pub fn cmp_quantities(a: &Quantity, b: &Quantity) -> Result<Ordering, QuantityError> {
    Ok(parse_quantity(&a.0)?.cmp(&parse_quantity(&b.0)?))
}

pub fn quantity_is_zero(q: &Quantity) -> bool {
    parse_quantity(&q.0).map(|p| p.is_zero()).unwrap_or(false)
}
