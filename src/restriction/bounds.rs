//! Range and length expressions such as `1..10 | 20..max`

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: i128,
    pub hi: i128,
}

/// A union of closed intervals, keeping its source text for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervals {
    parts: Vec<Interval>,
    source: String,
}

impl Intervals {
    /// Parse `expr` with `min`/`max` standing for the type's own bounds.
    pub(crate) fn parse(
        expr: &str,
        min: i128,
        max: i128,
        parse_value: impl Fn(&str) -> Option<i128>,
    ) -> Result<Self, String> {
        let bound = |text: &str| -> Result<i128, String> {
            match text.trim() {
                "min" => Ok(min),
                "max" => Ok(max),
                other => parse_value(other).ok_or_else(|| format!("invalid bound {:?} in {:?}", other, expr)),
            }
        };

        let mut parts = Vec::new();
        for part in expr.split('|') {
            let (lo, hi) = match part.split_once("..") {
                Some((lo, hi)) => (bound(lo)?, bound(hi)?),
                None => {
                    let v = bound(part)?;
                    (v, v)
                }
            };
            if lo > hi {
                return Err(format!("empty interval {:?} in {:?}", part.trim(), expr));
            }
            if lo < min || hi > max {
                return Err(format!("interval {:?} exceeds the type bounds", part.trim()));
            }
            parts.push(Interval { lo, hi });
        }

        Ok(Self {
            parts,
            source: expr.trim().to_string(),
        })
    }

    pub fn contains(&self, value: i128) -> bool {
        self.parts.iter().any(|i| i.lo <= value && value <= i.hi)
    }

    pub fn parts(&self) -> &[Interval] {
        &self.parts
    }
}

impl fmt::Display for Intervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(text: &str) -> Option<i128> {
        text.parse().ok()
    }

    #[test]
    fn test_parse_union_of_ranges() {
        let r = Intervals::parse("1..10 | 20..max", 0, 255, int).unwrap();
        assert!(r.contains(5));
        assert!(!r.contains(15));
        assert!(r.contains(255));
        assert_eq!(r.to_string(), "1..10 | 20..max");
    }

    #[test]
    fn test_single_values_and_negatives() {
        let r = Intervals::parse("-10..-1 | 7", -128, 127, int).unwrap();
        assert!(r.contains(-5));
        assert!(r.contains(7));
        assert!(!r.contains(0));
    }

    #[test]
    fn test_reject_inverted_and_out_of_bounds() {
        assert!(Intervals::parse("10..1", 0, 255, int).is_err());
        assert!(Intervals::parse("0..300", 0, 255, int).is_err());
        assert!(Intervals::parse("a..b", 0, 255, int).is_err());
    }
}
