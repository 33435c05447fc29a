//! Aggregate product rating.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lowest star value a single review may carry.
pub const MIN_STARS: u8 = 1;

/// Highest star value a single review may carry.
pub const MAX_STARS: u8 = 5;

/// Average rating with one decimal, stored as tenths of a star (0..=50).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rating(u8);

impl Rating {
    /// Creates a rating from tenths of a star. Returns None above 5.0.
    pub fn from_tenths(tenths: u8) -> Option<Self> {
        (tenths <= MAX_STARS * 10).then_some(Self(tenths))
    }

    pub fn tenths(&self) -> u8 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Mean of the given star ratings, rounded half-up to one decimal.
    ///
    /// An empty input yields `Rating(0)` with a count of 0.
    pub fn average(stars: impl IntoIterator<Item = u8>) -> RatingSummary {
        let (sum, count) = stars
            .into_iter()
            .fold((0_u64, 0_u32), |(sum, count), s| (sum + u64::from(s), count + 1));

        if count == 0 {
            return RatingSummary::default();
        }

        // round(sum * 10 / count) in integer arithmetic
        let count_wide = u64::from(count);
        let tenths = (sum * 20 + count_wide) / (2 * count_wide);
        let tenths = tenths.min(u64::from(MAX_STARS) * 10) as u8;

        RatingSummary {
            rating: Rating(tenths),
            num_reviews: count,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        let tenths = (value * 10.0).round();
        if !(0.0..=f64::from(MAX_STARS) * 10.0).contains(&tenths) {
            return Err(serde::de::Error::custom(format!(
                "rating out of range: {value}"
            )));
        }
        Ok(Rating(tenths as u8))
    }
}

/// A product's rating together with the number of reviews behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    pub rating: Rating,
    pub num_reviews: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_average_is_zero() {
        let summary = Rating::average(Vec::new());
        assert_eq!(summary.rating, Rating::default());
        assert_eq!(summary.num_reviews, 0);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        // 13 / 3 = 4.333.. -> 4.3
        assert_eq!(Rating::average([5, 4, 4]).rating.tenths(), 43);
        // 9 / 2 = 4.5
        assert_eq!(Rating::average([5, 4]).rating.tenths(), 45);
        // 11 / 3 = 3.666.. -> 3.7
        assert_eq!(Rating::average([4, 4, 3]).rating.tenths(), 37);
        // 29 / 8 = 3.625 -> 3.6
        assert_eq!(Rating::average([4, 4, 4, 4, 4, 4, 4, 1]).rating.tenths(), 36);
    }

    #[test]
    fn average_counts_reviews() {
        assert_eq!(Rating::average([1, 2, 3]).num_reviews, 3);
    }

    #[test]
    fn from_tenths_rejects_above_five() {
        assert!(Rating::from_tenths(50).is_some());
        assert!(Rating::from_tenths(51).is_none());
    }

    #[test]
    fn serializes_as_decimal_number() {
        let rating = Rating::from_tenths(43).unwrap();
        assert_eq!(serde_json::to_string(&rating).unwrap(), "4.3");
        let back: Rating = serde_json::from_str("4.3").unwrap();
        assert_eq!(back, rating);
        assert_eq!(rating.to_string(), "4.3");
    }
}
