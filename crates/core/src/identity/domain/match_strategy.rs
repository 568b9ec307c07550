use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a video descriptor picks among identities that clear the threshold.
///
/// `FirstMatch` is the historical policy: identities are scanned in
/// insertion order and the first eligible one wins, even when a later
/// identity is more similar. `BestMatch` takes the most similar eligible
/// identity instead (ties keep the earlier one).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    #[default]
    #[serde(rename = "first")]
    FirstMatch,
    #[serde(rename = "best")]
    BestMatch,
}

impl MatchStrategy {
    /// Selects `(position, similarity)` from similarities listed in
    /// insertion order.
    pub fn select<I>(self, similarities: I, threshold: f64) -> Option<(usize, f64)>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut eligible = similarities
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s >= threshold);

        match self {
            MatchStrategy::FirstMatch => eligible.next(),
            MatchStrategy::BestMatch => eligible.fold(None, |best, (i, s)| match best {
                Some((_, best_s)) if s <= best_s => best,
                _ => Some((i, s)),
            }),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::FirstMatch => write!(f, "first"),
            MatchStrategy::BestMatch => write!(f, "best"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(MatchStrategy::FirstMatch),
            "best" => Ok(MatchStrategy::BestMatch),
            other => Err(format!(
                "Match strategy must be 'first' or 'best', got '{other}'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_first_match_is_order_sensitive() {
        let picked = MatchStrategy::FirstMatch.select([0.62, 0.95], 0.6);
        assert_eq!(picked, Some((0, 0.62)));
    }

    #[test]
    fn test_best_match_takes_highest() {
        let picked = MatchStrategy::BestMatch.select([0.62, 0.95, 0.7], 0.6);
        assert_eq!(picked, Some((1, 0.95)));
    }

    #[test]
    fn test_best_match_tie_keeps_earliest() {
        let picked = MatchStrategy::BestMatch.select([0.3, 0.8, 0.8], 0.6);
        assert_eq!(picked, Some((1, 0.8)));
    }

    #[rstest]
    #[case(MatchStrategy::FirstMatch)]
    #[case(MatchStrategy::BestMatch)]
    fn test_nothing_above_threshold(#[case] strategy: MatchStrategy) {
        assert_eq!(strategy.select([0.1, 0.59, -0.4], 0.6), None);
        assert_eq!(strategy.select(std::iter::empty(), 0.6), None);
    }

    #[rstest]
    #[case(MatchStrategy::FirstMatch)]
    #[case(MatchStrategy::BestMatch)]
    fn test_threshold_is_inclusive(#[case] strategy: MatchStrategy) {
        assert_eq!(strategy.select([0.6], 0.6), Some((0, 0.6)));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("first".parse::<MatchStrategy>(), Ok(MatchStrategy::FirstMatch));
        assert_eq!("best".parse::<MatchStrategy>(), Ok(MatchStrategy::BestMatch));
        assert!("closest".parse::<MatchStrategy>().is_err());
        assert_eq!(MatchStrategy::BestMatch.to_string(), "best");
        assert_eq!(MatchStrategy::default(), MatchStrategy::FirstMatch);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MatchStrategy::BestMatch).unwrap();
        assert_eq!(json, "\"best\"");
        let parsed: MatchStrategy = serde_json::from_str("\"first\"").unwrap();
        assert_eq!(parsed, MatchStrategy::FirstMatch);
    }
}
