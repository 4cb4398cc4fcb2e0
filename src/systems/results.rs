use std::collections::HashMap;

use parking_lot::RwLock;

use crate::bets::Bet;

/// Winning documents of the draw, grouped by agency
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WinnersIndex(HashMap<u32, Vec<String>>);

impl WinnersIndex {
    /// Builds the index out of every stored bet,
    /// keeping the store order within each agency
    pub fn draw(bets: &[Bet], winning_number: i64) -> Self {
        let mut winners: HashMap<u32, Vec<String>> = HashMap::new();
        for bet in bets.iter().filter(|bet| bet.has_won(winning_number)) {
            winners
                .entry(bet.agency)
                .or_default()
                .push(bet.document.clone());
        }

        Self(winners)
    }

    pub fn winners(&self, agency: u32) -> &[String] {
        self.0.get(&agency).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

/// Holds the result of the draw once it is available
#[derive(Debug, Default)]
pub struct ResultsCache {
    index: RwLock<Option<WinnersIndex>>,
}

impl ResultsCache {
    /// Stores the result of the draw
    ///
    /// returns false, leaving the cache untouched, if a result was already published
    pub fn publish(&self, index: WinnersIndex) -> bool {
        let mut current = self.index.write();
        if current.is_some() {
            return false;
        }

        *current = Some(index);
        true
    }

    /// Returns the winners of the agency, or None if the draw didn't happen yet
    pub fn winners(&self, agency: u32) -> Option<Vec<String>> {
        self.index
            .read()
            .as_ref()
            .map(|index| index.winners(agency).to_vec())
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.index.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ResultsCache, WinnersIndex};
    use crate::bets::Bet;

    fn bet(agency: u32, document: &str, number: i64) -> Bet {
        Bet {
            agency,
            first_name: "first".into(),
            last_name: "last".into(),
            document: document.into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            number,
        }
    }

    #[test]
    fn draw_groups_winners_by_agency() {
        let bets = [
            bet(1, "a", 7574),
            bet(1, "b", 1),
            bet(2, "c", 7574),
            bet(1, "d", 7574),
            bet(3, "e", 2),
        ];

        let index = WinnersIndex::draw(&bets, 7574);
        assert_eq!(index.winners(1), ["a".to_string(), "d".to_string()]);
        assert_eq!(index.winners(2), ["c".to_string()]);
        assert!(index.winners(3).is_empty());
        assert!(index.winners(42).is_empty());
        assert_eq!(index.total(), 3);
    }

    #[test]
    fn cache_is_written_once() {
        let cache = ResultsCache::default();
        assert!(!cache.is_ready());
        assert_eq!(cache.winners(1), None);

        assert!(cache.publish(WinnersIndex::draw(&[bet(1, "a", 7)], 7)));
        assert!(cache.is_ready());
        assert_eq!(cache.winners(1), Some(vec!["a".to_string()]));
        assert_eq!(cache.winners(2), Some(vec![]));

        // a second draw is refused
        assert!(!cache.publish(WinnersIndex::draw(&[bet(1, "b", 7)], 7)));
        assert_eq!(cache.winners(1), Some(vec!["a".to_string()]));
    }
}
