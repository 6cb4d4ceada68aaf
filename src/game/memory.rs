use rand::seq::SliceRandom;
use rand::Rng;

/// Symbols of the eco memory deck; each appears on exactly two cards.
pub const CARD_SYMBOLS: [&str; 4] = ["🌳", "♻️", "🌍", "💧"];

/// Shown when a pair is matched, one fact per pair, picked at random.
const ECO_FACTS: [&str; 8] = [
    "Un arbre adulte absorbe jusqu'à 25 kg de CO2 par an.",
    "Recycler une canette économise l'énergie de 3 heures de télévision.",
    "Près d'un tiers de la nourriture produite dans le monde est gaspillée.",
    "Une douche de 5 minutes consomme 3 fois moins d'eau qu'un bain.",
    "Les océans produisent plus de la moitié de l'oxygène de la planète.",
    "Un sac plastique met jusqu'à 400 ans à se dégrader dans la nature.",
    "Éteindre les appareils en veille réduit la facture d'électricité de 10 %.",
    "Le verre se recycle à l'infini sans perdre de qualité.",
];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Card {
    pub id: u32,
    pub symbol: String,
    pub matched: bool,
}

/// Outcome of a single reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reveal {
    /// Already two cards up, out of range, matched, or already revealed.
    Ignored,
    /// First card of a pair is now face up.
    First,
    /// Second card resolved the pair. The token schedules the face-down
    /// flip: pass it back through [`MemoryPuzzle::clear_revealed`].
    Pair { matched: bool, clear: ClearToken },
}

/// Handle for the delayed "hide the revealed pair again" step.
///
/// A token minted for one pair is invalidated by the next pair and by
/// any newer puzzle, so a timer that fires after the player moved on
/// does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClearToken {
    nonce: u32,
    pair: u64,
}

/// One run of the memory game.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryPuzzle {
    deck: Vec<Card>,
    revealed: Vec<usize>,
    matched_symbols: Vec<String>,
    last_fact: Option<String>,
    nonce: u32,
    pairs_resolved: u64,
}

impl MemoryPuzzle {
    pub fn new(symbols: &[&str]) -> Self {
        Self::with_rng(symbols, &mut rand::thread_rng())
    }

    pub fn with_rng(symbols: &[&str], rng: &mut impl Rng) -> Self {
        let mut deck: Vec<Card> = symbols
            .iter()
            .flat_map(|symbol| [symbol, symbol])
            .enumerate()
            .map(|(i, symbol)| Card {
                id: i as u32 + 1,
                symbol: symbol.to_string(),
                matched: false,
            })
            .collect();
        // Fisher-Yates, not the sort-by-random-comparator trick.
        deck.shuffle(rng);

        Self {
            deck,
            revealed: Vec::new(),
            matched_symbols: Vec::new(),
            last_fact: None,
            nonce: rng.gen(),
            pairs_resolved: 0,
        }
    }

    /// Flips the card at `index` face up. Invalid picks (a full pair
    /// already up, a matched card, the same card twice, an index off
    /// the deck) change nothing.
    pub fn reveal(&mut self, index: usize) -> Reveal {
        if self.revealed.len() == 2 {
            return Reveal::Ignored;
        }
        match self.deck.get(index) {
            Some(card) if !card.matched && !self.revealed.contains(&index) => {}
            _ => return Reveal::Ignored,
        }

        self.revealed.push(index);
        if self.revealed.len() < 2 {
            return Reveal::First;
        }

        let (first, second) = (self.revealed[0], self.revealed[1]);
        let matched = self.deck[first].symbol == self.deck[second].symbol;
        if matched {
            let symbol = self.deck[first].symbol.clone();
            self.deck[first].matched = true;
            self.deck[second].matched = true;
            self.matched_symbols.push(symbol);
            self.last_fact = ECO_FACTS
                .choose(&mut rand::thread_rng())
                .map(|fact| fact.to_string());
        }
        self.pairs_resolved += 1;
        Reveal::Pair {
            matched,
            clear: ClearToken {
                nonce: self.nonce,
                pair: self.pairs_resolved,
            },
        }
    }

    /// Flips the revealed pair face down again. Returns false on a
    /// stale token (newer pair, newer puzzle) or when no pair is up.
    pub fn clear_revealed(&mut self, token: ClearToken) -> bool {
        if token.nonce != self.nonce || token.pair != self.pairs_resolved {
            log::debug!("ignoring stale clear token {:?}", token);
            return false;
        }
        if self.revealed.len() != 2 {
            return false;
        }
        self.revealed.clear();
        true
    }

    pub fn deck(&self) -> &[Card] {
        &self.deck
    }

    pub fn is_revealed(&self, index: usize) -> bool {
        self.revealed.contains(&index)
    }

    pub fn revealed(&self) -> &[usize] {
        &self.revealed
    }

    pub fn matched_symbols(&self) -> &[String] {
        &self.matched_symbols
    }

    pub fn last_fact(&self) -> Option<&str> {
        self.last_fact.as_deref()
    }

    /// True once every symbol has been matched.
    pub fn is_solved(&self) -> bool {
        self.deck.iter().all(|card| card.matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn puzzle_from_seed(seed: u64) -> MemoryPuzzle {
        MemoryPuzzle::with_rng(&CARD_SYMBOLS, &mut StdRng::seed_from_u64(seed))
    }

    /// Positions of both cards of each symbol, keyed by symbol.
    fn positions(puzzle: &MemoryPuzzle) -> BTreeMap<String, Vec<usize>> {
        let mut by_symbol: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, card) in puzzle.deck().iter().enumerate() {
            by_symbol.entry(card.symbol.clone()).or_default().push(i);
        }
        by_symbol
    }

    #[test]
    fn deck_holds_each_symbol_exactly_twice() {
        for seed in 0..50 {
            let puzzle = puzzle_from_seed(seed);
            assert_eq!(puzzle.deck().len(), CARD_SYMBOLS.len() * 2);
            for slots in positions(&puzzle).values() {
                assert_eq!(slots.len(), 2);
            }
            // Shuffling permutes the cards, it never duplicates ids.
            let mut ids: Vec<u32> = puzzle.deck().iter().map(|c| c.id).collect();
            ids.sort_unstable();
            assert_eq!(ids, (1..=CARD_SYMBOLS.len() as u32 * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn shuffle_actually_permutes() {
        let orders: Vec<Vec<u32>> = (0..20)
            .map(|seed| puzzle_from_seed(seed).deck().iter().map(|c| c.id).collect())
            .collect();
        assert!(orders.iter().any(|order| order != &orders[0]));
    }

    #[test]
    fn matching_pair_is_marked_and_yields_a_fact() {
        let mut puzzle = puzzle_from_seed(7);
        let slots = positions(&puzzle);
        let pair = &slots[CARD_SYMBOLS[0]];

        assert_eq!(puzzle.reveal(pair[0]), Reveal::First);
        match puzzle.reveal(pair[1]) {
            Reveal::Pair { matched: true, clear } => {
                assert!(puzzle.deck()[pair[0]].matched);
                assert!(puzzle.deck()[pair[1]].matched);
                assert_eq!(puzzle.matched_symbols(), [CARD_SYMBOLS[0].to_string()]);
                assert!(puzzle.last_fact().is_some());
                assert!(puzzle.clear_revealed(clear));
                assert!(puzzle.revealed().is_empty());
            }
            other => panic!("expected a matched pair, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_pair_stays_up_until_cleared() {
        let mut puzzle = puzzle_from_seed(7);
        let slots = positions(&puzzle);
        let a = slots[CARD_SYMBOLS[0]][0];
        let b = slots[CARD_SYMBOLS[1]][0];

        puzzle.reveal(a);
        let clear = match puzzle.reveal(b) {
            Reveal::Pair { matched: false, clear } => clear,
            other => panic!("expected a mismatch, got {:?}", other),
        };
        // Third pick while the pair is up is ignored.
        assert_eq!(puzzle.reveal(slots[CARD_SYMBOLS[2]][0]), Reveal::Ignored);
        assert!(!puzzle.deck()[a].matched);
        assert!(puzzle.clear_revealed(clear));
        assert!(puzzle.revealed().is_empty());
        assert!(puzzle.matched_symbols().is_empty());
    }

    #[test]
    fn invalid_reveals_change_nothing() {
        let mut puzzle = puzzle_from_seed(3);
        let slots = positions(&puzzle);
        let pair = &slots[CARD_SYMBOLS[0]];

        assert_eq!(puzzle.reveal(puzzle.deck().len()), Reveal::Ignored);
        assert_eq!(puzzle.reveal(pair[0]), Reveal::First);
        // Same card twice.
        assert_eq!(puzzle.reveal(pair[0]), Reveal::Ignored);
        assert_eq!(puzzle.revealed(), [pair[0]]);

        // Matched cards are off limits afterwards.
        let clear = match puzzle.reveal(pair[1]) {
            Reveal::Pair { matched: true, clear } => clear,
            other => panic!("expected a match, got {:?}", other),
        };
        assert!(puzzle.clear_revealed(clear));
        assert_eq!(puzzle.reveal(pair[0]), Reveal::Ignored);
    }

    #[test]
    fn stale_clear_token_is_ignored() {
        let mut puzzle = puzzle_from_seed(11);
        let slots = positions(&puzzle);
        let a = slots[CARD_SYMBOLS[0]][0];
        let b = slots[CARD_SYMBOLS[1]][0];

        puzzle.reveal(a);
        let first_token = match puzzle.reveal(b) {
            Reveal::Pair { clear, .. } => clear,
            other => panic!("expected a pair, got {:?}", other),
        };
        assert!(puzzle.clear_revealed(first_token));

        // Second pair mints a fresh token; the old one no longer clears.
        puzzle.reveal(a);
        puzzle.reveal(b);
        assert!(!puzzle.clear_revealed(first_token));
        assert_eq!(puzzle.revealed().len(), 2);

        // A token from another puzzle instance never clears this one.
        let mut other = puzzle_from_seed(12);
        let o = positions(&other);
        other.reveal(o[CARD_SYMBOLS[0]][0]);
        let foreign = match other.reveal(o[CARD_SYMBOLS[1]][0]) {
            Reveal::Pair { clear, .. } => clear,
            other => panic!("expected a pair, got {:?}", other),
        };
        assert!(!puzzle.clear_revealed(foreign));
    }

    #[test]
    fn solving_every_pair_completes_the_puzzle() {
        let mut puzzle = puzzle_from_seed(42);
        let slots = positions(&puzzle);
        for symbol in CARD_SYMBOLS {
            assert!(!puzzle.is_solved());
            let pair = &slots[symbol];
            puzzle.reveal(pair[0]);
            let clear = match puzzle.reveal(pair[1]) {
                Reveal::Pair { matched: true, clear } => clear,
                other => panic!("expected a match for {symbol}, got {:?}", other),
            };
            puzzle.clear_revealed(clear);
        }
        assert!(puzzle.is_solved());
        assert_eq!(puzzle.matched_symbols().len(), CARD_SYMBOLS.len());
    }
}
