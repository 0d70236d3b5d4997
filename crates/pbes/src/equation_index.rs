use rustc_hash::FxHashMap;

use crate::FixpointSymbol;
use crate::Pbes;

/// A lookup table from propositional variable names to the position and rank
/// of their defining equation.
///
/// Ranks are assigned block-by-block: consecutive equations with the same
/// fixpoint symbol share a rank, and every alternation increments it. The
/// first block has rank 0 when it is a ν block and rank 1 when it is a μ
/// block, so the parity of a rank always encodes its fixpoint symbol.
#[derive(Debug, Clone)]
pub struct EquationIndex {
    index: FxHashMap<String, (usize, usize)>,
}

impl EquationIndex {
    /// Creates the index for the given PBES.
    pub fn new(pbes: &Pbes) -> Self {
        let mut index = FxHashMap::default();
        let mut rank = 0;
        let mut previous: Option<FixpointSymbol> = None;

        for (position, eqn) in pbes.equations.iter().enumerate() {
            match previous {
                None => {
                    rank = if eqn.symbol.is_mu() { 1 } else { 0 };
                }
                Some(symbol) => {
                    if symbol != eqn.symbol {
                        rank += 1;
                    }
                }
            }
            previous = Some(eqn.symbol);
            index.insert(eqn.variable.name.clone(), (position, rank));
        }

        Self { index }
    }

    /// Returns the position of the defining equation for the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|(position, _)| *position)
    }

    /// Returns the rank of the defining equation for the given name.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|(_, rank)| *rank)
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_pbes;

    use super::*;

    #[test]
    fn test_rank_blocks() {
        let pbes = parse_pbes(
            "pbes
               nu X0 = X1;
               nu X1 = X2;
               mu X2 = X3;
               nu X3 = X0;
             init X0;",
        )
        .unwrap();

        let index = EquationIndex::new(&pbes);
        assert_eq!(index.rank("X0"), Some(0));
        assert_eq!(index.rank("X1"), Some(0));
        assert_eq!(index.rank("X2"), Some(1));
        assert_eq!(index.rank("X3"), Some(2));
        assert_eq!(index.position("X2"), Some(2));
        assert_eq!(index.rank("Y"), None);
    }

    #[test]
    fn test_leading_mu_block_is_odd() {
        let pbes = parse_pbes("pbes mu X = X; init X;").unwrap();
        let index = EquationIndex::new(&pbes);
        assert_eq!(index.rank("X"), Some(1));
    }
}
