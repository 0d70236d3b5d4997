use std::fmt;

use crate::SolveError;

/// The order in which the todo list is explored.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SearchStrategy {
    /// Leads to smaller counter examples.
    #[default]
    BreadthFirst,
    DepthFirst,
}

/// The partial solving applied during instantiation, strictly increasing in
/// cost.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Optimisation {
    /// No on-the-fly solving.
    #[default]
    None = 0,
    /// Substitute true/false for self loops in the right hand side.
    RemoveSelfLoops = 1,
    /// Propagate solved equations using substitution (Rplus).
    PropagateSolvedUsingSubstitution = 2,
    /// Propagate solved equations using an attractor.
    PropagateSolvedUsingAttractor = 3,
    /// Detect winning loops.
    DetectWinningLoops = 4,
    /// Solve subgames using a fatal attractor (local version).
    SolveSubgamesUsingFatalAttractorLocal = 5,
    /// Solve subgames using a fatal attractor (original version).
    SolveSubgamesUsingFatalAttractorOriginal = 6,
    /// Solve subgames using the full solver.
    SolveSubgamesUsingSolver = 7,
    /// Detect winning loops, original version. Single-threaded only and
    /// incompatible with counter example generation.
    DetectWinningLoopsOriginal = 8,
}

impl TryFrom<u32> for Optimisation {
    type Error = SolveError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Optimisation::None),
            1 => Ok(Optimisation::RemoveSelfLoops),
            2 => Ok(Optimisation::PropagateSolvedUsingSubstitution),
            3 => Ok(Optimisation::PropagateSolvedUsingAttractor),
            4 => Ok(Optimisation::DetectWinningLoops),
            5 => Ok(Optimisation::SolveSubgamesUsingFatalAttractorLocal),
            6 => Ok(Optimisation::SolveSubgamesUsingFatalAttractorOriginal),
            7 => Ok(Optimisation::SolveSubgamesUsingSolver),
            8 => Ok(Optimisation::DetectWinningLoopsOriginal),
            _ => Err(SolveError::InvalidOptimisation(format!(
                "strategy {value} is outside the valid range 0..8"
            ))),
        }
    }
}

impl fmt::Display for Optimisation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

/// Options of the instantiation algorithms and the solve driver.
#[derive(Clone, Debug)]
pub struct SolveOptions {
    pub search_strategy: SearchStrategy,
    pub optimisation: Optimisation,

    /// Move constant expressions into a substitution before instantiating.
    pub replace_constants_by_variables: bool,

    /// Prune the todo list periodically.
    pub prune_todo_list: bool,

    /// Apply the periodic partial solvers at every iteration.
    pub aggressive: bool,

    /// Run the naive instantiation for a PBES with counter example
    /// information.
    pub naive_counter_example_instantiation: bool,

    /// Do a sanity check on the computed strategy.
    pub check_strategy: bool,

    pub number_of_threads: usize,

    /// Abort when more BES equations are generated.
    pub equation_limit: Option<usize>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            search_strategy: SearchStrategy::default(),
            optimisation: Optimisation::default(),
            replace_constants_by_variables: true,
            prune_todo_list: false,
            aggressive: false,
            naive_counter_example_instantiation: false,
            check_strategy: false,
            number_of_threads: 1,
            equation_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimisation_levels_are_ordered() {
        assert!(Optimisation::RemoveSelfLoops < Optimisation::DetectWinningLoops);
        assert_eq!(Optimisation::try_from(7).unwrap(), Optimisation::SolveSubgamesUsingSolver);
        assert!(Optimisation::try_from(9).is_err());
    }
}
