use std::fmt::Write;

use log::info;
use log::warn;
use rustc_hash::FxHashMap;

use peso_game::StructureGraph;
use peso_game::VertexIndex;
use peso_game::VertexSet;
use peso_game::ZielonkaSolver;
use peso_game::extract_minimal_structure_graph;
use peso_game::solve_with_winning_mapping;
use peso_pbes::Pbes;
use peso_pbes::PbesExpression;
use peso_pbes::normalize;

use crate::CounterExampleHooks;
use crate::InstantiationHooks;
use crate::LazyInstantiation;
use crate::Optimisation;
use crate::OptimisedGraphHooks;
use crate::SolveError;
use crate::SolveOptions;
use crate::StructureGraphHooks;
use crate::has_counter_example_information;
use crate::remove_counterexample_info;

/// The result of solving a PBES: the verdict, the final structure graph with
/// its strategies, and the winning partition.
pub struct SolveOutcome {
    pub result: bool,
    pub graph: StructureGraph,
    pub w0: VertexSet,
    pub w1: VertexSet,
}

/// Solves the given PBES: instantiate into a structure graph, solve the
/// graph, and for a PBES with counter example information run the guided
/// second pass.
pub fn solve_pbes(pbes: &Pbes, options: &SolveOptions) -> Result<SolveOutcome, SolveError> {
    let pbes = normalize_pbes(pbes)?;
    let has_counter_example = has_counter_example_information(&pbes);
    let options = validate_options(options.clone(), has_counter_example)?;

    if !has_counter_example || options.naive_counter_example_instantiation {
        info!("Generating parity game...");
        let graph = instantiate(&pbes, &options, None)?;
        return solve_graph(graph, &options);
    }

    // First pass: solve without the counter example equations, keeping the
    // proof strategies.
    info!("Removing counter example information for the first pass");
    let reduced = remove_counterexample_info(&pbes, true, true);
    let mut first_graph = instantiate(&reduced, &options, None)?;
    let (first_result, mapping) = solve_with_winning_mapping(&mut first_graph, options.check_strategy)?;
    info!("First pass result: {first_result}");

    // Second pass: drop the markers of the player that lost and
    // re-instantiate with the first proof graph as an oracle.
    let second_pbes = remove_counterexample_info(&pbes, !first_result, first_result);
    let oracle = Oracle {
        proof_graph: &first_graph,
        alpha: !first_result,
        mapping: &mapping,
    };
    let graph = instantiate(&second_pbes, &options, Some(&oracle))?;
    let outcome = solve_graph(graph, &options)?;

    if outcome.result != first_result {
        return Err(SolveError::InternalInconsistency(
            "the result of the second instantiation does not match the first; this is a bug".to_string(),
        ));
    }
    Ok(outcome)
}

/// Renders the minimal proof graph of the outcome as the evidence report.
pub fn evidence_report(outcome: &SolveOutcome) -> String {
    let init = outcome.graph.initial_vertex();
    let keep = extract_minimal_structure_graph(&outcome.graph, init, &outcome.w0, &outcome.w1);
    let mut vertices: Vec<VertexIndex> = keep.into_iter().collect();
    vertices.sort();

    let mut report = String::new();
    writeln!(
        report,
        "% {} for the initial state {}",
        if outcome.result { "witness" } else { "counter example" },
        outcome.graph.vertex(init).formula
    )
    .expect("writing to a string does not fail");
    for u in vertices {
        writeln!(report, "{:4} {}", u.value(), outcome.graph.vertex(u))
            .expect("writing to a string does not fail");
    }
    report
}

fn normalize_pbes(pbes: &Pbes) -> Result<Pbes, SolveError> {
    let mut pbes = pbes.clone();
    for equation in pbes.equations.iter_mut() {
        equation.formula = normalize(&equation.formula)?;
    }
    Ok(pbes)
}

fn validate_options(mut options: SolveOptions, has_counter_example: bool) -> Result<SolveOptions, SolveError> {
    if options.optimisation == Optimisation::DetectWinningLoopsOriginal {
        if options.number_of_threads > 1 {
            return Err(SolveError::InvalidOptimisation(
                "the original winning loop detection does not work with multiple threads".to_string(),
            ));
        }
        if has_counter_example {
            return Err(SolveError::InvalidOptimisation(
                "the original winning loop detection cannot be used with counter example information"
                    .to_string(),
            ));
        }
    }

    if has_counter_example && options.optimisation != Optimisation::None {
        warn!("Cannot use partial solving with a PBES that has counter example information, using strategy 0 instead");
        options.optimisation = Optimisation::None;
    }
    if options.prune_todo_list && options.optimisation < Optimisation::PropagateSolvedUsingSubstitution {
        warn!("Option --prune-todo-list has no effect for strategies less than 2");
    }
    Ok(options)
}

struct Oracle<'g> {
    proof_graph: &'g StructureGraph,
    alpha: bool,
    mapping: &'g FxHashMap<PbesExpression, VertexIndex>,
}

fn instantiate(
    pbes: &Pbes,
    options: &SolveOptions,
    oracle: Option<&Oracle>,
) -> Result<StructureGraph, SolveError> {
    if options.optimisation <= Optimisation::RemoveSelfLoops {
        let hooks = StructureGraphHooks::new(options.optimisation);
        match oracle {
            Some(oracle) => {
                let hooks = CounterExampleHooks::new(hooks, oracle.proof_graph, oracle.alpha, oracle.mapping);
                let hooks = run_instantiation(options, pbes, hooks)?;
                Ok(hooks.into_inner().into_builder().into_graph())
            }
            None => {
                let hooks = run_instantiation(options, pbes, hooks)?;
                Ok(hooks.into_builder().into_graph())
            }
        }
    } else {
        let hooks = OptimisedGraphHooks::new(options.clone());
        match oracle {
            Some(oracle) => {
                let hooks = CounterExampleHooks::new(hooks, oracle.proof_graph, oracle.alpha, oracle.mapping);
                let hooks = run_instantiation(options, pbes, hooks)?;
                Ok(hooks.into_inner().into_builder().into_graph())
            }
            None => {
                let hooks = run_instantiation(options, pbes, hooks)?;
                Ok(hooks.into_builder().into_graph())
            }
        }
    }
}

fn run_instantiation<H: InstantiationHooks + Send>(
    options: &SolveOptions,
    pbes: &Pbes,
    hooks: H,
) -> Result<H, SolveError> {
    let mut algorithm = LazyInstantiation::new(options.clone(), pbes.clone(), hooks)?;
    algorithm.run()?;
    Ok(algorithm.into_hooks())
}

fn solve_graph(mut graph: StructureGraph, options: &SolveOptions) -> Result<SolveOutcome, SolveError> {
    let mut solver = ZielonkaSolver::new(options.check_strategy, false);
    let (w0, w1) = solver.solve(&mut graph)?;
    let result = w0.contains(graph.initial_vertex());
    Ok(SolveOutcome { result, graph, w0, w1 })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use peso_pbes::parse_pbes;

    use super::*;

    fn solve(text: &str, options: &SolveOptions) -> SolveOutcome {
        let pbes = parse_pbes(text).unwrap();
        solve_pbes(&pbes, options).unwrap()
    }

    fn options_with(optimisation: Optimisation) -> SolveOptions {
        SolveOptions {
            optimisation,
            check_strategy: true,
            ..SolveOptions::default()
        }
    }

    const SCENARIOS: [(&str, bool); 5] = [
        ("pbes nu X = X; init X;", true),
        ("pbes mu X = X; init X;", false),
        ("pbes nu X(n: Nat) = val(n < 10) => X(n + 1); init X(0);", true),
        ("pbes nu X = Y && X; mu Y = X || Y; init X;", true),
        (
            "pbes nu X(b: Bool) = forall c: Bool. X(if(c, !c, c)); init X(true);",
            true,
        ),
    ];

    #[test_log::test]
    fn test_scenarios_across_all_optimisations() {
        for optimisation in 0..=8u32 {
            let options = options_with(Optimisation::try_from(optimisation).unwrap());
            for (text, expected) in SCENARIOS {
                let outcome = solve(text, &options);
                assert_eq!(
                    outcome.result, expected,
                    "wrong verdict for {text} at optimisation {optimisation}"
                );
            }
        }
    }

    #[test_log::test]
    fn test_counting_scenario_has_eleven_vertices() {
        let outcome = solve(SCENARIOS[2].0, &options_with(Optimisation::None));
        assert_eq!(outcome.graph.iter_vertices().count(), 11);
        for u in outcome.graph.iter_vertices() {
            assert!(outcome.w0.contains(u));
        }
    }

    #[test_log::test]
    fn test_alternation_scenario_strategies() {
        let outcome = solve(SCENARIOS[3].0, &options_with(Optimisation::None));
        assert!(outcome.result);
        assert!(outcome.w1.is_empty());
    }

    #[test_log::test]
    fn test_boolean_parameter_scenario_has_two_vertices() {
        for optimisation in [Optimisation::None, Optimisation::RemoveSelfLoops] {
            let outcome = solve(SCENARIOS[4].0, &options_with(optimisation));
            assert_eq!(outcome.graph.iter_vertices().count(), 2);
        }
    }

    #[test_log::test]
    fn test_depth_first_and_threads_agree() {
        for (text, expected) in SCENARIOS {
            let options = SolveOptions {
                search_strategy: crate::SearchStrategy::DepthFirst,
                number_of_threads: 3,
                ..SolveOptions::default()
            };
            assert_eq!(solve(text, &options).result, expected, "wrong verdict for {text}");
        }
    }

    #[test_log::test]
    fn test_prune_todo_list_and_aggressive() {
        let text = indoc! {"
            pbes
              nu X(n: Nat) = val(n == 8) || (val(n < 8) && X(n + 1) && Y(n));
              mu Y(n: Nat) = val(n >= 4) || Y(n + 1);
            init X(0);
        "};
        let reference = solve(text, &options_with(Optimisation::None)).result;

        for optimisation in 2..=7u32 {
            let options = SolveOptions {
                optimisation: Optimisation::try_from(optimisation).unwrap(),
                prune_todo_list: true,
                aggressive: true,
                ..SolveOptions::default()
            };
            assert_eq!(
                solve(text, &options).result,
                reference,
                "wrong verdict at optimisation {optimisation}"
            );
        }
    }

    #[test_log::test]
    fn test_equation_limit_is_enforced() {
        let pbes = parse_pbes(SCENARIOS[2].0).unwrap();
        let options = SolveOptions {
            equation_limit: Some(5),
            ..SolveOptions::default()
        };
        assert!(matches!(
            solve_pbes(&pbes, &options),
            Err(SolveError::EquationLimitExceeded(5))
        ));
    }

    const COUNTER_EXAMPLE_PBES: &str = indoc! {"
        pbes
          nu X = Y && Zpos_0_X;
          mu Y = X || Zneg_0_Y;
          nu Zpos_0_X = true;
          mu Zneg_0_Y = false;
        init X;
    "};

    #[test_log::test]
    fn test_counter_example_two_pass() {
        let pbes = parse_pbes(COUNTER_EXAMPLE_PBES).unwrap();
        let outcome = solve_pbes(&pbes, &SolveOptions::default()).unwrap();
        assert!(outcome.result);

        // The evidence contains the witness equations of the winning player.
        let report = evidence_report(&outcome);
        assert!(report.contains("witness"));
        assert!(report.contains("Zpos_0_X"));
        assert!(!report.contains("Zneg_0_Y"));
    }

    #[test_log::test]
    fn test_counter_example_naive_agrees() {
        let pbes = parse_pbes(COUNTER_EXAMPLE_PBES).unwrap();
        let options = SolveOptions {
            naive_counter_example_instantiation: true,
            ..SolveOptions::default()
        };
        assert!(solve_pbes(&pbes, &options).unwrap().result);
    }

    #[test_log::test]
    fn test_invalid_optimisation_combinations() {
        let pbes = parse_pbes(COUNTER_EXAMPLE_PBES).unwrap();
        let options = SolveOptions {
            optimisation: Optimisation::DetectWinningLoopsOriginal,
            ..SolveOptions::default()
        };
        assert!(matches!(
            solve_pbes(&pbes, &options),
            Err(SolveError::InvalidOptimisation(_))
        ));

        let simple = parse_pbes("pbes nu X = X; init X;").unwrap();
        let options = SolveOptions {
            optimisation: Optimisation::DetectWinningLoopsOriginal,
            number_of_threads: 2,
            ..SolveOptions::default()
        };
        assert!(matches!(
            solve_pbes(&simple, &options),
            Err(SolveError::InvalidOptimisation(_))
        ));
    }

    #[test_log::test]
    fn test_idempotence_of_the_pipeline() {
        for (text, expected) in SCENARIOS {
            let options = options_with(Optimisation::PropagateSolvedUsingAttractor);
            let first = solve(text, &options);
            let second = solve(text, &options);
            assert_eq!(first.result, expected);
            assert_eq!(first.graph.iter_vertices().count(), second.graph.iter_vertices().count());
        }
    }
}
