use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use peso_game::Decoration;
use peso_game::StructureGraph;
use peso_game::VertexIndex;
use peso_pbes::FixpointSymbol;
use peso_pbes::Pbes;
use peso_pbes::PbesEquation;
use peso_pbes::PbesExpression;
use peso_pbes::PropVarInstantiation;
use peso_pbes::replace_propositional_variables;
use peso_pbes::simplify;

use crate::InstantiationHooks;
use crate::SharedState;
use crate::SolveError;

static POSITIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Zpos_(\d+)_.*").expect("the marker pattern is valid"));
static NEGATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Zneg_(\d+)_.*").expect("the marker pattern is valid"));

/// Returns true iff the name is a positive counter example marker.
pub fn is_positive_marker(name: &str) -> bool {
    POSITIVE.is_match(name)
}

/// Returns true iff the name is a negative counter example marker.
pub fn is_negative_marker(name: &str) -> bool {
    NEGATIVE.is_match(name)
}

/// Guesses whether the PBES carries counter example information: equations
/// whose variables match `Zpos_<n>_...` or `Zneg_<n>_...`.
pub fn has_counter_example_information(pbes: &Pbes) -> bool {
    pbes.equations
        .iter()
        .any(|eqn| is_positive_marker(&eqn.variable.name) || is_negative_marker(&eqn.variable.name))
}

/// Removes the counter example marker equations of the selected kinds and
/// substitutes their variables by true (positive) and false (negative) in
/// the remaining equations.
pub fn remove_counterexample_info(pbes: &Pbes, remove_positive: bool, remove_negative: bool) -> Pbes {
    let mut equations = Vec::new();

    for equation in &pbes.equations {
        let positive = is_positive_marker(&equation.variable.name);
        let negative = is_negative_marker(&equation.variable.name);

        if !positive && !negative {
            let formula = replace_propositional_variables(&equation.formula, &mut |y| {
                if remove_positive && is_positive_marker(&y.name) {
                    PbesExpression::True
                } else if remove_negative && is_negative_marker(&y.name) {
                    PbesExpression::False
                } else {
                    PbesExpression::Var(y.clone())
                }
            });
            equations.push(PbesEquation {
                symbol: equation.symbol,
                variable: equation.variable.clone(),
                formula: simplify(&formula),
            });
        } else if (positive && !remove_positive) || (negative && !remove_negative) {
            equations.push(equation.clone());
        }
    }

    Pbes {
        globals: pbes.globals.clone(),
        equations,
        initial_state: pbes.initial_state.clone(),
    }
}

/// Replaces the propositional variables in psi that are unreachable in the
/// proof graph under the winning player's strategy. Reachability follows the
/// strategy edge at the winner's choice points and every edge elsewhere,
/// passing through unranked vertices.
pub fn rewrite_star(
    psi: &PbesExpression,
    x: &PropVarInstantiation,
    proof_graph: &StructureGraph,
    alpha: bool,
    mapping: &FxHashMap<PbesExpression, VertexIndex>,
) -> Result<PbesExpression, SolveError> {
    debug!("X = {}, psi = {}", x, psi);

    // Collect the ranked instantiations reachable from X in the proof graph.
    let mut reachable: FxHashSet<PbesExpression> = FxHashSet::default();
    if let Some(&index) = mapping.get(&PbesExpression::Var(x.clone())) {
        let mut todo = vec![index];
        let mut done: FxHashSet<VertexIndex> = FxHashSet::default();

        while let Some(u) = todo.pop() {
            if !done.insert(u) {
                continue;
            }

            let mut visit = |v: VertexIndex, todo: &mut Vec<VertexIndex>, reachable: &mut FxHashSet<PbesExpression>| {
                if proof_graph.rank(v).is_none() {
                    if !done.contains(&v) {
                        todo.push(v);
                    }
                } else if mapping.contains_key(&proof_graph.vertex(v).formula) {
                    reachable.insert(proof_graph.vertex(v).formula.clone());
                }
            };

            let won_by_alpha = mapping.contains_key(&proof_graph.vertex(u).formula);
            let strategy_only = won_by_alpha
                && proof_graph.strategy(u).is_some()
                && ((!alpha && proof_graph.decoration(u) == Decoration::Disjunction)
                    || (alpha && proof_graph.decoration(u) == Decoration::Conjunction));

            if strategy_only {
                let v = proof_graph.strategy(u).expect("the strategy is defined");
                visit(v, &mut todo, &mut reachable);
            } else {
                for &v in proof_graph.all_successors(u) {
                    visit(v, &mut todo, &mut reachable);
                }
            }
        }
    }

    let mut inconsistent = None;
    let mut changed = false;
    let result = replace_propositional_variables(psi, &mut |y| {
        if is_positive_marker(&y.name) || is_negative_marker(&y.name) {
            // Marker equations carry the evidence and are always kept.
            PbesExpression::Var(y.clone())
        } else {
            let y_expression = PbesExpression::Var(y.clone());
            if reachable.contains(&y_expression) {
                if !mapping.contains_key(&y_expression) {
                    inconsistent = Some(y.clone());
                }
                y_expression
            } else {
                changed = true;
                if alpha {
                    PbesExpression::True
                } else {
                    PbesExpression::False
                }
            }
        }
    });

    if let Some(y) = inconsistent {
        return Err(SolveError::InternalInconsistency(format!(
            "cannot find vertex {y} in the first structure graph; the specification cannot be \
             consistently instantiated twice"
        )));
    }

    Ok(if changed { simplify(&result) } else { result })
}

/// Wraps another overlay and applies the proof graph oracle to every right
/// hand side before delegating.
pub struct CounterExampleHooks<'g, H> {
    hooks: H,
    proof_graph: &'g StructureGraph,
    alpha: bool,
    mapping: &'g FxHashMap<PbesExpression, VertexIndex>,
}

impl<'g, H> CounterExampleHooks<'g, H> {
    pub fn new(
        hooks: H,
        proof_graph: &'g StructureGraph,
        alpha: bool,
        mapping: &'g FxHashMap<PbesExpression, VertexIndex>,
    ) -> Self {
        Self {
            hooks,
            proof_graph,
            alpha,
            mapping,
        }
    }

    pub fn inner(&self) -> &H {
        &self.hooks
    }

    pub fn into_inner(self) -> H {
        self.hooks
    }
}

impl<H: InstantiationHooks> InstantiationHooks for CounterExampleHooks<'_, H> {
    fn rewrite_psi(
        &mut self,
        state: &mut SharedState,
        symbol: FixpointSymbol,
        x: &PropVarInstantiation,
        psi: PbesExpression,
    ) -> Result<PbesExpression, SolveError> {
        let starred = rewrite_star(&psi, x, self.proof_graph, self.alpha, self.mapping)?;
        self.hooks.rewrite_psi(state, symbol, x, starred)
    }

    fn on_report_equation(
        &mut self,
        state: &mut SharedState,
        thread_index: usize,
        x: &PropVarInstantiation,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<(), SolveError> {
        self.hooks.on_report_equation(state, thread_index, x, psi, k)
    }

    fn on_discovered_elements(
        &mut self,
        state: &mut SharedState,
        elements: &[PropVarInstantiation],
    ) -> Result<(), SolveError> {
        self.hooks.on_discovered_elements(state, elements)
    }

    fn on_end_while_loop(&mut self, state: &mut SharedState) -> Result<(), SolveError> {
        self.hooks.on_end_while_loop(state)
    }

    fn solution_found(&self, state: &SharedState) -> bool {
        self.hooks.solution_found(state)
    }
}

#[cfg(test)]
mod tests {
    use peso_pbes::parse_pbes;

    use super::*;

    #[test]
    fn test_marker_detection() {
        assert!(is_positive_marker("Zpos_0_X"));
        assert!(is_negative_marker("Zneg_12_err"));
        assert!(!is_positive_marker("Zpos"));
        assert!(!is_positive_marker("X"));
        assert!(!is_negative_marker("Zneg_x_y"));
    }

    #[test]
    fn test_remove_counterexample_info() {
        let pbes = parse_pbes(
            "pbes
               nu X = X && Zpos_0_X && Y;
               mu Y = Y || Zneg_0_Y;
               nu Zpos_0_X = Zpos_0_X;
               mu Zneg_0_Y = Zneg_0_Y;
             init X;",
        )
        .unwrap();
        assert!(has_counter_example_information(&pbes));

        let reduced = remove_counterexample_info(&pbes, true, true);
        assert_eq!(reduced.equations.len(), 2);
        assert_eq!(reduced.equations[0].formula.to_string(), "X && Y");
        assert_eq!(reduced.equations[1].formula.to_string(), "Y");
        assert!(!has_counter_example_information(&reduced));

        // Keeping the positive markers only removes the negative side.
        let partial = remove_counterexample_info(&pbes, false, true);
        assert_eq!(partial.equations.len(), 3);
        assert_eq!(partial.equations[0].formula.to_string(), "(X && Zpos_0_X) && Y");
    }
}
