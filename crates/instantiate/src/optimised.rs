use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use peso_game::Decoration;
use peso_game::Player;
use peso_game::StrategyVector;
use peso_game::StructureGraphBuilder;
use peso_game::VertexIndex;
use peso_game::VertexSet;
use peso_game::attr_default_with_tau;
use peso_game::extract_minimal_structure_graph;
use peso_game::fatal_attractors;
use peso_game::fatal_attractors_original;
use peso_game::find_loops;
use peso_game::partial_solve;
use peso_pbes::FixpointSymbol;
use peso_pbes::PbesExpression;
use peso_pbes::PropVarInstantiation;

use crate::InstantiationHooks;
use crate::Optimisation;
use crate::SharedState;
use crate::SolveError;
use crate::SolveOptions;
use crate::StructureGraphHooks;

/// A guard that fires when a count reaches its threshold, after which the
/// threshold doubles.
pub struct ComputationGuard {
    threshold: usize,
}

impl ComputationGuard {
    pub fn new(initial: usize) -> Self {
        debug_assert!(initial >= 1);
        Self { threshold: initial }
    }

    pub fn check(&mut self, count: usize) -> bool {
        let result = count >= self.threshold;
        while self.threshold <= count {
            self.threshold *= 2;
        }
        result
    }
}

/// A guard that fires every period, where the period is refreshed on firing.
pub struct PeriodicGuard {
    count: usize,
    period: usize,
}

impl Default for PeriodicGuard {
    fn default() -> Self {
        Self { count: 0, period: 100 }
    }
}

impl PeriodicGuard {
    pub fn check(&mut self, period: usize) -> bool {
        self.count += 1;
        if self.count == self.period {
            self.count = 0;
            self.period = period.max(1);
            return true;
        }
        false
    }
}

/// The result of the Rplus traversal for a subterm: the known winner under
/// the current winning sets (if any), the simplified subterm, and witness
/// subterms for either player.
pub struct RplusResult {
    pub b: Option<bool>,
    pub f: PbesExpression,
    pub g0: PbesExpression,
    pub g1: PbesExpression,
}

/// Evaluates a rewritten right hand side bottom-up against the current
/// winning sets, short-circuiting through solved subterms. Ties are broken
/// towards the first argument.
pub fn rplus(
    x: &PbesExpression,
    s: &[VertexSet; 2],
    builder: &StructureGraphBuilder,
) -> Result<RplusResult, SolveError> {
    match x {
        PbesExpression::True => Ok(RplusResult {
            b: Some(true),
            f: PbesExpression::True,
            g0: PbesExpression::True,
            g1: PbesExpression::False,
        }),
        PbesExpression::False => Ok(RplusResult {
            b: Some(false),
            f: PbesExpression::False,
            g0: PbesExpression::True,
            g1: PbesExpression::False,
        }),
        PbesExpression::Var(_) => {
            let known = builder.find_vertex(x).map(|u| {
                (
                    u.value() < s[0].extent() && s[0].contains(u),
                    u.value() < s[1].extent() && s[1].contains(u),
                )
            });
            match known {
                Some((true, _)) => Ok(RplusResult {
                    b: Some(true),
                    f: x.clone(),
                    g0: x.clone(),
                    g1: PbesExpression::False,
                }),
                Some((_, true)) => Ok(RplusResult {
                    b: Some(false),
                    f: x.clone(),
                    g0: PbesExpression::True,
                    g1: x.clone(),
                }),
                _ => Ok(RplusResult {
                    b: None,
                    f: x.clone(),
                    g0: PbesExpression::True,
                    g1: PbesExpression::False,
                }),
            }
        }
        PbesExpression::And(lhs, rhs) => {
            let r1 = rplus(lhs, s, builder)?;
            let r2 = rplus(rhs, s, builder)?;
            match (r1.b, r2.b) {
                (Some(true), Some(true)) => Ok(RplusResult {
                    b: Some(true),
                    f: PbesExpression::and(r1.f, r2.f),
                    g0: PbesExpression::and(r1.g0, r2.g0),
                    g1: PbesExpression::False,
                }),
                (Some(false), _) => Ok(RplusResult {
                    b: Some(false),
                    f: r1.f,
                    g0: PbesExpression::True,
                    g1: r1.g1,
                }),
                (_, Some(false)) => Ok(RplusResult {
                    b: Some(false),
                    f: r2.f,
                    g0: PbesExpression::True,
                    g1: r2.g1,
                }),
                _ => Ok(RplusResult {
                    b: None,
                    f: PbesExpression::and(r1.f, r2.f),
                    g0: PbesExpression::True,
                    g1: PbesExpression::False,
                }),
            }
        }
        PbesExpression::Or(lhs, rhs) => {
            let r1 = rplus(lhs, s, builder)?;
            let r2 = rplus(rhs, s, builder)?;
            match (r1.b, r2.b) {
                (Some(false), Some(false)) => Ok(RplusResult {
                    b: Some(false),
                    f: PbesExpression::or(r1.f, r2.f),
                    g0: PbesExpression::True,
                    g1: PbesExpression::or(r1.g1, r2.g1),
                }),
                (Some(true), _) => Ok(RplusResult {
                    b: Some(true),
                    f: r1.f,
                    g0: r1.g0,
                    g1: PbesExpression::False,
                }),
                (_, Some(true)) => Ok(RplusResult {
                    b: Some(true),
                    f: r2.f,
                    g0: r2.g0,
                    g1: PbesExpression::False,
                }),
                _ => Ok(RplusResult {
                    b: None,
                    f: PbesExpression::or(r1.f, r2.f),
                    g0: PbesExpression::True,
                    g1: PbesExpression::False,
                }),
            }
        }
        _ => Err(peso_game::GraphError::UnsupportedExpression(x.to_string()).into()),
    }
}

/// The optimised structure graph overlay: detects solved subterms during
/// rewriting, seeds the winning sets, runs the periodic partial solvers and
/// prunes the todo list.
pub struct OptimisedGraphHooks {
    base: StructureGraphHooks,
    options: SolveOptions,

    /// The winning sets of the two players, extended as instantiation
    /// proceeds. They never shrink.
    s: [VertexSet; 2],
    tau: [StrategyVector; 2],

    /// The Rplus verdicts per instantiation, between rewrite and report.
    pending: FxHashMap<PropVarInstantiation, Option<bool>>,

    s0_guard: ComputationGuard,
    s1_guard: ComputationGuard,
    find_loops_guard: ComputationGuard,
    fatal_attractors_guard: ComputationGuard,
    reset_guard: PeriodicGuard,
}

impl OptimisedGraphHooks {
    pub fn new(options: SolveOptions) -> Self {
        Self {
            base: StructureGraphHooks::new(options.optimisation),
            options,
            s: [VertexSet::new(0), VertexSet::new(0)],
            tau: [StrategyVector::default(), StrategyVector::default()],
            pending: FxHashMap::default(),
            s0_guard: ComputationGuard::new(64),
            s1_guard: ComputationGuard::new(64),
            find_loops_guard: ComputationGuard::new(2),
            fatal_attractors_guard: ComputationGuard::new(4),
            reset_guard: PeriodicGuard::default(),
        }
    }

    pub fn builder(&self) -> &StructureGraphBuilder {
        self.base.builder()
    }

    pub fn into_builder(self) -> StructureGraphBuilder {
        self.base.into_builder()
    }

    pub fn winning_sets(&self) -> &[VertexSet; 2] {
        &self.s
    }

    fn is_solved(&self, u: VertexIndex) -> bool {
        (u.value() < self.s[0].extent() && self.s[0].contains(u))
            || (u.value() < self.s[1].extent() && self.s[1].contains(u))
    }

    /// Maps the todo elements onto their vertices, skipping elements that
    /// have no vertex yet.
    fn todo_vertices(&self, state: &SharedState) -> Vec<VertexIndex> {
        state
            .todo
            .active()
            .iter()
            .chain(state.todo.irrelevant().iter())
            .filter_map(|x| self.base.builder().find_vertex(&PbesExpression::Var(x.clone())))
            .collect()
    }

    /// Replaces the active todo by the undiscovered instantiations that are
    /// still reachable from init through unsolved vertices; everything else
    /// becomes irrelevant. The discovery order is preserved.
    fn prune_todo_list(&mut self, state: &mut SharedState) -> Result<(), SolveError> {
        let period = (state.discovered.len().saturating_sub(state.todo.active().len())) / 2;
        if !self.reset_guard.check(period) && !self.options.aggressive && state.todo.has_active() {
            return Ok(());
        }

        let builder = self.base.builder();
        let graph = builder.graph();
        let Some(init) = builder.find_vertex(&PbesExpression::Var(state.init.clone())) else {
            return Ok(());
        };

        let mut reachable_frontier: FxHashSet<PropVarInstantiation> = FxHashSet::default();
        let mut done: FxHashSet<VertexIndex> = FxHashSet::default();
        let mut todo = vec![init];
        while let Some(u) = todo.pop() {
            if !done.insert(u) {
                continue;
            }
            let vertex = graph.vertex(u);
            if vertex.decoration == Decoration::None && vertex.successors.is_empty() {
                let y = vertex.formula.as_instantiation().ok_or_else(|| {
                    SolveError::InternalInconsistency(format!(
                        "unfinished vertex {u} does not represent an instantiation"
                    ))
                })?;
                reachable_frontier.insert(y.clone());
            } else if !self.is_solved(u) {
                for v in graph.successors(u) {
                    if !done.contains(&v) {
                        todo.push(v);
                    }
                }
            }
        }

        let mut new_active = VecDeque::new();
        for x in state.todo.irrelevant() {
            if reachable_frontier.contains(x) {
                new_active.push_back(x.clone());
            }
        }
        for x in state.todo.active() {
            if reachable_frontier.contains(x) {
                new_active.push_back(x.clone());
            }
        }
        state.todo.set_todo(new_active)?;

        debug_assert!(
            state.todo.active().iter().all(|x| {
                self.base
                    .builder()
                    .find_vertex(&PbesExpression::Var(x.clone()))
                    .map(|u| {
                        let vertex = self.base.builder().graph().vertex(u);
                        vertex.decoration == Decoration::None && vertex.successors.is_empty()
                    })
                    .unwrap_or(true)
            }),
            "The pruned todo list contains an expanded vertex"
        );
        Ok(())
    }
}

impl InstantiationHooks for OptimisedGraphHooks {
    fn rewrite_psi(
        &mut self,
        _state: &mut SharedState,
        symbol: FixpointSymbol,
        x: &PropVarInstantiation,
        psi: PbesExpression,
    ) -> Result<PbesExpression, SolveError> {
        let psi = self.base.apply_rewrite_psi(symbol, x, psi);
        let result = rplus(&psi, &self.s, self.base.builder())?;
        self.pending.insert(x.clone(), result.b);
        Ok(match result.b {
            Some(true) => result.g0,
            Some(false) => result.g1,
            None => result.f,
        })
    }

    fn on_report_equation(
        &mut self,
        state: &mut SharedState,
        _thread_index: usize,
        x: &PropVarInstantiation,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<(), SolveError> {
        let u = self.base.report_equation(x, psi, k)?;

        // The graph has just been extended, so the winning sets cover it
        // again before u is possibly inserted.
        let extent = self.base.builder().extent();
        self.s[0].resize(extent);
        self.s[1].resize(extent);

        match self.pending.remove(x).flatten() {
            Some(true) => self.s[0].insert(u),
            Some(false) => self.s[1].insert(u),
            None => {}
        }

        if self.options.optimisation == Optimisation::DetectWinningLoopsOriginal {
            find_loops(
                self.base.builder_mut().graph_mut(),
                &[u],
                &mut self.s,
                state.iteration_count,
            );
        }
        Ok(())
    }

    fn on_discovered_elements(
        &mut self,
        state: &mut SharedState,
        elements: &[PropVarInstantiation],
    ) -> Result<(), SolveError> {
        let iteration_count = state.iteration_count;

        match self.options.optimisation {
            Optimisation::PropagateSolvedUsingAttractor => {
                if self.s0_guard.check(self.s[0].len()) {
                    let graph = self.base.builder_mut().graph_mut();
                    self.s[0] = attr_default_with_tau(graph, self.s[0].clone(), Player::Even, &mut self.tau);
                }
                if self.s1_guard.check(self.s[1].len()) {
                    let graph = self.base.builder_mut().graph_mut();
                    self.s[1] = attr_default_with_tau(graph, self.s[1].clone(), Player::Odd, &mut self.tau);
                }
            }
            Optimisation::DetectWinningLoops => {
                if self.options.aggressive || self.find_loops_guard.check(iteration_count) {
                    let candidates: Vec<VertexIndex> = state
                        .discovered
                        .iter()
                        .filter_map(|x| self.base.builder().find_vertex(&PbesExpression::Var(x.clone())))
                        .collect();
                    find_loops(
                        self.base.builder_mut().graph_mut(),
                        &candidates,
                        &mut self.s,
                        iteration_count,
                    );
                }
            }
            Optimisation::SolveSubgamesUsingFatalAttractorLocal
            | Optimisation::SolveSubgamesUsingFatalAttractorOriginal
            | Optimisation::SolveSubgamesUsingSolver => {
                if self.options.aggressive || self.fatal_attractors_guard.check(iteration_count) {
                    match self.options.optimisation {
                        Optimisation::SolveSubgamesUsingFatalAttractorLocal => {
                            let graph = self.base.builder_mut().graph_mut();
                            fatal_attractors(graph, &mut self.s, &mut self.tau, iteration_count);
                        }
                        Optimisation::SolveSubgamesUsingFatalAttractorOriginal => {
                            let graph = self.base.builder_mut().graph_mut();
                            fatal_attractors_original(graph, &mut self.s, &mut self.tau, iteration_count);
                        }
                        _ => {
                            let todo_vertices = self.todo_vertices(state);
                            let graph = self.base.builder_mut().graph_mut();
                            partial_solve(graph, &todo_vertices, &mut self.s, &mut self.tau, iteration_count);
                        }
                    }
                }
            }
            _ => {}
        }

        if self.options.prune_todo_list
            && self.options.optimisation >= Optimisation::PropagateSolvedUsingSubstitution
        {
            for element in elements {
                state.todo.remove_irrelevant(element);
            }
            self.prune_todo_list(state)?;
        }
        Ok(())
    }

    fn on_end_while_loop(&mut self, state: &mut SharedState) -> Result<(), SolveError> {
        self.base.builder_mut().set_initial_state(&state.init);
        self.base.builder_mut().finalize()?;

        // Keep only the part that the recorded strategies can reach; the
        // rest of the graph cannot influence the solution.
        let init = self.base.builder().graph().initial_vertex();
        let keep = extract_minimal_structure_graph(self.base.builder().graph(), init, &self.s[0], &self.s[1]);

        let extent = self.base.builder().extent();
        let mut removed = VertexSet::new(extent);
        for u in 0..extent {
            if !keep.contains(&VertexIndex::new(u)) {
                removed.insert(VertexIndex::new(u));
            }
        }
        debug!("Erasing {} vertices after instantiation", removed.len());
        self.base.builder_mut().erase_vertices(&removed)?;
        Ok(())
    }

    fn solution_found(&self, state: &SharedState) -> bool {
        match self
            .base
            .builder()
            .find_vertex(&PbesExpression::Var(state.init.clone()))
        {
            Some(u) => self.is_solved(u),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> PbesExpression {
        PbesExpression::Var(PropVarInstantiation::new(name, []))
    }

    /// Builds winning sets where Y is won by even and Z by odd.
    fn seeded() -> (StructureGraphBuilder, [VertexSet; 2]) {
        let mut builder = StructureGraphBuilder::new();
        let y = builder.insert_variable(&var("Y")).unwrap();
        let z = builder.insert_variable(&var("Z")).unwrap();
        let mut s = [VertexSet::new(2), VertexSet::new(2)];
        s[0].insert(y);
        s[1].insert(z);
        (builder, s)
    }

    #[test]
    fn test_rplus_base_cases() {
        let (builder, s) = seeded();

        let result = rplus(&var("Y"), &s, &builder).unwrap();
        assert_eq!(result.b, Some(true));
        assert_eq!(result.g0, var("Y"));

        let result = rplus(&var("Z"), &s, &builder).unwrap();
        assert_eq!(result.b, Some(false));
        assert_eq!(result.g1, var("Z"));

        let result = rplus(&var("W"), &s, &builder).unwrap();
        assert_eq!(result.b, None);
        assert_eq!(result.f, var("W"));
    }

    #[test]
    fn test_rplus_conjunction_short_circuit() {
        let (builder, s) = seeded();

        // A false child forces the conjunction to false, with the child as
        // the witness for player 1.
        let x = PbesExpression::and(var("W"), var("Z"));
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, Some(false));
        assert_eq!(result.g1, var("Z"));

        // Two true children produce a conjunction of witnesses.
        let x = PbesExpression::and(var("Y"), PbesExpression::True);
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, Some(true));
        assert_eq!(result.g0, PbesExpression::and(var("Y"), PbesExpression::True));

        // An undetermined child leaves the conjunction undetermined.
        let x = PbesExpression::and(var("Y"), var("W"));
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, None);
    }

    #[test]
    fn test_rplus_disjunction_short_circuit() {
        let (builder, s) = seeded();

        let x = PbesExpression::or(var("W"), var("Y"));
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, Some(true));
        assert_eq!(result.g0, var("Y"));

        // Ties break towards the first argument.
        let x = PbesExpression::or(var("Y"), PbesExpression::True);
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, Some(true));
        assert_eq!(result.g0, var("Y"));

        let x = PbesExpression::or(var("Z"), var("Z"));
        let result = rplus(&x, &s, &builder).unwrap();
        assert_eq!(result.b, Some(false));
        assert_eq!(result.g1, PbesExpression::or(var("Z"), var("Z")));
    }

    #[test]
    fn test_computation_guard_doubles() {
        let mut guard = ComputationGuard::new(2);
        assert!(!guard.check(1));
        assert!(guard.check(2));
        assert!(!guard.check(3));
        assert!(guard.check(4));
        assert!(!guard.check(7));
        assert!(guard.check(8));
    }

    #[test]
    fn test_periodic_guard() {
        let mut guard = PeriodicGuard::default();
        for _ in 0..99 {
            assert!(!guard.check(10));
        }
        assert!(guard.check(3));
        assert!(!guard.check(3));
        assert!(!guard.check(3));
        assert!(guard.check(3));
    }
}
