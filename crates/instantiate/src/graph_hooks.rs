use peso_game::GraphError;
use peso_game::StructureGraphBuilder;
use peso_game::VertexIndex;
use peso_pbes::FixpointSymbol;
use peso_pbes::PbesExpression;
use peso_pbes::PropVarInstantiation;
use peso_pbes::split_and;
use peso_pbes::split_or;

use crate::InstantiationHooks;
use crate::Optimisation;
use crate::SharedState;
use crate::SolveError;
use crate::remove_self_loops;

/// The structure graph overlay of the lazy algorithm: every reported
/// equation extends the graph under construction.
pub struct StructureGraphHooks {
    builder: StructureGraphBuilder,
    optimisation: Optimisation,
}

impl StructureGraphHooks {
    pub fn new(optimisation: Optimisation) -> Self {
        Self {
            builder: StructureGraphBuilder::new(),
            optimisation,
        }
    }

    pub fn builder(&self) -> &StructureGraphBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut StructureGraphBuilder {
        &mut self.builder
    }

    pub fn into_builder(self) -> StructureGraphBuilder {
        self.builder
    }

    /// Extends the graph with the equation X = psi of rank k. The vertex of
    /// X receives the decoration of psi; terminal right hand sides yield no
    /// edges, a variable yields a single edge, and connectives are split
    /// into edges to their (possibly nested) subterms.
    pub fn report_equation(
        &mut self,
        x: &PropVarInstantiation,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<VertexIndex, SolveError> {
        let u = self
            .builder
            .insert_variable_with(&PbesExpression::Var(x.clone()), psi, k)?;
        match psi {
            PbesExpression::True | PbesExpression::False => {}
            PbesExpression::Var(_) => {
                let v = self.builder.insert_variable(psi)?;
                self.builder.insert_edge(u, v);
            }
            PbesExpression::And(_, _) => {
                for term in split_and(psi) {
                    let v = self.insert_subterm(term)?;
                    self.builder.insert_edge(u, v);
                }
            }
            PbesExpression::Or(_, _) => {
                for term in split_or(psi) {
                    let v = self.insert_subterm(term)?;
                    self.builder.insert_edge(u, v);
                }
            }
            _ => return Err(GraphError::UnsupportedExpression(psi.to_string()).into()),
        }
        Ok(u)
    }

    /// Interns the vertex for a subterm of a right hand side. A nested
    /// connective becomes an intermediate vertex without a rank.
    fn insert_subterm(&mut self, term: &PbesExpression) -> Result<VertexIndex, SolveError> {
        let u = self.builder.insert_vertex(term)?;
        match term {
            PbesExpression::True | PbesExpression::False | PbesExpression::Var(_) => {}
            PbesExpression::And(_, _) => {
                for subterm in split_and(term) {
                    let v = self.insert_subterm(subterm)?;
                    self.builder.insert_edge(u, v);
                }
            }
            PbesExpression::Or(_, _) => {
                for subterm in split_or(term) {
                    let v = self.insert_subterm(subterm)?;
                    self.builder.insert_edge(u, v);
                }
            }
            _ => return Err(GraphError::UnsupportedExpression(term.to_string()).into()),
        }
        Ok(u)
    }

    /// Applies the self loop substitution when it is enabled.
    pub fn apply_rewrite_psi(
        &self,
        symbol: FixpointSymbol,
        x: &PropVarInstantiation,
        psi: PbesExpression,
    ) -> PbesExpression {
        if self.optimisation >= Optimisation::RemoveSelfLoops {
            remove_self_loops(symbol, x, &psi)
        } else {
            psi
        }
    }
}

impl InstantiationHooks for StructureGraphHooks {
    fn rewrite_psi(
        &mut self,
        _state: &mut SharedState,
        symbol: FixpointSymbol,
        x: &PropVarInstantiation,
        psi: PbesExpression,
    ) -> Result<PbesExpression, SolveError> {
        Ok(self.apply_rewrite_psi(symbol, x, psi))
    }

    fn on_report_equation(
        &mut self,
        _state: &mut SharedState,
        _thread_index: usize,
        x: &PropVarInstantiation,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<(), SolveError> {
        self.report_equation(x, psi, k)?;
        Ok(())
    }

    fn on_end_while_loop(&mut self, state: &mut SharedState) -> Result<(), SolveError> {
        self.builder.set_initial_state(&state.init);
        self.builder.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use peso_game::Decoration;
    use peso_pbes::PbesExpression;

    use super::*;

    fn var(name: &str) -> PbesExpression {
        PbesExpression::Var(PropVarInstantiation::new(name, []))
    }

    #[test]
    fn test_report_terminal_equation() {
        let mut hooks = StructureGraphHooks::new(Optimisation::None);
        let x = PropVarInstantiation::new("X", []);

        let u = hooks.report_equation(&x, &PbesExpression::True, 0).unwrap();
        let graph = hooks.builder().graph();
        assert_eq!(graph.decoration(u), Decoration::True);
        assert_eq!(graph.rank(u), Some(0));
        assert!(graph.all_successors(u).is_empty());
    }

    #[test]
    fn test_report_nested_connectives() {
        // X = Y && (Z || W): the disjunction becomes an unranked
        // intermediate vertex.
        let mut hooks = StructureGraphHooks::new(Optimisation::None);
        let x = PropVarInstantiation::new("X", []);
        let psi = PbesExpression::and(var("Y"), PbesExpression::or(var("Z"), var("W")));

        let u = hooks.report_equation(&x, &psi, 1).unwrap();
        let graph = hooks.builder().graph();
        assert_eq!(graph.decoration(u), Decoration::Conjunction);
        assert_eq!(graph.all_successors(u).len(), 2);

        let inner = hooks
            .builder()
            .find_vertex(&PbesExpression::or(var("Z"), var("W")))
            .unwrap();
        assert_eq!(graph.decoration(inner), Decoration::Disjunction);
        assert_eq!(graph.rank(inner), None);
        assert_eq!(graph.all_successors(inner).len(), 2);
    }

    #[test]
    fn test_remove_self_loops_substitutes_by_symbol() {
        let x = PropVarInstantiation::new("X", []);
        let psi = PbesExpression::or(var("X"), var("Y"));

        let nu = remove_self_loops(FixpointSymbol::Nu, &x, &psi);
        assert!(nu.is_true());

        let mu = remove_self_loops(FixpointSymbol::Mu, &x, &psi);
        assert_eq!(mu, var("Y"));
    }
}
