use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use log::info;
use parking_lot::Mutex;

use peso_pbes::EnumerateQuantifiersRewriter;
use peso_pbes::EquationIndex;
use peso_pbes::FixpointSymbol;
use peso_pbes::Pbes;
use peso_pbes::PbesExpression;
use peso_pbes::PropVarInstantiation;
use peso_pbes::Substitution;
use peso_pbes::assign_parameters;
use peso_pbes::find_propositional_variable_instantiations;
use peso_pbes::instantiate_global_variables;
use peso_pbes::one_point_rule;
use peso_pbes::order_quantified_variables;
use peso_pbes::remove_parameters;
use peso_pbes::replace_constants_by_variables;
use peso_pbes::replace_propositional_variables;
use peso_pbes::simplify;

use crate::DiscoveredSet;
use crate::SolveError;
use crate::SolveOptions;
use crate::Todo;

/// The state shared between the workers, only accessed under the todo lock.
pub struct SharedState {
    pub todo: Todo,
    pub discovered: DiscoveredSet,
    pub init: PropVarInstantiation,
    pub iteration_count: usize,
}

/// The capability set through which instantiation reports its progress. The
/// structure graph overlays implement this trait; wrappers compose by
/// forwarding.
pub trait InstantiationHooks {
    /// May replace the rewritten right hand side before it is reported.
    fn rewrite_psi(
        &mut self,
        state: &mut SharedState,
        symbol: FixpointSymbol,
        x: &PropVarInstantiation,
        psi: PbesExpression,
    ) -> Result<PbesExpression, SolveError> {
        let _ = (state, symbol, x);
        Ok(psi)
    }

    /// Called for every generated equation X = psi with rank k.
    fn on_report_equation(
        &mut self,
        state: &mut SharedState,
        thread_index: usize,
        x: &PropVarInstantiation,
        psi: &PbesExpression,
        k: usize,
    ) -> Result<(), SolveError>;

    /// Called after new elements have been added to the discovered set.
    fn on_discovered_elements(
        &mut self,
        state: &mut SharedState,
        elements: &[PropVarInstantiation],
    ) -> Result<(), SolveError> {
        let _ = (state, elements);
        Ok(())
    }

    /// Called right after the worker loop has finished.
    fn on_end_while_loop(&mut self, state: &mut SharedState) -> Result<(), SolveError> {
        let _ = state;
        Ok(())
    }

    /// Returns true when the initial instantiation has been determined, so
    /// that no further instantiation is needed.
    fn solution_found(&self, state: &SharedState) -> bool {
        let _ = state;
        false
    }
}

/// Replaces occurrences of X in its own right hand side by false for a μ
/// equation and by true for a ν equation, removing self loops before they
/// become graph edges.
pub fn remove_self_loops(
    symbol: FixpointSymbol,
    x: &PropVarInstantiation,
    psi: &PbesExpression,
) -> PbesExpression {
    let mut changed = false;
    let result = replace_propositional_variables(psi, &mut |y| {
        if y == x {
            changed = true;
            if symbol.is_mu() {
                PbesExpression::False
            } else {
                PbesExpression::True
            }
        } else {
            PbesExpression::Var(y.clone())
        }
    });

    if changed { simplify(&result) } else { result }
}

struct Inner<'a, H> {
    state: SharedState,
    hooks: &'a mut H,
}

/// The lazy instantiation algorithm: a worker pool that dequeues
/// instantiations, rewrites their right hand sides and reports the resulting
/// equations through the hooks, until the todo list is empty or the hooks
/// report that the initial vertex has been determined.
pub struct LazyInstantiation<H> {
    options: SolveOptions,
    pbes: Pbes,
    equation_index: EquationIndex,
    rewriter: EnumerateQuantifiersRewriter,
    hooks: H,
}

impl<H: InstantiationHooks + Send> LazyInstantiation<H> {
    /// Creates the algorithm for the given normalised PBES. Global variables
    /// are instantiated and every right hand side is simplified once.
    pub fn new(options: SolveOptions, pbes: Pbes, hooks: H) -> Result<Self, SolveError> {
        let mut pbes = pbes;
        instantiate_global_variables(&mut pbes);
        for equation in pbes.equations.iter_mut() {
            equation.formula = order_quantified_variables(&one_point_rule(&simplify(&equation.formula)));
        }

        let equation_index = EquationIndex::new(&pbes);
        if equation_index.position(&pbes.initial_state.name).is_none() {
            return Err(SolveError::UndefinedVariable(pbes.initial_state.name.clone()));
        }

        Ok(Self {
            options,
            pbes,
            equation_index,
            rewriter: EnumerateQuantifiersRewriter::new(),
            hooks,
        })
    }

    pub fn equation_index(&self) -> &EquationIndex {
        &self.equation_index
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Consumes the algorithm and returns the hooks with their results.
    pub fn into_hooks(self) -> H {
        self.hooks
    }

    /// Runs the instantiation.
    pub fn run(&mut self) -> Result<(), SolveError> {
        let mut sigma = Substitution::default();
        if self.options.replace_constants_by_variables {
            replace_constants_by_variables(&mut self.pbes, &mut sigma);
        }

        // Rewrite the initial state to obtain the initial instantiation.
        let init_expression = self
            .rewriter
            .rewrite(&PbesExpression::Var(self.pbes.initial_state.clone()), &mut sigma)?;
        let init = match init_expression {
            PbesExpression::Var(init) => init,
            other => {
                return Err(SolveError::InternalInconsistency(format!(
                    "the initial state rewrote to {other} instead of an instantiation"
                )));
            }
        };

        let mut state = SharedState {
            todo: Todo::default(),
            discovered: DiscoveredSet::default(),
            init: init.clone(),
            iteration_count: 0,
        };
        state.todo.insert(init.clone());
        state.discovered.insert(init);

        let number_of_threads = self.options.number_of_threads.max(1);
        let inner = Mutex::new(Inner {
            state,
            hooks: &mut self.hooks,
        });
        let active_workers = AtomicUsize::new(number_of_threads);
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<SolveError>> = Mutex::new(None);

        let worker = |thread_index: usize, mut sigma: Substitution, rewriter: EnumerateQuantifiersRewriter| {
            let result = worker_loop(
                thread_index,
                &self.options,
                &self.pbes,
                &self.equation_index,
                &rewriter,
                &mut sigma,
                &inner,
                &active_workers,
                &abort,
            );
            if let Err(error) = result {
                let mut slot = first_error.lock();
                if slot.is_none() {
                    *slot = Some(error);
                }
                abort.store(true, Ordering::SeqCst);
                // The failed worker bailed out of the drain protocol and is
                // still counted, so its peers would otherwise wait for it.
                active_workers.fetch_sub(1, Ordering::SeqCst);
            }
        };

        if number_of_threads == 1 {
            // Run in the caller thread, without cloning the rewriter state.
            worker(0, sigma, self.rewriter.clone());
        } else {
            std::thread::scope(|scope| {
                for thread_index in 1..=number_of_threads {
                    let sigma = sigma.clone();
                    let rewriter = self.rewriter.clone();
                    let worker = &worker;
                    scope.spawn(move || worker(thread_index, sigma, rewriter));
                }
            });
        }

        let end_result = {
            let mut guard = inner.lock();
            let Inner { state, hooks } = &mut *guard;
            let end_result = hooks.on_end_while_loop(state);
            info!("Generated {} BES equations", state.iteration_count);
            end_result
        };

        // A worker error takes precedence over a failing final hook.
        match first_error.into_inner() {
            Some(error) => Err(error),
            None => end_result,
        }
    }
}

/// The loop of a single worker. Workers keep draining the todo list until
/// every worker has run out of work or the hooks found a solution.
#[allow(clippy::too_many_arguments)]
fn worker_loop<H: InstantiationHooks>(
    thread_index: usize,
    options: &SolveOptions,
    pbes: &Pbes,
    equation_index: &EquationIndex,
    rewriter: &EnumerateQuantifiersRewriter,
    sigma: &mut Substitution,
    inner: &Mutex<Inner<H>>,
    active_workers: &AtomicUsize,
    abort: &AtomicBool,
) -> Result<(), SolveError> {
    if options.number_of_threads > 1 {
        debug!("Start thread {thread_index}");
    }

    while active_workers.load(Ordering::SeqCst) > 0 {
        let mut guard = inner.lock();
        loop {
            {
                let Inner { state, hooks } = &mut *guard;
                if !state.todo.has_active() || abort.load(Ordering::SeqCst) || hooks.solution_found(state) {
                    break;
                }
            }

            guard.state.iteration_count += 1;
            let iteration_count = guard.state.iteration_count;
            if iteration_count % 1000 == 0 {
                info!("Generated {iteration_count} BES equations");
            }
            if let Some(limit) = options.equation_limit {
                if iteration_count > limit {
                    return Err(SolveError::EquationLimitExceeded(limit));
                }
            }

            let x = guard
                .state
                .todo
                .next(options.search_strategy)
                .expect("the todo list has an active element");
            drop(guard);

            // Rewrite the right hand side of the equation for X outside the
            // lock; only the rewriter-local substitution is touched.
            let position = equation_index
                .position(&x.name)
                .ok_or_else(|| SolveError::UndefinedVariable(x.name.clone()))?;
            let equation = &pbes.equations[position];
            assign_parameters(sigma, &equation.variable.parameters, &x.parameters)?;
            let psi = rewriter.rewrite(&equation.formula, sigma);
            remove_parameters(sigma, &equation.variable.parameters);
            let psi = psi?;
            let k = equation_index.rank(&x.name).expect("the equation is indexed");

            guard = inner.lock();
            let psi = {
                let Inner { state, hooks } = &mut *guard;
                hooks.rewrite_psi(state, equation.symbol, &x, psi)?
            };
            drop(guard);

            let occurrences = find_propositional_variable_instantiations(&psi);

            guard = inner.lock();
            {
                let Inner { state, hooks } = &mut *guard;
                debug!("generated equation {} = {} with rank {}", x, psi, k);
                hooks.on_report_equation(state, thread_index, &x, &psi, k)?;
                state
                    .todo
                    .insert_discovered(occurrences.iter().cloned(), &state.discovered);
                for y in &occurrences {
                    state.discovered.insert(y.clone());
                }
                hooks.on_discovered_elements(state, &occurrences)?;
            }
        }
        drop(guard);

        // Check whether all workers are ready. If so the number of active
        // workers becomes 0. Otherwise this worker becomes active again and
        // tries to take up more work.
        active_workers.fetch_sub(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(10));
        if active_workers.load(Ordering::SeqCst) > 0 {
            active_workers.fetch_add(1, Ordering::SeqCst);
        }
    }

    if options.number_of_threads > 1 {
        debug!("Stop thread {thread_index}");
    }
    Ok(())
}
