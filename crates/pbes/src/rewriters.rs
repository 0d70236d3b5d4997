use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::DataExpression;
use crate::DataOp;
use crate::DataVariable;
use crate::Pbes;
use crate::PbesExpression;
use crate::PropVarInstantiation;
use crate::Sort;
use crate::Substitution;
use crate::Value;

/// Errors raised while rewriting PBES expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("unsupported expression {0} encountered during rewriting")]
    UnsupportedExpression(String),

    #[error("undefined data variable {0}")]
    UndefinedVariable(String),

    #[error("cannot enumerate quantified variable {variable} of infinite sort {sort}")]
    CannotEnumerate { variable: String, sort: Sort },

    #[error("sort mismatch in {0}")]
    SortMismatch(String),
}

/// Evaluates a data expression under the given substitution to a value.
pub fn evaluate(expression: &DataExpression, sigma: &Substitution) -> Result<Value, RewriteError> {
    match expression {
        DataExpression::Bool(b) => Ok(Value::Bool(*b)),
        DataExpression::Nat(n) => Ok(Value::Nat(*n)),
        DataExpression::Variable(v) => sigma
            .get(&v.name)
            .ok_or_else(|| RewriteError::UndefinedVariable(v.name.clone())),
        DataExpression::Not(e) => match evaluate(e, sigma)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Nat(_) => Err(RewriteError::SortMismatch(expression.to_string())),
        },
        DataExpression::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, sigma)?;
            let rhs = evaluate(rhs, sigma)?;
            apply_operator(*op, lhs, rhs).ok_or_else(|| RewriteError::SortMismatch(expression.to_string()))
        }
        DataExpression::If(condition, then, otherwise) => match evaluate(condition, sigma)? {
            Value::Bool(true) => evaluate(then, sigma),
            Value::Bool(false) => evaluate(otherwise, sigma),
            Value::Nat(_) => Err(RewriteError::SortMismatch(expression.to_string())),
        },
    }
}

fn apply_operator(op: DataOp, lhs: Value, rhs: Value) -> Option<Value> {
    use Value::Bool;
    use Value::Nat;

    let result = match (op, lhs, rhs) {
        (DataOp::And, Bool(p), Bool(q)) => Bool(p && q),
        (DataOp::Or, Bool(p), Bool(q)) => Bool(p || q),
        (DataOp::Imp, Bool(p), Bool(q)) => Bool(!p || q),
        (DataOp::Eq, p, q) if p.sort() == q.sort() => Bool(p == q),
        (DataOp::Neq, p, q) if p.sort() == q.sort() => Bool(p != q),
        (DataOp::Lt, Nat(m), Nat(n)) => Bool(m < n),
        (DataOp::Le, Nat(m), Nat(n)) => Bool(m <= n),
        (DataOp::Gt, Nat(m), Nat(n)) => Bool(m > n),
        (DataOp::Ge, Nat(m), Nat(n)) => Bool(m >= n),
        (DataOp::Add, Nat(m), Nat(n)) => Nat(m + n),
        // Subtraction on Nat is cut-off subtraction.
        (DataOp::Sub, Nat(m), Nat(n)) => Nat(m.saturating_sub(n)),
        (DataOp::Mul, Nat(m), Nat(n)) => Nat(m * n),
        _ => return None,
    };
    Some(result)
}

/// Assigns the equation parameters to the given (literal) arguments.
pub fn assign_parameters(
    sigma: &mut Substitution,
    parameters: &[DataVariable],
    arguments: &[DataExpression],
) -> Result<(), RewriteError> {
    debug_assert_eq!(parameters.len(), arguments.len(), "Arity mismatch in instantiation");

    for (parameter, argument) in parameters.iter().zip(arguments.iter()) {
        let value = match Value::from_literal(argument) {
            Some(value) => value,
            None => evaluate(argument, sigma)?,
        };
        sigma.bind(parameter.name.clone(), value);
    }
    Ok(())
}

/// Removes the bindings for the given parameters again.
pub fn remove_parameters(sigma: &mut Substitution, parameters: &[DataVariable]) {
    for parameter in parameters {
        sigma.unbind(&parameter.name);
    }
}

/// The quantifier enumerating rewriter R. Given a normalised PBES expression
/// and a substitution that binds all its free data variables, it evaluates
/// the data leaves, expands the quantifiers over enumerable sorts and returns
/// an expression over true, false, ∧, ∨ and ground propositional variable
/// instantiations.
#[derive(Clone, Debug, Default)]
pub struct EnumerateQuantifiersRewriter;

impl EnumerateQuantifiersRewriter {
    pub fn new() -> Self {
        Self
    }

    pub fn rewrite(
        &self,
        expression: &PbesExpression,
        sigma: &mut Substitution,
    ) -> Result<PbesExpression, RewriteError> {
        match expression {
            PbesExpression::True => Ok(PbesExpression::True),
            PbesExpression::False => Ok(PbesExpression::False),
            PbesExpression::Val(e) => match evaluate(e, sigma)? {
                Value::Bool(true) => Ok(PbesExpression::True),
                Value::Bool(false) => Ok(PbesExpression::False),
                Value::Nat(_) => Err(RewriteError::SortMismatch(e.to_string())),
            },
            PbesExpression::Var(x) => {
                let mut parameters = x.parameters.clone();
                for parameter in parameters.iter_mut() {
                    *parameter = evaluate(parameter, sigma)?.to_expression();
                }
                Ok(PbesExpression::Var(PropVarInstantiation {
                    name: x.name.clone(),
                    parameters,
                }))
            }
            PbesExpression::And(lhs, rhs) => {
                let lhs = self.rewrite(lhs, sigma)?;
                if lhs.is_false() {
                    return Ok(PbesExpression::False);
                }
                let rhs = self.rewrite(rhs, sigma)?;
                Ok(join_and([lhs, rhs]))
            }
            PbesExpression::Or(lhs, rhs) => {
                let lhs = self.rewrite(lhs, sigma)?;
                if lhs.is_true() {
                    return Ok(PbesExpression::True);
                }
                let rhs = self.rewrite(rhs, sigma)?;
                Ok(join_or([lhs, rhs]))
            }
            PbesExpression::Forall(variables, body) => self.enumerate(variables, body, sigma, true),
            PbesExpression::Exists(variables, body) => self.enumerate(variables, body, sigma, false),
            PbesExpression::Imp(_, _) | PbesExpression::Not(_) => {
                Err(RewriteError::UnsupportedExpression(expression.to_string()))
            }
        }
    }

    /// Expands a quantifier by enumerating all assignments to its variables.
    fn enumerate(
        &self,
        variables: &[DataVariable],
        body: &PbesExpression,
        sigma: &mut Substitution,
        universal: bool,
    ) -> Result<PbesExpression, RewriteError> {
        for variable in variables {
            if enumerable_values(variable.sort).is_none() {
                return Err(RewriteError::CannotEnumerate {
                    variable: variable.name.clone(),
                    sort: variable.sort,
                });
            }
        }

        // Remember shadowed bindings so that they can be restored afterwards.
        let shadowed: Vec<Option<Value>> = variables.iter().map(|v| sigma.get(&v.name)).collect();
        let restore = |sigma: &mut Substitution| {
            for (variable, previous) in variables.iter().zip(shadowed.iter()) {
                match previous {
                    Some(value) => sigma.bind(variable.name.clone(), *value),
                    None => sigma.unbind(&variable.name),
                }
            }
        };

        let mut terms: Vec<PbesExpression> = Vec::new();
        let mut assignment = vec![0usize; variables.len()];

        loop {
            for (variable, choice) in variables.iter().zip(assignment.iter()) {
                let values = enumerable_values(variable.sort).unwrap();
                sigma.bind(variable.name.clone(), values[*choice]);
            }
            let term = self.rewrite(body, sigma);
            let term = match term {
                Ok(term) => term,
                Err(error) => {
                    restore(sigma);
                    return Err(error);
                }
            };

            if universal && term.is_false() {
                restore(sigma);
                return Ok(PbesExpression::False);
            }
            if !universal && term.is_true() {
                restore(sigma);
                return Ok(PbesExpression::True);
            }
            // Skip the neutral element and duplicates.
            let neutral = if universal { term.is_true() } else { term.is_false() };
            if !neutral && !terms.contains(&term) {
                terms.push(term);
            }

            // Advance to the next assignment.
            let mut position = 0;
            loop {
                if position == variables.len() {
                    restore(sigma);
                    let result = if universal { join_and(terms) } else { join_or(terms) };
                    return Ok(result);
                }
                let extent = enumerable_values(variables[position].sort).unwrap().len();
                assignment[position] += 1;
                if assignment[position] < extent {
                    break;
                }
                assignment[position] = 0;
                position += 1;
            }
        }
    }
}

/// Returns the values of a sort when it is finitely enumerable.
fn enumerable_values(sort: Sort) -> Option<&'static [Value]> {
    match sort {
        Sort::Bool => Some(&[Value::Bool(false), Value::Bool(true)]),
        Sort::Nat => None,
    }
}

/// Builds the conjunction of the given terms; the empty conjunction is true.
pub fn join_and(terms: impl IntoIterator<Item = PbesExpression>) -> PbesExpression {
    let mut result: Option<PbesExpression> = None;
    for term in terms {
        if term.is_false() {
            return PbesExpression::False;
        }
        if term.is_true() {
            continue;
        }
        result = Some(match result {
            None => term,
            Some(acc) => PbesExpression::and(acc, term),
        });
    }
    result.unwrap_or(PbesExpression::True)
}

/// Builds the disjunction of the given terms; the empty disjunction is false.
pub fn join_or(terms: impl IntoIterator<Item = PbesExpression>) -> PbesExpression {
    let mut result: Option<PbesExpression> = None;
    for term in terms {
        if term.is_true() {
            return PbesExpression::True;
        }
        if term.is_false() {
            continue;
        }
        result = Some(match result {
            None => term,
            Some(acc) => PbesExpression::or(acc, term),
        });
    }
    result.unwrap_or(PbesExpression::False)
}

/// Splits nested conjunctions into their conjuncts.
pub fn split_and(expression: &PbesExpression) -> Vec<&PbesExpression> {
    let mut result = Vec::new();
    split_rec(expression, true, &mut result);
    result
}

/// Splits nested disjunctions into their disjuncts.
pub fn split_or(expression: &PbesExpression) -> Vec<&PbesExpression> {
    let mut result = Vec::new();
    split_rec(expression, false, &mut result);
    result
}

fn split_rec<'a>(expression: &'a PbesExpression, conjunctive: bool, result: &mut Vec<&'a PbesExpression>) {
    match expression {
        PbesExpression::And(lhs, rhs) if conjunctive => {
            split_rec(lhs, conjunctive, result);
            split_rec(rhs, conjunctive, result);
        }
        PbesExpression::Or(lhs, rhs) if !conjunctive => {
            split_rec(lhs, conjunctive, result);
            split_rec(rhs, conjunctive, result);
        }
        _ => result.push(expression),
    }
}

/// Simplifies an expression with the boolean absorption laws. Ground data
/// literals inside val are folded, everything else is left untouched.
pub fn simplify(expression: &PbesExpression) -> PbesExpression {
    match expression {
        PbesExpression::Val(e) if e.is_ground() => {
            match evaluate(e, &Substitution::default()) {
                Ok(Value::Bool(true)) => PbesExpression::True,
                Ok(Value::Bool(false)) => PbesExpression::False,
                _ => expression.clone(),
            }
        }
        PbesExpression::And(lhs, rhs) => {
            let lhs = simplify(lhs);
            if lhs.is_false() {
                return PbesExpression::False;
            }
            join_and([lhs, simplify(rhs)])
        }
        PbesExpression::Or(lhs, rhs) => {
            let lhs = simplify(lhs);
            if lhs.is_true() {
                return PbesExpression::True;
            }
            join_or([lhs, simplify(rhs)])
        }
        PbesExpression::Imp(lhs, rhs) => {
            let lhs = simplify(lhs);
            let rhs = simplify(rhs);
            if lhs.is_false() || rhs.is_true() {
                PbesExpression::True
            } else if lhs.is_true() {
                rhs
            } else if rhs.is_false() {
                PbesExpression::Not(Box::new(lhs))
            } else {
                PbesExpression::Imp(Box::new(lhs), Box::new(rhs))
            }
        }
        PbesExpression::Not(e) => {
            let e = simplify(e);
            if e.is_true() {
                PbesExpression::False
            } else if e.is_false() {
                PbesExpression::True
            } else {
                PbesExpression::Not(Box::new(e))
            }
        }
        PbesExpression::Forall(variables, body) => {
            let body = simplify(body);
            if body.is_true() || body.is_false() {
                body
            } else {
                PbesExpression::Forall(variables.clone(), Box::new(body))
            }
        }
        PbesExpression::Exists(variables, body) => {
            let body = simplify(body);
            if body.is_true() || body.is_false() {
                body
            } else {
                PbesExpression::Exists(variables.clone(), Box::new(body))
            }
        }
        _ => expression.clone(),
    }
}

/// Rewrites an expression into positive normal form: implications are
/// eliminated and negations are pushed into the data leaves. A negation in
/// front of a propositional variable violates monotonicity and is rejected.
pub fn normalize(expression: &PbesExpression) -> Result<PbesExpression, RewriteError> {
    match expression {
        PbesExpression::True | PbesExpression::False | PbesExpression::Val(_) | PbesExpression::Var(_) => {
            Ok(expression.clone())
        }
        PbesExpression::And(lhs, rhs) => Ok(PbesExpression::and(normalize(lhs)?, normalize(rhs)?)),
        PbesExpression::Or(lhs, rhs) => Ok(PbesExpression::or(normalize(lhs)?, normalize(rhs)?)),
        PbesExpression::Imp(lhs, rhs) => Ok(PbesExpression::or(normalize_not(lhs)?, normalize(rhs)?)),
        PbesExpression::Not(e) => normalize_not(e),
        PbesExpression::Forall(variables, body) => {
            Ok(PbesExpression::Forall(variables.clone(), Box::new(normalize(body)?)))
        }
        PbesExpression::Exists(variables, body) => {
            Ok(PbesExpression::Exists(variables.clone(), Box::new(normalize(body)?)))
        }
    }
}

fn normalize_not(expression: &PbesExpression) -> Result<PbesExpression, RewriteError> {
    match expression {
        PbesExpression::True => Ok(PbesExpression::False),
        PbesExpression::False => Ok(PbesExpression::True),
        PbesExpression::Val(e) => match e {
            // Fold double negations in the data leaf.
            DataExpression::Not(inner) => Ok(PbesExpression::Val((**inner).clone())),
            _ => Ok(PbesExpression::Val(DataExpression::Not(Box::new(e.clone())))),
        },
        PbesExpression::Var(x) => Err(RewriteError::UnsupportedExpression(format!(
            "negated propositional variable {x}"
        ))),
        PbesExpression::And(lhs, rhs) => Ok(PbesExpression::or(normalize_not(lhs)?, normalize_not(rhs)?)),
        PbesExpression::Or(lhs, rhs) => Ok(PbesExpression::and(normalize_not(lhs)?, normalize_not(rhs)?)),
        PbesExpression::Imp(lhs, rhs) => Ok(PbesExpression::and(normalize(lhs)?, normalize_not(rhs)?)),
        PbesExpression::Not(e) => normalize(e),
        PbesExpression::Forall(variables, body) => Ok(PbesExpression::Exists(
            variables.clone(),
            Box::new(normalize_not(body)?),
        )),
        PbesExpression::Exists(variables, body) => Ok(PbesExpression::Forall(
            variables.clone(),
            Box::new(normalize_not(body)?),
        )),
    }
}

/// Applies the one point rule: a quantified variable that is pinned to a
/// single term by an equality (∃) or disequality (∀) conjunct/disjunct is
/// substituted away.
pub fn one_point_rule(expression: &PbesExpression) -> PbesExpression {
    match expression {
        PbesExpression::And(lhs, rhs) => PbesExpression::and(one_point_rule(lhs), one_point_rule(rhs)),
        PbesExpression::Or(lhs, rhs) => PbesExpression::or(one_point_rule(lhs), one_point_rule(rhs)),
        PbesExpression::Imp(lhs, rhs) => {
            PbesExpression::Imp(Box::new(one_point_rule(lhs)), Box::new(one_point_rule(rhs)))
        }
        PbesExpression::Not(e) => PbesExpression::Not(Box::new(one_point_rule(e))),
        PbesExpression::Exists(variables, body) => {
            let body = one_point_rule(body);
            apply_one_point(variables, body, false)
        }
        PbesExpression::Forall(variables, body) => {
            let body = one_point_rule(body);
            apply_one_point(variables, body, true)
        }
        _ => expression.clone(),
    }
}

fn apply_one_point(variables: &[DataVariable], body: PbesExpression, universal: bool) -> PbesExpression {
    let mut remaining: Vec<DataVariable> = variables.to_vec();
    let mut body = body;

    loop {
        let mut applied = false;
        for (position, variable) in remaining.iter().enumerate() {
            if let Some(term) = find_one_point(&body, variable, universal) {
                body = substitute_data_variable(&body, &variable.name, &term);
                body = simplify(&body);
                remaining.remove(position);
                applied = true;
                break;
            }
        }
        if !applied {
            break;
        }
    }

    if remaining.is_empty() {
        body
    } else if universal {
        PbesExpression::Forall(remaining, Box::new(body))
    } else {
        PbesExpression::Exists(remaining, Box::new(body))
    }
}

/// Finds a term t such that the body contains the conjunct val(x == t)
/// (existential case) or the disjunct val(x != t) (universal case), where t
/// does not refer to x.
fn find_one_point(body: &PbesExpression, variable: &DataVariable, universal: bool) -> Option<DataExpression> {
    let parts = if universal { split_or(body) } else { split_and(body) };

    for part in parts {
        let PbesExpression::Val(e) = part else {
            continue;
        };
        let candidate = match e {
            DataExpression::Binary(DataOp::Eq, lhs, rhs) if !universal => Some((lhs, rhs)),
            DataExpression::Binary(DataOp::Neq, lhs, rhs) if universal => Some((lhs, rhs)),
            DataExpression::Not(inner) if universal => match &**inner {
                DataExpression::Binary(DataOp::Eq, lhs, rhs) => Some((lhs, rhs)),
                _ => None,
            },
            _ => None,
        };
        if let Some((lhs, rhs)) = candidate {
            for (this, other) in [(lhs, rhs), (rhs, lhs)] {
                if let DataExpression::Variable(v) = &**this {
                    if v.name == variable.name && !data_contains_variable(other, &variable.name) {
                        return Some((**other).clone());
                    }
                }
            }
        }
    }
    None
}

fn data_contains_variable(expression: &DataExpression, name: &str) -> bool {
    match expression {
        DataExpression::Bool(_) | DataExpression::Nat(_) => false,
        DataExpression::Variable(v) => v.name == name,
        DataExpression::Not(e) => data_contains_variable(e, name),
        DataExpression::Binary(_, lhs, rhs) => {
            data_contains_variable(lhs, name) || data_contains_variable(rhs, name)
        }
        DataExpression::If(c, t, e) => {
            data_contains_variable(c, name) || data_contains_variable(t, name) || data_contains_variable(e, name)
        }
    }
}

/// Substitutes a data variable by a term in every data leaf.
pub fn substitute_data_variable(
    expression: &PbesExpression,
    name: &str,
    term: &DataExpression,
) -> PbesExpression {
    match expression {
        PbesExpression::True | PbesExpression::False => expression.clone(),
        PbesExpression::Val(e) => PbesExpression::Val(substitute_in_data(e, name, term)),
        PbesExpression::Var(x) => {
            let mut parameters = x.parameters.clone();
            for parameter in parameters.iter_mut() {
                *parameter = substitute_in_data(parameter, name, term);
            }
            PbesExpression::Var(PropVarInstantiation {
                name: x.name.clone(),
                parameters,
            })
        }
        PbesExpression::And(lhs, rhs) => PbesExpression::and(
            substitute_data_variable(lhs, name, term),
            substitute_data_variable(rhs, name, term),
        ),
        PbesExpression::Or(lhs, rhs) => PbesExpression::or(
            substitute_data_variable(lhs, name, term),
            substitute_data_variable(rhs, name, term),
        ),
        PbesExpression::Imp(lhs, rhs) => PbesExpression::Imp(
            Box::new(substitute_data_variable(lhs, name, term)),
            Box::new(substitute_data_variable(rhs, name, term)),
        ),
        PbesExpression::Not(e) => PbesExpression::Not(Box::new(substitute_data_variable(e, name, term))),
        PbesExpression::Forall(variables, body) => {
            if variables.iter().any(|v| v.name == name) {
                expression.clone()
            } else {
                PbesExpression::Forall(variables.clone(), Box::new(substitute_data_variable(body, name, term)))
            }
        }
        PbesExpression::Exists(variables, body) => {
            if variables.iter().any(|v| v.name == name) {
                expression.clone()
            } else {
                PbesExpression::Exists(variables.clone(), Box::new(substitute_data_variable(body, name, term)))
            }
        }
    }
}

fn substitute_in_data(expression: &DataExpression, name: &str, term: &DataExpression) -> DataExpression {
    match expression {
        DataExpression::Bool(_) | DataExpression::Nat(_) => expression.clone(),
        DataExpression::Variable(v) => {
            if v.name == name {
                term.clone()
            } else {
                expression.clone()
            }
        }
        DataExpression::Not(e) => DataExpression::Not(Box::new(substitute_in_data(e, name, term))),
        DataExpression::Binary(op, lhs, rhs) => DataExpression::Binary(
            *op,
            Box::new(substitute_in_data(lhs, name, term)),
            Box::new(substitute_in_data(rhs, name, term)),
        ),
        DataExpression::If(c, t, e) => DataExpression::If(
            Box::new(substitute_in_data(c, name, term)),
            Box::new(substitute_in_data(t, name, term)),
            Box::new(substitute_in_data(e, name, term)),
        ),
    }
}

/// Moves finitely enumerable variables to the front of every quantifier, so
/// that enumeration discharges them first.
pub fn order_quantified_variables(expression: &PbesExpression) -> PbesExpression {
    let order = |variables: &[DataVariable]| -> Vec<DataVariable> {
        let mut ordered = variables.to_vec();
        ordered.sort_by_key(|v| enumerable_values(v.sort).is_none());
        ordered
    };

    match expression {
        PbesExpression::And(lhs, rhs) => {
            PbesExpression::and(order_quantified_variables(lhs), order_quantified_variables(rhs))
        }
        PbesExpression::Or(lhs, rhs) => {
            PbesExpression::or(order_quantified_variables(lhs), order_quantified_variables(rhs))
        }
        PbesExpression::Imp(lhs, rhs) => PbesExpression::Imp(
            Box::new(order_quantified_variables(lhs)),
            Box::new(order_quantified_variables(rhs)),
        ),
        PbesExpression::Not(e) => PbesExpression::Not(Box::new(order_quantified_variables(e))),
        PbesExpression::Forall(variables, body) => {
            PbesExpression::Forall(order(variables), Box::new(order_quantified_variables(body)))
        }
        PbesExpression::Exists(variables, body) => {
            PbesExpression::Exists(order(variables), Box::new(order_quantified_variables(body)))
        }
        _ => expression.clone(),
    }
}

/// Instantiates all global variables with an arbitrary constant of the right
/// sort and removes the declarations.
pub fn instantiate_global_variables(pbes: &mut Pbes) {
    let globals = std::mem::take(&mut pbes.globals);
    for global in &globals {
        let constant = Value::default_of(global.sort).to_expression();
        for equation in pbes.equations.iter_mut() {
            equation.formula = substitute_data_variable(&equation.formula, &global.name, &constant);
        }
        for argument in pbes.initial_state.parameters.iter_mut() {
            *argument = substitute_in_data(argument, &global.name, &constant);
        }
    }
}

/// Replaces maximal ground non-literal data subterms by fresh variables that
/// are bound in the process-wide substitution.
pub fn replace_constants_by_variables(pbes: &mut Pbes, sigma: &mut Substitution) {
    let mut fresh = 0usize;

    let mut replace_data = |expression: &DataExpression, sigma: &mut Substitution| -> DataExpression {
        fn walk(
            expression: &DataExpression,
            sigma: &mut Substitution,
            fresh: &mut usize,
        ) -> DataExpression {
            if expression.is_ground() && !expression.is_literal() {
                // The subterm has a unique value, bind it to a fresh variable.
                let value = evaluate(expression, sigma).expect("ground data expressions evaluate");
                let name = format!("@c{}", *fresh);
                *fresh += 1;
                sigma.bind(name.clone(), value);
                return DataExpression::Variable(DataVariable::new(name, expression.sort()));
            }
            match expression {
                DataExpression::Not(e) => DataExpression::Not(Box::new(walk(e, sigma, fresh))),
                DataExpression::Binary(op, lhs, rhs) => DataExpression::Binary(
                    *op,
                    Box::new(walk(lhs, sigma, fresh)),
                    Box::new(walk(rhs, sigma, fresh)),
                ),
                DataExpression::If(c, t, e) => DataExpression::If(
                    Box::new(walk(c, sigma, fresh)),
                    Box::new(walk(t, sigma, fresh)),
                    Box::new(walk(e, sigma, fresh)),
                ),
                _ => expression.clone(),
            }
        }
        walk(expression, sigma, &mut fresh)
    };

    fn walk_pbes(
        expression: &PbesExpression,
        sigma: &mut Substitution,
        replace: &mut impl FnMut(&DataExpression, &mut Substitution) -> DataExpression,
    ) -> PbesExpression {
        match expression {
            PbesExpression::Val(e) => PbesExpression::Val(replace(e, sigma)),
            PbesExpression::Var(x) => {
                let mut parameters = x.parameters.clone();
                for parameter in parameters.iter_mut() {
                    *parameter = replace(parameter, sigma);
                }
                PbesExpression::Var(PropVarInstantiation {
                    name: x.name.clone(),
                    parameters,
                })
            }
            PbesExpression::And(lhs, rhs) => {
                PbesExpression::and(walk_pbes(lhs, sigma, replace), walk_pbes(rhs, sigma, replace))
            }
            PbesExpression::Or(lhs, rhs) => {
                PbesExpression::or(walk_pbes(lhs, sigma, replace), walk_pbes(rhs, sigma, replace))
            }
            PbesExpression::Forall(variables, body) => {
                PbesExpression::Forall(variables.clone(), Box::new(walk_pbes(body, sigma, replace)))
            }
            PbesExpression::Exists(variables, body) => {
                PbesExpression::Exists(variables.clone(), Box::new(walk_pbes(body, sigma, replace)))
            }
            _ => expression.clone(),
        }
    }

    for position in 0..pbes.equations.len() {
        let formula = walk_pbes(&pbes.equations[position].formula, sigma, &mut replace_data);
        pbes.equations[position].formula = formula;
    }
}

/// Replaces every propositional variable instantiation by the result of the
/// given function.
pub fn replace_propositional_variables(
    expression: &PbesExpression,
    replace: &mut impl FnMut(&PropVarInstantiation) -> PbesExpression,
) -> PbesExpression {
    match expression {
        PbesExpression::Var(x) => replace(x),
        PbesExpression::And(lhs, rhs) => PbesExpression::and(
            replace_propositional_variables(lhs, replace),
            replace_propositional_variables(rhs, replace),
        ),
        PbesExpression::Or(lhs, rhs) => PbesExpression::or(
            replace_propositional_variables(lhs, replace),
            replace_propositional_variables(rhs, replace),
        ),
        PbesExpression::Imp(lhs, rhs) => PbesExpression::Imp(
            Box::new(replace_propositional_variables(lhs, replace)),
            Box::new(replace_propositional_variables(rhs, replace)),
        ),
        PbesExpression::Not(e) => PbesExpression::Not(Box::new(replace_propositional_variables(e, replace))),
        PbesExpression::Forall(variables, body) => PbesExpression::Forall(
            variables.clone(),
            Box::new(replace_propositional_variables(body, replace)),
        ),
        PbesExpression::Exists(variables, body) => PbesExpression::Exists(
            variables.clone(),
            Box::new(replace_propositional_variables(body, replace)),
        ),
        _ => expression.clone(),
    }
}

/// Collects the propositional variable instantiations occurring in the
/// expression, in order of first occurrence.
pub fn find_propositional_variable_instantiations(expression: &PbesExpression) -> Vec<PropVarInstantiation> {
    let mut seen = FxHashSet::default();
    let mut result = Vec::new();
    find_rec(expression, &mut seen, &mut result);
    result
}

fn find_rec(
    expression: &PbesExpression,
    seen: &mut FxHashSet<PropVarInstantiation>,
    result: &mut Vec<PropVarInstantiation>,
) {
    match expression {
        PbesExpression::Var(x) => {
            if seen.insert(x.clone()) {
                result.push(x.clone());
            }
        }
        PbesExpression::And(lhs, rhs) | PbesExpression::Or(lhs, rhs) | PbesExpression::Imp(lhs, rhs) => {
            find_rec(lhs, seen, result);
            find_rec(rhs, seen, result);
        }
        PbesExpression::Not(e) => find_rec(e, seen, result),
        PbesExpression::Forall(_, body) | PbesExpression::Exists(_, body) => find_rec(body, seen, result),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_pbes;

    use super::*;

    fn rewrite(text: &str) -> PbesExpression {
        let pbes = parse_pbes(text).unwrap();
        let normalised = normalize(&pbes.equations[0].formula).unwrap();
        let mut sigma = Substitution::default();
        for (parameter, argument) in pbes.equations[0]
            .variable
            .parameters
            .iter()
            .zip(pbes.initial_state.parameters.iter())
        {
            sigma.bind(parameter.name.clone(), Value::from_literal(argument).unwrap());
        }
        EnumerateQuantifiersRewriter::new().rewrite(&normalised, &mut sigma).unwrap()
    }

    #[test]
    fn test_rewrite_implication_with_data_condition() {
        let psi = rewrite("pbes nu X(n: Nat) = val(n < 10) => X(n + 1); init X(0);");
        assert_eq!(psi.to_string(), "X(1)");

        let psi = rewrite("pbes nu X(n: Nat) = val(n < 10) => X(n + 1); init X(10);");
        assert!(psi.is_true());
    }

    #[test]
    fn test_rewrite_enumerates_booleans() {
        let psi = rewrite("pbes nu X(b: Bool) = forall c: Bool. X(if(c, !c, c)); init X(true);");
        assert_eq!(psi.to_string(), "X(false)");
    }

    #[test]
    fn test_rewrite_existential_short_circuit() {
        let psi = rewrite("pbes mu X(b: Bool) = exists c: Bool. val(c) || X(c); init X(false);");
        assert!(psi.is_true());
    }

    #[test]
    fn test_rewrite_nat_quantifier_is_rejected() {
        let pbes = parse_pbes("pbes mu X = forall n: Nat. val(n == n); init X;").unwrap();
        let mut sigma = Substitution::default();
        let result = EnumerateQuantifiersRewriter::new().rewrite(&pbes.equations[0].formula, &mut sigma);
        assert!(matches!(result, Err(RewriteError::CannotEnumerate { .. })));
    }

    #[test]
    fn test_normalize_pushes_negations_into_data() {
        let pbes = parse_pbes("pbes nu X(n: Nat) = !(val(n == 0) && !X(n)); init X(0);").unwrap();
        let normalised = normalize(&pbes.equations[0].formula).unwrap();
        assert_eq!(normalised.to_string(), "val(!(n == 0)) || X(n)");
    }

    #[test]
    fn test_normalize_rejects_negated_variables() {
        let pbes = parse_pbes("pbes nu X = !X; init X;").unwrap();
        assert!(matches!(
            normalize(&pbes.equations[0].formula),
            Err(RewriteError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_one_point_rule_exists() {
        let pbes =
            parse_pbes("pbes mu X(n: Nat) = exists m: Nat. val(m == 4) && X(m); init X(0);").unwrap();
        let result = one_point_rule(&pbes.equations[0].formula);
        assert_eq!(result.to_string(), "X(4)");
    }

    #[test]
    fn test_one_point_rule_forall() {
        let pbes =
            parse_pbes("pbes nu X(n: Nat) = forall m: Nat. val(m != 2) || X(m); init X(0);").unwrap();
        let result = one_point_rule(&pbes.equations[0].formula);
        assert_eq!(result.to_string(), "X(2)");
    }

    #[test]
    fn test_find_instantiations_in_order() {
        let pbes = parse_pbes("pbes nu X = Y && (X || Y); nu Y = X; init X;").unwrap();
        let occurrences = find_propositional_variable_instantiations(&pbes.equations[0].formula);
        let names: Vec<&str> = occurrences.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, ["Y", "X"]);
    }

    #[test]
    fn test_replace_constants_by_variables() {
        let mut pbes = parse_pbes("pbes nu X(n: Nat) = X(2 + 3); init X(0);").unwrap();
        let mut sigma = Substitution::default();
        replace_constants_by_variables(&mut pbes, &mut sigma);

        let PbesExpression::Var(x) = &pbes.equations[0].formula else {
            panic!("expected an instantiation");
        };
        let DataExpression::Variable(v) = &x.parameters[0] else {
            panic!("expected a fresh variable");
        };
        assert_eq!(sigma.get(&v.name), Some(Value::Nat(5)));
    }
}
