use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::DataExpression;
use crate::DataOp;
use crate::DataVariable;
use crate::FixpointSymbol;
use crate::Pbes;
use crate::PbesEquation;
use crate::PbesExpression;
use crate::PropVarDeclaration;
use crate::PropVarInstantiation;
use crate::Sort;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct PbesFormatParser;

/// Errors raised while parsing the textual PBES format.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("duplicate equation for variable {0}")]
    DuplicateEquation(String),

    #[error("undefined data variable {0}")]
    UndefinedVariable(String),

    #[error("undefined propositional variable {0}")]
    UndefinedPropositionalVariable(String),

    #[error("{name} expects {expected} argument(s), but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("sort mismatch: expected {expected}, found {found} in {context}")]
    SortMismatch {
        expected: Sort,
        found: Sort,
        context: String,
    },
}

/// Parses a PBES from its textual representation.
pub fn parse_pbes(text: &str) -> Result<Pbes, ParseError> {
    let mut pairs = PbesFormatParser::parse(Rule::specification, text).map_err(Box::new)?;
    let specification = pairs.next().expect("the grammar yields a specification");

    let mut globals = Vec::new();
    let mut equation_pairs = Vec::new();
    let mut initial_pair = None;

    for pair in specification.into_inner() {
        match pair.as_rule() {
            Rule::globals => {
                let declarations = pair.into_inner().next().expect("globals contain declarations");
                globals = build_variable_declarations(declarations);
            }
            Rule::equation => equation_pairs.push(pair),
            Rule::initial_state => initial_pair = Some(pair),
            Rule::EOI => {}
            rule => unreachable!("unexpected rule {rule:?} in specification"),
        }
    }

    // First collect the declared equations, so that mutually recursive
    // references resolve while building the right hand sides.
    let mut context = Context {
        declarations: FxHashMap::default(),
        scope: globals.clone(),
    };
    let mut declarations = Vec::new();
    for pair in &equation_pairs {
        let mut inner = pair.clone().into_inner();
        let symbol = match inner.next().expect("equation has a fixpoint symbol").as_str() {
            "mu" => FixpointSymbol::Mu,
            _ => FixpointSymbol::Nu,
        };
        let name = inner.next().expect("equation has a name").as_str().to_string();
        let parameters = match inner.next() {
            Some(parameters) if parameters.as_rule() == Rule::equation_parameters => {
                let declarations = parameters.into_inner().next().expect("parameters are declared");
                build_variable_declarations(declarations)
            }
            _ => Vec::new(),
        };

        let sorts: Vec<Sort> = parameters.iter().map(|parameter| parameter.sort).collect();
        if context.declarations.insert(name.clone(), sorts).is_some() {
            return Err(ParseError::DuplicateEquation(name));
        }
        declarations.push((symbol, name, parameters));
    }

    let mut equations = Vec::new();
    for (pair, (symbol, name, parameters)) in equation_pairs.into_iter().zip(declarations) {
        let body = pair
            .into_inner()
            .find(|inner| inner.as_rule() == Rule::pbes_expression)
            .expect("equation has a right hand side");

        let depth = context.scope.len();
        context.scope.extend(parameters.iter().cloned());
        let formula = build_pbes_expression(body, &mut context)?;
        context.scope.truncate(depth);

        equations.push(PbesEquation {
            symbol,
            variable: PropVarDeclaration { name, parameters },
            formula,
        });
    }

    let initial_pair = initial_pair.expect("the grammar yields an initial state");
    let mut inner = initial_pair.into_inner();
    let name = inner.next().expect("init names a variable").as_str().to_string();
    let arguments = match inner.next() {
        Some(arguments) => build_instantiation_arguments(arguments, &mut context)?,
        None => Vec::new(),
    };
    let initial_state = make_instantiation(name, arguments, &context)?;

    Ok(Pbes {
        globals,
        equations,
        initial_state,
    })
}

struct Context {
    /// Parameter sorts per declared equation.
    declarations: FxHashMap<String, Vec<Sort>>,
    /// The data variables in scope, innermost last.
    scope: Vec<DataVariable>,
}

impl Context {
    fn lookup(&self, name: &str) -> Option<&DataVariable> {
        self.scope.iter().rev().find(|variable| variable.name == name)
    }
}

fn build_variable_declarations(pair: Pair<Rule>) -> Vec<DataVariable> {
    debug_assert_eq!(pair.as_rule(), Rule::variable_declarations);

    pair.into_inner()
        .map(|declaration| {
            let mut inner = declaration.into_inner();
            let name = inner.next().expect("declaration has a name").as_str();
            let sort = match inner.next().expect("declaration has a sort").as_str() {
                "Bool" => Sort::Bool,
                _ => Sort::Nat,
            };
            DataVariable::new(name, sort)
        })
        .collect()
}

fn build_instantiation_arguments(
    pair: Pair<Rule>,
    context: &mut Context,
) -> Result<Vec<DataExpression>, ParseError> {
    debug_assert_eq!(pair.as_rule(), Rule::instantiation_arguments);

    pair.into_inner()
        .map(|argument| build_data_expression(argument, context))
        .collect()
}

fn make_instantiation(
    name: String,
    arguments: Vec<DataExpression>,
    context: &Context,
) -> Result<PropVarInstantiation, ParseError> {
    let Some(sorts) = context.declarations.get(&name) else {
        return Err(ParseError::UndefinedPropositionalVariable(name));
    };
    if sorts.len() != arguments.len() {
        return Err(ParseError::ArityMismatch {
            name,
            expected: sorts.len(),
            found: arguments.len(),
        });
    }
    for (argument, expected) in arguments.iter().zip(sorts.iter()) {
        if argument.sort() != *expected {
            return Err(ParseError::SortMismatch {
                expected: *expected,
                found: argument.sort(),
                context: format!("argument {argument} of {name}"),
            });
        }
    }
    Ok(PropVarInstantiation::new(name, arguments))
}

fn build_pbes_expression(pair: Pair<Rule>, context: &mut Context) -> Result<PbesExpression, ParseError> {
    match pair.as_rule() {
        Rule::pbes_expression => {
            let inner = pair.into_inner().next().expect("expression has a body");
            build_pbes_expression(inner, context)
        }
        Rule::quantifier => {
            let mut inner = pair.into_inner();
            let symbol = inner.next().expect("quantifier has a symbol").as_str().to_string();
            let variables = build_variable_declarations(inner.next().expect("quantifier binds variables"));
            let depth = context.scope.len();
            context.scope.extend(variables.iter().cloned());
            let body = build_pbes_expression(inner.next().expect("quantifier has a body"), context)?;
            context.scope.truncate(depth);

            if symbol == "forall" {
                Ok(PbesExpression::Forall(variables, Box::new(body)))
            } else {
                Ok(PbesExpression::Exists(variables, Box::new(body)))
            }
        }
        Rule::implication => {
            let mut inner = pair.into_inner();
            let lhs = build_pbes_expression(inner.next().expect("implication has a left side"), context)?;
            match inner.next() {
                Some(rhs) => {
                    let rhs = build_pbes_expression(rhs, context)?;
                    Ok(PbesExpression::Imp(Box::new(lhs), Box::new(rhs)))
                }
                None => Ok(lhs),
            }
        }
        Rule::disjunction => {
            let mut inner = pair.into_inner();
            let mut result = build_pbes_expression(inner.next().expect("disjunction is nonempty"), context)?;
            for operand in inner {
                result = PbesExpression::or(result, build_pbes_expression(operand, context)?);
            }
            Ok(result)
        }
        Rule::conjunction => {
            let mut inner = pair.into_inner();
            let mut result = build_pbes_expression(inner.next().expect("conjunction is nonempty"), context)?;
            for operand in inner {
                result = PbesExpression::and(result, build_pbes_expression(operand, context)?);
            }
            Ok(result)
        }
        Rule::negation => {
            let inner = pair.into_inner().next().expect("negation has a body");
            match inner.as_rule() {
                Rule::negation => Ok(PbesExpression::Not(Box::new(build_pbes_expression(inner, context)?))),
                _ => build_pbes_expression(inner, context),
            }
        }
        Rule::pbes_atom => {
            let inner = pair.into_inner().next().expect("atom has a body");
            build_pbes_expression(inner, context)
        }
        Rule::boolean => {
            if pair.as_str() == "true" {
                Ok(PbesExpression::True)
            } else {
                Ok(PbesExpression::False)
            }
        }
        Rule::value_expression => {
            let inner = pair.into_inner().next().expect("val has a body");
            Ok(PbesExpression::Val(build_data_expression(inner, context)?))
        }
        Rule::proposition => {
            let mut inner = pair.into_inner();
            let name = inner.next().expect("proposition has a name").as_str().to_string();
            let arguments = match inner.next() {
                Some(arguments) => build_instantiation_arguments(arguments, context)?,
                None => Vec::new(),
            };

            if context.declarations.contains_key(&name) {
                Ok(PbesExpression::Var(make_instantiation(name, arguments, context)?))
            } else if arguments.is_empty() {
                // A bare boolean data variable is allowed without val(...).
                match context.lookup(&name) {
                    Some(variable) if variable.sort == Sort::Bool => {
                        Ok(PbesExpression::Val(DataExpression::Variable(variable.clone())))
                    }
                    _ => Err(ParseError::UndefinedPropositionalVariable(name)),
                }
            } else {
                Err(ParseError::UndefinedPropositionalVariable(name))
            }
        }
        rule => unreachable!("unexpected rule {rule:?} in a PBES expression"),
    }
}

fn build_data_expression(pair: Pair<Rule>, context: &mut Context) -> Result<DataExpression, ParseError> {
    match pair.as_rule() {
        Rule::data_expression => {
            let inner = pair.into_inner().next().expect("expression has a body");
            build_data_expression(inner, context)
        }
        Rule::data_implication => {
            let mut inner = pair.into_inner();
            let lhs = build_data_expression(inner.next().expect("implication has a left side"), context)?;
            match inner.next() {
                Some(rhs) => {
                    let rhs = build_data_expression(rhs, context)?;
                    binary(DataOp::Imp, lhs, rhs)
                }
                None => Ok(lhs),
            }
        }
        Rule::data_disjunction => fold_binary(pair, DataOp::Or, context),
        Rule::data_conjunction => fold_binary(pair, DataOp::And, context),
        Rule::data_comparison => {
            let mut inner = pair.into_inner();
            let lhs = build_data_expression(inner.next().expect("comparison has a left side"), context)?;
            match inner.next() {
                Some(operator) => {
                    let op = match operator.as_str() {
                        "==" => DataOp::Eq,
                        "!=" => DataOp::Neq,
                        "<" => DataOp::Lt,
                        "<=" => DataOp::Le,
                        ">" => DataOp::Gt,
                        _ => DataOp::Ge,
                    };
                    let rhs = build_data_expression(inner.next().expect("comparison has a right side"), context)?;
                    binary(op, lhs, rhs)
                }
                None => Ok(lhs),
            }
        }
        Rule::data_additive => {
            let mut inner = pair.into_inner();
            let mut result = build_data_expression(inner.next().expect("additive is nonempty"), context)?;
            while let Some(operator) = inner.next() {
                let op = if operator.as_str() == "+" { DataOp::Add } else { DataOp::Sub };
                let rhs = build_data_expression(inner.next().expect("operator has a right side"), context)?;
                result = binary(op, result, rhs)?;
            }
            Ok(result)
        }
        Rule::data_multiplicative => {
            let mut inner = pair.into_inner();
            let mut result = build_data_expression(inner.next().expect("multiplicative is nonempty"), context)?;
            for operand in inner {
                let rhs = build_data_expression(operand, context)?;
                result = binary(DataOp::Mul, result, rhs)?;
            }
            Ok(result)
        }
        Rule::data_atom => {
            let inner = pair.into_inner().next().expect("atom has a body");
            build_data_expression(inner, context)
        }
        Rule::identifier => match context.lookup(pair.as_str()) {
            Some(variable) => Ok(DataExpression::Variable(variable.clone())),
            None => Err(ParseError::UndefinedVariable(pair.as_str().to_string())),
        },
        Rule::boolean => Ok(DataExpression::Bool(pair.as_str() == "true")),
        Rule::number => Ok(DataExpression::Nat(
            pair.as_str().parse().expect("numbers fit in u64"),
        )),
        Rule::conditional => {
            let mut inner = pair.into_inner();
            let condition = build_data_expression(inner.next().expect("if has a condition"), context)?;
            let then = build_data_expression(inner.next().expect("if has a then branch"), context)?;
            let otherwise = build_data_expression(inner.next().expect("if has an else branch"), context)?;

            expect_sort(&condition, Sort::Bool, "if condition")?;
            if then.sort() != otherwise.sort() {
                return Err(ParseError::SortMismatch {
                    expected: then.sort(),
                    found: otherwise.sort(),
                    context: "if branches".to_string(),
                });
            }
            Ok(DataExpression::If(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ))
        }
        Rule::data_negation => {
            let inner = pair.into_inner().next().expect("negation has a body");
            let body = build_data_expression(inner, context)?;
            expect_sort(&body, Sort::Bool, "negation")?;
            Ok(DataExpression::Not(Box::new(body)))
        }
        rule => unreachable!("unexpected rule {rule:?} in a data expression"),
    }
}

fn fold_binary(pair: Pair<Rule>, op: DataOp, context: &mut Context) -> Result<DataExpression, ParseError> {
    let mut inner = pair.into_inner();
    let mut result = build_data_expression(inner.next().expect("operator is nonempty"), context)?;
    for operand in inner {
        let rhs = build_data_expression(operand, context)?;
        result = binary(op, result, rhs)?;
    }
    Ok(result)
}

/// Builds a binary application after checking the operand sorts.
fn binary(op: DataOp, lhs: DataExpression, rhs: DataExpression) -> Result<DataExpression, ParseError> {
    let context = format!("{lhs} {rhs}");
    match op {
        DataOp::And | DataOp::Or | DataOp::Imp => {
            expect_sort(&lhs, Sort::Bool, &context)?;
            expect_sort(&rhs, Sort::Bool, &context)?;
        }
        DataOp::Eq | DataOp::Neq => {
            if lhs.sort() != rhs.sort() {
                return Err(ParseError::SortMismatch {
                    expected: lhs.sort(),
                    found: rhs.sort(),
                    context,
                });
            }
        }
        _ => {
            expect_sort(&lhs, Sort::Nat, &context)?;
            expect_sort(&rhs, Sort::Nat, &context)?;
        }
    }
    Ok(DataExpression::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn expect_sort(expression: &DataExpression, expected: Sort, context: &str) -> Result<(), ParseError> {
    if expression.sort() != expected {
        return Err(ParseError::SortMismatch {
            expected,
            found: expression.sort(),
            context: context.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse_trivial() {
        let pbes = parse_pbes("pbes nu X = X; init X;").unwrap();
        assert_eq!(pbes.equations.len(), 1);
        assert_eq!(pbes.equations[0].symbol, FixpointSymbol::Nu);
        assert_eq!(pbes.equations[0].formula.to_string(), "X");
        assert_eq!(pbes.initial_state.to_string(), "X");
    }

    #[test]
    fn test_parse_parameters_and_data() {
        let pbes = parse_pbes("pbes nu X(n: Nat) = val(n < 10) => X(n + 1); init X(0);").unwrap();
        assert_eq!(
            pbes.equations[0].formula.to_string(),
            "val(n < 10) => X(n + 1)"
        );
        assert_eq!(pbes.initial_state.to_string(), "X(0)");
    }

    #[test]
    fn test_parse_quantifier_and_conditional() {
        let pbes =
            parse_pbes("pbes nu X(b: Bool) = forall c: Bool. X(if(c, !c, c)); init X(true);").unwrap();
        assert_eq!(
            pbes.equations[0].formula.to_string(),
            "forall c: Bool. X(if(c, !c, c))"
        );
    }

    #[test]
    fn test_parse_mutual_recursion() {
        let pbes = parse_pbes(indoc! {"
            % A game with an alternation.
            pbes
              nu X = Y && X;
              mu Y = X || Y;
            init X;
        "})
        .unwrap();
        assert_eq!(pbes.equations.len(), 2);
        assert_eq!(pbes.equations[0].formula.to_string(), "Y && X");
    }

    #[test]
    fn test_parse_globals() {
        let pbes = parse_pbes("glob m: Nat; pbes nu X(n: Nat) = X(n + m); init X(m);").unwrap();
        assert_eq!(pbes.globals.len(), 1);
        assert_eq!(pbes.initial_state.to_string(), "X(m)");
    }

    #[test]
    fn test_parse_bare_boolean_variable() {
        let pbes = parse_pbes("pbes nu X(b: Bool) = b && X(b); init X(true);").unwrap();
        assert_eq!(pbes.equations[0].formula.to_string(), "val(b) && X(b)");
    }

    #[test]
    fn test_undefined_variable() {
        assert!(matches!(
            parse_pbes("pbes nu X = Y; init X;"),
            Err(ParseError::UndefinedPropositionalVariable(name)) if name == "Y"
        ));
        assert!(matches!(
            parse_pbes("pbes nu X = val(n < 1); init X;"),
            Err(ParseError::UndefinedVariable(name)) if name == "n"
        ));
    }

    #[test]
    fn test_duplicate_equation() {
        assert!(matches!(
            parse_pbes("pbes nu X = X; mu X = X; init X;"),
            Err(ParseError::DuplicateEquation(_))
        ));
    }

    #[test]
    fn test_arity_and_sort_checks() {
        assert!(matches!(
            parse_pbes("pbes nu X(n: Nat) = X; init X(0);"),
            Err(ParseError::ArityMismatch { .. })
        ));
        assert!(matches!(
            parse_pbes("pbes nu X(n: Nat) = X(true); init X(0);"),
            Err(ParseError::SortMismatch { .. })
        ));
        assert!(matches!(
            parse_pbes("pbes nu X = val(1 + true == 2); init X;"),
            Err(ParseError::SortMismatch { .. })
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            parse_pbes("pbes nu X = ; init X;"),
            Err(ParseError::Syntax(_))
        ));
    }
}
