use std::fmt;

use itertools::Itertools;
use smallvec::SmallVec;

/// The data sorts supported by the built-in data language.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Sort {
    Bool,
    Nat,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Nat => write!(f, "Nat"),
        }
    }
}

/// A sorted data variable.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct DataVariable {
    pub name: String,
    pub sort: Sort,
}

impl DataVariable {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

impl fmt::Display for DataVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.sort)
    }
}

/// Binary operators of the data language.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DataOp {
    And,
    Or,
    Imp,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
}

impl DataOp {
    /// The result sort of an application of this operator.
    pub fn result_sort(&self) -> Sort {
        match self {
            DataOp::Add | DataOp::Sub | DataOp::Mul => Sort::Nat,
            _ => Sort::Bool,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            DataOp::And => "&&",
            DataOp::Or => "||",
            DataOp::Imp => "=>",
            DataOp::Eq => "==",
            DataOp::Neq => "!=",
            DataOp::Lt => "<",
            DataOp::Le => "<=",
            DataOp::Gt => ">",
            DataOp::Ge => ">=",
            DataOp::Add => "+",
            DataOp::Sub => "-",
            DataOp::Mul => "*",
        }
    }
}

/// An expression of the built-in data language over Bool and Nat.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DataExpression {
    Bool(bool),
    Nat(u64),
    Variable(DataVariable),
    Not(Box<DataExpression>),
    Binary(DataOp, Box<DataExpression>, Box<DataExpression>),
    If(Box<DataExpression>, Box<DataExpression>, Box<DataExpression>),
}

impl DataExpression {
    /// Returns true iff this expression is a Bool or Nat literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, DataExpression::Bool(_) | DataExpression::Nat(_))
    }

    /// Returns true iff this expression contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            DataExpression::Bool(_) | DataExpression::Nat(_) => true,
            DataExpression::Variable(_) => false,
            DataExpression::Not(e) => e.is_ground(),
            DataExpression::Binary(_, lhs, rhs) => lhs.is_ground() && rhs.is_ground(),
            DataExpression::If(c, t, e) => c.is_ground() && t.is_ground() && e.is_ground(),
        }
    }

    /// Returns the sort of this expression.
    pub fn sort(&self) -> Sort {
        match self {
            DataExpression::Bool(_) => Sort::Bool,
            DataExpression::Nat(_) => Sort::Nat,
            DataExpression::Variable(v) => v.sort,
            DataExpression::Not(_) => Sort::Bool,
            DataExpression::Binary(op, _, _) => op.result_sort(),
            DataExpression::If(_, t, _) => t.sort(),
        }
    }
}

impl fmt::Display for DataExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataExpression::Bool(b) => write!(f, "{b}"),
            DataExpression::Nat(n) => write!(f, "{n}"),
            DataExpression::Variable(v) => write!(f, "{}", v.name),
            DataExpression::Not(e) => write!(f, "!{}", Operand(e)),
            DataExpression::Binary(op, lhs, rhs) => {
                write!(f, "{} {} {}", Operand(lhs), op.symbol(), Operand(rhs))
            }
            DataExpression::If(c, t, e) => write!(f, "if({c}, {t}, {e})"),
        }
    }
}

/// Wraps composite operands in parentheses when printed.
struct Operand<'a>(&'a DataExpression);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            DataExpression::Binary(_, _, _) => write!(f, "({})", self.0),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// The arguments of a propositional variable instantiation. Instantiations
/// are small, so the arguments are stored inline.
pub type InstantiationArgs = SmallVec<[DataExpression; 4]>;

/// A propositional variable instantiation X(e_1, ..., e_n).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PropVarInstantiation {
    pub name: String,
    pub parameters: InstantiationArgs,
}

impl PropVarInstantiation {
    pub fn new(name: impl Into<String>, parameters: impl IntoIterator<Item = DataExpression>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().collect(),
        }
    }
}

impl fmt::Display for PropVarInstantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.parameters.iter().format(", "))
        }
    }
}

/// A PBES expression. After normalisation only the operators true, false,
/// val, ∧, ∨, ∀, ∃ and propositional variable instantiations remain.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PbesExpression {
    True,
    False,
    Val(DataExpression),
    Var(PropVarInstantiation),
    And(Box<PbesExpression>, Box<PbesExpression>),
    Or(Box<PbesExpression>, Box<PbesExpression>),
    Imp(Box<PbesExpression>, Box<PbesExpression>),
    Not(Box<PbesExpression>),
    Forall(Vec<DataVariable>, Box<PbesExpression>),
    Exists(Vec<DataVariable>, Box<PbesExpression>),
}

impl PbesExpression {
    pub fn and(lhs: PbesExpression, rhs: PbesExpression) -> Self {
        PbesExpression::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: PbesExpression, rhs: PbesExpression) -> Self {
        PbesExpression::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, PbesExpression::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, PbesExpression::False)
    }

    /// Returns the instantiation if this expression is a single propositional
    /// variable instantiation.
    pub fn as_instantiation(&self) -> Option<&PropVarInstantiation> {
        match self {
            PbesExpression::Var(x) => Some(x),
            _ => None,
        }
    }
}

impl From<PropVarInstantiation> for PbesExpression {
    fn from(x: PropVarInstantiation) -> Self {
        PbesExpression::Var(x)
    }
}

impl fmt::Display for PbesExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PbesExpression::True => write!(f, "true"),
            PbesExpression::False => write!(f, "false"),
            PbesExpression::Val(e) => write!(f, "val({e})"),
            PbesExpression::Var(x) => write!(f, "{x}"),
            PbesExpression::And(lhs, rhs) => write!(f, "{} && {}", PbesOperand(lhs), PbesOperand(rhs)),
            PbesExpression::Or(lhs, rhs) => write!(f, "{} || {}", PbesOperand(lhs), PbesOperand(rhs)),
            PbesExpression::Imp(lhs, rhs) => write!(f, "{} => {}", PbesOperand(lhs), PbesOperand(rhs)),
            PbesExpression::Not(e) => write!(f, "!{}", PbesOperand(e)),
            PbesExpression::Forall(vars, body) => {
                write!(f, "forall {}. {}", vars.iter().format(", "), body)
            }
            PbesExpression::Exists(vars, body) => {
                write!(f, "exists {}. {}", vars.iter().format(", "), body)
            }
        }
    }
}

struct PbesOperand<'a>(&'a PbesExpression);

impl fmt::Display for PbesOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            PbesExpression::And(_, _)
            | PbesExpression::Or(_, _)
            | PbesExpression::Imp(_, _)
            | PbesExpression::Forall(_, _)
            | PbesExpression::Exists(_, _) => write!(f, "({})", self.0),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// The fixpoint symbol of an equation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FixpointSymbol {
    Mu,
    Nu,
}

impl FixpointSymbol {
    pub fn is_mu(&self) -> bool {
        matches!(self, FixpointSymbol::Mu)
    }
}

impl fmt::Display for FixpointSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixpointSymbol::Mu => write!(f, "mu"),
            FixpointSymbol::Nu => write!(f, "nu"),
        }
    }
}

/// The declared left hand side X(d_1: D_1, ..., d_n: D_n) of an equation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PropVarDeclaration {
    pub name: String,
    pub parameters: Vec<DataVariable>,
}

impl fmt::Display for PropVarDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameters.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.parameters.iter().format(", "))
        }
    }
}

/// A single fixpoint equation σ X(d: D) = φ.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PbesEquation {
    pub symbol: FixpointSymbol,
    pub variable: PropVarDeclaration,
    pub formula: PbesExpression,
}

impl fmt::Display for PbesEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {};", self.symbol, self.variable, self.formula)
    }
}

/// A parameterised boolean equation system: an ordered list of fixpoint
/// equations together with an initial instantiation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Pbes {
    pub globals: Vec<DataVariable>,
    pub equations: Vec<PbesEquation>,
    pub initial_state: PropVarInstantiation,
}

impl Pbes {
    /// Finds an equation by the name of its variable.
    pub fn find_equation(&self, name: &str) -> Option<&PbesEquation> {
        self.equations.iter().find(|eqn| eqn.variable.name == name)
    }
}

impl fmt::Display for Pbes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.globals.is_empty() {
            writeln!(f, "glob {};", self.globals.iter().format(", "))?;
        }
        writeln!(f, "pbes")?;
        for eqn in &self.equations {
            writeln!(f, "  {eqn}")?;
        }
        write!(f, "init {};", self.initial_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_expression() {
        let x = PropVarInstantiation::new("X", [DataExpression::Nat(0), DataExpression::Bool(true)]);
        let phi = PbesExpression::or(
            PbesExpression::Val(DataExpression::Binary(
                DataOp::Lt,
                Box::new(DataExpression::Variable(DataVariable::new("n", Sort::Nat))),
                Box::new(DataExpression::Nat(10)),
            )),
            PbesExpression::Var(x),
        );

        assert_eq!(format!("{phi}"), "val(n < 10) || X(0, true)");
    }
}
