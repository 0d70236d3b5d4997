use std::fmt;

use rustc_hash::FxHashMap;

use crate::DataExpression;
use crate::Sort;

/// A fully evaluated data value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Bool(bool),
    Nat(u64),
}

impl Value {
    /// Returns the sort of the value.
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Nat(_) => Sort::Nat,
        }
    }

    /// Converts a literal expression into a value, if it is one.
    pub fn from_literal(expression: &DataExpression) -> Option<Value> {
        match expression {
            DataExpression::Bool(b) => Some(Value::Bool(*b)),
            DataExpression::Nat(n) => Some(Value::Nat(*n)),
            _ => None,
        }
    }

    /// Converts the value back into a literal expression.
    pub fn to_expression(self) -> DataExpression {
        match self {
            Value::Bool(b) => DataExpression::Bool(b),
            Value::Nat(n) => DataExpression::Nat(n),
        }
    }

    /// Returns the default value of the given sort, used to instantiate
    /// global variables with an arbitrary constant.
    pub fn default_of(sort: Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Nat => Value::Nat(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nat(n) => write!(f, "{n}"),
        }
    }
}

/// A mutable substitution from data variable names to values. The worker
/// loop assigns the equation parameters before every rewrite and removes
/// them again afterwards.
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    map: FxHashMap<String, Value>,
}

impl Substitution {
    /// Returns the value bound to the given name, if any.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.get(name).copied()
    }

    /// Binds the given name to a value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    /// Removes the binding for the given name.
    pub fn unbind(&mut self, name: &str) {
        self.map.remove(name);
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true iff the substitution has no bindings.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
