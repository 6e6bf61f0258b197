//! This module defines the core runtime value types and helper functions for
//! representing data in the interpreter. The main enum, [`Value`], covers all
//! language data types: integers, booleans, quoted symbols, identifiers, cons
//! cells, the empty list, and procedures (both host primitives and closures).
//! Ergonomic helper functions such as [`val`], [`sym`], [`ident`] and [`nil`]
//! are provided for convenient value construction in code and tests, together
//! with conversion traits for common Rust types. Equality and display logic
//! are customized to match the language semantics, including dotted display
//! for improper lists and a `None` value that never compares equal.

use crate::Error;
use crate::builtinops::PrimitiveOp;
use crate::evaluator::Environment;
use std::rc::Rc;

/// Type alias for number values in the interpreter
pub(crate) type NumberType = i64;

/// Allowed non-alphanumeric characters in identifier names
/// Most represent mathematical symbols or predicates ("?")
pub(crate) const IDENT_SPECIAL_CHARS: &str = "+-*/<>=!?_";

/// Check if a string is a valid identifier name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + IDENT_SPECIAL_CHARS
/// Note: This function is tested as part of the parser tests in parser.rs
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false, // name is empty
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            // Check all characters are valid
            // The first character is checked here again, but it's a cheap operation.
            name.chars()
                .all(|c| c.is_alphanumeric() || IDENT_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Core runtime value type in the interpreter
///
/// A chain of [`Value::Pair`] cells terminated by [`Value::EmptyList`] is a
/// *proper list*; any other terminating value makes the chain *improper*
/// (displayed dotted). Pairs are immutable after construction and reads hand
/// out independent copies, so values never alias across call sites.
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for atoms, `sym("name")` for quoted symbols, `ident("x")` for
///   identifiers, `nil()` for the empty list
/// - `cons(a, b)` for a single cell, `proper_list(vec![...])` for lists
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Integer(NumberType),
    /// Boolean values
    Boolean(bool),
    /// Opaque quoted atoms ('foo); inert data, never looked up
    Symbol(String),
    /// Names resolved against the environment chain at evaluation time
    Identifier(String),
    /// A cons cell: head + tail, each an arbitrary value
    Pair(Box<Pair>),
    /// The empty list; terminator of proper lists, self-evaluating
    EmptyList,
    /// Applicable values: host primitives and user-defined closures
    Procedure(Procedure),
    /// Unit result of side-effecting forms (e.g. define)
    /// This value never equals itself or any other value
    None,
}

/// A two-slot cons cell
#[derive(Clone, PartialEq)]
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

/// The two kinds of applicable values
#[derive(Clone)]
pub enum Procedure {
    /// Host-implemented operation from the builtin registry
    Primitive(&'static PrimitiveOp),
    /// User-defined procedure with a captured defining environment
    Closure(Closure),
}

impl Procedure {
    /// The declared argument count when this procedure is fixed-arity
    ///
    /// The dispatcher validates this before evaluating any argument.
    pub(crate) fn fixed_arity(&self) -> Option<usize> {
        match self {
            Procedure::Primitive(op) => op.arity.exact_count(),
            Procedure::Closure(c) => match &c.formals {
                Formals::Fixed(names) => Some(names.len()),
                Formals::Variadic(_) => Option::None,
            },
        }
    }

    /// Whether the dispatcher evaluates arguments before this procedure runs
    ///
    /// Closures always receive evaluated arguments; primitives declare a
    /// policy (control-flow forms receive raw syntax).
    pub(crate) fn pre_evaluates(&self) -> bool {
        match self {
            Procedure::Primitive(op) => op.pre_evaluate,
            Procedure::Closure(_) => true,
        }
    }
}

/// A user-defined procedure: formal parameters, a body expression and the
/// environment frame that was active at definition time.
///
/// The environment is captured by reference (shared, not copied) - this is
/// what makes nested procedures genuine closures. The body is shared between
/// clones of the closure value; it is never mutated.
///
/// Application frames are allocated fresh per call, so recursive and
/// re-entrant applications of the same closure value cannot clobber each
/// other's parameter bindings.
#[derive(Clone)]
pub struct Closure {
    pub(crate) formals: Formals,
    pub(crate) body: Rc<Value>,
    pub(crate) env: Environment,
}

impl Closure {
    pub(crate) fn new(formals: Formals, body: Value, env: Environment) -> Self {
        Closure {
            formals,
            body: Rc::new(body),
            env,
        }
    }
}

/// Formal parameter specification of a closure
#[derive(Clone, Debug, PartialEq)]
pub enum Formals {
    /// One name per argument; arity is fixed to the list length
    Fixed(Vec<String>),
    /// A single name bound to the full argument list
    Variadic(String),
}

impl Formals {
    /// All parameter names, for placeholder pre-binding
    pub(crate) fn names(&self) -> Vec<&str> {
        match self {
            Formals::Fixed(names) => names.iter().map(String::as_str).collect(),
            Formals::Variadic(name) => vec![name.as_str()],
        }
    }
}

/// Build a single cons cell
pub fn cons(head: Value, tail: Value) -> Value {
    Value::Pair(Box::new(Pair { head, tail }))
}

/// Build a proper (EmptyList-terminated) list from the given elements
pub fn proper_list(elements: Vec<Value>) -> Value {
    elements
        .into_iter()
        .rev()
        .fold(Value::EmptyList, |tail, head| cons(head, tail))
}

impl Value {
    /// Check if a value is the empty list
    pub(crate) fn is_nil(&self) -> bool {
        matches!(self, Value::EmptyList)
    }

    /// Flatten a proper list into its member values, dropping the terminator.
    ///
    /// Returns `None` for improper (dotted) chains. The empty list flattens
    /// to an empty vector. Members are independent copies.
    pub(crate) fn proper_elements(&self) -> Option<Vec<Value>> {
        let mut elements = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Value::EmptyList => return Some(elements),
                Value::Pair(p) => {
                    elements.push(p.head.clone());
                    cursor = &p.tail;
                }
                _ => return Option::None,
            }
        }
    }

    /// Name of this value's variant, as reported by the `typeof` builtin
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Symbol(_) => "symbol",
            Value::Identifier(_) => "identifier",
            Value::Pair(_) => "pair",
            Value::EmptyList => "empty-list",
            Value::Procedure(_) => "procedure",
            Value::None => "none",
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Identifier(s) => write!(f, "Identifier({s})"),
            Value::Pair(p) => write!(f, "Pair({:?}, {:?})", p.head, p.tail),
            Value::EmptyList => write!(f, "EmptyList"),
            Value::Procedure(Procedure::Primitive(op)) => write!(f, "Primitive({})", op.name),
            Value::Procedure(Procedure::Closure(c)) => {
                write!(f, "Closure(formals={:?}, body={:?})", c.formals, c.body)
            }
            Value::None => write!(f, "None"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(s) => write!(f, "'{s}"),
            Value::Identifier(s) => write!(f, "{s}"),
            Value::Pair(p) => {
                write!(f, "({}", p.head)?;
                let mut cursor = &p.tail;
                loop {
                    match cursor {
                        Value::Pair(next) => {
                            write!(f, " {}", next.head)?;
                            cursor = &next.tail;
                        }
                        Value::EmptyList => break,
                        other => {
                            // improper list, dotted tail
                            write!(f, " . {other}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::EmptyList => write!(f, "()"),
            Value::Procedure(Procedure::Primitive(op)) => write!(f, "#<primitive:{}>", op.name),
            Value::Procedure(Procedure::Closure(_)) => write!(f, "#<procedure>"),
            Value::None => write!(f, "#<none>"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as i64)
            }
        }
    };
}

// Generate From implementations for all integer types
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        proper_list(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        proper_list(arr.into_iter().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Integer(n) = self {
            Ok(n)
        } else {
            Err(Error::TypeMismatch(format!(
                "expected an integer, got {}",
                self.type_name()
            )))
        }
    }
}

impl std::convert::TryInto<bool> for Value {
    type Error = Error;

    fn try_into(self) -> Result<bool, Error> {
        if let Value::Boolean(b) = self {
            Ok(b)
        } else {
            Err(Error::TypeMismatch(format!(
                "expected a boolean, got {}",
                self.type_name()
            )))
        }
    }
}

/// Helper function for creating quoted symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating identifiers
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn ident<S: AsRef<str>>(name: S) -> Value {
    Value::Identifier(name.as_ref().to_owned())
}

/// Helper function for creating Values from Rust literals, arrays and vectors
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating the empty list (nil)
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::EmptyList
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Identifier(a), Value::Identifier(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => a == b,
            (Value::EmptyList, Value::EmptyList) => true,
            (Value::Procedure(a), Value::Procedure(b)) => a == b,
            (Value::None, _) | (_, Value::None) => false, // None never equals anything
            _ => false, // Different variants are never equal
        }
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Primitives are unique registry entries, compare by name
            (Procedure::Primitive(a), Procedure::Primitive(b)) => a.name == b.name,
            (Procedure::Closure(a), Procedure::Closure(b)) => {
                a.formals == b.formals && *a.body == *b.body && a.env == b.env
            }
            _ => false,
        }
    }
}
