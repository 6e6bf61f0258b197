//! Built-in operations registry.
//!
//! This module provides the registry of built-in operations installed into
//! the global environment, each carrying its arity policy and its
//! pre-evaluation flag.
//!
//! ## Functions vs special forms
//!
//! - **Functions** (`pre_evaluate = true`): the dispatcher evaluates every
//!   argument, left to right, before the host function runs (e.g. `+`,
//!   `car`, `cons`).
//! - **Special forms** (`pre_evaluate = false`): the operation receives raw,
//!   unevaluated argument syntax and decides what and when to evaluate
//!   (e.g. `if` evaluates only the chosen branch; `lambda` and `define` must
//!   see literal syntax, not values). Their evaluation logic lives in the
//!   evaluator's state machine; this registry only tags them.
//!
//! `eval` is the one special form with `pre_evaluate = true`: its argument
//! is evaluated normally and the *result* is then evaluated as syntax.
//!
//! ## Error handling
//!
//! This implementation enforces stricter semantics than standard Scheme:
//!
//! - **Type safety**: arithmetic and comparisons reject non-integers
//! - **Overflow detection**: checked arithmetic, reported as a type-level
//!   failure at the host boundary
//! - **Arity checking**: validated by the dispatcher before any argument is
//!   evaluated
//!
//! ## Adding new operations
//!
//! 1. Implement the function following the signature
//!    `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. Add a `PrimitiveOp` record to `BUILTIN_OPS` with name and arity
//! 3. Special forms additionally need a `SpecialForm` tag and a state-machine
//!    arm in `evaluator.rs`
//! 4. Add comprehensive tests covering edge cases and error conditions

use crate::Error;
use crate::ast::{NumberType, Procedure, Value, cons, proper_list};
use crate::evaluator::Environment;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Argument count policy for a builtin operation
///
/// `Exact` is the fixed-arity case: the dispatcher compares the actual
/// argument count against the declared count before evaluating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments
    Exact(usize),
    /// At least this many arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check if the given number of arguments satisfies this policy
    pub(crate) fn validate(&self, arg_count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(expected) if arg_count != *expected => {
                Err(Error::arity_mismatch(*expected, arg_count))
            }
            Arity::AtLeast(min) if arg_count < *min => {
                Err(Error::arity_mismatch(*min, arg_count))
            }
            _ => Ok(()),
        }
    }

    /// The declared count when this policy is fixed-arity
    pub(crate) fn exact_count(&self) -> Option<usize> {
        match self {
            Arity::Exact(n) => Some(*n),
            _ => None,
        }
    }
}

/// Represents the implementation of a built-in operation
pub enum OpKind {
    /// Regular function over evaluated argument values
    Function(fn(&[Value]) -> Result<Value, Error>),
    /// Special form driven by the evaluator's state machine; receives raw
    /// argument syntax (except `Eval`, see module docs)
    Form(SpecialForm),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Form(form) => write!(f, "Form({form:?})"),
        }
    }
}

/// Tags for the operations whose evaluation is interleaved with the
/// message protocol (they forward nested evaluation messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    If,
    Let,
    Define,
    Lambda,
    Begin,
    Eval,
    Debug,
}

/// Definition of a built-in operation
#[derive(Debug)]
pub struct PrimitiveOp {
    /// The identifier this operation is installed under
    pub name: &'static str,
    /// Expected number of arguments, validated before argument evaluation
    pub arity: Arity,
    /// Whether the dispatcher evaluates arguments before invocation
    pub pre_evaluate: bool,
    /// The implementation of this operation
    pub kind: OpKind,
}

impl PartialEq for PrimitiveOp {
    fn eq(&self, other: &Self) -> bool {
        // Registry entries are unique per name
        self.name == other.name
    }
}

//
// Builtin function implementations
//

/// Extract an integer operand or fail with the operation name in the message
fn expect_integer(op_name: &str, value: &Value) -> Result<NumberType, Error> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(Error::TypeMismatch(format!(
            "{op_name} requires integers, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for arg in args {
        sum = sum
            .checked_add(expect_integer("+", arg)?)
            .ok_or_else(|| Error::TypeMismatch("integer overflow in addition".into()))?;
    }
    Ok(Value::Integer(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    match args {
        [only] => {
            let n = expect_integer("-", only)?;
            n.checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| Error::TypeMismatch("integer overflow in negation".into()))
        }
        [first, rest @ ..] => {
            let mut result = expect_integer("-", first)?;
            for arg in rest {
                result = result
                    .checked_sub(expect_integer("-", arg)?)
                    .ok_or_else(|| {
                        Error::TypeMismatch("integer overflow in subtraction".into())
                    })?;
            }
            Ok(Value::Integer(result))
        }
        [] => Err(Error::arity_mismatch(1, 0)),
    }
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut product: NumberType = 1;
    for arg in args {
        product = product
            .checked_mul(expect_integer("*", arg)?)
            .ok_or_else(|| Error::TypeMismatch("integer overflow in multiplication".into()))?;
    }
    Ok(Value::Integer(product))
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => {
            let dividend = expect_integer("/", a)?;
            let divisor = expect_integer("/", b)?;
            if divisor == 0 {
                return Err(Error::TypeMismatch("division by zero".into()));
            }
            dividend
                .checked_div(divisor)
                .map(Value::Integer)
                .ok_or_else(|| Error::TypeMismatch("integer overflow in division".into()))
        }
        _ => Err(Error::arity_mismatch(2, args.len())),
    }
}

fn builtin_mod(args: &[Value]) -> Result<Value, Error> {
    match args {
        [a, b] => {
            let dividend = expect_integer("mod", a)?;
            let modulus = expect_integer("mod", b)?;
            if modulus == 0 {
                return Err(Error::TypeMismatch("mod by zero".into()));
            }
            dividend
                .checked_rem(modulus)
                .map(Value::Integer)
                .ok_or_else(|| Error::TypeMismatch("integer overflow in mod".into()))
        }
        _ => Err(Error::arity_mismatch(2, args.len())),
    }
}

// Macro to generate the binary integer comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [a, b] => {
                    let lhs = expect_integer($op_str, a)?;
                    let rhs = expect_integer($op_str, b)?;
                    Ok(Value::Boolean(lhs $op rhs))
                }
                _ => Err(Error::arity_mismatch(2, args.len())),
            }
        }
    };
}

numeric_comparison!(builtin_eq, ==, "=");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_lt, <, "<");

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        // Any tail is allowed; a non-list tail builds an improper list
        [head, tail] => Ok(cons(head.clone(), tail.clone())),
        _ => Err(Error::arity_mismatch(2, args.len())),
    }
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Pair(p)] => Ok(p.head.clone()),
        [other] => Err(Error::TypeMismatch(format!(
            "car requires a pair, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_mismatch(1, args.len())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Pair(p)] => Ok(p.tail.clone()),
        [other] => Err(Error::TypeMismatch(format!(
            "cdr requires a pair, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_mismatch(1, args.len())),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(proper_list(args.to_vec()))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Boolean(value.is_nil())),
        _ => Err(Error::arity_mismatch(1, args.len())),
    }
}

fn builtin_typeof(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Symbol(value.type_name().to_owned())),
        _ => Err(Error::arity_mismatch(1, args.len())),
    }
}

/// Registry of all built-in operations.
///
/// The registry layout is a single contiguous collection of `PrimitiveOp`
/// values for ease of auditing. The set of names installed here, with these
/// arity and pre-evaluation policies, is part of the conformance contract.
static BUILTIN_OPS: [PrimitiveOp; 21] = [
    // Arithmetic operations
    PrimitiveOp {
        name: "+",
        arity: Arity::Any, // zero arguments is the additive identity
        pre_evaluate: true,
        kind: OpKind::Function(builtin_add),
    },
    PrimitiveOp {
        name: "-",
        arity: Arity::AtLeast(1), // one argument negates
        pre_evaluate: true,
        kind: OpKind::Function(builtin_sub),
    },
    PrimitiveOp {
        name: "*",
        arity: Arity::Any, // zero arguments is the multiplicative identity
        pre_evaluate: true,
        kind: OpKind::Function(builtin_mul),
    },
    PrimitiveOp {
        name: "/",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_div),
    },
    PrimitiveOp {
        name: "mod",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_mod),
    },
    // Comparison operations
    PrimitiveOp {
        name: "=",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_eq),
    },
    PrimitiveOp {
        name: ">",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_gt),
    },
    PrimitiveOp {
        name: "<",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_lt),
    },
    // Control flow and binding forms; these see raw, unevaluated syntax
    PrimitiveOp {
        name: "if",
        arity: Arity::Exact(3),
        pre_evaluate: false,
        kind: OpKind::Form(SpecialForm::If),
    },
    PrimitiveOp {
        name: "let",
        arity: Arity::AtLeast(2), // binding list plus at least one body form
        pre_evaluate: false,
        kind: OpKind::Form(SpecialForm::Let),
    },
    PrimitiveOp {
        name: "define",
        arity: Arity::Exact(2),
        pre_evaluate: false,
        kind: OpKind::Form(SpecialForm::Define),
    },
    PrimitiveOp {
        name: "lambda",
        arity: Arity::Exact(2),
        pre_evaluate: false,
        kind: OpKind::Form(SpecialForm::Lambda),
    },
    PrimitiveOp {
        name: "begin",
        arity: Arity::AtLeast(1),
        pre_evaluate: false,
        kind: OpKind::Form(SpecialForm::Begin),
    },
    // List operations
    PrimitiveOp {
        name: "list",
        arity: Arity::Any,
        pre_evaluate: true,
        kind: OpKind::Function(builtin_list),
    },
    PrimitiveOp {
        name: "cons",
        arity: Arity::Exact(2),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_cons),
    },
    PrimitiveOp {
        name: "car",
        arity: Arity::Exact(1),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_car),
    },
    PrimitiveOp {
        name: "cdr",
        arity: Arity::Exact(1),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_cdr),
    },
    PrimitiveOp {
        name: "null?",
        arity: Arity::Exact(1),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_null),
    },
    // Introspection
    PrimitiveOp {
        name: "typeof",
        arity: Arity::Exact(1),
        pre_evaluate: true,
        kind: OpKind::Function(builtin_typeof),
    },
    PrimitiveOp {
        name: "eval",
        arity: Arity::Exact(1),
        pre_evaluate: true, // the evaluated argument is then evaluated as syntax
        kind: OpKind::Form(SpecialForm::Eval),
    },
    PrimitiveOp {
        name: "debug",
        arity: Arity::Exact(1),
        pre_evaluate: false, // logs the raw argument syntax
        kind: OpKind::Form(SpecialForm::Debug),
    },
];

/// Lazy static map from name to PrimitiveOp (private - use find_op)
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static PrimitiveOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

/// Find a builtin operation by name
pub(crate) fn find_op(name: &str) -> Option<&'static PrimitiveOp> {
    BUILTIN_INDEX.get(name).copied()
}

/// Register every builtin operation in the given environment under its
/// fixed name. Fails with DuplicateDefinition if any of the names is
/// already bound in the frame (e.g. when called twice on one environment).
pub fn install_builtins(env: &Environment) -> Result<(), Error> {
    for op in &BUILTIN_OPS {
        env.define(op.name, Value::Procedure(Procedure::Primitive(op)))?;
    }
    Ok(())
}
