//! stepscheme - execution core of a small Scheme-like language
//!
//! This crate provides the runtime value model, the lexically-scoped
//! environment chain, and an incremental (suspendable) evaluator that walks
//! parsed syntax trees and dispatches to primitive or user-defined
//! procedures. Evaluation does not return a value directly: it produces a
//! lazily-advanced sequence of execution messages, so a driver can observe
//! every procedure-call boundary and interleave other work between steps.
//!
//! ```scheme
//! (define square (lambda (x) (* x x)))
//! (square 7)                ; => 49, after one PendingStep message
//! (let ((x 5)) (+ x 1))     ; => 6
//! (car (cons 1 2))          ; => 1
//! ```
//!
//! ## Stepping protocol
//!
//! Each message carries a status and a payload value. `Done` is terminal and
//! always last; `PendingStep` marks the entry into a user-defined procedure's
//! body; `Parsing` is produced by the input-accumulation phase of a driver
//! while a form is still incomplete. Sub-evaluations forward their
//! non-terminal messages upward unchanged, so the stream for a deeply nested
//! call tree exposes every call boundary without the driver keeping a stack
//! of its own.
//!
//! ## Strict semantics
//!
//! This interpreter enforces stricter rules than most Scheme dialects:
//! - `if` tests must be actual booleans (no "truthiness")
//! - arithmetic is integer-only with overflow detection
//! - arity is validated before any argument is evaluated
//! - `define` is global-only and rebinding an identifier is an error
//!
//! ## Modules
//!
//! - `ast`: runtime values (atoms, cons cells, procedures)
//! - `parser`: S-expression parsing from text
//! - `evaluator`: environments and the resumable evaluation engine
//! - `builtinops`: built-in operations with arity and pre-evaluation policy
//! - `interp`: batch driver with input accumulation and error recovery

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures fed to the S-expression parser
pub const MAX_PARSE_DEPTH: usize = 32;

/// Maximum evaluation depth to prevent stack overflow in nested evaluation
/// Set higher than parse depth to allow for nested procedure applications
pub const MAX_EVAL_DEPTH: usize = 128;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// Implementation-imposed limit exceeded (integer literal overflow, etc.)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    /// Create a ParseError with context and found token
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Show some context before the error position where possible
        let context_start = error_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        // Replace newlines with visible markers for better error display
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the interpreter
///
/// Every failure aborts the evaluation it occurred in; there is no local
/// catch or retry. A driver presents the error, discards whatever remains of
/// the current input batch, and continues with the existing global
/// environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Parser-level failure; no node reached the evaluator
    MalformedSyntax(ParseError),
    /// Identifier not bound anywhere in the environment chain
    UnboundIdentifier(String),
    /// Identifier already bound in the frame being defined into
    DuplicateDefinition(String),
    /// `define` used outside the global scope
    ScopeViolation(String),
    /// Argument count does not match a procedure's declared arity
    ArityMismatch {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    /// Operation applied to a value of the wrong variant
    TypeMismatch(String),
    /// Application of a dotted (non-proper) list
    ImproperApplication(String),
    /// Operator position did not evaluate to a procedure
    NotApplicable(String),
    /// Nested evaluation exceeded MAX_EVAL_DEPTH
    DepthExceeded(usize),
}

impl Error {
    /// Create an ArityMismatch without expression context
    pub fn arity_mismatch(expected: usize, got: usize) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityMismatch with the offending call expression
    pub fn arity_mismatch_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityMismatch {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedSyntax(e) => {
                write!(f, "Malformed syntax: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::UnboundIdentifier(id) => write!(f, "Unbound identifier: {id}"),
            Error::DuplicateDefinition(id) => write!(f, "Identifier {id} is already defined"),
            Error::ScopeViolation(msg) => write!(f, "Scope violation: {msg}"),
            Error::ArityMismatch {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "Arity mismatch: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "Arity mismatch: procedure expected {expected} arguments but got {got}"
                ),
            },
            Error::TypeMismatch(msg) => write!(f, "Type mismatch: {msg}"),
            Error::ImproperApplication(msg) => write!(f, "Improper application: {msg}"),
            Error::NotApplicable(msg) => write!(f, "Not applicable: {msg}"),
            Error::DepthExceeded(limit) => {
                write!(f, "Evaluation depth limit exceeded (max: {limit})")
            }
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interp;
pub mod parser;
