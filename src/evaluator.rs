//! Environments and the resumable evaluation engine.
//!
//! Evaluating an expression never returns a value directly. It produces an
//! ordered, lazily-advanced sequence of [`Step`] messages, realized as the
//! [`Evaluation`] iterator: an explicit resumable state object advanced one
//! message at a time. Sub-evaluations are nested `Evaluation`s whose
//! non-terminal messages are forwarded upward unchanged, so the stream for a
//! deeply nested call tree exposes every procedure-call boundary to the
//! driver. Exactly one [`Status::Done`] message terminates any sequence, and
//! it is always the last message.
//!
//! This models single-threaded cooperative suspension, not parallelism: a
//! driver may pull some messages, do unrelated work, and resume pulling
//! later. A sequence that is dropped mid-flight is permanently abandoned.
//!
//! Environments are parent-chained frames behind shared-ownership handles,
//! so a frame lives exactly as long as something still references it - the
//! evaluation in progress, or a closure that captured it.

use crate::ast::{Closure, Formals, Procedure, Value, proper_list};
use crate::builtinops::{OpKind, SpecialForm, install_builtins};
use crate::{Error, MAX_EVAL_DEPTH};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One scope level of the environment chain.
///
/// An `Environment` is a cheap handle; clones share the same frame.
/// Identifier uniqueness holds only within one frame - child frames may
/// shadow. Lookup and assignment walk outward from the current frame to the
/// root; reaching the root without success is an error, never a default.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

#[derive(Debug, Default)]
struct Frame {
    parent: Option<Environment>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Create a new root (global) frame
    pub fn new() -> Self {
        Environment::default()
    }

    /// Create a new empty frame chained under `parent`
    ///
    /// The child holds a handle to the parent, not a copy: mutations of the
    /// parent frame stay visible through the child.
    pub fn with_parent(parent: &Environment) -> Self {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                parent: Some(parent.clone()),
                bindings: HashMap::new(),
            })),
        }
    }

    pub fn has_parent(&self) -> bool {
        self.frame.borrow().parent.is_some()
    }

    /// Bind a new identifier in this frame.
    /// Fails with DuplicateDefinition if `id` already exists in this frame
    /// (shadowing an outer frame is fine).
    pub fn define(&self, id: &str, value: Value) -> Result<(), Error> {
        let mut frame = self.frame.borrow_mut();
        if frame.bindings.contains_key(id) {
            return Err(Error::DuplicateDefinition(id.to_owned()));
        }
        frame.bindings.insert(id.to_owned(), value);
        Ok(())
    }

    /// Mutate the nearest frame in the chain that already binds `id`.
    /// Fails with UnboundIdentifier if no frame in the chain binds it.
    pub fn assign(&self, id: &str, value: Value) -> Result<(), Error> {
        let mut current = self.clone();
        loop {
            {
                let mut frame = current.frame.borrow_mut();
                if frame.bindings.contains_key(id) {
                    frame.bindings.insert(id.to_owned(), value);
                    return Ok(());
                }
            }
            let parent = current.frame.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return Err(Error::UnboundIdentifier(id.to_owned())),
            }
        }
    }

    /// Mutate `id` only if it exists in this frame; no outward walk.
    /// Used to bind call parameters without risk of mutating an outer scope.
    pub fn set_local(&self, id: &str, value: Value) -> Result<(), Error> {
        let mut frame = self.frame.borrow_mut();
        if frame.bindings.contains_key(id) {
            frame.bindings.insert(id.to_owned(), value);
            Ok(())
        } else {
            Err(Error::UnboundIdentifier(id.to_owned()))
        }
    }

    /// Resolve `id`, walking outward from this frame to the root.
    /// Returns an independent copy of the bound value.
    pub fn lookup(&self, id: &str) -> Result<Value, Error> {
        let mut current = self.clone();
        loop {
            {
                let frame = current.frame.borrow();
                if let Some(value) = frame.bindings.get(id) {
                    return Ok(value.clone());
                }
            }
            let parent = current.frame.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return Err(Error::UnboundIdentifier(id.to_owned())),
            }
        }
    }

    /// Get all bindings visible from this frame, outer bindings shadowed
    /// by inner ones. Returns (name, value) pairs sorted by name.
    pub fn all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();
        let mut chain = Vec::new();

        // Collect the chain root-first so inner frames override
        let mut current = Some(self.clone());
        while let Some(env) = current {
            current = env.frame.borrow().parent.clone();
            chain.push(env);
        }
        for env in chain.into_iter().rev() {
            for (name, value) in &env.frame.borrow().bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        // Frame identity, not contents: two frames with equal bindings are
        // still different scopes
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

/// Status tag of one execution message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No complete form yet; produced by a driver's input-accumulation
    /// phase, never by evaluation itself
    Parsing,
    /// Terminal; the payload is the evaluation's result. Always the last
    /// message of a sequence.
    Done,
    /// Reserved interposition point before a primitive runs. Defined for
    /// drivers to match on, but the current dispatcher never emits it.
    PendingPrimitive,
    /// A user-defined procedure's body is about to begin evaluating; the
    /// payload is the original call expression. The steppable suspension
    /// point exposed to drivers.
    PendingStep,
}

/// One execution message: a status and a payload value
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub status: Status,
    pub value: Value,
}

impl Step {
    pub(crate) fn done(value: Value) -> Self {
        Step {
            status: Status::Done,
            value,
        }
    }

    pub(crate) fn pending_step(call: Value) -> Self {
        Step {
            status: Status::PendingStep,
            value: call,
        }
    }

    pub(crate) fn parsing() -> Self {
        Step {
            status: Status::Parsing,
            value: Value::None,
        }
    }
}

/// Auxiliary call-stack list, pushed on closure entry and popped on exit.
///
/// Exists purely for introspection and debugging (the `debug` builtin reads
/// its depth); dispatch never consults it. Shared by every nested evaluation
/// of one top-level `evaluate` call.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    calls: Rc<RefCell<Vec<Value>>>,
}

impl CallStack {
    fn push(&self, call: Value) {
        self.calls.borrow_mut().push(call);
    }

    fn pop(&self) {
        self.calls.borrow_mut().pop();
    }

    /// Number of user-procedure calls currently entered
    pub fn depth(&self) -> usize {
        self.calls.borrow().len()
    }
}

/// Evaluate an expression against an environment (public API).
///
/// Returns the lazily-advanced message sequence; drive it with `next()` or
/// a `for` loop. Use [`eval`] when only the terminal value is wanted.
pub fn evaluate(expr: &Value, env: &Environment) -> Evaluation {
    Evaluation::new(expr.clone(), env.clone(), CallStack::default(), 0)
}

/// Drive an evaluation to completion and return its terminal value
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    let mut result = Value::None;
    for step in evaluate(expr, env) {
        let step = step?;
        if step.status == Status::Done {
            result = step.value;
        }
    }
    Ok(result)
}

/// Create a global environment with all built-in operations installed
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    if let Err(e) = install_builtins(&env) {
        // cannot happen on a fresh root frame; surface rather than panic
        log::error!("builtin installation failed: {e}");
    }
    env
}

/// The resumable state object for one (sub-)evaluation.
///
/// Implements `Iterator`; each `next()` advances to the following execution
/// message. After the terminal `Done` message or an error the iterator is
/// fused. Errors abort the entire in-flight sequence - there is no partial
/// recovery within one evaluation.
pub struct Evaluation {
    env: Environment,
    stack: CallStack,
    depth: usize,
    state: State,
}

enum State {
    /// Dispatch has not started yet
    Start(Value),
    /// Operator position evaluating
    Operator {
        sub: Box<Evaluation>,
        args: Vec<Value>,
        call: Value,
    },
    /// Pre-evaluating argument expressions, left to right
    Arguments {
        proc: Procedure,
        sub: Box<Evaluation>,
        pending: std::vec::IntoIter<Value>,
        evaluated: Vec<Value>,
        call: Value,
    },
    /// A closure body evaluating; pops the call stack on completion
    ClosureBody { sub: Box<Evaluation> },
    /// Forwarding a nested evaluation verbatim, terminal message included
    Forward { sub: Box<Evaluation> },
    /// `if` test evaluating; the chosen branch is then forwarded
    IfTest {
        sub: Box<Evaluation>,
        then_branch: Value,
        else_branch: Value,
    },
    /// Statement sequence (`begin`, `let` body): every statement's
    /// non-terminal messages are forwarded, every terminal value except the
    /// final statement's is discarded
    Sequence {
        sub: Box<Evaluation>,
        rest: std::vec::IntoIter<Value>,
        seq_env: Environment,
    },
    /// `let` binding value evaluating in the outer environment
    LetBinding {
        sub: Box<Evaluation>,
        name: String,
        rest: std::vec::IntoIter<(String, Value)>,
        frame: Environment,
        body: Vec<Value>,
    },
    /// `define` value expression evaluating
    DefineValue { sub: Box<Evaluation>, name: String },
    /// Terminal: the Done message or an error has been produced
    Finished,
}

impl Evaluation {
    fn new(expr: Value, env: Environment, stack: CallStack, depth: usize) -> Self {
        Evaluation {
            env,
            stack,
            depth,
            state: State::Start(expr),
        }
    }

    /// Nested evaluation of `expr` in this evaluation's environment
    fn nested(&self, expr: Value) -> Box<Evaluation> {
        self.nested_in(expr, self.env.clone())
    }

    /// Nested evaluation of `expr` in a specific environment
    fn nested_in(&self, expr: Value, env: Environment) -> Box<Evaluation> {
        Box::new(Evaluation::new(
            expr,
            env,
            self.stack.clone(),
            self.depth + 1,
        ))
    }

    fn finish(&mut self, value: Value) -> Option<Result<Step, Error>> {
        self.state = State::Finished;
        Some(Ok(Step::done(value)))
    }

    fn fail(&mut self, error: Error) -> Option<Result<Step, Error>> {
        self.state = State::Finished;
        Some(Err(error))
    }

    /// The operator position has evaluated to `head`; validate and route.
    ///
    /// Returns `Ok(Some(step))` to emit a message now, `Ok(None)` after
    /// installing a follow-up state.
    fn dispatch(
        &mut self,
        head: Value,
        args: Vec<Value>,
        call: Value,
    ) -> Result<Option<Step>, Error> {
        let proc = match head {
            Value::Procedure(proc) => proc,
            other => {
                return Err(Error::NotApplicable(format!(
                    "{} is not a procedure in {call}",
                    other.type_name()
                )));
            }
        };

        // Arity is validated before any argument evaluation
        let arity_check = match &proc {
            Procedure::Primitive(op) => op.arity.validate(args.len()),
            Procedure::Closure(_) => match proc.fixed_arity() {
                Some(expected) if args.len() != expected => {
                    Err(Error::arity_mismatch(expected, args.len()))
                }
                _ => Ok(()),
            },
        };
        if let Err(Error::ArityMismatch { expected, got, .. }) = arity_check {
            return Err(Error::arity_mismatch_with_expr(
                expected,
                got,
                call.to_string(),
            ));
        }

        if proc.pre_evaluates() {
            let mut pending = args.into_iter();
            if let Some(first) = pending.next() {
                let sub = self.nested(first);
                self.state = State::Arguments {
                    proc,
                    sub,
                    pending,
                    evaluated: Vec::new(),
                    call,
                };
                return Ok(None);
            }
            return self.invoke(proc, Vec::new(), call);
        }
        self.invoke(proc, args, call)
    }

    /// Invoke a procedure with its (possibly unevaluated) arguments
    fn invoke(
        &mut self,
        proc: Procedure,
        args: Vec<Value>,
        call: Value,
    ) -> Result<Option<Step>, Error> {
        match proc {
            Procedure::Primitive(op) => match &op.kind {
                OpKind::Function(f) => {
                    let value = f(&args)?;
                    self.state = State::Finished;
                    Ok(Some(Step::done(value)))
                }
                OpKind::Form(form) => self.begin_form(*form, args),
            },
            Procedure::Closure(closure) => self.apply_closure(&closure, args, call),
        }
    }

    /// Bind arguments into a fresh application frame and enter the body.
    ///
    /// The frame is a child of the closure's captured environment,
    /// pre-populated with placeholder bindings for the formals and then
    /// bound via `set_local`, so parameter binding can never touch an outer
    /// scope. Allocating the frame per call (rather than reusing one frame
    /// across applications) keeps recursive and re-entrant calls of the
    /// same closure value from clobbering each other's parameters.
    fn apply_closure(
        &mut self,
        closure: &Closure,
        args: Vec<Value>,
        call: Value,
    ) -> Result<Option<Step>, Error> {
        let frame = Environment::with_parent(&closure.env);
        for name in closure.formals.names() {
            frame.define(name, Value::None)?;
        }
        match &closure.formals {
            Formals::Fixed(names) => {
                // Arity was validated before argument evaluation
                for (name, arg) in names.iter().zip(args) {
                    frame.set_local(name, arg)?;
                }
            }
            Formals::Variadic(name) => {
                frame.set_local(name, proper_list(args))?;
            }
        }

        self.stack.push(call.clone());
        log::trace!("entering {call} (call depth {})", self.stack.depth());
        let sub = self.nested_in((*closure.body).clone(), frame);
        self.state = State::ClosureBody { sub };
        // The call-stack checkpoint: emitted strictly before any message
        // from the body's evaluation
        Ok(Some(Step::pending_step(call)))
    }

    /// Install the state machine for a special form
    fn begin_form(&mut self, form: SpecialForm, args: Vec<Value>) -> Result<Option<Step>, Error> {
        match form {
            SpecialForm::If => {
                let [test, then_branch, else_branch] = <[Value; 3]>::try_from(args)
                    .map_err(|args| Error::arity_mismatch(3, args.len()))?;
                let sub = self.nested(test);
                self.state = State::IfTest {
                    sub,
                    then_branch,
                    else_branch,
                };
                Ok(None)
            }
            SpecialForm::Begin => {
                self.enter_sequence(args, self.env.clone())?;
                Ok(None)
            }
            SpecialForm::Define => {
                if self.env.has_parent() {
                    return Err(Error::ScopeViolation(
                        "define is only allowed at global scope".into(),
                    ));
                }
                let [name_expr, value_expr] = <[Value; 2]>::try_from(args)
                    .map_err(|args| Error::arity_mismatch(2, args.len()))?;
                let name = match name_expr {
                    Value::Identifier(name) => name,
                    other => {
                        return Err(Error::TypeMismatch(format!(
                            "define requires an identifier, got {}",
                            other.type_name()
                        )));
                    }
                };
                let sub = self.nested(value_expr);
                self.state = State::DefineValue { sub, name };
                Ok(None)
            }
            SpecialForm::Lambda => {
                let [spec, body] = <[Value; 2]>::try_from(args)
                    .map_err(|args| Error::arity_mismatch(2, args.len()))?;
                let formals = parse_formals(&spec)?;
                let closure = Closure::new(formals, body, self.env.clone());
                self.state = State::Finished;
                Ok(Some(Step::done(Value::Procedure(Procedure::Closure(
                    closure,
                )))))
            }
            SpecialForm::Let => {
                let mut parts = args.into_iter();
                let Some(bindings_expr) = parts.next() else {
                    return Err(Error::arity_mismatch(2, 0));
                };
                let body: Vec<Value> = parts.collect();
                let bindings = parse_let_bindings(&bindings_expr)?;

                // Binding values are evaluated in the *outer* environment;
                // only the body sees the new frame
                let frame = Environment::with_parent(&self.env);
                let mut rest = bindings.into_iter();
                if let Some((name, value_expr)) = rest.next() {
                    let sub = self.nested(value_expr);
                    self.state = State::LetBinding {
                        sub,
                        name,
                        rest,
                        frame,
                        body,
                    };
                } else {
                    self.enter_sequence(body, frame)?;
                }
                Ok(None)
            }
            SpecialForm::Eval => {
                // The argument was pre-evaluated; its value is now
                // evaluated as syntax in the current environment
                let [expr] = <[Value; 1]>::try_from(args)
                    .map_err(|args| Error::arity_mismatch(1, args.len()))?;
                let sub = self.nested(expr);
                self.state = State::Forward { sub };
                Ok(None)
            }
            SpecialForm::Debug => {
                let [expr] = <[Value; 1]>::try_from(args)
                    .map_err(|args| Error::arity_mismatch(1, args.len()))?;
                log::debug!("debug: {expr:?} (call depth {})", self.stack.depth());
                self.state = State::Finished;
                Ok(Some(Step::done(Value::None)))
            }
        }
    }

    /// Enter the begin-rule over `statements` in `env`
    fn enter_sequence(&mut self, statements: Vec<Value>, env: Environment) -> Result<(), Error> {
        let mut rest = statements.into_iter();
        let Some(first) = rest.next() else {
            // begin and let bodies require at least one statement
            return Err(Error::arity_mismatch(1, 0));
        };
        let sub = self.nested_in(first, env.clone());
        self.state = State::Sequence {
            sub,
            rest,
            seq_env: env,
        };
        Ok(())
    }
}

impl Iterator for Evaluation {
    type Item = Result<Step, Error>;

    #[expect(clippy::too_many_lines)] // one arm per state keeps the machine auditable
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Finished) {
                State::Finished => return None,

                State::Start(expr) => {
                    if self.depth >= MAX_EVAL_DEPTH {
                        return self.fail(Error::DepthExceeded(MAX_EVAL_DEPTH));
                    }
                    match expr {
                        // Variable lookup
                        Value::Identifier(name) => {
                            return match self.env.lookup(&name) {
                                Ok(value) => self.finish(value),
                                Err(e) => self.fail(e),
                            };
                        }
                        // Application: must be a proper list
                        Value::Pair(_) => {
                            let Some(members) = expr.proper_elements() else {
                                return self.fail(Error::ImproperApplication(format!(
                                    "cannot apply dotted list {expr}"
                                )));
                            };
                            let mut members = members.into_iter();
                            let Some(operator) = members.next() else {
                                // a Pair always flattens to at least one member
                                return self.fail(Error::NotApplicable(
                                    "nothing to apply".into(),
                                ));
                            };
                            let sub = self.nested(operator);
                            self.state = State::Operator {
                                sub,
                                args: members.collect(),
                                call: expr,
                            };
                        }
                        // Everything else is a self-evaluating atom
                        other => return self.finish(other),
                    }
                }

                State::Operator {
                    mut sub,
                    args,
                    call,
                } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::Operator { sub, args, call };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => match self.dispatch(step.value, args, call) {
                        Ok(Some(emit)) => return Some(Ok(emit)),
                        Ok(None) => {}
                        Err(e) => return self.fail(e),
                    },
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::Arguments {
                    proc,
                    mut sub,
                    mut pending,
                    mut evaluated,
                    call,
                } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::Arguments {
                            proc,
                            sub,
                            pending,
                            evaluated,
                            call,
                        };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => {
                        evaluated.push(step.value);
                        if let Some(next_arg) = pending.next() {
                            let sub = self.nested(next_arg);
                            self.state = State::Arguments {
                                proc,
                                sub,
                                pending,
                                evaluated,
                                call,
                            };
                        } else {
                            match self.invoke(proc, evaluated, call) {
                                Ok(Some(emit)) => return Some(Ok(emit)),
                                Ok(None) => {}
                                Err(e) => return self.fail(e),
                            }
                        }
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::ClosureBody { mut sub } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::ClosureBody { sub };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => {
                        self.stack.pop();
                        return self.finish(step.value);
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::Forward { mut sub } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::Forward { sub };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => return self.finish(step.value),
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::IfTest {
                    mut sub,
                    then_branch,
                    else_branch,
                } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::IfTest {
                            sub,
                            then_branch,
                            else_branch,
                        };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => match step.value {
                        // Only the chosen branch is ever evaluated
                        Value::Boolean(true) => {
                            self.state = State::Forward {
                                sub: self.nested(then_branch),
                            };
                        }
                        Value::Boolean(false) => {
                            self.state = State::Forward {
                                sub: self.nested(else_branch),
                            };
                        }
                        other => {
                            return self.fail(Error::TypeMismatch(format!(
                                "if test must be a boolean, got {}",
                                other.type_name()
                            )));
                        }
                    },
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::Sequence {
                    mut sub,
                    mut rest,
                    seq_env,
                } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::Sequence { sub, rest, seq_env };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => {
                        if let Some(next_statement) = rest.next() {
                            // terminal values of non-final statements are
                            // discarded; their side effects have happened
                            let sub = self.nested_in(next_statement, seq_env.clone());
                            self.state = State::Sequence { sub, rest, seq_env };
                        } else {
                            return self.finish(step.value);
                        }
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::LetBinding {
                    mut sub,
                    name,
                    mut rest,
                    frame,
                    body,
                } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::LetBinding {
                            sub,
                            name,
                            rest,
                            frame,
                            body,
                        };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => {
                        if let Err(e) = frame.define(&name, step.value) {
                            return self.fail(e);
                        }
                        if let Some((next_name, next_expr)) = rest.next() {
                            let sub = self.nested(next_expr);
                            self.state = State::LetBinding {
                                sub,
                                name: next_name,
                                rest,
                                frame,
                                body,
                            };
                        } else if let Err(e) = self.enter_sequence(body, frame) {
                            return self.fail(e);
                        }
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },

                State::DefineValue { mut sub, name } => match sub.next() {
                    Some(Ok(step)) if step.status != Status::Done => {
                        self.state = State::DefineValue { sub, name };
                        return Some(Ok(step));
                    }
                    Some(Ok(step)) => {
                        return match self.env.define(&name, step.value) {
                            Ok(()) => self.finish(Value::None),
                            Err(e) => self.fail(e),
                        };
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => return None,
                },
            }
        }
    }
}

/// Inspect a lambda parameter spec: a single raw identifier builds a
/// variadic closure; a proper list of identifiers builds a fixed-arity one.
fn parse_formals(spec: &Value) -> Result<Formals, Error> {
    match spec {
        Value::Identifier(name) => Ok(Formals::Variadic(name.clone())),
        Value::Pair(_) | Value::EmptyList => {
            let Some(members) = spec.proper_elements() else {
                return Err(Error::TypeMismatch(
                    "lambda parameter list must be a proper list".into(),
                ));
            };
            let mut names = Vec::with_capacity(members.len());
            for member in members {
                let name = match member {
                    Value::Identifier(name) => name,
                    other => {
                        return Err(Error::TypeMismatch(format!(
                            "lambda parameters must be identifiers, got {}",
                            other.type_name()
                        )));
                    }
                };
                if names.contains(&name) {
                    return Err(Error::DuplicateDefinition(name));
                }
                names.push(name);
            }
            Ok(Formals::Fixed(names))
        }
        other => Err(Error::TypeMismatch(format!(
            "lambda parameters must be an identifier or a list, got {}",
            other.type_name()
        ))),
    }
}

/// Flatten a let binding list into (name, value expression) pairs
fn parse_let_bindings(expr: &Value) -> Result<Vec<(String, Value)>, Error> {
    let Some(members) = expr.proper_elements() else {
        return Err(Error::TypeMismatch(
            "let bindings must be a proper list".into(),
        ));
    };
    let mut bindings = Vec::with_capacity(members.len());
    for member in members {
        let pair = member
            .proper_elements()
            .and_then(|elements| <[Value; 2]>::try_from(elements).ok())
            .ok_or_else(|| {
                Error::TypeMismatch("let binding must be a (name value) pair".into())
            })?;
        let [name_expr, value_expr] = pair;
        let name = match name_expr {
            Value::Identifier(name) => name,
            other => {
                return Err(Error::TypeMismatch(format!(
                    "let binding name must be an identifier, got {}",
                    other.type_name()
                )));
            }
        };
        bindings.push((name, value_expr));
    }
    Ok(bindings)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{cons, ident, nil, sym, val};
    use crate::parser::parse_expression;

    //
    // Environment unit tests
    //

    #[test]
    fn test_environment_define_and_lookup() {
        let env = Environment::new();
        env.define("x", val(1)).unwrap();
        assert_eq!(env.lookup("x").unwrap(), val(1));

        // Duplicate definition in the same frame fails
        match env.define("x", val(2)).unwrap_err() {
            crate::Error::DuplicateDefinition(name) => assert_eq!(name, "x"),
            other => panic!("expected DuplicateDefinition, got {other:?}"),
        }

        // Lookup walks outward and never returns a default
        match env.lookup("missing").unwrap_err() {
            crate::Error::UnboundIdentifier(name) => assert_eq!(name, "missing"),
            other => panic!("expected UnboundIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn test_environment_shadowing() {
        let root = Environment::new();
        root.define("x", val(1)).unwrap();
        let child = Environment::with_parent(&root);

        // Child sees the outer binding until it shadows it
        assert_eq!(child.lookup("x").unwrap(), val(1));
        child.define("x", val(2)).unwrap();
        assert_eq!(child.lookup("x").unwrap(), val(2));
        assert_eq!(root.lookup("x").unwrap(), val(1));
    }

    #[test]
    fn test_environment_lookup_depth() {
        // Unbound lookups fail at every nesting depth
        let mut env = Environment::new();
        for _ in 0..10 {
            env = Environment::with_parent(&env);
        }
        assert!(matches!(
            env.lookup("nope"),
            Err(crate::Error::UnboundIdentifier(_))
        ));
    }

    #[test]
    fn test_environment_assign_walks_outward() {
        let root = Environment::new();
        root.define("x", val(1)).unwrap();
        let child = Environment::with_parent(&root);
        let grandchild = Environment::with_parent(&child);

        // assign mutates the nearest binding frame through the chain
        grandchild.assign("x", val(99)).unwrap();
        assert_eq!(root.lookup("x").unwrap(), val(99));
        assert_eq!(grandchild.lookup("x").unwrap(), val(99));

        // the nearest frame wins when shadowed
        child.define("x", val(5)).unwrap();
        grandchild.assign("x", val(7)).unwrap();
        assert_eq!(child.lookup("x").unwrap(), val(7));
        assert_eq!(root.lookup("x").unwrap(), val(99));

        assert!(matches!(
            grandchild.assign("y", val(0)),
            Err(crate::Error::UnboundIdentifier(_))
        ));
    }

    #[test]
    fn test_environment_set_local_no_walk() {
        let root = Environment::new();
        root.define("x", val(1)).unwrap();
        let child = Environment::with_parent(&root);

        // set_local refuses to touch the outer frame
        assert!(matches!(
            child.set_local("x", val(2)),
            Err(crate::Error::UnboundIdentifier(_))
        ));
        assert_eq!(root.lookup("x").unwrap(), val(1));

        child.define("y", Value::None).unwrap();
        child.set_local("y", val(3)).unwrap();
        assert_eq!(child.lookup("y").unwrap(), val(3));
    }

    #[test]
    fn test_environment_identity_equality() {
        let a = Environment::new();
        let b = Environment::new();
        assert_ne!(a, b); // same (empty) contents, different frames
        assert_eq!(a, a.clone()); // clones share the frame
    }

    //
    // Step protocol tests
    //

    /// Drive an evaluation of source text, collecting every step
    fn steps_of(source: &str, env: &Environment) -> Result<Vec<Step>, crate::Error> {
        let expr = parse_expression(source).unwrap();
        evaluate(&expr, env).collect()
    }

    #[test]
    fn test_exactly_one_done_and_it_is_last() {
        let env = create_global_env();
        let sources = ["42", "(+ 1 2)", "((lambda (x) (* x x)) 4)", "(if #t 1 2)"];

        for source in sources {
            let steps = steps_of(source, &env).unwrap();
            let done_count = steps
                .iter()
                .filter(|s| s.status == Status::Done)
                .count();
            assert_eq!(done_count, 1, "{source}: exactly one Done");
            assert_eq!(
                steps.last().unwrap().status,
                Status::Done,
                "{source}: Done is last"
            );
        }
    }

    #[test]
    fn test_pending_step_precedes_body_messages() {
        let env = create_global_env();
        let steps = steps_of("((lambda (x) (+ x 1)) 41)", &env).unwrap();

        // Exactly one PendingStep, carrying the original call expression,
        // strictly before the terminal message
        let pending: Vec<usize> = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == Status::PendingStep)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(pending.len(), 1);
        assert!(pending[0] < steps.len() - 1);
        assert_eq!(
            format!("{}", steps[pending[0]].value),
            "((lambda (x) (+ x 1)) 41)"
        );
        assert_eq!(steps.last().unwrap(), &Step::done(val(42)));
    }

    #[test]
    fn test_pending_step_per_recursive_call() {
        let env = create_global_env();
        eval(
            &parse_expression(
                "(define fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))",
            )
            .unwrap(),
            &env,
        )
        .unwrap();

        // fact is entered once per call: 5 4 3 2 1 0
        let steps = steps_of("(fact 5)", &env).unwrap();
        let pending = steps
            .iter()
            .filter(|s| s.status == Status::PendingStep)
            .count();
        assert_eq!(pending, 6);
        assert_eq!(steps.last().unwrap(), &Step::done(val(120)));
    }

    #[test]
    fn test_pending_primitive_is_never_emitted() {
        let env = create_global_env();
        for source in ["(+ 1 2)", "(car (cons 1 2))", "((lambda (x) x) 5)"] {
            let steps = steps_of(source, &env).unwrap();
            assert!(
                steps.iter().all(|s| s.status != Status::PendingPrimitive),
                "{source}: PendingPrimitive is reserved"
            );
        }
    }

    #[test]
    fn test_iterator_fuses_after_done() {
        let env = create_global_env();
        let expr = parse_expression("(+ 1 2)").unwrap();
        let mut evaluation = evaluate(&expr, &env);
        let mut saw_done = false;
        while let Some(step) = evaluation.next() {
            saw_done = step.unwrap().status == Status::Done;
        }
        assert!(saw_done);
        assert!(evaluation.next().is_none());
        assert!(evaluation.next().is_none());
    }

    #[test]
    fn test_error_aborts_sequence() {
        let env = create_global_env();
        let expr = parse_expression("(+ 1 missing)").unwrap();
        let mut evaluation = evaluate(&expr, &env);
        let mut result = Ok(());
        for step in &mut evaluation {
            if let Err(e) = step {
                result = Err(e);
                break;
            }
        }
        assert!(matches!(result, Err(crate::Error::UnboundIdentifier(_))));
        // abandoned sequence yields nothing further
        assert!(evaluation.next().is_none());
    }

    #[test]
    fn test_depth_limit() {
        let env = create_global_env();
        eval(
            &parse_expression(
                "(define spin (lambda (n) (if (= n 0) 0 (+ 1 (spin (- n 1))))))",
            )
            .unwrap(),
            &env,
        )
        .unwrap();

        // Shallow recursion fits in the budget
        let expr = parse_expression("(spin 5)").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), val(5));

        // Deep recursion hits the structured limit, not the host stack
        let expr = parse_expression("(spin 100000)").unwrap();
        assert!(matches!(
            eval(&expr, &env),
            Err(crate::Error::DepthExceeded(_))
        ));
    }

    #[test]
    fn test_improper_application_via_eval() {
        let env = create_global_env();
        let expr = parse_expression("(eval (cons 1 2))").unwrap();
        assert!(matches!(
            eval(&expr, &env),
            Err(crate::Error::ImproperApplication(_))
        ));
    }

    //
    // Comprehensive language tests (shared-state, data-driven)
    //

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;
    // Explicit import disambiguates the bare `Error` variant from `crate::Error`,
    // which `use super::*` also brings into scope.
    use TestResult::Error;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions that return None (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::None))
        };
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let env = create_global_env();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &env, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, env: &Environment, test_id: &str) {
        let expr = match parse_expression(input) {
            Ok(expr) => expr,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (eval(&expr, env), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                // None matches by variant, never by equality
                match (&actual, expected_val) {
                    (Value::None, Value::None) => {}
                    _ => {
                        assert!(
                            !(actual != *expected_val),
                            "{test_id}: expected {expected_val:?}, got {actual:?}"
                        );
                    }
                }
            }
            (Err(_), Error) => {} // Expected generic error
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: expected error, got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: expected {expected_val:?}, got error {err:?}");
            }
        }
    }

    /// Simplified test runner: each case gets a fresh global environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = create_global_env();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &env, &test_id);
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("0", success(0)),
            ("9223372036854775807", success(i64::MAX)),
            ("#t", success(true)),
            ("#f", success(false)),
            ("'foo", EvalResult(sym("foo"))),
            ("'()", EvalResult(nil())),
            ("()", EvalResult(nil())),
            // === ARITHMETIC THROUGH DISPATCH ===
            ("(+ 1 2 3)", success(6)),
            ("(+)", success(0)),
            ("(+ 42)", success(42)),
            ("(- 10 3 2)", success(5)),
            ("(- 10)", success(-10)),
            ("(*)", success(1)),
            ("(* 2 3 4)", success(24)),
            ("(/ 10 2)", success(5)),
            ("(mod 10 3)", success(1)),
            ("(+ (* 2 3) (- 8 2))", success(12)),
            // Host arithmetic boundary failures
            ("(/ 1 0)", SpecificError("division by zero")),
            ("(mod 1 0)", Error),
            ("(+ 9223372036854775807 1)", Error),
            // Type failures propagate out of nested positions
            ("(+ 1 #t)", SpecificError("Type mismatch")),
            ("(+ 1 (car (cons #f 1)))", Error),
            // === COMPARISONS ===
            ("(= 5 5)", success(true)),
            ("(= 5 6)", success(false)),
            ("(> 5 3)", success(true)),
            ("(< 5 3)", success(false)),
            ("(= #t #t)", Error),
            ("(> 1 2 3)", SpecificError("Arity mismatch")),
            // === CONDITIONALS ===
            ("(if #t 1 2)", success(1)),
            ("(if #f 1 2)", success(2)),
            ("(if (> 5 3) 'yes 'no)", EvalResult(sym("yes"))),
            // Only the chosen branch is evaluated
            ("(if #t 1 missing)", success(1)),
            ("(if #f missing 2)", success(2)),
            // Strict boolean test, no truthiness
            ("(if 0 1 2)", SpecificError("boolean")),
            ("(if '() 1 2)", Error),
            ("(if #t 1)", SpecificError("Arity mismatch")),
            // === LIST OPERATIONS ===
            ("(car (cons 1 2))", success(1)),
            ("(cdr (cons 1 2))", success(2)),
            ("(car (list 1 2 3))", success(1)),
            ("(cdr (list 1 2 3))", success([2, 3])),
            ("(cons 1 (list 2 3))", success([1, 2, 3])),
            ("(list)", EvalResult(nil())),
            ("(list 1 2 3 4)", success([1, 2, 3, 4])),
            ("(null? '())", success(true)),
            ("(null? (list))", success(true)),
            ("(null? (cons 1 2))", success(false)),
            ("(null? 42)", success(false)),
            ("(car '())", Error),
            ("(cdr 5)", SpecificError("Type mismatch")),
            // === INTROSPECTION ===
            ("(typeof 3)", EvalResult(sym("integer"))),
            ("(typeof #t)", EvalResult(sym("boolean"))),
            ("(typeof 'x)", EvalResult(sym("symbol"))),
            ("(typeof (cons 1 2))", EvalResult(sym("pair"))),
            ("(typeof '())", EvalResult(sym("empty-list"))),
            ("(typeof (lambda (x) x))", EvalResult(sym("procedure"))),
            ("(typeof +)", EvalResult(sym("procedure"))),
            // === EVAL ===
            ("(eval 42)", success(42)),
            ("(eval (list + 1 2))", success(3)),
            ("(eval (cons 1 2))", SpecificError("Improper application")),
            // === DEBUG ===
            ("(debug (+ 1 2))", EvalResult(Value::None)),
            // === LAMBDA AND APPLICATION ===
            ("((lambda (x y) (+ x y)) 3 4)", success(7)),
            ("((lambda (x) (* x x)) 4)", success(16)),
            ("((lambda () 42))", success(42)),
            ("((lambda args args) 1 2 3)", success([1, 2, 3])),
            ("((lambda args args))", EvalResult(nil())),
            ("((lambda (x y) (+ x y)) 3)", SpecificError("Arity mismatch")),
            ("((lambda (x) x) 1 2)", SpecificError("Arity mismatch")),
            ("(lambda (x x) x)", Error), // duplicate formals
            ("(lambda 5 x)", SpecificError("Type mismatch")),
            // === OPERATOR POSITION ===
            // The operator is an evaluated expression like any other
            ("((if #t + *) 2 3)", success(5)),
            ("((if #f + *) 2 3)", success(6)),
            ("(1 2 3)", SpecificError("Not applicable")),
            ("(missing 1)", SpecificError("Unbound identifier")),
            // === LET ===
            ("(let ((x 5)) x)", success(5)),
            ("(let ((x 5) (y 3)) (+ x y))", success(8)),
            ("(let () 42)", success(42)),
            // Body statements run in sequence, last value wins
            ("(let ((x 1)) 2 3)", success(3)),
            // Binding values see the outer environment, not each other
            ("(let ((x 1) (y x)) y)", SpecificError("Unbound identifier")),
            ("(let ((x 1) (x 2)) x)", Error), // duplicate let names
            ("(let 5 1)", SpecificError("Type mismatch")),
            ("(let ((x)) x)", SpecificError("Type mismatch")),
            ("(let ((x 1)))", SpecificError("Arity mismatch")),
            // === BEGIN ===
            ("(begin 1 2 3)", success(3)),
            ("(begin 42)", success(42)),
            ("(begin)", SpecificError("Arity mismatch")),
            ("(begin missing 1)", Error),
            // === UNBOUND IDENTIFIERS ===
            ("missing", SpecificError("Unbound identifier: missing")),
            ("(+ 1 missing)", SpecificError("Unbound identifier")),
        ];

        run_comprehensive_tests(test_cases);

        // === ENVIRONMENT-SENSITIVE TESTS ===
        // Tests that require shared state between expressions
        let environment_test_cases = vec![
            // === DEFINE AND LOOKUP ===
            TestEnvironment(vec![
                test_setup!("(define x 42)"),
                ("x", success(42)),
                ("(+ x 8)", success(50)),
                ("y", Error),
            ]),
            // === DEFINE IS GLOBAL-ONLY AND SINGLE-SHOT ===
            TestEnvironment(vec![
                test_setup!("(define x 1)"),
                ("(define x 2)", SpecificError("already defined")),
                ("x", success(1)),
                (
                    "((lambda () (define y 1)))",
                    SpecificError("Scope violation"),
                ),
                (
                    "(let ((a 1)) (define y 2))",
                    SpecificError("Scope violation"),
                ),
                // begin at top level stays in the global frame
                ("(begin (define q 9) (+ q 1))", success(10)),
                ("q", success(9)),
            ]),
            // === BUILTINS ARE FIRST-CLASS VALUES ===
            TestEnvironment(vec![
                test_setup!("(define my-add +)"),
                ("(my-add 10 20)", success(30)),
                ("((lambda (op a b) (op a b)) * 3 4)", success(12)),
            ]),
            // === LEXICAL SCOPING AND GENUINE CLOSURES ===
            TestEnvironment(vec![
                test_setup!("(define x 10)"),
                test_setup!("(define make-adder (lambda (n) (lambda (x) (+ x n))))"),
                test_setup!("(define add5 (make-adder 5))"),
                ("(add5 3)", success(8)),
                // parameter shadowing leaves the global untouched
                test_setup!("(define f (lambda (x) (+ x 10)))"),
                ("(f 5)", success(15)),
                ("x", success(10)),
                ("(f x)", success(20)),
            ]),
            // === LET SHADOWING DOES NOT MUTATE THE OUTER BINDING ===
            TestEnvironment(vec![
                test_setup!("(define x 1)"),
                ("(let ((x 5)) x)", success(5)),
                ("x", success(1)),
                ("(let ((x 5)) (let ((x 6)) x))", success(6)),
                ("(let ((x 5)) (let ((y 6)) x))", success(5)),
                ("x", success(1)),
            ]),
            // === RECURSION THROUGH THE SHARED GLOBAL FRAME ===
            TestEnvironment(vec![
                test_setup!(
                    "(define fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))"
                ),
                ("(fact 0)", success(1)),
                ("(fact 5)", success(120)),
                ("(fact 10)", success(3628800)),
            ]),
            TestEnvironment(vec![
                // mutual recursion also resolves through the global frame
                test_setup!(
                    "(define even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))"
                ),
                test_setup!(
                    "(define odd? (lambda (n) (if (= n 0) #f (even? (- n 1)))))"
                ),
                ("(even? 4)", success(true)),
                ("(odd? 4)", success(false)),
                ("(odd? 7)", success(true)),
            ]),
            // === FRESH APPLICATION FRAMES PER CALL ===
            TestEnvironment(vec![
                // the parameter is read *after* the inner self-call; a
                // reused application frame would have clobbered it to 0
                test_setup!(
                    "(define g (lambda (n) (if (= n 0) 0 (begin (g (- n 1)) n))))"
                ),
                ("(g 3)", success(3)),
            ]),
            // === VARIADIC CLOSURES ===
            TestEnvironment(vec![
                test_setup!("(define pack (lambda args args))"),
                ("(pack 1 2 3)", success([1, 2, 3])),
                ("(pack)", EvalResult(nil())),
                ("(car (pack 'a 'b))", EvalResult(sym("a"))),
            ]),
            // === HIGHER-ORDER FUNCTIONS ===
            TestEnvironment(vec![
                test_setup!("(define twice (lambda (f x) (f (f x))))"),
                test_setup!("(define inc (lambda (x) (+ x 1)))"),
                ("(twice inc 5)", success(7)),
                test_setup!("(define compose (lambda (f g) (lambda (x) (f (g x)))))"),
                ("((compose inc inc) 1)", success(3)),
            ]),
            // === LIST BUILDING WITH RECURSION ===
            TestEnvironment(vec![
                test_setup!(
                    "(define countdown (lambda (n) (if (= n 0) '() (cons n (countdown (- n 1))))))"
                ),
                ("(countdown 3)", success([3, 2, 1])),
                ("(null? (countdown 0))", success(true)),
            ]),
        ];

        run_tests_in_environment(environment_test_cases);
    }

    #[test]
    fn test_closure_sees_later_global_definitions() {
        // The captured environment is shared, not copied: a closure defined
        // before a global exists still resolves it at call time
        let env = create_global_env();
        let define_user =
            parse_expression("(define use-late (lambda () late-value))").unwrap();
        eval(&define_user, &env).unwrap();

        let call = parse_expression("(use-late)").unwrap();
        assert!(matches!(
            eval(&call, &env),
            Err(crate::Error::UnboundIdentifier(_))
        ));

        let define_late = parse_expression("(define late-value 7)").unwrap();
        eval(&define_late, &env).unwrap();
        assert_eq!(eval(&call, &env).unwrap(), val(7));
    }

    #[test]
    fn test_begin_forwards_messages_and_discards_values() {
        let env = create_global_env();
        eval(
            &parse_expression("(define id (lambda (x) x))").unwrap(),
            &env,
        )
        .unwrap();

        // Three closure entries are visible in order; only the final
        // statement's value survives
        let expr = parse_expression("(begin (id 1) (id 2) (id 3))").unwrap();
        let steps: Vec<Step> = evaluate(&expr, &env)
            .collect::<Result<_, _>>()
            .unwrap();
        let pending: Vec<String> = steps
            .iter()
            .filter(|s| s.status == Status::PendingStep)
            .map(|s| format!("{}", s.value))
            .collect();
        assert_eq!(pending, vec!["(id 1)", "(id 2)", "(id 3)"]);
        assert_eq!(steps.last().unwrap(), &Step::done(val(3)));
    }

    #[test]
    fn test_arity_checked_before_argument_evaluation() {
        let env = create_global_env();
        // The argument would fail if evaluated; the arity check fires first
        let expr = parse_expression("(cons missing)").unwrap();
        assert!(matches!(
            eval(&expr, &env),
            Err(crate::Error::ArityMismatch { expected: 2, got: 1, .. })
        ));

        let expr = parse_expression("((lambda (x y) x) missing)").unwrap();
        assert!(matches!(
            eval(&expr, &env),
            Err(crate::Error::ArityMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_evaluate_does_not_mutate_inputs() {
        // Reads hand out independent copies: evaluating the same parsed
        // expression twice gives the same answer
        let env = create_global_env();
        let expr = parse_expression("(+ 1 2)").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), val(3));
        assert_eq!(eval(&expr, &env).unwrap(), val(3));
        assert_eq!(expr, cons(ident("+"), proper_list(vec![val(1), val(2)])));
    }
}
