//! Batch driver: input accumulation, evaluation, error recovery.
//!
//! [`Interpreter`] owns the long-lived global environment and a buffer of
//! pending source text. Lines are fed in one at a time; while the
//! accumulated text does not yet form complete expressions the driver
//! reports a single [`Status::Parsing`] step and waits. A completed batch
//! is evaluated form by form; the first error discards the rest of the
//! batch but leaves the global environment (and every definition evaluated
//! so far) intact, so subsequent input resumes cleanly.

use crate::evaluator::{self, Environment, Step};
use crate::parser;
use crate::{Error, ParseErrorKind};

/// The stateful driver behind a read/eval loop
pub struct Interpreter {
    env: Environment,
    buffer: String,
}

impl Interpreter {
    /// Create an interpreter with a fresh global environment and all
    /// builtins installed
    pub fn new() -> Self {
        Interpreter {
            env: evaluator::create_global_env(),
            buffer: String::new(),
        }
    }

    /// The long-lived global environment
    pub fn global_env(&self) -> &Environment {
        &self.env
    }

    /// Whether input is currently being accumulated toward a complete form
    pub fn is_accumulating(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Feed one line of source text.
    ///
    /// Returns every execution step the batch produced, in order. A lone
    /// `Parsing` step means the input is incomplete and more lines are
    /// expected. A parse error drops the buffered input; an evaluation
    /// error aborts the batch, discarding its remaining forms.
    pub fn feed(&mut self, line: &str) -> Result<Vec<Step>, Error> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);

        let forms = match parser::parse_program(&self.buffer) {
            Ok(forms) => forms,
            Err(Error::MalformedSyntax(e)) if e.kind == ParseErrorKind::Incomplete => {
                return Ok(vec![Step::parsing()]);
            }
            Err(e) => {
                self.buffer.clear();
                return Err(e);
            }
        };
        self.buffer.clear();

        let mut steps = Vec::new();
        for form in forms {
            log::trace!("evaluating {form}");
            for step in evaluator::evaluate(&form, &self.env) {
                steps.push(step?);
            }
        }
        Ok(steps)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
