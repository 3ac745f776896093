//! Diagnostic reporting
//!
//! The compiler core never renders diagnostics; it pushes structured
//! messages into a [`Reporter`] and forgets about them. The driver decides
//! between passes whether enough went wrong to stop.

use crate::common::Node;
use miette::Diagnostic;
use thiserror::Error;

/// How bad a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Unimplemented feature was reached
    Sorry,
    /// An internal invariant broke
    Internal,
    /// The input is wrong and compilation cannot produce output
    Fatal,
    /// Suspicious but recoverable
    Warn,
    /// Verbose progress information
    Info,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Sorry => "sorry",
            Severity::Internal => "internal",
            Severity::Fatal => "fatal",
            Severity::Warn => "warn",
            Severity::Info => "info",
        }
    }

    /// Does this severity prevent the next pass from running?
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Sorry | Severity::Internal | Severity::Fatal)
    }
}

/// Compiler diagnostic
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CompileError {
    #[error("`{name}` is already defined in this scope")]
    #[diagnostic(code(sema::shadow))]
    Shadow {
        name: String,
        node: Node,
        previous: Node,
    },

    #[error("`{name}` is not defined")]
    #[diagnostic(code(sema::unresolved))]
    Unresolved { name: String, node: Node },

    #[error("type mismatch: {message}")]
    #[diagnostic(code(sema::type_mismatch))]
    TypeMismatch { message: String, node: Node },

    #[error("division by zero")]
    #[diagnostic(code(fold::divide_by_zero))]
    DivideByZero { node: Node },

    #[error("no mangled form for `{name}`")]
    #[diagnostic(code(ssa::unknown_mangle))]
    UnknownMangle { name: String, node: Node },

    #[error("failed to write `{path}`: {message}")]
    #[diagnostic(code(emit::io))]
    EmitIo { path: String, message: String },
}

impl CompileError {
    pub fn severity(&self) -> Severity {
        match self {
            CompileError::Shadow { .. }
            | CompileError::Unresolved { .. }
            | CompileError::TypeMismatch { .. }
            | CompileError::DivideByZero { .. }
            | CompileError::EmitIo { .. } => Severity::Fatal,
            CompileError::UnknownMangle { .. } => Severity::Warn,
        }
    }
}

/// A single pushed diagnostic
#[derive(Debug, Clone)]
pub struct Message {
    pub severity: Severity,
    pub node: Option<Node>,
    pub text: String,
    /// Extra context lines the sink may render under the message
    pub notes: Vec<String>,
}

/// Diagnostic sink that collects messages for the driver
#[derive(Debug, Default)]
pub struct Reporter {
    messages: Vec<Message>,
    errors: Vec<CompileError>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a typed error; severity comes from the error kind
    pub fn error(&mut self, error: CompileError) {
        self.messages.push(Message {
            severity: error.severity(),
            node: None,
            text: error.to_string(),
            notes: Vec::new(),
        });
        self.errors.push(error);
    }

    /// Push a free-form message at an explicit severity
    pub fn report(&mut self, severity: Severity, node: Node, text: impl Into<String>) {
        self.messages.push(Message {
            severity,
            node: Some(node),
            text: text.into(),
            notes: Vec::new(),
        });
    }

    /// Attach a note to the most recent message
    pub fn note(&mut self, text: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.notes.push(text.into());
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.messages.iter().any(|m| m.severity.is_fatal())
    }

    pub fn fatal_count(&self) -> usize {
        self.messages.iter().filter(|m| m.severity.is_fatal()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Warn)
            .count()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Print all collected typed errors through miette
    pub fn emit_all(&self) {
        for error in &self.errors {
            eprintln!("{:?}", miette::Report::new(error.clone()));
        }
    }

    /// Consume and return errors
    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors
    }
}
