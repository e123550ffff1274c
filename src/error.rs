//! Rich diagnostic error types for the markov-map engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the markov-map engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum MlnError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Kb(#[from] KbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ground(#[from] GroundError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Problem(#[from] ProblemError),
}

// ---------------------------------------------------------------------------
// Knowledge base errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("{role} atom signature {signature} is not declared in the knowledge base")]
    #[diagnostic(
        code(mln::kb::unknown_signature),
        help(
            "Every query, closed-world, open-world and evidence predicate must be \
             declared in the predicate schema with the same name and arity."
        )
    )]
    UnknownSignature { role: String, signature: String },

    #[error("predicate {signature} is declared both closed-world and open-world")]
    #[diagnostic(
        code(mln::kb::conflicting_world_assumption),
        help("Remove the predicate from either the CWA or the OWA list.")
    )]
    ConflictingWorldAssumption { signature: String },

    #[error("argument type \"{type_name}\" of {signature} has no constant domain")]
    #[diagnostic(
        code(mln::kb::unknown_type),
        help("Declare the constants of this type, or fix the predicate schema.")
    )]
    UnknownType { type_name: String, signature: String },

    #[error("constant \"{constant}\" is not in the domain of type \"{type_name}\"")]
    #[diagnostic(
        code(mln::kb::unknown_constant),
        help("Add the constant to the type's domain before asserting evidence about it.")
    )]
    UnknownConstant { constant: String, type_name: String },

    #[error("{signature} expects {expected} argument(s), got {actual}")]
    #[diagnostic(
        code(mln::kb::arity_mismatch),
        help("Check the atom against its predicate declaration.")
    )]
    ArityMismatch {
        signature: String,
        expected: usize,
        actual: usize,
    },

    #[error("clause {clause} has a NaN weight")]
    #[diagnostic(
        code(mln::kb::nan_weight),
        help("Clause weights must be finite reals or +/- infinity for hard constraints.")
    )]
    NanWeight { clause: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// Atom identity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IdentityError {
    #[error("ground atom id space overflow: {signature} needs {required} ids past {start}")]
    #[diagnostic(
        code(mln::identity::overflow),
        help(
            "The product of the argument domain sizes exceeds the 31-bit atom id space. \
             Reduce the constant domains or split the predicate."
        )
    )]
    DomainOverflow {
        signature: String,
        start: u64,
        required: u64,
    },

    #[error("atom id {id} does not belong to any predicate interval")]
    #[diagnostic(
        code(mln::identity::unknown_id),
        help("The id was not produced by this identity map. It may come from another run.")
    )]
    UnknownAtomId { id: u32 },

    #[error("no identity registered for {signature}")]
    #[diagnostic(
        code(mln::identity::unknown_signature),
        help("Dynamic predicates have no ground atom ids; only schema predicates do.")
    )]
    UnknownSignature { signature: String },
}

// ---------------------------------------------------------------------------
// Grounding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GroundError {
    #[error("clause #{clause} has a NaN weight")]
    #[diagnostic(
        code(mln::ground::nan_weight),
        help("A NaN weight cannot be grounded. Fix the clause weight in the knowledge base.")
    )]
    NanWeight { clause: usize },

    #[error("dynamic atom {signature} is not supported yet: no evaluator is registered")]
    #[diagnostic(
        code(mln::ground::unsupported_dynamic),
        help(
            "Register an evaluator for this predicate in the DynamicRegistry, \
             or rewrite the clause without it."
        )
    )]
    UnsupportedDynamicAtom { signature: String },

    #[error("variable {variable} of clause #{clause} never appears in a typed predicate")]
    #[diagnostic(
        code(mln::ground::untyped_variable),
        help(
            "Variables that only occur inside dynamic predicates have no domain. \
             Add a schema predicate that binds the variable."
        )
    )]
    UntypedVariable { variable: String, clause: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// Inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InferError {
    #[error("LP solver failed: {message}")]
    #[diagnostic(
        code(mln::infer::solver),
        help(
            "The external LP/ILP backend could not solve the relaxation. \
             Check for contradicting hard constraints in the ground network."
        )
    )]
    Solver { message: String },

    #[error("LP solver returned non-optimal status: {status}")]
    #[diagnostic(
        code(mln::infer::non_optimal),
        help(
            "The relaxation was not solved to optimality. Increase `max_pivots` \
             or switch to local search inference."
        )
    )]
    NonOptimal { status: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(mln::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(mln::config::parse),
        help("Check the TOML syntax and the section names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(mln::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(mln::config::invalid), help("{message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Problem file errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProblemError {
    #[error("failed to read problem file: {path}")]
    #[diagnostic(
        code(mln::problem::read),
        help("Check that the problem file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse problem file: {path}: {message}")]
    #[diagnostic(
        code(mln::problem::parse),
        help("The problem file must be a JSON document in the markov-map problem format.")
    )]
    Parse { path: String, message: String },

    #[error("malformed atom \"{text}\"")]
    #[diagnostic(
        code(mln::problem::atom),
        help("Atoms are written as `Name(arg1,arg2,...)`; a leading `!` negates a literal.")
    )]
    MalformedAtom { text: String },
}

/// Convenience alias for functions returning markov-map results.
pub type MlnResult<T> = std::result::Result<T, MlnError>;
