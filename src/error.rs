// SPDX-License-Identifier: Apache-2.0

//! The engine-wide error type and the process exit codes it maps to.

use std::fmt;

/// All fatal conditions the verifier can run into.  Soft conditions (a
/// linearization attempt that cannot make progress, a non-zero remainder)
/// are ordinary return values, not errors.
#[derive(Debug)]
pub enum EngineError {
    /// Missing input file, unknown variable in the spec, conflicting flags.
    Input(String),
    /// `--proofs` without the three output paths, `--proofs` with `--msolve`.
    ProofSetup(String),
    /// A broken algebraic invariant, e.g. a non-exact coefficient division in
    /// `substitute_linear_poly`.
    Invariant(String),
    /// Could not write an output file.
    Io(String),
    /// Malformed AIG or specification polynomial.
    Parse(String),
    /// A remainder that still mentions non-input variables after reduction.
    SortingError(String),
}

impl EngineError {
    /// Distinct positive process exit code per error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Input(_) => 10,
            EngineError::ProofSetup(_) => 13,
            EngineError::Invariant(_) => 2,
            EngineError::Io(_) => 41,
            EngineError::Parse(_) => 3,
            EngineError::SortingError(_) => 42,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Input(m) => write!(f, "{}", m),
            EngineError::ProofSetup(m) => write!(f, "{}", m),
            EngineError::Invariant(m) => write!(f, "internal invariant violated: {}", m),
            EngineError::Io(m) => write!(f, "{}", m),
            EngineError::Parse(m) => write!(f, "{}", m),
            EngineError::SortingError(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
