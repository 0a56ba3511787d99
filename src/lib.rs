// SPDX-License-Identifier: Apache-2.0

//! TalisMan: algebraic equivalence checking of And-Inverter Graphs.
//!
//! The verifier views every AIG node as a polynomial constraint over the
//! integers modulo 2^N and reduces a word-level specification polynomial by
//! those constraints.  A zero remainder proves the circuit implements the
//! specification; a non-zero remainder over the primary inputs refutes it.
//! Non-linear gate constraints are linearized on demand, either by an
//! FGLM-style kernel computation over Q on the normal forms of a carved
//! sub-circuit, or by a guess-and-prove loop that samples the circuit and
//! refutes candidate invariants with a SAT solver.  Every algebraic step can
//! be logged as a PAC (Polynomial Algebraic Calculus) certificate.

pub mod aiger;
pub mod config;
pub mod engine;
pub mod error;
pub mod external_gb;
pub mod fglm;
pub mod fsa;
pub mod gate;
pub mod guess;
pub mod matrix;
pub mod pac;
pub mod pb;
pub mod poly;
pub mod preprocess;
pub mod propagate;
pub mod reduce;
pub mod rewriting;
pub mod specpoly;
pub mod stats;
pub mod subcircuit;
pub mod term;
pub mod vanishing;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
