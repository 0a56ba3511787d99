// SPDX-License-Identifier: Apache-2.0

//! Run configuration for the verifier engine.

/// Which built-in specification to generate, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecMode {
    /// Single-output miter, spec `s0`.
    Miter,
    /// Unsigned multiplier, spec `sum(-2^i s_i) + sum(2^(i+j) a_i b_j)`.
    Mult,
    /// Assertion over all outputs, spec `sum(s_i) - MM`.
    Assert,
    /// The spec polynomial is read from a file.
    FromFile,
}

/// Which engine performs the linearization of non-linear gate constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinMethod {
    /// FGLM-style kernel computation on sub-circuit normal forms, with
    /// guess-and-prove for final-stage-adder regions.
    FglmOrGuess,
    /// Force the FGLM path everywhere.
    ForceFglm,
    /// Force the guess-and-prove path everywhere.
    ForceGuess,
    /// Delegate to an external Groebner-basis tool (msolve).
    ExternalGb,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub spec_mode: SpecMode,
    pub lin_method: LinMethod,

    /// Sub-circuit carve depth.
    pub sc_depth: usize,
    /// Sub-circuit fan-out bound, 0 disables the limit.
    pub sc_fanout: usize,

    pub do_preprocessing: bool,
    /// Full vanishing-constraint discovery; switched on by the CLA probe.
    pub do_vanishing_constraints: bool,
    /// Turns even the light discovery off.
    pub force_vanishing_off: bool,
    pub do_caching: bool,
    /// Replace XOR-root constraints by their linear encoding at construction.
    pub do_local_lin: bool,
    /// Verify guessed candidates by algebraic reduction instead of SAT.
    pub use_algebra_reduction: bool,
    pub proof_logging: bool,
    /// Print the remainder when the circuit is refuted.
    pub gen_witness: bool,

    /// 0..=4, mirrored onto the log level by the binary.
    pub verbosity: u32,
    /// Seed for the guess-and-prove sampling rng.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spec_mode: SpecMode::FromFile,
            lin_method: LinMethod::FglmOrGuess,
            sc_depth: 2,
            sc_fanout: 4,
            do_preprocessing: true,
            do_vanishing_constraints: false,
            force_vanishing_off: false,
            do_caching: true,
            do_local_lin: false,
            use_algebra_reduction: false,
            proof_logging: false,
            gen_witness: true,
            verbosity: 1,
            seed: 0,
        }
    }
}

impl Config {
    pub fn force_guessing(&self) -> bool {
        self.lin_method == LinMethod::ForceGuess
    }

    pub fn force_fglm(&self) -> bool {
        self.lin_method == LinMethod::ForceFglm
    }

    pub fn msolve(&self) -> bool {
        self.lin_method == LinMethod::ExternalGb
    }
}
