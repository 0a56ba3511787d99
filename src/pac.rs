// SPDX-License-Identifier: Apache-2.0

//! PAC (Polynomial Algebraic Calculus) proof emission.
//!
//! Three line-oriented streams: the axioms ("polys") file holding the
//! circuit and dual constraints, the steps file holding one rule per
//! arithmetic operation, and the spec file holding the refuted
//! specification.  Every polynomial that appears in a rule carries a stable,
//! monotonically assigned index; rules reference indices, not text, except
//! for the conclusion.
//!
//! Rules are written in the same order as the arithmetic they justify; the
//! writers are buffered but strictly sequential, and flushed on completion
//! and on drop.

use std::fs::File;
use std::io::{BufWriter, Write};

use num_bigint::BigInt;

use crate::error::EngineError;
use crate::poly::{poly_to_string, Monomial, Polynomial};
use crate::term::{TermId, TermPool};

#[derive(Debug)]
pub struct Proof {
    polys: BufWriter<File>,
    steps: BufWriter<File>,
    spec: BufWriter<File>,
    poly_idx: u64,
}

fn create(path: &str) -> Result<BufWriter<File>, EngineError> {
    let f = File::create(path)
        .map_err(|e| EngineError::Io(format!("can not write output to '{}': {}", path, e)))?;
    Ok(BufWriter::new(f))
}

fn mono_to_string(pool: &TermPool, m: &Monomial) -> String {
    use num_traits::{One, Signed};
    let mut out = String::new();
    if m.coeff.is_negative() {
        out.push('-');
    }
    let abs = m.coeff.abs();
    match m.term {
        None => out.push_str(&abs.to_string()),
        Some(t) => {
            if !abs.is_one() {
                out.push_str(&abs.to_string());
                out.push('*');
            }
            out.push_str(&pool.term_to_string(Some(t)));
        }
    }
    out
}

impl Proof {
    pub fn open(polys: &str, steps: &str, spec: &str) -> Result<Self, EngineError> {
        Ok(Proof {
            polys: create(polys)?,
            steps: create(steps)?,
            spec: create(spec)?,
            poly_idx: 0,
        })
    }

    pub fn flush(&mut self) {
        let _ = self.polys.flush();
        let _ = self.steps.flush();
        let _ = self.spec.flush();
    }

    // ----- spec stream ---------------------------------------------------

    pub fn print_refutation_spec(&mut self) {
        let _ = self.spec.write_all(b"1;");
    }

    // ----- axiom stream --------------------------------------------------

    /// Writes the modulus axiom (index 1) and positions the counter at 2.
    pub fn begin_axioms(&mut self, mod_coeff: &BigInt) {
        let _ = writeln!(self.polys, "1 {};", mod_coeff);
        self.poly_idx = 2;
    }

    /// Writes one axiom polynomial and assigns it the next index.
    pub fn axiom(&mut self, pool: &TermPool, p: &mut Polynomial) {
        let _ = writeln!(self.polys, "{} {};", self.poly_idx, poly_to_string(pool, p));
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// Returns the index an [`Self::axiom`] call would assign next.
    pub fn next_idx(&self) -> u64 {
        self.poly_idx
    }

    /// Mirrors an already-printed axiom index onto another copy of the same
    /// polynomial.
    pub fn assign_idx(&mut self, p: &mut Polynomial) {
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    // ----- step stream ---------------------------------------------------

    /// `k = <var>, <term>;` -- introduces a new variable for a term.
    pub fn extension_rule(&mut self, pool: &TermPool, name: &str, t: TermId, p: &mut Polynomial) {
        let _ = writeln!(
            self.steps,
            "{} = {}, {};",
            self.poly_idx,
            name,
            pool.term_to_string(Some(t))
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k d;` -- the polynomial with index `k` will not be referenced again.
    pub fn del_rule(&mut self, idx: u64) {
        let _ = writeln!(self.steps, "{} d;", idx);
    }

    /// `k % 1 *(<p1>), <p>;` -- the mod-2^N step against axiom 1.
    pub fn mod_rule(&mut self, pool: &TermPool, p1: &Polynomial, p: &mut Polynomial) {
        debug_assert!(!p1.is_constant_zero() && !p.is_constant_zero());
        let _ = writeln!(
            self.steps,
            "{} % 1 *({}), {};",
            self.poly_idx,
            poly_to_string(pool, p1),
            poly_to_string(pool, p)
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i + j, <p>;`
    pub fn add_rule(&mut self, pool: &TermPool, i: u64, j: u64, p: &mut Polynomial) {
        let _ = writeln!(
            self.steps,
            "{} % {} + {}, {};",
            self.poly_idx,
            i,
            j,
            poly_to_string(pool, p)
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i1 + i2 + ..., <p>;` (indices written back to front).
    pub fn vector_add_rule(&mut self, pool: &TermPool, indices: &[u64], p: &mut Polynomial) {
        let _ = write!(self.steps, "{} % ", self.poly_idx);
        for (n, idx) in indices.iter().rev().enumerate() {
            if n > 0 {
                let _ = write!(self.steps, " + ");
            }
            let _ = write!(self.steps, "{}", idx);
        }
        let _ = writeln!(self.steps, ", {};", poly_to_string(pool, p));
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i *(<f1>) + j *(<f2>), <p>;` -- a two-term linear combination.
    /// A missing conclusion prints `0`.
    pub fn combi_rule(
        &mut self,
        pool: &TermPool,
        i: u64,
        f1: Option<&Polynomial>,
        j: u64,
        f2: Option<&Polynomial>,
        p: Option<&mut Polynomial>,
    ) {
        let _ = write!(self.steps, "{} % {}", self.poly_idx, i);
        if let Some(f1) = f1 {
            let _ = write!(self.steps, " *({})", poly_to_string(pool, f1));
        }
        let _ = write!(self.steps, " + {}", j);
        if let Some(f2) = f2 {
            let _ = write!(self.steps, " *({})", poly_to_string(pool, f2));
        }
        match p {
            Some(p) => {
                let _ = writeln!(self.steps, ", {};", poly_to_string(pool, p));
                p.set_idx(self.poly_idx);
                self.poly_idx += 1;
            }
            None => {
                let _ = writeln!(self.steps, ", 0;");
            }
        }
    }

    /// As [`Self::combi_rule`], with a single-monomial co-factor.
    pub fn combi_monomial_rule(
        &mut self,
        pool: &TermPool,
        i: u64,
        m: &Monomial,
        j: u64,
        p: &mut Polynomial,
    ) {
        let _ = writeln!(
            self.steps,
            "{} % {} *({}) + {}, {};",
            self.poly_idx,
            i,
            mono_to_string(pool, m),
            j,
            poly_to_string(pool, p)
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i1 *(<f1>) + i2 *(<f2>) + ..., <p>;` (written back to front);
    /// constant-one co-factors are elided.
    pub fn vector_combi_rule(
        &mut self,
        pool: &TermPool,
        indices: &[u64],
        co_factors: &[&Polynomial],
        p: &mut Polynomial,
    ) {
        assert_eq!(
            indices.len(),
            co_factors.len(),
            "combination rule receives invalid arguments"
        );
        let _ = write!(self.steps, "{} % ", self.poly_idx);
        let mut first = true;
        for (idx, f) in indices.iter().zip(co_factors.iter()).rev() {
            if !first {
                let _ = write!(self.steps, " + ");
            }
            first = false;
            let _ = write!(self.steps, "{}", idx);
            if !f.is_constant_one() && !f.is_constant_zero() {
                let _ = write!(self.steps, " *({})", poly_to_string(pool, f));
            }
        }
        let _ = writeln!(self.steps, ", {};", poly_to_string(pool, p));
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i *(<p2>), <p>;`
    pub fn mul_rule(&mut self, pool: &TermPool, i: u64, p2: &Polynomial, p: &mut Polynomial) {
        let _ = writeln!(
            self.steps,
            "{} % {} *({}), {};",
            self.poly_idx,
            i,
            poly_to_string(pool, p2),
            poly_to_string(pool, p)
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// `k % i *(<n>), <p>;`
    pub fn mul_const_rule(&mut self, pool: &TermPool, i: u64, n: &BigInt, p: &mut Polynomial) {
        let _ = writeln!(
            self.steps,
            "{} % {} *({}), {};",
            self.poly_idx,
            i,
            n,
            poly_to_string(pool, p)
        );
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    /// A circuit polynomial learned later (e.g. a SAT-proven invariant),
    /// appended to the axiom stream.
    pub fn add_circuit_poly(&mut self, pool: &TermPool, p: &mut Polynomial) {
        let _ = writeln!(self.polys, "{} {};", self.poly_idx, poly_to_string(pool, p));
        p.set_idx(self.poly_idx);
        self.poly_idx += 1;
    }

    // ----- pattern blocks -------------------------------------------------

    pub fn pattern_new_begin(&mut self, hash: u64) {
        let _ = writeln!(self.steps, "pattern_new {} {{", hash);
    }

    pub fn pattern_apply_begin(&mut self, hash: u64) {
        let _ = writeln!(self.steps, "pattern_apply {} {{", hash);
    }

    pub fn pattern_end(&mut self) {
        let _ = writeln!(self.steps, "}};");
    }

    pub fn pattern_var(&mut self, id: usize, name: &str) {
        let _ = writeln!(self.steps, "v{}  {};", id, name);
    }

    pub fn pattern_in(&mut self, i: usize, idx: u64) {
        let _ = writeln!(self.steps, "in{} {};", i, idx);
    }

    pub fn pattern_in_poly(&mut self, pool: &TermPool, i: usize, idx: u64, p: &Polynomial) {
        let _ = writeln!(
            self.steps,
            "in{} {} {};",
            i,
            idx,
            poly_to_string(pool, p)
        );
    }

    pub fn pattern_out_ref(&mut self, i: usize, idx: u64) {
        let _ = writeln!(self.steps, "out{} {};", i, idx);
    }

    /// Prints `out<i> <idx> <poly>;` for each polynomial, assigning fresh
    /// indices; returns the continuation counter.
    pub fn pattern_out_rules(
        &mut self,
        pool: &TermPool,
        polys: &mut [Polynomial],
        mut i: usize,
    ) -> usize {
        for p in polys.iter_mut() {
            p.set_idx(self.poly_idx);
            self.poly_idx += 1;
            let _ = writeln!(
                self.steps,
                "out{} {} {};",
                i,
                p.idx(),
                poly_to_string(pool, p)
            );
            i += 1;
        }
        i
    }
}

impl Drop for Proof {
    fn drop(&mut self) {
        self.flush();
    }
}
