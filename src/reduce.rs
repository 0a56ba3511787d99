// SPDX-License-Identifier: Apache-2.0

//! The reduction driver: linearize the specification (introducing extension
//! gates for non-linear spec monomials), then walk the remainder's leading
//! gate top-down, substituting linear gate constraints -- linearizing
//! non-linear ones on demand -- and reducing modulo 2^N after every step.
//!
//! The remainder at the end is either zero (the circuit implements the
//! spec) or a polynomial over the primary inputs refuting it.

use num_bigint::BigInt;
use num_traits::One;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::gate::{adjust_level_of_extended_gates, extend_var_gates};
use crate::poly::{poly_to_string, Monomial, Polynomial};

/// The verification verdict together with the final remainder.
#[derive(Debug)]
pub struct Verdict {
    pub correct: bool,
    pub remainder: Option<Polynomial>,
}

impl Engine {
    /// Replaces every non-linear spec monomial by a single gate variable:
    /// an existing parent whose tail matches the monomial if there is one,
    /// otherwise a fresh extension gate.
    fn linearize_spec(&mut self, spec: &Polynomial) -> Result<Polynomial, EngineError> {
        log::info!("started reducing non linear terms in spec");
        if spec.degree() <= 1 {
            return Ok(self.alg.copy_poly(spec));
        }

        let term_x = self.term_x;
        let mut factor_idx: Vec<u64> = Vec::new();
        let mut factor_polys: Vec<Polynomial> = Vec::new();

        for i in 0..spec.len() {
            let m = spec.mon(i);
            let Some(t) = m.term else {
                let m = self.alg.copy_mono(m);
                self.alg.push(m);
                continue;
            };
            if self.alg.pool.degree(t) == 1 {
                let m = self.alg.copy_mono(m);
                self.alg.push(m);
                continue;
            }

            // A shared monomial may already be captured by a gate.
            let mut replaced = false;
            if self.alg.pool.refs(t) > 1 {
                if let Some(sub) = self.gates.search_for_parent(&self.alg, t, None) {
                    if !self.gates.g(sub).elim {
                        let sub_gc_idx;
                        let lt = {
                            let gc = self.gates.g(sub).gate_constraint.as_ref().unwrap();
                            sub_gc_idx = gc.idx();
                            gc.lt().unwrap()
                        };
                        let coeff = m.coeff.clone();
                        if self.proof.is_some() {
                            let tx = self.alg.pool.retain_opt(term_x);
                            let sub_poly = self.alg.poly_from_mono(-coeff.clone(), tx);
                            factor_idx.push(sub_gc_idx);
                            factor_polys.push(sub_poly);
                        }
                        self.alg.pool.retain(lt);
                        self.alg.push(Monomial {
                            coeff,
                            term: Some(lt),
                        });
                        replaced = true;
                    }
                }
            }

            if !replaced {
                let (ext, lt) = extend_var_gates(
                    &mut self.gates,
                    &mut self.alg,
                    t,
                    self.proof.is_some(),
                );
                if self.proof.is_some() {
                    let name = self.gate_name(ext);
                    let mut p = {
                        let gc = self.gates.g_mut(ext).gate_constraint.take().unwrap();
                        gc
                    };
                    let proof = self.proof.as_mut().unwrap();
                    proof.extension_rule(&self.alg.pool, &name, t, &mut p);
                    let idx = p.idx();
                    self.gates.g_mut(ext).gate_constraint = Some(p);

                    let tx = self.alg.pool.retain_opt(term_x);
                    let sub_poly = self.alg.poly_from_mono(-m.coeff.clone(), tx);
                    factor_idx.push(idx);
                    factor_polys.push(sub_poly);
                }
                self.alg.pool.retain(lt);
                self.alg.push(Monomial {
                    coeff: m.coeff.clone(),
                    term: Some(lt),
                });
            }
        }

        let mut linearized = self.alg.build_poly();
        log::debug!(
            "linearized spec {}",
            poly_to_string(&self.alg.pool, &linearized)
        );

        adjust_level_of_extended_gates(&self.gates, &mut self.alg);

        if self.proof.is_some() {
            let old_x_spec = self.x_spec.take().expect("extended spec present");
            factor_idx.push(old_x_spec.idx());
            factor_polys.push(Polynomial::zero());

            let rem_x = self.alg.mul_term(&linearized, term_x);
            let min_one = self.alg.poly_from_mono(-BigInt::one(), None);
            let mut x_spec = self.alg.add_poly(&rem_x, &min_one);
            self.alg.free_poly(rem_x);
            self.alg.free_poly(min_one);

            {
                let refs: Vec<&Polynomial> = factor_polys.iter().collect();
                let proof = self.proof.as_mut().unwrap();
                proof.vector_combi_rule(&self.alg.pool, &factor_idx, &refs, &mut x_spec);
            }
            self.alg.free_poly(old_x_spec);
            self.x_spec = Some(x_spec);
        }
        for p in factor_polys {
            self.alg.free_poly(p);
        }

        Ok(linearized)
    }

    /// Fallback when a gate cannot be linearized: reduce the remainder by
    /// each ancestor's (unflipped) constraint in turn.  Correctness is
    /// preserved; only the proof gets longer.
    fn non_linear_reduction(&mut self, mut rem: Polynomial) -> Result<Option<Polynomial>, EngineError> {
        let mut g = self.gate_of_lt(&rem);
        while !self.gates.g(g).input {
            self.ensure_gate_constraint(g)?;
            let gc = {
                let p = self.gates.g(g).gate_constraint.as_ref().unwrap();
                self.alg.copy_poly(p)
            };
            let gc_unflip = self.unflip_poly(&gc);
            self.alg.free_poly(gc);

            log::debug!(
                "non-linear reducing by {}",
                poly_to_string(&self.alg.pool, &gc_unflip)
            );
            self.stats.non_linear_count += 1;
            let tmp = self.reduce_by_one_poly(&rem, &gc_unflip, true);
            self.alg.free_poly(rem);
            self.alg.free_poly(gc_unflip);
            self.gates.set_elim(&mut self.alg, g);
            rem = tmp;

            if rem.is_constant_zero() {
                log::info!("remainder is 0");
                self.alg.free_poly(rem);
                return Ok(None);
            }
            if rem.len() == 1 && rem.lt().is_none() {
                // Non-zero constant: legitimate incorrect-circuit result.
                break;
            }
            g = self.gate_of_lt(&rem);
        }

        let modded = self.mod_poly(&rem);
        self.alg.free_poly(rem);
        if modded.is_constant_zero() {
            self.alg.free_poly(modded);
            return Ok(None);
        }
        Ok(Some(modded))
    }

    /// The main loop: take the remainder's leading gate, make its constraint
    /// linear (vanishing removal, dual unflips, then the linearization
    /// engines), substitute, reduce mod 2^N, advance.
    pub fn reduce(&mut self, spec: Polynomial) -> Result<Option<Polynomial>, EngineError> {
        log::info!("starting reduction");
        debug_assert!(spec.degree() <= 1);
        let mut rem = spec;
        log::debug!("spec is: {}", poly_to_string(&self.alg.pool, &rem));

        if rem.lt().is_none() {
            return Ok(Some(rem));
        }
        let mut g = self.gate_of_lt(&rem);
        while !self.gates.g(g).input {
            self.ensure_gate_constraint(g)?;

            if self.constraint_degree(g) > 1 {
                let gc = self.copy_gate_constraint(g)?;
                let p = self.remove_vanishing_monomials(&gc, None);
                self.alg.free_poly(gc);
                self.gates.update_gate_poly(&mut self.alg, g, p);
            }

            if self.constraint_degree(g) > 1 {
                let gc = self.copy_gate_constraint(g)?;
                let p = self.unflip_poly_and_remove_van_mon(&gc);
                self.alg.free_poly(gc);
                self.gates.update_gate_poly(&mut self.alg, g, p);
            }

            if self.constraint_degree(g) > 1 {
                self.linearize_via_fglm_or_gap(g);
                if self.gates.g(g).gate_constraint.is_none() {
                    return Err(EngineError::Invariant(format!(
                        "gate {} lost its constraint during linearization",
                        self.gate_name(g)
                    )));
                }
            }

            if self.constraint_degree(g) > 1 {
                log::info!(
                    "failed to linearize gate poly of {}, switching to non-linear rewriting",
                    self.gate_name(g)
                );
                return self.non_linear_reduction(rem);
            }

            let gc = self.copy_gate_constraint(g)?;
            log::debug!(
                "linear reducing by {}",
                poly_to_string(&self.alg.pool, &gc)
            );
            let tmp = self.substitute_linear_poly(&rem, &gc)?;
            self.alg.free_poly(gc);
            self.stats.linear_count += 1;
            self.gates.set_elim(&mut self.alg, g);
            self.alg.free_poly(rem);
            rem = tmp;

            let modded = self.mod_poly(&rem);
            self.alg.free_poly(rem);
            rem = modded;

            if rem.is_constant_zero() {
                log::info!("remainder is 0");
                self.alg.free_poly(rem);
                return Ok(None);
            }
            if rem.lt().is_none() {
                return Ok(Some(rem));
            }
            g = self.gate_of_lt(&rem);
        }

        Ok(Some(rem))
    }

    fn constraint_degree(&self, g: crate::gate::GateId) -> u32 {
        self.gates
            .g(g)
            .gate_constraint
            .as_ref()
            .map_or(0, |gc| gc.degree())
    }

    /// Top-level verification: preprocessing, spec linearization, reduction
    /// and the verdict.
    pub fn verify(&mut self, spec: Polynomial) -> Result<Verdict, EngineError> {
        self.identify_final_stage_adder();

        if !self.cfg.force_vanishing_off {
            self.find_vanishing_constraints_light();
        }

        // Guessing requires pristine AIG nodes for the CNF encoding.
        if self.cfg.do_preprocessing && !self.cfg.force_guessing() {
            self.preprocessing();
        }

        if self.proof.is_some() {
            self.init_x_spec(&spec);
        }

        let rem = if spec.degree() > 1 {
            let tmp = self.linearize_spec(&spec)?;
            self.alg.free_poly(spec);
            tmp
        } else {
            spec
        };
        debug_assert!(rem.degree() <= 1);

        let rem = self.reduce(rem)?;

        match rem {
            Some(rem) if !rem.is_constant_zero() => {
                if !self.check_inputs_only(&rem) {
                    let printed = poly_to_string(&self.alg.pool, &rem);
                    return Err(EngineError::SortingError(format!(
                        "internal sorting error - remainder polynomial contains non-inputs: {}",
                        printed
                    )));
                }
                Ok(Verdict {
                    correct: false,
                    remainder: Some(rem),
                })
            }
            Some(zero) => {
                self.alg.free_poly(zero);
                self.finish_proof_on_success();
                Ok(Verdict {
                    correct: true,
                    remainder: None,
                })
            }
            None => {
                self.finish_proof_on_success();
                Ok(Verdict {
                    correct: true,
                    remainder: None,
                })
            }
        }
    }

    /// The closing proof step: `-1 * x_spec` yields the refutation `1`.
    fn finish_proof_on_success(&mut self) {
        if self.proof.is_none() {
            return;
        }
        let Some(x_spec) = self.x_spec.take() else {
            return;
        };
        let minus_one = -BigInt::one();
        let mut neg = self.alg.mul_const(&x_spec, &minus_one);
        let proof = self.proof.as_mut().unwrap();
        proof.mul_const_rule(&self.alg.pool, x_spec.idx(), &minus_one, &mut neg);
        self.alg.free_poly(neg);
        self.alg.free_poly(x_spec);
        let proof = self.proof.as_mut().unwrap();
        proof.flush();
    }
}
