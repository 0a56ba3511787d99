// SPDX-License-Identifier: Apache-2.0

//! Reduction methods: one-step polynomial division, linear substitution,
//! dual-variable flips, mod-2^N, vanishing-monomial removal and the
//! algebraic zero-reduction used by guess verification.

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::gate::GateId;
use crate::poly::{Monomial, Polynomial};
use crate::term::VarId;

impl Engine {
    /// One step of polynomial long division: rewrites the occurrences of
    /// `LT(p2)` inside `p1` using `p2`.  With `non_lin_rewriting` the proof
    /// is threaded through the extended spec `x*rem - 1` instead of plain
    /// combination rules.
    pub fn reduce_by_one_poly(
        &mut self,
        p1: &Polynomial,
        p2: &Polynomial,
        non_lin_rewriting: bool,
    ) -> Polynomial {
        let lt2 = p2.lt().expect("reducer has a leading term");
        let negfactor = self.alg.divide_poly_by_term(p1, lt2);
        if negfactor.is_constant_zero() {
            self.alg.free_poly(negfactor);
            return self.alg.copy_poly(p1);
        }

        let negfactor = if p2.lm().coeff.is_positive() {
            let tmp = self.alg.mul_const(&negfactor, &-BigInt::one());
            self.alg.free_poly(negfactor);
            tmp
        } else {
            negfactor
        };

        let mult = self.alg.multiply_poly(&negfactor, p2);
        let mut rem = self.alg.add_poly(p1, &mult);

        if self.proof.is_none() {
            self.alg.free_poly(mult);
            self.alg.free_poly(negfactor);
        } else if !non_lin_rewriting {
            let proof = self.proof.as_mut().unwrap();
            if !negfactor.is_constant_one() {
                proof.combi_rule(
                    &self.alg.pool,
                    p2.idx(),
                    Some(&negfactor),
                    p1.idx(),
                    None,
                    Some(&mut rem),
                );
            } else {
                proof.add_rule(&self.alg.pool, p1.idx(), p2.idx(), &mut rem);
            }
            self.alg.free_poly(mult);
            self.alg.free_poly(negfactor);
        } else {
            let term_x = self.term_x.expect("extended spec requires x");
            let old_x_spec = self.x_spec.take().expect("extended spec present");
            let neg_x_tmp = self.alg.mul_term(&negfactor, Some(term_x));
            let rem_x_tmp = self.alg.mul_term(&rem, Some(term_x));
            let min_one = self.alg.poly_from_mono(-BigInt::one(), None);
            let mut x_spec = self.alg.add_poly(&rem_x_tmp, &min_one);
            let proof = self.proof.as_mut().unwrap();
            proof.combi_rule(
                &self.alg.pool,
                p2.idx(),
                Some(&neg_x_tmp),
                old_x_spec.idx(),
                None,
                Some(&mut x_spec),
            );
            proof.del_rule(old_x_spec.idx());
            self.x_spec = Some(x_spec);
            self.alg.free_poly(old_x_spec);
            self.alg.free_poly(neg_x_tmp);
            self.alg.free_poly(rem_x_tmp);
            self.alg.free_poly(min_one);
            self.alg.free_poly(mult);
            self.alg.free_poly(negfactor);
        }

        rem
    }

    /// Substitutes the linear polynomial `p2` into the linear remainder
    /// `p1`.  Fatal when the matching coefficient is not a multiple of the
    /// pivot -- that indicates a broken invariant, not user error.
    pub fn substitute_linear_poly(
        &mut self,
        p1: &Polynomial,
        p2: &Polynomial,
    ) -> Result<Polynomial, EngineError> {
        debug_assert!(p1.degree() <= 1 && p2.degree() <= 1);
        let lt2 = p2.lt().expect("substituted polynomial has a leading term");

        let mut hit: Option<usize> = None;
        for i in 0..p1.len() {
            let m = p1.mon(i);
            if m.term.is_none() {
                continue;
            }
            match self.alg.pool.cmp_term(m.term, Some(lt2)) {
                std::cmp::Ordering::Equal => {
                    hit = Some(i);
                    break;
                }
                std::cmp::Ordering::Less => break,
                std::cmp::Ordering::Greater => {}
            }
        }
        let Some(hit) = hit else {
            return Ok(self.alg.copy_poly(p1));
        };

        let c1 = p1.mon(hit).coeff.clone();
        let c2 = p2.lm().coeff.clone();

        if c1 == c2 {
            let mut rem = self.alg.sub_poly(p1, p2);
            if self.proof.is_some() {
                self.emit_spec_substitution(p2, &-BigInt::one(), &mut rem);
            }
            return Ok(rem);
        }

        if !(&c1 % &c2).is_zero() {
            return Err(EngineError::Invariant(
                "cannot use substituted polynomial to reduce the remainder".to_string(),
            ));
        }
        let q = &c1 / &c2;
        let p2_lift = self.alg.mul_const(p2, &q);
        let mut res = self.alg.sub_poly(p1, &p2_lift);
        self.alg.free_poly(p2_lift);
        if self.proof.is_some() {
            self.emit_spec_substitution(p2, &-q, &mut res);
        }
        Ok(res)
    }

    /// Advances the extended spec after a substitution: the new spec is
    /// `x*rem - 1`, justified by `factor*x * p2 + x_spec`.
    fn emit_spec_substitution(&mut self, p2: &Polynomial, factor: &BigInt, rem: &mut Polynomial) {
        let term_x = self.term_x.expect("extended spec requires x");
        let old_x_spec = self.x_spec.take().expect("extended spec present");
        let tx = self.alg.pool.retain_opt(Some(term_x));
        let co = self.alg.poly_from_mono(factor.clone(), tx);
        let rem_x = self.alg.mul_term(rem, Some(term_x));
        let min_one = self.alg.poly_from_mono(-BigInt::one(), None);
        let mut x_spec = self.alg.add_poly(&rem_x, &min_one);
        let proof = self.proof.as_mut().unwrap();
        proof.combi_rule(
            &self.alg.pool,
            p2.idx(),
            Some(&co),
            old_x_spec.idx(),
            None,
            Some(&mut x_spec),
        );
        proof.del_rule(old_x_spec.idx());
        self.x_spec = Some(x_spec);
        self.alg.free_poly(old_x_spec);
        self.alg.free_poly(co);
        self.alg.free_poly(rem_x);
        self.alg.free_poly(min_one);
    }

    /// Replaces `v` by `1 - v_dual` throughout `p1`.  Without proof logging
    /// this is a direct rewrite; `rem_van` suppresses the rewrite of
    /// monomials already known to vanish.  Under proof logging it is a
    /// reduction against the dual constraint `-v - v_dual + 1`.
    pub fn flip_var_in_poly(&mut self, p1: &Polynomial, v: VarId, rem_van: bool) -> Polynomial {
        if self.proof.is_none() {
            let v_level = self.alg.pool.level(v);
            let v_dual = self.alg.pool.dual(v);
            let g = self.gates.gate(self.alg.pool.var(v).num);
            let mut i = 0;
            while i < p1.len() {
                let m = p1.mon(i);
                let Some(t) = m.term else {
                    let m = self.alg.copy_mono(m);
                    self.alg.push(m);
                    i += 1;
                    continue;
                };
                if self.alg.pool.head_level(t) < v_level {
                    for j in i..p1.len() {
                        let m = self.alg.copy_mono(p1.mon(j));
                        self.alg.push(m);
                    }
                    break;
                }
                if self.alg.pool.contains(t, v) {
                    let quot = self.alg.pool.divide_by_var(t, v);
                    let mut vanishes = false;
                    if rem_van && quot.is_some() && self.alg.pool.var(v).is_dual() {
                        if let Some(g) = g {
                            for &g_van in &self.gates.g(g).van_twins {
                                let w = self.gates.g(g_van).v;
                                if self.alg.pool.contains(quot.unwrap(), w) {
                                    vanishes = true;
                                    break;
                                }
                            }
                        }
                    }
                    if !vanishes {
                        if let Some(vt) = self.alg.pool.multiply_term_by_var(quot, v_dual) {
                            self.alg.push(Monomial {
                                coeff: -m.coeff.clone(),
                                term: Some(vt),
                            });
                        }
                    }
                    self.alg.push(Monomial {
                        coeff: m.coeff.clone(),
                        term: quot,
                    });
                } else {
                    let m = self.alg.copy_mono(m);
                    self.alg.push(m);
                }
                i += 1;
            }
            return self.alg.build_poly();
        }

        // Proof-logging path: reduce against the dual constraint so the
        // combination rule can reference its axiom index.
        let g = self
            .gates
            .gate(self.alg.pool.var(v).num)
            .expect("flipped variable belongs to a gate");
        let flip = if !self.alg.pool.var(v).is_dual() {
            self.ensure_dual_constraint(g);
            let idx = self.gates.g(g).dual_constraint.as_ref().unwrap().idx();
            let mut f = self.alg.gen_dual_constraint(v);
            f.set_idx(idx);
            f
        } else {
            self.copy_dual_constraint(g)
        };

        let lt = flip.lt().unwrap();
        let negfactor = self.alg.divide_poly_by_term(p1, lt);
        let rem = if negfactor.is_constant_zero() {
            self.alg.copy_poly(p1)
        } else {
            let mult = self.alg.multiply_poly(&negfactor, &flip);
            let mut rem = self.alg.add_poly(p1, &mult);
            let proof = self.proof.as_mut().unwrap();
            if !negfactor.is_constant_one() {
                proof.combi_rule(
                    &self.alg.pool,
                    flip.idx(),
                    Some(&negfactor),
                    p1.idx(),
                    None,
                    Some(&mut rem),
                );
            } else {
                proof.add_rule(&self.alg.pool, p1.idx(), flip.idx(), &mut rem);
            }
            self.alg.free_poly(mult);
            rem
        };
        self.alg.free_poly(negfactor);
        self.alg.free_poly(flip);
        rem
    }

    /// Reduces every coefficient modulo 2^N, logging the mod rule and the
    /// extended-spec update when proofs are on.
    pub fn mod_poly(&mut self, p1: &Polynomial) -> Polynomial {
        let out = self.alg.mod_poly_pure(p1);

        if self.proof.is_some() {
            let quotients = self.alg.mod_poly_quotients(p1);
            if !quotients.is_constant_zero() {
                let term_x = self.term_x.expect("extended spec requires x");
                let px = self.alg.mul_term(&quotients, Some(term_x));
                let mod_coeff = self.alg.mod_coeff.clone();
                let mut mod_mul = self.alg.mul_const(&px, &mod_coeff);
                {
                    let proof = self.proof.as_mut().unwrap();
                    proof.mod_rule(&self.alg.pool, &px, &mut mod_mul);
                }

                let old_x_spec = self.x_spec.take().expect("extended spec present");
                let res_x = self.alg.mul_term(&out, Some(term_x));
                let min_one = self.alg.poly_from_mono(-BigInt::one(), None);
                let mut x_spec = self.alg.add_poly(&res_x, &min_one);
                let proof = self.proof.as_mut().unwrap();
                proof.add_rule(
                    &self.alg.pool,
                    old_x_spec.idx(),
                    mod_mul.idx(),
                    &mut x_spec,
                );
                proof.del_rule(old_x_spec.idx());
                self.x_spec = Some(x_spec);
                self.alg.free_poly(old_x_spec);
                self.alg.free_poly(res_x);
                self.alg.free_poly(min_one);
                self.alg.free_poly(px);
                self.alg.free_poly(mod_mul);
            }
            self.alg.free_poly(quotients);
        }

        out
    }

    /// Flips every dual variable back to `1 - v` until none remains.
    pub fn unflip_poly(&mut self, p: &Polynomial) -> Polynomial {
        let mut res = self.alg.copy_poly(p);
        while let Some(v) = res.contains_dual_var(&self.alg.pool) {
            let tmp = self.flip_var_in_poly(&res, v, false);
            self.alg.free_poly(res);
            res = tmp;
        }
        res
    }

    /// Drops monomials of degree >= 2 that contain a known-vanishing pair;
    /// a dual-twin pair divides the twin variable out instead.  With
    /// `used_van` the consumed vanishing axioms are recorded (and announced
    /// in the proof) for pattern replay.
    pub fn remove_vanishing_monomials(
        &mut self,
        p: &Polynomial,
        mut used_van: Option<&mut Vec<u64>>,
    ) -> Polynomial {
        if self.proof.is_none() {
            for i in 0..p.len() {
                let m = p.mon(i);
                let Some(t) = m.term else {
                    let m = self.alg.copy_mono(m);
                    self.alg.push(m);
                    continue;
                };
                if self.alg.pool.degree(t) < 2 {
                    let m = self.alg.copy_mono(m);
                    self.alg.push(m);
                    continue;
                }

                let mut vanished = false;
                for v in self.alg.pool.iter_vars(t) {
                    if self.alg.pool.var(v).is_dual() {
                        continue;
                    }
                    let Some(g) = self.gates.gate(self.alg.pool.var(v).num) else {
                        continue;
                    };
                    for &g_van in &self.gates.g(g).van_twins {
                        let w = self.gates.g(g_van).v;
                        if self.alg.pool.contains(t, w) {
                            self.stats.van_mon_used_count += 1;
                            vanished = true;
                            break;
                        }
                    }
                    if vanished {
                        break;
                    }
                }

                let mut shrunk: Option<crate::term::TermId> = None;
                let mut shrunk_hit = false;
                if !vanished {
                    'outer: for v in self.alg.pool.iter_vars(t) {
                        if self.alg.pool.var(v).is_dual() {
                            continue;
                        }
                        let Some(g) = self.gates.gate(self.alg.pool.var(v).num) else {
                            continue;
                        };
                        for &g_dv in &self.gates.g(g).dual_twins.clone() {
                            let w = self.gates.g(g_dv).v;
                            if self.alg.pool.contains(t, w) {
                                shrunk = self.alg.pool.divide_by_var(t, w);
                                self.stats.van_mon_used_count += 1;
                                shrunk_hit = true;
                                break 'outer;
                            } else if self.alg.pool.contains(t, self.alg.pool.dual(w)) {
                                shrunk = None;
                                self.stats.van_mon_used_count += 1;
                                shrunk_hit = true;
                                vanished = true;
                                break 'outer;
                            }
                        }
                    }
                }

                if !vanished && !shrunk_hit {
                    let m = self.alg.copy_mono(m);
                    self.alg.push(m);
                } else if let Some(shrunk) = shrunk {
                    self.alg.push(Monomial {
                        coeff: m.coeff.clone(),
                        term: Some(shrunk),
                    });
                }
            }
            return self.alg.build_poly();
        }

        // Proof mode: reduce against the recorded vanishing axioms.
        let mut rest = self.alg.copy_poly(p);
        let mut i = 0;
        while i < rest.len() {
            let Some(t) = rest.mon(i).term else {
                i += 1;
                continue;
            };
            if self.alg.pool.degree(t) < 2 {
                i += 1;
                continue;
            }

            let mut reduced = false;
            let vars: Vec<VarId> = self.alg.pool.iter_vars(t).collect();
            'van: for v in &vars {
                if self.alg.pool.var(*v).is_dual() {
                    continue;
                }
                let Some(g) = self.gates.gate(self.alg.pool.var(*v).num) else {
                    continue;
                };
                for g_van in self.gates.g(g).van_twins.clone() {
                    let w = self.gates.g(g_van).v;
                    if self.alg.pool.contains(t, w) {
                        self.stats.van_mon_used_count += 1;
                        let t1 = self.alg.pool.quadratic_term(*v, w);
                        let p1 = self
                            .van_poly
                            .get(&t1)
                            .expect("vanishing axiom recorded for twin pair");
                        let p1 = self.alg.copy_poly(p1);
                        self.alg.pool.release(t1);
                        self.record_used_van(&p1, &mut used_van);
                        let p2 = self.reduce_by_one_poly(&rest, &p1, false);
                        self.alg.free_poly(rest);
                        self.alg.free_poly(p1);
                        rest = p2;
                        reduced = true;
                        break 'van;
                    }
                }
            }

            if !reduced {
                'dual: for v in &vars {
                    if self.alg.pool.var(*v).is_dual() {
                        continue;
                    }
                    let Some(g) = self.gates.gate(self.alg.pool.var(*v).num) else {
                        continue;
                    };
                    for g_dv in self.gates.g(g).dual_twins.clone() {
                        let w = self.gates.g(g_dv).v;
                        if self.alg.pool.contains(t, w) {
                            self.stats.van_mon_used_count += 1;
                            let t1 = self.alg.pool.quadratic_term(*v, w);
                            let p1 = self
                                .dual_van_poly
                                .get(&t1)
                                .expect("dual vanishing axiom recorded for twin pair");
                            let p1 = self.alg.copy_poly(p1);
                            self.alg.pool.release(t1);
                            self.record_used_van(&p1, &mut used_van);
                            let p2 = self.reduce_by_one_poly(&rest, &p1, false);
                            self.alg.free_poly(rest);
                            self.alg.free_poly(p1);
                            rest = p2;
                            break 'dual;
                        }
                    }
                }
            }

            i += 1;
        }
        rest
    }

    fn record_used_van(&mut self, p1: &Polynomial, used_van: &mut Option<&mut Vec<u64>>) {
        let Some(used) = used_van.as_mut() else {
            return;
        };
        if used.contains(&p1.idx()) {
            return;
        }
        if let Some(proof) = self.proof.as_mut() {
            proof.pattern_in_poly(&self.alg.pool, 0, p1.idx(), p1);
        }
        used.push(p1.idx());
    }

    /// Flips dual variables out of `p` while cancelling vanishing monomials
    /// after every flip.
    pub fn unflip_poly_and_remove_van_mon(&mut self, p: &Polynomial) -> Polynomial {
        let Some(mut v) = p.contains_dual_var(&self.alg.pool) else {
            return self.remove_vanishing_monomials(p, None);
        };
        let mut res = self.alg.copy_poly(p);
        loop {
            let tmp = self.flip_var_in_poly(&res, v, true);
            let tmp = if tmp.degree() > 1 {
                let cleaned = self.remove_vanishing_monomials(&tmp, None);
                self.alg.free_poly(tmp);
                cleaned
            } else {
                tmp
            };
            self.alg.free_poly(res);
            res = tmp;
            match res.contains_dual_var(&self.alg.pool) {
                Some(next) => v = next,
                None => break,
            }
        }
        res
    }

    // ----- algebraic zero-reduction ---------------------------------------

    /// Flips each tail variable of the reducer both ways and keeps the
    /// shorter remainder.
    fn clean_phases(&mut self, p1: &Polynomial, p2: &Polynomial) -> Polynomial {
        if p2.len() != 2 {
            return self.alg.copy_poly(p1);
        }
        let Some(tail) = p2.tail_term() else {
            return self.alg.copy_poly(p1);
        };
        let vars: Vec<VarId> = self.alg.pool.iter_vars(tail).collect();
        let mut res = self.alg.copy_poly(p1);
        for v in vars {
            let tmp1 = self.flip_var_in_poly(&res, v, false);
            let d = self.alg.pool.dual(v);
            let tmp2 = self.flip_var_in_poly(&res, d, false);
            self.alg.free_poly(res);
            if tmp1.len() <= tmp2.len() {
                self.alg.free_poly(tmp2);
                res = tmp1;
            } else {
                self.alg.free_poly(tmp1);
                res = tmp2;
            }
        }
        res
    }

    /// Chooses the next gates to reduce by: the non-linear gates of the
    /// leading term when the tail is already linear, otherwise the largest
    /// gate of the remainder that appears in the basis.
    fn dyn_red_guesses(&mut self, rem: &Polynomial, basis: &[GateId]) -> Vec<Option<GateId>> {
        let mut res: Vec<Option<GateId>> = Vec::new();
        if rem.degree() > 1 && rem.len() > 1 {
            let tail = self.alg.tail_poly(rem);
            let tail_linear = tail.degree() == 1;
            self.alg.free_poly(tail);
            if tail_linear {
                if let Some(lt) = rem.lt() {
                    for v in self.alg.pool.iter_vars(lt) {
                        let Some(g) = self.gates.gate(self.alg.pool.var(v).num) else {
                            continue;
                        };
                        let gate = self.gates.g(g);
                        if !gate.input {
                            if let Some(nf) = gate.normal_form.as_ref() {
                                if nf.degree() > 1 {
                                    res.push(Some(g));
                                }
                            }
                        }
                    }
                }
            }
        }
        if res.is_empty() {
            res.push(self.get_largest_node(rem, basis));
        }
        res
    }

    fn get_largest_node(&self, p: &Polynomial, basis: &[GateId]) -> Option<GateId> {
        let mut poly_vars = self.gates.vars_of_poly(&self.alg, p, false);
        self.gates.sort_by_level_dec(&self.alg.pool, &mut poly_vars);
        poly_vars.into_iter().find(|g| basis.contains(g))
    }

    /// Attempts to reduce `p` to zero against the gate constraints (or
    /// normal forms) of the circuit; used as the opt-in algebraic check of
    /// guessed invariants.
    pub fn reduce_to_zero(&mut self, p: &Polynomial, basis: &[GateId]) -> bool {
        let mut rem = if p.degree() > 1 {
            self.remove_vanishing_monomials(p, None)
        } else {
            self.alg.copy_poly(p)
        };

        let mut next_reduction: Vec<Option<GateId>> = Vec::new();
        while !rem.is_constant_zero() {
            if next_reduction.is_empty() {
                next_reduction = self.dyn_red_guesses(&rem, basis);
            }
            let v = next_reduction.remove(0);

            let Some(v) = v else {
                let fin = self.unflip_poly_and_remove_van_mon(&rem);
                let ok = fin.is_constant_zero();
                self.alg.free_poly(fin);
                self.alg.free_poly(rem);
                return ok;
            };

            if rem.len() > 8000 {
                log::info!("remainder exploded, possibly wrong");
                self.alg.free_poly(rem);
                return false;
            }

            let red = {
                let gate = self.gates.g(v);
                let src = gate
                    .normal_form
                    .as_ref()
                    .or(gate.gate_constraint.as_ref())
                    .expect("reduction target has a polynomial");
                self.alg.copy_poly(src)
            };

            let red_lt_var = self.alg.pool.head(red.lt().unwrap());
            let red_dual = self.alg.pool.dual(red_lt_var);
            let rem_unf = self.flip_var_in_poly(&rem, red_dual, true);
            self.alg.free_poly(rem);
            if rem_unf.is_constant_zero() {
                self.alg.free_poly(rem_unf);
                self.alg.free_poly(red);
                return true;
            }
            let rem_unf1 = self.remove_vanishing_monomials(&rem_unf, None);
            self.alg.free_poly(rem_unf);
            if rem_unf1.is_constant_zero() {
                self.alg.free_poly(rem_unf1);
                self.alg.free_poly(red);
                return true;
            }

            let res = self.reduce_by_one_poly(&rem_unf1, &red, false);
            let res1 = self.remove_vanishing_monomials(&res, None);
            let res_cleaned = self.clean_phases(&res1, &red);
            self.alg.free_poly(res);
            self.alg.free_poly(res1);
            self.alg.free_poly(rem_unf1);
            self.alg.free_poly(red);
            rem = res_cleaned;
        }

        self.alg.free_poly(rem);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiger::parse_aiger;
    use crate::config::Config;
    use crate::engine::Engine;
    use crate::poly::poly_to_string;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn engine() -> Engine {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 1;
        Engine::new(aig, cfg)
    }

    #[test]
    fn test_reduce_by_one_poly_lowers_leading_term() {
        let mut e = engine();
        // rem = s1 - i0  (degree 1 in s1); reduce by -s1 + l6.
        let s1 = e.gates.gate(-1).unwrap();
        let i0 = e.gates.gate(2).unwrap();
        let ts1 = e.alg.pool.make_term(e.gates.g(s1).v, None);
        let ti0 = e.alg.pool.make_term(e.gates.g(i0).v, None);
        e.alg.push(Monomial {
            coeff: BigInt::one(),
            term: Some(ts1),
        });
        e.alg.push(Monomial {
            coeff: -BigInt::one(),
            term: Some(ti0),
        });
        let rem = e.alg.build_poly();

        let gc = e.copy_gate_constraint(s1).unwrap();
        let res = e.reduce_by_one_poly(&rem, &gc, false);
        // s1 is replaced by l6.
        assert_eq!(poly_to_string(&e.alg.pool, &res), "l6-i0");
        assert!(e.alg.pool.cmp_term(res.lt(), rem.lt()) == std::cmp::Ordering::Less);
        e.alg.free_poly(rem);
        e.alg.free_poly(gc);
        e.alg.free_poly(res);
    }

    #[test]
    fn test_flip_round_trip() {
        let mut e = engine();
        let l8 = e.gates.gate(8).unwrap();
        let gc = e.copy_gate_constraint(l8).unwrap();
        // gc = -l8 + (1-i1)*(1-i0): flip the dual of i1 in and back out.
        let i1 = e.gates.gate(4).unwrap();
        let v = e.gates.g(i1).v;
        let d = e.alg.pool.dual(v);
        let flipped = e.flip_var_in_poly(&gc, d, false);
        let back = e.flip_var_in_poly(&flipped, v, false);
        assert!(crate::poly::equal_poly(&gc, &back));
        e.alg.free_poly(gc);
        e.alg.free_poly(flipped);
        e.alg.free_poly(back);
    }

    #[test]
    fn test_substitute_linear() {
        let mut e = engine();
        let s0 = e.gates.gate(0).unwrap();
        let l10 = e.gates.gate(10).unwrap();
        // p1 = 2*s0 + i0, p2 = -s0 + l10  ->  2*l10 + i0
        let i0 = e.gates.gate(2).unwrap();
        let ts0 = e.alg.pool.make_term(e.gates.g(s0).v, None);
        let ti0 = e.alg.pool.make_term(e.gates.g(i0).v, None);
        e.alg.push(Monomial {
            coeff: BigInt::from(2),
            term: Some(ts0),
        });
        e.alg.push(Monomial {
            coeff: BigInt::one(),
            term: Some(ti0),
        });
        let p1 = e.alg.build_poly();
        let p2 = e.copy_gate_constraint(s0).unwrap();
        let res = e.substitute_linear_poly(&p1, &p2).unwrap();
        let _ = l10;
        assert_eq!(poly_to_string(&e.alg.pool, &res), "2*l10+i0");
        e.alg.free_poly(p1);
        e.alg.free_poly(p2);
        e.alg.free_poly(res);
    }

    #[test]
    fn test_remove_vanishing_monomials() {
        let mut e = engine();
        // Make l6 and l8 vanishing twins (they are: l6*l8 == 0).
        let l6 = e.gates.gate(6).unwrap();
        let l8 = e.gates.gate(8).unwrap();
        e.gates.g_mut(l6).van_twins.push(l8);
        e.gates.g_mut(l8).van_twins.push(l6);

        let t = e
            .alg
            .pool
            .quadratic_term(e.gates.g(l6).v, e.gates.g(l8).v);
        e.alg.push(Monomial {
            coeff: BigInt::from(3),
            term: Some(t),
        });
        e.alg.push(Monomial {
            coeff: BigInt::one(),
            term: None,
        });
        let p = e.alg.build_poly();
        let res = e.remove_vanishing_monomials(&p, None);
        assert_eq!(poly_to_string(&e.alg.pool, &res), "1");
        e.alg.free_poly(p);
        e.alg.free_poly(res);
    }

    #[test]
    fn test_mod_poly() {
        let mut e = engine();
        // mod 2^2 = 4 for the two-input half adder.
        let i0 = e.gates.gate(2).unwrap();
        let t = e.alg.pool.make_term(e.gates.g(i0).v, None);
        e.alg.push(Monomial {
            coeff: BigInt::from(5),
            term: Some(t),
        });
        let p = e.alg.build_poly();
        let m = e.mod_poly(&p);
        assert_eq!(poly_to_string(&e.alg.pool, &m), "i0");
        let m2 = e.mod_poly(&m);
        assert!(crate::poly::equal_poly(&m, &m2));
        e.alg.free_poly(p);
        e.alg.free_poly(m);
        e.alg.free_poly(m2);
    }
}
