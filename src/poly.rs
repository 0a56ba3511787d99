// SPDX-License-Identifier: Apache-2.0

//! Monomials, polynomials, and the algebra context that builds them.
//!
//! A polynomial is a sorted vector of monomials with strictly decreasing
//! terms, no duplicate terms and no zero coefficients; the constant monomial
//! sorts last.  Polynomials are produced through the build stack of
//! [`Algebra`], which inserts in order and merges coefficients.
//!
//! Polynomials deliberately do not implement `Clone`: every copy must go
//! through [`Algebra::copy_poly`] so the term pool's reference counts stay
//! exact, and discarded polynomials are handed back via
//! [`Algebra::free_poly`].

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::term::{TermId, TermPool, VarId};

#[derive(Debug)]
pub struct Monomial {
    pub coeff: BigInt,
    /// `None` denotes the constant term.
    pub term: Option<TermId>,
}

#[derive(Debug)]
pub struct Polynomial {
    mons: Vec<Monomial>,
    deg: u32,
    idx: u64,
}

impl Polynomial {
    pub fn zero() -> Self {
        Polynomial {
            mons: Vec::new(),
            deg: 0,
            idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.mons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mons.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.deg
    }

    pub fn idx(&self) -> u64 {
        self.idx
    }

    pub fn set_idx(&mut self, idx: u64) {
        self.idx = idx;
    }

    pub fn mon(&self, i: usize) -> &Monomial {
        &self.mons[i]
    }

    pub fn mons(&self) -> &[Monomial] {
        &self.mons
    }

    /// Leading monomial.
    pub fn lm(&self) -> &Monomial {
        &self.mons[0]
    }

    /// Leading term; `None` for a constant (or zero) polynomial.
    pub fn lt(&self) -> Option<TermId> {
        self.mons.first().and_then(|m| m.term)
    }

    /// Term of the second monomial.
    pub fn tail_term(&self) -> Option<TermId> {
        self.mons.get(1).and_then(|m| m.term)
    }

    pub fn is_constant_zero(&self) -> bool {
        self.mons.is_empty()
    }

    pub fn is_constant_one(&self) -> bool {
        self.mons.len() == 1 && self.mons[0].term.is_none() && self.mons[0].coeff.is_one()
    }

    pub fn contains_dual_var(&self, pool: &TermPool) -> Option<VarId> {
        for m in &self.mons {
            let t = m.term?;
            if let Some(v) = pool.first_dual_var(t) {
                return Some(v);
            }
        }
        None
    }

    /// Sum over the tail monomials under the current variable values; this is
    /// the value of the gate variable implied by `-g + tail`.
    pub fn evaluate_tail(&self, pool: &TermPool) -> i64 {
        let mut res = 0i64;
        for m in &self.mons[1..] {
            let c = i64::try_from(&m.coeff).expect("sampling coefficient fits i64");
            let t = m.term.map_or(1, |t| pool.evaluate(t));
            res += c * t;
        }
        res
    }
}

pub fn equal_poly(p1: &Polynomial, p2: &Polynomial) -> bool {
    if p1.len() != p2.len() || p1.degree() != p2.degree() {
        return false;
    }
    p1.mons
        .iter()
        .zip(&p2.mons)
        .all(|(a, b)| a.term == b.term && a.coeff == b.coeff)
}

/// Term-order comparison of two polynomials, monomial by monomial.
pub fn cmp_poly(pool: &TermPool, p1: &Polynomial, p2: &Polynomial) -> Ordering {
    if equal_poly(p1, p2) {
        return Ordering::Equal;
    }
    let mut i = 0;
    while i < p1.len() && i < p2.len() {
        let m1 = p1.mon(i);
        let m2 = p2.mon(i);
        if m1.term.is_none() {
            return Ordering::Less;
        }
        if m2.term.is_none() {
            return Ordering::Greater;
        }
        match pool.cmp_term(m1.term, m2.term) {
            Ordering::Equal => i += 1,
            ord => return ord,
        }
    }
    if i < p1.len() {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Renders the polynomial in the line-oriented proof syntax: signed
/// coefficients with star-separated variable names, e.g. `-l10+a0*b0`.
pub fn poly_to_string(pool: &TermPool, p: &Polynomial) -> String {
    if p.is_constant_zero() {
        return "0".to_string();
    }
    let mut out = String::new();
    for (i, m) in p.mons.iter().enumerate() {
        let neg = m.coeff.is_negative();
        if neg {
            out.push('-');
        } else if i > 0 {
            out.push('+');
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
    }
    out
}

/// The algebra context: term pool, build stack, running polynomial index and
/// the modulus 2^N.
#[derive(Debug)]
pub struct Algebra {
    pub pool: TermPool,
    mstack: Vec<Monomial>,
    running_idx: u64,
    pub mod_exp: u32,
    pub mod_coeff: BigInt,
}

impl Algebra {
    pub fn new(mod_exp: u32) -> Self {
        Algebra {
            pool: TermPool::new(),
            mstack: Vec::new(),
            running_idx: 1,
            mod_exp,
            mod_coeff: BigInt::one() << mod_exp,
        }
    }

    // ----- monomial helpers ----------------------------------------------

    /// Wraps a coefficient and an owned term reference into a monomial.
    pub fn mono(&self, coeff: BigInt, term: Option<TermId>) -> Monomial {
        Monomial { coeff, term }
    }

    pub fn copy_mono(&mut self, m: &Monomial) -> Monomial {
        Monomial {
            coeff: m.coeff.clone(),
            term: self.pool.retain_opt(m.term),
        }
    }

    pub fn free_mono(&mut self, m: Monomial) {
        self.pool.release_opt(m.term);
    }

    pub fn multiply_monomial(&mut self, m1: &Monomial, m2: &Monomial) -> Monomial {
        let term = match (m1.term, m2.term) {
            (Some(a), Some(b)) => Some(self.pool.multiply_term(a, b)),
            (Some(a), None) => self.pool.retain_opt(Some(a)),
            (None, b) => self.pool.retain_opt(b),
        };
        Monomial {
            coeff: &m1.coeff * &m2.coeff,
            term,
        }
    }

    // ----- build stack ---------------------------------------------------

    /// Appends without sorting; the caller guarantees decreasing order.
    pub fn push_end(&mut self, m: Monomial) {
        if m.coeff.is_zero() {
            self.free_mono(m);
            return;
        }
        self.mstack.push(m);
    }

    /// Sorted insert with coefficient merging.
    pub fn push(&mut self, m: Monomial) {
        if m.coeff.is_zero() {
            self.free_mono(m);
            return;
        }
        if self.mstack.is_empty() {
            self.mstack.push(m);
            return;
        }
        if m.term.is_none() {
            let last = self.mstack.last_mut().unwrap();
            if last.term.is_some() {
                self.mstack.push(m);
            } else {
                last.coeff += m.coeff;
                if last.coeff.is_zero() {
                    let gone = self.mstack.pop().unwrap();
                    self.free_mono(gone);
                }
            }
            return;
        }

        let mut i = self.mstack.len() as isize - 1;
        let mut cmp = Ordering::Less;
        while i >= 0 {
            cmp = self
                .pool
                .cmp_term(self.mstack[i as usize].term, m.term);
            if cmp != Ordering::Less {
                break;
            }
            i -= 1;
        }

        if cmp == Ordering::Equal {
            let i = i as usize;
            self.mstack[i].coeff += &m.coeff;
            self.free_mono(m);
            if self.mstack[i].coeff.is_zero() {
                let gone = self.mstack.remove(i);
                self.free_mono(gone);
            }
        } else {
            self.mstack.insert((i + 1) as usize, m);
        }
    }

    /// Builds a polynomial from the stack, clearing it and assigning a fresh
    /// index.  An empty stack yields the zero polynomial.
    pub fn build_poly(&mut self) -> Polynomial {
        if self.mstack.is_empty() {
            return Polynomial::zero();
        }
        let mons = std::mem::take(&mut self.mstack);
        let deg = mons
            .iter()
            .map(|m| m.term.map_or(0, |t| self.pool.degree(t)))
            .max()
            .unwrap_or(0);
        self.running_idx += 1;
        Polynomial {
            mons,
            deg,
            idx: self.running_idx,
        }
    }

    pub fn copy_poly(&mut self, p: &Polynomial) -> Polynomial {
        let mons: Vec<Monomial> = p
            .mons
            .iter()
            .map(|m| Monomial {
                coeff: m.coeff.clone(),
                term: self.pool.retain_opt(m.term),
            })
            .collect();
        Polynomial {
            mons,
            deg: p.deg,
            idx: p.idx,
        }
    }

    pub fn free_poly(&mut self, p: Polynomial) {
        for m in p.mons {
            self.pool.release_opt(m.term);
        }
    }

    // ----- arithmetic ----------------------------------------------------

    pub fn add_poly(&mut self, p1: &Polynomial, p2: &Polynomial) -> Polynomial {
        let mut i = 0;
        let mut j = 0;
        while i < p1.len() && j < p2.len() {
            let m1 = p1.mon(i);
            let m2 = p2.mon(j);
            match (m1.term, m2.term) {
                (None, None) => {
                    let coeff = &m1.coeff + &m2.coeff;
                    if !coeff.is_zero() {
                        self.push_end(Monomial { coeff, term: None });
                    }
                    i += 1;
                    j += 1;
                }
                (None, Some(_)) => {
                    let m = self.copy_mono(m2);
                    self.push_end(m);
                    j += 1;
                }
                (Some(_), None) => {
                    let m = self.copy_mono(m1);
                    self.push_end(m);
                    i += 1;
                }
                (Some(_), Some(_)) => match self.pool.cmp_term(m1.term, m2.term) {
                    Ordering::Greater => {
                        let m = self.copy_mono(m1);
                        self.push_end(m);
                        i += 1;
                    }
                    Ordering::Less => {
                        let m = self.copy_mono(m2);
                        self.push_end(m);
                        j += 1;
                    }
                    Ordering::Equal => {
                        let coeff = &m1.coeff + &m2.coeff;
                        if !coeff.is_zero() {
                            let term = self.pool.retain_opt(m1.term);
                            self.push_end(Monomial { coeff, term });
                        }
                        i += 1;
                        j += 1;
                    }
                },
            }
        }
        while i < p1.len() {
            let m = self.copy_mono(p1.mon(i));
            self.push_end(m);
            i += 1;
        }
        while j < p2.len() {
            let m = self.copy_mono(p2.mon(j));
            self.push_end(m);
            j += 1;
        }
        self.build_poly()
    }

    pub fn sub_poly(&mut self, p1: &Polynomial, p2: &Polynomial) -> Polynomial {
        let neg = self.mul_const(p2, &-BigInt::one());
        let res = self.add_poly(&neg, p1);
        self.free_poly(neg);
        res
    }

    /// Cauchy product through the sorted build stack.
    pub fn multiply_poly(&mut self, p1: &Polynomial, p2: &Polynomial) -> Polynomial {
        debug_assert!(self.mstack.is_empty());
        for i in 0..p1.len() {
            for j in 0..p2.len() {
                let m = self.multiply_monomial(p1.mon(i), p2.mon(j));
                self.push(m);
            }
        }
        self.build_poly()
    }

    pub fn mul_const(&mut self, p: &Polynomial, c: &BigInt) -> Polynomial {
        if c.is_zero() {
            return Polynomial::zero();
        }
        for i in 0..p.len() {
            let m = p.mon(i);
            let term = self.pool.retain_opt(m.term);
            self.push_end(Monomial {
                coeff: &m.coeff * c,
                term,
            });
        }
        self.build_poly()
    }

    pub fn mul_term(&mut self, p: &Polynomial, t: Option<TermId>) -> Polynomial {
        let Some(t) = t else {
            return self.copy_poly(p);
        };
        for i in 0..p.len() {
            let m = p.mon(i);
            let term = match m.term {
                Some(t1) => Some(self.pool.multiply_term(t1, t)),
                None => {
                    self.pool.retain(t);
                    Some(t)
                }
            };
            self.push_end(Monomial {
                coeff: m.coeff.clone(),
                term,
            });
        }
        self.build_poly()
    }

    pub fn mul_monomial(&mut self, p: &Polynomial, m: &Monomial) -> Polynomial {
        for i in 0..p.len() {
            let prod = self.multiply_monomial(p.mon(i), m);
            self.push_end(prod);
        }
        self.build_poly()
    }

    /// Quotient of the monomials of `p` divisible by the single variable of
    /// `t`; the scan stops once terms fall below the variable.
    fn divide_by_var_poly(&mut self, p: &Polynomial, t: TermId) -> Polynomial {
        debug_assert_eq!(self.pool.degree(t), 1);
        let v = self.pool.head(t);
        for i in 0..p.len() {
            let m = p.mon(i);
            let Some(mt) = m.term else {
                break;
            };
            if self.pool.cmp_term(Some(mt), Some(t)) == Ordering::Less {
                break;
            }
            if self.pool.contains(mt, v) {
                match self.pool.divide_by_var(mt, v) {
                    Some(rem) => self.push_end(Monomial {
                        coeff: m.coeff.clone(),
                        term: Some(rem),
                    }),
                    None => {
                        self.push_end(Monomial {
                            coeff: m.coeff.clone(),
                            term: None,
                        });
                        break;
                    }
                }
            }
        }
        self.build_poly()
    }

    /// Keeps the monomials containing `t` and divides them by `t`; used to
    /// extract the negated co-factor in polynomial reduction.
    pub fn divide_poly_by_term(&mut self, p: &Polynomial, t: TermId) -> Polynomial {
        if self.pool.degree(t) == 1 {
            return self.divide_by_var_poly(p, t);
        }
        for i in 0..p.len() {
            let m = p.mon(i);
            let Some(mt) = m.term else {
                continue;
            };
            if self.pool.contains_subterm(mt, t) {
                let rem = self.pool.divide_by_term(mt, t);
                self.push_end(Monomial {
                    coeff: m.coeff.clone(),
                    term: rem,
                });
            }
        }
        self.build_poly()
    }

    /// Reduces every coefficient modulo 2^N (truncated remainder, keeping
    /// the sign of the dividend).
    pub fn mod_poly_pure(&mut self, p: &Polynomial) -> Polynomial {
        for i in 0..p.len() {
            let m = p.mon(i);
            let coeff = &m.coeff % &self.mod_coeff;
            if !coeff.is_zero() {
                let term = self.pool.retain_opt(m.term);
                self.push_end(Monomial { coeff, term });
            }
        }
        self.build_poly()
    }

    /// The quotients dropped by [`Self::mod_poly_pure`], negated; the proof
    /// logger multiplies this by 2^N to justify the mod step.
    pub fn mod_poly_quotients(&mut self, p: &Polynomial) -> Polynomial {
        for i in 0..p.len() {
            let m = p.mon(i);
            let quot = &m.coeff / &self.mod_coeff;
            if !quot.is_zero() {
                let term = self.pool.retain_opt(m.term);
                self.push_end(Monomial { coeff: -quot, term });
            }
        }
        self.build_poly()
    }

    /// The dual constraint `-v - v_dual + 1`.  The monomials are kept in this
    /// argument order on purpose: flipping treats `v` as the rewrite target
    /// even when `v` is the primary (lower-level) variable.
    pub fn gen_dual_constraint(&mut self, v: VarId) -> Polynomial {
        let d = self.pool.dual(v);
        let tv = self.pool.make_term(v, None);
        let td = self.pool.make_term(d, None);
        self.push_end(Monomial {
            coeff: -BigInt::one(),
            term: Some(tv),
        });
        self.push_end(Monomial {
            coeff: -BigInt::one(),
            term: Some(td),
        });
        self.push_end(Monomial {
            coeff: BigInt::one(),
            term: None,
        });
        self.build_poly()
    }

    /// Polynomial with the single monomial `c * t` (term ownership taken).
    pub fn poly_from_mono(&mut self, coeff: BigInt, term: Option<TermId>) -> Polynomial {
        self.push_end(Monomial { coeff, term });
        self.build_poly()
    }

    pub fn tail_poly(&mut self, p: &Polynomial) -> Polynomial {
        for i in 1..p.len() {
            let m = self.copy_mono(p.mon(i));
            self.push_end(m);
        }
        self.build_poly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Algebra, Vec<VarId>) {
        let mut alg = Algebra::new(4);
        let vars: Vec<VarId> = (0..4)
            .map(|i| {
                alg.pool
                    .make_var(format!("x{}", i), 2 * (i + 1), 2 * (i + 1), false)
            })
            .collect();
        (alg, vars)
    }

    fn linear(alg: &mut Algebra, coeffs: &[(i64, Option<VarId>)]) -> Polynomial {
        for (c, v) in coeffs {
            let term = v.map(|v| alg.pool.make_term(v, None));
            alg.push(alg_mono(*c, term));
        }
        alg.build_poly()
    }

    fn alg_mono(c: i64, term: Option<TermId>) -> Monomial {
        Monomial {
            coeff: BigInt::from(c),
            term,
        }
    }

    #[test]
    fn test_build_normal_form() {
        let (mut alg, v) = setup();
        // Push out of order and duplicated; expect sorted, merged output.
        let t0 = alg.pool.make_term(v[0], None);
        let t2 = alg.pool.make_term(v[2], None);
        let t0b = alg.pool.make_term(v[0], None);
        alg.push(alg_mono(1, Some(t0)));
        alg.push(alg_mono(3, Some(t2)));
        alg.push(alg_mono(2, Some(t0b)));
        alg.push(alg_mono(-7, None));
        let p = alg.build_poly();
        assert_eq!(p.len(), 3);
        assert_eq!(p.mon(0).coeff, BigInt::from(3));
        assert_eq!(p.mon(1).coeff, BigInt::from(3));
        assert!(p.mon(2).term.is_none());
        for w in p.mons().windows(2) {
            assert_eq!(
                alg.pool.cmp_term(w[0].term, w[1].term),
                Ordering::Greater
            );
        }
        alg.free_poly(p);
    }

    #[test]
    fn test_arithmetic_laws() {
        let (mut alg, v) = setup();
        let p = linear(&mut alg, &[(2, Some(v[1])), (1, Some(v[0])), (5, None)]);
        let q = linear(&mut alg, &[(3, Some(v[2])), (-1, None)]);
        let r = linear(&mut alg, &[(1, Some(v[3])), (4, None)]);

        // add(p, sub(p, p)) == p
        let z = alg.sub_poly(&p, &p);
        assert!(z.is_constant_zero());
        let p2 = alg.add_poly(&p, &z);
        assert!(equal_poly(&p, &p2));

        // mul(p, 1) == p
        let one = alg.poly_from_mono(BigInt::one(), None);
        let p3 = alg.multiply_poly(&p, &one);
        assert!(equal_poly(&p, &p3));

        // Distributivity: (p + q) * r == p*r + q*r
        let pq = alg.add_poly(&p, &q);
        let lhs = alg.multiply_poly(&pq, &r);
        let pr = alg.multiply_poly(&p, &r);
        let qr = alg.multiply_poly(&q, &r);
        let rhs = alg.add_poly(&pr, &qr);
        assert!(equal_poly(&lhs, &rhs));

        for poly in [p, q, r, z, p2, one, p3, pq, lhs, pr, qr, rhs] {
            alg.free_poly(poly);
        }
    }

    #[test]
    fn test_mod_idempotent() {
        let (mut alg, v) = setup();
        // mod_exp = 4 -> modulus 16.
        let p = linear(&mut alg, &[(35, Some(v[1])), (-18, Some(v[0])), (16, None)]);
        let m1 = alg.mod_poly_pure(&p);
        let m2 = alg.mod_poly_pure(&m1);
        assert!(equal_poly(&m1, &m2));
        assert_eq!(m1.mon(0).coeff, BigInt::from(3));
        assert_eq!(m1.mon(1).coeff, BigInt::from(-2));
        // The constant 16 vanished entirely.
        assert_eq!(m1.len(), 2);
        alg.free_poly(p);
        alg.free_poly(m1);
        alg.free_poly(m2);
    }

    #[test]
    fn test_divide_poly_by_term() {
        let (mut alg, v) = setup();
        // p = 2*x3*x1 + x1*x0 + 4
        let t31 = alg.pool.quadratic_term(v[3], v[1]);
        let t10 = alg.pool.quadratic_term(v[1], v[0]);
        alg.push(alg_mono(2, Some(t31)));
        alg.push(alg_mono(1, Some(t10)));
        alg.push(alg_mono(4, None));
        let p = alg.build_poly();

        let t1 = alg.pool.make_term(v[1], None);
        let q = alg.divide_poly_by_term(&p, t1);
        // Monomials containing x1, divided by it: 2*x3 + x0.
        assert_eq!(q.len(), 2);
        assert_eq!(q.mon(0).coeff, BigInt::from(2));
        let t3 = alg.pool.make_term(v[3], None);
        assert_eq!(q.mon(0).term, Some(t3));
        alg.pool.release(t1);
        alg.free_poly(p);
        alg.free_poly(q);
    }

    #[test]
    fn test_poly_to_string() {
        let (mut alg, v) = setup();
        let t10 = alg.pool.quadratic_term(v[1], v[0]);
        let t2 = alg.pool.make_term(v[2], None);
        alg.push(alg_mono(-1, Some(t10)));
        alg.push(alg_mono(2, Some(t2)));
        alg.push(alg_mono(-3, None));
        let p = alg.build_poly();
        assert_eq!(poly_to_string(&alg.pool, &p), "2*x2-x1*x0-3");
        alg.free_poly(p);
    }
}
