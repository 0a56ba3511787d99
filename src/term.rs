// SPDX-License-Identifier: Apache-2.0

//! Variables and hash-consed terms.
//!
//! A term is a product of variables, stored as an ordered linked list with
//! strictly decreasing variable levels.  Terms are hash-consed: for any
//! (head variable, rest) pair at most one term exists, so term equality is
//! handle equality.  Terms are reference counted; a term is removed from the
//! pool when its count reaches zero, recursively releasing its tail.
//!
//! Everything lives in a single [`TermPool`] arena and is addressed by small
//! integer handles ([`VarId`], [`TermId`]) instead of pointers.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TermId(pub u32);

#[derive(Debug)]
pub struct Var {
    name: String,
    name_hash: u64,
    /// Total order used for monomial ordering; duals sit at `level + 1`.
    pub level: i64,
    /// The AIG literal identity (negative for outputs and extension gates).
    pub num: i64,
    dual: Option<VarId>,
    is_dual: bool,
    /// Boolean sampling value: -1 unset, else 0/1.
    pub value: i8,
    /// Transient local id used when emitting pattern-scoped proof names;
    /// 0 means "print the real name".
    pub pattern_id: usize,
}

impl Var {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dual(&self) -> bool {
        self.is_dual
    }

    pub fn dual(&self) -> VarId {
        self.dual.expect("variable has no dual")
    }

    pub fn has_value(&self) -> bool {
        self.value >= 0
    }
}

#[derive(Debug)]
struct TermNode {
    var: VarId,
    rest: Option<TermId>,
    refs: u64,
    hash: u64,
    /// Hash collision chain link.
    next: Option<TermId>,
    deg: u32,
}

/// Arena holding all variables and all live terms, with an intrusive hash
/// table for hash-consing.
#[derive(Debug)]
pub struct TermPool {
    vars: Vec<Var>,
    slots: Vec<Option<TermNode>>,
    free: Vec<u32>,
    buckets: Vec<Option<TermId>>,
    live: usize,
    nonce0: u64,
    nonce1: u64,
    vstack: Vec<VarId>,
}

impl Default for TermPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TermPool {
    pub fn new() -> Self {
        TermPool {
            vars: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; 16],
            live: 0,
            // Odd multipliers for the term hash mix.
            nonce0: 0x9e37_79b9_7f4a_7c15 | 1,
            nonce1: 0xc2b2_ae3d_27d4_eb4f | 1,
            vstack: Vec::new(),
        }
    }

    // ----- variables -----------------------------------------------------

    pub fn make_var(&mut self, name: String, level: i64, num: i64, is_dual: bool) -> VarId {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var {
            name,
            name_hash: h.finish(),
            level,
            num,
            dual: None,
            is_dual,
            value: -1,
            pattern_id: 0,
        });
        id
    }

    pub fn link_duals(&mut self, a: VarId, b: VarId) {
        self.vars[a.0 as usize].dual = Some(b);
        self.vars[b.0 as usize].dual = Some(a);
    }

    pub fn var(&self, v: VarId) -> &Var {
        &self.vars[v.0 as usize]
    }

    pub fn var_mut(&mut self, v: VarId) -> &mut Var {
        &mut self.vars[v.0 as usize]
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn level(&self, v: VarId) -> i64 {
        self.vars[v.0 as usize].level
    }

    pub fn dual(&self, v: VarId) -> VarId {
        self.var(v).dual()
    }

    // ----- hash-consing --------------------------------------------------

    fn term_hash(&self, var: VarId, rest: Option<TermId>) -> u64 {
        let mut res = rest.map_or(0, |r| self.node(r).hash);
        res = res.wrapping_mul(self.nonce0);
        res = res.wrapping_add(self.var(var).name_hash);
        res.wrapping_mul(self.nonce1)
    }

    fn node(&self, t: TermId) -> &TermNode {
        self.slots[t.0 as usize].as_ref().expect("released term")
    }

    fn node_mut(&mut self, t: TermId) -> &mut TermNode {
        self.slots[t.0 as usize].as_mut().expect("released term")
    }

    fn rehash(&mut self) {
        let new_size = self.buckets.len() * 2;
        let mut new_buckets: Vec<Option<TermId>> = vec![None; new_size];
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(node) = slot {
                let h = (node.hash as usize) & (new_size - 1);
                node.next = new_buckets[h];
                new_buckets[h] = Some(TermId(i as u32));
            }
        }
        self.buckets = new_buckets;
    }

    /// Hash-conses the term `var * rest`.  Returns an owned reference: the
    /// caller holds one reference count that must eventually be released.
    /// `rest` is borrowed, not consumed (its count is bumped internally).
    pub fn make_term(&mut self, var: VarId, rest: Option<TermId>) -> TermId {
        if self.live == self.buckets.len() {
            self.rehash();
        }
        let hash = self.term_hash(var, rest);
        let h = (hash as usize) & (self.buckets.len() - 1);

        let mut cursor = self.buckets[h];
        while let Some(t) = cursor {
            let node = self.node(t);
            if node.var == var && node.rest == rest {
                self.node_mut(t).refs += 1;
                return t;
            }
            cursor = node.next;
        }

        if let Some(r) = rest {
            self.retain(r);
        }
        let deg = rest.map_or(1, |r| self.node(r).deg + 1);
        let node = TermNode {
            var,
            rest,
            refs: 1,
            hash,
            next: self.buckets[h],
            deg,
        };
        let id = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(node);
                TermId(i)
            }
            None => {
                self.slots.push(Some(node));
                TermId((self.slots.len() - 1) as u32)
            }
        };
        self.buckets[h] = Some(id);
        self.live += 1;
        id
    }

    /// Bumps the reference count (the `copy` of the pointer world).
    pub fn retain(&mut self, t: TermId) {
        self.node_mut(t).refs += 1;
    }

    pub fn retain_opt(&mut self, t: Option<TermId>) -> Option<TermId> {
        if let Some(t) = t {
            self.retain(t);
        }
        t
    }

    /// Releases one reference; frees the term and cascades into its tail
    /// when the count reaches zero.
    pub fn release(&mut self, t: TermId) {
        let mut cur = Some(t);
        while let Some(t) = cur {
            let node = self.node_mut(t);
            debug_assert!(node.refs > 0);
            node.refs -= 1;
            if node.refs > 0 {
                break;
            }
            let rest = self.node(t).rest;
            let hash = self.node(t).hash;
            let next = self.node(t).next;
            let h = (hash as usize) & (self.buckets.len() - 1);
            if self.buckets[h] == Some(t) {
                self.buckets[h] = next;
            } else {
                let mut p = self.buckets[h].expect("term missing from bucket");
                while self.node(p).next != Some(t) {
                    p = self.node(p).next.expect("term missing from chain");
                }
                self.node_mut(p).next = next;
            }
            self.slots[t.0 as usize] = None;
            self.free.push(t.0);
            self.live -= 1;
            cur = rest;
        }
    }

    pub fn release_opt(&mut self, t: Option<TermId>) {
        if let Some(t) = t {
            self.release(t);
        }
    }

    pub fn refs(&self, t: TermId) -> u64 {
        self.node(t).refs
    }

    pub fn live_terms(&self) -> usize {
        self.live
    }

    // ----- accessors -----------------------------------------------------

    pub fn head(&self, t: TermId) -> VarId {
        self.node(t).var
    }

    pub fn rest(&self, t: TermId) -> Option<TermId> {
        self.node(t).rest
    }

    pub fn degree(&self, t: TermId) -> u32 {
        self.node(t).deg
    }

    pub fn head_level(&self, t: TermId) -> i64 {
        self.level(self.node(t).var)
    }

    pub fn head_num(&self, t: TermId) -> i64 {
        self.var(self.node(t).var).num
    }

    /// Iterates the variables of the term, in decreasing level order.
    pub fn iter_vars(&self, t: TermId) -> TermVarIter<'_> {
        TermVarIter {
            pool: self,
            cur: Some(t),
        }
    }

    pub fn contains(&self, t: TermId, v: VarId) -> bool {
        self.iter_vars(t).any(|w| w == v)
    }

    pub fn contains_subterm(&self, t: TermId, sub: TermId) -> bool {
        self.iter_vars(sub).all(|v| self.contains(t, v))
    }

    pub fn first_dual_var(&self, t: TermId) -> Option<VarId> {
        self.iter_vars(t).find(|&v| self.var(v).is_dual)
    }

    pub fn count_dual(&self, t: TermId) -> usize {
        self.iter_vars(t).filter(|&v| self.var(v).is_dual).count()
    }

    pub fn equal_up_to_duality(&self, t1: TermId, t2: TermId) -> bool {
        if t1 == t2 {
            return true;
        }
        let mut a = Some(t1);
        let mut b = Some(t2);
        while let (Some(x), Some(y)) = (a, b) {
            let vx = self.head(x);
            let vy = self.head(y);
            if vx != vy && Some(vx) != self.var(vy).dual {
                return false;
            }
            a = self.rest(x);
            b = self.rest(y);
        }
        a.is_none() && b.is_none()
    }

    /// Evaluates the term under the current variable values; all variables
    /// must be set.
    pub fn evaluate(&self, t: TermId) -> i64 {
        let mut res = 1i64;
        let mut cur = Some(t);
        while let Some(t) = cur {
            if res == 0 {
                break;
            }
            let v = self.var(self.head(t));
            assert!(v.has_value(), "evaluating unset variable {}", v.name);
            res *= v.value as i64;
            cur = self.rest(t);
        }
        res
    }

    // ----- ordering ------------------------------------------------------

    /// Lexicographic comparison over the level sequences; a longer term wins
    /// over an equal prefix.  The empty (constant) term is smallest.
    pub fn cmp_term(&self, t1: Option<TermId>, t2: Option<TermId>) -> Ordering {
        match (t1, t2) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => {
                if a == b {
                    return Ordering::Equal;
                }
                let mut x = Some(a);
                let mut y = Some(b);
                while let (Some(a), Some(b)) = (x, y) {
                    match self.head_level(a).cmp(&self.head_level(b)) {
                        Ordering::Greater => return Ordering::Greater,
                        Ordering::Less => return Ordering::Less,
                        Ordering::Equal => {
                            x = self.rest(a);
                            y = self.rest(b);
                        }
                    }
                }
                if x.is_some() {
                    Ordering::Greater
                } else if y.is_some() {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            }
        }
    }

    // ----- term construction ---------------------------------------------

    pub fn push_vstack(&mut self, v: VarId) {
        self.vstack.push(v);
    }

    pub fn clear_vstack(&mut self) {
        self.vstack.clear();
    }

    /// Builds a term from the variable stack, consuming it.  The stack is
    /// expected to hold variables in decreasing level order unless `sort`.
    pub fn build_term_from_stack(&mut self, sort: bool) -> Option<TermId> {
        if sort {
            let mut vs = std::mem::take(&mut self.vstack);
            vs.sort_by(|a, b| self.level(*b).cmp(&self.level(*a)));
            self.vstack = vs;
        }
        let mut res: Option<TermId> = None;
        while let Some(v) = self.vstack.pop() {
            let t = self.make_term(v, res);
            self.release_opt(res);
            res = Some(t);
        }
        res
    }

    /// Sorts the variables by decreasing level and builds the term, skipping
    /// adjacent (dual, primary) pairs of the same variable.
    pub fn sort_and_build_term_from_vars(&mut self, mut vs: Vec<VarId>) -> Option<TermId> {
        vs.sort_by(|a, b| self.level(*b).cmp(&self.level(*a)));
        let mut i = 0;
        while i < vs.len() {
            if i + 1 < vs.len() && Some(vs[i]) == self.var(vs[i + 1]).dual {
                i += 2;
            } else {
                self.push_vstack(vs[i]);
                i += 1;
            }
        }
        self.build_term_from_stack(false)
    }

    // ----- arithmetic ----------------------------------------------------

    /// Merges the sorted variable lists of `t1` and `t2` (squares collapse).
    pub fn multiply_term(&mut self, t1: TermId, t2: TermId) -> TermId {
        if t1 == t2 {
            self.retain(t1);
            return t1;
        }
        let mut a = Some(t1);
        let mut b = Some(t2);
        let mut vs = Vec::new();
        while let (Some(x), Some(y)) = (a, b) {
            match self.head_level(x).cmp(&self.head_level(y)) {
                Ordering::Greater => {
                    vs.push(self.head(x));
                    a = self.rest(x);
                }
                Ordering::Less => {
                    vs.push(self.head(y));
                    b = self.rest(y);
                }
                Ordering::Equal => {
                    vs.push(self.head(x));
                    a = self.rest(x);
                    b = self.rest(y);
                }
            }
        }
        while let Some(x) = a {
            vs.push(self.head(x));
            a = self.rest(x);
        }
        while let Some(y) = b {
            vs.push(self.head(y));
            b = self.rest(y);
        }
        for v in vs {
            self.push_vstack(v);
        }
        self.build_term_from_stack(false)
            .expect("product of non-empty terms is non-empty")
    }

    /// `t * v`, or `None` if `t` contains the dual of `v` (the product
    /// vanishes over the Boolean axioms).
    pub fn multiply_term_by_var(&mut self, t: Option<TermId>, v: VarId) -> Option<TermId> {
        let Some(t) = t else {
            return Some(self.make_term(v, None));
        };
        if self.contains(t, self.var(v).dual()) {
            return None;
        }
        let tv = self.make_term(v, None);
        let res = self.multiply_term(t, tv);
        self.release(tv);
        Some(res)
    }

    pub fn quadratic_term(&mut self, v1: VarId, v2: VarId) -> TermId {
        let t1 = self.make_term(v1, None);
        let t2 = self.make_term(v2, None);
        let res = self.multiply_term(t1, t2);
        self.release(t1);
        self.release(t2);
        res
    }

    /// Removes one occurrence of `v`; `None` when the term becomes empty.
    pub fn divide_by_var(&mut self, t: TermId, v: VarId) -> Option<TermId> {
        let vs: Vec<VarId> = self.iter_vars(t).filter(|&w| w != v).collect();
        for w in vs {
            self.push_vstack(w);
        }
        self.build_term_from_stack(false)
    }

    /// Element-wise cancellation of `t1` from `t`; returns `t` (retained)
    /// unchanged when `t1` is not contained in `t`, `None` when everything
    /// cancels.
    pub fn divide_by_term(&mut self, t: TermId, t1: TermId) -> Option<TermId> {
        let mut kept = Vec::new();
        let mut cur = Some(t);
        let mut div = Some(t1);
        while let (Some(x), Some(y)) = (cur, div) {
            if self.head(x) != self.head(y) {
                kept.push(self.head(x));
            } else {
                div = self.rest(y);
            }
            cur = self.rest(x);
        }
        if div.is_some() {
            self.retain(t);
            return Some(t);
        }
        while let Some(x) = cur {
            kept.push(self.head(x));
            cur = self.rest(x);
        }
        for v in kept {
            self.push_vstack(v);
        }
        self.build_term_from_stack(false)
    }

    // ----- printing ------------------------------------------------------

    pub fn var_display_name(&self, v: VarId) -> String {
        let var = self.var(v);
        if var.pattern_id > 0 {
            format!("v{}", var.pattern_id)
        } else {
            var.name.clone()
        }
    }

    pub fn term_to_string(&self, t: Option<TermId>) -> String {
        match t {
            None => "0".to_string(),
            Some(t) => {
                let names: Vec<String> =
                    self.iter_vars(t).map(|v| self.var_display_name(v)).collect();
                names.join("*")
            }
        }
    }
}

pub struct TermVarIter<'a> {
    pool: &'a TermPool,
    cur: Option<TermId>,
}

impl Iterator for TermVarIter<'_> {
    type Item = VarId;

    fn next(&mut self) -> Option<VarId> {
        let t = self.cur?;
        self.cur = self.pool.rest(t);
        Some(self.pool.head(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with_vars(n: usize) -> (TermPool, Vec<VarId>) {
        let mut pool = TermPool::new();
        let vars: Vec<VarId> = (0..n)
            .map(|i| pool.make_var(format!("x{}", i), 2 * (i as i64 + 1), 2 * (i as i64 + 1), false))
            .collect();
        (pool, vars)
    }

    #[test]
    fn test_hash_cons_uniqueness() {
        let (mut pool, v) = pool_with_vars(3);
        let t1 = pool.make_term(v[0], None);
        let t2 = pool.make_term(v[0], None);
        assert_eq!(t1, t2);
        assert_eq!(pool.refs(t1), 2);

        let u1 = pool.make_term(v[1], Some(t1));
        let u2 = pool.make_term(v[1], Some(t2));
        assert_eq!(u1, u2);
        assert_eq!(pool.degree(u1), 2);
    }

    #[test]
    fn test_release_cascades() {
        let (mut pool, v) = pool_with_vars(2);
        let t = pool.make_term(v[0], None);
        let u = pool.make_term(v[1], Some(t));
        // `u` holds the only extra reference on `t`.
        pool.release(t);
        assert_eq!(pool.live_terms(), 2);
        pool.release(u);
        assert_eq!(pool.live_terms(), 0);
    }

    #[test]
    fn test_cmp_term_total_order() {
        let (mut pool, v) = pool_with_vars(3);
        // x2 > x1 > x0 by level.
        pool.push_vstack(v[2]);
        pool.push_vstack(v[0]);
        let t20 = pool.build_term_from_stack(false);
        pool.push_vstack(v[1]);
        pool.push_vstack(v[0]);
        let t10 = pool.build_term_from_stack(false);
        pool.push_vstack(v[2]);
        let t2 = pool.build_term_from_stack(false);

        assert_eq!(pool.cmp_term(t20, t10), Ordering::Greater);
        assert_eq!(pool.cmp_term(t10, t20), Ordering::Less);
        // Longer term wins over its own prefix.
        assert_eq!(pool.cmp_term(t20, t2), Ordering::Greater);
        assert_eq!(pool.cmp_term(None, t2), Ordering::Less);
        assert_eq!(pool.cmp_term(t20, t20), Ordering::Equal);
    }

    #[test]
    fn test_mul_div_round_trip() {
        let (mut pool, v) = pool_with_vars(4);
        pool.push_vstack(v[3]);
        pool.push_vstack(v[1]);
        pool.push_vstack(v[0]);
        let t = pool.build_term_from_stack(false).unwrap();
        pool.push_vstack(v[1]);
        pool.push_vstack(v[0]);
        let u = pool.build_term_from_stack(false).unwrap();

        let q = pool.divide_by_term(t, u).unwrap();
        let back = pool.multiply_term(q, u);
        assert_eq!(back, t);
    }

    #[test]
    fn test_divide_by_term_not_contained() {
        let (mut pool, v) = pool_with_vars(3);
        let t = pool.make_term(v[0], None);
        pool.push_vstack(v[2]);
        pool.push_vstack(v[1]);
        let u = pool.build_term_from_stack(false).unwrap();
        // u is not a subterm of t, so division returns t unchanged.
        assert_eq!(pool.divide_by_term(t, u), Some(t));
    }

    #[test]
    fn test_dual_product_vanishes() {
        let mut pool = TermPool::new();
        let x = pool.make_var("x".into(), 2, 2, false);
        let xd = pool.make_var("(1-x)".into(), 3, 2, true);
        pool.link_duals(x, xd);
        let t = pool.make_term(x, None);
        assert_eq!(pool.multiply_term_by_var(Some(t), xd), None);
    }
}
