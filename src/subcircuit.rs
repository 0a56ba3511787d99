// SPDX-License-Identifier: Apache-2.0

//! Sub-circuit carve-out and canonicalization.
//!
//! Around a target gate a neighborhood is cut out of the graph: its interior
//! (`gate_poly`), its frontier (`inputs`) and the ambient variable set
//! (`var`).  The carve follows children to a configured depth bounded by
//! fan-out, then pulls in same-distance ancestors, spouses, isolated
//! frontier gates, partial products and common ancestors -- the gates whose
//! constraints combine non-trivially with the interior.
//!
//! For caching, the interior polynomials are projected to local integer ids
//! in first-seen order (`NormalizedPoly`); two sub-circuits with the same
//! normalized form share their linearization result.
//!
//! The same file computes the mutually-reduced normal forms of the interior
//! (top-down), which feed the FGLM matrix.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use num_bigint::BigInt;

use crate::engine::Engine;
use crate::gate::GateId;
use crate::term::VarId;

/// Edge relation used while carving: the rewritten algebraic graph for the
/// FGLM path, the immutable AIG graph when guessing (the SAT encoder needs
/// AIG nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarveMode {
    Algebraic,
    AigBased,
}

/// A polynomial flattened to local ids: each monomial is its coefficient
/// plus the id sequence of its variables (id 0 = constant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPoly {
    pub mons: Vec<(BigInt, Vec<usize>)>,
}

/// First-seen-order assignment of local variable ids within a sub-circuit.
#[derive(Debug, Default)]
pub struct VarMap {
    map: std::collections::HashMap<VarId, usize>,
    order: Vec<VarId>,
}

impl VarMap {
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    pub fn get(&self, v: VarId) -> Option<usize> {
        self.map.get(&v).copied()
    }

    pub fn get_or_insert(&mut self, v: VarId) -> usize {
        if let Some(id) = self.map.get(&v) {
            return *id;
        }
        let id = self.order.len() + 1;
        self.map.insert(v, id);
        self.order.push(v);
        id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// (variable, id) pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, usize)> + '_ {
        self.order.iter().enumerate().map(|(i, &v)| (v, i + 1))
    }
}

pub fn circuit_hash(circuit: &[NormalizedPoly]) -> u64 {
    let mut h = DefaultHasher::new();
    circuit.hash(&mut h);
    h.finish()
}

impl Engine {
    fn carve_parents_len(&self, g: GateId, mode: CarveMode) -> usize {
        match mode {
            CarveMode::Algebraic => self.gates.g(g).parents.len(),
            CarveMode::AigBased => self.gates.g(g).aig_parents.len(),
        }
    }

    fn carve_children(&self, g: GateId, mode: CarveMode) -> Vec<GateId> {
        match mode {
            CarveMode::Algebraic => self.gates.g(g).children.clone(),
            CarveMode::AigBased => self.gates.g(g).aig_children.clone(),
        }
    }

    fn carve_parents(&self, g: GateId, mode: CarveMode) -> Vec<GateId> {
        match mode {
            CarveMode::Algebraic => self.gates.g(g).parents.clone(),
            CarveMode::AigBased => self
                .gates
                .g(g)
                .aig_parents
                .iter()
                .filter_map(|&lit| self.gates.gate(lit))
                .collect(),
        }
    }

    fn carve_is_child(&self, parent: GateId, g: GateId, mode: CarveMode) -> bool {
        match mode {
            CarveMode::Algebraic => self.gates.g(parent).is_child(g),
            CarveMode::AigBased => self.gates.g(parent).is_aig_child(g),
        }
    }

    fn inputs_sorted_dec(&self) -> Vec<GateId> {
        let mut v: Vec<GateId> = self.sc.inputs.iter().copied().collect();
        self.gates.sort_by_level_dec(&self.alg.pool, &mut v);
        v
    }

    fn gate_poly_sorted_inc(&self) -> Vec<GateId> {
        let mut v: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut v);
        v
    }

    fn var_sorted_dec(&self) -> Vec<GateId> {
        let mut v: Vec<GateId> = self.sc.var.iter().copied().collect();
        self.gates.sort_by_level_dec(&self.alg.pool, &mut v);
        v
    }

    // ----- carve steps ----------------------------------------------------

    fn add_children(
        &mut self,
        g: GateId,
        root: GateId,
        depth: usize,
        fanout_size: usize,
        init: bool,
        mode: CarveMode,
    ) {
        if self.gates.g(g).input || depth == 0 {
            return;
        }
        if fanout_size > 0
            && !init
            && self.carve_parents_len(g, mode) >= fanout_size
            && !self.carve_is_child(root, g, mode)
        {
            self.sc.fanout_last = self.carve_parents_len(g, mode);
            return;
        }

        self.sc.gate_poly.insert(g);
        self.sc.inputs.remove(&g);
        self.sc.var.insert(g);
        log::trace!("added child {}", self.gate_name(g));

        for gc in self.carve_children(g, mode) {
            if self.gates.g(gc).elim {
                continue;
            }
            self.sc.var.insert(gc);
            if !self.sc.gate_poly.contains(&gc) {
                self.sc.inputs.insert(gc);
            }
        }

        for gc in self.carve_children(g, mode) {
            self.add_children(gc, root, depth - 1, fanout_size, false, mode);
        }
    }

    /// Absorbs isolated frontier gates (single parent, no XOR partner) and
    /// frontier gates whose every fan-in is already on the frontier.
    fn push_inputs(&mut self, fanout_size: usize, mode: CarveMode) {
        let mut placeholders = Vec::new();
        for g in self.inputs_sorted_dec() {
            let gate = self.gates.g(g);
            if self.carve_parents_len(g, mode) == 1
                && self.carve_parents_len(g, mode) < fanout_size
                && gate.xor_and.is_none()
                && !gate.input
            {
                self.sc.gate_poly.insert(g);
                placeholders.push(g);
                log::debug!("pushed single input {}", self.gate_name(g));

                for gc in self.carve_children(g, mode) {
                    if self.gates.g(gc).elim {
                        continue;
                    }
                    self.sc.var.insert(gc);
                    if !self.sc.gate_poly.contains(&gc) {
                        self.sc.inputs.insert(gc);
                    }
                }
            }

            if self.gates.g(g).dist > 0 {
                let all_frontier = self
                    .carve_children(g, mode)
                    .iter()
                    .all(|gc| self.sc.inputs.contains(gc));
                if all_frontier {
                    self.sc.gate_poly.insert(g);
                    placeholders.push(g);
                    log::debug!("pushed input whose inputs are inputs {}", self.gate_name(g));
                }
            }
        }
        for g in placeholders {
            self.sc.inputs.remove(&g);
        }
    }

    /// Absorbs frontier partial products into the interior.
    fn push_pp(&mut self, mode: CarveMode) {
        let mut placeholders = Vec::new();
        for g in self.inputs_sorted_dec() {
            if !self.gates.g(g).partial_product {
                continue;
            }
            self.sc.gate_poly.insert(g);
            placeholders.push(g);
            log::debug!("pushed pp {}", self.gate_name(g));
            for gc in self.carve_children(g, mode) {
                self.sc.var.insert(gc);
                self.sc.inputs.insert(gc);
            }
        }
        for g in placeholders {
            self.sc.inputs.remove(&g);
        }
    }

    /// Gates sharing a child with the interior, below the target's level.
    fn add_spouses(&mut self, g: GateId, mode: CarveMode) {
        let g_level = self.alg.pool.level(self.gates.g(g).v);
        for gc in self.carve_children(g, mode) {
            if self.gates.g(gc).input {
                continue;
            }
            for sib in self.carve_parents(gc, mode) {
                if sib == g {
                    continue;
                }
                if self.alg.pool.level(self.gates.g(sib).v) > g_level {
                    continue;
                }
                if self.gates.g(sib).elim {
                    continue;
                }

                if !self.sc.gate_poly.contains(&sib) && !self.gates.g(sib).input {
                    self.sc.gate_poly.insert(sib);
                }
                self.sc.inputs.remove(&sib);
                self.sc.var.insert(sib);
                log::debug!("added spouse {}", self.gate_name(sib));

                for sib_c in self.carve_children(sib, mode) {
                    if self.gates.g(sib_c).elim {
                        continue;
                    }
                    self.sc.var.insert(sib_c);
                    if !self.sc.gate_poly.contains(&sib_c) {
                        self.sc.inputs.insert(sib_c);
                    }
                }
            }
        }
    }

    /// Pulls in ancestors of `node` (below the target) whose every other
    /// fan-in is already ambient.
    fn add_parents(&mut self, node: GateId, g: GateId, mode: CarveMode) {
        let g_level = self.alg.pool.level(self.gates.g(g).v);
        for node_p in self.carve_parents(node, mode) {
            if self.alg.pool.level(self.gates.g(node_p).v) > g_level {
                continue;
            }
            if self.gates.g(node_p).output || self.gates.g(node_p).elim {
                continue;
            }

            let covered = self
                .carve_children(node_p, mode)
                .iter()
                .all(|&c| c == node || self.sc.var.contains(&c));
            if !covered {
                continue;
            }

            if !self.sc.gate_poly.contains(&node_p) && !self.gates.g(node_p).input {
                self.sc.gate_poly.insert(node_p);
                self.sc.inputs.remove(&node_p);
                log::debug!("added parent {}", self.gate_name(node_p));
                self.sc.var.insert(node_p);
                self.add_parents(node_p, g, mode);
            }
        }
    }

    fn add_common_ancestors(&mut self, g: GateId, mode: CarveMode) {
        let g_level = self.alg.pool.level(self.gates.g(g).v);
        for node in self.var_sorted_dec() {
            for node_p in self.carve_parents(node, mode) {
                if node_p == g {
                    continue;
                }
                if self.alg.pool.level(self.gates.g(node_p).v) > g_level {
                    continue;
                }
                if self.gates.g(node_p).output || self.gates.g(node_p).elim {
                    continue;
                }

                let covered = self
                    .carve_children(node_p, mode)
                    .iter()
                    .all(|&c| c == node || self.sc.var.contains(&c));
                if !covered {
                    continue;
                }

                if !self.sc.gate_poly.contains(&node_p) && !self.gates.g(node_p).input {
                    log::debug!("added common ancestor {}", self.gate_name(node_p));
                    self.sc.gate_poly.insert(node_p);
                    self.sc.inputs.remove(&node_p);
                    self.sc.var.insert(node_p);
                    self.add_parents(node_p, g, mode);
                }
            }
        }
    }

    fn add_ancestors_with_same_dist(&mut self, g: GateId, mode: CarveMode) {
        let g_level = self.alg.pool.level(self.gates.g(g).v);
        let g_dist = self.gates.g(g).dist;
        for node in self.var_sorted_dec() {
            for node_p in self.carve_parents(node, mode) {
                if node_p == g {
                    continue;
                }
                if self.gates.g(node_p).dist != g_dist {
                    continue;
                }
                if self.alg.pool.level(self.gates.g(node_p).v) > g_level {
                    continue;
                }
                if self.gates.g(node_p).output || self.gates.g(node_p).elim {
                    continue;
                }

                for c in self.carve_children(node_p, mode) {
                    if c == node {
                        continue;
                    }
                    if !self.sc.var.contains(&c) {
                        self.sc.var.insert(c);
                        self.sc.inputs.insert(c);
                    }
                }

                if !self.sc.gate_poly.contains(&node_p) && !self.gates.g(node_p).input {
                    log::debug!("added same dist ancestor {}", self.gate_name(node_p));
                    self.sc.gate_poly.insert(node_p);
                    self.sc.inputs.remove(&node_p);
                    self.sc.var.insert(node_p);
                    self.add_parents(node_p, g, mode);
                }
            }
        }
    }

    /// Expands exactly one frontier gate (preferring small fan-out, then
    /// high distance); used for iterative enlargement.  Returns false when
    /// no expansion is possible.
    fn expand_inputs(&mut self, inp_g: GateId, depth: usize, fanout_size: usize, mode: CarveMode) -> bool {
        if self
            .sc
            .inputs
            .iter()
            .all(|&g| self.gates.g(g).input)
        {
            return true;
        }

        let frontier = self.inputs_sorted_dec();
        let mut exp: Option<GateId> = None;
        for &g in &frontier {
            if self.gates.g(g).input {
                continue;
            }
            if self.carve_parents_len(g, mode) < fanout_size {
                exp = Some(g);
                break;
            }
            if self.gates.g(g).dist + depth as i64 > self.gates.g(inp_g).dist {
                exp = Some(g);
                break;
            }
        }

        let mut widen = 1usize;
        loop {
            if exp.is_some() {
                break;
            }
            let mut any_deep = false;
            for &g in &frontier {
                if self.gates.g(g).dist > 1
                    && self.carve_parents_len(g, mode) < fanout_size + widen
                {
                    exp = Some(g);
                    break;
                }
                if self.gates.g(g).dist > 1 {
                    any_deep = true;
                }
            }
            if exp.is_some() || !any_deep {
                break;
            }
            widen += 1;
        }
        let Some(mut exp) = exp else {
            return false;
        };

        let placeholders: Vec<GateId> = frontier
            .iter()
            .copied()
            .filter(|&g| {
                self.gates.g(g).dist > 0 && self.carve_parents_len(g, mode) <= fanout_size
            })
            .collect();

        // With only a few expandable gates, take them all at once.
        if !placeholders.is_empty() && placeholders.len() < 4 {
            for exp in placeholders {
                self.sc.gate_poly.insert(exp);
                log::debug!("expanded by {}", self.gate_name(exp));
                self.sc.inputs.remove(&exp);
                for gc in self.carve_children(exp, mode) {
                    if self.gates.g(gc).elim {
                        continue;
                    }
                    self.sc.var.insert(gc);
                    if !self.sc.gate_poly.contains(&gc) {
                        self.sc.inputs.insert(gc);
                    }
                }
            }
            return true;
        }

        for &g in &frontier {
            if self.gates.g(g).dist > self.gates.g(exp).dist
                && self.carve_parents_len(g, mode) < fanout_size
            {
                exp = g;
            }
        }

        self.sc.gate_poly.insert(exp);
        self.sc.inputs.remove(&exp);
        log::debug!("expand input {}", self.gate_name(exp));
        for gc in self.carve_children(exp, mode) {
            if self.gates.g(gc).elim {
                continue;
            }
            self.sc.var.insert(gc);
            if !self.sc.gate_poly.contains(&gc) {
                self.sc.inputs.insert(gc);
            }
        }
        true
    }

    // ----- FSA sub-circuit ------------------------------------------------

    pub fn is_internal_fsa(&self, g: GateId) -> bool {
        if !self.gates.g(g).fsa || self.gates.g(g).input {
            return false;
        }
        self.gates
            .g(g)
            .children
            .iter()
            .all(|&gc| self.gates.g(gc).fsa)
    }

    /// Collects the whole marked FSA region below `g` as one sub-circuit.
    fn gen_fsa_subcircuit(&mut self, g: GateId) {
        let g_level = self.alg.pool.level(self.gates.g(g).v);
        for i in (1..self.gates.num_gates()).rev() {
            let n = GateId(i as u32);
            let gate = self.gates.g(n);
            if gate.elim || !gate.fsa {
                continue;
            }
            if self.alg.pool.level(gate.v) > g_level {
                continue;
            }
            if gate.input {
                self.sc.inputs.insert(n);
                self.sc.var.insert(n);
            } else {
                let boundary = self
                    .gates
                    .g(n)
                    .children
                    .iter()
                    .any(|&nc| !self.gates.g(nc).fsa);
                if boundary {
                    self.sc.inputs.insert(n);
                    self.sc.var.insert(n);
                } else {
                    self.sc.gate_poly.insert(n);
                    self.sc.var.insert(n);
                }
            }
        }
    }

    // ----- entry points ---------------------------------------------------

    fn get_subcircuit(
        &mut self,
        g: GateId,
        depth: usize,
        fanout_size: usize,
        init: bool,
        single_expand: bool,
    ) -> bool {
        if init {
            self.sc.clear();
        }

        if self.is_internal_fsa(g) {
            self.gen_fsa_subcircuit(g);
            return true;
        }

        let mode = if self.cfg.force_guessing() {
            CarveMode::AigBased
        } else {
            CarveMode::Algebraic
        };

        if !single_expand {
            self.add_children(g, g, depth, fanout_size, true, mode);
        } else if !self.expand_inputs(g, depth, fanout_size, mode) {
            return false;
        }

        self.add_ancestors_with_same_dist(g, mode);
        self.add_spouses(g, mode);
        self.push_inputs(fanout_size, mode);
        self.push_pp(mode);
        self.add_common_ancestors(g, mode);

        log::debug!(
            "subcircuit with root {} at dist {}: {} gates, {} inputs",
            self.gate_name(g),
            self.gates.g(g).dist,
            self.sc.gate_poly.len(),
            self.sc.inputs.len()
        );
        true
    }

    fn normalize(&mut self, g: GateId, var_map: &mut VarMap) -> NormalizedPoly {
        let nf = self.gates.g(g).normal_form.as_ref().unwrap();
        let mut mons = Vec::with_capacity(nf.len());
        for m in nf.mons() {
            let mut ids = Vec::new();
            match m.term {
                None => ids.push(0),
                Some(t) => {
                    for v in self.alg.pool.iter_vars(t).collect::<Vec<_>>() {
                        ids.push(var_map.get_or_insert(v));
                    }
                }
            }
            mons.push((m.coeff.clone(), ids));
        }
        NormalizedPoly { mons }
    }

    /// Projects the interior polynomials to [`NormalizedPoly`]s, computing
    /// each gate's normal form on the way (unflipped, vanishing monomials
    /// removed).
    fn compress_subcircuit(&mut self, var_map: &mut VarMap) -> Vec<NormalizedPoly> {
        var_map.clear();
        let mut res = Vec::new();
        for g in self.gate_poly_sorted_inc() {
            if self.gates.g(g).normal_form.is_none() {
                let gc = {
                    let p = self.gates.g(g).gate_constraint.as_ref().unwrap();
                    self.alg.copy_poly(p)
                };
                let nf = self.unflip_poly_and_remove_van_mon(&gc);
                self.alg.free_poly(gc);
                self.gates.g_mut(g).normal_form = Some(nf);
            }
            res.push(self.normalize(g, var_map));
        }
        res
    }

    /// Carves the sub-circuit and canonicalizes it for the cache.  Returns
    /// false when the carve cannot make progress.
    pub fn get_and_compress_subcircuit(
        &mut self,
        g: GateId,
        depth: usize,
        fanout_size: usize,
        init: bool,
        single_expand: bool,
        var_map: &mut VarMap,
    ) -> Option<Vec<NormalizedPoly>> {
        let start = std::time::Instant::now();
        if !self.get_subcircuit(g, depth, fanout_size, init, single_expand) {
            self.stats.find_circuit_time += start.elapsed();
            return None;
        }

        // The FSA sub-circuit is not cached, hence not compressed.
        let res = if !self.is_internal_fsa(g) || self.cfg.force_fglm() {
            Some(self.compress_subcircuit(var_map))
        } else {
            Some(Vec::new())
        };
        self.stats.find_circuit_time += start.elapsed();
        res
    }

    // ----- normal forms ---------------------------------------------------

    /// Mutually reduces the interior polynomials top-down (largest level
    /// first): each polynomial is reduced by every subsequent one and
    /// cleaned of vanishing monomials.  Returns the interior gates in
    /// processing order; their `normal_form`s hold the results.  `new_nf`
    /// collects the gates whose normal forms changed, for the proof pattern.
    pub fn compute_normalforms(
        &mut self,
        mut used_van: Option<&mut Vec<u64>>,
        new_nf: &mut Vec<GateId>,
    ) -> Vec<GateId> {
        if self.sc.gate_poly.is_empty() {
            return Vec::new();
        }
        log::debug!("computing normal forms top down");

        let mut order = self.gate_poly_sorted_inc();
        order.reverse();
        let n = order.len();

        for k in 0..n {
            let g = order[k];
            let mut gpol = self
                .gates
                .g_mut(g)
                .normal_form
                .take()
                .expect("interior gate has a normal form from compression");

            for j in k..n {
                if j == k {
                    continue;
                }
                if gpol.len() == 1 {
                    continue;
                }
                let inner = order[j];
                let reducer = {
                    let p = self.gates.g(inner).normal_form.as_ref().unwrap();
                    self.alg.copy_poly(p)
                };
                if gpol.lt() == reducer.lt() {
                    self.alg.free_poly(reducer);
                    continue;
                }
                let tmp = self.reduce_by_one_poly(&gpol, &reducer, false);
                self.alg.free_poly(reducer);
                let tmp = if tmp.degree() > 1 {
                    let reborrow = used_van.as_mut().map(|v| &mut **v);
                    let cleaned = self.remove_vanishing_monomials(&tmp, reborrow);
                    self.alg.free_poly(tmp);
                    cleaned
                } else {
                    tmp
                };
                if self.proof.is_none() {
                    self.check_if_propagate(&tmp);
                }
                self.alg.free_poly(gpol);
                gpol = tmp;
            }

            if self.proof.is_none() {
                self.check_if_propagate(&gpol);
            }
            self.gates.g_mut(g).normal_form = Some(gpol);
            if self.proof.is_some() {
                new_nf.push(g);
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiger::parse_aiger;
    use crate::config::Config;
    use crate::engine::Engine;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn engine() -> Engine {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 1;
        Engine::new(aig, cfg)
    }

    #[test]
    fn test_carve_around_xor_root() {
        let mut e = engine();
        let l10 = e.gates.gate(10).unwrap();
        let mut var_map = VarMap::default();
        let circuit = e
            .get_and_compress_subcircuit(l10, 2, 4, true, false, &mut var_map)
            .unwrap();
        // The carve pulls in the XOR root, its two internal ANDs and the
        // sibling partial product.
        assert!(e.sc.gate_poly.contains(&l10));
        assert!(e.sc.gate_poly.len() >= 3);
        assert_eq!(circuit.len(), e.sc.gate_poly.len());
        assert!(!var_map.is_empty());
    }

    #[test]
    fn test_canonicalization_is_renaming_invariant() {
        // The same structural carve hashes identically under a different
        // variable naming scheme (multiplier-style a/b names vs i names).
        let mut e1 = engine();
        let mut cfg2 = Config::default();
        cfg2.seed = 1;
        cfg2.spec_mode = crate::config::SpecMode::Mult;
        let aig2 = parse_aiger(HALF_ADDER).unwrap();
        let mut e2 = Engine::new(aig2, cfg2);

        let l10_1 = e1.gates.gate(10).unwrap();
        let l10_2 = e2.gates.gate(10).unwrap();

        let mut map1 = VarMap::default();
        let c1 = e1
            .get_and_compress_subcircuit(l10_1, 2, 4, true, false, &mut map1)
            .unwrap();
        let mut map2 = VarMap::default();
        let c2 = e2
            .get_and_compress_subcircuit(l10_2, 2, 4, true, false, &mut map2)
            .unwrap();

        assert_eq!(c1, c2);
        assert_eq!(circuit_hash(&c1), circuit_hash(&c2));
    }

    #[test]
    fn test_normal_forms_reduce_interior() {
        let mut e = engine();
        let l10 = e.gates.gate(10).unwrap();
        let mut var_map = VarMap::default();
        e.get_and_compress_subcircuit(l10, 2, 4, true, false, &mut var_map)
            .unwrap();
        let mut new_nf = Vec::new();
        let order = e.compute_normalforms(None, &mut new_nf);
        assert!(!order.is_empty());
        // Top-down order: the first gate has the highest level.
        for w in order.windows(2) {
            let a = e.alg.pool.level(e.gates.g(w[0]).v);
            let b = e.alg.pool.level(e.gates.g(w[1]).v);
            assert!(a > b);
        }
        for g in &order {
            assert!(e.gates.g(*g).normal_form.is_some());
        }
    }
}
