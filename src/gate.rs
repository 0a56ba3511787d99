// SPDX-License-Identifier: Apache-2.0

//! The gate graph: an arena of gates derived from the AIG, addressed by
//! [`GateId`] handles.
//!
//! Every gate owns a primary variable and its dual, its current
//! `gate_constraint` (mutated by rewriting), the immutable `aig_poly` kept
//! for Boolean sampling, an optional `normal_form`, and the edge sets of the
//! algebraic graph (`parents`/`children`, rewritten over time) next to the
//! immutable AIG edges (`aig_parents`/`aig_children`).

use num_bigint::BigInt;
use num_traits::One;

use crate::aiger::{self, Aig};
use crate::config::{Config, SpecMode};
use crate::poly::{Algebra, Monomial, Polynomial};
use crate::term::VarId;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GateId(pub u32);

#[derive(Debug)]
pub struct Gate {
    pub v: VarId,

    pub input: bool,
    pub output: bool,
    pub aig_output: bool,
    pub partial_product: bool,
    /// 1 for an XOR root, 2 for the internal nodes of an XOR.
    pub xor_gate: u8,
    pub xor_and: Option<GateId>,
    pub xor_and_inp: bool,
    /// Propagate/generate gate of a final-stage adder.
    pub prop_gen: bool,
    pub fsa: bool,
    pub fsa_inp: u32,
    pub neg: bool,
    pub elim: bool,
    pub extension: bool,

    /// Topological distance from the inputs.
    pub dist: i64,

    pub gate_constraint: Option<Polynomial>,
    pub dual_constraint: Option<Polynomial>,
    pub normal_form: Option<Polynomial>,
    /// The initial constraint from the AIG; never rewritten.
    pub aig_poly: Option<Polynomial>,

    /// Gates `h` with `g*h == 0` modulo the circuit ideal.
    pub van_twins: Vec<GateId>,
    /// Gates `h` with `g*(1-h) == 0`.
    pub dual_twins: Vec<GateId>,

    pub parents: Vec<GateId>,
    pub children: Vec<GateId>,
    pub aig_children: Vec<GateId>,
    /// Parent AIG literals; odd when the edge is negated.
    pub aig_parents: Vec<i64>,
    pub pos_parents: Vec<i64>,
    pub neg_parents: Vec<i64>,
}

impl Gate {
    fn new(v: VarId, input: bool, output: bool) -> Self {
        Gate {
            v,
            input,
            output,
            aig_output: false,
            partial_product: false,
            xor_gate: 0,
            xor_and: None,
            xor_and_inp: false,
            prop_gen: false,
            fsa: false,
            fsa_inp: 0,
            neg: false,
            elim: false,
            extension: false,
            dist: 0,
            gate_constraint: None,
            dual_constraint: None,
            normal_form: None,
            aig_poly: None,
            van_twins: Vec::new(),
            dual_twins: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            aig_children: Vec::new(),
            aig_parents: Vec::new(),
            pos_parents: Vec::new(),
            neg_parents: Vec::new(),
        }
    }

    pub fn is_child(&self, n: GateId) -> bool {
        self.children.contains(&n)
    }

    pub fn is_aig_child(&self, n: GateId) -> bool {
        self.aig_children.contains(&n)
    }

    pub fn is_in_parents(&self, n: GateId) -> bool {
        self.parents.contains(&n)
    }

    pub fn is_van_twin(&self, n: GateId) -> bool {
        self.van_twins.contains(&n)
    }

    pub fn is_dual_twin(&self, n: GateId) -> bool {
        self.dual_twins.contains(&n)
    }

    pub fn is_in_pos_parents(&self, n: i64) -> bool {
        self.pos_parents.contains(&n)
    }

    pub fn is_in_neg_parents(&self, n: i64) -> bool {
        self.neg_parents.contains(&n)
    }

    pub fn parents_remove(&mut self, n: GateId) {
        self.parents.retain(|&p| p != n);
    }

    pub fn children_remove(&mut self, n: GateId) {
        self.children.retain(|&c| c != n);
    }
}

#[derive(Debug)]
pub struct GateTable {
    pub gates: Vec<Gate>,
    by_num: std::collections::HashMap<i64, GateId>,
    /// Number of primary inputs (NN).
    pub num_inputs: usize,
    /// Inputs + ANDs + 1; the first output sits at table index `m - 1`.
    pub m: usize,
    /// Number of outputs (MM).
    pub num_outputs: usize,
    pub booth: bool,
    pub max_dist: i64,
    /// Number of extension gates appended so far.
    pub extended: usize,
}

impl GateTable {
    pub fn g(&self, id: GateId) -> &Gate {
        &self.gates[id.0 as usize]
    }

    pub fn g_mut(&mut self, id: GateId) -> &mut Gate {
        &mut self.gates[id.0 as usize]
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    /// Resolves an AIG literal (sign ignored) or a non-positive output /
    /// extension `num` to its gate.
    pub fn gate(&self, lit: i64) -> Option<GateId> {
        if lit >= 2 {
            self.by_num.get(&(lit & !1)).copied()
        } else if lit == 1 {
            None
        } else {
            self.by_num.get(&lit).copied()
        }
    }

    pub fn gate_of_var(&self, pool: &crate::term::TermPool, v: VarId) -> GateId {
        self.gate(pool.var(v).num).expect("variable without gate")
    }

    pub fn input_ids(&self) -> impl Iterator<Item = GateId> {
        (0..self.num_inputs as u32).map(GateId)
    }

    pub fn and_ids(&self) -> impl Iterator<Item = GateId> {
        (self.num_inputs as u32..(self.m - 1) as u32).map(GateId)
    }

    pub fn output_ids(&self) -> impl Iterator<Item = GateId> {
        ((self.m - 1) as u32..(self.m - 1 + self.num_outputs) as u32).map(GateId)
    }

    pub fn level(&self, pool: &crate::term::TermPool, id: GateId) -> i64 {
        pool.level(self.g(id).v)
    }

    pub fn name<'a>(&self, pool: &'a crate::term::TermPool, id: GateId) -> &'a str {
        let v = self.g(id).v;
        pool.var(v).name()
    }

    /// Sets the level of the primary variable and keeps the dual adjacent.
    pub fn set_var_level(&self, pool: &mut crate::term::TermPool, id: GateId, level: i64) {
        let v = self.g(id).v;
        let d = pool.dual(v);
        pool.var_mut(v).level = level;
        pool.var_mut(d).level = level + 1;
    }

    /// Detaches the gate from the algebraic graph and drops its constraint.
    pub fn set_elim(&mut self, alg: &mut Algebra, id: GateId) {
        if self.g(id).elim {
            return;
        }
        let children = self.g(id).children.clone();
        for c in children {
            self.g_mut(c).parents_remove(id);
        }
        let g = self.g_mut(id);
        g.elim = true;
        if let Some(p) = g.gate_constraint.take() {
            alg.free_poly(p);
        }
        log::debug!("eliminated gate {:?}", id);
    }

    /// Replaces the gate constraint, re-deriving the algebraic children from
    /// the variables of the new polynomial.
    pub fn update_gate_poly(&mut self, alg: &mut Algebra, id: GateId, p: Polynomial) {
        if let Some(old) = self.g_mut(id).gate_constraint.take() {
            alg.free_poly(old);
        }
        let orig_children = std::mem::take(&mut self.g_mut(id).children);
        for c in orig_children {
            self.g_mut(c).parents_remove(id);
        }
        let new_children = self.vars_of_poly(alg, &p, true);
        self.g_mut(id).gate_constraint = Some(p);
        self.g_mut(id).children = new_children.clone();
        for c in new_children {
            self.g_mut(c).parents.push(id);
        }
    }

    /// The distinct gates mentioned by the polynomial, in first-seen order;
    /// `tail` skips the leading monomial.
    pub fn vars_of_poly(&self, alg: &Algebra, p: &Polynomial, tail: bool) -> Vec<GateId> {
        let mut res = Vec::new();
        let start = usize::from(tail);
        for i in start..p.len() {
            let Some(t) = p.mon(i).term else {
                continue;
            };
            for v in alg.pool.iter_vars(t) {
                let g = self.gate_of_var(&alg.pool, v);
                if !res.contains(&g) {
                    res.push(g);
                }
            }
        }
        res
    }

    /// Searches the parents of the head gate of `t` for one whose constraint
    /// is exactly `lead - t`.
    pub fn search_for_parent(
        &self,
        alg: &Algebra,
        t: crate::term::TermId,
        exclude: Option<GateId>,
    ) -> Option<GateId> {
        let g = self.gate(alg.pool.head_num(t))?;
        for &parent in &self.g(g).parents {
            if Some(parent) == exclude {
                continue;
            }
            let Some(gc) = self.g(parent).gate_constraint.as_ref() else {
                continue;
            };
            if gc.len() != 2 {
                continue;
            }
            if gc.tail_term() == Some(t) {
                return Some(parent);
            }
        }
        None
    }

    pub fn search_for_parent_dual(
        &self,
        alg: &Algebra,
        t: crate::term::TermId,
    ) -> Option<GateId> {
        let g = self.gate(alg.pool.head_num(t))?;
        for &parent in &self.g(g).parents {
            let Some(gc) = self.g(parent).gate_constraint.as_ref() else {
                continue;
            };
            if gc.len() != 2 {
                continue;
            }
            if let Some(tt) = gc.tail_term() {
                if alg.pool.equal_up_to_duality(t, tt) {
                    return Some(parent);
                }
            }
        }
        None
    }

    pub fn equal_children(&self, g1: GateId, g2: GateId) -> bool {
        let a = self.g(g1);
        let b = self.g(g2);
        a.children.len() == b.children.len() && a.children.iter().all(|&c| b.is_child(c))
    }

    /// Sorts gate ids by increasing variable level.
    pub fn sort_by_level_inc(&self, pool: &crate::term::TermPool, ids: &mut [GateId]) {
        ids.sort_by_key(|&id| pool.level(self.g(id).v));
    }

    /// Sorts gate ids by decreasing variable level.
    pub fn sort_by_level_dec(&self, pool: &crate::term::TermPool, ids: &mut [GateId]) {
        ids.sort_by_key(|&id| std::cmp::Reverse(pool.level(self.g(id).v)));
    }
}

// ----- gate-constraint generation ----------------------------------------

fn positive_poly(alg: &mut Algebra, v: VarId) -> Polynomial {
    let t = alg.pool.make_term(v, None);
    alg.poly_from_mono(BigInt::one(), Some(t))
}

fn negative_poly(alg: &mut Algebra, v: VarId) -> Polynomial {
    let t = alg.pool.make_term(v, None);
    alg.push_end(Monomial {
        coeff: -BigInt::one(),
        term: Some(t),
    });
    alg.push_end(Monomial {
        coeff: BigInt::one(),
        term: None,
    });
    alg.build_poly()
}

fn node_constraint(
    alg: &mut Algebra,
    g: Option<VarId>,
    sign: bool,
    flipped: bool,
) -> Option<Polynomial> {
    match g {
        Some(v) => {
            if sign && flipped {
                let d = alg.pool.dual(v);
                Some(positive_poly(alg, d))
            } else if sign {
                Some(negative_poly(alg, v))
            } else {
                Some(positive_poly(alg, v))
            }
        }
        None => {
            if sign {
                Some(alg.poly_from_mono(BigInt::one(), None))
            } else {
                None
            }
        }
    }
}

/// The linear encoding of an XOR root: `-g - 2*smaller + sides`, where
/// `smaller` is the lower-level internal AND of the XOR.
pub fn gen_xor_constraint(
    table: &GateTable,
    alg: &mut Algebra,
    aig: &Aig,
    id: GateId,
) -> Polynomial {
    let num = alg.pool.var(table.g(id).v).num as u32;
    let and1 = aig.and(num).expect("xor root must be an AND");
    let l_gate = table.gate(and1.rhs0 as i64).unwrap();
    let r_gate = table.gate(and1.rhs1 as i64).unwrap();

    let smaller = if alg.pool.level(table.g(l_gate).v) < alg.pool.level(table.g(r_gate).v) {
        l_gate
    } else {
        r_gate
    };
    let sm_num = alg.pool.var(table.g(smaller).v).num as u32;
    let smand = aig.and(sm_num).expect("xor internal must be an AND");
    let ll_gate = table.gate(smand.rhs0 as i64);
    let rr_gate = table.gate(smand.rhs1 as i64);

    let tv = alg.pool.make_term(table.g(id).v, None);
    alg.push_end(Monomial {
        coeff: -BigInt::one(),
        term: Some(tv),
    });
    let tsm = alg.pool.make_term(table.g(smaller).v, None);
    alg.push_end(Monomial {
        coeff: BigInt::from(-2),
        term: Some(tsm),
    });
    let p_h = alg.build_poly();

    let v_ll = ll_gate.map(|g| table.g(g).v);
    let v_rr = rr_gate.map(|g| table.g(g).v);
    let p1 = node_constraint(alg, v_ll, aiger::sign(smand.rhs0), false);
    let p2 = node_constraint(alg, v_rr, aiger::sign(smand.rhs1), false);

    let p_tl = match (&p1, &p2) {
        (Some(a), Some(b)) => alg.add_poly(a, b),
        (Some(a), None) => alg.copy_poly(a),
        (None, Some(b)) => alg.copy_poly(b),
        (None, None) => Polynomial::zero(),
    };
    let p = alg.add_poly(&p_h, &p_tl);
    alg.free_poly(p_h);
    alg.free_poly(p_tl);
    if let Some(p1) = p1 {
        alg.free_poly(p1);
    }
    if let Some(p2) = p2 {
        alg.free_poly(p2);
    }
    p
}

/// Generates the initial constraint of an AND or output gate from the AIG.
pub fn gen_gate_constraint(
    table: &GateTable,
    alg: &mut Algebra,
    aig: &Aig,
    cfg: &Config,
    id: GateId,
) -> Polynomial {
    let gate = table.g(id);
    if !gate.output {
        assert!(!gate.input);
        if gate.xor_gate == 1 && cfg.do_local_lin {
            return gen_xor_constraint(table, alg, aig, id);
        }
        let num = alg.pool.var(gate.v).num as u32;
        let and1 = *aig.and(num).expect("AND record for gate");
        let l_gate = table.gate(and1.rhs0 as i64).unwrap();
        let r_gate = table.gate(and1.rhs1 as i64).unwrap();

        let v = gate.v;
        let v1 = if aiger::sign(and1.rhs0) {
            alg.pool.dual(table.g(l_gate).v)
        } else {
            table.g(l_gate).v
        };
        let v2 = if aiger::sign(and1.rhs1) {
            alg.pool.dual(table.g(r_gate).v)
        } else {
            table.g(r_gate).v
        };

        let tv = alg.pool.make_term(v, None);
        alg.push_end(Monomial {
            coeff: -BigInt::one(),
            term: Some(tv),
        });
        let t12 = alg.pool.quadratic_term(v1, v2);
        alg.push_end(Monomial {
            coeff: BigInt::one(),
            term: Some(t12),
        });
        alg.build_poly()
    } else {
        let out_idx = (-alg.pool.var(gate.v).num) as usize;
        let lit = aig.slit(out_idx);
        let tv = alg.pool.make_term(gate.v, None);
        alg.push_end(Monomial {
            coeff: -BigInt::one(),
            term: Some(tv),
        });
        if lit == 1 {
            alg.push_end(Monomial {
                coeff: BigInt::one(),
                term: None,
            });
        } else if lit == 0 {
            // Constant-false output: the constraint is just -s.
        } else if aiger::sign(lit) {
            let sg = table.gate(lit as i64).unwrap();
            let t = alg.pool.make_term(table.g(sg).v, None);
            alg.push_end(Monomial {
                coeff: -BigInt::one(),
                term: Some(t),
            });
            alg.push_end(Monomial {
                coeff: BigInt::one(),
                term: None,
            });
        } else {
            let sg = table.gate(lit as i64).unwrap();
            let t = alg.pool.make_term(table.g(sg).v, None);
            alg.push_end(Monomial {
                coeff: BigInt::one(),
                term: Some(t),
            });
        }
        alg.build_poly()
    }
}

// ----- construction -------------------------------------------------------

fn dual_name(name: &str, proof_logging: bool) -> String {
    if proof_logging {
        let mut s = name.to_string();
        s.insert(1, '_');
        s
    } else {
        format!("(1-{})", name)
    }
}

fn alloc_gate(
    alg: &mut Algebra,
    name: String,
    level: i64,
    num: i64,
    input: bool,
    output: bool,
    proof_logging: bool,
) -> Gate {
    let v = alg.pool.make_var(name.clone(), level, num, false);
    let d = alg
        .pool
        .make_var(dual_name(&name, proof_logging), level + 1, num, true);
    alg.pool.link_duals(v, d);
    Gate::new(v, input, output)
}

/// Builds the gate table from the AIG: allocates inputs, ANDs and outputs,
/// computes topological distances, levels gates in distance order, links
/// parents/children with negation tracking, generates the initial
/// constraints and discovers XOR structures.
pub fn init_gates(aig: &Aig, cfg: &Config, alg: &mut Algebra) -> GateTable {
    let nn = aig.num_inputs as usize;
    let mm = aig.num_outputs as usize;
    let m = aig.m();

    let mut table = GateTable {
        gates: Vec::with_capacity(m + mm),
        by_num: std::collections::HashMap::new(),
        num_inputs: nn,
        m,
        num_outputs: mm,
        booth: false,
        max_dist: 0,
        extended: 0,
    };

    log::info!("allocating {} gates", m + mm - 1);

    let mut level = 0i64;
    for i in 0..nn {
        let lit = 2 * (i as i64 + 1);
        let name = if cfg.spec_mode == SpecMode::Mult {
            if i < nn / 2 {
                format!("a{}", i)
            } else {
                format!("b{}", i - nn / 2)
            }
        } else {
            format!("i{}", i)
        };
        level += 2;
        let g = alloc_gate(alg, name, level, lit, true, false, cfg.proof_logging);
        table.by_num.insert(lit, GateId(table.gates.len() as u32));
        table.gates.push(g);
    }

    for and in &aig.ands {
        let lit = and.lhs as i64;
        let name = format!("l{}", lit);
        let g = alloc_gate(alg, name, 0, lit, false, false, cfg.proof_logging);
        table.by_num.insert(lit, GateId(table.gates.len() as u32));
        table.gates.push(g);
    }

    // Topological distance from the inputs; AND definitions are contiguous,
    // so a single forward pass sees children first.
    for (k, and) in aig.ands.iter().enumerate() {
        let id = GateId((nn + k) as u32);
        let dist = if and.rhs0 < 2 || and.rhs1 < 2 {
            1
        } else {
            let dl = table.g(table.gate(and.rhs0 as i64).unwrap()).dist;
            let dr = table.g(table.gate(and.rhs1 as i64).unwrap()).dist;
            dl.max(dr) + 1
        };
        table.g_mut(id).dist = dist;
        table.max_dist = table.max_dist.max(dist);
    }
    log::info!("max dist is {}", table.max_dist);

    // Mark AIG outputs.
    for k in 0..mm {
        let lit = aig.slit(k);
        if lit < 2 {
            continue;
        }
        if let Some(g) = table.gate(lit as i64) {
            table.g_mut(g).aig_output = true;
        }
    }

    // Re-level ANDs in distance order so ancestors sit below descendants.
    for dist in 1..=table.max_dist {
        for k in 0..aig.ands.len() {
            let id = GateId((nn + k) as u32);
            if table.g(id).dist == dist {
                level += 2;
                table.set_var_level(&mut alg.pool, id, level);
            }
        }
    }

    // Output gates on top, with non-positive nums 0, -1, -2, ...
    for k in 0..mm {
        let num = -(k as i64);
        let name = format!("s{}", k);
        let out_level = 2 * (m as i64 + k as i64);
        let g = alloc_gate(alg, name, out_level, num, false, true, cfg.proof_logging);
        table.by_num.insert(num, GateId(table.gates.len() as u32));
        table.gates.push(g);
    }

    set_parents_and_children(&mut table, aig);

    // Initial constraints (XOR flags are discovered afterwards, so these are
    // always the plain AND encodings).
    for id in table
        .and_ids()
        .chain(table.output_ids())
        .collect::<Vec<_>>()
    {
        let p = gen_gate_constraint(&table, alg, aig, cfg, id);
        let copy = alg.copy_poly(&p);
        let g = table.g_mut(id);
        g.gate_constraint = Some(p);
        g.aig_poly = Some(copy);
    }

    set_xor(&mut table, aig);
    mark_xor_and(&mut table);

    table
}

fn set_parents_and_children(table: &mut GateTable, aig: &Aig) {
    let nn = table.num_inputs;
    let mut pp = 0usize;

    for k in (0..aig.ands.len()).rev() {
        let and = aig.ands[k];
        let id = GateId((nn + k) as u32);
        let num = and.lhs as i64;
        let l_gate = table.gate(and.rhs0 as i64).unwrap();
        let r_gate = table.gate(and.rhs1 as i64).unwrap();

        table.g_mut(id).children.push(l_gate);
        table.g_mut(id).children.push(r_gate);
        table.g_mut(id).aig_children.push(l_gate);
        table.g_mut(id).aig_children.push(r_gate);

        if table.g(l_gate).input
            && table.g(r_gate).input
            && !aiger::sign(and.rhs0)
            && !aiger::sign(and.rhs1)
        {
            table.g_mut(id).partial_product = true;
            pp += 1;
        }

        let n_pos = table.g(id).pos_parents.clone();
        let n_has_neg = !table.g(id).neg_parents.is_empty();
        for (rhs, child) in [(and.rhs0, l_gate), (and.rhs1, r_gate)] {
            table.g_mut(child).parents.push(id);
            if aiger::sign(rhs) {
                table.g_mut(child).aig_parents.push(num + 1);
                table.g_mut(child).neg_parents.push(num + 1);
            } else {
                table.g_mut(child).aig_parents.push(num);
                if n_has_neg {
                    table.g_mut(child).pos_parents.push(num);
                }
                for &p in &n_pos {
                    table.g_mut(child).pos_parents.push(p);
                }
            }
        }
    }

    for k in 0..table.num_outputs {
        let out = GateId((table.m - 1 + k) as u32);
        let lit = aig.slit(k);
        if lit < 2 {
            continue;
        }
        let child = table.gate(lit as i64).unwrap();
        table.g_mut(out).children.push(child);
        table.g_mut(child).parents.push(out);
    }

    log::info!("found {} partial products", pp);
    if pp != (nn / 2) * (nn / 2) {
        table.booth = true;
    }
}

fn set_xor(table: &mut GateTable, aig: &Aig) {
    let mut found = 0usize;
    for k in 0..aig.ands.len() {
        let and = aig.ands[k];
        let id = GateId((table.num_inputs + k) as u32);
        if table.g(id).xor_gate > 0 {
            continue;
        }
        let (l, r) = (and.rhs0, and.rhs1);
        if !aiger::sign(l) || !aiger::sign(r) {
            continue;
        }
        if l == r || l == aiger::not(r) {
            continue;
        }
        let Some(land) = aig.and(l) else { continue };
        let Some(rand) = aig.and(r) else { continue };
        let (ll, lr) = (land.rhs0, land.rhs1);
        let (rl, rr) = (rand.rhs0, rand.rhs1);
        if (ll == aiger::not(rl) && lr == aiger::not(rr))
            || (ll == aiger::not(rr) && lr == aiger::not(rl))
        {
            let lg = table.gate(l as i64).unwrap();
            let rg = table.gate(r as i64).unwrap();
            table.g_mut(lg).xor_gate = 2;
            table.g_mut(rg).xor_gate = 2;
            table.g_mut(id).xor_gate = 1;
            found += 1;
        }
    }
    log::info!("found {} xor-gates", found);
}

fn mark_xor_and(table: &mut GateTable) {
    for i in 0..table.m - 1 {
        let id = GateId(i as u32);
        if table.g(id).xor_gate != 1 || table.g(id).children.len() != 2 {
            continue;
        }
        let first_child = table.g(id).children[0];
        if table.g(first_child).children.len() != 2 {
            continue;
        }
        let llg = table.g(first_child).children[0];
        let lrg = table.g(first_child).children[1];

        let mut ands = Vec::new();
        for &llg_p in &table.g(llg).parents {
            if table.g(id).is_child(llg_p) {
                continue;
            }
            if !table.g(llg_p).is_child(lrg) {
                continue;
            }
            ands.push(llg_p);
        }
        if ands.len() == 1 {
            let and1 = ands[0];
            table.g_mut(and1).xor_and = Some(id);
            table.g_mut(id).xor_and = Some(and1);
            table.g_mut(llg).xor_and_inp = true;
            table.g_mut(lrg).xor_and_inp = true;
        }
    }
}

// ----- extension gates ----------------------------------------------------

/// Creates a fresh gate `e` with constraint `-e + t`, linking it into the
/// graph below the existing gates; returns the gate and its leading term.
pub fn extend_var_gates(
    table: &mut GateTable,
    alg: &mut Algebra,
    t: crate::term::TermId,
    proof_logging: bool,
) -> (GateId, crate::term::TermId) {
    let k = table.extended;
    let num = -((table.num_outputs + k) as i64);
    let name = format!("t{}", k);
    let level = -2 - 2 * k as i64;
    let g = alloc_gate(alg, name, level, num, false, false, proof_logging);
    let id = GateId(table.gates.len() as u32);
    table.by_num.insert(num, id);
    table.gates.push(g);
    table.g_mut(id).extension = true;
    table.extended += 1;

    let te = alg.pool.make_term(table.g(id).v, None);
    alg.pool.retain(t);
    // Leading slot first; the level adjustment later restores term order.
    alg.push_end(Monomial {
        coeff: -BigInt::one(),
        term: Some(te),
    });
    alg.push_end(Monomial {
        coeff: BigInt::one(),
        term: Some(t),
    });
    let p = alg.build_poly();
    let lt = p.lt().unwrap();

    let children = {
        let mut res = Vec::new();
        for v in alg.pool.iter_vars(t) {
            let c = table.gate_of_var(&alg.pool, v);
            if !res.contains(&c) {
                res.push(c);
            }
        }
        res
    };
    table.g_mut(id).gate_constraint = Some(p);
    table.g_mut(id).children = children.clone();
    for c in children {
        table.g_mut(c).parents.push(id);
    }

    log::debug!("added extension var t{}", k);
    (id, lt)
}

/// Shifts extension gates above the inputs: extensions move up by
/// `2*NN + 2`, inputs move down by `2*extended + 2`.
pub fn adjust_level_of_extended_gates(table: &GateTable, alg: &mut Algebra) {
    let nn = table.num_inputs as i64;
    let ext = table.extended as i64;
    let first_ext = table.m - 1 + table.num_outputs;
    for i in first_ext..table.num_gates() {
        let id = GateId(i as u32);
        let old = alg.pool.level(table.g(id).v);
        table.set_var_level(&mut alg.pool, id, old + 2 * nn + 2);
    }
    for i in 0..table.num_inputs {
        let id = GateId(i as u32);
        let old = alg.pool.level(table.g(id).v);
        table.set_var_level(&mut alg.pool, id, old - 2 * ext - 2);
    }
}

/// The AIG-based left child of an XOR root.
pub fn xor_left_child(table: &GateTable, alg: &Algebra, aig: &Aig, n: GateId) -> Option<GateId> {
    if table.g(n).xor_gate == 0 {
        return None;
    }
    let num = alg.pool.var(table.g(n).v).num as u32;
    let and1 = aig.and(num)?;
    let l = and1.rhs0;
    if !aiger::sign(l) {
        return None;
    }
    let land = aig.and(aiger::strip(l))?;
    table.gate(land.rhs0 as i64)
}

/// The AIG-based right child of an XOR root.
pub fn xor_right_child(table: &GateTable, alg: &Algebra, aig: &Aig, n: GateId) -> Option<GateId> {
    if table.g(n).xor_gate == 0 {
        return None;
    }
    let num = alg.pool.var(table.g(n).v).num as u32;
    let and1 = aig.and(num)?;
    let l = and1.rhs0;
    if !aiger::sign(l) {
        return None;
    }
    let land = aig.and(aiger::strip(l))?;
    table.gate(land.rhs1 as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiger::parse_aiger;
    use crate::poly::poly_to_string;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn build() -> (GateTable, Algebra, Aig) {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut alg = Algebra::new(aig.num_inputs);
        let cfg = Config::default();
        let table = init_gates(&aig, &cfg, &mut alg);
        (table, alg, aig)
    }

    #[test]
    fn test_structure() {
        let (table, alg, _aig) = build();
        assert_eq!(table.num_gates(), 7);
        assert_eq!(table.num_inputs, 2);
        assert_eq!(table.num_outputs, 2);

        // l10 is the XOR root over i0, i1.
        let l10 = table.gate(10).unwrap();
        assert_eq!(table.g(l10).xor_gate, 1);
        let l6 = table.gate(6).unwrap();
        assert_eq!(table.g(l6).partial_product, true);
        // The partial product l6 shares both fan-ins with the XOR root.
        assert_eq!(table.g(l10).xor_and, Some(l6));

        // Levels increase from inputs to outputs.
        let i0 = table.gate(2).unwrap();
        let s0 = table.gate(0).unwrap();
        assert!(alg.pool.level(table.g(i0).v) < alg.pool.level(table.g(l6).v));
        assert!(alg.pool.level(table.g(l10).v) < alg.pool.level(table.g(s0).v));
    }

    #[test]
    fn test_gate_constraints() {
        let (table, alg, _aig) = build();
        let l6 = table.gate(6).unwrap();
        let gc = table.g(l6).gate_constraint.as_ref().unwrap();
        assert_eq!(poly_to_string(&alg.pool, gc), "-l6+i1*i0");

        // l8 = !i0 & !i1 uses the dual variables.
        let l8 = table.gate(8).unwrap();
        let gc8 = table.g(l8).gate_constraint.as_ref().unwrap();
        assert_eq!(poly_to_string(&alg.pool, gc8), "-l8+(1-i1)*(1-i0)");

        // Output s1 = literal 6 (positive signal).
        let s1 = table.gate(-1).unwrap();
        let gc_s1 = table.g(s1).gate_constraint.as_ref().unwrap();
        assert_eq!(poly_to_string(&alg.pool, gc_s1), "-s1+l6");
    }

    #[test]
    fn test_dual_constraint_consistency() {
        // Every gate constraint vanishes on every assignment satisfying the
        // AIG semantics.
        let (table, mut alg, _aig) = build();
        for i0 in 0..2i64 {
            for i1 in 0..2i64 {
                let l6 = i0 & i1;
                let l8 = (1 - i0) & (1 - i1);
                let l10 = (1 - l6) & (1 - l8);
                // Table order: i0, i1, l6, l8, l10, s0, s1.
                let values = [i0, i1, l6, l8, l10, l10, l6];
                for (k, val) in values.iter().enumerate() {
                    let id = GateId(k as u32);
                    let v = table.g(id).v;
                    let d = alg.pool.dual(v);
                    alg.pool.var_mut(v).value = *val as i8;
                    alg.pool.var_mut(d).value = (1 - *val) as i8;
                }
                for id in table.and_ids().chain(table.output_ids()) {
                    let gc = table.g(id).gate_constraint.as_ref().unwrap();
                    let lead = alg.pool.evaluate(gc.lt().unwrap());
                    let tail = gc.evaluate_tail(&alg.pool);
                    // -g + tail == 0
                    assert_eq!(lead, tail, "constraint violated at gate {:?}", id);
                }
            }
        }
    }

    #[test]
    fn test_extension_gate() {
        let (mut table, mut alg, _aig) = build();
        let i0 = table.gate(2).unwrap();
        let i1 = table.gate(4).unwrap();
        let t = alg
            .pool
            .quadratic_term(table.g(i1).v, table.g(i0).v);
        let (e, _lt) = extend_var_gates(&mut table, &mut alg, t, false);
        assert!(table.g(e).extension);
        assert_eq!(table.g(e).children.len(), 2);
        assert!(table.g(i0).is_in_parents(e));

        adjust_level_of_extended_gates(&table, &mut alg);
        // Inputs now sit below the extension gate, internal gates above.
        let l6 = table.gate(6).unwrap();
        assert!(alg.pool.level(table.g(i0).v) < alg.pool.level(table.g(e).v));
        assert!(alg.pool.level(table.g(e).v) < alg.pool.level(table.g(l6).v));
    }
}
