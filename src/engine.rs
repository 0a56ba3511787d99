// SPDX-License-Identifier: Apache-2.0

//! The engine context: every piece of process-wide state of the verifier
//! collected into one struct that is passed by reference through all entry
//! points.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::aiger::Aig;
use crate::config::Config;
use crate::error::EngineError;
use crate::gate::{self, GateId, GateTable};
use crate::pac::Proof;
use crate::poly::{Algebra, Polynomial};
use crate::stats::Stats;
use crate::subcircuit::NormalizedPoly;
use crate::term::TermId;

/// A compressed linear polynomial: (coefficient, local variable id) pairs,
/// id 0 standing for the constant.
pub type CompressedPoly = Vec<(num_bigint::BigInt, usize)>;

/// The working sets of the current sub-circuit carve.
#[derive(Debug, Default)]
pub struct Carve {
    /// All gates whose variables occur in the sub-circuit.
    pub var: HashSet<GateId>,
    /// The frontier ("inputs" of the sub-circuit).
    pub inputs: HashSet<GateId>,
    /// The interior gates contributing their constraints.
    pub gate_poly: HashSet<GateId>,
    /// Fan-out of the last gate that stopped an expansion.
    pub fanout_last: usize,
}

impl Carve {
    pub fn clear(&mut self) {
        self.var.clear();
        self.inputs.clear();
        self.gate_poly.clear();
    }
}

#[derive(Debug)]
pub struct Engine {
    pub cfg: Config,
    pub alg: Algebra,
    pub gates: GateTable,
    pub aig: Aig,
    pub proof: Option<Proof>,
    pub stats: Stats,

    /// Vanishing products `u*w` keyed by their quadratic term, as proof
    /// axioms for `remove_vanishing_monomials`.
    pub van_poly: HashMap<TermId, Polynomial>,
    /// Implication products `-g*h + g` keyed by their quadratic term.
    pub dual_van_poly: HashMap<TermId, Polynomial>,

    /// Counter-examples collected from SAT, replayed as sampling rows.
    pub collected: VecDeque<HashMap<GateId, bool>>,

    /// Linearization results keyed by the canonicalized sub-circuit.
    pub cache: HashMap<Vec<NormalizedPoly>, Vec<CompressedPoly>>,
    /// Vanishing axiom indices consumed per cached sub-circuit.
    pub used_van_mon: HashMap<u64, Vec<u64>>,

    pub rng: StdRng,
    pub sc: Carve,

    /// Runtime switch flipped on by the CLA probe.
    pub do_vanishing_constraints: bool,

    /// The extended spec `x*spec - 1` maintained under proof logging.
    pub x_spec: Option<Polynomial>,
    /// The mediating variable `x` as a term.
    pub term_x: Option<TermId>,
}

impl Engine {
    pub fn new(aig: Aig, cfg: Config) -> Self {
        let mut alg = Algebra::new(aig.num_inputs);
        let gates = gate::init_gates(&aig, &cfg, &mut alg);
        let seed = if cfg.seed != 0 {
            cfg.seed
        } else {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(1)
        };
        let do_vanishing_constraints = cfg.do_vanishing_constraints;
        Engine {
            cfg,
            alg,
            gates,
            aig,
            proof: None,
            stats: Stats::default(),
            van_poly: HashMap::new(),
            dual_van_poly: HashMap::new(),
            collected: VecDeque::new(),
            cache: HashMap::new(),
            used_van_mon: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            sc: Carve::default(),
            do_vanishing_constraints,
            x_spec: None,
            term_x: None,
        }
    }

    pub fn proof_logging(&self) -> bool {
        self.proof.is_some()
    }

    // ----- gate polynomial access ----------------------------------------

    /// Ensures the gate constraint is present, re-deriving it from the AIG
    /// when it was dropped by elimination.
    pub fn ensure_gate_constraint(&mut self, id: GateId) -> Result<(), EngineError> {
        if self.gates.g(id).gate_constraint.is_some() {
            return Ok(());
        }
        if self.gates.g(id).extension {
            return Err(EngineError::Invariant(format!(
                "extension gate {} lost its constraint",
                self.gates.name(&self.alg.pool, id)
            )));
        }
        let p = gate::gen_gate_constraint(&self.gates, &mut self.alg, &self.aig, &self.cfg, id);
        self.gates.g_mut(id).gate_constraint = Some(p);
        Ok(())
    }

    pub fn copy_gate_constraint(&mut self, id: GateId) -> Result<Polynomial, EngineError> {
        self.ensure_gate_constraint(id)?;
        let p = self.gates.g(id).gate_constraint.as_ref().unwrap();
        Ok(self.alg.copy_poly(p))
    }

    /// The dual constraint `-v_dual - v + 1` of the gate, generated on first
    /// use (always phrased over the dual variable).
    pub fn ensure_dual_constraint(&mut self, id: GateId) {
        if self.gates.g(id).dual_constraint.is_some() {
            return;
        }
        let v = self.gates.g(id).v;
        let d = self.alg.pool.dual(v);
        let p = self.alg.gen_dual_constraint(d);
        self.gates.g_mut(id).dual_constraint = Some(p);
    }

    pub fn copy_dual_constraint(&mut self, id: GateId) -> Polynomial {
        self.ensure_dual_constraint(id);
        let p = self.gates.g(id).dual_constraint.as_ref().unwrap();
        self.alg.copy_poly(p)
    }

    /// The gate owning the leading term of `p`.
    pub fn gate_of_lt(&self, p: &Polynomial) -> GateId {
        let lt = p.lt().expect("polynomial with leading term");
        self.gates
            .gate(self.alg.pool.head_num(lt))
            .expect("leading term resolves to a gate")
    }

    pub fn gate_name(&self, id: GateId) -> String {
        self.gates.name(&self.alg.pool, id).to_string()
    }

    /// True when every variable of the remainder belongs to a primary input.
    pub fn check_inputs_only(&self, p: &Polynomial) -> bool {
        for m in p.mons() {
            let Some(t) = m.term else { continue };
            for v in self.alg.pool.iter_vars(t) {
                let g = self.gates.gate_of_var(&self.alg.pool, v);
                if !self.gates.g(g).input {
                    return false;
                }
            }
        }
        true
    }

    // ----- proof setup ----------------------------------------------------

    /// Opens the three proof streams, prints the circuit and dual-constraint
    /// axioms and creates the mediating variable `x`.
    pub fn init_proof(
        &mut self,
        polys_path: &str,
        steps_path: &str,
        spec_path: &str,
    ) -> Result<(), EngineError> {
        let mut proof = Proof::open(polys_path, steps_path, spec_path)?;
        proof.begin_axioms(&self.alg.mod_coeff);

        // Circuit polynomials, indexed 2.. -- the axiom index is mirrored
        // onto both the immutable aig_poly and the current gate constraint.
        let ids: Vec<GateId> = self
            .gates
            .and_ids()
            .chain(self.gates.output_ids())
            .collect();
        for id in ids {
            let mut p =
                gate::gen_gate_constraint(&self.gates, &mut self.alg, &self.aig, &self.cfg, id);
            proof.axiom(&self.alg.pool, &mut p);
            let idx = p.idx();
            let g = self.gates.g_mut(id);
            if let Some(aig_poly) = g.aig_poly.as_mut() {
                aig_poly.set_idx(idx);
            }
            if let Some(gc) = g.gate_constraint.as_mut() {
                gc.set_idx(idx);
            }
            self.alg.free_poly(p);
        }

        // Dual constraints for all inputs and ANDs.
        for i in 0..self.gates.m - 1 {
            let id = GateId(i as u32);
            self.ensure_dual_constraint(id);
            let mut p = self.gates.g_mut(id).dual_constraint.take().unwrap();
            proof.axiom(&self.alg.pool, &mut p);
            self.gates.g_mut(id).dual_constraint = Some(p);
        }

        // The mediating variable x, below every circuit variable.
        let level = -(self.gates.num_gates() as i64);
        let vx = self
            .alg
            .pool
            .make_var("x".to_string(), level, i64::MIN, false);
        let dx = self
            .alg
            .pool
            .make_var("x_".to_string(), level + 1, i64::MIN, true);
        self.alg.pool.link_duals(vx, dx);
        self.term_x = Some(self.alg.pool.make_term(vx, None));

        proof.print_refutation_spec();
        self.proof = Some(proof);
        Ok(())
    }

    /// Builds `x*spec - 1`, prints it as an axiom and installs it as the
    /// running extended spec.
    pub fn init_x_spec(&mut self, spec: &Polynomial) {
        let term_x = self.term_x.expect("proof logging initialized");
        let rem_x = self.alg.mul_term(spec, Some(term_x));
        let min_one = self.alg.poly_from_mono(-num_bigint::BigInt::from(1), None);
        let mut x_spec = self.alg.add_poly(&rem_x, &min_one);
        self.alg.free_poly(rem_x);
        self.alg.free_poly(min_one);
        if let Some(proof) = self.proof.as_mut() {
            proof.add_circuit_poly(&self.alg.pool, &mut x_spec);
        }
        self.x_spec = Some(x_spec);
    }
}
