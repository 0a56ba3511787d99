// SPDX-License-Identifier: Apache-2.0

//! Identification of the final-stage adder (FSA) of a multiplier: the
//! terminal carry-propagation network that combines partial products into
//! outputs.  Gates of the region are marked `fsa`, its boundary gates count
//! as `fsa_inp`; the guess-and-prove linearizer treats the region as one
//! atomic sub-circuit.
//!
//! The walk mirrors the usual adder shapes: output slices ending in XOR
//! roots with shared carry-in chains, a carry-save fallback, and Booth
//! variants where a single generate gate feeds several slices.

use crate::aiger;
use crate::engine::Engine;
use crate::gate::{xor_left_child, xor_right_child, GateId};

#[derive(Debug, Default)]
struct FsaScan {
    carry_out: Option<GateId>,
    carry_in: Option<GateId>,
    outputs: Vec<GateId>,
    inputs: Vec<GateId>,
    c_ins: Vec<GateId>,
    no_cin: bool,
    single_gen_gate: bool,
}

impl Engine {
    pub fn unmark_fsa(&mut self) {
        for g in self.gates.gates.iter_mut() {
            g.fsa = false;
        }
    }

    fn out_gate(&self, i: usize) -> Option<GateId> {
        if i >= self.gates.num_outputs {
            return None;
        }
        let lit = self.aig.slit(i);
        if lit < 2 {
            return None;
        }
        self.gates.gate(lit as i64)
    }

    fn all_single_output(&self) -> bool {
        for i in 0..self.gates.num_inputs.saturating_sub(1) {
            match self.out_gate(i) {
                Some(n) => {
                    if self.gates.g(n).parents.len() > 1 {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    fn all_outputs_are_xor(&self) -> bool {
        let nn = self.gates.num_inputs;
        if nn < 2 || self.out_gate(nn - 1).is_none() {
            return false;
        }
        for i in 1..nn - 1 {
            match self.out_gate(i) {
                Some(n) => {
                    if self.gates.g(n).xor_gate == 0 {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    fn slice_two_needs_carry_in_slice_zero(&self) -> bool {
        if self.gates.num_inputs < 3 {
            return false;
        }
        let (Some(out2), Some(out0)) = (self.out_gate(2), self.out_gate(0)) else {
            return false;
        };
        !(self.gates.g(out2).parents.len() > 3 && self.gates.g(out0).parents.len() == 1)
    }

    fn cin_in_slice_0(&self) -> bool {
        match self.out_gate(0) {
            Some(n) => self.gates.g(n).parents.len() > 1,
            None => false,
        }
    }

    fn push_to_inputs(&mut self, scan: &mut FsaScan, n: GateId) {
        scan.inputs.push(n);
        self.gates.g_mut(n).fsa_inp += 1;
        self.gates.g_mut(n).fsa = true;
    }

    fn push_to_outputs(&mut self, scan: &mut FsaScan, n: GateId, i: i64) {
        scan.outputs.push(n);
        log::debug!("found output {} {}", i, self.gate_name(n));
    }

    fn push_to_cins(&mut self, scan: &mut FsaScan, n: GateId, i: i64) {
        scan.c_ins.push(n);
        scan.carry_in = Some(n);
        self.gates.g_mut(n).fsa = true;
        log::debug!("found cin of slice {} {}", i, self.gate_name(n));
    }

    fn set_carry_in(&mut self, scan: &mut FsaScan, n: GateId) {
        scan.carry_in = Some(n);
        self.gates.g_mut(n).fsa = true;
        log::debug!("identified carry in {}", self.gate_name(n));
    }

    fn identify_carry_out(&mut self, scan: &mut FsaScan) -> bool {
        let nn = self.gates.num_inputs;
        let Some(largest) = self.out_gate(nn - 1) else {
            return false;
        };
        if self.gates.g(largest).xor_gate != 1 {
            scan.carry_out = Some(largest);
            self.push_to_outputs(scan, largest, nn as i64 - 1);
        } else {
            let l = xor_left_child(&self.gates, &self.alg, &self.aig, largest);
            let r = xor_right_child(&self.gates, &self.alg, &self.aig, largest);
            let (Some(l), Some(r)) = (l, r) else {
                return false;
            };
            let co = if self.alg.pool.level(self.gates.g(r).v)
                > self.alg.pool.level(self.gates.g(l).v)
            {
                r
            } else {
                l
            };
            scan.carry_out = Some(co);
            self.push_to_outputs(scan, co, -1);
        }
        true
    }

    fn identify_propagate_and_generate_gates(&mut self, scan: &mut FsaScan) -> bool {
        let nn = self.gates.num_inputs as i64;
        for i in (1..nn - 1).rev() {
            let Some(n) = self.out_gate(i as usize) else {
                return false;
            };

            if i == 2 && self.gates.g(n).parents.len() > 3 {
                let Some(out0) = self.out_gate(0) else {
                    return false;
                };
                if self.gates.g(out0).parents.len() <= 1 {
                    return false;
                }
                let Some(out1) = self.out_gate(1) else {
                    return false;
                };
                self.push_to_outputs(scan, n, 2);
                self.push_to_outputs(scan, out1, 1);
                self.push_to_outputs(scan, out0, 0);
                self.push_to_inputs(scan, n);
                self.push_to_inputs(scan, out1);
                self.set_carry_in(scan, out0);
                return true;
            }

            let mut l: Option<GateId> = None;
            let mut r: Option<GateId> = None;
            let internal_xor = if i == 1 && self.gates.g(n).parents.len() > 1 {
                n
            } else {
                l = xor_left_child(&self.gates, &self.alg, &self.aig, n);
                r = xor_right_child(&self.gates, &self.alg, &self.aig, n);
                let (Some(lg), Some(rg)) = (l, r) else {
                    return false;
                };
                if self.gates.g(lg).xor_gate > 0 {
                    lg
                } else {
                    rg
                }
            };

            let cmp = nn - 1;
            let ix_parents = self.gates.g(internal_xor).parents.len();
            if ix_parents < 3 {
                break;
            }
            if ix_parents == 3 && i < 3 * cmp / 4 && !self.cin_in_slice_0() {
                if self.all_single_output() {
                    break;
                } else if !self.gates.booth {
                    break;
                }
            }

            self.gates.g_mut(internal_xor).prop_gen = true;
            log::debug!("found propagate gate {}", self.gate_name(internal_xor));

            let mut g_0: Option<GateId> = None;
            let mut g_1: Option<GateId> = None;

            let lx = xor_left_child(&self.gates, &self.alg, &self.aig, internal_xor);
            let rx = xor_right_child(&self.gates, &self.alg, &self.aig, internal_xor);
            let gen_candidate = self.gates.g(internal_xor).xor_gate == 1
                && lx.map_or(false, |g| self.gates.g(g).parents.len() != 2)
                && rx.map_or(false, |g| self.gates.g(g).parents.len() != 2)
                && (i != 1 || self.gates.g(n).parents.len() == 1 || self.gates.booth);

            if gen_candidate {
                let Some(internal_and) = self.gates.g(internal_xor).xor_and else {
                    return false;
                };
                self.gates.g_mut(internal_and).prop_gen = true;
                log::debug!("found generate gate {}", self.gate_name(internal_and));

                let num = self.alg.pool.var(self.gates.g(internal_and).v).num as u32;
                let Some(par) = self.aig.and(num).copied() else {
                    return false;
                };
                let (Some(a0), Some(a1)) = (
                    self.gates.gate(par.rhs0 as i64),
                    self.gates.gate(par.rhs1 as i64),
                ) else {
                    return false;
                };
                self.gates.g_mut(a0).neg = aiger::sign(par.rhs0);
                self.gates.g_mut(a1).neg = aiger::sign(par.rhs1);
                self.push_to_inputs(scan, a0);
                self.push_to_inputs(scan, a1);
                g_0 = Some(a0);
                g_1 = Some(a1);
            } else if self.gates.booth {
                self.push_to_inputs(scan, internal_xor);
                log::debug!("pushed xor {}", self.gate_name(internal_xor));
                scan.single_gen_gate = true;
            }

            self.push_to_outputs(scan, n, i);
            if i != 1 || self.gates.g(n).parents.len() == 1 {
                let (Some(lg), Some(rg)) = (l, r) else {
                    return false;
                };
                if self.gates.g(lg).xor_gate > 0 {
                    self.push_to_cins(scan, rg, i);
                } else {
                    self.push_to_cins(scan, lg, i);
                }
            } else {
                let Some(c) = self.out_gate(0) else {
                    return false;
                };
                if self.gates.g(c).parents.len() > 1 {
                    self.push_to_cins(scan, c, i);
                    self.push_to_outputs(scan, c, 0);
                } else if self.gates.booth {
                    let g0_xor = g_0.map_or(false, |g| self.gates.g(g).xor_gate > 0);
                    let g1_xor = g_1.map_or(false, |g| self.gates.g(g).xor_gate > 0);
                    if g0_xor || g1_xor {
                        let not_xor_cin = if g0_xor { g_1 } else { g_0 };
                        if let Some(cin) = not_xor_cin {
                            self.push_to_cins(scan, cin, i);
                            scan.no_cin = true;
                        }
                    }
                }
            }
        }
        true
    }

    fn fix_inputs(&mut self, scan: &mut FsaScan) {
        if !self.cin_in_slice_0() {
            return;
        }
        let mut inputs_cpy = Vec::new();
        for &n in &scan.inputs {
            if !self.gates.g(n).prop_gen {
                inputs_cpy.push(n);
            } else {
                let num = self.alg.pool.var(self.gates.g(n).v).num as u32;
                let Some(and1) = self.aig.and(num).copied() else {
                    continue;
                };
                if aiger::sign(and1.rhs0) != aiger::sign(and1.rhs1) {
                    if aiger::sign(and1.rhs0) {
                        if let Some(g) = self.gates.gate(and1.rhs0 as i64) {
                            inputs_cpy.push(g);
                        }
                    }
                    if aiger::sign(and1.rhs1) {
                        if let Some(g) = self.gates.gate(and1.rhs1 as i64) {
                            inputs_cpy.push(g);
                        }
                    }
                }
            }
        }
        scan.inputs = inputs_cpy;
    }

    fn follow_path_and_mark_gates(&mut self, scan: &FsaScan, n: GateId, init: bool) -> bool {
        if self.gates.g(n).input && self.gates.g(n).fsa_inp == 0 {
            return false;
        }
        self.gates.g_mut(n).fsa = true;

        if Some(n) == scan.carry_in {
            return true;
        }
        if self.gates.g(n).fsa_inp > 0 {
            return true;
        }

        let num = self.alg.pool.var(self.gates.g(n).v).num as u32;
        let Some(and1) = self.aig.and(num).copied() else {
            return false;
        };
        let (Some(l), Some(r)) = (
            self.gates.gate(and1.rhs0 as i64),
            self.gates.gate(and1.rhs1 as i64),
        ) else {
            return false;
        };

        if !self.gates.g(r).prop_gen
            && scan.carry_in == Some(r)
            && init
            && !self.gates.g(r).neg
        {
            self.gates.g_mut(r).neg = aiger::sign(and1.rhs1);
        }
        if !self.follow_path_and_mark_gates(scan, r, init) {
            return false;
        }

        if !self.gates.g(l).prop_gen
            && scan.carry_in == Some(l)
            && init
            && !self.gates.g(l).neg
        {
            self.gates.g_mut(l).neg = aiger::sign(and1.rhs0);
        }
        if !self.follow_path_and_mark_gates(scan, l, init) {
            return false;
        }

        true
    }

    fn follow_all_output_paths_and_mark_gates(&mut self, scan: &FsaScan) -> bool {
        log::info!("checking last stage adder");
        for (k, &n) in scan.outputs.clone().iter().enumerate() {
            log::debug!("follow path starting with {}", self.gate_name(n));
            if !self.follow_path_and_mark_gates(scan, n, k == 0) {
                return false;
            }
        }
        true
    }

    fn correctly_mark_inputs(&mut self, scan: &FsaScan) {
        for &n in &scan.inputs {
            if self.gates.g(n).prop_gen {
                continue;
            }
            if !self.gates.g(n).aig_output {
                self.gates.g_mut(n).fsa_inp = 0;
            }
        }

        for i in (1..self.gates.m).rev() {
            let n = GateId((i - 1) as u32);
            if !self.gates.g(n).prop_gen {
                continue;
            }
            if scan.single_gen_gate && self.gates.g(n).fsa_inp > 0 {
                continue;
            }
            self.gates.g_mut(n).fsa_inp = 0;

            let num = self.alg.pool.var(self.gates.g(n).v).num as u32;
            let Some(and1) = self.aig.and(num).copied() else {
                continue;
            };
            if self.gates.g(n).xor_gate == 0 {
                if let Some(l) = self.gates.gate(aiger::strip(and1.rhs0) as i64) {
                    self.gates.g_mut(l).fsa_inp += 1;
                }
                if let Some(r) = self.gates.gate(aiger::strip(and1.rhs1) as i64) {
                    self.gates.g_mut(r).fsa_inp += 1;
                }
            }
        }

        if let Some(cin) = scan.carry_in {
            self.gates.g_mut(cin).fsa_inp += 1;
        }

        if scan.single_gen_gate {
            for &n in &scan.inputs {
                if self.gates.g(n).fsa_inp == 0 {
                    self.gates.g_mut(n).fsa_inp += 1;
                }
            }
        }
    }

    fn follow_all_output_paths_cs(&mut self, n: GateId, fin: bool) -> bool {
        if self.gates.g(n).input {
            return false;
        }
        if self.gates.g(n).fsa {
            return true;
        }
        self.gates.g_mut(n).fsa = true;

        if self.gates.g(n).xor_and_inp {
            return true;
        }
        if fin && self.gates.g(n).xor_gate == 1 {
            return true;
        }

        let num = self.alg.pool.var(self.gates.g(n).v).num as u32;
        let Some(and1) = self.aig.and(num).copied() else {
            return false;
        };
        let (Some(l), Some(r)) = (
            self.gates.gate(and1.rhs0 as i64),
            self.gates.gate(and1.rhs1 as i64),
        ) else {
            return false;
        };
        if !self.follow_all_output_paths_cs(r, fin) {
            return false;
        }
        if !self.follow_all_output_paths_cs(l, fin) {
            return false;
        }
        true
    }

    fn try_carry_save(&mut self) -> bool {
        let nn = self.gates.num_inputs;
        if nn < 2 || self.out_gate(nn - 1).is_none() {
            return false;
        }

        let mut flag = false;
        for i in (1..nn - 1).rev() {
            let Some(n) = self.out_gate(i) else {
                return false;
            };
            if !self.follow_all_output_paths_cs(n, false) {
                return false;
            }
            if i > 1 {
                let below_xor = self
                    .out_gate(i - 1)
                    .map_or(false, |g| self.gates.g(g).xor_gate == 1);
                if self.gates.g(n).xor_gate == 1 && below_xor {
                    if flag {
                        break;
                    }
                    flag = true;
                }
            }
        }

        let mut n = self.out_gate(nn - 1).unwrap();
        if self.gates.g(n).xor_gate == 1 {
            let n1 = xor_left_child(&self.gates, &self.alg, &self.aig, n);
            let n2 = xor_right_child(&self.gates, &self.alg, &self.aig, n);
            let (Some(n1), Some(n2)) = (n1, n2) else {
                return false;
            };
            let x1 = self.gates.g(n1).xor_gate == 1;
            let x2 = self.gates.g(n2).xor_gate == 1;
            if x1 != x2 {
                return false;
            }
            n = if x1 { n2 } else { n1 };
        }
        self.follow_all_output_paths_cs(n, true)
    }

    /// Identifies the final-stage adder and marks its region; returns false
    /// (with all marks cleared) when the circuit has no recognizable FSA.
    pub fn identify_final_stage_adder(&mut self) -> bool {
        let mut scan = FsaScan::default();

        if !self.all_outputs_are_xor() {
            if self.try_carry_save() {
                return true;
            }
            log::info!("substitution not possible - not all outputs are XOR");
            self.unmark_fsa();
            return false;
        }
        if !self.slice_two_needs_carry_in_slice_zero() {
            log::info!("substitution not possible - carry in slice 0 not found");
            self.unmark_fsa();
            return false;
        }

        if !self.identify_carry_out(&mut scan) {
            self.unmark_fsa();
            return false;
        }

        if !self.identify_propagate_and_generate_gates(&mut scan) {
            log::info!("substitution not possible - propagate and generate gates not found");
            self.unmark_fsa();
            return false;
        }
        self.fix_inputs(&mut scan);

        if !self.follow_all_output_paths_and_mark_gates(&scan) {
            log::info!("substitution not possible - no clear boundaries");
            self.unmark_fsa();
            return false;
        }

        self.correctly_mark_inputs(&scan);
        true
    }
}
