// SPDX-License-Identifier: Apache-2.0

//! FGLM-style linearization: build a term×monomial matrix over Q from the
//! sub-circuit's normal forms, extract its kernel, and reconstruct
//! denominator-free kernel rows as linear polynomials in the circuit ideal.
//!
//! Results are cached under the canonicalized sub-circuit; a cache hit
//! decompresses the stored linear polynomials with the current variable map
//! and replays the proof as a `pattern_apply` block.

use std::cmp::Ordering;
use std::time::Instant;

use num_traits::{One, Signed, Zero};

use crate::engine::{CompressedPoly, Engine};
use crate::gate::GateId;
use crate::matrix::QMat;
use crate::poly::{cmp_poly, Polynomial};
use crate::subcircuit::{circuit_hash, VarMap};
use crate::term::TermId;

/// A linear polynomial produced by a linearization attempt: either already
/// installed as some gate's constraint, or kept alive for pattern printing.
enum PolyOut {
    Installed(GateId),
    Kept(Polynomial),
}

impl Engine {
    /// Flattens a linear polynomial to (coefficient, local id) pairs;
    /// `None` when the polynomial mentions a variable outside the map (such
    /// a polynomial must not enter the cache).
    pub fn compress_linear(&self, g: &Polynomial, var_map: &VarMap) -> Option<CompressedPoly> {
        debug_assert!(g.degree() <= 1);
        let mut p = Vec::with_capacity(g.len());
        for m in g.mons() {
            let id = match m.term {
                None => 0,
                Some(t) => var_map.get(self.alg.pool.head(t))?,
            };
            p.push((m.coeff.clone(), id));
        }
        Some(p)
    }

    /// The matrix construction and kernel extraction.  Returns the
    /// compressed linear polynomials plus, under proof logging, the normal
    /// form indices combined per kernel row.
    fn run_fglm(
        &mut self,
        normal_forms: &[GateId],
        var_map: &VarMap,
    ) -> (Vec<CompressedPoly>, Vec<Vec<u64>>) {
        self.stats.fglm_calls += 1;
        log::debug!("========= running fglm =========");

        // Rows: all distinct tail terms.  Cols: every leading term plus the
        // linear (and constant) tails.
        let mut term_seen: std::collections::HashSet<Option<TermId>> =
            std::collections::HashSet::new();
        let mut rows: Vec<Option<TermId>> = Vec::new();
        let mut cols: Vec<(Option<TermId>, Option<usize>)> = Vec::new();

        for (i, &g) in normal_forms.iter().enumerate() {
            let nf = self.gates.g(g).normal_form.as_ref().unwrap();
            cols.push((nf.lt(), Some(i)));
            term_seen.insert(nf.lt());
            for m in &nf.mons()[1..] {
                if term_seen.insert(m.term) {
                    rows.push(m.term);
                }
            }
        }

        let mut term_to_id: std::collections::HashMap<Option<TermId>, usize> =
            std::collections::HashMap::new();
        for (i, &t) in rows.iter().enumerate() {
            term_to_id.insert(t, i);
            if t.map_or(true, |t| self.alg.pool.degree(t) == 1) {
                cols.push((t, None));
            }
        }

        cols.sort_by(|a, b| match self.alg.pool.cmp_term(b.0, a.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            ord => ord,
        });

        let n_rows = rows.len();
        let n_cols = cols.len();
        let mut mat = QMat::zero(n_rows, n_cols);

        for (j, (t, id)) in cols.iter().enumerate() {
            match id {
                None => {
                    mat.set_int(term_to_id[t], j, 1);
                }
                Some(id) => {
                    let nf = self.gates.g(normal_forms[*id]).normal_form.as_ref().unwrap();
                    debug_assert!(nf.lm().coeff.abs().is_one());
                    let sign_pos = nf.lm().coeff.is_positive();
                    for m in &nf.mons()[1..] {
                        let i = term_to_id[&m.term];
                        let c = if sign_pos {
                            -m.coeff.clone()
                        } else {
                            m.coeff.clone()
                        };
                        mat.set(i, j, num_rational::BigRational::from_integer(c));
                    }
                }
            }
        }

        let kernel = mat.kernel();

        let mut compressed_res = Vec::new();
        let mut indices = Vec::new();
        if (0..kernel.nrows()).all(|i| kernel.row_is_zero(i)) {
            return (compressed_res, indices);
        }

        for i in 0..kernel.nrows() {
            if !kernel.is_denom_free(i) {
                continue;
            }
            let mut p: CompressedPoly = Vec::new();
            let mut indices_p: Vec<u64> = Vec::new();
            for j in 0..kernel.ncols() {
                let entry = kernel.get(i, j);
                if entry.is_zero() {
                    continue;
                }
                let c = entry.numer().clone();
                let id = match cols[j].0 {
                    None => 0,
                    Some(t) => var_map
                        .get(self.alg.pool.head(t))
                        .expect("column variable is mapped"),
                };
                p.push((c.clone(), id));

                // Record coeff * nf for the vector-add justification.
                if self.proof.is_some() {
                    if let Some(nf_id) = cols[j].1 {
                        let g = normal_forms[nf_id];
                        let neg_c = -c;
                        if !neg_c.is_one() {
                            let nf_copy = {
                                let nf = self.gates.g(g).normal_form.as_ref().unwrap();
                                self.alg.copy_poly(nf)
                            };
                            let mut pp = self.alg.mul_const(&nf_copy, &neg_c);
                            let proof = self.proof.as_mut().unwrap();
                            proof.mul_const_rule(&self.alg.pool, nf_copy.idx(), &neg_c, &mut pp);
                            indices_p.push(pp.idx());
                            self.alg.free_poly(nf_copy);
                            self.alg.free_poly(pp);
                        } else {
                            let idx = self.gates.g(g).normal_form.as_ref().unwrap().idx();
                            indices_p.push(idx);
                        }
                    }
                }
            }
            compressed_res.push(p);
            indices.push(indices_p);
        }

        (compressed_res, indices)
    }

    /// Decompresses linear polynomials with the current variable map.
    fn construct_linear_polynomials(
        &mut self,
        compressed: &[CompressedPoly],
        var_map: &VarMap,
    ) -> Vec<Polynomial> {
        let mut id_to_term: Vec<Option<TermId>> = vec![None; var_map.len() + 1];
        for (v, id) in var_map.iter() {
            id_to_term[id] = Some(self.alg.pool.make_term(v, None));
        }

        let mut res = Vec::with_capacity(compressed.len());
        for f in compressed {
            for (c, id) in f {
                let term = self.alg.pool.retain_opt(id_to_term[*id]);
                self.alg.push(crate::poly::Monomial {
                    coeff: c.clone(),
                    term,
                });
            }
            res.push(self.alg.build_poly());
        }

        for t in id_to_term.into_iter().flatten() {
            self.alg.pool.release(t);
        }
        res
    }

    /// Installs the found linear polynomials: when one of them leads with
    /// the target gate, every polynomial whose gate constraint is non-linear
    /// (or larger in term order) is adopted as the new constraint.
    fn update_gates(
        &mut self,
        g: GateId,
        lin: Vec<Polynomial>,
        indices: Option<&[Vec<u64>]>,
    ) -> (bool, Vec<PolyOut>) {
        log::debug!("found {} linear polynomials", lin.len());

        let mut lin = lin;
        if let Some(indices) = indices {
            for (i, p) in lin.iter_mut().enumerate() {
                if self.proof.is_some() && !indices[i].is_empty() {
                    let proof = self.proof.as_mut().unwrap();
                    proof.vector_add_rule(&self.alg.pool, &indices[i], p);
                }
            }
        }

        let flag = lin
            .iter()
            .any(|p| p.lt().is_some() && self.gate_of_lt(p) == g);

        let mut outs = Vec::new();
        if flag {
            for p in lin {
                if p.lt().is_none() {
                    self.alg.free_poly(p);
                    continue;
                }
                let p_g = self.gate_of_lt(&p);
                let install = !self.gates.g(p_g).input
                    && match self.gates.g(p_g).gate_constraint.as_ref() {
                        Some(gc) => {
                            gc.degree() > 1
                                || cmp_poly(&self.alg.pool, gc, &p) == Ordering::Greater
                        }
                        None => true,
                    };
                if install {
                    self.gates.update_gate_poly(&mut self.alg, p_g, p);
                    log::trace!("updated gate poly of {}", self.gate_name(p_g));
                    outs.push(PolyOut::Installed(p_g));
                } else if self.proof.is_some() {
                    outs.push(PolyOut::Kept(p));
                } else {
                    self.alg.free_poly(p);
                }
            }
        } else if self.proof.is_some() {
            for p in lin {
                outs.push(PolyOut::Kept(p));
            }
        } else {
            for p in lin {
                self.alg.free_poly(p);
            }
        }
        log::debug!("========= finished fglm =========");
        (flag, outs)
    }

    /// One linearization attempt on the current (possibly enlarged)
    /// sub-circuit.  Returns 1 on success, 0 when no linear polynomial for
    /// the target was found, -1 when the carve cannot make progress.
    fn internal_linearize(
        &mut self,
        g: GateId,
        depth: usize,
        fanout_size: usize,
        init: bool,
        single_expand: bool,
    ) -> i32 {
        self.stats.total_circuit_lin_count += 1;
        let call_start = Instant::now();

        let mut var_map = VarMap::default();
        let Some(circuit) =
            self.get_and_compress_subcircuit(g, depth, fanout_size, init, single_expand, &mut var_map)
        else {
            self.stats.linearization_time += call_start.elapsed();
            return -1;
        };

        let hash = circuit_hash(&circuit);
        let caching = self.cfg.do_caching;

        let indices_input_new_pattern: Vec<u64> = self
            .sorted_gate_poly_nf_indices();

        // ----- guessing paths --------------------------------------------
        if !self.cache.contains_key(&circuit) && !self.cfg.msolve() {
            if self.is_internal_fsa(g) && !self.cfg.force_fglm() {
                let gap_start = Instant::now();
                let lin = self.guess_linear();
                if lin.is_empty() {
                    self.unmark_fsa();
                    self.sc.clear();
                }
                self.stats.gap_time += gap_start.elapsed();
                let (res, outs) = self.update_gates(g, lin, None);
                self.free_outs(outs);
                self.stats.linearization_time += call_start.elapsed();
                return res as i32;
            }
            if self.cfg.force_guessing() {
                let gap_start = Instant::now();
                let lin = self.guess_linear();
                self.stats.gap_time += gap_start.elapsed();
                let compressed: Vec<CompressedPoly> = lin
                    .iter()
                    .filter_map(|p| self.compress_linear(p, &var_map))
                    .collect();
                if caching && !circuit.is_empty() && compressed.len() == lin.len() {
                    self.cache.insert(circuit, compressed);
                }
                let (res, outs) = self.update_gates(g, lin, None);
                self.free_outs(outs);
                self.stats.linearization_time += call_start.elapsed();
                return res as i32;
            }
        }

        // ----- external Groebner tool ------------------------------------
        if self.cfg.msolve() && !self.cache.contains_key(&circuit) {
            let res = self.linearize_via_msolve(g);
            if res {
                let gc = {
                    let p = self.gates.g(g).gate_constraint.as_ref().unwrap();
                    self.alg.copy_poly(p)
                };
                let compr = self.compress_linear(&gc, &var_map);
                self.alg.free_poly(gc);
                if let Some(compr) = compr {
                    if !circuit.is_empty() {
                        self.cache.insert(circuit, vec![compr]);
                    }
                }
            }
            self.stats.linearization_time += call_start.elapsed();
            return res as i32;
        }

        // ----- fglm with caching -----------------------------------------
        let mut normal_forms: Vec<GateId> = Vec::new();
        let mut new_nf: Vec<GateId> = Vec::new();
        let mut used_van: Vec<u64> = Vec::new();
        let mut lin_indices: Option<Vec<Vec<u64>>> = None;

        let found_cache = self.cache.contains_key(&circuit);
        let compressed: Vec<CompressedPoly>;
        if found_cache {
            compressed = self.cache.get(&circuit).unwrap().clone();
            log::debug!("found a cached circuit at dist {}", self.gates.g(g).dist);
            self.stats.circuit_cached_count += 1;
        } else {
            let fglm_start = Instant::now();
            if self.proof.is_some() && caching {
                self.begin_pattern_new(hash, &var_map);
            }

            let nf_start = Instant::now();
            normal_forms = self.compute_normalforms(Some(&mut used_van), &mut new_nf);
            self.stats.nf_time += nf_start.elapsed();

            if self.proof.is_some() && caching {
                self.used_van_mon.insert(hash, used_van.clone());
            }

            assert!(!normal_forms.is_empty());

            if self
                .gates
                .g(g)
                .gate_constraint
                .as_ref()
                .map_or(false, |gc| gc.degree() == 1)
            {
                log::info!("found desired linear poly during computing normal forms");
                if self.proof.is_some() && caching {
                    // Close the opened pattern block and drop local names.
                    self.proof.as_mut().unwrap().pattern_end();
                    for (v, _) in var_map.iter() {
                        self.alg.pool.var_mut(v).pattern_id = 0;
                    }
                }
                self.stats.fglm_time += fglm_start.elapsed();
                self.cleanup_normal_forms(&normal_forms);
                self.stats.linearization_time += call_start.elapsed();
                return 1;
            }

            let matrix_start = Instant::now();
            let (compr, idx) = self.run_fglm(&normal_forms, &var_map);
            self.stats.matrix_time += matrix_start.elapsed();
            lin_indices = Some(idx);
            if caching {
                self.cache.insert(circuit.clone(), compr.clone());
            }
            compressed = compr;
            self.stats.fglm_time += fglm_start.elapsed();
        }

        let lin = self.construct_linear_polynomials(&compressed, &var_map);
        let (flag, mut outs) = self.update_gates(g, lin, lin_indices.as_deref());
        let res = res_from_flag(flag);

        if self.proof.is_some() && caching {
            if !found_cache {
                // Close the pattern_new block with its outputs.
                let mut i = 0;
                for out in &outs {
                    let idx = match out {
                        PolyOut::Kept(p) => p.idx(),
                        PolyOut::Installed(gid) => self
                            .gates
                            .g(*gid)
                            .gate_constraint
                            .as_ref()
                            .map_or(0, |gc| gc.idx()),
                    };
                    let proof = self.proof.as_mut().unwrap();
                    proof.pattern_out_ref(i, idx);
                    i += 1;
                }
                for &gid in &new_nf {
                    let idx = self.gates.g(gid).normal_form.as_ref().unwrap().idx();
                    let proof = self.proof.as_mut().unwrap();
                    proof.pattern_out_ref(i, idx);
                    i += 1;
                }
                self.proof.as_mut().unwrap().pattern_end();
            }

            // Drop the local names again.
            for (v, _) in var_map.iter() {
                self.alg.pool.var_mut(v).pattern_id = 0;
            }

            self.emit_pattern_apply(hash, &var_map, &indices_input_new_pattern, &mut outs, &new_nf);
        }

        self.free_outs(outs);

        if res == 1 {
            self.cleanup_normal_forms(&normal_forms);
        }
        self.stats.linearization_time += call_start.elapsed();
        res
    }

    fn sorted_gate_poly_nf_indices(&self) -> Vec<u64> {
        let mut ids: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut ids);
        ids.iter()
            .filter_map(|&id| self.gates.g(id).normal_form.as_ref().map(|nf| nf.idx()))
            .collect()
    }

    fn begin_pattern_new(&mut self, hash: u64, var_map: &VarMap) {
        for (v, id) in var_map.iter() {
            self.alg.pool.var_mut(v).pattern_id = id;
        }
        let mut ids: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut ids);
        let proof = self.proof.as_mut().unwrap();
        proof.pattern_new_begin(hash);
        for (i, id) in ids.iter().enumerate() {
            if let Some(nf) = self.gates.g(*id).normal_form.as_ref() {
                proof.pattern_in_poly(&self.alg.pool, i, nf.idx(), nf);
            }
        }
    }

    fn emit_pattern_apply(
        &mut self,
        hash: u64,
        var_map: &VarMap,
        input_indices: &[u64],
        outs: &mut [PolyOut],
        new_nf: &[GateId],
    ) {
        let used_van: Vec<u64> = self.used_van_mon.get(&hash).cloned().unwrap_or_default();

        {
            let proof = self.proof.as_mut().unwrap();
            proof.pattern_apply_begin(hash);
        }
        for (v, id) in var_map.iter() {
            let name = self.alg.pool.var(v).name().to_string();
            let proof = self.proof.as_mut().unwrap();
            proof.pattern_var(id, &name);
        }
        let mut i = 0;
        for &idx in input_indices {
            let proof = self.proof.as_mut().unwrap();
            proof.pattern_in(i, idx);
            i += 1;
        }
        for idx in used_van {
            let proof = self.proof.as_mut().unwrap();
            proof.pattern_in(i, idx);
            i += 1;
        }

        let mut j = 0;
        for out in outs.iter_mut() {
            match out {
                PolyOut::Kept(p) => {
                    let proof = self.proof.as_mut().unwrap();
                    j = proof.pattern_out_rules(&self.alg.pool, std::slice::from_mut(p), j);
                }
                PolyOut::Installed(gid) => {
                    // Re-index the installed constraint in place so later
                    // steps reference the pattern output.
                    let Some(mut gc) = self.gates.g_mut(*gid).gate_constraint.take() else {
                        continue;
                    };
                    let proof = self.proof.as_mut().unwrap();
                    j = proof.pattern_out_rules(&self.alg.pool, std::slice::from_mut(&mut gc), j);
                    self.gates.g_mut(*gid).gate_constraint = Some(gc);
                }
            }
        }
        for &gid in new_nf {
            let mut nf = self.gates.g_mut(gid).normal_form.take().unwrap();
            let proof = self.proof.as_mut().unwrap();
            j = proof.pattern_out_rules(&self.alg.pool, std::slice::from_mut(&mut nf), j);
            self.gates.g_mut(gid).normal_form = Some(nf);
        }
        let proof = self.proof.as_mut().unwrap();
        proof.pattern_end();
    }

    fn free_outs(&mut self, outs: Vec<PolyOut>) {
        for out in outs {
            if let PolyOut::Kept(p) = out {
                self.alg.free_poly(p);
            }
        }
    }

    fn cleanup_normal_forms(&mut self, normal_forms: &[GateId]) {
        for &g in normal_forms {
            if let Some(nf) = self.gates.g_mut(g).normal_form.take() {
                self.alg.free_poly(nf);
            }
        }
    }

    /// The outer linearization loop: starts from the configured depth and
    /// fan-out, enlarging the sub-circuit (one frontier gate at a time,
    /// every 15th attempt by fan-out or depth instead) until the target gate
    /// obtains a linear constraint or the distance budget is exhausted.
    pub fn linearize_via_fglm_or_gap(&mut self, g: GateId) -> bool {
        self.stats.unique_gb_calls += 1;
        let max_depth = self.gates.g(g).dist;
        let mut depth = self.cfg.sc_depth;
        let fanout_size = self.cfg.sc_fanout;
        self.sc.fanout_last = 0;

        let mut count = 1u64;
        let mut res = self.internal_linearize(g, depth, fanout_size, true, false);
        count += 1;

        while res == 0 && (depth as i64) < max_depth {
            self.stats.circuit_enlarged_count += 1;
            if count % 15 == 0 {
                let widened = self.sc.fanout_last + 1;
                res = self.internal_linearize(g, depth, widened, true, false);
                count += 1;
                if res == 0 {
                    depth += 1;
                    res = self.internal_linearize(g, depth, fanout_size, true, false);
                    count += 1;
                }
            }

            if res == 0 {
                res = self.internal_linearize(g, depth, fanout_size, false, true);
                count += 1;
            }

            if res == -1 && max_depth <= 6 {
                self.stats.max_depth_count = self.stats.max_depth_count.max(count - 2);
                return false;
            }
        }
        self.stats.max_depth_count = self.stats.max_depth_count.max(count - 2);

        res != 0
    }
}

fn res_from_flag(flag: bool) -> i32 {
    i32::from(flag)
}
