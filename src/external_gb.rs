// SPDX-License-Identifier: Apache-2.0

//! Optional linearization through an external Groebner-basis tool.
//!
//! The sub-circuit's (unflipped) constraints plus the Boolean axioms
//! `x^2 - x` are written to a scratch file, `msolve` computes a
//! degree-reverse-lexicographic basis, and the line mentioning the target
//! gate is parsed back as its new constraint.  Incompatible with proof
//! logging; failures degrade to "not linearized".

use std::io::Write;
use std::process::Command;

use crate::engine::Engine;
use crate::gate::GateId;

impl Engine {
    /// Asks msolve for a linear representation of `g`; returns true when
    /// the tool produced one and the gate constraint was replaced.
    pub fn linearize_via_msolve(&mut self, g: GateId) -> bool {
        self.stats.msolve_calls += 1;

        let Ok(dir) = tempfile::tempdir() else {
            log::info!("msolve: cannot create scratch directory");
            return false;
        };
        let input_path = dir.path().join("system.ms");

        let mut src = String::new();
        let vars = self.var_sorted_for_msolve();
        let names: Vec<String> = vars
            .iter()
            .map(|&v| self.alg.pool.var(v).name().to_string())
            .collect();
        src.push_str(&names.join(","));
        src.push('\n');
        // msolve wants a word-sized prime field; the basis is lifted back
        // over the integers by the caller's sign fixing.
        src.push_str("1073741827\n");

        let mut interior: Vec<GateId> = self.sc.gate_poly.iter().copied().collect();
        self.gates.sort_by_level_inc(&self.alg.pool, &mut interior);
        for id in interior {
            let gc = {
                let Some(p) = self.gates.g(id).gate_constraint.as_ref() else {
                    continue;
                };
                self.alg.copy_poly(p)
            };
            let unflipped = self.unflip_poly(&gc);
            src.push_str(&crate::poly::poly_to_string(&self.alg.pool, &unflipped));
            src.push_str(",\n");
            self.alg.free_poly(gc);
            self.alg.free_poly(unflipped);
        }
        for (k, name) in names.iter().enumerate() {
            src.push_str(&format!("-{}^2+{}", name, name));
            if k + 1 < names.len() {
                src.push_str(",\n");
            }
        }
        src.push('\n');

        let write_res = std::fs::File::create(&input_path)
            .and_then(|mut f| f.write_all(src.as_bytes()));
        if write_res.is_err() {
            log::info!("msolve: cannot write scratch file");
            return false;
        }

        let output = Command::new("msolve")
            .arg("-f")
            .arg(&input_path)
            .arg("-g")
            .arg("2")
            .output();
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                log::info!("msolve not available: {}", e);
                return false;
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);

        let target_name = self.gate_name(g);
        let Some(line) = stdout
            .lines()
            .filter(|l| l.contains(&target_name))
            .nth(1)
            .or_else(|| stdout.lines().find(|l| l.contains(&target_name)))
        else {
            return false;
        };

        // Undo the field embedding: strip brackets and ^1 exponents, map
        // p-1 and p-2 back to the small negative representatives.
        let cleaned = line
            .replace("^1", "")
            .replace(['[', ']'], "")
            .replace("+1073741826", "-1")
            .replace("+1073741825", "-2");

        let target = match self.parse_spec_polynomial_str(&cleaned) {
            Ok(p) => p,
            Err(e) => {
                log::info!("msolve: cannot parse basis line: {}", e);
                return false;
            }
        };
        if target.degree() > 1 {
            self.alg.free_poly(target);
            return false;
        }

        self.gates.update_gate_poly(&mut self.alg, g, target);
        true
    }

    fn var_sorted_for_msolve(&self) -> Vec<crate::term::VarId> {
        let mut ids: Vec<GateId> = self.sc.var.iter().copied().collect();
        self.gates.sort_by_level_dec(&self.alg.pool, &mut ids);
        ids.into_iter().map(|g| self.gates.g(g).v).collect()
    }
}
