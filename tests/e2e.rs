// SPDX-License-Identifier: Apache-2.0

//! End-to-end verification scenarios over small literal fixtures.

use talisman::aiger::parse_aiger;
use talisman::config::Config;
use talisman::engine::Engine;

/// Tiny combinational netlist builder emitting ASCII AIGER.  AND gates are
/// allocated contiguously above the inputs, as the strict parser expects.
struct AagBuilder {
    num_inputs: u32,
    maxvar: u32,
    ands: Vec<(u32, u32, u32)>,
    outputs: Vec<u32>,
}

impl AagBuilder {
    fn new(num_inputs: u32) -> Self {
        AagBuilder {
            num_inputs,
            maxvar: num_inputs,
            ands: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn input(&self, i: u32) -> u32 {
        assert!(i < self.num_inputs);
        2 * (i + 1)
    }

    fn and(&mut self, a: u32, b: u32) -> u32 {
        self.maxvar += 1;
        let lhs = 2 * self.maxvar;
        self.ands.push((lhs, a, b));
        lhs
    }

    fn xor(&mut self, a: u32, b: u32) -> u32 {
        let n1 = self.and(a, b);
        let n2 = self.and(a ^ 1, b ^ 1);
        self.and(n1 ^ 1, n2 ^ 1)
    }

    fn or(&mut self, a: u32, b: u32) -> u32 {
        self.and(a ^ 1, b ^ 1) ^ 1
    }

    fn output(&mut self, lit: u32) {
        self.outputs.push(lit);
    }

    fn build(&self) -> String {
        let mut s = format!(
            "aag {} {} 0 {} {}\n",
            self.maxvar,
            self.num_inputs,
            self.outputs.len(),
            self.ands.len()
        );
        for i in 0..self.num_inputs {
            s.push_str(&format!("{}\n", 2 * (i + 1)));
        }
        for o in &self.outputs {
            s.push_str(&format!("{}\n", o));
        }
        for (lhs, rhs0, rhs1) in &self.ands {
            s.push_str(&format!("{} {} {}\n", lhs, rhs0, rhs1));
        }
        s
    }
}

/// An n x n unsigned array multiplier built from partial products and
/// half-adder accumulation chains.
fn multiplier(n: u32, swap_one_fanin: bool) -> String {
    let mut b = AagBuilder::new(2 * n);
    let a_in: Vec<u32> = (0..n).map(|i| b.input(i)).collect();
    let b_in: Vec<u32> = (0..n).map(|j| b.input(n + j)).collect();

    let mut acc: Vec<Option<u32>> = vec![None; 2 * n as usize];

    fn add_bit(b: &mut AagBuilder, acc: &mut Vec<Option<u32>>, w: usize, lit: u32) {
        match acc[w] {
            None => acc[w] = Some(lit),
            Some(prev) => {
                let s = b.xor(prev, lit);
                let c = b.and(prev, lit);
                acc[w] = Some(s);
                add_bit(b, acc, w + 1, c);
            }
        }
    }

    for i in 0..n as usize {
        for j in 0..n as usize {
            let ai = if swap_one_fanin && i == 0 && j == 1 {
                // Wrong operand for the weight-1 partial product.
                a_in[1]
            } else {
                a_in[i]
            };
            let pp = b.and(ai, b_in[j]);
            add_bit(&mut b, &mut acc, i + j, pp);
        }
    }

    for w in 0..2 * n as usize {
        b.output(acc[w].unwrap_or(0));
    }
    b.build()
}

fn engine_for(src: &str, cfg: Config) -> Engine {
    let aig = parse_aiger(src).expect("fixture parses");
    Engine::new(aig, cfg)
}

fn default_cfg() -> Config {
    let mut cfg = Config::default();
    cfg.seed = 42;
    cfg
}

const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";
const BROKEN_HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n6\n6\n6 2 4\n8 3 5\n10 7 9\n";

#[test]
fn test_half_adder_miter_is_correct() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut e = engine_for(HALF_ADDER, default_cfg());
    let spec = e.parse_spec_polynomial_str("s0+2*s1-i0-i1;").unwrap();
    let verdict = e.verify(spec).unwrap();
    assert!(verdict.correct);
    assert!(verdict.remainder.is_none());
}

#[test]
fn test_half_adder_proof_files_emitted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let polys = dir.path().join("polys.txt");
    let steps = dir.path().join("steps.txt");
    let spec_f = dir.path().join("spec.txt");

    let mut cfg = default_cfg();
    cfg.proof_logging = true;
    let mut e = engine_for(HALF_ADDER, cfg);
    e.init_proof(
        polys.to_str().unwrap(),
        steps.to_str().unwrap(),
        spec_f.to_str().unwrap(),
    )
    .unwrap();
    let spec = e.parse_spec_polynomial_str("s0+2*s1-i0-i1;").unwrap();
    let verdict = e.verify(spec).unwrap();
    assert!(verdict.correct);
    drop(e);

    let polys_txt = std::fs::read_to_string(&polys).unwrap();
    let steps_txt = std::fs::read_to_string(&steps).unwrap();
    let spec_txt = std::fs::read_to_string(&spec_f).unwrap();
    // Axioms start with the modulus (2^2 = 4 for two inputs).
    assert!(polys_txt.starts_with("1 4;"));
    assert!(polys_txt.lines().count() > 5);
    assert!(!steps_txt.is_empty());
    assert_eq!(spec_txt, "1;");
}

#[test]
fn test_broken_half_adder_is_refuted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut e = engine_for(BROKEN_HALF_ADDER, default_cfg());
    let spec = e.parse_spec_polynomial_str("s0+2*s1-i0-i1;").unwrap();
    let verdict = e.verify(spec).unwrap();
    assert!(!verdict.correct);
    let rem = verdict.remainder.expect("non-zero remainder");
    // The printed remainder contains only input variables.
    assert!(e.check_inputs_only(&rem));
    assert!(!rem.is_constant_zero());
}

#[test]
fn test_2x2_multiplier_is_correct() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = multiplier(2, false);
    let mut cfg = default_cfg();
    cfg.spec_mode = talisman::config::SpecMode::Mult;
    let mut e = engine_for(&src, cfg);
    let spec = e.mult_spec_poly();
    let verdict = e.verify(spec).unwrap();
    assert!(verdict.correct);
}

#[test]
fn test_4x4_multiplier_is_correct() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = multiplier(4, false);
    let mut cfg = default_cfg();
    cfg.spec_mode = talisman::config::SpecMode::Mult;
    let mut e = engine_for(&src, cfg);
    let spec = e.mult_spec_poly();
    let verdict = e.verify(spec).unwrap();
    assert!(verdict.correct);
}

#[test]
fn test_broken_2x2_multiplier_is_refuted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = multiplier(2, true);
    let mut cfg = default_cfg();
    cfg.spec_mode = talisman::config::SpecMode::Mult;
    let mut e = engine_for(&src, cfg);
    let spec = e.mult_spec_poly();
    let verdict = e.verify(spec).unwrap();
    assert!(!verdict.correct);
    let rem = verdict.remainder.expect("non-zero remainder");
    // The refutation is phrased over the primary inputs alone.
    assert!(e.check_inputs_only(&rem));
}

#[test]
fn test_xor_miter_needs_no_sat_call() {
    let _ = env_logger::builder().is_test(true).try_init();
    // Three-input XOR expressed twice with different association, mitered.
    let mut b = AagBuilder::new(3);
    let (i0, i1, i2) = (b.input(0), b.input(1), b.input(2));
    let t01 = b.xor(i0, i1);
    let lhs = b.xor(t01, i2);
    let t12 = b.xor(i1, i2);
    let rhs = b.xor(i0, t12);
    let miter = b.xor(lhs, rhs);
    b.output(miter);
    let src = b.build();

    let mut cfg = default_cfg();
    cfg.spec_mode = talisman::config::SpecMode::Miter;
    let mut e = engine_for(&src, cfg);
    let spec = e.miter_spec_poly().unwrap();
    let verdict = e.verify(spec).unwrap();
    assert!(verdict.correct);
    // The XOR-root structure linearizes without the SAT oracle.
    assert_eq!(e.stats.sat_calls, 0);
}
