// SPDX-License-Identifier: Apache-2.0

//! Loads an ASCII AIGER ("aag") file into the [`Aig`] model.
//!
//! Only purely combinational files (L == 0) are supported.  The parser is
//! intentionally strict -- we fail fast on any structural inconsistency so the
//! verifier can rely on strong invariants: inputs occupy the literals
//! `2..=2*I` in order, AND definitions are contiguous above the inputs, and
//! every AND fan-in refers to an already-defined, non-constant literal.

use std::collections::HashMap;

pub fn sign(lit: u32) -> bool {
    lit & 1 != 0
}

pub fn strip(lit: u32) -> u32 {
    lit & !1
}

pub fn not(lit: u32) -> u32 {
    lit ^ 1
}

#[derive(Debug, Clone, Copy)]
pub struct AigAnd {
    pub lhs: u32,
    pub rhs0: u32,
    pub rhs1: u32,
}

/// A combinational And-Inverter Graph.
#[derive(Debug)]
pub struct Aig {
    pub maxvar: u32,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub outputs: Vec<u32>,
    pub ands: Vec<AigAnd>,
    and_by_lhs: HashMap<u32, usize>,
    pub input_names: Vec<Option<String>>,
    pub output_names: Vec<Option<String>>,
}

impl Aig {
    pub fn is_input(&self, lit: u32) -> bool {
        let var = lit >> 1;
        var >= 1 && var <= self.num_inputs
    }

    /// The AND record defining `lit` (sign stripped), if any.
    pub fn and(&self, lit: u32) -> Option<&AigAnd> {
        self.and_by_lhs.get(&strip(lit)).map(|&i| &self.ands[i])
    }

    /// The i-th output literal.
    pub fn slit(&self, i: usize) -> u32 {
        self.outputs[i]
    }

    /// Number of gate table entries below the outputs: inputs + ANDs + 1.
    pub fn m(&self) -> usize {
        self.maxvar as usize + 1
    }
}

fn parse_u32(s: &str, field: &str) -> Result<u32, String> {
    s.parse::<u32>()
        .map_err(|e| format!("invalid {} value '{}': {}", field, s, e))
}

fn next_non_empty_line<'a>(iter: &mut std::str::Lines<'a>) -> Option<&'a str> {
    for line in iter.by_ref() {
        if !line.trim().is_empty() {
            return Some(line);
        }
    }
    None
}

/// Parses ASCII-AIGER text into an [`Aig`].
pub fn parse_aiger(src: &str) -> Result<Aig, String> {
    let mut lines = src.lines();

    let header_line = lines.next().ok_or_else(|| "empty AIGER input".to_string())?;
    let header_tokens: Vec<&str> = header_line.split_whitespace().collect();
    if header_tokens.len() != 6 {
        return Err(format!(
            "expected 6 tokens in AIGER header, got {} (\"{}\")",
            header_tokens.len(),
            header_line
        ));
    }
    if header_tokens[0] != "aag" {
        return Err(format!(
            "only ASCII-AIGER (aag) is supported; got '{}'",
            header_tokens[0]
        ));
    }

    let maxvar = parse_u32(header_tokens[1], "M")?;
    let i = parse_u32(header_tokens[2], "I")?;
    let l = parse_u32(header_tokens[3], "L")?;
    let o = parse_u32(header_tokens[4], "O")?;
    let a = parse_u32(header_tokens[5], "A")?;

    if l != 0 {
        return Err("latch count (L) must be zero; sequential AIGER not supported".to_string());
    }
    if maxvar != i + a {
        return Err(format!(
            "expected a reindexed file with M == I + A, got M={} I={} A={}",
            maxvar, i, a
        ));
    }

    // Inputs must occupy the literals 2..=2*I in order.
    for idx in 0..i {
        let line = next_non_empty_line(&mut lines)
            .ok_or_else(|| format!("expected {} input lines but found fewer", i))?;
        let lit: u32 = line
            .trim()
            .parse()
            .map_err(|e| format!("invalid input literal '{}': {}", line, e))?;
        if lit != 2 * (idx + 1) {
            return Err(format!(
                "input {} must be literal {}, got {}",
                idx,
                2 * (idx + 1),
                lit
            ));
        }
    }

    let mut outputs = Vec::with_capacity(o as usize);
    for _ in 0..o {
        let line = next_non_empty_line(&mut lines)
            .ok_or_else(|| format!("expected {} output lines but found fewer", o))?;
        let lit: u32 = line
            .trim()
            .parse()
            .map_err(|e| format!("invalid output literal '{}': {}", line, e))?;
        if lit > 2 * maxvar + 1 {
            return Err(format!("output literal {} out of range", lit));
        }
        outputs.push(lit);
    }

    let mut ands = Vec::with_capacity(a as usize);
    let mut and_by_lhs = HashMap::new();
    for k in 0..a {
        let line = next_non_empty_line(&mut lines)
            .ok_or_else(|| format!("expected {} AND lines but found fewer", a))?;
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() != 3 {
            return Err(format!("AND line should have 3 fields, got '{}'", line));
        }
        let lhs = parse_u32(toks[0], "AND lhs")?;
        let rhs0 = parse_u32(toks[1], "AND rhs0")?;
        let rhs1 = parse_u32(toks[2], "AND rhs1")?;
        let expect = 2 * (i + k + 1);
        if lhs != expect {
            return Err(format!(
                "AND definitions must be contiguous: expected lhs {}, got {}",
                expect, lhs
            ));
        }
        for rhs in [rhs0, rhs1] {
            if rhs < 2 {
                return Err(format!("constant AND fan-in {} is not supported", rhs));
            }
            if strip(rhs) >= lhs {
                return Err(format!(
                    "AND fan-in {} refers to a not-yet-defined literal",
                    rhs
                ));
            }
        }
        and_by_lhs.insert(lhs, ands.len());
        ands.push(AigAnd { lhs, rhs0, rhs1 });
    }

    // Optional symbol table, up to the comment section.
    let mut input_names = vec![None; i as usize];
    let mut output_names = vec![None; o as usize];
    for line in lines {
        if line.starts_with('c') {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let (kind, rest) = line.split_at(1);
        if kind != "i" && kind != "o" {
            continue;
        }
        let mut parts = rest.trim().split_whitespace();
        let idx_str = parts
            .next()
            .ok_or_else(|| format!("malformed symbol '{}': missing index", line))?;
        let idx: usize = idx_str
            .parse()
            .map_err(|e| format!("invalid symbol index in '{}': {}", line, e))?;
        let name = parts
            .next()
            .ok_or_else(|| format!("malformed symbol '{}': missing name", line))?;
        match kind {
            "i" if idx < input_names.len() => input_names[idx] = Some(name.to_string()),
            "o" if idx < output_names.len() => output_names[idx] = Some(name.to_string()),
            _ => return Err(format!("symbol index out of range in '{}'", line)),
        }
    }

    Ok(Aig {
        maxvar,
        num_inputs: i,
        num_outputs: o,
        outputs,
        ands,
        and_by_lhs,
        input_names,
        output_names,
    })
}

pub fn load_aiger_file(path: &str) -> Result<Aig, String> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot open '{}' for reading: {}", path, e))?;
    parse_aiger(&src)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    #[test]
    fn test_parse_half_adder() {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        assert_eq!(aig.num_inputs, 2);
        assert_eq!(aig.num_outputs, 2);
        assert_eq!(aig.ands.len(), 3);
        assert!(aig.is_input(2));
        assert!(aig.is_input(5));
        assert!(!aig.is_input(6));
        assert_eq!(aig.and(7).unwrap().rhs0, 2);
        assert_eq!(aig.slit(0), 10);
        assert_eq!(aig.m(), 6);
    }

    #[test]
    fn test_reject_latches() {
        let res = parse_aiger("aag 1 0 1 0 0\n2 2\n");
        assert!(res.unwrap_err().contains("latch"));
    }

    #[test]
    fn test_reject_gapped_ands() {
        let res = parse_aiger("aag 3 1 0 1 2\n2\n6\n6 2 3\n8 6 2\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_reject_undefined_fanin() {
        let res = parse_aiger("aag 2 1 0 1 1\n2\n4\n4 6 2\n");
        assert!(res.unwrap_err().contains("not-yet-defined"));
    }
}
