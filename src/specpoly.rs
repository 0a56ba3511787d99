// SPDX-License-Identifier: Apache-2.0

//! Specification polynomials: the built-in multiplier / miter / assertion
//! specs and the textual spec-polynomial parser.
//!
//! The textual form is a signed sum of monomials: integer coefficients,
//! variable names resolved against the gate names of the AIG (`i<k>` or
//! `a<k>`/`b<k>` for inputs, `s<k>` for outputs, `l<n>` for internals),
//! multiplication by juxtaposition or `*`, exponents rejected, terminated
//! by `;`.

use num_bigint::BigInt;
use num_traits::One;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::gate::GateId;
use crate::poly::{Monomial, Polynomial};
use crate::term::VarId;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(BigInt),
    Variable(String),
    Plus,
    Minus,
    Star,
    Caret,
    Semicolon,
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Token, EngineError> {
        loop {
            match self.chars.peek() {
                None => return Ok(Token::Eof),
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some(c) if c.is_ascii_digit() => {
                    let mut s = String::new();
                    while let Some(c) = self.chars.peek() {
                        if c.is_ascii_digit() {
                            s.push(*c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let n = s
                        .parse::<BigInt>()
                        .map_err(|e| EngineError::Parse(format!("invalid number '{}': {}", s, e)))?;
                    return Ok(Token::Number(n));
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let mut s = String::new();
                    s.push(*c);
                    self.chars.next();
                    while let Some(c) = self.chars.peek() {
                        if c.is_ascii_digit() {
                            s.push(*c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    return Ok(Token::Variable(s));
                }
                Some('+') => {
                    self.chars.next();
                    return Ok(Token::Plus);
                }
                Some('-') => {
                    self.chars.next();
                    return Ok(Token::Minus);
                }
                Some('*') => {
                    self.chars.next();
                    return Ok(Token::Star);
                }
                Some('^') => {
                    self.chars.next();
                    return Ok(Token::Caret);
                }
                Some(';') => {
                    self.chars.next();
                    return Ok(Token::Semicolon);
                }
                Some(c) => {
                    return Err(EngineError::Parse(format!(
                        "invalid character '{}' in specification",
                        c
                    )));
                }
            }
        }
    }
}

impl Engine {
    fn var_from_name(&self, name: &str) -> Result<VarId, EngineError> {
        for g in &self.gates.gates {
            if self.alg.pool.var(g.v).name() == name {
                return Ok(g.v);
            }
        }
        Err(EngineError::Parse(format!(
            "variable {} from specification not contained in input AIG; \
             expected output variables 's<num>', internal variables 'l<num>' \
             and primary inputs 'i<num>' (or 'a<num>'/'b<num>')",
            name
        )))
    }

    /// Parses a specification polynomial from text.
    pub fn parse_spec_polynomial_str(&mut self, src: &str) -> Result<Polynomial, EngineError> {
        let mut lexer = Lexer {
            chars: src.chars().peekable(),
        };

        let mut token = lexer.next_token()?;
        let mut sign = false;
        if token == Token::Minus {
            sign = true;
            token = lexer.next_token()?;
        }

        loop {
            // One monomial: optional coefficient, then juxtaposed variables.
            let mut coeff = match &token {
                Token::Number(n) => {
                    let c = n.clone();
                    token = lexer.next_token()?;
                    c
                }
                Token::Variable(_) => BigInt::one(),
                _ => {
                    return Err(EngineError::Parse("expected monomial".to_string()));
                }
            };
            if sign {
                coeff = -coeff;
            }
            if token == Token::Star {
                token = lexer.next_token()?;
            }

            let mut vars: Vec<VarId> = Vec::new();
            while let Token::Variable(name) = &token {
                let v = self.var_from_name(name)?;
                vars.push(v);
                token = lexer.next_token()?;
                if token == Token::Star {
                    token = lexer.next_token()?;
                }
                if token == Token::Caret {
                    return Err(EngineError::Parse(
                        "exponents currently not supported".to_string(),
                    ));
                }
            }

            for v in vars {
                self.alg.pool.push_vstack(v);
            }
            let term = self.alg.pool.build_term_from_stack(true);
            self.alg.push(Monomial { coeff, term });

            match token {
                Token::Semicolon | Token::Eof => break,
                Token::Minus => {
                    sign = true;
                    token = lexer.next_token()?;
                }
                Token::Plus => {
                    sign = false;
                    token = lexer.next_token()?;
                }
                _ => {
                    return Err(EngineError::Parse(format!(
                        "unexpected token {:?} in specification",
                        token
                    )));
                }
            }
        }

        Ok(self.alg.build_poly())
    }

    pub fn parse_spec_polynomial_file(&mut self, path: &str) -> Result<Polynomial, EngineError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Input(format!("can not open '{}' for reading: {}", path, e)))?;
        log::info!("reading specification polynomial from '{}'", path);
        self.parse_spec_polynomial_str(&src)
    }

    // ----- built-in specifications ---------------------------------------

    /// `sum(-2^i s_i) + sum(2^(i+j) a_i b_j)` for an unsigned multiplier
    /// with the inputs split into the two factors.
    pub fn mult_spec_poly(&mut self) -> Polynomial {
        let nn = self.gates.num_inputs;
        let m = self.gates.m;

        for i in (0..nn).rev() {
            let out = GateId((m - 1 + i) as u32);
            let v = self.gates.g(out).v;
            let coeff = -(BigInt::one() << i);
            let t = self.alg.pool.make_term(v, None);
            self.alg.push(Monomial {
                coeff,
                term: Some(t),
            });
        }

        for i in (0..nn / 2).rev() {
            let a = self.gates.g(GateId(i as u32)).v;
            for j in (0..nn / 2).rev() {
                let b = self.gates.g(GateId((nn / 2 + j) as u32)).v;
                let coeff = BigInt::one() << (i + j);
                self.alg.pool.push_vstack(b);
                self.alg.pool.push_vstack(a);
                let t = self.alg.pool.build_term_from_stack(true);
                self.alg.push(Monomial { coeff, term: t });
            }
        }

        self.alg.build_poly()
    }

    /// The single-output miter spec `s0`.
    pub fn miter_spec_poly(&mut self) -> Result<Polynomial, EngineError> {
        if self.gates.num_outputs != 1 {
            return Err(EngineError::Input(
                "miter specification requires exactly one output".to_string(),
            ));
        }
        let out = GateId((self.gates.m - 1) as u32);
        let v = self.gates.g(out).v;
        let t = self.alg.pool.make_term(v, None);
        Ok(self.alg.poly_from_mono(BigInt::one(), Some(t)))
    }

    /// The assertion spec `sum(s_i) - MM`.
    pub fn assertion_spec_poly(&mut self) -> Polynomial {
        let mm = self.gates.num_outputs;
        for i in (0..mm).rev() {
            let out = GateId((self.gates.m - 1 + i) as u32);
            let v = self.gates.g(out).v;
            let t = self.alg.pool.make_term(v, None);
            self.alg.push(Monomial {
                coeff: BigInt::one(),
                term: Some(t),
            });
        }
        self.alg.push(Monomial {
            coeff: BigInt::from(-(mm as i64)),
            term: None,
        });
        self.alg.build_poly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiger::parse_aiger;
    use crate::config::Config;
    use crate::poly::poly_to_string;

    const HALF_ADDER: &str = "aag 5 2 0 2 3\n2\n4\n10\n6\n6 2 4\n8 3 5\n10 7 9\n";

    fn engine() -> Engine {
        let aig = parse_aiger(HALF_ADDER).unwrap();
        let mut cfg = Config::default();
        cfg.seed = 1;
        Engine::new(aig, cfg)
    }

    #[test]
    fn test_parse_spec() {
        let mut e = engine();
        let p = e.parse_spec_polynomial_str("s0+2*s1-i0-i1;").unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(poly_to_string(&e.alg.pool, &p), "2*s1+s0-i1-i0");
        e.alg.free_poly(p);
    }

    #[test]
    fn test_parse_juxtaposition() {
        let mut e = engine();
        let p = e.parse_spec_polynomial_str("3 i0 i1 - l6;").unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.degree(), 2);
        e.alg.free_poly(p);
    }

    #[test]
    fn test_parse_rejects_unknown_variable() {
        let mut e = engine();
        let res = e.parse_spec_polynomial_str("z9;");
        assert!(res.is_err());
    }

    #[test]
    fn test_parse_rejects_exponent() {
        let mut e = engine();
        let res = e.parse_spec_polynomial_str("i0^2;");
        assert!(res.is_err());
    }

    #[test]
    fn test_assertion_spec() {
        let mut e = engine();
        let p = e.assertion_spec_poly();
        assert_eq!(poly_to_string(&e.alg.pool, &p), "s1+s0-2");
        e.alg.free_poly(p);
    }
}
