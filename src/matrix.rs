// SPDX-License-Identifier: Apache-2.0

//! Dense matrices over Q: reduced row echelon form and kernel bases.
//!
//! The kernel is read off the RREF by extending it to an n×n matrix with
//! `-1` on every free diagonal; the free columns then spell out a kernel
//! basis which is itself brought into RREF.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

#[derive(Debug, Clone)]
pub struct QMat {
    rows: usize,
    cols: usize,
    data: Vec<BigRational>,
}

impl QMat {
    pub fn zero(rows: usize, cols: usize) -> Self {
        QMat {
            rows,
            cols,
            data: vec![BigRational::zero(); rows * cols],
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, i: usize, j: usize) -> &BigRational {
        &self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, v: BigRational) {
        self.data[i * self.cols + j] = v;
    }

    pub fn set_int(&mut self, i: usize, j: usize, v: i64) {
        self.set(i, j, BigRational::from_integer(BigInt::from(v)));
    }

    pub fn row_is_zero(&self, i: usize) -> bool {
        (0..self.cols).all(|j| self.get(i, j).is_zero())
    }

    pub fn is_denom_free(&self, i: usize) -> bool {
        (0..self.cols).all(|j| self.get(i, j).denom().is_one())
    }

    /// Multiplies the row by the lcm of its denominators when that lcm is a
    /// power of two (other denominators survive and the row is discarded by
    /// the caller's denominator check).
    pub fn normalize_row(&mut self, i: usize) {
        let mut den = BigInt::one();
        for j in 0..self.cols {
            den = lcm(&den, self.get(i, j).denom());
        }
        if is_power_of_two(&den) {
            let f = BigRational::from_integer(den);
            for j in 0..self.cols {
                let v = self.get(i, j) * &f;
                self.set(i, j, v);
            }
        }
    }

    /// In-place reduced row echelon form; returns the pivot columns.
    pub fn rref(&mut self) -> Vec<usize> {
        let mut pivots = Vec::new();
        let mut row = 0;
        for col in 0..self.cols {
            if row >= self.rows {
                break;
            }
            let mut pivot = None;
            for r in row..self.rows {
                if !self.get(r, col).is_zero() {
                    pivot = Some(r);
                    break;
                }
            }
            let Some(pivot) = pivot else { continue };
            if pivot != row {
                for j in 0..self.cols {
                    self.data.swap(row * self.cols + j, pivot * self.cols + j);
                }
            }
            let inv = self.get(row, col).recip();
            for j in col..self.cols {
                let v = self.get(row, j) * &inv;
                self.set(row, j, v);
            }
            for r in 0..self.rows {
                if r == row || self.get(r, col).is_zero() {
                    continue;
                }
                let f = self.get(r, col).clone();
                for j in col..self.cols {
                    let v = self.get(r, j) - self.get(row, j) * &f;
                    self.set(r, j, v);
                }
            }
            pivots.push(col);
            row += 1;
        }
        pivots
    }

    /// Kernel basis in RREF; `self` is left in RREF as a side effect.
    pub fn kernel(&mut self) -> QMat {
        let pivots = self.rref();
        let n = self.cols;

        let mut extended = QMat::zero(n, n);
        for (i, &piv) in pivots.iter().enumerate() {
            for j in 0..n {
                extended.set(piv, j, self.get(i, j).clone());
            }
        }
        for i in 0..n {
            if extended.get(i, i).is_zero() {
                extended.set(i, i, -BigRational::one());
            }
        }

        let minus_one = -BigRational::one();
        let mut k = QMat::zero(n - pivots.len(), n);
        let mut r = 0;
        for i in 0..n {
            if *extended.get(i, i) == minus_one && !pivots.contains(&i) {
                for j in 0..n {
                    if !extended.get(j, i).is_zero() {
                        k.set(r, j, extended.get(j, i).clone());
                    }
                }
                r += 1;
            }
        }

        k.rref();
        for v in k.data.iter_mut() {
            *v = -v.clone();
        }
        k
    }
}

fn is_power_of_two(n: &BigInt) -> bool {
    !n.is_zero() && n.is_positive() && n.magnitude().count_ones() == 1
}

fn lcm(a: &BigInt, b: &BigInt) -> BigInt {
    if a.is_zero() || b.is_zero() {
        return BigInt::zero();
    }
    (a * b).abs() / gcd(a, b)
}

fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let t = &a % &b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(rows: usize, cols: usize, vals: &[i64]) -> QMat {
        let mut m = QMat::zero(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                m.set_int(i, j, vals[i * cols + j]);
            }
        }
        m
    }

    fn check_in_kernel(m: &QMat, k: &QMat) {
        for r in 0..k.nrows() {
            for i in 0..m.nrows() {
                let mut acc = BigRational::zero();
                for j in 0..m.ncols() {
                    acc += m.get(i, j) * k.get(r, j);
                }
                assert!(acc.is_zero(), "kernel row {} fails equation {}", r, i);
            }
        }
    }

    #[test]
    fn test_rref_pivots() {
        let mut m = mat(2, 3, &[2, 0, 2, 0, 3, 3]);
        let pivots = m.rref();
        assert_eq!(pivots, vec![0, 1]);
        assert!(m.get(0, 0).is_one());
        assert!(m.get(1, 1).is_one());
    }

    #[test]
    fn test_kernel_simple() {
        // x + z = 0, y + z = 0 -> kernel spanned by (1, 1, -1) up to sign.
        let orig = mat(2, 3, &[1, 0, 1, 0, 1, 1]);
        let mut m = orig.clone();
        let k = m.kernel();
        assert_eq!(k.nrows(), 1);
        check_in_kernel(&orig, &k);
    }

    #[test]
    fn test_kernel_full_rank_is_empty() {
        let mut m = mat(2, 2, &[1, 0, 0, 1]);
        let k = m.kernel();
        assert_eq!(k.nrows(), 0);
    }

    #[test]
    fn test_kernel_rectangular() {
        let orig = mat(2, 4, &[1, 2, 3, 4, 0, 1, 1, 1]);
        let mut m = orig.clone();
        let k = m.kernel();
        assert_eq!(k.nrows(), 2);
        check_in_kernel(&orig, &k);
    }

    #[test]
    fn test_normalize_row_clears_power_of_two_denoms() {
        let mut m = QMat::zero(1, 2);
        m.set(0, 0, BigRational::new(BigInt::from(1), BigInt::from(2)));
        m.set(0, 1, BigRational::new(BigInt::from(3), BigInt::from(4)));
        m.normalize_row(0);
        assert!(m.is_denom_free(0));
        assert_eq!(*m.get(0, 0), BigRational::from_integer(BigInt::from(2)));
    }
}
