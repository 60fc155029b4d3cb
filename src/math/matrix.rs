//! Dense matrices over GF(256)
//!
//! Row-major storage. Elimination always pivots on the first nonzero entry of
//! a column, so results are deterministic for a given input.

use super::poly::Poly;
use super::{dot, Gf256, Vector};
use crate::error::{RecoveryError, Result};
use rand::Rng;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Gf256>,
}

/// Reduced row-echelon form together with its pivot columns.
#[derive(Clone, Debug)]
pub struct Echelon {
    pub matrix: Matrix,
    pub pivots: Vec<usize>,
}

impl Echelon {
    pub fn rank(&self) -> usize {
        self.pivots.len()
    }

    /// Columns without a pivot, in increasing order.
    pub fn free_columns(&self) -> Vec<usize> {
        (0..self.matrix.cols)
            .filter(|c| !self.pivots.contains(c))
            .collect()
    }
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Gf256::ZERO; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, Gf256::ONE);
        }
        m
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Gf256) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Builds a matrix from rows, which must all have the same length.
    pub fn from_rows(rows: &[Vector]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(RecoveryError::DimensionMismatch {
                    context: "matrix rows",
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Builds a matrix whose columns are the given vectors.
    pub fn from_columns(rows: usize, columns: &[Vector]) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
            return Err(RecoveryError::DimensionMismatch {
                context: "matrix columns",
                expected: rows,
                got: bad.len(),
            });
        }
        Ok(Self::from_fn(rows, columns.len(), |r, c| columns[c][r]))
    }

    pub fn random<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        Self::from_fn(rows, cols, |_, _| Gf256::random(rng))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> Gf256 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, value: Gf256) {
        self.data[r * self.cols + c] = value;
    }

    pub fn row(&self, r: usize) -> &[Gf256] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn column(&self, c: usize) -> Vector {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    pub fn to_rows(&self) -> Vec<Vector> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|x| x.is_zero())
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }

    fn swap_columns(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for r in 0..self.rows {
            self.data.swap(r * self.cols + a, r * self.cols + b);
        }
    }

    /// row[dst] += factor * row[src]
    fn add_scaled_row(&mut self, dst: usize, src: usize, factor: Gf256) {
        for c in 0..self.cols {
            let v = self.get(src, c) * factor;
            self.data[dst * self.cols + c] += v;
        }
    }

    /// col[dst] += factor * col[src]
    fn add_scaled_column(&mut self, dst: usize, src: usize, factor: Gf256) {
        for r in 0..self.rows {
            let v = self.get(r, src) * factor;
            self.data[r * self.cols + dst] += v;
        }
    }

    fn scale_row(&mut self, r: usize, factor: Gf256) {
        for c in 0..self.cols {
            self.data[r * self.cols + c] *= factor;
        }
    }

    pub fn transpose(&self) -> Matrix {
        Matrix::from_fn(self.cols, self.rows, |r, c| self.get(c, r))
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix> {
        self.ensure_same_shape(other, "matrix addition")?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a + b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// self += factor * other
    pub fn add_scaled(&mut self, other: &Matrix, factor: Gf256) -> Result<()> {
        self.ensure_same_shape(other, "scaled matrix addition")?;
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b * factor;
        }
        Ok(())
    }

    pub fn scale(&self, factor: Gf256) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| x * factor).collect(),
        }
    }

    pub fn mul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols != rhs.rows {
            return Err(RecoveryError::DimensionMismatch {
                context: "matrix product",
                expected: self.cols,
                got: rhs.rows,
            });
        }
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a.is_zero() {
                    continue;
                }
                for c in 0..rhs.cols {
                    out.data[r * rhs.cols + c] += a * rhs.get(k, c);
                }
            }
        }
        Ok(out)
    }

    /// Matrix times column vector.
    pub fn mul_vec(&self, v: &[Gf256]) -> Result<Vector> {
        if self.cols != v.len() {
            return Err(RecoveryError::DimensionMismatch {
                context: "matrix-vector product",
                expected: self.cols,
                got: v.len(),
            });
        }
        Ok((0..self.rows).map(|r| dot(self.row(r), v)).collect())
    }

    /// Row vector times matrix.
    pub fn vec_mul(&self, v: &[Gf256]) -> Result<Vector> {
        if self.rows != v.len() {
            return Err(RecoveryError::DimensionMismatch {
                context: "vector-matrix product",
                expected: self.rows,
                got: v.len(),
            });
        }
        let mut out = vec![Gf256::ZERO; self.cols];
        for (r, &x) in v.iter().enumerate() {
            if x.is_zero() {
                continue;
            }
            for (o, &m) in out.iter_mut().zip(self.row(r)) {
                *o += x * m;
            }
        }
        Ok(out)
    }

    /// xᵗ · self · y
    pub fn bilinear_form(&self, x: &[Gf256], y: &[Gf256]) -> Result<Gf256> {
        let my = self.mul_vec(y)?;
        if x.len() != my.len() {
            return Err(RecoveryError::DimensionMismatch {
                context: "bilinear form",
                expected: my.len(),
                got: x.len(),
            });
        }
        Ok(dot(x, &my))
    }

    /// xᵗ · self · x
    pub fn quadratic_form(&self, x: &[Gf256]) -> Result<Gf256> {
        self.bilinear_form(x, x)
    }

    /// P + Pᵗ, the polar form of the quadratic form defined by P.
    pub fn symmetrize(&self) -> Result<Matrix> {
        self.add(&self.transpose())
    }

    /// Folds the strictly lower triangle onto the upper one. The quadratic
    /// form is unchanged.
    pub fn to_upper_triangular(&self) -> Result<Matrix> {
        self.ensure_square("upper-triangular folding")?;
        let n = self.rows;
        Ok(Matrix::from_fn(n, n, |r, c| match r.cmp(&c) {
            std::cmp::Ordering::Less => self.get(r, c) + self.get(c, r),
            std::cmp::Ordering::Equal => self.get(r, c),
            std::cmp::Ordering::Greater => Gf256::ZERO,
        }))
    }

    pub fn is_upper_triangular(&self) -> bool {
        (0..self.rows).all(|r| (0..r.min(self.cols)).all(|c| self.get(r, c).is_zero()))
    }

    /// Reduced row-echelon form, pivoting on the first nonzero entry of each column.
    pub fn rref(&self) -> Echelon {
        let mut m = self.clone();
        let mut pivots = Vec::new();
        let mut next_row = 0;
        for col in 0..m.cols {
            if next_row == m.rows {
                break;
            }
            let Some(p) = (next_row..m.rows).find(|&r| !m.get(r, col).is_zero()) else {
                continue;
            };
            m.swap_rows(p, next_row);
            // Nonzero by choice of p.
            let inv = m.get(next_row, col).pow(254);
            m.scale_row(next_row, inv);
            for r in 0..m.rows {
                if r == next_row {
                    continue;
                }
                let factor = m.get(r, col);
                if !factor.is_zero() {
                    m.add_scaled_row(r, next_row, factor);
                }
            }
            pivots.push(col);
            next_row += 1;
        }
        Echelon { matrix: m, pivots }
    }

    pub fn rank(&self) -> usize {
        self.rref().rank()
    }

    pub fn is_invertible(&self) -> bool {
        self.is_square() && self.rank() == self.rows
    }

    /// Gauss-Jordan inversion.
    pub fn inverse(&self) -> Result<Matrix> {
        self.ensure_square("matrix inverse")?;
        let n = self.rows;
        let augmented = Matrix::from_fn(n, 2 * n, |r, c| {
            if c < n {
                self.get(r, c)
            } else if c - n == r {
                Gf256::ONE
            } else {
                Gf256::ZERO
            }
        });
        let reduced = augmented.rref();
        if reduced.pivots.len() < n || reduced.pivots[n - 1] >= n {
            return Err(RecoveryError::SingularMatrix);
        }
        Ok(Matrix::from_fn(n, n, |r, c| reduced.matrix.get(r, n + c)))
    }

    /// Basis of the right null space { x : self · x = 0 }.
    pub fn kernel(&self) -> Vec<Vector> {
        let echelon = self.rref();
        echelon
            .free_columns()
            .into_iter()
            .map(|free| {
                let mut x = vec![Gf256::ZERO; self.cols];
                x[free] = Gf256::ONE;
                for (row, &pivot) in echelon.pivots.iter().enumerate() {
                    x[pivot] = -echelon.matrix.get(row, free);
                }
                x
            })
            .collect()
    }

    /// Characteristic polynomial det(t·I - self), via reduction to upper
    /// Hessenberg form.
    pub fn characteristic_polynomial(&self) -> Result<Poly> {
        self.ensure_square("characteristic polynomial")?;
        let n = self.rows;
        let mut h = self.clone();

        for col in 0..n.saturating_sub(2) {
            let target = col + 1;
            let Some(p) = (target..n).find(|&r| !h.get(r, col).is_zero()) else {
                continue;
            };
            h.swap_rows(p, target);
            h.swap_columns(p, target);
            let inv = h.get(target, col).inverse()?;
            for r in target + 1..n {
                let u = h.get(r, col) * inv;
                if u.is_zero() {
                    continue;
                }
                // Similarity: row_r -= u·row_target, then col_target += u·col_r.
                h.add_scaled_row(r, target, -u);
                h.add_scaled_column(target, r, u);
            }
        }

        // p_k = (t - h_kk)·p_{k-1} - Σ_i h_{k-i,k} · Π h_{j,j-1} · p_{k-i-1}
        let mut chars: Vec<Poly> = Vec::with_capacity(n + 1);
        chars.push(Poly::one());
        for k in 1..=n {
            let linear = Poly::from_coeffs(vec![-h.get(k - 1, k - 1), Gf256::ONE]);
            let mut pk = linear.mul(&chars[k - 1]);
            let mut subdiagonal = Gf256::ONE;
            for i in 1..k {
                subdiagonal *= h.get(k - i, k - i - 1);
                if subdiagonal.is_zero() {
                    break;
                }
                let c = h.get(k - i - 1, k - 1) * subdiagonal;
                pk = pk.sub(&chars[k - i - 1].scale(c));
            }
            chars.push(pk);
        }
        Ok(chars.pop().unwrap_or_else(Poly::one))
    }

    fn ensure_square(&self, context: &'static str) -> Result<()> {
        if self.is_square() {
            Ok(())
        } else {
            Err(RecoveryError::DimensionMismatch {
                context,
                expected: self.rows,
                got: self.cols,
            })
        }
    }

    fn ensure_same_shape(&self, other: &Matrix, context: &'static str) -> Result<()> {
        if self.rows != other.rows {
            return Err(RecoveryError::DimensionMismatch {
                context,
                expected: self.rows,
                got: other.rows,
            });
        }
        if self.cols != other.cols {
            return Err(RecoveryError::DimensionMismatch {
                context,
                expected: self.cols,
                got: other.cols,
            });
        }
        Ok(())
    }
}

/// Rank of the matrix whose rows are the given vectors.
pub fn rank_of(vectors: &[Vector]) -> Result<usize> {
    if vectors.is_empty() {
        return Ok(0);
    }
    Ok(Matrix::from_rows(vectors)?.rank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn g(x: u8) -> Gf256 {
        Gf256::new(x)
    }

    fn random_invertible(n: usize, rng: &mut ChaCha8Rng) -> Matrix {
        loop {
            let m = Matrix::random(n, n, rng);
            if m.is_invertible() {
                return m;
            }
        }
    }

    #[test]
    fn test_inverse_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for n in 1..8 {
            let m = random_invertible(n, &mut rng);
            let inv = m.inverse().unwrap();
            assert_eq!(m.mul(&inv).unwrap(), Matrix::identity(n));
            assert_eq!(inv.mul(&m).unwrap(), Matrix::identity(n));
        }
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let m = Matrix::from_rows(&[vec![g(1), g(2)], vec![g(2), g(4)]]).unwrap();
        assert!(!m.is_invertible());
        assert!(matches!(m.inverse(), Err(RecoveryError::SingularMatrix)));
    }

    #[test]
    fn test_rref_pivots_on_first_nonzero_column() {
        let m = Matrix::from_rows(&[
            vec![g(0), g(3), g(1)],
            vec![g(0), g(6), g(2)],
            vec![g(0), g(0), g(5)],
        ])
        .unwrap();
        let e = m.rref();
        assert_eq!(e.pivots, vec![1, 2]);
        assert_eq!(e.free_columns(), vec![0]);
        assert_eq!(e.matrix.get(0, 1), Gf256::ONE);
        assert_eq!(e.matrix.get(0, 2), Gf256::ZERO);
    }

    #[test]
    fn test_kernel_vectors_are_annihilated() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let m = Matrix::random(3, 7, &mut rng);
        let kernel = m.kernel();
        assert_eq!(kernel.len(), 7 - m.rank());
        for v in &kernel {
            assert!(m.mul_vec(v).unwrap().iter().all(|x| x.is_zero()));
        }
        assert_eq!(rank_of(&kernel).unwrap(), kernel.len());
    }

    #[test]
    fn test_quadratic_form_matches_upper_triangular_fold() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let p = Matrix::random(5, 5, &mut rng);
        let upper = p.to_upper_triangular().unwrap();
        assert!(upper.is_upper_triangular());
        for _ in 0..10 {
            let x: Vector = (0..5).map(|_| Gf256::random(&mut rng)).collect();
            assert_eq!(p.quadratic_form(&x).unwrap(), upper.quadratic_form(&x).unwrap());
        }
    }

    #[test]
    fn test_symmetrized_form_is_polar_form() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let p = Matrix::random(4, 4, &mut rng).to_upper_triangular().unwrap();
        let s = p.symmetrize().unwrap();
        let x: Vector = (0..4).map(|_| Gf256::random(&mut rng)).collect();
        let y: Vector = (0..4).map(|_| Gf256::random(&mut rng)).collect();
        let xy: Vector = x.iter().zip(&y).map(|(&a, &b)| a + b).collect();
        // Q(x + y) - Q(x) - Q(y) = xᵗ S y
        let polar = p.quadratic_form(&xy).unwrap()
            - p.quadratic_form(&x).unwrap()
            - p.quadratic_form(&y).unwrap();
        assert_eq!(polar, s.bilinear_form(&x, &y).unwrap());
        // Alternating in characteristic 2.
        assert_eq!(s.quadratic_form(&x).unwrap(), Gf256::ZERO);
    }

    #[test]
    fn test_characteristic_polynomial_of_companion_matrix() {
        // t^3 + 5t^2 + 7t + 9
        let coeffs = [g(9), g(7), g(5)];
        let companion = Matrix::from_fn(3, 3, |r, c| {
            if c == 2 {
                -coeffs[r]
            } else if r == c + 1 {
                Gf256::ONE
            } else {
                Gf256::ZERO
            }
        });
        let chi = companion.characteristic_polynomial().unwrap();
        assert_eq!(chi, Poly::from_coeffs(vec![g(9), g(7), g(5), g(1)]));
    }

    #[test]
    fn test_cayley_hamilton() {
        let mut rng = ChaCha8Rng::seed_from_u64(19);
        for n in [1, 2, 5, 9] {
            let m = Matrix::random(n, n, &mut rng);
            let chi = m.characteristic_polynomial().unwrap();
            assert_eq!(chi.degree(), Some(n));
            assert!(chi.evaluate_at_matrix(&m).unwrap().is_zero());
        }
    }

    #[test]
    fn test_characteristic_polynomial_is_similarity_invariant() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let m = Matrix::random(6, 6, &mut rng);
        let s = random_invertible(6, &mut rng);
        let conj = s.inverse().unwrap().mul(&m).unwrap().mul(&s).unwrap();
        assert_eq!(
            m.characteristic_polynomial().unwrap(),
            conj.characteristic_polynomial().unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(matches!(
            a.mul(&b),
            Err(RecoveryError::DimensionMismatch { .. })
        ));
        assert!(a.mul_vec(&[Gf256::ONE]).is_err());
    }
}
