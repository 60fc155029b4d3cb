//! Property tests for GF(256) arithmetic and linear algebra

use proptest::prelude::*;
use uov_recover::math::{field_elements_to_hex, parse_field_elements_hex};
use uov_recover::{Gf256, Matrix};

fn element() -> impl Strategy<Value = Gf256> {
    any::<u8>().prop_map(Gf256::new)
}

fn nonzero() -> impl Strategy<Value = Gf256> {
    (1u8..=255).prop_map(Gf256::new)
}

fn square_matrix(n: usize) -> impl Strategy<Value = Matrix> {
    prop::collection::vec(any::<u8>(), n * n)
        .prop_map(move |bytes| Matrix::from_fn(n, n, |r, c| Gf256::new(bytes[r * n + c])))
}

proptest! {
    #[test]
    fn inverse_is_multiplicative_identity(a in nonzero()) {
        prop_assert_eq!(a * a.inverse().unwrap(), Gf256::ONE);
    }

    #[test]
    fn multiplication_distributes(a in element(), b in element(), c in element()) {
        prop_assert_eq!(a * (b + c), a * b + a * c);
    }

    #[test]
    fn multiplication_is_associative(a in element(), b in element(), c in element()) {
        prop_assert_eq!((a * b) * c, a * (b * c));
    }

    #[test]
    fn hex_decode_encode_is_identity(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let hex = hex::encode(&bytes);
        let decoded = parse_field_elements_hex(&hex).unwrap();
        prop_assert_eq!(field_elements_to_hex(&decoded), hex);
    }

    #[test]
    fn invertible_matrices_invert(m in square_matrix(4)) {
        if let Ok(inv) = m.inverse() {
            prop_assert_eq!(m.mul(&inv).unwrap(), Matrix::identity(4));
        } else {
            prop_assert!(m.rank() < 4);
        }
    }

    #[test]
    fn kernel_vectors_are_annihilated(m in square_matrix(5)) {
        let kernel = m.kernel();
        prop_assert_eq!(kernel.len() + m.rank(), 5);
        for x in kernel {
            prop_assert!(m.mul_vec(&x).unwrap().iter().all(|e| e.is_zero()));
        }
    }

    #[test]
    fn symmetrized_forms_are_alternating(m in square_matrix(4), x in prop::collection::vec(element(), 4)) {
        let s = m.symmetrize().unwrap();
        prop_assert!(s.bilinear_form(&x, &x).unwrap().is_zero());
    }
}
