/// Asserts that two scalars agree within an absolute tolerance.
#[macro_export]
macro_rules! assert_eq_float {
    ($lhs:expr, $rhs:expr, $tol:expr) => {{
        let (a, b): (f64, f64) = ($lhs, $rhs);
        assert!((a - b).abs() < $tol, "{} differs from {} by more than {}", a, b, $tol);
    }};
}

/// Asserts that two vectors agree component-wise within a tolerance.
#[macro_export]
macro_rules! assert_eq_vec3 {
    ($lhs:expr, $rhs:expr, $tol:expr) => {{
        let (va, vb) = ($lhs, $rhs);
        $crate::assert_eq_float!(va.x, vb.x, $tol);
        $crate::assert_eq_float!(va.y, vb.y, $tol);
        $crate::assert_eq_float!(va.z, vb.z, $tol);
    }};
}
