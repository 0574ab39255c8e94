use super::*;

#[test]
fn zero_vector_has_configured_dimension() {
    let vector = zero_vector(768);
    assert_eq!(vector.len(), 768);
    assert!(vector.iter().all(|component| *component == 0.0));
}

#[test]
fn zero_vector_detection() {
    assert!(is_zero_vector(&[0.0, 0.0, 0.0]));
    assert!(is_zero_vector(&[]));
    assert!(!is_zero_vector(&[0.0, 0.1, 0.0]));
    assert!(!is_zero_vector(&[1.0]));
}
