/// Upper bound on identifiers echoed back for human inspection
pub const SAMPLE_SIZE: usize = 10;

/// First [`SAMPLE_SIZE`] entries of a result list
pub fn sample<T: Clone>(items: &[T]) -> Vec<T> {
    items.iter().take(SAMPLE_SIZE).cloned().collect()
}
