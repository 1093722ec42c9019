/// Per-chain dimension cursor for the block proposal variant (spec §4.5,
/// "Block adapter"): each step perturbs only one coordinate, rotating
/// through dimensions modulo `ndims`.
pub struct BlockAdapter {
    ndims: usize,
    cursors: Vec<usize>,
}

impl BlockAdapter {
    pub fn new(ntotal: usize, ndims: usize) -> Self {
        Self { ndims: ndims.max(1), cursors: vec![0; ntotal] }
    }

    /// Returns the dimension chain `i` should perturb this step and
    /// advances its cursor for next time.
    pub fn next_dim(&mut self, i: usize) -> usize {
        let dim = self.cursors[i];
        self.cursors[i] = (dim + 1) % self.ndims;
        dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_rotates_modulo_ndims() {
        let mut adapter = BlockAdapter::new(1, 3);
        let dims: Vec<usize> = (0..7).map(|_| adapter.next_dim(0)).collect();
        assert_eq!(dims, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
