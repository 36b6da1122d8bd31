//! Random selection of workers without replacement.

use rand::Rng;

use botfleet_core::WorkerId;

/// A working copy of one inventory set that candidates are drawn from.
///
/// Each draw removes the chosen worker, so a cycle never selects the same
/// worker twice.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    items: Vec<WorkerId>,
}

impl CandidatePool {
    pub fn new(items: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove and return a uniformly random worker, or `None` when empty.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<WorkerId> {
        if self.items.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.items.len());
        Some(self.items.swap_remove(idx))
    }

    /// Draw up to `n` workers, stopping early if the pool runs out.
    pub fn draw_many<R: Rng + ?Sized>(&mut self, rng: &mut R, n: usize) -> Vec<WorkerId> {
        let mut drawn = Vec::with_capacity(n.min(self.items.len()));
        while drawn.len() < n {
            match self.draw(rng) {
                Some(worker) => drawn.push(worker),
                None => break,
            }
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pool(n: usize) -> CandidatePool {
        CandidatePool::new((0..n).map(|i| WorkerId::new(i % 2, format!("w{i}"))))
    }

    #[test]
    fn empty_pool_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(CandidatePool::default().draw(&mut rng), None);
    }

    #[test]
    fn draws_are_without_replacement() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = pool(20);
        let drawn = p.draw_many(&mut rng, 20);

        let unique: HashSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), 20);
        assert!(p.is_empty());
    }

    #[test]
    fn draw_many_stops_when_exhausted() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = pool(3);
        assert_eq!(p.draw_many(&mut rng, 10).len(), 3);
        assert_eq!(p.draw(&mut rng), None);
    }

    #[test]
    fn every_member_can_be_drawn() {
        let mut seen = HashSet::new();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            if let Some(w) = pool(5).draw(&mut rng) {
                seen.insert(w);
            }
        }
        assert_eq!(seen.len(), 5);
    }
}
