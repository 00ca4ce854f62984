use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Source of uniformly distributed indices, injected so selection can be
/// replayed deterministically.
pub trait RandomSource: Send + Sync {
    /// Returns an index in `0..upper`. Callers never pass `upper == 0`.
    fn pick(&self, upper: usize) -> usize;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandomSource;

impl RandomSource for ThreadRandomSource {
    fn pick(&self, upper: usize) -> usize {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Replays a fixed sequence of picks, wrapping around when exhausted. Each
/// value is reduced modulo the requested bound.
#[derive(Debug, Default)]
pub struct SequenceRandomSource {
    values: Vec<usize>,
    cursor: AtomicUsize,
}

impl SequenceRandomSource {
    pub fn new(values: Vec<usize>) -> Self {
        Self { values, cursor: AtomicUsize::new(0) }
    }
}

impl RandomSource for SequenceRandomSource {
    fn pick(&self, upper: usize) -> usize {
        if self.values.is_empty() {
            return 0;
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[position] % upper
    }
}

/// Picks up to `count` distinct items (partial Fisher-Yates). Returns every
/// item, shuffled, when fewer than `count` are available.
pub fn sample_distinct<T>(items: &[T], count: usize, random: &dyn RandomSource) -> Vec<T>
where
    T: Clone,
{
    let mut indices = (0..items.len()).collect::<Vec<_>>();
    let take = count.min(items.len());

    for position in 0..take {
        let remaining = indices.len() - position;
        let offset = random.pick(remaining) % remaining;
        indices.swap(position, position + offset);
    }

    indices.iter().take(take).map(|index| items[*index].clone()).collect()
}
