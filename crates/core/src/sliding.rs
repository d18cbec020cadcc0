//! Sliding window accumulator
//!
//! Binary tree over the last `num` samples: replacing the oldest leaf and
//! repairing the path to the root costs O(log num) additions and avoids the
//! error drift of a running add/subtract sum.

use std::ops::Add;

/// Sliding sum over the last `num` samples.
#[derive(Debug, Clone)]
pub struct SlidingSum<T> {
    tree: Vec<T>,
    num: usize,
    leaf: usize,
}

impl<T> SlidingSum<T>
where
    T: Copy + Default + Add<Output = T>,
{
    pub fn new(num: usize) -> Self {
        Self {
            tree: vec![T::default(); 2 * num],
            num,
            leaf: num,
        }
    }

    /// Push one sample, evicting the oldest, and return the window sum.
    pub fn push(&mut self, input: T) -> T {
        self.tree[self.leaf] = input;
        let mut child = self.leaf;
        let mut parent = self.leaf / 2;
        while parent > 0 {
            self.tree[parent] = self.tree[child] + self.tree[child ^ 1];
            child = parent;
            parent /= 2;
        }
        self.leaf += 1;
        if self.leaf >= 2 * self.num {
            self.leaf = self.num;
        }
        self.tree[1]
    }
}
