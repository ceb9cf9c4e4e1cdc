/// Bounded-history policy deciding which snapshot steps to evict after a
/// save. Kept separate from the persistence mechanism so alternative
/// strategies can be substituted.
pub trait RetentionPolicy {
    /// Given snapshot steps sorted ascending, return the steps to delete.
    fn evict(&self, steps: &[usize]) -> Vec<usize>;
}

/// Keep only the `count` most recent snapshots.
#[derive(Debug, Clone)]
pub struct KeepLast {
    count: usize,
}

impl KeepLast {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl RetentionPolicy for KeepLast {
    fn evict(&self, steps: &[usize]) -> Vec<usize> {
        if steps.len() <= self.count {
            return Vec::new();
        }
        steps[..steps.len() - self.count].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent() {
        let policy = KeepLast::new(3);
        assert_eq!(policy.evict(&[10, 20, 30]), Vec::<usize>::new());
        assert_eq!(policy.evict(&[10, 20, 30, 40]), vec![10]);
        assert_eq!(policy.evict(&[1, 2, 3, 4, 5]), vec![1, 2]);
    }

    #[test]
    fn empty_history_evicts_nothing() {
        assert!(KeepLast::new(3).evict(&[]).is_empty());
    }
}
