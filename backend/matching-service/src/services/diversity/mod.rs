/// Diversity Layer - post-ranking variety pass
///
/// Keeps the head of a ranked list untouched, then walks the tail greedily
/// and admits an item only if it is not "too similar" to any of the most
/// recently admitted items. The comparison window is bounded, so the pass
/// stays linear in the list length.
#[derive(Debug, Clone, Copy)]
pub struct DiversityFilter {
    keep_top: usize,    // admitted unconditionally
    window: usize,      // recent admissions compared against
    max_results: usize, // hard cap on output length
    min_pool: usize,    // lists this short are returned as-is
}

impl Default for DiversityFilter {
    fn default() -> Self {
        Self {
            keep_top: 5,
            window: 5,
            max_results: 15,
            min_pool: 10,
        }
    }
}

impl DiversityFilter {
    pub fn new(keep_top: usize, window: usize, max_results: usize, min_pool: usize) -> Self {
        Self {
            keep_top,
            window,
            max_results,
            min_pool,
        }
    }

    /// Rerank an already score-sorted list
    ///
    /// `too_similar(candidate, admitted)` decides whether a candidate
    /// duplicates an admitted item.
    pub fn apply<T, F>(&self, ranked: Vec<T>, too_similar: F) -> Vec<T>
    where
        F: Fn(&T, &T) -> bool,
    {
        if ranked.len() <= self.min_pool {
            return ranked;
        }

        let mut selected: Vec<T> = Vec::with_capacity(self.max_results);
        for item in ranked {
            if selected.len() >= self.max_results {
                break;
            }

            if selected.len() < self.keep_top
                || !self.violates_diversity(&selected, &item, &too_similar)
            {
                selected.push(item);
            }
        }

        selected
    }

    /// Check the candidate against the last `window` admissions
    fn violates_diversity<T, F>(&self, selected: &[T], candidate: &T, too_similar: &F) -> bool
    where
        F: Fn(&T, &T) -> bool,
    {
        selected
            .iter()
            .rev()
            .take(self.window)
            .any(|admitted| too_similar(candidate, admitted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (id, group) pairs; same group = too similar
    fn items(groups: &[u8]) -> Vec<(usize, u8)> {
        groups.iter().copied().enumerate().collect()
    }

    fn same_group(a: &(usize, u8), b: &(usize, u8)) -> bool {
        a.1 == b.1
    }

    #[test]
    fn test_short_list_untouched() {
        let filter = DiversityFilter::default();
        let ranked = items(&[0; 10]);
        assert_eq!(filter.apply(ranked.clone(), same_group), ranked);
    }

    #[test]
    fn test_keeps_top_then_diversifies() {
        let filter = DiversityFilter::default();
        let mut groups = vec![0u8; 12];
        groups.push(1);
        groups.push(0);
        let result = filter.apply(items(&groups), same_group);

        // Top 5 kept, every other group-0 item rejected, group 1 admitted
        assert_eq!(result.len(), 6);
        assert!(result[..5].iter().all(|(id, _)| *id < 5));
        assert_eq!(result[5], (12, 1));
    }

    #[test]
    fn test_output_capped() {
        let filter = DiversityFilter::default();
        let groups: Vec<u8> = (0..30).collect();
        let result = filter.apply(items(&groups), same_group);
        assert_eq!(result.len(), 15);
    }

    #[test]
    fn test_window_is_bounded() {
        // Window of 1: only the last admission is compared
        let filter = DiversityFilter::new(1, 1, 15, 2);
        let result = filter.apply(items(&[0, 1, 0, 1]), same_group);
        assert_eq!(result.len(), 4);
    }
}
