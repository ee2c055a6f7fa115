use crate::window::PageSet;

/// Tracks which materialized pages have finished their first paint.
#[derive(Debug, Default)]
pub struct RenderTracker {
    rendered: PageSet,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a first paint. Returns true only the first time a page is reported.
    pub fn on_page_ready(&mut self, page: usize) -> bool {
        self.rendered.insert(page)
    }

    pub fn is_ready(&self, page: usize) -> bool {
        self.rendered.contains(page)
    }

    pub fn rendered(&self) -> &PageSet {
        &self.rendered
    }

    /// A document with no pages never reports complete.
    pub fn is_complete(&self, total_pages: usize) -> bool {
        total_pages > 0 && self.rendered.len() == total_pages
    }

    pub fn progress(&self, total_pages: usize) -> f32 {
        if total_pages == 0 {
            return 0.0;
        }
        (self.rendered.len() as f32 / total_pages as f32).min(1.0)
    }

    pub fn clear(&mut self) {
        self.rendered.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_ready_is_a_no_op() {
        let mut tracker = RenderTracker::new();
        assert!(tracker.on_page_ready(3));
        assert!(!tracker.on_page_ready(3));
        assert!(!tracker.on_page_ready(3));
        assert_eq!(tracker.rendered().iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn progress_grows_in_any_arrival_order() {
        let mut tracker = RenderTracker::new();
        let mut last = tracker.progress(5);
        for page in [4, 1, 5, 1, 3, 2] {
            tracker.on_page_ready(page);
            let progress = tracker.progress(5);
            assert!(progress >= last);
            assert_eq!(progress == 1.0, tracker.is_complete(5));
            last = progress;
        }
        assert!(tracker.is_complete(5));
    }

    #[test]
    fn zero_pages_is_neither_progress_nor_complete() {
        let tracker = RenderTracker::new();
        assert_eq!(tracker.progress(0), 0.0);
        assert!(!tracker.is_complete(0));
    }

    #[test]
    fn clear_resets() {
        let mut tracker = RenderTracker::new();
        tracker.on_page_ready(1);
        tracker.clear();
        assert!(!tracker.is_ready(1));
        assert_eq!(tracker.progress(1), 0.0);
    }
}
