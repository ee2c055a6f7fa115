//! The set of materialized pages and how it grows.
//!
//! Page numbers are 1-based. The window only ever grows during a session;
//! surfaces that were materialized once are never torn down again.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Insert-only ordered set of page numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSet {
    pages: BTreeSet<usize>,
}

impl PageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the page was not present before.
    pub fn insert(&mut self, page: usize) -> bool {
        self.pages.insert(page)
    }

    pub fn contains(&self, page: usize) -> bool {
        self.pages.contains(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.pages.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.pages.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.iter().copied()
    }

    pub(crate) fn reset(&mut self) {
        self.pages.clear();
    }
}

pub type PageWindow = PageSet;

#[derive(Debug, Default)]
pub struct WindowManager {
    window: PageWindow,
}

impl WindowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> &PageWindow {
        &self.window
    }

    /// Materializes pages around the focal page. Returns the newly added pages.
    pub fn seed(&mut self, focal_page: usize, total_pages: usize, radius: usize) -> Vec<usize> {
        self.grow(focal_page, total_pages, radius)
    }

    /// Materializes pages around the current scroll page. Returns the newly added pages.
    pub fn expand(&mut self, current_page: usize, total_pages: usize, radius: usize) -> Vec<usize> {
        self.grow(current_page, total_pages, radius)
    }

    pub fn clear(&mut self) {
        self.window.reset();
    }

    fn grow(&mut self, center: usize, total_pages: usize, radius: usize) -> Vec<usize> {
        if total_pages == 0 {
            return Vec::new();
        }
        let center = center.clamp(1, total_pages);
        let mut lo = center.saturating_sub(radius).max(1);
        let mut hi = center.saturating_add(radius).min(total_pages);

        // Reaching either end fills the gap to it in one step.
        if lo == 1 {
            hi = hi.max(self.window.last().unwrap_or(hi));
        }
        if hi == total_pages {
            lo = lo.min(self.window.first().unwrap_or(lo));
        }

        (lo..=hi).filter(|page| self.window.insert(*page)).collect()
    }
}

/// Maps a scroll offset to the 1-based page under it.
pub fn page_at_offset(scroll_offset: f32, page_height: f32, total_pages: usize) -> usize {
    if total_pages == 0 {
        return 1;
    }
    if page_height.is_nan()
        || page_height <= 0.0
        || !scroll_offset.is_finite()
        || scroll_offset <= 0.0
    {
        return 1;
    }
    let index = (scroll_offset / page_height).floor() as usize;
    index.saturating_add(1).min(total_pages)
}

/// Scroll state reported by the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub offset: f32,
    pub page_height: f32,
}

/// Trailing-edge debounce: only the last position queued within the delay is released.
#[derive(Debug)]
pub struct ScrollDebouncer {
    delay: Duration,
    pending: Option<(ScrollPosition, Instant)>,
}

impl ScrollDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn queue(&mut self, position: ScrollPosition, now: Instant) {
        self.pending = Some((position, now));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, queued_at)| queued_at + self.delay)
    }

    pub fn take_ready(&mut self, now: Instant) -> Option<ScrollPosition> {
        let (position, queued_at) = self.pending?;
        if now.saturating_duration_since(queued_at) >= self.delay {
            self.pending = None;
            Some(position)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(manager: &WindowManager) -> Vec<usize> {
        manager.window().iter().collect()
    }

    #[test]
    fn seed_covers_whole_small_document() {
        let mut manager = WindowManager::new();
        manager.seed(5, 10, 5);
        assert_eq!(pages(&manager), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn seed_then_scroll_to_start_fills_the_gap() {
        let mut manager = WindowManager::new();
        let added = manager.seed(50, 100, 5);
        assert_eq!(added, (45..=55).collect::<Vec<_>>());
        assert_eq!(pages(&manager), (45..=55).collect::<Vec<_>>());

        let added = manager.expand(1, 100, 5);
        assert_eq!(added, (1..=44).collect::<Vec<_>>());
        assert_eq!(pages(&manager), (1..=55).collect::<Vec<_>>());
    }

    #[test]
    fn scroll_to_end_fills_the_gap() {
        let mut manager = WindowManager::new();
        manager.seed(10, 100, 3);
        manager.expand(99, 100, 3);
        assert_eq!(pages(&manager), (7..=100).collect::<Vec<_>>());
    }

    #[test]
    fn middle_expansion_leaves_gaps() {
        let mut manager = WindowManager::new();
        manager.seed(20, 100, 2);
        manager.expand(40, 100, 2);
        assert_eq!(
            pages(&manager),
            vec![18, 19, 20, 21, 22, 38, 39, 40, 41, 42]
        );
    }

    #[test]
    fn window_never_shrinks() {
        let mut manager = WindowManager::new();
        let mut previous = 0;
        for (center, radius) in [(50, 5), (10, 1), (90, 0), (1, 2), (100, 4), (60, 0)] {
            manager.expand(center, 100, radius);
            let size = manager.window().len();
            assert!(size >= previous);
            previous = size;
        }
        assert!(manager.window().contains(50));
    }

    #[test]
    fn radius_zero_and_out_of_range_center() {
        let mut manager = WindowManager::new();
        assert_eq!(manager.seed(7, 20, 0), vec![7]);
        assert_eq!(manager.expand(500, 20, 0), (8..=20).collect::<Vec<_>>());
        assert!(manager.seed(1, 0, 5).is_empty());
    }

    #[test]
    fn repeated_seed_adds_nothing() {
        let mut manager = WindowManager::new();
        manager.seed(5, 50, 2);
        assert!(manager.seed(5, 50, 2).is_empty());
    }

    #[test]
    fn page_at_offset_floors_and_clamps() {
        assert_eq!(page_at_offset(0.0, 800.0, 10), 1);
        assert_eq!(page_at_offset(799.0, 800.0, 10), 1);
        assert_eq!(page_at_offset(800.0, 800.0, 10), 2);
        assert_eq!(page_at_offset(1_000_000.0, 800.0, 10), 10);
        assert_eq!(page_at_offset(500.0, 0.0, 10), 1);
        assert_eq!(page_at_offset(-20.0, 800.0, 10), 1);
    }

    #[test]
    fn debouncer_waits_for_quiet_period() {
        let start = Instant::now();
        let mut debouncer = ScrollDebouncer::new(Duration::from_millis(200));
        let position = ScrollPosition {
            offset: 100.0,
            page_height: 800.0,
        };
        debouncer.queue(position, start);
        assert!(debouncer
            .take_ready(start + Duration::from_millis(50))
            .is_none());
        assert_eq!(
            debouncer.take_ready(start + Duration::from_millis(200)),
            Some(position)
        );
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn debouncer_keeps_latest_and_resets_deadline() {
        let start = Instant::now();
        let mut debouncer = ScrollDebouncer::new(Duration::from_millis(200));
        debouncer.queue(
            ScrollPosition {
                offset: 100.0,
                page_height: 800.0,
            },
            start,
        );
        let latest = ScrollPosition {
            offset: 4000.0,
            page_height: 800.0,
        };
        debouncer.queue(latest, start + Duration::from_millis(150));
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(350))
        );
        assert!(debouncer
            .take_ready(start + Duration::from_millis(250))
            .is_none());
        assert_eq!(
            debouncer.take_ready(start + Duration::from_millis(350)),
            Some(latest)
        );
    }
}
