use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::model::{split_lines, ImageRegion, Line, PageContent, TextToken};

/// Text and image geometry of one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub height: f32,
    pub tokens: Vec<TextToken>,
    pub images: Vec<ImageRegion>,
}

impl CachedPage {
    pub fn from_content(content: PageContent) -> Self {
        let images = content
            .operators
            .iter()
            .filter_map(|op| op.image_region())
            .collect();
        Self {
            height: content.height,
            tokens: content.tokens,
            images,
        }
    }

    pub fn lines(&self) -> Vec<Line<'_>> {
        split_lines(&self.tokens)
    }
}

/// Fetched pages keyed by page number. Entries are written once and never replaced.
#[derive(Debug, Default)]
pub struct TextTokenCache {
    pages: HashMap<usize, Arc<CachedPage>>,
}

impl TextTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a page's content unless the page is already cached, and returns the cached entry.
    pub fn insert(&mut self, page: usize, content: PageContent) -> Arc<CachedPage> {
        let entry = self.pages.entry(page).or_insert_with(|| {
            let cached = CachedPage::from_content(content);
            debug!(
                page,
                tokens = cached.tokens.len(),
                images = cached.images.len(),
                "cached page text"
            );
            Arc::new(cached)
        });
        Arc::clone(entry)
    }

    pub fn get(&self, page: usize) -> Option<Arc<CachedPage>> {
        self.pages.get(&page).cloned()
    }

    pub fn contains(&self, page: usize) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DrawOperator, OpCode, PageRect};

    fn content(text: &str) -> PageContent {
        PageContent {
            height: 792.0,
            tokens: vec![TextToken::new(text, (0.0, 0.0), (10.0, 10.0), true)],
            operators: vec![
                DrawOperator::new(OpCode::ShowText, vec![]),
                DrawOperator::paint_image(5.0, 6.0, 7.0, 8.0),
                DrawOperator::new(OpCode::PaintImage, vec![f32::NAN, 0.0, 1.0, 1.0]),
            ],
        }
    }

    #[test]
    fn derives_image_regions_from_paint_image_operators() {
        let mut cache = TextTokenCache::new();
        let page = cache.insert(3, content("hello"));
        assert_eq!(page.images, vec![PageRect::new(5.0, 6.0, 7.0, 8.0)]);
        assert_eq!(page.lines().len(), 1);
        assert!(cache.contains(3));
    }

    #[test]
    fn first_insert_wins() {
        let mut cache = TextTokenCache::new();
        cache.insert(1, content("first"));
        let kept = cache.insert(1, content("second"));
        assert_eq!(kept.tokens[0].text, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = TextTokenCache::new();
        cache.insert(1, content("a"));
        cache.insert(2, content("b"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(1).is_none());
    }
}
