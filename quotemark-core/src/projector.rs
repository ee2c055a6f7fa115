use crate::model::{HighlightRect, ImageRegion, TextToken};

/// Maps matched tokens to pixel-space highlight boxes.
///
/// Each token box is flipped from the bottom-left page origin to a top-left
/// origin. Tokens whose page-space box overlaps an image region are dropped,
/// as are malformed boxes. Token order is preserved.
pub fn project<'a, I>(
    tokens: I,
    images: &[ImageRegion],
    page_height_px: f32,
) -> Vec<HighlightRect>
where
    I: IntoIterator<Item = &'a TextToken>,
{
    if !page_height_px.is_finite() {
        return Vec::new();
    }

    tokens
        .into_iter()
        .map(TextToken::bounds)
        .filter(|bounds| bounds.is_well_formed())
        .filter(|bounds| !images.iter().any(|image| bounds.overlaps(image)))
        .map(|bounds| HighlightRect {
            x: bounds.x,
            y: page_height_px - bounds.y - bounds.height,
            width: bounds.width,
            height: bounds.height,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageRect;

    fn flip(image: &ImageRegion, page_height: f32) -> HighlightRect {
        HighlightRect {
            x: image.x,
            y: page_height - image.y - image.height,
            width: image.width,
            height: image.height,
        }
    }

    fn intersects(a: &HighlightRect, b: &HighlightRect) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn flips_origin_to_top_left() {
        let token = TextToken::new("word", (10.0, 700.0), (50.0, 12.0), true);
        let rects = project([&token], &[], 792.0);
        assert_eq!(
            rects,
            vec![HighlightRect {
                x: 10.0,
                y: 80.0,
                width: 50.0,
                height: 12.0,
            }]
        );
    }

    #[test]
    fn drops_tokens_overlapping_images_and_keeps_order() {
        let tokens = vec![
            TextToken::new("a", (10.0, 700.0), (20.0, 12.0), false),
            TextToken::new("b", (100.0, 500.0), (20.0, 12.0), false),
            TextToken::new("c", (300.0, 700.0), (20.0, 12.0), true),
        ];
        let images = vec![PageRect::new(90.0, 450.0, 100.0, 100.0)];
        let rects = project(&tokens, &images, 792.0);
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].x, 10.0);
        assert_eq!(rects[1].x, 300.0);
    }

    #[test]
    fn edge_contact_with_image_is_not_overlap() {
        let token = TextToken::new("edge", (0.0, 0.0), (10.0, 10.0), true);
        let images = vec![PageRect::new(10.0, 0.0, 5.0, 5.0)];
        assert_eq!(project([&token], &images, 100.0).len(), 1);
    }

    #[test]
    fn malformed_input_yields_nothing() {
        let tokens = vec![
            TextToken::new("nan", (f32::NAN, 0.0), (1.0, 1.0), false),
            TextToken::new("negative", (0.0, 0.0), (-5.0, 1.0), false),
        ];
        assert!(project(&tokens, &[], 100.0).is_empty());
        assert!(project(std::iter::empty(), &[], 100.0).is_empty());
        let ok = TextToken::new("ok", (0.0, 0.0), (1.0, 1.0), false);
        assert!(project([&ok], &[], f32::INFINITY).is_empty());
    }

    #[test]
    fn surviving_rects_never_touch_any_image() {
        let page_height = 800.0;
        let images = vec![
            PageRect::new(50.0, 50.0, 200.0, 150.0),
            PageRect::new(400.0, 600.0, 120.0, 80.0),
        ];
        let mut tokens = Vec::new();
        for row in 0..40 {
            for col in 0..12 {
                tokens.push(TextToken::new(
                    "t",
                    (col as f32 * 47.5, row as f32 * 19.75),
                    (30.0, 11.0),
                    col == 11,
                ));
            }
        }

        let rects = project(&tokens, &images, page_height);
        assert!(!rects.is_empty());
        assert!(rects.len() < tokens.len());
        for rect in &rects {
            for image in &images {
                assert!(!intersects(rect, &flip(image, page_height)));
            }
        }
    }
}
