use serde::{Deserialize, Serialize};

/// A positioned text fragment in page space (origin bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub ends_line: bool,
}

impl TextToken {
    pub fn new(
        text: impl Into<String>,
        origin: (f32, f32),
        size: (f32, f32),
        ends_line: bool,
    ) -> Self {
        Self {
            text: text.into(),
            x: origin.0,
            y: origin.1,
            width: size.0,
            height: size.1,
            ends_line,
        }
    }

    pub fn bounds(&self) -> PageRect {
        PageRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// A contiguous run of tokens terminated by an end-of-line token or the end of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line<'a> {
    pub tokens: &'a [TextToken],
}

impl<'a> Line<'a> {
    pub fn text(&self) -> String {
        self.tokens.iter().map(|token| token.text.as_str()).collect()
    }
}

/// Splits a page's tokens into lines without copying them.
pub fn split_lines(tokens: &[TextToken]) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, token) in tokens.iter().enumerate() {
        if token.ends_line {
            lines.push(Line {
                tokens: &tokens[start..=idx],
            });
            start = idx + 1;
        }
    }
    if start < tokens.len() {
        lines.push(Line {
            tokens: &tokens[start..],
        });
    }
    lines
}

/// Axis-aligned box in page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// True when both axis ranges intersect with nonzero measure.
    pub fn overlaps(&self, other: &PageRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Area covered by an embedded raster image.
pub type ImageRegion = PageRect;

/// Highlight box in pixel space (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl HighlightRect {
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    PaintImage,
    ShowText,
    PaintPath,
    Other,
}

/// One drawing instruction reported by the extraction library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOperator {
    pub opcode: OpCode,
    pub args: Vec<f32>,
}

impl DrawOperator {
    pub fn new(opcode: OpCode, args: Vec<f32>) -> Self {
        Self { opcode, args }
    }

    pub fn paint_image(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(OpCode::PaintImage, vec![x, y, width, height])
    }

    /// Reads `(x, y, width, height)` from a paint-image operator.
    pub fn image_region(&self) -> Option<ImageRegion> {
        if self.opcode != OpCode::PaintImage {
            return None;
        }
        match self.args.as_slice() {
            [x, y, width, height, ..] => {
                let region = PageRect::new(*x, *y, *width, *height);
                region.is_well_formed().then_some(region)
            }
            _ => None,
        }
    }
}

/// Everything fetched for one page: its tokens, its drawing operators and its height in page units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub height: f32,
    pub tokens: Vec<TextToken>,
    pub operators: Vec<DrawOperator>,
}
