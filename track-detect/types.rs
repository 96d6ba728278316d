/// Integer-position corner candidate with its detector score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCorner {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}
