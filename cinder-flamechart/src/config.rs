//! Renderer configuration.

/// Size of the row atlas texture.
///
/// `width` is the texel resolution of every cached row and `height` is the
/// number of rows, which doubles as the LRU capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            width: 4096,
            height: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlamechartRendererOptions {
    /// Draw the deepest frames at the top.
    pub inverted: bool,
    /// Upper bound on rectangles per range-tree leaf.
    pub max_batch_size: usize,
}

impl Default for FlamechartRendererOptions {
    fn default() -> Self {
        Self {
            inverted: false,
            max_batch_size: 10_000,
        }
    }
}
