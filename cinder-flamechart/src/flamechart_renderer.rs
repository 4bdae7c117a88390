//! Draws a [`Flamechart`] through the row atlas.
//!
//! Rows of the chart are cut into power-of-two tiles per zoom level. Each
//! frame the renderer picks the coarsest zoom level whose tiles are narrower
//! on screen than an atlas row, makes sure every visible tile has an atlas
//! row, blits those rows into an intermediate rect-info texture and finally
//! colors that texture with the color pass.

use std::sync::atomic::{AtomicU32, Ordering};

use cinder_gfx::{
    Color, Context, RenderTarget, Texture, TextureFormat,
    math::{AffineTransform, Rect, Vec2},
    render_into,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    canvas::CanvasRenderers,
    config::FlamechartRendererOptions,
    model::{Flamechart, FlamechartFrame, MAX_COLOR_BUCKET},
    range_tree::{RangeTreeInterior, RangeTreeLeaf, RangeTreeNode},
    rectangle_batch::RectangleBatch,
    row_atlas::RowAtlas,
};

/// Tiles per row stop doubling here; beyond it tile indices lose precision.
const MAX_ZOOM_LEVEL: u32 = 52;

/// Structural identity of one atlas tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowAtlasKeyInfo {
    pub stack_depth: usize,
    pub zoom_level: u32,
    pub index: i64,
}

/// Interned handle for a [`RowAtlasKeyInfo`]. Equal infos interned by the
/// same renderer share a handle; handles from different renderers never
/// compare equal, so several renderers can share one atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlamechartRowAtlasKey {
    owner: u32,
    slot: u32,
}

/// Append-only arena of key infos.
struct KeyInterner {
    owner: u32,
    infos: Vec<RowAtlasKeyInfo>,
    slots: FxHashMap<RowAtlasKeyInfo, u32>,
}

impl KeyInterner {
    fn new() -> Self {
        static NEXT_OWNER: AtomicU32 = AtomicU32::new(0);
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            infos: Vec::new(),
            slots: FxHashMap::default(),
        }
    }

    fn intern(&mut self, info: RowAtlasKeyInfo) -> FlamechartRowAtlasKey {
        let infos = &mut self.infos;
        let slot = *self.slots.entry(info).or_insert_with(|| {
            infos.push(info);
            (infos.len() - 1) as u32
        });
        FlamechartRowAtlasKey {
            owner: self.owner,
            slot,
        }
    }

    fn info(&self, key: &FlamechartRowAtlasKey) -> Option<&RowAtlasKeyInfo> {
        if key.owner != self.owner {
            return None;
        }
        self.infos.get(key.slot as usize)
    }
}

/// Config-space placement of tiles.
#[derive(Debug, Clone, Copy)]
struct TileGeometry {
    total_weight: f64,
    layer_count: usize,
    inverted: bool,
}

impl TileGeometry {
    fn row_for_depth(&self, stack_depth: usize) -> usize {
        if self.inverted {
            self.layer_count.saturating_sub(stack_depth + 1)
        } else {
            stack_depth
        }
    }

    fn bounds(&self, info: &RowAtlasKeyInfo) -> Rect {
        let width = self.total_weight / 2f64.powi(info.zoom_level as i32);
        Rect::from_xywh(
            width * info.index as f64,
            self.row_for_depth(info.stack_depth) as f64,
            width,
            1.0,
        )
    }
}

/// Rect-info color of the `index_in_row`-th rectangle of a row. Every channel
/// is offset by one so that zero stays free for "nothing drawn". See
/// [`MAX_COLOR_BUCKET`].
pub fn rect_info_color(index_in_row: usize, stack_depth: usize, color_bucket: u8) -> Color {
    Color::new(
        (1 + index_in_row % 255) as f32 / 255.0,
        (1 + stack_depth % 255) as f32 / 255.0,
        (1 + usize::from(color_bucket.min(MAX_COLOR_BUCKET))) as f32 / 255.0,
        1.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlamechartRendererProps {
    pub config_space_src_rect: Rect,
    pub physical_space_dst_rect: Rect,
    pub render_outlines: bool,
}

pub struct FlamechartRenderer<C: Context> {
    layers: Vec<Option<RangeTreeNode<C>>>,
    keys: KeyInterner,
    geometry: TileGeometry,
    rect_info: Option<C::RenderTarget>,
}

impl<C: Context> FlamechartRenderer<C> {
    /// Indexes every layer of `flamechart`. No GPU work happens until the
    /// first [`render`](Self::render).
    pub fn new(flamechart: &Flamechart, options: FlamechartRendererOptions) -> Self {
        let layer_count = flamechart.layers().len();
        let geometry = TileGeometry {
            total_weight: flamechart.total_weight(),
            layer_count,
            inverted: options.inverted,
        };
        let max_batch_size = options.max_batch_size.max(1);
        let layers = flamechart
            .layers()
            .iter()
            .enumerate()
            .map(|(stack_depth, frames)| {
                let y = geometry.row_for_depth(stack_depth) as f64;
                build_layer(frames, y, stack_depth, max_batch_size)
            })
            .collect();

        Self {
            layers,
            keys: KeyInterner::new(),
            geometry,
            rect_info: None,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// The range tree of one stack depth, `None` for an empty layer.
    pub fn layer_mut(&mut self, stack_depth: usize) -> Option<&mut RangeTreeNode<C>> {
        self.layers.get_mut(stack_depth)?.as_mut()
    }

    pub fn config_space_bounds_for_key(&self, key: &FlamechartRowAtlasKey) -> Option<Rect> {
        self.keys.info(key).map(|info| self.geometry.bounds(info))
    }

    pub fn key_info(&self, key: &FlamechartRowAtlasKey) -> Option<RowAtlasKeyInfo> {
        self.keys.info(key).copied()
    }

    /// The first zoom level whose tiles span fewer physical pixels than
    /// `resolution`.
    pub fn select_zoom_level(&self, config_to_physical: &AffineTransform, resolution: u32) -> u32 {
        (0..=MAX_ZOOM_LEVEL)
            .find(|&zoom_level| {
                let bounds = self.geometry.bounds(&RowAtlasKeyInfo {
                    stack_depth: 0,
                    zoom_level,
                    index: 0,
                });
                config_to_physical.transform_rect(&bounds).width() < f64::from(resolution)
            })
            .unwrap_or(MAX_ZOOM_LEVEL)
    }

    /// Interns the tiles at `zoom_level` that overlap `src`, row by row from
    /// the top.
    fn visible_keys(&mut self, src: &Rect, zoom_level: u32) -> Vec<FlamechartRowAtlasKey> {
        let layer_count = self.layers.len();
        let top = src.top().floor().max(0.0) as usize;
        let bottom = src.bottom().ceil().min(layer_count as f64).max(0.0) as usize;

        let tiles = 2f64.powi(zoom_level as i32);
        let last_tile = tiles as i64 - 1;
        let total_weight = self.geometry.total_weight;
        let left = ((tiles * src.left() / total_weight).floor() as i64).max(0);
        let right = ((tiles * src.right() / total_weight).ceil() as i64).min(last_tile);

        let mut keys = Vec::new();
        for y in top..bottom {
            let stack_depth = self.geometry.row_for_depth(y);
            for index in left..=right {
                let info = RowAtlasKeyInfo {
                    stack_depth,
                    zoom_level,
                    index,
                };
                if !self.geometry.bounds(&info).has_intersection_with(src) {
                    continue;
                }
                keys.push(self.keys.intern(info));
            }
        }
        keys
    }

    /// Draws `props.config_space_src_rect` of the chart into
    /// `props.physical_space_dst_rect` of the currently bound target.
    ///
    /// Binds other targets along the way and leaves the default target bound.
    pub fn render(
        &mut self,
        context: &mut C,
        atlas: &mut RowAtlas<C, FlamechartRowAtlasKey>,
        renderers: &mut CanvasRenderers<C>,
        props: &FlamechartRendererProps,
    ) {
        let src = props.config_space_src_rect;
        let dst = props.physical_space_dst_rect;
        if src.is_empty() {
            return;
        }
        let width = dst.width().round().max(0.0) as u32;
        let height = dst.height().round().max(0.0) as u32;
        if width == 0 || height == 0 {
            return;
        }

        let config_to_physical = AffineTransform::between_rects(&src, &dst);
        let zoom_level = self.select_zoom_level(&config_to_physical, atlas.resolution());
        let keys = self.visible_keys(&src, zoom_level);

        let (cached, uncached) = keys.split_at(keys.len().min(atlas.capacity()));
        debug!(
            zoom_level,
            cached = cached.len(),
            uncached = uncached.len(),
            "rendering flamechart"
        );

        let Self {
            layers,
            keys: interner,
            geometry,
            rect_info,
        } = self;

        atlas.write_to_atlas_if_needed(
            context,
            &mut renderers.rectangle_batch,
            cached,
            |context, rectangles, texture_dst, key| {
                let Some(info) = interner.info(key) else {
                    return;
                };
                let bounds = geometry.bounds(info);
                if let Some(Some(layer)) = layers.get_mut(info.stack_depth) {
                    layer.for_each_leaf_within_bounds(&bounds, |leaf| {
                        rectangles.render(context, leaf.batch_mut(), &bounds, texture_dst);
                    });
                }
            },
        );

        let target = rect_info_target(rect_info, context, width, height);
        render_into(context, target, |context| {
            context.clear(Color::TRANSPARENT);

            let viewport = context.viewport();
            let viewport_rect =
                Rect::from_xywh(0.0, 0.0, f64::from(viewport.width), f64::from(viewport.height));
            let config_to_viewport = AffineTransform::between_rects(&src, &viewport_rect);

            for key in cached {
                if let Some(info) = interner.info(key) {
                    let physical = config_to_viewport.transform_rect(&geometry.bounds(info));
                    atlas.render_via_atlas(context, &mut renderers.texture, key, &physical);
                }
            }

            for key in uncached {
                let Some(info) = interner.info(key) else {
                    continue;
                };
                let bounds = geometry.bounds(info);
                let physical = config_to_viewport.transform_rect(&bounds);
                if let Some(Some(layer)) = layers.get_mut(info.stack_depth) {
                    layer.for_each_leaf_within_bounds(&bounds, |leaf| {
                        renderers.rectangle_batch.render(
                            context,
                            leaf.batch_mut(),
                            &bounds,
                            &physical,
                        );
                    });
                }
            }
        });

        let texture = target.texture_mut();
        let src_texels = Rect::new(
            Vec2::ZERO,
            Vec2::new(f64::from(texture.width()), f64::from(texture.height())),
        );
        renderers
            .color_pass
            .render(context, texture, &src_texels, &dst, props.render_outlines);
    }

    /// Releases all GPU state. The renderer recreates it on the next render.
    pub fn free(&mut self) {
        for layer in self.layers.iter_mut().flatten() {
            layer.free();
        }
        if let Some(mut target) = self.rect_info.take() {
            target.free();
        }
    }
}

/// The rect-info target, created on first use and resized in place after.
fn rect_info_target<'a, C: Context>(
    slot: &'a mut Option<C::RenderTarget>,
    context: &mut C,
    width: u32,
    height: u32,
) -> &'a mut C::RenderTarget {
    let target = slot.get_or_insert_with(|| {
        let texture = context.create_texture(TextureFormat::NEAREST_CLAMP, width, height, None);
        context.create_render_target(texture)
    });
    let texture = target.texture_mut();
    if texture.width() != width || texture.height() != height {
        debug!(width, height, "resizing rect-info texture");
        texture.resize(width, height, None);
    }
    target
}

/// Splits one layer into leaves of at most `max_batch_size` rectangles.
fn build_layer<C: Context>(
    frames: &[FlamechartFrame],
    y: f64,
    stack_depth: usize,
    max_batch_size: usize,
) -> Option<RangeTreeNode<C>> {
    if frames.is_empty() {
        return None;
    }

    let mut leaves = Vec::new();
    let mut batch = RectangleBatch::new();
    let mut bounds: Option<Rect> = None;
    let mut preceding = 0;

    for (index_in_row, frame) in frames.iter().enumerate() {
        let rect = Rect::from_xywh(frame.start, y, frame.width(), 1.0);
        bounds = Some(bounds.map_or(rect, |bounds| bounds.union_with(&rect)));
        batch.add_rect(
            rect,
            rect_info_color(index_in_row, stack_depth, frame.color_bucket),
        );

        if batch.rect_count() >= max_batch_size {
            let count = batch.rect_count();
            let full = std::mem::take(&mut batch);
            leaves.push(RangeTreeNode::Leaf(RangeTreeLeaf::new(
                full,
                bounds.take().unwrap_or(Rect::EMPTY),
                preceding,
            )));
            preceding += count;
        }
    }
    if batch.rect_count() > 0 {
        leaves.push(RangeTreeNode::Leaf(RangeTreeLeaf::new(
            batch,
            bounds.unwrap_or(Rect::EMPTY),
            preceding,
        )));
    }

    Some(RangeTreeNode::Interior(RangeTreeInterior::new(leaves)))
}
