//! One large texture whose rows cache rendered content.
//!
//! Each key owns at most one texel row. Rows are handed out in order until
//! the texture is full, after which the least recently used key gives up its
//! row. The atlas never clears a row on eviction: every write clears the row
//! right before the caller draws into it.

use std::{hash::Hash, num::NonZeroUsize};

use cinder_gfx::{
    Color, Context, RenderTarget, TextureFormat,
    math::Rect,
};
use tracing::debug;

use crate::{
    config::AtlasConfig,
    error::RenderError,
    lru::LruCache,
    rectangle_batch::{RectangleBatch, RectangleBatchRenderer},
    texture_renderer::TextureRenderer,
};

pub struct RowAtlas<C: Context, K> {
    target: C::RenderTarget,
    rows: LruCache<K, u32>,
    clear_line_batch: RectangleBatch<C>,
    width: u32,
    generation: u64,
}

impl<C: Context, K: Hash + Eq + Clone> RowAtlas<C, K> {
    pub fn new(context: &mut C, config: AtlasConfig) -> Result<Self, RenderError> {
        let AtlasConfig { width, height } = config;
        let capacity = NonZeroUsize::new(height as usize)
            .filter(|_| width > 0)
            .ok_or(RenderError::EmptyAtlas { width, height })?;

        let texture = context.create_texture(TextureFormat::NEAREST_CLAMP, width, height, None);
        let target = context.create_render_target(texture);
        let mut clear_line_batch = RectangleBatch::new();
        clear_line_batch.add_rect(Rect::UNIT, Color::TRANSPARENT);

        Ok(Self {
            target,
            rows: LruCache::new(capacity),
            clear_line_batch,
            width,
            generation: context.generation(),
        })
    }

    /// Whether `key` has a row, without touching its recency.
    pub fn has(&self, key: &K) -> bool {
        self.rows.has(key)
    }

    /// Texels per row.
    pub fn resolution(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub fn capacity(&self) -> usize {
        self.rows.capacity()
    }

    /// Gives every key without a row one, clears it and lets `render` draw
    /// into it. `render` receives the row's rectangle in atlas pixels.
    ///
    /// Keys are processed in order. Each lookup refreshes the key's recency,
    /// so passing more keys than [`capacity`](Self::capacity) evicts rows
    /// written earlier in the same call.
    pub fn write_to_atlas_if_needed<F>(
        &mut self,
        context: &mut C,
        rectangles: &mut RectangleBatchRenderer<C>,
        keys: &[K],
        mut render: F,
    ) where
        F: FnMut(&mut C, &mut RectangleBatchRenderer<C>, &Rect, &K),
    {
        self.sync_generation(context);

        let mut bound = false;
        for key in keys {
            if self.rows.get(key).is_some() {
                continue;
            }
            let row = self.allocate_row();
            self.rows.insert(key.clone(), row);

            if !bound {
                context.set_render_target(Some(&mut self.target));
                bound = true;
            }
            let dst = Rect::from_xywh(0.0, f64::from(row), f64::from(self.width), 1.0);
            rectangles.render(context, &mut self.clear_line_batch, &Rect::UNIT, &dst);
            render(context, rectangles, &dst, key);
        }
        if bound {
            context.set_render_target(None);
        }
    }

    /// Blits the row of `key` into `dst_rect` of the current viewport.
    /// Returns false, drawing nothing, when `key` has no row.
    pub fn render_via_atlas(
        &mut self,
        context: &mut C,
        textures: &mut TextureRenderer<C>,
        key: &K,
        dst_rect: &Rect,
    ) -> bool {
        self.sync_generation(context);

        let Some(&row) = self.rows.get(key) else {
            return false;
        };
        let src = Rect::from_xywh(0.0, f64::from(row), f64::from(self.width), 1.0);
        textures.render(context, self.target.texture_mut(), &src, dst_rect);
        true
    }

    pub fn free(&mut self) {
        self.target.free();
        self.clear_line_batch.free();
        self.rows.clear();
    }

    fn allocate_row(&mut self) -> u32 {
        if self.rows.size() < self.rows.capacity() {
            let row = self.rows.size() as u32;
            debug!(row, "allocating atlas row");
            return row;
        }
        match self.rows.remove_lru() {
            Some((_, row)) => {
                debug!(row, "reusing least recently used atlas row");
                row
            }
            None => 0,
        }
    }

    /// Row contents live only on the GPU, so a new generation forgets them.
    fn sync_generation(&mut self, context: &C) {
        let generation = context.generation();
        if generation != self.generation {
            debug!(
                rows = self.rows.size(),
                generation, "graphics generation changed, dropping atlas rows"
            );
            self.rows.clear();
            self.generation = generation;
        }
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::{
        Texture,
        recording::{Command, RecordingContext},
    };

    use super::*;

    struct Fixture {
        context: RecordingContext,
        rectangles: RectangleBatchRenderer<RecordingContext>,
        textures: TextureRenderer<RecordingContext>,
        atlas: RowAtlas<RecordingContext, &'static str>,
    }

    fn fixture(rows: u32) -> Fixture {
        let mut context = RecordingContext::new(32, 32);
        let rectangles = RectangleBatchRenderer::new(&mut context).unwrap();
        let textures = TextureRenderer::new(&mut context).unwrap();
        let atlas = RowAtlas::new(
            &mut context,
            AtlasConfig {
                width: 16,
                height: rows,
            },
        )
        .unwrap();
        Fixture {
            context,
            rectangles,
            textures,
            atlas,
        }
    }

    impl Fixture {
        /// Writes `keys` and returns the row rectangles handed to the callback.
        fn write(&mut self, keys: &[&'static str]) -> Vec<(&'static str, Rect)> {
            let mut written = Vec::new();
            self.atlas.write_to_atlas_if_needed(
                &mut self.context,
                &mut self.rectangles,
                keys,
                |_, _, dst, key| written.push((*key, *dst)),
            );
            written
        }
    }

    #[test]
    fn rows_are_allocated_in_order_then_recycled() {
        let mut f = fixture(2);
        assert_eq!(
            f.write(&["a", "b"]),
            vec![
                ("a", Rect::from_xywh(0.0, 0.0, 16.0, 1.0)),
                ("b", Rect::from_xywh(0.0, 1.0, 16.0, 1.0)),
            ]
        );

        // "a" was touched last, so "b" loses its row.
        assert!(f.write(&["a"]).is_empty());
        assert_eq!(f.write(&["c"]), vec![("c", Rect::from_xywh(0.0, 1.0, 16.0, 1.0))]);
        assert!(f.atlas.has(&"a"));
        assert!(!f.atlas.has(&"b"));
    }

    #[test]
    fn every_write_clears_its_row_inside_the_atlas() {
        let mut f = fixture(4);
        f.write(&["a"]);

        let atlas_texture = f.atlas.target.texture().id();
        let draws: Vec<_> = f.context.draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].target, Some(atlas_texture));
        assert_eq!(draws[0].material, "rectangle batch");
        assert_eq!(&draws[0].vertex_floats()[2..5], &[0.0, 0.0, 0.0]);

        // Nothing to write means the atlas is never bound.
        f.context.take_commands();
        f.write(&["a"]);
        assert!(f.context.commands().is_empty());
    }

    #[test]
    fn written_rows_render_back_and_missing_ones_do_not() {
        let mut f = fixture(4);
        f.write(&["a"]);
        f.context.take_commands();

        let dst = Rect::from_xywh(0.0, 0.0, 32.0, 4.0);
        assert!(f.atlas.render_via_atlas(&mut f.context, &mut f.textures, &"a", &dst));
        assert!(!f.atlas.render_via_atlas(&mut f.context, &mut f.textures, &"z", &dst));

        let commands = f.context.commands();
        assert_eq!(commands.len(), 1);
        let Command::Draw(draw) = &commands[0] else {
            panic!("expected a draw, got {:?}", commands[0]);
        };
        assert_eq!(draw.material, "texture");
        assert_eq!(draw.target, None);
        assert_eq!(draw.textures, vec![f.atlas.target.texture().id()]);
    }

    #[test]
    fn context_loss_forgets_every_row() {
        let mut f = fixture(4);
        f.write(&["a", "b"]);
        f.context.simulate_context_loss();

        let dst = Rect::from_xywh(0.0, 0.0, 32.0, 4.0);
        assert!(!f.atlas.render_via_atlas(&mut f.context, &mut f.textures, &"a", &dst));
        assert!(!f.atlas.has(&"b"));
        assert_eq!(f.write(&["b"]), vec![("b", Rect::from_xywh(0.0, 0.0, 16.0, 1.0))]);
    }

    #[test]
    fn oversized_batches_evict_their_own_rows() {
        let mut f = fixture(2);
        let written = f.write(&["a", "b", "c"]);
        assert_eq!(written.len(), 3);
        assert_eq!(written[2].1.top(), 0.0);
        assert!(!f.atlas.has(&"a"));
        assert_eq!(f.atlas.capacity(), 2);
        assert_eq!(f.atlas.resolution(), 16);
    }

    #[test]
    fn zero_sized_atlases_are_rejected() {
        let mut context = RecordingContext::new(1, 1);
        let result = RowAtlas::<RecordingContext, u32>::new(
            &mut context,
            AtlasConfig {
                width: 0,
                height: 8,
            },
        );
        assert!(matches!(
            result,
            Err(RenderError::EmptyAtlas {
                width: 0,
                height: 8
            })
        ));
    }
}
