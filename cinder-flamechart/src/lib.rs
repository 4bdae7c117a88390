//! GPU flamechart rendering.
//!
//! A [`FlamechartRenderer`] indexes each stack depth of a [`Flamechart`] in a
//! [`range_tree`], renders horizontal tiles of those rows into a shared
//! [`RowAtlas`] and composites the cached rows into the target every frame.
//! Rendering goes through [`cinder_gfx::Context`], so everything here runs
//! unchanged on the wgpu backend and on the in-memory recording backend used
//! by the tests.
//!
//! ```no_run
//! use cinder_flamechart::{
//!     AtlasConfig, CanvasRenderers, FlamechartBuilder, FlamechartRenderer,
//!     FlamechartRendererOptions, FlamechartRendererProps, LightTheme, RowAtlas,
//! };
//! use cinder_gfx::{Context, ContextConfig, Rect, TextureFormat, WgpuContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = FlamechartBuilder::new(60.0);
//! builder.open_frame(0, 0.0).close_frame(60.0)?;
//! let chart = builder.build()?;
//!
//! let mut context = WgpuContext::new_blocking(ContextConfig::default())?;
//! let canvas = context.create_texture(TextureFormat::NEAREST_CLAMP, 600, 10, None);
//! context.set_default_target_texture(canvas);
//!
//! let mut renderers = CanvasRenderers::new(&mut context, &LightTheme)?;
//! let mut atlas = RowAtlas::new(&mut context, AtlasConfig::default())?;
//! let mut renderer = FlamechartRenderer::new(&chart, FlamechartRendererOptions::default());
//!
//! context.begin_frame();
//! renderer.render(
//!     &mut context,
//!     &mut atlas,
//!     &mut renderers,
//!     &FlamechartRendererProps {
//!         config_space_src_rect: Rect::from_xywh(0.0, 0.0, 60.0, 1.0),
//!         physical_space_dst_rect: Rect::from_xywh(0.0, 0.0, 600.0, 10.0),
//!         render_outlines: true,
//!     },
//! );
//! context.end_frame();
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod canvas;
pub mod color_pass;
pub mod config;
pub mod error;
pub mod flamechart_renderer;
pub mod lru;
pub mod model;
pub mod range_tree;
pub mod rectangle_batch;
pub mod row_atlas;
pub mod space;
pub mod texture_renderer;
pub mod theme;
mod uniforms;
pub mod viewport_rectangle;

pub use crate::{
    canvas::{CanvasRenderers, with_viewport},
    color_pass::FlamechartColorPassRenderer,
    config::{AtlasConfig, FlamechartRendererOptions},
    error::{ModelError, RenderError},
    flamechart_renderer::{
        FlamechartRenderer, FlamechartRendererProps, FlamechartRowAtlasKey, RowAtlasKeyInfo,
        rect_info_color,
    },
    lru::LruCache,
    model::{Flamechart, FlamechartBuilder, FlamechartFrame, MAX_COLOR_BUCKET},
    rectangle_batch::{RectangleBatch, RectangleBatchRenderer},
    row_atlas::RowAtlas,
    texture_renderer::TextureRenderer,
    theme::{DarkTheme, LightTheme, Theme},
    viewport_rectangle::ViewportRectangleRenderer,
};
