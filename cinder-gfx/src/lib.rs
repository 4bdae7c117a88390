//! cinder-gfx is a thin graphics layer over wgpu built around one promise:
//! GPU objects survive device loss.
//!
//! Every [`Material`], [`Texture`], [`VertexBuffer`] and [`RenderTarget`]
//! keeps a CPU mirror and the [`Context::generation`] it last built native
//! state under. When the generation moves on, the next use rebuilds the
//! object from its mirror, so renderers written against [`Context`] never
//! handle loss explicitly.
//!
//! ```no_run
//! use cinder_gfx::{Color, Context, ContextConfig, TextureFormat, WgpuContext};
//!
//! # fn main() -> Result<(), cinder_gfx::GraphicsError> {
//! let mut context = WgpuContext::new_blocking(ContextConfig::default())?;
//! let canvas = context.create_texture(TextureFormat::NEAREST_CLAMP, 64, 64, None);
//! context.set_default_target_texture(canvas);
//!
//! context.begin_frame();
//! context.clear(Color::WHITE);
//! context.end_frame();
//!
//! let pixels = context.read_default_target()?;
//! assert_eq!(pixels.len(), 64 * 64 * 4);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod error;
pub mod graphics;
pub mod logging;
pub mod math;
#[cfg(any(test, feature = "testing"))]
pub mod recording;
pub mod shader;
pub mod wgpu_backend;

pub use wgpu;

pub use crate::{
    error::GraphicsError,
    graphics::{
        AttributeType, BindingStats, BlendOperation, BlendState, Color, Context, Material,
        MaterialDescriptor, Primitive, Refresh, RenderTarget, ResourceId, Texture, TextureFilter,
        TextureFormat, TextureWrap, VertexAttribute, VertexBuffer, VertexFormat, Viewport,
        render_into,
    },
    logging::init_tracing,
    math::{AffineTransform, Rect, Vec2},
    wgpu_backend::{ContextConfig, WgpuContext},
};
