//! Renderers shared by every chart drawn on one context.

use cinder_gfx::{Context, Viewport, math::Rect};

use crate::{
    color_pass::FlamechartColorPassRenderer, error::RenderError,
    rectangle_batch::RectangleBatchRenderer, texture_renderer::TextureRenderer, theme::Theme,
    viewport_rectangle::ViewportRectangleRenderer,
};

pub struct CanvasRenderers<C: Context> {
    pub rectangle_batch: RectangleBatchRenderer<C>,
    pub texture: TextureRenderer<C>,
    pub viewport_rectangle: ViewportRectangleRenderer<C>,
    pub color_pass: FlamechartColorPassRenderer<C>,
}

impl<C: Context> CanvasRenderers<C> {
    /// Compiles every material. Fails on the first shader that does not
    /// compile.
    pub fn new(context: &mut C, theme: &dyn Theme) -> Result<Self, RenderError> {
        Ok(Self {
            rectangle_batch: RectangleBatchRenderer::new(context)?,
            texture: TextureRenderer::new(context)?,
            viewport_rectangle: ViewportRectangleRenderer::new(context, theme)?,
            color_pass: FlamechartColorPassRenderer::new(context, theme)?,
        })
    }

    pub fn free(&mut self) {
        self.rectangle_batch.free();
        self.texture.free();
        self.viewport_rectangle.free();
        self.color_pass.free();
    }
}

/// Runs `f` with the viewport set to `physical_bounds`, then restores the
/// previous viewport.
pub fn with_viewport<C: Context, R>(
    context: &mut C,
    physical_bounds: &Rect,
    f: impl FnOnce(&mut C) -> R,
) -> R {
    let previous = context.viewport();
    let left = physical_bounds.left().max(0.0);
    let top = physical_bounds.top().max(0.0);
    context.set_viewport(Viewport::new(
        left.round() as u32,
        top.round() as u32,
        (physical_bounds.right() - left).max(0.0).round() as u32,
        (physical_bounds.bottom() - top).max(0.0).round() as u32,
    ));
    let result = f(context);
    context.set_viewport(previous);
    result
}
