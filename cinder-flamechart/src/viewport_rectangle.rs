//! Highlights the visible part of a chart, for overview panes.

use cinder_gfx::{
    AttributeType, Color, Context, Material, MaterialDescriptor, Primitive, VertexBuffer,
    VertexFormat,
    math::{AffineTransform, Rect},
};
use encase::ShaderType;
use glam::{Vec2, Vec4};

use crate::{error::RenderError, theme::Theme, uniforms::UniformStaging};

const BORDER_WIDTH: f64 = 2.0;

#[derive(ShaderType)]
struct ViewportRectangleUniforms {
    inner_rect: Vec4,
    border_color: Vec4,
    outside_color: Vec4,
    viewport_origin: Vec2,
    border_width: f32,
}

/// Draws a border around a config-space rectangle and dims everything
/// outside it. The inside stays untouched.
pub struct ViewportRectangleRenderer<C: Context> {
    material: C::Material,
    quad: C::VertexBuffer,
    staging: UniformStaging,
    border_color: Color,
    outside_color: Color,
}

impl<C: Context> ViewportRectangleRenderer<C> {
    pub fn new(context: &mut C, theme: &dyn Theme) -> Result<Self, RenderError> {
        let staging = UniformStaging::new::<ViewportRectangleUniforms>();
        let material = context.create_material(MaterialDescriptor {
            label: "viewport rectangle",
            vertex_format: VertexFormat::new().add("position", AttributeType::Float, 2),
            source: include_str!("shaders/viewport_rectangle.wgsl"),
            uniform_size: staging.size(),
            texture_count: 0,
        })?;
        let quad =
            context.create_vertex_buffer_from_floats(&[-1.0, 1.0, 1.0, 1.0, -1.0, -1.0, 1.0, -1.0]);
        Ok(Self {
            material,
            quad,
            staging,
            border_color: theme.fg_secondary().with_alpha(0.8),
            outside_color: theme.bg_secondary().with_alpha(0.5),
        })
    }

    pub fn render(
        &mut self,
        context: &mut C,
        config_space_to_physical_view_space: &AffineTransform,
        config_space_viewport_rect: &Rect,
    ) {
        let origin = config_space_to_physical_view_space
            .transform_position(config_space_viewport_rect.origin);
        let size =
            config_space_to_physical_view_space.transform_vector(config_space_viewport_rect.size);
        let inner = Rect::from_xywh(
            origin.x.floor() + BORDER_WIDTH,
            origin.y.floor() + BORDER_WIDTH,
            size.x.floor() - 2.0 * BORDER_WIDTH,
            size.y.floor() - 2.0 * BORDER_WIDTH,
        );

        let viewport = context.viewport();
        let uniforms = ViewportRectangleUniforms {
            inner_rect: Vec4::new(
                inner.left() as f32,
                inner.top() as f32,
                inner.width() as f32,
                inner.height() as f32,
            ),
            border_color: Vec4::from_array(self.border_color.to_array()),
            outside_color: Vec4::from_array(self.outside_color.to_array()),
            viewport_origin: Vec2::new(viewport.x as f32, viewport.y as f32),
            border_width: BORDER_WIDTH as f32,
        };
        self.staging.write(&mut self.material, &uniforms);

        context.set_unpremultiplied_blend_state();
        context.draw(Primitive::TriangleStrip, &mut self.material, &mut self.quad);
        context.set_copy_blend_state();
    }

    pub fn free(&mut self) {
        self.material.free();
        self.quad.free();
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::{BlendState, Viewport, math::Vec2 as Point, recording::RecordingContext};

    use super::*;
    use crate::theme::LightTheme;

    #[test]
    fn inner_rect_is_inset_by_the_border() {
        let mut context = RecordingContext::new(200, 100);
        context.set_viewport(Viewport::new(10, 20, 100, 50));
        let mut renderer = ViewportRectangleRenderer::new(&mut context, &LightTheme).unwrap();

        let config_to_physical = AffineTransform::with_scale(Point::new(10.0, 50.0));
        renderer.render(
            &mut context,
            &config_to_physical,
            &Rect::from_xywh(2.0, 0.0, 5.0, 1.0),
        );

        let draw = context.draws().next().unwrap();
        assert_eq!(draw.blend, BlendState::UNPREMULTIPLIED);
        let uniforms: Vec<f32> = bytemuck::pod_collect_to_vec(&draw.uniforms);
        assert_eq!(&uniforms[0..4], &[22.0, 2.0, 46.0, 46.0]);
        assert_eq!(uniforms[7], 0.8);
        assert_eq!(uniforms[11], 0.5);
        assert_eq!(&uniforms[12..15], &[10.0, 20.0, 2.0]);
        assert!(context.blend_state().is_copy());
    }
}
