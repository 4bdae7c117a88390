//! Turns the rect-info texture into visible, outlined colors.
//!
//! Every texel of the rect-info texture encodes which rectangle covered it:
//! red is the index within its row, green the stack depth and blue the color
//! bucket, each offset by one so that zero means "nothing drawn". The pass
//! colors each pixel by its bucket through the theme and, with outlines on,
//! drops pixels where exactly one neighbour on an axis belongs to a different
//! rectangle.

use cinder_gfx::{
    Context, Material, MaterialDescriptor, Primitive, Texture, VertexBuffer,
    math::{Rect, Vec2},
};
use encase::ShaderType;
use glam::Mat3;

use crate::{
    error::RenderError,
    space::{QUAD_STRIP, quad_position_transform, quad_uv_transform, quad_vertex_format, viewport_size},
    theme::{COLOR_HELPERS_WGSL, Theme},
    uniforms::{UniformStaging, to_mat3},
};

const COLOR_PASS_WGSL: &str = include_str!("shaders/color_pass.wgsl");

#[derive(ShaderType)]
struct ColorPassUniforms {
    uv_transform: Mat3,
    position_transform: Mat3,
    render_outlines: u32,
}

pub struct FlamechartColorPassRenderer<C: Context> {
    material: C::Material,
    quad: C::VertexBuffer,
    staging: UniformStaging,
}

impl<C: Context> FlamechartColorPassRenderer<C> {
    pub fn new(context: &mut C, theme: &dyn Theme) -> Result<Self, RenderError> {
        let staging = UniformStaging::new::<ColorPassUniforms>();
        let source = [
            COLOR_HELPERS_WGSL,
            theme.color_for_bucket_wgsl(),
            COLOR_PASS_WGSL,
        ]
        .concat();
        let material = context.create_material(MaterialDescriptor {
            label: "flamechart color pass",
            vertex_format: quad_vertex_format(),
            source: &source,
            uniform_size: staging.size(),
            texture_count: 1,
        })?;
        let quad = context.create_vertex_buffer_from_floats(&QUAD_STRIP);
        Ok(Self {
            material,
            quad,
            staging,
        })
    }

    /// Colors `src_rect` of `rect_info` into `dst_rect` of the current
    /// viewport.
    pub fn render(
        &mut self,
        context: &mut C,
        rect_info: &mut C::Texture,
        src_rect: &Rect,
        dst_rect: &Rect,
        render_outlines: bool,
    ) {
        let texture_size = Vec2::new(f64::from(rect_info.width()), f64::from(rect_info.height()));
        let uniforms = ColorPassUniforms {
            uv_transform: to_mat3(&quad_uv_transform(texture_size, src_rect)),
            position_transform: to_mat3(&quad_position_transform(viewport_size(context), dst_rect)),
            render_outlines: u32::from(render_outlines),
        };
        self.staging.write(&mut self.material, &uniforms);

        context.bind_texture(&mut self.material, 0, rect_info);
        context.set_unpremultiplied_blend_state();
        context.draw(Primitive::TriangleStrip, &mut self.material, &mut self.quad);
    }

    pub fn free(&mut self) {
        self.material.free();
        self.quad.free();
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::{TextureFormat, recording::RecordingContext};
    use rstest::rstest;

    use super::*;
    use crate::theme::{DarkTheme, LightTheme};

    #[rstest]
    #[case::light(&LightTheme as &dyn Theme)]
    #[case::dark(&DarkTheme as &dyn Theme)]
    fn theme_snippets_compile_into_the_pass(#[case] theme: &dyn Theme) {
        let mut context = RecordingContext::new(4, 4);
        assert!(FlamechartColorPassRenderer::new(&mut context, theme).is_ok());
    }

    #[test]
    fn outline_toggle_reaches_the_uniform_block() {
        let mut context = RecordingContext::new(10, 10);
        let mut renderer = FlamechartColorPassRenderer::new(&mut context, &LightTheme).unwrap();
        let mut rect_info = context.create_texture(TextureFormat::NEAREST_CLAMP, 10, 10, None);
        let full = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);

        renderer.render(&mut context, &mut rect_info, &full, &full, true);
        renderer.render(&mut context, &mut rect_info, &full, &full, false);

        let flags: Vec<u32> = context
            .draws()
            .map(|draw| bytemuck::pod_read_unaligned(&draw.uniforms[96..100]))
            .collect();
        assert_eq!(flags, vec![1, 0]);
    }
}
