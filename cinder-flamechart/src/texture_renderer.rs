//! Blits a texel rectangle of one texture into the current viewport.

use cinder_gfx::{
    Context, Material, MaterialDescriptor, Primitive, Texture, VertexBuffer,
    math::{Rect, Vec2},
};
use encase::ShaderType;
use glam::Mat3;

use crate::{
    error::RenderError,
    space::{QUAD_STRIP, quad_position_transform, quad_uv_transform, quad_vertex_format, viewport_size},
    uniforms::{UniformStaging, to_mat3},
};

#[derive(ShaderType)]
struct TextureUniforms {
    uv_transform: Mat3,
    position_transform: Mat3,
}

pub struct TextureRenderer<C: Context> {
    material: C::Material,
    quad: C::VertexBuffer,
    staging: UniformStaging,
}

impl<C: Context> TextureRenderer<C> {
    pub fn new(context: &mut C) -> Result<Self, RenderError> {
        let staging = UniformStaging::new::<TextureUniforms>();
        let material = context.create_material(MaterialDescriptor {
            label: "texture",
            vertex_format: quad_vertex_format(),
            source: include_str!("shaders/texture.wgsl"),
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

    /// Copies the texels in `src_rect` onto `dst_rect`, both in pixels.
    pub fn render(
        &mut self,
        context: &mut C,
        texture: &mut C::Texture,
        src_rect: &Rect,
        dst_rect: &Rect,
    ) {
        let texture_size = Vec2::new(f64::from(texture.width()), f64::from(texture.height()));
        let uniforms = TextureUniforms {
            uv_transform: to_mat3(&quad_uv_transform(texture_size, src_rect)),
            position_transform: to_mat3(&quad_position_transform(viewport_size(context), dst_rect)),
        };
        self.staging.write(&mut self.material, &uniforms);

        context.bind_texture(&mut self.material, 0, texture);
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

    use super::*;

    #[test]
    fn samples_the_given_texture_with_a_strip() {
        let mut context = RecordingContext::new(64, 64);
        let mut renderer = TextureRenderer::new(&mut context).unwrap();
        let mut texture = context.create_texture(TextureFormat::NEAREST_CLAMP, 8, 8, None);

        renderer.render(
            &mut context,
            &mut texture,
            &Rect::from_xywh(0.0, 4.0, 8.0, 1.0),
            &Rect::from_xywh(0.0, 0.0, 64.0, 64.0),
        );

        let draws: Vec<_> = context.draws().collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].primitive, Primitive::TriangleStrip);
        assert_eq!(draws[0].textures, vec![texture.id()]);
        assert_eq!(draws[0].vertex_count, 4);

        // uv_transform maps v onto the single texel row 4/8..5/8.
        let uniforms: Vec<f32> = bytemuck::pod_collect_to_vec(&draws[0].uniforms);
        assert_eq!(uniforms[5], 0.125);
        assert_eq!(uniforms[9], 0.5);
    }
}
