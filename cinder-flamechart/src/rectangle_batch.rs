//! Solid rectangles drawn in bulk.

use cinder_gfx::{
    AttributeType, Color, Context, Material, MaterialDescriptor, Primitive, VertexBuffer,
    VertexFormat,
    math::{AffineTransform, Rect},
};
use encase::ShaderType;
use glam::Mat3;

use crate::{
    error::RenderError,
    space::{physical_to_ndc, viewport_size},
    uniforms::{UniformStaging, to_mat3},
};

const FLOATS_PER_VERTEX: usize = 5;
const VERTICES_PER_RECT: usize = 6;

/// Rectangles in config space with one color each.
///
/// The vertex buffer is built on first use and dropped by every
/// [`add_rect`](Self::add_rect), so a batch is cheapest when filled once and
/// drawn many times.
pub struct RectangleBatch<C: Context> {
    rects: Vec<Rect>,
    colors: Vec<Color>,
    buffer: Option<C::VertexBuffer>,
}

impl<C: Context> Default for RectangleBatch<C> {
    fn default() -> Self {
        Self {
            rects: Vec::new(),
            colors: Vec::new(),
            buffer: None,
        }
    }
}

impl<C: Context> RectangleBatch<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    pub fn add_rect(&mut self, rect: Rect, color: Color) {
        self.rects.push(rect);
        self.colors.push(color);
        if let Some(mut buffer) = self.buffer.take() {
            buffer.free();
        }
    }

    /// The vertex buffer, rebuilt from all rectangles if a mutation dropped
    /// it.
    pub fn buffer(&mut self, context: &mut C) -> &mut C::VertexBuffer {
        let (rects, colors) = (&self.rects, &self.colors);
        self.buffer.get_or_insert_with(|| {
            context.create_vertex_buffer_from_floats(&vertex_floats(rects, colors))
        })
    }

    pub fn free(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.free();
        }
    }
}

/// Two triangles per rectangle, each vertex `x, y, r, g, b`.
fn vertex_floats(rects: &[Rect], colors: &[Color]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(rects.len() * VERTICES_PER_RECT * FLOATS_PER_VERTEX);
    for (rect, color) in rects.iter().zip(colors) {
        let corners = [
            rect.top_left(),
            rect.bottom_left(),
            rect.top_right(),
            rect.bottom_left(),
            rect.top_right(),
            rect.bottom_right(),
        ];
        for corner in corners {
            floats.extend_from_slice(&[
                corner.x as f32,
                corner.y as f32,
                color.r,
                color.g,
                color.b,
            ]);
        }
    }
    floats
}

#[derive(ShaderType)]
struct RectangleBatchUniforms {
    config_space_to_ndc: Mat3,
}

pub struct RectangleBatchRenderer<C: Context> {
    material: C::Material,
    staging: UniformStaging,
}

impl<C: Context> RectangleBatchRenderer<C> {
    pub fn new(context: &mut C) -> Result<Self, RenderError> {
        let staging = UniformStaging::new::<RectangleBatchUniforms>();
        let material = context.create_material(MaterialDescriptor {
            label: "rectangle batch",
            vertex_format: VertexFormat::new()
                .add("config_space_pos", AttributeType::Float, 2)
                .add("color", AttributeType::Float, 3),
            source: include_str!("shaders/rectangle_batch.wgsl"),
            uniform_size: staging.size(),
            texture_count: 0,
        })?;
        Ok(Self { material, staging })
    }

    /// Draws `batch` so that `config_space_src_rect` lands on
    /// `physical_space_dst_rect` of the current viewport.
    pub fn render(
        &mut self,
        context: &mut C,
        batch: &mut RectangleBatch<C>,
        config_space_src_rect: &Rect,
        physical_space_dst_rect: &Rect,
    ) {
        let config_to_physical =
            AffineTransform::between_rects(config_space_src_rect, physical_space_dst_rect);
        let config_to_ndc = physical_to_ndc(viewport_size(context)).times(&config_to_physical);
        self.staging.write(
            &mut self.material,
            &RectangleBatchUniforms {
                config_space_to_ndc: to_mat3(&config_to_ndc),
            },
        );

        context.set_unpremultiplied_blend_state();
        let vertices = batch.buffer(context);
        context.draw(Primitive::Triangles, &mut self.material, vertices);
    }

    pub fn free(&mut self) {
        self.material.free();
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::{BlendState, recording::RecordingContext};

    use super::*;

    #[test]
    fn every_rect_becomes_six_vertices() {
        let mut context = RecordingContext::new(16, 16);
        let mut batch = RectangleBatch::<RecordingContext>::new();
        batch.add_rect(Rect::from_xywh(1.0, 2.0, 3.0, 4.0), Color::new(0.5, 0.25, 1.0, 1.0));

        let floats = batch.buffer(&mut context).floats();
        assert_eq!(floats.len(), VERTICES_PER_RECT * FLOATS_PER_VERTEX);
        assert_eq!(&floats[..5], &[1.0, 2.0, 0.5, 0.25, 1.0]);
        assert_eq!(&floats[25..], &[4.0, 6.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn adding_a_rect_rebuilds_the_buffer_lazily() {
        let mut context = RecordingContext::new(16, 16);
        let mut batch = RectangleBatch::<RecordingContext>::new();
        batch.add_rect(Rect::UNIT, Color::WHITE);
        let first = batch.buffer(&mut context).id();
        assert_eq!(batch.buffer(&mut context).id(), first);

        batch.add_rect(Rect::UNIT, Color::BLACK);
        let second = batch.buffer(&mut context);
        assert_ne!(second.id(), first);
        assert_eq!(second.byte_count(), 2 * VERTICES_PER_RECT * FLOATS_PER_VERTEX * 4);
    }

    #[test]
    fn draws_with_straight_alpha_into_the_dst_rect() {
        let mut context = RecordingContext::new(100, 50);
        let mut renderer = RectangleBatchRenderer::new(&mut context).unwrap();
        let mut batch = RectangleBatch::new();
        batch.add_rect(Rect::from_xywh(0.0, 0.0, 10.0, 1.0), Color::WHITE);

        renderer.render(
            &mut context,
            &mut batch,
            &Rect::from_xywh(0.0, 0.0, 10.0, 1.0),
            &Rect::from_xywh(0.0, 0.0, 100.0, 50.0),
        );

        let draws: Vec<_> = context.draws().collect();
        assert_eq!(draws.len(), 1);
        let draw = draws[0];
        assert_eq!(draw.blend, BlendState::UNPREMULTIPLIED);
        assert_eq!(draw.primitive, Primitive::Triangles);
        assert_eq!(draw.vertex_count, 6);

        // Column-major mat3 with 16-byte columns: x scale, y scale, translation.
        let uniforms: Vec<f32> = bytemuck::pod_collect_to_vec(&draw.uniforms);
        assert_eq!(uniforms[0], 0.2);
        assert_eq!(uniforms[5], -2.0);
        assert_eq!(&uniforms[8..10], &[-1.0, 1.0]);
    }
}
