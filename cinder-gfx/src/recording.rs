//! A [`Context`] that records commands instead of talking to a GPU.
//!
//! Objects follow the same generation contract as the wgpu backend, and
//! count how often they were rebuilt and what they uploaded, so renderer
//! logic can be tested without an adapter. Render passes are modelled the
//! same way too, so [`RecordingContext::binding_stats`] matches what the
//! wgpu backend would bind for the same commands. Materials are still validated
//! with naga.

use std::ops::Range;

use crate::{
    error::GraphicsError,
    graphics::{
        BindingStats, BlendState, Color, Context, Material, MaterialDescriptor, Primitive, Refresh,
        RenderTarget, ResourceId, Texture, TextureFormat, VertexBuffer, VertexFormat, Viewport,
    },
    shader,
};

/// The "device" side of a [`RecordingContext`].
#[derive(Debug, Default)]
pub struct RecordingState {
    generation: u64,
}

impl RecordingState {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Stand-in for a native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedNative {
    pub generation: u64,
}

fn refresh_native(
    native: &mut Option<RecordedNative>,
    generation: u64,
    rebuilds: &mut usize,
) -> bool {
    match native {
        Some(current) if current.generation == generation => false,
        _ => {
            *native = Some(RecordedNative { generation });
            *rebuilds += 1;
            true
        }
    }
}

#[derive(Debug)]
pub struct RecordingTexture {
    id: ResourceId,
    format: TextureFormat,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    native: Option<RecordedNative>,
    rebuilds: usize,
}

impl RecordingTexture {
    /// CPU mirror, zeroed when the texture was created without pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// How many times native state was (re)created.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

impl Refresh<RecordingState> for RecordingTexture {
    type Native = RecordedNative;

    fn refresh(&mut self, state: &mut RecordingState) -> &mut RecordedNative {
        refresh_native(&mut self.native, state.generation, &mut self.rebuilds);
        self.native.get_or_insert(RecordedNative {
            generation: state.generation,
        })
    }
}

impl Texture for RecordingTexture {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn set_format(&mut self, format: TextureFormat) {
        self.format = format;
    }

    fn resize(&mut self, width: u32, height: u32, pixels: Option<Vec<u8>>) {
        self.width = width;
        self.height = height;
        self.pixels = pixels.unwrap_or_else(|| zeroed_pixels(width, height));
        self.native = None;
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.map(|native| native.generation)
    }

    fn free(&mut self) {
        self.native = None;
    }
}

fn zeroed_pixels(width: u32, height: u32) -> Vec<u8> {
    vec![0; width as usize * height as usize * TextureFormat::BYTES_PER_PIXEL]
}

#[derive(Debug)]
pub struct RecordingVertexBuffer {
    id: ResourceId,
    bytes: Vec<u8>,
    dirty: Option<Range<usize>>,
    uploads: Vec<Range<usize>>,
    native: Option<RecordedNative>,
    rebuilds: usize,
}

impl RecordingVertexBuffer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn floats(&self) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(&self.bytes)
    }

    /// Byte ranges sent to the "device" by partial uploads, oldest first.
    /// Full uploads on rebuild are not listed.
    pub fn uploads(&self) -> &[Range<usize>] {
        &self.uploads
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

impl Refresh<RecordingState> for RecordingVertexBuffer {
    type Native = RecordedNative;

    fn refresh(&mut self, state: &mut RecordingState) -> &mut RecordedNative {
        if refresh_native(&mut self.native, state.generation, &mut self.rebuilds) {
            self.dirty = None;
        } else if let Some(dirty) = self.dirty.take() {
            self.uploads.push(dirty);
        }
        self.native.get_or_insert(RecordedNative {
            generation: state.generation,
        })
    }
}

impl VertexBuffer for RecordingVertexBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn byte_count(&self) -> usize {
        self.bytes.len()
    }

    fn upload(&mut self, bytes: &[u8], offset: usize) {
        let end = offset + bytes.len();
        assert!(end <= self.bytes.len(), "upload overflows the buffer");
        self.bytes[offset..end].copy_from_slice(bytes);
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(offset)..dirty.end.max(end),
            None => offset..end,
        });
    }

    fn move_bytes(&mut self, source_offset: usize, target_offset: usize, count: usize) {
        self.bytes
            .copy_within(source_offset..source_offset + count, target_offset);
        let end = target_offset + count;
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(target_offset)..dirty.end.max(end),
            None => target_offset..end,
        });
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.map(|native| native.generation)
    }

    fn free(&mut self) {
        self.native = None;
    }
}

#[derive(Debug)]
pub struct RecordingMaterial {
    id: ResourceId,
    label: String,
    vertex_format: VertexFormat,
    uniforms: Vec<u8>,
    uniforms_dirty: bool,
    uniform_uploads: usize,
    textures: Vec<Option<ResourceId>>,
    native: Option<RecordedNative>,
    rebuilds: usize,
}

impl RecordingMaterial {
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Number of draws that had to upload a changed uniform block.
    pub fn uniform_uploads(&self) -> usize {
        self.uniform_uploads
    }

    pub fn bound_texture(&self, slot: usize) -> Option<ResourceId> {
        self.textures.get(slot).copied().flatten()
    }
}

impl Refresh<RecordingState> for RecordingMaterial {
    type Native = RecordedNative;

    fn refresh(&mut self, state: &mut RecordingState) -> &mut RecordedNative {
        if refresh_native(&mut self.native, state.generation, &mut self.rebuilds) {
            self.uniforms_dirty = true;
        }
        self.native.get_or_insert(RecordedNative {
            generation: state.generation,
        })
    }
}

impl Material for RecordingMaterial {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn vertex_format(&self) -> &VertexFormat {
        &self.vertex_format
    }

    fn uniform_size(&self) -> usize {
        self.uniforms.len()
    }

    fn set_uniform_bytes(&mut self, bytes: &[u8]) {
        assert_eq!(bytes.len(), self.uniforms.len(), "uniform block size mismatch");
        if self.uniforms != bytes {
            self.uniforms.copy_from_slice(bytes);
            self.uniforms_dirty = true;
        }
    }

    fn uniform_bytes(&self) -> &[u8] {
        &self.uniforms
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.map(|native| native.generation)
    }

    fn free(&mut self) {
        self.native = None;
        self.textures.iter_mut().for_each(|slot| *slot = None);
    }
}

#[derive(Debug)]
pub struct RecordingRenderTarget {
    id: ResourceId,
    texture: RecordingTexture,
}

impl RenderTarget for RecordingRenderTarget {
    type Texture = RecordingTexture;

    fn id(&self) -> ResourceId {
        self.id
    }

    fn texture(&self) -> &RecordingTexture {
        &self.texture
    }

    fn texture_mut(&mut self) -> &mut RecordingTexture {
        &mut self.texture
    }

    fn set_color(&mut self, texture: RecordingTexture) -> RecordingTexture {
        std::mem::replace(&mut self.texture, texture)
    }

    fn free(&mut self) {
        self.texture.free();
    }
}

/// Where a command landed. `None` is the default target.
pub type TargetId = Option<ResourceId>;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub target: TargetId,
    pub target_size: (u32, u32),
    pub viewport: Viewport,
    pub blend: BlendState,
    pub primitive: Primitive,
    pub material: String,
    pub material_id: ResourceId,
    pub uniforms: Vec<u8>,
    pub textures: Vec<ResourceId>,
    pub vertex_buffer: ResourceId,
    pub vertices: Vec<u8>,
    pub vertex_count: usize,
}

impl DrawCall {
    pub fn vertex_floats(&self) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(&self.vertices)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Clear { target: TargetId, color: Color },
    Draw(DrawCall),
}

#[derive(Debug, Clone, Copy)]
struct Bound {
    id: TargetId,
    width: u32,
    height: u32,
    generation: u64,
}

/// The pass the wgpu backend would have open, with the state set on it.
#[derive(Debug, Clone, Copy)]
struct OpenPass {
    target: TargetId,
    viewport: Option<Viewport>,
    pipeline: Option<(ResourceId, BlendState, Primitive)>,
}

/// See the module docs.
#[derive(Debug)]
pub struct RecordingContext {
    state: RecordingState,
    default_size: (u32, u32),
    default_viewport: Viewport,
    current: Bound,
    viewport: Viewport,
    blend: BlendState,
    commands: Vec<Command>,
    pass: Option<OpenPass>,
    binding_stats: BindingStats,
    frames: usize,
}

impl RecordingContext {
    /// A context whose default target is `width` by `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        let viewport = Viewport::full(width, height);
        Self {
            state: RecordingState::default(),
            default_size: (width, height),
            default_viewport: viewport,
            current: Bound {
                id: None,
                width,
                height,
                generation: 0,
            },
            viewport,
            blend: BlendState::COPY,
            commands: Vec::new(),
            pass: None,
            binding_stats: BindingStats::default(),
            frames: 0,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            Command::Clear { .. } => None,
        })
    }

    /// Completed frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn binding_stats(&self) -> BindingStats {
        self.binding_stats
    }

    pub fn simulate_context_loss(&mut self) {
        self.pass = None;
        self.state.generation += 1;
        tracing::warn!(generation = self.state.generation, "graphics generation bumped");
    }

    fn begin_pass(&mut self, target: TargetId) -> &mut OpenPass {
        self.binding_stats.target_binds += 1;
        self.pass.insert(OpenPass {
            target,
            viewport: None,
            pipeline: None,
        })
    }

    fn live_target(&self) -> Option<TargetId> {
        if self.current.id.is_some() && self.current.generation != self.state.generation {
            return None;
        }
        Some(self.current.id)
    }
}

impl Context for RecordingContext {
    type Texture = RecordingTexture;
    type VertexBuffer = RecordingVertexBuffer;
    type Material = RecordingMaterial;
    type RenderTarget = RecordingRenderTarget;

    fn generation(&self) -> u64 {
        self.state.generation
    }

    fn create_material(
        &mut self,
        descriptor: MaterialDescriptor<'_>,
    ) -> Result<RecordingMaterial, GraphicsError> {
        shader::validate_material(&descriptor)?;
        Ok(RecordingMaterial {
            id: ResourceId::next(),
            label: descriptor.label.to_owned(),
            vertex_format: descriptor.vertex_format,
            uniforms: vec![0; descriptor.uniform_size.max(4)],
            uniforms_dirty: true,
            uniform_uploads: 0,
            textures: vec![None; descriptor.texture_count],
            native: None,
            rebuilds: 0,
        })
    }

    fn create_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<Vec<u8>>,
    ) -> RecordingTexture {
        RecordingTexture {
            id: ResourceId::next(),
            format,
            width,
            height,
            pixels: pixels.unwrap_or_else(|| zeroed_pixels(width, height)),
            native: None,
            rebuilds: 0,
        }
    }

    fn create_vertex_buffer(&mut self, byte_count: usize) -> RecordingVertexBuffer {
        RecordingVertexBuffer {
            id: ResourceId::next(),
            bytes: vec![0; byte_count],
            dirty: None,
            uploads: Vec::new(),
            native: None,
            rebuilds: 0,
        }
    }

    fn create_render_target(&mut self, texture: RecordingTexture) -> RecordingRenderTarget {
        RecordingRenderTarget {
            id: ResourceId::next(),
            texture,
        }
    }

    fn set_render_target(&mut self, target: Option<&mut RecordingRenderTarget>) {
        match target {
            Some(target) => {
                let texture = target.texture_mut();
                texture.refresh(&mut self.state);
                self.current = Bound {
                    id: Some(texture.id()),
                    width: texture.width(),
                    height: texture.height(),
                    generation: self.state.generation,
                };
                self.viewport = Viewport::full(texture.width(), texture.height());
            }
            None => {
                let (width, height) = self.default_size;
                self.current = Bound {
                    id: None,
                    width,
                    height,
                    generation: self.state.generation,
                };
                self.viewport = self.default_viewport;
            }
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        if self.current.id.is_none() {
            self.default_viewport = viewport;
        }
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn render_target_size(&self) -> (u32, u32) {
        (self.current.width, self.current.height)
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.blend = state;
    }

    fn blend_state(&self) -> BlendState {
        self.blend
    }

    fn bind_texture(
        &mut self,
        material: &mut RecordingMaterial,
        slot: usize,
        texture: &mut RecordingTexture,
    ) {
        assert_ne!(
            self.current.id,
            Some(texture.id()),
            "texture is sampled while bound as the render target"
        );
        texture.refresh(&mut self.state);
        material.textures[slot] = Some(texture.id());
    }

    fn clear(&mut self, color: Color) {
        if let Some(target) = self.live_target() {
            self.begin_pass(target);
            self.commands.push(Command::Clear { target, color });
        }
    }

    fn draw(
        &mut self,
        primitive: Primitive,
        material: &mut RecordingMaterial,
        vertices: &mut RecordingVertexBuffer,
    ) {
        let Some(target) = self.live_target() else {
            return;
        };
        let stride = material.vertex_format().stride();
        let vertex_count = vertices.byte_count().checked_div(stride).unwrap_or(0);
        if vertex_count == 0 {
            return;
        }
        assert!(
            material.textures.iter().all(Option::is_some),
            "material `{}` drawn with an unbound texture",
            material.label
        );
        vertices.refresh(&mut self.state);
        material.refresh(&mut self.state);
        if material.uniforms_dirty {
            material.uniforms_dirty = false;
            material.uniform_uploads += 1;
        }
        let mut pass = match self.pass.filter(|pass| pass.target == target) {
            Some(pass) => pass,
            None => *self.begin_pass(target),
        };
        if pass.viewport != Some(self.viewport) {
            pass.viewport = Some(self.viewport);
            self.binding_stats.viewport_binds += 1;
        }
        let pipeline = (material.id, self.blend, primitive);
        if pass.pipeline != Some(pipeline) {
            pass.pipeline = Some(pipeline);
            self.binding_stats.pipeline_binds += 1;
        }
        self.pass = Some(pass);
        self.commands.push(Command::Draw(DrawCall {
            target,
            target_size: (self.current.width, self.current.height),
            viewport: self.viewport,
            blend: self.blend,
            primitive,
            material: material.label.clone(),
            material_id: material.id,
            uniforms: material.uniforms.clone(),
            textures: material.textures.iter().flatten().copied().collect(),
            vertex_buffer: vertices.id,
            vertices: vertices.bytes.clone(),
            vertex_count,
        }));
    }

    fn begin_frame(&mut self) {
        self.set_render_target(None);
    }

    fn end_frame(&mut self) {
        self.pass = None;
        self.frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{AttributeType, render_into};

    const SOLID: &str = r#"
struct Uniforms {
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return uniforms.tint;
}
"#;

    fn solid_material(context: &mut RecordingContext) -> RecordingMaterial {
        context
            .create_material(MaterialDescriptor {
                label: "solid",
                vertex_format: VertexFormat::new().add("position", AttributeType::Float, 2),
                source: SOLID,
                uniform_size: 16,
                texture_count: 0,
            })
            .unwrap()
    }

    #[test]
    fn objects_rebuild_once_per_generation() {
        let mut context = RecordingContext::new(8, 8);
        let mut material = solid_material(&mut context);
        let mut vertices = context.create_vertex_buffer_from_floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(material.rebuilds(), 1);
        assert_eq!(vertices.rebuilds(), 1);
        assert_eq!(material.cached_generation(), Some(0));

        context.simulate_context_loss();
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(context.generation(), 1);
        assert_eq!(material.rebuilds(), 2);
        assert_eq!(vertices.rebuilds(), 2);
        assert_eq!(vertices.cached_generation(), Some(1));
        assert_eq!(context.draws().count(), 3);
    }

    #[test]
    fn partial_uploads_cover_only_dirty_bytes() {
        let mut context = RecordingContext::new(8, 8);
        let mut material = solid_material(&mut context);
        let mut vertices = context.create_vertex_buffer(24);
        context.draw(Primitive::Triangles, &mut material, &mut vertices);

        vertices.upload_floats(&[5.0], 4);
        vertices.upload_floats(&[6.0], 12);
        context.draw(Primitive::Triangles, &mut material, &mut vertices);

        assert_eq!(vertices.uploads(), &[4..16]);
        assert_eq!(vertices.floats()[1], 5.0);
        assert_eq!(vertices.floats()[3], 6.0);
    }

    #[test]
    fn identical_uniforms_stay_clean() {
        let mut context = RecordingContext::new(8, 8);
        let mut material = solid_material(&mut context);
        let mut vertices = context.create_vertex_buffer(24);
        let tint: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

        material.set_uniform_bytes(bytemuck::cast_slice(&tint));
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        material.set_uniform_bytes(bytemuck::cast_slice(&tint));
        context.draw(Primitive::Triangles, &mut material, &mut vertices);

        assert_eq!(material.uniform_uploads(), 1);
    }

    #[test]
    fn render_into_restores_default_target_and_viewport() {
        let mut context = RecordingContext::new(100, 50);
        context.set_viewport(Viewport::new(10, 10, 20, 20));
        let texture = context.create_texture(TextureFormat::NEAREST_CLAMP, 4, 2, None);
        let mut target = context.create_render_target(texture);
        let target_texture = target.texture().id();

        render_into(&mut context, &mut target, |context| {
            assert_eq!(context.viewport(), Viewport::full(4, 2));
            assert_eq!(context.render_target_size(), (4, 2));
            context.clear(Color::TRANSPARENT);
        });

        assert_eq!(context.viewport(), Viewport::new(10, 10, 20, 20));
        assert_eq!(context.render_target_size(), (100, 50));
        assert_eq!(
            context.commands(),
            &[Command::Clear {
                target: Some(target_texture),
                color: Color::TRANSPARENT,
            }]
        );
    }

    #[test]
    fn consecutive_draws_share_one_pass() {
        let mut context = RecordingContext::new(8, 8);
        let mut material = solid_material(&mut context);
        let mut vertices = context.create_vertex_buffer_from_floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

        for _ in 0..3 {
            context.draw(Primitive::Triangles, &mut material, &mut vertices);
        }
        assert_eq!(
            context.binding_stats(),
            BindingStats {
                target_binds: 1,
                viewport_binds: 1,
                pipeline_binds: 1,
            }
        );

        context.set_viewport(Viewport::new(0, 0, 4, 4));
        context.set_blend_state(BlendState::ADD);
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        let stats = context.binding_stats();
        assert_eq!(stats.target_binds, 1);
        assert_eq!(stats.viewport_binds, 2);
        assert_eq!(stats.pipeline_binds, 2);

        context.clear(Color::TRANSPARENT);
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        let stats = context.binding_stats();
        assert_eq!(stats.target_binds, 2);
        assert_eq!(stats.viewport_binds, 3);
        assert_eq!(stats.pipeline_binds, 3);
    }

    #[test]
    fn target_switches_and_generation_bumps_rebind() {
        let mut context = RecordingContext::new(8, 8);
        let mut material = solid_material(&mut context);
        let mut vertices = context.create_vertex_buffer_from_floats(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let texture = context.create_texture(TextureFormat::NEAREST_CLAMP, 4, 4, None);
        let mut target = context.create_render_target(texture);

        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        render_into(&mut context, &mut target, |context| {
            context.draw(Primitive::Triangles, &mut material, &mut vertices);
            context.draw(Primitive::Triangles, &mut material, &mut vertices);
        });
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(context.binding_stats().target_binds, 3);
        assert_eq!(context.binding_stats().pipeline_binds, 3);

        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(context.binding_stats().target_binds, 3);

        context.simulate_context_loss();
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(
            context.binding_stats(),
            BindingStats {
                target_binds: 4,
                viewport_binds: 4,
                pipeline_binds: 4,
            }
        );

        context.end_frame();
        context.begin_frame();
        context.draw(Primitive::Triangles, &mut material, &mut vertices);
        assert_eq!(context.binding_stats().target_binds, 5);
    }

    #[test]
    fn invalid_wgsl_is_a_compile_error() {
        let mut context = RecordingContext::new(8, 8);
        let result = context.create_material(MaterialDescriptor {
            label: "broken",
            vertex_format: VertexFormat::new(),
            source: "fn vs_main( {",
            uniform_size: 16,
            texture_count: 0,
        });
        assert!(matches!(
            result,
            Err(GraphicsError::ShaderCompile { label, .. }) if label == "broken"
        ));
    }
}
