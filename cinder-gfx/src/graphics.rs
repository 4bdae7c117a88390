//! Backend-agnostic graphics interface.
//!
//! A [`Context`] hands out four kinds of GPU objects: [`Material`]s,
//! [`Texture`]s, [`VertexBuffer`]s and [`RenderTarget`]s. None of them touch
//! the device when created. Each keeps a CPU-side mirror of everything needed
//! to rebuild it and caches its native handle together with the context
//! generation it was built under. Before an object is used, the context calls
//! [`Refresh::refresh`] on it; a generation mismatch recreates the handle and
//! re-uploads the mirror. The generation is bumped whenever the device is
//! lost and restored, so the whole pipeline survives device loss without any
//! caller-visible error.
//!
//! Raster content produced *on* the GPU (for example anything drawn into a
//! render target) has no mirror and is gone after a generation bump. Owners of
//! such content compare [`Context::generation`] against the generation they
//! rendered under.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::error::GraphicsError;

/// Process-unique identity of a GPU object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Straight (non-premultiplied) RGBA color with components in `0..=1`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `0xRRGGBB` into an opaque color.
    pub fn from_rgb_u32(rgb: u32) -> Self {
        let channel = |shift: u32| ((rgb >> shift) & 0xff) as f32 / 255.0;
        Self::new(channel(16), channel(8), channel(0), 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
}

/// A blend factor, applied identically to the color and alpha channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Zero,
    One,
    SourceColor,
    TargetColor,
    InverseSourceColor,
    InverseTargetColor,
    SourceAlpha,
    TargetAlpha,
    InverseSourceAlpha,
    InverseTargetAlpha,
    Constant,
    InverseConstant,
}

/// `result = source * src_factor + target * dst_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub source: BlendOperation,
    pub target: BlendOperation,
}

impl BlendState {
    /// Overwrites the target. Blending is disabled entirely.
    pub const COPY: Self = Self::new(BlendOperation::One, BlendOperation::Zero);
    pub const ADD: Self = Self::new(BlendOperation::One, BlendOperation::One);
    pub const PREMULTIPLIED: Self =
        Self::new(BlendOperation::One, BlendOperation::InverseSourceAlpha);
    pub const UNPREMULTIPLIED: Self = Self::new(
        BlendOperation::SourceAlpha,
        BlendOperation::InverseSourceAlpha,
    );

    pub const fn new(source: BlendOperation, target: BlendOperation) -> Self {
        Self { source, target }
    }

    pub fn is_copy(&self) -> bool {
        *self == Self::COPY
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::COPY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    Clamp,
    Repeat,
}

/// Sampling behaviour of a texture. Storage is always 8-bit RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureFormat {
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

impl TextureFormat {
    pub const NEAREST_CLAMP: Self = Self::new(TextureFilter::Nearest, TextureWrap::Clamp);
    pub const NEAREST_REPEAT: Self = Self::new(TextureFilter::Nearest, TextureWrap::Repeat);
    pub const LINEAR_CLAMP: Self = Self::new(TextureFilter::Linear, TextureWrap::Clamp);
    pub const LINEAR_REPEAT: Self = Self::new(TextureFilter::Linear, TextureWrap::Repeat);

    pub const BYTES_PER_PIXEL: usize = 4;

    pub const fn new(filter: TextureFilter, wrap: TextureWrap) -> Self {
        Self { filter, wrap }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
}

impl AttributeType {
    pub fn byte_size(self) -> usize {
        match self {
            AttributeType::Float => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub kind: AttributeType,
    pub count: u32,
    pub byte_offset: usize,
}

/// Interleaved vertex layout. Attribute `i` binds to `@location(i)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    attributes: SmallVec<[VertexAttribute; 4]>,
    stride: usize,
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: &'static str, kind: AttributeType, count: u32) -> Self {
        debug_assert!((1..=4).contains(&count), "attribute `{name}` has {count} components");
        self.attributes.push(VertexAttribute {
            name,
            kind,
            count,
            byte_offset: self.stride,
        });
        self.stride += kind.byte_size() * count as usize;
        self
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// A pixel rectangle in the bound render target, origin at the top-left.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// State changes a context actually issued, as opposed to draws requested.
///
/// Consecutive draws into the same target share one render pass, and the
/// viewport and pipeline are only rebound when they differ from what the open
/// pass already has. A generation bump closes the pass, so everything is
/// bound again once afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BindingStats {
    /// Render passes begun. Every clear begins one.
    pub target_binds: u64,
    pub viewport_binds: u64,
    /// Switches of material, blend state or primitive within a pass.
    pub pipeline_binds: u64,
}

/// Everything needed to build a [`Material`].
///
/// `source` is one WGSL module with a `vs_main` and an `fs_main` entry point.
/// Its uniform block lives at `@group(0) @binding(0)` and must be exactly
/// `uniform_size` bytes. Sampled texture slot `i` lives in group 1 with the
/// texture at binding `2 * i` and its sampler at `2 * i + 1`.
#[derive(Debug, Clone)]
pub struct MaterialDescriptor<'a> {
    pub label: &'a str,
    pub vertex_format: VertexFormat,
    pub source: &'a str,
    pub uniform_size: usize,
    pub texture_count: usize,
}

/// Brings an object's native state in line with its context.
///
/// Implementations compare the generation they cached against the one in
/// `state` and rebuild from their CPU mirror on mismatch, then apply any
/// pending CPU-side edits. Called by the context right before the object is
/// used, never by renderers.
pub trait Refresh<State: ?Sized> {
    type Native;

    fn refresh(&mut self, state: &mut State) -> &mut Self::Native;
}

pub trait Texture {
    fn id(&self) -> ResourceId;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> TextureFormat;
    fn set_format(&mut self, format: TextureFormat);
    /// Changes the size, replacing the pixel mirror. Without pixels the
    /// texture comes back zeroed.
    fn resize(&mut self, width: u32, height: u32, pixels: Option<Vec<u8>>);
    /// Generation of the cached native texture, `None` when there is none.
    fn cached_generation(&self) -> Option<u64>;
    fn free(&mut self);
}

pub trait VertexBuffer {
    fn id(&self) -> ResourceId;
    fn byte_count(&self) -> usize;
    /// Copies `bytes` into the mirror at `offset`.
    fn upload(&mut self, bytes: &[u8], offset: usize);
    fn upload_floats(&mut self, floats: &[f32], offset: usize) {
        self.upload(bytemuck::cast_slice(floats), offset);
    }
    /// Moves `count` bytes from `source_offset` to `target_offset`. The ranges
    /// may overlap.
    fn move_bytes(&mut self, source_offset: usize, target_offset: usize, count: usize);
    fn cached_generation(&self) -> Option<u64>;
    fn free(&mut self);
}

pub trait Material {
    fn id(&self) -> ResourceId;
    fn label(&self) -> &str;
    fn vertex_format(&self) -> &VertexFormat;
    fn uniform_size(&self) -> usize;
    /// Replaces the uniform block. Identical bytes leave the material clean.
    fn set_uniform_bytes(&mut self, bytes: &[u8]);
    fn uniform_bytes(&self) -> &[u8];
    fn cached_generation(&self) -> Option<u64>;
    fn free(&mut self);
}

pub trait RenderTarget {
    type Texture: Texture;

    fn id(&self) -> ResourceId;
    fn texture(&self) -> &Self::Texture;
    fn texture_mut(&mut self) -> &mut Self::Texture;
    /// Swaps in a new color attachment and returns the previous one.
    fn set_color(&mut self, texture: Self::Texture) -> Self::Texture;
    fn free(&mut self);
}

pub trait Context {
    type Texture: Texture;
    type VertexBuffer: VertexBuffer;
    type Material: Material;
    type RenderTarget: RenderTarget<Texture = Self::Texture>;

    /// Bumped every time native state is invalidated.
    fn generation(&self) -> u64;

    /// Compiles `descriptor.source`. Compile failure is fatal and carries the
    /// compiler log.
    fn create_material(
        &mut self,
        descriptor: MaterialDescriptor<'_>,
    ) -> Result<Self::Material, GraphicsError>;
    fn create_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<Vec<u8>>,
    ) -> Self::Texture;
    fn create_vertex_buffer(&mut self, byte_count: usize) -> Self::VertexBuffer;
    fn create_render_target(&mut self, texture: Self::Texture) -> Self::RenderTarget;

    fn create_vertex_buffer_from_floats(&mut self, floats: &[f32]) -> Self::VertexBuffer {
        let mut buffer = self.create_vertex_buffer(std::mem::size_of_val(floats));
        buffer.upload_floats(floats, 0);
        buffer
    }

    /// Binds `target`, or the default target for `None`. Binding a render
    /// target resets the viewport to cover it; returning to the default
    /// target restores the viewport it had before.
    fn set_render_target(&mut self, target: Option<&mut Self::RenderTarget>);
    fn set_viewport(&mut self, viewport: Viewport);
    fn viewport(&self) -> Viewport;
    fn render_target_size(&self) -> (u32, u32);

    fn set_blend_state(&mut self, state: BlendState);
    fn blend_state(&self) -> BlendState;

    fn set_copy_blend_state(&mut self) {
        self.set_blend_state(BlendState::COPY);
    }

    fn set_add_blend_state(&mut self) {
        self.set_blend_state(BlendState::ADD);
    }

    fn set_premultiplied_blend_state(&mut self) {
        self.set_blend_state(BlendState::PREMULTIPLIED);
    }

    fn set_unpremultiplied_blend_state(&mut self) {
        self.set_blend_state(BlendState::UNPREMULTIPLIED);
    }

    /// Makes `texture` the sampled texture in `slot` of `material`.
    fn bind_texture(
        &mut self,
        material: &mut Self::Material,
        slot: usize,
        texture: &mut Self::Texture,
    );

    /// Clears the whole bound target, ignoring the viewport.
    fn clear(&mut self, color: Color);
    fn draw(
        &mut self,
        primitive: Primitive,
        material: &mut Self::Material,
        vertices: &mut Self::VertexBuffer,
    );

    fn begin_frame(&mut self);
    /// Submits all recorded work.
    fn end_frame(&mut self);
}

/// Runs `f` with `target` bound and a full-target viewport, then rebinds the
/// default target.
pub fn render_into<C, R>(
    context: &mut C,
    target: &mut C::RenderTarget,
    f: impl FnOnce(&mut C) -> R,
) -> R
where
    C: Context,
{
    context.set_render_target(Some(target));
    let result = f(context);
    context.set_render_target(None);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_format_packs_attributes() {
        let format = VertexFormat::new()
            .add("position", AttributeType::Float, 2)
            .add("color", AttributeType::Float, 3);

        assert_eq!(format.stride(), 20);
        assert_eq!(format.attribute("position").map(|a| a.byte_offset), Some(0));
        assert_eq!(format.attribute("color").map(|a| a.byte_offset), Some(8));
        assert!(format.attribute("uv").is_none());
    }

    #[test]
    fn copy_blend_is_the_default() {
        assert!(BlendState::default().is_copy());
        assert!(!BlendState::UNPREMULTIPLIED.is_copy());
    }

    #[test]
    fn hex_colors_are_opaque() {
        let color = Color::from_rgb_u32(0xff8000);
        assert_eq!(color.r, 1.0);
        assert!((color.g - 128.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(color.b, 0.0);
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
    }
}
