use tracing::{debug, trace};

use crate::{
    error::GraphicsError,
    graphics::{
        BindingStats, BlendState, Color, Context, Material, MaterialDescriptor, Primitive, Refresh,
        RenderTarget, ResourceId, Texture, TextureFormat, VertexBuffer, Viewport,
    },
    shader,
};

use super::{
    gpu::GpuState,
    material::{BoundTexture, PipelineKey, WgpuMaterial},
    render_target::WgpuRenderTarget,
    texture::{STORAGE_FORMAT, WgpuTexture},
    vertex_buffer::WgpuVertexBuffer,
};

/// Snapshot of the attachment draws currently go to.
#[derive(Clone)]
struct BoundTarget {
    id: Option<ResourceId>,
    // Identifies the native attachment, so a pass is only continued on the
    // very view it was begun on.
    attachment: ResourceId,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    // `None` for views the context does not own, which never go stale.
    generation: Option<u64>,
}

/// What draws go to while no render target is bound.
enum DefaultTarget {
    /// Owned by the context, and rebuilt from its mirror after a generation
    /// bump like every other texture.
    Texture(WgpuTexture),
    View(BoundTarget),
}

/// [`Context`] implementation on top of a wgpu device.
///
/// Consecutive draws into one target share a render pass that stays open
/// until the target changes, a clear begins a new one, or [`GpuState`]
/// submits. Viewport and pipeline are only set when they change within the
/// pass. Nothing reaches the GPU until [`Context::end_frame`] or one of the
/// flush rules in [`GpuState`] fires.
pub struct WgpuContext {
    gpu: GpuState,
    adapter_info: Option<wgpu::AdapterInfo>,
    default_target: Option<DefaultTarget>,
    default_viewport: Viewport,
    current: Option<BoundTarget>,
    on_default_target: bool,
    viewport: Viewport,
    blend: BlendState,
}

impl WgpuContext {
    pub(crate) fn with_state(gpu: GpuState, adapter_info: Option<wgpu::AdapterInfo>) -> Self {
        Self {
            gpu,
            adapter_info,
            default_target: None,
            default_viewport: Viewport::default(),
            current: None,
            on_default_target: true,
            viewport: Viewport::default(),
            blend: BlendState::COPY,
        }
    }

    pub fn gpu(&self) -> &GpuState {
        &self.gpu
    }

    pub fn device(&self) -> &wgpu::Device {
        self.gpu.device()
    }

    pub fn queue(&self) -> &wgpu::Queue {
        self.gpu.queue()
    }

    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    /// See [`BindingStats`].
    pub fn binding_stats(&self) -> BindingStats {
        self.gpu.binding_stats()
    }

    /// Makes `texture` the target draws go to when no render target is bound
    /// and returns the texture it replaces. The context keeps it current
    /// across generation bumps.
    pub fn set_default_target_texture(
        &mut self,
        mut texture: WgpuTexture,
    ) -> Option<WgpuTexture> {
        let bound = texture_target(&mut self.gpu, &mut texture);
        let previous = self.default_target.replace(DefaultTarget::Texture(texture));
        self.install_default_target(bound);
        match previous {
            Some(DefaultTarget::Texture(previous)) => Some(previous),
            _ => None,
        }
    }

    pub fn default_target_texture(&self) -> Option<&WgpuTexture> {
        match &self.default_target {
            Some(DefaultTarget::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn default_target_texture_mut(&mut self) -> Option<&mut WgpuTexture> {
        match &mut self.default_target {
            Some(DefaultTarget::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    /// Makes an externally owned view, typically a surface frame, the default
    /// target.
    pub fn set_default_target_view(
        &mut self,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) {
        let bound = BoundTarget {
            id: None,
            attachment: ResourceId::next(),
            view,
            width,
            height,
            format,
            generation: None,
        };
        self.default_target = Some(DefaultTarget::View(bound.clone()));
        self.install_default_target(bound);
    }

    fn install_default_target(&mut self, target: BoundTarget) {
        let viewport = Viewport::full(target.width, target.height);
        self.default_viewport = viewport;
        self.viewport = viewport;
        self.current = Some(target);
        self.on_default_target = true;
    }

    /// The default target as of the current generation.
    fn default_bound_target(&mut self) -> Option<BoundTarget> {
        match &mut self.default_target {
            Some(DefaultTarget::Texture(texture)) => Some(texture_target(&mut self.gpu, texture)),
            Some(DefaultTarget::View(target)) => Some(target.clone()),
            None => None,
        }
    }

    /// Drops every native object as if the device had been lost. The next use
    /// of each object recreates it.
    pub fn simulate_context_loss(&mut self) {
        self.gpu.invalidate();
    }

    /// Continues on a replacement device after the old one was lost. A
    /// default target view from the old device is dropped; a default target
    /// texture is recreated.
    pub fn restore(&mut self, device: wgpu::Device, queue: wgpu::Queue) {
        self.gpu.replace_device(device, queue);
        if matches!(self.default_target, Some(DefaultTarget::View(_))) {
            self.default_target = None;
        }
        self.current = None;
    }

    pub fn is_lost(&self) -> bool {
        self.gpu.is_lost()
    }

    /// Submits pending work and copies `texture` back to the CPU as tightly
    /// packed RGBA8 rows. Fails with [`GraphicsError::DeviceLost`] until
    /// [`WgpuContext::restore`] installs a new device.
    pub fn read_pixels(&mut self, texture: &mut WgpuTexture) -> Result<Vec<u8>, GraphicsError> {
        read_texture(&mut self.gpu, texture)
    }

    /// [`read_pixels`](Self::read_pixels) of the default target texture.
    pub fn read_default_target(&mut self) -> Result<Vec<u8>, GraphicsError> {
        match &mut self.default_target {
            Some(DefaultTarget::Texture(texture)) => read_texture(&mut self.gpu, texture),
            _ => Err(GraphicsError::Readback(
                "the default target is not a context-owned texture".to_owned(),
            )),
        }
    }

    /// The bound target, unless it was built under an older generation. The
    /// default target is brought up to date instead of being skipped.
    fn live_target(&mut self) -> Option<BoundTarget> {
        let generation = self.gpu.generation();
        let stale = self
            .current
            .as_ref()
            .is_none_or(|target| target.generation.is_some_and(|cached| cached != generation));
        if stale && self.on_default_target {
            self.current = self.default_bound_target();
        }
        let target = self.current.as_ref()?;
        match target.generation {
            Some(cached) if cached != generation => {
                debug!("bound target predates the current generation, skipping");
                None
            }
            _ => Some(target.clone()),
        }
    }

    fn clamped_viewport(&self, target: &BoundTarget) -> Option<Viewport> {
        let x = self.viewport.x.min(target.width);
        let y = self.viewport.y.min(target.height);
        let width = self.viewport.width.min(target.width - x);
        let height = self.viewport.height.min(target.height - y);
        (width > 0 && height > 0).then_some(Viewport::new(x, y, width, height))
    }
}

/// Binds the current native state of `texture`.
fn texture_target(gpu: &mut GpuState, texture: &mut WgpuTexture) -> BoundTarget {
    let generation = gpu.generation();
    let native = texture.refresh(gpu);
    let (attachment, view) = (native.attachment, native.view.clone());
    BoundTarget {
        id: Some(texture.id()),
        attachment,
        view,
        width: texture.width(),
        height: texture.height(),
        format: STORAGE_FORMAT,
        generation: Some(generation),
    }
}

fn read_texture(gpu: &mut GpuState, texture: &mut WgpuTexture) -> Result<Vec<u8>, GraphicsError> {
    if gpu.is_lost() {
        return Err(GraphicsError::DeviceLost);
    }
    let width = texture.width();
    let height = texture.height();
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    let unpadded_bytes_per_row = width * TextureFormat::BYTES_PER_PIXEL as u32;
    let padded_bytes_per_row =
        unpadded_bytes_per_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let native = texture.refresh(gpu).texture.clone();
    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Cinder Readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    gpu.encoder().copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &native,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.flush();

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|err| GraphicsError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|_| GraphicsError::Readback("map channel closed".to_owned()))?
        .map_err(|err| GraphicsError::Readback(err.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(unpadded_bytes_per_row as usize * height as usize);
    for row in data.chunks(padded_bytes_per_row as usize) {
        pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
    }
    drop(data);
    buffer.unmap();
    Ok(pixels)
}

impl Context for WgpuContext {
    type Texture = WgpuTexture;
    type VertexBuffer = WgpuVertexBuffer;
    type Material = WgpuMaterial;
    type RenderTarget = WgpuRenderTarget;

    fn generation(&self) -> u64 {
        self.gpu.generation()
    }

    fn create_material(
        &mut self,
        descriptor: MaterialDescriptor<'_>,
    ) -> Result<WgpuMaterial, GraphicsError> {
        shader::validate_material(&descriptor)?;
        Ok(WgpuMaterial::new(&descriptor))
    }

    fn create_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<Vec<u8>>,
    ) -> WgpuTexture {
        WgpuTexture::new(format, width, height, pixels)
    }

    fn create_vertex_buffer(&mut self, byte_count: usize) -> WgpuVertexBuffer {
        WgpuVertexBuffer::new(byte_count)
    }

    fn create_render_target(&mut self, texture: WgpuTexture) -> WgpuRenderTarget {
        WgpuRenderTarget::new(texture)
    }

    fn set_render_target(&mut self, target: Option<&mut WgpuRenderTarget>) {
        match target {
            Some(target) => {
                let bound = texture_target(&mut self.gpu, target.texture_mut());
                self.viewport = Viewport::full(bound.width, bound.height);
                self.current = Some(bound);
                self.on_default_target = false;
            }
            None => {
                self.current = self.default_bound_target();
                self.viewport = self.default_viewport;
                self.on_default_target = true;
            }
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        if self.on_default_target {
            self.default_viewport = viewport;
        }
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn render_target_size(&self) -> (u32, u32) {
        self.current
            .as_ref()
            .map_or((0, 0), |target| (target.width, target.height))
    }

    fn set_blend_state(&mut self, state: BlendState) {
        self.blend = state;
    }

    fn blend_state(&self) -> BlendState {
        self.blend
    }

    fn bind_texture(&mut self, material: &mut WgpuMaterial, slot: usize, texture: &mut WgpuTexture) {
        debug_assert!(
            self.current
                .as_ref()
                .is_none_or(|target| target.id != Some(texture.id())),
            "texture {} is sampled while bound as the render target",
            texture.id().get()
        );
        let view = texture.refresh(&mut self.gpu).view.clone();
        material.bind_texture(
            slot,
            BoundTexture {
                id: texture.id(),
                view,
                format: texture.format(),
            },
        );
    }

    fn clear(&mut self, color: Color) {
        if self.gpu.is_lost() {
            return;
        }
        let Some(target) = self.live_target() else {
            return;
        };
        self.gpu.begin_pass(
            target.attachment,
            &target.view,
            wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(color.r),
                g: f64::from(color.g),
                b: f64::from(color.b),
                a: f64::from(color.a),
            }),
        );
        if let Some(id) = target.id {
            self.gpu.mark_pending(id);
        }
    }

    fn draw(
        &mut self,
        primitive: Primitive,
        material: &mut WgpuMaterial,
        vertices: &mut WgpuVertexBuffer,
    ) {
        if self.gpu.is_lost() {
            return;
        }
        let Some(target) = self.live_target() else {
            return;
        };
        let Some(viewport) = self.clamped_viewport(&target) else {
            return;
        };
        let stride = material.vertex_format().stride();
        let vertex_count = if stride == 0 {
            0
        } else {
            (vertices.byte_count() / stride) as u32
        };
        if vertex_count == 0 {
            return;
        }

        let buffer = vertices.refresh(&mut self.gpu).clone();
        let key = PipelineKey {
            blend: self.blend,
            primitive,
            target_format: target.format,
        };
        let Some(prepared) = material.prepare(&mut self.gpu, key) else {
            return;
        };
        trace!(
            material = material.label(),
            vertex_count,
            ?viewport,
            "recording draw"
        );

        {
            let Some(mut recorder) = self.gpu.pass_into(target.attachment, &target.view) else {
                return;
            };
            recorder.set_viewport(viewport);
            recorder.set_pipeline(material.id(), key, &prepared.pipeline);
            let pass = recorder.pass();
            pass.set_bind_group(0, &prepared.uniform_bind_group, &[prepared.uniform_offset]);
            if let Some(texture_bind_group) = &prepared.texture_bind_group {
                pass.set_bind_group(1, texture_bind_group, &[]);
            }
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }

        if let Some(id) = target.id {
            self.gpu.mark_pending(id);
        }
        self.gpu.mark_pending(vertices.id());
        for id in prepared.texture_ids {
            self.gpu.mark_pending(id);
        }
    }

    fn begin_frame(&mut self) {
        self.set_render_target(None);
    }

    fn end_frame(&mut self) {
        self.gpu.flush();
    }
}
