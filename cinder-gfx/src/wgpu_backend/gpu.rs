use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::graphics::{
    BindingStats, ResourceId, TextureFilter, TextureFormat, TextureWrap, Viewport,
};

use super::material::PipelineKey;

/// Size of the per-submission uniform arena.
const UNIFORM_ARENA_SIZE: u64 = 1 << 20;

/// Device-level state shared by every object of one [`super::WgpuContext`].
///
/// Owns the command encoder that draws are recorded into, and the render pass
/// currently open on it. Work is submitted when a frame ends, when the uniform
/// arena fills up, and before any queue write that would otherwise overtake a
/// recorded command still reading the old contents.
pub struct GpuState {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    generation: u64,
    // Declared before `encoder` so it is dropped first.
    pass: Option<OpenPass>,
    encoder: Option<wgpu::CommandEncoder>,
    binding_stats: BindingStats,
    pending: FxHashSet<ResourceId>,
    arena: UniformArena,
    samplers: FxHashMap<TextureFormat, wgpu::Sampler>,
    lost: Arc<AtomicBool>,
    lost_message: Arc<Mutex<Option<String>>>,
    submissions: u64,
}

impl GpuState {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let lost_message = Arc::new(Mutex::new(None));
        watch_device_loss(&device, &lost, &lost_message);
        let arena = UniformArena::new(&device);
        Self {
            device,
            queue,
            generation: 0,
            pass: None,
            encoder: None,
            binding_stats: BindingStats::default(),
            pending: FxHashSet::default(),
            arena,
            samplers: FxHashMap::default(),
            lost,
            lost_message,
            submissions: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// The message reported by the driver for the most recent device loss.
    pub fn lost_message(&self) -> Option<String> {
        self.lost_message.lock().clone()
    }

    /// Number of queue submissions made so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn binding_stats(&self) -> BindingStats {
        self.binding_stats
    }

    /// The command encoder, with any open render pass ended first.
    pub(crate) fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.end_pass();
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cinder Encoder"),
            })
        })
    }

    pub(crate) fn end_pass(&mut self) {
        if self.pass.take().is_some() {
            trace!("ended render pass");
        }
    }

    /// Ends the open pass and begins one on `attachment`, loading or clearing
    /// its contents.
    pub(crate) fn begin_pass(
        &mut self,
        attachment: ResourceId,
        view: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        self.end_pass();
        let pass = self
            .encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cinder Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            })
            .forget_lifetime();
        self.binding_stats.target_binds += 1;
        trace!(attachment = attachment.get(), "began render pass");
        self.pass = Some(OpenPass {
            pass,
            attachment,
            viewport: None,
            pipeline: None,
        });
    }

    /// The pass drawing into `attachment`, reusing the open one when it
    /// already does.
    pub(crate) fn pass_into(
        &mut self,
        attachment: ResourceId,
        view: &wgpu::TextureView,
    ) -> Option<PassRecorder<'_>> {
        let reusable = self
            .pass
            .as_ref()
            .is_some_and(|open| open.attachment == attachment);
        if !reusable {
            self.begin_pass(attachment, view, wgpu::LoadOp::Load);
        }
        let Self {
            pass,
            binding_stats,
            ..
        } = self;
        pass.as_mut().map(|open| PassRecorder {
            open,
            stats: binding_stats,
        })
    }

    pub(crate) fn mark_pending(&mut self, id: ResourceId) {
        self.pending.insert(id);
    }

    /// Submits recorded work if it still reads `id`, so a queue write to `id`
    /// cannot overtake it.
    pub(crate) fn prepare_write(&mut self, id: ResourceId) {
        if self.pending.contains(&id) {
            trace!(resource = id.get(), "flushing before overwriting a pending resource");
            self.flush();
        }
    }

    /// Submits everything recorded so far.
    pub(crate) fn flush(&mut self) {
        self.end_pass();
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
            self.submissions += 1;
            trace!(submissions = self.submissions, "submitted command buffer");
        }
        self.pending.clear();
        self.arena.reset();
    }

    /// Writes `bytes` into the uniform arena and returns the dynamic offset to
    /// bind them at.
    pub(crate) fn push_uniforms(&mut self, bytes: &[u8]) -> u32 {
        debug_assert_eq!(bytes.len() % 4, 0, "uniform blocks are 4-byte aligned");
        let size = bytes.len() as u64;
        let offset = match self.arena.allocate(size) {
            Some(offset) => offset,
            None => {
                debug!("uniform arena full, flushing");
                self.flush();
                self.arena.allocate(size).unwrap_or(0)
            }
        };
        self.queue.write_buffer(&self.arena.buffer, offset, bytes);
        offset as u32
    }

    /// Identifies the current arena contents. Changes whenever offsets handed
    /// out earlier stop being valid.
    pub(crate) fn arena_epoch(&self) -> u64 {
        self.arena.epoch
    }

    pub(crate) fn arena_buffer(&self) -> &wgpu::Buffer {
        &self.arena.buffer
    }

    pub(crate) fn sampler(&mut self, format: TextureFormat) -> wgpu::Sampler {
        let device = &self.device;
        self.samplers
            .entry(format)
            .or_insert_with(|| create_sampler(device, format))
            .clone()
    }

    /// Drops every native handle by bumping the generation. Objects rebuild
    /// lazily on their next refresh.
    pub(crate) fn invalidate(&mut self) {
        self.flush();
        self.generation += 1;
        self.samplers.clear();
        let epoch = self.arena.epoch + 1;
        self.arena = UniformArena::new(&self.device);
        self.arena.epoch = epoch;
        warn!(generation = self.generation, "graphics generation bumped");
    }

    /// Installs a replacement device after a loss.
    pub(crate) fn replace_device(&mut self, device: wgpu::Device, queue: wgpu::Queue) {
        self.pass = None;
        self.encoder = None;
        self.pending.clear();
        self.device = device;
        self.queue = queue;
        self.lost = Arc::new(AtomicBool::new(false));
        watch_device_loss(&self.device, &self.lost, &self.lost_message);
        self.invalidate();
    }
}

/// A render pass kept open across draws, with the state already set on it.
pub(crate) struct OpenPass {
    pass: wgpu::RenderPass<'static>,
    attachment: ResourceId,
    viewport: Option<Viewport>,
    pipeline: Option<(ResourceId, PipelineKey)>,
}

/// Records into the open pass, skipping state the pass already has.
pub(crate) struct PassRecorder<'a> {
    open: &'a mut OpenPass,
    stats: &'a mut BindingStats,
}

impl PassRecorder<'_> {
    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        if self.open.viewport == Some(viewport) {
            return;
        }
        self.open.pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        self.open.viewport = Some(viewport);
        self.stats.viewport_binds += 1;
    }

    /// Binds `pipeline` unless the pass already uses the pipeline built for
    /// `material` and `key`.
    pub(crate) fn set_pipeline(
        &mut self,
        material: ResourceId,
        key: PipelineKey,
        pipeline: &wgpu::RenderPipeline,
    ) {
        if self.open.pipeline == Some((material, key)) {
            return;
        }
        self.open.pass.set_pipeline(pipeline);
        self.open.pipeline = Some((material, key));
        self.stats.pipeline_binds += 1;
    }

    pub(crate) fn pass(&mut self) -> &mut wgpu::RenderPass<'static> {
        &mut self.open.pass
    }
}

fn watch_device_loss(
    device: &wgpu::Device,
    lost: &Arc<AtomicBool>,
    lost_message: &Arc<Mutex<Option<String>>>,
) {
    let lost = Arc::clone(lost);
    let lost_message = Arc::clone(lost_message);
    device.set_device_lost_callback(move |reason, message| {
        if matches!(reason, wgpu::DeviceLostReason::Destroyed) {
            debug!("GPU device destroyed");
        } else {
            warn!(?reason, %message, "GPU device lost");
        }
        *lost_message.lock() = Some(message);
        lost.store(true, Ordering::Release);
    });
}

fn create_sampler(device: &wgpu::Device, format: TextureFormat) -> wgpu::Sampler {
    let filter = match format.filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    };
    let address_mode = match format.wrap {
        TextureWrap::Clamp => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Cinder Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    })
}

/// Bump allocator over one uniform buffer, reset on every submission.
struct UniformArena {
    buffer: wgpu::Buffer,
    cursor: u64,
    alignment: u64,
    epoch: u64,
}

impl UniformArena {
    fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cinder Uniform Arena"),
            size: UNIFORM_ARENA_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            cursor: 0,
            alignment: u64::from(device.limits().min_uniform_buffer_offset_alignment),
            epoch: 0,
        }
    }

    fn allocate(&mut self, size: u64) -> Option<u64> {
        let offset = self.cursor;
        let end = offset + size;
        if end > UNIFORM_ARENA_SIZE {
            return None;
        }
        self.cursor = end.div_ceil(self.alignment) * self.alignment;
        Some(offset)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.epoch += 1;
    }
}
