use std::ops::Range;

use tracing::trace;

use crate::graphics::{Refresh, ResourceId, VertexBuffer};

use super::gpu::GpuState;

/// A fixed-size vertex buffer backed by a CPU mirror.
///
/// Edits only touch the mirror and widen the dirty range; the range is
/// uploaded on the next refresh.
pub struct WgpuVertexBuffer {
    id: ResourceId,
    byte_count: usize,
    // Padded to `wgpu::COPY_BUFFER_ALIGNMENT`.
    bytes: Vec<u8>,
    dirty: Option<Range<usize>>,
    native: Option<wgpu::Buffer>,
    generation: Option<u64>,
}

impl WgpuVertexBuffer {
    pub(crate) fn new(byte_count: usize) -> Self {
        let padded = byte_count
            .max(1)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        Self {
            id: ResourceId::next(),
            byte_count,
            bytes: vec![0; padded],
            dirty: None,
            native: None,
            generation: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.byte_count]
    }

    fn mark_dirty(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }

    fn create_native(&self, gpu: &GpuState) -> wgpu::Buffer {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cinder Vertex Buffer"),
            size: self.bytes.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue.write_buffer(&buffer, 0, &self.bytes);
        buffer
    }
}

impl Refresh<GpuState> for WgpuVertexBuffer {
    type Native = wgpu::Buffer;

    fn refresh(&mut self, gpu: &mut GpuState) -> &mut wgpu::Buffer {
        let generation = gpu.generation();
        if self.generation != Some(generation) {
            self.native = None;
        }
        let native = match self.native.take() {
            Some(native) => {
                if let Some(dirty) = self.dirty.take() {
                    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
                    let start = dirty.start / align * align;
                    let end = dirty.end.next_multiple_of(align).min(self.bytes.len());
                    gpu.prepare_write(self.id);
                    gpu.queue
                        .write_buffer(&native, start as u64, &self.bytes[start..end]);
                }
                native
            }
            None => {
                trace!(
                    buffer = self.id.get(),
                    bytes = self.byte_count,
                    "creating vertex buffer"
                );
                self.dirty = None;
                self.generation = Some(generation);
                self.create_native(gpu)
            }
        };
        self.native.insert(native)
    }
}

impl VertexBuffer for WgpuVertexBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn byte_count(&self) -> usize {
        self.byte_count
    }

    fn upload(&mut self, bytes: &[u8], offset: usize) {
        let end = offset + bytes.len();
        debug_assert!(
            end <= self.byte_count,
            "upload of {} bytes at {offset} overflows a {}-byte buffer",
            bytes.len(),
            self.byte_count
        );
        self.bytes[offset..end].copy_from_slice(bytes);
        self.mark_dirty(offset..end);
    }

    fn move_bytes(&mut self, source_offset: usize, target_offset: usize, count: usize) {
        debug_assert!(source_offset + count <= self.byte_count);
        debug_assert!(target_offset + count <= self.byte_count);
        self.bytes
            .copy_within(source_offset..source_offset + count, target_offset);
        self.mark_dirty(target_offset..target_offset + count);
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.as_ref().and(self.generation)
    }

    fn free(&mut self) {
        self.native = None;
        self.generation = None;
    }
}
