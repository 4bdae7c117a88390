use tracing::trace;

use crate::graphics::{Refresh, ResourceId, Texture, TextureFormat};

use super::gpu::GpuState;

/// Storage format of every texture the backend creates.
pub const STORAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct NativeTexture {
    /// Distinct for every native creation, so a recreated texture never
    /// continues a render pass begun on the old one.
    pub attachment: ResourceId,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// An RGBA8 texture that can be sampled, rendered to and read back.
pub struct WgpuTexture {
    id: ResourceId,
    format: TextureFormat,
    width: u32,
    height: u32,
    pixels: Option<Vec<u8>>,
    native: Option<NativeTexture>,
    generation: Option<u64>,
}

impl WgpuTexture {
    pub(crate) fn new(
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<Vec<u8>>,
    ) -> Self {
        debug_assert_pixel_len(width, height, pixels.as_deref());
        Self {
            id: ResourceId::next(),
            format,
            width,
            height,
            pixels,
            native: None,
            generation: None,
        }
    }

    fn create_native(&self, gpu: &GpuState) -> NativeTexture {
        let size = wgpu::Extent3d {
            width: self.width.max(1),
            height: self.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Cinder Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STORAGE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        if let Some(pixels) = self.pixels.as_ref().filter(|_| self.width > 0 && self.height > 0) {
            gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.width * TextureFormat::BYTES_PER_PIXEL as u32),
                    rows_per_image: Some(self.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        NativeTexture {
            attachment: ResourceId::next(),
            texture,
            view,
        }
    }
}

impl Refresh<GpuState> for WgpuTexture {
    type Native = NativeTexture;

    fn refresh(&mut self, gpu: &mut GpuState) -> &mut NativeTexture {
        let generation = gpu.generation();
        if self.generation != Some(generation) {
            self.native = None;
        }
        let native = match self.native.take() {
            Some(native) => native,
            None => {
                trace!(
                    texture = self.id.get(),
                    width = self.width,
                    height = self.height,
                    "creating texture"
                );
                self.generation = Some(generation);
                self.create_native(gpu)
            }
        };
        self.native.insert(native)
    }
}

impl Texture for WgpuTexture {
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
        // Only the sampler depends on the format.
        self.format = format;
    }

    fn resize(&mut self, width: u32, height: u32, pixels: Option<Vec<u8>>) {
        debug_assert_pixel_len(width, height, pixels.as_deref());
        self.width = width;
        self.height = height;
        self.pixels = pixels;
        self.native = None;
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.as_ref().and(self.generation)
    }

    fn free(&mut self) {
        self.native = None;
        self.generation = None;
    }
}

fn debug_assert_pixel_len(width: u32, height: u32, pixels: Option<&[u8]>) {
    if let Some(pixels) = pixels {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * TextureFormat::BYTES_PER_PIXEL,
            "pixel data does not match a {width}x{height} RGBA8 texture"
        );
    }
}
