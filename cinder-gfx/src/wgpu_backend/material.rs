use std::num::NonZeroU64;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graphics::{
    AttributeType, BlendOperation, BlendState, Material, MaterialDescriptor, Primitive, Refresh,
    ResourceId, TextureFormat, VertexFormat,
};

use super::gpu::GpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub blend: BlendState,
    pub primitive: Primitive,
    pub target_format: wgpu::TextureFormat,
}

#[derive(Clone)]
pub(crate) struct BoundTexture {
    pub id: ResourceId,
    pub view: wgpu::TextureView,
    pub format: TextureFormat,
}

/// Everything a draw call needs from a material, detached from its borrow.
pub(crate) struct PreparedMaterial {
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_bind_group: wgpu::BindGroup,
    pub uniform_offset: u32,
    pub texture_bind_group: Option<wgpu::BindGroup>,
    pub texture_ids: SmallVec<[ResourceId; 2]>,
}

pub struct NativeMaterial {
    module: wgpu::ShaderModule,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_bind_group: wgpu::BindGroup,
    vertex_attributes: Vec<wgpu::VertexAttribute>,
    vertex_stride: u64,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
}

/// A validated WGSL program plus its uniform block and texture slots.
pub struct WgpuMaterial {
    id: ResourceId,
    label: String,
    vertex_format: VertexFormat,
    source: String,
    uniforms: Vec<u8>,
    // Offset of the current uniform bytes in the arena, tagged with the arena
    // epoch it belongs to.
    uploaded: Option<(u64, u32)>,
    textures: SmallVec<[Option<BoundTexture>; 2]>,
    native: Option<NativeMaterial>,
    generation: Option<u64>,
}

impl WgpuMaterial {
    pub(crate) fn new(descriptor: &MaterialDescriptor<'_>) -> Self {
        Self {
            id: ResourceId::next(),
            label: descriptor.label.to_owned(),
            vertex_format: descriptor.vertex_format.clone(),
            source: descriptor.source.to_owned(),
            uniforms: vec![0; descriptor.uniform_size.max(4)],
            uploaded: None,
            textures: SmallVec::from_elem(None, descriptor.texture_count),
            native: None,
            generation: None,
        }
    }

    pub(crate) fn bind_texture(&mut self, slot: usize, texture: BoundTexture) {
        debug_assert!(
            slot < self.textures.len(),
            "material `{}` has no texture slot {slot}",
            self.label
        );
        if let Some(entry) = self.textures.get_mut(slot) {
            *entry = Some(texture);
        }
    }

    /// Refreshes native state and resolves the pipeline and bind groups for
    /// one draw. Returns `None` when a texture slot was never bound.
    pub(crate) fn prepare(
        &mut self,
        gpu: &mut GpuState,
        key: PipelineKey,
    ) -> Option<PreparedMaterial> {
        if self.textures.iter().any(Option::is_none) {
            debug_assert!(false, "material `{}` drawn with an unbound texture", self.label);
            return None;
        }
        self.refresh(gpu);

        let uniform_offset = match self.uploaded {
            Some((epoch, offset)) if epoch == gpu.arena_epoch() => offset,
            _ => {
                let offset = gpu.push_uniforms(&self.uniforms);
                self.uploaded = Some((gpu.arena_epoch(), offset));
                offset
            }
        };

        let texture_entries: SmallVec<[(wgpu::TextureView, wgpu::Sampler); 2]> = self
            .textures
            .iter()
            .flatten()
            .map(|bound| (bound.view.clone(), gpu.sampler(bound.format)))
            .collect();
        let texture_ids = self.textures.iter().flatten().map(|bound| bound.id).collect();

        let label = self.label.clone();
        let native = self.refresh(gpu);
        let texture_bind_group = native.texture_layout.as_ref().map(|layout| {
            let entries: SmallVec<[wgpu::BindGroupEntry<'_>; 4]> = texture_entries
                .iter()
                .enumerate()
                .flat_map(|(slot, (view, sampler))| {
                    [
                        wgpu::BindGroupEntry {
                            binding: 2 * slot as u32,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2 * slot as u32 + 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ]
                })
                .collect();
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&label),
                layout,
                entries: &entries,
            })
        });
        let pipeline = native.pipeline(&gpu.device, &label, key).clone();

        Some(PreparedMaterial {
            pipeline,
            uniform_bind_group: native.uniform_bind_group.clone(),
            uniform_offset,
            texture_bind_group,
            texture_ids,
        })
    }

    fn create_native(&self, gpu: &GpuState) -> NativeMaterial {
        debug!(material = %self.label, "creating shader module");
        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&self.label),
                source: wgpu::ShaderSource::Wgsl(self.source.as_str().into()),
            });

        let uniform_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&self.label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(self.uniforms.len() as u64),
                    },
                    count: None,
                }],
            });

        let texture_layout = (!self.textures.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..self.textures.len() as u32)
                .flat_map(|slot| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * slot,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * slot + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&self.label),
                    entries: &entries,
                })
        });

        let mut bind_group_layouts = vec![&uniform_layout];
        bind_group_layouts.extend(texture_layout.as_ref());
        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&self.label),
                bind_group_layouts: &bind_group_layouts,
                immediate_size: 0,
            });

        let uniform_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: gpu.arena_buffer(),
                    offset: 0,
                    size: NonZeroU64::new(self.uniforms.len() as u64),
                }),
            }],
        });

        NativeMaterial {
            module,
            texture_layout,
            pipeline_layout,
            uniform_bind_group,
            vertex_attributes: vertex_attributes(&self.vertex_format),
            vertex_stride: self.vertex_format.stride() as u64,
            pipelines: FxHashMap::default(),
        }
    }
}

impl NativeMaterial {
    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        key: PipelineKey,
    ) -> &wgpu::RenderPipeline {
        let module = &self.module;
        let pipeline_layout = &self.pipeline_layout;
        let vertex_attributes = &self.vertex_attributes;
        let stride = self.vertex_stride;
        self.pipelines.entry(key).or_insert_with(|| {
            trace!(material = label, ?key, "creating render pipeline");
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(crate::shader::VERTEX_ENTRY_POINT),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: vertex_attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(crate::shader::FRAGMENT_ENTRY_POINT),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.target_format,
                        blend: wgpu_blend_state(key.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: match key.primitive {
                        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
                        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
                    },
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }
}

impl Refresh<GpuState> for WgpuMaterial {
    type Native = NativeMaterial;

    fn refresh(&mut self, gpu: &mut GpuState) -> &mut NativeMaterial {
        let generation = gpu.generation();
        if self.generation != Some(generation) {
            self.native = None;
        }
        let native = match self.native.take() {
            Some(native) => native,
            None => {
                self.generation = Some(generation);
                self.uploaded = None;
                self.create_native(gpu)
            }
        };
        self.native.insert(native)
    }
}

impl Material for WgpuMaterial {
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
        debug_assert_eq!(
            bytes.len(),
            self.uniforms.len(),
            "uniform block size mismatch for `{}`",
            self.label
        );
        if self.uniforms != bytes {
            let len = bytes.len().min(self.uniforms.len());
            self.uniforms[..len].copy_from_slice(&bytes[..len]);
            self.uploaded = None;
        }
    }

    fn uniform_bytes(&self) -> &[u8] {
        &self.uniforms
    }

    fn cached_generation(&self) -> Option<u64> {
        self.native.as_ref().and(self.generation)
    }

    fn free(&mut self) {
        self.native = None;
        self.generation = None;
        self.uploaded = None;
        self.textures.iter_mut().for_each(|slot| *slot = None);
    }
}

fn vertex_attributes(format: &VertexFormat) -> Vec<wgpu::VertexAttribute> {
    format
        .attributes()
        .iter()
        .enumerate()
        .map(|(location, attribute)| wgpu::VertexAttribute {
            format: match (attribute.kind, attribute.count) {
                (AttributeType::Float, 1) => wgpu::VertexFormat::Float32,
                (AttributeType::Float, 2) => wgpu::VertexFormat::Float32x2,
                (AttributeType::Float, 3) => wgpu::VertexFormat::Float32x3,
                (AttributeType::Float, _) => wgpu::VertexFormat::Float32x4,
            },
            offset: attribute.byte_offset as u64,
            shader_location: location as u32,
        })
        .collect()
}

fn blend_factor(operation: BlendOperation) -> wgpu::BlendFactor {
    match operation {
        BlendOperation::Zero => wgpu::BlendFactor::Zero,
        BlendOperation::One => wgpu::BlendFactor::One,
        BlendOperation::SourceColor => wgpu::BlendFactor::Src,
        BlendOperation::TargetColor => wgpu::BlendFactor::Dst,
        BlendOperation::InverseSourceColor => wgpu::BlendFactor::OneMinusSrc,
        BlendOperation::InverseTargetColor => wgpu::BlendFactor::OneMinusDst,
        BlendOperation::SourceAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendOperation::TargetAlpha => wgpu::BlendFactor::DstAlpha,
        BlendOperation::InverseSourceAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendOperation::InverseTargetAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendOperation::Constant => wgpu::BlendFactor::Constant,
        BlendOperation::InverseConstant => wgpu::BlendFactor::OneMinusConstant,
    }
}

/// `None` disables blending, which is what the copy preset means.
pub(crate) fn wgpu_blend_state(state: BlendState) -> Option<wgpu::BlendState> {
    if state.is_copy() {
        return None;
    }
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(state.source),
        dst_factor: blend_factor(state.target),
        operation: wgpu::BlendOperation::Add,
    };
    Some(wgpu::BlendState {
        color: component,
        alpha: component,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_blend_disables_blending() {
        assert!(wgpu_blend_state(BlendState::COPY).is_none());

        let blend = wgpu_blend_state(BlendState::UNPREMULTIPLIED).unwrap();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.alpha, blend.color);
    }

    #[test]
    fn vertex_attributes_follow_declaration_order() {
        let format = VertexFormat::new()
            .add("position", AttributeType::Float, 2)
            .add("color", AttributeType::Float, 3);
        let attributes = vertex_attributes(&format);

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].format, wgpu::VertexFormat::Float32x2);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Float32x3);
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[1].shader_location, 1);
    }
}
