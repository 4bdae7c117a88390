//! The wgpu implementation of [`crate::graphics::Context`].
//!
//! - **[`context`]**: draw recording, target binding and readback
//! - **[`gpu`]**: device, encoder, flush rules and the uniform arena
//! - **[`init`]**: adapter and device selection
//! - the remaining modules hold one object type each

pub mod context;
pub mod gpu;
pub mod init;
pub mod material;
pub mod render_target;
pub mod texture;
pub mod vertex_buffer;

pub use context::WgpuContext;
pub use gpu::GpuState;
pub use init::ContextConfig;
pub use material::WgpuMaterial;
pub use render_target::WgpuRenderTarget;
pub use texture::{NativeTexture, STORAGE_FORMAT, WgpuTexture};
pub use vertex_buffer::WgpuVertexBuffer;
