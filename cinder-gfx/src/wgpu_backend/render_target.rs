use crate::graphics::{RenderTarget, ResourceId, Texture};

use super::texture::WgpuTexture;

/// A render target that owns its color attachment.
pub struct WgpuRenderTarget {
    id: ResourceId,
    texture: WgpuTexture,
}

impl WgpuRenderTarget {
    pub(crate) fn new(texture: WgpuTexture) -> Self {
        Self {
            id: ResourceId::next(),
            texture,
        }
    }
}

impl RenderTarget for WgpuRenderTarget {
    type Texture = WgpuTexture;

    fn id(&self) -> ResourceId {
        self.id
    }

    fn texture(&self) -> &WgpuTexture {
        &self.texture
    }

    fn texture_mut(&mut self) -> &mut WgpuTexture {
        &mut self.texture
    }

    fn set_color(&mut self, texture: WgpuTexture) -> WgpuTexture {
        std::mem::replace(&mut self.texture, texture)
    }

    fn free(&mut self) {
        self.texture.free();
    }
}
