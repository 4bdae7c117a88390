//! Typed uniform blocks encoded with `encase`.

use cinder_gfx::{Material, math::AffineTransform};
use encase::{ShaderType, UniformBuffer, internal::WriteInto};
use glam::Mat3;
use tracing::error;

pub(crate) fn to_mat3(transform: &AffineTransform) -> Mat3 {
    Mat3::from_cols_array(&transform.to_cols_array())
}

/// Reusable encode buffer owned by one renderer.
pub(crate) struct UniformStaging {
    bytes: Vec<u8>,
}

impl UniformStaging {
    pub fn new<T: ShaderType>() -> Self {
        Self {
            bytes: vec![0; T::min_size().get() as usize],
        }
    }

    /// Size of the encoded block, for the material descriptor.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Encodes `uniforms` and hands the bytes to `material`.
    pub fn write<M, T>(&mut self, material: &mut M, uniforms: &T)
    where
        M: Material,
        T: ShaderType + WriteInto,
    {
        let mut buffer = UniformBuffer::new(&mut self.bytes);
        if let Err(err) = buffer.write(uniforms) {
            error!("failed to encode uniforms for `{}`: {err}", material.label());
            return;
        }
        material.set_uniform_bytes(&self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::math::Vec2;

    use super::*;

    #[derive(ShaderType)]
    struct Sample {
        transform: Mat3,
        flag: u32,
    }

    #[test]
    fn mat3_columns_are_padded_to_vec4() {
        let staging = UniformStaging::new::<Sample>();
        assert_eq!(staging.size(), 64);
    }

    #[test]
    fn affine_transforms_keep_translation_in_the_last_column() {
        let transform = AffineTransform::with_translation(Vec2::new(3.0, 4.0));
        let mat = to_mat3(&transform);
        assert_eq!(mat.z_axis.to_array(), [3.0, 4.0, 1.0]);
        assert_eq!(mat.x_axis.to_array(), [1.0, 0.0, 0.0]);
    }
}
