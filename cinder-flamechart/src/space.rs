//! Transforms between physical pixels, NDC and texture UVs.

use cinder_gfx::{
    AttributeType, Context, VertexFormat,
    math::{AffineTransform, Rect, Vec2},
};

/// Maps viewport-local pixels (origin top-left, y down) to NDC (y up).
pub fn physical_to_ndc(viewport_size: Vec2) -> AffineTransform {
    AffineTransform::with_translation(Vec2::new(-1.0, 1.0)).times(&AffineTransform::with_scale(
        Vec2::new(2.0 / viewport_size.x, -2.0 / viewport_size.y),
    ))
}

/// Maps texel coordinates of a `texture_size` texture to UVs. Texture rows
/// start at the top, so there is no flip.
pub fn physical_to_uv(texture_size: Vec2) -> AffineTransform {
    AffineTransform::between_rects(&Rect::new(Vec2::ZERO, texture_size), &Rect::UNIT)
}

pub fn viewport_size<C: Context>(context: &C) -> Vec2 {
    let viewport = context.viewport();
    Vec2::new(f64::from(viewport.width), f64::from(viewport.height))
}

/// Full-screen quad as a triangle strip of `position, uv` pairs. `uv (0, 0)`
/// sits on the top-left corner.
pub(crate) const QUAD_STRIP: [f32; 16] = [
    -1.0, 1.0, 0.0, 0.0, //
    1.0, 1.0, 1.0, 0.0, //
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 1.0,
];

pub(crate) fn quad_vertex_format() -> VertexFormat {
    VertexFormat::new()
        .add("position", AttributeType::Float, 2)
        .add("uv", AttributeType::Float, 2)
}

/// Stretches the unit quad over `dst`, given in viewport pixels.
pub(crate) fn quad_position_transform(viewport_size: Vec2, dst: &Rect) -> AffineTransform {
    let ndc_dst = physical_to_ndc(viewport_size).transform_rect(dst);
    AffineTransform::between_rects(&Rect::NDC, &ndc_dst)
}

/// Maps quad UVs onto the texel rectangle `src` of a `texture_size` texture.
pub(crate) fn quad_uv_transform(texture_size: Vec2, src: &Rect) -> AffineTransform {
    let uv_src = physical_to_uv(texture_size).transform_rect(src);
    AffineTransform::between_rects(&Rect::UNIT, &uv_src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_corners_land_on_ndc_corners() {
        let to_ndc = physical_to_ndc(Vec2::new(200.0, 100.0));
        assert_eq!(to_ndc.transform_position(Vec2::ZERO), Vec2::new(-1.0, 1.0));
        assert_eq!(
            to_ndc.transform_position(Vec2::new(200.0, 100.0)),
            Vec2::new(1.0, -1.0)
        );
    }

    #[test]
    fn quad_top_left_maps_to_dst_top_left() {
        let viewport = Vec2::new(100.0, 50.0);
        let dst = Rect::from_xywh(10.0, 5.0, 20.0, 10.0);
        let quad_to_ndc = quad_position_transform(viewport, &dst);
        let ndc_to_physical = physical_to_ndc(viewport).inverted().unwrap();

        let top_left = ndc_to_physical.transform_position(quad_to_ndc.transform_position(Vec2::new(-1.0, 1.0)));
        let bottom_right =
            ndc_to_physical.transform_position(quad_to_ndc.transform_position(Vec2::new(1.0, -1.0)));
        assert!((top_left - Vec2::new(10.0, 5.0)).length() < 1e-9);
        assert!((bottom_right - Vec2::new(30.0, 15.0)).length() < 1e-9);
    }

    #[test]
    fn uv_transform_selects_one_texel_row() {
        let uv = quad_uv_transform(Vec2::new(8.0, 4.0), &Rect::from_xywh(0.0, 2.0, 8.0, 1.0));
        assert_eq!(uv.transform_position(Vec2::ZERO), Vec2::new(0.0, 0.5));
        assert_eq!(uv.transform_position(Vec2::ONE), Vec2::new(1.0, 0.75));
    }
}
