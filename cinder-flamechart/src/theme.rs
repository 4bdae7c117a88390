//! Color themes.
//!
//! A theme supplies the bucket palette twice: as WGSL spliced into the color
//! pass shader, and as a CPU function with the same math for callers that
//! need the colors outside a shader.

use cinder_gfx::Color;

/// WGSL helpers in scope for every [`Theme::color_for_bucket_wgsl`] snippet.
pub const COLOR_HELPERS_WGSL: &str = include_str!("shaders/color_helpers.wgsl");

pub trait Theme {
    /// WGSL source defining `fn color_for_bucket(t: f32) -> vec3<f32>`, where
    /// `t` is the normalized color bucket. It may call `hcl_to_rgb(h, c, l)`
    /// and `triangle(x)`.
    fn color_for_bucket_wgsl(&self) -> &str;

    /// CPU counterpart of the WGSL snippet.
    fn color_for_bucket(&self, t: f32) -> Color;

    fn fg_primary(&self) -> Color;
    fn fg_secondary(&self) -> Color;
    fn bg_primary(&self) -> Color;
    fn bg_secondary(&self) -> Color;
}

/// Luma/chroma/hue to RGB with `h` in degrees, clamped to `0..=1`.
pub fn hcl_to_rgb(h: f32, c: f32, l: f32) -> Color {
    let h_prime = h / 60.0;
    let x = c * (1.0 - ((h_prime % 2.0) - 1.0).abs());
    let (r, g, b) = if h_prime < 1.0 {
        (c, x, 0.0)
    } else if h_prime < 2.0 {
        (x, c, 0.0)
    } else if h_prime < 3.0 {
        (0.0, c, x)
    } else if h_prime < 4.0 {
        (0.0, x, c)
    } else if h_prime < 5.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };
    let m = l - (0.30 * r + 0.59 * g + 0.11 * b);
    Color::new(
        (r + m).clamp(0.0, 1.0),
        (g + m).clamp(0.0, 1.0),
        (b + m).clamp(0.0, 1.0),
        1.0,
    )
}

/// Triangle wave with period 1, ranging over `-1..=1`.
pub fn triangle(x: f32) -> f32 {
    2.0 * ((x - x.floor()) - 0.5).abs() - 1.0
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LightTheme;

impl Theme for LightTheme {
    fn color_for_bucket_wgsl(&self) -> &str {
        r#"
fn color_for_bucket(t: f32) -> vec3<f32> {
    let x = triangle(30.0 * t);
    let h = 360.0 * (0.9 * t);
    let c = 0.25 + 0.2 * x;
    let l = 0.80 - 0.15 * x;
    return hcl_to_rgb(h, c, l);
}
"#
    }

    fn color_for_bucket(&self, t: f32) -> Color {
        let x = triangle(30.0 * t);
        hcl_to_rgb(360.0 * (0.9 * t), 0.25 + 0.2 * x, 0.80 - 0.15 * x)
    }

    fn fg_primary(&self) -> Color {
        Color::from_rgb_u32(0x000000)
    }

    fn fg_secondary(&self) -> Color {
        Color::from_rgb_u32(0xBDBDBD)
    }

    fn bg_primary(&self) -> Color {
        Color::from_rgb_u32(0xFFFFFF)
    }

    fn bg_secondary(&self) -> Color {
        Color::from_rgb_u32(0xF6F6F6)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DarkTheme;

impl Theme for DarkTheme {
    fn color_for_bucket_wgsl(&self) -> &str {
        r#"
fn color_for_bucket(t: f32) -> vec3<f32> {
    let x = triangle(30.0 * t);
    let h = 360.0 * (0.9 * t);
    let c = 0.40 + 0.2 * x;
    let l = 0.15 - 0.1 * x;
    return hcl_to_rgb(h, c, l);
}
"#
    }

    fn color_for_bucket(&self, t: f32) -> Color {
        let x = triangle(30.0 * t);
        hcl_to_rgb(360.0 * (0.9 * t), 0.40 + 0.2 * x, 0.15 - 0.1 * x)
    }

    fn fg_primary(&self) -> Color {
        Color::from_rgb_u32(0xE0E0E0)
    }

    fn fg_secondary(&self) -> Color {
        Color::from_rgb_u32(0x666666)
    }

    fn bg_primary(&self) -> Color {
        Color::from_rgb_u32(0x060606)
    }

    fn bg_secondary(&self) -> Color {
        Color::from_rgb_u32(0x0C0C0C)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn triangle_wave_shape() {
        assert_eq!(triangle(0.0), 0.0);
        assert_eq!(triangle(0.25), -0.5);
        assert_eq!(triangle(0.5), -1.0);
        assert_eq!(triangle(1.25), -0.5);
    }

    #[test]
    fn zero_chroma_is_gray_at_the_requested_luma() {
        let color = hcl_to_rgb(123.0, 0.0, 0.4);
        assert!((color.r - 0.4).abs() < 1e-6);
        assert!((color.g - 0.4).abs() < 1e-6);
        assert!((color.b - 0.4).abs() < 1e-6);
    }

    #[test]
    fn hue_sectors_pick_the_dominant_channel() {
        let red = hcl_to_rgb(0.0, 0.5, 0.5);
        assert!(red.r > red.g && red.r > red.b);
        let green = hcl_to_rgb(120.0, 0.5, 0.5);
        assert!(green.g > green.r && green.g > green.b);
        let blue = hcl_to_rgb(240.0, 0.5, 0.5);
        assert!(blue.b > blue.r && blue.b > blue.g);
    }

    #[rstest]
    #[case::light(&LightTheme as &dyn Theme)]
    #[case::dark(&DarkTheme as &dyn Theme)]
    fn bucket_colors_are_opaque_and_in_range(#[case] theme: &dyn Theme) {
        for bucket in 0..=255u32 {
            let color = theme.color_for_bucket(bucket as f32 / 255.0);
            assert_eq!(color.a, 1.0);
            for channel in [color.r, color.g, color.b] {
                assert!((0.0..=1.0).contains(&channel));
            }
        }
    }

    #[rstest]
    #[case::light(&LightTheme as &dyn Theme)]
    #[case::dark(&DarkTheme as &dyn Theme)]
    fn wgsl_snippet_defines_color_for_bucket(#[case] theme: &dyn Theme) {
        assert!(
            theme
                .color_for_bucket_wgsl()
                .contains("fn color_for_bucket(t: f32) -> vec3<f32>")
        );
    }

    #[test]
    fn dark_backgrounds_are_darker_than_light_ones() {
        assert!(DarkTheme.bg_primary().r < LightTheme.bg_primary().r);
        assert_eq!(LightTheme.fg_primary(), Color::BLACK);
    }
}
