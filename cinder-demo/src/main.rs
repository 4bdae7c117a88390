//! Renders a synthetic flamechart offscreen and saves it as a PNG.
//!
//! The top strip shows the whole chart with the zoomed region highlighted,
//! the rest of the image shows the zoomed region itself. Both charts share
//! one row atlas.

mod synthetic;

use std::path::PathBuf;

use anyhow::Context as _;
use cinder_flamechart::{
    AtlasConfig, CanvasRenderers, DarkTheme, FlamechartRenderer, FlamechartRendererOptions,
    FlamechartRendererProps, LightTheme, RowAtlas, Theme, with_viewport,
};
use cinder_gfx::{
    AffineTransform, Context, ContextConfig, Rect, TextureFormat, WgpuContext,
};
use clap::{ArgAction, Parser};
use tracing::info;

use crate::synthetic::SyntheticProfile;

/// Physical height of one stack depth in the zoomed view.
const ROW_HEIGHT: f64 = 16.0;

#[derive(Parser, Debug)]
#[command(name = "cinder-demo", version, about)]
struct Args {
    /// Where to write the PNG
    #[arg(short, long, default_value = "flamechart.png")]
    output: PathBuf,
    #[arg(long, default_value_t = 1200)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Deepest stack the generator produces
    #[arg(long, default_value_t = 24)]
    depth: usize,
    /// Number of root frames
    #[arg(long, default_value_t = 40)]
    frames: usize,
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// Draw the deepest frames at the top
    #[arg(long)]
    inverted: bool,
    /// Separate adjacent frames with transparent seams
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    outlines: bool,
    /// Width and height of the row atlas texture
    #[arg(long, default_value_t = 4096)]
    atlas_size: u32,
    /// Left edge of the zoomed view, as a fraction of the chart
    #[arg(long, default_value_t = 0.25)]
    view_start: f64,
    /// Width of the zoomed view, as a fraction of the chart
    #[arg(long, default_value_t = 0.1)]
    view_width: f64,
    #[arg(long)]
    dark: bool,
}

fn main() -> anyhow::Result<()> {
    cinder_gfx::init_tracing();
    let args = Args::parse();

    let chart = SyntheticProfile {
        seed: args.seed,
        root_frames: args.frames,
        max_depth: args.depth,
    }
    .generate()?;
    info!(
        layers = chart.layers().len(),
        total_weight = chart.total_weight(),
        "generated flamechart"
    );
    anyhow::ensure!(!chart.layers().is_empty(), "the generated flamechart is empty");

    let mut context = WgpuContext::new_blocking(ContextConfig::default())
        .context("failed to open a GPU context")?;
    let (width, height) = (args.width, args.height);
    let canvas = context.create_texture(TextureFormat::NEAREST_CLAMP, width, height, None);
    context.set_default_target_texture(canvas);

    let theme: &dyn Theme = if args.dark { &DarkTheme } else { &LightTheme };
    let mut renderers = CanvasRenderers::new(&mut context, theme)?;
    let mut atlas = RowAtlas::new(
        &mut context,
        AtlasConfig {
            width: args.atlas_size,
            height: args.atlas_size,
        },
    )?;
    let options = FlamechartRendererOptions {
        inverted: args.inverted,
        ..Default::default()
    };
    let mut overview = FlamechartRenderer::new(&chart, options);
    let mut detail = FlamechartRenderer::new(&chart, options);

    let overview_height = f64::from(height / 4);
    let detail_height = f64::from(height) - overview_height;
    let layer_count = chart.layers().len() as f64;

    let overview_src = Rect::from_xywh(0.0, 0.0, chart.total_weight(), layer_count);
    let overview_dst = Rect::from_xywh(0.0, 0.0, f64::from(width), overview_height);
    let detail_src = chart.clamped_config_space_viewport_rect(
        &Rect::from_xywh(
            args.view_start * chart.total_weight(),
            0.0,
            args.view_width * chart.total_weight(),
            detail_height / ROW_HEIGHT,
        ),
        args.inverted,
    );
    let detail_dst = Rect::from_xywh(0.0, 0.0, f64::from(width), detail_height);
    info!(?detail_src, "rendering");

    context.begin_frame();
    context.clear(theme.bg_primary());

    with_viewport(&mut context, &overview_dst, |context| {
        overview.render(
            context,
            &mut atlas,
            &mut renderers,
            &FlamechartRendererProps {
                config_space_src_rect: overview_src,
                physical_space_dst_rect: overview_dst,
                render_outlines: false,
            },
        );
        renderers.viewport_rectangle.render(
            context,
            &AffineTransform::between_rects(&overview_src, &overview_dst),
            &detail_src,
        );
    });

    let detail_viewport = Rect::from_xywh(0.0, overview_height, f64::from(width), detail_height);
    with_viewport(&mut context, &detail_viewport, |context| {
        detail.render(
            context,
            &mut atlas,
            &mut renderers,
            &FlamechartRendererProps {
                config_space_src_rect: detail_src,
                physical_space_dst_rect: detail_dst,
                render_outlines: args.outlines,
            },
        );
    });

    context.end_frame();

    let pixels = context.read_default_target()?;
    image::save_buffer(&args.output, &pixels, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(path = %args.output.display(), "wrote flamechart");

    overview.free();
    detail.free();
    atlas.free();
    renderers.free();
    Ok(())
}
