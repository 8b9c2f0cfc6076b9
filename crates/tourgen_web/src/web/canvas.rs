//! Painting the tour scene onto a 2d canvas.

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use tourgen::TourScene;

const BACKGROUND: &str = "#0a0f1a";
const CURRENT_TOUR: &str = "#7aa2ff";
const BEST_TOUR: &str = "#4ade80";
const MARKER: &str = "#fb7185";
const MARKER_RADIUS: f64 = 3.0;

pub(super) fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, String> {
    canvas
        .get_context("2d")
        .map_err(|_| "canvas: get_context threw".to_string())?
        .ok_or("canvas: missing 2d context".to_string())?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| "canvas: context is not 2d".to_string())
}

/// Full repaint from scratch: surface resize, clear, current tour, best
/// tour, markers — in that order, so markers stay on top.
pub(super) fn paint_world(
    canvas: &HtmlCanvasElement,
    scene: &TourScene,
) -> Result<(), String> {
    canvas.set_width(scene.width as u32);
    canvas.set_height(scene.height as u32);

    let ctx = context_2d(canvas)?;

    ctx.set_fill_style_str(BACKGROUND);
    ctx.fill_rect(0.0, 0.0, scene.width, scene.height);

    ctx.set_line_width(1.5);
    ctx.set_global_alpha(0.5);
    ctx.set_stroke_style_str(CURRENT_TOUR);
    stroke_polyline(&ctx, &scene.current);

    ctx.set_global_alpha(1.0);
    ctx.set_stroke_style_str(BEST_TOUR);
    stroke_polyline(&ctx, &scene.best);

    ctx.set_fill_style_str(MARKER);
    for &(x, y) in &scene.markers {
        ctx.begin_path();
        ctx.arc(x, y, MARKER_RADIUS, 0.0, std::f64::consts::PI * 2.0).ok();
        ctx.fill();
    }

    Ok(())
}

fn stroke_polyline(ctx: &CanvasRenderingContext2d, points: &[(f64, f64)]) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    ctx.begin_path();
    ctx.move_to(first.0, first.1);
    for &(x, y) in rest {
        ctx.line_to(x, y);
    }
    ctx.stroke();
}
