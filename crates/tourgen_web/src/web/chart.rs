//! Tour-length line chart, one point per generation.

use web_sys::HtmlCanvasElement;

use super::canvas::context_2d;
use crate::ui_model::ChartState;

const BACKGROUND: &str = "#0a0f1a";
const GRID: &str = "rgba(122, 162, 255, 0.15)";
const LINE: &str = "#fbbf24";

pub(super) fn draw_tour_length_chart(
    canvas: &HtmlCanvasElement,
    chart: &ChartState,
) -> Result<(), String> {
    let ctx = context_2d(canvas)?;
    let w = canvas.width() as f64;
    let h = canvas.height() as f64;

    ctx.set_fill_style_str(BACKGROUND);
    ctx.fill_rect(0.0, 0.0, w, h);

    ctx.set_stroke_style_str(GRID);
    ctx.set_line_width(0.5);
    for i in 1..5 {
        let y = h * f64::from(i) / 5.0;
        ctx.begin_path();
        ctx.move_to(0.0, y);
        ctx.line_to(w, y);
        ctx.stroke();
    }

    let data = chart.lengths();
    if data.is_empty() {
        return Ok(());
    }

    let (min, max) = chart.bounds();
    let range = (max - min).max(0.001);
    let step_x = w / (data.len().max(1) as f64);

    ctx.set_stroke_style_str(LINE);
    ctx.set_line_width(2.0);
    ctx.begin_path();
    for (i, &value) in data.iter().enumerate() {
        let norm = ((value - min) / range).clamp(0.0, 1.0);
        let x = (i as f64) * step_x;
        let y = h - norm * h;
        if i == 0 {
            ctx.move_to(x, y);
        } else {
            ctx.line_to(x, y);
        }
    }
    ctx.stroke();

    Ok(())
}
