//! Plain-text renderer used by the interactive binary.

use std::io::{self, Write};

use log::warn;

use crate::session::render::{FrameContent, ImageView, Renderer, ScalarPlot};

pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            warn!("Failed to write to terminal: {err}");
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub fn describe_plot(plot: &ScalarPlot) -> String {
    let styling = &plot.styling;
    let mut lines = vec![
        format!("== {} ==", plot.title),
        format!(
            "{} vs {} | log {} | markers {} | grid h:{} v:{} ({})",
            plot.y_label,
            plot.x_label,
            on_off(styling.log_scale_y),
            on_off(styling.show_markers),
            on_off(styling.show_h_grid),
            on_off(styling.show_v_grid),
            styling.grid_color.as_str(),
        ),
    ];
    for series in &plot.series {
        let (Some(first), Some(last)) = (series.points.first(), series.points.last()) else {
            continue;
        };
        lines.push(format!(
            "  {} [{}] {} points, steps {}..{}, last {}",
            series.label,
            series.color.as_str(),
            series.points.len(),
            first.step,
            last.step,
            last.value
        ));
    }
    lines.join("\n")
}

pub fn describe_view(view: &ImageView) -> String {
    let body = match &view.content {
        FrameContent::Decoded(image) => format!("{}x{} image", image.width(), image.height()),
        FrameContent::Undecodable(notice) => notice.clone(),
    };
    format!(
        "== {} ==\n  {body} | frame {}/{} {}{}",
        view.caption,
        view.position + 1,
        view.total,
        if view.has_prev() { "[prev]" } else { "" },
        if view.has_next() { "[next]" } else { "" },
    )
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render_scalar(&mut self, plot: &ScalarPlot) {
        let text = describe_plot(plot);
        self.emit(&text);
    }

    fn render_image(&mut self, view: &ImageView) {
        let text = describe_view(view);
        self.emit(&text);
    }

    fn clear(&mut self, notice: Option<&str>) {
        self.emit(notice.unwrap_or("(nothing to show)"));
    }

    fn notify(&mut self, message: &str) {
        self.emit(message);
    }
}
