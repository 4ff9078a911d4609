use crate::buffer::PixelBuffer;
use crate::color::Color;
use crate::layers::PathCommand;

/// Scanline run-length outline of the pixels matching `target`.
///
/// A pixel matches when its alpha is strictly above `alpha_cutoff` and its
/// RGB distance to `target` is strictly below `threshold`. Every horizontal
/// run of matching pixels becomes a `MoveTo` at its first column followed by
/// a `LineTo` at its last column. Runs are never joined across rows, so the
/// result outlines spans rather than closed polygons.
pub fn trace_color(
    target: Color,
    buffer: &PixelBuffer,
    alpha_cutoff: u8,
    threshold: f64,
) -> Vec<PathCommand> {
    let width = buffer.width();
    let mut commands = Vec::new();

    for y in 0..buffer.height() {
        let row = buffer.row(y);
        let mut run_start: Option<u32> = None;

        for x in 0..width {
            let p = &row[x as usize * 4..x as usize * 4 + 4];
            let matches =
                p[3] > alpha_cutoff && Color::new(p[0], p[1], p[2]).distance(target) < threshold;

            match (matches, run_start) {
                (true, None) => run_start = Some(x),
                (false, Some(start)) => {
                    commands.push(PathCommand::MoveTo { x: start, y });
                    commands.push(PathCommand::LineTo { x: x - 1, y });
                    run_start = None;
                }
                _ => {}
            }
        }

        if let Some(start) = run_start {
            commands.push(PathCommand::MoveTo { x: start, y });
            commands.push(PathCommand::LineTo { x: width - 1, y });
        }
    }

    commands
}

/// Number of horizontal runs in a traced path.
pub fn run_count(commands: &[PathCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, PathCommand::MoveTo { .. }))
        .count()
}
