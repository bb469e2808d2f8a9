//! Content stream helpers: numbers, clipping, transforms, path replay and
//! stroke state.

use crate::errors::{PrinterError, Result};
use crate::types::{
    CapStyle, Group, JoinStyle, Path, PathCommand, Point, Rectangle, Stroke, Transform,
};
use lopdf::Object;
use lopdf::content::Operation;

/// One content stream being built: the page itself or an open group.
#[derive(Debug)]
pub(crate) struct Frame {
    pub ops: Vec<Operation>,
    /// Maps the frame's drawing space to the space patterns are resolved in.
    pub base: Transform,
    pub group: Option<Group>,
}

pub(crate) fn num(v: f64) -> Object {
    (v as f32).into()
}

pub(crate) fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

pub(crate) fn op(operator: &str) -> Operation {
    Operation::new(operator, vec![])
}

pub(crate) fn matrix_operands(t: &Transform) -> Vec<Object> {
    t.to_pdf_array().into_iter().map(num).collect()
}

pub(crate) fn rect_operands(rect: &Rectangle) -> Vec<Object> {
    vec![
        num(rect.left),
        num(rect.top),
        num(rect.width()),
        num(rect.height()),
    ]
}

pub(crate) fn concat(ops: &mut Vec<Operation>, t: &Transform) {
    if !t.is_identity() {
        ops.push(Operation::new("cm", matrix_operands(t)));
    }
}

pub(crate) fn clip_to(ops: &mut Vec<Operation>, rect: &Rectangle) {
    ops.push(Operation::new("re", rect_operands(rect)));
    ops.push(op("W"));
    ops.push(op("n"));
}

/// Page flip so callers can draw top-down in points.
pub(crate) fn page_flip(height: f64) -> Transform {
    Transform {
        scale_y: -1.0,
        translate_y: height,
        ..Transform::IDENTITY
    }
}

fn point_operands(p: Point) -> [Object; 2] {
    [num(p.x), num(p.y)]
}

/// Replays `path` into `ops`, mapping every point through `map`. Returns
/// whether anything was emitted.
///
/// A line back to the subpath start right before a close, and a line to the
/// point the previous segment ended on, are dropped: both produce zero-length
/// segments some viewers render as stray caps.
pub(crate) fn append_path(ops: &mut Vec<Operation>, path: &Path, map: &Transform) -> Result<bool> {
    let mut coords = path.coords.iter().map(|p| map.transform_point(*p));
    let mut take = |count: usize, cmd: PathCommand| -> Result<Vec<Point>> {
        let points: Vec<Point> = coords.by_ref().take(count).collect();
        if points.len() < count {
            return Err(PrinterError::MalformedPath(format!(
                "{:?} is missing coordinates",
                cmd
            )));
        }
        Ok(points)
    };

    let mut emitted = false;
    let mut start: Option<Point> = None;
    let mut current: Option<Point> = None;
    let mut last_end: Option<Point> = None;

    for (i, &cmd) in path.commands.iter().enumerate() {
        if cmd != PathCommand::MoveTo && cmd != PathCommand::End && current.is_none() {
            return Err(PrinterError::MalformedPath(format!(
                "{:?} before the first MoveTo",
                cmd
            )));
        }
        match cmd {
            PathCommand::End => break,
            PathCommand::MoveTo => {
                let p = take(1, cmd)?[0];
                ops.push(Operation::new("m", point_operands(p).to_vec()));
                start = Some(p);
                current = Some(p);
                last_end = None;
                emitted = true;
            }
            PathCommand::LineTo => {
                let p = take(1, cmd)?[0];
                let closes_to_start =
                    path.commands.get(i + 1) == Some(&PathCommand::Close) && start == Some(p);
                if last_end != Some(p) && !closes_to_start {
                    ops.push(Operation::new("l", point_operands(p).to_vec()));
                    last_end = Some(p);
                }
                current = Some(p);
            }
            PathCommand::QuadraticTo => {
                let pts = take(2, cmd)?;
                let (q0, c, p) = (current.unwrap_or(pts[0]), pts[0], pts[1]);
                let c1 = Point::new(q0.x + 2.0 / 3.0 * (c.x - q0.x), q0.y + 2.0 / 3.0 * (c.y - q0.y));
                let c2 = Point::new(p.x + 2.0 / 3.0 * (c.x - p.x), p.y + 2.0 / 3.0 * (c.y - p.y));
                let mut operands = Vec::with_capacity(6);
                for pt in [c1, c2, p] {
                    operands.extend(point_operands(pt));
                }
                ops.push(Operation::new("c", operands));
                current = Some(p);
                last_end = Some(p);
            }
            PathCommand::CubicTo => {
                let pts = take(3, cmd)?;
                let mut operands = Vec::with_capacity(6);
                for pt in &pts {
                    operands.extend(point_operands(*pt));
                }
                ops.push(Operation::new("c", operands));
                current = Some(pts[2]);
                last_end = Some(pts[2]);
            }
            PathCommand::Close => {
                ops.push(op("h"));
                current = start;
                last_end = None;
            }
        }
    }
    Ok(emitted)
}

/// Line width, cap, join, miter limit and dash pattern.
pub(crate) fn stroke_style(ops: &mut Vec<Operation>, stroke: &Stroke) {
    let cap: i64 = match stroke.cap {
        CapStyle::Butt => 0,
        CapStyle::Round => 1,
        CapStyle::Square => 2,
    };
    let join: i64 = match stroke.join {
        JoinStyle::Miter => 0,
        JoinStyle::Round => 1,
        JoinStyle::Bevel => 2,
    };
    ops.push(Operation::new("w", vec![num(stroke.thickness)]));
    ops.push(Operation::new("J", vec![cap.into()]));
    ops.push(Operation::new("j", vec![join.into()]));
    ops.push(Operation::new("M", vec![num(stroke.miter_limit.max(1.0))]));

    let total: f64 = stroke.dashes.iter().sum();
    let dashes_valid = total > 0.0 && stroke.dashes.iter().all(|d| *d >= 0.0);
    if dashes_valid {
        let dashes: Vec<Object> = stroke.dashes.iter().copied().map(num).collect();
        ops.push(Operation::new("d", vec![dashes.into(), num(stroke.dash_offset)]));
    } else {
        ops.push(Operation::new("d", vec![Vec::<Object>::new().into(), 0.into()]));
    }
}

/// Vertical pen scale for non-uniform strokes; identity when the aspect is
/// unusable.
pub(crate) fn stroke_aspect(stroke: &Stroke) -> Transform {
    if stroke.aspect.is_finite() && stroke.aspect > 0.0 && stroke.aspect != 1.0 {
        Transform::scale(1.0, stroke.aspect)
    } else {
        Transform::IDENTITY
    }
}
