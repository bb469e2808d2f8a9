//! Paint resolution: solid colors, tiled image patterns and gradient
//! shadings.

use super::content::{matrix_operands, name, num, op};
use super::resources::ResourceKind;
use super::writer::DocumentWriter;
use crate::errors::{PrinterError, Result};
use crate::types::{Color, Gradient, GradientKind, Paint, Pattern, Point, Rectangle, Transform};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaintTarget {
    Fill,
    Stroke,
}

impl PaintTarget {
    fn color_op(self) -> &'static str {
        match self {
            PaintTarget::Fill => "rg",
            PaintTarget::Stroke => "RG",
        }
    }

    fn space_op(self) -> &'static str {
        match self {
            PaintTarget::Fill => "cs",
            PaintTarget::Stroke => "CS",
        }
    }

    fn pattern_op(self) -> &'static str {
        match self {
            PaintTarget::Fill => "scn",
            PaintTarget::Stroke => "SCN",
        }
    }
}

/// Most bands a repeated gradient is laid out in.
pub(crate) const MAX_GRADIENT_REPEAT: u32 = 256;

/// How a ramp continues past its extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extend {
    Pad,
    Repeat,
    Reflect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RampStop {
    pub offset: f64,
    pub color: Color,
    pub alpha: f64,
}

/// Color stops over [0, 1], laid out along `(0,0) -> (extent,0)` (or radius
/// `0 -> extent`).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ramp {
    pub stops: Vec<RampStop>,
    pub extend: Extend,
    pub extent: f64,
}

pub(crate) fn build_ramp(gradient: &Gradient) -> Result<Ramp> {
    if gradient.stops.is_empty() {
        return Err(PrinterError::UnsupportedPaint(
            "gradient without stops".to_string(),
        ));
    }
    let stops: Vec<RampStop> = gradient
        .stops
        .iter()
        .map(|s| RampStop {
            offset: s.offset.clamp(0.0, 1.0),
            color: s.color,
            alpha: s.alpha.clamp(0.0, 1.0),
        })
        .collect();
    let repeat = gradient.repeat.clamp(1, MAX_GRADIENT_REPEAT);

    if gradient.wrap {
        return Ok(Ramp {
            stops: with_boundaries(stops),
            extend: if gradient.mirror {
                Extend::Reflect
            } else {
                Extend::Repeat
            },
            extent: 1.0 / repeat as f64,
        });
    }
    if repeat == 1 {
        return Ok(Ramp {
            stops: with_boundaries(stops),
            extend: Extend::Pad,
            extent: 1.0,
        });
    }

    let bands = repeat as f64;
    let mut out = Vec::with_capacity(stops.len() * repeat as usize + 2);
    for r in 0..repeat {
        let reverse = gradient.mirror && r % 2 == 1;
        let band = r as f64;
        let ordered: Vec<&RampStop> = if reverse {
            stops.iter().rev().collect()
        } else {
            stops.iter().collect()
        };
        let start = if reverse { 1.0 } else { 0.0 };
        let place = |offset: f64| {
            if reverse {
                (band + 1.0 - offset) / bands
            } else {
                (band + offset) / bands
            }
        };

        let (first, last) = (ordered[0], ordered[ordered.len() - 1]);
        let mut skip_first = false;
        if first.offset != start {
            // With mirroring the previous band already ended on this color.
            if r == 0 || !gradient.mirror {
                out.push(RampStop {
                    offset: band / bands,
                    ..*first
                });
            }
        } else if r > 0 && gradient.mirror {
            skip_first = true;
        }
        for (i, stop) in ordered.iter().enumerate() {
            if i == 0 && skip_first {
                continue;
            }
            out.push(RampStop {
                offset: place(stop.offset),
                ..**stop
            });
        }
        if last.offset != 1.0 - start {
            out.push(RampStop {
                offset: (band + 1.0) / bands,
                ..*last
            });
        }
    }
    Ok(Ramp {
        stops: out,
        extend: Extend::Pad,
        extent: 1.0,
    })
}

fn with_boundaries(mut stops: Vec<RampStop>) -> Vec<RampStop> {
    if let Some(first) = stops.first().copied() {
        if first.offset > 0.0 {
            stops.insert(0, RampStop { offset: 0.0, ..first });
        }
    }
    if let Some(last) = stops.last().copied() {
        if last.offset < 1.0 {
            stops.push(RampStop { offset: 1.0, ..last });
        }
    }
    stops
}

fn exponential(c0: Vec<Object>, c1: Vec<Object>) -> Dictionary {
    dictionary! {
        "FunctionType" => 2,
        "Domain" => vec![0.into(), 1.into()],
        "C0" => c0,
        "C1" => c1,
        "N" => 1,
    }
}

/// Function over [0, 1] interpolating one channel of the stops.
pub(crate) fn stops_function(stops: &[RampStop], channel: &dyn Fn(&RampStop) -> Vec<Object>) -> Dictionary {
    // Stops closer than the written precision would give non-increasing bounds.
    let segments: Vec<&[RampStop]> = stops
        .windows(2)
        .filter(|w| (w[1].offset as f32) > (w[0].offset as f32))
        .collect();
    match segments.as_slice() {
        [] => {
            let stop = stops.last().map(channel).unwrap_or_default();
            exponential(stop.clone(), stop)
        }
        [w] => exponential(channel(&w[0]), channel(&w[1])),
        _ => {
            let functions: Vec<Object> = segments
                .iter()
                .map(|w| exponential(channel(&w[0]), channel(&w[1])).into())
                .collect();
            let bounds: Vec<Object> = segments[1..].iter().map(|w| num(w[0].offset)).collect();
            let encode: Vec<Object> = segments
                .iter()
                .flat_map(|_| [Object::from(0), Object::from(1)])
                .collect();
            dictionary! {
                "FunctionType" => 3,
                "Domain" => vec![0.into(), 1.into()],
                "Functions" => functions,
                "Bounds" => bounds,
                "Encode" => encode,
            }
        }
    }
}

fn rgb(stop: &RampStop) -> Vec<Object> {
    vec![num(stop.color.red), num(stop.color.green), num(stop.color.blue)]
}

fn alpha(stop: &RampStop) -> Vec<Object> {
    vec![num(stop.alpha)]
}

fn shading_dict(kind: GradientKind, extent: f64, t0: i64, t1: i64, function: Object, space: &str) -> Result<Dictionary> {
    let (shading_type, coords): (i64, Vec<Object>) = match kind {
        GradientKind::Linear => (
            2,
            vec![num(t0 as f64 * extent), 0.into(), num(t1 as f64 * extent), 0.into()],
        ),
        GradientKind::Radial => (
            3,
            vec![0.into(), 0.into(), 0.into(), 0.into(), 0.into(), num(t1 as f64 * extent)],
        ),
        other => return Err(PrinterError::UnsupportedGradient(other)),
    };
    Ok(dictionary! {
        "ShadingType" => shading_type,
        "ColorSpace" => name(space),
        "Coords" => coords,
        "Domain" => vec![t0.into(), t1.into()],
        "Function" => function,
        "Extend" => vec![true.into(), true.into()],
    })
}

impl DocumentWriter {
    /// Sets `paint` as the fill or stroke source of the operations in `ops`.
    /// `transform` is the drawing transform already concatenated in `ops`.
    pub(crate) fn apply_paint(
        &mut self,
        ops: &mut Vec<Operation>,
        paint: &Paint<'_>,
        target: PaintTarget,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        match paint {
            Paint::None => {}
            Paint::Solid(c) => {
                ops.push(Operation::new(
                    target.color_op(),
                    vec![num(c.red), num(c.green), num(c.blue)],
                ));
            }
            Paint::Pattern(pattern) => {
                let id = self.tiling_pattern(pattern, transform)?;
                self.use_pattern(ops, id, target);
            }
            Paint::Gradient(gradient) => {
                let ramp = build_ramp(gradient)?;
                let (id, soft_mask) = self.shading_pattern(gradient, &ramp, transform, clip)?;
                if let Some(gs) = soft_mask {
                    ops.push(Operation::new("gs", vec![name(&gs)]));
                }
                self.use_pattern(ops, id, target);
            }
        }
        Ok(())
    }

    fn use_pattern(&mut self, ops: &mut Vec<Operation>, id: ObjectId, target: PaintTarget) {
        let pattern = self.resources.register(ResourceKind::Pattern, id);
        ops.push(Operation::new(target.space_op(), vec![name("Pattern")]));
        ops.push(Operation::new(target.pattern_op(), vec![name(&pattern)]));
    }

    /// Pattern space to the frame's base space: paint transform, then the
    /// drawing transform, then the base.
    fn pattern_matrix(&self, paint: &Transform, transform: &Transform) -> Result<Transform> {
        if paint.invert().is_none() {
            return Err(PrinterError::UnsupportedPaint(
                "singular paint transform".to_string(),
            ));
        }
        let base = self.frame_base()?;
        Ok(paint.then(transform).then(&base))
    }

    fn tiling_pattern(&mut self, pattern: &Pattern<'_>, transform: &Transform) -> Result<ObjectId> {
        let matrix = self.pattern_matrix(&pattern.transform, transform)?;
        let image_id = self.image_xobject(&pattern.image, true)?;
        let (w, h) = (pattern.image.width as f64, pattern.image.height as f64);

        let cell = Content {
            operations: vec![
                op("q"),
                Operation::new("cm", matrix_operands(&image_placement(w, h))),
                Operation::new("Do", vec![name("Im")]),
                op("Q"),
            ],
        }
        .encode()?;
        let dict = dictionary! {
            "Type" => "Pattern",
            "PatternType" => 1,
            "PaintType" => 1,
            "TilingType" => 1,
            "BBox" => vec![0.into(), 0.into(), num(w), num(h)],
            "XStep" => num(w),
            "YStep" => num(h),
            "Matrix" => matrix_operands(&matrix),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im" => image_id,
                },
            },
        };
        Ok(self.doc.add_object(Stream::new(dict, cell)))
    }

    /// Shading pattern for `gradient`, plus the name of a soft-mask graphics
    /// state when any stop is translucent.
    fn shading_pattern(
        &mut self,
        gradient: &Gradient,
        ramp: &Ramp,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<(ObjectId, Option<String>)> {
        if !matches!(gradient.kind, GradientKind::Linear | GradientKind::Radial) {
            return Err(PrinterError::UnsupportedGradient(gradient.kind));
        }
        let matrix = self.pattern_matrix(&gradient.transform, transform)?;
        let periods = i64::from(self.config.wrap_periods());
        let (t0, t1) = match (ramp.extend, gradient.kind) {
            (Extend::Pad, _) => (0, 1),
            (_, GradientKind::Linear) => (-periods, periods),
            _ => (0, periods),
        };

        let color = self.ramp_function(ramp, t0, t1, &rgb);
        let shading = shading_dict(gradient.kind, ramp.extent, t0, t1, color, "DeviceRGB")?;
        let shading_id = self.doc.add_object(shading);
        let pattern_id = self.doc.add_object(dictionary! {
            "Type" => "Pattern",
            "PatternType" => 2,
            "Shading" => shading_id,
            "Matrix" => matrix_operands(&matrix),
        });

        if ramp.stops.iter().all(|s| s.alpha >= 1.0) {
            return Ok((pattern_id, None));
        }
        let bbox = mask_bbox(transform, clip)?;
        let coverage = self.ramp_function(ramp, t0, t1, &alpha);
        let mask_shading = shading_dict(gradient.kind, ramp.extent, t0, t1, coverage, "DeviceGray")?;
        let mask_shading_id = self.doc.add_object(mask_shading);
        let form_content = Content {
            operations: vec![
                op("q"),
                Operation::new("cm", matrix_operands(&gradient.transform)),
                Operation::new("sh", vec![name("Sh")]),
                op("Q"),
            ],
        }
        .encode()?;
        let form = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => bbox,
            "Group" => dictionary! {
                "Type" => "Group",
                "S" => "Transparency",
                "CS" => "DeviceGray",
            },
            "Resources" => dictionary! {
                "Shading" => dictionary! {
                    "Sh" => mask_shading_id,
                },
            },
        };
        let form_id = self.doc.add_object(Stream::new(form, form_content));
        let gs_id = self.doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "SMask" => dictionary! {
                "Type" => "Mask",
                "S" => "Luminosity",
                "G" => form_id,
            },
        });
        Ok((pattern_id, Some(self.resources.register(ResourceKind::ExtGState, gs_id))))
    }

    /// Function over `[t0, t1]`. Padded ramps use the stop function directly;
    /// wrapped ones tile it once per unit period.
    fn ramp_function(
        &mut self,
        ramp: &Ramp,
        t0: i64,
        t1: i64,
        channel: &dyn Fn(&RampStop) -> Vec<Object>,
    ) -> Object {
        let stops = stops_function(&ramp.stops, channel);
        if ramp.extend == Extend::Pad {
            return stops.into();
        }
        let stops_id = self.doc.add_object(stops);
        let functions: Vec<Object> = (t0..t1).map(|_| stops_id.into()).collect();
        let bounds: Vec<Object> = (t0 + 1..t1).map(Object::from).collect();
        let encode: Vec<Object> = (t0..t1)
            .flat_map(|period| {
                if ramp.extend == Extend::Reflect && period.rem_euclid(2) == 1 {
                    [Object::from(1), Object::from(0)]
                } else {
                    [Object::from(0), Object::from(1)]
                }
            })
            .collect();
        dictionary! {
            "FunctionType" => 3,
            "Domain" => vec![t0.into(), t1.into()],
            "Functions" => functions,
            "Bounds" => bounds,
            "Encode" => encode,
        }
        .into()
    }
}

/// Maps the unit square onto a `w x h` image placed top-down.
pub(crate) fn image_placement(w: f64, h: f64) -> Transform {
    Transform {
        scale_x: w,
        scale_y: -h,
        translate_y: h,
        ..Transform::IDENTITY
    }
}

/// The clip rectangle in drawing space, as a form bounding box.
fn mask_bbox(transform: &Transform, clip: &Rectangle) -> Result<Vec<Object>> {
    let inverse = transform.invert().ok_or_else(|| {
        PrinterError::UnsupportedPaint("singular transform for translucent gradient".to_string())
    })?;
    let corners = [
        Point::new(clip.left, clip.top),
        Point::new(clip.right, clip.top),
        Point::new(clip.right, clip.bottom),
        Point::new(clip.left, clip.bottom),
    ]
    .map(|p| inverse.transform_point(p));
    let (mut min, mut max) = (corners[0], corners[0]);
    for p in &corners[1..] {
        min = Point::new(min.x.min(p.x), min.y.min(p.y));
        max = Point::new(max.x.max(p.x), max.y.max(p.y));
    }
    Ok(vec![num(min.x), num(min.y), num(max.x), num(max.y)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GradientStop;

    fn gradient(stops: &[(f64, Color)], repeat: u32, mirror: bool, wrap: bool) -> Gradient {
        Gradient {
            kind: GradientKind::Linear,
            stops: stops
                .iter()
                .map(|(offset, color)| GradientStop::new(*color, 1.0, *offset))
                .collect(),
            mirror,
            wrap,
            repeat,
            transform: Transform::IDENTITY,
        }
    }

    fn offsets_and_colors(ramp: &Ramp) -> Vec<(f64, Color)> {
        ramp.stops.iter().map(|s| (s.offset, s.color)).collect()
    }

    const RED: Color = Color::new(1.0, 0.0, 0.0);
    const BLUE: Color = Color::new(0.0, 0.0, 1.0);

    #[test]
    fn boundary_stops_are_synthesised() {
        let ramp = build_ramp(&gradient(&[(0.25, RED), (0.75, BLUE)], 1, false, false)).unwrap();
        assert_eq!(
            offsets_and_colors(&ramp),
            vec![(0.0, RED), (0.25, RED), (0.75, BLUE), (1.0, BLUE)]
        );
        assert_eq!(ramp.extend, Extend::Pad);
    }

    #[test]
    fn single_stop_covers_the_ramp() {
        let ramp = build_ramp(&gradient(&[(0.5, RED)], 1, false, false)).unwrap();
        assert_eq!(offsets_and_colors(&ramp), vec![(0.0, RED), (0.5, RED), (1.0, RED)]);
    }

    #[test]
    fn mirrored_bands_ping_pong() {
        let g = gradient(&[(0.0, Color::BLACK), (1.0, Color::WHITE)], 2, true, false);
        let ramp = build_ramp(&g).unwrap();
        assert_eq!(
            offsets_and_colors(&ramp),
            vec![(0.0, Color::BLACK), (0.5, Color::WHITE), (1.0, Color::BLACK)]
        );
    }

    #[test]
    fn hard_repeat_has_seams() {
        let g = gradient(&[(0.0, Color::BLACK), (1.0, Color::WHITE)], 2, false, false);
        let ramp = build_ramp(&g).unwrap();
        assert_eq!(
            offsets_and_colors(&ramp),
            vec![
                (0.0, Color::BLACK),
                (0.5, Color::WHITE),
                (0.5, Color::BLACK),
                (1.0, Color::WHITE)
            ]
        );
    }

    #[test]
    fn mirrored_bands_synthesise_outer_boundaries_only() {
        let g = gradient(&[(0.25, Color::BLACK), (0.75, Color::WHITE)], 2, true, false);
        let ramp = build_ramp(&g).unwrap();
        assert_eq!(
            offsets_and_colors(&ramp),
            vec![
                (0.0, Color::BLACK),
                (0.125, Color::BLACK),
                (0.375, Color::WHITE),
                (0.5, Color::WHITE),
                (0.625, Color::WHITE),
                (0.875, Color::BLACK),
                (1.0, Color::BLACK),
            ]
        );
    }

    #[test]
    fn wrap_shrinks_extent() {
        let g = gradient(&[(0.0, RED), (1.0, BLUE)], 4, true, true);
        let ramp = build_ramp(&g).unwrap();
        assert_eq!(ramp.extend, Extend::Reflect);
        assert_eq!(ramp.extent, 0.25);
        assert_eq!(ramp.stops.len(), 2);
    }

    #[test]
    fn repeat_count_is_bounded() {
        let g = gradient(&[(0.0, RED), (1.0, BLUE)], u32::MAX, false, false);
        let ramp = build_ramp(&g).unwrap();
        assert_eq!(ramp.stops.len(), 2 * MAX_GRADIENT_REPEAT as usize);
        assert_eq!(ramp.stops[1].offset, 1.0 / MAX_GRADIENT_REPEAT as f64);

        let wrapped = build_ramp(&gradient(&[(0.0, RED), (1.0, BLUE)], u32::MAX, false, true)).unwrap();
        assert_eq!(wrapped.extent, 1.0 / MAX_GRADIENT_REPEAT as f64);
    }

    #[test]
    fn empty_gradient_is_rejected() {
        assert!(matches!(
            build_ramp(&gradient(&[], 1, false, false)),
            Err(PrinterError::UnsupportedPaint(_))
        ));
    }

    #[test]
    fn stitching_skips_zero_length_segments() {
        let ramp = build_ramp(&gradient(
            &[(0.0, Color::BLACK), (1.0, Color::WHITE)],
            2,
            false,
            false,
        ))
        .unwrap();
        let function = stops_function(&ramp.stops, &rgb);
        assert_eq!(function.get(b"FunctionType").unwrap(), &Object::from(3));
        assert_eq!(
            function.get(b"Bounds").unwrap(),
            &Object::Array(vec![num(0.5)])
        );
        assert_eq!(
            function.get(b"Functions").unwrap().as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn two_stops_make_one_exponential_function() {
        let ramp = build_ramp(&gradient(&[(0.0, RED), (1.0, BLUE)], 1, false, false)).unwrap();
        let function = stops_function(&ramp.stops, &rgb);
        assert_eq!(function.get(b"FunctionType").unwrap(), &Object::from(2));
        assert_eq!(
            function.get(b"C1").unwrap(),
            &Object::Array(vec![num(0.0), num(0.0), num(1.0)])
        );
    }

    #[test]
    fn exotic_gradients_have_no_shading() {
        assert!(matches!(
            shading_dict(GradientKind::Conical, 1.0, 0, 1, Object::Null, "DeviceRGB"),
            Err(PrinterError::UnsupportedGradient(GradientKind::Conical))
        ));
    }
}
