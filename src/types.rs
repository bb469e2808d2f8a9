//! Plain value types passed across the printing device interface.
//!
//! Coordinates are in points (1/72 inch) with the origin at the top-left of
//! the page and y growing downwards. Colors are normalised to [0, 1].

use cgmath::{Matrix3, SquareMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rectangle {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Affine transform. A point maps as
/// `x' = scale_x * x + skew_x * y + translate_x`,
/// `y' = skew_y * x + scale_y * y + translate_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale_x: f64,
    pub skew_x: f64,
    pub translate_x: f64,
    pub skew_y: f64,
    pub scale_y: f64,
    pub translate_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        scale_x: 1.0,
        skew_x: 0.0,
        translate_x: 0.0,
        skew_y: 0.0,
        scale_y: 1.0,
        translate_y: 0.0,
    };

    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            translate_x: x,
            translate_y: y,
            ..Self::IDENTITY
        }
    }

    pub fn scale(x: f64, y: f64) -> Self {
        Self {
            scale_x: x,
            scale_y: y,
            ..Self::IDENTITY
        }
    }

    /// The six operands in PDF `cm` order: `[a b c d e f]`.
    pub fn to_pdf_array(&self) -> [f64; 6] {
        [
            self.scale_x,
            self.skew_y,
            self.skew_x,
            self.scale_y,
            self.translate_x,
            self.translate_y,
        ]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn transform_point(&self, p: Point) -> Point {
        Point {
            x: self.scale_x * p.x + self.skew_x * p.y + self.translate_x,
            y: self.skew_y * p.x + self.scale_y * p.y + self.translate_y,
        }
    }

    /// Transform applying `self` first, then `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        Transform::from(next.matrix() * self.matrix())
    }

    /// Inverse transform, `None` when the matrix is singular.
    pub fn invert(&self) -> Option<Transform> {
        self.matrix().invert().map(Transform::from)
    }

    fn matrix(&self) -> Matrix3<f64> {
        // cgmath matrices are column major
        Matrix3::new(
            self.scale_x,
            self.skew_y,
            0.0,
            self.skew_x,
            self.scale_y,
            0.0,
            self.translate_x,
            self.translate_y,
            1.0,
        )
    }
}

impl From<Matrix3<f64>> for Transform {
    fn from(m: Matrix3<f64>) -> Self {
        Transform {
            scale_x: m.x.x,
            skew_y: m.x.y,
            skew_x: m.y.x,
            scale_y: m.y.y,
            translate_x: m.z.x,
            translate_y: m.z.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCommand {
    MoveTo,
    LineTo,
    CubicTo,
    QuadraticTo,
    Close,
    End,
}

impl PathCommand {
    /// Number of points the command consumes from the coordinate stream.
    pub fn point_count(self) -> usize {
        match self {
            PathCommand::MoveTo | PathCommand::LineTo => 1,
            PathCommand::QuadraticTo => 2,
            PathCommand::CubicTo => 3,
            PathCommand::Close | PathCommand::End => 0,
        }
    }
}

/// A command stream with its coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub commands: Vec<PathCommand>,
    pub coords: Vec<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.commands.push(PathCommand::MoveTo);
        self.coords.push(Point::new(x, y));
        self
    }

    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        self.commands.push(PathCommand::LineTo);
        self.coords.push(Point::new(x, y));
        self
    }

    pub fn quadratic_to(mut self, c: Point, to: Point) -> Self {
        self.commands.push(PathCommand::QuadraticTo);
        self.coords.extend([c, to]);
        self
    }

    pub fn cubic_to(mut self, c1: Point, c2: Point, to: Point) -> Self {
        self.commands.push(PathCommand::CubicTo);
        self.coords.extend([c1, c2, to]);
        self
    }

    pub fn close(mut self) -> Self {
        self.commands.push(PathCommand::Close);
        self
    }

    /// Terminates the command stream.
    pub fn finish(mut self) -> Self {
        self.commands.push(PathCommand::End);
        self
    }

    /// Closed rectangle, already terminated.
    pub fn rectangle(rect: Rectangle) -> Self {
        Path::new()
            .move_to(rect.left, rect.top)
            .line_to(rect.right, rect.top)
            .line_to(rect.right, rect.bottom)
            .line_to(rect.left, rect.bottom)
            .close()
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapStyle {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
    Bevel,
    Round,
    Miter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub thickness: f64,
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub miter_limit: f64,
    /// Dash lengths; empty means a solid stroke.
    pub dashes: Vec<f64>,
    pub dash_offset: f64,
    /// Vertical pen scale relative to the horizontal one.
    pub aspect: f64,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            miter_limit: 10.0,
            dashes: Vec::new(),
            dash_offset: 0.0,
            aspect: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    None,
    /// 32-bit pixels, alpha byte ignored.
    RawXrgb,
    /// 32-bit pixels with a sharp (0 or opaque) alpha mask.
    RawMrgb,
    /// 32-bit pixels with straight alpha.
    RawArgb,
    Gif,
    Jpeg,
    Png,
}

/// An image as handed over by the caller. Raw kinds store native-endian
/// `0xAARRGGBB` pixels; encoded kinds store the file bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Image<'a> {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl<'a> Image<'a> {
    pub fn new(kind: ImageKind, width: u32, height: u32, data: &'a [u8]) -> Self {
        Self {
            kind,
            width,
            height,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientKind {
    Linear,
    Radial,
    Conical,
    Diamond,
    Spiral,
    Xy,
    SqrtXy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub color: Color,
    pub alpha: f64,
    pub offset: f64,
}

impl GradientStop {
    pub const fn new(color: Color, alpha: f64, offset: f64) -> Self {
        Self {
            color,
            alpha,
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    /// Weakly increasing by offset.
    pub stops: Vec<GradientStop>,
    pub mirror: bool,
    pub wrap: bool,
    pub repeat: u32,
    /// Maps the unit ramp into paint space.
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pattern<'a> {
    pub image: Image<'a>,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint<'a> {
    None,
    Solid(Color),
    Pattern(Pattern<'a>),
    Gradient(Gradient),
}

impl Paint<'_> {
    pub fn kind(&self) -> PaintKind {
        match self {
            Paint::None => PaintKind::None,
            Paint::Solid(_) => PaintKind::Solid,
            Paint::Pattern(p) => PaintKind::Pattern(p.image.kind),
            Paint::Gradient(g) => PaintKind::Gradient(g.kind),
        }
    }
}

/// The discriminators of a [`Paint`], as seen by capability probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintKind {
    None,
    Solid,
    Pattern(ImageKind),
    Gradient(GradientKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Src,
    Dst,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcAtop,
    DstAtop,
    Xor,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Dodge,
    Burn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Group {
    pub region: Rectangle,
    pub blend_mode: BlendMode,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Unspecified,
    Anchor,
    Uri,
}

/// Opaque platform font handle, compared by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub handle: FontHandle,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub title: String,
    pub filename: String,
    /// Metadata bag, e.g. `("Author", "...")`.
    pub options: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn transform_then_applies_in_order() {
        let t = Transform::scale(2.0, 3.0).then(&Transform::translate(10.0, 20.0));
        let p = t.transform_point(Point::new(1.0, 1.0));
        assert!(approx(p.x, 12.0));
        assert!(approx(p.y, 23.0));
    }

    #[test]
    fn transform_invert_round_trips() {
        let t = Transform {
            scale_x: 2.0,
            skew_x: 0.5,
            translate_x: 4.0,
            skew_y: -1.0,
            scale_y: 3.0,
            translate_y: 7.0,
        };
        let inv = t.invert().unwrap();
        let p = inv.transform_point(t.transform_point(Point::new(3.0, -2.0)));
        assert!(approx(p.x, 3.0));
        assert!(approx(p.y, -2.0));
    }

    #[test]
    fn singular_transform_has_no_inverse() {
        assert!(Transform::scale(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn rectangle_path_is_terminated() {
        let path = Path::rectangle(Rectangle::new(0.0, 0.0, 10.0, 5.0));
        assert_eq!(path.commands.first(), Some(&PathCommand::MoveTo));
        assert_eq!(path.commands.last(), Some(&PathCommand::End));
        assert_eq!(path.coords.len(), 4);
    }

    #[test]
    fn paint_kind_reports_discriminators() {
        let data = [0u8; 4];
        let paint = Paint::Pattern(Pattern {
            image: Image::new(ImageKind::RawXrgb, 1, 1, &data),
            transform: Transform::IDENTITY,
        });
        assert_eq!(paint.kind(), PaintKind::Pattern(ImageKind::RawXrgb));
        assert_eq!(Paint::Solid(Color::BLACK).kind(), PaintKind::Solid);
    }
}
