//! The printing device contract.
//!
//! A print job driver calls a device in strict sequence:
//!
//! ```text
//! begin_document
//!   begin_page
//!     (fill_path | stroke_path | draw_image | draw_text
//!      | make_anchor | make_link | make_bookmark
//!      | begin_group ... end_group)*
//!   end_page
//!   ...
//! end_document
//! ```
//!
//! Any error is fatal for the whole job: the driver stops, calls
//! [`PrintingDevice::abort_document`] and then drops (or destroys) the
//! device. Before issuing a primitive the driver asks the matching
//! `can_render_*` probe and substitutes a fallback when it says no.

use crate::errors::Result;
use crate::types::{
    Document, FillRule, Font, Glyph, Group, Image, ImageKind, LinkType, Page, Paint, PaintKind,
    Path, Point, Rectangle, Stroke, Transform,
};

pub trait PrintingDevice {
    /// Message of the most recent failure, if any.
    fn error(&self) -> Option<&str>;

    /// Capability probes. They look only at discriminators and never change
    /// device state.
    fn can_render_paint(&self, paint: PaintKind) -> bool;
    fn can_render_image(&self, image: ImageKind) -> bool;
    fn can_render_group(&self, group: &Group) -> bool;

    fn begin_document(&mut self, document: &Document) -> Result<()>;
    /// Unconditional cleanup after a failure. Never reports errors.
    fn abort_document(&mut self);
    fn end_document(&mut self) -> Result<()>;

    fn begin_page(&mut self, page: &Page) -> Result<()>;
    fn end_page(&mut self) -> Result<()>;

    /// Only called when `can_render_group` accepted equivalent parameters.
    fn begin_group(&mut self, group: &Group) -> Result<()>;
    fn end_group(&mut self) -> Result<()>;

    /// Fills `path` (path space) with `paint`, then applies `transform`,
    /// then clips to `clip` (device space).
    fn fill_path(
        &mut self,
        path: &Path,
        rule: FillRule,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()>;

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &Stroke,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()>;

    /// Places `image` at its natural pixel size, then applies `transform`.
    fn draw_image(&mut self, image: &Image<'_>, transform: &Transform, clip: &Rectangle)
    -> Result<()>;

    /// Draws shaped glyphs. `clusters[i]` is the index of the first glyph of
    /// the cluster containing byte `i` of `text`.
    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &mut self,
        glyphs: &[Glyph],
        text: &str,
        clusters: &[u32],
        font: &Font,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()>;

    /// Anchors whose name looks like a URI are skipped with a warning.
    fn make_anchor(&mut self, position: Point, name: &str) -> Result<()>;
    fn make_link(&mut self, area: Rectangle, link: &str, link_type: LinkType) -> Result<()>;
    /// A `depth` of 0 reuses the last explicit depth.
    fn make_bookmark(&mut self, position: Point, title: &str, depth: u32, closed: bool)
    -> Result<()>;

    /// Releases every resource held by the device.
    fn destroy(self: Box<Self>) {}
}

/// Whether `name` starts with a URI scheme: one or more ASCII letters
/// followed by `:`.
pub fn looks_like_uri(name: &str) -> bool {
    match name.find(':') {
        Some(0) | None => false,
        Some(colon) => name[..colon].bytes().all(|b| b.is_ascii_alphabetic()),
    }
}
