//! PDF printing device.
//!
//! Drawing calls are turned into PDF content operators as they arrive; fonts,
//! named destinations, outlines and the page tree are written when the
//! document ends. Nested groups are kept as a stack of content frames, each
//! becoming a transparency group form when it is closed.

mod content;
mod images;
mod navigation;
mod paint;
mod resources;
mod text;
mod writer;

pub use navigation::{Destination, Destinations};

use crate::config::PrinterConfig;
use crate::device::{PrintingDevice, looks_like_uri};
use crate::errors::{PrinterError, Result};
use crate::platform::{FontFace, PlatformAdapter, SystemAdapter};
use crate::types::{
    BlendMode, Document, FillRule, Font, FontHandle, Glyph, Group, GradientKind, Image, ImageKind,
    LinkType, Page, Paint, PaintKind, Path, Point, Rectangle, Stroke, Transform,
};
use fxhash::FxHashMap;
use navigation::LinkAction;
use writer::DocumentWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    DocumentOpen,
    PageOpen,
    DocumentClosed,
}

impl DeviceState {
    fn describe(self) -> &'static str {
        match self {
            DeviceState::Uninitialized => "no document is open",
            DeviceState::DocumentOpen => "a document is open without a page",
            DeviceState::PageOpen => "a page is open",
            DeviceState::DocumentClosed => "the document is closed",
        }
    }
}

pub struct PdfPrintingDevice {
    config: PrinterConfig,
    adapter: Box<dyn PlatformAdapter>,
    state: DeviceState,
    writer: Option<DocumentWriter>,
    fonts: FxHashMap<FontHandle, FontFace>,
    destinations: Destinations,
    bookmark_depth: u32,
    last_error: Option<String>,
}

/// A PDF device with the configuration from the platform config directory
/// and fonts resolved from files on disk.
pub fn create_device() -> Box<dyn PrintingDevice> {
    Box::new(PdfPrintingDevice::new(
        PrinterConfig::load(),
        Box::new(SystemAdapter::new()),
    ))
}

impl PdfPrintingDevice {
    pub fn new(config: PrinterConfig, adapter: Box<dyn PlatformAdapter>) -> Self {
        PdfPrintingDevice {
            config,
            adapter,
            state: DeviceState::Uninitialized,
            writer: None,
            fonts: FxHashMap::default(),
            destinations: Destinations::default(),
            bookmark_depth: 1,
            last_error: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    /// Records a failure for `error()`.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::error!("{}", e);
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn expect_state(&self, operation: &'static str, expected: DeviceState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PrinterError::InvalidState {
                operation,
                state: self.state.describe(),
            })
        }
    }

    /// The writer of the open page.
    fn page_writer(&mut self, operation: &'static str) -> Result<&mut DocumentWriter> {
        self.expect_state(operation, DeviceState::PageOpen)?;
        self.writer.as_mut().ok_or(PrinterError::InvalidState {
            operation,
            state: "no document is open",
        })
    }

    fn font_face(&mut self, font: &Font) -> Result<FontFace> {
        if let Some(face) = self.fonts.get(&font.handle) {
            return Ok(face.clone());
        }
        let face = self.adapter.create_font_face(font)?;
        self.fonts.insert(font.handle, face.clone());
        Ok(face)
    }

    fn begin_document_inner(&mut self, document: &Document) -> Result<()> {
        if !matches!(
            self.state,
            DeviceState::Uninitialized | DeviceState::DocumentClosed
        ) {
            return Err(PrinterError::InvalidState {
                operation: "begin_document",
                state: self.state.describe(),
            });
        }
        let created = self.adapter.current_utc_timestamp();
        self.writer = Some(DocumentWriter::create(&self.config, document, created)?);
        self.destinations.clear();
        self.bookmark_depth = 1;
        self.state = DeviceState::DocumentOpen;
        Ok(())
    }

    fn end_document_inner(&mut self) -> Result<()> {
        self.expect_state("end_document", DeviceState::DocumentOpen)?;
        let writer = self.writer.take().ok_or(PrinterError::InvalidState {
            operation: "end_document",
            state: "no document is open",
        })?;
        self.state = DeviceState::DocumentClosed;
        writer.finish(&self.destinations)
    }

    fn begin_page_inner(&mut self, page: &Page) -> Result<()> {
        self.expect_state("begin_page", DeviceState::DocumentOpen)?;
        let writer = self.writer.as_mut().ok_or(PrinterError::InvalidState {
            operation: "begin_page",
            state: "no document is open",
        })?;
        writer.begin_page(page)?;
        self.state = DeviceState::PageOpen;
        Ok(())
    }

    fn end_page_inner(&mut self) -> Result<()> {
        self.page_writer("end_page")?.end_page()?;
        self.state = DeviceState::DocumentOpen;
        Ok(())
    }

    fn begin_group_inner(&mut self, group: &Group) -> Result<()> {
        if !self.can_render_group(group) {
            return Err(PrinterError::InvalidGroup {
                blend: group.blend_mode,
                opacity: group.opacity,
            });
        }
        self.page_writer("begin_group")?.begin_group(group)
    }

    fn make_link_inner(&mut self, area: Rectangle, link: &str, link_type: LinkType) -> Result<()> {
        self.expect_state("make_link", DeviceState::PageOpen)?;
        let dest = self.destinations.reference(link);
        let is_uri = match link_type {
            LinkType::Uri => true,
            LinkType::Anchor => false,
            LinkType::Unspecified => dest.is_url,
        };
        let target = dest.name.clone();
        let action = if is_uri {
            LinkAction::Uri(link)
        } else {
            LinkAction::Named(&target)
        };
        self.page_writer("make_link")?.add_link(&area, action)
    }

    fn make_anchor_inner(&mut self, position: Point, name: &str) -> Result<()> {
        if looks_like_uri(name) {
            log::warn!("Skipping anchor {:?}: the name looks like a URI", name);
            return Ok(());
        }
        let (page, x, y) = self.page_writer("make_anchor")?.page_target(position)?;
        self.destinations.define(name, page, x, y);
        Ok(())
    }

    fn make_bookmark_inner(&mut self, position: Point, title: &str, depth: u32, closed: bool) -> Result<()> {
        let depth = if depth == 0 {
            self.bookmark_depth
        } else {
            depth
        };
        self.page_writer("make_bookmark")?
            .add_outline(position, title, depth, closed)?;
        self.bookmark_depth = depth;
        Ok(())
    }
}

impl PrintingDevice for PdfPrintingDevice {
    fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn can_render_paint(&self, paint: PaintKind) -> bool {
        match paint {
            PaintKind::None => false,
            PaintKind::Solid => true,
            PaintKind::Pattern(image) => self.can_render_image(image),
            PaintKind::Gradient(kind) => matches!(kind, GradientKind::Linear | GradientKind::Radial),
        }
    }

    fn can_render_image(&self, image: ImageKind) -> bool {
        match image {
            ImageKind::RawXrgb | ImageKind::RawMrgb | ImageKind::RawArgb | ImageKind::Png => true,
            ImageKind::Jpeg => self.config.jpeg_passthrough,
            ImageKind::Gif | ImageKind::None => false,
        }
    }

    fn can_render_group(&self, group: &Group) -> bool {
        let opacity_ok = (0.0..=1.0).contains(&group.opacity);
        opacity_ok
            && (group.blend_mode == BlendMode::Dst || writer::blend_mode_name(group.blend_mode).is_some())
    }

    fn begin_document(&mut self, document: &Document) -> Result<()> {
        let result = self.begin_document_inner(document);
        self.track(result)
    }

    fn abort_document(&mut self) {
        if self.writer.take().is_some() {
            log::debug!("Document aborted");
        }
        self.state = DeviceState::Uninitialized;
    }

    fn end_document(&mut self) -> Result<()> {
        let result = self.end_document_inner();
        self.track(result)
    }

    fn begin_page(&mut self, page: &Page) -> Result<()> {
        let result = self.begin_page_inner(page);
        self.track(result)
    }

    fn end_page(&mut self) -> Result<()> {
        let result = self.end_page_inner();
        self.track(result)
    }

    fn begin_group(&mut self, group: &Group) -> Result<()> {
        let result = self.begin_group_inner(group);
        self.track(result)
    }

    fn end_group(&mut self) -> Result<()> {
        let result = self
            .page_writer("end_group")
            .and_then(|writer| writer.end_group());
        self.track(result)
    }

    fn fill_path(
        &mut self,
        path: &Path,
        rule: FillRule,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let result = self
            .page_writer("fill_path")
            .and_then(|writer| writer.fill_path(path, rule, paint, transform, clip));
        self.track(result)
    }

    fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &Stroke,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let result = self
            .page_writer("stroke_path")
            .and_then(|writer| writer.stroke_path(path, stroke, paint, transform, clip));
        self.track(result)
    }

    fn draw_image(&mut self, image: &Image<'_>, transform: &Transform, clip: &Rectangle) -> Result<()> {
        let result = self
            .page_writer("draw_image")
            .and_then(|writer| writer.draw_image(image, transform, clip));
        self.track(result)
    }

    fn draw_text(
        &mut self,
        glyphs: &[Glyph],
        text: &str,
        clusters: &[u32],
        font: &Font,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let result = self
            .expect_state("draw_text", DeviceState::PageOpen)
            .and_then(|_| self.font_face(font))
            .and_then(|face| {
                self.page_writer("draw_text")?
                    .draw_text(&face, glyphs, text, clusters, font, paint, transform, clip)
            });
        self.track(result)
    }

    fn make_anchor(&mut self, position: Point, name: &str) -> Result<()> {
        let result = self.make_anchor_inner(position, name);
        self.track(result)
    }

    fn make_link(&mut self, area: Rectangle, link: &str, link_type: LinkType) -> Result<()> {
        let result = self.make_link_inner(area, link, link_type);
        self.track(result)
    }

    fn make_bookmark(&mut self, position: Point, title: &str, depth: u32, closed: bool) -> Result<()> {
        let result = self.make_bookmark_inner(position, title, depth, closed);
        self.track(result)
    }
}

impl Drop for PdfPrintingDevice {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            log::debug!("Dropping device with an unfinished document");
        }
        self.fonts.clear();
        self.destinations.clear();
        crate::platform::reset_static_data();
    }
}
