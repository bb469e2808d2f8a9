//! The in-progress PDF document: page tree, compositing frames and the
//! deferred objects written at the end.

use super::content::{self, Frame, clip_to, concat, op};
use super::images::ImageKey;
use super::navigation::{Destinations, OutlineEntry};
use super::resources::{ResourceKind, Resources};
use super::text::FontEntry;
use crate::config::PrinterConfig;
use crate::errors::{PrinterError, Result};
use crate::platform::Timestamp;
use crate::types::{
    BlendMode, Document, FillRule, FontHandle, Group, Page, Paint, Path, Rectangle, Stroke,
    Transform,
};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use fxhash::FxHashMap;
use lopdf::content::{Content, Operation};
use lopdf::xref::XrefType;
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

const METADATA_KEYS: [&str; 6] = ["Title", "Author", "Subject", "Keywords", "Creator", "Producer"];

pub(crate) struct PageState {
    pub id: ObjectId,
    pub width: f64,
    pub height: f64,
    pub frames: Vec<Frame>,
    pub annotations: Vec<ObjectId>,
}

pub(crate) struct DocumentWriter {
    pub doc: lopdf::Document,
    pub config: PrinterConfig,
    pub resources: Resources,
    pub images: FxHashMap<ImageKey, ObjectId>,
    pub fonts: FxHashMap<FontHandle, FontEntry>,
    pub outlines: Vec<OutlineEntry>,
    pub page: Option<PageState>,
    path: PathBuf,
    output: BufWriter<File>,
    pages_id: ObjectId,
    resources_id: ObjectId,
    page_ids: Vec<ObjectId>,
    info: Dictionary,
}

impl DocumentWriter {
    /// Opens the output file right away so a bad path is reported before any
    /// drawing happens.
    pub fn create(config: &PrinterConfig, document: &Document, created: Timestamp) -> Result<Self> {
        let path = PathBuf::from(&document.filename);
        let output = BufWriter::new(File::create(&path)?);

        let mut doc = lopdf::Document::with_version(config.pdf_version.as_str());
        doc.reference_table.cross_reference_type = XrefType::CrossReferenceTable;
        let pages_id = doc.new_object_id();
        let resources_id = doc.new_object_id();

        log::debug!("Started document {}", path.display());
        Ok(DocumentWriter {
            doc,
            config: config.clone(),
            resources: Resources::default(),
            images: FxHashMap::default(),
            fonts: FxHashMap::default(),
            outlines: Vec::new(),
            page: None,
            path,
            output,
            pages_id,
            resources_id,
            page_ids: Vec::new(),
            info: document_info(config, document, created),
        })
    }

    pub fn begin_page(&mut self, page: &Page) -> Result<()> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(page.width) || !valid(page.height) {
            return Err(PrinterError::InvalidPage(format!(
                "size {} x {}",
                page.width, page.height
            )));
        }
        let flip = content::page_flip(page.height);
        let mut ops = Vec::new();
        concat(&mut ops, &flip);
        self.page = Some(PageState {
            id: self.doc.new_object_id(),
            width: page.width,
            height: page.height,
            frames: vec![Frame {
                ops,
                base: flip,
                group: None,
            }],
            annotations: Vec::new(),
        });
        log::debug!(
            "Page {} is {} x {} (scale {})",
            self.page_ids.len() + 1,
            page.width,
            page.height,
            page.scale
        );
        Ok(())
    }

    pub fn end_page(&mut self) -> Result<()> {
        let page = self.page.take().ok_or(PrinterError::InvalidState {
            operation: "end_page",
            state: "no page is open",
        })?;
        if page.frames.len() != 1 {
            self.page = Some(page);
            return Err(PrinterError::UnbalancedGroup("end_page with open groups"));
        }
        let PageState {
            id,
            width,
            height,
            mut frames,
            annotations,
        } = page;
        let ops = frames.pop().map(|f| f.ops).unwrap_or_default();
        let content_id = self.content_stream(dictionary! {}, ops)?;

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), content::num(width), content::num(height)],
            "Contents" => content_id,
            "Resources" => self.resources_id,
        };
        if !annotations.is_empty() {
            let annots: Vec<Object> = annotations.into_iter().map(Object::from).collect();
            page_dict.set("Annots", annots);
        }
        self.doc.set_object(id, page_dict);
        self.page_ids.push(id);
        Ok(())
    }

    pub fn page(&self) -> Result<&PageState> {
        self.page.as_ref().ok_or(PrinterError::InvalidState {
            operation: "drawing",
            state: "no page is open",
        })
    }

    pub fn page_mut(&mut self) -> Result<&mut PageState> {
        self.page.as_mut().ok_or(PrinterError::InvalidState {
            operation: "drawing",
            state: "no page is open",
        })
    }

    pub fn group_depth(&self) -> usize {
        self.page
            .as_ref()
            .map_or(0, |page| page.frames.len().saturating_sub(1))
    }

    /// Transform from the current frame's space to its pattern space.
    pub fn frame_base(&self) -> Result<Transform> {
        let page = self.page()?;
        Ok(page.frames.last().map_or(Transform::IDENTITY, |f| f.base))
    }

    /// Appends finished operations to the innermost frame.
    pub fn emit(&mut self, ops: Vec<Operation>) -> Result<()> {
        let page = self.page_mut()?;
        match page.frames.last_mut() {
            Some(frame) => frame.ops.extend(ops),
            None => return Err(PrinterError::UnbalancedGroup("page without a frame")),
        }
        Ok(())
    }

    pub fn begin_group(&mut self, group: &Group) -> Result<()> {
        let mut ops = Vec::new();
        clip_to(&mut ops, &group.region);
        self.page_mut()?.frames.push(Frame {
            ops,
            base: Transform::IDENTITY,
            group: Some(*group),
        });
        log::trace!("Group {:?} opened at depth {}", group.blend_mode, self.group_depth());
        Ok(())
    }

    pub fn end_group(&mut self) -> Result<()> {
        let page = self.page_mut()?;
        if page.frames.len() < 2 {
            return Err(PrinterError::UnbalancedGroup("end_group without begin_group"));
        }
        let Some(Frame {
            ops,
            group: Some(group),
            ..
        }) = page.frames.pop()
        else {
            return Err(PrinterError::UnbalancedGroup("page frame popped as a group"));
        };

        if group.blend_mode == BlendMode::Dst {
            log::debug!("Discarding group with destination blending");
            return Ok(());
        }
        let blend = blend_mode_name(group.blend_mode).ok_or(PrinterError::InvalidGroup {
            blend: group.blend_mode,
            opacity: group.opacity,
        })?;

        let r = &group.region;
        let form = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![
                content::num(r.left.min(r.right)),
                content::num(r.top.min(r.bottom)),
                content::num(r.left.max(r.right)),
                content::num(r.top.max(r.bottom)),
            ],
            "Group" => dictionary! {
                "Type" => "Group",
                "S" => "Transparency",
                "I" => true,
            },
            "Resources" => self.resources_id,
        };
        let form_id = self.content_stream(form, ops)?;
        let opacity = group.opacity.clamp(0.0, 1.0);
        let gs_id = self.doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "BM" => blend,
            "ca" => content::num(opacity),
            "CA" => content::num(opacity),
        });
        let form_name = self.resources.register(ResourceKind::XObject, form_id);
        let gs_name = self.resources.register(ResourceKind::ExtGState, gs_id);
        self.emit(vec![
            op("q"),
            Operation::new("gs", vec![content::name(&gs_name)]),
            Operation::new("Do", vec![content::name(&form_name)]),
            op("Q"),
        ])
    }

    pub fn fill_path(
        &mut self,
        path: &Path,
        rule: FillRule,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let mut ops = vec![op("q")];
        clip_to(&mut ops, clip);
        concat(&mut ops, transform);
        self.apply_paint(&mut ops, paint, super::paint::PaintTarget::Fill, transform, clip)?;
        if content::append_path(&mut ops, path, &Transform::IDENTITY)? {
            ops.push(op(match rule {
                FillRule::NonZero => "f",
                FillRule::EvenOdd => "f*",
            }));
        }
        ops.push(op("Q"));
        self.emit(ops)
    }

    pub fn stroke_path(
        &mut self,
        path: &Path,
        stroke: &Stroke,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let mut ops = vec![op("q")];
        clip_to(&mut ops, clip);
        concat(&mut ops, transform);
        self.apply_paint(&mut ops, paint, super::paint::PaintTarget::Stroke, transform, clip)?;
        content::stroke_style(&mut ops, stroke);

        // The pen is scaled by setting up the scaled space first and
        // replaying the path through the inverse, since `cm` is not allowed
        // between path construction and painting.
        let aspect = content::stroke_aspect(stroke);
        let unscale = aspect.invert().unwrap_or(Transform::IDENTITY);
        concat(&mut ops, &aspect);
        if content::append_path(&mut ops, path, &unscale)? {
            ops.push(op("S"));
        }
        ops.push(op("Q"));
        self.emit(ops)
    }

    /// Content streams honour the compression setting.
    pub fn content_stream(&mut self, dict: Dictionary, ops: Vec<Operation>) -> Result<ObjectId> {
        let data = Content { operations: ops }.encode()?;
        let stream = if self.config.compress_streams {
            compressed_stream(dict, &data)?
        } else {
            Stream::new(dict, data)
        };
        Ok(self.doc.add_object(stream))
    }

    /// Writes every deferred object and serialises the document.
    pub fn finish(mut self, destinations: &Destinations) -> Result<()> {
        self.write_fonts()?;

        let resources = self.resources.to_dictionary();
        self.doc.set_object(self.resources_id, resources);

        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        let page_count = kids.len() as i64;
        self.doc.set_object(
            self.pages_id,
            dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            },
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };
        if let Some(dests) = destinations.names_tree() {
            catalog.set("Names", dictionary! { "Dests" => dests });
        }
        destinations.warn_undefined();
        let outlines = std::mem::take(&mut self.outlines);
        if let Some(outlines_id) = super::navigation::write_outlines(&mut self.doc, &outlines) {
            catalog.set("Outlines", outlines_id);
            catalog.set("PageMode", "UseOutlines");
        }
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", catalog_id);

        let info_id = self.doc.add_object(std::mem::take(&mut self.info));
        self.doc.trailer.set("Info", info_id);

        self.doc.save_to(&mut self.output)?;
        self.output.flush()?;
        log::debug!(
            "Wrote {} pages to {}",
            self.page_ids.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Flate-compressed stream, used for binary data regardless of settings.
pub(crate) fn compressed_stream(mut dict: Dictionary, data: &[u8]) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    dict.set("Filter", "FlateDecode");
    Ok(Stream::new(dict, compressed))
}

/// PDF text string: literal for ASCII, UTF-16BE with a byte order mark
/// otherwise.
pub(crate) fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        Object::string_literal(s)
    } else {
        let mut bytes = vec![0xfe, 0xff];
        for unit in s.encode_utf16() {
            bytes.extend(unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn document_info(config: &PrinterConfig, document: &Document, created: Timestamp) -> Dictionary {
    let mut info = Dictionary::new();
    if !document.title.is_empty() {
        info.set("Title", text_string(&document.title));
    }
    for (key, value) in &document.options {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let key = METADATA_KEYS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(key))
            .copied()
            .unwrap_or(key);
        info.set(key, text_string(value));
    }
    if !info.has(b"Producer") {
        info.set("Producer", text_string(&config.producer));
    }
    let date = created.to_pdf_date();
    info.set("CreationDate", Object::string_literal(date.clone()));
    info.set("ModDate", Object::string_literal(date));
    info
}

/// PDF blend mode for a group, `None` for Porter-Duff operators PDF cannot
/// express.
pub(crate) fn blend_mode_name(mode: BlendMode) -> Option<&'static str> {
    let name = match mode {
        BlendMode::SrcOver => "Normal",
        BlendMode::Multiply => "Multiply",
        BlendMode::Screen => "Screen",
        BlendMode::Overlay => "Overlay",
        BlendMode::Darken => "Darken",
        BlendMode::Lighten => "Lighten",
        BlendMode::Dodge => "ColorDodge",
        BlendMode::Burn => "ColorBurn",
        BlendMode::HardLight => "HardLight",
        BlendMode::SoftLight => "SoftLight",
        BlendMode::Difference => "Difference",
        BlendMode::Exclusion => "Exclusion",
        _ => return None,
    };
    Some(name)
}
