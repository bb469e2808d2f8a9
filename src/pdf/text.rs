//! Glyph runs: cluster mapping, font resources and CID font embedding.
//!
//! Fonts are written as Type0 fonts with Identity-H encoding, so the bytes
//! shown are glyph ids. Text extraction goes through a ToUnicode CMap for
//! glyphs that stand for exactly one cluster, and through `/ActualText`
//! spans for everything else (ligatures, decomposed clusters).

use super::content::{clip_to, concat, name, num, op};
use super::paint::PaintTarget;
use super::resources::ResourceKind;
use super::writer::{DocumentWriter, compressed_stream, text_string};
use crate::errors::{PrinterError, Result};
use crate::platform::FontFace;
use crate::types::{Font, Glyph, Paint, Rectangle, Transform};
use lopdf::content::Operation;
use lopdf::{Dictionary, Object, ObjectId, StringFormat, dictionary};
use std::collections::BTreeMap;
use std::fmt::Write;

pub(crate) struct FontEntry {
    pub face: FontFace,
    /// Reserved for the Type0 dictionary written at the end.
    pub id: ObjectId,
    pub resource: String,
    /// Glyphs shown so far and the text each one stands for.
    pub glyphs: BTreeMap<u16, Option<String>>,
}

impl FontEntry {
    /// Maps `gid` to `text` unless it already stands for something else.
    fn claim(&mut self, gid: u16, text: &str) -> bool {
        match self.glyphs.get(&gid) {
            Some(Some(existing)) => existing == text,
            _ => {
                self.glyphs.insert(gid, Some(text.to_string()));
                true
            }
        }
    }
}

/// A run of text bytes and the glyphs shaped from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextCluster {
    pub num_bytes: usize,
    pub num_glyphs: usize,
}

/// Collapses per-byte cluster indices into runs. Returns the runs in text
/// order and whether the glyphs run backwards (right-to-left text).
pub(crate) fn text_clusters(clusters: &[u32], glyph_count: usize) -> Result<(Vec<TextCluster>, bool)> {
    if let Some(bad) = clusters.iter().find(|c| **c as usize >= glyph_count) {
        return Err(PrinterError::Text(format!(
            "cluster index {} with {} glyphs",
            bad, glyph_count
        )));
    }
    let reverse = clusters.windows(2).any(|w| w[1] < w[0]);

    let mut runs: Vec<(u32, usize)> = Vec::new();
    for &c in clusters {
        match runs.last_mut() {
            Some((first, len)) if *first == c => *len += 1,
            _ => runs.push((c, 1)),
        }
    }

    let mut out = Vec::with_capacity(runs.len());
    for (k, &(first, num_bytes)) in runs.iter().enumerate() {
        let end = if reverse {
            if k == 0 { glyph_count } else { runs[k - 1].0 as usize }
        } else {
            runs.get(k + 1).map_or(glyph_count, |next| next.0 as usize)
        };
        let num_glyphs = end
            .checked_sub(first as usize)
            .filter(|n| *n > 0)
            .ok_or_else(|| PrinterError::Text("cluster indices are not monotonic".to_string()))?;
        out.push(TextCluster {
            num_bytes,
            num_glyphs,
        });
    }
    Ok((out, reverse))
}

fn glyph_id(glyph: &Glyph) -> Result<u16> {
    u16::try_from(glyph.id)
        .map_err(|_| PrinterError::Text(format!("glyph id {} out of range", glyph.id)))
}

fn show_glyph(ops: &mut Vec<Operation>, glyph: &Glyph, gid: u16) {
    ops.push(Operation::new(
        "Tm",
        vec![1.into(), 0.into(), 0.into(), (-1).into(), num(glyph.x), num(glyph.y)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(gid.to_be_bytes().to_vec(), StringFormat::Hexadecimal)],
    ));
}

impl DocumentWriter {
    /// Resource name of the font, registering it with this document first.
    fn font_resource(&mut self, face: &FontFace) -> String {
        if let Some(entry) = self.fonts.get(&face.handle()) {
            return entry.resource.clone();
        }
        let id = self.doc.new_object_id();
        let resource = self.resources.register(ResourceKind::Font, id);
        self.fonts.insert(
            face.handle(),
            FontEntry {
                face: face.clone(),
                id,
                resource: resource.clone(),
                glyphs: BTreeMap::new(),
            },
        );
        resource
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw_text(
        &mut self,
        face: &FontFace,
        glyphs: &[Glyph],
        text: &str,
        clusters: &[u32],
        font: &Font,
        paint: &Paint<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        if clusters.len() != text.len() {
            return Err(PrinterError::Text(format!(
                "{} cluster entries for {} bytes of text",
                clusters.len(),
                text.len()
            )));
        }
        let (runs, _) = text_clusters(clusters, glyphs.len())?;
        let gids = glyphs.iter().map(glyph_id).collect::<Result<Vec<u16>>>()?;

        let resource = self.font_resource(face);
        let mut ops = vec![op("q")];
        clip_to(&mut ops, clip);
        concat(&mut ops, transform);
        self.apply_paint(&mut ops, paint, PaintTarget::Fill, transform, clip)?;
        ops.push(op("BT"));
        ops.push(Operation::new("Tf", vec![name(&resource), num(font.size)]));

        let entry = self
            .fonts
            .get_mut(&face.handle())
            .ok_or_else(|| PrinterError::Font(format!("{:?} is not registered", face.handle())))?;
        let mut covered = vec![false; glyphs.len()];
        let mut byte = 0;
        for run in runs {
            let first = clusters[byte] as usize;
            let bytes = &text.as_bytes()[byte..byte + run.num_bytes];
            let run_text = String::from_utf8_lossy(bytes);
            byte += run.num_bytes;

            let mapped = run.num_glyphs == 1 && entry.claim(gids[first], &run_text);
            if !mapped {
                let mut properties = Dictionary::new();
                properties.set("ActualText", text_string(&run_text));
                ops.push(Operation::new("BDC", vec![name("Span"), properties.into()]));
            }
            for i in first..first + run.num_glyphs {
                show_glyph(&mut ops, &glyphs[i], gids[i]);
                entry.glyphs.entry(gids[i]).or_insert(None);
                covered[i] = true;
            }
            if !mapped {
                ops.push(op("EMC"));
            }
        }
        for (i, glyph) in glyphs.iter().enumerate().filter(|(i, _)| !covered[*i]) {
            show_glyph(&mut ops, glyph, gids[i]);
            entry.glyphs.entry(gids[i]).or_insert(None);
        }

        ops.push(op("ET"));
        ops.push(op("Q"));
        self.emit(ops)
    }

    pub(crate) fn write_fonts(&mut self) -> Result<()> {
        let fonts = std::mem::take(&mut self.fonts);
        let mut entries: Vec<&FontEntry> = fonts.values().collect();
        entries.sort_by_key(|entry| entry.id);
        for entry in entries {
            self.write_font(entry)?;
        }
        Ok(())
    }

    fn write_font(&mut self, entry: &FontEntry) -> Result<()> {
        let data = entry.face.data();
        let face = ttf_parser::Face::parse(data, entry.face.index())
            .map_err(|e| PrinterError::Font(format!("{:?}: {}", entry.face.handle(), e)))?;
        let scale = 1000.0 / f64::from(face.units_per_em());
        let scaled = |v: i16| (f64::from(v) * scale).round() as i64;
        let base_font = postscript_name(&face).unwrap_or_else(|| format!("Font{}", entry.face.handle().0));
        let is_cff = face.tables().cff.is_some();

        let program = font_program(entry)?;
        let file = if is_cff {
            // OpenType font programs need PDF 1.6.
            if needs_version(&self.doc.version, "1.6") {
                log::debug!("Raising PDF version to 1.6 for {}", base_font);
                self.doc.version = "1.6".to_string();
            }
            compressed_stream(dictionary! { "Subtype" => "OpenType" }, &program)?
        } else {
            compressed_stream(dictionary! { "Length1" => program.len() as i64 }, &program)?
        };
        let file_id = self.doc.add_object(file);

        let bbox = face.global_bounding_box();
        let ascent = scaled(face.ascender());
        let mut descriptor = dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name(&base_font),
            "Flags" => 4,
            "FontBBox" => vec![
                scaled(bbox.x_min).into(),
                scaled(bbox.y_min).into(),
                scaled(bbox.x_max).into(),
                scaled(bbox.y_max).into(),
            ],
            "ItalicAngle" => if face.is_italic() { -12 } else { 0 },
            "Ascent" => ascent,
            "Descent" => scaled(face.descender()),
            "CapHeight" => face.capital_height().map_or(ascent, scaled),
            "StemV" => if face.is_bold() { 120 } else { 80 },
        };
        descriptor.set(if is_cff { "FontFile3" } else { "FontFile2" }, file_id);
        let descriptor_id = self.doc.add_object(descriptor);

        let mut widths = Vec::with_capacity(entry.glyphs.len() * 2);
        for gid in entry.glyphs.keys() {
            let advance = face.glyph_hor_advance(ttf_parser::GlyphId(*gid)).unwrap_or(0);
            widths.push(Object::from(i64::from(*gid)));
            widths.push(vec![Object::from((f64::from(advance) * scale).round() as i64)].into());
        }
        let mut cid_font = dictionary! {
            "Type" => "Font",
            "Subtype" => if is_cff { "CIDFontType0" } else { "CIDFontType2" },
            "BaseFont" => name(&base_font),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "W" => widths,
        };
        if !is_cff {
            cid_font.set("CIDToGIDMap", "Identity");
        }
        let cid_font_id = self.doc.add_object(cid_font);

        let cmap = to_unicode_cmap(&entry.glyphs, &base_font);
        let cmap_id = self
            .doc
            .add_object(compressed_stream(dictionary! {}, cmap.as_bytes())?);

        self.doc.set_object(
            entry.id,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => name(&base_font),
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![cid_font_id.into()],
                "ToUnicode" => cmap_id,
            },
        );
        log::debug!(
            "Embedded {} with {} glyphs",
            base_font,
            entry.glyphs.len()
        );
        Ok(())
    }
}

/// The font program to embed: the face cut down to the glyphs shown, or the
/// whole face when it can't be subset. Glyph ids are kept either way.
pub(crate) fn font_program(entry: &FontEntry) -> Result<Vec<u8>> {
    let (data, index) = (entry.face.data(), entry.face.index());
    let mut gids: Vec<u16> = entry.glyphs.keys().copied().collect();
    if gids.first() != Some(&0) {
        gids.insert(0, 0);
    }
    match subsetter::subset(data, index, subsetter::Profile::pdf(&gids)) {
        Ok(subset) => {
            log::debug!(
                "Subset {:?} from {} to {} bytes",
                entry.face.handle(),
                data.len(),
                subset.len()
            );
            Ok(subset)
        }
        Err(e) => {
            log::warn!(
                "Can't subset {:?} ({:?}), embedding the whole face",
                entry.face.handle(),
                e
            );
            standalone_face(data, index)
        }
    }
}

/// Copies face `index` of a font collection into a font file of its own.
/// Plain font files are returned as they are.
pub(crate) fn standalone_face(data: &[u8], index: u32) -> Result<Vec<u8>> {
    if ttf_parser::fonts_in_collection(data).is_none() {
        return Ok(data.to_vec());
    }
    let bad_font = |what: &str| PrinterError::Font(format!("face {} of collection: {}", index, what));
    let raw = ttf_parser::RawFace::parse(data, index).map_err(|e| bad_font(&e.to_string()))?;
    let header = 12 + 4 * index as usize;
    let face_offset = data
        .get(header..header + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .ok_or_else(|| bad_font("truncated header"))?;
    let sfnt_version = data
        .get(face_offset..face_offset + 4)
        .ok_or_else(|| bad_font("truncated offset table"))?;

    let records: Vec<ttf_parser::TableRecord> = raw.table_records.into_iter().collect();
    let num_tables = records.len() as u16;
    let entry_selector = num_tables.max(1).ilog2() as u16;
    let search_range = (1u16 << entry_selector) * 16;

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(sfnt_version);
    out.extend(num_tables.to_be_bytes());
    out.extend(search_range.to_be_bytes());
    out.extend(entry_selector.to_be_bytes());
    out.extend((num_tables * 16 - search_range).to_be_bytes());

    let mut tables = Vec::new();
    let directory_len = 12 + 16 * records.len();
    for record in &records {
        let start = record.offset as usize;
        let table = start
            .checked_add(record.length as usize)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| bad_font("table out of bounds"))?;
        out.extend(record.tag.to_bytes());
        out.extend(record.check_sum.to_be_bytes());
        out.extend(((directory_len + tables.len()) as u32).to_be_bytes());
        out.extend(record.length.to_be_bytes());
        tables.extend_from_slice(table);
        tables.resize(tables.len().next_multiple_of(4), 0);
    }
    out.extend(tables);
    Ok(out)
}

/// Whether a document at `current` must be raised to `minimum`.
fn needs_version(current: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> (u32, u32) {
        let (major, minor) = v.split_once('.').unwrap_or((v, "0"));
        (major.parse().unwrap_or(0), minor.parse().unwrap_or(0))
    };
    parse(current) < parse(minimum)
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    let name = face
        .names()
        .into_iter()
        .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .find_map(|n| n.to_string())?;
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub(crate) fn to_unicode_cmap(glyphs: &BTreeMap<u16, Option<String>>, font_name: &str) -> String {
    let mapped: Vec<(u16, &str)> = glyphs
        .iter()
        .filter_map(|(gid, text)| text.as_deref().map(|t| (*gid, t)))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    let mut cmap = String::new();
    cmap.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
    cmap.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    let _ = writeln!(cmap, "/CMapName /{}-UTF16 def", font_name);
    cmap.push_str("/CMapType 2 def\n1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");
    for chunk in mapped.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for (gid, text) in chunk {
            let utf16: String = text.encode_utf16().map(|u| format!("{:04X}", u)).collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(clusters: &[TextCluster]) -> (Vec<usize>, Vec<usize>) {
        (
            clusters.iter().map(|c| c.num_bytes).collect(),
            clusters.iter().map(|c| c.num_glyphs).collect(),
        )
    }

    #[test]
    fn forward_clusters() {
        let (clusters, reverse) = text_clusters(&[0, 0, 0, 1, 1, 2], 3).unwrap();
        assert!(!reverse);
        let (bytes, glyphs) = counts(&clusters);
        assert_eq!(bytes, vec![3, 2, 1]);
        assert_eq!(glyphs, vec![1, 1, 1]);
    }

    #[test]
    fn ligature_spans_bytes() {
        // "ffi" shaped into one glyph followed by "x".
        let (clusters, _) = text_clusters(&[0, 0, 0, 1], 2).unwrap();
        assert_eq!(counts(&clusters), (vec![3, 1], vec![1, 1]));
    }

    #[test]
    fn decomposed_cluster_has_several_glyphs() {
        let (clusters, _) = text_clusters(&[0, 0, 3], 4).unwrap();
        assert_eq!(counts(&clusters), (vec![2, 1], vec![3, 1]));
    }

    #[test]
    fn reversed_clusters() {
        let (clusters, reverse) = text_clusters(&[2, 2, 1, 0], 3).unwrap();
        assert!(reverse);
        assert_eq!(counts(&clusters), (vec![2, 1, 1], vec![1, 1, 1]));
    }

    #[test]
    fn out_of_range_cluster_is_rejected() {
        assert!(text_clusters(&[0, 5], 2).is_err());
    }

    #[test]
    fn mixed_direction_is_rejected() {
        assert!(text_clusters(&[0, 2, 1], 3).is_err());
    }

    #[test]
    fn empty_text_has_no_clusters() {
        let (clusters, reverse) = text_clusters(&[], 2).unwrap();
        assert!(clusters.is_empty());
        assert!(!reverse);
    }

    #[test]
    fn cmap_maps_glyphs_to_utf16() {
        let mut glyphs = BTreeMap::new();
        glyphs.insert(3, Some("A".to_string()));
        glyphs.insert(7, Some("\u{1F600}".to_string()));
        glyphs.insert(9, None);
        let cmap = to_unicode_cmap(&glyphs, "Test");
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0007> <D83DDE00>"));
        assert!(!cmap.contains("<0009>"));
    }

    fn entry_for(data: Vec<u8>, gids: &[u16]) -> FontEntry {
        FontEntry {
            face: FontFace::new(crate::types::FontHandle(0xfeed_0002), data, 0, None),
            id: (1, 0),
            resource: "F1".to_string(),
            glyphs: gids.iter().map(|gid| (*gid, None)).collect(),
        }
    }

    #[test]
    fn collection_face_becomes_plain_font() {
        let ttc = crate::pdf_tests::collection(&crate::pdf_tests::test_font(4));
        let face = standalone_face(&ttc, 0).unwrap();
        assert_eq!(&face[..4], &[0, 1, 0, 0]);
        assert!(ttf_parser::fonts_in_collection(&face).is_none());
        let parsed = ttf_parser::Face::parse(&face, 0).unwrap();
        assert_eq!(parsed.number_of_glyphs(), 4);
        assert_eq!(parsed.glyph_hor_advance(ttf_parser::GlyphId(3)), Some(500));
    }

    #[test]
    fn plain_font_is_not_rewritten() {
        let font = crate::pdf_tests::test_font(2);
        assert_eq!(standalone_face(&font, 0).unwrap(), font);
    }

    #[test]
    fn embedded_program_keeps_glyph_ids() {
        let ttc = crate::pdf_tests::collection(&crate::pdf_tests::test_font(4));
        let program = font_program(&entry_for(ttc, &[1, 3])).unwrap();
        assert_eq!(&program[..4], &[0, 1, 0, 0]);
        let parsed = ttf_parser::Face::parse(&program, 0).unwrap();
        assert_eq!(parsed.number_of_glyphs(), 4);
    }

    #[test]
    fn version_only_goes_up() {
        assert!(needs_version("1.5", "1.6"));
        assert!(needs_version("1.4", "1.6"));
        assert!(!needs_version("1.6", "1.6"));
        assert!(!needs_version("1.7", "1.6"));
        assert!(!needs_version("2.0", "1.6"));
    }

    #[test]
    fn claimed_glyph_keeps_first_text() {
        let mut entry = FontEntry {
            face: FontFace::new(crate::types::FontHandle(0xfeed_0001), vec![0u8], 0, None),
            id: (1, 0),
            resource: "F1".to_string(),
            glyphs: BTreeMap::new(),
        };
        assert!(entry.claim(4, "a"));
        assert!(entry.claim(4, "a"));
        assert!(!entry.claim(4, "b"));
    }
}
