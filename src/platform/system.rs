use super::{FontFace, PlatformAdapter, ReleaseFn, Timestamp};
use crate::errors::{PrinterError, Result};
use crate::types::{Font, FontHandle};
use fontdb::{Database, Family, Query, Source};
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use std::path::PathBuf;

lazy_static! {
    /// Installed fonts, scanned on first use.
    static ref SYSTEM_FONTS: Database = {
        let mut db = Database::new();
        db.load_system_fonts();
        log::debug!("Found {} system font faces", db.len());
        db
    };
}

/// Adapter backed by font files on disk. The embedder registers which file
/// (and collection index) each handle stands for.
#[derive(Debug, Default)]
pub struct SystemAdapter {
    fonts: FxHashMap<FontHandle, (PathBuf, u32)>,
}

impl SystemAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_font_file(&mut self, handle: FontHandle, path: impl Into<PathBuf>, index: u32) {
        self.fonts.insert(handle, (path.into(), index));
    }

    /// Registers the installed face of `family` (regular style). Returns
    /// false when no installed font has that family.
    pub fn register_system_font(&mut self, handle: FontHandle, family: &str) -> bool {
        match face_location(&SYSTEM_FONTS, family) {
            Some((path, index)) => {
                log::debug!("{:?} is {} face {} ({})", handle, path.display(), index, family);
                self.register_font_file(handle, path, index);
                true
            }
            None => false,
        }
    }
}

/// File and collection index of the best match for `family` in `db`.
fn face_location(db: &Database, family: &str) -> Option<(PathBuf, u32)> {
    let id = db.query(&Query {
        families: &[Family::Name(family)],
        ..Query::default()
    })?;
    let face = db.face(id)?;
    match &face.source {
        Source::File(path) => Some((path.clone(), face.index)),
        Source::SharedFile(path, _) => Some((path.clone(), face.index)),
        Source::Binary(_) => None,
    }
}

impl PlatformAdapter for SystemAdapter {
    fn create_font_face(&self, font: &Font) -> Result<FontFace> {
        let (path, index) = self
            .fonts
            .get(&font.handle)
            .ok_or_else(|| PrinterError::Font(format!("no font registered for {:?}", font.handle)))?;
        FontFace::shared(font.handle, || {
            let data = std::fs::read(path)?;
            ttf_parser::Face::parse(&data, *index)
                .map_err(|e| PrinterError::Font(format!("{}: {}", path.display(), e)))?;
            log::debug!("Loaded font {:?} from {}", font.handle, path.display());
            let release: ReleaseFn =
                Box::new(|handle: FontHandle| log::debug!("Released font {:?}", handle));
            Ok(FontFace::new(font.handle, data, *index, Some(release)))
        })
    }

    fn current_utc_timestamp(&self) -> Timestamp {
        Timestamp::now_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_handle_is_an_error() {
        let adapter = SystemAdapter::new();
        let font = Font {
            handle: FontHandle(0xbeef_0001),
            size: 12.0,
        };
        assert!(matches!(adapter.create_font_face(&font), Err(PrinterError::Font(_))));
    }

    #[test]
    fn invalid_font_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let mut adapter = SystemAdapter::new();
        let handle = FontHandle(0xbeef_0002);
        adapter.register_font_file(handle, &path, 0);
        let font = Font { handle, size: 10.0 };
        assert!(adapter.create_font_face(&font).is_err());
    }

    #[test]
    fn empty_database_has_no_faces() {
        assert_eq!(face_location(&Database::new(), "DejaVu Sans"), None);
    }

    #[test]
    fn missing_system_font_is_not_registered() {
        let mut adapter = SystemAdapter::new();
        assert!(!adapter.register_system_font(FontHandle(0xbeef_0003), "No Such Family 4f2a"));
        assert!(adapter.fonts.is_empty());
    }
}
