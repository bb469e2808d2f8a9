//! Platform capabilities consumed by the PDF backend: turning an opaque font
//! handle into an embeddable font face, and reading the wall clock.

mod system;

pub use system::SystemAdapter;

use crate::errors::Result;
use crate::types::{Font, FontHandle};
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

pub trait PlatformAdapter {
    /// Builds (or reuses) the font face for a platform font handle.
    fn create_font_face(&self, font: &Font) -> Result<FontFace>;

    fn current_utc_timestamp(&self) -> Timestamp;
}

/// Wall-clock time as written into document metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub utc_offset_minutes: i16,
}

impl Timestamp {
    pub fn now_utc() -> Self {
        let now = time::OffsetDateTime::now_utc();
        Timestamp {
            year: now.year(),
            month: u8::from(now.month()),
            day: now.day(),
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            utc_offset_minutes: 0,
        }
    }

    /// PDF date string, e.g. `D:20240131235959Z`.
    pub fn to_pdf_date(&self) -> String {
        let mut s = format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second,
        );
        if self.utc_offset_minutes == 0 {
            s.push('Z');
        } else {
            let sign = if self.utc_offset_minutes < 0 { '-' } else { '+' };
            let offset = self.utc_offset_minutes.unsigned_abs();
            s.push_str(&format!("{}{:02}'{:02}'", sign, offset / 60, offset % 60));
        }
        s
    }
}

/// Callback releasing the native resource behind a face.
pub type ReleaseFn = Box<dyn FnOnce(FontHandle) + Send>;

struct FaceInner {
    handle: FontHandle,
    data: Arc<[u8]>,
    index: u32,
    release: Mutex<Option<ReleaseFn>>,
}

impl Drop for FaceInner {
    fn drop(&mut self) {
        let release = match self.release.get_mut() {
            Ok(release) => release.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(release) = release {
            release(self.handle);
        }
    }
}

/// A font program ready for embedding, shared between the process-wide face
/// map and every device that uses it. The native resource behind it is
/// released once, when the last clone goes away.
#[derive(Clone)]
pub struct FontFace(Arc<FaceInner>);

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("handle", &self.0.handle)
            .field("len", &self.0.data.len())
            .field("index", &self.0.index)
            .finish()
    }
}

lazy_static! {
    static ref FACES: Mutex<FxHashMap<FontHandle, FontFace>> = Mutex::new(FxHashMap::default());
}

impl FontFace {
    /// Wraps font program bytes. `release` runs when the face is finally
    /// dropped.
    pub fn new(
        handle: FontHandle,
        data: impl Into<Arc<[u8]>>,
        index: u32,
        release: Option<ReleaseFn>,
    ) -> Self {
        FontFace(Arc::new(FaceInner {
            handle,
            data: data.into(),
            index,
            release: Mutex::new(release),
        }))
    }

    /// Returns the face already registered for `handle`, or builds one with
    /// `create` and registers it. `create` runs without the map locked; if
    /// another thread registers the handle first, its face wins.
    pub fn shared(handle: FontHandle, create: impl FnOnce() -> Result<FontFace>) -> Result<FontFace> {
        if let Some(face) = lock_faces().get(&handle) {
            return Ok(face.clone());
        }
        let face = create()?;
        Ok(lock_faces().entry(handle).or_insert(face).clone())
    }

    pub fn handle(&self) -> FontHandle {
        self.0.handle
    }

    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    /// Face index inside a font collection.
    pub fn index(&self) -> u32 {
        self.0.index
    }

    pub fn same_face(&self, other: &FontFace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn lock_faces() -> std::sync::MutexGuard<'static, FxHashMap<FontHandle, FontFace>> {
    FACES.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drops every face in the process-wide map that no device holds any more,
/// releasing its native resource.
pub fn reset_static_data() {
    let released: Vec<FontFace> = {
        let mut faces = lock_faces();
        let unused: Vec<FontHandle> = faces
            .iter()
            .filter(|(_, face)| Arc::strong_count(&face.0) == 1)
            .map(|(handle, _)| *handle)
            .collect();
        unused.iter().filter_map(|h| faces.remove(h)).collect()
    };
    log::debug!("Releasing {} shared font faces", released.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pdf_date_formatting() {
        let ts = Timestamp {
            year: 2024,
            month: 1,
            day: 31,
            hour: 23,
            minute: 5,
            second: 9,
            utc_offset_minutes: 0,
        };
        assert_eq!(ts.to_pdf_date(), "D:20240131230509Z");
        let ts = Timestamp {
            utc_offset_minutes: -330,
            ..ts
        };
        assert_eq!(ts.to_pdf_date(), "D:20240131230509-05'30'");
    }

    #[test]
    fn release_runs_once_after_last_clone() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let face = FontFace::new(
            FontHandle(0xdead_0001),
            vec![0u8; 4],
            0,
            Some(Box::new(move |_: FontHandle| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let other = face.clone();
        drop(face);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(other);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_releases_unused_faces_only() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let unused = FontHandle(0xdead_0003);
        FontFace::shared(unused, || {
            Ok(FontFace::new(
                unused,
                vec![0u8],
                0,
                Some(Box::new(move |_: FontHandle| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            ))
        })
        .unwrap();
        let held = FontHandle(0xdead_0004);
        let kept = FontFace::shared(held, || Ok(FontFace::new(held, vec![0u8], 0, None))).unwrap();

        reset_static_data();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        let again = FontFace::shared(held, || panic!("held face should stay shared")).unwrap();
        assert!(kept.same_face(&again));
    }

    #[test]
    fn face_can_be_built_from_another_shared_face() {
        let base = FontHandle(0xdead_0005);
        let derived = FontHandle(0xdead_0006);
        let face = FontFace::shared(derived, || {
            let inner = FontFace::shared(base, || Ok(FontFace::new(base, vec![7u8], 0, None)))?;
            reset_static_data();
            Ok(FontFace::new(derived, inner.data().to_vec(), 0, None))
        })
        .unwrap();
        assert_eq!(face.data(), &[7u8]);
        let again = FontFace::shared(derived, || panic!("derived face should be registered")).unwrap();
        assert!(face.same_face(&again));
    }

    #[test]
    fn shared_faces_are_unique_per_handle() {
        let handle = FontHandle(0xdead_0002);
        let first = FontFace::shared(handle, || Ok(FontFace::new(handle, vec![1u8], 0, None))).unwrap();
        let second = FontFace::shared(handle, || panic!("face should be reused")).unwrap();
        assert!(first.same_face(&second));
    }
}
