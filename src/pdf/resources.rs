//! Named resources shared by every page of a document.
//!
//! All pages (and group forms) point at one resource dictionary, so a font or
//! image registered once is reachable from anywhere in the document.

use fxhash::FxHashMap;
use lopdf::{Dictionary, Object, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ResourceKind {
    Font,
    XObject,
    Pattern,
    ExtGState,
}

impl ResourceKind {
    const ALL: [ResourceKind; 4] = [
        ResourceKind::Font,
        ResourceKind::XObject,
        ResourceKind::Pattern,
        ResourceKind::ExtGState,
    ];

    fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Font => "F",
            ResourceKind::XObject => "X",
            ResourceKind::Pattern => "P",
            ResourceKind::ExtGState => "Gs",
        }
    }

    fn key(self) -> &'static str {
        match self {
            ResourceKind::Font => "Font",
            ResourceKind::XObject => "XObject",
            ResourceKind::Pattern => "Pattern",
            ResourceKind::ExtGState => "ExtGState",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Resources {
    entries: Vec<(ResourceKind, String, ObjectId)>,
    names: FxHashMap<(ResourceKind, ObjectId), usize>,
}

impl Resources {
    /// Name under which `id` is reachable, registering it on first use.
    pub fn register(&mut self, kind: ResourceKind, id: ObjectId) -> String {
        if let Some(&index) = self.names.get(&(kind, id)) {
            return self.entries[index].1.clone();
        }
        let name = format!("{}{}", kind.prefix(), self.entries.len() + 1);
        self.names.insert((kind, id), self.entries.len());
        self.entries.push((kind, name.clone(), id));
        name
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut resources = Dictionary::new();
        for kind in ResourceKind::ALL {
            let entries: Dictionary = self
                .entries
                .iter()
                .filter(|(k, _, _)| *k == kind)
                .map(|(_, name, id)| (name.clone(), Object::from(*id)))
                .collect();
            if !entries.is_empty() {
                resources.set(kind.key(), entries);
            }
        }
        resources
    }
}
