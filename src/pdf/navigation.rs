//! Named destinations, link annotations and the outline tree.

use super::content::{name, num};
use super::writer::{DocumentWriter, text_string};
use crate::device::looks_like_uri;
use crate::errors::Result;
use crate::types::{Point, Rectangle};
use lopdf::{Dictionary, Object, ObjectId, dictionary};

#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub name: String,
    pub is_defined: bool,
    pub is_referenced: bool,
    pub is_url: bool,
    /// Page and position in PDF user space, once defined.
    target: Option<(ObjectId, f64, f64)>,
}

/// Every destination named by an anchor or a link, matched ignoring ASCII
/// case.
#[derive(Debug, Default)]
pub struct Destinations {
    list: Vec<Destination>,
}

impl Destinations {
    pub fn find(&self, name: &str) -> Option<&Destination> {
        self.list.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn lookup(&mut self, name: &str) -> &mut Destination {
        let index = match self.list.iter().position(|d| d.name.eq_ignore_ascii_case(name)) {
            Some(index) => index,
            None => {
                self.list.push(Destination {
                    name: name.to_string(),
                    is_defined: false,
                    is_referenced: false,
                    is_url: looks_like_uri(name),
                    target: None,
                });
                self.list.len() - 1
            }
        };
        &mut self.list[index]
    }

    pub(crate) fn define(&mut self, name: &str, page: ObjectId, x: f64, y: f64) {
        let dest = self.lookup(name);
        if dest.is_defined {
            log::debug!("Anchor {:?} defined again, keeping the latest", dest.name);
        }
        dest.is_defined = true;
        dest.target = Some((page, x, y));
    }

    pub(crate) fn reference(&mut self, name: &str) -> &Destination {
        let dest = self.lookup(name);
        dest.is_referenced = true;
        dest
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// `/Dests` name tree of the defined destinations, sorted by name.
    pub(crate) fn names_tree(&self) -> Option<Dictionary> {
        let mut defined: Vec<(&str, ObjectId, f64, f64)> = self
            .list
            .iter()
            .filter_map(|d| d.target.map(|(page, x, y)| (d.name.as_str(), page, x, y)))
            .collect();
        if defined.is_empty() {
            return None;
        }
        defined.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        let names: Vec<Object> = defined
            .into_iter()
            .flat_map(|(dest, page, x, y)| [Object::string_literal(dest), xyz(page, x, y)])
            .collect();
        Some(dictionary! { "Names" => names })
    }

    pub(crate) fn warn_undefined(&self) {
        for dest in self.list.iter().filter(|d| d.is_referenced && !d.is_defined && !d.is_url) {
            log::warn!("Link to undefined anchor {:?}", dest.name);
        }
    }
}

fn xyz(page: ObjectId, x: f64, y: f64) -> Object {
    vec![page.into(), name("XYZ"), num(x), num(y), Object::Null].into()
}

/// Where a link annotation leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkAction<'a> {
    Uri(&'a str),
    Named(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutlineEntry {
    pub title: String,
    pub page: ObjectId,
    pub x: f64,
    pub y: f64,
    pub depth: u32,
    pub closed: bool,
}

impl DocumentWriter {
    /// Current page and `position` flipped into PDF user space.
    pub(crate) fn page_target(&self, position: Point) -> Result<(ObjectId, f64, f64)> {
        let page = self.page()?;
        Ok((page.id, position.x, page.height - position.y))
    }

    pub(crate) fn add_link(&mut self, area: &Rectangle, action: LinkAction<'_>) -> Result<()> {
        let height = self.page()?.height;
        let mut annotation = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![
                num(area.left),
                num(height - area.bottom),
                num(area.right),
                num(height - area.top),
            ],
            "Border" => vec![0.into(), 0.into(), 0.into()],
        };
        match action {
            LinkAction::Uri(uri) => annotation.set(
                "A",
                dictionary! {
                    "S" => "URI",
                    "URI" => Object::string_literal(uri),
                },
            ),
            LinkAction::Named(dest) => annotation.set("Dest", Object::string_literal(dest)),
        }
        let id = self.doc.add_object(annotation);
        self.page_mut()?.annotations.push(id);
        Ok(())
    }

    pub(crate) fn add_outline(&mut self, position: Point, title: &str, depth: u32, closed: bool) -> Result<()> {
        let (page, x, y) = self.page_target(position)?;
        self.outlines.push(OutlineEntry {
            title: title.to_string(),
            page,
            x,
            y,
            depth,
            closed,
        });
        Ok(())
    }
}

/// Writes the outline tree; `None` when there are no entries. Each entry
/// hangs below the nearest preceding entry with a smaller depth.
pub(crate) fn write_outlines(doc: &mut lopdf::Document, entries: &[OutlineEntry]) -> Option<ObjectId> {
    if entries.is_empty() {
        return None;
    }

    let mut parents: Vec<Option<usize>> = Vec::with_capacity(entries.len());
    let mut stack: Vec<(usize, u32)> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let depth = entry.depth.max(1);
        while stack.last().is_some_and(|(_, d)| *d >= depth) {
            stack.pop();
        }
        parents.push(stack.last().map(|(p, _)| *p));
        stack.push((i, depth));
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut top_level = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => top_level.push(i),
        }
    }

    // Children always come after their parent, so a reverse sweep sees them
    // first.
    let mut open_count = vec![0i64; entries.len()];
    for i in (0..entries.len()).rev() {
        open_count[i] = children[i]
            .iter()
            .map(|c| 1 + if entries[*c].closed { 0 } else { open_count[*c] })
            .sum();
    }

    let root_id = doc.new_object_id();
    let ids: Vec<ObjectId> = entries.iter().map(|_| doc.new_object_id()).collect();

    let link_siblings = |dict: &mut Dictionary, siblings: &[usize], i: usize| {
        if let Some(pos) = siblings.iter().position(|s| *s == i) {
            if pos > 0 {
                dict.set("Prev", ids[siblings[pos - 1]]);
            }
            if let Some(next) = siblings.get(pos + 1) {
                dict.set("Next", ids[*next]);
            }
        }
    };

    for (i, entry) in entries.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => text_string(&entry.title),
            "Parent" => parents[i].map_or(root_id, |p| ids[p]),
            "Dest" => xyz(entry.page, entry.x, entry.y),
        };
        let siblings = match parents[i] {
            Some(p) => &children[p],
            None => &top_level,
        };
        link_siblings(&mut item, siblings, i);
        if let (Some(first), Some(last)) = (children[i].first(), children[i].last()) {
            item.set("First", ids[*first]);
            item.set("Last", ids[*last]);
            let count = if entry.closed { -open_count[i] } else { open_count[i] };
            item.set("Count", count);
        }
        doc.set_object(ids[i], item);
    }

    let visible: i64 = top_level
        .iter()
        .map(|t| 1 + if entries[*t].closed { 0 } else { open_count[*t] })
        .sum();
    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => visible,
    };
    if let (Some(first), Some(last)) = (top_level.first(), top_level.last()) {
        root.set("First", ids[*first]);
        root.set("Last", ids[*last]);
    }
    doc.set_object(root_id, root);
    Some(root_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_then_anchor_shares_one_destination() {
        let mut dests = Destinations::default();
        let dest = dests.reference("Chapter1");
        assert!(dest.is_referenced);
        assert!(!dest.is_defined);

        dests.define("chapter1", (4, 0), 10.0, 700.0);
        assert_eq!(dests.len(), 1);
        let dest = dests.find("CHAPTER1").unwrap();
        assert!(dest.is_defined);
        assert!(dest.is_referenced);
        assert_eq!(dest.name, "Chapter1");
    }

    #[test]
    fn uri_destinations_are_flagged() {
        let mut dests = Destinations::default();
        assert!(dests.reference("https://example.com").is_url);
        assert!(!dests.reference("intro").is_url);
    }

    #[test]
    fn names_tree_is_sorted_and_skips_undefined() {
        let mut dests = Destinations::default();
        dests.define("b", (3, 0), 0.0, 0.0);
        dests.define("a", (3, 0), 1.0, 2.0);
        dests.reference("missing");
        let tree = dests.names_tree().unwrap();
        let names = tree.get(b"Names").unwrap().as_array().unwrap();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], Object::string_literal("a"));
        assert_eq!(names[2], Object::string_literal("b"));
    }

    fn entry(title: &str, depth: u32, closed: bool) -> OutlineEntry {
        OutlineEntry {
            title: title.to_string(),
            page: (1, 0),
            x: 0.0,
            y: 0.0,
            depth,
            closed,
        }
    }

    #[test]
    fn outlines_nest_by_depth() {
        let mut doc = lopdf::Document::with_version("1.5");
        let entries = [
            entry("One", 1, false),
            entry("One.A", 2, true),
            entry("One.A.i", 3, false),
            entry("One.B", 2, false),
            entry("Two", 1, false),
        ];
        let root_id = write_outlines(&mut doc, &entries).unwrap();
        let root = doc.get_dictionary(root_id).unwrap();
        // One, One.A, One.B, Two are visible; One.A.i is hidden by its closed parent.
        assert_eq!(root.get(b"Count").unwrap(), &Object::Integer(4));

        let first = root.get(b"First").unwrap().as_reference().unwrap();
        let one = doc.get_dictionary(first).unwrap();
        assert_eq!(one.get(b"Title").unwrap(), &Object::string_literal("One"));
        assert_eq!(one.get(b"Count").unwrap(), &Object::Integer(2));

        let one_a = doc
            .get_dictionary(one.get(b"First").unwrap().as_reference().unwrap())
            .unwrap();
        assert_eq!(one_a.get(b"Count").unwrap(), &Object::Integer(-1));
        assert!(one_a.has(b"Next"));
        assert!(!one_a.has(b"Prev"));
    }

    #[test]
    fn deep_first_entry_becomes_top_level() {
        let mut doc = lopdf::Document::with_version("1.5");
        let root_id = write_outlines(&mut doc, &[entry("Deep", 3, false)]).unwrap();
        let root = doc.get_dictionary(root_id).unwrap();
        assert_eq!(root.get(b"Count").unwrap(), &Object::Integer(1));
    }
}
