//! XML tag model & parser (C2): a tolerant subset parser for the XML dialect
//! Parallels Desktop emits in `DiskDescriptor.xml`, producing an arena tree
//! of tags.
//!
//! Parent links are an index-based lookup convenience used only while
//! parsing (spec.md §9's ownership note) — the arena itself owns every tag,
//! so there is no reference cycle to worry about.

pub mod parser;

/// Index into a [`Document`]'s tag arena.
pub type TagId = usize;

#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub value: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<TagId>,
    parent: Option<TagId>,
}

impl Tag {
    fn new(name: String) -> Self {
        Tag {
            name,
            value: None,
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// An arena of parsed tags plus the index of the root element.
#[derive(Debug, Clone)]
pub struct Document {
    tags: Vec<Tag>,
    root: TagId,
}

impl Document {
    pub fn root(&self) -> &Tag {
        &self.tags[self.root]
    }

    pub fn get(&self, id: TagId) -> &Tag {
        &self.tags[id]
    }

    /// First child of `tag` named `name`, if any.
    pub fn child<'a>(&'a self, tag: &Tag, name: &str) -> Option<&'a Tag> {
        tag.children
            .iter()
            .map(|&id| self.get(id))
            .find(|t| t.name == name)
    }

    /// All children of `tag` named `name`, in document order.
    pub fn children<'a>(&'a self, tag: &'a Tag, name: &'a str) -> impl Iterator<Item = &'a Tag> {
        tag.children
            .iter()
            .map(|&id| self.get(id))
            .filter(move |t| t.name == name)
    }

    /// Text value of the first child named `name`, trimmed.
    pub fn child_text<'a>(&'a self, tag: &Tag, name: &str) -> Option<&'a str> {
        self.child(tag, name)
            .and_then(|t| t.value.as_deref())
            .map(str::trim)
    }

    #[cfg(test)]
    fn parent(&self, id: TagId) -> Option<TagId> {
        self.tags[id].parent
    }
}
