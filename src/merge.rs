//! Merge engine.
//!
//! Copies selected pages, together with every object they reach, from source
//! documents into one destination document. Each source object is copied at
//! most once: the dedup map is keyed by (source document, source reference),
//! so a font shared by two pages of one source stays a single object.
//!
//! Resource dictionaries are never merged, only carried under each page, so
//! resource name clashes between sources need no renaming.

use crate::document::{Document, DocumentId, INHERITABLE_ATTRIBUTES};
use crate::error::{Error, Result, Warning};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::{HashMap, HashSet, VecDeque};

/// US Letter, used when a page has no `/MediaBox` anywhere in its ancestry.
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Options for [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Header version of the output; defaults to the highest source version
    pub pdf_version: Option<(u8, u8)>,
    /// Carry the first source's `/Info` dictionary into the output
    pub keep_info: bool,
}

impl MergeOptions {
    /// Set the output header version.
    pub fn with_pdf_version(mut self, major: u8, minor: u8) -> Self {
        self.pdf_version = Some((major, minor));
        self
    }

    /// Keep the first source's document information dictionary.
    pub fn with_info(mut self, keep: bool) -> Self {
        self.keep_info = keep;
        self
    }
}

/// Which pages of a source to take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelector {
    /// Every page in document order
    #[default]
    All,
    /// These 0-based indices, in this order
    Indices(Vec<usize>),
}

impl PageSelector {
    /// Check the selector against a source with `page_count` pages and
    /// return the chosen indices in output order.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPageIndex`] for an out-of-range or repeated index.
    pub fn resolve(&self, source_index: usize, page_count: usize) -> Result<Vec<usize>> {
        let indices = match self {
            PageSelector::All => return Ok((0..page_count).collect()),
            PageSelector::Indices(indices) => indices,
        };

        let mut seen = HashSet::new();
        for &index in indices {
            let reason = if index >= page_count {
                "out of range"
            } else if !seen.insert(index) {
                "selected more than once"
            } else {
                continue;
            };
            return Err(Error::InvalidPageIndex {
                source_index,
                index,
                page_count,
                reason: reason.to_string(),
            });
        }
        Ok(indices.clone())
    }
}

/// One merge input: a loaded document and the pages to take from it.
#[derive(Debug)]
pub struct MergeSource {
    /// The source document (already decrypted at load time)
    pub document: Document,
    /// Pages to copy
    pub pages: PageSelector,
}

impl MergeSource {
    /// Take every page of `document`.
    pub fn all(document: Document) -> Self {
        Self {
            document,
            pages: PageSelector::All,
        }
    }

    /// Take the given 0-based pages of `document`, in that order.
    pub fn pages(document: Document, indices: Vec<usize>) -> Self {
        Self {
            document,
            pages: PageSelector::Indices(indices),
        }
    }
}

/// Merge the selected pages of every source, in input order.
///
/// All selectors are checked before anything is copied, so an invalid index
/// fails the whole merge without partial output.
///
/// # Errors
///
/// - [`Error::InvalidPageIndex`] for a bad selector
/// - [`Error::CyclicPageTree`], [`Error::CyclicReference`] and
///   [`Error::DanglingReference`] for inconsistent source graphs
pub fn merge(mut sources: Vec<MergeSource>, options: &MergeOptions) -> Result<Document> {
    let mut plans = Vec::with_capacity(sources.len());
    for (source_index, source) in sources.iter_mut().enumerate() {
        let pages = source.document.pages()?;
        let chosen = source.pages.resolve(source_index, pages.len())?;
        plans.push(chosen.into_iter().map(|i| pages[i]).collect::<Vec<_>>());
    }

    let mut merger = Merger::new(options.clone());
    for (source_index, (source, pages)) in sources.iter_mut().zip(plans).enumerate() {
        merger.append(source_index, &mut source.document, &pages)?;
    }
    merger.finish()
}

/// Destination document under construction.
#[derive(Debug)]
pub struct Merger {
    destination: Document,
    options: MergeOptions,
    /// (source document, source reference) to destination reference
    copied: HashMap<(DocumentId, ObjectRef), ObjectRef>,
    kids: Vec<Object>,
    pages_root: ObjectRef,
    max_version: (u8, u8),
    sources: usize,
}

impl Merger {
    /// Start from an empty destination.
    pub fn new(options: MergeOptions) -> Self {
        let destination = Document::new_destination();
        let pages_root = ObjectRef::new(2, 0);
        Self {
            destination,
            options,
            copied: HashMap::new(),
            kids: Vec::new(),
            pages_root,
            max_version: (1, 4),
            sources: 0,
        }
    }

    /// Copy `pages` (source page references, in output order) from `source`.
    pub fn append(&mut self, source_index: usize, source: &mut Document, pages: &[ObjectRef]) -> Result<()> {
        let source_id = source.id();
        log::debug!("Copying {} pages from source {} ({})", pages.len(), source_index, source_id);

        self.max_version = self.max_version.max(source.version());

        // Numbers for the pages first, so links between selected pages resolve.
        let mut queue = VecDeque::new();
        let selected: HashSet<ObjectRef> = pages.iter().copied().collect();
        for &page in pages {
            let dest = self.destination.add_object(Object::Null);
            self.copied.insert((source_id, page), dest);
            self.kids.push(Object::Reference(dest));
            queue.push_back((page, dest));
        }

        if self.options.keep_info && self.sources == 0 {
            if let Some(info) = source.trailer().get("Info").and_then(|i| i.as_reference()) {
                let dest = self.map_reference(source_index, source, info, &mut queue)?;
                self.destination.set_trailer_entry("Info", dest);
            }
        }

        while let Some((src, dest)) = queue.pop_front() {
            let obj = source.resolve(src)?;
            let obj = if selected.contains(&src) {
                Object::Dictionary(self.prepare_page(source, src, obj)?)
            } else {
                obj
            };

            let mut refs = Vec::new();
            obj.collect_references(&mut refs);
            let mut replacements = HashMap::with_capacity(refs.len());
            for r in refs {
                if let std::collections::hash_map::Entry::Vacant(slot) = replacements.entry(r) {
                    slot.insert(self.map_reference(source_index, source, r, &mut queue)?);
                }
            }

            let mut rewritten = obj.map_references(&mut |r| replacements.get(&r).cloned().unwrap_or(Object::Null));
            if selected.contains(&src) {
                if let Some(dict) = rewritten.as_dict_mut() {
                    dict.insert("Parent".to_string(), Object::Reference(self.pages_root));
                }
            }
            self.destination.replace_object(dest, rewritten)?;
        }

        // includes anything recorded while reading the copied objects
        self.destination.extend_warnings(source.warnings().iter().cloned());
        self.sources += 1;
        Ok(())
    }

    /// Destination value for a reference found inside a copied object.
    fn map_reference(
        &mut self,
        source_index: usize,
        source: &mut Document,
        r: ObjectRef,
        queue: &mut VecDeque<(ObjectRef, ObjectRef)>,
    ) -> Result<Object> {
        if let Some(dest) = self.copied.get(&(source.id(), r)) {
            return Ok(Object::Reference(*dest));
        }

        let target = source.resolve(r)?;
        if matches!(target.dict_type(), Some("Page") | Some("Pages")) {
            // unselected page or an intermediate node of the source tree
            self.destination.push_warning(Warning::DroppedPageLink {
                source_index,
                target: r,
            });
            return Ok(Object::Null);
        }

        let dest = self.destination.add_object(Object::Null);
        self.copied.insert((source.id(), r), dest);
        queue.push_back((r, dest));
        Ok(Object::Reference(dest))
    }

    /// The page dictionary with inherited attributes made local and the
    /// source `/Parent` removed.
    fn prepare_page(&mut self, source: &mut Document, page: ObjectRef, obj: Object) -> Result<Dictionary> {
        let attrs = source.effective_attributes(page)?;
        let mut dict = match obj {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(Error::InvalidObjectType {
                    expected: "Dictionary".to_string(),
                    found: other.type_name().to_string(),
                });
            },
        };

        dict.remove("Parent");
        dict.insert("Type".to_string(), Object::name("Page"));
        for key in INHERITABLE_ATTRIBUTES {
            if dict.contains_key(key) {
                continue;
            }
            if let Some(value) = attrs.get(key) {
                dict.insert(key.to_string(), value.clone());
            }
        }
        if !dict.contains_key("MediaBox") {
            log::debug!("Page {} has no /MediaBox, using US Letter", page);
            dict.insert(
                "MediaBox".to_string(),
                Object::Array(DEFAULT_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect()),
            );
        }
        Ok(dict)
    }

    /// Number of pages copied so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Link the copied pages under the destination page tree.
    pub fn finish(mut self) -> Result<Document> {
        let count = self.kids.len();
        let mut pages = self.destination.resolve_dict(self.pages_root)?;
        pages.insert("Kids".to_string(), Object::Array(std::mem::take(&mut self.kids)));
        pages.insert("Count".to_string(), Object::Integer(count as i64));
        self.destination.replace_object(self.pages_root, Object::Dictionary(pages))?;

        let version = self.options.pdf_version.unwrap_or(self.max_version);
        self.destination.set_version(version);

        log::info!(
            "Merged {} pages from {} sources into {} objects",
            count,
            self.sources,
            self.destination.object_numbers().len()
        );
        Ok(self.destination)
    }
}
