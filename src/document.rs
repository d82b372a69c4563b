//! PDF document model.
//!
//! A [`Document`] owns the file bytes, the merged cross-reference table and
//! trailer, an explicit cache of resolved objects and, for encrypted files,
//! the decryption context. Objects are loaded on first access and decrypted
//! as they are read, so callers only ever see plaintext.
//!
//! Destination documents built by the merge engine use the same type: they
//! start from [`Document::new_destination`] and grow through
//! [`Document::add_object`].

use crate::encryption::DecryptionContext;
use crate::error::{Error, Result, Warning};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{ParseContext, parse_indirect_object};
use crate::parser_config::ParserOptions;
use crate::xref::{CrossRefTable, XRefEntry, find_startxref, read_xref_chain};
use crate::xref_reconstruction::{index_object_stream, reconstruct_xref};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// The header must start within this many bytes of the file start.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Attributes a page inherits from its ancestors.
///
/// PDF Spec: ISO 32000-1:2008, Section 7.7.3.4 - Inheritance of Page Attributes
pub const INHERITABLE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Identity of one loaded or created document.
///
/// Two documents never share an id, even when loaded from the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Effective (inherited) attributes of a leaf page.
///
/// `resources` is kept as stored (often a reference); the other entries are
/// fully resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAttributes {
    /// `/Resources`
    pub resources: Option<Object>,
    /// `/MediaBox`
    pub media_box: Option<Object>,
    /// `/CropBox`
    pub crop_box: Option<Object>,
    /// `/Rotate`
    pub rotate: Option<Object>,
}

impl PageAttributes {
    /// Media box as `[llx, lly, urx, ury]`.
    pub fn media_box_rect(&self) -> Option<[f64; 4]> {
        self.media_box.as_ref().and_then(rect)
    }

    /// Crop box as `[llx, lly, urx, ury]`, defaulting to the media box.
    pub fn crop_box_rect(&self) -> Option<[f64; 4]> {
        self.crop_box.as_ref().and_then(rect).or_else(|| self.media_box_rect())
    }

    /// Page rotation in degrees, normalised to 0, 90, 180 or 270.
    pub fn rotation(&self) -> i64 {
        self.rotate
            .as_ref()
            .and_then(|r| r.as_integer())
            .map(|r| r.rem_euclid(360) / 90 * 90)
            .unwrap_or(0)
    }

    /// Entry value by inheritable key name.
    pub fn get(&self, key: &str) -> Option<&Object> {
        match key {
            "Resources" => self.resources.as_ref(),
            "MediaBox" => self.media_box.as_ref(),
            "CropBox" => self.crop_box.as_ref(),
            "Rotate" => self.rotate.as_ref(),
            _ => None,
        }
    }

    fn slot(&mut self, key: &str) -> Option<&mut Option<Object>> {
        match key {
            "Resources" => Some(&mut self.resources),
            "MediaBox" => Some(&mut self.media_box),
            "CropBox" => Some(&mut self.crop_box),
            "Rotate" => Some(&mut self.rotate),
            _ => None,
        }
    }
}

fn rect(obj: &Object) -> Option<[f64; 4]> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_number()?;
    }
    Some(out)
}

/// PDF document.
///
/// # Example
///
/// ```no_run
/// use pdf_merge::document::Document;
/// use pdf_merge::parser_config::ParserOptions;
///
/// let bytes = std::fs::read("sample.pdf")?;
/// let mut doc = Document::load(bytes, &ParserOptions::default())?;
/// println!("PDF {}.{}, {} pages", doc.version().0, doc.version().1, doc.pages()?.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Document {
    id: DocumentId,
    /// File contents (empty for documents built in memory)
    bytes: Bytes,
    /// PDF version (major, minor)
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dictionary,
    options: ParserOptions,
    /// Resolved objects, and every object created in memory
    object_cache: HashMap<ObjectRef, Object>,
    /// Decoded object streams by object number
    object_streams: HashMap<u32, ObjectStream>,
    /// Object numbers created in memory rather than read from `bytes`
    created: BTreeSet<u32>,
    /// Next free object number
    next_number: u32,
    decryption: Option<DecryptionContext>,
    /// Table from a full scan, built on the first bad xref offset
    scanned_xref: Option<CrossRefTable>,
    scan_attempted: bool,
    warnings: Vec<Warning>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("xref_entries", &self.xref.len())
            .field("cached_objects", &self.object_cache.len())
            .field("encrypted", &self.decryption.is_some())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Load a document from its bytes.
    ///
    /// This function:
    /// 1. Finds the `%PDF-M.m` header (leading garbage is tolerated)
    /// 2. Reads the cross-reference chain from the last `startxref`, or
    ///    rebuilds it by scanning the file when that fails (lenient mode)
    /// 3. Authenticates the empty user password when `/Encrypt` is present
    /// 4. Checks that `/Root` names a catalog dictionary
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHeader`] when no header is found
    /// - [`Error::MalformedSyntax`] / [`Error::InvalidXref`] in strict mode,
    ///   or when reconstruction finds nothing usable
    /// - [`Error::PasswordRequired`] / [`Error::UnsupportedEncryption`]
    /// - [`Error::DanglingReference`] when `/Root` does not exist
    pub fn load(bytes: impl Into<Bytes>, options: &ParserOptions) -> Result<Self> {
        let bytes: Bytes = bytes.into();
        if options.max_file_size > 0 && bytes.len() > options.max_file_size {
            return Err(Error::InvalidPdf(format!(
                "file is {} bytes, limit is {}",
                bytes.len(),
                options.max_file_size
            )));
        }

        let (version, header_offset) = parse_header(&bytes)?;
        if header_offset > 0 {
            log::debug!("PDF header found at offset {}", header_offset);
        }

        let mut warnings = Vec::new();
        let xref = match load_xref(&bytes, options) {
            Ok(table) => table,
            Err((offset, err)) => {
                if options.strict {
                    return Err(err);
                }
                log::warn!("Cross-reference data unusable ({}), scanning file", err);
                warnings.push(Warning::BrokenXrefSection {
                    offset,
                    reason: err.to_string(),
                });
                let table = reconstruct_xref(&bytes, options)?;
                log::info!("Reconstructed cross-reference table with {} objects", table.len());
                warnings.push(Warning::ReconstructedXref { objects: table.len() });
                table
            },
        };

        let trailer = xref.trailer().clone();
        let next_number = next_free_number(&xref, &trailer);

        let mut document = Self {
            id: DocumentId::new(),
            bytes,
            version,
            xref,
            trailer,
            options: *options,
            object_cache: HashMap::new(),
            object_streams: HashMap::new(),
            created: BTreeSet::new(),
            next_number,
            decryption: None,
            scanned_xref: None,
            scan_attempted: false,
            warnings,
        };

        document.init_decryption()?;
        document.index_deferred_object_streams();

        let root = document.catalog_ref()?;
        let catalog = document.resolve(root)?;
        if catalog.as_dict().is_none() {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: catalog.type_name().to_string(),
            });
        }

        log::debug!(
            "Loaded {:?}: PDF {}.{}, {} xref entries",
            document.id,
            version.0,
            version.1,
            document.xref.len()
        );
        Ok(document)
    }

    /// An empty destination: catalog `1 0 R` and page tree root `2 0 R`.
    pub fn new_destination() -> Self {
        let pages_ref = ObjectRef::new(2, 0);
        let catalog_ref = ObjectRef::new(1, 0);

        let mut pages = Dictionary::new();
        pages.insert("Type".to_string(), Object::name("Pages"));
        pages.insert("Kids".to_string(), Object::Array(Vec::new()));
        pages.insert("Count".to_string(), Object::Integer(0));

        let mut catalog = Dictionary::new();
        catalog.insert("Type".to_string(), Object::name("Catalog"));
        catalog.insert("Pages".to_string(), Object::Reference(pages_ref));

        let mut trailer = Dictionary::new();
        trailer.insert("Root".to_string(), Object::Reference(catalog_ref));

        let mut object_cache = HashMap::new();
        object_cache.insert(catalog_ref, Object::Dictionary(catalog));
        object_cache.insert(pages_ref, Object::Dictionary(pages));

        Self {
            id: DocumentId::new(),
            bytes: Bytes::new(),
            version: (1, 7),
            xref: CrossRefTable::new(),
            trailer,
            options: ParserOptions::default(),
            object_cache,
            object_streams: HashMap::new(),
            created: [1, 2].into_iter().collect(),
            next_number: 3,
            decryption: None,
            scanned_xref: None,
            scan_attempted: false,
            warnings: Vec::new(),
        }
    }

    /// Unique identity of this document.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// PDF version (major, minor) from the header, or as set for output.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Set the version written in the output header.
    pub fn set_version(&mut self, version: (u8, u8)) {
        self.version = version;
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Set or replace one trailer entry.
    pub fn set_trailer_entry(&mut self, key: &str, value: Object) {
        self.trailer.insert(key.to_string(), value);
    }

    /// Parsing policy this document was loaded with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// True if the source file carried `/Encrypt`.
    pub fn is_encrypted(&self) -> bool {
        self.decryption.is_some()
    }

    /// Decryption state, for encrypted sources.
    pub fn decryption(&self) -> Option<&DecryptionContext> {
        self.decryption.as_ref()
    }

    /// Recoverable conditions met so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Record a recoverable condition.
    pub fn push_warning(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Append warnings gathered elsewhere (already logged).
    pub(crate) fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Reference to the document catalog (`/Root`).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(|r| r.as_reference())
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.catalog_ref()?;
        let catalog = self.resolve(root)?;
        into_dict(catalog)
    }

    /// Reference to the page tree root (`/Root /Pages`).
    pub fn pages_root(&mut self) -> Result<ObjectRef> {
        self.catalog()?
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::InvalidPdf("catalog has no /Pages reference".to_string()))
    }

    // ========================================================================
    // Object resolution
    // ========================================================================

    /// Resolve one level of indirection.
    ///
    /// # Errors
    ///
    /// [`Error::DanglingReference`] if the object is free, absent from the
    /// cross-reference table, or stored with a different generation; parse
    /// and decryption errors for the object itself.
    pub fn resolve(&mut self, reference: ObjectRef) -> Result<Object> {
        if let Some(obj) = self.object_cache.get(&reference) {
            return Ok(obj.clone());
        }

        let entry = match self.xref.get(reference.id) {
            Some(entry) if !entry.is_free() && entry.generation() == reference.gen => *entry,
            _ => return Err(Error::DanglingReference(reference)),
        };

        let obj = match entry {
            XRefEntry::InUse { offset, .. } => {
                let obj = self.load_uncompressed(reference, offset)?;
                match &self.decryption {
                    Some(ctx) => ctx.decrypt_object(obj, reference)?,
                    None => obj,
                }
            },
            XRefEntry::Compressed { stream, index } => self.load_compressed(reference, stream, index)?,
            XRefEntry::Free { .. } => return Err(Error::DanglingReference(reference)),
        };

        self.object_cache.insert(reference, obj.clone());
        Ok(obj)
    }

    /// Follow a chain of references until a direct value is reached.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicReference`] when the chain revisits a reference or is
    /// longer than `max_reference_depth`.
    pub fn resolve_deep(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        let mut seen = HashSet::new();

        while let Object::Reference(r) = current {
            if !seen.insert(r) || seen.len() > self.options.max_reference_depth {
                return Err(Error::CyclicReference(r));
            }
            current = self.resolve(r)?;
        }
        Ok(current)
    }

    /// Resolve `reference` and require a dictionary (streams give their
    /// dictionary).
    pub fn resolve_dict(&mut self, reference: ObjectRef) -> Result<Dictionary> {
        into_dict(self.resolve(reference)?)
    }

    fn load_uncompressed(&mut self, reference: ObjectRef, offset: usize) -> Result<Object> {
        match self.parse_at(reference, offset) {
            Ok((obj, warnings)) => {
                self.record_parse_warnings(warnings);
                Ok(obj)
            },
            Err(err) if !self.options.strict => {
                let Some(scanned) = self.scanned_offset(reference) else {
                    return Err(err);
                };
                if scanned == offset {
                    return Err(err);
                }
                log::info!("Object {} not at xref offset {}, using scanned offset {}", reference, offset, scanned);
                let (obj, warnings) = self.parse_at(reference, scanned)?;
                self.record_parse_warnings(warnings);
                Ok(obj)
            },
            Err(err) => Err(err),
        }
    }

    /// Parse `N G obj` at `offset` and check it is `reference`.
    fn parse_at(&self, reference: ObjectRef, offset: usize) -> Result<(Object, Vec<Warning>)> {
        let bytes = &self.bytes[..];
        let xref = &self.xref;
        let options = self.options;
        let length_of = move |r: ObjectRef| indirect_length(bytes, xref, r, &options);

        let mut ctx = ParseContext::new(self.options)
            .with_length_resolver(&length_of)
            .with_source(self.bytes.clone());
        let parsed = parse_indirect_object(bytes, offset, &mut ctx)?;
        if parsed.reference.id != reference.id || parsed.reference.gen != reference.gen {
            return Err(Error::malformed(
                offset,
                format!("object {} (found {})", reference, parsed.reference),
            ));
        }
        Ok((parsed.object, ctx.warnings))
    }

    fn record_parse_warnings(&mut self, warnings: Vec<Warning>) {
        for warning in warnings {
            self.push_warning(warning);
        }
    }

    /// Offset of `reference` according to a full file scan.
    fn scanned_offset(&mut self, reference: ObjectRef) -> Option<usize> {
        if !self.scan_attempted {
            self.scan_attempted = true;
            match reconstruct_xref(&self.bytes, &self.options) {
                Ok(table) => self.scanned_xref = Some(table),
                Err(e) => log::debug!("Fallback scan failed: {}", e),
            }
        }
        match self.scanned_xref.as_ref()?.get(reference.id)? {
            XRefEntry::InUse { offset, generation } if *generation == reference.gen => Some(*offset),
            _ => None,
        }
    }

    fn load_compressed(&mut self, reference: ObjectRef, stream: u32, index: usize) -> Result<Object> {
        if !self.object_streams.contains_key(&stream) {
            // The container must be a plain object, or resolution could recurse.
            if !matches!(self.xref.get(stream), Some(XRefEntry::InUse { .. })) {
                return Err(Error::InvalidPdf(format!(
                    "object stream {} for object {} is not stored as a plain object",
                    stream, reference
                )));
            }
            let container = self.resolve(ObjectRef::new(stream, 0))?;
            let parsed = ObjectStream::parse(&container, &self.options)?;
            self.object_streams.insert(stream, parsed);
        }

        match self.object_streams.get(&stream) {
            Some(objstm) => objstm.get(reference.id, index),
            None => Err(Error::DanglingReference(reference)),
        }
    }

    fn init_decryption(&mut self) -> Result<()> {
        let Some(encrypt) = self.trailer.get("Encrypt").cloned() else {
            return Ok(());
        };

        let encrypt_ref = encrypt.as_reference();
        let dict = match encrypt {
            Object::Reference(r) => self.resolve_dict(r)?,
            Object::Dictionary(d) => d,
            other => {
                return Err(Error::InvalidObjectType {
                    expected: "Dictionary".to_string(),
                    found: other.type_name().to_string(),
                });
            },
        };

        let file_id = self
            .trailer
            .get("ID")
            .and_then(|id| id.as_array())
            .and_then(|ids| ids.first())
            .and_then(|first| first.as_string())
            .map(|s| s.to_vec())
            .unwrap_or_default();

        let ctx = DecryptionContext::new(&dict, &file_id, encrypt_ref)?;
        // anything read while looking up /Encrypt is still ciphertext
        self.object_cache.clear();
        self.object_streams.clear();
        self.decryption = Some(ctx);
        Ok(())
    }

    /// List the members of object streams that reconstruction found in an
    /// encrypted file, now that their payloads can be decrypted.
    fn index_deferred_object_streams(&mut self) {
        for stream_num in self.xref.take_deferred_object_streams() {
            let generation = self.xref.get(stream_num).map_or(0, |e| e.generation());
            let indexed = self
                .resolve(ObjectRef::new(stream_num, generation))
                .and_then(|stream| index_object_stream(&mut self.xref, stream_num, &stream, &self.options));
            match indexed {
                Ok(added) => log::info!("Indexed {} objects from encrypted object stream {}", added, stream_num),
                Err(e) => log::debug!("Object stream {} unreadable after decryption: {}", stream_num, e),
            }
        }
    }

    // ========================================================================
    // Page tree
    // ========================================================================

    /// Leaf pages of `/Root /Pages` in document order.
    ///
    /// Nodes whose `/Type` does not fit their position are skipped with a
    /// [`Warning::SkippedPageNode`]. A node without `/Type` is an intermediate
    /// node when it has `/Kids` and a leaf otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicPageTree`] when a node is its own ancestor;
    /// [`Error::DanglingReference`] for a kid missing from the file;
    /// [`Error::InvalidPdf`] when the walk exceeds `max_page_tree_nodes`.
    pub fn pages(&mut self) -> Result<Vec<ObjectRef>> {
        let root = self.pages_root()?;
        let mut pages = Vec::new();

        // (node, kids still to visit) per ancestor on the current path
        let mut path: Vec<(ObjectRef, std::vec::IntoIter<Object>)> = Vec::new();
        let mut on_path: HashSet<ObjectRef> = HashSet::new();
        let mut pending = Some(root);
        let budget = self.options.max_page_tree_nodes;
        let mut visited = 0usize;

        loop {
            if let Some(node) = pending.take() {
                if on_path.contains(&node) {
                    return Err(Error::CyclicPageTree(node));
                }
                visited += 1;
                if budget > 0 && visited > budget {
                    return Err(Error::InvalidPdf(format!(
                        "page tree visits more than {} nodes",
                        budget
                    )));
                }
                match self.classify_node(node)? {
                    PageNode::Leaf => pages.push(node),
                    PageNode::Intermediate(kids) => {
                        on_path.insert(node);
                        path.push((node, kids.into_iter()));
                    },
                    PageNode::Skipped(reason) => {
                        self.push_warning(Warning::SkippedPageNode { node, reason });
                    },
                }
            }

            let Some((parent, kids)) = path.last_mut() else {
                break;
            };
            match kids.next() {
                Some(Object::Reference(kid)) => pending = Some(kid),
                Some(other) => {
                    let parent = *parent;
                    self.push_warning(Warning::SkippedPageNode {
                        node: parent,
                        reason: format!("kid is a direct {} instead of a reference", other.type_name()),
                    });
                },
                None => {
                    if let Some((done, _)) = path.pop() {
                        on_path.remove(&done);
                    }
                },
            }
        }

        log::debug!("Page tree of {:?} has {} pages", self.id, pages.len());
        Ok(pages)
    }

    /// Number of leaf pages.
    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    fn classify_node(&mut self, node: ObjectRef) -> Result<PageNode> {
        let obj = self.resolve(node)?;
        let Some(dict) = obj.as_dict() else {
            return Ok(PageNode::Skipped(format!("node is a {}", obj.type_name())));
        };

        let kids = match dict.get("Kids") {
            Some(kids) => match self.resolve_deep(kids)? {
                Object::Array(items) => Some(items),
                _ => None,
            },
            None => None,
        };

        Ok(match (dict.get("Type").and_then(|t| t.as_name()), kids) {
            (Some("Page"), _) => PageNode::Leaf,
            (Some("Pages"), Some(kids)) | (None, Some(kids)) => PageNode::Intermediate(kids),
            (Some("Pages"), None) => PageNode::Skipped("/Pages node without /Kids array".to_string()),
            (None, None) => PageNode::Leaf,
            (Some(other), _) => PageNode::Skipped(format!("/Type /{} inside the page tree", other)),
        })
    }

    /// Inherited attributes of a page, nearest ancestor first.
    ///
    /// Ancestors are only read, never modified.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicPageTree`] when the `/Parent` chain loops.
    pub fn effective_attributes(&mut self, page: ObjectRef) -> Result<PageAttributes> {
        let mut attrs = PageAttributes::default();
        let mut visited = HashSet::new();
        let mut current = Some(page);

        while let Some(node_ref) = current {
            if !visited.insert(node_ref) {
                return Err(Error::CyclicPageTree(node_ref));
            }
            let node = self.resolve_dict(node_ref)?;

            for key in INHERITABLE_ATTRIBUTES {
                let Some(value) = node.get(key) else {
                    continue;
                };
                let resolved = if key == "Resources" { value.clone() } else { self.resolve_deep(value)? };
                if let Some(slot) = attrs.slot(key) {
                    if slot.is_none() && !resolved.is_null() {
                        *slot = Some(resolved);
                    }
                }
            }

            current = node.get("Parent").and_then(|p| p.as_reference());
        }

        Ok(attrs)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Store `obj` under a fresh object number (generation 0).
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let reference = ObjectRef::new(self.next_number, 0);
        self.next_number += 1;
        self.object_cache.insert(reference, obj);
        self.created.insert(reference.id);
        reference
    }

    /// Replace the value of an existing object.
    ///
    /// # Errors
    ///
    /// [`Error::DanglingReference`] if `reference` does not exist.
    pub fn replace_object(&mut self, reference: ObjectRef, obj: Object) -> Result<()> {
        if !self.object_cache.contains_key(&reference) {
            self.resolve(reference)?;
        }
        self.object_cache.insert(reference, obj);
        Ok(())
    }

    /// Every live object, in ascending number order.
    pub fn object_refs(&self) -> Vec<ObjectRef> {
        let mut refs: Vec<ObjectRef> = self
            .xref
            .live_object_numbers()
            .into_iter()
            .filter(|n| !self.created.contains(n))
            .filter_map(|n| self.xref.get(n).map(|e| ObjectRef::new(n, e.generation())))
            .collect();
        refs.extend(self.created.iter().map(|&n| ObjectRef::new(n, 0)));
        refs.sort();
        refs
    }

    /// Object numbers of every live object, ascending.
    pub fn object_numbers(&self) -> Vec<u32> {
        self.object_refs().into_iter().map(|r| r.id).collect()
    }

    /// Highest object number in use.
    pub fn max_object_number(&self) -> u32 {
        self.next_number.saturating_sub(1)
    }
}

enum PageNode {
    Leaf,
    Intermediate(Vec<Object>),
    Skipped(String),
}

fn into_dict(obj: Object) -> Result<Dictionary> {
    match obj {
        Object::Dictionary(dict) | Object::Stream { dict, .. } => Ok(dict),
        other => Err(Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

/// Find `%PDF-M.m` in the first kilobyte; returns the version and the offset
/// of `%`.
///
/// # Example
///
/// ```
/// use pdf_merge::document::parse_header;
///
/// assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), ((1, 7), 0));
/// assert_eq!(parse_header(b"junk\n%PDF-2.0\n").unwrap(), ((2, 0), 5));
/// ```
pub fn parse_header(bytes: &[u8]) -> Result<((u8, u8), usize)> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    let at = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| Error::InvalidHeader("no %PDF- header in the first 1024 bytes".to_string()))?;

    match bytes.get(at + 5..at + 8) {
        Some([major, b'.', minor]) if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok(((major - b'0', minor - b'0'), at))
        },
        _ => Err(Error::InvalidHeader(format!(
            "malformed version after %PDF- at offset {}",
            at
        ))),
    }
}

/// Read the xref chain; on failure, the offset it was read from and why.
fn load_xref(bytes: &[u8], options: &ParserOptions) -> std::result::Result<CrossRefTable, (usize, Error)> {
    let start = find_startxref(bytes).map_err(|e| (bytes.len(), e))?;
    let table = read_xref_chain(bytes, start, options).map_err(|e| (start, e))?;
    if !table.trailer().contains_key("Root") {
        return Err((start, Error::InvalidXref));
    }
    if table.is_empty() {
        return Err((start, Error::InvalidXref));
    }
    Ok(table)
}

fn next_free_number(xref: &CrossRefTable, trailer: &Dictionary) -> u32 {
    let from_table = xref.live_object_numbers().last().map_or(1, |n| n + 1);
    let from_size = trailer
        .get("Size")
        .and_then(|s| s.as_integer())
        .and_then(|s| u32::try_from(s).ok())
        .unwrap_or(0);
    from_table.max(from_size).max(1)
}

/// Value of an indirect `/Length`, read straight from the file.
fn indirect_length(bytes: &[u8], xref: &CrossRefTable, r: ObjectRef, options: &ParserOptions) -> Option<usize> {
    let XRefEntry::InUse { offset, .. } = xref.get(r.id)? else {
        return None;
    };
    let mut ctx = ParseContext::new(*options);
    let parsed = parse_indirect_object(bytes, *offset, &mut ctx).ok()?;
    parsed.object.as_integer().and_then(|n| usize::try_from(n).ok())
}
