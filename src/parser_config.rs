//! Parser configuration for lenient and strict loading.
//!
//! # Example
//!
//! ```
//! use pdf_merge::parser_config::ParserOptions;
//!
//! // Lenient mode - repair and warn (default)
//! let lenient = ParserOptions::lenient();
//!
//! // Strict mode - length mismatches and missing endobj are fatal
//! let strict = ParserOptions::strict();
//!
//! // Custom limits
//! let custom = ParserOptions::default()
//!     .with_max_reference_depth(16)
//!     .with_max_decompressed_size(16 * 1024 * 1024);
//! assert_eq!(custom.max_reference_depth, 16);
//! ```

/// Parser options for controlling error handling and recovery behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParserOptions {
    /// Fail on spec violations instead of recording a warning and repairing.
    pub strict: bool,

    /// Maximum array/dictionary nesting depth.
    pub max_nesting: usize,

    /// Allow objects without the `endobj` keyword.
    pub allow_missing_endobj: bool,

    /// Allow streams whose `/Length` disagrees with the `endstream` position.
    pub allow_malformed_streams: bool,

    /// Longest reference chain followed before reporting a cycle.
    pub max_reference_depth: usize,

    /// Maximum number of sections followed through `/Prev`.
    pub max_xref_chain: usize,

    /// Maximum decompression ratio (decoded:encoded). 0 disables the check.
    pub max_decompression_ratio: u32,

    /// Maximum decoded stream size in bytes. 0 disables the check.
    pub max_decompressed_size: usize,

    /// Maximum input size in bytes. 0 disables the check.
    pub max_file_size: usize,

    /// Maximum page tree nodes visited while listing pages; a kid shared by
    /// several parents counts once per visit. 0 disables the check.
    pub max_page_tree_nodes: usize,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: fail on the first spec violation
    pub fn strict() -> Self {
        Self {
            strict: true,
            allow_missing_endobj: false,
            allow_malformed_streams: false,
            ..Self::lenient()
        }
    }

    /// Lenient mode: repair what can be repaired and record warnings
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 100,
            allow_missing_endobj: true,
            allow_malformed_streams: true,
            max_reference_depth: 32,
            max_xref_chain: 100,
            max_decompression_ratio: 1000,
            max_decompressed_size: 256 * 1024 * 1024, // 256 MB
            max_file_size: 2 * 1024 * 1024 * 1024,    // 2 GB
            max_page_tree_nodes: 1_000_000,
        }
    }

    /// Set the reference chain bound.
    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    /// Set the decoded stream size bound.
    pub fn with_max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }

    /// Set the decoded-to-encoded ratio bound (0 disables it).
    pub fn with_max_decompression_ratio(mut self, ratio: u32) -> Self {
        self.max_decompression_ratio = ratio;
        self
    }

    /// Set the page tree visit bound.
    pub fn with_max_page_tree_nodes(mut self, nodes: usize) -> Self {
        self.max_page_tree_nodes = nodes;
        self
    }

    /// Set the `/Prev` chain bound.
    pub fn with_max_xref_chain(mut self, sections: usize) -> Self {
        self.max_xref_chain = sections;
        self
    }
}
