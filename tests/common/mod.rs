//! In-memory PDF construction shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Builds a classic-xref PDF from object bodies.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: &'static str,
    /// number -> (generation, body bytes between `obj` and `endobj`)
    objects: BTreeMap<u32, (u16, Vec<u8>)>,
    trailer: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4",
            objects: BTreeMap::new(),
            trailer: "/Root 1 0 R".to_string(),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn object(self, number: u32, body: &str) -> Self {
        self.raw_object(number, 0, body.as_bytes().to_vec())
    }

    pub fn raw_object(mut self, number: u32, generation: u16, body: Vec<u8>) -> Self {
        self.objects.insert(number, (generation, body));
        self
    }

    /// A stream object; `/Length` is appended to `dict_entries`.
    pub fn stream(self, number: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.raw_object(number, 0, body)
    }

    /// Extra trailer entries after `/Root 1 0 R`.
    pub fn trailer(mut self, extra: &str) -> Self {
        self.trailer = format!("/Root 1 0 R {}", extra);
        self
    }

    /// Header and object bodies only, with the offset of each object.
    pub fn body(&self) -> (Vec<u8>, BTreeMap<u32, usize>) {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut offsets = BTreeMap::new();
        for (number, (generation, body)) in &self.objects {
            offsets.insert(*number, out.len());
            out.extend_from_slice(format!("{} {} obj\n", number, generation).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        (out, offsets)
    }

    pub fn build(&self) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let size = self.objects.keys().next_back().map_or(1, |max| max + 1);
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
        for number in 1..size {
            match (offsets.get(&number), self.objects.get(&number)) {
                (Some(offset), Some((generation, _))) => {
                    out.extend_from_slice(format!("{:010} {:05} n \n", offset, generation).as_bytes())
                },
                _ => out.extend_from_slice(b"0000000000 00001 f \n"),
            }
        }
        out.extend_from_slice(
            format!("trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n", size, self.trailer, xref_at).as_bytes(),
        );
        out
    }
}

/// Append an incremental update that redefines `objects`.
pub fn append_update(mut base: Vec<u8>, objects: &[(u32, &str)], size: u32) -> Vec<u8> {
    let prev = last_startxref(&base);
    let mut entries = Vec::new();
    for (number, body) in objects {
        entries.push((*number, base.len()));
        base.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }
    let xref_at = base.len();
    base.extend_from_slice(b"xref\n");
    for (number, offset) in entries {
        base.extend_from_slice(format!("{} 1\n{:010} 00000 n \n", number, offset).as_bytes());
    }
    base.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            size, prev, xref_at
        )
        .as_bytes(),
    );
    base
}

fn last_startxref(bytes: &[u8]) -> usize {
    let at = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    let tail = std::str::from_utf8(&bytes[at + 9..]).unwrap();
    tail.split_whitespace().next().unwrap().parse().unwrap()
}

/// Uppercase hex for `<...>` strings.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// A document whose pages are labelled `{prefix}0`, `{prefix}1`, ...
///
/// Object layout: 1 catalog, 2 page tree, 3 shared font, then for page `i`
/// the page at `10 + 2i` and its content stream at `11 + 2i`.
pub fn labelled_pdf(prefix: &str, pages: usize) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 10 + 2 * i)).collect();
    let mut builder = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
                kids.join(" "),
                pages
            ),
        )
        .object(3, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    for i in 0..pages {
        let page = 10 + 2 * i as u32;
        builder = builder
            .object(
                page,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /Label ({}{}) /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                    prefix,
                    i,
                    page + 1
                ),
            )
            .stream(page + 1, "", format!("BT /F1 12 Tf ({}{}) Tj ET", prefix, i).as_bytes());
    }
    builder.build()
}
