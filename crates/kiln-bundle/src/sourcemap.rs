//! Line-level source maps for bundles.
//!
//! Every generated line that holds module code maps to column 0 of the
//! same line in that module's source. Wrapper lines map to nothing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

const VLQ_DIGITS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Builds a version 3 source map one generated line at a time.
#[derive(Debug, Default)]
pub struct SourceMap {
    sources: Vec<String>,
    contents: Vec<String>,
    /// Per generated line: source index and 0-based source line
    lines: Vec<Option<(usize, usize)>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file, returning its index.
    pub fn add_source(&mut self, name: String, content: String) -> usize {
        self.sources.push(name);
        self.contents.push(content);
        self.sources.len() - 1
    }

    /// Generated lines with no source.
    pub fn skip_lines(&mut self, count: usize) {
        self.lines.resize(self.lines.len() + count, None);
    }

    /// `count` generated lines copied from the start of `source`.
    pub fn map_lines(&mut self, source: usize, count: usize) {
        self.lines.extend((0..count).map(|line| Some((source, line))));
    }

    /// Number of generated lines recorded so far.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The `mappings` field.
    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source = 0i64;
        let mut prev_line = 0i64;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let Some((source, src_line)) = *line else {
                continue;
            };
            let (source, src_line) = (source as i64, src_line as i64);

            // generated column, source, source line, source column
            vlq(&mut out, 0);
            vlq(&mut out, source - prev_source);
            vlq(&mut out, src_line - prev_line);
            vlq(&mut out, 0);

            prev_source = source;
            prev_line = src_line;
        }

        out
    }

    /// The map as JSON.
    pub fn to_json(&self) -> String {
        json!({
            "version": 3,
            "sources": self.sources,
            "sourcesContent": self.contents,
            "names": [],
            "mappings": self.mappings(),
        })
        .to_string()
    }

    /// A trailing comment carrying the map as a data URL.
    pub fn inline_comment(&self) -> String {
        format!(
            "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
            STANDARD.encode(self.to_json())
        )
    }
}

/// Append `value` as a base64 VLQ.
fn vlq(out: &mut String, value: i64) {
    let mut rest = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = (rest & 0b11111) as usize;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b100000;
        }
        out.push(VLQ_DIGITS[digit] as char);
        if rest == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_vlq() {
        let encode = |v| {
            let mut s = String::new();
            vlq(&mut s, v);
            s
        };

        assert_eq!(encode(0), "A");
        assert_eq!(encode(1), "C");
        assert_eq!(encode(-1), "D");
        assert_eq!(encode(16), "gB");
        assert_eq!(encode(-17), "jB");
    }

    #[test]
    fn maps_lines_relative_to_previous_segment() {
        let mut map = SourceMap::new();
        let a = map.add_source("a.js".to_string(), "1\n2\n".to_string());
        let b = map.add_source("b.js".to_string(), "3\n".to_string());

        map.skip_lines(1);
        map.map_lines(a, 2);
        map.skip_lines(1);
        map.map_lines(b, 1);

        assert_eq!(map.line_count(), 5);
        assert_eq!(map.mappings(), ";AAAA;AACA;;ACDA");
    }

    #[test]
    fn inlines_map_as_data_url() {
        let mut map = SourceMap::new();
        let a = map.add_source("a.js".to_string(), "x\n".to_string());
        map.map_lines(a, 1);

        let comment = map.inline_comment();
        let encoded = comment
            .trim_end()
            .strip_prefix("//# sourceMappingURL=data:application/json;charset=utf-8;base64,")
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();

        assert_eq!(json["version"], 3);
        assert_eq!(json["sources"], json!(["a.js"]));
        assert_eq!(json["sourcesContent"], json!(["x\n"]));
        assert_eq!(json["mappings"], "AAAA");
    }
}
