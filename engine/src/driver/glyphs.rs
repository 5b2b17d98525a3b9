//! Glyph metrics for the text atlas.
//!
//! The atlas mapping is a CSV with the header
//! `Character,Unicode,Index,Row,Col,X,Y,Width,WidthRatio`. Single-byte
//! characters are read from the first column; anything wider is taken from
//! the `U+XXXX` column so commas and quotes in the first column never
//! matter.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Cell of a glyph in the atlas grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphCell {
    pub col: u32,
    pub row: u32,
}

#[derive(Debug, Clone, Copy)]
struct Glyph {
    cell: GlyphCell,
    width_ratio: f32,
}

#[derive(Debug, Clone, Default)]
pub struct GlyphMetrics {
    glyphs: HashMap<char, Glyph>,
    cols: u32,
    rows: u32,
}

impl GlyphMetrics {
    pub fn load(path: &Path) -> Result<Self> {
        let csv = std::fs::read_to_string(path)?;
        let metrics = Self::parse(&csv);
        if metrics.is_empty() {
            return Err(EngineError::Config {
                path: path.to_path_buf(),
                message: "no glyph rows in atlas mapping".to_string(),
            });
        }
        info!(
            "glyph metrics: loaded {} glyphs from {} ({}x{} atlas)",
            metrics.len(),
            path.display(),
            metrics.cols,
            metrics.rows
        );
        Ok(metrics)
    }

    /// Parse mapping rows, skipping the header and malformed lines.
    pub fn parse(csv: &str) -> Self {
        let mut metrics = Self::default();
        let mut max_col = None::<u32>;
        let mut max_row = None::<u32>;
        for (number, line) in csv.lines().enumerate().skip(1) {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((ch, cell, width_ratio)) = parse_row(line) else {
                debug!("glyph metrics: skipping line {}", number + 1);
                continue;
            };
            max_col = max_col.max(Some(cell.col));
            max_row = max_row.max(Some(cell.row));
            metrics.glyphs.insert(ch, Glyph { cell, width_ratio });
        }
        metrics.cols = max_col.map_or(0, |c| c + 1);
        metrics.rows = max_row.map_or(0, |r| r + 1);
        metrics
    }

    /// Printable ASCII on a 16-column grid, used when no mapping file is
    /// available.
    pub fn builtin_ascii() -> Self {
        let mut metrics = Self::default();
        for code in 0x20u32..0x7f {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            let index = code - 0x20;
            let width_ratio = match ch {
                ' ' | 'i' | 'l' | 'j' | '.' | ',' | '!' | '|' | '\'' | ':' | ';' => 0.3,
                'm' | 'w' | 'M' | 'W' | '@' => 0.8,
                _ => 0.55,
            };
            let cell = GlyphCell {
                col: index % 16,
                row: index / 16,
            };
            metrics.glyphs.insert(ch, Glyph { cell, width_ratio });
        }
        metrics.cols = 16;
        metrics.rows = 6;
        metrics
    }

    pub fn cell(&self, ch: char) -> Option<GlyphCell> {
        self.glyphs.get(&ch).map(|g| g.cell)
    }

    /// Advance of `ch` relative to the cell size; zero when unknown.
    pub fn width_ratio(&self, ch: char) -> f32 {
        match self.glyphs.get(&ch) {
            Some(g) => g.width_ratio,
            None => {
                warn!("glyph metrics: no width for {:?} (U+{:04X})", ch, ch as u32);
                0.0
            }
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

fn parse_row(line: &str) -> Option<(char, GlyphCell, f32)> {
    // A literal comma in the first column shows up as an empty field
    // followed by another empty one; fields are counted from the end.
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 9 {
        return None;
    }
    let tail = &fields[fields.len() - 8..];
    let character = fields[..fields.len() - 8].join(",");
    let unicode = tail[0].trim();
    let row = tail[2].trim().parse::<u32>().ok()?;
    let col = tail[3].trim().parse::<u32>().ok()?;
    let width_ratio = tail[7].trim().parse::<f32>().ok()?;

    let mut chars = character.chars();
    let ch = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => parse_codepoint(unicode)?,
    };
    Some((ch, GlyphCell { col, row }, width_ratio))
}

fn parse_codepoint(unicode: &str) -> Option<char> {
    let hex = unicode.strip_prefix("U+").or_else(|| unicode.strip_prefix("u+"))?;
    char::from_u32(u32::from_str_radix(hex, 16).ok()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MAPPING: &str = "Character,Unicode,Index,Row,Col,X,Y,Width,WidthRatio\n\
        A,U+0041,33,2,1,64,128,40,0.62\n\
        ,,U+002C,12,12,0,0,768,10,0.21\n\
        é,U+00E9,200,13,8,512,832,36,0.55\n\
        broken,line\n";

    #[test]
    fn test_parse_reads_cells_and_ratios() {
        let metrics = GlyphMetrics::parse(MAPPING);
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics.cell('A'), Some(GlyphCell { col: 1, row: 2 }));
        assert!((metrics.width_ratio('A') - 0.62).abs() < 1e-6);
        assert_eq!(metrics.cols(), 9);
        assert_eq!(metrics.rows(), 14);
    }

    #[test]
    fn test_multibyte_and_comma_rows() {
        let metrics = GlyphMetrics::parse(MAPPING);
        assert_eq!(metrics.cell('é'), Some(GlyphCell { col: 8, row: 13 }));
        assert_eq!(metrics.cell(','), Some(GlyphCell { col: 0, row: 12 }));
    }

    #[test]
    fn test_unknown_glyph_has_zero_width() {
        let metrics = GlyphMetrics::parse(MAPPING);
        assert_eq!(metrics.cell('Z'), None);
        assert_eq!(metrics.width_ratio('Z'), 0.0);
    }

    #[test]
    fn test_builtin_covers_printable_ascii() {
        let metrics = GlyphMetrics::builtin_ascii();
        assert_eq!(metrics.len(), 95);
        assert_eq!(metrics.cell('0'), Some(GlyphCell { col: 0, row: 1 }));
        assert!(metrics.cell('\n').is_none());
    }

    #[test]
    fn test_load_rejects_empty_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Character,Unicode,Index,Row,Col,X,Y,Width,WidthRatio").unwrap();
        assert!(GlyphMetrics::load(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{MAPPING}").unwrap();
        assert_eq!(GlyphMetrics::load(file.path()).unwrap().len(), 3);
    }
}
