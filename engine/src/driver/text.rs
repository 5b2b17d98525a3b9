//! Text rendered as one glyph projectile per visible character.
//!
//! Glyph positions are computed in atlas units (a cell advances by
//! `LETTER_DISTANCE * (width_ratio + CHAR_GAP)`, lines are
//! `CHAR_HEIGHT * line_spacing` apart) and mapped into the driver's local
//! space with `MESH_UNIT`. Text reads toward the viewer's right, which is
//! local -X. Children are rebuilt only when the text, scale, alignment or
//! line spacing changes, and never before the atlas texture is loaded.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, trace};

use super::glyphs::{GlyphCell, GlyphMetrics};
use super::{Layout, ProjectileDriver};
use crate::host::CharUv;
use crate::math::Vec3;
use crate::node::Node;
use crate::projectile::{BillboardMode, ControlledProjectile};
use crate::smoother::TransitionMode;

pub const TEXT_ATLAS_PATH: &str = "textures\\3DUI\\text_atlas_main.dds";
/// Single-quad mesh that samples `TEXT_ATLAS_PATH`.
pub const TEXT_MESH_PATH: &str = "meshes\\3DUI\\character_template.nif";
pub const LETTER_DISTANCE: f32 = 325.0;
pub const CHAR_GAP: f32 = 0.1;
pub const CHAR_HEIGHT: f32 = 100.0;
pub const DEFAULT_LINE_SPACING: f32 = 1.2;
/// Atlas units to driver-local units.
pub const MESH_UNIT: f32 = 0.01;
/// Glyph quad scale at text scale 1.
pub const GLYPH_SCALE: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlignment {
    Left,
    #[default]
    Center,
    Right,
}

/// Extent of the rendered glyphs in driver-local units, with X growing
/// toward the reader's right and Y up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub width: f32,
    pub height: f32,
}

impl TextBounds {
    pub fn center(&self) -> (f32, f32) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// One character of laid-out text, in atlas units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedGlyph {
    pub ch: char,
    /// `None` when the atlas has no cell for `ch`; such glyphs take space
    /// but render nothing.
    pub cell: Option<GlyphCell>,
    /// Left edge after alignment.
    pub x: f32,
    pub y: f32,
    pub width_ratio: f32,
}

impl PlacedGlyph {
    pub fn is_visible(&self) -> bool {
        self.cell.is_some()
    }

    /// Position in the driver's local frame.
    pub fn local_position(&self) -> Vec3 {
        Vec3::new(-self.x * MESH_UNIT, 0.0, self.y * MESH_UNIT)
    }
}

fn is_blank(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\u{00A0}')
}

/// Lay out `text` line by line, aligning each line on its own.
pub fn layout_glyphs(
    text: &str,
    metrics: &GlyphMetrics,
    scale: f32,
    line_spacing: f32,
    alignment: TextAlignment,
) -> Vec<PlacedGlyph> {
    let letter_distance = LETTER_DISTANCE * scale;
    let line_height = CHAR_HEIGHT * scale * line_spacing;
    let mut placed = Vec::new();

    for (line_index, line) in text.split('\n').enumerate() {
        let y = -(line_index as f32) * line_height;
        let start = placed.len();
        let mut x = 0.0;
        for ch in line.chars() {
            let width_ratio = metrics.width_ratio(ch);
            if !is_blank(ch) {
                placed.push(PlacedGlyph {
                    ch,
                    cell: metrics.cell(ch),
                    x,
                    y,
                    width_ratio,
                });
            }
            x += letter_distance * (width_ratio + CHAR_GAP);
        }

        let line_glyphs = &mut placed[start..];
        let (Some(first), Some(last)) = (line_glyphs.first(), line_glyphs.last()) else {
            continue;
        };
        let center_offset = -(first.x + last.x) / 2.0;
        let total_width = last.x - first.x;
        let shift = match alignment {
            TextAlignment::Left => total_width / 2.0 + center_offset,
            TextAlignment::Center => center_offset,
            TextAlignment::Right => -total_width / 2.0 + center_offset,
        };
        for glyph in line_glyphs.iter_mut() {
            glyph.x += shift;
        }
    }
    placed
}

fn bounds_of(placed: &[PlacedGlyph], scale: f32) -> TextBounds {
    let letter_distance = LETTER_DISTANCE * scale;
    let half_height = CHAR_HEIGHT * scale / 2.0;
    let mut visible = placed.iter().filter(|g| g.is_visible());
    let Some(first) = visible.next() else {
        return TextBounds::default();
    };
    let mut min_x = first.x;
    let mut max_x = first.x + letter_distance * first.width_ratio;
    let mut min_y = first.y - half_height;
    let mut max_y = first.y + half_height;
    for g in visible {
        min_x = min_x.min(g.x);
        max_x = max_x.max(g.x + letter_distance * g.width_ratio);
        min_y = min_y.min(g.y - half_height);
        max_y = max_y.max(g.y + half_height);
    }
    TextBounds {
        min_x: min_x * MESH_UNIT,
        max_x: max_x * MESH_UNIT,
        min_y: min_y * MESH_UNIT,
        max_y: max_y * MESH_UNIT,
        width: (max_x - min_x) * MESH_UNIT,
        height: (max_y - min_y) * MESH_UNIT,
    }
}

pub struct TextLayout {
    text: String,
    scale: f32,
    line_spacing: f32,
    alignment: TextAlignment,
    metrics: Arc<GlyphMetrics>,
    dirty: bool,
    positions: Vec<Vec3>,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            text: String::new(),
            scale: 1.0,
            line_spacing: DEFAULT_LINE_SPACING,
            alignment: TextAlignment::default(),
            metrics: Arc::new(GlyphMetrics::builtin_ascii()),
            dirty: false,
            positions: Vec::new(),
        }
    }
}

impl TextLayout {
    pub fn text(&self) -> String {
        self.text.clone()
    }

    pub fn set_text(&mut self, text: &str) {
        if self.text != text {
            self.text = text.to_string();
            self.dirty = true;
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        if self.scale != scale {
            self.scale = scale;
            self.dirty = true;
        }
    }

    pub fn alignment(&self) -> TextAlignment {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: TextAlignment) {
        if self.alignment != alignment {
            self.alignment = alignment;
            self.dirty = true;
        }
    }

    pub fn line_spacing(&self) -> f32 {
        self.line_spacing
    }

    pub fn set_line_spacing(&mut self, spacing: f32) {
        if self.line_spacing != spacing {
            self.line_spacing = spacing;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn glyphs(&self) -> Vec<PlacedGlyph> {
        layout_glyphs(&self.text, &self.metrics, self.scale, self.line_spacing, self.alignment)
    }

    pub fn bounds(&self) -> TextBounds {
        bounds_of(&self.glyphs(), self.scale)
    }

    fn build_glyph(&self, driver: &ProjectileDriver, glyph: &PlacedGlyph) -> Option<Node> {
        let engine = driver.engine()?;
        let projectile = ControlledProjectile::new(&engine);
        projectile.base().set_id(&format!("{}/glyph '{}'", driver.base().id(), glyph.ch));
        projectile.set_transition_mode(TransitionMode::Instant);
        projectile.set_activateable(false);
        projectile.set_use_haptic_feedback(false);
        projectile.set_billboard_mode(BillboardMode::None);
        projectile.set_model_path(TEXT_MESH_PATH);
        projectile.set_char_uv(glyph.cell.map(|cell| CharUv {
            col: cell.col,
            row: cell.row,
            cols: self.metrics.cols(),
            rows: self.metrics.rows(),
        }));
        projectile.set_base_scale(self.scale * GLYPH_SCALE);
        projectile.base().set_local_position(glyph.local_position());
        Some(Node::Projectile(projectile))
    }
}

impl Layout for TextLayout {
    fn sync_children(&mut self, driver: &ProjectileDriver, _children: &[Node]) -> Option<Vec<Node>> {
        if !self.dirty {
            return None;
        }
        let engine = driver.engine()?;
        let loader = engine.texture_loader();
        if !loader.is_texture_ready(TEXT_ATLAS_PATH) {
            if !loader.is_texture_loading(TEXT_ATLAS_PATH) {
                debug!("[text '{}'] waiting for atlas {}", driver.base().id(), TEXT_ATLAS_PATH);
                loader.request_texture(TEXT_ATLAS_PATH, None);
            }
            return None;
        }
        let metrics = engine.glyphs();
        if !Arc::ptr_eq(&self.metrics, metrics) {
            self.metrics = Arc::clone(metrics);
        }
        self.dirty = false;

        let visible: Vec<PlacedGlyph> = self.glyphs().into_iter().filter(|g| g.is_visible()).collect();
        self.positions = visible.iter().map(|g| g.local_position()).collect();
        let children: Vec<Node> = visible.iter().filter_map(|g| self.build_glyph(driver, g)).collect();
        trace!(
            "[text '{}'] rebuilt {} glyphs for {:?}",
            driver.base().id(),
            children.len(),
            self.text
        );
        Some(children)
    }

    fn update_layout(&mut self, _driver: &ProjectileDriver, children: &[Node], _dt: f32) {
        for (child, position) in children.iter().zip(&self.positions) {
            child.set_local_position(*position);
        }
    }

    fn on_clear(&mut self) {
        self.positions.clear();
        self.dirty = !self.text.is_empty();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Simulation;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_center_alignment_is_symmetric() {
        let metrics = GlyphMetrics::builtin_ascii();
        let placed = layout_glyphs("ab", &metrics, 1.0, DEFAULT_LINE_SPACING, TextAlignment::Center);
        assert_eq!(placed.len(), 2);
        assert!(approx(placed[0].x, -105.625));
        assert!(approx(placed[1].x, 105.625));
    }

    #[test]
    fn test_left_and_right_alignment() {
        let metrics = GlyphMetrics::builtin_ascii();
        let left = layout_glyphs("ab", &metrics, 1.0, DEFAULT_LINE_SPACING, TextAlignment::Left);
        assert!(approx(left[0].x, 0.0));
        assert!(approx(left[1].x, 211.25));
        let right = layout_glyphs("ab", &metrics, 1.0, DEFAULT_LINE_SPACING, TextAlignment::Right);
        assert!(approx(right[0].x, -211.25));
        assert!(approx(right[1].x, 0.0));
    }

    #[test]
    fn test_blanks_advance_without_glyphs() {
        let metrics = GlyphMetrics::builtin_ascii();
        let placed = layout_glyphs("a b", &metrics, 1.0, DEFAULT_LINE_SPACING, TextAlignment::Left);
        assert_eq!(placed.len(), 2);
        assert!(approx(placed[1].x, 341.25));
    }

    #[test]
    fn test_lines_stack_downward() {
        let metrics = GlyphMetrics::builtin_ascii();
        let placed = layout_glyphs("a\nb", &metrics, 1.0, DEFAULT_LINE_SPACING, TextAlignment::Center);
        assert!(approx(placed[0].y, 0.0));
        assert!(approx(placed[1].y, -120.0));
        assert!(approx(placed[1].x, 0.0));
        assert!(approx(placed[1].local_position().z, -1.2));
    }

    #[test]
    fn test_bounds_cover_visible_glyphs() {
        let mut layout = TextLayout::default();
        assert!(layout.bounds().is_empty());
        layout.set_text("ab");
        layout.set_alignment(TextAlignment::Left);
        let bounds = layout.bounds();
        assert!(approx(bounds.min_x, 0.0));
        assert!(approx(bounds.max_x, 3.9));
        assert!(approx(bounds.height, 1.0));
        assert!(approx(bounds.center().1, 0.0));
    }

    #[test]
    fn test_unchanged_text_is_not_dirty() {
        let mut layout = TextLayout::default();
        layout.set_text("x");
        assert!(layout.is_dirty());
        layout.dirty = false;
        layout.set_text("x");
        layout.set_scale(1.0);
        assert!(!layout.is_dirty());
    }

    #[test]
    fn test_glyphs_build_after_atlas_loads() {
        let sim = Simulation::new(8);
        let root = ProjectileDriver::root(&sim.engine);
        let text = ProjectileDriver::text(&sim.engine);
        text.set_text("Hi");
        root.add_child(Arc::clone(&text));
        root.set_visible(true);

        sim.frame(0.016);
        assert_eq!(text.child_count(), 0);
        assert!(sim.engine.texture_loader().is_texture_loading(TEXT_ATLAS_PATH));

        sim.frame(0.016);
        let glyphs = text.children();
        assert_eq!(glyphs.len(), 2);
        let first = glyphs[0].as_projectile().cloned().unwrap();
        assert!(!first.is_activateable());
        assert_eq!(first.transition_mode(), TransitionMode::Instant);
        assert_eq!(first.model_path(), TEXT_MESH_PATH);
        assert!(first.texture_path().is_empty());
        assert!(approx(first.base_scale(), GLYPH_SCALE));

        sim.frames(4, 0.016);
        let metrics = sim.engine.glyphs();
        for (node, ch) in glyphs.iter().zip(['H', 'i']) {
            let glyph = node.as_projectile().cloned().unwrap();
            let cell = metrics.cell(ch).unwrap();
            let expected = CharUv {
                col: cell.col,
                row: cell.row,
                cols: metrics.cols(),
                rows: metrics.rows(),
            };
            assert_eq!(glyph.char_uv(), Some(expected));
            let ptr = glyph.game().ptr().unwrap();
            let host_side = sim.host.projectile(ptr).unwrap();
            assert_eq!(host_side.model, TEXT_MESH_PATH);
            assert_eq!(host_side.char_uv, Some(expected));
        }
    }

    #[test]
    fn test_text_change_replaces_glyphs() {
        let sim = Simulation::new(8);
        let root = ProjectileDriver::root(&sim.engine);
        let text = ProjectileDriver::text(&sim.engine);
        root.add_child(Arc::clone(&text));
        root.set_visible(true);
        text.set_text("abc");
        sim.frame(0.016);
        sim.frame(0.016);
        assert_eq!(text.child_count(), 3);

        text.set_text("a");
        sim.frame(0.016);
        assert_eq!(text.child_count(), 1);
        assert_eq!(text.text_content(), "a");
    }
}
