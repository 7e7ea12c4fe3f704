use std::collections::BTreeSet;
use std::sync::Arc;

use crate::geom::Aabb;
use crate::scene::{GeometryBatch, Material, PrimitiveKind, SceneGroups};

use super::buckets::{has_opaque_side, has_transparent_side, push_draw_unit, visible};
use super::renderer::Renderer;

/// Address of one selection overlay set.
///
/// Non-zero; positive ids render on top of the scene. The low three bits of
/// the magnitude carry the selection style, exposed through
/// [`SelectionStyle`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SelectionId(i32);

/// How an on-top selection overlay routes its lines and points.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SelectionStyle {
    /// Whole-object selection.
    pub full: bool,
    /// Sub-element (partial) selection.
    pub partial: bool,
    /// Committed selection rather than preselection.
    pub selected: bool,
}

impl SelectionId {
    pub const FULL_BIT: i32 = 0x1;
    pub const PARTIAL_BIT: i32 = 0x2;
    pub const SELECTED_BIT: i32 = 0x4;

    /// `None` for zero, which is not a valid overlay address.
    #[inline]
    pub fn new(raw: i32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Positive ids draw on top of the base scene.
    #[inline]
    pub fn is_on_top(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn style(self) -> SelectionStyle {
        let bits = self.0.unsigned_abs() as i32;
        SelectionStyle {
            full: bits & Self::FULL_BIT != 0,
            partial: bits & Self::PARTIAL_BIT != 0,
            selected: bits & Self::SELECTED_BIT != 0,
        }
    }
}

impl Renderer {
    /// Replaces the highlight overlay.
    ///
    /// Classification is eager: buckets and suppression keys are rebuilt
    /// before this returns. With `whole_on_top`, whole-object entries draw
    /// on top of everything and suppress their base-scene counterparts.
    pub fn set_highlight(&mut self, groups: SceneGroups, whole_on_top: bool) {
        self.clear_highlight();
        self.hl_whole_on_top = whole_on_top;

        for (material, batches) in &groups {
            if batches.is_empty() || !visible(material) {
                continue;
            }
            for batch in batches {
                let Some(index) = push_draw_unit(&mut self.hl_entries, material, batch) else {
                    continue;
                };
                let bounds = self.hl_entries[index].bounds;

                if material.on_top
                    && (material.partial_highlight
                        || (batch.part.is_none() && batch.is_whole()))
                {
                    // The overlay replaces the whole object; hide the base
                    // rendering underneath it.
                    if let Some(key) = &batch.key {
                        self.highlight_keys.insert(key.clone());
                    }
                    self.highlight_bbox.extend(&bounds);
                }

                if material.override_transparency {
                    if !material.diffuse.is_opaque() {
                        self.hl_buckets.transp.push(index);
                    } else if material.kind == PrimitiveKind::Triangle {
                        self.hl_buckets.opaque.push(index);
                    } else {
                        self.hl_buckets.opaque_lines.push(index);
                    }
                } else {
                    if has_opaque_side(material, batch) {
                        if material.kind == PrimitiveKind::Triangle {
                            self.hl_buckets.opaque.push(index);
                        } else {
                            self.hl_buckets.opaque_lines.push(index);
                        }
                    }
                    if has_transparent_side(material, batch) {
                        self.hl_buckets.transp.push(index);
                    }
                }
            }
        }

        Self::apply_keys(&self.cache_index, &mut self.entries, &self.highlight_keys, 1);
    }

    /// Removes the highlight overlay and restores suppressed base units.
    pub fn clear_highlight(&mut self) {
        self.hl_whole_on_top = false;
        self.hl_buckets.clear();
        self.hl_entries.clear();
        Self::apply_keys(&self.cache_index, &mut self.entries, &self.highlight_keys, -1);
        self.highlight_keys.clear();
        self.highlight_bbox = Aabb::EMPTY;
    }

    /// Installs (or replaces) the selection overlay addressed by `id`.
    ///
    /// Classification is lazy: a dirty flag is consumed by the next
    /// `render` or `bounding_box` call.
    pub fn add_selection(&mut self, id: SelectionId, groups: SceneGroups) {
        if id.is_on_top() {
            self.selections_on_top.insert(id, groups);
        } else {
            self.selections.insert(id, groups);
        }
        self.selection_dirty = true;
    }

    pub fn remove_selection(&mut self, id: SelectionId) {
        let removed = if id.is_on_top() {
            self.selections_on_top.remove(&id).is_some()
        } else {
            self.selections.remove(&id).is_some()
        };
        if removed {
            self.selection_dirty = true;
        }
    }

    /// Rebuilds the selection arena and buckets if any overlay changed
    /// since the last recompute.
    ///
    /// Whole-object entries deduplicate across overlay ids: the first id
    /// (ascending order) to claim an object's key suppresses the base
    /// rendering and owns the overlay draw; later requests for the same
    /// object are dropped unless they differ in originating node or
    /// primitive kind.
    pub(crate) fn update_selection(&mut self) {
        if !self.selection_dirty {
            return;
        }
        self.selection_dirty = false;

        self.sel_buckets.clear();
        self.sel_entries.clear();
        self.selection_bbox = Aabb::EMPTY;

        Self::apply_keys(&self.cache_index, &mut self.entries, &self.selection_keys, -1);
        self.selection_keys.clear();

        // Extended keys of every overlay entry emitted so far, for
        // cross-overlay deduplication.
        let mut render_keys: BTreeSet<crate::scene::CacheKey> = BTreeSet::new();

        let on_top = std::mem::take(&mut self.selections_on_top);
        for (id, groups) in &on_top {
            let style = id.style();
            for (material, batches) in groups {
                if batches.is_empty() || !visible(material) {
                    continue;
                }
                for batch in batches {
                    let Some(index) = self.claim_overlay_entry(material, batch, &mut render_keys)
                    else {
                        continue;
                    };
                    match material.kind {
                        PrimitiveKind::Triangle => {
                            self.sel_buckets.transp_on_top.push(index);
                            if !style.selected || material.partial_highlight {
                                self.sel_buckets.triangles_on_top.push(index);
                            }
                        }
                        PrimitiveKind::Line => {
                            if style.partial {
                                self.sel_buckets.lines_on_top.push(index);
                            } else if !style.full || material.partial_highlight {
                                self.sel_buckets.mixed_on_top.push(index);
                            } else {
                                self.sel_buckets.transp_on_top.push(index);
                            }
                        }
                        PrimitiveKind::Point => {
                            if style.partial {
                                self.sel_buckets.points_on_top.push(index);
                            } else if !style.full || material.partial_highlight {
                                self.sel_buckets.mixed_on_top.push(index);
                            } else {
                                self.sel_buckets.transp_on_top.push(index);
                            }
                        }
                    }
                }
            }
        }
        self.selections_on_top = on_top;

        let normal = std::mem::take(&mut self.selections);
        for groups in normal.values() {
            for (material, batches) in groups {
                if batches.is_empty() || !visible(material) {
                    continue;
                }
                for batch in batches {
                    let Some(index) = self.claim_overlay_entry(material, batch, &mut render_keys)
                    else {
                        continue;
                    };
                    if has_opaque_side(material, batch) {
                        self.sel_buckets.opaque.push(index);
                    }
                    if has_transparent_side(material, batch) {
                        self.sel_buckets.transp.push(index);
                    }
                }
            }
        }
        self.selections = normal;
    }

    /// Pushes one overlay entry, handling whole-object claims: suppression
    /// of the base rendering on first claim, deduplication on repeats.
    /// Returns the entry index, or `None` if the entry was dropped.
    fn claim_overlay_entry(
        &mut self,
        material: &Arc<Material>,
        batch: &GeometryBatch,
        render_keys: &mut BTreeSet<crate::scene::CacheKey>,
    ) -> Option<usize> {
        let index = push_draw_unit(&mut self.sel_entries, material, batch)?;
        let bounds = self.sel_entries[index].bounds;

        let Some(key) = &batch.key else { return Some(index) };
        if batch.part.is_some() || !batch.is_whole() {
            return Some(index);
        }

        let extended = key.extended(&[batch.node_id, material.kind.discriminant()]);
        if self.selection_keys.insert(key.clone()) {
            Self::apply_key(&self.cache_index, &mut self.entries, key, 1);
            render_keys.insert(extended);
        } else if render_keys.insert(extended) {
            // Same object already claimed under a different node or
            // primitive kind; draw it, but suppress only once.
        } else {
            self.sel_entries.pop();
            return None;
        }

        self.selection_bbox.extend(&bounds);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::geom::Aabb;
    use crate::render::renderer::Renderer;
    use crate::scene::{BatchId, CacheKey, Rgba};

    fn bounds() -> Aabb {
        Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn keyed_batch(id: u64, key: &Arc<CacheKey>) -> GeometryBatch {
        let mut batch = GeometryBatch::new(BatchId(id), bounds());
        batch.key = Some(key.clone());
        batch.node_id = id as i64;
        batch
    }

    fn on_top_material(kind: PrimitiveKind) -> Arc<Material> {
        let mut material = Material::new(kind);
        material.on_top = true;
        Arc::new(material)
    }

    fn scene_with_key(renderer: &mut Renderer, key: &Arc<CacheKey>) {
        let material = Arc::new(Material::new(PrimitiveKind::Triangle));
        renderer.set_scene(vec![(material, vec![keyed_batch(1, key)])]);
    }

    fn sel_id(raw: i32) -> SelectionId {
        SelectionId::new(raw).unwrap()
    }

    // ── selection id encoding ─────────────────────────────────────────────

    #[test]
    fn id_zero_is_rejected() {
        assert!(SelectionId::new(0).is_none());
        assert!(SelectionId::new(1).is_some());
    }

    #[test]
    fn sign_selects_on_top() {
        assert!(sel_id(8).is_on_top());
        assert!(!sel_id(-8).is_on_top());
    }

    #[test]
    fn style_bits_decode_from_magnitude() {
        let style = sel_id(8 | SelectionId::PARTIAL_BIT).style();
        assert!(style.partial && !style.full && !style.selected);
        // Negative ids carry the same bits.
        let style = sel_id(-(8 | SelectionId::FULL_BIT)).style();
        assert!(style.full && !style.partial);
    }

    // ── highlight suppression ─────────────────────────────────────────────

    #[test]
    fn whole_object_highlight_suppresses_base_unit() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);
        assert_eq!(renderer.entries[0].suppress, 0);

        renderer.set_highlight(
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(99, &key)])],
            true,
        );
        assert_eq!(renderer.entries[0].suppress, 1);
        assert!(renderer.hl_whole_on_top);

        renderer.clear_highlight();
        assert_eq!(renderer.entries[0].suppress, 0);
        assert!(!renderer.hl_whole_on_top);
    }

    #[test]
    fn sub_part_highlight_does_not_suppress() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        let mut part = keyed_batch(99, &key);
        part.part = Some(3);
        renderer.set_highlight(vec![(on_top_material(PrimitiveKind::Triangle), vec![part])], false);
        assert_eq!(renderer.entries[0].suppress, 0);
        assert_eq!(renderer.hl_entries.len(), 1);
    }

    #[test]
    fn replacing_highlight_reverts_previous_suppression() {
        let key_a = Arc::new(CacheKey::from(&[1][..]));
        let key_b = Arc::new(CacheKey::from(&[2][..]));
        let material = Arc::new(Material::new(PrimitiveKind::Triangle));
        let mut renderer = Renderer::new();
        renderer.set_scene(vec![(
            material,
            vec![keyed_batch(1, &key_a), keyed_batch(2, &key_b)],
        )]);

        renderer.set_highlight(
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(90, &key_a)])],
            true,
        );
        assert_eq!(renderer.entries[0].suppress, 1);

        renderer.set_highlight(
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(91, &key_b)])],
            true,
        );
        assert_eq!(renderer.entries[0].suppress, 0);
        assert_eq!(renderer.entries[1].suppress, 1);
    }

    #[test]
    fn new_scene_reapplies_highlight_suppression() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);
        renderer.set_highlight(
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(99, &key)])],
            true,
        );

        scene_with_key(&mut renderer, &key);
        assert_eq!(renderer.entries[0].suppress, 1);
    }

    // ── selection suppression and dedup ───────────────────────────────────

    #[test]
    fn selection_suppression_balances_over_add_remove() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        renderer.add_selection(
            sel_id(8),
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(99, &key)])],
        );
        renderer.update_selection();
        assert_eq!(renderer.entries[0].suppress, 1);

        renderer.remove_selection(sel_id(8));
        renderer.update_selection();
        assert_eq!(renderer.entries[0].suppress, 0);
    }

    #[test]
    fn duplicate_whole_object_selection_is_claimed_once() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        // Two overlay ids request the same whole object with identical
        // node and primitive kind; the first id wins.
        let group =
            |id: u64| vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(id, &key)])];
        renderer.add_selection(sel_id(8), {
            let mut g = group(99);
            g[0].1[0].node_id = 5;
            g
        });
        renderer.add_selection(sel_id(16), {
            let mut g = group(98);
            g[0].1[0].node_id = 5;
            g
        });
        renderer.update_selection();

        assert_eq!(renderer.sel_entries.len(), 1);
        assert_eq!(renderer.entries[0].suppress, 1);
    }

    #[test]
    fn same_object_different_kind_draws_both_but_suppresses_once() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        let mut tri = keyed_batch(99, &key);
        tri.node_id = 5;
        let mut line = keyed_batch(98, &key);
        line.node_id = 5;
        renderer.add_selection(
            sel_id(8),
            vec![
                (on_top_material(PrimitiveKind::Triangle), vec![tri]),
                (on_top_material(PrimitiveKind::Line), vec![line]),
            ],
        );
        renderer.update_selection();

        assert_eq!(renderer.sel_entries.len(), 2);
        assert_eq!(renderer.entries[0].suppress, 1);
    }

    #[test]
    fn repeated_recompute_keeps_suppression_stable() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        renderer.add_selection(
            sel_id(8),
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(99, &key)])],
        );
        for _ in 0..3 {
            renderer.selection_dirty = true;
            renderer.update_selection();
            assert_eq!(renderer.entries[0].suppress, 1);
        }
    }

    // ── lazy recompute ────────────────────────────────────────────────────

    #[test]
    fn selection_recomputes_lazily() {
        let key = Arc::new(CacheKey::from(&[7][..]));
        let mut renderer = Renderer::new();
        scene_with_key(&mut renderer, &key);

        renderer.add_selection(
            sel_id(8),
            vec![(on_top_material(PrimitiveKind::Triangle), vec![keyed_batch(99, &key)])],
        );
        // Nothing recomputed yet.
        assert!(renderer.selection_dirty);
        assert!(renderer.sel_entries.is_empty());

        // bounding_box consumes the pending recompute.
        let bb = renderer.bounding_box();
        assert!(!renderer.selection_dirty);
        assert!(!bb.is_empty());
        assert_eq!(renderer.sel_entries.len(), 1);
    }

    // ── bucket routing ────────────────────────────────────────────────────

    #[test]
    fn partial_style_routes_lines_and_points_to_their_buckets() {
        let mut renderer = Renderer::new();
        renderer.set_scene(Vec::new());

        let id = sel_id(8 | SelectionId::PARTIAL_BIT);
        renderer.add_selection(
            id,
            vec![
                (on_top_material(PrimitiveKind::Line), vec![GeometryBatch::new(BatchId(1), bounds())]),
                (on_top_material(PrimitiveKind::Point), vec![GeometryBatch::new(BatchId(2), bounds())]),
            ],
        );
        renderer.update_selection();

        assert_eq!(renderer.sel_buckets.lines_on_top.len(), 1);
        assert_eq!(renderer.sel_buckets.points_on_top.len(), 1);
        assert!(renderer.sel_buckets.mixed_on_top.is_empty());
    }

    #[test]
    fn normal_selection_routes_by_opacity() {
        let mut renderer = Renderer::new();
        renderer.set_scene(Vec::new());

        let mut transp = Material::new(PrimitiveKind::Triangle);
        transp.diffuse = Rgba::new(0xff, 0, 0, 0x80);
        renderer.add_selection(
            sel_id(-8),
            vec![
                (Arc::new(Material::new(PrimitiveKind::Triangle)),
                 vec![GeometryBatch::new(BatchId(1), bounds())]),
                (Arc::new(transp), vec![GeometryBatch::new(BatchId(2), bounds())]),
            ],
        );
        renderer.update_selection();

        assert_eq!(renderer.sel_buckets.opaque.len(), 1);
        let transp_count = renderer.sel_buckets.transp.indices().count();
        assert_eq!(transp_count, 1);
        assert!(renderer.sel_buckets.transp_on_top.is_empty());
    }
}
