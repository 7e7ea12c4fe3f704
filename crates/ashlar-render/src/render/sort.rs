use glam::{Mat4, Vec3};

use crate::geom::Plane;

use super::buckets::DrawUnit;

/// Transparent bucket: draw-unit indices ordered back-to-front against the
/// view plane.
///
/// Sorting is lazy: the bucket remembers the normal it last sorted under and
/// re-sorts only when the normal changes. Rebuilding the bucket (`clear` +
/// `push`) resets that memory.
#[derive(Debug, Default)]
pub(crate) struct DepthBucket {
    items: Vec<DepthItem>,
    sorted_normal: Option<Vec3>,
}

#[derive(Debug, Copy, Clone)]
struct DepthItem {
    index: usize,
    distance: f32,
}

impl DepthBucket {
    #[inline]
    pub fn push(&mut self, index: usize) {
        self.items.push(DepthItem { index, distance: 0.0 });
        self.sorted_normal = None;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
        self.sorted_normal = None;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().map(|item| item.index)
    }

    /// Reorders the bucket back-to-front against `view_plane` (ascending
    /// signed distance of each unit's bounds center).
    ///
    /// `model` is the external model transform; distances are measured in
    /// the units' own space, so the plane is pulled through its inverse.
    /// No-op when the plane normal is unchanged since the last sort.
    pub fn sort_back_to_front(
        &mut self,
        view_plane: Plane,
        model: Option<&Mat4>,
        units: &[DrawUnit],
    ) {
        if self.sorted_normal == Some(view_plane.normal()) {
            return;
        }
        self.sorted_normal = Some(view_plane.normal());

        let plane = match model {
            Some(m) => view_plane.transformed(&m.inverse()),
            None => view_plane,
        };
        for item in &mut self.items {
            item.distance = plane.signed_distance(units[item.index].bounds.center());
        }
        // Stable: equal distances keep insertion order.
        self.items.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }
}
