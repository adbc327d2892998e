use crate::types::Boundary;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Point, Rect};
use rstar::{RTree, RTreeObject, AABB};

// Envelope of one boundary, pointing back into the owned Vec
struct BoundaryEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for BoundaryEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Boundary polygons with an R-tree over their bounding boxes, for resolving
/// hover points to neighborhoods.
pub struct BoundaryIndex {
    boundaries: Vec<Boundary>,
    tree: RTree<BoundaryEnvelope>,
}

impl BoundaryIndex {
    pub fn new(boundaries: Vec<Boundary>) -> Self {
        let items: Vec<BoundaryEnvelope> = boundaries
            .iter()
            .enumerate()
            .filter_map(|(index, boundary)| {
                let rect = boundary.geometry.bounding_rect()?;
                Some(BoundaryEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        BoundaryIndex {
            boundaries,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// First boundary containing the point (x = lon, y = lat).
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&Boundary> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.boundaries.get(candidate.index))
            .find(|boundary| boundary.geometry.contains(&point))
    }

    /// Bounding box of every boundary, `None` when there are no polygons.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        if self.tree.size() == 0 {
            return None;
        }
        let aabb = self.tree.root().envelope();
        Some(Rect::new(
            geo::Coord { x: aabb.lower()[0], y: aabb.lower()[1] },
            geo::Coord { x: aabb.upper()[0], y: aabb.upper()[1] },
        ))
    }
}
