//! Two-level spatial index over one row of rectangles.

use cinder_gfx::{Context, math::Rect};

use crate::rectangle_batch::RectangleBatch;

pub struct RangeTreeLeaf<C: Context> {
    batch: RectangleBatch<C>,
    bounds: Rect,
    num_preceding_rectangles_in_row: usize,
}

impl<C: Context> RangeTreeLeaf<C> {
    pub fn new(batch: RectangleBatch<C>, bounds: Rect, num_preceding_rectangles_in_row: usize) -> Self {
        Self {
            batch,
            bounds,
            num_preceding_rectangles_in_row,
        }
    }

    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    pub fn rect_count(&self) -> usize {
        self.batch.rect_count()
    }

    pub fn num_preceding_rectangles_in_row(&self) -> usize {
        self.num_preceding_rectangles_in_row
    }

    pub fn batch_mut(&mut self) -> &mut RectangleBatch<C> {
        &mut self.batch
    }
}

pub struct RangeTreeInterior<C: Context> {
    children: Vec<RangeTreeNode<C>>,
    bounds: Rect,
    rect_count: usize,
}

impl<C: Context> RangeTreeInterior<C> {
    pub fn new(children: Vec<RangeTreeNode<C>>) -> Self {
        debug_assert!(!children.is_empty(), "Empty interior node");
        let bounds = children
            .iter()
            .map(RangeTreeNode::bounds)
            .copied()
            .reduce(|a, b| a.union_with(&b))
            .unwrap_or(Rect::EMPTY);
        let rect_count = children.iter().map(RangeTreeNode::rect_count).sum();
        Self {
            children,
            bounds,
            rect_count,
        }
    }

    pub fn children(&self) -> &[RangeTreeNode<C>] {
        &self.children
    }
}

pub enum RangeTreeNode<C: Context> {
    Leaf(RangeTreeLeaf<C>),
    Interior(RangeTreeInterior<C>),
}

impl<C: Context> RangeTreeNode<C> {
    pub fn bounds(&self) -> &Rect {
        match self {
            Self::Leaf(leaf) => &leaf.bounds,
            Self::Interior(interior) => &interior.bounds,
        }
    }

    pub fn rect_count(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.rect_count(),
            Self::Interior(interior) => interior.rect_count,
        }
    }

    /// Calls `f` on every leaf whose bounds overlap `bounds`, skipping whole
    /// subtrees that do not.
    pub fn for_each_leaf_within_bounds(
        &mut self,
        bounds: &Rect,
        mut f: impl FnMut(&mut RangeTreeLeaf<C>),
    ) {
        self.visit(bounds, &mut f);
    }

    fn visit<F: FnMut(&mut RangeTreeLeaf<C>)>(&mut self, bounds: &Rect, f: &mut F) {
        if !self.bounds().has_intersection_with(bounds) {
            return;
        }
        match self {
            Self::Leaf(leaf) => f(leaf),
            Self::Interior(interior) => {
                for child in &mut interior.children {
                    child.visit(bounds, f);
                }
            }
        }
    }

    pub fn free(&mut self) {
        match self {
            Self::Leaf(leaf) => leaf.batch.free(),
            Self::Interior(interior) => interior.children.iter_mut().for_each(Self::free),
        }
    }
}

#[cfg(test)]
mod tests {
    use cinder_gfx::{Color, recording::RecordingContext};
    use proptest::prelude::*;

    use super::*;

    fn leaf(left: f64, right: f64, preceding: usize) -> RangeTreeNode<RecordingContext> {
        let mut batch = RectangleBatch::new();
        batch.add_rect(Rect::from_xywh(left, 0.0, right - left, 1.0), Color::WHITE);
        RangeTreeNode::Leaf(RangeTreeLeaf::new(
            batch,
            Rect::from_xywh(left, 0.0, right - left, 1.0),
            preceding,
        ))
    }

    fn visited(tree: &mut RangeTreeNode<RecordingContext>, query: &Rect) -> Vec<f64> {
        let mut lefts = Vec::new();
        tree.for_each_leaf_within_bounds(query, |leaf| lefts.push(leaf.bounds().left()));
        lefts
    }

    #[test]
    fn interior_bounds_cover_all_children() {
        let tree = RangeTreeInterior::new(vec![leaf(0.0, 5.0, 0), leaf(7.0, 9.0, 1)]);
        assert_eq!(tree.bounds, Rect::from_xywh(0.0, 0.0, 9.0, 1.0));
        assert_eq!(tree.rect_count, 2);
        assert_eq!(tree.children().len(), 2);
    }

    #[test]
    fn queries_prune_disjoint_leaves() {
        let mut tree = RangeTreeNode::Interior(RangeTreeInterior::new(vec![
            leaf(0.0, 5.0, 0),
            leaf(5.0, 9.0, 1),
            leaf(9.0, 12.0, 2),
        ]));
        assert_eq!(visited(&mut tree, &Rect::from_xywh(4.0, 0.0, 2.0, 1.0)), vec![0.0, 5.0]);
        assert_eq!(visited(&mut tree, &Rect::from_xywh(12.0, 0.0, 2.0, 1.0)), Vec::<f64>::new());
        assert_eq!(visited(&mut tree, &Rect::from_xywh(0.0, 1.0, 20.0, 1.0)), Vec::<f64>::new());
    }

    proptest! {
        #[test]
        fn visits_exactly_the_intersecting_leaves(
            widths in prop::collection::vec(1u32..20, 1..30),
            query_left in 0.0f64..400.0,
            query_width in 0.5f64..100.0,
        ) {
            let mut left = 0.0;
            let mut children = Vec::new();
            for (i, width) in widths.iter().enumerate() {
                let right = left + f64::from(*width);
                children.push(leaf(left, right, i));
                left = right;
            }
            let mut tree = RangeTreeNode::Interior(RangeTreeInterior::new(children));
            let query = Rect::from_xywh(query_left, 0.0, query_width, 1.0);

            let RangeTreeNode::Interior(interior) = &tree else { unreachable!() };
            let expected: Vec<f64> = interior
                .children()
                .iter()
                .map(RangeTreeNode::bounds)
                .filter(|bounds| bounds.has_intersection_with(&query))
                .map(Rect::left)
                .collect();
            prop_assert_eq!(*tree.bounds(), Rect::from_xywh(0.0, 0.0, left, 1.0));
            prop_assert_eq!(visited(&mut tree, &query), expected);
        }
    }
}
