///! Editor BSP: brush partition, zones and portals

use crate::{
    brush::{Brush, BrushId, BrushType, PlaneAssessment},
    config::CompileConfig,
    database::{GeometryDatabase, PlaneId},
    error::{ensure, CompileError},
    geom::PlaneSide,
    map::PortalBrush,
    math::Vec3d,
    rand::Lehmer,
    winding::Winding,
};

pub mod portal;
pub mod zone;

use portal::{Portal, PortalEntry, VisLink, VisLinkId};
use zone::{Zone, ZoneId};

impl_id!(NodeId);

/// Pass node (or leaf) was created by
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneType {
    /// Structural brush pass
    Structural,

    /// Detail brush pass
    Detail,

    /// Portal insertion
    Portal,
}

/// Brush that made leaf solid
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SolidBrush {
    /// Brush identifier
    pub id: BrushId,

    /// Brush role
    pub brush_type: BrushType,
}

/// Node splitter
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Split {
    /// Splitter plane
    pub plane: PlaneId,

    /// Child in front of plane
    pub front: NodeId,

    /// Child behind plane
    pub back: NodeId,
}

/// BSP tree node, leaf if `split` is None
#[derive(Clone, Debug)]
pub struct Node {
    /// Splitter, if node is internal
    pub split: Option<Split>,

    /// Parent node, None for root
    pub parent: Option<NodeId>,

    /// Pass node is built by
    pub plane_type: PlaneType,

    /// Leaf is filled by some brush
    pub is_solid: bool,

    /// Zone of empty leaf
    pub zone: Option<ZoneId>,

    /// Brush that made the leaf solid
    pub solid_brush: Option<SolidBrush>,

    /// Brushes not yet resolved at this node
    pub brushes: Vec<Brush>,

    /// Links to neighbouring leaves
    pub vis_links: Vec<VisLinkId>,

    /// Portal windings passing through the node
    pub portals: Vec<PortalEntry>,
}

impl Node {
    /// Empty leaf
    fn new(parent: Option<NodeId>) -> Self {
        Self {
            split: None,
            parent,
            plane_type: PlaneType::Structural,
            is_solid: false,
            zone: None,
            solid_brush: None,
            brushes: Vec::new(),
            vis_links: Vec::new(),
            portals: Vec::new(),
        }
    }

    /// Check if node is leaf
    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }
}

/// Leaf depth statistics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BspStats {
    /// Count of leaves
    pub leaf_count: usize,

    /// Sum of leaf depths
    pub total_depth: usize,

    /// Depth of the deepest leaf
    pub max_depth: usize,
}

/// Visibility link statistics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VisStats {
    /// Count of empty leaves
    pub empty_leaves: usize,

    /// Sum of link counts of empty leaves
    pub total_links: usize,

    /// Maximal link count of a single leaf
    pub max_links: usize,
}

/// BSP splitter selector
pub struct PlaneSelector {
    /// Candidate brush order shuffler
    rand: Lehmer,

    /// Maximal count of distinct candidate planes
    max_planes: usize,
}

impl PlaneSelector {
    /// Build selector
    pub fn new(config: &CompileConfig) -> Self {
        Self {
            rand: Lehmer::new(config.random_seed),
            max_planes: config.max_planes_considered,
        }
    }

    /// Choose splitter for brush set. Candidates are gathered from brushes in random order,
    /// only forward planes are rated. None if every brush plane is inserted already.
    pub fn select(&mut self, db: &GeometryDatabase, brushes: &[Brush]) -> Option<PlaneId> {
        let mut order = (0..brushes.len()).collect::<Vec<_>>();
        self.rand.shuffle_tail(&mut order);

        let mut pairs = std::collections::BTreeSet::<usize>::new();

        'brushes: for index in order {
            for plane in &brushes[index].planes {
                if pairs.len() >= self.max_planes {
                    break 'brushes;
                }

                if !plane.inserted {
                    pairs.insert(plane.plane.into_index() >> 1);
                }
            }
        }

        let mut best: Option<(PlaneId, i32)> = None;

        for pair in pairs {
            let plane = PlaneId::from_index(pair << 1);
            let mut assessment = PlaneAssessment::default();

            for brush in brushes {
                brush.assess_plane(db, plane, &mut assessment);
            }

            let rating = assessment.rating(db.plane(plane).is_axial());

            if rating > best.map_or(-(1 << 30), |(_, best_rating)| best_rating) {
                best = Some((plane, rating));
            }
        }

        best.map(|(plane, _)| plane)
    }
}

/// Merge windings sharing edges until no pair merges
pub(crate) fn collapse_windings(db: &GeometryDatabase, windings: &mut Vec<Winding>, zones: &[Zone]) {
    'merge: loop {
        for i in 0..windings.len() {
            for j in i + 1..windings.len() {
                let (head, tail) = windings.split_at_mut(j);

                if head[i].collapse(db, &tail[0], zones) {
                    windings.remove(j);
                    continue 'merge;
                }
            }
        }

        break;
    }
}

/// BSP tree with its zone/portal graph. Node 0 is root.
pub struct BspTree {
    /// Node arena
    pub nodes: Vec<Node>,

    /// Visibility link arena, emptied after zone flood
    pub links: Vec<VisLink>,

    /// Zones, zone 0 is outside
    pub zones: Vec<Zone>,

    /// Portals between zones
    pub portals: Vec<Portal>,
}

impl BspTree {
    /// Tree of single empty leaf
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None)],
            links: Vec::new(),
            zones: Vec::new(),
            portals: Vec::new(),
        }
    }

    /// Root node
    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    /// Get node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.into_index()]
    }

    /// Get node by id
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.into_index()]
    }

    /// Get zone by id
    pub fn zone(&self, id: ZoneId) -> &Zone {
        &self.zones[id.into_index()]
    }

    /// Allocate empty leaf
    fn push_node(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node::new(Some(parent)));
        id
    }

    /// Turn leaf into node with two fresh leaves
    fn split_leaf(&mut self, leaf: NodeId, plane: PlaneId) -> Split {
        let front = self.push_node(leaf);
        let back = self.push_node(leaf);
        let split = Split { plane, front, back };

        self.node_mut(leaf).split = Some(split);

        split
    }

    /// Every node in front-first depth-first order
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];

        while let Some(id) = stack.pop() {
            result.push(id);

            if let Some(split) = self.node(id).split {
                stack.push(split.back);
                stack.push(split.front);
            }
        }

        result
    }

    /// Every leaf in front-first depth-first order
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.node(*id).is_leaf())
            .collect()
    }

    /// Leaf point is in. Points on a splitter go to the front.
    pub fn leaf_at(&self, db: &GeometryDatabase, point: Vec3d) -> NodeId {
        let mut current = self.root();

        while let Some(split) = self.node(current).split {
            current = match db.side(split.plane, point) {
                PlaneSide::Back => split.back,
                _ => split.front,
            };
        }

        current
    }

    /// Build tree from brush set in `brushes` of `node`
    pub fn create_bsp(
        &mut self,
        node: NodeId,
        plane_type: PlaneType,
        db: &mut GeometryDatabase,
        selector: &mut PlaneSelector,
    ) -> Result<(), CompileError> {
        if let Some(split) = self.node(node).split {
            if !self.node(node).brushes.is_empty() {
                ensure!(
                    self.node(node).plane_type != plane_type,
                    "brushes pushed into node {} during its own pass",
                    node.into_index()
                );
                self.split_brush_list(node, db);
            }

            self.create_bsp(split.front, plane_type, db, selector)?;
            return self.create_bsp(split.back, plane_type, db, selector);
        }

        if self.node(node).brushes.is_empty() {
            self.node_mut(node).plane_type = plane_type;
            return Ok(());
        }

        let Some(plane) = selector.select(db, &self.node(node).brushes) else {
            // all planes inserted, keep single brush of equivalent ones
            let leaf = self.node_mut(node);

            ensure!(
                leaf.brushes.iter().all(|brush| leaf.brushes[0].is_equivalent(brush)),
                "non-equivalent brushes in leaf {}",
                node.into_index()
            );

            let keep = leaf.brushes
                .iter()
                .enumerate()
                .max_by_key(|(_, brush)| brush.id)
                .map(|(index, _)| index)
                .unwrap_or(0);

            let brush = leaf.brushes.swap_remove(keep);
            leaf.brushes = vec![brush];

            return Ok(());
        };

        let (is_solid, zone) = {
            let leaf = self.node(node);
            (leaf.is_solid, leaf.zone)
        };

        let split = self.split_leaf(node, plane);
        self.node_mut(node).plane_type = plane_type;

        for child in [split.front, split.back] {
            let child = self.node_mut(child);
            child.is_solid = is_solid;
            child.zone = zone;
        }

        self.split_brush_list(node, db);

        self.create_bsp(split.front, plane_type, db, selector)?;
        self.create_bsp(split.back, plane_type, db, selector)
    }

    /// Distribute node brushes to the leaves below it
    pub fn split_brush_list(&mut self, node: NodeId, db: &mut GeometryDatabase) {
        let Some(split) = self.node(node).split else {
            return;
        };

        let brushes = std::mem::take(&mut self.node_mut(node).brushes);

        for brush in brushes.into_iter().rev() {
            let (front, back) = brush.split(db, split.plane);

            if let Some(front) = front {
                self.push_brush_part(split.front, front, split.plane);
            }
            if let Some(back) = back {
                self.push_brush_part(split.back, back, split.plane);
            }
        }

        self.split_brush_list(split.front, db);
        self.split_brush_list(split.back, db);
    }

    /// Add brush piece to child of splitter. Piece with no planes left to insert
    /// fills the child instead.
    fn push_brush_part(&mut self, child: NodeId, mut part: Brush, splitter: PlaneId) {
        let child = self.node_mut(child);

        if part.planes.iter().any(|plane| plane.plane.is_coplanar(splitter)) {
            part.mark_inserted(splitter);

            if part.no_more_insertables() {
                child.is_solid = true;

                if child.solid_brush.is_none() {
                    child.solid_brush = Some(SolidBrush {
                        id: part.id,
                        brush_type: part.brush_type,
                    });
                }

                return;
            }
        }

        let keep = false
            || !child.is_solid
            || child.solid_brush.map_or(true, |solid| solid.brush_type >= part.brush_type);

        if keep {
            child.brushes.push(part);
        }
    }

    /// Zone of point, None if point lies between two solid leaves
    pub fn find_zone(&self, db: &GeometryDatabase, point: Vec3d) -> Option<ZoneId> {
        let mut current = self.root();

        loop {
            let node = self.node(current);

            let Some(split) = node.split else {
                return node.zone;
            };

            if node.zone.is_some() {
                return node.zone;
            }

            current = match db.side(split.plane, point) {
                PlaneSide::Front => split.front,
                PlaneSide::Back => split.back,
                PlaneSide::On => {
                    if !self.node(split.front).is_solid {
                        split.front
                    } else if !self.node(split.back).is_solid {
                        split.back
                    } else {
                        return None;
                    }
                }
            };
        }
    }

    /// Solid brush of node or of its nearest ancestor having one
    pub fn find_solid_brush(&self, node: NodeId) -> Option<SolidBrush> {
        let mut current = Some(node);

        while let Some(id) = current {
            let node = self.node(id);

            if node.solid_brush.is_some() {
                return node.solid_brush;
            }

            current = node.parent;
        }

        None
    }

    /// Clip brush face windings to the tree. Pieces in empty leaves are tagged by zone,
    /// pieces in leaves filled by the source brush are tagged by the leaf. Pieces in leaves
    /// filled by other brushes are dropped. Resulting pieces are merged back where possible.
    pub fn break_winding(
        &self,
        node: NodeId,
        db: &mut GeometryDatabase,
        windings: &[Winding],
        winding_plane: PlaneId,
        source: &SolidBrush,
        output: &mut Vec<Winding>,
    ) -> Result<(), CompileError> {
        let current = self.node(node);

        let Some(split) = current.split else {
            if current.is_solid {
                let Some(defining) = self.find_solid_brush(node) else {
                    return Err(CompileError::Invariant(format!(
                        "solid leaf {} has no solid brush",
                        node.into_index()
                    )));
                };

                if defining.id != source.id {
                    return Ok(());
                }
            }

            for winding in windings {
                let mut winding = winding.clone();

                if current.is_solid {
                    winding.insert_solid_node(node);
                } else if let Some(zone) = current.zone {
                    winding.insert_zone(zone);
                }

                output.push(winding);
            }

            return Ok(());
        };

        if current.plane_type == PlaneType::Detail && source.brush_type == BrushType::Structural {
            for winding in windings {
                let mut winding = winding.clone();

                if let Some(zone) = current.zone {
                    winding.insert_zone(zone);
                }

                output.push(winding);
            }

            return Ok(());
        }

        if split.plane.is_coplanar(winding_plane) {
            ensure!(
                current.plane_type != PlaneType::Portal,
                "geometry coplanar with portal plane {}",
                split.plane.into_index()
            );

            let mut to_front = Vec::new();
            self.break_winding(split.front, db, windings, winding_plane, source, &mut to_front)?;
            self.break_winding(split.back, db, &to_front, winding_plane, source, output)?;
        } else {
            let mut front_copy = Vec::with_capacity(windings.len());
            let mut back_copy = Vec::with_capacity(windings.len());

            for winding in windings {
                let mut front = winding.clone();
                let mut back = winding.clone();

                front.clip_front(db, split.plane);
                back.clip_front(db, split.plane.inverse());

                if !front.is_empty() {
                    front_copy.push(front);
                }
                if !back.is_empty() {
                    back_copy.push(back);
                }
            }

            if !front_copy.is_empty() {
                self.break_winding(split.front, db, &front_copy, winding_plane, source, output)?;
            }
            if !back_copy.is_empty() {
                self.break_winding(split.back, db, &back_copy, winding_plane, source, output)?;
            }
        }

        collapse_windings(db, output, &self.zones);

        Ok(())
    }

    /// Leaf depth statistics
    pub fn bsp_stats(&self) -> BspStats {
        let mut stats = BspStats::default();
        let mut stack = vec![(self.root(), 0usize)];

        while let Some((id, depth)) = stack.pop() {
            match self.node(id).split {
                Some(split) => {
                    stack.push((split.back, depth + 1));
                    stack.push((split.front, depth + 1));
                }
                None => {
                    stats.leaf_count += 1;
                    stats.total_depth += depth;
                    stats.max_depth = stats.max_depth.max(depth);
                }
            }
        }

        stats
    }

    /// Visibility link statistics over empty leaves
    pub fn vis_stats(&self) -> VisStats {
        let mut stats = VisStats::default();

        for id in self.leaves() {
            let leaf = self.node(id);

            if leaf.is_solid {
                continue;
            }

            stats.empty_leaves += 1;
            stats.total_links += leaf.vis_links.len();
            stats.max_links = stats.max_links.max(leaf.vis_links.len());
        }

        stats
    }

    /// Drop visibility links, they are not used after zone flood
    pub fn remove_vis_info(&mut self) {
        for node in &mut self.nodes {
            node.vis_links.clear();
        }

        self.links.clear();
    }

    /// Build structural tree, zones and portals, then refine it by detail brushes
    pub fn build(
        db: &mut GeometryDatabase,
        selector: &mut PlaneSelector,
        structural: &[Brush],
        detail: &[Brush],
        portal_brushes: &[PortalBrush],
    ) -> Result<Self, CompileError> {
        let mut tree = Self::new();
        let root = tree.root();

        tree.node_mut(root).brushes = structural.to_vec();
        tree.create_bsp(root, PlaneType::Structural, db, selector)?;

        let stats = tree.bsp_stats();
        log::debug!(
            "BSP: {} nodes, {} leaves, depth {:.2} average, {} maximal",
            tree.nodes.len(),
            stats.leaf_count,
            stats.total_depth as f64 / stats.leaf_count.max(1) as f64,
            stats.max_depth,
        );

        let mut entries = Vec::new();

        for portal_brush in portal_brushes {
            let Some(munged) = tree.munge_portal_brush(db, &portal_brush.brush)? else {
                continue;
            };

            let portal = tree.push_portal(Portal::new(portal_brush.pass_ambient_light, munged.x, munged.y));
            entries.push(PortalEntry {
                plane: munged.plane,
                portal,
                windings: munged.windings,
            });
        }

        for entry in entries {
            tree.insert_portal_entry(root, db, entry)?;
        }

        tree.create_vis_links(root, db)?;

        let stats = tree.vis_stats();
        log::debug!(
            "VIS: {} empty leaves, {:.2} links average, {} maximal",
            stats.empty_leaves,
            stats.total_links as f64 / stats.empty_leaves.max(1) as f64,
            stats.max_links,
        );

        // outside zone must get id 0, so it is flooded first
        let outside = tree.leaf_at(db, db.bounds.min - 10.0);
        ensure!(!tree.node(outside).is_solid, "point outside of the world is in solid leaf");

        let outside_zone = tree.push_zone();
        tree.flood_zone(outside, outside_zone);
        tree.zone_flood();

        let outside = tree.leaf_at(db, db.bounds.max + 10.0);
        ensure!(
            tree.node(outside).zone == Some(ZoneId::from_index(0)),
            "outside zone is not zone 0"
        );

        tree.gather_portals()?;
        tree.update_portal_bounds(db);
        tree.enter_portal_zone_refs();
        tree.flood_ambient_light();

        tree.remove_vis_info();

        if !detail.is_empty() {
            tree.node_mut(root).brushes = detail.to_vec();
            tree.create_bsp(root, PlaneType::Detail, db, selector)?;
        }

        Ok(tree)
    }
}

impl Default for BspTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::brush::tests::box_brush;
    use super::*;

    fn database() -> GeometryDatabase {
        GeometryDatabase::new(&CompileConfig::default())
    }

    fn clipped_box(db: &mut GeometryDatabase, id: usize, min: Vec3d, max: Vec3d) -> Brush {
        let mut brush = box_brush(db, id, min, max);
        assert!(brush.self_clip(db));
        brush
    }

    fn build(db: &mut GeometryDatabase, structural: &[Brush], detail: &[Brush]) -> BspTree {
        db.bounds = db.bounds.extend(1.0);
        let mut selector = PlaneSelector::new(&CompileConfig::default());

        BspTree::build(db, &mut selector, structural, detail, &[]).expect("tree is built")
    }

    #[test]
    fn selector_prefers_axial_balanced_planes() {
        let mut db = database();
        let brushes = [
            clipped_box(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0)),
            clipped_box(&mut db, 1, Vec3d::new(16.0, 0.0, 0.0), Vec3d::new(24.0, 8.0, 8.0)),
        ];
        let mut selector = PlaneSelector::new(&CompileConfig::default());

        let plane = selector.select(&db, &brushes).expect("brushes have planes");

        assert!(plane.is_forward());
        assert!(db.plane(plane).is_axial());
    }

    #[test]
    fn selector_skips_inserted_planes() {
        let mut db = database();
        let mut brush = clipped_box(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));
        let mut selector = PlaneSelector::new(&CompileConfig::default());

        for plane in &mut brush.planes {
            plane.inserted = true;
        }

        assert!(selector.select(&db, &[brush]).is_none());
    }

    #[test]
    fn single_box_tree() {
        let mut db = database();
        let brush = clipped_box(&mut db, 0, Vec3d::new(-8.0, -8.0, -8.0), Vec3d::new(8.0, 8.0, 8.0));
        let tree = build(&mut db, &[brush.clone()], &[]);

        let stats = tree.bsp_stats();
        assert_eq!(stats.leaf_count, 7);

        let center = tree.leaf_at(&db, Vec3d::new(0.0, 0.0, 0.0));
        assert!(tree.node(center).is_solid);
        assert_eq!(tree.find_solid_brush(center).map(|solid| solid.id), Some(brush.id));

        // everything around the box is one zone
        assert_eq!(tree.zones.len(), 1);
        for leaf in tree.leaves() {
            let leaf = tree.node(leaf);
            assert_eq!(leaf.is_solid, leaf.zone.is_none());
        }

        assert!(tree.zone(ZoneId::from_index(0)).ambient_lit);
        assert!(tree.links.is_empty());
    }

    #[test]
    fn brush_centroids_are_solid() {
        let mut db = database();
        let brushes = [
            clipped_box(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(64.0, 64.0, 8.0)),
            clipped_box(&mut db, 1, Vec3d::new(0.0, 0.0, 8.0), Vec3d::new(8.0, 64.0, 64.0)),
            clipped_box(&mut db, 2, Vec3d::new(24.0, 24.0, 8.0), Vec3d::new(40.0, 40.0, 40.0)),
            clipped_box(&mut db, 3, Vec3d::new(4.0, 4.0, 4.0), Vec3d::new(12.0, 12.0, 12.0)),
        ];
        let tree = build(&mut db, &brushes, &[]);

        for brush in &brushes {
            assert!(brush.contains_point(&db, brush.centroid(&db)));
            let leaf = tree.leaf_at(&db, brush.centroid(&db));
            assert!(tree.node(leaf).is_solid, "centroid of brush {} is not solid", brush.id.into_index());
        }

        let empty = tree.leaf_at(&db, Vec3d::new(50.0, 50.0, 50.0));
        assert!(!tree.node(empty).is_solid);
        assert_eq!(tree.find_zone(&db, Vec3d::new(50.0, 50.0, 50.0)), Some(ZoneId::from_index(0)));
    }

    #[test]
    fn detail_pass_refines_empty_leaves_only() {
        let mut db = database();
        let floor = clipped_box(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(64.0, 64.0, 8.0));
        let mut pillar = clipped_box(&mut db, 1, Vec3d::new(16.0, 16.0, 8.0), Vec3d::new(24.0, 24.0, 32.0));
        pillar.brush_type = BrushType::Detail;

        let tree = build(&mut db, &[floor], &[pillar]);

        let leaf = tree.leaf_at(&db, Vec3d::new(20.0, 20.0, 20.0));
        assert!(tree.node(leaf).is_solid);
        assert_eq!(tree.find_solid_brush(leaf).map(|solid| solid.brush_type), Some(BrushType::Detail));

        // detail leaves inherit zone of the structural leaf they refine
        let around = tree.leaf_at(&db, Vec3d::new(40.0, 40.0, 20.0));
        assert_eq!(tree.node(around).zone, Some(ZoneId::from_index(0)));
    }

    #[test]
    fn face_breaking_keeps_visible_part() {
        let mut db = database();
        let floor = clipped_box(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(64.0, 64.0, 8.0));
        let block = clipped_box(&mut db, 1, Vec3d::new(0.0, 0.0, 8.0), Vec3d::new(32.0, 64.0, 16.0));
        let tree = build(&mut db, &[floor.clone(), block], &[]);

        // floor top is half covered by the block
        let top = floor.planes
            .iter()
            .find(|plane| db.plane(plane.plane).normal.z > 0.5)
            .expect("floor has top face");

        let source = SolidBrush { id: floor.id, brush_type: floor.brush_type };
        let mut output = Vec::new();
        tree.break_winding(tree.root(), &mut db, &[top.winding.stripped()], top.plane, &source, &mut output)
            .expect("winding is broken");

        let area = output
            .iter()
            .filter(|winding| !winding.zone_ids.is_empty())
            .map(|winding| winding.surface_area(&db, top.plane))
            .sum::<f64>();

        assert!((area - 32.0 * 64.0).abs() < 1e-3);
    }
}

// bsp/mod.rs
