///! Visibility links, portal insertion and portal gathering

use crate::{
    brush::Brush,
    database::{GeometryDatabase, PlaneId},
    error::{ensure, CompileError},
    geom::BoundBox,
    math::Vec3d,
    winding::{SideFlags, Winding},
};
use super::{collapse_windings, zone::ZoneId, BspTree, NodeId, PlaneType};

impl_id!(VisLinkId);
impl_id!(PortalId);

/// Polygon connecting two BSP subtrees (finally, two leaves)
#[derive(Clone, Debug)]
pub struct VisLink {
    /// Plane link lies on
    pub plane: PlaneId,

    /// Node in front of link plane
    pub front: NodeId,

    /// Node behind link plane
    pub back: NodeId,

    /// Link polygon
    pub winding: Winding,

    /// Portal link coincides with, such links do not propagate zones
    pub portal: Option<PortalId>,
}

impl VisLink {
    /// Node on the other side of link
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.front == node {
            Some(self.back)
        } else if self.back == node {
            Some(self.front)
        } else {
            None
        }
    }
}

/// Portal windings pushed through the tree
#[derive(Clone, Debug)]
pub struct PortalEntry {
    /// Portal plane
    pub plane: PlaneId,

    /// Portal the windings belong to
    pub portal: PortalId,

    /// Winding pieces
    pub windings: Vec<Winding>,
}

/// Portal brush reduced to its largest face clipped to empty space
#[derive(Clone, Debug)]
pub struct MungedPortal {
    /// Face plane
    pub plane: PlaneId,

    /// Face pieces in empty leaves
    pub windings: Vec<Winding>,

    /// First in-plane axis
    pub x: Vec3d,

    /// Second in-plane axis
    pub y: Vec3d,
}

/// Zone separator
#[derive(Clone, Debug)]
pub struct Portal {
    /// Portal plane, set during gathering
    pub plane: Option<PlaneId>,

    /// Zone in front of portal
    pub front_zone: Option<ZoneId>,

    /// Zone behind portal
    pub back_zone: Option<ZoneId>,

    /// Ambient light passes the portal
    pub pass_ambient_light: bool,

    /// Unique portal polygons
    pub windings: Vec<Winding>,

    /// Bounds of all windings
    pub bounds: BoundBox,

    /// First in-plane axis
    pub x: Vec3d,

    /// Second in-plane axis
    pub y: Vec3d,
}

impl Portal {
    /// Portal with no zones and windings
    pub fn new(pass_ambient_light: bool, x: Vec3d, y: Vec3d) -> Self {
        Self {
            plane: None,
            front_zone: None,
            back_zone: None,
            pass_ambient_light,
            windings: Vec::new(),
            bounds: BoundBox::empty(),
            x,
            y,
        }
    }

    /// Zone on the other side of portal
    pub fn other_zone(&self, zone: ZoneId) -> Option<ZoneId> {
        let mut other = None;

        if self.front_zone != Some(zone) {
            other = self.front_zone;
        }
        if self.back_zone != Some(zone) {
            other = self.back_zone;
        }

        other
    }

    /// Minimal quad in portal (x, y) basis enclosing every portal winding, points
    /// ordered by 2D gift wrap.
    pub fn wrapped_quad(&self, db: &GeometryDatabase) -> Vec<Vec3d> {
        let Some(plane) = self.plane else {
            return Vec::new();
        };

        let plane = db.plane(plane);
        let points = self.windings
            .iter()
            .flat_map(|winding| winding.positions(db))
            .collect::<Vec<_>>();

        if points.is_empty() {
            return Vec::new();
        }

        let (mut min, mut max) = ((f64::MAX, f64::MAX), (f64::MIN, f64::MIN));

        for point in &points {
            let (u, v) = (*point ^ self.x, *point ^ self.y);

            min = (min.0.min(u), min.1.min(v));
            max = (max.0.max(u), max.1.max(v));
        }

        // plane point closest to origin is the basis origin
        let origin = plane.normal * -plane.dist;
        let to_space = |u: f64, v: f64| {
            origin + self.x * (u - (origin ^ self.x)) + self.y * (v - (origin ^ self.y))
        };

        let corners = [(min.0, min.1), (max.0, min.1), (max.0, max.1), (min.0, max.1)];
        let hull = gift_wrap(&corners);

        let mut quad = hull.into_iter().map(|(u, v)| to_space(u, v)).collect::<Vec<_>>();

        // keep clockwise order seen from the front
        if quad.len() >= 3 && (((quad[1] - quad[0]) % (quad[2] - quad[1])) ^ plane.normal) > 0.0 {
            quad.reverse();
        }

        quad
    }
}

/// Convex hull of 2D points, counter-clockwise starting from the lowest leftmost point
pub fn gift_wrap(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let Some(start) = points
        .iter()
        .copied()
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
    else {
        return Vec::new();
    };

    let mut hull = vec![start];
    let mut current = start;

    loop {
        let mut candidate = None::<(f64, f64)>;

        for point in points.iter().copied() {
            if point == current {
                continue;
            }

            let Some(best) = candidate else {
                candidate = Some(point);
                continue;
            };

            let cross = (best.0 - current.0) * (point.1 - current.1)
                - (best.1 - current.1) * (point.0 - current.0);

            let further = {
                let best_distance = (best.0 - current.0).powi(2) + (best.1 - current.1).powi(2);
                let distance = (point.0 - current.0).powi(2) + (point.1 - current.1).powi(2);
                distance > best_distance
            };

            // point is to the right of current edge or colinear and further
            if cross < 0.0 || (cross == 0.0 && further) {
                candidate = Some(point);
            }
        }

        let Some(next) = candidate else {
            break;
        };

        if next == start || hull.len() > points.len() {
            break;
        }

        hull.push(next);
        current = next;
    }

    hull
}

impl BspTree {
    /// Get link by id
    pub fn link(&self, id: VisLinkId) -> &VisLink {
        &self.links[id.into_index()]
    }

    /// Get link by id
    pub fn link_mut(&mut self, id: VisLinkId) -> &mut VisLink {
        &mut self.links[id.into_index()]
    }

    /// Allocate link
    fn push_link(&mut self, link: VisLink) -> VisLinkId {
        let id = VisLinkId::from_index(self.links.len());
        self.links.push(link);
        id
    }

    /// Allocate portal
    pub fn push_portal(&mut self, portal: Portal) -> PortalId {
        let id = PortalId::from_index(self.portals.len());
        self.portals.push(portal);
        id
    }

    /// Clip windings lying on `base_plane` to empty leaves
    fn create_portal_windings(
        &self,
        node: NodeId,
        db: &mut GeometryDatabase,
        base: &[Winding],
        base_plane: PlaneId,
        output: &mut Vec<Winding>,
    ) -> Result<(), CompileError> {
        let current = self.node(node);

        let Some(split) = current.split else {
            if !current.is_solid {
                output.extend_from_slice(base);
            }
            return Ok(());
        };

        if split.plane.is_coplanar(base_plane) {
            let mut front_clipped = Vec::new();
            self.create_portal_windings(split.front, db, base, base_plane, &mut front_clipped)?;
            return self.create_portal_windings(split.back, db, &front_clipped, base_plane, output);
        }

        let mut front_copy = Vec::new();
        let mut back_copy = Vec::new();

        for winding in base {
            let mut front = winding.clone();
            let mut back = winding.clone();

            front.clip_front(db, split.plane);
            back.clip_front(db, split.plane.inverse());

            ensure!(
                !front.is_empty() || !back.is_empty(),
                "portal winding vanished at node {}",
                node.into_index()
            );

            if !front.is_empty() {
                front_copy.push(front);
            }
            if !back.is_empty() {
                back_copy.push(back);
            }
        }

        if !front_copy.is_empty() {
            self.create_portal_windings(split.front, db, &front_copy, base_plane, output)?;
        }
        if !back_copy.is_empty() {
            self.create_portal_windings(split.back, db, &back_copy, base_plane, output)?;
        }

        Ok(())
    }

    /// Reduce self-clipped portal brush to its largest face clipped to empty space.
    /// None if face lies in solid space completely.
    pub fn munge_portal_brush(
        &self,
        db: &mut GeometryDatabase,
        brush: &Brush,
    ) -> Result<Option<MungedPortal>, CompileError> {
        let mut max_area = -1.0;
        let mut max_index = None;

        for (index, plane) in brush.planes.iter().enumerate() {
            let area = plane.winding.surface_area(db, plane.plane);

            if area > max_area {
                max_area = area;
                max_index = Some(index);
            }
        }

        let Some(max_index) = max_index else {
            return Err(CompileError::Invariant(format!(
                "portal brush {} has no planes",
                brush.id.into_index()
            )));
        };

        let face = &brush.planes[max_index];
        let normal = db.plane(face.plane).normal;

        let x = brush.planes
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != max_index)
            .map(|(_, plane)| db.plane(plane.plane).normal)
            .find(|other| (*other ^ normal).abs() < 1e-7);

        let Some(x) = x else {
            return Err(CompileError::Invariant(format!(
                "portal brush {} is not a box",
                brush.id.into_index()
            )));
        };
        let y = (x % normal).normalized();

        let mut windings = Vec::new();
        self.create_portal_windings(self.root(), db, &[face.winding.stripped()], face.plane, &mut windings)?;

        if windings.is_empty() {
            return Ok(None);
        }

        Ok(Some(MungedPortal {
            plane: face.plane,
            windings,
            x,
            y,
        }))
    }

    /// Insert portal into tree. Empty leaf the portal reaches is split by the portal plane.
    pub fn insert_portal_entry(
        &mut self,
        node: NodeId,
        db: &mut GeometryDatabase,
        mut entry: PortalEntry,
    ) -> Result<(), CompileError> {
        let Some(split) = self.node(node).split else {
            ensure!(!self.node(node).is_solid, "portal inserted into solid leaf {}", node.into_index());
            ensure!(
                entry.windings.len() == 1,
                "portal {} reached leaf in {} pieces",
                entry.portal.into_index(),
                entry.windings.len()
            );

            let split = self.split_leaf(node, entry.plane);
            self.node_mut(node).plane_type = PlaneType::Portal;

            for child in [split.front, split.back] {
                let child = self.node_mut(child);
                child.plane_type = PlaneType::Portal;
                child.is_solid = false;
            }

            self.node_mut(node).portals.push(entry);

            return Ok(());
        };

        if split.plane.is_coplanar(entry.plane) {
            if entry.windings.len() > 1 {
                for winding in &mut entry.windings {
                    winding.solid_nodes.clear();
                }

                collapse_windings(db, &mut entry.windings, &self.zones);
            }

            ensure!(
                entry.windings.len() == 1,
                "portal {} did not collapse into single winding ({} pieces)",
                entry.portal.into_index(),
                entry.windings.len()
            );

            self.node_mut(node).portals.push(entry);

            return Ok(());
        }

        let mut back = PortalEntry {
            plane: entry.plane,
            portal: entry.portal,
            windings: Vec::with_capacity(entry.windings.len()),
        };

        let windings = std::mem::take(&mut entry.windings);

        for winding in windings {
            let mut front_piece = winding.clone();
            let mut back_piece = winding;

            front_piece.clip_front(db, split.plane);
            back_piece.clip_front(db, split.plane.inverse());

            ensure!(
                !front_piece.is_empty() || !back_piece.is_empty(),
                "portal winding vanished at node {}",
                node.into_index()
            );

            if !front_piece.is_empty() {
                entry.windings.push(front_piece);
            }
            if !back_piece.is_empty() {
                back.windings.push(back_piece);
            }
        }

        if !entry.windings.is_empty() {
            self.insert_portal_entry(split.front, db, entry)?;
        }
        if !back.windings.is_empty() {
            self.insert_portal_entry(split.back, db, back)?;
        }

        Ok(())
    }

    /// Build links between neighbouring leaves. Links touching solid leaves are erased,
    /// links matching a portal winding are tagged by the portal.
    pub fn create_vis_links(&mut self, node: NodeId, db: &mut GeometryDatabase) -> Result<(), CompileError> {
        let Some(split) = self.node(node).split else {
            if self.node(node).is_solid {
                self.erase_referencing_links(node)?;
            }

            let leaf = &self.nodes[node.into_index()];

            for entry in &leaf.portals {
                ensure!(
                    entry.windings.len() == 1,
                    "portal {} reached leaf in {} pieces",
                    entry.portal.into_index(),
                    entry.windings.len()
                );

                let matching = leaf.vis_links
                    .iter()
                    .copied()
                    .find(|link| self.links[link.into_index()].winding.is_equivalent(&entry.windings[0]));

                if let Some(link) = matching {
                    let link = &mut self.links[link.into_index()];

                    ensure!(
                        link.portal.map_or(true, |portal| portal == entry.portal),
                        "link shared by portals {:?} and {}",
                        link.portal,
                        entry.portal.into_index()
                    );

                    link.portal = Some(entry.portal);
                }
            }

            return Ok(());
        };

        let bounds = db.bounds;
        let Some(mut winding) = Winding::create_bounded(db, &bounds, split.plane) else {
            return Err(CompileError::Invariant(format!(
                "plane of node {} misses world bounds",
                node.into_index()
            )));
        };

        let mut previous = node;
        let mut probe = self.node(node).parent;

        while let Some(parent) = probe {
            let Some(parent_split) = self.node(parent).split else {
                break;
            };

            let plane = if parent_split.front == previous {
                parent_split.plane
            } else {
                parent_split.plane.inverse()
            };

            winding.clip_front(db, plane);
            ensure!(!winding.is_empty(), "vis link of node {} clipped away", node.into_index());

            previous = parent;
            probe = self.node(parent).parent;
        }

        let link = self.push_link(VisLink {
            plane: split.plane,
            front: split.front,
            back: split.back,
            winding,
            portal: None,
        });

        self.split_vis_links(node, db)?;

        self.node_mut(split.front).vis_links.push(link);
        self.node_mut(split.back).vis_links.push(link);

        self.split_portal_entries(node, db)?;

        self.create_vis_links(split.back, db)?;
        self.create_vis_links(split.front, db)
    }

    /// Push node links down to its children, splitting links crossing node plane
    fn split_vis_links(&mut self, node: NodeId, db: &mut GeometryDatabase) -> Result<(), CompileError> {
        let Some(split) = self.node(node).split else {
            return Ok(());
        };

        let links = std::mem::take(&mut self.node_mut(node).vis_links);

        for id in links.into_iter().rev() {
            let sides = self.link(id).winding.point_sides(db, split.plane);

            if sides.contains(SideFlags::FRONT | SideFlags::BACK) {
                let mut other = self.link(id).clone();

                self.link_mut(id).winding.clip_front(db, split.plane);
                other.winding.clip_front(db, split.plane.inverse());

                ensure!(
                    !self.link(id).winding.is_empty() && !other.winding.is_empty(),
                    "vis link split at node {} gave empty piece",
                    node.into_index()
                );

                if self.link(id).front == node {
                    self.link_mut(id).front = split.front;
                    self.node_mut(split.front).vis_links.push(id);

                    other.front = split.back;
                    let far = other.back;
                    let other = self.push_link(other);
                    self.node_mut(far).vis_links.push(other);
                    self.node_mut(split.back).vis_links.push(other);
                } else if self.link(id).back == node {
                    self.link_mut(id).back = split.front;
                    self.node_mut(split.front).vis_links.push(id);

                    other.back = split.back;
                    let far = other.front;
                    let other = self.push_link(other);
                    self.node_mut(far).vis_links.push(other);
                    self.node_mut(split.back).vis_links.push(other);
                } else {
                    return Err(CompileError::Invariant(format!(
                        "vis link in node {} does not reference it",
                        node.into_index()
                    )));
                }
            } else {
                let target = if sides.contains(SideFlags::FRONT) {
                    split.front
                } else if sides.contains(SideFlags::BACK) {
                    split.back
                } else {
                    return Err(CompileError::Invariant(format!(
                        "vis link coplanar with node {}",
                        node.into_index()
                    )));
                };

                let link = self.link_mut(id);

                if link.front == node {
                    link.front = target;
                } else if link.back == node {
                    link.back = target;
                } else {
                    return Err(CompileError::Invariant(format!(
                        "vis link in node {} does not reference it",
                        node.into_index()
                    )));
                }

                self.node_mut(target).vis_links.push(id);
            }
        }

        Ok(())
    }

    /// Push node portal entries down to its children
    fn split_portal_entries(&mut self, node: NodeId, db: &mut GeometryDatabase) -> Result<(), CompileError> {
        let Some(split) = self.node(node).split else {
            return Ok(());
        };

        let entries = std::mem::take(&mut self.node_mut(node).portals);

        for entry in entries.into_iter().rev() {
            if entry.plane.is_coplanar(split.plane) {
                self.node_mut(split.front).portals.push(entry.clone());
                self.node_mut(split.back).portals.push(entry);
                continue;
            }

            let mut front = PortalEntry { windings: Vec::new(), ..entry.clone() };
            let mut back = PortalEntry { windings: Vec::new(), ..entry.clone() };

            for winding in &entry.windings {
                let side = winding.which_side(db, entry.plane, split.plane);

                ensure!(
                    side != SideFlags::ON,
                    "portal {} winding lies on node {} plane",
                    entry.portal.into_index(),
                    node.into_index()
                );

                if side.contains(SideFlags::FRONT) {
                    let mut piece = winding.clone();
                    if side.contains(SideFlags::BACK) {
                        piece.clip_front(db, split.plane);
                    }
                    front.windings.push(piece);
                }

                if side.contains(SideFlags::BACK) {
                    let mut piece = winding.clone();
                    if side.contains(SideFlags::FRONT) {
                        piece.clip_front(db, split.plane.inverse());
                    }
                    back.windings.push(piece);
                }
            }

            if !front.windings.is_empty() {
                self.node_mut(split.front).portals.push(front);
            }
            if !back.windings.is_empty() {
                self.node_mut(split.back).portals.push(back);
            }
        }

        Ok(())
    }

    /// Remove links of solid leaf from the leaves on the other side
    fn erase_referencing_links(&mut self, node: NodeId) -> Result<(), CompileError> {
        let links = std::mem::take(&mut self.node_mut(node).vis_links);

        for id in links.into_iter().rev() {
            let link = self.link(id);

            ensure!(link.portal.is_none(), "erasing link of portal {:?}", link.portal);

            let Some(other) = link.other(node) else {
                return Err(CompileError::Invariant(format!(
                    "vis link in node {} does not reference it",
                    node.into_index()
                )));
            };

            let other_links = &mut self.node_mut(other).vis_links;
            let Some(position) = other_links.iter().position(|link| *link == id) else {
                return Err(CompileError::Invariant(format!(
                    "vis link missing in node {}",
                    other.into_index()
                )));
            };

            other_links.remove(position);
        }

        Ok(())
    }

    /// Move portal windings and zones from leaves into the portal list. A portal
    /// separating different zone pairs in different leaves is split into several portals.
    pub fn gather_portals(&mut self) -> Result<(), CompileError> {
        for leaf in self.leaves() {
            if self.node(leaf).is_solid {
                ensure!(self.node(leaf).portals.is_empty(), "solid leaf {} has portals", leaf.into_index());
                continue;
            }

            for entry_index in 0..self.node(leaf).portals.len() {
                let entry = self.node(leaf).portals[entry_index].clone();

                let link = self.node(leaf).vis_links
                    .iter()
                    .map(|id| self.link(*id))
                    .find(|link| link.portal == Some(entry.portal))
                    .cloned();

                let mut portal_id = entry.portal;

                match self.portals[portal_id.into_index()].plane {
                    None => self.portals[portal_id.into_index()].plane = Some(entry.plane),
                    Some(plane) => ensure!(
                        plane == entry.plane,
                        "portal {} pieces lie on different planes",
                        portal_id.into_index()
                    ),
                }

                if let Some(link) = link {
                    let (front, back) = if entry.plane == link.plane {
                        (link.front, link.back)
                    } else {
                        ensure!(
                            entry.plane == link.plane.inverse(),
                            "portal {} does not lie on its link plane",
                            portal_id.into_index()
                        );
                        (link.back, link.front)
                    };

                    let (front_zone, back_zone) = (self.node(front).zone, self.node(back).zone);
                    let portal = &mut self.portals[portal_id.into_index()];

                    if portal.front_zone.is_none() {
                        portal.front_zone = front_zone;
                        portal.back_zone = back_zone;
                    } else if portal.front_zone != front_zone || portal.back_zone != back_zone {
                        let mut split_off = Portal::new(portal.pass_ambient_light, portal.x, portal.y);
                        split_off.plane = Some(entry.plane);
                        split_off.front_zone = front_zone;
                        split_off.back_zone = back_zone;

                        portal_id = self.push_portal(split_off);
                        self.node_mut(leaf).portals[entry_index].portal = portal_id;
                    }
                }

                ensure!(
                    entry.windings.len() == 1,
                    "portal {} reached leaf in {} pieces",
                    portal_id.into_index(),
                    entry.windings.len()
                );

                let portal = &mut self.portals[portal_id.into_index()];

                if !portal.windings.iter().any(|winding| winding.is_equivalent(&entry.windings[0])) {
                    portal.windings.push(entry.windings[0].clone());
                }
            }
        }

        Ok(())
    }

    /// Recalculate portal bounds
    pub fn update_portal_bounds(&mut self, db: &GeometryDatabase) {
        for portal in &mut self.portals {
            portal.bounds = BoundBox::for_points(portal.windings.iter().flat_map(|winding| winding.positions(db)));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use crate::{
        brush::{tests::box_brush, BrushType},
        config::CompileConfig,
        map::PortalBrush,
    };
    use super::{super::PlaneSelector, *};

    #[test]
    fn gift_wrap_square_with_inner_point() {
        let points = [(0.0, 0.0), (2.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 2.0)];
        let hull = gift_wrap(&points);

        assert_eq!(hull, vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
    }

    /// Two rooms joined by a doorway closed by portal brush
    fn two_rooms(db: &mut GeometryDatabase, pass_ambient_light: bool) -> BspTree {
        let mut walls = vec![
            // floor, ceiling
            box_brush(db, 0, Vec3d::new(-8.0, -8.0, -8.0), Vec3d::new(136.0, 72.0, 0.0)),
            box_brush(db, 1, Vec3d::new(-8.0, -8.0, 64.0), Vec3d::new(136.0, 72.0, 72.0)),
            // outer walls
            box_brush(db, 2, Vec3d::new(-8.0, -8.0, 0.0), Vec3d::new(0.0, 72.0, 64.0)),
            box_brush(db, 3, Vec3d::new(128.0, -8.0, 0.0), Vec3d::new(136.0, 72.0, 64.0)),
            box_brush(db, 4, Vec3d::new(0.0, -8.0, 0.0), Vec3d::new(128.0, 0.0, 64.0)),
            box_brush(db, 5, Vec3d::new(0.0, 64.0, 0.0), Vec3d::new(128.0, 72.0, 64.0)),
            // middle wall with doorway 16 < y < 48
            box_brush(db, 6, Vec3d::new(60.0, 0.0, 0.0), Vec3d::new(68.0, 16.0, 64.0)),
            box_brush(db, 7, Vec3d::new(60.0, 48.0, 0.0), Vec3d::new(68.0, 64.0, 64.0)),
        ];

        for wall in &mut walls {
            assert!(wall.self_clip(db));
        }

        let mut portal = box_brush(db, 8, Vec3d::new(60.0, 16.0, 0.0), Vec3d::new(68.0, 48.0, 64.0));
        portal.brush_type = BrushType::Portal;
        assert!(portal.self_clip(db));

        db.bounds = db.bounds.extend(1.0);

        let mut selector = PlaneSelector::new(&CompileConfig::default());
        let portals = [PortalBrush { brush: portal, pass_ambient_light }];

        BspTree::build(db, &mut selector, &walls, &[], &portals).expect("tree is built")
    }

    /// Row of 64 unit rooms along X. Wall `i + 1` has a doorway closed by portal
    /// `passes[i]`; the last doorway opens to the outside.
    fn room_row(db: &mut GeometryDatabase, passes: &[bool]) -> BspTree {
        let length = 64.0 * passes.len() as f64;

        let mut walls = vec![
            box_brush(db, 0, Vec3d::new(-4.0, -8.0, -8.0), Vec3d::new(length + 4.0, 72.0, 0.0)),
            box_brush(db, 1, Vec3d::new(-4.0, -8.0, 64.0), Vec3d::new(length + 4.0, 72.0, 72.0)),
            box_brush(db, 2, Vec3d::new(-4.0, -8.0, 0.0), Vec3d::new(length + 4.0, 0.0, 64.0)),
            box_brush(db, 3, Vec3d::new(-4.0, 64.0, 0.0), Vec3d::new(length + 4.0, 72.0, 64.0)),
            box_brush(db, 4, Vec3d::new(-4.0, 0.0, 0.0), Vec3d::new(4.0, 64.0, 64.0)),
        ];
        let mut portals = Vec::new();

        for (index, pass_ambient_light) in passes.iter().enumerate() {
            let x = 64.0 * (index + 1) as f64;
            let id = walls.len();

            walls.push(box_brush(db, id, Vec3d::new(x - 4.0, 0.0, 0.0), Vec3d::new(x + 4.0, 16.0, 64.0)));
            walls.push(box_brush(db, id + 1, Vec3d::new(x - 4.0, 48.0, 0.0), Vec3d::new(x + 4.0, 64.0, 64.0)));

            let mut brush = box_brush(db, 100 + index, Vec3d::new(x - 4.0, 16.0, 0.0), Vec3d::new(x + 4.0, 48.0, 64.0));
            brush.brush_type = BrushType::Portal;
            portals.push(PortalBrush { brush, pass_ambient_light: *pass_ambient_light });
        }

        for wall in &mut walls {
            assert!(wall.self_clip(db));
        }
        for portal in &mut portals {
            assert!(portal.brush.self_clip(db));
        }

        db.bounds = db.bounds.extend(1.0);

        let mut selector = PlaneSelector::new(&CompileConfig::default());
        BspTree::build(db, &mut selector, &walls, &[], &portals).expect("tree is built")
    }

    /// Ambient light flags of rooms, from the closed end
    fn rooms_lit(passes: &[bool]) -> Vec<bool> {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let tree = room_row(&mut db, passes);

        (0..passes.len())
            .map(|room| {
                let center = Vec3d::new(64.0 * room as f64 + 32.0, 32.0, 32.0);
                let zone = tree.find_zone(&db, center).expect("room has zone");

                assert_ne!(zone.into_index(), 0);
                tree.zone(zone).ambient_lit
            })
            .collect()
    }

    #[test]
    fn ambient_light_enters_through_open_doorway() {
        assert_eq!(rooms_lit(&[true]), vec![true]);
    }

    #[test]
    fn ambient_light_is_blocked_by_closed_doorway() {
        assert_eq!(rooms_lit(&[false]), vec![false]);
    }

    #[test]
    fn ambient_light_stops_at_first_closed_doorway() {
        assert_eq!(rooms_lit(&[true, true]), vec![true, true]);
        assert_eq!(rooms_lit(&[false, true]), vec![false, true]);
        assert_eq!(rooms_lit(&[true, false]), vec![false, false]);
    }

    #[test]
    fn portal_separates_rooms() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let tree = two_rooms(&mut db, false);

        let left = tree.find_zone(&db, Vec3d::new(30.0, 30.0, 30.0)).expect("left room has zone");
        let right = tree.find_zone(&db, Vec3d::new(100.0, 30.0, 30.0)).expect("right room has zone");

        assert_ne!(left, right);
        assert_ne!(left.into_index(), 0);
        assert_ne!(right.into_index(), 0);

        assert_eq!(tree.portals.len(), 1);
        let portal = &tree.portals[0];
        let zones = [portal.front_zone, portal.back_zone];
        assert!(zones.contains(&Some(left)) && zones.contains(&Some(right)));

        assert_eq!(tree.zone(left).portals.len(), 1);
        assert!(!tree.zone(left).ambient_lit);
        assert!(tree.zone(ZoneId::from_index(0)).ambient_lit);

        let plane = portal.plane.expect("portal has plane");
        let area = portal.windings.iter().map(|winding| winding.surface_area(&db, plane)).sum::<f64>();
        assert_relative_eq!(area, 32.0 * 64.0, epsilon = 1e-3);

        let quad = portal.wrapped_quad(&db);
        assert_eq!(quad.len(), 4);
        for point in quad {
            assert!(db.plane(plane).distance(point).abs() < 1e-6);
        }
    }
}

// bsp/portal.rs
