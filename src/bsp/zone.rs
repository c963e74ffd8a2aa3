///! Zones (connected empty space) and flood fills over them

use super::{portal::PortalId, BspTree, NodeId};

impl_id!(ZoneId);

/// Connected region of empty leaves
#[derive(Clone, Debug, Default)]
pub struct Zone {
    /// Zone is exported
    pub active: bool,

    /// Zone is reachable from outside through light-passing portals
    pub ambient_lit: bool,

    /// Portals bordering zone
    pub portals: Vec<PortalId>,
}

/// Generic flood fill. `visit` marks an item and returns its neighbours, or returns
/// None if the item is already marked.
pub fn flood<T, I, F>(start: T, mut visit: F)
where
    F: FnMut(T) -> Option<I>,
    I: IntoIterator<Item = T>,
{
    let mut stack = vec![start];

    while let Some(item) = stack.pop() {
        if let Some(neighbours) = visit(item) {
            stack.extend(neighbours);
        }
    }
}

impl BspTree {
    /// Allocate new zone
    pub fn push_zone(&mut self) -> ZoneId {
        let id = ZoneId::from_index(self.zones.len());
        self.zones.push(Zone::default());
        id
    }

    /// Assign zone to every empty leaf reachable from `start` through non-portal links
    pub fn flood_zone(&mut self, start: NodeId, zone: ZoneId) {
        let (nodes, links) = (&mut self.nodes, &self.links);

        flood(start, |id| {
            let node = &mut nodes[id.into_index()];

            if node.zone.is_some() {
                return None;
            }
            node.zone = Some(zone);

            Some(node.vis_links
                .iter()
                .map(|link| &links[link.into_index()])
                .filter(|link| link.portal.is_none())
                .filter_map(|link| link.other(id))
                .collect::<Vec<_>>())
        });
    }

    /// Give zones to all empty leaves that have none yet
    pub fn zone_flood(&mut self) {
        for leaf in self.leaves() {
            let node = self.node(leaf);

            if !node.is_solid && node.zone.is_none() {
                let zone = self.push_zone();
                self.flood_zone(leaf, zone);
            }
        }
    }

    /// Fill zone portal lists
    pub fn enter_portal_zone_refs(&mut self) {
        for (index, zone) in self.zones.iter_mut().enumerate() {
            let id = ZoneId::from_index(index);

            for (portal_index, portal) in self.portals.iter().enumerate() {
                if portal.front_zone == Some(id) || portal.back_zone == Some(id) {
                    zone.portals.push(PortalId::from_index(portal_index));
                }
            }
        }
    }

    /// Mark zones reachable from outside (zone 0) through ambient light passing portals
    pub fn flood_ambient_light(&mut self) {
        for zone in &mut self.zones {
            zone.ambient_lit = false;
        }

        if self.zones.is_empty() {
            return;
        }

        let (zones, portals) = (&mut self.zones, &self.portals);

        flood(ZoneId::from_index(0), |id| {
            let zone = &mut zones[id.into_index()];

            if zone.ambient_lit {
                return None;
            }
            zone.ambient_lit = true;

            Some(zone.portals
                .iter()
                .map(|portal| &portals[portal.into_index()])
                .filter(|portal| portal.pass_ambient_light)
                .filter_map(|portal| portal.other_zone(id))
                .collect::<Vec<_>>())
        });
    }

    /// Mark every zone active
    pub fn mark_zones_active(&mut self) {
        for zone in &mut self.zones {
            zone.active = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_visits_connected_component() {
        // 0 - 1 - 2   3 - 4
        let edges = [(0usize, 1usize), (1, 2), (3, 4)];
        let mut marked = [false; 5];

        flood(0usize, |item| {
            if marked[item] {
                return None;
            }
            marked[item] = true;

            Some(edges
                .iter()
                .filter_map(|(a, b)| match item {
                    _ if *a == item => Some(*b),
                    _ if *b == item => Some(*a),
                    _ => None,
                })
                .collect::<Vec<_>>())
        });

        assert_eq!(marked, [true, true, true, false, false]);
    }
}

// bsp/zone.rs
