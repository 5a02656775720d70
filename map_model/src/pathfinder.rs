use geom::{HashablePt2D, Pt2D};
use petgraph::algo::dijkstra;
use petgraph::graphmap::DiGraphMap;
use std::collections::BTreeMap;

/// A destination a vehicle can be routed to, by index.
pub type DestinationID = usize;

/// Answers "a vehicle at this coord wants to reach this destination; which
/// intersection exits work for it?". Explicit overrides win; otherwise the
/// lane connectivity graph is searched.
#[derive(Clone, Debug)]
pub struct Pathfinder {
    graph: DiGraphMap<HashablePt2D, f64>,
    destinations: BTreeMap<DestinationID, HashablePt2D>,
    overrides: BTreeMap<(HashablePt2D, DestinationID), Vec<HashablePt2D>>,
}

impl Pathfinder {
    pub fn new() -> Pathfinder {
        Pathfinder {
            graph: DiGraphMap::new(),
            destinations: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Registers a traversable hop (an intersection lane from its entry to
    /// its exit) with its cost.
    pub fn add_edge(&mut self, from: Pt2D, to: Pt2D, cost: f64) {
        self.graph
            .add_edge(from.to_hashable(), to.to_hashable(), cost);
    }

    pub fn add_destination(&mut self, id: DestinationID, at: Pt2D) {
        self.destinations.insert(id, at.to_hashable());
    }

    /// Pins the answer for one (coord, destination) pair, bypassing search.
    pub fn add_override(&mut self, from: Pt2D, destination: DestinationID, next: Vec<Pt2D>) {
        self.overrides.insert(
            (from.to_hashable(), destination),
            next.into_iter().map(Pt2D::to_hashable).collect(),
        );
    }

    pub fn destination_coord(&self, id: DestinationID) -> Option<Pt2D> {
        self.destinations.get(&id).map(|pt| pt.to_pt2d())
    }

    /// The ordered exit coords a vehicle at `from` can take towards
    /// `destination`. Empty when the destination is unreachable.
    pub fn next_movements(&self, from: Pt2D, destination: DestinationID) -> Vec<Pt2D> {
        let key = (from.to_hashable(), destination);
        if let Some(next) = self.overrides.get(&key) {
            return next.iter().map(|pt| pt.to_pt2d()).collect();
        }
        let goal = match self.destinations.get(&destination) {
            Some(pt) => *pt,
            None => {
                return Vec::new();
            }
        };
        let src = from.to_hashable();
        if !self.graph.contains_node(src) {
            return Vec::new();
        }

        // Rank each neighboring hop by the remaining cost from it.
        let mut candidates: Vec<(f64, HashablePt2D)> = Vec::new();
        for next in self.graph.neighbors(src) {
            let hop = *self.graph.edge_weight(src, next).unwrap();
            if next == goal {
                candidates.push((hop, next));
                continue;
            }
            let costs = dijkstra(&self.graph, next, Some(goal), |(_, _, w)| *w);
            if let Some(rest) = costs.get(&goal) {
                candidates.push((hop + rest, next));
            }
        }
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        candidates.into_iter().map(|(_, pt)| pt.to_pt2d()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let mut pf = Pathfinder::new();
        let entry = Pt2D::new(0.0, 0.0);
        let exit = Pt2D::new(10.0, 10.0);
        pf.add_override(entry, 0, vec![exit]);
        assert_eq!(pf.next_movements(entry, 0), vec![exit]);
    }

    #[test]
    fn graph_search() {
        let mut pf = Pathfinder::new();
        let a = Pt2D::new(0.0, 0.0);
        let b = Pt2D::new(10.0, 0.0);
        let c = Pt2D::new(20.0, 0.0);
        pf.add_edge(a, b, 10.0);
        pf.add_edge(b, c, 10.0);
        pf.add_destination(7, c);
        assert_eq!(pf.next_movements(a, 7), vec![b]);
        assert_eq!(pf.next_movements(b, 7), vec![c]);
        assert!(pf.next_movements(c, 7).is_empty());
        assert!(pf.next_movements(a, 99).is_empty());
    }
}
