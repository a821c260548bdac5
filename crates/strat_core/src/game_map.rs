//! Territory graph, routes and shortest-path search.
//!
//! Search uses Dijkstra over entry costs with a deterministic tie-breaker
//! (lower territory id first), so equal-cost routes are always resolved the
//! same way on every machine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::error::{GameError, Result};
use crate::ids::TerritoryId;

/// Static description of one territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryInfo {
    /// Territory id.
    pub id: TerritoryId,
    /// Unique name.
    pub name: String,
    /// Sea zone.
    pub water: bool,
    /// Neutral land.
    pub neutral: bool,
    /// Movement points a land unit spends to enter.
    pub movement_cost: u32,
    /// Production value.
    pub production: u32,
}

/// The territory adjacency graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMap {
    territories: Vec<TerritoryInfo>,
    adjacency: Vec<BTreeSet<TerritoryId>>,
}

impl GameMap {
    /// Create a map with no connections.
    #[must_use]
    pub fn new(territories: Vec<TerritoryInfo>) -> Self {
        let adjacency = vec![BTreeSet::new(); territories.len()];
        Self {
            territories,
            adjacency,
        }
    }

    /// Connect two territories in both directions.
    ///
    /// # Errors
    /// Returns [`GameError::UnknownTerritory`] if either id is not on the map.
    pub fn connect(&mut self, a: TerritoryId, b: TerritoryId) -> Result<()> {
        self.check(a)?;
        self.check(b)?;
        if a != b {
            self.adjacency[a.index()].insert(b);
            self.adjacency[b.index()].insert(a);
        }
        Ok(())
    }

    fn check(&self, id: TerritoryId) -> Result<()> {
        if id.index() < self.territories.len() {
            Ok(())
        } else {
            Err(GameError::UnknownTerritory(id))
        }
    }

    /// Number of territories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.territories.len()
    }

    /// Check if the map has no territories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    /// Static data for a territory. Panics on an id not from this map.
    #[must_use]
    pub fn territory(&self, id: TerritoryId) -> &TerritoryInfo {
        &self.territories[id.index()]
    }

    #[cfg(test)]
    pub(crate) fn territory_mut(&mut self, id: TerritoryId) -> &mut TerritoryInfo {
        &mut self.territories[id.index()]
    }

    /// All territories in id order.
    #[must_use]
    pub fn territories(&self) -> &[TerritoryInfo] {
        &self.territories
    }

    /// Find a territory by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TerritoryId> {
        self.territories
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.id)
    }

    /// Check if a territory is a sea zone.
    #[must_use]
    pub fn is_water(&self, id: TerritoryId) -> bool {
        self.territory(id).water
    }

    /// Neighbours of a territory in id order.
    pub fn neighbors(&self, id: TerritoryId) -> impl Iterator<Item = TerritoryId> + '_ {
        self.adjacency[id.index()].iter().copied()
    }

    /// Check if two territories share a border.
    #[must_use]
    pub fn are_adjacent(&self, a: TerritoryId, b: TerritoryId) -> bool {
        self.adjacency
            .get(a.index())
            .is_some_and(|set| set.contains(&b))
    }

    /// Check that every step of a route is on the map and adjacent.
    #[must_use]
    pub fn is_valid_route(&self, route: &Route) -> bool {
        route.territories().iter().all(|t| self.check(*t).is_ok())
            && route
                .territories()
                .windows(2)
                .all(|pair| self.are_adjacent(pair[0], pair[1]))
    }

    /// Cost of entering `id` for a land unit, with the terrain multiplier.
    #[must_use]
    pub fn entry_cost(&self, id: TerritoryId) -> u32 {
        let info = self.territory(id);
        if info.water {
            1
        } else {
            info.movement_cost.max(1)
        }
    }

    /// Land movement cost of a route: the entry cost of every territory
    /// after the start.
    #[must_use]
    pub fn land_route_cost(&self, route: &Route) -> u32 {
        route.steps().iter().map(|t| self.entry_cost(*t)).sum()
    }

    /// Cheapest route between two territories through territories accepted
    /// by `passable`. The end territory must itself be passable.
    ///
    /// `weighted` selects terrain entry costs; otherwise every step costs 1.
    #[must_use]
    pub fn best_route<F>(
        &self,
        start: TerritoryId,
        end: TerritoryId,
        weighted: bool,
        passable: F,
    ) -> Option<Route>
    where
        F: Fn(TerritoryId) -> bool,
    {
        if self.check(start).is_err() || self.check(end).is_err() {
            return None;
        }
        if start == end {
            return Some(Route::new(vec![start]));
        }

        let mut open: BinaryHeap<SearchNode> = BinaryHeap::new();
        let mut came_from: BTreeMap<TerritoryId, TerritoryId> = BTreeMap::new();
        let mut cost: BTreeMap<TerritoryId, u32> = BTreeMap::new();

        cost.insert(start, 0);
        open.push(SearchNode {
            territory: start,
            cost: 0,
        });

        while let Some(current) = open.pop() {
            if current.territory == end {
                return Some(reconstruct_route(&came_from, start, end));
            }
            if cost.get(&current.territory).copied().unwrap_or(u32::MAX) < current.cost {
                continue;
            }
            for next in self.neighbors(current.territory) {
                if !passable(next) {
                    continue;
                }
                let step = if weighted { self.entry_cost(next) } else { 1 };
                let tentative = current.cost + step;
                if tentative < cost.get(&next).copied().unwrap_or(u32::MAX) {
                    cost.insert(next, tentative);
                    came_from.insert(next, current.territory);
                    open.push(SearchNode {
                        territory: next,
                        cost: tentative,
                    });
                }
            }
        }
        None
    }

    /// Step distance between two territories through passable territory.
    #[must_use]
    pub fn distance<F>(&self, start: TerritoryId, end: TerritoryId, passable: F) -> Option<u32>
    where
        F: Fn(TerritoryId) -> bool,
    {
        self.best_route(start, end, false, passable)
            .map(|route| route.number_of_steps() as u32)
    }

    /// Every territory within `max_steps` of `start`, with its distance.
    #[must_use]
    pub fn within(&self, start: TerritoryId, max_steps: u32) -> BTreeMap<TerritoryId, u32> {
        let mut found = BTreeMap::new();
        if self.check(start).is_err() {
            return found;
        }
        found.insert(start, 0);
        let mut frontier = vec![start];
        for depth in 1..=max_steps {
            let mut next_frontier = Vec::new();
            for territory in frontier {
                for next in self.neighbors(territory) {
                    if let std::collections::btree_map::Entry::Vacant(entry) = found.entry(next) {
                        entry.insert(depth);
                        next_frontier.push(next);
                    }
                }
            }
            frontier = next_frontier;
        }
        found
    }
}

/// A node in the Dijkstra open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SearchNode {
    territory: TerritoryId,
    cost: u32,
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost; lower territory id wins ties.
        match other.cost.cmp(&self.cost) {
            Ordering::Equal => other.territory.cmp(&self.territory),
            ord => ord,
        }
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn reconstruct_route(
    came_from: &BTreeMap<TerritoryId, TerritoryId>,
    start: TerritoryId,
    end: TerritoryId,
) -> Route {
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        match came_from.get(&current) {
            Some(prev) => {
                path.push(*prev);
                current = *prev;
            }
            None => break,
        }
    }
    path.reverse();
    Route::new(path)
}

/// An ordered sequence of territories from start to end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    territories: Vec<TerritoryId>,
}

impl Route {
    /// Create a route. The first territory is the start.
    #[must_use]
    pub fn new(territories: Vec<TerritoryId>) -> Self {
        Self { territories }
    }

    /// Route from `start` through `steps`.
    #[must_use]
    pub fn from_steps(start: TerritoryId, steps: &[TerritoryId]) -> Self {
        let mut territories = Vec::with_capacity(steps.len() + 1);
        territories.push(start);
        territories.extend_from_slice(steps);
        Self { territories }
    }

    /// Start territory.
    ///
    /// # Panics
    /// Panics on an empty route, which [`Route::new`] callers never build.
    #[must_use]
    pub fn start(&self) -> TerritoryId {
        self.territories[0]
    }

    /// End territory.
    #[must_use]
    pub fn end(&self) -> TerritoryId {
        self.territories[self.territories.len() - 1]
    }

    /// Every territory including the start.
    #[must_use]
    pub fn territories(&self) -> &[TerritoryId] {
        &self.territories
    }

    /// Territories entered, i.e. everything after the start.
    #[must_use]
    pub fn steps(&self) -> &[TerritoryId] {
        self.territories.get(1..).unwrap_or(&[])
    }

    /// Territories strictly between start and end.
    #[must_use]
    pub fn middle(&self) -> &[TerritoryId] {
        if self.territories.len() < 3 {
            return &[];
        }
        &self.territories[1..self.territories.len() - 1]
    }

    /// Number of steps.
    #[must_use]
    pub fn number_of_steps(&self) -> usize {
        self.territories.len().saturating_sub(1)
    }

    /// Territory the route enters its end from.
    #[must_use]
    pub fn penultimate(&self) -> TerritoryId {
        if self.territories.len() < 2 {
            return self.start();
        }
        self.territories[self.territories.len() - 2]
    }

    /// Check whether the route enters a territory (start excluded).
    #[must_use]
    pub fn enters(&self, territory: TerritoryId) -> bool {
        self.steps().contains(&territory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, water: bool, movement_cost: u32) -> TerritoryInfo {
        TerritoryInfo {
            id: TerritoryId::new(id),
            name: format!("t{id}"),
            water,
            neutral: false,
            movement_cost,
            production: 0,
        }
    }

    /// 0 - 1 - 2
    /// |       |
    /// 3 ----- 4 (cost 3)
    fn diamond() -> GameMap {
        let mut map = GameMap::new(vec![
            info(0, false, 1),
            info(1, false, 1),
            info(2, false, 1),
            info(3, false, 1),
            info(4, false, 3),
        ]);
        let t = TerritoryId::new;
        map.connect(t(0), t(1)).unwrap();
        map.connect(t(1), t(2)).unwrap();
        map.connect(t(0), t(3)).unwrap();
        map.connect(t(3), t(4)).unwrap();
        map.connect(t(4), t(2)).unwrap();
        map
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let map = diamond();
        assert!(map.are_adjacent(TerritoryId::new(0), TerritoryId::new(1)));
        assert!(map.are_adjacent(TerritoryId::new(1), TerritoryId::new(0)));
        assert!(!map.are_adjacent(TerritoryId::new(0), TerritoryId::new(2)));
    }

    #[test]
    fn test_route_validity() {
        let map = diamond();
        let t = TerritoryId::new;
        assert!(map.is_valid_route(&Route::new(vec![t(0), t(1), t(2)])));
        assert!(!map.is_valid_route(&Route::new(vec![t(0), t(2)])));
        assert!(!map.is_valid_route(&Route::new(vec![t(0), t(9)])));
    }

    #[test]
    fn test_weighted_route_avoids_expensive_terrain() {
        let map = diamond();
        let t = TerritoryId::new;
        let route = map.best_route(t(3), t(2), true, |_| true).unwrap();
        assert_eq!(route.territories(), &[t(3), t(0), t(1), t(2)]);
        assert_eq!(map.land_route_cost(&route), 3);

        let direct = Route::new(vec![t(3), t(4), t(2)]);
        assert_eq!(map.land_route_cost(&direct), 4);
    }

    #[test]
    fn test_passable_filter() {
        let map = diamond();
        let t = TerritoryId::new;
        let blocked = t(1);
        let route = map.best_route(t(0), t(2), false, |x| x != blocked).unwrap();
        assert_eq!(route.territories(), &[t(0), t(3), t(4), t(2)]);
        assert!(map.best_route(t(0), t(1), false, |x| x != blocked).is_none());
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let map = diamond();
        let t = TerritoryId::new;
        let first = map.best_route(t(1), t(3), false, |_| true).unwrap();
        for _ in 0..10 {
            assert_eq!(map.best_route(t(1), t(3), false, |_| true).unwrap(), first);
        }
    }

    #[test]
    fn test_route_parts() {
        let t = TerritoryId::new;
        let route = Route::new(vec![t(0), t(1), t(2), t(3)]);
        assert_eq!(route.start(), t(0));
        assert_eq!(route.end(), t(3));
        assert_eq!(route.middle(), &[t(1), t(2)]);
        assert_eq!(route.penultimate(), t(2));
        assert_eq!(route.number_of_steps(), 3);
        assert!(route.enters(t(3)));
        assert!(!route.enters(t(0)));

        let stay = Route::new(vec![t(5)]);
        assert_eq!(stay.number_of_steps(), 0);
        assert!(stay.steps().is_empty());
    }

    #[test]
    fn test_within() {
        let map = diamond();
        let reach = map.within(TerritoryId::new(0), 1);
        assert_eq!(reach.len(), 3);
        assert_eq!(reach.get(&TerritoryId::new(1)), Some(&1));
    }
}
