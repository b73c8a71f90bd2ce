use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct NeighborInfo {
    pub id: String,
    pub cost: f64,
    pub last_seen: Option<f64>,
    pub is_active: bool,
}

/// Liveness table for the configured neighbors. A neighbor turns active on
/// its first hello and expires after a silence window; any traffic from it
/// refreshes `last_seen`.
#[derive(Debug, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<String, NeighborInfo>,
}

impl NeighborTable {
    pub fn new(costs: &BTreeMap<String, f64>) -> Self {
        let neighbors = costs
            .iter()
            .map(|(id, cost)| {
                (
                    id.clone(),
                    NeighborInfo {
                        id: id.clone(),
                        cost: *cost,
                        last_seen: None,
                        is_active: false,
                    },
                )
            })
            .collect();
        Self { neighbors }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.neighbors.contains_key(id)
    }

    pub fn cost(&self, id: &str) -> Option<f64> {
        self.neighbors.get(id).map(|neighbor| neighbor.cost)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.neighbors.keys()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.neighbors
            .values()
            .filter(|neighbor| neighbor.is_active)
            .map(|neighbor| neighbor.id.clone())
            .collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.neighbors
            .get(id)
            .is_some_and(|neighbor| neighbor.is_active)
    }

    /// Refresh `last_seen` without touching the active flag. Used for
    /// non-hello traffic; only hellos confirm a neighbor.
    pub fn touch(&mut self, id: &str, now: f64) -> bool {
        let Some(neighbor) = self.neighbors.get_mut(id) else {
            return false;
        };
        neighbor.last_seen = Some(now);
        true
    }

    /// Record a hello. Returns true when the neighbor just became active.
    pub fn confirm(&mut self, id: &str, now: f64) -> bool {
        let Some(neighbor) = self.neighbors.get_mut(id) else {
            return false;
        };
        let was_active = neighbor.is_active;
        neighbor.last_seen = Some(now);
        neighbor.is_active = true;
        !was_active
    }

    /// Expire active neighbors silent for longer than `dead_after`.
    /// Returns the ids that just expired.
    pub fn expire(&mut self, now: f64, dead_after: f64) -> Vec<String> {
        let mut expired = Vec::new();
        for (id, neighbor) in &mut self.neighbors {
            if !neighbor.is_active {
                continue;
            }
            let Some(last_seen) = neighbor.last_seen else {
                continue;
            };
            if (now - last_seen) > dead_after {
                neighbor.is_active = false;
                expired.push(id.clone());
            }
        }
        expired
    }
}
