//! Circuit construction and beep propagation.
//!
//! Once per communication phase the scheduler hands every particle's
//! declared pin grouping (or the all-singleton default) to this module. The
//! builder forms a graph whose nodes are (particle, partition set) pairs:
//! pins grouped into the same set are one node, and pins facing each other
//! across a bonded shared edge link their nodes. Each connected component is
//! a circuit; a circuit carries a beep if any member set sent one, and the
//! result is written back as every member's received flag.
//!
//! Components are found with union-find, keeping the whole pass linear in
//! the total pin count.

use crate::grid::{Compass, Direction, GridPos, DIRECTION_COUNT};
use crate::particle::{Body, BondMark, EdgeRef, ParticleId, Side};
use crate::pins::PinConfiguration;

use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// UNION-FIND
// ============================================================================

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cursor = node;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

// ============================================================================
// INPUTS / OUTPUTS
// ============================================================================

/// One particle's contribution to the round's circuit graph.
pub(crate) struct CircuitInput<'a> {
    pub id: ParticleId,
    pub body: Body,
    pub compass: Compass,
    pub bonds: &'a HashMap<EdgeRef, BondMark>,
    /// Declared grouping, or `None` for the all-singleton default.
    pub config: Option<&'a PinConfiguration>,
}

/// Result of one propagation pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct BeepResults {
    /// Received flags per particle, indexed by resolved set (declared sets
    /// first, then implicit singletons).
    pub received: HashMap<ParticleId, Vec<bool>>,

    /// Number of distinct circuits this round.
    pub circuit_count: usize,

    /// Number of partition sets that sent a beep.
    pub beeps_sent: usize,

    /// Number of partition sets that received a beep.
    pub sets_received: usize,
}

// ============================================================================
// BUILD + PROPAGATE
// ============================================================================

fn pin_key(side: Side, dir: Direction, offset: u8, pin_count: u8) -> usize {
    let side_index = match side {
        Side::Head => 0,
        Side::Tail => 1,
    };
    (side_index * DIRECTION_COUNT + dir.index()) * pin_count as usize + offset as usize
}

/// Builds the round's circuits and propagates beeps.
pub(crate) fn propagate(pin_count: u8, inputs: &[CircuitInput<'_>]) -> BeepResults {
    let pins_per_particle = 2 * DIRECTION_COUNT * pin_count as usize;

    // Resolve every particle's grouping into concrete set lists and map each
    // globally-addressed pin to its node id.
    let mut node_of_pin: Vec<Vec<Option<usize>>> = Vec::with_capacity(inputs.len());
    let mut set_base: Vec<usize> = Vec::with_capacity(inputs.len());
    let mut sends: Vec<bool> = Vec::new();
    let mut set_counts: Vec<usize> = Vec::with_capacity(inputs.len());

    for input in inputs {
        let default_config;
        let config = match input.config {
            Some(cfg) => cfg,
            None => {
                let tail_dir_local = input
                    .body
                    .tail_direction()
                    .map(|d| input.compass.to_local(d));
                default_config = PinConfiguration::new(pin_count, input.body, tail_dir_local);
                &default_config
            }
        };

        let sets = config.resolved_sets();
        let base = sends.len();
        set_base.push(base);
        set_counts.push(sets.len());

        let mut pin_map = vec![None; pins_per_particle];
        for (set_index, set) in sets.iter().enumerate() {
            for pin in &set.pins {
                let global_dir = input.compass.to_global(pin.dir);
                let global_offset = if input.compass.is_flipped() {
                    pin_count - 1 - pin.offset
                } else {
                    pin.offset
                };
                let key = pin_key(pin.side, global_dir, global_offset, pin_count);
                debug_assert!(pin_map[key].is_none(), "pin resolved into two sets");
                pin_map[key] = Some(base + set_index);
            }
            sends.push(set.send);
        }
        node_of_pin.push(pin_map);
    }

    // Link pins facing each other across bonded shared edges.
    let mut cell_owner: HashMap<GridPos, usize> = HashMap::new();
    for (index, input) in inputs.iter().enumerate() {
        for cell in input.body.cells() {
            cell_owner.insert(cell, index);
        }
    }

    let mut dsu = UnionFind::new(sends.len());
    for (index, input) in inputs.iter().enumerate() {
        for (edge, facing_cell) in input.body.edges() {
            let Some(&other_index) = cell_owner.get(&facing_cell) else {
                continue;
            };
            if other_index == index {
                continue;
            }
            let other = &inputs[other_index];
            let other_side = other
                .body
                .side_at(facing_cell)
                .expect("cell owner occupies the facing cell");
            let other_edge = EdgeRef::new(other_side, edge.dir.opposite());

            // A released bond severs the shared edge for circuits too.
            let released = input.bonds.get(&edge).copied() == Some(BondMark::Released)
                || other.bonds.get(&other_edge).copied() == Some(BondMark::Released);
            if released {
                continue;
            }

            for offset in 0..pin_count {
                let mine = node_of_pin[index][pin_key(edge.side, edge.dir, offset, pin_count)];
                // Pin k meets the neighbor's pin P-1-k on the shared edge.
                let theirs = node_of_pin[other_index][pin_key(
                    other_edge.side,
                    other_edge.dir,
                    pin_count - 1 - offset,
                    pin_count,
                )];
                if let (Some(a), Some(b)) = (mine, theirs) {
                    dsu.union(a, b);
                }
            }
        }
    }

    // One beep per circuit: OR of the member sends.
    let mut circuit_beep: HashMap<usize, bool> = HashMap::new();
    for node in 0..sends.len() {
        let root = dsu.find(node);
        *circuit_beep.entry(root).or_insert(false) |= sends[node];
    }

    let mut results = BeepResults {
        circuit_count: circuit_beep.len(),
        beeps_sent: sends.iter().filter(|&&s| s).count(),
        ..Default::default()
    };

    for (index, input) in inputs.iter().enumerate() {
        let base = set_base[index];
        let flags: Vec<bool> = (0..set_counts[index])
            .map(|s| {
                let root = dsu.find(base + s);
                circuit_beep[&root]
            })
            .collect();
        results.sets_received += flags.iter().filter(|&&f| f).count();
        results.received.insert(input.id, flags);
    }

    debug!(
        circuits = results.circuit_count,
        sent = results.beeps_sent,
        received = results.sets_received,
        "beep propagation complete"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::Pin;

    struct Fixture {
        bodies: Vec<Body>,
        compasses: Vec<Compass>,
        bonds: Vec<HashMap<EdgeRef, BondMark>>,
        configs: Vec<Option<PinConfiguration>>,
    }

    impl Fixture {
        fn contracted_line(n: usize) -> Self {
            Self {
                bodies: (0..n)
                    .map(|i| Body::contracted(GridPos::new(i as i32, 0)))
                    .collect(),
                compasses: vec![Compass::identity(); n],
                bonds: vec![HashMap::new(); n],
                configs: vec![None; n],
            }
        }

        fn config(&mut self, index: usize, pin_count: u8) -> &mut PinConfiguration {
            let tail_dir = self.bodies[index].tail_direction();
            self.configs[index] = Some(PinConfiguration::new(
                pin_count,
                self.bodies[index],
                tail_dir,
            ));
            self.configs[index].as_mut().unwrap()
        }

        fn run(&self, pin_count: u8) -> BeepResults {
            let inputs: Vec<CircuitInput<'_>> = (0..self.bodies.len())
                .map(|i| CircuitInput {
                    id: ParticleId::from_seed(i as u64),
                    body: self.bodies[i],
                    compass: self.compasses[i],
                    bonds: &self.bonds[i],
                    config: self.configs[i].as_ref(),
                })
                .collect();
            propagate(pin_count, &inputs)
        }
    }

    #[test]
    fn test_singleton_echoes_own_send() {
        let mut fx = Fixture::contracted_line(1);
        let cfg = fx.config(0, 1);
        let ps = cfg.make_set(&[Pin::new(Direction::East, 0)]).unwrap();
        cfg.send_beep(ps).unwrap();

        let results = fx.run(1);
        let flags = &results.received[&ParticleId::from_seed(0)];
        assert!(flags[0], "an isolated set hears its own beep");
        assert_eq!(results.beeps_sent, 1);
    }

    #[test]
    fn test_global_circuit_spans_bonded_pair() {
        let mut fx = Fixture::contracted_line(2);
        let cfg = fx.config(0, 2);
        let ps = cfg.global_set().unwrap();
        cfg.send_beep(ps).unwrap();
        fx.config(1, 2).global_set().unwrap();

        let results = fx.run(2);
        assert!(results.received[&ParticleId::from_seed(0)][0]);
        assert!(results.received[&ParticleId::from_seed(1)][0]);
        assert_eq!(results.circuit_count, 1);
    }

    #[test]
    fn test_silent_circuit_receives_nothing() {
        let mut fx = Fixture::contracted_line(2);
        fx.config(0, 2).global_set().unwrap();
        fx.config(1, 2).global_set().unwrap();

        let results = fx.run(2);
        assert!(!results.received[&ParticleId::from_seed(0)][0]);
        assert!(!results.received[&ParticleId::from_seed(1)][0]);
        assert_eq!(results.beeps_sent, 0);
    }

    #[test]
    fn test_released_bond_severs_circuit() {
        let mut fx = Fixture::contracted_line(2);
        let cfg = fx.config(0, 1);
        let ps = cfg.global_set().unwrap();
        cfg.send_beep(ps).unwrap();
        fx.config(1, 1).global_set().unwrap();
        // Particle 1 releases the bond toward particle 0
        fx.bonds[1].insert(
            EdgeRef::new(Side::Head, Direction::West),
            BondMark::Released,
        );

        let results = fx.run(1);
        assert!(results.received[&ParticleId::from_seed(0)][0]);
        assert!(!results.received[&ParticleId::from_seed(1)][0]);
        assert_eq!(results.circuit_count, 2);
    }

    #[test]
    fn test_lane_sets_form_disjoint_wires() {
        // Three-particle line, two lanes; a beep on lane 0 must not leak to
        // lane 1.
        let mut fx = Fixture::contracted_line(3);
        for i in 0..3 {
            let cfg = fx.config(i, 2);
            let lane0 = cfg.lane_set(Direction::East, 0).unwrap();
            cfg.lane_set(Direction::East, 1).unwrap();
            if i == 0 {
                cfg.send_beep(lane0).unwrap();
            }
        }

        let results = fx.run(2);
        for i in 0..3 {
            let flags = &results.received[&ParticleId::from_seed(i)];
            assert!(flags[0], "lane 0 carries the beep to particle {}", i);
            assert!(!flags[1], "lane 1 stays silent on particle {}", i);
        }
    }

    #[test]
    fn test_rotated_compass_still_links() {
        let mut fx = Fixture::contracted_line(2);
        fx.compasses[1] = Compass::new(Direction::NorthWest, false);
        let cfg = fx.config(0, 2);
        let ps = cfg.global_set().unwrap();
        cfg.send_beep(ps).unwrap();
        fx.config(1, 2).global_set().unwrap();

        let results = fx.run(2);
        assert!(results.received[&ParticleId::from_seed(1)][0]);
        assert_eq!(results.circuit_count, 1);
    }

    #[test]
    fn test_expanded_particle_bridges_circuit() {
        // Particle 1 is expanded across cells (1,0)-(2,0); contracted
        // particles sit at (0,0) and (3,0). One global circuit.
        let mut fx = Fixture::contracted_line(3);
        fx.bodies[1] = Body::expanded(GridPos::new(2, 0), GridPos::new(1, 0));
        fx.bodies[2] = Body::contracted(GridPos::new(3, 0));

        let cfg = fx.config(0, 1);
        let ps = cfg.global_set().unwrap();
        cfg.send_beep(ps).unwrap();
        fx.config(1, 1).global_set().unwrap();
        fx.config(2, 1).global_set().unwrap();

        let results = fx.run(1);
        for i in 0..3 {
            assert!(results.received[&ParticleId::from_seed(i)][0]);
        }
        assert_eq!(results.circuit_count, 1);
    }

    #[test]
    fn test_global_circuit_scales_to_fifty_particles() {
        let mut fx = Fixture::contracted_line(50);
        for i in 0..50 {
            let cfg = fx.config(i, 2);
            let ps = cfg.global_set().unwrap();
            if i == 49 {
                cfg.send_beep(ps).unwrap();
            }
        }

        let results = fx.run(2);
        assert_eq!(results.circuit_count, 1);
        for i in 0..50 {
            assert!(
                results.received[&ParticleId::from_seed(i)][0],
                "particle {} missed the broadcast",
                i
            );
        }
    }

    #[test]
    fn test_default_config_is_all_singletons() {
        let fx = Fixture::contracted_line(2);
        let results = fx.run(2);
        // Each particle contributes 12 singleton sets; the 2 pin pairs on
        // the shared edge merge pairwise: 24 - 2 = 22 circuits.
        assert_eq!(results.circuit_count, 22);
    }
}
