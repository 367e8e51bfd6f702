//! Seeded initial placements for the built-in scenarios.
//!
//! Compasses are drawn from the scenario RNG so every run exercises the
//! local-to-global direction mapping, not just the identity orientation.

use amoebot_core::{
    AmoebotSystem, Compass, CoreError, Direction, GridPos, ParticleId, ParticleProgram,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// A random orientation: rotation offset and chirality.
pub fn random_compass(rng: &mut ChaCha8Rng) -> Compass {
    let offset = Direction::from_index(rng.gen_range(0..6)).expect("index in range");
    Compass::new(offset, rng.gen_bool(0.5))
}

/// Places `n` contracted particles in a line from the origin along
/// `global_dir`. The factory receives the particle index and the *local*
/// label of `global_dir` under the particle's randomly drawn compass.
pub fn line(
    system: &mut AmoebotSystem,
    n: usize,
    global_dir: Direction,
    rng: &mut ChaCha8Rng,
    mut make: impl FnMut(usize, Direction) -> Box<dyn ParticleProgram>,
) -> Result<Vec<ParticleId>, CoreError> {
    let mut ids = Vec::with_capacity(n);
    let mut cell = GridPos::ORIGIN;
    for index in 0..n {
        let compass = random_compass(rng);
        let local_dir = compass.to_local(global_dir);
        let id = system.add_particle(cell, compass, make(index, local_dir))?;
        ids.push(id);
        cell = cell.neighbor(global_dir);
    }
    Ok(ids)
}

/// Places `n` contracted particles in a hexagonal disc around the origin
/// (origin first, then concentric rings).
pub fn disc(
    system: &mut AmoebotSystem,
    n: usize,
    rng: &mut ChaCha8Rng,
    mut make: impl FnMut(usize) -> Box<dyn ParticleProgram>,
) -> Result<Vec<ParticleId>, CoreError> {
    let mut ids = Vec::with_capacity(n);
    for (index, cell) in disc_cells(n).into_iter().enumerate() {
        let compass = random_compass(rng);
        let id = system.add_particle(cell, compass, make(index))?;
        ids.push(id);
    }
    Ok(ids)
}

/// The first `n` cells of the hexagonal spiral around the origin.
pub fn disc_cells(n: usize) -> Vec<GridPos> {
    let mut cells = Vec::with_capacity(n);
    if n == 0 {
        return cells;
    }
    cells.push(GridPos::ORIGIN);

    let mut radius = 1;
    while cells.len() < n {
        // Enter the ring to the east, then walk its six sides.
        let mut cell = GridPos::new(radius, 0);
        for side in 0..6 {
            let dir = Direction::NorthWest.rotated(side);
            for _ in 0..radius {
                if cells.len() == n {
                    return cells;
                }
                cells.push(cell);
                cell = cell.neighbor(dir);
            }
        }
        radius += 1;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_disc_cells_are_distinct_and_adjacent_to_the_cluster() {
        let cells = disc_cells(19); // origin + ring 1 (6) + ring 2 (12)
        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), 19);
        // Every non-origin cell touches at least one earlier cell
        for (i, cell) in cells.iter().enumerate().skip(1) {
            assert!(
                cells[..i].iter().any(|c| c.is_adjacent_to(*cell)),
                "cell {} at {} is disconnected",
                i,
                cell
            );
        }
    }

    #[test]
    fn test_disc_cells_counts() {
        assert!(disc_cells(0).is_empty());
        assert_eq!(disc_cells(1).len(), 1);
        assert_eq!(disc_cells(7).len(), 7);
        assert_eq!(disc_cells(10).len(), 10);
    }
}
