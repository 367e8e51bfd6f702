//! Demo particle programs driving the built-in scenarios.
//!
//! These are deliberately small client algorithms: enough behavior to
//! exercise every engine surface (handovers, circuits, beeps, attributes)
//! without implementing a published protocol.

use amoebot_core::{
    CoreError, Direction, ParticleContext, ParticleProgram, PartitionSetId, Side,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Does nothing and never finishes.
pub struct Idle;

impl ParticleProgram for Idle {}

/// Marks bonds toward fixed local directions every movement phase without
/// ever moving, for a bounded number of rounds.
pub struct BondMarker {
    dirs: Vec<Direction>,
    rounds_left: u64,
}

impl BondMarker {
    pub fn new(dirs: Vec<Direction>, rounds: u64) -> Box<Self> {
        Box::new(Self {
            dirs,
            rounds_left: rounds,
        })
    }
}

impl ParticleProgram for BondMarker {
    fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        for &dir in &self.dirs {
            p.mark_bond(dir)?;
        }
        self.rounds_left = self.rounds_left.saturating_sub(1);
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.rounds_left == 0
    }
}

/// Caterpillar gait along one axis.
///
/// The front particle expands into empty space; every other particle pulls
/// itself forward by a handover with the expanded particle ahead of it. A
/// member counts a step each time it contracts and finishes after `goal`
/// steps.
pub struct ChainWalker {
    /// Local label of the march direction.
    forward: Direction,
    goal: u64,
    done: bool,
}

impl ChainWalker {
    pub fn new(forward: Direction, goal: u64) -> Box<Self> {
        Box::new(Self {
            forward,
            goal,
            done: false,
        })
    }
}

impl ParticleProgram for ChainWalker {
    fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        p.declare_attr("steps", 0u64)?;
        Ok(())
    }

    fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        let steps_h = p.declare_attr("steps", 0u64)?;
        let steps = p.read(&steps_h)?;
        let back = self.forward.opposite();

        if !p.is_expanded() {
            if steps >= self.goal {
                self.done = true;
                return Ok(());
            }
            match p.neighbor_is_expanded(self.forward) {
                // Front of the chain: march into empty space.
                None if !p.object_at(self.forward) => p.expand(self.forward)?,
                None => {}
                // The particle ahead is expanded; pull in behind it.
                Some(true) => {
                    p.mark_bond(self.forward)?;
                    p.expand(self.forward)?;
                }
                // Still contracted ahead: the wave has not reached us.
                Some(false) => {}
            }
        } else {
            match p.neighbor_is_expanded_on(Side::Tail, back) {
                // Contracted follower: joint handover this round.
                Some(false) => {
                    p.mark_bond_on(Side::Tail, back)?;
                    p.contract_tail()?;
                    p.write(&steps_h, steps + 1)?;
                }
                // Rear of the chain: contract freely.
                None => {
                    p.contract_tail()?;
                    p.write(&steps_h, steps + 1)?;
                }
                Some(true) => {}
            }
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

/// Global-circuit broadcast: one leader beeps once; everyone (leader
/// included) finishes as soon as it hears a beep.
pub struct Broadcaster {
    leader: bool,
    sent: bool,
    heard: bool,
}

impl Broadcaster {
    pub fn new(leader: bool) -> Box<Self> {
        Box::new(Self {
            leader,
            sent: false,
            heard: false,
        })
    }
}

impl ParticleProgram for Broadcaster {
    fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        p.declare_attr("heard", false)?;
        Ok(())
    }

    fn on_beep_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        if p.received_beep(PartitionSetId(0)) && !self.heard {
            self.heard = true;
            let h = p.declare_attr("heard", false)?;
            p.write(&h, true)?;
        }

        let mut cfg = p.pin_config();
        let global = cfg.global_set()?;
        if self.leader && !self.sent {
            self.sent = true;
            cfg.send_beep(global)?;
        }
        p.declare_config(cfg)?;
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.heard
    }
}

/// Issues random expansion/contraction requests; used to fuzz the movement
/// validator. Rounds that conflict are expected and counted by the runner.
pub struct RandomWalker {
    rng: ChaCha8Rng,
    expand_bias: f64,
}

impl RandomWalker {
    pub fn new(rng: ChaCha8Rng) -> Box<Self> {
        Box::new(Self {
            rng,
            expand_bias: 0.6,
        })
    }
}

impl ParticleProgram for RandomWalker {
    fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        if p.is_expanded() {
            if self.rng.gen_bool(0.5) {
                p.contract_head()?;
            } else {
                p.contract_tail()?;
            }
        } else if self.rng.gen_bool(self.expand_bias) {
            let dir = Direction::from_index(self.rng.gen_range(0..6)).expect("index in range");
            p.expand(dir)?;
        }
        Ok(())
    }
}
