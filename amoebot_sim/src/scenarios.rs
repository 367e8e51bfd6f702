//! Built-in engine-property scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: marked bonds, no requests, geometry must not change
    NoOpRound,

    /// SIM-002: caterpillar chain advances by handovers
    ChainMarch,

    /// SIM-003: one beep reaches the whole connected system, one round late
    Broadcast,

    /// SIM-004: an isolated partition set echoes its own beep
    SingletonEcho,

    /// SIM-005: randomized requests; occupancy stays sound through conflicts
    RandomWalk,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::NoOpRound,
            ScenarioId::ChainMarch,
            ScenarioId::Broadcast,
            ScenarioId::SingletonEcho,
            ScenarioId::RandomWalk,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::NoOpRound => "noop_round",
            ScenarioId::ChainMarch => "chain_march",
            ScenarioId::Broadcast => "broadcast",
            ScenarioId::SingletonEcho => "singleton_echo",
            ScenarioId::RandomWalk => "random_walk",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::NoOpRound => "3-particle line, one-sided marks, idempotent round",
            ScenarioId::ChainMarch => "N bonded particles march by push/pull handovers",
            ScenarioId::Broadcast => "global circuit, 1 sender, disconnected particle stays silent",
            ScenarioId::SingletonEcho => "singleton circuit returns its own beep next round",
            ScenarioId::RandomWalk => "fuzzed movement requests, invariants audited every round",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "noop_round" | "noop" | "sim-001" => Ok(ScenarioId::NoOpRound),
            "chain_march" | "chainmarch" | "sim-002" => Ok(ScenarioId::ChainMarch),
            "broadcast" | "sim-003" => Ok(ScenarioId::Broadcast),
            "singleton_echo" | "echo" | "sim-004" => Ok(ScenarioId::SingletonEcho),
            "random_walk" | "randomwalk" | "sim-005" => Ok(ScenarioId::RandomWalk),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert!("nonsense".parse::<ScenarioId>().is_err());
    }
}
