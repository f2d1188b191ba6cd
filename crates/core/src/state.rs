#![forbid(unsafe_code)]

/// Pipeline stage of a chunk. Promotion walks strictly forward
/// (`seed -> watered -> sprouted`); `rejected` is a one-way exit from any
/// non-terminal stage and never transitions away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Seed,
    Watered,
    Sprouted,
    Rejected,
}

impl ChunkState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkState::Seed => "seed",
            ChunkState::Watered => "watered",
            ChunkState::Sprouted => "sprouted",
            ChunkState::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StateParseError> {
        match value {
            "seed" => Ok(ChunkState::Seed),
            "watered" => Ok(ChunkState::Watered),
            "sprouted" => Ok(ChunkState::Sprouted),
            "rejected" => Ok(ChunkState::Rejected),
            _ => Err(StateParseError::Unknown),
        }
    }

    /// Next stage for a `promote` decision, or `None` when the state machine
    /// has no forward edge (`sprouted` and `rejected`).
    pub fn promoted(self) -> Option<ChunkState> {
        match self {
            ChunkState::Seed => Some(ChunkState::Watered),
            ChunkState::Watered => Some(ChunkState::Sprouted),
            ChunkState::Sprouted | ChunkState::Rejected => None,
        }
    }

    /// A `reject` decision is legal from any live stage, including
    /// `sprouted` (late audit). `rejected` itself is handled as an
    /// idempotent no-op by the ledger, not as a transition.
    pub fn rejectable(self) -> bool {
        !matches!(self, ChunkState::Rejected)
    }

    /// Position along the promotion track, used for at-least-this-stage
    /// filters. `rejected` is off the track and has no position.
    pub fn stage(self) -> Option<u8> {
        match self {
            ChunkState::Seed => Some(0),
            ChunkState::Watered => Some(1),
            ChunkState::Sprouted => Some(2),
            ChunkState::Rejected => None,
        }
    }
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateParseError {
    Unknown,
}

/// Reviewer verdict applied by `mark_reviewed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Promote,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewDecision::Promote => "promote",
            ReviewDecision::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StateParseError> {
        match value {
            "promote" => Ok(ReviewDecision::Promote),
            "reject" => Ok(ReviewDecision::Reject),
            _ => Err(StateParseError::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_walks_forward_one_step() {
        assert_eq!(ChunkState::Seed.promoted(), Some(ChunkState::Watered));
        assert_eq!(ChunkState::Watered.promoted(), Some(ChunkState::Sprouted));
        assert_eq!(ChunkState::Sprouted.promoted(), None);
        assert_eq!(ChunkState::Rejected.promoted(), None);
    }

    #[test]
    fn rejection_is_legal_from_every_live_stage() {
        assert!(ChunkState::Seed.rejectable());
        assert!(ChunkState::Watered.rejectable());
        assert!(ChunkState::Sprouted.rejectable());
        assert!(!ChunkState::Rejected.rejectable());
    }

    #[test]
    fn stages_order_the_promotion_track() {
        assert!(ChunkState::Seed.stage() < ChunkState::Watered.stage());
        assert!(ChunkState::Watered.stage() < ChunkState::Sprouted.stage());
        assert_eq!(ChunkState::Rejected.stage(), None);
    }

    #[test]
    fn parse_round_trips() {
        for state in [
            ChunkState::Seed,
            ChunkState::Watered,
            ChunkState::Sprouted,
            ChunkState::Rejected,
        ] {
            assert_eq!(ChunkState::parse(state.as_str()), Ok(state));
        }
        assert_eq!(ChunkState::parse("germinated"), Err(StateParseError::Unknown));
    }

    #[test]
    fn decision_parse() {
        assert_eq!(ReviewDecision::parse("promote"), Ok(ReviewDecision::Promote));
        assert_eq!(ReviewDecision::parse("reject"), Ok(ReviewDecision::Reject));
        assert!(ReviewDecision::parse("approve").is_err());
    }
}
