use etl_core::{CoreError, Sector, SectorState};
use tracing::info;

/// Tracks one sector through its stages. Only forward, single-step moves
/// are accepted.
#[derive(Debug, Clone)]
pub struct SectorStateMachine {
    sector: Sector,
    state: SectorState,
}

impl SectorStateMachine {
    pub fn new(sector: Sector) -> Self {
        Self {
            sector,
            state: SectorState::Pending,
        }
    }

    pub fn state(&self) -> SectorState {
        self.state
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn advance(&mut self, to: SectorState) -> Result<(), CoreError> {
        if self.state.next() != Some(to) {
            return Err(CoreError::InvalidTransition {
                sector: self.sector.to_string(),
                from: self.state,
                to,
            });
        }

        info!("Sector {}: {} -> {}", self.sector, self.state, to);
        self.state = to;
        Ok(())
    }
}
