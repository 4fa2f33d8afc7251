//! The Batch Pipeline state machine: one enum value per named state,
//! exposed so the health endpoint and metrics can report "current state"
//! without re-deriving it from logs.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Planning,
    Fetching,
    Serializing,
    Uploading,
    Verifying,
    Deleting,
    Committing,
    Advancing,
    Aborting,
    /// Internal terminal state after a table's last batch returns empty.
    Drained,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Planning => "planning",
            PipelineState::Fetching => "fetching",
            PipelineState::Serializing => "serializing",
            PipelineState::Uploading => "uploading",
            PipelineState::Verifying => "verifying",
            PipelineState::Deleting => "deleting",
            PipelineState::Committing => "committing",
            PipelineState::Advancing => "advancing",
            PipelineState::Aborting => "aborting",
            PipelineState::Drained => "drained",
        };
        f.write_str(s)
    }
}
