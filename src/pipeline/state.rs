//! Pipeline lifecycle state machine
//!
//! ```text
//! Idle ─► Reading ─► Aggregating ─► Merging ─► Writing ─► Done
//!            │            │            │          │
//!            └────────────┴─────┬──────┴──────────┘
//!                               ▼
//!                             Failed
//! ```
//!
//! States are only ever entered once. `Done` and `Failed` are terminal.

use crate::error::{Result, TallyError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Reading,
    Aggregating,
    Merging,
    Writing,
    Done,
    Failed,
}

impl PipelineState {
    /// Pure: whether `next` may follow `self`
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Reading)
                | (Reading, Aggregating)
                | (Aggregating, Merging)
                | (Merging, Writing)
                | (Writing, Done)
                | (Reading | Aggregating | Merging | Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "Idle",
            PipelineState::Reading => "Reading",
            PipelineState::Aggregating => "Aggregating",
            PipelineState::Merging => "Merging",
            PipelineState::Writing => "Writing",
            PipelineState::Done => "Done",
            PipelineState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and every state visited
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            current: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }
}

impl StateMachine {
    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(TallyError::InvalidState {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed` if the current state allows it
    pub fn fail(&mut self) {
        if self.current.can_transition_to(PipelineState::Failed) {
            self.current = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
    }
}
