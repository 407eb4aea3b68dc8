use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::TimingConfig;
use crate::errors::VenueError;
use crate::models::Position;
use crate::venue::{wait_for, ControlScope, VenueAdapter};

/// Steps of the two-stage close sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseStep {
    RequestClose,
    AwaitConfirmation,
    LocateConfirm,
    Confirm,
}

impl fmt::Display for CloseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseStep::RequestClose => "request close",
            CloseStep::AwaitConfirmation => "await confirmation dialog",
            CloseStep::LocateConfirm => "locate confirmation control",
            CloseStep::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{step} failed: {source}")]
pub struct CloseError {
    pub step: CloseStep,
    #[source]
    pub source: VenueError,
}

impl CloseError {
    fn at(step: CloseStep) -> impl FnOnce(VenueError) -> Self {
        move |source| Self { step, source }
    }
}

/// Closes every open position, one at a time
pub struct PositionCloser<'a, V: VenueAdapter + ?Sized> {
    venue: &'a V,
    timing: &'a TimingConfig,
}

impl<'a, V: VenueAdapter + ?Sized> PositionCloser<'a, V> {
    pub fn new(venue: &'a V, timing: &'a TimingConfig) -> Self {
        Self { venue, timing }
    }

    /// Close all positions, returning how many confirmations went through
    ///
    /// A failure aborts only the position it happened on.
    pub async fn close_all(&self, positions: &[Position]) -> usize {
        let mut closed = 0;

        for position in positions {
            match self.close_one(position).await {
                Ok(()) => closed += 1,
                Err(e) if e.source.is_not_found() => {
                    tracing::warn!("✗ {} position left open, venue did not show {}", position.side, e);
                }
                Err(e) => {
                    tracing::error!("✗ Could not close {} position: {}", position.side, e);
                }
            }
        }

        closed
    }

    /// Press close, wait for the dialog, then confirm with the inverse-side control
    pub async fn close_one(&self, position: &Position) -> Result<(), CloseError> {
        tracing::info!("Closing {} position (Step 1/2)...", position.side);
        self.venue
            .request_close(position)
            .await
            .map_err(CloseError::at(CloseStep::RequestClose))?;

        let dialog = wait_for(
            "confirmation dialog",
            self.timing.element_timeout(),
            self.timing.poll_interval(),
            || self.venue.confirmation_dialog(),
        )
        .await
        .map_err(CloseError::at(CloseStep::AwaitConfirmation))?;

        tracing::info!("Looking for confirmation control in dialog (Step 2/2)...");
        let wanted = position.side.close_confirmation_label();
        let confirm = self
            .venue
            .controls(ControlScope::Dialog(dialog))
            .await
            .and_then(|controls| {
                controls
                    .into_iter()
                    .find(|c| c.normalized_label().contains(wanted))
                    .ok_or_else(|| VenueError::NotFound(format!("\"{}\" confirmation control", wanted)))
            })
            .map_err(CloseError::at(CloseStep::LocateConfirm))?;

        tracing::info!("Found and clicking \"{}\" confirmation control.", wanted);
        self.venue
            .activate(confirm.id)
            .await
            .map_err(CloseError::at(CloseStep::Confirm))?;
        sleep(self.timing.close_settle()).await;

        Ok(())
    }
}
