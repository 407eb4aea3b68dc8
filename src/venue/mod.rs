//! Venue adapter boundary.
//!
//! The core never touches the venue directly. It reads snapshots and drives
//! stepwise UI sequences through [`VenueAdapter`]. Adapters report what is on
//! screen (controls and their labels, fields, dialogs); the decision of which
//! control to press lives in the core.

pub mod paper;
pub mod wait;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::VenueError;
use crate::models::{IndicatorReading, Order, Position};

pub use paper::{PaperFaults, PaperVenue, PaperVenueConfig, VenueEvent};
pub use wait::wait_for;

/// Opaque id of a clickable control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ControlId(pub u64);

/// Opaque id of a confirmation dialog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DialogId(pub u64);

/// Opaque id of a text entry field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldId(pub u64);

/// A control as currently shown by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Control {
    pub id: ControlId,
    pub label: String,
    pub enabled: bool,
    /// Lives inside a tabular listing (row-level action)
    pub in_table: bool,
}

impl Control {
    /// Label trimmed and upper-cased for matching
    pub fn normalized_label(&self) -> String {
        self.label.trim().to_uppercase()
    }
}

/// Where to look for controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScope {
    /// Anywhere on the page, including tables
    Page,
    /// Only inside the given dialog
    Dialog(DialogId),
}

/// Order-entry fields revealed by the limit control
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntryField {
    Price,
    Quantity,
}

impl EntryField {
    pub fn name(self) -> &'static str {
        match self {
            EntryField::Price => "price field",
            EntryField::Quantity => "quantity field",
        }
    }
}

/// Read and mutate access to one trading venue
///
/// Reads return snapshots; nothing is tracked across calls. Mutations are
/// single UI steps. No method retries on its own.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Current market price; an error when absent or not numeric
    async fn read_current_price(&self) -> Result<f64, VenueError>;

    /// Chart indicator values, individually optional
    async fn read_indicators(&self) -> Result<IndicatorReading, VenueError>;

    async fn read_open_orders(&self) -> Result<Vec<Order>, VenueError>;

    async fn read_open_positions(&self) -> Result<Vec<Position>, VenueError>;

    /// Press the cancel action of a resting order
    async fn cancel_order(&self, order: &Order) -> Result<(), VenueError>;

    /// Press the close action of a position, opening its confirmation dialog
    async fn request_close(&self, position: &Position) -> Result<(), VenueError>;

    /// The confirmation dialog currently shown, if any
    async fn confirmation_dialog(&self) -> Result<Option<DialogId>, VenueError>;

    /// Controls currently shown within `scope`, in on-screen order
    async fn controls(&self, scope: ControlScope) -> Result<Vec<Control>, VenueError>;

    async fn activate(&self, control: ControlId) -> Result<(), VenueError>;

    /// Locate an order-entry field if it is shown
    async fn entry_field(&self, field: EntryField) -> Result<Option<FieldId>, VenueError>;

    /// Replace the contents of an entry field
    async fn write_field(&self, field: FieldId, value: &str) -> Result<(), VenueError>;
}
