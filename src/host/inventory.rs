//! Device inventory collaborator.
//!
//! Lights, groups and schedules are managed elsewhere; the full-state
//! snapshot only embeds them as-is.

use serde_json::{Map, Value};

pub trait Inventory: Send {
    fn lights(&self) -> Map<String, Value>;
    fn groups(&self) -> Map<String, Value>;
    fn schedules(&self) -> Map<String, Value>;
}

/// Inventory without devices.
#[derive(Debug, Default)]
pub struct EmptyInventory;

impl Inventory for EmptyInventory {
    fn lights(&self) -> Map<String, Value> {
        Map::new()
    }

    fn groups(&self) -> Map<String, Value> {
        Map::new()
    }

    fn schedules(&self) -> Map<String, Value> {
        Map::new()
    }
}
