//! Client message contract and routing.

mod events;
mod gateway;
mod hub;

pub use events::{ClientIntent, ServerEvent};
pub use gateway::Gateway;
pub use hub::Hub;
