//! The eleven phases the turn resolver drives, one module each. Every phase
//! function takes the current state by reference and returns a new owned
//! state plus the log lines it produced; see [`crate::resolver`].

pub mod attrition;
pub mod combat;
pub mod construction;
pub mod diplomacy;
pub mod economy;
pub mod events;
pub mod healing;
pub mod movement;
pub mod muwardi;
pub mod recruitment;
pub mod research;
pub mod victory;
