//! This crate implements the core of a calendar feed serving Campus Dual timetables as events.
//!
//! The timetables are read from <https://selfservice.campus-dual.de/room/json>.
//! Credentials that worked once are remembered, and a shared baseline schedule is refreshed in
//! the background.

pub use ical;

pub mod campus_client;
pub mod gateway;
pub mod model;
pub mod render;
pub mod scheduler;
pub mod store;
