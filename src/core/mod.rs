//! Core decision machinery.
//!
//! Everything needed to describe a decision space, build piecewise-linear
//! objective functions over it and find their joint maximum lives here,
//! along with the shared primitives (errors, configuration, time, the info
//! buffer) the helm loop builds on.

pub mod compactor;
pub mod config;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod function;
pub mod grid;
pub mod info;
pub mod output;
pub mod piece;
pub mod reflector;
pub mod solver;
pub mod time;
pub mod zaic;
