//! API surfaces.

pub mod rest;
