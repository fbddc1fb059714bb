//! Configuration helpers for the command-line interface

pub mod duration;
