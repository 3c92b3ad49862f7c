//! Report formatting: colored terminal lines and structured JSON.

pub mod json;
pub mod terminal;
