//! Ovocoder core engine
//!
//! A multiband sidechain vocoder: the sidechain drives per-band envelope
//! followers which modulate the matching bands of the main signal.

pub mod domain;
