#![warn(
    nonstandard_style,
    rust_2018_idioms,
    future_incompatible,
    clippy::pedantic,
    clippy::todo
)]
#![allow(
    clippy::type_complexity,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::default_trait_access,
    clippy::module_name_repetitions
)]

//! The plugin layer around the synthesis engine.
//!
//! The [`controller::Controller`] receives host events and audio
//! callbacks, owns one [`instrument::Instrument`], bridges parameters
//! to an embedded editor through a pair of lock-free queues, and
//! persists state in a versioned little-endian format. The host-ABI
//! shim that embeds this layer lives outside this workspace; it talks
//! to the controller exclusively through [`events`] and the parameter
//! API.

pub mod controller;
pub mod editor;
pub mod events;
pub mod host;
pub mod instrument;
pub mod queue;
pub mod state;

/// There are no audio inputs; the single output bus is stereo.
pub const OUTPUT_BUS_NAME: &str = "Audio Output";

/// Reported processing latency, in samples.
pub const LATENCY: u32 = 0;
