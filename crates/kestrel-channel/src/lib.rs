//! Channels for Kestrel.
//!
//! A channel is a set of members, each with one [`Privilege`], plus a topic
//! and a set of pluggable modes. All of a channel's state sits behind one
//! lock so mode logic that must look at the whole membership ("is every
//! member secure?") decides on a consistent snapshot.
//!
//! # Key types
//!
//! - [`Channel`]: membership, fan-out, topic, mode application
//! - [`ChannelManager`]: creates/finds/reaps channels
//! - [`ChannelMode`]: the trait every mode implements
//! - [`mode::standard`]: the built-in mode catalogue
//! - [`Privilege`]: `Normal < Voice < Halfop < Op < Admin < Owner`

mod channel;
mod config;
mod error;
mod manager;
pub mod mode;
mod privilege;

pub use channel::{Channel, Departure, Member, ModeOptions, ModeOutcome, Topic};
pub use config::{default_auto_modes, AutoMode};
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use mode::{ChannelMode, ModeCategory, ModeChange, ModeDescriptor, ModeEffect, ModeValue};
pub use privilege::Privilege;
