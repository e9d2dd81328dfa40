#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

pub mod constants;
pub mod dedup;
pub mod engine;
pub mod frame;
pub mod image;
pub mod payload;
pub mod routing;
pub mod types;
