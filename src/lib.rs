#![deny(dead_code)]
#![deny(unused_imports)]

pub mod borehole;
pub mod emulator;
pub mod kernel;
pub mod sampler;
