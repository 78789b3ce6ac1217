pub mod addressible;
pub mod bios;
pub mod config;
pub mod cpu;
pub mod interconnect;
pub mod machine;
pub mod port_hint;
mod ram;
pub mod rsp;
mod scratchpad;
pub mod utils;
