pub mod bit_buffer;
pub mod commands;
pub mod config;
pub mod console;
pub mod crc;
pub mod emulation;
pub mod error;
pub mod session;
pub mod transceiver;
pub mod utils;
