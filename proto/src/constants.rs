//! Defaults and bounds shared between the server and client CLIs, lifted
//! from `original_source/helper.h` (`TIMEOUT_DEFAULT`, `TIMEOUT_MAX`,
//! `PORT_MAX`) and `original_source/netstore-server.cc`
//! (`MAX_SPACE_DEFAULT`).

pub const TIMEOUT_DEFAULT: u32 = 5;
pub const TIMEOUT_MIN: u32 = 1;
pub const TIMEOUT_MAX: u32 = 300;

pub const PORT_MIN: u32 = 1;
pub const PORT_MAX: u32 = 65535;

pub const MAX_SPACE_DEFAULT: i64 = 52_428_800;
