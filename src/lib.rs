// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host launcher library for the vmshare 9P2000.L share server.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Host-side plumbing around [`share_door`]: configuration loading and the
//! Unix socket transport used by the `vmshare` binary.

pub mod config;
pub mod transport;

pub use config::{ConfigError, ShareConfig};
pub use share_door::{ServerOptions, ShareDoor, ShareDoorError};
