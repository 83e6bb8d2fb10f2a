// SPDX-License-Identifier: Apache-2.0

//! Command line arguments and configuration loading for the binary.

pub mod args;
pub mod config;
