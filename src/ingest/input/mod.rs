// SPDX-License-Identifier: Apache-2.0

mod finder;
pub mod pattern;
mod tail;

pub use finder::FileFinder;
pub use pattern::{CompiledDescriptor, WatchDescriptor, classify, compile_all};
pub use tail::{DEFAULT_MAX_READ_BYTES, TailRead, read_new_lines};
