// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Layout helpers shared by the weft crates.

#![no_std]

mod cache_line;

pub use cache_line::{CacheLineAligned, DESTRUCTIVE_INTERFERENCE_SIZE};
