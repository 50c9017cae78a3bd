// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handlers for `jr` instructions that do not return to the caller.
//!
//! A `jr` through anything other than `$ra` cannot be followed statically,
//! so each such site must be annotated with what the jump register holds.

/// Where a non-returning `jr` gets its target from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JrTarget {
    /// The jump register was loaded from a table of 32-bit code pointers
    /// starting at `table_addr` inside the executable image.
    JumpTable { table_addr: u32 },
    /// An opaque call through a function pointer, typically into the BIOS.
    BiosCall,
}

/// Associates one `jr` instruction (by its address) with its target kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JrInstHandler {
    pub inst_addr: u32,
    pub target: JrTarget,
}
