// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MIPS-I instruction model for PlayStation program analysis.
//!
//! The decoder here is *total*: any 32-bit word produces an [`Instr`], with
//! encodings the R3000A doesn't define collapsing to [`Opcode::Invalid`].
//! That property matters for the consumers of this crate, which walk entire
//! executable images and routinely hit data that merely looks like code.

pub mod gpr;
pub mod instr;

pub use instr::{
    asm::{Asm, Operand},
    Instr,
    Opcode,
};
