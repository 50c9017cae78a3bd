// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Output generation: the annotated disassembly listing and the pseudo-C++
//! rendition of the program's control flow.

mod commenter;
mod cpp;
mod listing;

use std::fmt;
use std::io;

pub use cpp::print_exe_cpp;
pub use listing::print_exe_listing;

#[derive(Debug)]
pub enum Error {
    /// An instruction reads the register an immediately preceding load
    /// writes. MIPS-I load delay slots are not modelled, so the output
    /// would be wrong.
    LoadDelayHazard { at: u32 },
    /// A branch or jump sits in the delay slot of another branch or jump.
    AdjacentControlTransfer { at: u32 },
    /// A `jr` through something other than `$ra` with no registered
    /// handler (or a handler pointing at something that is not a jump
    /// table).
    UnknownJrTarget { at: u32 },
    /// A function element whose address range is not word-aligned.
    MisalignedFunction { name: String },
    /// A data or array element whose address range does not line up with
    /// its scalar type.
    MisalignedElem { name: String },
    /// A program element lying outside the executable image.
    ElemOutOfRange { name: String },
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadDelayHazard { at } => {
                write!(f, "instruction at {:#010x} depends on the preceding delayed load", at)
            }
            Self::AdjacentControlTransfer { at } => {
                write!(
                    f,
                    "branch or jump at {:#010x} sits in the delay slot of another branch or jump",
                    at,
                )
            }
            Self::UnknownJrTarget { at } => {
                write!(f, "no handler for the jr instruction at {:#010x}", at)
            }
            Self::MisalignedFunction { name } => {
                write!(f, "function {} has a misaligned address range", name)
            }
            Self::MisalignedElem { name } => {
                write!(f, "element {} has an address range that does not match its type", name)
            }
            Self::ElemOutOfRange { name } => {
                write!(f, "program element {} lies outside the executable image", name)
            }
            Self::Io(err) => write!(f, "output error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Checks a program element against the image bounds; functions must be
/// word-aligned, data ranges must line up with their scalar type.
fn validate_elem(exe: &exegesis_exe::Exe, elem: &exegesis_exe::ProgElem) -> Result<(), Error> {
    if elem.end_addr <= elem.start_addr
        || elem.start_addr < exe.base_addr
        || elem.end_addr > exe.end_addr()
    {
        return Err(Error::ElemOutOfRange { name: elem.display_name() });
    }

    match elem.kind {
        exegesis_exe::ProgElemKind::Function => {
            if elem.start_addr % 4 != 0 || elem.end_addr % 4 != 0 {
                return Err(Error::MisalignedFunction { name: elem.display_name() });
            }
        }
        exegesis_exe::ProgElemKind::Scalar(kind) => {
            let size = kind.size_in_bytes();
            if elem.start_addr % size != 0 || elem.end_addr - elem.start_addr != size {
                return Err(Error::MisalignedElem { name: elem.display_name() });
            }
        }
        exegesis_exe::ProgElemKind::Array(kind) => {
            let size = kind.size_in_bytes();
            if elem.start_addr % size != 0 || elem.end_addr % size != 0 {
                return Err(Error::MisalignedElem { name: elem.display_name() });
            }
        }
    }

    Ok(())
}
