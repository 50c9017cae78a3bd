// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Program elements: named, typed regions of the executable image.

use std::fmt::Write as _;

/// The scalar data types an element (or an array entry) may have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Int32,
    Uint32,
    Int16,
    Uint16,
    Int8,
    Uint8,
    Bool8,
    Char8,
    Ptr32,
}

impl ScalarKind {
    pub fn size_in_bytes(self) -> u32 {
        match self {
            Self::Int32 | Self::Uint32 | Self::Ptr32 => 4,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int8 | Self::Uint8 | Self::Bool8 | Self::Char8 => 1,
        }
    }

    /// The short lowercase name used in annotation files and default
    /// element names.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Int32 => "i32",
            Self::Uint32 => "u32",
            Self::Int16 => "i16",
            Self::Uint16 => "u16",
            Self::Int8 => "i8",
            Self::Uint8 => "u8",
            Self::Bool8 => "bool8",
            Self::Char8 => "char8",
            Self::Ptr32 => "ptr32",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        Some(match name {
            "i32" => Self::Int32,
            "u32" => Self::Uint32,
            "i16" => Self::Int16,
            "u16" => Self::Uint16,
            "i8" => Self::Int8,
            "u8" => Self::Uint8,
            "bool8" => Self::Bool8,
            "char8" => Self::Char8,
            "ptr32" => Self::Ptr32,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgElemKind {
    Function,
    Scalar(ScalarKind),
    Array(ScalarKind),
}

/// A categorized region of the program: a function or a piece of data.
///
/// The address range is half-open: `end_addr` is the first address past the
/// element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgElem {
    pub start_addr: u32,
    pub end_addr: u32,
    pub name: String,
    pub kind: ProgElemKind,
}

impl ProgElem {
    pub fn new(start_addr: u32, end_addr: u32, name: impl Into<String>, kind: ProgElemKind) -> Self {
        Self { start_addr, end_addr, name: name.into(), kind }
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.start_addr && addr < self.end_addr
    }

    pub fn is_function(&self) -> bool {
        self.kind == ProgElemKind::Function
    }

    /// The element's display name: the explicit name when one was given,
    /// otherwise a generated `unnamed_<kind>_<startaddr>` name.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }

        let prefix = match self.kind {
            ProgElemKind::Function => "unnamed_func_",
            ProgElemKind::Scalar(ScalarKind::Int32) => "unnamed_i32_",
            ProgElemKind::Scalar(ScalarKind::Uint32) => "unnamed_u32_",
            ProgElemKind::Scalar(ScalarKind::Int16) => "unnamed_i16_",
            ProgElemKind::Scalar(ScalarKind::Uint16) => "unnamed_u16_",
            ProgElemKind::Scalar(ScalarKind::Int8) => "unnamed_i8_",
            ProgElemKind::Scalar(ScalarKind::Uint8) => "unnamed_u8_",
            ProgElemKind::Scalar(ScalarKind::Bool8) => "unnamed_bool8_",
            ProgElemKind::Scalar(ScalarKind::Char8) => "unnamed_char8_",
            ProgElemKind::Scalar(ScalarKind::Ptr32) => "unnamed_ptr32_",
            ProgElemKind::Array(ScalarKind::Char8) => "unnamed_string_",
            ProgElemKind::Array(elem) => {
                return format!("unnamed_array_{}_{:#010x}", elem.short_name(), self.start_addr);
            }
        };

        format!("{}{:#010x}", prefix, self.start_addr)
    }

    /// How a reference to `addr` inside this element is rendered.
    ///
    /// Hits on the start address are just the name; arrays show the index of
    /// the referenced entry; anything else shows a `+ offset` with the full
    /// address in brackets.
    pub fn name_at_addr(&self, addr: u32) -> String {
        let mut text = self.display_name();

        if let ProgElemKind::Array(elem) = self.kind {
            let idx = addr.wrapping_sub(self.start_addr) / elem.size_in_bytes();
            let _ = write!(text, "[{}]", format_idx(idx));
            return text;
        }

        if addr != self.start_addr {
            let offset = addr.wrapping_sub(self.start_addr) as i32;
            if offset >= 0 {
                let _ = write!(text, " + {} ({:#010x})", format_idx(offset as u32), addr);
            } else {
                let _ = write!(text, " - {} ({:#010x})", format_idx(offset.unsigned_abs()), addr);
            }
        }

        text
    }
}

fn format_idx(value: u32) -> String {
    if value < 0x10 {
        format!("{}", value)
    } else {
        format!("{:#x}", value)
    }
}
