// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The annotated disassembly listing.

use std::io::Write;

use exegesis_exe::{Exe, ExeWord, ProgElem, ProgElemKind, ScalarKind};
use exegesis_mips::Instr;

use crate::Error;

const BANNER_RULE: &str =
    ";-----------------------------------------------------------------------------------------------------------------------";

/// Prints the whole program: function elements as annotated disassembly,
/// data and array elements as typed values, the gaps between elements as
/// raw data dumps with attempted decodes.
///
/// [`Exe::determine_word_references`] should have run first, otherwise the
/// reference flag column is empty.
pub fn print_exe_listing(exe: &Exe, out: &mut impl Write) -> Result<(), Error> {
    for elem in exe.prog_elems() {
        crate::validate_elem(exe, elem)?;
    }

    let num_prog_bytes = (exe.words.len() as u32) * 4;
    let mut byte_idx = 0u32;
    let mut elem_idx = 0usize;

    while byte_idx < num_prog_bytes {
        // At (or past due) a program element? Print it and skip over it.
        if let Some(elem) = exe.prog_elems().get(elem_idx) {
            let addr = exe.base_addr + byte_idx;

            if elem.contains_addr(addr) || elem.end_addr <= addr {
                match elem.kind {
                    ProgElemKind::Function => print_function(exe, elem, out)?,
                    ProgElemKind::Scalar(kind) => print_scalar(exe, elem, kind, out)?,
                    ProgElemKind::Array(kind) => print_array(exe, elem, kind, out)?,
                }
                elem_idx += 1;

                if elem.end_addr > exe.base_addr {
                    byte_idx = byte_idx.max(elem.end_addr - exe.base_addr);
                }
                continue;
            }
        }

        // In a gap: dump up to the next element (or the end of the image).
        let end_byte_idx = match exe.prog_elems().get(elem_idx) {
            Some(elem) => (byte_idx + 1).max(elem.start_addr - exe.base_addr),
            None => num_prog_bytes,
        };

        print_uncategorized_region(exe, byte_idx, end_byte_idx, out)?;
        byte_idx = end_byte_idx;
    }

    Ok(())
}

fn print_function(exe: &Exe, elem: &ProgElem, out: &mut impl Write) -> Result<(), Error> {
    writeln!(out, "{}", BANNER_RULE)?;
    writeln!(
        out,
        "; FUNC: {}    ({:08x}-{:08x})",
        elem.display_name(),
        elem.start_addr,
        elem.end_addr - 1,
    )?;
    writeln!(out, "{}", BANNER_RULE)?;

    let start_word_idx = (elem.start_addr - exe.base_addr) / 4;
    let end_word_idx = (elem.end_addr - exe.base_addr) / 4;

    for word_idx in start_word_idx..end_word_idx {
        let at = exe.base_addr + word_idx * 4;
        let word = exe.words[word_idx as usize];

        write!(out, "{:08x}:", at)?;
        write_word_refs(&word, Some(elem), out)?;
        write_instr(word.value, at, out)?;
        writeln!(out)?;
    }
    writeln!(out)?;

    Ok(())
}

/// The reference column: which flags apply to this word. `E` marks a word
/// with referencers outside the containing function.
fn write_word_refs(word: &ExeWord, inside_func: Option<&ProgElem>, out: &mut impl Write) -> Result<(), Error> {
    if !word.is_referenced() {
        write!(out, "{:14}", "")?;
        return Ok(());
    }

    let mut flags = String::new();
    if word.is_jump_target {
        flags.push('J');
    }
    if word.is_branch_target {
        flags.push('B');
    }
    if word.is_data_referenced {
        flags.push('R');
    }

    if let (Some(func), Some((lo, hi))) = (inside_func, word.referencing_range) {
        if lo != hi && !(lo >= func.start_addr && hi <= func.end_addr) {
            flags.push('E');
        }
    }

    write!(out, " <- {:4}      ", flags)?;
    Ok(())
}

fn print_scalar(exe: &Exe, elem: &ProgElem, kind: ScalarKind, out: &mut impl Write) -> Result<(), Error> {
    write!(out, "{:08x}:    {} {} = ", elem.start_addr, kind.short_name(), elem.display_name())?;

    let value = elem_value(exe, elem.start_addr, kind);
    if kind == ScalarKind::Char8 {
        writeln!(out, "'{}'", escaped_char(value as u8))?;
    } else {
        write_scalar_value(exe, kind, value, out)?;
        writeln!(out)?;
    }

    Ok(())
}

fn print_array(exe: &Exe, elem: &ProgElem, kind: ScalarKind, out: &mut impl Write) -> Result<(), Error> {
    let size = kind.size_in_bytes();
    let count = (elem.end_addr - elem.start_addr) / size;
    let type_name = if kind == ScalarKind::Char8 { "string8" } else { kind.short_name() };

    write!(
        out,
        "{:08x}:    {}[{}] {}",
        elem.start_addr,
        type_name,
        format_count(count),
        elem.display_name(),
    )?;

    let entry_addrs = (elem.start_addr..elem.end_addr).step_by(size as usize);

    if kind == ScalarKind::Char8 {
        write!(out, " = \"")?;
        for addr in entry_addrs {
            write!(out, "{}", escaped_char(elem_value(exe, addr, kind) as u8))?;
        }
        writeln!(out, "\"")?;
    } else {
        write!(out, " = {{ ")?;
        for (idx, addr) in entry_addrs.enumerate() {
            if idx > 0 {
                write!(out, ", ")?;
            }
            write_scalar_value(exe, kind, elem_value(exe, addr, kind), out)?;
        }
        writeln!(out, " }}")?;
    }

    Ok(())
}

/// Reads the (possibly sub-word) value at `addr`. The element range was
/// validated up front, so the address is aligned to the scalar size.
fn elem_value(exe: &Exe, addr: u32, kind: ScalarKind) -> u32 {
    let word = exe.words[((addr - exe.base_addr) / 4) as usize].value;

    match kind.size_in_bytes() {
        4 => word,
        2 => (word >> (8 * (addr % 4))) & 0xFFFF,
        _ => (word >> (8 * (addr % 4))) & 0xFF,
    }
}

fn write_scalar_value(exe: &Exe, kind: ScalarKind, value: u32, out: &mut impl Write) -> Result<(), Error> {
    match kind {
        ScalarKind::Int32 => write!(out, "{}", signed_hex(value as i32))?,
        ScalarKind::Int16 => write!(out, "{}", signed_hex(i32::from(value as u16 as i16)))?,
        ScalarKind::Int8 | ScalarKind::Char8 => write!(out, "{}", signed_hex(i32::from(value as u8 as i8)))?,
        ScalarKind::Uint32 | ScalarKind::Uint16 | ScalarKind::Uint8 => write!(out, "{:#x}", value)?,
        ScalarKind::Bool8 => write!(out, "{}", value != 0)?,
        ScalarKind::Ptr32 => write!(out, "{}", exe.name_at_addr(value))?,
    }

    Ok(())
}

fn signed_hex(value: i32) -> String {
    if value < 0 {
        format!("-{:#x}", i64::from(value).unsigned_abs())
    } else {
        format!("{:#x}", value)
    }
}

fn escaped_char(byte: u8) -> String {
    match byte {
        0 => "\\0".into(),
        b'\t' => "\\t".into(),
        b'\n' => "\\n".into(),
        b'\r' => "\\r".into(),
        b'\'' => "\\'".into(),
        b'"' => "\\\"".into(),
        b'\\' => "\\\\".into(),
        32..=126 => (byte as char).to_string(),
        _ => format!("\\x{:02x}", byte),
    }
}

fn format_count(value: u32) -> String {
    if value < 0x10 {
        format!("{}", value)
    } else {
        format!("{:#x}", value)
    }
}

/// One decoded instruction: NOPs collapse to `nop`, everything that is not
/// a branch or jump is indented so control transfers stand out.
fn write_instr(word: u32, at: u32, out: &mut impl Write) -> Result<(), Error> {
    let instr = Instr::decode(word);

    if instr.is_nop() {
        write!(out, "  nop")?;
    } else {
        if !instr.opcode.is_branch_or_jump() {
            write!(out, "  ")?;
        }
        write!(out, "{}", instr.asm(at))?;
    }

    Ok(())
}

fn print_uncategorized_region(
    exe: &Exe,
    start_byte_idx: u32,
    end_byte_idx: u32,
    out: &mut impl Write,
) -> Result<(), Error> {
    writeln!(
        out,
        "; -- UNCATEGORIZED REGION: {:08x}-{:08x}",
        exe.base_addr + start_byte_idx,
        exe.base_addr + end_byte_idx - 1,
    )?;

    let mut byte_idx = start_byte_idx;

    while byte_idx < end_byte_idx {
        let at = exe.base_addr + byte_idx;
        write!(out, "{:08x}:", at)?;

        // Regions may start or end mid-word when byte-sized data elements
        // surround them; print partial words byte by byte up to the next
        // word boundary.
        let word_start_byte = byte_idx % 4;
        let num_bytes = (4 - word_start_byte).min(end_byte_idx - byte_idx);
        let word = exe.words[(byte_idx / 4) as usize];
        let is_whole_word = num_bytes == 4;

        if is_whole_word {
            write_word_refs(&word, None, out)?;
            write!(out, "{:08x}  ", word.value)?;
        } else {
            write!(out, "{:12}", "")?;
        }

        for i in word_start_byte..word_start_byte + num_bytes {
            write!(out, "{:02x} ", (word.value >> (8 * i)) as u8)?;
        }

        write!(out, " ")?;
        for i in word_start_byte..word_start_byte + num_bytes {
            let byte = (word.value >> (8 * i)) as u8;
            let c = if (32..=126).contains(&byte) { byte as char } else { ' ' };
            write!(out, "{}", c)?;
        }

        if is_whole_word {
            write!(out, "      ")?;
            write_instr(word.value, at, out)?;
        }

        writeln!(out)?;
        byte_idx += num_bytes;
    }
    writeln!(out)?;

    Ok(())
}
