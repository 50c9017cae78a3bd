// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The annotations file: user-supplied knowledge about the program.
//!
//! One directive per line, `#` starts a comment:
//!
//! ```text
//! gp 0x80050000
//! func 0x80012274 0x800123A4 UpdateFireSky
//! data 0x80086D04 0x80086D08 u32 gNumFrames
//! array 0x80070000 0x80070100 ptr32 gJumpTable
//! jumptable 0x80012B84 0x80070000
//! bioscall 0x80012C04
//! ```
//!
//! `func`, `data` and `array` take a half-open address range; the name is
//! optional and a generated one is used when it is omitted.

use std::path::Path;

use anyhow::{bail, Context as _};

use crate::elem::{ProgElem, ProgElemKind, ScalarKind};
use crate::jr::{JrInstHandler, JrTarget};
use crate::Exe;

pub fn apply_annotations_file(exe: &mut Exe, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    apply_annotations(exe, &text).with_context(|| format!("in {}", path.display()))
}

/// Parses annotation directives and installs the results into `exe`.
///
/// The element and handler tables are replaced wholesale, so this is meant
/// to be called once, with every annotation, before any analysis runs.
pub fn apply_annotations(exe: &mut Exe, text: &str) -> anyhow::Result<()> {
    let mut elems = Vec::new();
    let mut handlers = Vec::new();

    for (line_idx, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        apply_directive(exe, line, &mut elems, &mut handlers)
            .with_context(|| format!("bad annotation on line {}: {:?}", line_idx + 1, line))?;
    }

    tracing::debug!("applied annotations: {} elements, {} jr handlers", elems.len(), handlers.len());
    exe.set_prog_elems(elems);
    exe.set_jr_handlers(handlers);

    Ok(())
}

fn apply_directive(
    exe: &mut Exe,
    line: &str,
    elems: &mut Vec<ProgElem>,
    handlers: &mut Vec<JrInstHandler>,
) -> anyhow::Result<()> {
    let mut fields = line.split_whitespace();
    let directive = fields.next().unwrap_or("");
    let fields = fields.collect::<Vec<_>>();

    match directive {
        "gp" => {
            let [value] = fields[..] else { bail!("expected: gp VALUE") };
            exe.assumed_gp = Some(parse_hex(value)?);
        }
        "func" => {
            let (start, end, name) = match fields[..] {
                [start, end] => (start, end, ""),
                [start, end, name] => (start, end, name),
                _ => bail!("expected: func START END [NAME]"),
            };
            elems.push(parse_elem(exe, start, end, name, ProgElemKind::Function)?);
        }
        "data" | "array" => {
            let (start, end, kind, name) = match fields[..] {
                [start, end, kind] => (start, end, kind, ""),
                [start, end, kind, name] => (start, end, kind, name),
                _ => bail!("expected: {} START END TYPE [NAME]", directive),
            };
            let scalar = ScalarKind::from_short_name(kind)
                .with_context(|| format!("unknown element type {:?}", kind))?;
            let kind = if directive == "array" {
                ProgElemKind::Array(scalar)
            } else {
                ProgElemKind::Scalar(scalar)
            };
            elems.push(parse_elem(exe, start, end, name, kind)?);
        }
        "jumptable" => {
            let [inst, table] = fields[..] else { bail!("expected: jumptable INST_ADDR TABLE_ADDR") };
            let inst_addr = parse_in_range_addr(exe, inst)?;
            let table_addr = parse_in_range_addr(exe, table)?;
            handlers.push(JrInstHandler { inst_addr, target: JrTarget::JumpTable { table_addr } });
        }
        "bioscall" => {
            let [inst] = fields[..] else { bail!("expected: bioscall INST_ADDR") };
            let inst_addr = parse_in_range_addr(exe, inst)?;
            handlers.push(JrInstHandler { inst_addr, target: JrTarget::BiosCall });
        }
        _ => bail!("unknown directive {:?}", directive),
    }

    Ok(())
}

fn parse_elem(
    exe: &Exe,
    start: &str,
    end: &str,
    name: &str,
    kind: ProgElemKind,
) -> anyhow::Result<ProgElem> {
    let start = parse_in_range_addr(exe, start)?;
    let end = parse_hex(end)?;

    if end <= start || end > exe.end_addr() {
        bail!("element range {:#x}..{:#x} is not valid for the image", start, end);
    }

    Ok(ProgElem::new(start, end, name, kind))
}

fn parse_in_range_addr(exe: &Exe, text: &str) -> anyhow::Result<u32> {
    let addr = parse_hex(text)?;
    if !exe.contains_addr(addr) {
        bail!("address {:#x} lies outside the program image", addr);
    }

    Ok(addr)
}

fn parse_hex(text: &str) -> anyhow::Result<u32> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u32::from_str_radix(digits, 16).with_context(|| format!("bad hex value {:?}", text))
}
