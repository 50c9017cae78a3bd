// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PlayStation executable (.EXE) image model.
//!
//! Loads the 2048-byte-header "PS-X EXE" format, carries the program as a
//! table of annotated 32-bit words, and holds the user-supplied metadata
//! about the program: typed program elements, `jr` handlers and the assumed
//! `$gp` value.

pub mod annotations;
pub mod elem;
pub mod jr;

use std::path::Path;

use anyhow::{bail, Context as _};
use exegesis_mips::Instr;

pub use elem::{ProgElem, ProgElemKind, ScalarKind};
pub use jr::{JrInstHandler, JrTarget};

const HEADER_SIZE: usize = 2048;
const MAGIC: &[u8; 8] = b"PS-X EXE";

/// One 32-bit program word plus what the reference analysis found out
/// about it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExeWord {
    pub value: u32,
    /// Some branch instruction in the image targets this word.
    pub is_branch_target: bool,
    /// Some `j`/`jal` instruction in the image targets this word.
    pub is_jump_target: bool,
    /// Some word in the image holds this word's address as data.
    pub is_data_referenced: bool,
    /// The lowest and highest address that references this word.
    pub referencing_range: Option<(u32, u32)>,
}

impl ExeWord {
    pub fn add_referencing_addr(&mut self, addr: u32) {
        self.referencing_range = Some(match self.referencing_range {
            Some((lo, hi)) => (lo.min(addr), hi.max(addr)),
            None => (addr, addr),
        });
    }

    pub fn is_referenced(&self) -> bool {
        self.is_branch_target || self.is_jump_target || self.is_data_referenced
    }
}

/// A loaded executable image plus its annotations.
#[derive(Clone, Debug, Default)]
pub struct Exe {
    /// The address the program image is loaded at.
    pub base_addr: u32,
    pub entry_point: u32,
    /// The `$gp` value the header asks the loader to establish.
    pub initial_gp: u32,
    pub words: Vec<ExeWord>,
    /// Sorted by start address, then end address.
    prog_elems: Vec<ProgElem>,
    /// Sorted by instruction address.
    jr_handlers: Vec<JrInstHandler>,
    /// The constant `$gp` value to assume when evaluating functions.
    pub assumed_gp: Option<u32>,
}

impl Exe {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::parse(&bytes).with_context(|| format!("failed to load {}", path.display()))
    }

    /// Parses a raw "PS-X EXE" file: validates the header, then slices the
    /// program image into words.
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            bail!("file is too small to hold an EXE header ({} bytes)", bytes.len());
        }
        if &bytes[0..8] != MAGIC {
            bail!("bad magic; not a PS-X EXE file");
        }

        let entry_point = read_u32(bytes, 16);
        let initial_gp = read_u32(bytes, 20);
        let base_addr = read_u32(bytes, 24);
        let prog_size = read_u32(bytes, 28);

        if prog_size == 0 || prog_size % 2048 != 0 {
            bail!("bad program size field {:#x}; must be a non-zero multiple of 2048", prog_size);
        }
        if HEADER_SIZE + prog_size as usize != bytes.len() {
            bail!(
                "program size field {:#x} does not match the file size ({} bytes)",
                prog_size,
                bytes.len(),
            );
        }
        if base_addr % 4 != 0 || entry_point % 4 != 0 {
            bail!("unaligned base address {:#x} or entry point {:#x}", base_addr, entry_point);
        }
        if entry_point < base_addr || entry_point >= base_addr + prog_size {
            bail!("entry point {:#x} lies outside the program image", entry_point);
        }

        let words = bytes[HEADER_SIZE..]
            .chunks_exact(4)
            .map(|chunk| ExeWord {
                value: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                ..ExeWord::default()
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "loaded EXE: base {:#010x}, entry {:#010x}, {} words",
            base_addr,
            entry_point,
            words.len(),
        );

        Ok(Self {
            base_addr,
            entry_point,
            initial_gp,
            words,
            prog_elems: Vec::new(),
            jr_handlers: Vec::new(),
            assumed_gp: None,
        })
    }

    /// One past the last address of the program image.
    pub fn end_addr(&self) -> u32 {
        self.base_addr + (self.words.len() as u32) * 4
    }

    pub fn contains_addr(&self, addr: u32) -> bool {
        addr >= self.base_addr && addr < self.end_addr()
    }

    pub fn word_at(&self, addr: u32) -> Option<&ExeWord> {
        self.word_idx(addr).map(|idx| &self.words[idx])
    }

    pub fn word_value_at(&self, addr: u32) -> Option<u32> {
        self.word_at(addr).map(|word| word.value)
    }

    fn word_idx(&self, addr: u32) -> Option<usize> {
        if self.contains_addr(addr) && addr % 4 == 0 {
            Some(((addr - self.base_addr) / 4) as usize)
        } else {
            None
        }
    }

    /// Installs the program element table, sorted for lookup.
    pub fn set_prog_elems(&mut self, mut elems: Vec<ProgElem>) {
        elems.sort_by_key(|elem| (elem.start_addr, elem.end_addr));
        self.prog_elems = elems;
    }

    pub fn prog_elems(&self) -> &[ProgElem] {
        &self.prog_elems
    }

    /// Finds the program element containing the given address, if any.
    pub fn find_prog_elem(&self, addr: u32) -> Option<&ProgElem> {
        // Elements never overlap, so the first one whose end lies past the
        // address is the only candidate.
        let idx = self.prog_elems.partition_point(|elem| elem.end_addr <= addr);
        self.prog_elems.get(idx).filter(|elem| elem.contains_addr(addr))
    }

    /// How a reference to `addr` reads: the containing element's name (with
    /// offset or array index), or just the address when uncategorized.
    pub fn name_at_addr(&self, addr: u32) -> String {
        match self.find_prog_elem(addr) {
            Some(elem) => elem.name_at_addr(addr),
            None => format!("{:#010x}", addr),
        }
    }

    pub fn set_jr_handlers(&mut self, mut handlers: Vec<JrInstHandler>) {
        handlers.sort_by_key(|handler| handler.inst_addr);
        self.jr_handlers = handlers;
    }

    pub fn jr_handler_at(&self, inst_addr: u32) -> Option<&JrInstHandler> {
        self.jr_handlers
            .binary_search_by_key(&inst_addr, |handler| handler.inst_addr)
            .ok()
            .map(|idx| &self.jr_handlers[idx])
    }

    /// Scans every program word and records which words are targeted by
    /// branches, jumps, or data references.
    ///
    /// Branch and jump targets are only taken from words lying in functions
    /// or uncategorized regions. Data references are only taken from words
    /// lying in uncategorized regions, `ptr32` elements, or arrays of
    /// `ptr32` (anything else holding an address-like value is assumed to
    /// be a coincidence).
    pub fn determine_word_references(&mut self) {
        for idx in 0..self.words.len() {
            let this_addr = self.base_addr + (idx as u32) * 4;
            let value = self.words[idx].value;
            let elem = self.find_prog_elem(this_addr);

            let may_hold_code = elem.map_or(true, |elem| elem.is_function());
            let may_hold_ptr = elem.map_or(true, |elem| {
                matches!(
                    elem.kind,
                    ProgElemKind::Scalar(ScalarKind::Ptr32) | ProgElemKind::Array(ScalarKind::Ptr32),
                )
            });

            if may_hold_ptr && value % 4 == 0 {
                if let Some(target_idx) = self.word_idx(value) {
                    self.words[target_idx].is_data_referenced = true;
                    self.words[target_idx].add_referencing_addr(this_addr);
                }
            }

            if may_hold_code {
                let instr = Instr::decode(value);

                if instr.opcode.is_branch() {
                    if let Some(target_idx) = self.word_idx(instr.branch_target(this_addr)) {
                        self.words[target_idx].is_branch_target = true;
                        self.words[target_idx].add_referencing_addr(this_addr);
                    }
                } else if instr.opcode.is_fixed_jump() {
                    if let Some(target_idx) = self.word_idx(instr.fixed_jump_target(this_addr)) {
                        self.words[target_idx].is_jump_target = true;
                        self.words[target_idx].add_referencing_addr(this_addr);
                    }
                }
            }
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const BASE: u32 = 0x8001_0000;

    /// Builds a well-formed EXE image holding the given words (padded out
    /// to the 2048-byte program granularity with zeros).
    fn make_exe_bytes(words: &[u32]) -> Vec<u8> {
        let prog_size = (words.len() * 4).div_ceil(2048) * 2048;
        let mut bytes = vec![0u8; HEADER_SIZE + prog_size];

        bytes[0..8].copy_from_slice(MAGIC);
        bytes[16..20].copy_from_slice(&BASE.to_le_bytes());
        bytes[20..24].copy_from_slice(&0x8005_0000u32.to_le_bytes());
        bytes[24..28].copy_from_slice(&BASE.to_le_bytes());
        bytes[28..32].copy_from_slice(&(prog_size as u32).to_le_bytes());

        for (idx, word) in words.iter().enumerate() {
            let at = HEADER_SIZE + idx * 4;
            bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }

        bytes
    }

    pub(crate) fn make_exe(words: &[u32]) -> Exe {
        Exe::parse(&make_exe_bytes(words)).unwrap()
    }

    #[test]
    fn parses_a_wellformed_image() {
        let exe = make_exe(&[0x3C1C_8005, 0x03E0_0008, 0]);
        assert_eq!(exe.base_addr, BASE);
        assert_eq!(exe.entry_point, BASE);
        assert_eq!(exe.initial_gp, 0x8005_0000);
        assert_eq!(exe.words.len(), 512);
        assert_eq!(exe.word_value_at(BASE), Some(0x3C1C_8005));
        assert_eq!(exe.word_value_at(BASE + 4), Some(0x03E0_0008));
        assert_eq!(exe.end_addr(), BASE + 2048);
    }

    #[test]
    fn rejects_malformed_images() {
        assert!(Exe::parse(&[0u8; 64]).is_err());

        let mut bytes = make_exe_bytes(&[0]);
        bytes[0] = b'X';
        assert!(Exe::parse(&bytes).is_err());

        // Size field not matching the actual file size.
        let mut bytes = make_exe_bytes(&[0]);
        bytes[28..32].copy_from_slice(&4096u32.to_le_bytes());
        assert!(Exe::parse(&bytes).is_err());

        // Entry point outside the image.
        let mut bytes = make_exe_bytes(&[0]);
        bytes[16..20].copy_from_slice(&0x9000_0000u32.to_le_bytes());
        assert!(Exe::parse(&bytes).is_err());
    }

    #[test]
    fn word_lookup_requires_alignment_and_range() {
        let exe = make_exe(&[1, 2, 3]);
        assert_eq!(exe.word_value_at(BASE + 8), Some(3));
        assert_eq!(exe.word_value_at(BASE + 2), None);
        assert_eq!(exe.word_value_at(BASE - 4), None);
        assert_eq!(exe.word_value_at(exe.end_addr()), None);
    }

    #[test]
    fn find_prog_elem_hits_the_containing_elem() {
        let mut exe = make_exe(&[0; 16]);
        exe.set_prog_elems(vec![
            ProgElem::new(BASE + 16, BASE + 24, "second", ProgElemKind::Function),
            ProgElem::new(BASE, BASE + 8, "first", ProgElemKind::Function),
        ]);

        assert_eq!(exe.find_prog_elem(BASE).unwrap().name, "first");
        assert_eq!(exe.find_prog_elem(BASE + 7).unwrap().name, "first");
        assert!(exe.find_prog_elem(BASE + 8).is_none());
        assert_eq!(exe.find_prog_elem(BASE + 20).unwrap().name, "second");
        assert!(exe.find_prog_elem(BASE + 24).is_none());
    }

    #[test]
    fn name_at_addr_falls_back_to_the_address() {
        let exe = make_exe(&[0; 4]);
        assert_eq!(exe.name_at_addr(BASE + 4), "0x80010004");
    }

    #[test]
    fn jr_handler_lookup_is_by_exact_address() {
        let mut exe = make_exe(&[0; 4]);
        exe.set_jr_handlers(vec![
            JrInstHandler { inst_addr: BASE + 8, target: JrTarget::BiosCall },
            JrInstHandler { inst_addr: BASE, target: JrTarget::JumpTable { table_addr: BASE + 12 } },
        ]);

        assert_eq!(
            exe.jr_handler_at(BASE).unwrap().target,
            JrTarget::JumpTable { table_addr: BASE + 12 },
        );
        assert_eq!(exe.jr_handler_at(BASE + 8).unwrap().target, JrTarget::BiosCall);
        assert!(exe.jr_handler_at(BASE + 4).is_none());
    }

    #[test]
    fn branch_and_jump_targets_are_marked() {
        // 0x8001_0000: beq $v0, $zero, +3 -> 0x8001_0010
        // 0x8001_0004: jal 0x8001_0014
        let exe = {
            let mut exe = make_exe(&[0x1040_0003, 0x0C00_4005, 0, 0, 0, 0]);
            exe.set_prog_elems(vec![ProgElem::new(BASE, BASE + 24, "f", ProgElemKind::Function)]);
            exe.determine_word_references();
            exe
        };

        let branch_target = exe.word_at(BASE + 16).unwrap();
        assert!(branch_target.is_branch_target);
        assert!(!branch_target.is_jump_target);
        assert_eq!(branch_target.referencing_range, Some((BASE, BASE)));

        let jump_target = exe.word_at(BASE + 20).unwrap();
        assert!(jump_target.is_jump_target);
        assert_eq!(jump_target.referencing_range, Some((BASE + 4, BASE + 4)));
    }

    #[test]
    fn data_references_only_come_from_pointer_holding_words() {
        // Word 0 holds an in-image address but lies inside a u32 data elem:
        // no reference. Word 1 holds the same address and is uncategorized:
        // reference. Word 2 is a ptr32 elem: reference.
        let target = BASE + 12;
        let mut exe = make_exe(&[target, target, target, 0]);
        exe.set_prog_elems(vec![ProgElem::new(
            BASE,
            BASE + 4,
            "gValue",
            ProgElemKind::Scalar(ScalarKind::Uint32),
        )]);

        let mut with_ptr_elem = exe.clone();
        with_ptr_elem.set_prog_elems(vec![
            ProgElem::new(BASE, BASE + 4, "gValue", ProgElemKind::Scalar(ScalarKind::Uint32)),
            ProgElem::new(BASE + 8, BASE + 12, "gPtr", ProgElemKind::Scalar(ScalarKind::Ptr32)),
        ]);
        with_ptr_elem.determine_word_references();

        let word = with_ptr_elem.word_at(target).unwrap();
        assert!(word.is_data_referenced);
        // Word 0 (inside the u32 elem) must not have contributed.
        assert_eq!(word.referencing_range, Some((BASE + 4, BASE + 8)));
    }

    #[test]
    fn referencing_range_spans_all_referencing_words() {
        let mut word = ExeWord::default();
        assert_eq!(word.referencing_range, None);
        word.add_referencing_addr(0x8001_0040);
        word.add_referencing_addr(0x8001_0010);
        word.add_referencing_addr(0x8001_0020);
        assert_eq!(word.referencing_range, Some((0x8001_0010, 0x8001_0040)));
    }
}
