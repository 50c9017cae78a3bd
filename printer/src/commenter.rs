// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trailing comments for loads and stores whose effective address the
//! constant evaluator pinned down.

use exegesis_eval::ConstEvaluator;
use exegesis_exe::{Exe, ProgElemKind};
use exegesis_mips::{Instr, Opcode};

/// The comment for one instruction, without the `// ` prefix, or `None`
/// when there is nothing useful to say.
pub(crate) fn comment_for_instr(
    instr: &Instr,
    at: u32,
    exe: &Exe,
    evaluator: &ConstEvaluator,
) -> Option<String> {
    if instr.is_nop() {
        return None;
    }

    let verb = match instr.opcode {
        Opcode::Lb
        | Opcode::Lbu
        | Opcode::Lh
        | Opcode::Lhu
        | Opcode::Lw
        | Opcode::Lwc2
        | Opcode::Lwl
        | Opcode::Lwr => "Load from",
        Opcode::Sb
        | Opcode::Sh
        | Opcode::Sw
        | Opcode::Swc2
        | Opcode::Swl
        | Opcode::Swr => "Store to",
        _ => return None,
    };

    let base = evaluator.reg_state_before(at)?.gpr(instr.reg_s)?;
    let offset = instr.imm as u16 as i16 as i32;
    let addr = base.wrapping_add(offset as u32);

    Some(format!("{}: {}", verb, describe_addr(exe, addr)))
}

/// How an absolute address reads in a comment: the containing element's
/// name plus the concrete address, or just the address when the target is
/// uncategorized.
pub(crate) fn describe_addr(exe: &Exe, addr: u32) -> String {
    match exe.find_prog_elem(addr) {
        Some(elem) => {
            let mut text = elem.name_at_addr(addr);

            // The offset form already embeds the address.
            let addr_is_shown =
                addr != elem.start_addr && !matches!(elem.kind, ProgElemKind::Array(_));
            if !addr_is_shown {
                text.push_str(&format!(" ({:#010x})", addr));
            }

            text
        }
        None => format!("{:#010x}", addr),
    }
}

/// The spacing that puts a trailing comment at column 48 or later, rounded
/// up to a multiple of four from the end of the statement.
pub(crate) fn comment_padding(line_len: usize) -> String {
    let mut col = line_len.max(48);
    while col % 4 != 0 {
        col += 1;
    }

    " ".repeat(col - line_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_reaches_the_comment_column() {
        assert_eq!(comment_padding(20).len() + 20, 48);
        assert_eq!(comment_padding(48).len() + 48, 48);
        assert_eq!(comment_padding(49).len() + 49, 52);
        assert_eq!(comment_padding(51).len() + 51, 52);
        assert_eq!(comment_padding(52).len() + 52, 52);
    }

    #[test]
    fn padded_column_is_a_multiple_of_four() {
        for len in 0..80 {
            let col = len + comment_padding(len).len();
            assert!(col >= 48 || len >= 48);
            assert_eq!(col % 4, 0);
        }
    }
}
