// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded instructions and opcode classification.

pub mod asm;
mod decode;

use std::fmt;

use crate::gpr;

/// Every operation the R3000A can execute, plus the MIPS-II trap group.
///
/// The traps are not actually supported by the processor; compilers of the
/// era emitted them as markers for unreachable code, so they show up in real
/// executables and must decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Add,
    Addi,
    Addiu,
    Addu,
    And,
    Andi,
    Beq,
    Bgez,
    Bgezal,
    Bgtz,
    Blez,
    Bltz,
    Bltzal,
    Bne,
    Break,
    Cfc2,
    Cop2,
    Ctc2,
    Div,
    Divu,
    J,
    Jal,
    Jalr,
    Jr,
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lui,
    Lw,
    Lwc2,
    Lwl,
    Lwr,
    Mfc0,
    Mfc2,
    Mfhi,
    Mflo,
    Mtc0,
    Mtc2,
    Mthi,
    Mtlo,
    Mult,
    Multu,
    Nor,
    Or,
    Ori,
    Rfe,
    Sb,
    Sh,
    Sll,
    Sllv,
    Slt,
    Slti,
    Sltiu,
    Sltu,
    Sra,
    Srav,
    Srl,
    Srlv,
    Sub,
    Subu,
    Sw,
    Swc2,
    Swl,
    Swr,
    Syscall,
    Teq,
    Teqi,
    Tge,
    Tgei,
    Tgeiu,
    Tgeu,
    Tlbp,
    Tlbr,
    Tlbwi,
    Tlbwr,
    Tlt,
    Tlti,
    Tltiu,
    Tltu,
    Tne,
    Tnei,
    Xor,
    Xori,
    /// An encoding the processor does not define.
    Invalid,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Addi => "addi",
            Self::Addiu => "addiu",
            Self::Addu => "addu",
            Self::And => "and",
            Self::Andi => "andi",
            Self::Beq => "beq",
            Self::Bgez => "bgez",
            Self::Bgezal => "bgezal",
            Self::Bgtz => "bgtz",
            Self::Blez => "blez",
            Self::Bltz => "bltz",
            Self::Bltzal => "bltzal",
            Self::Bne => "bne",
            Self::Break => "break",
            Self::Cfc2 => "cfc2",
            Self::Cop2 => "cop2",
            Self::Ctc2 => "ctc2",
            Self::Div => "div",
            Self::Divu => "divu",
            Self::J => "j",
            Self::Jal => "jal",
            Self::Jalr => "jalr",
            Self::Jr => "jr",
            Self::Lb => "lb",
            Self::Lbu => "lbu",
            Self::Lh => "lh",
            Self::Lhu => "lhu",
            Self::Lui => "lui",
            Self::Lw => "lw",
            Self::Lwc2 => "lwc2",
            Self::Lwl => "lwl",
            Self::Lwr => "lwr",
            Self::Mfc0 => "mfc0",
            Self::Mfc2 => "mfc2",
            Self::Mfhi => "mfhi",
            Self::Mflo => "mflo",
            Self::Mtc0 => "mtc0",
            Self::Mtc2 => "mtc2",
            Self::Mthi => "mthi",
            Self::Mtlo => "mtlo",
            Self::Mult => "mult",
            Self::Multu => "multu",
            Self::Nor => "nor",
            Self::Or => "or",
            Self::Ori => "ori",
            Self::Rfe => "rfe",
            Self::Sb => "sb",
            Self::Sh => "sh",
            Self::Sll => "sll",
            Self::Sllv => "sllv",
            Self::Slt => "slt",
            Self::Slti => "slti",
            Self::Sltiu => "sltiu",
            Self::Sltu => "sltu",
            Self::Sra => "sra",
            Self::Srav => "srav",
            Self::Srl => "srl",
            Self::Srlv => "srlv",
            Self::Sub => "sub",
            Self::Subu => "subu",
            Self::Sw => "sw",
            Self::Swc2 => "swc2",
            Self::Swl => "swl",
            Self::Swr => "swr",
            Self::Syscall => "syscall",
            Self::Teq => "teq",
            Self::Teqi => "teqi",
            Self::Tge => "tge",
            Self::Tgei => "tgei",
            Self::Tgeiu => "tgeiu",
            Self::Tgeu => "tgeu",
            Self::Tlbp => "tlbp",
            Self::Tlbr => "tlbr",
            Self::Tlbwi => "tlbwi",
            Self::Tlbwr => "tlbwr",
            Self::Tlt => "tlt",
            Self::Tlti => "tlti",
            Self::Tltiu => "tltiu",
            Self::Tltu => "tltu",
            Self::Tne => "tne",
            Self::Tnei => "tnei",
            Self::Xor => "xor",
            Self::Xori => "xori",
            Self::Invalid => "<invalid>",
        }
    }

    /// A conditional, PC-relative control transfer.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Beq
                | Self::Bgez
                | Self::Bgezal
                | Self::Bgtz
                | Self::Blez
                | Self::Bltz
                | Self::Bltzal
                | Self::Bne
        )
    }

    /// An unconditional control transfer.
    pub fn is_jump(self) -> bool {
        matches!(self, Self::J | Self::Jal | Self::Jalr | Self::Jr)
    }

    pub fn is_branch_or_jump(self) -> bool {
        self.is_branch() || self.is_jump()
    }

    /// A jump whose target is fixed by the instruction word alone.
    pub fn is_fixed_jump(self) -> bool {
        matches!(self, Self::J | Self::Jal)
    }

    /// A jump that stores a return address (i.e. a call).
    pub fn is_returning_jump(self) -> bool {
        matches!(self, Self::Jal | Self::Jalr)
    }

    pub fn is_trap(self) -> bool {
        matches!(
            self,
            Self::Teq
                | Self::Teqi
                | Self::Tge
                | Self::Tgei
                | Self::Tgeiu
                | Self::Tgeu
                | Self::Tlt
                | Self::Tlti
                | Self::Tltiu
                | Self::Tltu
                | Self::Tne
                | Self::Tnei
        )
    }

    /// A load whose destination register only becomes visible after the
    /// following instruction (the load delay slot).
    pub fn is_load_delayed(self) -> bool {
        matches!(
            self,
            Self::Lb
                | Self::Lbu
                | Self::Lh
                | Self::Lhu
                | Self::Lw
                | Self::Lwc2
                | Self::Lwl
                | Self::Lwr
        )
    }

    pub fn is_illegal(self) -> bool {
        self == Self::Invalid
    }
}

/// A decoded instruction.
///
/// Fields that a given format does not carry are left zeroed by the decoder.
/// `imm` holds whichever immediate the format defines: a 16-bit immediate,
/// a 26-bit jump target, a shift amount, a trap/break/syscall code, or a
/// 25-bit COP2 command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Instr {
    pub opcode: Opcode,
    pub reg_s: u8,
    pub reg_t: u8,
    pub reg_d: u8,
    pub imm: u32,
}

impl Default for Opcode {
    fn default() -> Self {
        Self::Invalid
    }
}

impl Instr {
    /// The GPR this instruction writes, if any.
    ///
    /// Implicit writes are not reported: JAL and JALR deposit a return
    /// address in `$ra`/`regD` but are calls, not data movement, and the
    /// callers here treat them separately.
    pub fn dest_gpr(&self) -> Option<u8> {
        match self.opcode {
            Opcode::Add
            | Opcode::Addu
            | Opcode::And
            | Opcode::Mfhi
            | Opcode::Mflo
            | Opcode::Nor
            | Opcode::Or
            | Opcode::Sll
            | Opcode::Sllv
            | Opcode::Slt
            | Opcode::Sltu
            | Opcode::Sra
            | Opcode::Srav
            | Opcode::Srl
            | Opcode::Srlv
            | Opcode::Sub
            | Opcode::Subu
            | Opcode::Xor => Some(self.reg_d),

            Opcode::Addi
            | Opcode::Addiu
            | Opcode::Andi
            | Opcode::Cfc2
            | Opcode::Lb
            | Opcode::Lbu
            | Opcode::Lh
            | Opcode::Lhu
            | Opcode::Lui
            | Opcode::Lw
            | Opcode::Lwl
            | Opcode::Lwr
            | Opcode::Mfc0
            | Opcode::Mfc2
            | Opcode::Ori
            | Opcode::Slti
            | Opcode::Sltiu
            | Opcode::Xori => Some(self.reg_t),

            _ => None,
        }
    }

    /// The GPRs this instruction reads, in operand order.
    pub fn input_gprs(&self) -> (Option<u8>, Option<u8>) {
        match self.opcode {
            // Two-register ALU ops, comparisons, traps and stores. LWL and
            // LWR read their destination too, since they only replace part
            // of it.
            Opcode::Add
            | Opcode::Addu
            | Opcode::And
            | Opcode::Beq
            | Opcode::Bne
            | Opcode::Div
            | Opcode::Divu
            | Opcode::Lwl
            | Opcode::Lwr
            | Opcode::Mult
            | Opcode::Multu
            | Opcode::Nor
            | Opcode::Or
            | Opcode::Sb
            | Opcode::Sh
            | Opcode::Sllv
            | Opcode::Slt
            | Opcode::Sltu
            | Opcode::Srav
            | Opcode::Srlv
            | Opcode::Sub
            | Opcode::Subu
            | Opcode::Sw
            | Opcode::Swl
            | Opcode::Swr
            | Opcode::Teq
            | Opcode::Tge
            | Opcode::Tgeu
            | Opcode::Tlt
            | Opcode::Tltu
            | Opcode::Tne
            | Opcode::Xor => (Some(self.reg_s), Some(self.reg_t)),

            Opcode::Addi
            | Opcode::Addiu
            | Opcode::Andi
            | Opcode::Bgez
            | Opcode::Bgezal
            | Opcode::Bgtz
            | Opcode::Blez
            | Opcode::Bltz
            | Opcode::Bltzal
            | Opcode::Jalr
            | Opcode::Jr
            | Opcode::Lb
            | Opcode::Lbu
            | Opcode::Lh
            | Opcode::Lhu
            | Opcode::Lw
            | Opcode::Lwc2
            | Opcode::Mthi
            | Opcode::Mtlo
            | Opcode::Ori
            | Opcode::Slti
            | Opcode::Sltiu
            | Opcode::Swc2
            | Opcode::Tgei
            | Opcode::Tgeiu
            | Opcode::Tlti
            | Opcode::Tltiu
            | Opcode::Teqi
            | Opcode::Tnei
            | Opcode::Xori => (Some(self.reg_s), None),

            Opcode::Ctc2 | Opcode::Mtc0 | Opcode::Mtc2 => (Some(self.reg_t), None),

            // Fixed shifts read the value being shifted.
            Opcode::Sll | Opcode::Sra | Opcode::Srl => (Some(self.reg_t), None),

            _ => (None, None),
        }
    }

    /// Does this instruction read the given GPR?
    pub fn uses_input_gpr(&self, gpr_idx: u8) -> bool {
        let (in1, in2) = self.input_gprs();
        in1 == Some(gpr_idx) || in2 == Some(gpr_idx)
    }

    /// Whether this instruction has no architectural effect.
    ///
    /// The canonical NOP (`sll $zero, $zero, 0`, word `0`) is caught by the
    /// destination check; the remaining arms catch the degenerate forms
    /// assemblers occasionally emit, like adding zero to a register in
    /// place or branching on a condition that can never hold.
    pub fn is_nop(&self) -> bool {
        if self.dest_gpr() == Some(gpr::ZERO) {
            return true;
        }

        match self.opcode {
            Opcode::Add | Opcode::Addu | Opcode::Sub | Opcode::Subu | Opcode::Xor => {
                self.reg_t == gpr::ZERO && self.reg_s == self.reg_d
            }
            Opcode::Addi | Opcode::Addiu | Opcode::Ori | Opcode::Xori => {
                self.imm == 0 && self.reg_s == self.reg_t
            }
            // 0 < 0 and 0 > 0 never hold.
            Opcode::Bgtz | Opcode::Bltz | Opcode::Bltzal => self.reg_s == gpr::ZERO,
            Opcode::Bne => self.reg_s == self.reg_t,
            Opcode::Or => {
                (self.reg_s == gpr::ZERO && self.reg_d == self.reg_t)
                    || (self.reg_t == gpr::ZERO && self.reg_d == self.reg_s)
            }
            Opcode::Sll | Opcode::Sra | Opcode::Srl => {
                self.imm == 0 && self.reg_d == self.reg_t
            }
            Opcode::Sllv | Opcode::Srav | Opcode::Srlv => {
                self.reg_s == gpr::ZERO && self.reg_d == self.reg_t
            }
            _ => false,
        }
    }

    /// Whether this is a conditional branch that is always taken
    /// (`beq $zero, $zero, ..`, the assembler's unconditional branch).
    pub fn is_branch_always(&self) -> bool {
        self.opcode == Opcode::Beq && self.reg_s == gpr::ZERO && self.reg_t == gpr::ZERO
    }

    /// The destination of this (branch) instruction when taken.
    ///
    /// The offset is a signed count of words relative to the address
    /// *after* the branch.
    pub fn branch_target(&self, at: u32) -> u32 {
        let offset = (self.imm as u16 as i16 as i32).wrapping_mul(4);
        at.wrapping_add(4).wrapping_add(offset as u32)
    }

    /// The destination of this J or JAL instruction.
    ///
    /// The 26-bit target addresses a word within the 256 MiB region of the
    /// jump instruction itself.
    pub fn fixed_jump_target(&self, at: u32) -> u32 {
        (at & 0xF000_0000) | (self.imm << 2)
    }
}

impl fmt::Display for Instr {
    /// Formats without an instruction address; branch and jump targets
    /// render relative. Use [`Instr::asm`] when the address is known.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.asm(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_and_jump_predicates_are_disjoint() {
        let branches = [
            Opcode::Beq,
            Opcode::Bgez,
            Opcode::Bgezal,
            Opcode::Bgtz,
            Opcode::Blez,
            Opcode::Bltz,
            Opcode::Bltzal,
            Opcode::Bne,
        ];
        let jumps = [Opcode::J, Opcode::Jal, Opcode::Jalr, Opcode::Jr];

        for op in branches {
            assert!(op.is_branch() && !op.is_jump() && op.is_branch_or_jump());
        }
        for op in jumps {
            assert!(op.is_jump() && !op.is_branch() && op.is_branch_or_jump());
        }
        assert!(!Opcode::Addu.is_branch_or_jump());
    }

    #[test]
    fn call_like_jumps() {
        assert!(Opcode::Jal.is_returning_jump());
        assert!(Opcode::Jalr.is_returning_jump());
        assert!(!Opcode::Jr.is_returning_jump());
        assert!(Opcode::J.is_fixed_jump());
        assert!(Opcode::Jal.is_fixed_jump());
        assert!(!Opcode::Jalr.is_fixed_jump());
    }

    #[test]
    fn dest_gpr_by_format() {
        // addu $v0, $a0, $a1
        let rtype = Instr {
            opcode: Opcode::Addu,
            reg_s: gpr::A0,
            reg_t: gpr::A1,
            reg_d: gpr::V0,
            imm: 0,
        };
        assert_eq!(rtype.dest_gpr(), Some(gpr::V0));

        // lw $t0, 4($sp)
        let load = Instr {
            opcode: Opcode::Lw,
            reg_s: gpr::SP,
            reg_t: gpr::T0,
            reg_d: 0,
            imm: 4,
        };
        assert_eq!(load.dest_gpr(), Some(gpr::T0));

        // sw writes memory, not a register
        let store = Instr { opcode: Opcode::Sw, ..load };
        assert_eq!(store.dest_gpr(), None);
    }

    #[test]
    fn input_gprs_by_format() {
        let store = Instr {
            opcode: Opcode::Sw,
            reg_s: gpr::SP,
            reg_t: gpr::T0,
            reg_d: 0,
            imm: 4,
        };
        assert_eq!(store.input_gprs(), (Some(gpr::SP), Some(gpr::T0)));
        assert!(store.uses_input_gpr(gpr::T0));
        assert!(!store.uses_input_gpr(gpr::V0));

        let shift = Instr {
            opcode: Opcode::Sll,
            reg_s: 0,
            reg_t: gpr::A0,
            reg_d: gpr::V0,
            imm: 2,
        };
        assert_eq!(shift.input_gprs(), (Some(gpr::A0), None));

        let lui = Instr {
            opcode: Opcode::Lui,
            reg_s: 0,
            reg_t: gpr::GP,
            reg_d: 0,
            imm: 0x8005,
        };
        assert_eq!(lui.input_gprs(), (None, None));
    }

    #[test]
    fn canonical_and_degenerate_nops() {
        assert!(Instr::decode(0).is_nop());

        // addu $t0, $t0, $zero
        let addu = Instr {
            opcode: Opcode::Addu,
            reg_s: gpr::T0,
            reg_t: gpr::ZERO,
            reg_d: gpr::T0,
            imm: 0,
        };
        assert!(addu.is_nop());

        // bne $t0, $t0, anywhere
        let bne = Instr {
            opcode: Opcode::Bne,
            reg_s: gpr::T0,
            reg_t: gpr::T0,
            reg_d: 0,
            imm: 0x10,
        };
        assert!(bne.is_nop());

        // beq $t0, $t0 always branches; not a NOP
        let beq = Instr { opcode: Opcode::Beq, ..bne };
        assert!(!beq.is_nop());
    }

    #[test]
    fn branch_target_math() {
        let back = Instr {
            opcode: Opcode::Bne,
            reg_s: gpr::V0,
            reg_t: gpr::ZERO,
            reg_d: 0,
            imm: 0xFFFF, // -1 words
        };
        assert_eq!(back.branch_target(0x8001_0008), 0x8001_0008);

        let fwd = Instr { imm: 0x0003, ..back };
        assert_eq!(fwd.branch_target(0x8001_0008), 0x8001_0018);
    }

    #[test]
    fn fixed_jump_target_math() {
        let j = Instr {
            opcode: Opcode::J,
            reg_s: 0,
            reg_t: 0,
            reg_d: 0,
            imm: 0x012274 >> 2 | (0x8000_0000 >> 2 & 0x03FF_FFFF),
        };
        // Region bits come from the jump's own address.
        assert_eq!(j.fixed_jump_target(0x8003_0000) & 0xF000_0000, 0x8000_0000);

        let j = Instr { imm: 0x0001_2274 >> 2, ..j };
        assert_eq!(j.fixed_jump_target(0x8003_0000), 0x8001_2274);
    }

    #[test]
    fn branch_always_is_beq_zero_zero() {
        assert!(Instr::decode(0x1000_0003).is_branch_always()); // beq $zero, $zero, +3
        assert!(!Instr::decode(0x1040_0003).is_branch_always()); // beq $v0, $zero, +3
        assert!(!Instr::decode(0x1400_0003).is_branch_always()); // bne $zero, $zero, +3
    }
}
