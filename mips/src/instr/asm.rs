// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembly rendering.
//!
//! The listing style is assignment-oriented: instructions with a register
//! destination render as `$v0 = addu $a0, $a1` rather than the classic
//! three-operand form, which reads far better in long annotated dumps.

use std::fmt;

use super::{Instr, Opcode};
use crate::gpr;

#[derive(Clone, Debug)]
pub struct Asm {
    pub op_name: String,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Asm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            return write!(f, "{}", self.op_name);
        }

        write!(
            f,
            "{} {}",
            self.op_name,
            self.operands
                .iter()
                .map(|operand| format!("{}", operand))
                .collect::<Vec<String>>()
                .join(", ")
        )
    }
}

#[derive(Clone, Debug)]
pub enum Operand {
    Reg(u8),
    SInt(i32),
    Text(String),
    UInt(u32),
}

impl fmt::Display for Operand {
    /// Small magnitudes print in decimal, larger ones in hex. Negative
    /// values keep their sign in front of the hex form, so a stack
    /// adjustment reads `-0x18` rather than as a sea of `f`s.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(it) => {
                write!(f, "{}", it)
            }
            Self::Reg(it) => {
                write!(f, "{}", gpr::name(*it))
            }
            Self::SInt(it) => {
                let abs = it.unsigned_abs();
                if abs < 0x10 {
                    write!(f, "{}", it)
                } else if *it < 0 {
                    write!(f, "-{:#x}", abs)
                } else {
                    write!(f, "{:#x}", abs)
                }
            }
            Self::UInt(it) => {
                if *it < 0x10 {
                    write!(f, "{}", it)
                } else {
                    write!(f, "{:#x}", it)
                }
            }
        }
    }
}

/// `[$base]`, `[$base + 0xOFF]` or `[$base - 0xOFF]`.
fn mem_operand(base: u8, imm: u32) -> Operand {
    let offset = imm as u16 as i16 as i32;
    Operand::Text(if offset > 0 {
        format!("[{} + {:#x}]", gpr::name(base), offset)
    } else if offset < 0 {
        format!("[{} - {:#x}]", gpr::name(base), -offset)
    } else {
        format!("[{}]", gpr::name(base))
    })
}

fn sext16(imm: u32) -> i32 {
    imm as u16 as i16 as i32
}

impl Instr {
    /// Renders this instruction as it appears in a listing. `at` is the
    /// instruction's own address, needed to resolve branch and jump
    /// targets to absolute addresses.
    pub fn asm(&self, at: u32) -> Asm {
        let dest = |instr: &Self| gpr::name(instr.dest_gpr().unwrap_or(32));

        let (op_name, operands) = match self.opcode {
            Opcode::Invalid => ("<ILLEGAL INSTRUCTION>".to_string(), vec![]),

            // rd = op rs, rt
            Opcode::Add
            | Opcode::Addu
            | Opcode::And
            | Opcode::Nor
            | Opcode::Or
            | Opcode::Slt
            | Opcode::Sltu
            | Opcode::Sub
            | Opcode::Subu
            | Opcode::Xor => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_s), Operand::Reg(self.reg_t)],
            ),

            // Variable shifts put the shifted value first.
            Opcode::Sllv | Opcode::Srav | Opcode::Srlv => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_t), Operand::Reg(self.reg_s)],
            ),

            // The unsigned-named immediates sign-extend too; only the
            // logical ops take their immediate zero-extended.
            Opcode::Addi | Opcode::Addiu | Opcode::Slti | Opcode::Sltiu => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_s), Operand::SInt(sext16(self.imm))],
            ),

            Opcode::Andi | Opcode::Ori | Opcode::Xori => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_s), Operand::UInt(self.imm)],
            ),

            Opcode::Sll | Opcode::Sra | Opcode::Srl => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_t), Operand::UInt(self.imm)],
            ),

            Opcode::Rfe | Opcode::Tlbp | Opcode::Tlbr | Opcode::Tlbwi | Opcode::Tlbwr => {
                (self.opcode.mnemonic().to_string(), vec![])
            }

            Opcode::Beq | Opcode::Bne => (
                self.opcode.mnemonic().to_string(),
                vec![
                    Operand::Reg(self.reg_s),
                    Operand::Reg(self.reg_t),
                    Operand::UInt(self.branch_target(at)),
                ],
            ),

            Opcode::Bgez
            | Opcode::Bgezal
            | Opcode::Bgtz
            | Opcode::Blez
            | Opcode::Bltz
            | Opcode::Bltzal => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::Reg(self.reg_s), Operand::UInt(self.branch_target(at))],
            ),

            Opcode::Break | Opcode::Syscall | Opcode::Cop2 => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::UInt(self.imm)],
            ),

            Opcode::Cfc2 => (
                format!("{} = $cop2_ctrl[{}]", dest(self), self.reg_d),
                vec![],
            ),
            Opcode::Ctc2 => (
                format!("$cop2_ctrl[{}] = {}", self.reg_d, gpr::name(self.reg_t)),
                vec![],
            ),
            Opcode::Mfc0 => (
                format!("{} = $cop0_data[{}]", dest(self), self.reg_d),
                vec![],
            ),
            Opcode::Mfc2 => (
                format!("{} = $cop2_data[{}]", dest(self), self.reg_d),
                vec![],
            ),
            Opcode::Mtc0 => (
                format!("$cop0_data[{}] = {}", self.reg_d, gpr::name(self.reg_t)),
                vec![],
            ),
            Opcode::Mtc2 => (
                format!("$cop2_data[{}] = {}", self.reg_d, gpr::name(self.reg_t)),
                vec![],
            ),

            Opcode::Div | Opcode::Divu | Opcode::Mult | Opcode::Multu => (
                format!("$hi, $lo = {}", self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_s), Operand::Reg(self.reg_t)],
            ),

            Opcode::J | Opcode::Jal => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::UInt(self.fixed_jump_target(at))],
            ),

            Opcode::Jalr | Opcode::Jr => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::Reg(self.reg_s)],
            ),

            Opcode::Lb | Opcode::Lbu | Opcode::Lh | Opcode::Lhu | Opcode::Lw => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![mem_operand(self.reg_s, self.imm)],
            ),

            Opcode::Lui => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Text(format!("{:#06x}", self.imm))],
            ),

            Opcode::Lwc2 => (
                format!("$cop2_data[{}] = {}", self.reg_t, self.opcode.mnemonic()),
                vec![mem_operand(self.reg_s, self.imm)],
            ),

            // Partial-word loads merge into the destination, so it shows up
            // as a source operand too.
            Opcode::Lwl | Opcode::Lwr => (
                format!("{} = {}", dest(self), self.opcode.mnemonic()),
                vec![Operand::Reg(self.reg_t), mem_operand(self.reg_s, self.imm)],
            ),

            Opcode::Mfhi => (format!("{} = $hi", gpr::name(self.reg_d)), vec![]),
            Opcode::Mflo => (format!("{} = $lo", gpr::name(self.reg_d)), vec![]),
            Opcode::Mthi => (format!("$hi = {}", gpr::name(self.reg_s)), vec![]),
            Opcode::Mtlo => (format!("$lo = {}", gpr::name(self.reg_s)), vec![]),

            Opcode::Sb | Opcode::Sh | Opcode::Sw | Opcode::Swl | Opcode::Swr => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::Reg(self.reg_t), mem_operand(self.reg_s, self.imm)],
            ),

            Opcode::Swc2 => (
                self.opcode.mnemonic().to_string(),
                vec![
                    Operand::Text(format!("$cop2_data[{}]", self.reg_t)),
                    mem_operand(self.reg_s, self.imm),
                ],
            ),

            Opcode::Teq | Opcode::Tge | Opcode::Tgeu | Opcode::Tlt | Opcode::Tltu | Opcode::Tne => (
                self.opcode.mnemonic().to_string(),
                vec![
                    Operand::Reg(self.reg_s),
                    Operand::Reg(self.reg_t),
                    Operand::UInt(self.imm),
                ],
            ),

            Opcode::Teqi | Opcode::Tgei | Opcode::Tlti | Opcode::Tnei => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::Reg(self.reg_s), Operand::SInt(sext16(self.imm))],
            ),

            Opcode::Tgeiu | Opcode::Tltiu => (
                self.opcode.mnemonic().to_string(),
                vec![Operand::Reg(self.reg_s), Operand::UInt(sext16(self.imm) as u32)],
            ),
        };

        Asm { op_name, operands }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rtype() {
        let instr = Instr::decode(0x0085_1021); // addu $v0, $a0, $a1
        assert_eq!(instr.asm(0).to_string(), "$v0 = addu $a0, $a1");
    }

    #[test]
    fn display_loads_and_stores() {
        let lw = Instr::decode(0x8C82_0010);
        assert_eq!(lw.asm(0).to_string(), "$v0 = lw [$a0 + 0x10]");

        let sw = Instr::decode(0xAFBF_0014); // sw $ra, 0x14($sp)
        assert_eq!(sw.asm(0).to_string(), "sw $ra, [$sp + 0x14]");

        let negative = Instr::decode(0x8FA2_FFFC); // lw $v0, -4($sp)
        assert_eq!(negative.asm(0).to_string(), "$v0 = lw [$sp - 0x4]");

        let zero_off = Instr::decode(0x8C82_0000);
        assert_eq!(zero_off.asm(0).to_string(), "$v0 = lw [$a0]");
    }

    #[test]
    fn display_branches_resolve_targets() {
        // beq $v0, $zero, +3 words from 0x80010000
        let beq = Instr::decode(0x1040_0003);
        assert_eq!(beq.asm(0x8001_0000).to_string(), "beq $v0, $zero, 0x80010010");
    }

    #[test]
    fn display_jumps() {
        let jr = Instr::decode(0x03E0_0008);
        assert_eq!(jr.asm(0).to_string(), "jr $ra");

        let jal = Instr::decode(0x0C00_489D);
        assert_eq!(jal.asm(0x8003_0000).to_string(), "jal 0x80012274");
    }

    #[test]
    fn display_lui_pads_to_four_digits() {
        let lui = Instr::decode(0x3C1C_8005);
        assert_eq!(lui.asm(0).to_string(), "$gp = lui 0x8005");
    }

    #[test]
    fn display_hi_lo_moves() {
        let mflo = Instr::decode(0x0000_1012); // mflo $v0
        assert_eq!(mflo.asm(0).to_string(), "$v0 = $lo");

        let mfhi = Instr::decode(0x0000_1010); // mfhi $v0
        assert_eq!(mfhi.asm(0).to_string(), "$v0 = $hi");
    }

    #[test]
    fn display_small_ints_in_decimal() {
        let sll = Instr::decode(0x0004_1080); // sll $v0, $a0, 2
        assert_eq!(sll.asm(0).to_string(), "$v0 = sll $a0, 2");

        let addiu = Instr::decode(0x2442_0030); // addiu $v0, $v0, 0x30
        assert_eq!(addiu.asm(0).to_string(), "$v0 = addiu $v0, 0x30");

        let stack = Instr::decode(0x27BD_FFE8); // addiu $sp, $sp, -0x18
        assert_eq!(stack.asm(0).to_string(), "$sp = addiu $sp, -0x18");
    }
}
