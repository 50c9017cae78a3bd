// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{Instr, Opcode};

impl Instr {
    pub const OP_SPECIAL: u8 = 0b000_000;
    pub const OP_BCOND: u8 = 0b000_001;
    pub const OP_COP0: u8 = 0b010_000;
    pub const OP_COP2: u8 = 0b010_010;

    /// Decodes a 32-bit machine word. Never fails: undefined encodings
    /// yield [`Opcode::Invalid`] with the I-format fields still extracted.
    pub fn decode(word: u32) -> Self {
        let mut instr = Self {
            opcode: Opcode::Invalid,
            reg_s: decode_rs(word),
            reg_t: decode_rt(word),
            reg_d: decode_rd(word),
            imm: u32::from(decode_imm(word)),
        };

        match decode_op(word) {
            Self::OP_SPECIAL => instr.decode_special(word),
            Self::OP_BCOND => instr.decode_bcond(word),
            Self::OP_COP0 => instr.decode_cop0(word),
            Self::OP_COP2 => instr.decode_cop2(word),
            op => instr.decode_normal(op, word),
        }

        instr
    }

    fn decode_normal(&mut self, op: u8, word: u32) {
        self.opcode = match op {
            0b000_010 => Opcode::J,
            0b000_011 => Opcode::Jal,
            0b000_100 => Opcode::Beq,
            0b000_101 => Opcode::Bne,
            0b000_110 => Opcode::Blez,
            0b000_111 => Opcode::Bgtz,

            0b001_000 => Opcode::Addi,
            0b001_001 => Opcode::Addiu,
            0b001_010 => Opcode::Slti,
            0b001_011 => Opcode::Sltiu,
            0b001_100 => Opcode::Andi,
            0b001_101 => Opcode::Ori,
            0b001_110 => Opcode::Xori,
            0b001_111 => Opcode::Lui,

            0b100_000 => Opcode::Lb,
            0b100_001 => Opcode::Lh,
            0b100_010 => Opcode::Lwl,
            0b100_011 => Opcode::Lw,
            0b100_100 => Opcode::Lbu,
            0b100_101 => Opcode::Lhu,
            0b100_110 => Opcode::Lwr,

            0b101_000 => Opcode::Sb,
            0b101_001 => Opcode::Sh,
            0b101_010 => Opcode::Swl,
            0b101_011 => Opcode::Sw,
            0b101_110 => Opcode::Swr,

            0b110_010 => Opcode::Lwc2,
            0b111_010 => Opcode::Swc2,

            _ => Opcode::Invalid,
        };

        if matches!(self.opcode, Opcode::J | Opcode::Jal) {
            self.imm = decode_target(word);
        }
    }

    fn decode_special(&mut self, word: u32) {
        let funct = decode_funct(word);

        self.opcode = match funct {
            0b000_000 => Opcode::Sll,
            0b000_010 => Opcode::Srl,
            0b000_011 => Opcode::Sra,
            0b000_100 => Opcode::Sllv,
            0b000_110 => Opcode::Srlv,
            0b000_111 => Opcode::Srav,

            0b001_000 => Opcode::Jr,
            0b001_001 => Opcode::Jalr,
            0b001_100 => Opcode::Syscall,
            0b001_101 => Opcode::Break,

            0b010_000 => Opcode::Mfhi,
            0b010_001 => Opcode::Mthi,
            0b010_010 => Opcode::Mflo,
            0b010_011 => Opcode::Mtlo,

            0b011_000 => Opcode::Mult,
            0b011_001 => Opcode::Multu,
            0b011_010 => Opcode::Div,
            0b011_011 => Opcode::Divu,

            0b100_000 => Opcode::Add,
            0b100_001 => Opcode::Addu,
            0b100_010 => Opcode::Sub,
            0b100_011 => Opcode::Subu,
            0b100_100 => Opcode::And,
            0b100_101 => Opcode::Or,
            0b100_110 => Opcode::Xor,
            0b100_111 => Opcode::Nor,

            0b101_010 => Opcode::Slt,
            0b101_011 => Opcode::Sltu,

            0b110_000 => Opcode::Tge,
            0b110_001 => Opcode::Tgeu,
            0b110_010 => Opcode::Tlt,
            0b110_011 => Opcode::Tltu,
            0b110_100 => Opcode::Teq,
            0b110_110 => Opcode::Tne,

            _ => Opcode::Invalid,
        };

        self.imm = match self.opcode {
            // Fixed shifts carry the shift amount where other R-types
            // carry nothing.
            Opcode::Sll | Opcode::Srl | Opcode::Sra => u32::from(decode_shamt(word)),
            // Trap, break and syscall codes live between the register
            // fields and the funct field.
            Opcode::Syscall | Opcode::Break => (word >> 6) & 0xF_FFFF,
            op if op.is_trap() => (word >> 6) & 0x3FF,
            _ => 0,
        };
    }

    fn decode_bcond(&mut self, word: u32) {
        // The branch variant is selected by the T field.
        self.opcode = match decode_rt(word) {
            0b00_000 => Opcode::Bltz,
            0b00_001 => Opcode::Bgez,
            0b01_000 => Opcode::Tgei,
            0b01_001 => Opcode::Tgeiu,
            0b01_010 => Opcode::Tlti,
            0b01_011 => Opcode::Tltiu,
            0b01_100 => Opcode::Teqi,
            0b01_110 => Opcode::Tnei,
            0b10_000 => Opcode::Bltzal,
            0b10_001 => Opcode::Bgezal,
            _ => Opcode::Invalid,
        };
    }

    fn decode_cop0(&mut self, word: u32) {
        self.opcode = match decode_rs(word) {
            0b00_000 => Opcode::Mfc0,
            0b00_100 => Opcode::Mtc0,
            // The CO bit: a coprocessor 0 command, selected by funct.
            0b10_000 => match decode_funct(word) {
                0b000_001 => Opcode::Tlbr,
                0b000_010 => Opcode::Tlbwi,
                0b000_110 => Opcode::Tlbwr,
                0b001_000 => Opcode::Tlbp,
                0b010_000 => Opcode::Rfe,
                _ => Opcode::Invalid,
            },
            _ => Opcode::Invalid,
        };
        self.imm = 0;
    }

    fn decode_cop2(&mut self, word: u32) {
        let rs = decode_rs(word);

        if rs & 0b10_000 != 0 {
            // GTE command; the low 25 bits parameterize it.
            self.opcode = Opcode::Cop2;
            self.imm = word & 0x01FF_FFFF;
        } else {
            self.opcode = match rs {
                0b00_000 => Opcode::Mfc2,
                0b00_010 => Opcode::Cfc2,
                0b00_100 => Opcode::Mtc2,
                0b00_110 => Opcode::Ctc2,
                _ => Opcode::Invalid,
            };
            self.imm = 0;
        }
    }
}

macro_rules! def_decode_instr_part {
    ($fn_name:ident, $lo:literal..$hi:literal, $ty:ty) => {
        #[inline(always)]
        fn $fn_name(word: u32) -> $ty {
            ((word >> $lo) & ((1 << ($hi - $lo)) - 1)) as $ty
        }
    };
}

def_decode_instr_part!(decode_op, 26..32, u8);
def_decode_instr_part!(decode_rs, 21..26, u8);
def_decode_instr_part!(decode_rt, 16..21, u8);
def_decode_instr_part!(decode_rd, 11..16, u8);
def_decode_instr_part!(decode_shamt, 6..11, u8);
def_decode_instr_part!(decode_funct, 0..6, u8);
def_decode_instr_part!(decode_imm, 0..16, u16);
def_decode_instr_part!(decode_target, 0..26, u32);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpr;

    fn decode(word: u32) -> Instr {
        Instr::decode(word)
    }

    #[test]
    fn decode_is_total() {
        // No word may panic the decoder; undefined encodings must come out
        // as Invalid rather than garbage opcodes.
        for _ in 0..100_000 {
            let word: u32 = rand::random();
            let instr = decode(word);
            let _ = instr.opcode.mnemonic();
        }
    }

    #[test]
    fn decode_word_zero_is_canonical_nop() {
        let instr = decode(0);
        assert_eq!(instr.opcode, Opcode::Sll);
        assert_eq!(instr.reg_d, gpr::ZERO);
        assert_eq!(instr.reg_t, gpr::ZERO);
        assert_eq!(instr.imm, 0);
        assert!(instr.is_nop());
    }

    #[test]
    fn decode_itype() {
        // lui $gp, 0x8005 <=> 3C 1C 80 05 big-endian mnemonic order
        let instr = decode(0x3C1C_8005);
        assert_eq!(instr.opcode, Opcode::Lui);
        assert_eq!(instr.reg_t, gpr::GP);
        assert_eq!(instr.imm, 0x8005);

        // addiu $sp, $sp, -0x18
        let instr = decode(0x27BD_FFE8);
        assert_eq!(instr.opcode, Opcode::Addiu);
        assert_eq!(instr.reg_s, gpr::SP);
        assert_eq!(instr.reg_t, gpr::SP);
        assert_eq!(instr.imm, 0xFFE8);

        // lw $v0, 0x10($a0)
        let instr = decode(0x8C82_0010);
        assert_eq!(instr.opcode, Opcode::Lw);
        assert_eq!(instr.reg_s, gpr::A0);
        assert_eq!(instr.reg_t, gpr::V0);
        assert_eq!(instr.imm, 0x10);
    }

    #[test]
    fn decode_jtype() {
        // jal 0x80012274
        let instr = decode(0x0C00_489D);
        assert_eq!(instr.opcode, Opcode::Jal);
        assert_eq!(instr.imm, 0x489D);
        assert_eq!(instr.fixed_jump_target(0x8003_0000), 0x8001_2274);
    }

    #[test]
    fn decode_special() {
        // addu $v0, $a0, $a1
        let instr = decode(0x0085_1021);
        assert_eq!(instr.opcode, Opcode::Addu);
        assert_eq!(instr.reg_s, gpr::A0);
        assert_eq!(instr.reg_t, gpr::A1);
        assert_eq!(instr.reg_d, gpr::V0);

        // jr $ra
        let instr = decode(0x03E0_0008);
        assert_eq!(instr.opcode, Opcode::Jr);
        assert_eq!(instr.reg_s, gpr::RA);

        // jalr $t9 (rd = $ra)
        let instr = decode(0x0320_F809);
        assert_eq!(instr.opcode, Opcode::Jalr);
        assert_eq!(instr.reg_s, gpr::T9);
        assert_eq!(instr.reg_d, gpr::RA);

        // sllv $v0, $a0, $a1: funct 0b000100 is the *variable* shift
        let instr = decode(0x00A4_1004);
        assert_eq!(instr.opcode, Opcode::Sllv);

        // sll $v0, $a0, 2
        let instr = decode(0x0004_1080);
        assert_eq!(instr.opcode, Opcode::Sll);
        assert_eq!(instr.imm, 2);
    }

    #[test]
    fn decode_bcond() {
        // bltz $a0, +4 words
        let instr = decode(0x0480_0004);
        assert_eq!(instr.opcode, Opcode::Bltz);
        assert_eq!(instr.reg_s, gpr::A0);

        // bgezal $s0, ...
        let instr = decode(0x0611_0004);
        assert_eq!(instr.opcode, Opcode::Bgezal);

        // teqi $v0, 0
        let instr = decode(0x044C_0000);
        assert_eq!(instr.opcode, Opcode::Teqi);

        // undefined bcond variant
        let instr = decode(0x0447_0000);
        assert_eq!(instr.opcode, Opcode::Invalid);
    }

    #[test]
    fn decode_cop0() {
        // mfc0 $t0, $12
        let instr = decode(0x4008_6000);
        assert_eq!(instr.opcode, Opcode::Mfc0);
        assert_eq!(instr.reg_t, gpr::T0);
        assert_eq!(instr.reg_d, 12);

        // rfe
        let instr = decode(0x4200_0010);
        assert_eq!(instr.opcode, Opcode::Rfe);

        // tlbwi
        let instr = decode(0x4200_0002);
        assert_eq!(instr.opcode, Opcode::Tlbwi);
    }

    #[test]
    fn decode_cop2() {
        // mtc2 $t0, $5
        let instr = decode(0x4888_2800);
        assert_eq!(instr.opcode, Opcode::Mtc2);
        assert_eq!(instr.reg_t, gpr::T0);
        assert_eq!(instr.reg_d, 5);

        // GTE command with the CO bit set
        let instr = decode(0x4A18_0001);
        assert_eq!(instr.opcode, Opcode::Cop2);
        assert_eq!(instr.imm, 0x0018_0001);
    }

    #[test]
    fn decode_traps() {
        // teq $v0, $v1, code 7
        let instr = decode(0x0043_01F4);
        assert_eq!(instr.opcode, Opcode::Teq);
        assert_eq!(instr.imm, 7);

        // break 0x404
        let instr = decode(0x0001_010D);
        assert_eq!(instr.opcode, Opcode::Break);
        assert_eq!(instr.imm, 0x404);
    }

    #[test]
    fn undefined_primary_opcodes_are_invalid() {
        for op in [0b010_001u32, 0b010_011, 0b011_000, 0b100_111, 0b111_111] {
            let instr = decode(op << 26);
            assert!(instr.opcode.is_illegal(), "op {:#08b} should be illegal", op);
        }
    }
}
