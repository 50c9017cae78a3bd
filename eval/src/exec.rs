// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-instruction transfer function.

use exegesis_mips::{Instr, Opcode};

use crate::RegisterState;

fn sext16(imm: u32) -> u32 {
    imm as u16 as i16 as i32 as u32
}

/// Applies one instruction's register effect to `regs`.
///
/// If any input of an operation is unknown its result is unknown. Reads are
/// taken before any write lands, so `regs` may serve as both input and
/// output state.
pub fn exec(instr: &Instr, regs: &mut RegisterState) {
    let dest = instr.dest_gpr();
    let s = regs.gpr(instr.reg_s);
    let t = regs.gpr(instr.reg_t);

    match instr.opcode {
        // Trapping signed arithmetic. On 32-bit overflow the processor
        // raises an exception instead of writing, so the destination is
        // left exactly as it was.
        Opcode::Add | Opcode::Addi | Opcode::Sub => {
            let rhs = if instr.opcode == Opcode::Addi { Some(sext16(instr.imm)) } else { t };

            match (s, rhs) {
                (Some(s), Some(rhs)) => {
                    let s = i64::from(s as i32);
                    let rhs = i64::from(rhs as i32);
                    let result = if instr.opcode == Opcode::Sub { s - rhs } else { s + rhs };

                    if result >= i64::from(i32::MIN) && result <= i64::from(i32::MAX) {
                        regs.assign_gpr(dest, Some(result as u32));
                    }
                }
                _ => regs.assign_gpr(dest, None),
            }
        }

        Opcode::Addiu => {
            regs.assign_gpr(dest, s.map(|s| s.wrapping_add(sext16(instr.imm))));
        }

        // Two-register ALU operations.
        Opcode::Addu => regs.assign_gpr(dest, binary(s, t, |s, t| s.wrapping_add(t))),
        Opcode::Subu => regs.assign_gpr(dest, binary(s, t, |s, t| s.wrapping_sub(t))),
        Opcode::And => regs.assign_gpr(dest, binary(s, t, |s, t| s & t)),
        Opcode::Or => regs.assign_gpr(dest, binary(s, t, |s, t| s | t)),
        Opcode::Xor => regs.assign_gpr(dest, binary(s, t, |s, t| s ^ t)),
        Opcode::Nor => regs.assign_gpr(dest, binary(s, t, |s, t| !(s | t))),
        Opcode::Slt => {
            regs.assign_gpr(dest, binary(s, t, |s, t| ((s as i32) < (t as i32)) as u32));
        }
        Opcode::Sltu => regs.assign_gpr(dest, binary(s, t, |s, t| (s < t) as u32)),

        // Immediate ALU operations. The bitwise group zero-extends its
        // immediate; the comparisons sign-extend.
        Opcode::Andi => regs.assign_gpr(dest, s.map(|s| s & instr.imm)),
        Opcode::Ori => regs.assign_gpr(dest, s.map(|s| s | instr.imm)),
        Opcode::Xori => regs.assign_gpr(dest, s.map(|s| s ^ instr.imm)),
        Opcode::Slti => {
            regs.assign_gpr(
                dest,
                s.map(|s| ((s as i32) < (sext16(instr.imm) as i32)) as u32),
            );
        }
        Opcode::Sltiu => {
            regs.assign_gpr(dest, s.map(|s| (s < sext16(instr.imm)) as u32));
        }

        Opcode::Lui => regs.assign_gpr(dest, Some(instr.imm << 16)),

        // Shifts. Fixed shifts take their amount from the immediate,
        // variable shifts from the low 5 bits of `regS`.
        Opcode::Sll => regs.assign_gpr(dest, t.map(|t| t << (instr.imm & 0x1F))),
        Opcode::Srl => regs.assign_gpr(dest, t.map(|t| t >> (instr.imm & 0x1F))),
        Opcode::Sra => {
            regs.assign_gpr(dest, t.map(|t| ((t as i32) >> (instr.imm & 0x1F)) as u32));
        }
        Opcode::Sllv => regs.assign_gpr(dest, binary(s, t, |s, t| t << (s & 0x1F))),
        Opcode::Srlv => regs.assign_gpr(dest, binary(s, t, |s, t| t >> (s & 0x1F))),
        Opcode::Srav => {
            regs.assign_gpr(dest, binary(s, t, |s, t| ((t as i32) >> (s & 0x1F)) as u32));
        }

        // Division by zero leaves HI and LO undefined on the real CPU.
        Opcode::Div => match (s, t) {
            (Some(s), Some(t)) if t != 0 => {
                let s = s as i32;
                let t = t as i32;
                regs.set_lo(Some(s.wrapping_div(t) as u32));
                regs.set_hi(Some(s.wrapping_rem(t) as u32));
            }
            _ => regs.clear_hi_and_lo(),
        },
        Opcode::Divu => match (s, t) {
            (Some(s), Some(t)) if t != 0 => {
                regs.set_lo(Some(s / t));
                regs.set_hi(Some(s % t));
            }
            _ => regs.clear_hi_and_lo(),
        },

        Opcode::Mult => match (s, t) {
            (Some(s), Some(t)) => {
                let product = i64::from(s as i32) * i64::from(t as i32);
                regs.set_lo(Some(product as u32));
                regs.set_hi(Some((product as u64 >> 32) as u32));
            }
            _ => regs.clear_hi_and_lo(),
        },
        Opcode::Multu => match (s, t) {
            (Some(s), Some(t)) => {
                let product = u64::from(s) * u64::from(t);
                regs.set_lo(Some(product as u32));
                regs.set_hi(Some((product >> 32) as u32));
            }
            _ => regs.clear_hi_and_lo(),
        },

        Opcode::Mfhi => regs.assign_gpr(dest, regs.hi()),
        Opcode::Mflo => regs.assign_gpr(dest, regs.lo()),
        Opcode::Mthi => regs.set_hi(s),
        Opcode::Mtlo => regs.set_lo(s),

        // Memory and coprocessor reads cannot be constant-folded: the
        // destination becomes unknown.
        Opcode::Lb
        | Opcode::Lbu
        | Opcode::Lh
        | Opcode::Lhu
        | Opcode::Lw
        | Opcode::Lwl
        | Opcode::Lwr
        | Opcode::Cfc2
        | Opcode::Mfc0
        | Opcode::Mfc2 => regs.assign_gpr(dest, None),

        // No idea what state these leave behind; forget everything.
        Opcode::Break
        | Opcode::Syscall
        | Opcode::Tlbp
        | Opcode::Tlbr
        | Opcode::Tlbwi
        | Opcode::Tlbwr => regs.clear_all(),

        // Everything else has no register effect: branches and jumps,
        // stores, coprocessor writes, GTE commands, RFE, the trap group
        // (not actually implemented by this CPU), and LWC2 which targets a
        // coprocessor register.
        _ => {}
    }
}

fn binary(s: Option<u32>, t: Option<u32>, f: impl FnOnce(u32, u32) -> u32) -> Option<u32> {
    match (s, t) {
        (Some(s), Some(t)) => Some(f(s, t)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use exegesis_mips::gpr;

    use super::*;

    fn run(word: u32, setup: impl FnOnce(&mut RegisterState)) -> RegisterState {
        let mut regs = RegisterState::unknown();
        setup(&mut regs);
        exec(&Instr::decode(word), &mut regs);
        regs
    }

    #[test]
    fn lui_is_always_known() {
        let regs = run(0x3C1C_8005, |_| {}); // lui $gp, 0x8005
        assert_eq!(regs.gpr(gpr::GP), Some(0x8005_0000));
    }

    #[test]
    fn addiu_sign_extends() {
        let regs = run(0x27BD_FFE8, |regs| {
            regs.set_gpr(gpr::SP, Some(0x8020_0000)); // addiu $sp, $sp, -0x18
        });
        assert_eq!(regs.gpr(gpr::SP), Some(0x801F_FFE8));
    }

    #[test]
    fn unknown_input_poisons_output() {
        // addu $v0, $a0, $a1 with $a1 unknown
        let regs = run(0x0085_1021, |regs| {
            regs.set_gpr(gpr::A0, Some(10));
        });
        assert_eq!(regs.gpr(gpr::V0), None);
    }

    #[test]
    fn add_overflow_leaves_dest_untouched() {
        // add $v0, $a0, $a1 overflowing i32
        let regs = run(0x0085_1020, |regs| {
            regs.set_gpr(gpr::A0, Some(0x7FFF_FFFF));
            regs.set_gpr(gpr::A1, Some(1));
            regs.set_gpr(gpr::V0, Some(0xDEAD));
        });
        assert_eq!(regs.gpr(gpr::V0), Some(0xDEAD));
    }

    #[test]
    fn div_by_zero_clears_hi_lo() {
        // div $a0, $a1
        let regs = run(0x0085_001A, |regs| {
            regs.set_gpr(gpr::A0, Some(100));
            regs.set_gpr(gpr::A1, Some(0));
            regs.set_hi(Some(1));
            regs.set_lo(Some(2));
        });
        assert_eq!(regs.hi(), None);
        assert_eq!(regs.lo(), None);
    }

    #[test]
    fn div_computes_quotient_and_remainder() {
        let regs = run(0x0085_001A, |regs| {
            regs.set_gpr(gpr::A0, Some((-7i32) as u32));
            regs.set_gpr(gpr::A1, Some(2));
        });
        assert_eq!(regs.lo(), Some((-3i32) as u32));
        assert_eq!(regs.hi(), Some((-1i32) as u32));
    }

    #[test]
    fn mult_splits_across_hi_lo() {
        // mult $a0, $a1
        let regs = run(0x0085_0018, |regs| {
            regs.set_gpr(gpr::A0, Some(0x0001_0000));
            regs.set_gpr(gpr::A1, Some(0x0001_0000));
        });
        assert_eq!(regs.lo(), Some(0));
        assert_eq!(regs.hi(), Some(1));
    }

    #[test]
    fn loads_clear_their_destination() {
        let regs = run(0x8C82_0010, |regs| {
            regs.set_gpr(gpr::V0, Some(7)); // lw $v0, 0x10($a0)
        });
        assert_eq!(regs.gpr(gpr::V0), None);
    }

    #[test]
    fn break_clears_everything() {
        let regs = run(0x0000_000D, |regs| {
            regs.set_gpr(gpr::S0, Some(1));
            regs.set_lo(Some(2));
        });
        assert_eq!(regs.gpr(gpr::S0), None);
        assert_eq!(regs.lo(), None);
        assert_eq!(regs.gpr(gpr::ZERO), Some(0));
    }

    #[test]
    fn stores_and_branches_have_no_register_effect() {
        let regs = run(0xAFBF_0014, |regs| {
            regs.set_gpr(gpr::RA, Some(0x8001_0000)); // sw $ra, 0x14($sp)
        });
        assert_eq!(regs.gpr(gpr::RA), Some(0x8001_0000));

        let regs = run(0x1040_0003, |regs| {
            regs.set_gpr(gpr::V0, Some(3)); // beq $v0, $zero, ...
        });
        assert_eq!(regs.gpr(gpr::V0), Some(3));
    }

    #[test]
    fn transfer_is_deterministic() {
        let word = 0x0085_1021;
        let a = run(word, |regs| regs.set_gpr(gpr::A0, Some(1)));
        let b = run(word, |regs| regs.set_gpr(gpr::A0, Some(1)));
        assert_eq!(a, b);
    }
}
