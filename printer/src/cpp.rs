// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pseudo-C++ rendition of the program.
//!
//! Every function element prints as a C++ function over register-alias
//! globals, with branch delay slots reordered away and `goto` labels at
//! every referenced word. The output is meant for studying control flow,
//! not for compiling as-is.

use std::collections::BTreeSet;
use std::io::Write;

use exegesis_eval::{ConstEvaluator, RegisterState};
use exegesis_exe::{Exe, JrTarget, ProgElem, ProgElemKind, ScalarKind};
use exegesis_mips::{gpr, Instr, Opcode};

use crate::commenter::{comment_for_instr, comment_padding};
use crate::Error;

pub fn print_exe_cpp(exe: &Exe, out: &mut impl Write) -> Result<(), Error> {
    writeln!(out, "#include \"PsxVm.h\"")?;
    writeln!(out)?;

    for idx in 0..gpr::NUM_GPRS as u8 {
        writeln!(out, "#define {:<4} vm_regs[{}]", gpr::cpp_name(idx), idx)?;
    }
    writeln!(out)?;

    for elem in exe.prog_elems() {
        if elem.is_function() {
            crate::validate_elem(exe, elem)?;
            writeln!(out, "void {}() noexcept;", elem.display_name())?;
        }
    }
    writeln!(out)?;

    let mut evaluator = ConstEvaluator::new();

    for elem in exe.prog_elems() {
        if elem.is_function() {
            print_function(exe, elem, &mut evaluator, out)?;
        }
    }

    Ok(())
}

fn print_function(
    exe: &Exe,
    elem: &ProgElem,
    evaluator: &mut ConstEvaluator,
    out: &mut impl Write,
) -> Result<(), Error> {
    let start_idx = ((elem.start_addr - exe.base_addr) / 4) as usize;
    let end_idx = ((elem.end_addr - exe.base_addr) / 4) as usize;

    // Evaluate constants across the function first so loads and stores with
    // known addresses can be commented.
    let words = exe.words[start_idx..end_idx].iter().map(|word| word.value).collect::<Vec<_>>();
    let mut input = RegisterState::unknown();
    if let Some(gp) = exe.assumed_gp {
        input.set_gpr(gpr::GP, Some(gp));
    }
    evaluator
        .eval_function(elem.start_addr, &words, &input)
        .map_err(|_| Error::MisalignedFunction { name: elem.display_name() })?;

    writeln!(out, "void {}() noexcept {{", elem.display_name())?;

    let mut word_idx = start_idx;
    while word_idx < end_idx {
        let at = exe.base_addr + (word_idx as u32) * 4;
        let next_at = at + 4;
        let instr = Instr::decode(exe.words[word_idx].value);
        let next = if word_idx + 1 < end_idx {
            Instr::decode(exe.words[word_idx + 1].value)
        } else {
            Instr::decode(0)
        };

        // MIPS-I load delay slots are not modelled: refuse code that reads
        // the stale pre-load value.
        if let Some(dest) = instr.dest_gpr() {
            if instr.opcode.is_load_delayed() && dest != gpr::ZERO && next.uses_input_gpr(dest) {
                return Err(Error::LoadDelayHazard { at: next_at });
            }
        }
        if instr.opcode.is_branch_or_jump() && next.opcode.is_branch_or_jump() {
            return Err(Error::AdjacentControlTransfer { at: next_at });
        }

        if instr.opcode.is_branch_or_jump() {
            print_transfer(exe, evaluator, &instr, at, &next, next_at, 4, out)?;
            word_idx += 2;
        } else {
            print_simple(exe, evaluator, &instr, at, 4, out)?;
            word_idx += 1;
        }
    }

    writeln!(out, "}}")?;
    writeln!(out)?;

    Ok(())
}

/// One straight-line instruction: its `goto` label if the word is
/// referenced, the statement, and the evaluator's comment when one applies.
fn print_simple(
    exe: &Exe,
    evaluator: &ConstEvaluator,
    instr: &Instr,
    at: u32,
    indent: usize,
    out: &mut impl Write,
) -> Result<(), Error> {
    if exe.word_at(at).is_some_and(|word| word.is_referenced()) {
        writeln!(out, "loc_{:08x}:", at)?;
    }

    if instr.is_nop() {
        return Ok(());
    }

    let line = format!("{:indent$}{};", "", statement(instr));
    write!(out, "{}", line)?;

    if let Some(comment) = comment_for_instr(instr, at, exe, evaluator) {
        write!(out, "{}// {}", comment_padding(line.len()), comment)?;
    }
    writeln!(out)?;

    Ok(())
}

/// A branch or jump plus its delay slot, reordered so the delay-slot
/// instruction executes first in the printed program.
#[allow(clippy::too_many_arguments)]
fn print_transfer(
    exe: &Exe,
    evaluator: &ConstEvaluator,
    instr: &Instr,
    at: u32,
    delay: &Instr,
    delay_at: u32,
    indent: usize,
    out: &mut impl Write,
) -> Result<(), Error> {
    if exe.word_at(at).is_some_and(|word| word.is_referenced()) {
        writeln!(out, "loc_{:08x}:", at)?;
    }

    // A branch condition can be evaluated after the delay slot only when
    // the delay slot does not overwrite one of its inputs.
    let late_cond = match delay.dest_gpr() {
        Some(dest) => !instr.uses_input_gpr(dest) || delay.is_nop(),
        None => true,
    };

    if instr.opcode.is_branch() && !late_cond {
        // Capture the condition ahead of the delay-slot statement.
        let inner = indent + 4;
        writeln!(out, "{:indent$}{{", "")?;
        writeln!(out, "{:inner$}const bool bJump = {};", "", branch_cond(instr))?;
        print_simple(exe, evaluator, delay, delay_at, inner, out)?;
        writeln!(out, "{:inner$}if (bJump) goto loc_{:08x};", "", instr.branch_target(at))?;
        writeln!(out, "{:indent$}}}", "")?;
        return Ok(());
    }

    print_simple(exe, evaluator, delay, delay_at, indent, out)?;

    if instr.opcode.is_branch() {
        let target = instr.branch_target(at);
        if instr.is_branch_always() {
            writeln!(out, "{:indent$}goto loc_{:08x};", "", target)?;
        } else {
            writeln!(out, "{:indent$}if ({}) goto loc_{:08x};", "", branch_cond(instr), target)?;
        }
        return Ok(());
    }

    match instr.opcode {
        Opcode::J => {
            writeln!(out, "{:indent$}goto loc_{:08x};", "", instr.fixed_jump_target(at))?;
        }
        Opcode::Jal => {
            writeln!(out, "{:indent$}{}();", "", exe.name_at_addr(instr.fixed_jump_target(at)))?;
        }
        Opcode::Jalr => {
            writeln!(out, "{:indent$}ptr_call({});", "", gpr::cpp_name(instr.reg_s))?;
        }
        Opcode::Jr if instr.reg_s == gpr::RA => {
            writeln!(out, "{:indent$}return;", "")?;
        }
        Opcode::Jr => {
            let handler = exe.jr_handler_at(at).ok_or(Error::UnknownJrTarget { at })?;

            match handler.target {
                JrTarget::BiosCall => {
                    writeln!(out, "{:indent$}bios_call({});", "", gpr::cpp_name(instr.reg_s))?;
                }
                JrTarget::JumpTable { table_addr } => {
                    print_jump_table_switch(exe, instr, at, table_addr, indent, out)?;
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// A `jr` through a jump table becomes a `switch` with one `case` per
/// distinct table entry.
fn print_jump_table_switch(
    exe: &Exe,
    instr: &Instr,
    at: u32,
    table_addr: u32,
    indent: usize,
    out: &mut impl Write,
) -> Result<(), Error> {
    let table = exe
        .find_prog_elem(table_addr)
        .filter(|elem| elem.kind == ProgElemKind::Array(ScalarKind::Ptr32))
        .ok_or(Error::UnknownJrTarget { at })?;

    let start_idx = ((table.start_addr - exe.base_addr) / 4) as usize;
    let end_idx = ((table.end_addr - exe.base_addr) / 4) as usize;
    let targets = exe.words[start_idx..end_idx]
        .iter()
        .map(|word| word.value)
        .collect::<BTreeSet<_>>();

    let case_indent = indent + 4;
    writeln!(out, "{:indent$}switch ({}) {{", "", gpr::cpp_name(instr.reg_s))?;
    for target in targets {
        writeln!(out, "{:case_indent$}case {:#010x}: goto loc_{:08x};", "", target, target)?;
    }
    writeln!(out, "{:case_indent$}default: jump_table_err(); break;", "")?;
    writeln!(out, "{:indent$}}}", "")?;

    Ok(())
}

fn branch_cond(instr: &Instr) -> String {
    let s = gpr::cpp_name(instr.reg_s);
    let t = gpr::cpp_name(instr.reg_t);

    match instr.opcode {
        Opcode::Beq if instr.reg_t == gpr::ZERO => format!("{s} == 0"),
        Opcode::Beq => format!("{s} == {t}"),
        Opcode::Bne if instr.reg_t == gpr::ZERO => format!("{s} != 0"),
        Opcode::Bne => format!("{s} != {t}"),
        Opcode::Blez => format!("i32({s}) <= 0"),
        Opcode::Bgtz => format!("i32({s}) > 0"),
        Opcode::Bltz | Opcode::Bltzal => format!("i32({s}) < 0"),
        Opcode::Bgez | Opcode::Bgezal => format!("i32({s}) >= 0"),
        // Only ever called for conditional branches.
        _ => unreachable!(),
    }
}

//
// Statement rendering
//

fn statement(instr: &Instr) -> String {
    match instr.opcode {
        Opcode::Addiu => stmt_addiu(instr),
        Opcode::Addu => stmt_commutative(instr, '+'),
        Opcode::Or => stmt_commutative(instr, '|'),
        Opcode::Subu => stmt_subu(instr),
        Opcode::Ori => stmt_ori(instr),
        Opcode::Sra => stmt_sra(instr),
        Opcode::Lui => {
            format!("{} = {}", gpr::cpp_name(instr.reg_t), dec_or_hex_u32(instr.imm << 16))
        }
        _ => stmt_generic(instr),
    }
}

/// ADDIU has many idiomatic faces: moves, literal assignments, `+=`/`-=`,
/// increments and decrements.
fn stmt_addiu(instr: &Instr) -> String {
    let t = gpr::cpp_name(instr.reg_t);
    let s = gpr::cpp_name(instr.reg_s);
    let imm = instr.imm as u16 as i16 as i32;

    if imm == 0 {
        if instr.reg_s == gpr::ZERO {
            format!("{t} = 0")
        } else {
            format!("{t} = {s}")
        }
    } else if instr.reg_s == gpr::ZERO {
        format!("{t} = {}", dec_or_hex_i32(imm))
    } else if instr.reg_t == instr.reg_s {
        match imm {
            -1 => format!("{t}--"),
            1 => format!("{t}++"),
            _ if imm < 0 => format!("{t} -= {}", dec_or_hex_i32(-imm)),
            _ => format!("{t} += {}", dec_or_hex_i32(imm)),
        }
    } else if imm < 0 {
        format!("{t} = {s} - {}", dec_or_hex_i32(-imm))
    } else {
        format!("{t} = {s} + {}", dec_or_hex_i32(imm))
    }
}

/// ADDU and OR against `$zero` are the assembler's move and zero-assign
/// idioms; when a source aliases the destination the compound form reads
/// better.
fn stmt_commutative(instr: &Instr, op: char) -> String {
    let d = gpr::cpp_name(instr.reg_d);
    let s = gpr::cpp_name(instr.reg_s);
    let t = gpr::cpp_name(instr.reg_t);

    if instr.reg_s == gpr::ZERO && instr.reg_t == gpr::ZERO {
        format!("{d} = 0")
    } else if instr.reg_s == gpr::ZERO {
        format!("{d} = {t}")
    } else if instr.reg_t == gpr::ZERO {
        format!("{d} = {s}")
    } else if instr.reg_s == instr.reg_d {
        format!("{d} {op}= {t}")
    } else if instr.reg_t == instr.reg_d {
        format!("{d} {op}= {s}")
    } else {
        format!("{d} = {s} {op} {t}")
    }
}

fn stmt_subu(instr: &Instr) -> String {
    let d = gpr::cpp_name(instr.reg_d);
    let s = gpr::cpp_name(instr.reg_s);
    let t = gpr::cpp_name(instr.reg_t);

    if instr.reg_s == gpr::ZERO && instr.reg_t == gpr::ZERO {
        format!("{d} = 0")
    } else if instr.reg_s == gpr::ZERO {
        format!("{d} = -{t}")
    } else if instr.reg_t == gpr::ZERO {
        format!("{d} = {s}")
    } else if instr.reg_s == instr.reg_d {
        format!("{d} -= {t}")
    } else {
        format!("{d} = {s} - {t}")
    }
}

fn stmt_ori(instr: &Instr) -> String {
    let t = gpr::cpp_name(instr.reg_t);
    let s = gpr::cpp_name(instr.reg_s);
    let imm = instr.imm;

    if instr.reg_s == gpr::ZERO {
        format!("{t} = {}", dec_or_hex_u32(imm))
    } else if imm == 0 {
        format!("{t} = {s}")
    } else if instr.reg_s == instr.reg_t {
        format!("{t} |= {}", dec_or_hex_u32(imm))
    } else {
        format!("{t} = {s} | {}", dec_or_hex_u32(imm))
    }
}

fn stmt_sra(instr: &Instr) -> String {
    let d = gpr::cpp_name(instr.reg_d);
    let t = gpr::cpp_name(instr.reg_t);
    let shift = instr.imm & 0x1F;

    if instr.reg_t == gpr::ZERO {
        format!("{d} = 0")
    } else if shift == 0 {
        format!("{d} = {t}")
    } else {
        format!("{d} = u32(i32({t}) >> {shift})")
    }
}

/// Everything else prints as a call-style operation with the destination
/// assignment up front.
fn stmt_generic(instr: &Instr) -> String {
    let reg_s = gpr::cpp_name(instr.reg_s);
    let reg_t = gpr::cpp_name(instr.reg_t);
    let imm_i16 = instr.imm as u16 as i16 as i32;

    let args: Vec<String> = match instr.opcode {
        Opcode::Teq | Opcode::Tge | Opcode::Tgeu | Opcode::Tlt | Opcode::Tltu | Opcode::Tne => {
            vec![reg_s.into(), reg_t.into(), hex_u32(instr.imm)]
        }
        Opcode::Add
        | Opcode::And
        | Opcode::Div
        | Opcode::Divu
        | Opcode::Mult
        | Opcode::Multu
        | Opcode::Nor
        | Opcode::Slt
        | Opcode::Sltu
        | Opcode::Sub
        | Opcode::Xor => vec![reg_s.into(), reg_t.into()],
        Opcode::Sllv | Opcode::Srav | Opcode::Srlv => vec![reg_t.into(), reg_s.into()],
        Opcode::Lwl
        | Opcode::Lwr
        | Opcode::Sb
        | Opcode::Sh
        | Opcode::Sw
        | Opcode::Swl
        | Opcode::Swr => vec![reg_t.into(), reg_s.into(), hex_i32(imm_i16)],
        Opcode::Teqi | Opcode::Tgei | Opcode::Tlti | Opcode::Tnei => {
            vec![reg_s.into(), hex_i32(imm_i16)]
        }
        Opcode::Tgeiu | Opcode::Tltiu => vec![reg_s.into(), hex_u32(instr.imm)],
        Opcode::Addi
        | Opcode::Lb
        | Opcode::Lbu
        | Opcode::Lh
        | Opcode::Lhu
        | Opcode::Lw
        | Opcode::Slti
        | Opcode::Sltiu => vec![reg_s.into(), hex_i32(imm_i16)],
        Opcode::Andi | Opcode::Xori => vec![reg_s.into(), hex_u32(instr.imm)],
        Opcode::Sll | Opcode::Srl => vec![reg_t.into(), hex_u32(instr.imm)],
        Opcode::Mthi | Opcode::Mtlo => vec![reg_s.into()],
        Opcode::Break | Opcode::Cop2 | Opcode::Syscall => vec![hex_u32(instr.imm)],
        Opcode::Cfc2 | Opcode::Mfc0 | Opcode::Mfc2 => vec![format!("{}", instr.reg_d)],
        Opcode::Ctc2 | Opcode::Mtc0 | Opcode::Mtc2 => {
            vec![reg_t.into(), format!("{}", instr.reg_d)]
        }
        Opcode::Lwc2 | Opcode::Swc2 => {
            vec![format!("{}", instr.reg_t), reg_s.into(), hex_i32(imm_i16)]
        }
        _ => Vec::new(),
    };

    let mnemonic = match instr.opcode {
        Opcode::Break => "_break",
        Opcode::Invalid => "illegal",
        opcode => opcode.mnemonic(),
    };

    let mut text = String::new();
    if let Some(dest) = instr.dest_gpr() {
        text.push_str(gpr::cpp_name(dest));
        text.push_str(" = ");
    }
    text.push_str(mnemonic);
    text.push('(');
    text.push_str(&args.join(", "));
    text.push(')');
    text
}

fn hex_u32(value: u32) -> String {
    format!("{:#x}", value)
}

fn hex_i32(value: i32) -> String {
    if value < 0 {
        format!("-{:#x}", -(value as i64))
    } else {
        format!("{:#x}", value)
    }
}

fn dec_or_hex_u32(value: u32) -> String {
    if value < 10 {
        format!("{}", value)
    } else {
        hex_u32(value)
    }
}

fn dec_or_hex_i32(value: i32) -> String {
    if (-9..=9).contains(&value) {
        format!("{}", value)
    } else {
        hex_i32(value)
    }
}
