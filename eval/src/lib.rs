// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Branch-aware constant evaluation of MIPS functions.
//!
//! This is a deliberately blunt instrument: it walks every control-flow path
//! through one function, tracking which registers provably hold constants,
//! and meets states where paths rejoin. It exists to answer questions like
//! "what address does this `sw` actually hit" so disassembly can be
//! annotated, not to be a precise abstract interpreter.

mod exec;
mod state;

use std::fmt;

use exegesis_mips::Instr;

pub use exec::exec;
pub use state::RegisterState;

/// How many times one instruction may be re-evaluated before a path gives
/// up. Anything above 1 lets constants survive through loop bodies; 3 was
/// found to be enough in practice and keeps pathological flow graphs cheap.
pub const MAX_INSTRUCTION_EVALUATIONS: u16 = 3;

/// Everything learned about a single instruction slot.
#[derive(Clone, Debug)]
pub struct InstrEvalState {
    pub instr: Instr,
    pub reg_in: RegisterState,
    pub reg_out: RegisterState,
    pub exec_count: u16,
}

/// A pending path of execution: start evaluating at `instr_idx` with the
/// given register state.
#[derive(Clone, Debug)]
struct BranchPath {
    instr_idx: u32,
    regs: RegisterState,
}

#[derive(Debug)]
pub enum EvalError {
    /// The function's start address is not word-aligned.
    MisalignedFunction { start_addr: u32 },
    /// The function contains no instructions.
    EmptyFunction { start_addr: u32 },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MisalignedFunction { start_addr } => {
                write!(f, "function start {:#010x} is not 32-bit aligned", start_addr)
            }
            Self::EmptyFunction { start_addr } => {
                write!(f, "function at {:#010x} contains no instructions", start_addr)
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// The evaluator itself. One instance may be reused across functions; each
/// [`ConstEvaluator::eval_function`] call resets it.
#[derive(Default)]
pub struct ConstEvaluator {
    func_start_addr: u32,
    func_end_addr: u32,
    instrs: Vec<InstrEvalState>,
    paths: Vec<BranchPath>,
}

impl ConstEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates every path through the function whose words are given,
    /// starting with `input` as the register state on entry.
    pub fn eval_function(
        &mut self,
        start_addr: u32,
        words: &[u32],
        input: &RegisterState,
    ) -> Result<(), EvalError> {
        if start_addr % 4 != 0 {
            return Err(EvalError::MisalignedFunction { start_addr });
        }
        if words.is_empty() {
            return Err(EvalError::EmptyFunction { start_addr });
        }

        self.func_start_addr = start_addr;
        self.func_end_addr = start_addr + words.len() as u32 * 4;
        self.instrs.clear();
        self.instrs.extend(words.iter().map(|&word| InstrEvalState {
            instr: Instr::decode(word),
            reg_in: RegisterState::unknown(),
            reg_out: RegisterState::unknown(),
            exec_count: 0,
        }));
        self.paths.clear();
        self.paths.push(BranchPath { instr_idx: 0, regs: *input });

        tracing::debug!(
            "evaluating function {:#010x}-{:#010x} ({} words)",
            self.func_start_addr,
            self.func_end_addr,
            words.len(),
        );

        loop {
            if let Some(path) = self.paths.pop() {
                self.eval_branch_path(path);
            } else if !self.seed_unevaluated_instruction() {
                break;
            }
        }

        Ok(())
    }

    /// The per-instruction results of the last evaluation.
    pub fn instrs(&self) -> &[InstrEvalState] {
        &self.instrs
    }

    /// Looks an instruction up by address within the evaluated function.
    pub fn instr_state_at(&self, addr: u32) -> Option<&InstrEvalState> {
        self.instr_idx(addr).map(|idx| &self.instrs[idx])
    }

    /// The register state on entry to the instruction at `addr`.
    pub fn reg_state_before(&self, addr: u32) -> Option<&RegisterState> {
        self.instr_state_at(addr).map(|state| &state.reg_in)
    }

    /// The register state after the instruction at `addr`.
    pub fn reg_state_after(&self, addr: u32) -> Option<&RegisterState> {
        self.instr_state_at(addr).map(|state| &state.reg_out)
    }

    fn instr_idx(&self, addr: u32) -> Option<usize> {
        let in_range = addr % 4 == 0 && addr >= self.func_start_addr && addr < self.func_end_addr;
        in_range.then(|| ((addr - self.func_start_addr) / 4) as usize)
    }

    /// Finds code the path walk never reached (jump-table targets, dead
    /// code) and queues the first such instruction with a fully unknown
    /// state. Returns false once everything has been evaluated.
    fn seed_unevaluated_instruction(&mut self) -> bool {
        for (idx, state) in self.instrs.iter().enumerate() {
            if state.exec_count == 0 {
                tracing::trace!(
                    "seeding unevaluated instruction at {:#010x}",
                    self.func_start_addr + idx as u32 * 4,
                );
                self.paths.push(BranchPath {
                    instr_idx: idx as u32,
                    regs: RegisterState::unknown(),
                });

                return true;
            }
        }

        false
    }

    fn eval_branch_path(&mut self, path: BranchPath) {
        let num_instrs = self.instrs.len() as u32;
        let mut idx = path.instr_idx;

        if idx >= num_instrs {
            // Branch targets outside the function are pushed as-is and
            // dropped here.
            return;
        }

        tracing::trace!(
            "path from {:#010x}",
            self.func_start_addr + idx * 4,
        );

        let mut input = path.regs;

        while idx < num_instrs {
            if !Self::eval_instruction(&mut self.instrs[idx as usize], &input) {
                break;
            }

            let opcode = self.instrs[idx as usize].instr.opcode;

            // A trap marks unreachable code; nothing after it executes on
            // this path.
            if opcode.is_trap() {
                break;
            }

            if !opcode.is_branch_or_jump() {
                input = self.instrs[idx as usize].reg_out;
                idx += 1;
                continue;
            }

            // A control transfer executes its delay slot first; the
            // transfer itself then acts on the delay slot's output state.
            if idx + 1 >= num_instrs {
                // A function may not end on a branch: its delay slot would
                // lie outside. Treat it as a dead end.
                break;
            }
            if !Self::eval_instruction(&mut self.instrs[idx as usize + 1], &input) {
                break;
            }
            input = self.instrs[idx as usize + 1].reg_out;

            let instr = self.instrs[idx as usize].instr;
            let at = self.func_start_addr + idx * 4;

            if opcode.is_branch() {
                // Both sides of a conditional branch continue.
                self.push_path(idx + 2, input);
                self.push_path_to_addr(instr.branch_target(at), input);
            } else {
                match opcode {
                    exegesis_mips::Opcode::J => {
                        self.push_path_to_addr(instr.fixed_jump_target(at), input);
                    }
                    exegesis_mips::Opcode::Jal | exegesis_mips::Opcode::Jalr => {
                        // A call: whatever runs over there clobbers the
                        // caller-saved set.
                        input.clear_func_call_transient_regs();
                        self.push_path(idx + 2, input);
                    }
                    exegesis_mips::Opcode::Jr => {
                        // Either a return or a jump table; in both cases we
                        // know nothing about the state afterwards.
                        input.clear_all();
                        self.push_path(idx + 2, input);
                    }
                    _ => unreachable!("non-jump opcode in jump handling"),
                }
            }

            // A branch or jump always ends the current path.
            break;
        }
    }

    fn push_path(&mut self, instr_idx: u32, regs: RegisterState) {
        if instr_idx < self.instrs.len() as u32 {
            self.paths.push(BranchPath { instr_idx, regs });
        }
    }

    fn push_path_to_addr(&mut self, addr: u32, regs: RegisterState) {
        if let Some(idx) = self.instr_idx(addr) {
            self.push_path(idx as u32, regs);
        }
    }

    /// Evaluates one instruction slot with the given input state. Returns
    /// false when the current path must stop: the revisit cap was hit, or
    /// the instruction is an undefined encoding.
    fn eval_instruction(state: &mut InstrEvalState, input: &RegisterState) -> bool {
        if state.exec_count >= MAX_INSTRUCTION_EVALUATIONS {
            return false;
        }

        if state.exec_count == 0 {
            state.reg_in = *input;
        } else {
            state.reg_in.merge_with(input);
        }
        state.reg_out = state.reg_in;
        state.exec_count += 1;

        if state.instr.opcode.is_illegal() {
            // Who knows what this does at runtime. Give up on the path and
            // taint everything downstream of it.
            state.reg_out.clear_all();
            return false;
        }

        exec(&state.instr, &mut state.reg_out);
        true
    }
}

#[cfg(test)]
mod tests {
    use exegesis_mips::gpr;

    use super::*;

    fn eval(start_addr: u32, words: &[u32], input: &RegisterState) -> ConstEvaluator {
        let mut evaluator = ConstEvaluator::new();
        evaluator
            .eval_function(start_addr, words, input)
            .expect("evaluation failed");
        evaluator
    }

    #[test]
    fn rejects_bad_functions() {
        let mut evaluator = ConstEvaluator::new();
        let input = RegisterState::unknown();

        assert!(matches!(
            evaluator.eval_function(0x8001_0002, &[0], &input),
            Err(EvalError::MisalignedFunction { .. }),
        ));
        assert!(matches!(
            evaluator.eval_function(0x8001_0000, &[], &input),
            Err(EvalError::EmptyFunction { .. }),
        ));
    }

    #[test]
    fn lui_establishes_gp() {
        // lui $gp, 0x8005; jr $ra; nop
        let evaluator = eval(
            0x8001_0000,
            &[0x3C1C_8005, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        let after = evaluator.reg_state_after(0x8001_0000).unwrap();
        assert_eq!(after.gpr(gpr::GP), Some(0x8005_0000));
    }

    #[test]
    fn straight_line_constant_flow() {
        // lui $v0, 0x1234; ori $v0, $v0, 0x5678; jr $ra; nop
        let evaluator = eval(
            0x8001_0000,
            &[0x3C02_1234, 0x3442_5678, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        let after_ori = evaluator.reg_state_after(0x8001_0004).unwrap();
        assert_eq!(after_ori.gpr(gpr::V0), Some(0x1234_5678));
    }

    #[test]
    fn every_instruction_is_evaluated() {
        // A function whose tail is unreachable from the entry path:
        //   jr $ra; nop; addiu $v0, $zero, 1; jr $ra; nop
        let evaluator = eval(
            0x8001_0000,
            &[0x03E0_0008, 0, 0x2402_0001, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        for state in evaluator.instrs() {
            assert!(state.exec_count > 0);
        }
    }

    #[test]
    fn branch_merge_loses_conflicting_constants() {
        // 0x00: beq $a0, $zero, +3  (to 0x10)
        // 0x04: nop
        // 0x08: addiu $v0, $zero, 1
        // 0x0c: beq $zero, $zero, +2 (to 0x18)
        // 0x10: nop (branch target; delay slot of second branch falls here)
        // 0x14: addiu $v0, $zero, 2
        // 0x18: jr $ra
        // 0x1c: nop
        //
        // Wrong on purpose as control flow goes (0x10 is also the second
        // branch's landing area), but it exercises the merge: $v0 is 1 on
        // one path into 0x18 and 2 on the other.
        let evaluator = eval(
            0x8001_0000,
            &[
                0x1080_0003,
                0,
                0x2402_0001,
                0x1000_0002,
                0,
                0x2402_0002,
                0x03E0_0008,
                0,
            ],
            &RegisterState::unknown(),
        );

        let at_ret = evaluator.reg_state_before(0x8001_0018).unwrap();
        assert_eq!(at_ret.gpr(gpr::V0), None);
    }

    #[test]
    fn call_clobbers_transient_registers() {
        // lui $s0, 0x8005; lui $v0, 0x8005; jal <elsewhere>; nop; jr $ra; nop
        let evaluator = eval(
            0x8001_0000,
            &[0x3C10_8005, 0x3C02_8005, 0x0C00_489D, 0, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        let after_call = evaluator.reg_state_before(0x8001_0010).unwrap();
        assert_eq!(after_call.gpr(gpr::S0), Some(0x8005_0000));
        assert_eq!(after_call.gpr(gpr::V0), None);
    }

    #[test]
    fn revisit_cap_bounds_loop_evaluation() {
        // 0x00: addiu $v0, $v0, 1
        // 0x04: beq $zero, $zero, -2 (back to 0x00)
        // 0x08: nop
        // 0x0c: jr $ra
        // 0x10: nop
        let evaluator = eval(
            0x8001_0000,
            &[0x2442_0001, 0x1000_FFFE, 0, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        for state in evaluator.instrs() {
            assert!(state.exec_count <= MAX_INSTRUCTION_EVALUATIONS);
        }
    }

    #[test]
    fn illegal_instruction_taints_output() {
        // <illegal>; jr $ra; nop
        let evaluator = eval(
            0x8001_0000,
            &[0xFFFF_FFFF, 0x03E0_0008, 0],
            &{
                let mut input = RegisterState::unknown();
                input.set_gpr(gpr::S0, Some(7));
                input
            },
        );

        let state = evaluator.instr_state_at(0x8001_0000).unwrap();
        assert_eq!(state.reg_in.gpr(gpr::S0), Some(7));
        assert_eq!(state.reg_out.gpr(gpr::S0), None);
    }

    #[test]
    fn state_does_not_flow_past_a_trap() {
        // lui $v0, 0x8005; teq $zero, $zero; addiu $a0, $zero, 1; jr $ra; nop
        //
        // Code after the trap is unreachable; it is still evaluated (by
        // seeding), but with nothing known.
        let evaluator = eval(
            0x8001_0000,
            &[0x3C02_8005, 0x0000_0034, 0x2404_0001, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        let at_trap = evaluator.reg_state_before(0x8001_0004).unwrap();
        assert_eq!(at_trap.gpr(gpr::V0), Some(0x8005_0000));

        let past_trap = evaluator.reg_state_before(0x8001_0008).unwrap();
        assert_eq!(past_trap.gpr(gpr::V0), None);

        for state in evaluator.instrs() {
            assert!(state.exec_count > 0);
        }
    }

    #[test]
    fn delay_slot_runs_before_branch_decision_state() {
        // beq $zero, $zero, +2 (to 0x0c); lui $v0, 0x8005; jr $ra; nop
        //
        // The branch target's input state must include the delay slot's
        // write to $v0.
        let evaluator = eval(
            0x8001_0000,
            &[0x1000_0002, 0x3C02_8005, 0x03E0_0008, 0],
            &RegisterState::unknown(),
        );

        let at_target = evaluator.reg_state_before(0x8001_000C).unwrap();
        assert_eq!(at_target.gpr(gpr::V0), Some(0x8005_0000));
    }
}
