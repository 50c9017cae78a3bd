// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Constant register state.

use std::fmt;

use exegesis_mips::gpr;

/// What is known about every register at one program point.
///
/// Each slot is `Some(value)` when the register provably holds that constant
/// and `None` when it may hold anything. GPR 0 is hardwired to zero and is
/// always `Some(0)`; every mutating method maintains that.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RegisterState {
    gprs: [Option<u32>; gpr::NUM_GPRS],
    hi: Option<u32>,
    lo: Option<u32>,
}

impl Default for RegisterState {
    fn default() -> Self {
        Self::unknown()
    }
}

impl RegisterState {
    /// A state where nothing is known (except GPR 0, as ever).
    pub fn unknown() -> Self {
        let mut gprs = [None; gpr::NUM_GPRS];
        gprs[usize::from(gpr::ZERO)] = Some(0);

        Self { gprs, hi: None, lo: None }
    }

    pub fn gpr(&self, idx: u8) -> Option<u32> {
        self.gprs[usize::from(idx)]
    }

    /// Sets or clears a GPR slot. Writes to GPR 0 are discarded.
    pub fn set_gpr(&mut self, idx: u8, value: Option<u32>) {
        if idx != gpr::ZERO {
            self.gprs[usize::from(idx)] = value;
        }
    }

    /// Like [`Self::set_gpr`], for instructions that may have no
    /// destination at all.
    pub fn assign_gpr(&mut self, idx: Option<u8>, value: Option<u32>) {
        if let Some(idx) = idx {
            self.set_gpr(idx, value);
        }
    }

    pub fn hi(&self) -> Option<u32> {
        self.hi
    }

    pub fn lo(&self) -> Option<u32> {
        self.lo
    }

    pub fn set_hi(&mut self, value: Option<u32>) {
        self.hi = value;
    }

    pub fn set_lo(&mut self, value: Option<u32>) {
        self.lo = value;
    }

    pub fn clear_hi_and_lo(&mut self) {
        self.hi = None;
        self.lo = None;
    }

    pub fn clear_all(&mut self) {
        *self = Self::unknown();
    }

    /// Forgets every register a called function is allowed to clobber:
    /// `$at`, `$v0`-`$v1`, `$a0`-`$a3`, `$t0`-`$t9` and `$k0`-`$k1`. The
    /// callee-saved set (`$s0`-`$s7`, `$gp`, `$sp`, `$fp`, `$ra`) survives.
    pub fn clear_func_call_transient_regs(&mut self) {
        for idx in gpr::AT..=gpr::T7 {
            self.set_gpr(idx, None);
        }
        self.set_gpr(gpr::T8, None);
        self.set_gpr(gpr::T9, None);
        self.set_gpr(gpr::K0, None);
        self.set_gpr(gpr::K1, None);
    }

    /// The lattice meet: a slot survives only where both states know the
    /// same constant. Idempotent and commutative.
    pub fn merge_with(&mut self, other: &Self) {
        for (mine, theirs) in self.gprs.iter_mut().zip(other.gprs.iter()) {
            if *mine != *theirs {
                *mine = None;
            }
        }
        if self.hi != other.hi {
            self.hi = None;
        }
        if self.lo != other.lo {
            self.lo = None;
        }

        self.gprs[usize::from(gpr::ZERO)] = Some(0);
    }
}

impl fmt::Debug for RegisterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (idx, value) in self.gprs.iter().enumerate() {
            if let Some(value) = value {
                map.entry(&gpr::name(idx as u8), &format_args!("{:#010x}", value));
            }
        }
        if let Some(hi) = self.hi {
            map.entry(&"$hi", &format_args!("{:#010x}", hi));
        }
        if let Some(lo) = self.lo {
            map.entry(&"$lo", &format_args!("{:#010x}", lo));
        }
        map.finish()
    }
}
