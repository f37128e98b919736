//! Linear Scan Register Allocation
//!
//! Variables and temps are allocated together from one pool, in order of
//! interval start (variables before temps at equal starts). The active list
//! is kept sorted by interval end; intervals ending at or before the current
//! start are expired, so an operand may take over a register at the very
//! instruction where the previous owner is last read.
//!
//! When the pool is full, whichever of the incoming operand and the active
//! operand ending last lives longer is spilled. Spilled variables stay in
//! the locals array, spilled temps in their frame slot.
//!
//! A temp that was loaded from a variable shares the variable's register
//! when that register is guaranteed to still hold the loaded value for the
//! temp's whole interval.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use super::types::*;
use crate::error::{CompileError, Result};
use crate::x64::registers::Reg64;

/// Summary of one allocation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// Registers assigned to at least one operand
    pub registers: BTreeSet<Reg64>,
    pub spilled_vars: usize,
    pub spilled_temps: usize,
    /// Temps that reuse their variable's register
    pub shared: usize,
}

/// Inclusive interval; a definition that is never read occupies its
/// defining instruction only
fn interval(func: &IrFunction, id: OperandId) -> (usize, usize) {
    let operand = func.operand(id);
    let end = if operand.live_end == UNSET {
        operand.live_start
    } else {
        operand.live_end
    };
    (operand.live_start, end)
}

/// Assign registers from `pool` to the function's variables and temps.
///
/// Expects live intervals from [`compute_liveness`](super::compute_liveness).
pub fn allocate_registers(func: &mut IrFunction, pool: &[Reg64]) -> Result<AllocStats> {
    LinearScan::new(func, pool).run()
}

struct LinearScan<'a> {
    func: &'a mut IrFunction,
    pool: &'a [Reg64],
    /// Sorted by interval end
    active: Vec<OperandId>,
    /// Register each variable held when it last expired
    last_reg: HashMap<OperandId, Reg64>,
    /// Temps currently sharing each variable's register
    sharing: HashMap<OperandId, Vec<OperandId>>,
    /// Positions of stores to each variable
    stores: HashMap<OperandId, Vec<usize>>,
    stats: AllocStats,
}

impl<'a> LinearScan<'a> {
    fn new(func: &'a mut IrFunction, pool: &'a [Reg64]) -> Self {
        let mut stores: HashMap<OperandId, Vec<usize>> = HashMap::new();
        for (pos, inst) in func.iter() {
            if let Inst::Store { dest, .. } = inst {
                if func.is_var(*dest) {
                    stores.entry(*dest).or_default().push(pos);
                }
            }
        }
        Self {
            func,
            pool,
            active: Vec::new(),
            last_reg: HashMap::new(),
            sharing: HashMap::new(),
            stores,
            stats: AllocStats::default(),
        }
    }

    fn run(mut self) -> Result<AllocStats> {
        let mut operands: Vec<OperandId> = self
            .func
            .vars()
            .chain(self.func.temps().iter().copied())
            .collect();
        for &id in &operands {
            self.func.operand_mut(id).reg = None;
        }
        operands.retain(|&id| self.func.operand(id).has_live_range());
        operands.sort_by_key(|&id| {
            let operand = self.func.operand(id);
            (operand.live_start, operand.is_temp(), id)
        });

        for id in operands {
            let (start, _) = interval(self.func, id);
            self.expire(start);
            if self.try_share(id) {
                continue;
            }
            if self.active.len() < self.pool.len() {
                let reg = self.free_register(id)?;
                self.func.operand_mut(id).reg = Some(reg);
                trace!(operand = %self.func.operand_name(id), %reg, "allocated");
                self.activate(id);
            } else {
                self.spill_at(id);
            }
        }

        for id in self.func.vars().chain(self.func.temps().iter().copied()).collect::<Vec<_>>() {
            let operand = self.func.operand(id);
            if !operand.has_live_range() {
                continue;
            }
            match operand.reg {
                Some(reg) => {
                    self.stats.registers.insert(reg);
                }
                None if operand.is_var() => self.stats.spilled_vars += 1,
                None => self.stats.spilled_temps += 1,
            }
        }
        debug!(
            registers = self.stats.registers.len(),
            spilled_vars = self.stats.spilled_vars,
            spilled_temps = self.stats.spilled_temps,
            shared = self.stats.shared,
            "allocated registers"
        );
        Ok(self.stats)
    }

    /// Release the registers of intervals ending at or before `start`
    fn expire(&mut self, start: usize) {
        while let Some(&first) = self.active.first() {
            if interval(self.func, first).1 > start {
                return;
            }
            self.active.remove(0);
            let operand = self.func.operand(first);
            let var = if operand.is_var() {
                Some(first)
            } else {
                operand.var_alias
            };
            if let (Some(var), Some(reg)) = (var, operand.reg) {
                self.last_reg.insert(var, reg);
            }
            self.sharing.remove(&first);
        }
    }

    fn activate(&mut self, id: OperandId) {
        let end = interval(self.func, id).1;
        let at = self
            .active
            .partition_point(|&other| interval(self.func, other).1 <= end);
        self.active.insert(at, id);
    }

    /// Give a temp its variable's register if the variable keeps it, and
    /// keeps its value, until the temp is dead
    fn try_share(&mut self, temp: OperandId) -> bool {
        let operand = self.func.operand(temp);
        let Some(var) = operand.var_alias else {
            return false;
        };
        let (start, end) = interval(self.func, temp);
        let Some(reg) = self.func.operand(var).reg else {
            return false;
        };
        if !self.active.contains(&var) || interval(self.func, var).1 < end {
            return false;
        }
        // The temp must be the direct load of the variable
        if !matches!(self.func.inst(start), Inst::Assign { dest, src } if *dest == temp && *src == var)
        {
            return false;
        }
        let overwritten = self
            .stores
            .get(&var)
            .is_some_and(|positions| positions.iter().any(|&p| p > start && p <= end));
        if overwritten {
            return false;
        }
        trace!(temp = %self.func.operand_name(temp), %reg, "shares variable register");
        self.func.operand_mut(temp).reg = Some(reg);
        self.sharing.entry(var).or_default().push(temp);
        self.stats.shared += 1;
        true
    }

    fn free_register(&self, id: OperandId) -> Result<Reg64> {
        let in_use: BTreeSet<Reg64> = self
            .active
            .iter()
            .filter_map(|&other| self.func.operand(other).reg)
            .collect();
        let operand = self.func.operand(id);
        let var = if operand.is_var() {
            Some(id)
        } else {
            operand.var_alias
        };
        if let Some(reg) = var.and_then(|v| self.last_reg.get(&v)) {
            if !in_use.contains(reg) {
                return Ok(*reg);
            }
        }
        self.pool
            .iter()
            .copied()
            .find(|reg| !in_use.contains(reg))
            .ok_or_else(|| CompileError::RegistersExhausted {
                message: format!(
                    "no free register for {} with {} of {} active",
                    self.func.operand_name(id),
                    self.active.len(),
                    self.pool.len()
                ),
            })
    }

    /// Spill whichever of `id` and the longest active interval ends last
    fn spill_at(&mut self, id: OperandId) {
        let end = interval(self.func, id).1;
        let victim = self.active.last().copied();
        match victim {
            Some(victim) if interval(self.func, victim).1 > end => {
                let reg = self.func.operand(victim).reg;
                trace!(
                    spilled = %self.func.operand_name(victim),
                    operand = %self.func.operand_name(id),
                    "stole register"
                );
                self.func.operand_mut(victim).reg = None;
                for temp in self.sharing.remove(&victim).unwrap_or_default() {
                    self.func.operand_mut(temp).reg = None;
                    self.stats.shared -= 1;
                }
                self.active.pop();
                self.func.operand_mut(id).reg = reg;
                self.activate(id);
            }
            _ => {
                trace!(operand = %self.func.operand_name(id), "spilled");
                self.func.operand_mut(id).reg = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Constant;
    use crate::ir::liveness::compute_liveness;
    use crate::x64::registers::ALLOCATABLE_REGS;

    /// `n` temps defined in sequence and all read by the final instruction
    fn overlapping_temps(n: usize) -> (IrFunction, Vec<OperandId>) {
        let mut func = IrFunction::new("f");
        let one = func.constant(Constant::Integer(1));
        let temps: Vec<OperandId> = (0..n).map(|_| func.new_temp()).collect();
        for &t in &temps {
            func.push(Inst::Assign { dest: t, src: one });
        }
        func.push(Inst::Call {
            closure: temps[0],
            args: temps[1..].to_vec(),
        });
        compute_liveness(&mut func).unwrap();
        (func, temps)
    }

    #[test]
    fn test_sequential_temps_reuse_one_register() {
        let mut func = IrFunction::new("f");
        let one = func.constant(Constant::Integer(1));
        let (a, b) = (func.new_temp(), func.new_temp());
        func.push(Inst::Assign { dest: a, src: one });
        func.push(Inst::Return { value: a });
        func.push(Inst::Assign { dest: b, src: one });
        func.push(Inst::Return { value: b });
        compute_liveness(&mut func).unwrap();

        let stats = allocate_registers(&mut func, &ALLOCATABLE_REGS[..1]).unwrap();
        assert_eq!(func.operand(a).reg, Some(Reg64::R12));
        assert_eq!(func.operand(b).reg, Some(Reg64::R12));
        assert_eq!(stats.registers.len(), 1);
        assert_eq!(stats.spilled_temps, 0);
    }

    #[test]
    fn test_pressure_spills_longest_interval() {
        let (mut func, temps) = overlapping_temps(4);
        let stats = allocate_registers(&mut func, &ALLOCATABLE_REGS[..2]).unwrap();
        // All end together: the later arrivals spill
        assert!(func.operand(temps[0]).reg.is_some());
        assert!(func.operand(temps[1]).reg.is_some());
        assert_eq!(func.operand(temps[2]).reg, None);
        assert_eq!(func.operand(temps[3]).reg, None);
        assert_eq!(stats.spilled_temps, 2);
    }

    #[test]
    fn test_short_interval_steals_register() {
        let mut func = IrFunction::new("f");
        let one = func.constant(Constant::Integer(1));
        let (long, short) = (func.new_temp(), func.new_temp());
        func.push(Inst::Assign { dest: long, src: one }); // 0
        func.push(Inst::Assign { dest: short, src: one }); // 1
        func.push(Inst::Return { value: short }); // 2
        func.push(Inst::Return { value: long }); // 3
        compute_liveness(&mut func).unwrap();

        allocate_registers(&mut func, &ALLOCATABLE_REGS[..1]).unwrap();
        assert_eq!(func.operand(long).reg, None);
        assert_eq!(func.operand(short).reg, Some(Reg64::R12));
    }

    #[test]
    fn test_empty_pool_spills_everything() {
        let (mut func, temps) = overlapping_temps(3);
        let stats = allocate_registers(&mut func, &[]).unwrap();
        assert!(temps.iter().all(|&t| func.operand(t).reg.is_none()));
        assert_eq!(stats.spilled_temps, 3);
    }

    #[test]
    fn test_loaded_temp_shares_variable_register() {
        // x <- 1; t = x; return t; t2 = x; return t2
        let mut func = IrFunction::new("f");
        let x = func.var(0);
        let one = func.constant(Constant::Integer(1));
        let (a, t, t2) = (func.new_temp(), func.new_temp(), func.new_temp());
        func.push(Inst::Assign { dest: a, src: one }); // 0
        func.push(Inst::Store { dest: x, src: a }); // 1
        func.push(Inst::Assign { dest: t, src: x }); // 2
        func.push(Inst::Return { value: t }); // 3
        func.push(Inst::Assign { dest: t2, src: x }); // 4
        func.push(Inst::Return { value: t2 }); // 5
        func.operand_mut(t).var_alias = Some(x);
        func.operand_mut(t2).var_alias = Some(x);
        compute_liveness(&mut func).unwrap();

        let stats = allocate_registers(&mut func, &ALLOCATABLE_REGS).unwrap();
        let reg = func.operand(x).reg;
        assert!(reg.is_some());
        assert_eq!(func.operand(t).reg, reg);
        // x is dead after position 4, so t2 cannot rely on it
        assert_eq!(stats.shared, 1);
        assert_ne!(func.operand(t2).reg, None);
    }

    #[test]
    fn test_trailing_store_keeps_register_reserved() {
        // x <- a; t = x; x <- a; return t
        let mut func = IrFunction::new("f");
        let x = func.var(0);
        let one = func.constant(Constant::Integer(1));
        let (a, t) = (func.new_temp(), func.new_temp());
        func.push(Inst::Assign { dest: a, src: one }); // 0
        func.push(Inst::Store { dest: x, src: a }); // 1
        func.push(Inst::Assign { dest: t, src: x }); // 2
        func.push(Inst::Store { dest: x, src: a }); // 3
        func.push(Inst::Return { value: t }); // 4
        compute_liveness(&mut func).unwrap();

        allocate_registers(&mut func, &ALLOCATABLE_REGS[..2]).unwrap();
        assert!(func.operand(x).reg.is_some());
        assert_ne!(func.operand(t).reg, func.operand(x).reg);
    }

    #[test]
    fn test_store_in_between_prevents_sharing() {
        // t = x; x <- a; return t
        let mut func = IrFunction::new("f");
        func.parameter_count = 1;
        let x = func.var(0);
        let one = func.constant(Constant::Integer(1));
        let (t, a, u) = (func.new_temp(), func.new_temp(), func.new_temp());
        func.push(Inst::ForceLoad { var: x }); // 0
        func.push(Inst::Assign { dest: t, src: x }); // 1
        func.push(Inst::Assign { dest: a, src: one }); // 2
        func.push(Inst::Store { dest: x, src: a }); // 3
        func.push(Inst::Assign { dest: u, src: x }); // 4
        func.push(Inst::Return { value: t }); // 5
        func.push(Inst::Return { value: u }); // 6
        func.operand_mut(t).var_alias = Some(x);
        compute_liveness(&mut func).unwrap();

        let stats = allocate_registers(&mut func, &ALLOCATABLE_REGS).unwrap();
        assert_eq!(stats.shared, 0);
        assert_ne!(func.operand(t).reg, func.operand(x).reg);
    }
}
