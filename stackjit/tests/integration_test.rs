//! Integration tests for stackjit
//!
//! Tests the full pipeline: Bytecode → Lower → Optimize → Allocate → x64

use stackjit::bytecode::{self, Constant};
use stackjit::error::CompileError;
use stackjit::ir::{self, Inst, IrFunction, LabelId, OperandKind};
use stackjit::x64::{Reg64, Relocation, RuntimeHelper};
use stackjit::{compile_ir, compile_native, CompileOptions, HelperTable};

fn parse(source: &str) -> bytecode::Function {
    bytecode::parse(source).expect("parsing failed")
}

/// Operand of local variable `n`
fn var(func: &IrFunction, n: usize) -> &ir::Operand {
    func.vars()
        .map(|id| func.operand(id))
        .find(|op| op.kind == OperandKind::Var(n))
        .expect("variable not found")
}

/// Position of the unconditional jump back to `label`
fn back_jump(func: &IrFunction, label: u32) -> usize {
    func.iter()
        .find(|(_, inst)| {
            matches!(inst, Inst::Jump { .. } | Inst::ShortJump { .. })
                && inst.jump_target() == Some(LabelId(label))
        })
        .map(|(pos, _)| pos)
        .expect("back jump not found")
}

/// Kind of the operand a temp was assigned from
fn source_of(func: &IrFunction, temp: ir::OperandId) -> Option<&OperandKind> {
    func.iter().find_map(|(_, inst)| match inst {
        Inst::Assign { dest, src } if *dest == temp => Some(func.kind(*src)),
        _ => None,
    })
}

#[test]
fn test_constant_addition_folds_to_return() {
    let source = r#"
function {
    functions = [],
    constants = [3, 4],
    parameter_count = 0,
    local_vars = [],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        load_const 1
        add
        return
    ]
}"#;
    let func = compile_ir(&parse(source), &CompileOptions::default()).unwrap();
    let insts = func.instructions();
    assert_eq!(insts.len(), 2, "{}", func);
    let Inst::Assign { dest, src } = insts[0] else {
        panic!("expected assign, got {}", func);
    };
    assert_eq!(func.kind(*src), &OperandKind::Const(Constant::Integer(7)));
    assert_eq!(insts[1], &Inst::Return { value: *dest });
}

const COUNT_TO_FIVE: &str = r#"
function {
    functions = [],
    constants = [0, 1, 5],
    parameter_count = 0,
    local_vars = [i],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        store_local 0
        label 0
        load_local 0
        load_const 2
        geq
        if 1
        load_local 0
        load_const 1
        add
        store_local 0
        goto 0
        label 1
        load_local 0
        return
    ]
}"#;

#[test]
fn test_loop_variable_lives_through_body() {
    let func = compile_ir(&parse(COUNT_TO_FIVE), &CompileOptions::default()).unwrap();
    let jump = back_jump(&func, 0);
    let head = func.label_position(LabelId(0)).unwrap();
    let i = var(&func, 0);
    assert!(i.live_start <= head);
    assert!(i.live_end >= jump, "{}", func);
    assert!(i.reg.is_some());

    // The increment survived dead-store elimination
    let stores = func
        .iter()
        .filter(|(_, inst)| matches!(inst, Inst::Store { dest, .. } if func.is_var(*dest)))
        .count();
    assert_eq!(stores, 2);
}

#[test]
fn test_loop_counter_is_specialized() {
    let func = compile_ir(&parse(COUNT_TO_FIVE), &CompileOptions::default()).unwrap();
    assert!(func.iter().any(|(_, inst)| matches!(
        inst,
        Inst::Binary {
            op: ir::BinOp::IntAdd,
            ..
        }
    )));
    assert!(!func
        .iter()
        .any(|(_, inst)| matches!(inst, Inst::CallAssert { .. })));
}

#[test]
fn test_nested_loops_keep_outer_variables_live() {
    // s = 0; j = 0
    // while !(j >= 3) { i = 0; while !(i >= 3) { s = s + k; i = i + 1 } j = j + 1 }
    // return s
    let source = r#"
function {
    functions = [],
    constants = [0, 1, 3],
    parameter_count = 1,
    local_vars = [k, i, j, s],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        store_local 3
        load_const 0
        store_local 2
        label 0
        load_local 2
        load_const 2
        geq
        if 3
        load_const 0
        store_local 1
        label 1
        load_local 1
        load_const 2
        geq
        if 2
        load_local 3
        load_local 0
        add
        store_local 3
        load_local 1
        load_const 1
        add
        store_local 1
        goto 1
        label 2
        load_local 2
        load_const 1
        add
        store_local 2
        goto 0
        label 3
        load_local 3
        return
    ]
}"#;
    let func = compile_ir(&parse(source), &CompileOptions::default()).unwrap();
    let outer = back_jump(&func, 0);
    let inner = back_jump(&func, 1);
    assert!(inner < outer);

    // k is only read inside the inner loop but is needed on every outer pass
    let k = var(&func, 0);
    assert!(k.live_end >= outer, "{}", func);
    let j = var(&func, 2);
    assert!(j.live_end >= outer);
    let s = var(&func, 3);
    assert!(s.live_end >= outer);
    let i = var(&func, 1);
    assert!(i.live_end >= inner);

    // The parameter is filled from the locals array before the loops
    assert!(matches!(func.inst(0), Inst::ForceLoad { .. }));
}

#[test]
fn test_closure_threads_references() {
    let source = r#"
function {
    functions = [
        function {
            functions = [],
            constants = [],
            parameter_count = 0,
            local_vars = [],
            local_ref_vars = [],
            free_vars = [x],
            names = [],
            instructions = [
                load_ref 0
                return
            ]
        }
    ],
    constants = [10],
    parameter_count = 0,
    local_vars = [],
    local_ref_vars = [x],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        store_ref 0
        push_ref 0
        load_func 0
        alloc_closure 1
        call 0
        return
    ]
}"#;
    let program = parse(source);
    let func = ir::lower_function(&program).unwrap();
    let insts = func.instructions();

    let allocs: Vec<usize> = insts
        .iter()
        .enumerate()
        .filter(|(_, inst)| matches!(inst, Inst::AllocClosure { .. }))
        .map(|(pos, _)| pos)
        .collect();
    assert_eq!(allocs.len(), 1);
    let at = allocs[0];
    let Inst::AllocClosure { function, refs } = insts[at] else {
        unreachable!();
    };
    assert_eq!(refs.len(), program.functions[0].free_vars.len());
    assert_eq!(source_of(&func, *function), Some(&OperandKind::Function(0)));
    // The reference is the cell itself
    assert_eq!(source_of(&func, refs[0]), Some(&OperandKind::Ref(0)));

    // The new closure comes back in the return register and is called
    let Inst::Assign { dest: closure, src } = insts[at + 1] else {
        panic!("expected assign after alloc_closure, got {}", func);
    };
    assert_eq!(func.kind(*src), &OperandKind::RetVal);
    assert!(insts.iter().any(|inst| matches!(
        inst,
        Inst::Call { closure: c, args } if c == closure && args.is_empty()
    )));

    // The nested function reads through the cell
    let inner = ir::lower_function(program.select(&[0]).unwrap()).unwrap();
    assert!(inner.iter().any(|(_, inst)| matches!(
        inst,
        Inst::Assign { src, .. } if inner.kind(*src) == &OperandKind::Deref(0)
    )));

    let native = compile_native(&program, &CompileOptions::default(), &HelperTable::new()).unwrap();
    let helpers: Vec<RuntimeHelper> = native
        .relocations
        .iter()
        .filter_map(|r| match r {
            Relocation::Helper { helper, .. } => Some(*helper),
            _ => None,
        })
        .collect();
    assert!(helpers.contains(&RuntimeHelper::WriteReference));
    assert!(helpers.contains(&RuntimeHelper::AllocClosure));
    assert!(helpers.contains(&RuntimeHelper::CallFunction));
}

#[test]
fn test_disjoint_temps_share_register() {
    let source = r#"
function {
    functions = [],
    constants = [None],
    parameter_count = 0,
    local_vars = [],
    local_ref_vars = [],
    free_vars = [],
    names = [a, b, c, d],
    instructions = [
        load_global 0
        store_global 1
        load_global 2
        store_global 3
        load_const 0
        return
    ]
}"#;
    let options = CompileOptions {
        registers: 1,
        ..CompileOptions::default()
    };
    let func = compile_ir(&parse(source), &options).unwrap();
    let allocated: Vec<&ir::Operand> = func
        .temps()
        .iter()
        .map(|id| func.operand(*id))
        .filter(|op| op.has_live_range())
        .collect();
    assert!(allocated.len() >= 2, "{}", func);
    for (n, a) in allocated.iter().enumerate() {
        assert_eq!(a.reg, Some(Reg64::R12));
        for b in &allocated[n + 1..] {
            assert!(a.live_end <= b.live_start || b.live_end <= a.live_start);
        }
    }
}

#[test]
fn test_divide_by_zero_reported_at_compile_time() {
    let source = r#"
function {
    functions = [],
    constants = [5, 0],
    parameter_count = 0,
    local_vars = [],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        load_const 1
        div
        return
    ]
}"#;
    let program = parse(source);
    let options = CompileOptions {
        report_compile_errors: true,
        ..CompileOptions::default()
    };
    let err = compile_native(&program, &options, &HelperTable::new()).unwrap_err();
    assert!(matches!(err, CompileError::IllegalArithmetic { .. }));

    // Left to the runtime check otherwise
    let native = compile_native(&program, &CompileOptions::default(), &HelperTable::new()).unwrap();
    assert!(native.relocations.iter().any(|r| matches!(
        r,
        Relocation::Helper {
            helper: RuntimeHelper::AssertNotZero,
            ..
        }
    )));
}

/// Fail if a store to a register-held variable overwrites another operand
/// that is still read later
fn assert_stores_keep_live_registers(func: &IrFunction) {
    let held: Vec<ir::OperandId> = func.vars().chain(func.temps().iter().copied()).collect();
    for (pos, inst) in func.iter() {
        let Inst::Store { dest, .. } = inst else {
            continue;
        };
        let Some(reg) = func.operand(*dest).reg.filter(|_| func.is_var(*dest)) else {
            continue;
        };
        let dest_op = func.operand(*dest);
        assert!(
            dest_op.live_start <= pos && pos <= dest_op.live_end,
            "store at {} outside {} in\n{}",
            pos,
            func.operand_name(*dest),
            func
        );
        for &other in &held {
            let op = func.operand(other);
            if other == *dest || op.reg != Some(reg) {
                continue;
            }
            if op.is_dead() || !op.has_live_range() {
                continue;
            }
            assert!(
                !(op.live_start <= pos && pos < op.live_end),
                "store to {} at {} overwrites {} in\n{}",
                func.operand_name(*dest),
                pos,
                func.operand_name(other),
                func
            );
        }
    }
}

#[test]
fn test_chained_dead_stores_are_removed() {
    // x = 1; w = x; x = 2; y = x; z = y; return w
    let source = r#"
function {
    functions = [],
    constants = [1, 2],
    parameter_count = 0,
    local_vars = [x, w, y, z],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        store_local 0
        gc
        load_local 0
        store_local 1
        gc
        load_const 1
        store_local 0
        gc
        load_local 0
        store_local 2
        gc
        load_local 2
        store_local 3
        gc
        load_local 1
        return
    ]
}"#;
    let func = compile_ir(&parse(source), &CompileOptions::default()).unwrap();
    let stores_to = |n: usize| {
        func.iter()
            .filter(|(_, inst)| {
                matches!(inst, Inst::Store { dest, .. } if func.kind(*dest) == &OperandKind::Var(n))
            })
            .count()
    };
    assert!(stores_to(0) <= 1, "{}", func);
    assert_eq!(stores_to(2), 0, "{}", func);
    assert_eq!(stores_to(3), 0, "{}", func);
    assert_stores_keep_live_registers(&func);

    compile_native(&parse(source), &CompileOptions::default(), &HelperTable::new()).unwrap();
}

#[test]
fn test_trailing_store_keeps_its_register() {
    // x = 1; t = x; x = 2; return t
    let source = r#"
function {
    functions = [],
    constants = [1, 2],
    parameter_count = 0,
    local_vars = [x],
    local_ref_vars = [],
    free_vars = [],
    names = [],
    instructions = [
        load_const 0
        store_local 0
        load_local 0
        load_const 1
        store_local 0
        return
    ]
}"#;
    let options = CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    };
    let func = compile_ir(&parse(source), &options).unwrap();
    let last_store = func
        .iter()
        .filter(|(_, inst)| matches!(inst, Inst::Store { .. }))
        .map(|(pos, _)| pos)
        .last()
        .expect("store not found");
    let x = var(&func, 0);
    assert!(x.reg.is_some());
    assert!(x.live_end >= last_store, "{}", func);
    assert_stores_keep_live_registers(&func);
}

#[test]
fn test_no_dead_temps_after_optimization() {
    let func = compile_ir(&parse(COUNT_TO_FIVE), &CompileOptions::default()).unwrap();
    for id in func.temps() {
        assert!(!func.operand(*id).is_dead(), "{}", func);
    }
}

#[test]
fn test_listing_matches_code() {
    let native = compile_native(
        &parse(COUNT_TO_FIVE),
        &CompileOptions::default(),
        &HelperTable::new(),
    )
    .unwrap();
    assert!(!native.code.is_empty());
    assert!(native.listing.iter().any(|line| line.ends_with("ret")));
    assert!(native.listing.iter().any(|line| line.contains("jmp")));
    assert_eq!((native.frame_size + 40) % 16, 0);
}

#[test]
fn test_json_and_text_inputs_agree() {
    let program = parse(COUNT_TO_FIVE);
    let json = program.to_json();
    let decoded = bytecode::Function::from_json(&json).unwrap();
    assert_eq!(decoded, program);
}
