//! End-to-end execution tests: bound trees are lowered with `coil-codegen`
//! and run on the interpreter.

use coil_hir::{
    BoundModule, BoundPou, CallArg, CallExpr, Callee, Expr, ExprKind, ForStmt, GlobalBlock,
    Initializer, LineIndex, LocalDecl, LocalId, Param, ParamDirection, PouKind, ScalarType,
    Signature, Stmt, StmtKind, TypeId, TypeRegistry,
};
use coil_ir::{BreakpointId, IrType, PouId};
use coil_runtime::{ExecutionState, Interpreter, PanicReason, Program};
use smol_str::SmolStr;
use text_size::TextRange;

fn lit(bits: u64, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Literal(bits), ty)
}

fn local(id: u32, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Local(LocalId(id)), ty)
}

fn decl(id: u32, name: &str, ty: TypeId) -> Stmt {
    decl_init(id, name, ty, None)
}

fn decl_init(id: u32, name: &str, ty: TypeId, init: Option<Initializer>) -> Stmt {
    Stmt::new(StmtKind::Local(LocalDecl {
        id: LocalId(id),
        name: SmolStr::new(name),
        ty,
        init,
    }))
}

fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target, value })
}

fn builtin_call(name: &str, args: Vec<Expr>, ty: TypeId) -> Expr {
    call(Callee::Builtin(SmolStr::new(name)), args, ty)
}

fn call(callee: Callee, args: Vec<Expr>, ty: TypeId) -> Expr {
    let args = args
        .into_iter()
        .enumerate()
        .map(|(param, value)| CallArg { param, value })
        .collect();
    Expr::new(ExprKind::Call(Box::new(CallExpr { callee, args })), ty)
}

fn interpreter_for(module: &BoundModule, line_index: Option<&LineIndex>) -> Interpreter {
    let compiled = coil_codegen::compile_module(module, line_index).unwrap();
    Interpreter::new(Program::load(compiled).unwrap())
}

fn run_program(module: &BoundModule, entry: &str) -> Interpreter {
    let mut interpreter = interpreter_for(module, None);
    interpreter.start(&PouId::from(entry)).unwrap();
    assert_eq!(interpreter.run(), ExecutionState::EndOfProgram);
    interpreter
}

#[test]
fn builtin_addition_runs_in_one_call_step() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl_init(0, "a", int, Some(Initializer::Expr(lit(12, int)))),
        decl_init(1, "b", int, Some(Initializer::Expr(lit(13, int)))),
        decl(2, "r", int),
        assign(
            local(2, int),
            builtin_call("ADD_INT", vec![local(0, int), local(1, int)], int),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    // Locals a, b, r at offsets 0, 2, 4 of the entry frame.
    assert_eq!(interpreter.read_stack(4, IrType::Word).unwrap(), 25);
}

#[test]
fn user_function_call_pushes_and_pops_a_frame() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let mut module = BoundModule::new(registry);

    let add_sig = Signature::new(PouId::from("AddI"), PouKind::Function)
        .with_params(vec![
            Param::new("x", int, ParamDirection::In),
            Param::new("y", int, ParamDirection::In),
        ])
        .with_return_type(int);
    let add_body = vec![assign(
        Expr::new(ExprKind::ReturnValue, int),
        builtin_call(
            "ADD_INT",
            vec![
                Expr::new(ExprKind::Param(0), int),
                Expr::new(ExprKind::Param(1), int),
            ],
            int,
        ),
    )];
    module.add_pou(BoundPou::new(add_sig, add_body));

    let main_body = vec![
        decl(0, "r", int),
        assign(
            local(0, int),
            call(
                Callee::Pou(PouId::from("AddI")),
                vec![lit(12, int), lit(13, int)],
                int,
            ),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        main_body,
    ));

    let mut interpreter = interpreter_for(&module, None);
    interpreter.start(&PouId::from("Main")).unwrap();
    // Two argument copies, then the call statement pushes the frame.
    for _ in 0..3 {
        assert_eq!(interpreter.step(), ExecutionState::Running);
    }
    let trace = interpreter.stack_trace();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].pou, PouId::from("AddI"));
    assert_eq!(trace[1].pou, PouId::from("Main"));

    assert_eq!(interpreter.run(), ExecutionState::EndOfProgram);
    // Return value was bound straight to r's slot in the caller frame.
    assert_eq!(interpreter.read_stack(0, IrType::Word).unwrap(), 25);
}

#[test]
fn for_loop_runs_once_per_index() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl(0, "i", int),
        decl(1, "x", dint),
        Stmt::new(StmtKind::For(Box::new(ForStmt {
            control: local(0, int),
            start: lit(0, int),
            end: lit(2, int),
            step: None,
            body: vec![assign(
                local(1, dint),
                builtin_call("ADD_DINT", vec![local(1, dint), lit(1, dint)], dint),
            )],
        }))),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    // Indexes 0, 1, 2: three iterations.
    assert_eq!(interpreter.read_stack(4, IrType::DWord).unwrap(), 3);
}

#[test]
fn for_loop_with_empty_range_never_enters() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl(0, "i", int),
        decl(1, "x", dint),
        Stmt::new(StmtKind::For(Box::new(ForStmt {
            control: local(0, int),
            start: lit(0, int),
            // -1 as a 16-bit INT bit pattern.
            end: lit(0xFFFF, int),
            step: None,
            body: vec![assign(
                local(1, dint),
                builtin_call("ADD_DINT", vec![local(1, dint), lit(1, dint)], dint),
            )],
        }))),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    assert_eq!(interpreter.read_stack(4, IrType::DWord).unwrap(), 0);
}

#[test]
fn out_of_bounds_index_panics_without_writing() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let arr = registry.add_array(int, 0, 2);
    let mut module = BoundModule::new(registry);
    let target = Expr::new(
        ExprKind::Index {
            base: Box::new(local(0, arr)),
            index: Box::new(local(1, dint)),
        },
        int,
    );
    let body = vec![
        decl(0, "values", arr),
        decl(1, "i", dint),
        assign(local(1, dint), lit(3, dint)),
        assign(target, lit(5, int)),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let mut interpreter = interpreter_for(&module, None);
    interpreter.start(&PouId::from("Main")).unwrap();
    let state = interpreter.run();
    assert_eq!(
        state,
        ExecutionState::Panic(PanicReason::IndexOutOfBounds {
            index: 3,
            lower: 0,
            upper: 2,
        })
    );
    // The panic is terminal and the array was never touched.
    assert_eq!(interpreter.step(), state);
    for offset in [0u16, 2, 4] {
        assert_eq!(interpreter.read_stack(offset, IrType::Word).unwrap(), 0);
    }
}

#[test]
fn integer_division_by_zero_panics() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl(0, "a", dint),
        decl(1, "b", dint),
        assign(
            local(0, dint),
            builtin_call("DIV_DINT", vec![lit(1, dint), local(1, dint)], dint),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let mut interpreter = interpreter_for(&module, None);
    interpreter.start(&PouId::from("Main")).unwrap();
    assert_eq!(
        interpreter.run(),
        ExecutionState::Panic(PanicReason::DivisionByZero)
    );
}

#[test]
fn short_circuit_skips_the_right_hand_side() {
    let mut registry = TypeRegistry::new();
    let boolean = registry.scalar(ScalarType::Bool);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    // c is FALSE, so the division by the zero-valued d never runs.
    let rhs = builtin_call(
        "EQ_DINT",
        vec![
            builtin_call("DIV_DINT", vec![lit(1, dint), local(1, dint)], dint),
            lit(1, dint),
        ],
        boolean,
    );
    let body = vec![
        decl(0, "c", boolean),
        decl(1, "d", dint),
        decl(2, "r", boolean),
        assign(
            local(2, boolean),
            Expr::new(
                ExprKind::ShortCircuit {
                    op: coil_hir::ShortCircuitOp::And,
                    lhs: Box::new(local(0, boolean)),
                    rhs: Box::new(rhs),
                },
                boolean,
            ),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    assert_eq!(interpreter.read_stack(8, IrType::Byte).unwrap(), 0);
}

#[test]
fn repeated_initializer_fills_every_element() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let arr = registry.add_array(int, 0, 3);
    let mut module = BoundModule::new(registry);
    let body = vec![decl_init(
        0,
        "values",
        arr,
        Some(Initializer::ArrayRepeat(Box::new(lit(7, int)))),
    )];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    // The pointer walk visits all four elements and stops at the end.
    for offset in [0u16, 2, 4, 6] {
        assert_eq!(interpreter.read_stack(offset, IrType::Word).unwrap(), 7);
    }
}

#[test]
fn aggregate_initializers_write_field_by_field() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let pair = registry.add_struct(
        "Pair",
        vec![(SmolStr::new("lo"), int), (SmolStr::new("hi"), dint)],
    );
    let arr = registry.add_array(int, 0, 2);
    let mut module = BoundModule::new(registry);
    let body = vec![
        // Sparse struct initializer: only `hi` gets a value.
        decl_init(
            0,
            "p",
            pair,
            Some(Initializer::Struct(vec![(
                1,
                Initializer::Expr(lit(9, dint)),
            )])),
        ),
        decl_init(
            1,
            "a",
            arr,
            Some(Initializer::Array(vec![
                Initializer::Expr(lit(1, int)),
                Initializer::Expr(lit(2, int)),
                Initializer::Expr(lit(3, int)),
            ])),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    // p at 0: lo stays zero, hi aligned to 4. a follows at 8.
    assert_eq!(interpreter.read_stack(0, IrType::Word).unwrap(), 0);
    assert_eq!(interpreter.read_stack(4, IrType::DWord).unwrap(), 9);
    assert_eq!(interpreter.read_stack(8, IrType::Word).unwrap(), 1);
    assert_eq!(interpreter.read_stack(10, IrType::Word).unwrap(), 2);
    assert_eq!(interpreter.read_stack(12, IrType::Word).unwrap(), 3);
}

#[test]
fn instance_calls_pass_the_self_pointer() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let state = registry.add_struct("CounterState", vec![(SmolStr::new("ticks"), dint)]);
    let mut module = BoundModule::new(registry);

    let fb_sig = Signature::new(PouId::from("Counter"), PouKind::FunctionBlock)
        .with_instance_type(state);
    let fb_body = vec![assign(
        Expr::new(ExprKind::InstanceVar(0), dint),
        builtin_call(
            "ADD_DINT",
            vec![Expr::new(ExprKind::InstanceVar(0), dint), lit(1, dint)],
            dint,
        ),
    )];
    module.add_pou(BoundPou::new(fb_sig, fb_body));

    let invoke = || {
        Stmt::new(StmtKind::Call(CallExpr {
            callee: Callee::Instance {
                target: local(0, state),
                pou: PouId::from("Counter"),
            },
            args: Vec::new(),
        }))
    };
    let main_body = vec![decl(0, "c", state), invoke(), invoke()];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        main_body,
    ));

    let interpreter = run_program(&module, "Main");
    // Both activations wrote through the same instance in the caller frame.
    assert_eq!(interpreter.read_stack(0, IrType::DWord).unwrap(), 2);
}

#[test]
fn in_out_arguments_pass_the_variable_address() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);

    let bump_sig = Signature::new(PouId::from("Bump"), PouKind::Function)
        .with_params(vec![Param::new("x", dint, ParamDirection::InOut)]);
    let bump_body = vec![assign(
        Expr::new(ExprKind::Param(0), dint),
        builtin_call(
            "ADD_DINT",
            vec![Expr::new(ExprKind::Param(0), dint), lit(1, dint)],
            dint,
        ),
    )];
    module.add_pou(BoundPou::new(bump_sig, bump_body));

    let main_body = vec![
        decl_init(0, "v", dint, Some(Initializer::Expr(lit(41, dint)))),
        Stmt::new(StmtKind::Call(CallExpr {
            callee: Callee::Pou(PouId::from("Bump")),
            args: vec![CallArg {
                param: 0,
                value: local(0, dint),
            }],
        })),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        main_body,
    ));

    let interpreter = run_program(&module, "Main");
    // The callee wrote back through the caller's address.
    assert_eq!(interpreter.read_stack(0, IrType::DWord).unwrap(), 42);
}

#[test]
fn short_circuit_or_decides_on_a_true_left_side() {
    let mut registry = TypeRegistry::new();
    let boolean = registry.scalar(ScalarType::Bool);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    // c is TRUE, so the division by the zero-valued d never runs.
    let rhs = builtin_call(
        "EQ_DINT",
        vec![
            builtin_call("DIV_DINT", vec![lit(1, dint), local(1, dint)], dint),
            lit(1, dint),
        ],
        boolean,
    );
    let body = vec![
        decl_init(0, "c", boolean, Some(Initializer::Expr(lit(1, boolean)))),
        decl(1, "d", dint),
        decl(2, "r", boolean),
        assign(
            local(2, boolean),
            Expr::new(
                ExprKind::ShortCircuit {
                    op: coil_hir::ShortCircuitOp::Or,
                    lhs: Box::new(local(0, boolean)),
                    rhs: Box::new(rhs),
                },
                boolean,
            ),
        ),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    assert_eq!(interpreter.read_stack(8, IrType::Byte).unwrap(), 1);
}

#[test]
fn call_results_copy_back_into_indexed_destinations() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let arr = registry.add_array(int, 0, 3);
    let mut module = BoundModule::new(registry);
    let target = Expr::new(
        ExprKind::Index {
            base: Box::new(local(0, arr)),
            index: Box::new(local(1, dint)),
        },
        int,
    );
    let body = vec![
        decl(0, "values", arr),
        decl_init(1, "i", dint, Some(Initializer::Expr(lit(1, dint)))),
        assign(target, builtin_call("ADD_INT", vec![lit(40, int), lit(2, int)], int)),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let interpreter = run_program(&module, "Main");
    // Only the addressed element changed.
    assert_eq!(interpreter.read_stack(2, IrType::Word).unwrap(), 42);
    for offset in [0u16, 4, 6] {
        assert_eq!(interpreter.read_stack(offset, IrType::Word).unwrap(), 0);
    }
}

#[test]
fn breakpoints_stop_before_their_statement() {
    // One statement per line: x, y, z.
    let text = "x\ny\nz\n";
    let span = |start: u32, end: u32| TextRange::new(start.into(), end.into());

    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl(0, "x", dint),
        decl(1, "y", dint),
        decl(2, "z", dint),
        assign(local(0, dint), lit(1, dint)).with_span(span(0, 1)),
        assign(local(1, dint), lit(2, dint)).with_span(span(2, 3)),
        assign(local(2, dint), lit(3, dint)).with_span(span(4, 5)),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let index = LineIndex::new(text);
    let mut interpreter = interpreter_for(&module, Some(&index));
    let main = PouId::from("Main");
    interpreter.add_breakpoint(&main, BreakpointId(1));
    interpreter.start(&main).unwrap();

    assert_eq!(interpreter.run(), ExecutionState::Breakpoint);
    assert_eq!(
        interpreter.current_breakpoint(),
        Some((main.clone(), BreakpointId(1)))
    );
    // The first statement ran, the one under the breakpoint did not.
    assert_eq!(interpreter.read_stack(0, IrType::DWord).unwrap(), 1);
    assert_eq!(interpreter.read_stack(4, IrType::DWord).unwrap(), 0);

    // Line-stepping from here stops on the next line.
    assert_eq!(interpreter.step_line(), ExecutionState::Breakpoint);
    assert_eq!(
        interpreter.current_breakpoint(),
        Some((main.clone(), BreakpointId(2)))
    );
    assert_eq!(interpreter.read_stack(4, IrType::DWord).unwrap(), 2);
    assert_eq!(interpreter.read_stack(8, IrType::DWord).unwrap(), 0);

    assert_eq!(interpreter.run(), ExecutionState::EndOfProgram);
    assert_eq!(interpreter.read_stack(8, IrType::DWord).unwrap(), 3);
}

#[test]
fn temporary_breakpoints_clear_on_hit() {
    let text = "x\ny\n";
    let span = |start: u32, end: u32| TextRange::new(start.into(), end.into());

    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let body = vec![
        decl(0, "x", dint),
        assign(local(0, dint), lit(1, dint)).with_span(span(0, 1)),
        assign(local(0, dint), lit(2, dint)).with_span(span(2, 3)),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let index = LineIndex::new(text);
    let mut interpreter = interpreter_for(&module, Some(&index));
    let main = PouId::from("Main");
    interpreter.add_temporary_breakpoint(&main, BreakpointId(1));
    interpreter.start(&main).unwrap();
    assert_eq!(interpreter.run(), ExecutionState::Breakpoint);

    // The overlay cleared on the hit: a fresh run passes straight through.
    interpreter.start(&main).unwrap();
    assert_eq!(interpreter.run(), ExecutionState::EndOfProgram);
}

#[test]
fn global_initializers_fill_their_area() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let int = registry.scalar(ScalarType::Int);
    let block = GlobalBlock::layout(
        "Cfg",
        &registry,
        vec![
            (
                SmolStr::new("speed"),
                dint,
                Some(Initializer::Expr(lit(500, dint))),
            ),
            (SmolStr::new("gear"), int, None),
        ],
    );
    let mut module = BoundModule::new(registry);
    module.set_globals(vec![block]);
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        Vec::new(),
    ));

    let mut interpreter = interpreter_for(&module, None);
    assert_eq!(interpreter.initialize(), ExecutionState::EndOfProgram);
    // Block "Cfg" is area 2; speed laid out first (largest alignment).
    assert_eq!(interpreter.read_global(2, 0, IrType::DWord).unwrap(), 500);
    assert_eq!(interpreter.read_global(2, 4, IrType::Word).unwrap(), 0);
}

#[test]
fn globals_survive_across_runs() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let block = GlobalBlock::layout(
        "State",
        &registry,
        vec![(SmolStr::new("count"), dint, None)],
    );
    let mut module = BoundModule::new(registry);
    module.set_globals(vec![block]);
    let counter = Expr::new(ExprKind::Global { block: 0, var: 0 }, dint);
    let body = vec![assign(
        counter.clone(),
        builtin_call("ADD_DINT", vec![counter, lit(1, dint)], dint),
    )];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    let mut interpreter = interpreter_for(&module, None);
    let main = PouId::from("Main");
    for _ in 0..3 {
        interpreter.start(&main).unwrap();
        assert_eq!(interpreter.run(), ExecutionState::EndOfProgram);
    }
    assert_eq!(interpreter.read_global(2, 0, IrType::DWord).unwrap(), 3);
}
