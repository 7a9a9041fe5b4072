//! Lowering tests over hand-built bound trees, asserting on the textual IR.

use coil_codegen::{compile_module, CodegenError};
use coil_hir::{
    BoundModule, BoundPou, CallArg, CallExpr, Callee, Expr, ExprKind, ForStmt, GlobalBlock,
    IfBranch, Initializer, LineIndex, LocalDecl, LocalId, Param, ParamDirection, PouKind,
    ScalarType, Signature, Stmt, StmtKind, TypeId, TypeRegistry,
};
use coil_ir::{BreakpointId, CompiledPou, IrType, LocalVarOffset, PouId};
use expect_test::{expect, Expect};
use smol_str::SmolStr;
use text_size::TextRange;

fn lit(bits: u64, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Literal(bits), ty)
}

fn local(id: u32, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Local(LocalId(id)), ty)
}

fn param(index: usize, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Param(index), ty)
}

fn decl(id: u32, name: &str, ty: TypeId) -> Stmt {
    Stmt::new(StmtKind::Local(LocalDecl {
        id: LocalId(id),
        name: SmolStr::new(name),
        ty,
        init: None,
    }))
}

fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target, value })
}

fn builtin_call(name: &str, args: Vec<Expr>, ty: TypeId) -> Expr {
    let args = args
        .into_iter()
        .enumerate()
        .map(|(param, value)| CallArg { param, value })
        .collect();
    Expr::new(
        ExprKind::Call(Box::new(CallExpr {
            callee: Callee::Builtin(SmolStr::new(name)),
            args,
        })),
        ty,
    )
}

fn listing(pou: &CompiledPou) -> String {
    let mut out = String::new();
    for statement in &pou.code {
        out.push_str(&statement.to_string());
        out.push('\n');
    }
    out
}

fn check(pou: &CompiledPou, expected: &Expect) {
    expected.assert_eq(&listing(pou));
}

fn compile(module: &BoundModule, name: &str) -> CompiledPou {
    coil_codegen::compile_pou(module, &PouId::from(name), None).unwrap()
}

#[test]
fn function_with_return_value() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Inc"), PouKind::Function)
        .with_params(vec![Param::new("x", int, ParamDirection::In)])
        .with_return_type(int);
    let body = vec![assign(
        Expr::new(ExprKind::ReturnValue, int),
        builtin_call("ADD_INT", vec![param(0, int), lit(1, int)], int),
    )];
    module.add_pou(BoundPou::new(sig, body));

    let pou = compile(&module, "Inc");
    check(
        &pou,
        &expect![[r#"
            copy2 1:2 to stack4
            call ADD_INT(stack0, stack4) => stack2
            return
        "#]],
    );
    // Input x at 0, return value bound straight to its output slot at 2.
    assert_eq!(pou.inputs.len(), 1);
    assert_eq!(pou.inputs[0].offset, LocalVarOffset(0));
    assert_eq!(pou.outputs.len(), 1);
    assert_eq!(pou.outputs[0].offset, LocalVarOffset(2));
    assert_eq!(pou.outputs[0].ty, IrType::Word);
    assert_eq!(pou.stack_size, 6);
}

#[test]
fn temporaries_are_reused_between_statements() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Main"), PouKind::Program);
    let body = vec![
        decl(0, "a", dint),
        decl(1, "b", dint),
        assign(
            local(0, dint),
            builtin_call("ADD_DINT", vec![local(1, dint), lit(1, dint)], dint),
        ),
        assign(
            local(1, dint),
            builtin_call("ADD_DINT", vec![local(0, dint), lit(2, dint)], dint),
        ),
    ];
    module.add_pou(BoundPou::new(sig, body));

    let pou = compile(&module, "Main");
    // Both literals land in the same reclaimed temporary at offset 8.
    check(
        &pou,
        &expect![[r#"
            copy4 1:4 to stack8
            call ADD_DINT(stack4, stack8) => stack0
            copy4 2:4 to stack8
            call ADD_DINT(stack0, stack8) => stack4
            return
        "#]],
    );
    assert_eq!(pou.stack_size, 12);
}

#[test]
fn checked_index_writes_through_a_pointer() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let arr = registry.add_array(int, 0, 2);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Main"), PouKind::Program);
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
        assign(target, lit(5, int)),
    ];
    module.add_pou(BoundPou::new(sig, body));

    let pou = compile(&module, "Main");
    check(
        &pou,
        &expect![[r#"
            copy4 &stack0[stack8 in 0..2 *2] to stack12
            copy2 5:2 to *stack12
            return
        "#]],
    );
}

#[test]
fn narrow_index_values_are_rejected() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let arr = registry.add_array(int, 0, 2);
    let mut module = BoundModule::new(registry);
    let target = Expr::new(
        ExprKind::Index {
            base: Box::new(local(0, arr)),
            index: Box::new(local(1, int)),
        },
        int,
    );
    let body = vec![
        decl(0, "values", arr),
        decl(1, "i", int),
        assign(target, lit(5, int)),
    ];
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        body,
    ));

    // A 2-byte index would read garbage at runtime, so lowering refuses it.
    let result = coil_codegen::compile_pou(&module, &PouId::from("Main"), None);
    assert!(matches!(result, Err(CodegenError::Unsupported(_))));
}

#[test]
fn for_loop_captures_bounds_once() {
    let mut registry = TypeRegistry::new();
    let int = registry.scalar(ScalarType::Int);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Main"), PouKind::Program);
    let body = vec![
        decl(0, "i", int),
        decl(1, "j", dint),
        Stmt::new(StmtKind::For(Box::new(ForStmt {
            control: local(0, int),
            start: lit(0, int),
            end: lit(10, int),
            step: None,
            body: vec![assign(local(1, dint), lit(1, dint))],
        }))),
    ];
    module.add_pou(BoundPou::new(sig, body));

    let pou = compile(&module, "Main");
    check(
        &pou,
        &expect![[r#"
            copy4 &stack0 to stack8
            copy2 0:2 to stack12
            copy2 10:2 to stack14
            copy2 1:2 to stack16
            call FOR_LOOP_INIT_INT(stack12, stack16, stack14) => stack18
            if not stack18 jump to for_end0
            copy2 stack12 to *stack8
            for1:
            copy4 1:4 to stack4
            call FOR_LOOP_NEXT_INT(stack8, stack16, stack14) => stack19
            if not stack19 jump to for_end0
            jump to for1
            for_end0:
            return
        "#]],
    );
}

#[test]
fn if_chain_breakpoints_fan_out_and_back_in() {
    // Source layout (0-based lines):
    //   0: c     (first condition)
    //   1: x1    (first branch body)
    //   2: d     (second condition)
    //   3: x2    (second branch body)
    //   4: y     (statement after the chain)
    let text = "c\nx1\nd\nx2\ny\n";
    let span = |start: u32, end: u32| TextRange::new(start.into(), end.into());

    let mut registry = TypeRegistry::new();
    let boolean = registry.scalar(ScalarType::Bool);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Main"), PouKind::Program).with_params(vec![
        Param::new("c", boolean, ParamDirection::In),
        Param::new("d", boolean, ParamDirection::In),
    ]);
    let body = vec![
        decl(0, "x", dint),
        decl(1, "y", dint),
        Stmt::new(StmtKind::If {
            branches: vec![
                IfBranch {
                    condition: param(0, boolean).with_span(span(0, 1)),
                    body: vec![assign(local(0, dint), lit(1, dint)).with_span(span(2, 4))],
                },
                IfBranch {
                    condition: param(1, boolean).with_span(span(5, 6)),
                    body: vec![assign(local(0, dint), lit(2, dint)).with_span(span(7, 9))],
                },
            ],
            else_body: Vec::new(),
        }),
        assign(local(1, dint), lit(3, dint)).with_span(span(10, 11)),
    ];
    module.add_pou(BoundPou::new(sig, body));

    let index = LineIndex::new(text);
    let pou = coil_codegen::compile_pou(&module, &PouId::from("Main"), Some(&index)).unwrap();
    let map = pou.breakpoints.as_ref().unwrap();

    let id = BreakpointId;
    // First condition fans out to its body and the second condition.
    assert_eq!(map.successors(id(0)), [id(1), id(2)]);
    // Branch bodies and the failed last condition all rejoin at `y`.
    assert_eq!(map.successors(id(1)), [id(4)]);
    assert_eq!(map.successors(id(2)), [id(3), id(4)]);
    assert_eq!(map.successors(id(3)), [id(4)]);
    // Source lookup by bare line number.
    assert_eq!(map.breakpoint_at_source(3, None), Some(id(3)));
}

#[test]
fn while_loop_breakpoints_step_back_to_the_condition() {
    // 0: c, 1: x, 2: y
    let text = "c\nx\ny\n";
    let span = |start: u32, end: u32| TextRange::new(start.into(), end.into());

    let mut registry = TypeRegistry::new();
    let boolean = registry.scalar(ScalarType::Bool);
    let dint = registry.scalar(ScalarType::DInt);
    let mut module = BoundModule::new(registry);
    let sig = Signature::new(PouId::from("Main"), PouKind::Program)
        .with_params(vec![Param::new("c", boolean, ParamDirection::In)]);
    let body = vec![
        decl(0, "x", dint),
        decl(1, "y", dint),
        Stmt::new(StmtKind::While {
            condition: param(0, boolean).with_span(span(0, 1)),
            body: vec![assign(local(0, dint), lit(1, dint)).with_span(span(2, 3))],
        }),
        assign(local(1, dint), lit(2, dint)).with_span(span(4, 5)),
    ];
    module.add_pou(BoundPou::new(sig, body));

    let index = LineIndex::new(text);
    let pou = coil_codegen::compile_pou(&module, &PouId::from("Main"), Some(&index)).unwrap();
    let map = pou.breakpoints.as_ref().unwrap();

    let id = BreakpointId;
    // Condition enters the body or exits to the trailing statement; the
    // body always steps back to the condition.
    assert_eq!(map.successors(id(0)), [id(1), id(2)]);
    assert_eq!(map.successors(id(1)), [id(0)]);
    // Stepping a line from the body means going through the condition.
    assert_eq!(map.next_line_successors(id(1)), [id(0)]);
}

#[test]
fn global_blocks_get_initializer_pous() {
    let mut registry = TypeRegistry::new();
    let dint = registry.scalar(ScalarType::DInt);
    let block = GlobalBlock::layout(
        "Cfg",
        &registry,
        vec![(
            SmolStr::new("speed"),
            dint,
            Some(Initializer::Expr(lit(500, dint))),
        )],
    );
    let mut module = BoundModule::new(registry);
    module.set_globals(vec![block]);
    module.add_pou(BoundPou::new(
        Signature::new(PouId::from("Main"), PouKind::Program),
        Vec::new(),
    ));

    let compiled = compile_module(&module, None).unwrap();
    assert_eq!(compiled.areas.len(), 1);
    assert_eq!(compiled.areas[0].area, 2);
    assert_eq!(compiled.areas[0].size, 4);
    assert_eq!(compiled.initializers, vec![PouId::from("Cfg$init")]);

    let init = compiled.pou_by_name("Cfg$init").unwrap();
    // Area 2, offset 0 packs to 2 << 16 in the pointer encoding.
    check(
        init,
        &expect![[r#"
            copy4 131072:4 to stack0
            copy4 500:4 to *stack0
            return
        "#]],
    );
}
