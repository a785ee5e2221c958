// ABOUTME: Walks the AST building the scope tree and emitting the a..m rule-code diagnostics

use crate::ast::*;
use crate::constfold::def_to_var_symbol;
use crate::diagnostic::Diagnostics;
use crate::scope::{BlockCounter, FuncSymbol, Scope, VarSymbol};
use crate::token::DiagnosticCode;
use crate::trace::Traces;
use crate::ty::{Ty, TypeRegistry};
use std::rc::Rc;

/// Classifies an `Expr` argument as pointer-shaped (a bare array reference,
/// no subscript) or value-shaped (everything else), per the parameter-type
/// rule's definition.
fn is_pointer_shaped(expr: &Expr, scope: &Rc<Scope>) -> bool {
    match expr {
        Expr::LVal(lv) if lv.index.is_none() => scope
            .get_var(&lv.name)
            .map(|v| matches!(&*v.ty, Ty::Array(..)))
            .unwrap_or(false),
        _ => false,
    }
}

fn array_elem_ty(ty: &Ty) -> Option<ElemTy> {
    match ty {
        Ty::Array(elem, _) => match &**elem {
            Ty::Int => Some(ElemTy::Int),
            Ty::Char => Some(ElemTy::Char),
            _ => None,
        },
        _ => None,
    }
}

/// Checks a (sub-)expression for undefined identifiers, recursing into every
/// operand; this is the only rule that needs to see inside `Expr`.
fn check_expr(expr: &Expr, scope: &Rc<Scope>, diags: &mut Diagnostics) {
    match expr {
        Expr::IntLit(..) | Expr::CharLit(..) => {}
        Expr::LVal(lv) => {
            if scope.get_var(&lv.name).is_none() {
                diags.push(lv.line, DiagnosticCode::IdentUndef);
            }
            if let Some(idx) = &lv.index {
                check_expr(idx, scope, diags);
            }
        }
        Expr::Call { name, args, line } => {
            let func = scope.get_func(name);
            if func.is_none() {
                diags.push(*line, DiagnosticCode::IdentUndef);
            }
            for a in args {
                check_expr(a, scope, diags);
            }
            if let Some(f) = func {
                if f.params.len() != args.len() {
                    diags.push(*line, DiagnosticCode::FuncParamCountNotMatch);
                } else {
                    for ((elem_ty, is_pointer), arg) in f.params.iter().zip(args.iter()) {
                        let shaped = is_pointer_shaped(arg, scope);
                        if *is_pointer {
                            let matches_elem = match arg {
                                Expr::LVal(lv) => scope
                                    .get_var(&lv.name)
                                    .and_then(|v| array_elem_ty(&v.ty))
                                    .map(|e| e == *elem_ty)
                                    .unwrap_or(false),
                                _ => false,
                            };
                            if !shaped || !matches_elem {
                                diags.push(arg.line(), DiagnosticCode::FuncParamTypeNotMatch);
                            }
                        } else if shaped {
                            diags.push(arg.line(), DiagnosticCode::FuncParamTypeNotMatch);
                        }
                    }
                }
            }
        }
        Expr::Unary { operand, .. } => check_expr(operand, scope, diags),
        Expr::Binary { lhs, rhs, .. } => {
            check_expr(lhs, scope, diags);
            check_expr(rhs, scope, diags);
        }
    }
}

fn check_assign(assign: &Assign, scope: &Rc<Scope>, diags: &mut Diagnostics) {
    let sym = scope.get_var(&assign.lval.name);
    match &sym {
        None => diags.push(assign.lval.line, DiagnosticCode::IdentUndef),
        Some(v) if v.is_const => diags.push(assign.line, DiagnosticCode::ConstModify),
        Some(_) => {}
    }
    if let Some(idx) = &assign.lval.index {
        check_expr(idx, scope, diags);
    }
    if let RVal::Exp(e) = &assign.rval {
        check_expr(e, scope, diags);
    }
}

fn count_printf_params(format: &str) -> usize {
    let bytes = format.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'%' && (bytes[i + 1] == b'd' || bytes[i + 1] == b'c') {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}

struct FuncCtx {
    ret_ty: RetTy,
}

/// Walks a statement, declaring nested blocks' scopes, checking rules
/// b/c/d/e/f/h/l, and, for rule `m`, stopping at `for` loops without
/// descending into their bodies: anything inside a `for` is by definition
/// not a misuse, so there is nothing further to check there.
#[allow(clippy::too_many_arguments)]
fn check_stmt(
    stmt: &Stmt,
    scope: &Rc<Scope>,
    counter: &mut BlockCounter,
    types: &TypeRegistry,
    ctx: &FuncCtx,
    diags: &mut Diagnostics,
    traces: &mut Traces,
) {
    match stmt {
        Stmt::Assign(a) => check_assign(a, scope, diags),
        Stmt::Expr(e, _) => {
            if let Some(e) = e {
                check_expr(e, scope, diags);
            }
        }
        Stmt::Block(b) => {
            let inner = Scope::child(scope, counter);
            check_block(b, &inner, counter, types, ctx, diags, traces);
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            check_expr(cond, scope, diags);
            check_stmt(then_branch, scope, counter, types, ctx, diags, traces);
            if let Some(e) = else_branch {
                check_stmt(e, scope, counter, types, ctx, diags, traces);
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                check_assign(init, scope, diags);
            }
            if let Some(cond) = cond {
                check_expr(cond, scope, diags);
            }
            if let Some(step) = step {
                check_assign(step, scope, diags);
            }
            check_stmt(body, scope, counter, types, ctx, diags, traces);
        }
        Stmt::Break(_) | Stmt::Continue(_) => {}
        Stmt::Return { value, line } => {
            if let Some(v) = value {
                check_expr(v, scope, diags);
                if ctx.ret_ty == RetTy::Void {
                    diags.push(*line, DiagnosticCode::VoidFuncReturn);
                }
            }
        }
        Stmt::Printf { format, args, line } => {
            for a in args {
                check_expr(a, scope, diags);
            }
            if count_printf_params(format) != args.len() {
                diags.push(*line, DiagnosticCode::PrintfParamCountNotMatch);
            }
        }
    }
}

/// Separate pass, only looking for rule `m`: loose `break`/`continue`. Does
/// not descend into `for` bodies at all.
fn check_loop_misuse(stmt: &Stmt, diags: &mut Diagnostics) {
    match stmt {
        Stmt::Break(line) => diags.push(*line, DiagnosticCode::IterIdentMisuse),
        Stmt::Continue(line) => diags.push(*line, DiagnosticCode::IterIdentMisuse),
        Stmt::Block(b) => {
            for item in &b.items {
                if let BlockItem::Stmt(s) = item {
                    check_loop_misuse(s, diags);
                }
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            check_loop_misuse(then_branch, diags);
            if let Some(e) = else_branch {
                check_loop_misuse(e, diags);
            }
        }
        Stmt::For { .. } => {}
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn check_block(
    block: &Block,
    scope: &Rc<Scope>,
    counter: &mut BlockCounter,
    types: &TypeRegistry,
    ctx: &FuncCtx,
    diags: &mut Diagnostics,
    traces: &mut Traces,
) {
    for item in &block.items {
        match item {
            BlockItem::Decl(decl) => declare_decl(decl, scope, types, diags, traces),
            BlockItem::Stmt(s) => check_stmt(s, scope, counter, types, ctx, diags, traces),
        }
    }
}

/// True if the last block item is a non-empty `return`, the syntactic test
/// rule `g` uses to decide whether a non-void function falls off its end.
fn ends_in_return(block: &Block) -> bool {
    matches!(
        block.items.last(),
        Some(BlockItem::Stmt(Stmt::Return { value: Some(_), .. }))
    )
}

fn declare_decl(
    decl: &Decl,
    scope: &Rc<Scope>,
    types: &TypeRegistry,
    diags: &mut Diagnostics,
    traces: &mut Traces,
) {
    for def in &decl.defs {
        if let Some(len) = &def.array_len {
            check_expr(len, scope, diags);
        }
        match &def.init {
            Some(InitVal::Single(e)) => check_expr(e, scope, diags),
            Some(InitVal::ArrayList(exprs)) => {
                for e in exprs {
                    check_expr(e, scope, diags);
                }
            }
            Some(InitVal::Str(_)) | None => {}
        }
        let sym = def_to_var_symbol(decl.ty, decl.is_const, def, scope, types);
        if scope.bound_locally(&def.name) {
            diags.push(def.line, DiagnosticCode::IdentRedef);
        } else {
            scope.add_var(&def.name, sym);
            traces.symbol_bound(scope.blockn, &def.name, "var");
        }
    }
}

fn func_symbol(func: &FuncDef) -> FuncSymbol {
    FuncSymbol {
        ret_ty: func.ret_ty,
        params: func.params.iter().map(|p| (p.ty, p.is_pointer)).collect(),
        line: func.line,
    }
}

/// Runs the full semantic analysis pass over a parsed compilation unit,
/// declaring every global and building a fresh child scope per function
/// body. The returned scope is not reused by IR generation, which rebuilds
/// its own (see `irgen`'s module doc); this one exists only to carry
/// const values and types through to the checks above.
pub fn analyze(unit: &CompUnit, diags: &mut Diagnostics, traces: &mut Traces) -> Rc<Scope> {
    let types = TypeRegistry::new();
    let mut counter = BlockCounter::new();
    let global = Scope::global(&mut counter);

    for item in &unit.items {
        match item {
            Item::Decl(decl) => declare_decl(decl, &global, &types, diags, traces),
            Item::FuncDef(func) => {
                if scope_has_func(&global, &func.name) {
                    diags.push(func.line, DiagnosticCode::IdentRedef);
                } else {
                    global.add_func(&func.name, func_symbol(func));
                    traces.symbol_bound(global.blockn, &func.name, "func");
                }
            }
        }
    }

    for item in &unit.items {
        if let Item::FuncDef(func) = item {
            let fn_scope = Scope::child(&global, &mut counter);
            for p in &func.params {
                let ty = if p.is_pointer {
                    let elem = match p.ty {
                        ElemTy::Int => types.int(),
                        ElemTy::Char => types.char_ty(),
                    };
                    types.array(elem, 0)
                } else {
                    match p.ty {
                        ElemTy::Int => types.int(),
                        ElemTy::Char => types.char_ty(),
                    }
                };
                if fn_scope.bound_locally(&p.name) {
                    diags.push(p.line, DiagnosticCode::IdentRedef);
                } else {
                    fn_scope.add_var(&p.name, VarSymbol::new(ty, false, None, p.line));
                    traces.symbol_bound(fn_scope.blockn, &p.name, "var");
                }
            }
            let ctx = FuncCtx { ret_ty: func.ret_ty };
            check_block(
                &func.body,
                &fn_scope,
                &mut counter,
                &types,
                &ctx,
                diags,
                traces,
            );
            if func.ret_ty != RetTy::Void && !ends_in_return(&func.body) {
                diags.push(func.line, DiagnosticCode::FuncNoReturn);
            }
            for item in &func.body.items {
                if let BlockItem::Stmt(s) = item {
                    check_loop_misuse(s, diags);
                }
            }
        }
    }

    let main_scope = Scope::child(&global, &mut counter);
    let ctx = FuncCtx { ret_ty: RetTy::Int };
    check_block(
        &unit.main.body,
        &main_scope,
        &mut counter,
        &types,
        &ctx,
        diags,
        traces,
    );
    if !ends_in_return(&unit.main.body) {
        diags.push(unit.main.line, DiagnosticCode::FuncNoReturn);
    }
    for item in &unit.main.body.items {
        if let BlockItem::Stmt(s) = item {
            check_loop_misuse(s, diags);
        }
    }

    global
}

fn scope_has_func(global: &Rc<Scope>, name: &str) -> bool {
    global.bound_locally(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let tokens = lex(src, &mut diags).unwrap();
        let (unit, _traces) = parse(&tokens, &mut diags);
        let mut traces = Traces::new(false);
        analyze(&unit, &mut diags, &mut traces);
        diags
    }

    #[test]
    fn flags_undefined_identifier() {
        let diags = analyze_src("int main(){ return x; }");
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::IdentUndef));
    }

    #[test]
    fn flags_const_modification() {
        let diags = analyze_src("const int N = 1; int main(){ N = 2; return 0; }");
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::ConstModify));
    }

    #[test]
    fn flags_missing_return_in_non_void_function() {
        let diags = analyze_src("int f(){ } int main(){ return 0; }");
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::FuncNoReturn));
    }

    #[test]
    fn flags_value_returned_from_void_function() {
        let diags = analyze_src("void f(){ return 1; } int main(){ return 0; }");
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::VoidFuncReturn));
    }

    #[test]
    fn break_inside_for_loop_is_not_flagged() {
        let diags = analyze_src("int main(){ for(;;) { break; } return 0; }");
        assert!(!diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::IterIdentMisuse));
    }

    #[test]
    fn break_outside_any_loop_is_flagged() {
        let diags = analyze_src("int main(){ break; return 0; }");
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::IterIdentMisuse));
    }

    #[test]
    fn printf_arg_count_mismatch_is_flagged() {
        let diags = analyze_src(r#"int main(){ printf("%d %d", 1); return 0; }"#);
        assert!(diags
            .sorted()
            .iter()
            .any(|d| d.code == DiagnosticCode::PrintfParamCountNotMatch));
    }
}
