// ABOUTME: End-to-end pipeline tests — lex, parse, analyze, lower, render

use blangc::diagnostic::Diagnostics;
use blangc::irgen;
use blangc::lexer::lex;
use blangc::parser::parse;
use blangc::sema::analyze;
use blangc::token::DiagnosticCode;
use blangc::trace::Traces;

/// Runs the pipeline through to rendered IR, returning both the IR text and
/// the sorted diagnostics collected along the way.
fn compile(src: &str) -> (String, Diagnostics) {
    let mut diags = Diagnostics::new();
    let tokens = lex(src, &mut diags).expect("lexing should not hit a fatal error");
    let (unit, _parse_trace) = parse(&tokens, &mut diags);
    let mut traces = Traces::new(false);
    analyze(&unit, &mut diags, &mut traces);
    let module = irgen::generate(&unit, true);
    (module.to_string(), diags)
}

#[test]
fn scenario_1_bare_main_returns_a_constant() {
    let (ir, diags) = compile("int main(){return 0;}");
    assert!(diags.is_empty());
    let mains: Vec<&str> = ir.matches("define i32 @main()").collect();
    assert_eq!(mains.len(), 1);
    assert!(ir.contains("ret i32 0"));
}

#[test]
fn scenario_2_const_array_length_folds_through_arithmetic() {
    let (ir, diags) = compile("const int N = 3+4; int a[N]; int main(){return 0;}");
    assert!(diags.is_empty());
    assert!(ir.contains("[7 x i32]"));
}

#[test]
fn scenario_3_break_targets_for_end_and_final_return_reads_the_alloca() {
    let (ir, diags) =
        compile("int main(){int x=0; for(x=0; x<3; x=x+1) if(x==1) break; return x;}");
    assert!(diags.is_empty());
    assert!(ir.lines().any(|l| l.contains("br label %for_end")));
    let ret_line = ir
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with("ret"))
        .expect("function must end with a ret");
    assert!(ret_line.contains('%'), "final return should read a register, not a bare constant");
}

#[test]
fn scenario_4_returning_a_value_from_a_void_function_is_flagged() {
    let (_ir, diags) = compile("void f(){return 1;} int main(){return 0;}");
    let sorted = diags.sorted();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].line, 1);
    assert_eq!(sorted[0].code, DiagnosticCode::VoidFuncReturn);
}

#[test]
fn scenario_5_param_count_mismatch_and_missing_return_both_land_on_one_line() {
    let (_ir, diags) = compile("int f(int a){} int main(){return f(1,2);}");
    let sorted = diags.sorted();
    assert!(sorted
        .iter()
        .any(|d| d.code == DiagnosticCode::FuncParamCountNotMatch));
    assert!(sorted.iter().any(|d| d.code == DiagnosticCode::FuncNoReturn));
}

#[test]
fn scenario_6_printf_arg_mismatch_still_yields_well_formed_ir() {
    let (ir, diags) = compile(r#"int main(){printf("%d %c\n", 1); return 0;}"#);
    assert!(diags
        .sorted()
        .iter()
        .any(|d| d.code == DiagnosticCode::PrintfParamCountNotMatch));
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("ret i32 0"));
}

#[test]
fn register_numbers_within_a_function_are_dense_and_increasing_from_zero() {
    let (ir, diags) = compile("int main(){int a=1; int b=2; return a+b;}");
    assert!(diags.is_empty());
    let body = ir
        .split("define i32 @main()")
        .nth(1)
        .expect("main's body should follow its signature");
    let mut seen = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.trim_start().strip_prefix('%') {
            if let Some(num_str) = rest.split(|c: char| !c.is_ascii_digit()).next() {
                if let Ok(n) = num_str.parse::<u32>() {
                    if line.trim_start().starts_with(&format!("%{} =", n)) {
                        seen.push(n);
                    }
                }
            }
        }
    }
    for (i, n) in seen.iter().enumerate() {
        assert_eq!(*n, i as u32, "register numbering must be dense and increasing");
    }
}

#[test]
fn missing_semicolon_recovers_with_a_single_diagnostic() {
    let mut diags = Diagnostics::new();
    let tokens = lex("int main(){int x = 1 return x;}", &mut diags).unwrap();
    let (_unit, _trace) = parse(&tokens, &mut diags);
    assert!(diags
        .sorted()
        .iter()
        .any(|d| d.code == DiagnosticCode::MissingSemicolon));
}

#[test]
fn the_empty_block_pass_can_be_disabled_via_the_flag() {
    let mut diags = Diagnostics::new();
    let src = "int main(){int x=0; for(x=0; x<3; x=x+1) {} return x;}";
    let tokens = lex(src, &mut diags).unwrap();
    let (unit, _trace) = parse(&tokens, &mut diags);
    let mut traces = Traces::new(false);
    analyze(&unit, &mut diags, &mut traces);

    let with_pass = irgen::generate(&unit, true).to_string();
    let without_pass = irgen::generate(&unit, false).to_string();
    assert!(without_pass.len() >= with_pass.len());
}

#[test]
fn pointer_parameter_array_argument_compiles_without_diagnostics() {
    let (ir, diags) = compile(
        "void fill(int a[], int n){ int i; for (i = 0; i < n; i = i + 1) a[i] = i; } \
         int main(){ int buf[4]; fill(buf, 4); return buf[0]; }",
    );
    assert!(diags.is_empty());
    assert!(ir.contains("define void @fill"));
}

#[test]
fn global_string_initializer_is_null_terminated() {
    let (ir, diags) = compile(r#"char msg[6] = "hi"; int main(){return 0;}"#);
    assert!(diags.is_empty());
    assert!(ir.contains("[6 x i8]"));
}
