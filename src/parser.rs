// ABOUTME: Recursive-descent parser: tokens to AST, with bounded backtracking and diagnostic recovery

use crate::ast::*;
use crate::diagnostic::Diagnostics;
use crate::token::{DiagnosticCode, Token, TokenKind};

/// Decodes the escape set shared by character and string literals. Invoked
/// when a literal's raw lexeme is folded into an AST node, not at lex time.
fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('v') => out.push('\x0b'),
            Some('f') => out.push('\x0c'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diags: &'a mut Diagnostics,
    /// Names of completed non-terminals, in commit order. Optional
    /// instrumentation (SPEC_FULL.md §3); semantically inert.
    pub traces: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], diags: &'a mut Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            diags,
            traces: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn line(&self) -> u32 {
        self.current().line
    }

    /// Line of the most recently consumed token: the line a recovery
    /// diagnostic is attached to.
    fn prev_line(&self) -> u32 {
        if self.pos == 0 {
            self.current().line
        } else {
            self.tokens[self.pos - 1].line
        }
    }

    fn at_eof(&self) -> bool {
        self.kind() == TokenKind::Eof
    }

    fn step(&mut self) -> Token {
        let t = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.step();
            true
        } else {
            false
        }
    }

    /// A missing `;`/`)`/`]` is reported at the previously consumed token's
    /// line and parsing continues without consuming anything.
    fn expect_recoverable(&mut self, kind: TokenKind, code: DiagnosticCode) {
        if !self.eat(kind) {
            self.diags.push(self.prev_line(), code);
        }
    }

    fn mark(&self) -> (usize, usize) {
        (self.pos, self.diags.len())
    }

    fn reset(&mut self, mark: (usize, usize), traces_len: usize) {
        self.pos = mark.0;
        self.diags.truncate(mark.1);
        self.traces.truncate(traces_len);
    }

    /// The save/attempt/commit-or-revert primitive: runs `f`; on `None`,
    /// rewinds the cursor and discards any diagnostics/traces `f` emitted.
    fn try_parse<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let mark = self.mark();
        let traces_len = self.traces.len();
        let result = f(self);
        if result.is_none() {
            self.reset(mark, traces_len);
        }
        result
    }

    fn trace(&mut self, name: &str) {
        self.traces.push(name.to_string());
    }

    // ---- top level ----

    fn main_ahead(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Int | TokenKind::Char | TokenKind::Void
        ) && self.peek(1).kind == TokenKind::Main
            && self.peek(2).kind == TokenKind::LParen
    }

    fn func_def_ahead(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Int | TokenKind::Char | TokenKind::Void
        ) && self.peek(1).kind == TokenKind::Ident
            && self.peek(2).kind == TokenKind::LParen
    }

    pub fn parse_comp_unit(&mut self) -> CompUnit {
        let mut items = Vec::new();
        loop {
            if self.main_ahead() {
                let main = self.parse_main();
                self.trace("CompUnit");
                return CompUnit { items, main };
            }
            if self.at_eof() {
                let line = self.line();
                self.trace("CompUnit");
                return CompUnit {
                    items,
                    main: Main {
                        body: Block {
                            items: Vec::new(),
                            line,
                        },
                        line,
                    },
                };
            }
            if self.func_def_ahead() {
                items.push(Item::FuncDef(self.parse_func_def()));
            } else {
                items.push(Item::Decl(self.parse_decl()));
            }
        }
    }

    fn elem_ty(&mut self) -> ElemTy {
        match self.step().kind {
            TokenKind::Char => ElemTy::Char,
            _ => ElemTy::Int,
        }
    }

    fn ret_ty(&mut self) -> RetTy {
        match self.step().kind {
            TokenKind::Char => RetTy::Char,
            TokenKind::Void => RetTy::Void,
            _ => RetTy::Int,
        }
    }

    fn parse_main(&mut self) -> Main {
        let line = self.line();
        self.step(); // return-type keyword, discarded: Main has no type field
        self.step(); // 'main'
        self.eat(TokenKind::LParen);
        self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
        let body = self.parse_block();
        self.trace("MainFuncDef");
        Main { body, line }
    }

    fn parse_func_def(&mut self) -> FuncDef {
        let line = self.line();
        let ret_ty = self.ret_ty();
        let name = self.step().lexeme;
        self.eat(TokenKind::LParen);
        let params = if self.check(TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_func_f_params()
        };
        self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
        let body = self.parse_block();
        self.trace("FuncDef");
        FuncDef {
            ret_ty,
            name,
            params,
            body,
            line,
        }
    }

    fn parse_func_f_params(&mut self) -> Vec<FParam> {
        let mut params = Vec::new();
        loop {
            let line = self.line();
            let ty = self.elem_ty();
            let name = self.step().lexeme;
            let is_pointer = if self.eat(TokenKind::LBracket) {
                self.expect_recoverable(TokenKind::RBracket, DiagnosticCode::MissingSquare);
                true
            } else {
                false
            };
            params.push(FParam {
                ty,
                name,
                is_pointer,
                line,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.trace("FuncFParams");
        params
    }

    fn parse_block(&mut self) -> Block {
        let line = self.line();
        self.eat(TokenKind::LBrace);
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            items.push(self.parse_block_item());
        }
        // A missing '}' has no diagnostic code of its own in the rule table;
        // recover silently by treating end-of-input as end-of-block too.
        self.eat(TokenKind::RBrace);
        self.trace("Block");
        Block { items, line }
    }

    fn parse_block_item(&mut self) -> BlockItem {
        if matches!(
            self.kind(),
            TokenKind::Int | TokenKind::Char | TokenKind::Const
        ) {
            BlockItem::Decl(self.parse_decl())
        } else {
            BlockItem::Stmt(self.parse_stmt())
        }
    }

    // ---- declarations ----

    fn parse_decl(&mut self) -> Decl {
        let line = self.line();
        let is_const = self.eat(TokenKind::Const);
        let ty = self.elem_ty();
        let mut defs = vec![self.parse_def(is_const)];
        while self.eat(TokenKind::Comma) {
            defs.push(self.parse_def(is_const));
        }
        self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
        self.trace("Decl");
        Decl {
            ty,
            is_const,
            defs,
            line,
        }
    }

    fn parse_def(&mut self, is_const: bool) -> Def {
        let line = self.line();
        let name = self.step().lexeme;
        let array_len = if self.eat(TokenKind::LBracket) {
            let e = self.parse_exp();
            self.expect_recoverable(TokenKind::RBracket, DiagnosticCode::MissingSquare);
            Some(e)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_init_val(is_const))
        } else {
            None
        };
        self.trace("Def");
        Def {
            name,
            array_len,
            init,
            line,
        }
    }

    fn parse_init_val(&mut self, is_const: bool) -> InitVal {
        if self.check(TokenKind::StringConst) {
            let raw = self.step().lexeme;
            self.trace("InitVal");
            return InitVal::Str(decode_escapes(&raw));
        }
        if self.eat(TokenKind::LBrace) {
            let mut exps = Vec::new();
            if !self.check(TokenKind::RBrace) {
                exps.push(self.parse_exp());
                while self.eat(TokenKind::Comma) {
                    exps.push(self.parse_exp());
                }
            }
            self.eat(TokenKind::RBrace);
            self.trace("InitVal");
            return InitVal::ArrayList(exps);
        }
        let _ = is_const;
        let e = self.parse_exp();
        self.trace("InitVal");
        InitVal::Single(e)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> Stmt {
        match self.kind() {
            TokenKind::LBrace => Stmt::Block(self.parse_block()),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                let line = self.line();
                self.step();
                self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
                self.trace("Stmt");
                Stmt::Break(line)
            }
            TokenKind::Continue => {
                let line = self.line();
                self.step();
                self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
                self.trace("Stmt");
                Stmt::Continue(line)
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::Printf => self.parse_printf(),
            TokenKind::Semicolon => {
                let line = self.line();
                self.step();
                self.trace("Stmt");
                Stmt::Expr(None, line)
            }
            TokenKind::Ident => self.parse_assign_or_exp_stmt(),
            _ => {
                let line = self.line();
                let e = self.parse_exp();
                self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
                self.trace("Stmt");
                Stmt::Expr(Some(e), line)
            }
        }
    }

    fn parse_assign_or_exp_stmt(&mut self) -> Stmt {
        // `f(...)` can never be an lvalue, so route straight to ExpStmt before the
        // speculative LVal attempt below never has to unwind a call.
        if self.peek(1).kind == TokenKind::LParen {
            let line = self.line();
            let e = self.parse_exp();
            self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
            self.trace("Stmt");
            return Stmt::Expr(Some(e), line);
        }
        let line = self.line();
        let assign = self.try_parse(|p| {
            let lval = p.parse_lval();
            if p.eat(TokenKind::Assign) {
                Some(lval)
            } else {
                None
            }
        });
        if let Some(lval) = assign {
            let rval = self.parse_rval();
            self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
            self.trace("Stmt");
            Stmt::Assign(Assign { lval, rval, line })
        } else {
            let e = self.parse_exp();
            self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
            self.trace("Stmt");
            Stmt::Expr(Some(e), line)
        }
    }

    fn parse_rval(&mut self) -> RVal {
        if self.check(TokenKind::GetInt) {
            self.step();
            self.eat(TokenKind::LParen);
            self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
            return RVal::GetInt;
        }
        if self.check(TokenKind::GetChar) {
            self.step();
            self.eat(TokenKind::LParen);
            self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
            return RVal::GetChar;
        }
        RVal::Exp(self.parse_exp())
    }

    fn parse_if(&mut self) -> Stmt {
        let line = self.line();
        self.step();
        self.eat(TokenKind::LParen);
        let cond = self.parse_cond();
        self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
        let then_branch = Box::new(self.parse_stmt());
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()))
        } else {
            None
        };
        self.trace("IfStmt");
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            line,
        }
    }

    fn parse_for_assign(&mut self) -> Assign {
        let line = self.line();
        let lval = self.parse_lval();
        self.eat(TokenKind::Assign);
        let rval = RVal::Exp(self.parse_exp());
        Assign { lval, rval, line }
    }

    fn parse_for(&mut self) -> Stmt {
        let line = self.line();
        self.step();
        self.eat(TokenKind::LParen);
        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_for_assign())
        };
        self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_cond())
        };
        self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_for_assign())
        };
        self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
        let body = Box::new(self.parse_stmt());
        self.trace("ForStmt");
        Stmt::For {
            init,
            cond,
            step,
            body,
            line,
        }
    }

    fn parse_return(&mut self) -> Stmt {
        let line = self.line();
        self.step();
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_exp())
        };
        self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
        self.trace("ReturnStmt");
        Stmt::Return { value, line }
    }

    fn parse_printf(&mut self) -> Stmt {
        let line = self.line();
        self.step();
        self.eat(TokenKind::LParen);
        let format_raw = if self.check(TokenKind::StringConst) {
            self.step().lexeme
        } else {
            String::new()
        };
        let format = decode_escapes(&format_raw);
        let mut args = Vec::new();
        while self.eat(TokenKind::Comma) {
            args.push(self.parse_exp());
        }
        self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
        self.expect_recoverable(TokenKind::Semicolon, DiagnosticCode::MissingSemicolon);
        self.trace("PrintfStmt");
        Stmt::Printf { format, args, line }
    }

    // ---- expressions ----

    fn parse_lval(&mut self) -> LVal {
        let line = self.line();
        let name = self.step().lexeme;
        let index = if self.eat(TokenKind::LBracket) {
            let e = self.parse_exp();
            self.expect_recoverable(TokenKind::RBracket, DiagnosticCode::MissingSquare);
            Some(Box::new(e))
        } else {
            None
        };
        self.trace("LVal");
        LVal { name, index, line }
    }

    pub fn parse_exp(&mut self) -> Expr {
        self.parse_add_exp()
    }

    pub fn parse_cond(&mut self) -> Expr {
        self.parse_lor_exp()
    }

    fn parse_lor_exp(&mut self) -> Expr {
        let mut lhs = self.parse_land_exp();
        while self.check(TokenKind::Or) {
            let line = self.line();
            self.step();
            let rhs = self.parse_land_exp();
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_land_exp(&mut self) -> Expr {
        let mut lhs = self.parse_eq_exp();
        while self.check(TokenKind::And) {
            let line = self.line();
            self.step();
            let rhs = self.parse_eq_exp();
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_eq_exp(&mut self) -> Expr {
        let mut lhs = self.parse_rel_exp();
        loop {
            let op = match self.kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            let line = self.line();
            self.step();
            let rhs = self.parse_rel_exp();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_rel_exp(&mut self) -> Expr {
        let mut lhs = self.parse_add_exp();
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let line = self.line();
            self.step();
            let rhs = self.parse_add_exp();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_add_exp(&mut self) -> Expr {
        let mut lhs = self.parse_mul_exp();
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.step();
            let rhs = self.parse_mul_exp();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_mul_exp(&mut self) -> Expr {
        let mut lhs = self.parse_unary_exp();
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let line = self.line();
            self.step();
            let rhs = self.parse_unary_exp();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        lhs
    }

    fn parse_unary_exp(&mut self) -> Expr {
        let line = self.line();
        let op = match self.kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.step();
            let operand = Box::new(self.parse_unary_exp());
            return Expr::Unary { op, operand, line };
        }
        if self.check(TokenKind::Ident) && self.peek(1).kind == TokenKind::LParen {
            let name = self.step().lexeme;
            self.step(); // '('
            let args = if self.check(TokenKind::RParen) {
                Vec::new()
            } else {
                self.parse_func_r_params()
            };
            self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
            return Expr::Call { name, args, line };
        }
        self.parse_primary_exp()
    }

    fn parse_func_r_params(&mut self) -> Vec<Expr> {
        let mut args = vec![self.parse_exp()];
        while self.eat(TokenKind::Comma) {
            args.push(self.parse_exp());
        }
        self.trace("FuncRParams");
        args
    }

    fn parse_primary_exp(&mut self) -> Expr {
        let line = self.line();
        match self.kind() {
            TokenKind::LParen => {
                self.step();
                let e = self.parse_exp();
                self.expect_recoverable(TokenKind::RParen, DiagnosticCode::MissingBrace);
                e
            }
            TokenKind::IntConst => {
                let lexeme = self.step().lexeme;
                let value = lexeme.parse::<i64>().unwrap_or(0) as i32;
                Expr::IntLit(value, line)
            }
            TokenKind::CharConst => {
                let raw = self.step().lexeme;
                let decoded = decode_escapes(&raw);
                let value = decoded.bytes().next().unwrap_or(0) as i8;
                Expr::CharLit(value, line)
            }
            _ => Expr::LVal(self.parse_lval()),
        }
    }
}

/// Parses a complete token stream into a `CompUnit`.
pub fn parse(tokens: &[Token], diags: &mut Diagnostics) -> (CompUnit, Vec<String>) {
    let mut parser = Parser::new(tokens, diags);
    let unit = parser.parse_comp_unit();
    (unit, parser.traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> (CompUnit, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = lex(src, &mut diags).unwrap();
        let (unit, _traces) = parse(&tokens, &mut diags);
        (unit, diags)
    }

    #[test]
    fn parses_trivial_main() {
        let (unit, diags) = parse_src("int main(){return 0;}");
        assert!(diags.is_empty());
        assert_eq!(unit.items.len(), 0);
        assert_eq!(unit.main.body.items.len(), 1);
    }

    #[test]
    fn missing_semicolon_recovers_and_diagnoses() {
        let (unit, diags) = parse_src("int main(){return 0}");
        let sorted = diags.sorted();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].code, DiagnosticCode::MissingSemicolon);
        assert_eq!(unit.main.body.items.len(), 1);
    }

    #[test]
    fn distinguishes_assignment_from_expression_statement() {
        let (unit, diags) = parse_src("int main(){int x; x=1; f(x); return 0;}");
        assert!(diags.is_empty());
        let items = &unit.main.body.items;
        assert!(matches!(
            items[1],
            BlockItem::Stmt(Stmt::Assign(Assign { .. }))
        ));
        assert!(matches!(items[2], BlockItem::Stmt(Stmt::Expr(Some(_), _))));
    }

    #[test]
    fn decl_vs_func_def_disambiguation_at_top_level() {
        let (unit, _diags) = parse_src("int g; int f(int a){return a;} int main(){return 0;}");
        assert!(matches!(unit.items[0], Item::Decl(_)));
        assert!(matches!(unit.items[1], Item::FuncDef(_)));
    }

    #[test]
    fn array_declaration_with_const_length() {
        let (unit, _diags) = parse_src("const int N=3+4; int a[N]; int main(){return 0;}");
        match &unit.items[1] {
            Item::Decl(d) => assert!(d.defs[0].array_len.is_some()),
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn printf_with_mismatched_args_still_parses() {
        let (unit, _diags) = parse_src(r#"int main(){printf("%d %c\n", 1); return 0;}"#);
        assert_eq!(unit.main.body.items.len(), 2);
    }

    #[test]
    fn nested_parens_precedence() {
        let (unit, _diags) = parse_src("int main(){return (1+2)*3;}");
        match &unit.main.body.items[0] {
            BlockItem::Stmt(Stmt::Return {
                value: Some(Expr::Binary { op, .. }),
                ..
            }) => assert_eq!(*op, BinaryOp::Mul),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
