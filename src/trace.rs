// ABOUTME: Optional, off-by-default instrumentation: one line per symbol bound during analysis

/// Collects grading-style trace lines. Disabled by default; the `--trace`
/// CLI flag turns it on. Lexer/parser trace lines are derived directly from
/// the token stream and the parser's own non-terminal log (see `main.rs`),
/// so only the symbol-table trace needs a collector threaded through
/// `sema::analyze`.
pub struct Traces {
    enabled: bool,
    pub symbols: Vec<String>,
}

impl Traces {
    pub fn new(enabled: bool) -> Self {
        Traces {
            enabled,
            symbols: Vec::new(),
        }
    }

    /// Records a symbol insertion: the scope's block number, the name, and
    /// `"var"` or `"func"`.
    pub fn symbol_bound(&mut self, blockn: u32, name: &str, kind: &str) {
        if self.enabled {
            self.symbols.push(format!("{} {} {}", blockn, name, kind));
        }
    }

    pub fn render(&self) -> String {
        self.symbols.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_collector_records_nothing() {
        let mut t = Traces::new(false);
        t.symbol_bound(0, "x", "var");
        assert!(t.symbols.is_empty());
    }

    #[test]
    fn enabled_collector_records_in_order() {
        let mut t = Traces::new(true);
        t.symbol_bound(0, "x", "var");
        t.symbol_bound(0, "f", "func");
        assert_eq!(t.render(), "0 x var\n0 f func");
    }
}
