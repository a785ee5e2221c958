// ABOUTME: SSA value/instruction/block/function/module types, with textual rendering

use crate::ty::Ty;
use std::fmt;
use std::rc::Rc;

/// A typed SSA value: an immediate, a register, a pointer (global or
/// local), or an aggregate literal (used for global array initializers).
#[derive(Debug, Clone)]
pub enum Value {
    ConstInt(i32),
    ConstChar(i8),
    ConstBool(bool),
    Array(Vec<Value>, Rc<Ty>),
    Reg(String, Rc<Ty>),
    Ptr {
        global: bool,
        name: String,
        pointee: Rc<Ty>,
    },
}

impl Value {
    pub fn ty(&self) -> Rc<Ty> {
        match self {
            Value::ConstInt(_) => Rc::new(Ty::Int),
            Value::ConstChar(_) => Rc::new(Ty::Char),
            Value::ConstBool(_) => Rc::new(Ty::Bool),
            Value::Array(_, ty) => ty.clone(),
            Value::Reg(_, ty) => ty.clone(),
            Value::Ptr { pointee, .. } => Rc::new(Ty::Pointer(pointee.clone())),
        }
    }

    /// The bare identifier/immediate text, with no type prefix.
    pub fn ident(&self) -> String {
        match self {
            Value::ConstInt(v) => v.to_string(),
            Value::ConstChar(v) => v.to_string(),
            Value::ConstBool(v) => {
                if *v {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            Value::Array(elems, _) => {
                let parts: Vec<String> = elems.iter().map(|e| e.operand()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Reg(name, _) => format!("%{}", name),
            Value::Ptr { global, name, .. } => {
                let sigil = if *global { "@" } else { "%" };
                format!("{}{}", sigil, name)
            }
        }
    }

    /// `<type> <ident>`, the form instruction operands take.
    pub fn operand(&self) -> String {
        format!("{} {}", self.ty(), self.ident())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Srem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Sge,
    Sgt,
    Sle,
    Slt,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Sge => "sge",
            CmpOp::Sgt => "sgt",
            CmpOp::Sle => "sle",
            CmpOp::Slt => "slt",
        };
        write!(f, "{}", s)
    }
}

/// A single tagged IR instruction. Every variant that defines a register
/// carries its destination name and type.
#[derive(Debug, Clone)]
pub enum Instruction {
    Alloca {
        dest: String,
        ty: Rc<Ty>,
    },
    Load {
        dest: String,
        ty: Rc<Ty>,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Gep {
        dest: String,
        elem_ty: Rc<Ty>,
        base: Value,
        indices: Vec<Value>,
    },
    Arith {
        dest: String,
        op: ArithOp,
        lhs: Value,
        rhs: Value,
    },
    BitAndOr {
        dest: String,
        is_and: bool,
        lhs: Value,
        rhs: Value,
    },
    Icmp {
        dest: String,
        op: CmpOp,
        lhs: Value,
        rhs: Value,
    },
    Sext {
        dest: String,
        from: Value,
        to: Rc<Ty>,
    },
    Zext {
        dest: String,
        from: Value,
        to: Rc<Ty>,
    },
    Trunc {
        dest: String,
        from: Value,
        to: Rc<Ty>,
    },
    Br {
        target: String,
    },
    CondBr {
        cond: Value,
        then_label: String,
        else_label: String,
    },
    Call {
        dest: Option<String>,
        ret_ty: Rc<Ty>,
        name: String,
        args: Vec<Value>,
    },
    Ret {
        value: Option<Value>,
    },
}

impl Instruction {
    /// Destination register name, if this instruction defines one.
    pub fn dest(&self) -> Option<(&str, Rc<Ty>)> {
        match self {
            Instruction::Alloca { dest, ty } => Some((dest, Rc::new(Ty::Pointer(ty.clone())))),
            Instruction::Load { dest, ty, .. } => Some((dest, ty.clone())),
            Instruction::Gep { dest, elem_ty, .. } => {
                Some((dest, Rc::new(Ty::Pointer(elem_ty.clone()))))
            }
            Instruction::Arith { dest, .. } => Some((dest, Rc::new(Ty::Int))),
            Instruction::BitAndOr { dest, .. } => Some((dest, Rc::new(Ty::Bool))),
            Instruction::Icmp { dest, .. } => Some((dest, Rc::new(Ty::Bool))),
            Instruction::Sext { dest, to, .. } => Some((dest, to.clone())),
            Instruction::Zext { dest, to, .. } => Some((dest, to.clone())),
            Instruction::Trunc { dest, to, .. } => Some((dest, to.clone())),
            Instruction::Call { dest, ret_ty, .. } => {
                dest.as_ref().map(|d| (d.as_str(), ret_ty.clone()))
            }
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Br { .. } | Instruction::CondBr { .. } | Instruction::Ret { .. }
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alloca { dest, ty } => write!(f, "%{} = alloca {}", dest, ty),
            Instruction::Load { dest, ty, ptr } => {
                write!(f, "%{} = load {}, {}", dest, ty, ptr.operand())
            }
            Instruction::Store { value, ptr } => {
                write!(f, "store {}, {}", value.operand(), ptr.operand())
            }
            Instruction::Gep {
                dest,
                elem_ty,
                base,
                indices,
            } => {
                let idx: Vec<String> = indices.iter().map(|v| v.operand()).collect();
                write!(
                    f,
                    "%{} = getelementptr {}, {}, {}",
                    dest,
                    elem_ty,
                    base.operand(),
                    idx.join(", ")
                )
            }
            Instruction::Arith { dest, op, lhs, rhs } => {
                let name = match op {
                    ArithOp::Add => "add",
                    ArithOp::Sub => "sub",
                    ArithOp::Mul => "mul",
                    ArithOp::Sdiv => "sdiv",
                    ArithOp::Srem => "srem",
                };
                write!(
                    f,
                    "%{} = {} {}, {}",
                    dest,
                    name,
                    lhs.operand(),
                    rhs.ident()
                )
            }
            Instruction::BitAndOr {
                dest,
                is_and,
                lhs,
                rhs,
            } => {
                let name = if *is_and { "and" } else { "or" };
                write!(
                    f,
                    "%{} = {} {}, {}",
                    dest,
                    name,
                    lhs.operand(),
                    rhs.ident()
                )
            }
            Instruction::Icmp { dest, op, lhs, rhs } => {
                write!(
                    f,
                    "%{} = icmp {} {}, {}",
                    dest,
                    op,
                    lhs.operand(),
                    rhs.ident()
                )
            }
            Instruction::Sext { dest, from, to } => {
                write!(f, "%{} = sext {} to {}", dest, from.operand(), to)
            }
            Instruction::Zext { dest, from, to } => {
                write!(f, "%{} = zext {} to {}", dest, from.operand(), to)
            }
            Instruction::Trunc { dest, from, to } => {
                write!(f, "%{} = trunc {} to {}", dest, from.operand(), to)
            }
            Instruction::Br { target } => write!(f, "br label %{}", target),
            Instruction::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                cond.operand(),
                then_label,
                else_label
            ),
            Instruction::Call {
                dest,
                ret_ty,
                name,
                args,
            } => {
                let arglist: Vec<String> = args.iter().map(|a| a.operand()).collect();
                match dest {
                    Some(d) => write!(
                        f,
                        "%{} = call {} @{}({})",
                        d,
                        ret_ty,
                        name,
                        arglist.join(", ")
                    ),
                    None => write!(f, "call {} @{}({})", ret_ty, name, arglist.join(", ")),
                }
            }
            Instruction::Ret { value } => match value {
                Some(v) => write!(f, "ret {}", v.operand()),
                None => write!(f, "ret void"),
            },
        }
    }
}

/// A label, an ordered instruction list, successor labels, and a terminated
/// flag. Pushes after the first terminator are silently ignored, which lets
/// the generator emit unreachable trailing code without corrupting the IR.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub next: Vec<String>,
    pub ended: bool,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instructions: Vec::new(),
            next: Vec::new(),
            ended: false,
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        if self.ended {
            return;
        }
        match &inst {
            Instruction::Br { target } => {
                self.next.push(target.clone());
                self.ended = true;
            }
            Instruction::CondBr {
                then_label,
                else_label,
                ..
            } => {
                self.next.push(then_label.clone());
                self.next.push(else_label.clone());
                self.ended = true;
            }
            Instruction::Ret { .. } => {
                self.ended = true;
            }
            _ => {}
        }
        self.instructions.push(inst);
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for (i, inst) in self.instructions.iter().enumerate() {
            if i + 1 == self.instructions.len() {
                write!(f, "    {}", inst)?;
            } else {
                writeln!(f, "    {}", inst)?;
            }
        }
        Ok(())
    }
}

/// Owns blocks in insertion order, the parameter list, and a fresh-register
/// counter that starts at 0 and is monotonic *per function*.
pub struct Function {
    pub ret_ty: Rc<Ty>,
    pub name: String,
    pub params: Vec<(Rc<Ty>, String)>,
    pub blocks: Vec<BasicBlock>,
    reg_counter: u32,
    current: usize,
}

impl Function {
    pub fn new(ret_ty: Rc<Ty>, name: impl Into<String>, params: Vec<(Rc<Ty>, String)>) -> Self {
        Function {
            ret_ty,
            name: name.into(),
            params,
            blocks: Vec::new(),
            reg_counter: 0,
            current: 0,
        }
    }

    pub fn next_reg(&mut self) -> String {
        let n = self.reg_counter;
        self.reg_counter += 1;
        n.to_string()
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> usize {
        self.blocks.push(BasicBlock::new(label));
        self.current = self.blocks.len() - 1;
        self.current
    }

    pub fn set_current(&mut self, idx: usize) {
        self.current = idx;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_block(&mut self) -> &mut BasicBlock {
        &mut self.blocks[self.current]
    }

    pub fn push(&mut self, inst: Instruction) {
        self.current_block().push(inst);
    }

    pub fn current_ended(&self) -> bool {
        self.blocks[self.current].ended
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{} %{}", ty, name))
            .collect();
        writeln!(
            f,
            "define {} @{}({}) {{",
            self.ret_ty,
            self.name,
            params.join(", ")
        )?;
        for block in &self.blocks {
            writeln!(f, "{}", block)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub name: String,
    pub is_const: bool,
    pub ty: Rc<Ty>,
    pub value: Value,
}

impl fmt::Display for GlobalDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_const { "constant" } else { "global" };
        write!(
            f,
            "@{} = {} {} {}",
            self.name,
            kind,
            self.ty,
            self.value.ident()
        )
    }
}

const EXTERNALS: &[(&str, &str, &[&str])] = &[
    ("getint", "i32", &[]),
    ("getchar", "i32", &[]),
    ("putint", "void", &["i32"]),
    ("putchar", "void", &["i32"]),
    ("putstr", "void", &["i8*"]),
];

/// Owns globals (interleaved const/var defs in declaration order) and
/// functions in insertion order. The block-number counter is module-global,
/// distinct from each function's own register counter.
pub struct Module {
    pub globals: Vec<GlobalDef>,
    pub functions: Vec<Function>,
    block_counter: u32,
    current_function: usize,
}

impl Module {
    pub fn new() -> Self {
        Module {
            globals: Vec::new(),
            functions: Vec::new(),
            block_counter: 0,
            current_function: 0,
        }
    }

    pub fn next_block_num(&mut self) -> u32 {
        let n = self.block_counter;
        self.block_counter += 1;
        n
    }

    pub fn add_function(&mut self, func: Function) -> usize {
        self.functions.push(func);
        self.current_function = self.functions.len() - 1;
        self.current_function
    }

    pub fn set_current_function(&mut self, idx: usize) {
        self.current_function = idx;
    }

    pub fn current_function(&mut self) -> &mut Function {
        &mut self.functions[self.current_function]
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, ret, params) in EXTERNALS {
            writeln!(f, "declare {} @{}({})", ret, name, params.join(", "))?;
        }
        for g in &self.globals {
            writeln!(f, "{}", g)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_push_ignores_instructions_after_terminator() {
        let mut b = BasicBlock::new("entry");
        b.push(Instruction::Ret { value: None });
        b.push(Instruction::Ret { value: None });
        assert_eq!(b.instructions.len(), 1);
        assert!(b.ended);
    }

    #[test]
    fn function_register_numbers_are_monotonic_from_zero() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        assert_eq!(f.next_reg(), "0");
        assert_eq!(f.next_reg(), "1");
    }

    #[test]
    fn renders_return_instruction() {
        let r = Instruction::Ret {
            value: Some(Value::ConstInt(0)),
        };
        assert_eq!(r.to_string(), "ret i32 0");
    }

    #[test]
    fn renders_simple_main_function() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        f.add_block("entry0");
        f.push(Instruction::Ret {
            value: Some(Value::ConstInt(0)),
        });
        let text = f.to_string();
        assert!(text.starts_with("define i32 @main() {"));
        assert!(text.contains("entry0:"));
        assert!(text.contains("ret i32 0"));
    }

    #[test]
    fn module_header_declares_all_five_externals() {
        let m = Module::new();
        let text = m.to_string();
        assert!(text.contains("declare i32 @getint()"));
        assert!(text.contains("declare void @putstr(i8*)"));
    }
}
