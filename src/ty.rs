// ABOUTME: Interned type registry: types compared by identity, not structure

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A scalar or compound type. `int`/`char`/`bool`/`void` are singletons;
/// `array`/`pointer` are memoized per `(element, extra)` key so that two
/// constructions of the same shape yield the same `Rc` (pointer-equal).
#[derive(Debug, PartialEq, Eq)]
pub enum Ty {
    Int,
    Char,
    Bool,
    Void,
    Array(Rc<Ty>, u32),
    Pointer(Rc<Ty>),
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int => write!(f, "i32"),
            Ty::Char => write!(f, "i8"),
            Ty::Bool => write!(f, "i1"),
            Ty::Void => write!(f, "void"),
            Ty::Pointer(t) => write!(f, "{}*", t),
            Ty::Array(t, n) => write!(f, "[{} x {}]", n, t),
        }
    }
}

/// Identity-interning registry. A fresh `TypeRegistry` per compilation keeps
/// identity scoped to that compilation, per the concurrency model's
/// requirement that counters/registries reset between invocations.
pub struct TypeRegistry {
    int: Rc<Ty>,
    char_: Rc<Ty>,
    bool_: Rc<Ty>,
    void: Rc<Ty>,
    arrays: RefCell<HashMap<(*const Ty, u32), Rc<Ty>>>,
    pointers: RefCell<HashMap<*const Ty, Rc<Ty>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            int: Rc::new(Ty::Int),
            char_: Rc::new(Ty::Char),
            bool_: Rc::new(Ty::Bool),
            void: Rc::new(Ty::Void),
            arrays: RefCell::new(HashMap::new()),
            pointers: RefCell::new(HashMap::new()),
        }
    }

    pub fn int(&self) -> Rc<Ty> {
        self.int.clone()
    }

    pub fn char_ty(&self) -> Rc<Ty> {
        self.char_.clone()
    }

    pub fn bool_ty(&self) -> Rc<Ty> {
        self.bool_.clone()
    }

    pub fn void(&self) -> Rc<Ty> {
        self.void.clone()
    }

    /// `elem` must not be `Ty::Void`, enforced by construction: callers only
    /// ever pass `int()`/`char_ty()` here, since the source language has no
    /// array-of-void syntax to route through this path.
    pub fn array(&self, elem: Rc<Ty>, len: u32) -> Rc<Ty> {
        let key = (Rc::as_ptr(&elem), len);
        if let Some(existing) = self.arrays.borrow().get(&key) {
            return existing.clone();
        }
        let ty = Rc::new(Ty::Array(elem, len));
        self.arrays.borrow_mut().insert(key, ty.clone());
        ty
    }

    pub fn pointer(&self, target: Rc<Ty>) -> Rc<Ty> {
        let key = Rc::as_ptr(&target);
        if let Some(existing) = self.pointers.borrow().get(&key) {
            return existing.clone();
        }
        let ty = Rc::new(Ty::Pointer(target));
        self.pointers.borrow_mut().insert(key, ty.clone());
        ty
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_singletons() {
        let reg = TypeRegistry::new();
        assert!(Rc::ptr_eq(&reg.int(), &reg.int()));
    }

    #[test]
    fn equal_array_shapes_intern_to_the_same_instance() {
        let reg = TypeRegistry::new();
        let a = reg.array(reg.int(), 7);
        let b = reg.array(reg.int(), 7);
        assert!(Rc::ptr_eq(&a, &b));
        let c = reg.array(reg.int(), 8);
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn pointer_types_intern_per_target() {
        let reg = TypeRegistry::new();
        let p1 = reg.pointer(reg.char_ty());
        let p2 = reg.pointer(reg.char_ty());
        assert!(Rc::ptr_eq(&p1, &p2));
    }

    #[test]
    fn display_renders_llvm_style_names() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.int().to_string(), "i32");
        assert_eq!(reg.pointer(reg.int()).to_string(), "i32*");
        assert_eq!(reg.array(reg.int(), 7).to_string(), "[7 x i32]");
    }
}
