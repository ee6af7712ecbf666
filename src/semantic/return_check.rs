//! Guaranteed-return analysis
//!
//! Every path through a non-void function body must end in `return` or
//! `exit`. Loops never count, since their bodies may not run.

use super::symbol_table::SymbolTable;
use crate::frontend::ast::{FunctionStmt, Program, Stmt};
use crate::utils::Error;

/// Whether control can fall off the end of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continues,
    Terminates,
}

impl Flow {
    pub fn terminates(self) -> bool {
        self == Flow::Terminates
    }
}

/// Check every function and method of a typed program
pub fn check_program(program: &Program, table: &SymbolTable, errors: &mut Vec<Error>) {
    for stmt in &program.stmts {
        match stmt {
            Stmt::Function(function) => check_function(function, table, errors),
            Stmt::Class(class) if class.symbol.is_resolved() => {
                for method in &class.methods {
                    check_function(&method.function, table, errors);
                }
            }
            _ => {}
        }
    }
}

fn check_function(function: &FunctionStmt, table: &SymbolTable, errors: &mut Vec<Error>) {
    let Some(info) = function.symbol.id().and_then(|id| table.get(id).as_function()) else {
        return;
    };
    let ty = &info.return_type;
    if ty.is_void() || ty.is_error() {
        return;
    }
    if !block_flow(&function.body).terminates() {
        errors.push(Error::MissingReturn { ty: ty.to_string(), span: function.end_span });
    }
}

pub fn block_flow(stmts: &[Stmt]) -> Flow {
    if stmts.iter().any(|stmt| stmt_flow(stmt).terminates()) {
        Flow::Terminates
    } else {
        Flow::Continues
    }
}

fn stmt_flow(stmt: &Stmt) -> Flow {
    match stmt {
        Stmt::Return { .. } | Stmt::Exit { .. } => Flow::Terminates,
        Stmt::If(stmt) => {
            let Some(else_branch) = &stmt.else_branch else {
                return Flow::Continues;
            };
            let all_arms = std::iter::once(&stmt.then_branch)
                .chain(stmt.else_ifs.iter().map(|else_if| &else_if.block))
                .chain(std::iter::once(else_branch))
                .all(|block| block_flow(&block.stmts).terminates());
            if all_arms {
                Flow::Terminates
            } else {
                Flow::Continues
            }
        }
        _ => Flow::Continues,
    }
}

#[cfg(test)]
mod tests {
    use crate::semantic::tests::analyze;
    use pretty_assertions::assert_eq;

    const MISSING: &str = "Missing return in function expected to return 'int'";

    #[test]
    fn test_if_else_both_return() {
        let source = "\
function sign(n: int): int
  if n < 0 then
    return -1
  else
    return 1
  end if
end function
";
        assert!(analyze(source).is_empty());
    }

    #[test]
    fn test_if_without_else() {
        let source = "\
function sign(n: int): int
  if n < 0 then
    return -1
  end if
end function
";
        assert_eq!(analyze(source), vec![MISSING]);
    }

    #[test]
    fn test_else_if_chain() {
        let all_arms = "\
function pick(n: int): int
  if n < 0 then
    return -1
  else if n == 0 then
    exit
  else
    return 1
  end if
end function
";
        assert!(analyze(all_arms).is_empty());

        let one_arm_falls_through = "\
function pick(n: int): int
  if n < 0 then
    return -1
  else if n == 0 then
    output n
  else
    return 1
  end if
end function
";
        assert_eq!(analyze(one_arm_falls_through), vec![MISSING]);
    }

    #[test]
    fn test_loops_never_guarantee_return() {
        let source = "\
function first(n: int): int
  loop while true
    return n
  end loop
end function
";
        assert_eq!(analyze(source), vec![MISSING]);
    }

    #[test]
    fn test_return_after_statements() {
        let source = "\
class Counter
  n: int = 0
  function next(): int
    n = n + 1
    return n
  end function
  function broken(): double
    n = 0
  end function
end class
";
        assert_eq!(analyze(source), vec!["Missing return in function expected to return 'double'"]);
    }
}
