//! Definite initialization of instance fields in constructors
//!
//! Tracks which fields without an initializer are still unset along each
//! path of a constructor body. After an `if`, a field counts as set only if
//! every arm that reaches the join sets it. Loop bodies are checked but
//! their effects are dropped afterwards.

use super::return_check::Flow;
use super::symbol::VariableKind;
use super::symbol_table::{SymbolId, SymbolTable};
use crate::frontend::ast::*;
use crate::utils::{Error, Span};
use std::collections::BTreeSet;

type Unset = BTreeSet<SymbolId>;

/// Check every constructor of a typed program
pub fn check_program(program: &Program, table: &SymbolTable, errors: &mut Vec<Error>) {
    for stmt in &program.stmts {
        let Stmt::Class(class) = stmt else {
            continue;
        };
        if !class.symbol.is_resolved() {
            continue;
        }

        let required: Unset = class
            .fields
            .iter()
            .filter(|field| !field.is_static && field.initializer.is_none())
            .filter_map(|field| field.symbol.id())
            .collect();
        if required.is_empty() {
            continue;
        }

        for method in &class.methods {
            let is_constructor = method
                .function
                .symbol
                .id()
                .and_then(|id| table.get(id).as_method())
                .is_some_and(|info| info.is_constructor);
            if !is_constructor || !method.function.scope.is_resolved() {
                continue;
            }
            let mut checker = InitChecker { table, errors: &mut *errors };
            checker.check_constructor(&method.function, required.clone());
        }
    }
}

struct InitChecker<'a> {
    table: &'a SymbolTable,
    errors: &'a mut Vec<Error>,
}

impl<'a> InitChecker<'a> {
    fn check_constructor(&mut self, function: &FunctionStmt, mut unset: Unset) {
        let flow = self.check_stmts(&function.body, &mut unset);
        if flow == Flow::Continues && !unset.is_empty() {
            self.errors.push(Error::ImplicitReturnBeforeInit { span: function.end_span });
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt], unset: &mut Unset) -> Flow {
        for stmt in stmts {
            if self.check_stmt(stmt, unset) == Flow::Terminates {
                return Flow::Terminates;
            }
        }
        Flow::Continues
    }

    fn check_stmt(&mut self, stmt: &Stmt, unset: &mut Unset) -> Flow {
        match stmt {
            Stmt::Expression(expr) => self.check_expr(expr, unset),
            Stmt::Output { exprs, .. } => {
                for expr in exprs {
                    self.check_expr(expr, unset);
                }
            }
            Stmt::Input { exprs, .. } => {
                for expr in exprs {
                    self.check_target(expr, unset);
                }
            }
            Stmt::Return { value, span } => {
                if let Some(value) = value {
                    self.check_expr(value, unset);
                }
                if !unset.is_empty() {
                    self.errors.push(Error::ReturnBeforeInit { span: *span });
                }
                return Flow::Terminates;
            }
            Stmt::Exit { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => return Flow::Terminates,
            Stmt::If(stmt) => return self.check_if(stmt, unset),
            Stmt::LoopFrom { from, to, body, .. } => {
                self.check_expr(from, unset);
                self.check_expr(to, unset);
                self.check_stmts(&body.stmts, &mut unset.clone());
            }
            Stmt::While { condition, body, .. } => {
                self.check_expr(condition, unset);
                self.check_stmts(&body.stmts, &mut unset.clone());
            }
            Stmt::Set(set) => self.check_set(set, unset),
            Stmt::MultiSet { sets, .. } => {
                for set in sets {
                    self.check_set(set, unset);
                }
            }
            Stmt::Class(_) | Stmt::Function(_) => {}
        }
        Flow::Continues
    }

    fn check_if(&mut self, stmt: &IfStmt, unset: &mut Unset) -> Flow {
        self.check_expr(&stmt.condition, unset);
        for else_if in &stmt.else_ifs {
            self.check_expr(&else_if.condition, unset);
        }

        let arms = std::iter::once(&stmt.then_branch)
            .chain(stmt.else_ifs.iter().map(|else_if| &else_if.block))
            .chain(stmt.else_branch.as_ref());
        // Union of what is still unset on every arm reaching the join
        let mut joined: Option<Unset> = None;
        for arm in arms {
            let mut arm_unset = unset.clone();
            if self.check_stmts(&arm.stmts, &mut arm_unset) == Flow::Continues {
                joined.get_or_insert_with(Unset::new).extend(arm_unset);
            }
        }
        if stmt.else_branch.is_none() {
            joined.get_or_insert_with(Unset::new).extend(unset.iter().copied());
        }

        match joined {
            Some(joined) => {
                *unset = joined;
                Flow::Continues
            }
            None => Flow::Terminates,
        }
    }

    fn check_set(&mut self, set: &SetStmt, unset: &mut Unset) {
        self.check_expr(&set.value, unset);
        for target in set.chained.iter().rev() {
            self.check_target(target, unset);
        }
        self.check_target(&set.left, unset);
    }

    /// A written expression: plain field writes mark the field set
    fn check_target(&mut self, expr: &Expr, unset: &mut Unset) {
        match &expr.kind {
            ExprKind::Variable { symbol, .. } | ExprKind::VariableToSet { symbol, .. } => {
                if let Some(id) = symbol.id().filter(|id| self.is_instance_field(*id)) {
                    unset.remove(&id);
                }
            }
            ExprKind::Get { object, property_id, .. } if matches!(object.kind, ExprKind::This { .. }) => {
                if let Some(id) = property_id.id() {
                    unset.remove(&id);
                }
            }
            _ => self.check_expr(expr, unset),
        }
    }

    fn is_instance_field(&self, id: SymbolId) -> bool {
        self.table.get(id).as_variable().is_some_and(|var| var.kind == VariableKind::Instance)
    }

    fn field_read(&mut self, id: SymbolId, unset: &Unset, span: Span) {
        if unset.contains(&id) {
            let name = self.table.get(id).name.clone();
            self.errors.push(Error::FieldBeforeInit { name, span });
        }
    }

    /// Whether a call runs an instance method of the object being built
    fn calls_instance_method(&self, target: &Slot<CallTarget>) -> bool {
        let id = match target.get() {
            Some(CallTarget::Unique(id)) => *id,
            Some(CallTarget::Polymorphic(table)) => match table.values().next() {
                Some(id) => *id,
                None => return false,
            },
            None => return false,
        };
        self.table.get(id).as_method().is_some_and(|method| !method.is_static && !method.is_constructor)
    }

    fn check_expr(&mut self, expr: &Expr, unset: &mut Unset) {
        match &expr.kind {
            ExprKind::This { .. } => {
                if !unset.is_empty() {
                    self.errors.push(Error::ThisBeforeInit { span: expr.span });
                }
            }
            ExprKind::Variable { symbol, .. } => {
                if let Some(id) = symbol.id() {
                    self.field_read(id, unset, expr.span);
                }
            }
            ExprKind::Get { object, property_id, .. } => {
                if matches!(object.kind, ExprKind::This { .. }) {
                    if let Some(id) = property_id.id() {
                        self.field_read(id, unset, expr.span);
                    }
                } else {
                    self.check_expr(object, unset);
                }
            }
            ExprKind::Call(call) => {
                let on_this = match &call.callee {
                    Callee::Free | Callee::Super => true,
                    Callee::Object(object) if matches!(object.kind, ExprKind::This { .. }) => true,
                    Callee::Object(object) => {
                        self.check_expr(object, unset);
                        false
                    }
                    Callee::SuperConstructor => false,
                };
                for arg in &call.args {
                    self.check_expr(arg, unset);
                }
                if on_this && !unset.is_empty() && self.calls_instance_method(&call.target) {
                    self.errors.push(Error::InstanceMethodBeforeInit { span: expr.span });
                }
            }
            ExprKind::Logical { left, right, .. } => {
                self.check_expr(left, unset);
                self.check_expr(right, &mut unset.clone());
            }
            ExprKind::Grouping(inner) | ExprKind::ImplicitCast(inner) => self.check_expr(inner, unset),
            ExprKind::Unary { operand, .. } => self.check_expr(operand, unset),
            ExprKind::Cast { value, .. } => self.check_expr(value, unset),
            ExprKind::IsType { left, .. } => self.check_expr(left, unset),
            ExprKind::Subscript { expr, index } => {
                self.check_expr(expr, unset);
                self.check_expr(index, unset);
            }
            ExprKind::Binary { left, right, .. } => {
                self.check_expr(left, unset);
                self.check_expr(right, unset);
            }
            ExprKind::ArrayLiteral(values) => {
                for value in values {
                    self.check_expr(value, unset);
                }
            }
            ExprKind::ArrayAllocation { capacities: values, .. } | ExprKind::ClassAllocation { args: values, .. } => {
                for value in values {
                    self.check_expr(value, unset);
                }
            }
            ExprKind::Literal(_)
            | ExprKind::StaticClassRef { .. }
            | ExprKind::Super { .. }
            | ExprKind::VariableToSet { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::semantic::tests::analyze;
    use pretty_assertions::assert_eq;

    fn point(body: &str) -> String {
        format!(
            "class Point\n  x: int\n  y: int\n  z: int = 0\n  function Point(flag: boolean)\n{}  end function\n  function norm(): int\n    return x + y\n  end function\nend class\n",
            body
        )
    }

    #[test]
    fn test_set_in_every_arm() {
        let source = point("    if flag then\n      x = 1\n    else\n      x = 2\n    end if\n    y = x\n");
        assert!(analyze(&source).is_empty(), "{:?}", analyze(&source));
    }

    #[test]
    fn test_set_in_one_arm() {
        let source = point("    y = 0\n    if flag then\n      x = 1\n    end if\n    output x\n");
        assert_eq!(
            analyze(&source),
            vec![
                "Variable 'this.x' used before being initialized",
                "Implicit return from initializer without initializing all stored properties",
            ]
        );
    }

    #[test]
    fn test_exiting_arm_is_excluded() {
        let source = point("    if flag then\n      this.x = 1\n    else\n      exit\n    end if\n    this.y = this.x\n");
        assert!(analyze(&source).is_empty(), "{:?}", analyze(&source));
    }

    #[test]
    fn test_loop_effects_do_not_escape() {
        let source = point("    y = 0\n    loop while flag\n      x = 1\n    end loop\n");
        assert_eq!(
            analyze(&source),
            vec!["Implicit return from initializer without initializing all stored properties"]
        );
    }

    #[test]
    fn test_this_and_methods_before_init() {
        let source = point("    x = 1\n    output norm()\n    output this.norm()\n    output this\n    y = 2\n");
        assert_eq!(
            analyze(&source),
            vec![
                "Instance methods cannot be called before all stored properties are initialized",
                "Instance methods cannot be called before all stored properties are initialized",
                "'this' is unavailable until all stored properties are initialized",
            ]
        );
    }

    #[test]
    fn test_early_return() {
        let source = point("    x = 1\n    if flag then\n      return\n    end if\n    y = 2\n");
        assert_eq!(
            analyze(&source),
            vec!["Return from initializer without initializing all stored properties"]
        );
    }
}
