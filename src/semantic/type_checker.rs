//! Type checking for Quasicode
//!
//! Assigns a [`Type`] to every expression of a resolved program, picks one
//! target for every call and inserts [`ExprKind::ImplicitCast`] nodes where a
//! value is widened. Types are memoized on the nodes, so re-visiting an
//! expression is free. An operand typed `Error` never produces a second
//! diagnostic.

use super::symbol::{func_name_key, GlobalSite, MethodInfo, SymbolKind, VariableKind};
use super::symbol_table::{ScopeId, SymbolId, SymbolTable};
use crate::frontend::ast::*;
use crate::stdlib::builtins::STRING_CLASS;
use crate::types::{common_type, resolve_ast_type, ClassRegistry, Type, TypeKind};
use crate::utils::{Error, Span};
use std::collections::{BTreeMap, HashSet};

/// The function body being checked
#[derive(Debug, Clone)]
struct Frame {
    return_type: Type,
    is_method: bool,
    is_static: bool,
    is_constructor: bool,
}

pub struct TypeChecker<'a> {
    table: &'a mut SymbolTable,
    errors: Vec<Error>,
    scope: ScopeId,
    class: Option<SymbolId>,
    frame: Option<Frame>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        Self { table, errors: Vec::new(), scope: ScopeId::ROOT, class: None, frame: None }
    }

    /// Type a resolved program. Globals are typed first, in initialization
    /// order, so every later use sees their type.
    pub fn check(mut self, program: &mut Program, global_init_order: &[SymbolId]) -> Vec<Error> {
        let mut typed_sites = HashSet::new();
        for &global in global_init_order {
            let SymbolKind::GlobalVariable { site, .. } = self.table.get(global).kind else {
                continue;
            };
            if !typed_sites.insert(site) {
                continue;
            }
            match site_set(program, site) {
                Some(set) => self.check_set(set),
                None => debug_assert!(false, "global site {:?} is not a set statement", site),
            }
        }

        for (index, stmt) in program.stmts.iter_mut().enumerate() {
            match stmt {
                Stmt::Set(set) => {
                    if !typed_sites.contains(&GlobalSite { stmt: index, part: 0 }) {
                        self.check_set(set);
                    }
                }
                Stmt::MultiSet { sets, .. } => {
                    for (part, set) in sets.iter_mut().enumerate() {
                        if !typed_sites.contains(&GlobalSite { stmt: index, part }) {
                            self.check_set(set);
                        }
                    }
                }
                _ => self.check_stmt(stmt),
            }
        }

        log::debug!("type checked: {} errors", self.errors.len());
        self.errors
    }

    // ==================== Helpers ====================

    fn variable_type(&self, id: SymbolId) -> Type {
        self.table.get(id).as_variable().and_then(|var| var.ty.clone()).unwrap_or_else(Type::error)
    }

    fn set_variable_type(&mut self, id: SymbolId, ty: Type) {
        if let Some(var) = self.table.get_mut(id).as_variable_mut() {
            var.ty = Some(ty.with_assignable(false));
        }
    }

    /// Annotation types; the resolver already reported unknown classes
    fn annotation_type(&self, ty: &AstType) -> Type {
        resolve_ast_type(ty, &*self.table).unwrap_or_else(|_| Type::error())
    }

    fn class_type(&self, id: SymbolId) -> Type {
        match self.table.get(id).as_class() {
            Some(info) => Type::class(info.display_name.clone(), id),
            None => Type::error(),
        }
    }

    fn string_type(&self) -> Type {
        let signature = AstType::class_signature(STRING_CLASS, &[]);
        match self.table.class_by_signature(&signature) {
            Some(id) => Type::class(STRING_CLASS, id),
            None => Type::any(),
        }
    }

    fn is_string(&self, ty: &Type) -> bool {
        ty.class_id().is_some() && *ty == self.string_type()
    }

    fn class_scope(&self, class: SymbolId) -> Option<ScopeId> {
        self.table.get(class).as_class().map(|info| info.class_scope)
    }

    /// Private members are visible only inside their own class
    fn accessible(&self, visibility: Visibility, owner: Option<SymbolId>) -> bool {
        visibility == Visibility::Public || (owner.is_some() && owner == self.class)
    }

    /// Convert `expr` to `target`, wrapping it in an implicit cast when the
    /// types differ. Reports and returns false if it is not a subtype.
    fn coerce(&mut self, expr: &mut Expr, target: &Type) -> bool {
        let ty = expr.ty();
        if ty.is_error() || target.is_error() || ty == *target {
            return true;
        }
        if common_type(&ty, target, &*self.table) == *target {
            wrap_implicit_cast(expr, target);
            return true;
        }
        self.errors.push(Error::CannotCast { from: ty.to_string(), to: target.to_string(), span: expr.span });
        false
    }

    // ==================== Statements ====================

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Class(class) => self.check_class(class),
            Stmt::Function(function) => self.check_function(function),
            Stmt::Expression(expr) => {
                self.check_expr(expr);
            }
            Stmt::If(stmt) => {
                self.check_condition(&mut stmt.condition);
                self.check_block(&mut stmt.then_branch);
                for else_if in &mut stmt.else_ifs {
                    self.check_condition(&mut else_if.condition);
                    self.check_block(&mut else_if.block);
                }
                if let Some(block) = &mut stmt.else_branch {
                    self.check_block(block);
                }
            }
            Stmt::Output { exprs, .. } => {
                for expr in exprs {
                    self.check_expr(expr);
                }
            }
            Stmt::Input { exprs, .. } => {
                for expr in exprs {
                    self.check_input(expr);
                }
            }
            Stmt::Return { value, span } => self.check_return(value.as_mut(), *span),
            Stmt::LoopFrom { variable, from, to, body, .. } => {
                self.check_int(from);
                self.check_int(to);
                if let Some(id) = variable.symbol.id() {
                    let ty = self.variable_type(id);
                    if !ty.is_error() && ty != Type::int() {
                        self.errors.push(Error::NotInt { ty: ty.to_string(), span: variable.name.span });
                    }
                }
                self.check_block(body);
            }
            Stmt::While { condition, body, .. } => {
                self.check_condition(condition);
                self.check_block(body);
            }
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Exit { .. } => {}
            Stmt::MultiSet { sets, .. } => {
                for set in sets {
                    self.check_set(set);
                }
            }
            Stmt::Set(set) => self.check_set(set),
        }
    }

    fn check_block(&mut self, block: &mut Block) {
        let saved = self.scope;
        if let Some(scope) = block.scope.id() {
            self.scope = scope;
        }
        for stmt in &mut block.stmts {
            self.check_stmt(stmt);
        }
        self.scope = saved;
    }

    fn check_condition(&mut self, expr: &mut Expr) {
        let ty = self.check_expr(expr);
        if !ty.is_error() && ty != Type::boolean() {
            self.errors.push(Error::NotBoolean { ty: ty.to_string(), span: expr.span });
        }
    }

    fn check_int(&mut self, expr: &mut Expr) {
        let ty = self.check_expr(expr);
        if !ty.is_error() && ty != Type::int() {
            self.errors.push(Error::NotInt { ty: ty.to_string(), span: expr.span });
        }
    }

    fn check_input(&mut self, expr: &mut Expr) {
        let ty = self.check_expr(expr);
        if ty.is_error() {
            return;
        }
        if !ty.assignable {
            self.errors.push(Error::ImmutableAssign { span: expr.span });
            return;
        }
        let readable = matches!(ty.kind, TypeKind::Int | TypeKind::Double | TypeKind::Any) || self.is_string(&ty);
        if !readable {
            self.errors.push(Error::CannotInput { ty: ty.to_string(), span: expr.span });
        }
    }

    fn check_return(&mut self, value: Option<&mut Expr>, span: Span) {
        let Some(frame) = self.frame.clone() else {
            // Top-level return; already reported
            if let Some(value) = value {
                self.check_expr(value);
            }
            return;
        };
        match value {
            Some(value) => {
                let ty = self.check_expr(value);
                if frame.is_constructor {
                    return;
                }
                if frame.return_type.is_void() {
                    if !ty.is_error() {
                        self.errors.push(Error::UnexpectedReturnValue { span: value.span });
                    }
                } else {
                    self.coerce(value, &frame.return_type);
                }
            }
            None => {
                if !frame.is_constructor && !frame.return_type.is_void() && !frame.return_type.is_error() {
                    self.errors.push(Error::MissingReturnValue { span });
                }
            }
        }
    }

    fn check_class(&mut self, class: &mut ClassStmt) {
        let (Some(id), Some(scope)) = (class.symbol.id(), class.scope.id()) else {
            return;
        };
        let saved_class = self.class.replace(id);
        let saved_scope = std::mem::replace(&mut self.scope, scope);

        for field in &mut class.fields {
            if let (Some(field_id), Some(initializer)) = (field.symbol.id(), field.initializer.as_mut()) {
                self.check_expr(initializer);
                let ty = self.variable_type(field_id);
                self.coerce(initializer, &ty);
            }
        }
        for method in &mut class.methods {
            self.check_function(&mut method.function);
        }

        self.scope = saved_scope;
        self.class = saved_class;
    }

    fn check_function(&mut self, function: &mut FunctionStmt) {
        let (Some(id), Some(scope)) = (function.symbol.id(), function.scope.id()) else {
            return;
        };
        let symbol = self.table.get(id);
        let frame = match (&symbol.kind, symbol.as_function()) {
            (SymbolKind::Method(method), _) => Frame {
                return_type: method.function.return_type.clone(),
                is_method: true,
                is_static: method.is_static,
                is_constructor: method.is_constructor,
            },
            (_, Some(info)) => Frame {
                return_type: info.return_type.clone(),
                is_method: false,
                is_static: false,
                is_constructor: false,
            },
            _ => return,
        };
        let saved_frame = self.frame.replace(frame);
        let saved_scope = std::mem::replace(&mut self.scope, scope);

        for param in &mut function.params {
            if let (Some(param_id), Some(initializer)) = (param.symbol.id(), param.initializer.as_mut()) {
                self.check_expr(initializer);
                let ty = self.variable_type(param_id);
                self.coerce(initializer, &ty);
            }
        }
        for stmt in &mut function.body {
            self.check_stmt(stmt);
        }

        self.scope = saved_scope;
        self.frame = saved_frame;
    }

    /// Value first, then each target right to left
    fn check_set(&mut self, set: &mut SetStmt) {
        self.check_expr(&mut set.value);
        for target in set.chained.iter_mut().rev() {
            self.assign(target, &mut set.value);
        }
        self.assign(&mut set.left, &mut set.value);
    }

    fn assign(&mut self, target: &mut Expr, value: &mut Expr) {
        let value_ty = self.check_expr(value);

        if let ExprKind::VariableToSet { annotation, symbol, first, .. } = &target.kind {
            let Some(id) = symbol.id() else {
                target.ty.set(Type::error());
                return;
            };
            let first = first.get().copied().unwrap_or(false);
            let declared = match (first, annotation) {
                (true, Some(annotation)) => {
                    let ty = self.annotation_type(annotation);
                    self.set_variable_type(id, ty.clone());
                    ty
                }
                (true, None) => {
                    let ty = if value_ty.is_void() {
                        self.errors.push(Error::VoidInitializer { span: value.span });
                        Type::error()
                    } else {
                        value_ty.clone().with_assignable(false)
                    };
                    self.set_variable_type(id, ty.clone());
                    ty
                }
                (false, _) => self.variable_type(id),
            };
            target.ty.set(declared.clone().with_assignable(true));
            self.coerce(value, &declared);
            return;
        }

        let target_ty = self.check_expr(target);
        if target_ty.is_error() {
            return;
        }
        if !target_ty.assignable {
            self.errors.push(Error::ImmutableAssign { span: target.span });
            return;
        }
        self.coerce(value, &target_ty.with_assignable(false));
    }

    // ==================== Expressions ====================

    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        if let Some(ty) = expr.ty.get() {
            return ty.clone();
        }
        let ty = self.infer(expr);
        expr.ty.set(ty.clone());
        ty
    }

    fn infer(&mut self, expr: &mut Expr) -> Type {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Grouping(inner) => self.check_expr(inner).with_assignable(false),
            ExprKind::ImplicitCast(inner) => self.check_expr(inner),
            ExprKind::Literal(value) => match value {
                LiteralValue::Int(_) => Type::int(),
                LiteralValue::Double(_) => Type::double(),
                LiteralValue::Bool(_) => Type::boolean(),
                LiteralValue::String(_) => self.string_type(),
            },
            ExprKind::ArrayLiteral(values) => self.check_array_literal(values),
            ExprKind::StaticClassRef { class_id, .. } => match class_id.id() {
                Some(id) => self.class_type(id),
                None => Type::error(),
            },
            ExprKind::This { symbol } => match symbol.id() {
                Some(id) => self.variable_type(id).with_assignable(false),
                None => Type::error(),
            },
            ExprKind::Super { property_id, .. } => match property_id.id() {
                Some(id) => self.variable_type(id).with_assignable(true),
                None => Type::error(),
            },
            ExprKind::Variable { symbol, .. } | ExprKind::VariableToSet { symbol, .. } => match symbol.id() {
                Some(id) => self.variable_type(id).with_assignable(true),
                None => Type::error(),
            },
            ExprKind::Subscript { expr: target, index } => {
                let target_ty = self.check_expr(target);
                let index_ty = self.check_expr(index);
                if !index_ty.is_error() && index_ty != Type::int() {
                    self.errors.push(Error::SubscriptNotInt { span: index.span });
                }
                match &target_ty.kind {
                    TypeKind::Error => Type::error(),
                    TypeKind::Any => Type::any().with_assignable(true),
                    TypeKind::Array(elem) => (**elem).clone().with_assignable(true),
                    _ => {
                        self.errors.push(Error::NotAnArray { span: target.span });
                        Type::error()
                    }
                }
            }
            ExprKind::Call(call) => self.check_call(call, span),
            ExprKind::Get { object, property, property_id } => self.check_get(object, property, property_id, span),
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let ty = self.check_expr(operand);
                if ty.is_error() {
                    return Type::error();
                }
                match op {
                    UnaryOp::Not if ty == Type::boolean() => Type::boolean(),
                    UnaryOp::Not => {
                        self.errors.push(Error::UnaryNotOperand { op: op.to_string(), span });
                        Type::error()
                    }
                    UnaryOp::Neg if ty.is_numeric() => ty.with_assignable(false),
                    UnaryOp::Neg => {
                        self.errors.push(Error::UnaryNegOperand { op: op.to_string(), span });
                        Type::error()
                    }
                }
            }
            ExprKind::Cast { target, value } => {
                let from = self.check_expr(value);
                let to = self.annotation_type(target);
                if from.is_error() || to.is_error() {
                    return to;
                }
                if !self.castable(&from, &to) {
                    self.errors.push(Error::CannotCast { from: from.to_string(), to: to.to_string(), span });
                }
                to
            }
            ExprKind::ArrayAllocation { array_type, capacities } => {
                for capacity in capacities.iter_mut() {
                    let ty = self.check_expr(capacity);
                    if !ty.is_error() && ty != Type::int() {
                        self.errors.push(Error::CapacityNotInt { span: capacity.span });
                    }
                }
                self.annotation_type(array_type)
            }
            ExprKind::ClassAllocation { class, args, target } => {
                let class_ty = self.annotation_type(class);
                for arg in args.iter_mut() {
                    self.check_expr(arg);
                }
                let Some(class_id) = class_ty.class_id() else {
                    return Type::error();
                };
                let constructors = self.constructors(class_id);
                if let Some(id) = self.resolve_constructor(&constructors, args, span) {
                    target.set(id);
                }
                class_ty
            }
            ExprKind::Binary { left, op, right } => {
                let op = *op;
                self.check_binary(left, op, right, span)
            }
            ExprKind::Logical { left, op, right } => {
                let op = *op;
                let left_ty = self.check_expr(left);
                let right_ty = self.check_expr(right);
                if left_ty.is_error() || right_ty.is_error() {
                    return Type::boolean();
                }
                if left_ty != Type::boolean() || right_ty != Type::boolean() {
                    self.errors.push(Error::LogicalOperands { op: op.to_string(), span });
                }
                Type::boolean()
            }
            ExprKind::IsType { left, right, right_type } => {
                self.check_expr(left);
                right_type.set(self.annotation_type(right));
                Type::boolean()
            }
        }
    }

    fn check_array_literal(&mut self, values: &mut [Expr]) -> Type {
        let mut elem: Option<Type> = None;
        for value in values.iter_mut() {
            let ty = self.check_expr(value);
            elem = Some(match elem {
                Some(acc) => common_type(&acc, &ty, &*self.table),
                None => ty.with_assignable(false),
            });
        }
        let elem = elem.unwrap_or_else(Type::any);
        if elem.is_error() || elem.is_void() {
            return Type::error();
        }
        for value in values.iter_mut() {
            self.coerce(value, &elem);
        }
        Type::array(elem)
    }

    /// Equal types, anything to or from any, int and double, or along a class chain
    fn castable(&self, from: &Type, to: &Type) -> bool {
        if from == to || from.is_any() || to.is_any() || (from.is_numeric() && to.is_numeric()) {
            return true;
        }
        if from.class_id().is_none() || to.class_id().is_none() {
            return false;
        }
        let common = common_type(from, to, &*self.table);
        common == *from || common == *to
    }

    fn check_binary(&mut self, left: &mut Expr, op: BinaryOp, right: &mut Expr, span: Span) -> Type {
        let left_ty = self.check_expr(left);
        let right_ty = self.check_expr(right);
        if left_ty.is_error() || right_ty.is_error() {
            return Type::error();
        }
        let numeric = left_ty.is_numeric() && right_ty.is_numeric();

        let result = if op.is_comparison() {
            numeric.then(Type::boolean)
        } else if op.is_equality() {
            let common = common_type(&left_ty, &right_ty, &*self.table);
            let comparable = numeric
                || (left_ty == Type::boolean() && right_ty == Type::boolean())
                || (left_ty.element().is_some()
                    && right_ty.element().is_some()
                    && (left_ty == right_ty || common.element().is_some_and(|elem| !elem.is_any())))
                || (left_ty.class_id().is_some() && right_ty.class_id().is_some() && !common.is_any());
            comparable.then(Type::boolean)
        } else {
            match op {
                BinaryOp::Mod => (left_ty == Type::int() && right_ty == Type::int()).then(Type::int),
                BinaryOp::Add if self.is_string(&left_ty) && self.is_string(&right_ty) => Some(self.string_type()),
                _ => numeric.then(|| common_type(&left_ty, &right_ty, &*self.table)),
            }
        };

        match result {
            Some(ty) => {
                if numeric {
                    // Mixed int and double operands are both read as double
                    let common = common_type(&left_ty, &right_ty, &*self.table);
                    self.coerce(left, &common);
                    self.coerce(right, &common);
                }
                ty
            }
            None => {
                self.errors.push(Error::BinaryOperands {
                    op: op.to_string(),
                    left: left_ty.to_string(),
                    right: right_ty.to_string(),
                    span,
                });
                Type::error()
            }
        }
    }

    // ==================== Members ====================

    /// A field of `class` or one of its ancestors
    fn find_field(&self, class: SymbolId, name: &str) -> Option<SymbolId> {
        let mut current = Some(class);
        while let Some(id) = current {
            let info = self.table.get(id).as_class()?;
            if let Some(found) = self.table.lookup_local(info.class_scope, name) {
                if self.table.get(found).as_variable().is_some() {
                    return Some(found);
                }
            }
            current = info.upper_class;
        }
        None
    }

    /// Class that declares the member in scope `scope`
    fn owner_of_scope(&self, scope: ScopeId) -> Option<SymbolId> {
        let mut current = self.class?;
        loop {
            let info = self.table.get(current).as_class()?;
            if info.class_scope == scope {
                return Some(current);
            }
            current = info.upper_class?;
        }
    }

    fn check_get(
        &mut self,
        object: &mut Expr,
        property: &Ident,
        property_id: &mut Slot<SymbolId>,
        span: Span,
    ) -> Type {
        let on_type = matches!(object.kind, ExprKind::StaticClassRef { .. });
        let receiver = self.check_expr(object);
        if receiver.is_error() {
            return Type::error();
        }
        let Some(field) = receiver.class_id().and_then(|class| self.find_field(class, &property.name)) else {
            self.errors.push(Error::NoMember { ty: receiver.to_string(), member: property.name.clone(), span });
            return Type::error();
        };

        let symbol = self.table.get(field);
        let Some(var) = symbol.as_variable() else {
            return Type::error();
        };
        let (kind, visibility, scope) = (var.kind, var.visibility, symbol.belongs_to);
        let name = property.name.clone();
        if on_type && kind == VariableKind::Instance {
            self.errors.push(Error::InstanceMemberOnType { name, ty: receiver.to_string(), span });
            return Type::error();
        }
        if !on_type && kind == VariableKind::StaticVar {
            self.errors.push(Error::StaticMemberOnInstance { name, ty: receiver.to_string(), span });
            return Type::error();
        }
        if !self.accessible(visibility, self.owner_of_scope(scope)) {
            self.errors.push(Error::PrivateMember { name, span });
            return Type::error();
        }
        property_id.set(field);
        self.variable_type(field).with_assignable(true)
    }

    // ==================== Calls ====================

    fn method(&self, id: SymbolId) -> Option<&MethodInfo> {
        self.table.get(id).as_method()
    }

    /// Non-constructor methods named `name` visible from `scope`
    fn methods_in(&self, scope: ScopeId, name: &str) -> Vec<SymbolId> {
        self.table
            .collect_overload_set(scope, name)
            .into_iter()
            .filter(|id| self.method(*id).is_some_and(|method| !method.is_constructor))
            .collect()
    }

    fn constructors(&self, class: SymbolId) -> Vec<SymbolId> {
        let Some(info) = self.table.get(class).as_class() else {
            return Vec::new();
        };
        let key = func_name_key(&info.non_signature_name);
        let Some(set) = self.table.lookup_local(info.class_scope, &key) else {
            return Vec::new();
        };
        match &self.table.get(set).kind {
            SymbolKind::FunctionName(set) => set
                .belonging_functions
                .iter()
                .copied()
                .filter(|id| self.method(*id).is_some_and(|m| m.is_constructor && m.within_class == class))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn check_call(&mut self, call: &mut CallExpr, span: Span) -> Type {
        for arg in &mut call.args {
            self.check_expr(arg);
        }
        let name = call.name.name.clone();

        let (candidates, dispatch) = match &mut call.callee {
            Callee::Free => {
                let Some(candidates) = self.free_call_candidates(&name, span) else {
                    return Type::error();
                };
                (candidates, true)
            }
            Callee::Object(object) => {
                let on_type = matches!(object.kind, ExprKind::StaticClassRef { .. });
                let receiver = self.check_expr(object);
                if receiver.is_error() {
                    return Type::error();
                }
                let Some(candidates) = self.member_call_candidates(&receiver, on_type, &name, span) else {
                    return Type::error();
                };
                (candidates, true)
            }
            Callee::Super => {
                let Some(scope) = self.superclass().and_then(|id| self.class_scope(id)) else {
                    return Type::error();
                };
                let candidates = self.methods_in(scope, &name);
                if candidates.is_empty() {
                    let class = self.superclass().map(|id| self.class_type(id).to_string()).unwrap_or_default();
                    self.errors.push(Error::NoSuperMember { class, member: name, span });
                    return Type::error();
                }
                (candidates, false)
            }
            Callee::SuperConstructor => {
                if let Some(superclass) = self.superclass() {
                    let constructors = self.constructors(superclass);
                    if let Some(id) = self.resolve_constructor(&constructors, &mut call.args, span) {
                        call.target.set(CallTarget::Unique(id));
                    }
                }
                return Type::void();
            }
        };

        let Some(id) = self.select_overload(&name, &candidates, &mut call.args, span) else {
            return Type::error();
        };
        let return_type = self
            .table
            .get(id)
            .as_function()
            .map(|info| info.return_type.clone())
            .unwrap_or_else(Type::error);
        call.target.set(self.call_target(id, dispatch));
        return_type.with_assignable(false)
    }

    fn superclass(&self) -> Option<SymbolId> {
        self.table.get(self.class?).as_class()?.upper_class
    }

    /// Instance methods, then static methods, then free functions
    fn free_call_candidates(&mut self, name: &str, span: Span) -> Option<Vec<SymbolId>> {
        let in_instance = self.frame.as_ref().is_some_and(|frame| frame.is_method && !frame.is_static);
        let (statics, instances): (Vec<SymbolId>, Vec<SymbolId>) = self
            .methods_in(self.scope, name)
            .into_iter()
            .filter(|id| self.method(*id).is_some_and(|m| self.accessible(m.visibility, Some(m.within_class))))
            .partition(|id| self.method(*id).is_some_and(|m| m.is_static));

        if in_instance && !instances.is_empty() {
            return Some(instances);
        }
        if !statics.is_empty() {
            return Some(statics);
        }
        let functions: Vec<SymbolId> = self
            .table
            .collect_overload_set(ScopeId::ROOT, name)
            .into_iter()
            .filter(|id| matches!(self.table.get(*id).kind, SymbolKind::Function(_)))
            .collect();
        if !functions.is_empty() {
            return Some(functions);
        }

        if !instances.is_empty() {
            self.errors.push(Error::InstanceMemberInStaticContext { name: name.to_string(), span });
        } else {
            self.errors.push(Error::UnknownIdentifier { name: name.to_string(), span });
        }
        None
    }

    fn member_call_candidates(&mut self, receiver: &Type, on_type: bool, name: &str, span: Span) -> Option<Vec<SymbolId>> {
        let scope = receiver.class_id().and_then(|class| self.class_scope(class));
        let all = scope.map(|scope| self.methods_in(scope, name)).unwrap_or_default();
        if all.is_empty() {
            self.errors.push(Error::NoMember { ty: receiver.to_string(), member: name.to_string(), span });
            return None;
        }

        let matching: Vec<SymbolId> =
            all.into_iter().filter(|id| self.method(*id).is_some_and(|m| m.is_static == on_type)).collect();
        if matching.is_empty() {
            let (name, ty) = (name.to_string(), receiver.to_string());
            self.errors.push(if on_type {
                Error::InstanceMemberOnType { name, ty, span }
            } else {
                Error::StaticMemberOnInstance { name, ty, span }
            });
            return None;
        }

        let accessible: Vec<SymbolId> = matching
            .into_iter()
            .filter(|id| self.method(*id).is_some_and(|m| self.accessible(m.visibility, Some(m.within_class))))
            .collect();
        if accessible.is_empty() {
            self.errors.push(Error::PrivateMember { name: name.to_string(), span });
            return None;
        }
        Some(accessible)
    }

    /// A class without constructors takes no arguments
    fn resolve_constructor(&mut self, constructors: &[SymbolId], args: &mut [Expr], span: Span) -> Option<SymbolId> {
        if constructors.is_empty() {
            if !args.is_empty() {
                self.errors.push(Error::NoMatchingFunction { span });
            }
            return None;
        }
        self.select_overload("constructor", constructors, args, span)
    }

    /// Lower is better: 1 exact, 2 widened, 3 widened to any
    fn match_level(&self, candidate: SymbolId, args: &[Expr]) -> Option<u8> {
        let info = self.table.get(candidate).as_function()?;
        if !info.accepts(args.len()) {
            return None;
        }
        let mut level = 1;
        for (arg, param) in args.iter().zip(&info.param_types) {
            let ty = arg.ty();
            if ty.is_error() || param.is_error() || ty == *param {
                continue;
            }
            if common_type(&ty, param, &*self.table) != *param {
                return None;
            }
            level = level.max(if param.is_any() { 3 } else { 2 });
        }
        Some(level)
    }

    fn owner(&self, id: SymbolId) -> Option<SymbolId> {
        self.method(id).map(|method| method.within_class)
    }

    fn select_overload(&mut self, name: &str, candidates: &[SymbolId], args: &mut [Expr], span: Span) -> Option<SymbolId> {
        let mut best_level = u8::MAX;
        let mut best: Vec<SymbolId> = Vec::new();
        for &candidate in candidates {
            let Some(level) = self.match_level(candidate, args) else {
                continue;
            };
            if level < best_level {
                best_level = level;
                best.clear();
            }
            if level == best_level {
                best.push(candidate);
            }
        }

        let Some(&first) = best.first() else {
            if !args.iter().any(|arg| arg.ty().is_error()) {
                self.errors.push(Error::NoMatchingFunction { span });
            }
            return None;
        };
        let owner = self.owner(first);
        best.retain(|id| self.owner(*id) == owner);
        log::trace!("call '{}': {} candidates, best level {}, {} left", name, candidates.len(), best_level, best.len());
        if best.len() > 1 {
            if !args.iter().any(|arg| arg.ty().is_error()) {
                self.errors.push(Error::AmbiguousCall { span });
            }
            return None;
        }

        let params = self.table.get(first).as_function().map(|info| info.param_types.clone()).unwrap_or_default();
        for (arg, param) in args.iter_mut().zip(&params) {
            self.coerce(arg, param);
        }
        Some(first)
    }

    /// Overridden instance methods dispatch on the receiver's class
    fn call_target(&self, id: SymbolId, dispatch: bool) -> CallTarget {
        let Some(method) = self.method(id) else {
            return CallTarget::Unique(id);
        };
        if !dispatch || method.is_static || method.is_constructor || method.overrided_by.is_empty() {
            return CallTarget::Unique(id);
        }
        let mut table = BTreeMap::new();
        table.insert(method.within_class, id);
        for &overrider in &method.overrided_by {
            if let Some(owner) = self.owner(overrider) {
                table.insert(owner, overrider);
            }
        }
        CallTarget::Polymorphic(table)
    }
}

fn site_set(program: &mut Program, site: GlobalSite) -> Option<&mut SetStmt> {
    match program.stmts.get_mut(site.stmt)? {
        Stmt::Set(set) if site.part == 0 => Some(set),
        Stmt::MultiSet { sets, .. } => sets.get_mut(site.part),
        _ => None,
    }
}

fn wrap_implicit_cast(expr: &mut Expr, to: &Type) {
    let span = expr.span;
    let inner = std::mem::replace(expr, Expr::new(ExprKind::Literal(LiteralValue::Bool(false)), span));
    *expr = Expr {
        kind: ExprKind::ImplicitCast(Box::new(inner)),
        ty: Slot::Resolved(to.clone().with_assignable(false)),
        span,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::tests::{analyze, analyze_program, Analysis};
    use pretty_assertions::assert_eq;

    /// The value of the top-level set statement at `index`
    fn set_value(analysis: &Analysis, index: usize) -> &Expr {
        match &analysis.program.stmts[index] {
            Stmt::Set(set) => &set.value,
            other => panic!("statement {} is not a set: {:?}", index, other),
        }
    }

    fn call_of(expr: &Expr) -> &CallExpr {
        match &expr.kind {
            ExprKind::Call(call) => call,
            other => panic!("not a call: {:?}", other),
        }
    }

    fn function_id(analysis: &Analysis, signature: &str) -> SymbolId {
        analysis.table.lookup_root(signature).unwrap()
    }

    #[test]
    fn test_overload_levels() {
        let source = "\
function draw(x: int): int
  return 1
end function
function draw(x: double): int
  return 2
end function
a = draw(3)
b = draw(3.0)
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let int_draw = function_id(&analysis, "draw(int)");
        let double_draw = function_id(&analysis, "draw(double)");
        assert_eq!(call_of(set_value(&analysis, 2)).target.get(), Some(&CallTarget::Unique(int_draw)));
        assert_eq!(call_of(set_value(&analysis, 3)).target.get(), Some(&CallTarget::Unique(double_draw)));
        assert!(matches!(call_of(set_value(&analysis, 2)).args[0].kind, ExprKind::Literal(_)));
    }

    #[test]
    fn test_promotion_inserts_implicit_cast() {
        let source = "\
function draw(x: double)
end function
draw(3)
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let Stmt::Expression(expr) = &analysis.program.stmts[1] else {
            panic!("expected an expression statement");
        };
        let call = call_of(expr);
        assert_eq!(call.target.get(), Some(&CallTarget::Unique(function_id(&analysis, "draw(double)"))));
        assert!(matches!(call.args[0].kind, ExprKind::ImplicitCast(_)));
        assert_eq!(call.args[0].ty(), Type::double());
    }

    #[test]
    fn test_polymorphic_dispatch() {
        let source = "\
class Animal
  function speak(): any
    return 1
  end function
end class
class Dog extends Animal
  function speak(): any
    return 2
  end function
end class
pet: Animal = new Dog()
sound = pet.speak()
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let animal = analysis.table.lookup_root("Animal<>").unwrap();
        let dog = analysis.table.lookup_root("Dog<>").unwrap();
        let method = |class: SymbolId| {
            let scope = analysis.table.get(class).as_class().unwrap().class_scope;
            analysis.table.lookup_local(scope, "speak()").unwrap()
        };
        let expected = BTreeMap::from([(animal, method(animal)), (dog, method(dog))]);
        assert_eq!(
            call_of(set_value(&analysis, 3)).target.get(),
            Some(&CallTarget::Polymorphic(expected))
        );
        assert!(matches!(set_value(&analysis, 2).kind, ExprKind::ImplicitCast(_)));
    }

    #[test]
    fn test_ambiguous_and_missing_overloads() {
        let source = "\
function f(a: int, b: double)
end function
function f(a: double, b: int)
end function
f(1, 1)
f(true, 1)
g()
";
        assert_eq!(
            analyze(source),
            vec!["Function call is ambiguous", "No matching function to call", "Use of unknown identifier g"]
        );
    }

    #[test]
    fn test_unknown_argument_reports_once() {
        let source = "\
function draw(x: int)
end function
function draw(x: double)
end function
class A
  function g(x: int)
  end function
  function g(x: boolean)
  end function
end class
a = new A()
draw(undefined)
a.g(nope)
";
        assert_eq!(
            analyze(source),
            vec!["Use of unknown identifier undefined", "Use of unknown identifier nope"]
        );
    }

    #[test]
    fn test_default_parameters() {
        let source = "\
function greet(name: String, times: int = 1)
end function
greet(\"a\")
greet(\"a\", 2)
greet()
";
        assert_eq!(analyze(source), vec!["No matching function to call"]);
    }

    #[test]
    fn test_operators() {
        let source = "\
x = 1 + true
y = 5 mod 2.0
z = not 1
w = -true
s = \"a\" + \"b\"
d = 7 div 2
e = x + 1
ok = 1 < 2.5 and s == \"ab\"
";
        assert_eq!(
            analyze(source),
            vec![
                "Binary operator '+' cannot be applied to operands of type 'int' and 'boolean'",
                "Binary operator 'mod' cannot be applied to operands of type 'int' and 'double'",
                "Unary operator 'not' can only be applied to an operand of type 'boolean'",
                "Unary operator '-' can only be applied to an operand of type 'int' or 'double'",
            ]
        );
    }

    #[test]
    fn test_conditions_and_bounds() {
        let source = "\
if 1 then
end if
loop while 2.0
end loop
loop i from 0 to 2.5
end loop
";
        assert_eq!(
            analyze(source),
            vec![
                "Type 'int' cannot be used as a boolean",
                "Type 'double' cannot be used as a boolean",
                "Type 'double' cannot be used as an int",
            ]
        );
    }

    #[test]
    fn test_assignments_and_casts() {
        let source = "\
n: int = 1.5
arr = {1, 2.5}
arr[0] = true
arr[1.0] = 2
q = 3
q[0] = 1
c = (boolean) 1
r = (int) 2.5
";
        assert_eq!(
            analyze(source),
            vec![
                // Defining sets of globals are typed before the rest of the top level
                "Type 'double' cannot be cast to 'int'",
                "Type 'int' cannot be cast to 'boolean'",
                "Type 'boolean' cannot be cast to 'double'",
                "Array subscript is not an integer",
                "Subscripted expression is not an array",
            ]
        );
    }

    #[test]
    fn test_returns_and_void() {
        let source = "\
function f(): int
  return
end function
function g()
  return 1
end function
v = g()
function one(): int
  return 1
end function
one() = 2
";
        assert_eq!(
            analyze(source),
            vec![
                "Variable cannot be initialized with a value of type '<Void>'",
                "Non-void function should return a value",
                "Unexpected non-void return value in void function",
                "Cannot assign to immutable value",
            ]
        );
    }

    #[test]
    fn test_members() {
        let source = "\
class C
  static count: int = 0
  n: int = 1
  private secret: int = 2
  static function make(): int
    return 1
  end function
  private function hidden()
  end function
end class
c = new C()
output c.count
output C.n
output C.make()
output c.make()
output c.secret
c.hidden()
output c.missing
";
        assert_eq!(
            analyze(source),
            vec![
                "Static member 'count' cannot be used on instance of type 'C'",
                "Instance member 'n' cannot be used on type 'C'",
                "Static member 'make' cannot be used on instance of type 'C'",
                "'secret' is inaccessible due to 'private' protection level",
                "'hidden' is inaccessible due to 'private' protection level",
                "Value of type 'C' has no member 'missing'",
            ]
        );
    }

    #[test]
    fn test_input_and_capacity() {
        let source = "\
b = true
input b
a = new int[2.0]
name = \"\"
input name
";
        assert_eq!(
            analyze(source),
            // global definitions are typed before other statements
            vec!["Expect type 'int' for array capacity", "Cannot input to type 'boolean'"]
        );
    }

    #[test]
    fn test_string_builtins() {
        let source = "\
s = \"abc\"
n = s.length()
t = s.substring(1)
u = s.substring(0, 2)
v = String.valueOf(2.5)
w = String.fromCharCodes({104, 105})
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let ty = |name: &str| {
            let id = analysis.table.lookup_root(name).unwrap();
            analysis.table.get(id).as_variable().unwrap().ty.clone().unwrap().to_string()
        };
        assert_eq!(ty("n"), "int");
        assert_eq!(ty("t"), "String");
        assert_eq!(ty("w"), "String");
    }

    #[test]
    fn test_inherited_members_and_super() {
        let source = "\
class Shape
  sides: int
  function Shape(n: int)
    sides = n
  end function
  function describe(): int
    return sides
  end function
end class
class Square extends Shape
  function Square()
    super(4)
  end function
  function describe(): int
    return super.describe() + sides
  end function
end class
sq = new Square()
total = sq.sides + sq.describe()
bad = new Shape()
";
        assert_eq!(analyze(source), vec!["No matching function to call"]);
    }
}
