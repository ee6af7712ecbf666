//! Name resolution for Quasicode
//!
//! Runs in four steps over the parsed program:
//! - declare every class, member and free function up front
//! - build the class hierarchy (see [`super::hierarchy`])
//! - declare top-level globals and order their initialization
//! - walk every statement, binding names and checking keyword context
//!
//! Problems are collected and the walk always continues.

use super::hierarchy::{ClassEdge, HierarchyBuilder};
use super::symbol::{
    func_name_key, ClassInfo, FunctionInfo, FunctionNameInfo, GlobalSite, MethodInfo, MethodSpans, Symbol,
    SymbolKind, VariableInfo, VariableKind, VariableStatus, INSTANCE_THIS, STATIC_THIS,
};
use super::symbol_table::{ScopeId, SymbolId, SymbolTable};
use crate::frontend::ast::*;
use crate::types::{resolve_ast_type, Type};
use crate::utils::{Error, Span};
use std::collections::{HashMap, HashSet};

/// What kind of body the walk is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionContext {
    None,
    Function,
    Initializer,
    StaticMethod,
    InstanceMethod,
}

#[derive(Debug, Clone, Copy)]
struct ClassContext {
    id: SymbolId,
    super_id: Option<SymbolId>,
}

/// Owner of a function being declared as a method
struct MethodOwner {
    class: SymbolId,
    class_name: String,
    is_static: bool,
    static_span: Option<Span>,
    visibility: Visibility,
}

/// Output of [`Resolver::resolve`]
#[derive(Debug, Default)]
pub struct Resolution {
    /// Globals in the order their initializers must run
    pub global_init_order: Vec<SymbolId>,
    pub errors: Vec<Error>,
}

pub struct Resolver<'a> {
    table: &'a mut SymbolTable,
    errors: Vec<Error>,
    in_loop: bool,
    function: FunctionContext,
    class: Option<ClassContext>,
    /// Span of the `super(...)` call allowed as the first constructor statement
    allowed_super_call: Option<Span>,
    /// Set statements that define globals; resolved before the general walk
    global_sites: HashSet<GlobalSite>,
    /// Globals defined by the site whose value is being resolved
    global_owners: Vec<SymbolId>,
    global_edges: HashMap<SymbolId, Vec<(SymbolId, Span)>>,
    global_init_order: Vec<SymbolId>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        Self {
            table,
            errors: Vec::new(),
            in_loop: false,
            function: FunctionContext::None,
            class: None,
            allowed_super_call: None,
            global_sites: HashSet::new(),
            global_owners: Vec::new(),
            global_edges: HashMap::new(),
            global_init_order: Vec::new(),
        }
    }

    /// Resolve a whole program
    pub fn resolve(mut self, program: &mut Program) -> Resolution {
        self.table.reset_to_root();
        let superclasses = self.collect_classes(program);
        self.collect_members(program);
        self.build_hierarchy(&superclasses);
        self.collect_globals(program);
        self.order_globals();

        for (index, stmt) in program.stmts.iter_mut().enumerate() {
            match stmt {
                Stmt::Set(set) => {
                    if !self.global_sites.contains(&GlobalSite { stmt: index, part: 0 }) {
                        self.resolve_set(set);
                    }
                }
                Stmt::MultiSet { sets, .. } => {
                    for (part, set) in sets.iter_mut().enumerate() {
                        if !self.global_sites.contains(&GlobalSite { stmt: index, part }) {
                            self.resolve_set(set);
                        }
                    }
                }
                _ => self.resolve_stmt(stmt),
            }
        }
        self.table.reset_to_root();

        log::debug!(
            "resolved: {} symbols declared, {} errors",
            self.table.symbols().len(),
            self.errors.len()
        );
        Resolution { global_init_order: self.global_init_order, errors: self.errors }
    }

    fn resolve_type(&mut self, ty: &AstType) -> Type {
        match resolve_ast_type(ty, &*self.table) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.errors.push(err);
                Type::error()
            }
        }
    }

    // ==================== Declarations ====================

    /// Declare every class; returns each declared class with its `extends` clause
    fn collect_classes(&mut self, program: &mut Program) -> HashMap<SymbolId, AstType> {
        let mut superclasses = HashMap::new();
        for stmt in &mut program.stmts {
            let Stmt::Class(class) = stmt else {
                continue;
            };
            let name = class.name.name.clone();
            if !class.template_params.is_empty() {
                self.errors.push(Error::TemplateNotSupported { name, span: class.name.span });
                continue;
            }

            let signature = AstType::class_signature(&name, &[]);
            if self.table.lookup_root(&signature).is_some() {
                self.errors.push(Error::Redeclaration { name, span: class.name.span });
                continue;
            }
            match self.table.lookup_root(&name) {
                Some(id) if !matches!(self.table.get(id).kind, SymbolKind::ClassName { .. }) => {
                    self.errors.push(Error::Redeclaration { name, span: class.name.span });
                    continue;
                }
                Some(_) => {}
                None => {
                    let class_name = Symbol::new(name.clone(), class.name.span, SymbolKind::ClassName { builtin: false });
                    self.table.declare(ScopeId::ROOT, class_name);
                }
            }

            let scope = self.table.create_scope(ScopeId::ROOT);
            let info = ClassInfo::new(&name, false, scope);
            let id = self.table.declare(ScopeId::ROOT, Symbol::new(signature, class.name.span, SymbolKind::Class(info)));
            class.symbol.set(id);
            class.scope.set(scope);
            if let Some(superclass) = &class.superclass {
                superclasses.insert(id, superclass.clone());
            }
        }
        superclasses
    }

    /// Declare methods and fields of every class, then free functions
    fn collect_members(&mut self, program: &mut Program) {
        for stmt in &mut program.stmts {
            let Stmt::Class(class) = stmt else {
                continue;
            };
            let (Some(class_id), Some(scope)) = (class.symbol.id(), class.scope.id()) else {
                continue;
            };

            for method in &mut class.methods {
                let owner = MethodOwner {
                    class: class_id,
                    class_name: class.name.name.clone(),
                    is_static: method.is_static,
                    static_span: method.static_span,
                    visibility: method.visibility,
                };
                self.define_function(&mut method.function, scope, Some(owner));
            }

            for field in &mut class.fields {
                let ty = self.resolve_type(&field.annotation);
                if self.table.lookup_local(scope, &field.name.name).is_some() {
                    self.errors.push(Error::Redeclaration { name: field.name.name.clone(), span: field.name.span });
                    continue;
                }
                let kind = if field.is_static { VariableKind::StaticVar } else { VariableKind::Instance };
                let mut info = VariableInfo::new(kind, VariableStatus::FieldIniting).typed(ty);
                info.visibility = field.visibility;
                let id = self.table.declare(scope, Symbol::new(field.name.name.clone(), field.name.span, SymbolKind::Variable(info)));
                field.symbol.set(id);
                if let Some(info) = self.table.get_mut(class_id).as_class_mut() {
                    info.fields.push(id);
                }
            }
        }

        for stmt in &mut program.stmts {
            if let Stmt::Function(function) = stmt {
                self.define_function(function, ScopeId::ROOT, None);
            }
        }
    }

    /// Declare a function or method with its signature
    fn define_function(&mut self, function: &mut FunctionStmt, scope: ScopeId, owner: Option<MethodOwner>) {
        let mut param_types = Vec::with_capacity(function.params.len());
        let mut min_args = None;
        for (index, param) in function.params.iter().enumerate() {
            let ty = match &param.annotation {
                Some(annotation) => self.resolve_type(annotation),
                None => Type::any(),
            };
            if param.initializer.is_some() && min_args.is_none() {
                min_args = Some(index);
            }
            param_types.push(ty);
        }
        let return_type = match &function.annotation {
            Some(annotation) => self.resolve_type(annotation),
            None => Type::void(),
        };

        let name = function.name.name.clone();
        let params: Vec<String> = param_types.iter().map(|ty| ty.to_string()).collect();
        let signature = format!("{}({})", name, params.join(", "));
        if self.table.lookup_local(scope, &signature).is_some() {
            self.errors.push(Error::Redeclaration { name: signature, span: function.name.span });
            return;
        }
        if owner.is_none() {
            if let Some(id) = self.table.lookup_local(scope, &name) {
                if matches!(self.table.get(id).kind, SymbolKind::ClassName { .. }) {
                    self.errors.push(Error::Redeclaration { name, span: function.name.span });
                    return;
                }
            }
        }

        let info = FunctionInfo {
            return_type,
            min_args: min_args.unwrap_or(param_types.len()),
            max_args: param_types.len(),
            param_types,
        };
        let kind = match &owner {
            Some(owner) => SymbolKind::Method(MethodInfo {
                function: info,
                within_class: owner.class,
                is_static: owner.is_static,
                visibility: owner.visibility,
                is_constructor: name == owner.class_name,
                overrided_by: Vec::new(),
                finished_init: false,
                spans: MethodSpans {
                    name: function.name.span,
                    static_keyword: owner.static_span,
                    annotation: function.annotation.as_ref().map(AstType::span),
                },
            }),
            None => SymbolKind::Function(info),
        };
        let id = self.table.declare(scope, Symbol::new(signature, function.name.span, kind));

        let key = func_name_key(&name);
        let name_set = match self.table.lookup_local(scope, &key) {
            Some(set) => set,
            None => {
                let set = FunctionNameInfo { is_for_methods: owner.is_some(), belonging_functions: Vec::new() };
                self.table.declare(scope, Symbol::new(key, function.name.span, SymbolKind::FunctionName(set)))
            }
        };
        match &mut self.table.get_mut(name_set).kind {
            SymbolKind::FunctionName(set) => set.belonging_functions.push(id),
            other => debug_assert!(false, "overload key bound to {:?}", other),
        }
        if let Some(owner) = owner {
            if let Some(class) = self.table.get_mut(owner.class).as_class_mut() {
                class.methods.push(id);
            }
        }

        function.symbol.set(id);
        function.name_symbol.set(name_set);
    }

    fn build_hierarchy(&mut self, superclasses: &HashMap<SymbolId, AstType>) {
        let classes: Vec<(SymbolId, Span)> = self
            .table
            .symbols()
            .iter()
            .filter(|symbol| symbol.as_class().is_some())
            .map(|symbol| (symbol.id, symbol.span))
            .collect();

        let mut edges = Vec::with_capacity(classes.len());
        for (class, span) in classes {
            let superclass = match superclasses.get(&class) {
                Some(annotation) => self.resolve_type(annotation).class_id(),
                None => None,
            };
            edges.push(ClassEdge { class, superclass, span });
        }
        HierarchyBuilder::new(&mut *self.table, &mut self.errors).build(&edges);
    }

    // ==================== Globals ====================

    /// Declare every top-level variable that is assigned before it exists
    /// anywhere, then resolve the values of the statements defining them
    fn collect_globals(&mut self, program: &mut Program) {
        let mut owners: HashMap<GlobalSite, Vec<SymbolId>> = HashMap::new();
        for (index, stmt) in program.stmts.iter_mut().enumerate() {
            let sets: Vec<&mut SetStmt> = match stmt {
                Stmt::Set(set) => vec![set],
                Stmt::MultiSet { sets, .. } => sets.iter_mut().collect(),
                _ => continue,
            };
            for (part, set) in sets.into_iter().enumerate() {
                let site = GlobalSite { stmt: index, part };
                for target in std::iter::once(&mut set.left).chain(set.chained.iter_mut()) {
                    if let Some(id) = self.declare_global(target, site) {
                        owners.entry(site).or_default().push(id);
                    }
                }
            }
        }

        for (index, stmt) in program.stmts.iter_mut().enumerate() {
            let sets: Vec<&mut SetStmt> = match stmt {
                Stmt::Set(set) => vec![set],
                Stmt::MultiSet { sets, .. } => sets.iter_mut().collect(),
                _ => continue,
            };
            for (part, set) in sets.into_iter().enumerate() {
                let site = GlobalSite { stmt: index, part };
                if let Some(defined) = owners.remove(&site) {
                    self.global_sites.insert(site);
                    self.global_owners = defined;
                    self.resolve_set(set);
                    self.global_owners.clear();
                }
            }
        }
    }

    fn declare_global(&mut self, target: &mut Expr, site: GlobalSite) -> Option<SymbolId> {
        let ExprKind::VariableToSet { name, symbol, first, .. } = &mut target.kind else {
            return None;
        };
        if self.table.lookup_root(&name.name).is_some()
            || self.table.lookup_root(&func_name_key(&name.name)).is_some()
        {
            return None;
        }
        let variable = VariableInfo::new(VariableKind::Global, VariableStatus::Uninit);
        let kind = SymbolKind::GlobalVariable { variable, site };
        let id = self.table.declare(ScopeId::ROOT, Symbol::new(name.name.clone(), name.span, kind));
        symbol.set(id);
        first.set(true);
        Some(id)
    }

    /// Depth-first walk over global dependencies
    fn order_globals(&mut self) {
        let globals: Vec<SymbolId> =
            self.table.symbols().iter().filter(|symbol| symbol.is_global()).map(|symbol| symbol.id).collect();
        let mut reported = HashSet::new();
        for global in globals {
            if self.global_status(global) == VariableStatus::Uninit {
                let mut path = Vec::new();
                self.init_global(global, &mut path, &mut reported);
            }
        }
        let order: Vec<&str> =
            self.global_init_order.iter().map(|id| self.table.get(*id).name.as_str()).collect();
        log::debug!("global initialization order: [{}]", order.join(", "));
    }

    fn global_status(&self, id: SymbolId) -> VariableStatus {
        self.table.get(id).as_variable().map_or(VariableStatus::FinishedInit, |var| var.status)
    }

    fn set_status(&mut self, id: SymbolId, status: VariableStatus) {
        if let Some(var) = self.table.get_mut(id).as_variable_mut() {
            var.status = status;
        }
    }

    /// `path` holds each global entered below the walk's root with the
    /// span of the reference that led to it
    fn init_global(&mut self, global: SymbolId, path: &mut Vec<(SymbolId, Span)>, reported: &mut HashSet<Span>) {
        self.set_status(global, VariableStatus::GlobalIniting);
        let edges = self.global_edges.get(&global).cloned().unwrap_or_default();
        for (target, span) in edges {
            match self.global_status(target) {
                VariableStatus::Uninit => {
                    path.push((target, span));
                    self.init_global(target, path, reported);
                    path.pop();
                }
                VariableStatus::GlobalIniting => {
                    if reported.insert(span) {
                        self.errors.push(Error::CircularReference { span });
                    }
                    for &(node, edge) in path.iter().rev() {
                        if node == target {
                            break;
                        }
                        if reported.insert(edge) {
                            self.errors.push(Error::CircularReference { span: edge });
                        }
                    }
                }
                _ => {}
            }
        }
        self.set_status(global, VariableStatus::FinishedInit);
        self.global_init_order.push(global);
    }

    // ==================== Statements ====================

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Class(class) => self.resolve_class(class),
            Stmt::Function(function) => self.resolve_function(function, ScopeId::ROOT, FunctionContext::Function),
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::If(stmt) => {
                self.resolve_expr(&mut stmt.condition);
                self.resolve_block(&mut stmt.then_branch);
                for else_if in &mut stmt.else_ifs {
                    self.resolve_expr(&mut else_if.condition);
                    self.resolve_block(&mut else_if.block);
                }
                if let Some(block) = &mut stmt.else_branch {
                    self.resolve_block(block);
                }
            }
            Stmt::Output { exprs, .. } | Stmt::Input { exprs, .. } => {
                for expr in exprs {
                    self.resolve_expr(expr);
                }
            }
            Stmt::Return { value, span } => {
                match self.function {
                    FunctionContext::None => self.errors.push(Error::ReturnAtTopLevel { span: *span }),
                    FunctionContext::Initializer if value.is_some() => {
                        self.errors.push(Error::ReturnValueFromConstructor { span: *span })
                    }
                    _ => {}
                }
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Stmt::LoopFrom { variable, from, to, body, .. } => {
                self.resolve_expr(from);
                self.resolve_expr(to);
                let current = self.table.current();
                let existing = self
                    .table
                    .lookup_chain(current, &variable.name.name)
                    .filter(|id| self.table.get(*id).as_variable().is_some());
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let info = VariableInfo::new(VariableKind::Local, VariableStatus::FinishedInit).typed(Type::int());
                        let symbol = Symbol::new(variable.name.name.clone(), variable.name.span, SymbolKind::Variable(info));
                        self.table.declare(current, symbol)
                    }
                };
                variable.symbol.set(id);
                self.resolve_loop_body(body);
            }
            Stmt::While { condition, body, .. } => {
                self.resolve_expr(condition);
                self.resolve_loop_body(body);
            }
            Stmt::Break { span } => {
                if !self.in_loop {
                    self.errors.push(Error::BreakOutsideLoop { span: *span });
                }
            }
            Stmt::Continue { span } => {
                if !self.in_loop {
                    self.errors.push(Error::ContinueOutsideLoop { span: *span });
                }
            }
            Stmt::Exit { .. } => {}
            Stmt::MultiSet { sets, .. } => {
                for set in sets {
                    self.resolve_set(set);
                }
            }
            Stmt::Set(set) => self.resolve_set(set),
        }
    }

    fn resolve_block(&mut self, block: &mut Block) {
        let saved = self.table.current();
        let scope = self.table.create_scope(saved);
        block.scope.set(scope);
        self.table.enter(scope);
        for stmt in &mut block.stmts {
            self.resolve_stmt(stmt);
        }
        self.table.enter(saved);
    }

    fn resolve_loop_body(&mut self, body: &mut Block) {
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        self.resolve_block(body);
        self.in_loop = was_in_loop;
    }

    /// Value first, then targets right to left
    fn resolve_set(&mut self, set: &mut SetStmt) {
        self.resolve_expr(&mut set.value);
        for target in set.chained.iter_mut().rev() {
            self.resolve_expr(target);
        }
        self.resolve_expr(&mut set.left);
    }

    fn resolve_class(&mut self, class: &mut ClassStmt) {
        let (Some(id), Some(scope)) = (class.symbol.id(), class.scope.id()) else {
            return;
        };
        let super_id = self.table.get(id).as_class().and_then(|info| info.upper_class);
        let saved_class = self.class.replace(ClassContext { id, super_id });
        let saved_scope = self.table.current();
        self.table.enter(scope);

        let this_type = Type::class(class.name.name.clone(), id);
        for (name, kind) in [(INSTANCE_THIS, VariableKind::Instance), (STATIC_THIS, VariableKind::StaticVar)] {
            let info = VariableInfo::new(kind, VariableStatus::FinishedInit).typed(this_type.clone());
            let this = self.table.declare(scope, Symbol::new(name, class.name.span, SymbolKind::Variable(info)));
            if kind == VariableKind::Instance {
                class.instance_this.set(this);
            } else {
                class.static_this.set(this);
            }
        }

        for field in &mut class.fields {
            if let Some(initializer) = &mut field.initializer {
                self.resolve_expr(initializer);
            }
        }

        let (fields, methods) = match self.table.get(id).as_class() {
            Some(info) => (info.fields.clone(), info.methods.clone()),
            None => (Vec::new(), Vec::new()),
        };
        for field in fields {
            self.set_status(field, VariableStatus::FinishedInit);
        }
        for method in methods {
            if let Some(info) = self.table.get_mut(method).as_method_mut() {
                info.finished_init = true;
            }
        }

        for method in &mut class.methods {
            let is_constructor = method.function.name.name == class.name.name;
            let context = if is_constructor {
                if let Some(span) = method.static_span {
                    self.errors.push(Error::StaticConstructor { span });
                }
                FunctionContext::Initializer
            } else if method.is_static {
                FunctionContext::StaticMethod
            } else {
                FunctionContext::InstanceMethod
            };
            self.resolve_function(&mut method.function, scope, context);
        }

        self.table.enter(saved_scope);
        self.class = saved_class;
    }

    fn resolve_function(&mut self, function: &mut FunctionStmt, parent: ScopeId, context: FunctionContext) {
        let Some(symbol) = function.symbol.id() else {
            return;
        };
        let param_types = self.table.get(symbol).as_function().map(|info| info.param_types.clone()).unwrap_or_default();

        let saved_scope = self.table.current();
        let saved_context = std::mem::replace(&mut self.function, context);
        let saved_loop = std::mem::replace(&mut self.in_loop, false);
        let saved_super_call = self.allowed_super_call.take();

        let scope = self.table.create_scope(parent);
        function.scope.set(scope);
        self.table.enter(scope);

        for (param, ty) in function.params.iter_mut().zip(param_types) {
            if self.table.lookup_local(scope, &param.name.name).is_some() {
                self.errors.push(Error::Redeclaration { name: param.name.name.clone(), span: param.name.span });
                continue;
            }
            let info = VariableInfo::new(VariableKind::Local, VariableStatus::Initing).typed(ty);
            let id = self.table.declare(scope, Symbol::new(param.name.name.clone(), param.name.span, SymbolKind::Variable(info)));
            param.symbol.set(id);
            if let Some(initializer) = &mut param.initializer {
                self.resolve_expr(initializer);
            }
            self.set_status(id, VariableStatus::FinishedInit);
        }

        if context == FunctionContext::Initializer {
            if let Some(Stmt::Expression(expr)) = function.body.first() {
                if matches!(&expr.kind, ExprKind::Call(call) if matches!(call.callee, Callee::SuperConstructor)) {
                    self.allowed_super_call = Some(expr.span);
                }
            }
        }
        for stmt in &mut function.body {
            self.resolve_stmt(stmt);
        }

        self.table.enter(saved_scope);
        self.function = saved_context;
        self.in_loop = saved_loop;
        self.allowed_super_call = saved_super_call;
    }

    // ==================== Expressions ====================

    fn resolve_expr(&mut self, expr: &mut Expr) {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Grouping(inner) | ExprKind::ImplicitCast(inner) => self.resolve_expr(inner),
            ExprKind::ArrayLiteral(values) => {
                for value in values {
                    self.resolve_expr(value);
                }
            }
            ExprKind::StaticClassRef { class, class_id } => {
                if let Some(id) = self.resolve_type(class).class_id() {
                    class_id.set(id);
                }
            }
            ExprKind::This { symbol } => match self.function {
                FunctionContext::Initializer | FunctionContext::InstanceMethod => {
                    let current = self.table.current();
                    if let Some(id) = self.table.lookup_chain(current, INSTANCE_THIS) {
                        symbol.set(id);
                    }
                }
                FunctionContext::StaticMethod => {
                    self.errors.push(Error::InstanceMemberInStaticContext { name: "this".to_string(), span })
                }
                FunctionContext::None | FunctionContext::Function => {
                    self.errors.push(Error::ThisOutsideMethod { span })
                }
            },
            ExprKind::Super { property, super_class, property_id } => {
                let Some(super_id) = self.check_super(span) else {
                    return;
                };
                super_class.set(super_id);
                let found = self.table.get(super_id).as_class().and_then(|info| {
                    let id = self.table.lookup_chain(info.class_scope, &property.name)?;
                    let var = self.table.get(id).as_variable()?;
                    matches!(var.kind, VariableKind::Instance | VariableKind::StaticVar).then_some((id, var.kind))
                });
                match found {
                    Some((id, kind)) => {
                        if kind == VariableKind::Instance && self.function == FunctionContext::StaticMethod {
                            self.errors.push(Error::InstanceVariableFromStatic { span });
                        }
                        property_id.set(id);
                    }
                    None => {
                        let class = self.table.get(super_id).as_class().map(|info| info.display_name.clone());
                        self.errors.push(Error::NoSuperMember {
                            class: class.unwrap_or_default(),
                            member: property.name.clone(),
                            span,
                        });
                    }
                }
            }
            ExprKind::Variable { name, symbol } => self.resolve_variable(name, symbol, span),
            ExprKind::Subscript { expr, index } => {
                self.resolve_expr(expr);
                self.resolve_expr(index);
            }
            ExprKind::Call(call) => {
                match &mut call.callee {
                    Callee::Free => self.check_method_ready(&call.name),
                    Callee::Object(object) => {
                        self.resolve_expr(object);
                        let own_class = self.class.as_ref().map(|class| class.id);
                        if matches!(&object.kind, ExprKind::StaticClassRef { class_id, .. } if class_id.id() == own_class) {
                            self.check_method_ready(&call.name);
                        }
                    }
                    Callee::Super => {
                        self.check_super(span);
                    }
                    Callee::SuperConstructor => self.check_super_call(span),
                }
                for arg in &mut call.args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Cast { target, value } => {
                self.resolve_type(target);
                self.resolve_expr(value);
            }
            ExprKind::ArrayAllocation { array_type, capacities } => {
                self.resolve_type(array_type);
                for capacity in capacities {
                    self.resolve_expr(capacity);
                }
            }
            ExprKind::ClassAllocation { class, args, .. } => {
                self.resolve_type(class);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::VariableToSet { name, annotation, symbol, first } => {
                if let Some(annotation) = annotation.as_ref() {
                    self.resolve_type(annotation);
                }
                if symbol.is_resolved() {
                    return;
                }
                self.resolve_variable_to_set(name, annotation.is_some(), symbol, first, span);
            }
            ExprKind::IsType { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_type(right);
            }
        }
    }

    /// Methods of the class being declared are off limits to its field initializers
    fn check_method_ready(&mut self, name: &Ident) {
        let Some(class) = self.class.as_ref().map(|class| class.id) else {
            return;
        };
        let current = self.table.current();
        let not_ready = self.table.collect_overload_set(current, &name.name).into_iter().any(|id| {
            self.table.get(id).as_method().is_some_and(|method| method.within_class == class && !method.finished_init)
        });
        if not_ready {
            self.errors.push(Error::MethodBeforeClassReady { name: name.name.clone(), span: name.span });
        }
    }

    fn resolve_variable(&mut self, name: &Ident, symbol: &mut Slot<SymbolId>, span: Span) {
        let current = self.table.current();
        let Some(id) = self.table.lookup_chain(current, &name.name) else {
            self.errors.push(Error::UnknownIdentifier { name: name.name.clone(), span });
            return;
        };
        let found = self.table.get(id);
        let Some(var) = found.as_variable() else {
            self.errors.push(Error::UnknownIdentifier { name: name.name.clone(), span });
            return;
        };

        if found.is_global() {
            for &owner in &self.global_owners {
                self.global_edges.entry(owner).or_default().push((id, span));
            }
        }
        if var.kind == VariableKind::Instance && self.function == FunctionContext::StaticMethod {
            self.errors.push(Error::InstanceVariableFromStatic { span });
        }
        match var.status {
            VariableStatus::Initing => self.errors.push(Error::UseInOwnDeclaration { span }),
            VariableStatus::FieldIniting => self.errors.push(Error::UseBeforeClassReady { span }),
            VariableStatus::GlobalIniting => self.errors.push(Error::CircularReference { span }),
            VariableStatus::Uninit | VariableStatus::FinishedInit => {}
        }
        symbol.set(id);
    }

    fn resolve_variable_to_set(
        &mut self,
        name: &Ident,
        annotated: bool,
        symbol: &mut Slot<SymbolId>,
        first: &mut Slot<bool>,
        span: Span,
    ) {
        let current = self.table.current();
        if let Some(id) = self.table.lookup_chain(current, &name.name) {
            match self.table.get(id).as_variable() {
                Some(var) => {
                    if annotated {
                        self.errors.push(Error::RetypeVariable { span });
                    }
                    if var.kind == VariableKind::Instance && self.function == FunctionContext::StaticMethod {
                        self.errors.push(Error::InstanceVariableFromStatic { span });
                    }
                    symbol.set(id);
                    first.set(false);
                }
                None => self.errors.push(Error::AssignToClass { name: name.name.clone(), span }),
            }
            return;
        }
        if self.table.lookup_chain(current, &func_name_key(&name.name)).is_some() {
            self.errors.push(Error::AssignToFunction { name: name.name.clone(), span });
            return;
        }

        let info = VariableInfo::new(VariableKind::Local, VariableStatus::FinishedInit);
        let id = self.table.declare(current, Symbol::new(name.name.clone(), name.span, SymbolKind::Variable(info)));
        symbol.set(id);
        first.set(true);
    }

    /// Shared checks for `super.x` and `super.f()`; returns the superclass
    fn check_super(&mut self, span: Span) -> Option<SymbolId> {
        let Some(class) = self.class else {
            self.errors.push(Error::SuperOutsideClass { span });
            return None;
        };
        let Some(super_id) = class.super_id else {
            self.errors.push(Error::SuperInRootClass { span });
            return None;
        };
        if self.function == FunctionContext::None {
            self.errors.push(Error::SuperOutsideMethod { span });
            return None;
        }
        Some(super_id)
    }

    fn check_super_call(&mut self, span: Span) {
        let Some(class) = self.class else {
            self.errors.push(Error::SuperOutsideClass { span });
            return;
        };
        if self.function != FunctionContext::Initializer {
            self.errors.push(Error::SuperCallOutsideConstructor { span });
        } else if class.super_id.is_none() {
            self.errors.push(Error::SuperInRootClass { span });
        } else if self.allowed_super_call != Some(span) {
            self.errors.push(Error::SuperCallNotFirst { span });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::semantic::tests::{analyze, analyze_program};
    use crate::semantic::symbol::VariableStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_identifier() {
        assert_eq!(analyze("output y\n"), vec!["Use of unknown identifier y"]);
        assert_eq!(analyze("x = x + 1\n"), vec!["Circular reference"]);
    }

    #[test]
    fn test_globals_may_be_used_before_their_definition() {
        let source = "\
function show()
  output total
end function
show()
total = base * 2
base = 21
";
        assert!(analyze(source).is_empty());
    }

    #[test]
    fn test_circular_globals() {
        let analysis = analyze_program("x = y + 1\ny = x + 1\n");
        let messages: Vec<String> = analysis.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["Circular reference", "Circular reference"]);
        for name in ["x", "y"] {
            let id = analysis.table.lookup_root(name).unwrap();
            assert_eq!(analysis.table.get(id).as_variable().unwrap().status, VariableStatus::FinishedInit);
        }
    }

    #[test]
    fn test_self_referencing_global() {
        assert_eq!(analyze("a = a\n"), vec!["Circular reference"]);
    }

    #[test]
    fn test_global_order_follows_dependencies() {
        let analysis = analyze_program("c = b + a\nb = a * 2\na = 1\n");
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let order: Vec<&str> =
            analysis.global_init_order.iter().map(|id| analysis.table.get(*id).name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parameter_in_own_default() {
        assert_eq!(
            analyze("function f(a = a)\nend function\n"),
            vec!["Use of variable within its own declaration"]
        );
    }

    #[test]
    fn test_field_before_class_ready() {
        let source = "\
class A
  x: int = y
  y: int = 2
end class
";
        assert_eq!(analyze(source), vec!["Use of variable within class before class is available"]);
    }

    #[test]
    fn test_method_before_class_ready() {
        let source = "\
class A
  x: int = twice(1)
  static y: int = A.one()
  static function twice(n: int): int
    return n * 2
  end function
  static function one(): int
    return 1
  end function
  function later(): int
    return twice(x) + A.one()
  end function
end class
";
        assert_eq!(
            analyze(source),
            vec![
                "Call to method 'twice' before class is available",
                "Call to method 'one' before class is available",
            ]
        );
    }

    #[test]
    fn test_context_keywords() {
        assert_eq!(analyze("break\n"), vec!["Can't use 'break' outside of loop"]);
        assert_eq!(analyze("loop while true\n  continue\nend loop\n"), Vec::<String>::new());
        assert_eq!(analyze("return\n"), vec!["Cannot return from top-level code"]);
        assert_eq!(analyze("output this\n"), vec!["Cannot use 'this' outside of a method"]);
    }

    #[test]
    fn test_static_context() {
        let source = "\
class A
  count: int
  static function f()
    output this
    output count
  end function
  function A()
    count = 0
  end function
end class
";
        assert_eq!(
            analyze(source),
            vec![
                "Instance member 'this' cannot be used in a static context",
                "Use of instance variable from a static method",
            ]
        );
    }

    #[test]
    fn test_constructor_rules() {
        let source = "\
class A
  function A()
    return 1
  end function
  static function f()
  end function
end class
class B extends A
  function B()
    output 1
    super()
  end function
  function g()
    super()
  end function
end class
";
        assert_eq!(
            analyze(source),
            vec![
                "Cannot return a value from a constructor",
                "Call to 'super' must be first statement in constructor",
                "'super' cannot be called outside of a constructor",
            ]
        );
    }

    #[test]
    fn test_super_in_root_class() {
        let source = "\
class A
  function f()
    output super.x
  end function
end class
";
        assert_eq!(analyze(source), vec!["'super' cannot be referenced in a root class"]);
    }

    #[test]
    fn test_super_member() {
        let source = "\
class A
  x: int = 1
end class
class B extends A
  function f()
    output super.x
    output super.y
  end function
end class
";
        assert_eq!(analyze(source), vec!["Superclass 'A' has no member 'y'"]);
    }

    #[test]
    fn test_assignment_targets() {
        let source = "\
function f()
end function
class A
end class
f = 1
v = 1
v: int = 2
";
        assert_eq!(
            analyze(source),
            vec![
                "Cannot assign to value: 'f' is a function",
                "Cannot retype variable after first assignment",
            ]
        );
    }

    #[test]
    fn test_redeclarations() {
        let source = "\
function draw(x: int)
end function
function draw(y: int)
end function
function draw(x: double)
end function
class A
  n: int = 1
  n: int = 2
end class
class A
end class
";
        assert_eq!(
            analyze(source),
            vec![
                "Invalid redeclaration of 'A'",
                "Invalid redeclaration of 'n'",
                "Invalid redeclaration of 'draw(int)'",
            ]
        );
    }

    #[test]
    fn test_template_class_is_rejected() {
        assert_eq!(
            analyze("class Box<T>\n  value: T\nend class\n"),
            vec!["Template classes are not supported: 'Box'"]
        );
    }

    #[test]
    fn test_block_scopes() {
        let source = "\
if true then
  inner = 1
end if
output inner
";
        assert_eq!(analyze(source), vec!["Use of unknown identifier inner"]);
    }

    #[test]
    fn test_unknown_types() {
        let source = "\
class Box<T>
end class
b: Box<int> = 1
";
        assert_eq!(
            analyze(source),
            vec!["Template classes are not supported: 'Box'", "Cannot find type 'Box<int>' in scope"]
        );
    }
}
