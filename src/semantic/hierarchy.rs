//! Class hierarchy construction
//!
//! Links every class to its superclass, rejects inheritance cycles with a
//! union-find over class runtime ids, fills in depths and records which
//! methods override which.

use super::symbol_table::{SymbolId, SymbolTable};
use super::union_find::UnionFind;
use crate::utils::{Error, Span};
use std::collections::HashMap;

/// A declared `extends` relation
#[derive(Debug, Clone)]
pub struct ClassEdge {
    pub class: SymbolId,
    /// `None` for root classes and unresolvable superclasses
    pub superclass: Option<SymbolId>,
    /// Name of the declaring class, for diagnostics
    pub span: Span,
}

pub struct HierarchyBuilder<'a> {
    table: &'a mut SymbolTable,
    errors: &'a mut Vec<Error>,
    /// Signature to method id, one map per ancestor level
    method_chain: Vec<HashMap<String, SymbolId>>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(table: &'a mut SymbolTable, errors: &'a mut Vec<Error>) -> Self {
        Self { table, errors, method_chain: Vec::new() }
    }

    /// Build the hierarchy for `edges`, given in declaration order
    pub fn build(mut self, edges: &[ClassEdge]) {
        let count = self.table.class_count();
        // Runtime ids start at 1; the last slot clusters every root class
        let mut clusters = UnionFind::new(count + 2);
        let any_cluster = count + 1;
        let mut roots = Vec::new();

        for edge in edges {
            let class_rid = self.runtime_id(edge.class);
            let Some(superclass) = edge.superclass else {
                clusters.unite(any_cluster, class_rid);
                roots.push(edge.class);
                continue;
            };

            let super_rid = self.runtime_id(superclass);
            if !clusters.unite(super_rid, class_rid) {
                let name = self.display_name(edge.class);
                self.errors.push(Error::InheritsFromItself { name, span: edge.span });
                roots.push(edge.class);
                continue;
            }

            let super_scope = match self.table.get_mut(superclass).as_class_mut() {
                Some(info) => {
                    info.parent_of.push(edge.class);
                    info.class_scope
                }
                None => continue,
            };
            if let Some(info) = self.table.get_mut(edge.class).as_class_mut() {
                info.upper_class = Some(superclass);
                let scope = info.class_scope;
                self.table.link_scope_to_parent(scope, super_scope);
            }
        }

        let mut max_depth = 0;
        for &root in &roots {
            max_depth = max_depth.max(self.fill_depth(root, 1));
        }
        log::debug!("class hierarchy: {} classes, {} roots, max depth {}", count, roots.len(), max_depth);

        for &root in &roots {
            self.compute_overrides(root);
        }
    }

    fn runtime_id(&self, class: SymbolId) -> usize {
        let info = self.table.get(class).as_class();
        debug_assert!(info.is_some(), "hierarchy edge on a non-class symbol");
        info.map_or(0, |info| info.runtime_id)
    }

    fn display_name(&self, class: SymbolId) -> String {
        self.table.get(class).as_class().map(|info| info.display_name.clone()).unwrap_or_default()
    }

    /// Returns the deepest depth in the subtree
    fn fill_depth(&mut self, class: SymbolId, depth: usize) -> usize {
        let children = match self.table.get_mut(class).as_class_mut() {
            Some(info) => {
                info.depth = Some(depth);
                info.parent_of.clone()
            }
            None => return depth,
        };
        children.into_iter().map(|child| self.fill_depth(child, depth + 1)).fold(depth, usize::max)
    }

    fn find_in_chain(&self, signature: &str) -> Option<SymbolId> {
        self.method_chain.iter().rev().find_map(|level| level.get(signature).copied())
    }

    /// Check the methods of `class` against its ancestors and recurse into
    /// subclasses. Returns, per signature not introduced by `class`, every
    /// overriding method found in this subtree.
    fn compute_overrides(&mut self, class: SymbolId) -> HashMap<String, Vec<SymbolId>> {
        let (methods, children) = match self.table.get(class).as_class() {
            Some(info) => (info.methods.clone(), info.parent_of.clone()),
            None => return HashMap::new(),
        };

        let mut own: HashMap<String, SymbolId> = HashMap::new();
        let mut introduced: HashMap<String, SymbolId> = HashMap::new();
        let mut overrides: HashMap<String, Vec<SymbolId>> = HashMap::new();

        for method_id in methods {
            let symbol = self.table.get(method_id);
            let Some(method) = symbol.as_method() else {
                continue;
            };
            if method.is_constructor {
                continue;
            }
            let signature = symbol.name.clone();
            own.insert(signature.clone(), method_id);

            let Some(ancestor_id) = self.find_in_chain(&signature) else {
                introduced.insert(signature, method_id);
                continue;
            };
            if let Some(ancestor) = self.table.get(ancestor_id).as_method() {
                if ancestor.is_static != method.is_static {
                    let span = method.spans.static_keyword.unwrap_or(method.spans.name);
                    self.errors.push(Error::OverrideStaticMismatch { span });
                }
                if ancestor.function.return_type != method.function.return_type {
                    let span = method.spans.annotation.unwrap_or(method.spans.name);
                    self.errors.push(Error::OverrideReturnMismatch { span });
                }
            }
            overrides.entry(signature).or_default().push(method_id);
        }

        self.method_chain.push(introduced.clone());
        for child in children {
            for (signature, ids) in self.compute_overrides(child) {
                if let Some(&mine) = own.get(&signature) {
                    if let Some(method) = self.table.get_mut(mine).as_method_mut() {
                        method.overrided_by.extend(ids.iter().copied());
                    }
                }
                if !introduced.contains_key(&signature) {
                    overrides.entry(signature).or_default().extend(ids);
                }
            }
        }
        self.method_chain.pop();

        overrides
    }
}

#[cfg(test)]
mod tests {
    use crate::semantic::tests::analyze_program;
    use crate::semantic::SymbolId;
    use pretty_assertions::assert_eq;

    fn class_depth(source: &str, name: &str) -> Option<usize> {
        let analysis = analyze_program(source);
        let id = analysis.table.lookup_root(&format!("{}<>", name))?;
        analysis.table.get(id).as_class()?.depth
    }

    #[test]
    fn test_depths_follow_parent_edges() {
        let source = "\
class C extends B
end class
class A
end class
class B extends A
end class
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        assert_eq!(class_depth(source, "A"), Some(1));
        assert_eq!(class_depth(source, "B"), Some(2));
        assert_eq!(class_depth(source, "C"), Some(3));
        assert_eq!(class_depth(source, "String"), Some(1));
    }

    #[test]
    fn test_cycle_reports_once_and_keeps_depths() {
        let source = "\
class A extends B
end class
class B extends A
end class
class C extends A
end class
class D
end class
";
        let analysis = analyze_program(source);
        let messages: Vec<String> = analysis.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["'B' inherits from itself"]);
        assert_eq!(class_depth(source, "B"), Some(1));
        assert_eq!(class_depth(source, "A"), Some(2));
        assert_eq!(class_depth(source, "C"), Some(3));
        assert_eq!(class_depth(source, "D"), Some(1));
    }

    #[test]
    fn test_self_inheritance() {
        let analysis = analyze_program("class A extends A\nend class\n");
        let messages: Vec<String> = analysis.errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["'A' inherits from itself"]);
    }

    #[test]
    fn test_overrides_are_transitive() {
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
class Puppy extends Dog
  function speak(): any
    return 3
  end function
end class
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);
        let speak_of = |class: &str| -> (SymbolId, Vec<SymbolId>) {
            let class_id = analysis.table.lookup_root(&format!("{}<>", class)).unwrap();
            let scope = analysis.table.get(class_id).as_class().unwrap().class_scope;
            let id = analysis.table.lookup_local(scope, "speak()").unwrap();
            let mut overrided_by = analysis.table.get(id).as_method().unwrap().overrided_by.clone();
            overrided_by.sort();
            (id, overrided_by)
        };
        let (_, animal) = speak_of("Animal");
        let (dog_id, dog) = speak_of("Dog");
        let (puppy_id, puppy) = speak_of("Puppy");
        let mut expected = vec![dog_id, puppy_id];
        expected.sort();
        assert_eq!(animal, expected);
        assert_eq!(dog, vec![puppy_id]);
        assert!(puppy.is_empty());
    }

    #[test]
    fn test_override_mismatches() {
        let source = "\
class A
  function f(): int
    return 1
  end function
  function g()
  end function
end class
class B extends A
  function f(): double
    return 1.0
  end function
  static function g()
  end function
end class
";
        let messages: Vec<String> = analyze_program(source).errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec!["Return type does not match for overriding method", "Static does not match for overriding method"]
        );
    }
}
