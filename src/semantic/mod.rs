//! Semantic Analysis for Quasicode
//!
//! Performs, in order:
//! - name resolution and the class hierarchy ([`resolver`], [`hierarchy`])
//! - type checking and overload selection ([`type_checker`])
//! - guaranteed returns and definite initialization ([`return_check`], [`init_check`])
//!
//! Every phase reports and keeps going, so one run collects all diagnostics.

pub mod symbol;
pub mod symbol_table;
pub mod union_find;
pub mod hierarchy;
pub mod resolver;
pub mod type_checker;
pub mod return_check;
pub mod init_check;

pub use symbol_table::{ScopeId, SymbolId, SymbolTable};

use crate::frontend::ast::Program;
use crate::stdlib::register_builtins;
use crate::utils::Error;
use resolver::{Resolution, Resolver};
use type_checker::TypeChecker;

/// Runs every semantic phase over one program
pub struct SemanticAnalyzer {
    table: SymbolTable,
    global_init_order: Vec<SymbolId>,
}

impl SemanticAnalyzer {
    /// A fresh analyzer with the builtin classes declared
    pub fn new() -> Self {
        let mut table = SymbolTable::new();
        register_builtins(&mut table);
        Self { table, global_init_order: Vec::new() }
    }

    /// Analyze `program` in place, filling its symbol, type and call-target
    /// slots. Returns the diagnostics of all phases in phase order.
    pub fn analyze(&mut self, program: &mut Program) -> Vec<Error> {
        let Resolution { global_init_order, mut errors } = Resolver::new(&mut self.table).resolve(program);
        errors.extend(TypeChecker::new(&mut self.table).check(program, &global_init_order));
        return_check::check_program(program, &self.table, &mut errors);
        init_check::check_program(program, &self.table, &mut errors);

        log::info!(
            "semantic analysis finished: {} symbols, {} diagnostics",
            self.table.symbols().len(),
            errors.len()
        );
        self.global_init_order = global_init_order;
        errors
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn into_table(self) -> SymbolTable {
        self.table
    }

    /// Globals in the order their initializers run
    pub fn global_init_order(&self) -> &[SymbolId] {
        &self.global_init_order
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::stdlib::BUILTIN_CLASS_NAMES;
    use pretty_assertions::assert_eq;

    /// Everything one run over a source string produced
    pub struct Analysis {
        pub program: Program,
        pub table: SymbolTable,
        pub errors: Vec<Error>,
        pub global_init_order: Vec<SymbolId>,
    }

    pub fn analyze_program(source: &str) -> Analysis {
        let (tokens, mut errors) = Lexer::new(source, 0).tokenize();
        let (mut program, parse_errors) = Parser::new(tokens, BUILTIN_CLASS_NAMES).parse_program();
        errors.extend(parse_errors);

        let mut analyzer = SemanticAnalyzer::new();
        errors.extend(analyzer.analyze(&mut program));
        let global_init_order = analyzer.global_init_order().to_vec();
        Analysis { program, table: analyzer.into_table(), errors, global_init_order }
    }

    /// Diagnostic messages of a full run
    pub fn analyze(source: &str) -> Vec<String> {
        analyze_program(source).errors.iter().map(|err| err.to_string()).collect()
    }

    #[test]
    fn test_well_formed_program() {
        let source = "\
class Account
  private balance: double
  static count: int = 0
  function Account(initial: double)
    balance = initial
    count = count + 1
  end function
  function deposit(amount: double)
    if amount <= 0 then
      return
    end if
    balance = balance + amount
  end function
  function getBalance(): double
    return balance
  end function
end class
class Savings extends Account
  rate: double = 0.05
  function Savings(initial: double)
    super(initial)
  end function
  function getBalance(): double
    return super.getBalance() * (1 + rate)
  end function
end class
accounts = new Account[2]
accounts[0] = new Account(10)
accounts[1] = new Savings(20.5)
total = 0.0
loop i from 0 to 1
  accounts[i].deposit(5)
  total = total + accounts[i].getBalance()
end loop
output \"total: \" + String.valueOf(total)
";
        let analysis = analyze_program(source);
        assert!(analysis.errors.is_empty(), "{:?}", analysis.errors);

        let names: Vec<&str> =
            analysis.global_init_order.iter().map(|id| analysis.table.get(*id).name.as_str()).collect();
        assert_eq!(names, vec!["accounts", "total"]);
    }

    #[test]
    fn test_mutually_referencing_globals() {
        assert_eq!(analyze("x = y + 1\ny = x + 1\n"), vec!["Circular reference", "Circular reference"]);
    }

    #[test]
    fn test_diagnostics_from_every_phase() {
        let source = "\
class A
  function f(): int
  end function
end class
output undefined
x: int = true
";
        assert_eq!(
            analyze(source),
            vec![
                "Use of unknown identifier undefined",
                "Type 'boolean' cannot be cast to 'int'",
                "Missing return in function expected to return 'int'",
            ]
        );
    }

    #[test]
    fn test_builtins_are_declared_before_user_code() {
        let analyzer = SemanticAnalyzer::new();
        let string = analyzer.table().lookup_root("String<>").unwrap();
        assert!(analyzer.table().get(string).as_class().unwrap().builtin);
        assert!(analyzer.global_init_order().is_empty());
    }
}
