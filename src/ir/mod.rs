//! The whole-program IR. One statement and expression node set is shared by
//! all three levels; `Program::level` records how far lowering has gotten.
//! At the AST level control flow is structured (`If`, `While`) and
//! expressions nest arbitrarily. HIR lowering flattens expressions to
//! three-address form with compiler temporaries. MIR lowering replaces
//! structured control flow with labels, gotos, and branches.

use crate::{index::simple_index, intern::InternedSymbol};

pub mod check;
pub mod lowering;
pub mod pretty_print;

simple_index! {
    /// Identifies a jump target within one function body
    pub struct LabelId;
}

impl core::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum IrLevel {
    #[strum(serialize = "ast")]
    Ast,
    #[strum(serialize = "hir")]
    Hir,
    #[strum(serialize = "mir")]
    Mir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub level: IrLevel,
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new_ast(statements: Vec<Statement>) -> Self {
        Self {
            level: IrLevel::Ast,
            statements,
        }
    }

    pub fn is_ast(&self) -> bool {
        self.level == IrLevel::Ast
    }

    pub fn is_hir(&self) -> bool {
        self.level == IrLevel::Hir
    }

    pub fn is_mir(&self) -> bool {
        self.level == IrLevel::Mir
    }
}

/// A storage location. Outside of SSA form `version` is `None`; SSA
/// construction assigns a version per static definition, and a versioned
/// variable is the renaming unit every SSA operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable {
    pub symbol: InternedSymbol,
    pub version: Option<u32>,
}

impl Variable {
    pub fn new(symbol: InternedSymbol) -> Self {
        Self {
            symbol,
            version: None,
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(InternedSymbol::new(name))
    }

    pub fn versioned(symbol: InternedSymbol, version: u32) -> Self {
        Self {
            symbol,
            version: Some(version),
        }
    }

    /// The unversioned variable this version belongs to.
    pub fn base(self) -> Self {
        Self::new(self.symbol)
    }
}

impl core::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}.{}", self.symbol, version),
            None => write!(f, "{}", self.symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Top-level only. The optimization driver treats function bodies as the
    /// unit of work; everything else passes through untouched.
    Function {
        name: InternedSymbol,
        parameters: Vec<InternedSymbol>,
        body: Vec<Statement>,
    },
    Assign {
        target: Variable,
        value: Expr,
    },
    Print(Expr),
    Return(Option<Expr>),
    /// Expression evaluated for its side effects (usually a call)
    Expr(Expr),

    // Structured control flow, AST and HIR levels only
    If {
        condition: Expr,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },

    // Flat control flow, MIR level only
    Label(LabelId),
    Goto(LabelId),
    Branch {
        condition: Expr,
        positive: LabelId,
        negative: LabelId,
    },
}

impl Statement {
    pub fn is_flat_control(&self) -> bool {
        matches!(
            self,
            Statement::Label(_) | Statement::Goto(_) | Statement::Branch { .. }
        )
    }

    pub fn is_structured_control(&self) -> bool {
        matches!(self, Statement::If { .. } | Statement::While { .. })
    }

    /// Whether evaluating this statement may call into user code. Calls in a
    /// dynamic language can write and read any variable in scope, which is
    /// what the chi operands in SSA form model.
    pub fn contains_call(&self) -> bool {
        match self {
            Statement::Assign { value, .. } => value.contains_call(),
            Statement::Print(value) | Statement::Expr(value) => value.contains_call(),
            Statement::Return(Some(value)) => value.contains_call(),
            Statement::If { condition, .. } | Statement::While { condition, .. } => {
                condition.contains_call()
            }
            Statement::Branch { condition, .. } => condition.contains_call(),
            _ => false,
        }
    }

    /// Visits every variable read by this statement, not descending into
    /// nested bodies.
    pub fn for_each_used_var(&self, f: &mut impl FnMut(&Variable)) {
        match self {
            Statement::Assign { value, .. } => value.for_each_var(f),
            Statement::Print(value) | Statement::Expr(value) => value.for_each_var(f),
            Statement::Return(Some(value)) => value.for_each_var(f),
            Statement::If { condition, .. }
            | Statement::While { condition, .. }
            | Statement::Branch { condition, .. } => condition.for_each_var(f),
            _ => {}
        }
    }

    pub fn for_each_used_var_mut(&mut self, f: &mut impl FnMut(&mut Variable)) {
        match self {
            Statement::Assign { value, .. } => value.for_each_var_mut(f),
            Statement::Print(value) | Statement::Expr(value) => value.for_each_var_mut(f),
            Statement::Return(Some(value)) => value.for_each_var_mut(f),
            Statement::If { condition, .. }
            | Statement::While { condition, .. }
            | Statement::Branch { condition, .. } => condition.for_each_var_mut(f),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(Variable),
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: InternedSymbol,
        arguments: Vec<Expr>,
    },
}

impl Expr {
    pub fn literal_int(value: i64) -> Self {
        Expr::Literal(Value::Int(value))
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(Variable::named(name))
    }

    /// Whether this is an operand (a literal or a variable). HIR flattening
    /// guarantees that all operator and call arguments are simple.
    pub fn is_simple(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Var(_))
    }

    pub fn contains_call(&self) -> bool {
        match self {
            Expr::Call { .. } => true,
            Expr::Unary { operand, .. } => operand.contains_call(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_call() || rhs.contains_call(),
            Expr::Literal(_) | Expr::Var(_) => false,
        }
    }

    pub fn for_each_var(&self, f: &mut impl FnMut(&Variable)) {
        match self {
            Expr::Var(var) => f(var),
            Expr::Unary { operand, .. } => operand.for_each_var(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_var(f);
                rhs.for_each_var(f);
            }
            Expr::Call { arguments, .. } => {
                for argument in arguments {
                    argument.for_each_var(f);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    pub fn for_each_var_mut(&mut self, f: &mut impl FnMut(&mut Variable)) {
        match self {
            Expr::Var(var) => f(var),
            Expr::Unary { operand, .. } => operand.for_each_var_mut(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_var_mut(f);
                rhs.for_each_var_mut(f);
            }
            Expr::Call { arguments, .. } => {
                for argument in arguments {
                    argument.for_each_var_mut(f);
                }
            }
            Expr::Literal(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
}
