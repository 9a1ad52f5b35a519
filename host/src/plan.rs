//! The compiled-plan IR the execution layer consumes. The statement
//! compiler lowers SQL text into these operator intents; the executor
//! turns them into common steps or dataflow graphs.

use cascade_lib::field_type::FieldType;
use cascade_lib::value::Value;

/// A scalar expression in a statement: a literal, a named placeholder, a
/// column reference or a single-argument scalar function call.
#[derive(Debug, Clone)]
pub enum ScalarExpr {
    Literal(Value),
    Placeholder(String),
    Column(String),
    FunctionCall {
        function: String,
        argument: Box<ScalarExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One conjunct of a WHERE clause: `column op expr`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: ScalarExpr,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub field_type: FieldType,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level PRIMARY KEY clause; empty when declared inline.
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub table: String,
    /// Explicit column list; empty means full declared order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarExpr>>,
    /// INSERT OR REPLACE semantics: existing rows are overwritten.
    pub upsert: bool,
}

/// One output column of a query.
#[derive(Debug, Clone)]
pub enum Projection {
    /// All declared columns in order.
    Star,
    Column(String),
    Scalar {
        function: String,
        column: String,
    },
    Aggregate {
        function: String,
        /// `None` for COUNT(*).
        argument: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub table: String,
    pub projections: Vec<Projection>,
    pub filter: Vec<Condition>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderKey>,
}

impl Query {
    pub fn has_aggregates(&self) -> bool {
        self.projections
            .iter()
            .any(|p| matches!(p, Projection::Aggregate { .. }))
    }
}

/// A compiled statement.
#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable(CreateTable),
    CreateIndex(CreateIndex),
    DropTable { name: String },
    Insert(Insert),
    Query(Query),
}

impl Statement {
    /// Whether the statement changes definitions (DDL).
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Statement::CreateTable(_) | Statement::CreateIndex(_) | Statement::DropTable { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::CreateTable(_) => "create_table",
            Statement::CreateIndex(_) => "create_index",
            Statement::DropTable { .. } => "drop_table",
            Statement::Insert(_) => "insert",
            Statement::Query(_) => "query",
        }
    }
}
