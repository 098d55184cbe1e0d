use std::fmt;

use crate::adapter::Adapter;

// ------------- Operators -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl ComparisonOperator {
    /// Operators whose right hand side is not a single literal.
    pub fn takes_literal(self) -> bool {
        !matches!(
            self,
            ComparisonOperator::In
                | ComparisonOperator::NotIn
                | ComparisonOperator::IsNull
                | ComparisonOperator::IsNotNull
        )
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sql = match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::NotLike => "NOT LIKE",
            ComparisonOperator::In => "IN",
            ComparisonOperator::NotIn => "NOT IN",
            ComparisonOperator::IsNull => "IS NULL",
            ComparisonOperator::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{}", sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    Asc,
    Desc,
}

impl fmt::Display for Indexing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Indexing::Asc => write!(f, "ASC"),
            Indexing::Desc => write!(f, "DESC"),
        }
    }
}

/// Right hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Placeholder,
    Named(String),
    /// `(?, ?, ...)` for `IN` lists
    Placeholders(usize),
    /// escaped as a string literal unless it is a placeholder token
    Literal(String),
    None,
}

#[derive(Debug, Clone)]
struct Condition {
    column: String,
    operator: ComparisonOperator,
    operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    Select,
    Count,
    Delete,
}

// ------------- Query -------------
/// Builds the select, count and delete commands models issue. Identifiers
/// and literals go through the adapter's escaping when the command is
/// rendered. Conditions are AND-joined, a group added through
/// [`Query::where_any`] is OR-joined inside parentheses.
#[derive(Debug, Clone)]
pub struct Query {
    statement: Statement,
    table: String,
    conditions: Vec<Vec<Condition>>,
    order: Vec<(String, Indexing)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    fn new(statement: Statement, table: &str) -> Self {
        Self {
            statement,
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
    pub fn select(table: &str) -> Self {
        Self::new(Statement::Select, table)
    }
    pub fn count(table: &str) -> Self {
        Self::new(Statement::Count, table)
    }
    pub fn delete(table: &str) -> Self {
        Self::new(Statement::Delete, table)
    }
    pub fn where_condition(
        mut self,
        column: &str,
        operator: ComparisonOperator,
        operand: Operand,
    ) -> Self {
        self.conditions.push(vec![Condition {
            column: column.to_string(),
            operator,
            operand,
        }]);
        self
    }
    /// Adds one parenthesized group of OR-joined conditions. An empty group
    /// is ignored.
    pub fn where_any(mut self, conditions: &[(&str, ComparisonOperator, Operand)]) -> Self {
        if !conditions.is_empty() {
            self.conditions.push(
                conditions
                    .iter()
                    .map(|(column, operator, operand)| Condition {
                        column: column.to_string(),
                        operator: *operator,
                        operand: operand.clone(),
                    })
                    .collect(),
            );
        }
        self
    }
    pub fn order_by(mut self, column: &str, indexing: Indexing) -> Self {
        self.order.push((column.to_string(), indexing));
        self
    }
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the command text.
    pub fn command(&self, adapter: &Adapter) -> String {
        let table = adapter.escape_identifier(&self.table);
        let mut command = match self.statement {
            Statement::Select => format!("SELECT * FROM {}", table),
            Statement::Count => format!("SELECT COUNT(*) AS _numrows FROM {}", table),
            Statement::Delete => format!("DELETE FROM {}", table),
        };
        if !self.conditions.is_empty() {
            let groups: Vec<String> = self
                .conditions
                .iter()
                .map(|group| {
                    let rendered: Vec<String> = group
                        .iter()
                        .map(|condition| render_condition(adapter, condition))
                        .collect();
                    if rendered.len() > 1 {
                        format!("({})", rendered.join(" OR "))
                    } else {
                        rendered.join("")
                    }
                })
                .collect();
            command.push_str(" WHERE ");
            command.push_str(&groups.join(" AND "));
        }
        if self.statement == Statement::Select {
            if !self.order.is_empty() {
                let order: Vec<String> = self
                    .order
                    .iter()
                    .map(|(column, indexing)| {
                        format!("{} {}", adapter.escape_identifier(column), indexing)
                    })
                    .collect();
                command.push_str(" ORDER BY ");
                command.push_str(&order.join(", "));
            }
            match (self.limit, self.offset) {
                (Some(limit), Some(offset)) => {
                    command.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
                }
                (Some(limit), None) => command.push_str(&format!(" LIMIT {}", limit)),
                // SQLite only accepts an offset after a limit
                (None, Some(offset)) => command.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                (None, None) => {}
            }
        }
        command
    }
}

fn render_condition(adapter: &Adapter, condition: &Condition) -> String {
    let column = adapter.escape_identifier(&condition.column);
    let operand = match &condition.operand {
        Operand::Placeholder => String::from("?"),
        Operand::Named(name) => {
            if name.starts_with([':', '@', '$']) {
                name.clone()
            } else {
                format!(":{}", name)
            }
        }
        Operand::Placeholders(count) => {
            format!("({})", vec!["?"; (*count).max(1)].join(", "))
        }
        Operand::Literal(text) => adapter.escape_value(text, condition.operator),
        Operand::None => String::new(),
    };
    if operand.is_empty() {
        format!("{} {}", column, condition.operator)
    } else {
        format!("{} {} {}", column, condition.operator, operand)
    }
}
