//! The relational adapter.
//!
//! An [`Adapter`] owns at most one SQLite connection. It is created
//! unconnected, connected once and explicitly closed; after closing every
//! operation returns its soft sentinel (`None`, `false` or `-1`) and the
//! adapter cannot be reconnected. The adapter renders nothing on its own:
//! callers hand it command text plus [`Bindings`], it binds, executes and
//! wraps rows into a [`ResultSet`].

// used for persistence
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;

// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
use regex::Regex;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::datatype::{DataType, Value};
use crate::error::{Result, SismaError};
use crate::query::ComparisonOperator;
use crate::result_set::ResultSet;
use crate::settings::ConnectionOptions;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"^(\?[0-9]*|[:@$]?[A-Za-z_][A-Za-z0-9_]*)$").unwrap();
    static ref NUMERIC: Regex = Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap();
}

const CHARSETS: [&str; 4] = ["UTF-8", "UTF-16", "UTF-16le", "UTF-16be"];

// ------------- Bindings -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindKey {
    Position(usize),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub key: BindKey,
    pub value: Value,
    /// `None` is treated as [`DataType::Generic`].
    pub data_type: Option<DataType>,
}

/// The parameters of one command. Positional keys may start at 0, in which
/// case all positional keys are shifted up by one when bound.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    bindings: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }
    /// Appends a positional value keyed by its zero-based position.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        let position = self.next_position();
        self.bindings.push(Binding {
            key: BindKey::Position(position),
            value: value.into(),
            data_type: None,
        });
        self
    }
    pub fn push_typed(&mut self, value: impl Into<Value>, data_type: DataType) -> &mut Self {
        let position = self.next_position();
        self.bindings.push(Binding {
            key: BindKey::Position(position),
            value: value.into(),
            data_type: Some(data_type),
        });
        self
    }
    pub fn at(&mut self, position: usize, value: impl Into<Value>) -> &mut Self {
        self.bindings.push(Binding {
            key: BindKey::Position(position),
            value: value.into(),
            data_type: None,
        });
        self
    }
    pub fn named(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.bindings.push(Binding {
            key: BindKey::Name(name.to_string()),
            value: value.into(),
            data_type: None,
        });
        self
    }
    pub fn insert(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }
    fn next_position(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| matches!(b.key, BindKey::Position(_)))
            .count()
    }
    fn zero_based(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| b.key == BindKey::Position(0))
    }
    /// The keys as they reach the driver.
    pub fn normalized_keys(&self) -> Vec<BindKey> {
        let shift = self.zero_based();
        self.bindings
            .iter()
            .map(|b| normalize(&b.key, shift))
            .collect()
    }
    /// Normalized keys with their values converted to the driver parameter
    /// kind of their (resolved) data type.
    pub fn resolve(&self) -> Result<Vec<(BindKey, SqlValue)>> {
        let shift = self.zero_based();
        self.bindings
            .iter()
            .map(|b| {
                let data_type = b.data_type.unwrap_or(DataType::Generic).resolve(&b.value);
                let value = b.value.to_sql_value(data_type.param_kind())?;
                Ok((normalize(&b.key, shift), value))
            })
            .collect()
    }
}

fn normalize(key: &BindKey, shift: bool) -> BindKey {
    match key {
        BindKey::Position(position) if shift => BindKey::Position(position + 1),
        other => other.clone(),
    }
}

// ------------- Adapter -------------
#[derive(Debug, Default)]
pub struct Adapter {
    connection: RefCell<Option<Connection>>,
    closed: Cell<bool>,
}

impl Adapter {
    /// An unconnected adapter.
    pub fn new() -> Self {
        Self::default()
    }
    pub fn connect(&self, options: &ConnectionOptions) -> Result<()> {
        if self.closed.get() {
            return Err(SismaError::InvalidArgument(String::from(
                "the adapter was closed and cannot be reconnected",
            )));
        }
        if self.is_connected() {
            return Ok(());
        }
        let charset = normalize_charset(&options.charset)?;
        info!(
            hostname = %options.hostname,
            port = options.port,
            username = %options.username,
            database = %options.database,
            "connecting"
        );
        let command = format!("open {}", options.database);
        let connection =
            Connection::open(&options.database).map_err(|e| SismaError::adapter(&e, &command))?;
        connection
            .pragma_update(None, "encoding", charset)
            .map_err(|e| SismaError::adapter(&e, "PRAGMA encoding"))?;
        connection
            .pragma_update(None, "foreign_keys", true)
            .map_err(|e| SismaError::adapter(&e, "PRAGMA foreign_keys"))?;
        *self.connection.borrow_mut() = Some(connection);
        Ok(())
    }
    pub fn is_connected(&self) -> bool {
        self.connection.borrow().is_some()
    }
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
    pub fn close(&self) -> Result<()> {
        self.closed.set(true);
        let Some(connection) = self.connection.borrow_mut().take() else {
            return Ok(());
        };
        info!("closing connection");
        connection.close().map_err(|(_, e)| {
            warn!(error = %e, "closing failed");
            SismaError::adapter(&e, "close")
        })
    }

    /// Runs a select. `Ok(None)` without a connection.
    pub fn select(&self, command: &str, bindings: &Bindings) -> Result<Option<ResultSet>> {
        let guard = self.connection.borrow();
        let Some(connection) = guard.as_ref() else {
            return Ok(None);
        };
        debug!(command, binds = bindings.len(), "select");
        let fail = |e: rusqlite::Error| {
            warn!(error = %e, command, "select failed");
            SismaError::adapter(&e, command)
        };
        let mut statement = connection.prepare(command).map_err(fail)?;
        bind(&mut statement, command, bindings)?;
        let columns: Rc<[String]> = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();
        let mut buffered = Vec::new();
        let mut rows = statement.raw_query();
        while let Some(row) = rows.next().map_err(fail)? {
            let values = (0..width)
                .map(|index| row.get::<_, SqlValue>(index))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(fail)?;
            buffered.push(values);
        }
        Ok(Some(ResultSet::new(columns, buffered)))
    }

    /// Runs a command that returns no rows. `Ok(false)` without a connection.
    pub fn execute(&self, command: &str, bindings: &Bindings) -> Result<bool> {
        let guard = self.connection.borrow();
        let Some(connection) = guard.as_ref() else {
            return Ok(false);
        };
        debug!(command, binds = bindings.len(), "execute");
        let fail = |e: rusqlite::Error| {
            warn!(error = %e, command, "execute failed");
            SismaError::adapter(&e, command)
        };
        let mut statement = connection.prepare(command).map_err(fail)?;
        bind(&mut statement, command, bindings)?;
        statement.raw_execute().map_err(fail)?;
        Ok(true)
    }

    /// Runs several unparameterized statements, typically schema setup.
    pub fn execute_batch(&self, commands: &str) -> Result<bool> {
        let guard = self.connection.borrow();
        let Some(connection) = guard.as_ref() else {
            return Ok(false);
        };
        debug!(commands, "execute batch");
        connection.execute_batch(commands).map_err(|e| {
            warn!(error = %e, "batch failed");
            SismaError::adapter(&e, commands)
        })?;
        Ok(true)
    }

    /// Double quotes each dot separated segment. Numbers and `*` are kept.
    pub fn escape_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|segment| {
                if segment == "*" || NUMERIC.is_match(segment) {
                    segment.to_string()
                } else {
                    format!("\"{}\"", segment.replace('"', "\"\""))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a literal operand for `operator`. Placeholder tokens (`?`, `?3`,
    /// `:name`, bare `name`) pass through and operators without a single
    /// literal operand are left alone.
    pub fn escape_value(&self, value: &str, operator: ComparisonOperator) -> String {
        if !operator.takes_literal() {
            return value.to_string();
        }
        let value = value.replace('\0', "");
        if PLACEHOLDER.is_match(&value) {
            value
        } else {
            format!("'{}'", value.replace('\'', "''"))
        }
    }

    // ------------- Transactions -------------
    pub fn in_transaction(&self) -> bool {
        self.connection
            .borrow()
            .as_ref()
            .is_some_and(|connection| !connection.is_autocommit())
    }
    pub fn begin_transaction(&self) -> Result<bool> {
        if !self.is_connected() {
            return Ok(false);
        }
        if self.in_transaction() {
            warn!("a transaction is already active, nested transactions are not supported");
            return Ok(false);
        }
        info!("begin transaction");
        self.run("BEGIN")
    }
    pub fn commit_transaction(&self) -> Result<bool> {
        if !self.in_transaction() {
            return Ok(false);
        }
        info!("commit transaction");
        self.run("COMMIT")
    }
    pub fn rollback_transaction(&self) -> Result<bool> {
        if !self.in_transaction() {
            return Ok(false);
        }
        info!("rollback transaction");
        self.run("ROLLBACK")
    }
    fn run(&self, command: &str) -> Result<bool> {
        let guard = self.connection.borrow();
        let Some(connection) = guard.as_ref() else {
            return Ok(false);
        };
        connection.execute_batch(command).map_err(|e| {
            warn!(error = %e, command, "transaction command failed");
            SismaError::adapter(&e, command)
        })?;
        Ok(true)
    }

    /// Row id of the most recent insert, `-1` without a connection.
    pub fn last_insert_id(&self) -> i64 {
        self.connection
            .borrow()
            .as_ref()
            .map_or(-1, Connection::last_insert_rowid)
    }
}

fn normalize_charset(charset: &str) -> Result<&'static str> {
    let wanted = charset.replace('_', "-");
    let wanted = if wanted.eq_ignore_ascii_case("utf8") { "UTF-8" } else { wanted.as_str() };
    CHARSETS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| SismaError::Config(format!("unsupported charset '{}'", charset)))
}

fn bind(statement: &mut rusqlite::Statement<'_>, command: &str, bindings: &Bindings) -> Result<()> {
    for (key, value) in bindings.resolve()? {
        let index = match key {
            BindKey::Position(position) => position,
            BindKey::Name(name) => {
                let name = if name.starts_with([':', '@', '$']) {
                    name
                } else {
                    format!(":{}", name)
                };
                statement
                    .parameter_index(&name)
                    .map_err(|e| SismaError::adapter(&e, command))?
                    .ok_or_else(|| {
                        SismaError::InvalidArgument(format!(
                            "the command has no parameter {}",
                            name
                        ))
                    })?
            }
        };
        statement
            .raw_bind_parameter(index, value)
            .map_err(|e| SismaError::adapter(&e, command))?;
    }
    Ok(())
}
