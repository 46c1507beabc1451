//! Raw command access.
//!
//! Queries, statements and scripts that bypass change tracking and go
//! straight to the store. Stored procedures return rows that are attached to
//! the session's tracker.

use crate::attach::AttachmentManager;
use crate::error::{CoreError, CoreResult};
use std::time::Duration;
use tracing::{debug, warn};
use worksession_model::{Entity, FromRow, Value};
use worksession_store::{script, CommandOptions, DataStore};

/// Column that carries entity identity in procedure result rows.
pub const ID_COLUMN: &str = "id";

/// Direction of a stored-procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    /// Passed to the procedure.
    Input,
    /// Written by the procedure.
    Output,
    /// Passed in and written back.
    InputOutput,
    /// The procedure's return value. Cannot be bound positionally.
    ReturnValue,
}

/// A stored-procedure argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureArg {
    /// A plain input value.
    Value(Value),
    /// A parameter with an explicit direction.
    Parameter {
        /// Parameter value; ignored by the procedure for `Output`.
        value: Value,
        /// Parameter direction.
        direction: ParameterDirection,
    },
}

impl ProcedureArg {
    /// Creates an output parameter.
    #[must_use]
    pub fn output() -> Self {
        Self::Parameter {
            value: Value::Null,
            direction: ParameterDirection::Output,
        }
    }

    /// Creates an input/output parameter.
    pub fn input_output(value: impl Into<Value>) -> Self {
        Self::Parameter {
            value: value.into(),
            direction: ParameterDirection::InputOutput,
        }
    }

    fn value(&self) -> &Value {
        match self {
            Self::Value(value) | Self::Parameter { value, .. } => value,
        }
    }

    fn direction(&self) -> ParameterDirection {
        match self {
            Self::Value(_) => ParameterDirection::Input,
            Self::Parameter { direction, .. } => *direction,
        }
    }
}

impl From<Value> for ProcedureArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ProcedureArg {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(bool, i32, i64, String, Vec<u8>);

impl From<&str> for ProcedureArg {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

/// Renders a procedure call with positional markers.
///
/// `("usp_orders", [a, out, b])` renders as
/// `"usp_orders @p0, @p1 OUTPUT, @p2"`. Fails with
/// [`CoreError::UnsupportedParameter`] on the first argument with no scalar
/// representation or a return-value direction.
pub fn render_procedure_call(command: &str, args: &[ProcedureArg]) -> CoreResult<(String, Vec<Value>)> {
    let mut markers = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());

    for (position, arg) in args.iter().enumerate() {
        let value = arg.value();
        if !value.is_scalar() {
            return Err(CoreError::unsupported_parameter(
                position,
                format!("{} values cannot be bound", value.kind()),
            ));
        }
        let marker = match arg.direction() {
            ParameterDirection::Input => format!("@p{position}"),
            ParameterDirection::Output | ParameterDirection::InputOutput => {
                format!("@p{position} OUTPUT")
            }
            ParameterDirection::ReturnValue => {
                return Err(CoreError::unsupported_parameter(
                    position,
                    "return values cannot be bound positionally",
                ));
            }
        };
        markers.push(marker);
        values.push(value.clone());
    }

    let text = if markers.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", markers.join(", "))
    };
    Ok((text, values))
}

/// Restores the store's previous command timeout when dropped.
struct TimeoutGuard<'a> {
    store: &'a dyn DataStore,
    previous: Option<Duration>,
}

impl<'a> TimeoutGuard<'a> {
    fn set(store: &'a dyn DataStore, timeout: Duration) -> Self {
        let previous = store.command_timeout();
        store.set_command_timeout(Some(timeout));
        Self { store, previous }
    }
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        self.store.set_command_timeout(self.previous);
    }
}

/// Executes raw commands against a store.
pub struct RawExecutor<'a> {
    store: &'a dyn DataStore,
}

impl<'a> RawExecutor<'a> {
    /// Creates an executor over a store.
    #[must_use]
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// Runs a query and converts each row.
    pub fn query<T: FromRow>(&self, text: &str, params: &[Value]) -> CoreResult<Vec<T>> {
        let rows = self.store.query(text, params)?;
        debug!(rows = rows.len(), "raw query");
        rows.iter()
            .map(|row| T::from_row(row).map_err(CoreError::from))
            .collect()
    }

    /// Runs a statement, returning the number of affected rows.
    ///
    /// With `suppress_transaction` the store does not wrap the statement in
    /// its own transaction. A `timeout` applies to this statement only; the
    /// previous timeout is restored afterwards, also when the statement
    /// fails.
    pub fn execute_command(
        &self,
        text: &str,
        suppress_transaction: bool,
        timeout: Option<Duration>,
        params: &[Value],
    ) -> CoreResult<usize> {
        let _guard = timeout.map(|t| TimeoutGuard::set(self.store, t));
        let options = CommandOptions {
            transactional: !suppress_transaction,
        };
        Ok(self.store.execute(text, params, options)?)
    }

    /// Runs a script that may contain batch separator lines.
    ///
    /// The script goes through the store's batch-capable channel. If that
    /// fails, the separators are stripped and the script runs as a single
    /// non-transactional statement.
    pub fn execute_batch_script(&self, script_text: &str) -> CoreResult<()> {
        match self.store.execute_batch(script_text) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "batch channel failed, retrying with separators stripped");
                let stripped = script::strip_separators(script_text);
                self.execute_command(&stripped, true, None, &[])?;
                Ok(())
            }
        }
    }

    /// Calls a stored procedure and attaches the returned entities.
    ///
    /// Each result row becomes an entity of `entity_type`, identified by the
    /// [`ID_COLUMN`] column. Entities already tracked are returned as the
    /// tracked instance rather than the row's values.
    pub fn call_procedure(
        &self,
        attachments: &mut AttachmentManager<'_>,
        command: &str,
        entity_type: &str,
        args: &[ProcedureArg],
    ) -> CoreResult<Vec<Entity>> {
        let (text, values) = render_procedure_call(command, args)?;
        let rows = self.store.query(&text, &values)?;
        debug!(procedure = command, rows = rows.len(), "procedure call");

        rows.iter()
            .map(|row| {
                let entity = Entity::from_row(entity_type, row, ID_COLUMN)?;
                attachments.attach_or_reuse(entity)
            })
            .collect()
    }
}
