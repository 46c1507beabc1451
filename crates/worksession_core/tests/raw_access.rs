//! Raw queries, statements, scripts and stored procedures.

use std::time::Duration;
use worksession_core::{
    CoreError, DataStore, EntityId, EntityState, FromRow, ProcedureArg, Row, Value,
};
use worksession_model::ModelResult;
use worksession_store::{CommandKind, StoreError};
use worksession_testkit::prelude::*;

#[derive(Debug, PartialEq)]
struct OrderSummary {
    status: String,
    count: i64,
}

impl FromRow for OrderSummary {
    fn from_row(row: &Row) -> ModelResult<Self> {
        Ok(Self {
            status: row.get_text("status")?.to_string(),
            count: row.get_i64("count")?,
        })
    }
}

#[test]
fn query_converts_rows() {
    let t = TestSession::memory();
    t.store.register_query(
        "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
        vec![
            Row::new().with("status", "open").with("count", 3),
            Row::new().with("status", "shipped").with("count", 7),
        ],
    );

    let summaries: Vec<OrderSummary> = t
        .query(
            "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
            &[],
        )
        .unwrap();
    assert_eq!(
        summaries,
        vec![
            OrderSummary {
                status: "open".into(),
                count: 3
            },
            OrderSummary {
                status: "shipped".into(),
                count: 7
            },
        ]
    );
}

#[test]
fn query_reports_row_conversion_errors() {
    let t = TestSession::memory();
    t.store
        .register_query("SELECT status FROM orders", vec![Row::new().with("status", "open")]);

    let err = t
        .query::<OrderSummary>("SELECT status FROM orders", &[])
        .unwrap_err();
    assert!(matches!(err, CoreError::Model(_)));
}

#[test]
fn procedure_call_renders_markers_and_attaches() {
    let mut t = TestSession::memory();
    let tracked = t.seed(order(1, 10));
    t.entity_mut(&tracked).unwrap().set("total", 11);
    assert!(t.has_pending_changes());

    let fresh = EntityId::from_u128(2);
    t.store.register_query(
        "usp_orders_by_status @p0, @p1 OUTPUT, @p2",
        vec![
            Row::new()
                .with("id", tracked.id().to_string())
                .with("total", 999),
            Row::new().with("id", fresh.to_string()).with("total", 5),
        ],
    );

    let orders = t
        .call_procedure(
            "usp_orders_by_status",
            "Order",
            &[
                ProcedureArg::from("open"),
                ProcedureArg::output(),
                ProcedureArg::from(50),
            ],
        )
        .unwrap();

    let command = t.store.commands().pop().unwrap();
    assert_eq!(command.kind, CommandKind::Query);
    assert_eq!(command.text, "usp_orders_by_status @p0, @p1 OUTPUT, @p2");
    assert_eq!(
        command.params,
        vec![Value::from("open"), Value::Null, Value::from(50)]
    );

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].get("total"), Some(&Value::from(11)));
    assert_eq!(orders[1].get("total"), Some(&Value::from(5)));
    assert_eq!(t.tracker().state(&tracked), EntityState::Modified);
    assert_eq!(t.tracker().state(&order_key(2)), EntityState::Unchanged);
}

#[test]
fn procedure_call_rejects_unsupported_parameters() {
    let mut t = TestSession::memory();
    let err = t
        .call_procedure(
            "usp_orders",
            "Order",
            &[
                ProcedureArg::from(1),
                ProcedureArg::from(2),
                ProcedureArg::Value(Value::Array(vec![Value::from(3)])),
            ],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::UnsupportedParameter { position: 2, .. }
    ));
    assert!(t.store.commands().is_empty());
}

#[test]
fn procedure_rows_need_an_identity() {
    let mut t = TestSession::memory();
    t.store
        .register_query("usp_totals", vec![Row::new().with("total", 5)]);

    let err = t.call_procedure("usp_totals", "Order", &[]).unwrap_err();
    assert!(matches!(err, CoreError::Model(_)));
}

#[test]
fn command_timeout_is_scoped_to_one_statement() {
    let t = TestSession::memory();
    t.store.set_command_timeout(Some(Duration::from_secs(30)));
    t.store.register_command("UPDATE orders SET archived = 1", 12);

    let affected = t
        .execute_command(
            "UPDATE orders SET archived = 1",
            false,
            Some(Duration::from_secs(300)),
            &[],
        )
        .unwrap();
    assert_eq!(affected, 12);
    assert_eq!(t.store.commands()[0].timeout, Some(Duration::from_secs(300)));
    assert_eq!(t.store.command_timeout(), Some(Duration::from_secs(30)));

    t.store.fail_next_command(StoreError::command("timeout expired"));
    assert!(t
        .execute_command(
            "UPDATE orders SET archived = 1",
            false,
            Some(Duration::from_secs(1)),
            &[],
        )
        .is_err());
    assert_eq!(t.store.command_timeout(), Some(Duration::from_secs(30)));
}

#[test]
fn statements_pass_parameters_and_transaction_choice() {
    let t = TestSession::memory();
    t.execute_command("DELETE FROM orders WHERE id = @p0", false, None, &[Value::from(7)])
        .unwrap();
    t.execute_command("VACUUM", true, None, &[]).unwrap();

    let commands = t.store.commands();
    assert_eq!(commands[0].params, vec![Value::from(7)]);
    assert!(commands[0].transactional);
    assert!(!commands[1].transactional);
}

#[test]
fn batch_scripts_use_the_batch_channel() {
    let t = TestSession::memory();
    let script = "CREATE TABLE audit (id INT)\nGO\nCREATE INDEX ix_audit ON audit (id)\nGO";
    t.execute_batch_script(script).unwrap();

    let commands = t.store.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, CommandKind::Batch);
    assert_eq!(commands[0].text, script);
}

#[test]
fn batch_scripts_fall_back_to_stripped_statement() {
    let t = TestSession::memory();
    t.store.set_batch_channel(false);
    t.execute_batch_script("CREATE TABLE audit (id INT)\nGO\nCREATE INDEX ix_audit ON audit (id)\ngo 2")
        .unwrap();

    let commands = t.store.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, CommandKind::Execute);
    assert_eq!(
        commands[0].text,
        "CREATE TABLE audit (id INT)\nCREATE INDEX ix_audit ON audit (id)"
    );
    assert!(!commands[0].transactional);
}

#[test]
fn separator_lines_rejected_on_the_statement_path() {
    let t = TestSession::memory();
    let err = t
        .execute_command("SELECT 1\nGO", false, None, &[])
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Command { .. })));
}

#[test]
fn attach_or_reuse_keeps_one_instance() {
    let mut t = TestSession::memory();
    let first = t.attach_or_reuse(order(1, 10)).unwrap();
    let second = t.attach_or_reuse(order(1, 99)).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.get("total"), Some(&Value::from(10)));

    let mut copy = second;
    copy.set("total", 50);
    assert_eq!(t.entity(&order_key(1)).unwrap().get("total"), Some(&Value::from(10)));
    t.entity_mut(&order_key(1)).unwrap().set("total", 50);
    assert!(t.has_pending_changes());
    assert!(t.is_attached(&order_key(1)));
    assert!(t.detach(&order_key(1)));
    assert!(!t.is_attached(&order_key(1)));
}
