//! Executor tests against a scripted backend.
//!
//! The mock client serves pre-programmed responses and counts
//! connections and executions, which is what the retry, expiry and
//! logging properties are asserted against.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry_query::{
    Connector, Dialect, Driver, Error, ErrorInfo, NativeClient, Options, ParamMap, Row, Value,
    LOG_CAPACITY, MAX_RETRIES,
};

enum Step {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(&'static str),
}

#[derive(Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    executions: AtomicUsize,
    connects: AtomicUsize,
    begin_failures: AtomicUsize,
    fail_commit: AtomicBool,
    rolled_back: AtomicBool,
}

impl Script {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        })
    }

    fn next(&self) -> Result<Step, ErrorInfo> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Fail(sqlstate)) => Err(ErrorInfo::new(sqlstate, None, "scripted failure")),
            Some(step) => Ok(step),
            None => Ok(Step::Affected(0)),
        }
    }
}

struct ScriptedClient {
    script: Arc<Script>,
    in_txn: bool,
}

impl NativeClient for ScriptedClient {
    fn query(&mut self, _sql: &str, _params: &ParamMap) -> Result<Vec<Row>, ErrorInfo> {
        match self.script.next()? {
            Step::Rows(rows) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }

    fn execute(&mut self, _sql: &str, _params: &ParamMap) -> Result<u64, ErrorInfo> {
        match self.script.next()? {
            Step::Affected(count) => Ok(count),
            _ => Ok(0),
        }
    }

    fn begin(&mut self) -> Result<(), ErrorInfo> {
        if self
            .script
            .begin_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ErrorInfo::new("08006", None, "connection lost"));
        }
        self.in_txn = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ErrorInfo> {
        if self.script.fail_commit.load(Ordering::SeqCst) {
            return Err(ErrorInfo::new("40001", None, "serialization failure"));
        }
        self.in_txn = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ErrorInfo> {
        self.script.rolled_back.store(true, Ordering::SeqCst);
        self.in_txn = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn last_insert_id(&mut self) -> Option<i64> {
        Some(99)
    }
}

struct ScriptedConnector {
    script: Arc<Script>,
}

impl Connector for ScriptedConnector {
    fn connect(&self, _options: &Options, _dsn: &str) -> Result<Box<dyn NativeClient>, ErrorInfo> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedClient {
            script: Arc::clone(&self.script),
            in_txn: false,
        }))
    }
}

fn driver_with(script: Arc<Script>) -> Driver {
    let options = Options::new(Dialect::Sqlite).dbname(":memory:");
    Driver::new(
        options,
        Arc::new(ScriptedConnector {
            script: Arc::clone(&script),
        }),
    )
    .unwrap()
}

fn fail_steps(sqlstate: &'static str, n: usize) -> Vec<Step> {
    (0..n).map(|_| Step::Fail(sqlstate)).collect()
}

#[test]
fn lost_connection_retries_then_surfaces_backend_error() {
    let script = Script::new(fail_steps("08006", 16));
    let mut driver = driver_with(Arc::clone(&script));

    let err = driver.exec("DELETE FROM t", &ParamMap::new()).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));

    // Initial attempt plus MAX_RETRIES reconnect attempts.
    let attempts = (MAX_RETRIES + 1) as usize;
    assert_eq!(script.executions.load(Ordering::SeqCst), attempts);
    assert_eq!(script.connects.load(Ordering::SeqCst), attempts);
}

#[test]
fn retry_counter_resets_after_exhaustion() {
    let mut steps = fail_steps("08006", (MAX_RETRIES + 1) as usize);
    steps.extend(fail_steps("08006", MAX_RETRIES as usize));
    steps.push(Step::Affected(1));
    let script = Script::new(steps);
    let mut driver = driver_with(Arc::clone(&script));

    assert!(driver.exec("DELETE FROM t", &ParamMap::new()).is_err());
    // A full retry budget is available again for the next statement.
    let affected = driver.exec("DELETE FROM t", &ParamMap::new()).unwrap();
    assert_eq!(affected, Some(1));
}

#[test]
fn success_resets_the_retry_counter() {
    let mut steps = fail_steps("08006", MAX_RETRIES as usize);
    steps.push(Step::Affected(1));
    steps.extend(fail_steps("08006", MAX_RETRIES as usize));
    steps.push(Step::Affected(2));
    let script = Script::new(steps);
    let mut driver = driver_with(Arc::clone(&script));

    assert_eq!(driver.exec("A", &ParamMap::new()).unwrap(), Some(1));
    assert_eq!(driver.exec("B", &ParamMap::new()).unwrap(), Some(2));
}

#[test]
fn two_lost_connections_then_success_executes_three_times() {
    let mut steps = fail_steps("08006", 2);
    steps.push(Step::Affected(1));
    let script = Script::new(steps);
    let mut driver = driver_with(Arc::clone(&script));

    assert_eq!(driver.exec("DELETE FROM t", &ParamMap::new()).unwrap(), Some(1));
    assert_eq!(script.executions.load(Ordering::SeqCst), 3);
}

#[test]
fn interrupt_classes_never_retry() {
    let script = Script::new(fail_steps("57014", 4));
    let mut driver = driver_with(Arc::clone(&script));

    let err = driver.exec("DELETE FROM t", &ParamMap::new()).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(script.executions.load(Ordering::SeqCst), 1);
}

#[test]
fn known_error_classes_never_retry() {
    let script = Script::new(fail_steps("23505", 4));
    let mut driver = driver_with(Arc::clone(&script));

    assert!(driver.exec("INSERT", &ParamMap::new()).is_err());
    assert_eq!(script.executions.load(Ordering::SeqCst), 1);
    let info = driver.error().unwrap();
    assert_eq!(info.sqlstate, "23505");
}

#[test]
fn query_returns_scripted_rows() {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::Int(7));
    let script = Script::new(vec![Step::Rows(vec![row])]);
    let mut driver = driver_with(script);

    let rows = driver
        .exec_query("SELECT id FROM t", &ParamMap::new())
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Int(7));
}

#[test]
fn expired_transaction_rolls_back_and_fails() {
    let script = Script::new(Vec::new());
    let mut driver = driver_with(Arc::clone(&script));

    driver.begin(Some(Duration::from_millis(30))).unwrap();
    assert!(driver.in_transaction());
    std::thread::sleep(Duration::from_millis(60));

    let err = driver.exec("UPDATE t SET x = 1", &ParamMap::new()).unwrap_err();
    assert!(matches!(err, Error::TransactionExpired));
    assert!(script.rolled_back.load(Ordering::SeqCst));
    assert!(!driver.in_transaction());
}

#[test]
fn transaction_within_deadline_executes() {
    let script = Script::new(vec![Step::Affected(1)]);
    let mut driver = driver_with(Arc::clone(&script));

    driver.begin(Some(Duration::from_secs(60))).unwrap();
    assert_eq!(
        driver.exec("UPDATE t SET x = 1", &ParamMap::new()).unwrap(),
        Some(1)
    );
    driver.commit().unwrap();
    assert!(!driver.in_transaction());
}

#[test]
fn begin_retries_lost_connections() {
    let script = Script::new(Vec::new());
    script.begin_failures.store(2, Ordering::SeqCst);
    let mut driver = driver_with(Arc::clone(&script));

    driver.begin(None).unwrap();
    assert!(driver.in_transaction());
    // One initial connect plus one per failed begin.
    assert_eq!(script.connects.load(Ordering::SeqCst), 3);
}

#[test]
fn nested_begin_is_a_state_error() {
    let script = Script::new(Vec::new());
    let mut driver = driver_with(script);

    driver.begin(None).unwrap();
    assert!(matches!(driver.begin(None), Err(Error::TransactionState(_))));
}

#[test]
fn commit_without_transaction_is_a_state_error() {
    let script = Script::new(Vec::new());
    let mut driver = driver_with(script);

    assert!(matches!(driver.commit(), Err(Error::TransactionState(_))));
    assert!(matches!(driver.rollback(), Err(Error::TransactionState(_))));
}

#[test]
fn failed_commit_surfaces_and_closes() {
    let script = Script::new(Vec::new());
    let mut driver = driver_with(Arc::clone(&script));

    driver.begin(None).unwrap();
    script.fail_commit.store(true, Ordering::SeqCst);
    let err = driver.commit().unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert!(!driver.in_transaction());
}

#[test]
fn action_commits_on_ok_and_rolls_back_on_err() {
    let script = Script::new(vec![Step::Affected(1)]);
    let mut driver = driver_with(Arc::clone(&script));

    let n = driver
        .action(|driver| driver.exec("UPDATE t SET x = 1", &ParamMap::new()))
        .unwrap();
    assert_eq!(n, Some(1));
    assert!(!driver.in_transaction());

    let failing: Result<(), Error> = driver.action(|_| Err(Error::invalid("boom")));
    assert!(failing.is_err());
    assert!(script.rolled_back.load(Ordering::SeqCst));
    assert!(!driver.in_transaction());
}

#[test]
fn execution_log_is_bounded() {
    let script = Script::new(Vec::new());
    let mut driver = driver_with(script);

    for i in 0..LOG_CAPACITY + 16 {
        driver
            .exec(&format!("DELETE FROM t WHERE id = {i}"), &ParamMap::new())
            .unwrap();
    }
    assert_eq!(driver.log_len(), LOG_CAPACITY);
    let log = driver.log();
    assert_eq!(log.len(), LOG_CAPACITY);
    // Oldest entries fell off the front.
    assert!(log[0].contains("id = 16"));
    assert!(driver.last().unwrap().contains(&format!("id = {}", LOG_CAPACITY + 15)));
}

#[test]
fn debug_mode_renders_without_executing() {
    let script = Script::new(Vec::new());
    let options = Options::new(Dialect::Sqlite).dbname(":memory:").debug();
    let mut driver = Driver::new(
        options,
        Arc::new(ScriptedConnector {
            script: Arc::clone(&script),
        }),
    )
    .unwrap();

    let mut map = ParamMap::new();
    map.bind(":qx0x".to_string(), Value::Str("ada".to_string()));
    let out = driver
        .exec("INSERT INTO t (name) VALUES (:qx0x)", &map)
        .unwrap();
    assert_eq!(out, None);
    assert_eq!(script.connects.load(Ordering::SeqCst), 0);
    assert_eq!(script.executions.load(Ordering::SeqCst), 0);
    assert_eq!(
        driver.query_string(),
        Some("INSERT INTO t (name) VALUES ('ada')")
    );
}

#[test]
fn id_reports_backend_row_id() {
    let script = Script::new(vec![Step::Affected(1)]);
    let mut driver = driver_with(script);

    driver.exec("INSERT", &ParamMap::new()).unwrap();
    assert_eq!(driver.id().unwrap(), Some(99));
}
