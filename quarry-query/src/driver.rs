//! The statement executor.
//!
//! A [`Driver`] owns the live native-client handle, the compiler, the
//! last-error state, the retry counter and a bounded execution log. It
//! is the single funnel every statement passes through, which is where
//! the resilience protocol lives:
//!
//! - backend failures are classified by SQLSTATE class;
//! - lost-connection failures close the handle, sleep briefly and
//!   retry on a fresh connection, at most [`MAX_RETRIES`] times;
//! - interrupts and ordinary errors surface immediately;
//! - a successful execution resets the retry counter.
//!
//! In debug mode nothing executes: the statement is rendered with its
//! parameters substituted and kept for [`Driver::query_string`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::client::{ClientInfo, Connector, NativeClient, Row};
use crate::compiler::SqlCompiler;
use crate::dialect::Dialect;
use crate::error::{Error, ErrorInfo, Result};
use crate::options::Options;
use crate::raw::Raw;
use crate::sqlstate::ErrorState;
use crate::value::{ParamMap, Value};

/// Retries attempted for lost-connection failures before giving up.
pub const MAX_RETRIES: u32 = 3;

/// Blocking pause between reconnect attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_micros(500);

/// Bound of the in-memory execution log; older entries are dropped.
pub const LOG_CAPACITY: usize = 128;

/// Connection introspection plus the DSN in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server description, when the backend reports one.
    pub server: Option<String>,
    /// Driver name.
    pub driver: Option<String>,
    /// Server or library version.
    pub version: Option<String>,
    /// The DSN this driver connects with.
    pub dsn: String,
}

/// Executes compiled statements against one live connection.
pub struct Driver {
    pub(crate) options: Options,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) client: Option<Box<dyn NativeClient>>,
    pub(crate) compiler: SqlCompiler,
    dsn: String,
    last_error: Option<ErrorInfo>,
    retries: u32,
    logs: VecDeque<(String, ParamMap)>,
    expire_at: Option<Instant>,
    query_string: Option<String>,
}

enum Fetched {
    Rows(Vec<Row>),
    Affected(u64),
}

impl Driver {
    /// Validate options and connect, unless debug mode is on.
    pub fn new(options: Options, connector: Arc<dyn Connector>) -> Result<Self> {
        options.validate()?;
        let dsn = options.driver.dsn(&options)?;
        let compiler = SqlCompiler::new(options.driver, options.prefix.clone());
        let mut driver = Self {
            options,
            connector,
            client: None,
            compiler,
            dsn,
            last_error: None,
            retries: 0,
            logs: VecDeque::new(),
            expire_at: None,
            query_string: None,
        };
        if !driver.options.debug {
            driver.reconnect()?;
        }
        Ok(driver)
    }

    /// The configuration this driver runs with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The dialect in use.
    pub fn dialect(&self) -> Dialect {
        self.compiler.dialect()
    }

    /// The DSN in use.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Whether statements are rendered instead of executed.
    pub fn is_debug(&self) -> bool {
        self.options.debug
    }

    /// Switch on debug mode for subsequent statements.
    pub fn debug(&mut self) -> &mut Self {
        self.options.debug = true;
        self
    }

    /// Ensure a live connection exists, running post-connect commands
    /// on a fresh one. No-op in debug mode or when already connected.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.options.debug || self.client.is_some() {
            return Ok(());
        }
        let mut client = self
            .connector
            .connect(&self.options, &self.dsn)
            .map_err(|info| {
                error!(sqlstate = %info.sqlstate, message = %info.message, "connect failed");
                self.last_error = Some(info.clone());
                Error::Backend(info)
            })?;
        for command in &self.options.command {
            client.execute(command, &ParamMap::new()).map_err(|info| {
                error!(sqlstate = %info.sqlstate, command = %command, "post-connect command failed");
                self.last_error = Some(info.clone());
                Error::Backend(info)
            })?;
        }
        debug!(dsn = %self.dsn, "connected");
        self.client = Some(client);
        Ok(())
    }

    /// Drop the live handle, rolling back any open transaction first.
    /// `reset` also clears the transaction expiry deadline.
    pub fn close(&mut self, reset: bool) {
        if reset {
            self.expire_at = None;
        }
        if let Some(client) = self.client.as_mut() {
            if client.in_transaction() {
                let _ = client.rollback();
            }
        }
        self.client = None;
    }

    /// Whether a transaction is open on the live handle.
    pub fn in_transaction(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| client.in_transaction())
    }

    /// Execute a non-returning statement. `Ok(None)` means debug mode
    /// rendered the statement instead of running it.
    pub fn exec(&mut self, sql: &str, map: &ParamMap) -> Result<Option<u64>> {
        match self.run_with(sql, map, |client, sql, map| {
            client.execute(sql, map).map(Fetched::Affected)
        })? {
            Some(Fetched::Affected(count)) => Ok(Some(count)),
            _ => Ok(None),
        }
    }

    /// Execute a row-returning statement. `Ok(None)` means debug mode.
    pub fn exec_query(&mut self, sql: &str, map: &ParamMap) -> Result<Option<Vec<Row>>> {
        match self.run_with(sql, map, |client, sql, map| {
            client.query(sql, map).map(Fetched::Rows)
        })? {
            Some(Fetched::Rows(rows)) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    /// Run a raw statement with `<ident>` markers and named parameters,
    /// returning its rows.
    pub fn query(&mut self, statement: &str, params: &[(&str, Value)]) -> Result<Option<Vec<Row>>> {
        let mut raw = Raw::new(statement);
        for (key, value) in params {
            raw = raw.bind(*key, value.clone());
        }
        let mut map = ParamMap::new();
        let sql = self.compiler.build_raw(&raw, &mut map)?;
        self.exec_query(&sql, &map)
    }

    /// Run a raw statement with `<ident>` markers, returning affected
    /// rows.
    pub fn statement(&mut self, statement: &str, params: &[(&str, Value)]) -> Result<Option<u64>> {
        let mut raw = Raw::new(statement);
        for (key, value) in params {
            raw = raw.bind(*key, value.clone());
        }
        let mut map = ParamMap::new();
        let sql = self.compiler.build_raw(&raw, &mut map)?;
        self.exec(&sql, &map)
    }

    fn run_with<F>(&mut self, sql: &str, map: &ParamMap, op: F) -> Result<Option<Fetched>>
    where
        F: Fn(&mut dyn NativeClient, &str, &ParamMap) -> std::result::Result<Fetched, ErrorInfo>,
    {
        self.last_error = None;
        self.query_string = None;
        self.check_expiry()?;

        self.push_log(sql, map.clone());

        if self.options.debug {
            self.query_string = Some(self.compiler.generate(sql, map));
            return Ok(None);
        }

        loop {
            self.reconnect()?;
            let Some(client) = self.client.as_deref_mut() else {
                return Err(Error::NotActivated);
            };
            match op(client, sql, map) {
                Ok(fetched) => {
                    self.retries = 0;
                    debug!(statement = %sql, "execute success");
                    return Ok(Some(fetched));
                }
                Err(info) => {
                    let state = ErrorState::classify(&info.sqlstate);
                    error!(
                        sqlstate = %info.sqlstate,
                        message = %info.message,
                        statement = %sql,
                        "execute error"
                    );
                    self.last_error = Some(info.clone());
                    if state.is_retryable() && self.retries < MAX_RETRIES {
                        self.retries += 1;
                        warn!(attempt = self.retries, "reconnecting after lost connection");
                        self.close(false);
                        thread::sleep(RETRY_BACKOFF);
                        continue;
                    }
                    self.retries = 0;
                    return Err(Error::Backend(info));
                }
            }
        }
    }

    /// Roll back and fail when the transaction deadline has passed.
    fn check_expiry(&mut self) -> Result<()> {
        let Some(deadline) = self.expire_at else {
            return Ok(());
        };
        if Instant::now() <= deadline {
            return Ok(());
        }
        warn!("transaction deadline passed, rolling back");
        self.expire_at = None;
        if let Some(client) = self.client.as_mut() {
            if client.in_transaction() {
                let _ = client.rollback();
            }
        }
        Err(Error::TransactionExpired)
    }

    pub(crate) fn set_expire_at(&mut self, deadline: Option<Instant>) {
        self.expire_at = deadline;
    }

    pub(crate) fn expire_at(&self) -> Option<Instant> {
        self.expire_at
    }

    pub(crate) fn record_error(&mut self, info: ErrorInfo) {
        self.last_error = Some(info);
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn push_log(&mut self, sql: &str, map: ParamMap) {
        if self.logs.len() == LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back((sql.to_string(), map));
    }

    /// Row id of the last insert. PostgreSQL resolves it via
    /// `LASTVAL()`; other backends report it from the handle.
    pub fn id(&mut self) -> Result<Option<i64>> {
        if self.dialect() == Dialect::Pgsql {
            let rows = self.exec_query("SELECT LASTVAL()", &ParamMap::new())?;
            return Ok(rows
                .and_then(|rows| rows.into_iter().next())
                .and_then(|row| row.values().next().and_then(Value::as_i64)));
        }
        self.reconnect()?;
        Ok(self.client.as_mut().and_then(|client| client.last_insert_id()))
    }

    /// The diagnostic of the most recent failure, if any.
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    /// The last statement, rendered with parameters substituted.
    pub fn last(&self) -> Option<String> {
        self.logs
            .back()
            .map(|(sql, map)| self.compiler.generate(sql, map))
    }

    /// All logged statements, oldest first, rendered with parameters.
    pub fn log(&self) -> Vec<String> {
        self.logs
            .iter()
            .map(|(sql, map)| self.compiler.generate(sql, map))
            .collect()
    }

    /// Number of statements currently held in the log.
    pub fn log_len(&self) -> usize {
        self.logs.len()
    }

    /// Drop all logged statements.
    pub fn clear_log(&mut self) {
        self.logs.clear();
    }

    /// The statement debug mode rendered most recently.
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Connection introspection plus the DSN.
    pub fn info(&mut self) -> Result<ServerInfo> {
        self.reconnect()?;
        let info = self
            .client
            .as_ref()
            .map(|client| client.info())
            .unwrap_or_else(ClientInfo::default);
        Ok(ServerInfo {
            server: info.server,
            driver: info.driver,
            version: info.version,
            dsn: self.dsn.clone(),
        })
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.close(true);
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("dialect", &self.dialect())
            .field("dsn", &self.dsn)
            .field("connected", &self.client.is_some())
            .field("retries", &self.retries)
            .field("logged", &self.logs.len())
            .finish()
    }
}
