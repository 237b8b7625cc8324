//! Shared test helpers: a scripted in-memory driver that records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_sql::db::{Driver, NoResultSet};
use resilient_sql::error::DriverError;
use resilient_sql::models::{ColumnMetadata, MetadataSnapshot, Row, TableMetadata};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How many times each driver operation was called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub opens: usize,
    pub closes: usize,
    pub disposes: usize,
    pub executes: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub reflects: usize,
    /// SQL text of the most recent `execute` call.
    pub last_sql: Option<String>,
}

/// Outcome of one scripted `execute` call.
#[derive(Debug, Clone)]
pub enum Step {
    Rows(Vec<Row>),
    NoResult,
    Fail(DriverError),
    /// Never completes on its own; only an attempt timeout ends it.
    Hang,
}

#[derive(Debug, Clone, Default)]
pub struct CounterHandle(Arc<Mutex<Counters>>);

impl CounterHandle {
    pub fn get(&self) -> Counters {
        self.0.lock().unwrap().clone()
    }

    fn bump(&self, f: impl FnOnce(&mut Counters)) {
        f(&mut self.0.lock().unwrap());
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    pub id: usize,
}

#[derive(Debug, Default)]
pub struct ScriptedDriver {
    counters: CounterHandle,
    steps: Mutex<VecDeque<Step>>,
    otherwise: Option<Step>,
    failing_opens: HashSet<usize>,
    fail_opens_from: Option<usize>,
    commit_failures: Mutex<VecDeque<DriverError>>,
    close_error: Option<DriverError>,
    dispose_error: Option<DriverError>,
    reflect_error: Option<DriverError>,
}

impl ScriptedDriver {
    /// A driver whose statements all succeed with no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `execute` call.
    pub fn then(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// Outcome of every `execute` call once the queue is empty.
    pub fn otherwise(mut self, step: Step) -> Self {
        self.otherwise = Some(step);
        self
    }

    /// Make the `nth` call to `open` (1-based) fail.
    pub fn fail_open(mut self, nth: usize) -> Self {
        self.failing_opens.insert(nth);
        self
    }

    /// Make every call to `open` from the `nth` on fail.
    pub fn fail_opens_from(mut self, nth: usize) -> Self {
        self.fail_opens_from = Some(nth);
        self
    }

    pub fn fail_next_commit(self, err: DriverError) -> Self {
        self.commit_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn fail_close(mut self, err: DriverError) -> Self {
        self.close_error = Some(err);
        self
    }

    pub fn fail_dispose(mut self, err: DriverError) -> Self {
        self.dispose_error = Some(err);
        self
    }

    pub fn fail_reflect(mut self, err: DriverError) -> Self {
        self.reflect_error = Some(err);
        self
    }

    pub fn counters(&self) -> CounterHandle {
        self.counters.clone()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;
    type Cursor = Option<Vec<Row>>;

    async fn open(&self) -> Result<ScriptedConnection, DriverError> {
        self.counters.bump(|c| c.opens += 1);
        let nth = self.counters.get().opens;
        let failing = self.failing_opens.contains(&nth)
            || self.fail_opens_from.is_some_and(|from| nth >= from);
        if failing {
            return Err(DriverError::connection("connection refused"));
        }
        Ok(ScriptedConnection { id: nth })
    }

    async fn execute(
        &self,
        _conn: &mut ScriptedConnection,
        sql: &str,
    ) -> Result<Option<Vec<Row>>, DriverError> {
        self.counters.bump(|c| {
            c.executes += 1;
            c.last_sql = Some(sql.to_string());
        });
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.otherwise.clone())
            .unwrap_or(Step::NoResult);

        match step {
            Step::Rows(rows) => Ok(Some(rows)),
            Step::NoResult => Ok(None),
            Step::Fail(err) => Err(err),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }

    fn fetch_rows(&self, cursor: Option<Vec<Row>>) -> Result<Vec<Row>, NoResultSet> {
        cursor.ok_or(NoResultSet)
    }

    async fn begin(&self, _conn: &mut ScriptedConnection) -> Result<(), DriverError> {
        self.counters.bump(|c| c.begins += 1);
        Ok(())
    }

    async fn commit(&self, _conn: &mut ScriptedConnection) -> Result<(), DriverError> {
        self.counters.bump(|c| c.commits += 1);
        let failure = self.commit_failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn rollback(&self, _conn: &mut ScriptedConnection) -> Result<(), DriverError> {
        self.counters.bump(|c| c.rollbacks += 1);
        Ok(())
    }

    async fn close(&self, _conn: ScriptedConnection) -> Result<(), DriverError> {
        self.counters.bump(|c| c.closes += 1);
        match &self.close_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn dispose(&self) -> Result<(), DriverError> {
        self.counters.bump(|c| c.disposes += 1);
        match &self.dispose_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn reflect(&self, _conn: &mut ScriptedConnection) -> Result<MetadataSnapshot, DriverError> {
        self.counters.bump(|c| c.reflects += 1);
        if let Some(err) = &self.reflect_error {
            return Err(err.clone());
        }
        let mut users = TableMetadata::new(None, "users");
        users
            .columns
            .push(ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true));
        users.columns.push(ColumnMetadata::new("name", "TEXT", true));
        Ok(MetadataSnapshot::new(vec![users]))
    }
}

/// A single-row result: `{name: value}`.
pub fn row(name: &str, value: serde_json::Value) -> Row {
    let mut row = Row::new();
    row.insert(name.to_string(), value);
    row
}

pub fn transient() -> Step {
    Step::Fail(DriverError::transient("server closed the connection unexpectedly"))
}

pub fn programming() -> Step {
    Step::Fail(DriverError::programming("syntax error at or near \"SELEC\"").with_sql_state("42601"))
}
