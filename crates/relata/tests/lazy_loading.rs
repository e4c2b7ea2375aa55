//! Lazy relationship loading through the session.

use relata::LazyLoadError;
use relata::prelude::*;
use asupersync::runtime::RuntimeBuilder;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Org {
    id: Option<i64>,
    name: String,
}

static ORGS: LazyLock<TableInfo> = LazyLock::new(|| {
    TableInfo::builder("orgs")
        .column("id", Column::new().primary_key(true))
        .column("name", Column::new().nullable(false))
        .build()
});

impl Table for Org {
    fn table() -> &'static TableInfo {
        &ORGS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.map_or(Value::Null, Value::Int)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn primary_key_value(&self) -> Value {
        self.id.map_or(Value::Null, Value::Int)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    id: Option<i64>,
    name: String,
    org_id: Option<i64>,
}

static USERS: LazyLock<TableInfo> = LazyLock::new(|| {
    TableInfo::builder("users")
        .column("id", Column::new().primary_key(true))
        .column("name", Column::new().nullable(false))
        .column("org_id", Column::new().foreign_key("orgs.id"))
        .relationship(relationship("org", "orgs", "org_id").back_populates("members"))
        .relationship(relationship("org_noload", "orgs", "org_id").lazy(LoadStrategy::NoLoad))
        .relationship(relationship("org_raise", "orgs", "org_id").lazy(LoadStrategy::Raise))
        .build()
});

impl Table for User {
    fn table() -> &'static TableInfo {
        &USERS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.map_or(Value::Null, Value::Int)),
            ("name", Value::Text(self.name.clone())),
            ("org_id", self.org_id.map_or(Value::Null, Value::Int)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            org_id: row.get_named("org_id")?,
        })
    }

    fn primary_key_value(&self) -> Value {
        self.id.map_or(Value::Null, Value::Int)
    }
}

#[derive(Debug, Default)]
struct MockState {
    query_calls: usize,
    fail_next_query: bool,
}

#[derive(Debug, Clone)]
struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    fn new(state: Arc<Mutex<MockState>>) -> Self {
        Self { state }
    }

    fn org_row(pk: i64) -> Option<Row> {
        (pk < 100).then(|| {
            Row::new(
                vec!["id".into(), "name".into()],
                vec![Value::Int(pk), Value::Text(format!("org-{pk}"))],
            )
        })
    }
}

impl Executor for MockExecutor {
    fn query(
        &self,
        _cx: &Cx,
        _sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let params = params.to_vec();
        async move {
            state.lock().expect("lock poisoned").query_calls += 1;
            let rows = params
                .first()
                .and_then(Value::as_i64)
                .and_then(Self::org_row)
                .into_iter()
                .collect();
            Outcome::Ok(rows)
        }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        _sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            if guard.fail_next_query {
                guard.fail_next_query = false;
                return Outcome::Err(Error::query("injected failure"));
            }
            guard.query_calls += 1;
            drop(guard);
            let row = params.first().and_then(Value::as_i64).and_then(Self::org_row);
            Outcome::Ok(row)
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        _sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async { Outcome::Ok(0) }
    }
}

fn setup() -> (Session<MockExecutor>, Arc<Mutex<MockState>>) {
    let state = Arc::new(Mutex::new(MockState::default()));
    (Session::new(MockExecutor::new(Arc::clone(&state))), state)
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(_) => panic!("unexpected cancellation"),
        Outcome::Panicked(_) => panic!("unexpected panic"),
    }
}

fn user(id: i64, org_id: Option<i64>) -> User {
    User {
        id: Some(id),
        name: format!("user-{id}"),
        org_id,
    }
}

#[test]
fn ref_reads_fk_without_io() {
    let u = user(1, Some(42));
    let loader: Loader<Org> = Loader::for_instance(&u, "org").unwrap();

    assert_eq!(loader.ref_value(), &Value::Int(42));
    assert!(!loader.is_loaded());
}

#[test]
fn null_fk_resolves_none_without_query() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let u = user(1, None);
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org").unwrap();
    assert!(!loader.is_loaded());

    rt.block_on(async {
        let resolved = unwrap_outcome(loader.load(&cx, &mut session).await);
        assert!(resolved.is_none());
    });

    assert!(loader.is_loaded());
    assert_eq!(state.lock().unwrap().query_calls, 0);
}

#[test]
fn load_fetches_once_and_caches() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let u = user(1, Some(7));
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org").unwrap();

    rt.block_on(async {
        let first = unwrap_outcome(loader.load(&cx, &mut session).await).unwrap();
        assert_eq!(first.read().unwrap().name, "org-7");
        assert!(loader.is_loaded());
        assert_eq!(state.lock().unwrap().query_calls, 1);

        // Cached: the second await answers without touching the executor.
        let second = unwrap_outcome(loader.load(&cx, &mut session).await).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.lock().unwrap().query_calls, 1);
    });
}

#[test]
fn missing_target_row_resolves_loaded_none() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, _) = setup();

    let u = user(1, Some(999));
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org").unwrap();

    rt.block_on(async {
        let resolved = unwrap_outcome(loader.load(&cx, &mut session).await);
        assert!(resolved.is_none());
    });
    assert!(loader.is_loaded());
}

#[test]
fn two_loaders_share_identity() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let a = user(1, Some(7));
    let b = user(2, Some(7));
    let mut loader_a: Loader<Org> = Loader::for_instance(&a, "org").unwrap();
    let mut loader_b: Loader<Org> = Loader::for_instance(&b, "org").unwrap();

    rt.block_on(async {
        let org_a = unwrap_outcome(loader_a.load(&cx, &mut session).await).unwrap();
        let org_b = unwrap_outcome(loader_b.load(&cx, &mut session).await).unwrap();

        // Same row, same live object - the identity map deduplicated it.
        assert!(Arc::ptr_eq(&org_a, &org_b));
    });

    // The second resolution came from the identity map, not a query.
    assert_eq!(state.lock().unwrap().query_calls, 1);
}

#[test]
fn raise_strategy_fails_loudly_without_querying() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let u = user(1, Some(7));
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org_raise").unwrap();

    rt.block_on(async {
        let result = loader.load(&cx, &mut session).await;
        let Outcome::Err(err) = result else {
            panic!("raise strategy must error");
        };
        let msg = err.to_string();
        assert!(msg.contains("org_raise"));
        assert!(msg.contains("users"));
        assert!(msg.contains("selectinload"));
        assert!(matches!(err, Error::LazyLoad(LazyLoadError { .. })));
    });

    assert!(!loader.is_loaded());
    assert_eq!(state.lock().unwrap().query_calls, 0);
}

#[test]
fn noload_strategy_resolves_none_without_querying() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let u = user(1, Some(7));
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org_noload").unwrap();

    rt.block_on(async {
        let resolved = unwrap_outcome(loader.load(&cx, &mut session).await);
        assert!(resolved.is_none());
    });

    assert!(loader.is_loaded());
    assert_eq!(state.lock().unwrap().query_calls, 0);
}

#[test]
fn failed_load_stays_unloaded_and_retries() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    let u = user(1, Some(7));
    let mut loader: Loader<Org> = Loader::for_instance(&u, "org").unwrap();
    state.lock().unwrap().fail_next_query = true;

    rt.block_on(async {
        let result = loader.load(&cx, &mut session).await;
        assert!(matches!(result, Outcome::Err(_)));
        // A failed attempt does not mark the loader loaded.
        assert!(!loader.is_loaded());

        // The retry re-issues the query and succeeds.
        let resolved = unwrap_outcome(loader.load(&cx, &mut session).await).unwrap();
        assert_eq!(resolved.read().unwrap().name, "org-7");
        assert!(loader.is_loaded());
    });
}

#[test]
fn unknown_relationship_name_is_config_error() {
    let u = user(1, Some(7));
    let err = Loader::<Org>::for_instance(&u, "team").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("team"));
    assert!(msg.contains("users"));
}

#[test]
fn descriptor_is_introspectable_at_class_level() {
    let rel = User::table().relationship("org").unwrap();
    assert_eq!(rel.target_table, "orgs");
    assert_eq!(rel.foreign_key_column, "org_id");
    assert_eq!(rel.lazy, LoadStrategy::Select);
    assert_eq!(rel.back_populates, Some("members"));
    assert!(!rel.uselist);

    let noload = User::table().relationship("org_noload").unwrap();
    assert_eq!(noload.lazy, LoadStrategy::NoLoad);
}
