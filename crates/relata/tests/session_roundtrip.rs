//! End-to-end session lifecycle against a scripted executor.

use relata::prelude::*;
use relata::{SessionState, clear_current, current, set_current};
use asupersync::runtime::RuntimeBuilder;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    id: Option<i64>,
    name: String,
    age: Option<i64>,
    city: Option<String>,
}

static USERS: LazyLock<TableInfo> = LazyLock::new(|| {
    TableInfo::builder("users")
        .column("id", Column::new().primary_key(true))
        .column("name", Column::new().nullable(false))
        .column("age", Column::new().index(true))
        .column("city", Column::new().default_value("NYC"))
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
            ("age", self.age.map_or(Value::Null, Value::Int)),
            ("city", self.city.clone().map_or(Value::Null, Value::Text)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            age: row.get_named("age")?,
            city: row.get_named("city")?,
        })
    }

    fn primary_key_value(&self) -> Value {
        self.id.map_or(Value::Null, Value::Int)
    }
}

impl User {
    const AGE: FieldRef = FieldRef::new("users", "age");
    const CITY: FieldRef = FieldRef::new("users", "city");
}

fn sample_row(id: i64, name: &str, age: i64, city: &str) -> Row {
    Row::new(
        vec!["id".into(), "name".into(), "age".into(), "city".into()],
        vec![
            Value::Int(id),
            Value::Text(name.to_string()),
            Value::Int(age),
            Value::Text(city.to_string()),
        ],
    )
}

#[derive(Debug, Default)]
struct MockState {
    query_calls: usize,
    executed: Vec<(String, Vec<Value>)>,
    /// Rows served to the next `query` call.
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl Executor for MockExecutor {
    fn query(
        &self,
        _cx: &Cx,
        _sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.query_calls += 1;
            Outcome::Ok(guard.rows.clone())
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
            guard.query_calls += 1;
            let row = params
                .first()
                .and_then(Value::as_i64)
                .filter(|pk| *pk < 100)
                .map(|pk| sample_row(pk, &format!("user-{pk}"), 30, "NYC"));
            Outcome::Ok(row)
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().expect("lock poisoned");
            guard.executed.push((sql, params));
            Outcome::Ok(1)
        }
    }
}

fn setup() -> (Session<MockExecutor>, Arc<Mutex<MockState>>) {
    let state = Arc::new(Mutex::new(MockState::default()));
    let executor = MockExecutor {
        state: Arc::clone(&state),
    };
    (Session::new(executor), state)
}

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(_) => panic!("unexpected cancellation"),
        Outcome::Panicked(_) => panic!("unexpected panic"),
    }
}

#[test]
fn insert_mutate_delete_lifecycle() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (mut session, state) = setup();

    rt.block_on(async {
        // Insert a new user.
        let added = session
            .add(User {
                id: None,
                name: "ada".to_string(),
                age: Some(36),
                city: Some("London".to_string()),
            })
            .unwrap();
        assert!(session.is_modified(&added));
        unwrap_outcome(session.commit(&cx).await);
        {
            let executed = state.lock().unwrap().executed.clone();
            assert_eq!(executed.len(), 1);
            assert_eq!(
                executed[0].0,
                "INSERT INTO users (name, age, city) VALUES ($1, $2, $3)"
            );
        }

        // Load a persisted user, mutate one field, commit an UPDATE.
        let loaded = unwrap_outcome(session.get::<User>(&cx, 7i64).await).unwrap();
        loaded.write().unwrap().city = Some("Berlin".to_string());
        unwrap_outcome(session.commit(&cx).await);
        {
            let executed = state.lock().unwrap().executed.clone();
            assert_eq!(executed.len(), 2);
            assert_eq!(executed[1].0, "UPDATE users SET city = $1 WHERE id = $2");
            assert_eq!(
                executed[1].1,
                vec![Value::Text("Berlin".into()), Value::Int(7)]
            );
        }

        // Delete it again.
        session.delete(&loaded).unwrap();
        unwrap_outcome(session.commit(&cx).await);
        {
            let executed = state.lock().unwrap().executed.clone();
            assert_eq!(executed.len(), 3);
            assert_eq!(executed[2].0, "DELETE FROM users WHERE id = $1");
        }
    });

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn find_hydrates_rows_through_executor() {
    let rt = RuntimeBuilder::current_thread().build().expect("runtime");
    let cx = Cx::for_testing();
    let (session, state) = setup();

    state.lock().unwrap().rows = vec![
        sample_row(1, "ada", 36, "London"),
        sample_row(2, "grace", 45, "NYC"),
    ];

    rt.block_on(async {
        let users = unwrap_outcome(
            find::<User>()
                .filter(User::AGE.ge(30i64))
                .order_by("-age")
                .all(&cx, session.executor())
                .await,
        );
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "ada");
        assert_eq!(users[1].city.as_deref(), Some("NYC"));
    });
    assert_eq!(state.lock().unwrap().query_calls, 1);
}

#[test]
fn compiled_scenarios_match_contract() {
    // age > 25 AND city = "NYC"
    let (sql, params) = find::<User>()
        .filter(User::AGE.gt(25i64).and(User::CITY.eq("NYC")))
        .build();
    assert!(sql.contains("age > $1"));
    assert!(sql.contains("city = $2"));
    assert!(sql.contains(" AND "));
    assert_eq!(params, vec![Value::Int(25), Value::Text("NYC".into())]);

    // IN over three cities expands positionally.
    let (sql, params) = find::<User>()
        .filter(User::CITY.in_(["NYC", "LA", "SF"]))
        .build();
    assert!(sql.contains("city IN ($1, $2, $3)"));
    assert_eq!(
        params,
        vec![
            Value::Text("NYC".into()),
            Value::Text("LA".into()),
            Value::Text("SF".into()),
        ]
    );
}

#[test]
fn ambient_current_session_is_explicit_only() {
    clear_current();
    assert!(current::<RwLock<Session<MockExecutor>>>().is_none());

    let (session, _) = setup();
    let shared = Arc::new(RwLock::new(session));
    set_current(Arc::clone(&shared));

    let fetched = current::<RwLock<Session<MockExecutor>>>().expect("current session was set");
    assert!(Arc::ptr_eq(&fetched, &shared));

    clear_current();
    assert!(current::<RwLock<Session<MockExecutor>>>().is_none());
}
