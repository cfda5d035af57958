#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use storable_core::{ColumnInfo, ConnectionConfig, Engine, IndexInfo, Row, SqlConnection};
use storable_migrate::{sync_schema, SyncOptions};
use storable_orm::{Catalog, Entity, Handle, Session, SessionOptions};
use storable_sqlx::SqliteConnection;
use tempfile::TempDir;

#[derive(Entity)]
pub struct User {
    #[entity(length = 191, unique)]
    pub email: String,
    #[entity(lazy)]
    pub bio: Option<String>,
}

#[derive(Entity)]
#[entity(abstract)]
pub struct Content {
    #[entity(length = 191)]
    pub title: String,
}

#[derive(Entity)]
#[entity(name = "Blog\\Post", parent = Content)]
pub struct Post {
    pub author: Option<Handle<User>>,
    pub score: f64,
    pub tags: Option<serde_json::Value>,
}

#[derive(Entity)]
#[entity(parent = Content)]
pub struct Page {
    #[entity(length = 64, index)]
    pub slug: String,
}

/// Hidden notes are unreadable; no note can be deleted without force.
#[derive(Entity)]
#[entity(hooks = "manual")]
pub struct Note {
    #[entity(length = 191)]
    pub label: String,
    pub hidden: bool,
}

impl Entity for Note {
    fn is_readable(entity: &Handle<Self>, session: &Session) -> bool {
        !session.get::<Self, bool>(entity, "hidden").unwrap_or(false)
    }

    fn is_deletable(_entity: &Handle<Self>, _session: &Session) -> bool {
        false
    }
}

thread_local! {
    static HOOK_CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Returns and forgets the lifecycle hooks run on this thread so far.
pub fn take_hook_calls() -> Vec<String> {
    HOOK_CALLS.with(|calls| calls.take())
}

/// Locked drafts cannot be stored without force; stores and deletes are
/// recorded.
#[derive(Entity)]
#[entity(hooks = "manual")]
pub struct Draft {
    #[entity(length = 191)]
    pub body: String,
    pub locked: bool,
}

impl Entity for Draft {
    fn is_editable(entity: &Handle<Self>, session: &Session) -> bool {
        !session.get::<Self, bool>(entity, "locked").unwrap_or(false)
    }

    fn on_stored(entity: &Handle<Self>, _session: &Session) {
        let id = entity.id().unwrap_or_default();
        HOOK_CALLS.with(|calls| calls.borrow_mut().push(format!("stored {id}")));
    }

    fn on_deleted(entity: &Handle<Self>, _session: &Session) {
        let stored = entity.is_stored();
        HOOK_CALLS.with(|calls| calls.borrow_mut().push(format!("deleted, stored: {stored}")));
    }
}

pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .register::<User>()
        .register::<Content>()
        .register::<Post>()
        .register::<Page>()
        .register::<Note>()
        .register::<Draft>();
    catalog
}

/// A file-backed database with the schema in place.
pub struct TestDb {
    dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let db = Self {
            dir: TempDir::new().unwrap(),
        };
        let conn = db.connect();
        let registry = Arc::new(catalog().registry().clone());
        sync_schema(&conn, registry, SyncOptions::default()).unwrap();
        conn.disconnect().unwrap();
        db
    }

    pub fn config(&self) -> ConnectionConfig {
        let path = self.dir.path().join("app.db");
        ConnectionConfig::new(Engine::Sqlite, format!("sqlite://{}", path.display())).dev_mode(true)
    }

    pub fn connect(&self) -> SqliteConnection {
        SqliteConnection::new(self.config()).unwrap()
    }

    pub fn session(&self) -> Session {
        Session::new(catalog(), Box::new(self.connect()))
    }

    /// A session whose queries are counted.
    pub fn counted_session(&self, prefetch: bool) -> (Session, Rc<Cell<usize>>) {
        let (session, counters) = self.counting_session(prefetch);
        (session, counters.queries)
    }

    /// A session whose queries and writes are counted separately.
    pub fn counting_session(&self, prefetch: bool) -> (Session, Counters) {
        let counters = Counters::default();
        let conn = CountingConnection {
            inner: Box::new(self.connect()),
            counters: counters.clone(),
        };
        let options = SessionOptions {
            prefetch,
            ..SessionOptions::default()
        };
        (
            Session::with_options(catalog(), Box::new(conn), options),
            counters,
        )
    }
}

/// Statements seen by a [`CountingConnection`].
#[derive(Clone, Default)]
pub struct Counters {
    pub queries: Rc<Cell<usize>>,
    pub writes: Rc<Cell<usize>>,
}

impl Counters {
    pub fn total(&self) -> usize {
        self.queries.get() + self.writes.get()
    }
}

/// Counts the statements sent through it.
pub struct CountingConnection {
    inner: Box<dyn SqlConnection>,
    counters: Counters,
}

impl SqlConnection for CountingConnection {
    fn engine(&self) -> Engine {
        self.inner.engine()
    }

    fn connect(&self) -> storable_core::Result<()> {
        self.inner.connect()
    }

    fn disconnect(&self) -> storable_core::Result<()> {
        self.inner.disconnect()
    }

    fn execute(&self, sql: &str) -> storable_core::Result<u64> {
        let writes = &self.counters.writes;
        writes.set(writes.get() + 1);
        self.inner.execute(sql)
    }

    fn query(&self, sql: &str) -> storable_core::Result<Vec<Row>> {
        let queries = &self.counters.queries;
        queries.set(queries.get() + 1);
        self.inner.query(sql)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.inner.last_insert_id()
    }

    fn tables(&self) -> storable_core::Result<Vec<String>> {
        self.inner.tables()
    }

    fn table_columns(&self, table: &str) -> storable_core::Result<Vec<ColumnInfo>> {
        self.inner.table_columns(table)
    }

    fn table_indexes(&self, table: &str) -> storable_core::Result<Vec<IndexInfo>> {
        self.inner.table_indexes(table)
    }
}

pub fn new_user(session: &Session, email: &str) -> Handle<User> {
    let user = User {
        email: email.to_string(),
        bio: None,
    }
    .into_entity(session)
    .unwrap();
    session.store(&user, false).unwrap();
    user
}

pub fn new_post(session: &Session, title: &str, author: Option<&Handle<User>>) -> Handle<Post> {
    let post = Post {
        author: author.cloned(),
        score: 1.5,
        tags: None,
    }
    .into_entity(session)
    .unwrap();
    session.set(&post, "title", title.to_string()).unwrap();
    session.store(&post, false).unwrap();
    post
}
