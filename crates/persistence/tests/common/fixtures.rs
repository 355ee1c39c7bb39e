//! Test fixtures: the `User` model and store construction.

use std::sync::Arc;

use hybrid_persistence::backends::memory::{MemoryPrimaryStore, MemorySearchIndex};
use hybrid_persistence::config::HybridConfig;
use hybrid_persistence::hybrid::{Entity, HybridStore};
use hybrid_persistence::query::{Param, Query};
use hybrid_persistence::schema::{
    PropertyDescriptor, Schema, SchemaRegistry, StorageDestination,
};
use hybrid_persistence::types::GeoPoint;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Property descriptors of the `User` model.
#[derive(Debug, Clone)]
pub struct UserProperties {
    /// Short text, primary-eligible.
    pub username: Arc<PropertyDescriptor>,
    /// Bounded integer.
    pub age: Arc<PropertyDescriptor>,
    /// Geo-point, search-only for queries.
    pub location: Arc<PropertyDescriptor>,
    /// Unbounded text stored only in the search index.
    pub bio: Arc<PropertyDescriptor>,
    /// Text above the primary length threshold.
    pub nickname: Arc<PropertyDescriptor>,
    /// Boolean with a default.
    pub active: Arc<PropertyDescriptor>,
    /// Timestamp.
    pub joined: Arc<PropertyDescriptor>,
}

impl UserProperties {
    /// Builds the descriptors.
    pub fn new() -> Self {
        Self {
            username: PropertyDescriptor::text("username")
                .max_len(50)
                .required()
                .build()
                .expect("username"),
            age: PropertyDescriptor::integer("age")
                .int_range(Some(0), Some(150))
                .build()
                .expect("age"),
            location: PropertyDescriptor::geo_point("location")
                .build()
                .expect("location"),
            bio: PropertyDescriptor::text("bio")
                .unbounded()
                .destination(StorageDestination::Search)
                .build()
                .expect("bio"),
            nickname: PropertyDescriptor::text("nickname")
                .max_len(1000)
                .build()
                .expect("nickname"),
            active: PropertyDescriptor::boolean("active")
                .default(true)
                .build()
                .expect("active"),
            joined: PropertyDescriptor::datetime("joined")
                .build()
                .expect("joined"),
        }
    }
}

/// Builds the `User` schema with its named queries.
///
/// | Query | Definition | Backend |
/// |-------|------------|---------|
/// | `by_username` | `username = ?` | primary |
/// | `by_age_range` | `age >= :min AND age < :max (default 200)` | primary |
/// | `by_nickname` | `nickname = ?` | search |
/// | `not_named_older_than` | `username != ? AND age > ?` | search |
/// | `near` | `distance(location, ?) < meters` | search |
/// | `age_in` | `age IN ?` | primary unless the list is long |
/// | `active_users` | `active = true` | primary |
/// | `joined_since` | `joined >= ?` | primary |
/// | `joined_by_older_than` | `joined <= ? AND age > ?` | search |
/// | `all` | no filter | primary |
pub fn user_schema(config: &HybridConfig) -> Arc<Schema> {
    let p = UserProperties::new();
    Schema::builder("User")
        .config(config)
        .properties([
            p.username.clone(),
            p.age.clone(),
            p.location.clone(),
            p.bio.clone(),
            p.nickname.clone(),
            p.active.clone(),
            p.joined.clone(),
        ])
        .query("by_username", Query::by(&p.username).expect("by_username"))
        .query(
            "by_age_range",
            Query::new([
                p.age.ge(Param::named("min")).expect("min"),
                p.age
                    .lt(Param::named("max").with_default(200))
                    .expect("max"),
            ]),
        )
        .query("by_nickname", Query::by(&p.nickname).expect("by_nickname"))
        .query(
            "not_named_older_than",
            Query::new([
                p.username.ne(Param::positional()).expect("username"),
                p.age.gt(Param::positional()).expect("age"),
            ]),
        )
        .query("near", Query::new([p.location.lt(Param::positional()).expect("near")]))
        .query("age_in", Query::new([p.age.is_in(Param::positional()).expect("age_in")]))
        .query("active_users", Query::new([p.active.eq(true).expect("active")]))
        .query(
            "joined_since",
            Query::new([p.joined.ge(Param::positional()).expect("joined")]),
        )
        .query(
            "joined_by_older_than",
            Query::new([
                p.joined.le(Param::positional()).expect("joined"),
                p.age.gt(Param::positional()).expect("age"),
            ]),
        )
        .query("all", Query::all())
        .build()
        .expect("User schema")
}

/// A `Post` model referencing its author.
pub fn post_schema() -> Arc<Schema> {
    let author = PropertyDescriptor::reference("author", "User")
        .required()
        .build()
        .expect("author");
    let title = PropertyDescriptor::text("title")
        .max_len(200)
        .build()
        .expect("title");
    Schema::builder("Post")
        .properties([author.clone(), title])
        .query("by_author", Query::by(&author).expect("by_author"))
        .build()
        .expect("Post schema")
}

/// A store over fresh in-memory backends, with handles to both backends.
pub struct TestStore {
    /// The store under test.
    pub store: HybridStore,
    /// The primary backend, for inspecting counters and records.
    pub primary: Arc<MemoryPrimaryStore>,
    /// The search backend, for inspecting counters and documents.
    pub search: Arc<MemorySearchIndex>,
}

/// Creates a store with the default configuration.
pub fn create_store() -> TestStore {
    create_store_with(HybridConfig::default())
}

/// Creates a store with `config`.
pub fn create_store_with(config: HybridConfig) -> TestStore {
    init_tracing();
    let primary = Arc::new(MemoryPrimaryStore::new());
    let search = Arc::new(MemorySearchIndex::new());
    let registry = SchemaRegistry::new()
        .with(user_schema(&config))
        .and_then(|r| r.with(post_schema()))
        .expect("registry");
    let store =
        HybridStore::new(primary.clone(), search.clone(), registry, config).expect("valid config");
    TestStore {
        store,
        primary,
        search,
    }
}

/// An unsaved user.
pub fn new_user(store: &HybridStore, username: &str, age: i64) -> Entity {
    store
        .create("User")
        .expect("User kind")
        .with("username", username)
        .and_then(|u| u.with("age", age))
        .expect("valid user")
}

/// Somewhere in central London.
pub fn london() -> GeoPoint {
    GeoPoint::new(51.5074, -0.1278)
}

/// Somewhere in central Paris.
pub fn paris() -> GeoPoint {
    GeoPoint::new(48.8566, 2.3522)
}
