//! Shared fixtures for integration tests: a blog schema on in-memory
//! SQLite and helpers to serve an application on a local port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use poly_web::config::{DatabaseConfig, ServerConfig};
use poly_web::db::{DataSource, DataSources, Model, ModelMeta, Orm, Record, Relation, SchemaCache, Select};
use poly_web::http::HttpServer;
use poly_web::lifecycle::Shutdown;
use poly_web::validator::{Rule, ValidationErrors, Validator};
use poly_web::Dispatcher;

pub const BLOG_SCHEMA: &str = "
    CREATE TABLE users (id INTEGER PRIMARY KEY, username VARCHAR(30), email VARCHAR(100), active BOOLEAN);
    CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER, title VARCHAR(100), body TEXT, published BOOLEAN);
    CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER, body TEXT);
    CREATE TABLE tags (id INTEGER PRIMARY KEY, name VARCHAR(30));
    CREATE TABLE post_tag (post_id INTEGER, tag_id INTEGER, PRIMARY KEY (post_id, tag_id));
";

/// Posts need a title of at most 100 characters; a title of `"abort"`
/// is refused by `before_save`. `FirstComment` is the oldest comment.
pub struct PostModel {
    meta: ModelMeta,
}

impl PostModel {
    pub fn new() -> Self {
        Self {
            meta: ModelMeta::new("Post")
                .display_field("title")
                .cache_queries(true)
                .relation("User", Relation::belongs_to("User"))
                .relation("Comment", Relation::has_many("Comment"))
                .relation("FirstComment", Relation::has_one("Comment").extra(Select::new().order("id")))
                .relation("Tag", Relation::has_and_belongs_to_many("Tag")),
        }
    }
}

impl Model for PostModel {
    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn validate(&self, record: &Record) -> Result<(), ValidationErrors> {
        let mut v = Validator::new(record);
        if v.required("title") {
            v.check("title", Rule::MaxLength(100), "Title is too long");
        }
        v.into_result()
    }

    fn before_save(&self, record: &mut Record) -> bool {
        record.get("title").and_then(|t| t.as_str()) != Some("abort")
    }
}

/// Blog models registered on a fresh in-memory database.
pub fn blog_orm() -> Orm {
    let sources = DataSources::default();
    let source = sources.insert(
        DataSource::open("default", &DatabaseConfig::default()).expect("open in-memory database"),
    );
    source.execute_batch(BLOG_SCHEMA).expect("create blog schema");

    let mut orm = Orm::new(sources, SchemaCache::new());
    orm.register(
        ModelMeta::new("User")
            .display_field("username")
            .relation("Post", Relation::has_many("Post").extra(Select::new().order("id"))),
    );
    orm.register(PostModel::new());
    orm.register(ModelMeta::new("Comment").relation("Post", Relation::belongs_to("Post")));
    orm.register(
        ModelMeta::new("Tag")
            .display_field("name")
            .relation("Post", Relation::has_and_belongs_to_many("Post")),
    );
    orm
}

#[allow(dead_code)]
pub fn server_config(base_path: &str) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        base_path: base_path.to_string(),
        full_base: "http://example.test".to_string(),
        ..ServerConfig::default()
    }
}

/// Serve `dispatcher` on an ephemeral port until the returned
/// [`Shutdown`] is triggered.
#[allow(dead_code)]
pub async fn spawn_server(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, dispatcher);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, None, rx).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}
