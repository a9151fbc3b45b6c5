//! End-to-end dispatch through the axum application.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt;

use poly_web::db::{Params, Select};
use poly_web::http::{Context, Controller, Controllers, HttpError, HttpServer};
use poly_web::routing::{Defaults, Router};
use poly_web::Dispatcher;

mod common;

struct Posts;

impl Controller for Posts {
    fn actions(&self) -> &[&'static str] {
        &["index", "view", "create", "back"]
    }

    fn before_filter(&self, ctx: &mut Context) -> Result<(), HttpError> {
        ctx.header("X-Controller", "posts");
        Ok(())
    }

    fn invoke(&self, action: &str, ctx: &mut Context) -> Result<(), HttpError> {
        match action {
            "index" => {
                let posts = ctx
                    .orm()
                    .table("Post")?
                    .find_all(&Select::new().order("id"), &Params::new())?;
                ctx.set("posts", posts);
            }
            "view" => {
                let id: i64 = ctx
                    .arg(0)
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| HttpError::not_found("post"))?;
                let post = ctx
                    .orm()
                    .table("Post")?
                    .find_by_id(id)?
                    .ok_or_else(|| HttpError::not_found(format!("post {}", id)))?;
                ctx.set("post", post);
            }
            "create" => {
                let data: Json = ctx.body_json()?;
                let id = {
                    let posts = ctx.orm().table("Post")?;
                    let mut post = posts.new_record();
                    if let Some(title) = data.get("title").and_then(Json::as_str) {
                        post.set("title", title);
                    }
                    posts.save(&mut post)?;
                    post.first_id()
                };
                ctx.set_status(201).set("id", id);
            }
            "back" => {
                ctx.redirect("/posts/index", None);
            }
            _ => return Err(HttpError::not_found(action)),
        }
        Ok(())
    }
}

fn dispatcher() -> Arc<Dispatcher> {
    let mut router = Router::with_extensions(vec!["json".to_string()]);
    router
        .connect("/", Defaults::new().set("controller", "posts").set("action", "index"), Vec::<(String, String)>::new())
        .unwrap();
    router
        .connect("/:controller/:action", Defaults::new(), [("controller", "[a-z]+")])
        .unwrap();

    let mut controllers = Controllers::new();
    controllers.register(None, "posts", Posts);
    let orm = Arc::new(common::blog_orm());
    Arc::new(Dispatcher::new(router, controllers, orm).with_full_base("http://example.test"))
}

async fn send(app: axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let request = HttpRequest::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_create_then_list_and_view() {
    let server = HttpServer::new(&common::server_config(""), dispatcher());

    let (status, headers, body) = send(server.app(), "POST", "/posts/create", r#"{"title":"hello"}"#).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers.get("x-controller").unwrap(), "posts");
    assert_eq!(serde_json::from_str::<Json>(&body).unwrap(), json!({"id": 1}));

    let (status, headers, body) = send(server.app(), "GET", "/", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    let listed: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(listed["posts"][0]["title"], "hello");

    let (status, _, body) = send(server.app(), "GET", "/posts/view/1.json", "").await;
    assert_eq!(status, StatusCode::OK);
    let viewed: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(viewed["post"]["id"], 1);
}

#[tokio::test]
async fn test_error_statuses() {
    let server = HttpServer::new(&common::server_config(""), dispatcher());

    let (status, _, _) = send(server.app(), "POST", "/posts/create", r#"{"body":"untitled"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(server.app(), "POST", "/posts/create", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(server.app(), "GET", "/posts/view/42", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for missing in ["/users/index", "/posts/destroy", "/posts/_private", "/Posts1/index"] {
        let (status, _, _) = send(server.app(), "GET", missing, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", missing);
    }
}

#[tokio::test]
async fn test_redirect_and_request_id() {
    let server = HttpServer::new(&common::server_config(""), dispatcher());

    let (status, headers, _) = send(server.app(), "GET", "/posts/back", "").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers.get("location").unwrap(), "http://example.test/posts/index");

    let id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);

    let request = HttpRequest::builder()
        .uri("/posts/index")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = server.app().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me");
}

#[tokio::test]
async fn test_base_path_is_stripped() {
    let server = HttpServer::new(&common::server_config("/blog"), dispatcher());

    let (status, _, body) = send(server.app(), "GET", "/blog/posts/index", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Json>(&body).unwrap(), json!({"posts": []}));

    let (status, _, _) = send(server.app(), "GET", "/blog", "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_route_table_swap() {
    let dispatcher = dispatcher();
    let server = HttpServer::new(&common::server_config(""), Arc::clone(&dispatcher));

    let mut router = Router::new();
    router
        .connect("/articles/:action", Defaults::new().set("controller", "posts"), Vec::<(String, String)>::new())
        .unwrap();
    dispatcher.swap_router(router);

    let (status, _, _) = send(server.app(), "GET", "/articles/index", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(server.app(), "GET", "/posts/index", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_serves_over_tcp_until_shutdown() {
    let config = common::server_config("");
    let (addr, shutdown) = common::spawn_server(&config, dispatcher()).await;

    let res = reqwest::get(format!("http://{}/posts/index", addr)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Json = res.json().await.unwrap();
    assert_eq!(body, json!({"posts": []}));

    shutdown.trigger();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(reqwest::get(format!("http://{}/posts/index", addr)).await.is_err());
}
