//! Serves a small article API with public caching and ETag conditional GET.
//!
//! ```text
//! RUST_LOG=debug cargo run --example etag_server
//! curl -i http://127.0.0.1:8080/articles/1
//! curl -i -H 'If-None-Match: article-1-v3' http://127.0.0.1:8080/articles/1
//! ```

use std::time::{Duration, SystemTime};

use rttp_caching::{
    Pipeline, Response, Server, StatusCode,
    caching::{Caching, CachingOptions, CachingReply, Expires, privacy},
    context::Context,
    middleware::LoggerMiddleware,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

async fn article(ctx: Context) -> Response {
    let Some(id) = ctx.request().path().strip_prefix("/articles/") else {
        return Response::new(StatusCode::NotFound);
    };
    let body = json!({ "id": id, "title": format!("Article {id}"), "revision": 3 });

    match Response::json(StatusCode::Ok, &body) {
        Ok(response) => response
            .etag(format!("article-{id}-v3").as_str(), Duration::from_secs(600))
            .expires(Expires::from(SystemTime::now() + Duration::from_secs(300))),
        Err(err) => Response::new(StatusCode::InternalServerError).body(err.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let caching = Caching::new(
        CachingOptions::new()
            .privacy(privacy::PUBLIC)
            .expires_in(300)
            .server_expires_in(600)
            .cache_segment("articles"),
    );
    let app = caching.install(Pipeline::new(article).with(LoggerMiddleware));

    let server = Server::bind("127.0.0.1:8080").await?;
    server
        .serve_with_shutdown(app, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
