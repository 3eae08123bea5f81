#![cfg(feature = "stdio")]

use axum::{response::Html, routing::get, Router};
use rmcp::{
    model::CallToolRequestParam,
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use std::collections::BTreeSet;
use std::net::SocketAddr;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn call(
    service: &RunningService<RoleClient, ()>,
    name: &'static str,
    args: serde_json::Value,
) -> serde_json::Value {
    let r = service
        .call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(args.as_object().cloned().unwrap()),
        })
        .await
        .expect("call_tool");
    if let Some(v) = r.structured_content.clone() {
        return v;
    }
    for c in &r.content {
        if let Some(t) = c.as_text() {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&t.text) {
                return v;
            }
        }
    }
    serde_json::json!({})
}

const MAIN_POST: &str = r#"<html><body>
<div class="main-tweet">
  <div class="timeline-item">
    <a class="tweet-link" href="/jack/status/20#m"></a>
    <div class="tweet-body">
      <div class="tweet-header">
        <a class="fullname" href="/jack">jack</a>
        <a class="username" href="/jack">@jack</a>
        <span class="tweet-date"><a href="/jack/status/20#m" title="Mar 21, 2006 · 8:50 PM UTC">2006</a></span>
      </div>
      <div class="tweet-content media-body">just setting up my twttr</div>
    </div>
  </div>
</div>
</body></html>"#;

#[test]
fn webscout_stdio_serves_the_tool_surface() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        // A fake mirror: the post page exists, the timeline does not.
        let app = Router::new().route("/jack/status/20", get(|| async { Html(MAIN_POST) }));
        let mirror = serve(app).await;

        let bin = assert_cmd::cargo::cargo_bin!("webscout");
        let service = ()
            .serve(TokioChildProcess::new(
                tokio::process::Command::new(bin).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    cmd.env("WEBSCOUT_MIRRORS", format!("http://{mirror}"));
                    cmd.env("WEBSCOUT_PROXIES", "none");
                    cmd.env("WEBSCOUT_MIRROR_TIMEOUT_MS", "2000");
                    cmd.env_remove("WEBSCOUT_SEARCH_ENDPOINT");
                    cmd.env_remove("WEBSCOUT_ENV_FILE");
                }),
            )?)
            .await?;

        let tools = service.list_tools(Default::default()).await?;
        let names: BTreeSet<String> = tools
            .tools
            .iter()
            .map(|t| t.name.clone().into_owned())
            .collect();
        for must_have in [
            "web_search",
            "web_scrape",
            "multi_scrape",
            "social_timeline",
            "social_post_scrape",
        ] {
            assert!(names.contains(must_have), "missing tool {must_have}");
        }
        assert_eq!(names.len(), 5);

        let v = call(
            &service,
            "social_post_scrape",
            serde_json::json!({ "url": "https://x.com/jack/status/20" }),
        )
        .await;
        assert_eq!(v["ok"].as_bool(), Some(true), "{v}");
        assert_eq!(v["kind"].as_str(), Some("social_post_scrape"));
        assert_eq!(v["post"]["id"].as_str(), Some("20"));
        assert_eq!(v["post"]["text"].as_str(), Some("just setting up my twttr"));

        // The mirror answers 404 for the timeline, so the cascade is exhausted.
        let v = call(&service, "social_timeline", serde_json::json!({ "username": "jack" })).await;
        assert_eq!(v["ok"].as_bool(), Some(false));
        assert_eq!(v["error_code"].as_str(), Some("not_found_or_unavailable"));

        let v = call(&service, "web_search", serde_json::json!({ "query": "rust" })).await;
        assert_eq!(v["error_code"].as_str(), Some("not_configured"));

        let v = call(&service, "web_scrape", serde_json::json!({})).await;
        assert_eq!(v["error_code"].as_str(), Some("invalid_params"));

        service.cancel().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .expect("mcp stdio contract");
}
