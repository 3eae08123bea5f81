use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webscout::{Dispatcher, ErrorCode, ToolEnvelope, TOOLS};

#[derive(Parser, Debug)]
#[command(name = "webscout")]
#[command(about = "Resilient page and social-post retrieval for agent tool calls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server.
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Dispatch one tool call and print its envelope (json).
    Call(CallCmd),
    /// List the available tools.
    Tools(ToolsCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct CallCmd {
    /// Tool name (web_search, web_scrape, multi_scrape, social_timeline, social_post_scrape).
    tool: String,
    /// Tool arguments as a JSON object.
    #[arg(long, conflicts_with = "args_json_file")]
    args_json: Option<String>,
    /// Read tool arguments from a JSON file.
    #[arg(long)]
    args_json_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ToolsCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[cfg(feature = "stdio")]
mod mcp {
    use rmcp::{
        handler::server::router::tool::ToolRouter as RmcpToolRouter,
        handler::server::wrapper::Parameters,
        model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
        tool, tool_handler, tool_router,
        transport::stdio,
        ErrorData as McpError, ServiceExt,
    };
    use serde::Serialize;
    use webscout::dispatch::{
        MultiScrapeArgs, SocialPostScrapeArgs, SocialTimelineArgs, WebScrapeArgs, WebSearchArgs,
    };
    use webscout::Dispatcher;

    fn tool_result(payload: serde_json::Value) -> CallToolResult {
        // Structured content for machine consumers, plus a text fallback for clients that only
        // read `content[0].text`.
        let mut r = CallToolResult::structured(payload.clone());
        r.content = vec![Content::text(payload.to_string())];
        r
    }

    #[derive(Clone)]
    pub(crate) struct WebscoutMcp {
        tool_router: RmcpToolRouter<Self>,
        dispatcher: Dispatcher,
    }

    #[tool_router]
    impl WebscoutMcp {
        pub(crate) fn new() -> Result<Self, McpError> {
            let dispatcher = Dispatcher::from_env()
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            Ok(Self {
                tool_router: Self::tool_router(),
                dispatcher,
            })
        }

        async fn run<T: Serialize>(&self, name: &str, args: Option<T>) -> CallToolResult {
            let args = args
                .and_then(|a| serde_json::to_value(a).ok())
                .unwrap_or(serde_json::Value::Null);
            tool_result(self.dispatcher.dispatch(name, args).await.into_json())
        }

        #[tool(description = "Search the web; returns up to 5 results (url, title, snippet)")]
        async fn web_search(
            &self,
            params: Parameters<Option<WebSearchArgs>>,
        ) -> Result<CallToolResult, McpError> {
            Ok(self.run("web_search", params.0).await)
        }

        #[tool(description = "Fetch one web page and return its main readable text")]
        async fn web_scrape(
            &self,
            params: Parameters<Option<WebScrapeArgs>>,
        ) -> Result<CallToolResult, McpError> {
            Ok(self.run("web_scrape", params.0).await)
        }

        #[tool(
            description = "Read up to 3 URLs concurrently (social post URLs are summarized); partial failures are reported per item"
        )]
        async fn multi_scrape(
            &self,
            params: Parameters<Option<MultiScrapeArgs>>,
        ) -> Result<CallToolResult, McpError> {
            Ok(self.run("multi_scrape", params.0).await)
        }

        #[tool(description = "Recent posts (up to 10, newest first) for a social-media username")]
        async fn social_timeline(
            &self,
            params: Parameters<Option<SocialTimelineArgs>>,
        ) -> Result<CallToolResult, McpError> {
            Ok(self.run("social_timeline", params.0).await)
        }

        #[tool(description = "One social-media post by URL, with the conversation around it")]
        async fn social_post_scrape(
            &self,
            params: Parameters<Option<SocialPostScrapeArgs>>,
        ) -> Result<CallToolResult, McpError> {
            Ok(self.run("social_post_scrape", params.0).await)
        }
    }

    #[tool_handler]
    impl rmcp::ServerHandler for WebscoutMcp {
        fn get_info(&self) -> ServerInfo {
            ServerInfo {
                instructions: Some(
                    "Live web pages and social-media posts for agents. Every tool returns one JSON envelope with ok, error_code, and suggestion fields."
                        .to_string(),
                ),
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                ..Default::default()
            }
        }
    }

    pub(crate) async fn serve_stdio() -> Result<(), McpError> {
        let svc = WebscoutMcp::new()?;
        let running = svc
            .serve(stdio())
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        // Keep the stdio server alive until the client closes.
        running
            .waiting()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(())
    }
}

/// Optional `KEY=VALUE` file named by `WEBSCOUT_ENV_FILE`; never overrides the process env.
fn load_env_file() {
    let Ok(p) = std::env::var("WEBSCOUT_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn init_tracing() {
    // stdout carries tool output (and the MCP channel), so logs go to stderr.
    let filter = tracing_subscriber::EnvFilter::try_from_env("WEBSCOUT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_call_args(cmd: &CallCmd) -> std::result::Result<serde_json::Value, String> {
    let raw = match (&cmd.args_json, &cmd.args_json_file) {
        (Some(s), _) => s.clone(),
        (None, Some(p)) => std::fs::read_to_string(p)
            .map_err(|e| format!("cannot read {}: {e}", p.display()))?,
        (None, None) => return Ok(serde_json::json!({})),
    };
    let v: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("arguments are not valid JSON: {e}"))?;
    if !(v.is_object() || v.is_null()) {
        return Err("arguments must be a JSON object".to_string());
    }
    Ok(v)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Call(cmd) => {
            let env = match read_call_args(&cmd) {
                Ok(args) => Dispatcher::from_env()?.dispatch(&cmd.tool, args).await,
                Err(msg) => ToolEnvelope::error(&cmd.tool, ErrorCode::InvalidParams, msg, None, 0),
            };
            println!("{}", env.to_text());
        }
        Commands::Tools(args) => match args.output.to_ascii_lowercase().as_str() {
            "text" => {
                for t in &TOOLS {
                    println!("{:<20} {}", t.name, t.description);
                }
            }
            _ => {
                let tools: Vec<serde_json::Value> = TOOLS
                    .iter()
                    .map(|t| serde_json::json!({ "name": t.name, "description": t.description }))
                    .collect();
                let v = serde_json::json!({
                    "schema_version": webscout::envelope::SCHEMA_VERSION,
                    "kind": "tools",
                    "ok": true,
                    "tools": tools,
                });
                println!("{v}");
            }
        },
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": webscout::envelope::SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "webscout",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webscout {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
