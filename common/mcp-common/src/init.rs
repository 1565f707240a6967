//! Logging setup and the stdio server entry point

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Send logs to stderr; stdout carries MCP frames or chat output.
///
/// `crate_name` logs at `info` unless `RUST_LOG` says otherwise, and
/// `LOG_FORMAT=json` switches to one JSON object per line. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(format!("{crate_name}=info").parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_ansi(false).with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .try_init()?;
    Ok(())
}

/// `main` for a tool server: `serve_stdio!(FsMcpServer, "fs_mcp")`.
///
/// The type needs a `new()` constructor and an `rmcp::ServerHandler` impl.
#[macro_export]
macro_rules! serve_stdio {
    ($server:ty, $log_target:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            $crate::init_tracing($log_target)?;
            let running =
                rmcp::ServiceExt::serve(<$server>::new(), rmcp::transport::stdio()).await?;
            tracing::info!("{} serving on stdio", $log_target);
            running.waiting().await?;
            Ok(())
        }
    };
}
