use anyhow::Context;
use sb_app::cli::FetchArgs;
use sb_app::config_loader;
use sb_app::shutdown_handler;
use sb_app::tracing_setup;
use sb_http::Dispatcher;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

const APP_NAME: &str = "sb_fetch";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = FetchArgs::parse(std::env::args().skip(1))?;
    let config = config_loader::load_config(&args.config_path).with_context(|| format!("loading config from {}", args.config_path))?;

    let _guard = tracing_setup::init(APP_NAME, &config.log_dir, config.level());
    info!("Starting {} against region {}", APP_NAME, args.region.as_deref().unwrap_or(&config.dispatcher.region));

    let dispatcher = Dispatcher::new(config.dispatcher).context("building dispatcher")?;
    let cancel = CancellationToken::new();
    let shutdown = shutdown_handler::cancel_on_ctrl_c(cancel.clone());

    let calls = args.descriptors().into_iter().map(|descriptor| {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move {
            let label = descriptor.debug_label.clone();
            (label, dispatcher.submit_with_cancel(descriptor, cancel).await)
        }
    });

    let mut failures = 0usize;
    for (label, result) in futures::future::join_all(calls).await {
        match result {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(err) => {
                failures += 1;
                error!(%label, kind = ?err.kind(), "{}", err);
            }
        }
    }

    cancel.cancel();
    let _ = shutdown.await;

    if failures > 0 {
        anyhow::bail!("{} of {} calls failed", failures, args.paths.len());
    }
    Ok(())
}
