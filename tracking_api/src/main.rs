use shared::{ApiSettings, init_tracing, initialize_db, load_config, shutdown_listener};
use tracing::info;
use tracking_api::state::AppState;

const EXPORT_BINDINGS_FLAG: &str = "--export-bindings";
const BINDINGS_PATH: &str = "./bindings.ts";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Regenerates the dashboard's TypeScript types and exits.
    if std::env::args().any(|arg| arg == EXPORT_BINDINGS_FLAG) {
        specta_typescript::Typescript::default()
            .bigint(specta_typescript::BigIntExportBehavior::Number)
            .export_to(BINDINGS_PATH, &specta::export())?;
        println!("exported TypeScript bindings to {BINDINGS_PATH}");
        return Ok(());
    }

    let telemetry = init_tracing("tracking_api")?;
    info!(name: "telemetry.initialized", otlp_export = telemetry.is_exporting(), "tracing initialized");

    let settings: ApiSettings = load_config()?;
    info!(name: "config.loaded", config = ?settings, "config loaded");

    let pool = initialize_db(&settings.postgres, true).await?;
    let state = AppState::new(pool, &settings);
    let app = tracking_api::app(state);

    let listen_addr = settings.api.listen_addr.as_str();
    info!(name: "server.starting", listen_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_listener(None))
        .await?;

    info!(name: "server.stopped", "server stopped");
    telemetry.shutdown();
    Ok(())
}
