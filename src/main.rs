use accessgate::{
    AppState, Config, EventIntake, JsonFileStore, Ledger, PaystackOracle, Reconciler,
    TelegramNotifier, VerificationOracle,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    if config.webhook_secret.is_none() {
        tracing::warn!("PAYSTACK_WEBHOOK_SECRET unset: webhook signatures will not be checked");
    }
    if config.gateway_secret_key.is_none() {
        tracing::warn!("PAYSTACK_SECRET_KEY unset: transactions will not be re-verified");
    }
    if config.admin_key.is_none() {
        tracing::warn!("ADMIN_API_KEY unset: admin endpoint is unguarded");
    }

    let store = Arc::new(JsonFileStore::new(config.store_path.clone()));
    let notifier = Arc::new(TelegramNotifier::new(
        config.bot_token.as_deref(),
        config.admin_chat_id,
    )?);
    let oracle: Option<Arc<dyn VerificationOracle>> = match config.gateway_secret_key.as_deref() {
        Some(key) => Some(Arc::new(PaystackOracle::new(&config.gateway_base_url, key)?)
            as Arc<dyn VerificationOracle>),
        None => None,
    };

    let ledger = Arc::new(Ledger::new(store, notifier.clone(), config.clone()));
    let intake = Arc::new(EventIntake::new(config.clone(), oracle));

    let reconciler = Reconciler::new(ledger.clone(), notifier, config.reconcile_interval);
    tokio::spawn(async move { reconciler.run().await });

    let app = accessgate::router(AppState {
        intake,
        ledger,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "accessgate listening");
    axum::serve(listener, app).await?;
    Ok(())
}
