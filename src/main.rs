use std::sync::Arc;

use sales_agent::api::session_routes;
use sales_agent::config::{AppConfig, DeliveryBackend};
use sales_agent::llm::create_provider;
use sales_agent::mailer::{
    DeliveryAdapter, EmailFormatter, EmailProvider, SendGridProvider, SmtpProvider, load_contacts,
};
use sales_agent::observability::{LogConfig, init_tracing};
use sales_agent::repl::Repl;
use sales_agent::session::{ApprovalStateMachine, SessionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let _log_guards = init_tracing(&LogConfig::from_env());

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export FROM_EMAIL=you@company.com");
        eprintln!("  export SENDGRID_API_KEY=SG....   (or EMAIL_SMTP_HOST=...)");
        std::process::exit(1);
    });

    // ── Pipeline ─────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm);
    let orchestrator = Arc::new(config.file.build_orchestrator(llm.clone())?);

    let timeouts = &config.file.timeouts;
    let provider: Arc<dyn EmailProvider> = match &config.delivery.backend {
        DeliveryBackend::SendGrid { api_key } => Arc::new(SendGridProvider::new(api_key.clone())),
        DeliveryBackend::Smtp(smtp) => Arc::new(SmtpProvider::new(smtp, timeouts.send())?),
    };
    let machine = Arc::new(ApprovalStateMachine::new(
        orchestrator.clone(),
        EmailFormatter::new(llm.clone(), timeouts.subject()),
        DeliveryAdapter::new(
            provider.clone(),
            config.delivery.from_address.clone(),
            timeouts.send(),
        ),
    ));

    let contacts = match &config.contacts_path {
        Some(path) => load_contacts(path)?.contacts,
        None => Vec::new(),
    };

    eprintln!("✉️  Sales Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} at {}", llm.model_name(), config.llm.api_url);
    eprintln!("   Strategies: {}", orchestrator.strategy_count());
    eprintln!(
        "   Delivery: {} from {}",
        provider.name(),
        config.delivery.from_address
    );
    eprintln!("   Contacts: {}", contacts.len());
    eprintln!(
        "   Sender: {}",
        config.sender_name.as_deref().unwrap_or("(unset, use /sender)")
    );

    // ── HTTP surface ─────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = session_routes(SessionStore::new(), machine.clone());
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        eprintln!("   Session API: http://0.0.0.0:{port}/api/sessions");
        tokio::spawn(async move {
            tracing::info!(port, "Session API started");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Session API stopped");
            }
        });
    }

    eprintln!("   Type a sales request and press Enter. /help for commands.\n");

    Repl::new(machine, config.sender_name.clone(), contacts)
        .run()
        .await;

    tracing::info!("Shutting down");
    Ok(())
}
