//! Startup wiring.
//!
//! Assembles the typed dependency set once. Tests and alternative
//! deployments substitute collaborators through [`Overrides`] at compose
//! time; nothing is swapped after construction.

use std::sync::Arc;

use tracing::info;

use crate::channels::{
    ConsoleTransport, EmailTransport, SmsTransport, SmtpEmailTransport, TwilioSmsTransport,
};
use crate::config::{DispatchConfig, DispatchMode};
use crate::dispatch::{MessageDispatcher, Orchestrator, OrchestratorSettings};
use crate::hooks::HookRunner;
use crate::requests::RequestService;
use crate::store::Database;
use crate::templates::{Renderer, TemplateRenderer};

/// Collaborators to use instead of the configured defaults.
#[derive(Default, Clone)]
pub struct Overrides {
    pub email: Option<Arc<dyn EmailTransport>>,
    pub sms: Option<Arc<dyn SmsTransport>>,
    pub renderer: Option<Arc<dyn Renderer>>,
}

/// Everything the server and service layer need.
#[derive(Clone)]
pub struct AppDeps {
    pub config: DispatchConfig,
    pub db: Arc<dyn Database>,
    pub orchestrator: Arc<Orchestrator>,
    pub hooks: Arc<HookRunner>,
    pub requests: Arc<RequestService>,
    /// Set in console mode so callers can inspect echoed messages.
    pub console: Option<Arc<ConsoleTransport>>,
}

impl AppDeps {
    pub fn build(config: DispatchConfig, db: Arc<dyn Database>, overrides: Overrides) -> Self {
        let console = match config.mode {
            DispatchMode::Console => Some(Arc::new(ConsoleTransport::new())),
            DispatchMode::Live => None,
        };

        let email: Arc<dyn EmailTransport> = match (overrides.email, &console) {
            (Some(email), _) => email,
            (None, Some(console)) => console.clone(),
            (None, None) => Arc::new(SmtpEmailTransport::new(config.smtp.clone())),
        };
        let sms: Arc<dyn SmsTransport> = match (overrides.sms, &console) {
            (Some(sms), _) => sms,
            (None, Some(console)) => console.clone(),
            (None, None) => Arc::new(TwilioSmsTransport::new(config.twilio.clone())),
        };
        let renderer: Arc<dyn Renderer> = overrides.renderer.unwrap_or_else(|| {
            Arc::new(TemplateRenderer::new(db.clone(), config.template_dir.clone()))
        });

        let dispatcher = MessageDispatcher::new(db.clone(), renderer, email, sms);
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            dispatcher,
            OrchestratorSettings::from(&config),
        ));
        let hooks = Arc::new(HookRunner::new(orchestrator.clone()));
        let requests = Arc::new(RequestService::new(db.clone(), hooks.clone()));

        info!(mode = ?config.mode, fan_out = ?config.fan_out, "Dependencies assembled");

        Self {
            config,
            db,
            orchestrator,
            hooks,
            requests,
            console,
        }
    }
}
