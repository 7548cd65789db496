//! A running polisher attached to one host document.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use polisher_config::{ConfigError, ConfigValidator, PolisherConfig, SettingsStore};
use polisher_protocols::{ActionError, HostDocument, NodeId, RewriteClient, SurfaceId};

use crate::action::{ActionMachine, ActionOutcome, SurfaceState};
use crate::attach::{AttachmentController, DomProgressRenderer};
use crate::discovery::DiscoveryEngine;
use crate::intercept::SubmitInterceptor;
use crate::observer::{MutationBridge, PeriodicRescan, RescanReason, RescanScheduler};
use crate::registry::SurfaceRegistry;
use crate::templates::TemplateBar;

/// One full pass: prune, discover, attach, guard submit buttons.
struct Scanner {
    doc: Arc<dyn HostDocument>,
    root: NodeId,
    registry: Arc<SurfaceRegistry>,
    engine: DiscoveryEngine,
    controller: Arc<AttachmentController>,
    machine: Arc<ActionMachine>,
    renderer: Arc<DomProgressRenderer>,
    templates: Arc<TemplateBar>,
    interceptor: Arc<SubmitInterceptor>,
}

impl Scanner {
    fn scan(&self, reason: RescanReason) -> usize {
        let pruned = self.registry.prune_detached(self.doc.as_ref());
        if !pruned.is_empty() {
            self.machine.forget(&pruned);
            self.renderer.forget(&pruned);
            self.templates.forget(&pruned);
            self.interceptor.forget(&pruned);
        }

        if !self.doc.is_connected(self.root) {
            warn!("Scan root {} is detached", self.root);
            return 0;
        }

        let attached = self
            .controller
            .attach_all(self.engine.discover(self.doc.as_ref(), self.root));
        if let Err(e) = self.interceptor.guard(self.root) {
            debug!("Cannot guard submit buttons: {}", e);
        }
        debug!(
            ?reason,
            attached,
            pruned = pruned.len(),
            surfaces = self.registry.len(),
            "Scan complete"
        );
        attached
    }
}

/// Wires discovery, attachment, observation and the action machine together
/// for one host document.
///
/// Must be started from within a tokio runtime.
pub struct PolisherSession {
    scanner: Arc<Scanner>,
    settings: Arc<dyn SettingsStore>,
    config: PolisherConfig,
    signals: mpsc::UnboundedSender<RescanReason>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<RescanReason>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PolisherSession {
    /// Build a session scanning the whole document.
    ///
    /// Fails when `config` does not validate.
    pub fn new(
        doc: Arc<dyn HostDocument>,
        client: Arc<dyn RewriteClient>,
        settings: Arc<dyn SettingsStore>,
        config: PolisherConfig,
    ) -> Result<Self, ConfigError> {
        let root = doc.root();
        Self::with_root(doc, root, client, settings, config)
    }

    /// Build a session scanning the subtree under `root`.
    pub fn with_root(
        doc: Arc<dyn HostDocument>,
        root: NodeId,
        client: Arc<dyn RewriteClient>,
        settings: Arc<dyn SettingsStore>,
        config: PolisherConfig,
    ) -> Result<Self, ConfigError> {
        let validation = ConfigValidator::validate(&config);
        for warning in &validation.warnings {
            warn!("Config warning at {}: {}", warning.path, warning.message);
        }
        if let Some(error) = validation.errors.first() {
            return Err(ConfigError::InvalidValue {
                field: error.path.clone(),
                message: error.message.clone(),
            });
        }

        let registry = Arc::new(SurfaceRegistry::new());
        let renderer = Arc::new(DomProgressRenderer::new(doc.clone(), config.ui.clone()));
        let machine = Arc::new(
            ActionMachine::new(doc.clone(), registry.clone(), client, settings.clone())
                .with_prompts(config.prompts.clone())
                .with_timeout(config.timing.invocation_timeout())
                .with_renderer(renderer.clone()),
        );
        let templates = Arc::new(TemplateBar::new(doc.clone(), &config.templates));
        let interceptor = Arc::new(SubmitInterceptor::new(
            doc.clone(),
            registry.clone(),
            &config.intercept,
            &config.ui,
        ));
        let controller = Arc::new(
            AttachmentController::new(
                doc.clone(),
                registry.clone(),
                machine.clone(),
                renderer.clone(),
                &config.ui,
            )
            .with_templates(templates.clone())
            .with_interceptor(interceptor.clone()),
        );
        let engine = DiscoveryEngine::new(registry.clone());

        let (signals, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            scanner: Arc::new(Scanner {
                doc,
                root,
                registry,
                engine,
                controller,
                machine,
                renderer,
                templates,
                interceptor,
            }),
            settings,
            config,
            signals,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Scan once, then keep scanning on host mutations and on the fallback
    /// interval until [`shutdown`](Self::shutdown).
    ///
    /// Returns how many surfaces the initial scan attached. Starting twice is
    /// a no-op that returns 0.
    pub fn start(&self) -> usize {
        let Some(receiver) = self.receiver.lock().take() else {
            debug!("Session already started");
            return 0;
        };

        let timing = &self.config.timing;
        let scanner = self.scanner.clone();
        // Subscribe before the initial scan so nothing slips between them.
        let bridge = MutationBridge::start(
            scanner.doc.clone(),
            scanner.root,
            self.signals.clone(),
            self.cancel.clone(),
        );
        let periodic = PeriodicRescan::start(
            timing.rescan_interval(),
            self.signals.clone(),
            self.cancel.clone(),
        );
        let scheduler = RescanScheduler::from_timing(timing).spawn(
            receiver,
            self.cancel.clone(),
            move |reason| {
                scanner.scan(reason);
            },
        );
        let credential = {
            let settings = self.settings.clone();
            let controller = self.scanner.controller.clone();
            tokio::spawn(async move {
                if let Err(e) = check_credential(settings.as_ref(), &controller).await {
                    warn!("Cannot read settings: {}", e);
                }
            })
        };
        self.tasks.lock().extend([bridge, periodic, scheduler, credential]);

        let attached = self.scanner.scan(RescanReason::Manual);
        info!(
            attached,
            debounce_ms = timing.debounce_ms,
            rescan_interval_ms = timing.rescan_interval_ms,
            "Polisher session started"
        );
        attached
    }

    /// Scan synchronously. Returns how many surfaces were newly attached.
    pub fn scan_now(&self) -> usize {
        self.scanner.scan(RescanReason::Manual)
    }

    /// Ask the background scheduler for a scan.
    pub fn request_rescan(&self) {
        if self.signals.send(RescanReason::Manual).is_err() {
            debug!("Rescan requested after shutdown");
        }
    }

    /// Re-read settings and switch affordances between the rewrite and setup
    /// labels. Returns whether a credential is configured.
    pub async fn refresh_settings(&self) -> Result<bool, ConfigError> {
        check_credential(self.settings.as_ref(), &self.scanner.controller).await
    }

    /// Route a click on one of our nodes or on a host submit button.
    ///
    /// `Ok(None)` for a host submit button means the host should submit as
    /// usual; [`ActionOutcome::Held`] means it must wait for a later
    /// [`ActionOutcome::Submit`].
    pub async fn dispatch_click(&self, node: NodeId) -> Result<Option<ActionOutcome>, ActionError> {
        self.scanner.controller.dispatch_click(node).await
    }

    /// Trigger a rewrite as if the surface's affordance were clicked.
    pub async fn trigger(&self, surface: SurfaceId) -> Result<ActionOutcome, ActionError> {
        self.scanner.controller.trigger(surface).await
    }

    pub fn state(&self, surface: SurfaceId) -> SurfaceState {
        self.scanner.machine.state(surface)
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.scanner.registry
    }

    pub fn renderer(&self) -> &DomProgressRenderer {
        &self.scanner.renderer
    }

    pub fn templates(&self) -> &TemplateBar {
        &self.scanner.templates
    }

    pub fn interceptor(&self) -> &SubmitInterceptor {
        &self.scanner.interceptor
    }

    /// Whether affordances currently show the setup label.
    pub fn needs_setup(&self) -> bool {
        self.scanner.controller.needs_setup()
    }

    pub fn config(&self) -> &PolisherConfig {
        &self.config
    }

    /// Stop observing and wait for background tasks to finish.
    ///
    /// Instrumented surfaces keep their affordances.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Session task ended abnormally: {}", e);
            }
        }
        info!(surfaces = self.scanner.registry.len(), "Polisher session stopped");
    }
}

async fn check_credential(
    settings: &dyn SettingsStore,
    controller: &AttachmentController,
) -> Result<bool, ConfigError> {
    let present = settings.load().await?.has_credential();
    if !present {
        info!("No credential configured, affordances prompt for setup");
    }
    controller.set_credential_present(present);
    Ok(present)
}

impl Drop for PolisherSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PolisherSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolisherSession")
            .field("root", &self.scanner.root)
            .field("surfaces", &self.scanner.registry.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
