use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use polisher_config::{MemorySettingsStore, PolisherConfig, Settings};
use polisher_protocols::{
    ProviderSettings, RewriteClient, RewriteError, RewriteRequest, UsageContext,
};

use crate::dom::Document;
use crate::intercept::{CHOICE_ATTRIBUTE, CONFIRM_CLASS};

/// Replies with queued results, then echoes.
#[derive(Default)]
struct QueueClient {
    replies: Mutex<Vec<Result<String, RewriteError>>>,
}

#[async_trait]
impl RewriteClient for QueueClient {
    fn id(&self) -> &str {
        "queue"
    }

    async fn rewrite(
        &self,
        request: &RewriteRequest,
        _settings: &ProviderSettings,
    ) -> Result<String, RewriteError> {
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            Ok(format!("Polished: {}", request.text))
        } else {
            replies.remove(0)
        }
    }
}

struct Fixture {
    doc: Arc<Document>,
    registry: Arc<SurfaceRegistry>,
    controller: AttachmentController,
    textarea: NodeId,
    /// Host submit button; only present in assisted fixtures.
    submit: Option<NodeId>,
}

impl Fixture {
    fn new(text: &str, replies: Vec<Result<String, RewriteError>>) -> Self {
        Self::build(text, replies, false)
    }

    /// With the template bar, the submit interceptor and a host submit
    /// button in the form.
    fn assisted(text: &str, replies: Vec<Result<String, RewriteError>>) -> Self {
        Self::build(text, replies, true)
    }

    fn build(text: &str, replies: Vec<Result<String, RewriteError>>, assisted: bool) -> Self {
        let doc = Arc::new(Document::new());
        let mut form = ElementSpec::new("form")
            .class("js-new-comment-form")
            .child(ElementSpec::new("textarea").id("body").text(text));
        if assisted {
            form = form.child(
                ElementSpec::new("button")
                    .attr("type", "submit")
                    .id("submit")
                    .text("Add single comment"),
            );
        }
        doc.append_child(doc.root(), &form).unwrap();
        let textarea = doc.find_by_id("body").unwrap();
        let submit = doc.find_by_id("submit");

        let registry = Arc::new(SurfaceRegistry::new());
        let config = PolisherConfig::default();
        let ui = config.ui.clone();
        let renderer = Arc::new(DomProgressRenderer::new(doc.clone(), ui.clone()));
        let client = Arc::new(QueueClient {
            replies: Mutex::new(replies),
        });
        let settings = Arc::new(MemorySettingsStore::new(
            Settings::default().with_credential("sk-test"),
        ));
        let machine = Arc::new(
            ActionMachine::new(doc.clone(), registry.clone(), client, settings)
                .with_renderer(renderer.clone()),
        );
        let mut controller =
            AttachmentController::new(doc.clone(), registry.clone(), machine, renderer, &ui);
        if assisted {
            controller = controller
                .with_templates(Arc::new(TemplateBar::new(doc.clone(), &config.templates)))
                .with_interceptor(Arc::new(SubmitInterceptor::new(
                    doc.clone(),
                    registry.clone(),
                    &config.intercept,
                    &ui,
                )));
        }

        Self {
            doc,
            registry,
            controller,
            textarea,
            submit,
        }
    }

    fn discovered(&self) -> DiscoveredSurface {
        DiscoveredSurface {
            node: self.textarea,
            context: UsageContext::NewEntry,
            rule: "test".to_string(),
        }
    }

    fn attach(&self) -> (SurfaceId, NodeId) {
        let id = self.controller.attach(&self.discovered()).unwrap();
        let affordance = self.registry.get(id).unwrap().affordance.unwrap();
        (id, affordance)
    }

    fn nodes_with_class(&self, class: &str) -> Vec<NodeId> {
        self.doc
            .descendants(self.doc.root())
            .unwrap()
            .into_iter()
            .filter(|n| self.doc.has_class(*n, class).unwrap())
            .collect()
    }

    fn widget_state(&self, id: SurfaceId) -> Option<String> {
        let widget = self.controller.renderer().widget(id)?;
        self.doc.attribute(widget, STATE_ATTRIBUTE).unwrap()
    }

    /// Attach and guard, as a session scan would.
    fn attach_guarded(&self) -> (SurfaceId, NodeId) {
        let attached = self.attach();
        let guarded = self
            .controller
            .interceptor()
            .unwrap()
            .guard(self.doc.root())
            .unwrap();
        assert_eq!(guarded, 1);
        attached
    }

    fn choice(&self, id: SurfaceId, choice: Choice) -> NodeId {
        let prompt = self.controller.interceptor().unwrap().prompt(id).unwrap();
        self.doc
            .descendants(prompt)
            .unwrap()
            .into_iter()
            .find(|n| {
                self.doc.attribute(*n, CHOICE_ATTRIBUTE).unwrap().as_deref()
                    == Some(choice.as_str())
            })
            .unwrap()
    }

    fn control(&self, id: SurfaceId, control: Control) -> NodeId {
        let widget = self.controller.renderer().widget(id).unwrap();
        self.doc
            .descendants(widget)
            .unwrap()
            .into_iter()
            .find(|n| {
                self.doc.attribute(*n, CONTROL_ATTRIBUTE).unwrap().as_deref()
                    == Some(control.as_str())
            })
            .unwrap()
    }
}

#[test]
fn test_affordance_follows_surface() {
    let f = Fixture::new("draft", vec![]);
    let (_, affordance) = f.attach();

    let form = f.doc.parent(f.textarea).unwrap();
    assert_eq!(f.doc.children(form).unwrap(), vec![f.textarea, affordance]);
    assert_eq!(f.doc.tag_name(affordance).unwrap(), "button");
    assert_eq!(f.doc.attribute(affordance, "type").unwrap().as_deref(), Some("button"));
    assert!(f.doc.has_class(affordance, AFFORDANCE_CLASS).unwrap());
    assert!(f.doc.is_owned(affordance));
    assert_eq!(f.doc.text_content(affordance).unwrap(), "✨ Polish message");
}

#[test]
fn test_attach_is_idempotent() {
    let f = Fixture::new("draft", vec![]);
    f.attach();
    assert!(f.controller.attach(&f.discovered()).is_none());
    assert_eq!(f.controller.attach_all(vec![f.discovered(), f.discovered()]), 0);
    assert_eq!(f.nodes_with_class(AFFORDANCE_CLASS).len(), 1);
    assert_eq!(f.registry.len(), 1);
}

#[test]
fn test_detached_anchor_keeps_claim() {
    let f = Fixture::new("draft", vec![]);
    let form = f.doc.parent(f.textarea).unwrap();
    f.doc.remove(form).unwrap();

    let id = f.controller.attach(&f.discovered()).unwrap();
    assert!(f.registry.get(id).unwrap().affordance.is_none());
    assert_eq!(f.registry.prune_detached(f.doc.as_ref()), vec![id]);
}

#[tokio::test]
async fn test_click_affordance_rewrites_and_shows_controls() {
    let f = Fixture::new("fix this", vec![Ok("Could we fix this? 🔧".to_string())]);
    let (id, affordance) = f.attach();

    let outcome = f.controller.dispatch_click(affordance).await.unwrap();
    assert!(matches!(outcome, Some(ActionOutcome::Rewritten { .. })));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "Could we fix this? 🔧");

    let widget = f.controller.renderer().widget(id).unwrap();
    let form = f.doc.parent(f.textarea).unwrap();
    assert_eq!(f.doc.children(form).unwrap(), vec![f.textarea, affordance, widget]);
    assert_eq!(f.widget_state(id).as_deref(), Some("success"));
    assert!(f.doc.is_owned(widget));
    assert!(f.doc.text_content(widget).unwrap().contains("Comment polished successfully!"));

    for control in [Control::Revert, Control::Retry, Control::Dismiss] {
        let node = f.control(id, control);
        assert_eq!(f.controller.renderer().control_for(node), Some((id, control)));
    }
}

#[tokio::test]
async fn test_revert_control_restores_original() {
    let f = Fixture::new("original words", vec![]);
    let (id, affordance) = f.attach();
    f.controller.dispatch_click(affordance).await.unwrap();

    let revert = f.control(id, Control::Revert);
    let outcome = f.controller.dispatch_click(revert).await.unwrap();
    assert_eq!(outcome, Some(ActionOutcome::Reverted));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "original words");
    assert_eq!(f.widget_state(id).as_deref(), Some("reverted"));

    let revert = f.control(id, Control::Revert);
    f.controller.dispatch_click(revert).await.unwrap();
    assert_eq!(f.doc.value(f.textarea).unwrap(), "original words");
}

#[tokio::test]
async fn test_dismiss_control_removes_widget() {
    let f = Fixture::new("text", vec![]);
    let (id, affordance) = f.attach();
    f.controller.dispatch_click(affordance).await.unwrap();

    let dismiss = f.control(id, Control::Dismiss);
    let outcome = f.controller.dispatch_click(dismiss).await.unwrap();
    assert_eq!(outcome, Some(ActionOutcome::Dismissed));
    assert!(f.controller.renderer().widget(id).is_none());
    assert!(f.nodes_with_class(PROGRESS_CLASS).is_empty());
    assert!(f.controller.renderer().control_for(dismiss).is_none());
}

#[tokio::test]
async fn test_empty_input_shows_validation_message() {
    let f = Fixture::new("   ", vec![]);
    let (id, affordance) = f.attach();

    let err = f.controller.dispatch_click(affordance).await.unwrap_err();
    assert!(matches!(err, ActionError::Validation(_)));
    assert_eq!(f.widget_state(id).as_deref(), Some("invalid"));
    let widget = f.controller.renderer().widget(id).unwrap();
    assert!(f
        .doc
        .text_content(widget)
        .unwrap()
        .contains("Please enter a comment before polishing."));
}

#[tokio::test]
async fn test_configuration_error_shows_hint_and_retry() {
    let f = Fixture::new(
        "text",
        vec![Err(RewriteError::Configuration("API key not set".to_string()))],
    );
    let (id, affordance) = f.attach();

    f.controller.dispatch_click(affordance).await.unwrap_err();
    assert_eq!(f.widget_state(id).as_deref(), Some("error"));
    assert_eq!(f.nodes_with_class("polisher-progress-hint").len(), 1);

    let retry = f.control(id, Control::Retry);
    assert_eq!(f.doc.text_content(retry).unwrap(), "Retry");
    let outcome = f.controller.dispatch_click(retry).await.unwrap();
    assert!(matches!(outcome, Some(ActionOutcome::Rewritten { .. })));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "Polished: text");
}

#[tokio::test]
async fn test_one_widget_per_surface() {
    let f = Fixture::new("text", vec![]);
    let (_, affordance) = f.attach();
    f.controller.dispatch_click(affordance).await.unwrap();
    f.controller.dispatch_click(affordance).await.unwrap();
    assert_eq!(f.nodes_with_class(PROGRESS_CLASS).len(), 1);
}

#[tokio::test]
async fn test_click_on_host_node_is_not_routed() {
    let f = Fixture::new("text", vec![]);
    f.attach();
    assert_eq!(f.controller.dispatch_click(f.textarea).await.unwrap(), None);
}

#[test]
fn test_control_names() {
    for control in [Control::Revert, Control::Retry, Control::Dismiss] {
        assert_eq!(Control::parse(control.as_str()), Some(control));
    }
    assert_eq!(Control::parse("submit"), None);
}

#[tokio::test]
async fn test_template_bar_follows_affordance_and_inserts() {
    let f = Fixture::assisted("Thanks! ", vec![]);
    let (id, affordance) = f.attach();

    let bar = f.controller.templates().unwrap().bar(id).unwrap();
    let form = f.doc.parent(f.textarea).unwrap();
    assert_eq!(
        f.doc.children(form).unwrap(),
        vec![f.textarea, affordance, bar, f.submit.unwrap()]
    );

    let first = f.doc.children(bar).unwrap()[0];
    let outcome = f.controller.dispatch_click(first).await.unwrap();
    assert_eq!(
        outcome,
        Some(ActionOutcome::Inserted {
            text: "Thanks! 💡 What do you think about ".to_string()
        })
    );
    assert_eq!(f.doc.value(f.textarea).unwrap(), "Thanks! 💡 What do you think about ");
}

#[tokio::test]
async fn test_missing_credential_relabels_affordance() {
    let f = Fixture::new("draft", vec![]);
    let (id, affordance) = f.attach();

    assert!(f.controller.set_credential_present(false));
    assert!(!f.controller.set_credential_present(false));
    assert_eq!(f.doc.text_content(affordance).unwrap(), "⚠️ Configure Polish");

    let outcome = f.controller.dispatch_click(affordance).await.unwrap();
    assert_eq!(outcome, Some(ActionOutcome::SetupRequired));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "draft");
    assert_eq!(f.widget_state(id).as_deref(), Some("setup"));
    assert_eq!(f.nodes_with_class("polisher-progress-hint").len(), 1);

    assert!(f.controller.set_credential_present(true));
    assert_eq!(f.doc.text_content(affordance).unwrap(), "✨ Polish message");
}

#[tokio::test]
async fn test_declined_submission_is_released_untouched() {
    let f = Fixture::assisted("nit: rename this", vec![]);
    let (id, _) = f.attach_guarded();
    let submit = f.submit.unwrap();

    let held = f.controller.dispatch_click(submit).await.unwrap();
    assert_eq!(held, Some(ActionOutcome::Held { surface: id }));
    let prompt = f.controller.interceptor().unwrap().prompt(id).unwrap();
    assert!(f.doc.is_owned(prompt));
    assert!(f.doc.has_class(prompt, CONFIRM_CLASS).unwrap());
    assert!(f.doc.text_content(prompt).unwrap().contains("Polish your comment?"));

    // A second click while prompting does not stack prompts.
    f.controller.dispatch_click(submit).await.unwrap();
    assert_eq!(f.nodes_with_class(CONFIRM_CLASS).len(), 1);

    let decline = f.choice(id, Choice::Decline);
    let outcome = f.controller.dispatch_click(decline).await.unwrap();
    assert_eq!(outcome, Some(ActionOutcome::Submit { button: submit }));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "nit: rename this");
    assert!(f.nodes_with_class(CONFIRM_CLASS).is_empty());

    // The host's own submission passes once, then the guard is back.
    assert_eq!(f.controller.dispatch_click(submit).await.unwrap(), None);
    assert_eq!(
        f.controller.dispatch_click(submit).await.unwrap(),
        Some(ActionOutcome::Held { surface: id })
    );
}

#[tokio::test]
async fn test_accepted_submission_is_polished_then_released() {
    let f = Fixture::assisted("rename this", vec![Ok("Could we rename this?".to_string())]);
    let (id, _) = f.attach_guarded();
    let submit = f.submit.unwrap();

    f.controller.dispatch_click(submit).await.unwrap();
    let accept = f.choice(id, Choice::Accept);
    let outcome = f.controller.dispatch_click(accept).await.unwrap();

    assert_eq!(outcome, Some(ActionOutcome::Submit { button: submit }));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "Could we rename this?");
    assert_eq!(f.widget_state(id).as_deref(), Some("success"));
    assert!(!f.controller.interceptor().unwrap().is_pending(id));
}

#[tokio::test]
async fn test_failed_polish_holds_submission_until_retry() {
    let f = Fixture::assisted(
        "rename this",
        vec![Err(RewriteError::Transport("connection reset".to_string()))],
    );
    let (id, _) = f.attach_guarded();
    let submit = f.submit.unwrap();

    f.controller.dispatch_click(submit).await.unwrap();
    let accept = f.choice(id, Choice::Accept);
    f.controller.dispatch_click(accept).await.unwrap_err();
    assert_eq!(f.doc.value(f.textarea).unwrap(), "rename this");
    let interceptor = f.controller.interceptor().unwrap();
    assert!(interceptor.is_pending(id));
    assert!(interceptor.prompt(id).is_none());

    let retry = f.control(id, Control::Retry);
    let outcome = f.controller.dispatch_click(retry).await.unwrap();
    assert_eq!(outcome, Some(ActionOutcome::Submit { button: submit }));
    assert_eq!(f.doc.value(f.textarea).unwrap(), "Polished: rename this");
}

#[tokio::test]
async fn test_dismissing_failure_cancels_held_submission() {
    let f = Fixture::assisted(
        "rename this",
        vec![Err(RewriteError::Transport("connection reset".to_string()))],
    );
    let (id, _) = f.attach_guarded();
    f.controller.dispatch_click(f.submit.unwrap()).await.unwrap();
    let accept = f.choice(id, Choice::Accept);
    f.controller.dispatch_click(accept).await.unwrap_err();

    let dismiss = f.control(id, Control::Dismiss);
    f.controller.dispatch_click(dismiss).await.unwrap();
    assert!(!f.controller.interceptor().unwrap().is_pending(id));
}

#[tokio::test]
async fn test_blank_comment_submits_without_prompt() {
    let f = Fixture::assisted("  ", vec![]);
    f.attach_guarded();
    assert_eq!(f.controller.dispatch_click(f.submit.unwrap()).await.unwrap(), None);
    assert!(f.nodes_with_class(CONFIRM_CLASS).is_empty());
}
