use super::*;
use polisher_protocols::UsageContext;

use crate::dom::Document;

struct Page {
    doc: Arc<Document>,
    registry: Arc<SurfaceRegistry>,
}

impl Page {
    fn new() -> Self {
        Self {
            doc: Arc::new(Document::new()),
            registry: Arc::new(SurfaceRegistry::new()),
        }
    }

    fn add(&self, spec: ElementSpec) -> NodeId {
        self.doc.append_child(self.doc.root(), &spec).unwrap()
    }

    fn instrument(&self, id: &str) -> SurfaceId {
        let node = self.doc.find_by_id(id).unwrap();
        self.registry.mark_instrumented(node, UsageContext::ThreadedReply)
    }

    fn interceptor(&self, config: &InterceptConfig) -> SubmitInterceptor {
        SubmitInterceptor::new(
            self.doc.clone(),
            self.registry.clone(),
            config,
            &UiConfig::default(),
        )
    }

    fn node(&self, id: &str) -> NodeId {
        self.doc.find_by_id(id).unwrap()
    }
}

fn button(id: &str, text: &str) -> ElementSpec {
    ElementSpec::new("button").id(id).text(text)
}

fn review_form() -> ElementSpec {
    ElementSpec::new("form")
        .child(ElementSpec::new("textarea").id("body").text("looks off"))
        .child(button("start", "Start a review"))
        .child(button("single", "  Add single comment "))
        .child(button("cancel", "Cancel"))
        .child(button("update", "Update").attr("data-disable-with", "Updating..."))
        .child(button("ours", "Add single comment").owned())
}

#[test]
fn test_guard_selects_submit_buttons_only() {
    let page = Page::new();
    page.add(review_form());
    let interceptor = page.interceptor(&InterceptConfig::default());

    assert_eq!(interceptor.guard(page.doc.root()).unwrap(), 3);
    for id in ["start", "single", "update"] {
        assert!(interceptor.is_guarded(page.node(id)), "{id} should be guarded");
    }
    for id in ["cancel", "ours"] {
        assert!(!interceptor.is_guarded(page.node(id)), "{id} should not be guarded");
    }

    assert_eq!(interceptor.guard(page.doc.root()).unwrap(), 0);
}

#[test]
fn test_disabled_interceptor_guards_nothing() {
    let page = Page::new();
    page.add(review_form());
    let config = InterceptConfig {
        enabled: false,
        ..Default::default()
    };
    let interceptor = page.interceptor(&config);

    assert_eq!(interceptor.guard(page.doc.root()).unwrap(), 0);
    page.instrument("body");
    assert_eq!(interceptor.hold(page.node("start")).unwrap(), None);
}

#[test]
fn test_guard_forgets_detached_buttons() {
    let page = Page::new();
    let form = page.add(review_form());
    let interceptor = page.interceptor(&InterceptConfig::default());
    interceptor.guard(page.doc.root()).unwrap();
    let start = page.node("start");

    page.doc.remove(form).unwrap();
    interceptor.guard(page.doc.root()).unwrap();
    assert!(!interceptor.is_guarded(start));
}

#[test]
fn test_surface_for_prefers_inline_container_over_form() {
    let page = Page::new();
    page.add(
        ElementSpec::new("form")
            .child(ElementSpec::new("textarea").id("outer"))
            .child(button("top", "Start a review"))
            .child(
                ElementSpec::new("div")
                    .class("js-inline-comment-form")
                    .child(ElementSpec::new("textarea").id("inner"))
                    .child(button("reply", "Add review comment")),
            ),
    );
    let outer = page.instrument("outer");
    let inner = page.instrument("inner");
    let interceptor = page.interceptor(&InterceptConfig::default());

    assert_eq!(interceptor.surface_for(page.node("reply")).unwrap(), Some(inner));
    assert_eq!(interceptor.surface_for(page.node("top")).unwrap(), Some(outer));
}

#[test]
fn test_surface_for_without_instrumented_comment() {
    let page = Page::new();
    page.add(review_form());
    let interceptor = page.interceptor(&InterceptConfig::default());
    assert_eq!(interceptor.surface_for(page.node("start")).unwrap(), None);
}

#[test]
fn test_hold_then_release_passes_one_click() {
    let page = Page::new();
    page.add(review_form());
    let surface = page.instrument("body");
    let interceptor = page.interceptor(&InterceptConfig::default());
    interceptor.guard(page.doc.root()).unwrap();
    let start = page.node("start");

    assert_eq!(interceptor.hold(start).unwrap(), Some(surface));
    let prompt = interceptor.prompt(surface).unwrap();
    assert_eq!(page.doc.parent(prompt), page.doc.parent(start));
    assert!(interceptor.is_pending(surface));

    assert_eq!(interceptor.release(surface), Some(start));
    assert!(!page.doc.is_connected(prompt));
    assert!(!interceptor.is_pending(surface));

    assert_eq!(interceptor.hold(start).unwrap(), None);
    assert_eq!(interceptor.hold(start).unwrap(), Some(surface));
}

#[test]
fn test_cancel_drops_prompt_and_choices() {
    let page = Page::new();
    page.add(review_form());
    let surface = page.instrument("body");
    let interceptor = page.interceptor(&InterceptConfig::default());
    interceptor.guard(page.doc.root()).unwrap();
    interceptor.hold(page.node("single")).unwrap();

    let prompt = interceptor.prompt(surface).unwrap();
    let choices: Vec<_> = page
        .doc
        .descendants(prompt)
        .unwrap()
        .into_iter()
        .filter_map(|n| interceptor.choice_for(n))
        .collect();
    assert_eq!(choices, vec![(surface, Choice::Decline), (surface, Choice::Accept)]);

    interceptor.cancel(surface);
    assert!(interceptor.prompt(surface).is_none());
    assert!(!interceptor.is_pending(surface));
    assert!(!page.doc.is_connected(prompt));
    // Cancelling does not release the button.
    assert_eq!(interceptor.hold(page.node("single")).unwrap(), Some(surface));
}

#[test]
fn test_choice_names() {
    for choice in [Choice::Accept, Choice::Decline] {
        assert_eq!(Choice::parse(choice.as_str()), Some(choice));
    }
    assert_eq!(Choice::parse("maybe"), None);
}
