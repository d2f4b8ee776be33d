use crate::{NodeId, PageDocument, RuntimeChannel};
use mailminder_config::{GmailSelectors, PageConfig};
use mailminder_core::{ExtensionMessage, FrameId, OverlayKind};
use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};

const INBOX_PREFIX: &str = "https://mail.google.com/mail/u/";
const TRIGGER_LABEL: &str = "MailMinder AI";
const TRIGGER_ICON: &str = "icons/logo_white.png";
const REPLY_TRIGGER_ICON: &str = "icons/text_logo_trans.png";
const ACTIVE_CLASS: &str = "active";

fn inbox_fragment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(inbox|sent)").expect("valid inbox fragment regex"))
}

/// Whether `url` shows a Gmail mailbox list the trigger button belongs on.
pub fn is_inbox_view(url: &str) -> bool {
    url.starts_with(INBOX_PREFIX) && inbox_fragment().is_match(url)
}

/// Splits a compound class selector such as `.og.T-I-J3` into its classes.
fn selector_classes(selector: &str) -> Vec<&str> {
    selector.split('.').filter(|class| !class.is_empty()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Reply,
    Profile,
}

impl Slot {
    fn for_kind(kind: OverlayKind) -> Self {
        match kind {
            OverlayKind::ReplySuggestions | OverlayKind::SignIn => Slot::Reply,
            OverlayKind::UserProfile => Slot::Profile,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Overlay {
    frame: FrameId,
    node: NodeId,
    kind: OverlayKind,
    closing: bool,
}

#[derive(Debug, Default)]
struct OverlaySlots {
    reply: Option<Overlay>,
    profile: Option<Overlay>,
}

impl OverlaySlots {
    fn slot(&mut self, slot: Slot) -> &mut Option<Overlay> {
        match slot {
            Slot::Reply => &mut self.reply,
            Slot::Profile => &mut self.profile,
        }
    }

    fn is_open(&mut self, slot: Slot) -> bool {
        self.slot(slot).is_some_and(|overlay| !overlay.closing)
    }
}

/// Injects the MailMinder controls into the Gmail page and manages the
/// overlay frames that host the panels.
///
/// Every selector lookup that finds nothing is a logged no-op, so a Gmail
/// markup change disables the affected control instead of failing.
#[derive(Clone)]
pub struct PageInjector {
    document: Arc<dyn PageDocument>,
    channel: Arc<dyn RuntimeChannel>,
    config: PageConfig,
    resource_root: String,
    overlays: Arc<Mutex<OverlaySlots>>,
}

impl PageInjector {
    pub fn new(
        document: Arc<dyn PageDocument>,
        channel: Arc<dyn RuntimeChannel>,
        config: PageConfig,
    ) -> Self {
        Self {
            document,
            channel,
            config,
            resource_root: String::new(),
            overlays: Arc::new(Mutex::new(OverlaySlots::default())),
        }
    }

    /// Prefix for bundled pages and icons, e.g. `chrome-extension://<id>/`.
    pub fn with_resource_root(mut self, root: impl Into<String>) -> Self {
        self.resource_root = root.into();
        self
    }

    fn selectors(&self) -> &GmailSelectors {
        &self.config.selectors
    }

    fn resource(&self, path: &str) -> String {
        format!("{}{path}", self.resource_root)
    }

    fn lock_overlays(&self) -> std::sync::MutexGuard<'_, OverlaySlots> {
        self.overlays.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn overlay_open(&self, kind: OverlayKind) -> bool {
        let mut slots = self.lock_overlays();
        slots
            .slot(Slot::for_kind(kind))
            .is_some_and(|overlay| !overlay.closing && overlay.kind == kind)
    }

    fn any_overlay_open(&self) -> bool {
        let mut slots = self.lock_overlays();
        slots.is_open(Slot::Reply) || slots.is_open(Slot::Profile)
    }

    /// Adds the main trigger to the mailbox toolbar. Returns whether it inserted.
    pub fn add_trigger_button(&self) -> bool {
        let selectors = self.selectors();
        if self.document.element_by_id(&selectors.trigger_button_id).is_some() {
            return false;
        }
        let Some(toolbar) = self.document.query(&selectors.main_toolbar) else {
            tracing::debug!(selector = %selectors.main_toolbar, "mailbox toolbar not found");
            return false;
        };
        let Some(first_span) = self.document.query_within(toolbar, "span") else {
            tracing::debug!("mailbox toolbar has no span to anchor the trigger");
            return false;
        };

        let button = self.document.create_element("button");
        self.document
            .set_attribute(button, "id", &selectors.trigger_button_id);
        let wrapper = self.document.create_element("div");
        self.document.add_class(wrapper, "contentWrapper");
        let logo = self.document.create_element("img");
        self.document
            .set_attribute(logo, "src", &self.resource(TRIGGER_ICON));
        let label = self.document.create_element("span");
        self.document.set_text(label, TRIGGER_LABEL);
        self.document.append_child(wrapper, logo);
        self.document.append_child(wrapper, label);
        self.document.append_child(button, wrapper);
        self.document.insert_before(toolbar, button, first_span);

        tracing::debug!("injected mailbox trigger");
        true
    }

    /// Adds the small trigger to the compose toolbar. Returns whether it inserted.
    pub fn add_reply_trigger(&self) -> bool {
        let selectors = self.selectors();
        if self.document.element_by_id(&selectors.reply_trigger_id).is_some() {
            return false;
        }
        let Some(toolbar) = self.document.query(&selectors.compose_toolbar) else {
            return false;
        };

        let icon = self.document.create_element("img");
        self.document
            .set_attribute(icon, "id", &selectors.reply_trigger_id);
        self.document.add_class(icon, &selectors.reply_trigger_id);
        self.document.set_attribute(icon, "alt", "icon");
        self.document
            .set_attribute(icon, "src", &self.resource(REPLY_TRIGGER_ICON));

        match self.document.query_within(toolbar, "span") {
            Some(first_span) => self.document.insert_before(toolbar, icon, first_span),
            None => self.document.append_child(toolbar, icon),
        }
        tracing::debug!("injected compose trigger");
        true
    }

    async fn authenticated(&self) -> bool {
        match self.channel.request(ExtensionMessage::CheckAuthentication).await {
            Ok(Some(ExtensionMessage::AuthenticationStatus { authenticated, .. })) => authenticated,
            Ok(_) => false,
            Err(err) => {
                tracing::warn!("authentication check failed: {err}");
                false
            }
        }
    }

    async fn send(&self, message: ExtensionMessage) {
        let action = message.kind().action();
        if let Err(err) = self.channel.send(message).await {
            tracing::warn!(action, "failed to send runtime message: {err}");
        }
    }

    pub async fn trigger_clicked(&self) {
        if self.authenticated().await {
            self.send(ExtensionMessage::ExecuteOnClicker {
                selected_tone: None,
                generation: None,
            })
            .await;
        } else {
            tracing::info!("user is not signed in");
            self.show_overlay(OverlayKind::SignIn);
        }
    }

    pub async fn reply_trigger_clicked(&self) {
        if self.authenticated().await {
            self.send(ExtensionMessage::ClickReplyButton).await;
            if self.any_overlay_open() {
                self.send(ExtensionMessage::CloseIframe).await;
            } else {
                self.send(ExtensionMessage::ExecuteOnClicker {
                    selected_tone: None,
                    generation: None,
                })
                .await;
            }
        } else {
            self.hide_overlays();
            self.show_overlay(OverlayKind::SignIn);
        }
    }

    /// Handles a message the coordinator delivered to this tab.
    pub async fn handle_message(&self, message: ExtensionMessage) {
        match message {
            ExtensionMessage::ClickReplyButton => {
                match self.document.query(&self.selectors().reply_button) {
                    Some(reply) => self.document.click(reply),
                    None => tracing::debug!("reply button not found"),
                }
                if !self.any_overlay_open() {
                    self.show_overlay(OverlayKind::ReplySuggestions);
                }
            }
            ExtensionMessage::GetMessageText { token } => {
                let attribute = &self.selectors().message_id_attribute;
                let message_id = self
                    .document
                    .query(&self.selectors().message_id_selector())
                    .and_then(|node| self.document.attribute(node, attribute))
                    .filter(|id| !id.trim().is_empty());
                match message_id {
                    Some(message_id) => {
                        self.send(ExtensionMessage::GetMessageDetails {
                            message_id,
                            access_token: token,
                        })
                        .await;
                    }
                    None => tracing::debug!("no message id on the page"),
                }
            }
            ExtensionMessage::SuggestedText { suggestion } => {
                match self.document.query(&self.selectors().reply_input) {
                    Some(input) => self.document.set_text(input, &suggestion),
                    None => tracing::info!("reply input not found"),
                }
            }
            ExtensionMessage::CloseIframe => self.hide_overlays(),
            ExtensionMessage::OpenUserProfile { .. } => {
                self.show_overlay(OverlayKind::UserProfile);
            }
            other => tracing::debug!(action = other.kind().action(), "page ignores message"),
        }
    }

    /// Shows an overlay unless its slot is already taken.
    pub fn show_overlay(&self, kind: OverlayKind) -> Option<FrameId> {
        let slot = Slot::for_kind(kind);
        let overlay = {
            let mut slots = self.lock_overlays();
            if slots.is_open(slot) {
                return None;
            }

            let node = self.document.create_element("iframe");
            let frame = FrameId::new();
            self.document.add_class(node, kind.frame_class());
            self.document
                .set_attribute(node, "src", &self.resource(kind.page()));
            self.document
                .set_attribute(node, "data-frame-id", &frame.0.to_string());
            self.document.append_child(self.document.body(), node);

            let overlay = Overlay {
                frame,
                node,
                kind,
                closing: false,
            };
            *slots.slot(slot) = Some(overlay);
            overlay
        };

        let document = self.document.clone();
        let delay = self.config.overlay_activation();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if document.is_attached(overlay.node) {
                document.add_class(overlay.node, ACTIVE_CLASS);
            }
        });
        tracing::debug!(?kind, "overlay shown");
        Some(overlay.frame)
    }

    /// Starts closing every open overlay.
    pub fn hide_overlays(&self) {
        self.hide_slot(Slot::Reply);
        if !self.hide_slot(Slot::Profile) {
            return;
        }

        // Closing the profile panel reopens Gmail's reply-all view.
        let document = self.document.clone();
        let reply_all = self.selectors().reply_all_button.clone();
        let delay = self.config.overlay_activation();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(button) = document.query(&reply_all) {
                document.click(button);
            }
        });
    }

    fn hide_slot(&self, slot: Slot) -> bool {
        let overlay = {
            let mut slots = self.lock_overlays();
            match slots.slot(slot) {
                Some(overlay) if !overlay.closing => {
                    overlay.closing = true;
                    *overlay
                }
                _ => return false,
            }
        };
        self.document.remove_class(overlay.node, ACTIVE_CLASS);

        let document = self.document.clone();
        let overlays = self.overlays.clone();
        let delay = self.config.overlay_teardown();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            document.remove(overlay.node);
            let mut slots = overlays.lock().unwrap_or_else(|e| e.into_inner());
            let current = slots.slot(slot);
            if current.is_some_and(|open| open.frame == overlay.frame) {
                *current = None;
            }
        });
        true
    }

    /// Reacts to a URL change of the host page.
    pub async fn navigated(&self, url: &str) {
        if is_inbox_view(url) {
            self.add_trigger_button();
        }
        if (url.ends_with("#inbox") || !url.ends_with('/')) && self.any_overlay_open() {
            self.send(ExtensionMessage::CloseIframe).await;
        }
    }

    pub fn dom_mutated(&self) {
        self.add_reply_trigger();
    }

    /// Re-injects controls after clicks on Gmail's own reply controls.
    pub async fn document_clicked(&self, classes: &[&str]) {
        let has_all = |selector: &str| {
            selector_classes(selector)
                .iter()
                .all(|class| classes.contains(class))
        };

        if has_all(&self.selectors().reply_all_button) {
            self.add_trigger_button();
        }
        if has_all(&self.selectors().reply_button) {
            tokio::time::sleep(self.config.reply_trigger_delay()).await;
            self.add_reply_trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingChannel;
    use crate::MemoryDocument;
    use mailminder_core::AccessToken;
    use std::time::Duration;

    fn fast_config() -> PageConfig {
        PageConfig {
            overlay_activation_ms: 1,
            overlay_teardown_ms: 5,
            reply_trigger_delay_ms: 1,
            snippet_wait_ms: 100,
            selectors: GmailSelectors::v1(),
        }
    }

    fn gmail_page() -> Arc<MemoryDocument> {
        let doc = Arc::new(MemoryDocument::new());
        let toolbar = doc.add_element(doc.body(), "div", None, &["amn"]);
        doc.add_element(toolbar, "span", None, &[]);
        doc.add_element(doc.body(), "div", None, &["J-J5-Ji", "btA"]);
        doc.add_element(doc.body(), "span", None, &["ams", "bkH"]);
        doc.add_element(doc.body(), "span", None, &["og", "T-I-J3"]);
        let message = doc.add_element(doc.body(), "div", None, &["adn"]);
        doc.set_attribute(message, "data-legacy-message-id", "18f2a");
        doc.add_element(
            doc.body(),
            "div",
            None,
            &["Am", "aiL", "aO9", "Al", "editable", "LW-avf", "tS-tW"],
        );
        doc
    }

    fn injector(doc: &Arc<MemoryDocument>, channel: &Arc<RecordingChannel>) -> PageInjector {
        PageInjector::new(doc.clone(), channel.clone(), fast_config())
            .with_resource_root("chrome-extension://mailminder/")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    #[test]
    fn inbox_view_detection() {
        assert!(is_inbox_view("https://mail.google.com/mail/u/0/#inbox"));
        assert!(is_inbox_view("https://mail.google.com/mail/u/1/#sent/FMfcgz"));
        assert!(!is_inbox_view("https://mail.google.com/mail/u/0/#starred"));
        assert!(!is_inbox_view("https://example.com/mail/u/0/#inbox"));
    }

    #[tokio::test]
    async fn triggers_are_injected_once() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        assert!(page.add_trigger_button());
        assert!(!page.add_trigger_button());
        assert_eq!(doc.count("#myInjectButton"), 1);

        let toolbar = doc.query(".amn").expect("toolbar");
        let button = doc.element_by_id("myInjectButton").expect("button");
        assert_eq!(doc.children(toolbar).first(), Some(&button));

        page.dom_mutated();
        page.dom_mutated();
        assert_eq!(doc.count("#myInjectSmallButton"), 1);
        let compose = doc.query(".J-J5-Ji.btA").expect("compose toolbar");
        assert_eq!(doc.children(compose).len(), 1);
    }

    #[tokio::test]
    async fn missing_toolbar_is_a_no_op() {
        let doc = Arc::new(MemoryDocument::new());
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        assert!(!page.add_trigger_button());
        assert!(!page.add_reply_trigger());
        page.handle_message(ExtensionMessage::SuggestedText {
            suggestion: "Sure.".to_string(),
        })
        .await;
        assert_eq!(doc.count("button"), 0);
    }

    #[tokio::test]
    async fn overlay_opens_once_and_tears_down() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        assert!(page.show_overlay(OverlayKind::ReplySuggestions).is_some());
        assert!(page.show_overlay(OverlayKind::ReplySuggestions).is_none());
        assert_eq!(doc.count("iframe.custom-iframe"), 1);

        settle().await;
        let frame = doc.query("iframe").expect("frame");
        assert!(doc.has_class(frame, "active"));
        assert_eq!(
            doc.attribute(frame, "src").as_deref(),
            Some("chrome-extension://mailminder/iframe.html")
        );

        page.handle_message(ExtensionMessage::CloseIframe).await;
        assert!(!doc.has_class(frame, "active"));
        assert!(!page.overlay_open(OverlayKind::ReplySuggestions));

        settle().await;
        assert!(!doc.is_attached(frame));
        assert!(page.show_overlay(OverlayKind::ReplySuggestions).is_some());
    }

    #[tokio::test]
    async fn signed_out_trigger_shows_sign_in() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(false));
        let page = injector(&doc, &channel);

        page.trigger_clicked().await;
        assert!(page.overlay_open(OverlayKind::SignIn));
        assert_eq!(doc.count("[src=\"chrome-extension://mailminder/auth.html\"]"), 1);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn signed_in_triggers_start_or_close_the_cycle() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.trigger_clicked().await;
        page.reply_trigger_clicked().await;
        page.show_overlay(OverlayKind::ReplySuggestions);
        page.reply_trigger_clicked().await;

        let start = ExtensionMessage::ExecuteOnClicker {
            selected_tone: None,
            generation: None,
        };
        assert_eq!(
            channel.sent(),
            vec![
                start.clone(),
                ExtensionMessage::ClickReplyButton,
                start,
                ExtensionMessage::ClickReplyButton,
                ExtensionMessage::CloseIframe,
            ]
        );
    }

    #[tokio::test]
    async fn click_reply_opens_the_suggestion_overlay() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.handle_message(ExtensionMessage::ClickReplyButton).await;
        page.handle_message(ExtensionMessage::ClickReplyButton).await;

        let reply = doc.query(".ams.bkH").expect("reply button");
        assert_eq!(doc.clicks(reply), 2);
        assert_eq!(doc.count("iframe"), 1);
        assert!(page.overlay_open(OverlayKind::ReplySuggestions));
    }

    #[tokio::test]
    async fn message_text_request_reads_the_legacy_id() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.handle_message(ExtensionMessage::GetMessageText {
            token: AccessToken::new("ya29.t"),
        })
        .await;

        assert_eq!(
            channel.sent(),
            vec![ExtensionMessage::GetMessageDetails {
                message_id: "18f2a".to_string(),
                access_token: AccessToken::new("ya29.t"),
            }]
        );
    }

    #[tokio::test]
    async fn suggestion_is_pasted_into_the_compose_box() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.handle_message(ExtensionMessage::SuggestedText {
            suggestion: "3pm works for me.".to_string(),
        })
        .await;

        let input = doc
            .query(".Am.aiL.aO9.Al.editable.LW-avf.tS-tW")
            .expect("compose box");
        assert_eq!(doc.text(input), "3pm works for me.");
    }

    #[tokio::test]
    async fn closing_the_profile_overlay_clicks_reply_all() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.handle_message(ExtensionMessage::OpenUserProfile { token: None })
            .await;
        page.handle_message(ExtensionMessage::OpenUserProfile { token: None })
            .await;
        assert_eq!(doc.count("iframe.user-profile-iframe"), 1);

        page.handle_message(ExtensionMessage::CloseIframe).await;
        settle().await;

        let reply_all = doc.query(".og.T-I-J3").expect("reply all");
        assert_eq!(doc.clicks(reply_all), 1);
        assert_eq!(doc.count("iframe"), 0);
    }

    #[tokio::test]
    async fn navigation_injects_and_closes_open_overlays() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.navigated("https://mail.google.com/mail/u/0/").await;
        assert_eq!(doc.count("#myInjectButton"), 0);
        assert!(channel.sent().is_empty());

        page.show_overlay(OverlayKind::ReplySuggestions);
        page.navigated("https://mail.google.com/mail/u/0/#inbox").await;
        assert_eq!(doc.count("#myInjectButton"), 1);
        assert_eq!(channel.sent(), vec![ExtensionMessage::CloseIframe]);
    }

    #[tokio::test]
    async fn clicks_on_gmail_reply_controls_reinject() {
        let doc = gmail_page();
        let channel = Arc::new(RecordingChannel::signed_in(true));
        let page = injector(&doc, &channel);

        page.document_clicked(&["T-I-J3", "og"]).await;
        assert_eq!(doc.count("#myInjectButton"), 1);
        assert_eq!(doc.count("#myInjectSmallButton"), 0);

        page.document_clicked(&["ams", "bkH"]).await;
        assert_eq!(doc.count("#myInjectSmallButton"), 1);
    }
}
