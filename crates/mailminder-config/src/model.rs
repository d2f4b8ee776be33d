use crate::ConfigError;
use mailminder_core::{OAuthProfile, GOOGLE_SCOPES};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Gmail DOM selectors, one module per observed revision of the host page.
///
/// The host page is third party and undocumented. When a selector stops
/// matching, every injector operation degrades to a logged no-op.
pub mod selectors {
    pub mod v1 {
        pub const REVISION: u32 = 1;
        pub const MAIN_TOOLBAR: &str = ".amn";
        pub const COMPOSE_TOOLBAR: &str = ".J-J5-Ji.btA";
        pub const REPLY_BUTTON: &str = ".ams.bkH";
        pub const REPLY_ALL_BUTTON: &str = ".og.T-I-J3";
        pub const MESSAGE_ID_ATTRIBUTE: &str = "data-legacy-message-id";
        pub const REPLY_INPUT: &str = ".Am.aiL.aO9.Al.editable.LW-avf.tS-tW";
        pub const TRIGGER_BUTTON_ID: &str = "myInjectButton";
        pub const REPLY_TRIGGER_ID: &str = "myInjectSmallButton";
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailSelectors {
    pub revision: u32,
    pub main_toolbar: String,
    pub compose_toolbar: String,
    pub reply_button: String,
    pub reply_all_button: String,
    pub message_id_attribute: String,
    pub reply_input: String,
    pub trigger_button_id: String,
    pub reply_trigger_id: String,
}

impl GmailSelectors {
    pub fn v1() -> Self {
        use selectors::v1;
        Self {
            revision: v1::REVISION,
            main_toolbar: v1::MAIN_TOOLBAR.to_string(),
            compose_toolbar: v1::COMPOSE_TOOLBAR.to_string(),
            reply_button: v1::REPLY_BUTTON.to_string(),
            reply_all_button: v1::REPLY_ALL_BUTTON.to_string(),
            message_id_attribute: v1::MESSAGE_ID_ATTRIBUTE.to_string(),
            reply_input: v1::REPLY_INPUT.to_string(),
            trigger_button_id: v1::TRIGGER_BUTTON_ID.to_string(),
            reply_trigger_id: v1::REPLY_TRIGGER_ID.to_string(),
        }
    }

    /// Selector form of the `data-legacy-message-id` attribute lookup.
    pub fn message_id_selector(&self) -> String {
        format!("[{}]", self.message_id_attribute)
    }

    /// Checks every configured value is a CSS selector the page can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("main_toolbar", self.main_toolbar.clone()),
            ("compose_toolbar", self.compose_toolbar.clone()),
            ("reply_button", self.reply_button.clone()),
            ("reply_all_button", self.reply_all_button.clone()),
            ("reply_input", self.reply_input.clone()),
            ("message_id_attribute", self.message_id_selector()),
            ("trigger_button_id", format!("#{}", self.trigger_button_id)),
            ("reply_trigger_id", format!("#{}", self.reply_trigger_id)),
        ];
        for (field, selector) in checks {
            if let Err(err) = scraper::Selector::parse(&selector) {
                return Err(ConfigError::Selector {
                    field,
                    reason: format!("{selector:?} is not a valid selector: {err:?}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for GmailSelectors {
    fn default() -> Self {
        Self::v1()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    pub endpoints: EndpointConfig,
    pub oauth: OAuthConfig,
    pub completion: CompletionConfig,
    pub page: PageConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub gmail_api_base: String,
    pub people_api_base: String,
    pub backend_base: String,
    pub revoke_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn profile(&self) -> Result<OAuthProfile, ConfigError> {
        Ok(OAuthProfile {
            client_id: self.client_id.clone(),
            auth_url: Url::parse(&self.auth_url)?,
            token_url: Url::parse(&self.token_url)?,
            redirect_url: Url::parse(&self.redirect_url)?,
            scopes: self.scopes.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub overlay_activation_ms: u64,
    pub overlay_teardown_ms: u64,
    pub reply_trigger_delay_ms: u64,
    pub snippet_wait_ms: u64,
    #[serde(default)]
    pub selectors: GmailSelectors,
}

impl PageConfig {
    pub fn overlay_activation(&self) -> Duration {
        Duration::from_millis(self.overlay_activation_ms)
    }

    pub fn overlay_teardown(&self) -> Duration {
        Duration::from_millis(self.overlay_teardown_ms)
    }

    pub fn reply_trigger_delay(&self) -> Duration {
        Duration::from_millis(self.reply_trigger_delay_ms)
    }

    pub fn snippet_wait(&self) -> Duration {
        Duration::from_millis(self.snippet_wait_ms)
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            overlay_activation_ms: 10,
            overlay_teardown_ms: 300,
            reply_trigger_delay_ms: 200,
            snippet_wait_ms: 10_000,
            selectors: GmailSelectors::v1(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    pub generation_cost: i64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { generation_cost: 3 }
    }
}

/// Mail-delivery service that receives the popup's feedback form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

impl FeedbackConfig {
    pub fn is_configured(&self) -> bool {
        [&self.endpoint, &self.service_id, &self.template_id, &self.public_key]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.emailjs.com/api/v1.0/email/send".to_string(),
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            endpoints: EndpointConfig {
                gmail_api_base: "https://www.googleapis.com/gmail/v1".to_string(),
                people_api_base: "https://people.googleapis.com/v1".to_string(),
                backend_base: "http://localhost:5000".to_string(),
                revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
            },
            oauth: OAuthConfig {
                client_id: String::new(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                redirect_url: "http://127.0.0.1:8749/callback".to_string(),
                scopes: GOOGLE_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            },
            completion: CompletionConfig {
                endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
                model: "gryphe/mythomist-7b:free".to_string(),
                max_tokens: 30,
            },
            page: PageConfig::default(),
            usage: UsageConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}
