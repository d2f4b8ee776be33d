use crate::native::NativeMessagingHost;
use crate::panels::{PanelRegistry, PanelServices};
use anyhow::Context;
use mailminder_ai::{ChatCompletionClient, CompletionSettings, ReplyGenerator};
use mailminder_backend::{BackendClient, FeedbackAccount, FeedbackClient};
use mailminder_config::{AppConfig, ConfigManager};
use mailminder_email::{GmailClient, PeopleClient};
use mailminder_extension::{BackgroundCoordinator, Popup};
use mailminder_security::{
    IdentityTokenProvider, KeychainTokenCache, LoopbackCodeReceiver, PkceConsent, SecretKey,
    SecretStore, TokenProvider,
};
use mailminder_storage::LocalStore;
use std::sync::Arc;
use url::Url;

const KEYCHAIN_SERVICE: &str = "io.mailminder.host";
const TOKEN_ACCOUNT: &str = "google";
const API_KEY_ENV: &str = "MAILMINDER_COMPLETION_API_KEY";
const LOCAL_STORE_FILE: &str = "local_store.json";

pub struct AppState {
    pub(crate) config: AppConfig,
    pub(crate) completion: CompletionSettings,
    pub(crate) coordinator: Arc<BackgroundCoordinator>,
    pub(crate) panels: Arc<PanelRegistry>,
}

impl AppState {
    pub fn initialize(host: Arc<NativeMessagingHost>) -> anyhow::Result<Self> {
        let config_manager = ConfigManager::new().context("initialize config manager")?;
        let config = config_manager.load().context("load app config")?;
        tracing::info!(path = %config_manager.config_path().display(), "loaded config");

        let secrets = SecretStore::new(KEYCHAIN_SERVICE);
        let completion = completion_settings(&config, &secrets);
        let tokens: Arc<dyn TokenProvider> = Arc::new(token_provider(&config, secrets, &host)?);

        let coordinator = Arc::new(BackgroundCoordinator::new(
            tokens.clone(),
            Arc::new(GmailClient::new(config.endpoints.gmail_api_base.clone())),
            host.clone(),
            config.page.snippet_wait(),
        ));

        let store_path = config_manager.data_dir().join(LOCAL_STORE_FILE);
        let store = LocalStore::open(&store_path)
            .with_context(|| format!("open local store at {}", store_path.display()))?;
        let completion_client =
            ChatCompletionClient::new(completion.clone()).context("build completion client")?;
        let people = Arc::new(PeopleClient::new(config.endpoints.people_api_base.clone()));
        let backend = BackendClient::new(config.endpoints.backend_base.clone());

        let mut popup = Popup::new(tokens.clone(), people.clone(), backend.clone(), host);
        if config.feedback.is_configured() {
            popup = popup.with_feedback(FeedbackClient::new(
                config.feedback.endpoint.clone(),
                FeedbackAccount {
                    service_id: config.feedback.service_id.clone(),
                    template_id: config.feedback.template_id.clone(),
                    public_key: config.feedback.public_key.clone(),
                },
            ));
        } else {
            tracing::info!("feedback delivery is not configured");
        }

        let services = PanelServices {
            coordinator: coordinator.clone(),
            tokens,
            people,
            backend,
            store,
            generator: ReplyGenerator::new(Arc::new(completion_client)),
            generation_cost: config.usage.generation_cost,
        };

        Ok(Self {
            config,
            completion,
            coordinator,
            panels: Arc::new(PanelRegistry::new(services, popup)),
        })
    }
}

fn token_provider(
    config: &AppConfig,
    secrets: SecretStore,
    host: &Arc<NativeMessagingHost>,
) -> anyhow::Result<IdentityTokenProvider> {
    let cache = KeychainTokenCache::new(secrets, TOKEN_ACCOUNT);
    let revoke_url = Url::parse(&config.endpoints.revoke_url).context("parse token revoke url")?;
    let tokens = IdentityTokenProvider::new(Arc::new(cache), revoke_url);

    if config.oauth.client_id.trim().is_empty() {
        tracing::warn!("no OAuth client id configured, interactive sign-in is disabled");
        return Ok(tokens);
    }
    let profile = config.oauth.profile().context("parse oauth settings")?;
    let receiver = LoopbackCodeReceiver::new(profile.redirect_url.clone(), host.clone());
    let consent = PkceConsent::new(&profile, Arc::new(receiver)).context("build oauth consent")?;
    Ok(tokens.with_consent(Arc::new(consent)))
}

/// The keychain entry wins over the environment variable.
pub(crate) fn completion_settings(config: &AppConfig, secrets: &SecretStore) -> CompletionSettings {
    let key = SecretKey {
        namespace: "ai_api_key".to_string(),
        id: "openrouter".to_string(),
    };
    let stored = match secrets.get(&key) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("completion api key lookup failed: {err}");
            None
        }
    };
    let api_key = stored
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|value| !value.trim().is_empty());

    CompletionSettings {
        endpoint: config.completion.endpoint.clone(),
        model: config.completion.model.clone(),
        max_tokens: config.completion.max_tokens,
        api_key,
    }
}
