mod error;
mod keychain;
mod loopback;
mod oauth;
mod provider;

pub use error::SecurityError;
pub use keychain::{CachedToken, KeychainTokenCache, MemoryTokenCache, SecretKey, SecretStore, TokenCache};
pub use loopback::{LoopbackCodeReceiver, UrlLauncher};
pub use oauth::{
    AuthorizationCodeSource, AuthorizationGrant, ConsentFlow, ConsentSession, OAuthTokenResult,
    PkceConsent,
};
pub use provider::{IdentityTokenProvider, TokenProvider};
