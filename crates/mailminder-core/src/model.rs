use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// OAuth scopes the extension asks the identity service for.
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Placeholder shown when a profile has no photo.
pub const DEFAULT_PHOTO_URL: &str = "default-photo-url";

/// Local storage key holding the signed-in [`StoredUser`].
pub const USER_STORAGE_KEY: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub client_id: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_url: Url,
    pub scopes: Vec<String>,
}

/// Opaque bearer token issued by the identity service.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEmail {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonPhoto {
    #[serde(default)]
    pub url: String,
}

/// Profile as returned by the People API `people/me` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<PersonName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_addresses: Vec<PersonEmail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<PersonPhoto>,
}

impl ProfileInfo {
    pub fn display_name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|name| name.display_name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|email| email.value.as_str())
            .filter(|email| !email.is_empty())
    }

    pub fn photo_url(&self) -> Option<&str> {
        self.photos
            .first()
            .map(|photo| photo.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

/// Profile record kept by the MailMinder backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub api_calls: i64,
    #[serde(default)]
    pub subscription_plan: Option<PlanTitle>,
}

/// The signed-in user as persisted in local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: String,
    pub email_address: String,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn from_record(record: &ProfileRecord) -> Self {
        Self {
            id: record.id.clone(),
            email_address: record.email_address.clone(),
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Formal,
    Professional,
    Enthusiastic,
    NotInterested,
    #[serde(alias = "impower")]
    Empower,
    Attractive,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Formal,
        Tone::Professional,
        Tone::Enthusiastic,
        Tone::NotInterested,
        Tone::Empower,
        Tone::Attractive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Professional => "professional",
            Tone::Enthusiastic => "enthusiastic",
            Tone::NotInterested => "not_interested",
            Tone::Empower => "empower",
            Tone::Attractive => "attractive",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tone::Formal => "Formal",
            Tone::Professional => "Professional",
            Tone::Enthusiastic => "Enthusiastic",
            Tone::NotInterested => "Not Interested",
            Tone::Empower => "Empower",
            Tone::Attractive => "Attractive",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTone(pub String);

impl fmt::Display for UnknownTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tone `{}`", self.0)
    }
}

impl std::error::Error for UnknownTone {}

impl FromStr for Tone {
    type Err = UnknownTone;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "impower" {
            return Ok(Tone::Empower);
        }
        Tone::ALL
            .into_iter()
            .find(|tone| tone.as_str() == normalized)
            .ok_or_else(|| UnknownTone(value.to_string()))
    }
}

/// Exactly three non-empty reply candidates from one generation cycle.
///
/// The candidates were produced independently; their order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionBatch([String; 3]);

impl SuggestionBatch {
    pub const SIZE: usize = 3;

    /// Builds a batch when every candidate is present and non-blank.
    ///
    /// On failure returns how many usable candidates were received.
    pub fn from_candidates<I>(candidates: I) -> Result<Self, usize>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let usable = candidates
            .into_iter()
            .flatten()
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>();
        let received = usable.len();
        <[String; 3]>::try_from(usable)
            .map(Self)
            .map_err(|_| received)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTitle {
    Free,
    Monthly,
    Yearly,
}

impl PlanTitle {
    pub const ALL: [PlanTitle; 3] = [PlanTitle::Free, PlanTitle::Monthly, PlanTitle::Yearly];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTitle::Free => "free",
            PlanTitle::Monthly => "monthly",
            PlanTitle::Yearly => "yearly",
        }
    }

    pub fn price_label(self) -> &'static str {
        match self {
            PlanTitle::Free => "$0/month",
            PlanTitle::Monthly => "$24.99/month",
            PlanTitle::Yearly => "$10.7/month, billed as $129 / year",
        }
    }

    pub fn features(self) -> &'static [&'static str] {
        match self {
            PlanTitle::Free => &[
                "Suggestions",
                "Tone Adjustment",
                "Communication Context",
                "Limited Email Replies",
                "Limited Suggestions",
            ],
            PlanTitle::Monthly | PlanTitle::Yearly => &[
                "Unlimited Emails",
                "Personalized, human-like responses",
                "Unlimited Suggestions",
                "Tone Adjustment",
                "Communication Context",
            ],
        }
    }
}

impl fmt::Display for PlanTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed change applied to a backend usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageDelta(pub i64);

impl UsageDelta {
    pub fn compensation(self) -> Self {
        Self(-self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    ReplySuggestions,
    SignIn,
    UserProfile,
}

impl OverlayKind {
    /// Bundled extension page rendered inside the overlay frame.
    pub fn page(self) -> &'static str {
        match self {
            OverlayKind::ReplySuggestions => "iframe.html",
            OverlayKind::SignIn => "auth.html",
            OverlayKind::UserProfile => "infoModel.html",
        }
    }

    pub fn frame_class(self) -> &'static str {
        match self {
            OverlayKind::ReplySuggestions | OverlayKind::SignIn => "custom-iframe",
            OverlayKind::UserProfile => "user-profile-iframe",
        }
    }
}

/// Identifier for one overlay frame instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub Uuid);

impl FrameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}
