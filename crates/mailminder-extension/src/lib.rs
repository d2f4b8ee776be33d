mod channel;
mod coordinator;
mod document;
mod error;
mod host;
mod page;
mod popup;
mod profile_panel;
mod reply_panel;
mod sign_in;
mod subscription_panel;

pub use channel::{CoordinatorChannel, RuntimeChannel};
pub use coordinator::BackgroundCoordinator;
pub use document::{MemoryDocument, NodeId, PageDocument};
pub use error::{CoordinatorError, PanelError};
pub use host::{ActiveTab, HostPlatform};
pub use page::{is_inbox_view, PageInjector};
pub use popup::{FeedbackStatus, Popup, PopupState, PopupView, HELP_STEPS};
pub use profile_panel::{ProfilePanel, ProfileView};
pub use reply_panel::{ReplyPanel, ReplyPanelState, ReplyPhase, ReplyView, PLAN_LIMIT_MESSAGE};
pub use sign_in::SignInPanel;
pub use subscription_panel::{PlanOffer, SubscriptionPanel, SubscriptionView};
