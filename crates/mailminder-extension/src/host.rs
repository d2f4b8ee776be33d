use crate::CoordinatorError;
use mailminder_core::{ExtensionMessage, TabId};

/// The focused browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTab {
    pub id: TabId,
    pub url: Option<String>,
}

/// Tab and messaging primitives of the browser that hosts the extension.
pub trait HostPlatform: Send + Sync {
    fn active_tab(&self) -> Option<ActiveTab>;

    fn send_to_tab(&self, tab: TabId, message: ExtensionMessage) -> Result<(), CoordinatorError>;

    /// Opens `url` in a new tab and delivers `message` to it once loaded.
    fn open_tab(&self, url: &str, message: Option<ExtensionMessage>) -> Result<(), CoordinatorError>;

    /// Absolute URL of a page bundled with the extension.
    fn resource_url(&self, page: &str) -> String;
}
