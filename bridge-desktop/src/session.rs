//! Channel-backed media session for in-process controllers.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    session::{
        BrowseItem, CustomAction, MediaBrowser, MediaMetadata, QueueEntry, SessionCommand,
        SessionCommandSender, SessionProtocol, SessionToken, TransportState,
    },
};
use core_async::sync::watch;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Everything the session currently publishes.
#[derive(Debug, Clone, Default)]
pub struct PublishedSession {
    pub token: Option<SessionToken>,
    pub tag: Option<String>,
    pub active: bool,
    pub transport: Option<TransportState>,
    pub metadata: Option<MediaMetadata>,
    pub queue_title: Option<String>,
    pub queue: Vec<QueueEntry>,
    pub custom_actions: Vec<CustomAction>,
    pub released: bool,
}

#[derive(Default)]
struct Attachment {
    commands: Option<SessionCommandSender>,
    browser: Option<Arc<dyn MediaBrowser>>,
}

/// [`SessionProtocol`] that publishes into a `watch` channel and accepts
/// commands from [`SessionController`]s.
#[derive(Clone)]
pub struct ChannelSessionProtocol {
    published: Arc<watch::Sender<PublishedSession>>,
    attachment: Arc<Mutex<Attachment>>,
}

impl Default for ChannelSessionProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSessionProtocol {
    pub fn new() -> Self {
        let (published, _) = watch::channel(PublishedSession::default());
        Self {
            published: Arc::new(published),
            attachment: Arc::new(Mutex::new(Attachment::default())),
        }
    }

    /// Handle for a controller (UI, key handler, head-unit shim).
    pub fn controller(&self) -> SessionController {
        SessionController {
            published: self.published.subscribe(),
            attachment: Arc::clone(&self.attachment),
        }
    }
}

#[async_trait]
impl SessionProtocol for ChannelSessionProtocol {
    async fn create_session(&self, tag: &str) -> Result<SessionToken> {
        let token = SessionToken::new();
        self.published.send_modify(|session| {
            *session = PublishedSession {
                token: Some(token),
                tag: Some(tag.to_string()),
                ..PublishedSession::default()
            };
        });
        debug!(%token, tag, "Session created");
        Ok(token)
    }

    async fn set_active(&self, active: bool) -> Result<()> {
        self.published.send_if_modified(|session| {
            let changed = session.active != active;
            session.active = active;
            changed
        });
        Ok(())
    }

    async fn set_transport_state(&self, state: TransportState) -> Result<()> {
        self.published
            .send_modify(|session| session.transport = Some(state));
        Ok(())
    }

    async fn set_metadata(&self, metadata: MediaMetadata) -> Result<()> {
        self.published
            .send_modify(|session| session.metadata = Some(metadata));
        Ok(())
    }

    async fn set_queue(&self, title: Option<String>, items: Vec<QueueEntry>) -> Result<()> {
        self.published.send_modify(|session| {
            session.queue_title = title;
            session.queue = items;
        });
        Ok(())
    }

    async fn set_custom_actions(&self, actions: Vec<CustomAction>) -> Result<()> {
        self.published
            .send_modify(|session| session.custom_actions = actions);
        Ok(())
    }

    fn attach(&self, commands: SessionCommandSender, browser: Arc<dyn MediaBrowser>) {
        let mut attachment = self.attachment.lock();
        attachment.commands = Some(commands);
        attachment.browser = Some(browser);
    }

    async fn release(&self) -> Result<()> {
        *self.attachment.lock() = Attachment::default();
        self.published.send_modify(|session| {
            session.active = false;
            session.released = true;
        });
        debug!("Session released");
        Ok(())
    }
}

/// Controller side of a [`ChannelSessionProtocol`].
#[derive(Clone)]
pub struct SessionController {
    published: watch::Receiver<PublishedSession>,
    attachment: Arc<Mutex<Attachment>>,
}

impl SessionController {
    /// Latest published session.
    pub fn current(&self) -> PublishedSession {
        self.published.borrow().clone()
    }

    /// Stream of publications.
    pub fn watch(&self) -> watch::Receiver<PublishedSession> {
        self.published.clone()
    }

    pub fn send(&self, command: SessionCommand) -> Result<()> {
        let attachment = self.attachment.lock();
        let sender = attachment
            .commands
            .as_ref()
            .ok_or_else(|| BridgeError::NotAvailable("no session attached".to_string()))?;
        sender
            .send(command)
            .map_err(|_| BridgeError::NotAvailable("session closed".to_string()))
    }

    pub fn browse_root(&self) -> Option<String> {
        self.browser().map(|browser| browser.root_id())
    }

    pub fn load_children(&self, parent_id: &str) -> Vec<BrowseItem> {
        self.browser()
            .map(|browser| browser.load_children(parent_id))
            .unwrap_or_default()
    }

    fn browser(&self) -> Option<Arc<dyn MediaBrowser>> {
        self.attachment.lock().browser.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::session::BrowseFlag;
    use core_async::sync::mpsc;

    struct OneLevel;

    impl MediaBrowser for OneLevel {
        fn root_id(&self) -> String {
            "root".to_string()
        }

        fn load_children(&self, parent_id: &str) -> Vec<BrowseItem> {
            if parent_id != "root" {
                return Vec::new();
            }
            vec![BrowseItem {
                id: "song".to_string(),
                title: "Song".to_string(),
                subtitle: None,
                icon_uri: None,
                flag: BrowseFlag::Playable,
            }]
        }
    }

    #[tokio::test]
    async fn controller_sends_commands_after_attach() {
        let protocol = ChannelSessionProtocol::new();
        let controller = protocol.controller();
        assert!(controller.send(SessionCommand::Play).is_err());

        let (tx, mut rx) = mpsc::unbounded_channel();
        protocol.attach(tx, Arc::new(OneLevel));
        controller.send(SessionCommand::SeekTo(5_000)).unwrap();
        assert_eq!(rx.recv().await, Some(SessionCommand::SeekTo(5_000)));

        assert_eq!(controller.browse_root().as_deref(), Some("root"));
        assert_eq!(controller.load_children("root").len(), 1);
        assert!(controller.load_children("song").is_empty());
    }

    #[tokio::test]
    async fn publications_reach_controller() {
        let protocol = ChannelSessionProtocol::new();
        let controller = protocol.controller();
        let token = protocol.create_session("media-core").await.unwrap();
        protocol.set_active(true).await.unwrap();
        protocol
            .set_queue(Some("Album".to_string()), Vec::new())
            .await
            .unwrap();

        let current = controller.current();
        assert_eq!(current.token, Some(token));
        assert!(current.active);
        assert_eq!(current.queue_title.as_deref(), Some("Album"));

        protocol.release().await.unwrap();
        let current = controller.current();
        assert!(current.released);
        assert!(!current.active);
    }
}
