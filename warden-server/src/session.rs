//! Login sessions and the per-request unit of work.
//!
//! Handlers never write to the session directly. Writes are staged on a
//! [`StagedSession`] and only reach the session store when the surrounding
//! [`LoginTransaction`] commits; dropping the transaction discards them along
//! with the database transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use utoipa::ToSchema;
use uuid::Uuid;
use warden_core::HandshakeSession;

use crate::db::{Directory, DirectoryTx};
use crate::error::ApiError;

/// Session key holding the logged-in user id
pub const USER_ID_KEY: &str = "user_id";
/// Session key for queued flash messages
pub const MESSAGES_KEY: &str = "_messages";
/// Session key for the pending SSO handshake
pub const HANDSHAKE_KEY: &str = "_auth_handshake";
/// Session key for the cookie-support marker
pub const TEST_COOKIE_KEY: &str = "testcookie";
pub const TEST_COOKIE_VALUE: &str = "worked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FlashMessage {
    pub level: MessageLevel,
    pub text: String,
}

enum SessionWrite {
    Insert(&'static str, serde_json::Value),
    Remove(&'static str),
    CycleId,
}

/// Session view whose mutations are deferred until commit.
pub struct StagedSession {
    session: Session,
    writes: Vec<SessionWrite>,
    pending_messages: Vec<FlashMessage>,
    messages_consumed: bool,
    user_id: Option<Uuid>,
}

impl StagedSession {
    pub async fn load(session: Session) -> Result<Self, ApiError> {
        let user_id = session.get::<Uuid>(USER_ID_KEY).await?;
        Ok(Self {
            session,
            writes: Vec::new(),
            pending_messages: Vec::new(),
            messages_consumed: false,
            user_id,
        })
    }

    /// Whether a user is logged in, counting a login staged in this request.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn set_test_cookie(&mut self) {
        self.writes.push(SessionWrite::Insert(
            TEST_COOKIE_KEY,
            serde_json::Value::from(TEST_COOKIE_VALUE),
        ));
    }

    pub fn add_message(&mut self, level: MessageLevel, text: impl Into<String>) {
        self.pending_messages.push(FlashMessage {
            level,
            text: text.into(),
        });
    }

    /// Drain every queued message for rendering.
    pub async fn take_messages(&mut self) -> Result<Vec<FlashMessage>, ApiError> {
        let mut messages = if self.messages_consumed {
            Vec::new()
        } else {
            self.session
                .get::<Vec<FlashMessage>>(MESSAGES_KEY)
                .await?
                .unwrap_or_default()
        };
        messages.append(&mut self.pending_messages);
        self.messages_consumed = true;
        Ok(messages)
    }

    pub async fn handshake(&self) -> Result<Option<HandshakeSession>, ApiError> {
        Ok(self.session.get::<HandshakeSession>(HANDSHAKE_KEY).await?)
    }

    pub fn store_handshake(&mut self, handshake: &HandshakeSession) -> Result<(), ApiError> {
        let value = serde_json::to_value(handshake)
            .map_err(|e| ApiError::internal(format!("handshake serialization: {}", e)))?;
        self.writes.push(SessionWrite::Insert(HANDSHAKE_KEY, value));
        Ok(())
    }

    pub fn clear_handshake(&mut self) {
        self.writes.push(SessionWrite::Remove(HANDSHAKE_KEY));
    }

    /// Log the user in, rotating the session id.
    pub fn login(&mut self, user_id: Uuid) {
        self.writes.push(SessionWrite::CycleId);
        self.writes
            .push(SessionWrite::Insert(USER_ID_KEY, serde_json::Value::from(user_id.to_string())));
        self.user_id = Some(user_id);
    }

    async fn apply(self) -> Result<(), ApiError> {
        for write in self.writes {
            match write {
                SessionWrite::Insert(key, value) => self.session.insert(key, value).await?,
                SessionWrite::Remove(key) => {
                    self.session.remove_value(key).await?;
                }
                SessionWrite::CycleId => self.session.cycle_id().await?,
            }
        }

        if self.messages_consumed {
            self.session.remove_value(MESSAGES_KEY).await?;
            if !self.pending_messages.is_empty() {
                self.session
                    .insert(MESSAGES_KEY, &self.pending_messages)
                    .await?;
            }
        } else if !self.pending_messages.is_empty() {
            let mut queued = self
                .session
                .get::<Vec<FlashMessage>>(MESSAGES_KEY)
                .await?
                .unwrap_or_default();
            queued.extend(self.pending_messages);
            self.session.insert(MESSAGES_KEY, &queued).await?;
        }
        Ok(())
    }
}

/// Unit of work for one login request.
///
/// Directory reads run inside a transaction and session writes are staged.
/// [`LoginTransaction::commit`] applies both; an early return drops them.
/// The transaction can be released before calls to outside services and is
/// reopened on the next directory access.
pub struct LoginTransaction {
    directory: Arc<Directory>,
    tx: Option<DirectoryTx>,
    session: StagedSession,
}

impl LoginTransaction {
    pub async fn begin(directory: &Arc<Directory>, session: Session) -> Result<Self, ApiError> {
        let tx = directory.begin().await?;
        let session = StagedSession::load(session).await?;
        Ok(Self {
            directory: Arc::clone(directory),
            tx: Some(tx),
            session,
        })
    }

    /// The open directory transaction, starting a new one after a release.
    pub async fn directory(&mut self) -> Result<&mut DirectoryTx, ApiError> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.directory.begin().await?,
        };
        Ok(self.tx.insert(tx))
    }

    /// End the current directory transaction so no connection is held while
    /// waiting on an identity provider. Staged session writes are kept.
    pub async fn release_directory(&mut self) -> Result<(), ApiError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    pub fn session(&mut self) -> &mut StagedSession {
        &mut self.session
    }

    pub async fn commit(self) -> Result<(), ApiError> {
        if let Some(tx) = self.tx {
            tx.commit().await?;
        }
        self.session.apply().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_sessions::MemoryStore;
    use warden_core::Organization;

    use crate::db::MemoryDirectory;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_writes_are_deferred_until_apply() {
        let raw = session();
        let mut staged = StagedSession::load(raw.clone()).await.unwrap();
        staged.set_test_cookie();
        staged.add_message(MessageLevel::Warning, "Your session has expired.");

        assert!(raw.get::<String>(TEST_COOKIE_KEY).await.unwrap().is_none());

        staged.apply().await.unwrap();
        assert_eq!(
            raw.get::<String>(TEST_COOKIE_KEY).await.unwrap().as_deref(),
            Some(TEST_COOKIE_VALUE)
        );
        let queued: Vec<FlashMessage> = raw.get(MESSAGES_KEY).await.unwrap().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].level, MessageLevel::Warning);
    }

    #[tokio::test]
    async fn test_dropped_stage_leaves_session_untouched() {
        let raw = session();
        let mut staged = StagedSession::load(raw.clone()).await.unwrap();
        staged.login(Uuid::new_v4());
        assert!(staged.is_authenticated());
        drop(staged);

        assert!(raw.get::<Uuid>(USER_ID_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_taken_messages_are_cleared() {
        let raw = session();
        raw.insert(
            MESSAGES_KEY,
            vec![FlashMessage {
                level: MessageLevel::Error,
                text: "earlier".into(),
            }],
        )
        .await
        .unwrap();

        let mut staged = StagedSession::load(raw.clone()).await.unwrap();
        staged.add_message(MessageLevel::Info, "now");
        let shown = staged.take_messages().await.unwrap();
        assert_eq!(shown.len(), 2);
        staged.apply().await.unwrap();

        assert!(raw
            .get::<Vec<FlashMessage>>(MESSAGES_KEY)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_login_is_visible_after_apply() {
        let raw = session();
        let user_id = Uuid::new_v4();
        let mut staged = StagedSession::load(raw.clone()).await.unwrap();
        staged.login(user_id);
        staged.apply().await.unwrap();

        assert_eq!(raw.get::<Uuid>(USER_ID_KEY).await.unwrap(), Some(user_id));
    }

    #[tokio::test]
    async fn test_released_directory_reopens_and_keeps_staged_writes() {
        let org = Organization::new("acme", "Acme");
        let directory = Arc::new(Directory::in_memory(Arc::new(
            MemoryDirectory::new().with_organization(org.clone()),
        )));
        let raw = session();
        let mut txn = LoginTransaction::begin(&directory, raw.clone()).await.unwrap();
        txn.session().set_test_cookie();

        txn.release_directory().await.unwrap();
        assert!(txn.tx.is_none());

        let found = txn
            .directory()
            .await
            .unwrap()
            .organization_by_slug("acme")
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(org.id));
        assert!(txn.tx.is_some());

        txn.commit().await.unwrap();
        assert_eq!(
            raw.get::<String>(TEST_COOKIE_KEY).await.unwrap().as_deref(),
            Some(TEST_COOKIE_VALUE)
        );
    }
}
