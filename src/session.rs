//! Session Store: the app-wide view of who is signed in.
//!
//! The state has exactly one writer, the task spawned by
//! [`SessionStore::listen`], which replays the auth change stream into a
//! `watch` channel. Everything else only reads.

use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::auth::{AuthChangeEvent, AuthGateway, AuthStateChange};
use crate::models::Identity;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// True until the initial session has been resolved.
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
            error: None,
        }
    }
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    fn apply(&mut self, change: AuthStateChange) {
        self.loading = false;
        match change.event {
            AuthChangeEvent::InitialSession
            | AuthChangeEvent::SignedIn
            | AuthChangeEvent::UserUpdated => {
                self.identity = change.identity;
                self.error = None;
            }
            AuthChangeEvent::SignedOut => {
                self.identity = None;
                self.error = None;
            }
            AuthChangeEvent::SignInFailed => {
                self.error = change.error;
            }
        }
    }
}

fn apply(sender: &watch::Sender<SessionState>, change: AuthStateChange) {
    debug!("session change: {:?}", change.event);
    sender.send_modify(|state| state.apply(change));
}

/// Read handle on the session state. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    receiver: watch::Receiver<SessionState>,
}

impl SessionStore {
    /// Start following `auth`. The returned task is the only writer; it ends
    /// when the gateway goes away or every store handle is dropped.
    pub fn listen(auth: &AuthGateway) -> (SessionStore, JoinHandle<()>) {
        // 取りこぼし防止のため、現在値を読む前に購読する
        let mut subscription = auth.subscribe();
        let initial = AuthStateChange {
            event: AuthChangeEvent::InitialSession,
            identity: auth.current_identity(),
            error: None,
        };

        let (sender, receiver) = watch::channel(SessionState::default());
        let handle = tokio::spawn(async move {
            apply(&sender, initial);
            while let Some(change) = subscription.next().await {
                apply(&sender, change);
                if sender.is_closed() {
                    break;
                }
            }
        });

        (SessionStore { receiver }, handle)
    }

    pub fn snapshot(&self) -> SessionState {
        self.receiver.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.receiver.borrow().identity.clone()
    }

    /// A fresh receiver for code that wants to await changes itself.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.receiver.clone()
    }

    /// Wait for the next change. `None` once the writer has stopped.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the initial session is known.
    pub async fn wait_until_ready(&mut self) -> SessionState {
        let ready = self
            .receiver
            .wait_for(|state| !state.loading)
            .await
            .map(|state| state.clone());
        // 書き込み側が終了した場合は最後の状態を返す
        ready.unwrap_or_else(|_| self.snapshot())
    }

    /// Wait until `predicate` holds for the state. `None` once the writer has stopped.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<SessionState>
    where
        F: FnMut(&SessionState) -> bool,
    {
        self.receiver
            .wait_for(predicate)
            .await
            .ok()
            .map(|state| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GigboardConfig;
    use reqwest::Client;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: None,
            display_name: None,
            avatar_url: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn change(event: AuthChangeEvent, identity: Option<Identity>) -> AuthStateChange {
        AuthStateChange {
            event,
            identity,
            error: None,
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut state = SessionState::default();
        assert!(state.loading);

        state.apply(change(AuthChangeEvent::InitialSession, None));
        assert!(!state.loading);
        assert!(!state.is_signed_in());

        state.apply(AuthStateChange {
            event: AuthChangeEvent::SignInFailed,
            identity: None,
            error: Some("Invalid login credentials".to_string()),
        });
        assert_eq!(state.error.as_deref(), Some("Invalid login credentials"));

        state.apply(change(AuthChangeEvent::SignedIn, Some(identity("u1"))));
        assert!(state.is_signed_in());
        assert!(state.error.is_none());

        state.apply(change(AuthChangeEvent::SignedOut, None));
        assert!(state.identity.is_none());
    }

    #[test]
    fn test_sign_in_failure_keeps_identity() {
        let mut state = SessionState::default();
        state.apply(change(AuthChangeEvent::SignedIn, Some(identity("u1"))));
        state.apply(AuthStateChange {
            event: AuthChangeEvent::SignInFailed,
            identity: None,
            error: Some("nope".to_string()),
        });

        assert_eq!(state.identity.map(|i| i.id), Some("u1".to_string()));
    }

    #[test]
    fn test_listen_resolves_initial_session() {
        tokio_test::block_on(async {
            let gateway = AuthGateway::from_config(&GigboardConfig::default(), Client::new());
            let (mut store, _writer) = SessionStore::listen(&gateway);

            let state = store.wait_until_ready().await;
            assert!(!state.loading);
            assert!(state.identity.is_none());
            assert_eq!(store.snapshot(), state);
        });
    }

    #[tokio::test]
    async fn test_wait_until_ready_after_writer_stopped() {
        let (sender, receiver) = watch::channel(SessionState::default());
        drop(sender);

        let mut store = SessionStore { receiver };
        let state = store.wait_until_ready().await;
        assert!(state.loading);
        assert!(state.identity.is_none());
    }
}
