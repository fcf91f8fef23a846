//! Session cache: one login per credential per run
//!
//! The first request for a credential drives the login flow; concurrent
//! and later requests wait for and share its outcome. A failed login is
//! cached too, so every dependent scenario fails with the same
//! authentication error instead of retrying.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use uiflow_common::{Credential, LoginConfig, Viewport};

use crate::bindings::Bindings;
use crate::driver::{DriverFactory, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::runner::ScenarioRunner;
use crate::spec::{Expected, Locator, Pick, Scenario, Step, Target};

/// Authenticated browser state for one credential
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    /// Backend-specific state (storage state or cookie jar)
    pub state: Value,
    pub established_at: DateTime<Utc>,
}

/// Performs a login and returns the resulting browser state
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credential: &Credential) -> E2eResult<Value>;
}

type Slot = Arc<OnceCell<Result<Arc<Session>, String>>>;

pub struct SessionCache {
    authenticator: Arc<dyn Authenticator>,
    entries: Mutex<HashMap<Credential, Slot>>,
    logins: AtomicUsize,
}

impl SessionCache {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            entries: Mutex::new(HashMap::new()),
            logins: AtomicUsize::new(0),
        }
    }

    /// Return the session for a credential, logging in on first use
    pub async fn get_or_create(&self, credential: &Credential) -> E2eResult<Arc<Session>> {
        let slot = self
            .entries
            .lock()
            .entry(credential.clone())
            .or_default()
            .clone();

        let outcome = slot
            .get_or_init(|| async {
                self.logins.fetch_add(1, Ordering::SeqCst);
                info!("Logging in as {}", credential);
                match self.authenticator.login(credential).await {
                    Ok(state) => Ok(Arc::new(Session {
                        credential: credential.clone(),
                        state,
                        established_at: Utc::now(),
                    })),
                    Err(e) => {
                        warn!("Login failed for {}: {}", credential, e);
                        Err(match e {
                            E2eError::Authentication { reason, .. } => reason,
                            other => other.to_string(),
                        })
                    }
                }
            })
            .await;

        match outcome {
            Ok(session) => Ok(Arc::clone(session)),
            Err(reason) => Err(E2eError::Authentication {
                username: credential.username.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Drop the cached session (after a logout). The next request logs in again.
    pub fn invalidate(&self, credential: &Credential) {
        if self.entries.lock().remove(credential).is_some() {
            debug!("Invalidated session for {}", credential);
        }
    }

    pub fn is_cached(&self, credential: &Credential) -> bool {
        self.entries
            .lock()
            .get(credential)
            .map(|slot| matches!(slot.get(), Some(Ok(_))))
            .unwrap_or(false)
    }

    /// Number of login flows driven so far
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

/// Logs in through the application's login form
pub struct FormLogin {
    factory: Arc<dyn DriverFactory>,
    runner: ScenarioRunner,
    config: LoginConfig,
    viewport: Viewport,
}

impl FormLogin {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        runner: ScenarioRunner,
        config: LoginConfig,
        viewport: Viewport,
    ) -> Self {
        Self {
            factory,
            runner,
            config,
            viewport,
        }
    }

    /// The login flow as a scenario
    fn flow(&self) -> Scenario {
        let css = |selector: &str| Target::only(Locator::css(selector));
        Scenario {
            name: "login".to_string(),
            description: String::new(),
            tags: Vec::new(),
            ends_session: false,
            setup: Vec::new(),
            steps: vec![
                Step::Navigate {
                    url: self.config.entry_path.clone(),
                },
                Step::Fill {
                    target: css(&self.config.username_selector),
                    value: "${login.username}".to_string(),
                },
                Step::Fill {
                    target: css(&self.config.password_selector),
                    value: "${login.password}".to_string(),
                },
                Step::Click {
                    target: css(&self.config.submit_selector),
                },
                Step::AssertText {
                    target: Target::new(Locator::text(self.config.success_text.clone()), Pick::First),
                    expected: Expected::Contains(self.config.success_text.clone()),
                    timeout_ms: Some(self.config.timeout_ms),
                },
            ],
        }
    }

    async fn perform(&self, page: &mut dyn PageDriver, credential: &Credential) -> E2eResult<Value> {
        let mut vars = Bindings::new();
        vars.bind("login.username", credential.username.clone());
        vars.bind("login.password", credential.password.clone());
        // Without a name the greeting cannot prove whose session this is
        match &credential.display_name {
            Some(name) => vars.bind("login.fullName", name.clone()),
            None if self.config.success_text.contains("${login.fullName}") => {
                return Err(E2eError::Authentication {
                    username: credential.username.clone(),
                    reason: "credential has no display name to confirm the login".to_string(),
                });
            }
            None => {}
        }

        let result = self
            .runner
            .run_with("login", &self.flow(), None, page, vars)
            .await;
        if !result.passed() {
            return Err(E2eError::Authentication {
                username: credential.username.clone(),
                reason: result.reason.unwrap_or_else(|| {
                    format!(
                        "'{}' not shown within {:?}",
                        self.config.success_text,
                        Duration::from_millis(self.config.timeout_ms)
                    )
                }),
            });
        }
        page.export_state().await
    }
}

#[async_trait]
impl Authenticator for FormLogin {
    async fn login(&self, credential: &Credential) -> E2eResult<Value> {
        let mut page = self.factory.open(self.viewport).await?;
        let result = self.perform(page.as_mut(), credential).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close login page: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for Counting {
        async fn login(&self, credential: &Credential) -> E2eResult<Value> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(E2eError::Authentication {
                    username: credential.username.clone(),
                    reason: "The username and password could not be verified.".to_string(),
                })
            } else {
                Ok(serde_json::json!({ "cookies": [{ "name": "JSESSIONID", "value": "abc" }] }))
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_login() {
        let cache = Arc::new(SessionCache::new(Arc::new(Counting { fail: false })));
        let credential = Credential::new("AliceTestUser", "TestPassword123");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let credential = credential.clone();
                tokio::spawn(async move { cache.get_or_create(&credential).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cache.login_count(), 1);
        assert!(cache.is_cached(&credential));
    }

    #[tokio::test]
    async fn test_failed_login_is_not_retried() {
        let cache = SessionCache::new(Arc::new(Counting { fail: true }));
        let credential = Credential::new("InvalidUser", "WrongPassword");

        for _ in 0..3 {
            let err = cache.get_or_create(&credential).await.unwrap_err();
            assert!(matches!(
                err,
                E2eError::Authentication { ref reason, .. } if reason == "The username and password could not be verified."
            ));
        }
        assert_eq!(cache.login_count(), 1);
        assert!(!cache.is_cached(&credential));
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_login() {
        let cache = SessionCache::new(Arc::new(Counting { fail: false }));
        let credential = Credential::new("AliceTestUser", "TestPassword123");

        cache.get_or_create(&credential).await.unwrap();
        cache.invalidate(&credential);
        assert!(!cache.is_cached(&credential));
        cache.get_or_create(&credential).await.unwrap();
        assert_eq!(cache.login_count(), 2);
    }
}
