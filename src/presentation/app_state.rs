// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardHandle;
use crate::application::settings::SettingsService;
use crate::infrastructure::broadcast_sink::BroadcastSink;
use crate::infrastructure::config::LoginConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::RwLock;

const TOKEN_LENGTH: usize = 32;

pub struct AppState {
    pub dashboard: DashboardHandle,
    pub settings: SettingsService,
    pub sink: BroadcastSink,
    pub login: LoginConfig,
    pub auto_connect: bool,
    pub sessions: LoginSession,
}

/// The single logged-in session, identified by a random bearer token
#[derive(Default)]
pub struct LoginSession {
    token: RwLock<Option<String>>,
}

impl LoginSession {
    /// Issue a fresh token, invalidating any previous one
    pub fn issue(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        if let Ok(mut current) = self.token.write() {
            *current = Some(token.clone());
        }
        token
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.token
            .read()
            .map(|current| current.as_deref() == Some(token))
            .unwrap_or(false)
    }

    pub fn revoke(&self) {
        if let Ok(mut current) = self.token.write() {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_token_is_valid() {
        let sessions = LoginSession::default();
        let first = sessions.issue();
        let second = sessions.issue();

        assert_eq!(second.len(), TOKEN_LENGTH);
        assert!(!sessions.is_valid(&first));
        assert!(sessions.is_valid(&second));

        sessions.revoke();
        assert!(!sessions.is_valid(&second));
    }
}
