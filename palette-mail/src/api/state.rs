//! Shared application state

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::accounts::UserManager;
use crate::config::Config;
use crate::delivery::{
    EmailDispatcher, HistoryManager, MailTransport, NotificationManager,
};
use crate::error::Result;
use crate::mfa::{MfaManager, TotpService};
use crate::session::{RevocationList, SessionGuard, SessionManager};
use crate::templates::TemplateManager;

pub struct AppState {
    pub guard: SessionGuard,
    pub users: UserManager,
    pub sessions: SessionManager,
    pub mfa: MfaManager,
    pub templates: TemplateManager,
    pub history: HistoryManager,
    pub notifications: NotificationManager,
    pub dispatcher: EmailDispatcher,
}

impl AppState {
    /// Wire every manager onto one pool and create their tables.
    ///
    /// Fails without a signing secret.
    pub async fn build(
        config: &Config,
        db: SqlitePool,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Arc<Self>> {
        let guard = SessionGuard::new(&config.auth)?;

        let users = UserManager::new(db.clone());
        let sessions = SessionManager::new(db.clone(), RevocationList::new());
        let mfa = MfaManager::new(db.clone(), TotpService::new(config.mfa.issuer.clone()));
        let templates = TemplateManager::new(db.clone());
        let history = HistoryManager::new(db.clone());
        let notifications = NotificationManager::new(db);

        users.init_db().await?;
        sessions.init_db().await?;
        mfa.init_db().await?;
        templates.init_db().await?;
        history.init_db().await?;
        notifications.init_db().await?;

        let dispatcher = EmailDispatcher::new(
            templates.clone(),
            history.clone(),
            notifications.clone(),
            transport,
            config.server.base_url.clone(),
            config.smtp.sender_name.clone(),
        );

        Ok(Arc::new(Self {
            guard,
            users,
            sessions,
            mfa,
            templates,
            history,
            notifications,
            dispatcher,
        }))
    }
}
