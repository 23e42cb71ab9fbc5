use crate::config::Config;
use crate::db::DbPool;
use crate::mail::SmtpMailer;
use crate::storage::Storage;
use std::sync::Arc;

pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub storage: Storage,
    pub mailer: SmtpMailer,
}
