use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use agentkit::message::Message;

/// Identity of one conversation. History lives in [`Context`] and is never
/// written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn create(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        let session = Self {
            id: Uuid::new_v4().to_string(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        };
        debug!(
            "Created session {} for user {} in {}",
            session.id, session.user_id, session.app_name
        );
        session
    }
}

#[derive(Debug, Default)]
pub struct Context {
    history: Vec<Message>,
    token_count: i64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn token_count(&self) -> i64 {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn append_messages<M>(&mut self, messages: M)
    where
        M: IntoIterator<Item = Message>,
    {
        let before = self.history.len();
        self.history.extend(messages);
        debug!("Appended {} message(s) to context", self.history.len() - before);
    }

    pub fn update_token_count(&mut self, token_count: i64) {
        debug!("Updating token count in context: {token_count}");
        self.token_count = token_count;
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.token_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_history_and_tokens() {
        let mut context = Context::new();
        context.append_messages([Message::user("hi"), Message::user("again")]);
        context.update_token_count(42);
        assert_eq!(context.history().len(), 2);

        context.clear();
        assert!(context.is_empty());
        assert_eq!(context.token_count(), 0);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let a = Session::create("weather_time_agent", "student");
        let b = Session::create("weather_time_agent", "student");
        assert_ne!(a.id, b.id);
        assert_eq!(a.user_id, "student");
    }
}
