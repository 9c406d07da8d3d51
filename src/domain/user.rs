//! User entity: a traveler or a guardian.

use serde::{Deserialize, Serialize};

use super::foundation::{PhoneNumber, Timestamp, UserId};

/// A registered user. The same user may be a traveler in one relationship
/// and a watcher in another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Chat-provider user id, unique per provider. Absent until the user
    /// has connected the chat client.
    pub chat_user_id: Option<String>,

    /// Phone number in E.164, required for voice alerts.
    pub phone: Option<PhoneNumber>,

    pub display_name: String,

    pub created_at: Timestamp,
}

impl User {
    /// Creates a new user with the given display name.
    pub fn new(display_name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: UserId::new(),
            chat_user_id: None,
            phone: None,
            display_name: display_name.into(),
            created_at: now,
        }
    }

    /// Attaches the chat-provider identity.
    pub fn with_chat_user_id(mut self, chat_user_id: impl Into<String>) -> Self {
        self.chat_user_id = Some(chat_user_id.into());
        self
    }

    /// Attaches a normalized phone number.
    pub fn with_phone(mut self, phone: PhoneNumber) -> Self {
        self.phone = Some(phone);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::PhoneNumber;

    #[test]
    fn builder_attaches_contact_points() {
        let user = User::new("Anna", Timestamp::now())
            .with_chat_user_id("426783")
            .with_phone(PhoneNumber::parse("+34600111222").unwrap());

        assert_eq!(user.chat_user_id.as_deref(), Some("426783"));
        assert_eq!(user.phone.as_ref().unwrap().as_str(), "+34600111222");
    }
}
