use serde::{Deserialize, Serialize};

/// Shown by `UserRecord::display_name` when there is no user.
pub const USER_NOT_FOUND: &str = "User not found";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: Option<String>,
    pub attributes: Option<Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    pub bio: Option<String>,
    pub url: Option<String>,
    pub company: Option<String>,
}

/// A user as received from an API, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRecord {
    Known(User),

    /// No user at all (missing or `null`).
    Absent,

    /// Something that is not shaped like a user.
    Malformed,
}

impl UserRecord {
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => UserRecord::Absent,
            Some(value) => match serde_json::from_value::<User>(value.clone()) {
                Ok(user) => UserRecord::Known(user),
                Err(err) => {
                    tracing::debug!(?err, "Value is not a user.");
                    UserRecord::Malformed
                }
            },
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name_or(USER_NOT_FOUND)
    }

    /// The users full name, `not_found` if there is no user, or an empty string if the user has
    /// no (non-blank) full name.
    pub fn display_name_or(&self, not_found: &str) -> String {
        match self {
            UserRecord::Absent => not_found.to_owned(),
            UserRecord::Known(User {
                attributes:
                    Some(Profile {
                        full_name: Some(full_name),
                        ..
                    }),
                ..
            }) if !full_name.trim().is_empty() => full_name.clone(),
            UserRecord::Known(_) | UserRecord::Malformed => String::new(),
        }
    }
}

impl From<Option<User>> for UserRecord {
    fn from(user: Option<User>) -> Self {
        match user {
            Some(user) => UserRecord::Known(user),
            None => UserRecord::Absent,
        }
    }
}
