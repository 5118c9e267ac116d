//! Marketplace data model: users, listings, conversations, profiles, and the
//! request/response bodies of the REST API. JSON field names are camelCase.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// At most this many images per listing; the first one is the main image.
pub const MAX_LISTING_IMAGES: usize = 5;

/// Backend ids arrive as strings or numbers; both are kept as strings.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid id: {}", other))),
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        value @ Value::Array(_) => serde_json::from_value(value).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("invalid image list: {}", other))),
    }
}

// ── Users and auth ─────────────────────────────────────────────────────

/// The authenticated user. Fields the client does not know about are kept in
/// `extra` so the stored record round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Name if known, else email, else id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// `POST /auth/login` body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub course: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub contact_info: String,
}

/// Response of both auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ── Listings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Books,
    Furniture,
    Clothing,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Electronics,
        Category::Books,
        Category::Furniture,
        Category::Clothing,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Books => "books",
            Category::Furniture => "furniture",
            Category::Clothing => "clothing",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClientError::validation(format!("unknown category: {}", s)))
    }
}

/// Seller reference: the backend sends either a display name or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSeller")]
pub struct SellerRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeller {
    Name(String),
    Full {
        #[serde(default, alias = "_id")]
        id: Option<Value>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<RawSeller> for SellerRef {
    fn from(raw: RawSeller) -> Self {
        match raw {
            RawSeller::Name(name) => SellerRef {
                id: None,
                name: Some(name),
            },
            RawSeller::Full { id, name } => SellerRef {
                id: id.and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                name,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingStats {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: u64,
}

/// A marketplace item for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(alias = "_id", deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(
        default,
        alias = "image",
        alias = "imageUrl",
        deserialize_with = "one_or_many"
    )]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<SellerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stats: ListingStats,
}

impl Listing {
    pub fn main_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn seller_name(&self) -> &str {
        self.seller
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .unwrap_or("Unknown seller")
    }

    /// Only the owning seller may mutate a listing.
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.seller
            .as_ref()
            .and_then(|s| s.id.as_deref())
            .is_some_and(|id| id == user.id)
    }
}

/// The seller-editable part of a listing, sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub condition: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ListingDraft {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.title.trim().is_empty() {
            return Err(ClientError::validation("Title is required"));
        }
        if self.description.trim().is_empty() {
            return Err(ClientError::validation("Description is required"));
        }
        if self.price.is_sign_negative() {
            return Err(ClientError::validation("Price cannot be negative"));
        }
        if self.images.len() > MAX_LISTING_IMAGES {
            return Err(ClientError::validation(format!(
                "You can upload up to {} images",
                MAX_LISTING_IMAGES
            )));
        }
        Ok(())
    }
}

impl From<&Listing> for ListingDraft {
    fn from(l: &Listing) -> Self {
        Self {
            title: l.title.clone(),
            description: l.description.clone(),
            price: l.price,
            category: l.category,
            condition: l.condition.clone().unwrap_or_else(|| "good".into()),
            images: l.images.clone(),
        }
    }
}

// ── Chat ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_string")]
    pub sender_id: String,
    #[serde(deserialize_with = "id_string")]
    pub recipient_id: String,
    #[serde(alias = "message")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Client → server chat message; the server stamps sender and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Message history with one counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "userId", deserialize_with = "id_string")]
    pub counterpart_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_online: bool,
}

impl Conversation {
    pub fn new(counterpart_user_id: impl Into<String>) -> Self {
        Self {
            counterpart_user_id: counterpart_user_id.into(),
            name: None,
            messages: Vec::new(),
            last_message: None,
            last_message_time: None,
            unread_count: 0,
            is_online: false,
        }
    }

    /// True when `msg` was sent to or by the counterpart.
    pub fn involves(&self, msg: &ChatMessage) -> bool {
        msg.sender_id == self.counterpart_user_id || msg.recipient_id == self.counterpart_user_id
    }

    /// Append-only; a message older than the current tail is rejected.
    pub fn append(&mut self, msg: ChatMessage) -> Result<(), ClientError> {
        if let Some(last) = self.messages.last() {
            if msg.timestamp < last.timestamp {
                return Err(ClientError::validation(format!(
                    "message at {} is older than conversation tail at {}",
                    msg.timestamp, last.timestamp
                )));
            }
        }
        self.last_message = Some(msg.text.clone());
        self.last_message_time = Some(msg.timestamp);
        self.messages.push(msg);
        Ok(())
    }
}

// ── Profile ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// `PUT /users/profile` body. Email is not editable, so it is not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl From<&Profile> for ProfileUpdate {
    fn from(p: &Profile) -> Self {
        Self {
            name: p.name.clone(),
            phone: p.phone.clone(),
            college: p.college.clone(),
            bio: p.bio.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn listing_accepts_legacy_shapes() {
        let json = serde_json::json!({
            "_id": 7,
            "title": "Mini Fridge",
            "description": "Compact",
            "price": "75.00",
            "category": "appliances",
            "image": "https://img/fridge.png",
            "seller": "Taylor Wong"
        });
        let listing: Listing = serde_json::from_value(json).unwrap();
        assert_eq!(listing.id, "7");
        assert_eq!(listing.price, dec("75.00"));
        assert_eq!(listing.category, Category::Other);
        assert_eq!(listing.main_image(), Some("https://img/fridge.png"));
        assert_eq!(listing.seller_name(), "Taylor Wong");
        assert!(!listing.is_owned_by(&User::new("1")));
    }

    #[test]
    fn listing_seller_object_grants_ownership() {
        let json = serde_json::json!({
            "id": "abc",
            "title": "Desk",
            "price": 20,
            "category": "furniture",
            "images": ["a", "b"],
            "seller": {"_id": "u1", "name": "Sam"},
            "createdAt": "2024-09-01T12:00:00Z",
            "stats": {"views": 3, "rating": 4.5}
        });
        let listing: Listing = serde_json::from_value(json).unwrap();
        assert!(listing.is_owned_by(&User::new("u1")));
        assert_eq!(listing.stats.views, 3);
        assert_eq!(listing.images.len(), 2);
    }

    #[test]
    fn user_round_trips_unknown_fields() {
        let json = serde_json::json!({"id": "1", "name": "Ana", "college": "MIT"});
        let user: User = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(user.display_name(), "Ana");
        assert_eq!(serde_json::to_value(&user).unwrap(), json);
    }

    #[test]
    fn draft_validation() {
        let mut draft = ListingDraft {
            title: "Lamp".into(),
            description: "LED".into(),
            price: dec("28.50"),
            category: Category::Furniture,
            condition: "good".into(),
            images: vec![],
        };
        assert!(draft.validate().is_ok());

        draft.price = dec("-1");
        assert!(matches!(draft.validate(), Err(ClientError::Validation(_))));

        draft.price = dec("1");
        draft.images = vec!["x".into(); MAX_LISTING_IMAGES + 1];
        assert!(draft.validate().is_err());

        draft.images.clear();
        draft.title = "  ".into();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Books".parse::<Category>().unwrap(), Category::Books);
        assert!("toys".parse::<Category>().is_err());
    }

    fn msg(from: &str, to: &str, text: &str, ts: &str) -> ChatMessage {
        ChatMessage {
            sender_id: from.into(),
            recipient_id: to.into(),
            text: text.into(),
            timestamp: ts.parse().unwrap(),
        }
    }

    #[test]
    fn conversation_is_append_only_in_time_order() {
        let mut conv = Conversation::new("u2");
        conv.append(msg("u1", "u2", "hi", "2024-01-01T10:00:00Z"))
            .unwrap();
        conv.append(msg("u2", "u1", "hey", "2024-01-01T10:00:00Z"))
            .unwrap();
        let err = conv.append(msg("u2", "u1", "late", "2024-01-01T09:59:59Z"));
        assert!(err.is_err());
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.last_message.as_deref(), Some("hey"));
    }

    #[test]
    fn chat_message_accepts_message_alias() {
        let json = serde_json::json!({
            "senderId": 2, "recipientId": "1", "message": "yo",
            "timestamp": "2024-01-01T10:00:00Z"
        });
        let m: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(m.sender_id, "2");
        assert_eq!(m.text, "yo");
        assert!(Conversation::new("2").involves(&m));
    }
}
