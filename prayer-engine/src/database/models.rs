//! Database models
//!
//! Rust structs representing database entities and request payloads.
//! All models use serde with camelCase field names for the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Deserialize a present-but-null field as `Some(None)` so that patches can
/// tell "clear this value" apart from "leave it alone".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ===== Grantees =====

/// Who a grant or category belongs to: a single user or every member of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "accessType", content = "accessTypeId", rename_all = "lowercase")]
pub enum Grantee {
    User(i64),
    Group(i64),
}

impl Grantee {
    /// Discriminator as stored in `access_type` / `category_type`
    pub fn kind(&self) -> &'static str {
        match self {
            Grantee::User(_) => "user",
            Grantee::Group(_) => "group",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Grantee::User(id) | Grantee::Group(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: i64) -> Result<Self, String> {
        match kind {
            "user" => Ok(Grantee::User(id)),
            "group" => Ok(Grantee::Group(id)),
            other => Err(format!("unknown grantee type: {}", other)),
        }
    }

    fn decode(row: &SqliteRow, kind_col: &str, id_col: &str) -> sqlx::Result<Self> {
        let kind: String = row.try_get(kind_col)?;
        let id: i64 = row.try_get(id_col)?;
        Grantee::from_parts(&kind, id).map_err(|e| sqlx::Error::ColumnDecode {
            index: kind_col.to_string(),
            source: e.into(),
        })
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

// ===== Users and groups =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_profile_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create user request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupProfile {
    pub group_profile_id: i64,
    pub group_name: String,
    pub group_description: Option<String>,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Create group request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub group_name: String,
    pub group_description: Option<String>,
}

/// A user's membership in a group
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub group_membership_id: i64,
    pub user_profile_id: i64,
    pub group_profile_id: i64,
    pub is_active: bool,
    pub group_display_sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// A group as it appears in one member's ordered list
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemberGroup {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub group: GroupProfile,
    pub group_display_sequence: i64,
}

// ===== Prayers =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Prayer {
    pub prayer_id: i64,
    pub prayer_title: String,
    pub prayer_description: Option<String>,
    pub prayer_type: String,
    pub is_private: bool,
    pub is_answered: bool,
    pub answered_at: Option<DateTime<Utc>>,
    pub prayer_priority: i64,
    pub prayer_subject_id: Option<i64>,
    pub subject_display_sequence: Option<i64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_by: i64,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Create prayer request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrayerRequest {
    pub prayer_title: String,
    pub prayer_description: Option<String>,
    pub prayer_type: Option<String>,
    pub is_private: Option<bool>,
    pub prayer_priority: Option<i64>,
    pub prayer_subject_id: Option<i64>,
}

/// Merge-patch for a prayer. `None` leaves the stored value untouched;
/// nullable columns use `Some(None)` to clear.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerUpdate {
    pub prayer_title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub prayer_description: Option<Option<String>>,
    pub prayer_type: Option<String>,
    pub is_private: Option<bool>,
    pub is_answered: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub answered_at: Option<Option<DateTime<Utc>>>,
    pub prayer_priority: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub prayer_subject_id: Option<Option<i64>>,
}

/// A grant: the polymorphic access-control row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerAccess {
    pub prayer_access_id: i64,
    pub prayer_id: i64,
    #[serde(flatten)]
    pub grantee: Grantee,
    pub display_sequence: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for PrayerAccess {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            prayer_access_id: row.try_get("prayer_access_id")?,
            prayer_id: row.try_get("prayer_id")?,
            grantee: Grantee::decode(row, "access_type", "access_type_id")?,
            display_sequence: row.try_get("display_sequence")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A grant expanded to a single user who can see the prayer through it
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveGrant {
    pub effective_user_id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub access: PrayerAccess,
}

/// A prayer as it appears in one grantee's ordered list
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GrantedPrayer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub prayer: Prayer,
    pub prayer_access_id: i64,
    pub display_sequence: i64,
}

/// A readable prayer together with the grant that made it visible
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerView {
    #[serde(flatten)]
    pub prayer: Prayer,
    /// `None` when an admin reads a prayer they hold no grant on
    pub access: Option<PrayerAccess>,
}

// ===== Categories =====

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerCategory {
    pub prayer_category_id: i64,
    pub owner: Grantee,
    pub category_name: String,
    pub category_color: Option<String>,
    pub display_sequence: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for PrayerCategory {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            prayer_category_id: row.try_get("prayer_category_id")?,
            owner: Grantee::decode(row, "category_type", "category_type_id")?,
            category_name: row.try_get("category_name")?,
            category_color: row.try_get("category_color")?,
            display_sequence: row.try_get("display_sequence")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PrayerCategoryItem {
    pub prayer_category_item_id: i64,
    pub prayer_category_id: i64,
    pub prayer_access_id: i64,
    pub display_sequence: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Create category request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub category_name: String,
    pub category_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithItems {
    #[serde(flatten)]
    pub category: PrayerCategory,
    pub items: Vec<PrayerCategoryItem>,
}

// ===== Prayer subjects =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubjectType {
    Individual,
    Family,
    Group,
}

impl SubjectType {
    /// Family and group subjects may contain individual members
    pub fn is_collective(self) -> bool {
        !matches!(self, SubjectType::Individual)
    }
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(SubjectType::Individual),
            "family" => Ok(SubjectType::Family),
            "group" => Ok(SubjectType::Group),
            other => Err(format!(
                "Invalid prayer subject type '{}': expected individual, family or group",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LinkStatus {
    Unlinked,
    Pending,
    Linked,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PrayerSubject {
    pub prayer_subject_id: i64,
    pub prayer_subject_type: SubjectType,
    pub prayer_subject_display_name: String,
    pub notes: Option<String>,
    pub user_profile_id: Option<i64>,
    pub link_status: LinkStatus,
    pub display_sequence: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrayerSubject {
    /// The owner's own subject: linked to the account that created it
    pub fn is_self_subject(&self) -> bool {
        self.user_profile_id == Some(self.created_by)
    }
}

/// Create subject request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectRequest {
    pub prayer_subject_display_name: String,
    pub prayer_subject_type: String,
    pub notes: Option<String>,
    pub user_profile_id: Option<i64>,
}

/// Partial update for a subject
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectUpdate {
    pub prayer_subject_display_name: Option<String>,
    pub prayer_subject_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub user_profile_id: Option<Option<i64>>,
}

/// Edge linking an individual subject into a family/group subject
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PrayerSubjectMembership {
    pub prayer_subject_membership_id: i64,
    pub member_prayer_subject_id: i64,
    pub group_prayer_subject_id: i64,
    pub membership_role: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Attach member request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub member_prayer_subject_id: i64,
    pub membership_role: Option<String>,
}

/// A subject with its ordered prayers and, for families/groups, its members
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectWithPrayers {
    #[serde(flatten)]
    pub subject: PrayerSubject,
    pub prayers: Vec<Prayer>,
    pub members: Vec<PrayerSubject>,
}

// ===== Connection requests =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "declined" => Ok(ConnectionStatus::Declined),
            other => Err(format!("Invalid connection request status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub connection_request_id: i64,
    pub requester_user_profile_id: i64,
    pub target_user_profile_id: i64,
    pub prayer_subject_id: i64,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Send connection request payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConnectionRequest {
    pub target_user_profile_id: i64,
    pub prayer_subject_id: i64,
    pub message: Option<String>,
}

/// Respond to connection request payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondConnectionRequest {
    pub status: String,
}

// ===== Ordering =====

/// One entry of a bulk reorder submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceUpdate {
    pub id: i64,
    pub display_sequence: i64,
}

/// Bulk reorder payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub items: Vec<SequenceUpdate>,
}
