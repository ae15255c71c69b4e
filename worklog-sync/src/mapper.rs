//! Wire-shape → canonical record mapping.
//!
//! Remote payloads are deserialized into lenient `Raw*` structs where every
//! field is optional; absent, `null` or wrongly typed fields fall back to
//! defaults. Only an item that is not an object, or that has no numeric `id`,
//! is treated as malformed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use worklog_core::EntityKind;

use crate::error::{mapping_err, SyncError};

// ---------------------------------------------------------------------------
// Entity abstraction
// ---------------------------------------------------------------------------

/// A canonical record mirrored from one remote collection.
pub trait SyncEntity: Serialize + Sized {
    const KIND: EntityKind;

    /// Remote wire representation.
    type Raw: DeserializeOwned;

    fn raw_id(raw: &Self::Raw) -> Option<u64>;

    fn from_raw(raw: Self::Raw, external_id: u64, synced_at: DateTime<Utc>) -> Self;
}

/// Map a list of raw items of kind `E`.
pub fn map_items<E: SyncEntity>(
    items: Vec<Value>,
    synced_at: DateTime<Utc>,
) -> Result<Vec<E>, SyncError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(mapping_err(
                    E::KIND,
                    format!("item {index} is not a JSON object"),
                ));
            }
            let raw: E::Raw = serde_json::from_value(item)
                .map_err(|err| mapping_err(E::KIND, format!("item {index}: {err}")))?;
            let external_id = E::raw_id(&raw)
                .ok_or_else(|| mapping_err(E::KIND, format!("item {index} has no id")))?;
            Ok(E::from_raw(raw, external_id, synced_at))
        })
        .collect()
}

/// Map raw items of `kind` into canonical records.
pub fn map(
    kind: EntityKind,
    items: Vec<Value>,
    synced_at: DateTime<Utc>,
) -> Result<Vec<EntityRecord>, SyncError> {
    fn erase<E: SyncEntity + Into<EntityRecord>>(
        items: Vec<Value>,
        synced_at: DateTime<Utc>,
    ) -> Result<Vec<EntityRecord>, SyncError> {
        Ok(map_items::<E>(items, synced_at)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    match kind {
        EntityKind::Users => erase::<UserRecord>(items, synced_at),
        EntityKind::Projects => erase::<ProjectRecord>(items, synced_at),
        EntityKind::Activities => erase::<ActivityRecord>(items, synced_at),
        EntityKind::TimeEntries => erase::<TimeEntryRecord>(items, synced_at),
    }
}

/// Pull the item list for `kind` out of a response body.
///
/// Activities are accepted either as a bare array or wrapped in a
/// `time_entry_activities` envelope.
pub fn items(kind: EntityKind, body: Value) -> Result<Vec<Value>, SyncError> {
    let envelope = match kind {
        EntityKind::Users => "users",
        EntityKind::Projects => "projects",
        EntityKind::Activities => "time_entry_activities",
        EntityKind::TimeEntries => "time_entries",
    };
    match body {
        Value::Array(items) if kind == EntityKind::Activities => Ok(items),
        Value::Object(mut map) => match map.remove(envelope) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(mapping_err(kind, format!("`{envelope}` is not an array"))),
            None => Err(mapping_err(
                kind,
                format!("response has no `{envelope}` array"),
            )),
        },
        _ => Err(mapping_err(kind, "unexpected response shape")),
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

/// Any canonical record, as handed to the local store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityRecord {
    User(UserRecord),
    Project(ProjectRecord),
    Activity(ActivityRecord),
    TimeEntry(TimeEntryRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::User(_) => EntityKind::Users,
            EntityRecord::Project(_) => EntityKind::Projects,
            EntityRecord::Activity(_) => EntityKind::Activities,
            EntityRecord::TimeEntry(_) => EntityKind::TimeEntries,
        }
    }

    pub fn local_id(&self) -> &str {
        match self {
            EntityRecord::User(r) => &r.id,
            EntityRecord::Project(r) => &r.id,
            EntityRecord::Activity(r) => &r.id,
            EntityRecord::TimeEntry(r) => &r.id,
        }
    }

    pub fn external_id(&self) -> u64 {
        match self {
            EntityRecord::User(r) => r.external_id,
            EntityRecord::Project(r) => r.external_id,
            EntityRecord::Activity(r) => r.external_id,
            EntityRecord::TimeEntry(r) => r.external_id,
        }
    }

    /// Flat JSON document stored under [`EntityRecord::local_id`].
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub external_id: u64,
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub admin: bool,
    pub status: i64,
    pub created_on: Option<String>,
    pub last_login_on: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub external_id: u64,
    pub name: String,
    pub identifier: String,
    pub description: String,
    pub status: i64,
    pub is_public: bool,
    pub parent_id: Option<u64>,
    pub created_on: Option<String>,
    pub updated_on: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub external_id: u64,
    pub name: String,
    pub is_default: bool,
    pub active: bool,
    pub synced_at: DateTime<Utc>,
}

/// A booked time entry. User, project and activity ids are plain
/// references; nothing checks that the referenced records exist locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryRecord {
    pub id: String,
    pub external_id: u64,
    pub user_id: Option<u64>,
    pub user_name: String,
    pub project_id: Option<u64>,
    pub project_name: String,
    pub activity_id: Option<u64>,
    pub activity_name: String,
    pub issue_id: Option<u64>,
    pub hours: f64,
    pub comments: String,
    pub spent_on: Option<String>,
    pub created_on: Option<String>,
    pub updated_on: Option<String>,
    pub synced_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Read one optional field, treating a value of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<Option<T>>(value).ok().flatten())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRef {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawUser {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub login: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub firstname: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub lastname: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub mail: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub admin: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub created_on: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub last_login_on: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawProject {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub identifier: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub is_public: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub parent: Option<RawRef>,
    #[serde(deserialize_with = "lenient")]
    pub created_on: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub updated_on: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawActivity {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub is_default: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTimeEntry {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub user: Option<RawRef>,
    #[serde(deserialize_with = "lenient")]
    pub project: Option<RawRef>,
    #[serde(deserialize_with = "lenient")]
    pub activity: Option<RawRef>,
    #[serde(deserialize_with = "lenient")]
    pub issue: Option<RawRef>,
    #[serde(deserialize_with = "lenient")]
    pub hours: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub comments: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub spent_on: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub created_on: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub updated_on: Option<String>,
}

/// Remote status code for an active user or project.
const STATUS_ACTIVE: i64 = 1;

fn split_ref(reference: Option<RawRef>) -> (Option<u64>, String) {
    match reference {
        Some(RawRef { id, name }) => (id, name.unwrap_or_default()),
        None => (None, String::new()),
    }
}

impl SyncEntity for UserRecord {
    const KIND: EntityKind = EntityKind::Users;
    type Raw = RawUser;

    fn raw_id(raw: &RawUser) -> Option<u64> {
        raw.id
    }

    fn from_raw(raw: RawUser, external_id: u64, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::KIND.local_id(external_id),
            external_id,
            login: raw.login.unwrap_or_default(),
            first_name: raw.firstname.unwrap_or_default(),
            last_name: raw.lastname.unwrap_or_default(),
            email: raw.mail.unwrap_or_default(),
            admin: raw.admin.unwrap_or(false),
            status: raw.status.unwrap_or(STATUS_ACTIVE),
            created_on: raw.created_on,
            last_login_on: raw.last_login_on,
            synced_at,
        }
    }
}

impl SyncEntity for ProjectRecord {
    const KIND: EntityKind = EntityKind::Projects;
    type Raw = RawProject;

    fn raw_id(raw: &RawProject) -> Option<u64> {
        raw.id
    }

    fn from_raw(raw: RawProject, external_id: u64, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::KIND.local_id(external_id),
            external_id,
            name: raw.name.unwrap_or_default(),
            identifier: raw.identifier.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            status: raw.status.unwrap_or(STATUS_ACTIVE),
            is_public: raw.is_public.unwrap_or(false),
            parent_id: raw.parent.and_then(|parent| parent.id),
            created_on: raw.created_on,
            updated_on: raw.updated_on,
            synced_at,
        }
    }
}

impl SyncEntity for ActivityRecord {
    const KIND: EntityKind = EntityKind::Activities;
    type Raw = RawActivity;

    fn raw_id(raw: &RawActivity) -> Option<u64> {
        raw.id
    }

    fn from_raw(raw: RawActivity, external_id: u64, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: Self::KIND.local_id(external_id),
            external_id,
            name: raw.name.unwrap_or_default(),
            is_default: raw.is_default.unwrap_or(false),
            active: raw.active.unwrap_or(true),
            synced_at,
        }
    }
}

impl SyncEntity for TimeEntryRecord {
    const KIND: EntityKind = EntityKind::TimeEntries;
    type Raw = RawTimeEntry;

    fn raw_id(raw: &RawTimeEntry) -> Option<u64> {
        raw.id
    }

    fn from_raw(raw: RawTimeEntry, external_id: u64, synced_at: DateTime<Utc>) -> Self {
        let (user_id, user_name) = split_ref(raw.user);
        let (project_id, project_name) = split_ref(raw.project);
        let (activity_id, activity_name) = split_ref(raw.activity);
        Self {
            id: Self::KIND.local_id(external_id),
            external_id,
            user_id,
            user_name,
            project_id,
            project_name,
            activity_id,
            activity_name,
            issue_id: raw.issue.and_then(|issue| issue.id),
            hours: raw.hours.unwrap_or(0.0),
            comments: raw.comments.unwrap_or_default(),
            spent_on: raw.spent_on,
            created_on: raw.created_on,
            updated_on: raw.updated_on,
            synced_at,
        }
    }
}

impl From<UserRecord> for EntityRecord {
    fn from(record: UserRecord) -> Self {
        EntityRecord::User(record)
    }
}

impl From<ProjectRecord> for EntityRecord {
    fn from(record: ProjectRecord) -> Self {
        EntityRecord::Project(record)
    }
}

impl From<ActivityRecord> for EntityRecord {
    fn from(record: ActivityRecord) -> Self {
        EntityRecord::Activity(record)
    }
}

impl From<TimeEntryRecord> for EntityRecord {
    fn from(record: TimeEntryRecord) -> Self {
        EntityRecord::TimeEntry(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
