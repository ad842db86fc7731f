//! JSON request and response messages for both API versions.
//!
//! Field names are camelCase. Every `size` is paired with `hasSize`, so a
//! zero size and an unknown size are distinguishable.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use ocfl_index::{ObjectSort, SortField, SortOrder};
use ocfl_jobs::{IdOutcome, IdResult, JobRecord, LogEntry};
use ocfl_query::{StatePage, StateRequest, Status, Summary};
use ocfl_types::{ContentItem, IndexedObject, ObjectSummary, Version};

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Empty {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListObjectsRequest {
    pub page_token: String,
    pub page_size: i64,
    pub order_by: Option<SortSpec>,
}

/// Sort names accept the enum form (`FIELD_V1_CREATED`, `ORDER_DESC`) or
/// the bare name (`v1_created`, `desc`); empty or `*_UNSPECIFIED` is the
/// default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortSpec {
    pub field: String,
    pub order: String,
}

impl SortSpec {
    pub fn to_sort(&self) -> ServerResult<ObjectSort> {
        let field = match enum_name(&self.field, "FIELD_") {
            None => SortField::default(),
            Some(name) => name.parse()?,
        };
        let order = match enum_name(&self.order, "ORDER_") {
            None => SortOrder::default(),
            Some(name) => name.parse()?,
        };
        Ok(ObjectSort::new(field, order))
    }
}

fn enum_name<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let raw = raw.trim();
    let name = match raw.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &raw[prefix.len()..],
        _ => raw,
    };
    (!name.is_empty() && !name.eq_ignore_ascii_case("UNSPECIFIED")).then_some(name)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsResponse {
    pub objects: Vec<ObjectListItem>,
    pub next_page_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListItem {
    pub object_id: String,
    pub head: String,
    pub v1_created: DateTime<FixedOffset>,
    pub head_created: DateTime<FixedOffset>,
}

impl From<ObjectSummary> for ObjectListItem {
    fn from(s: ObjectSummary) -> Self {
        Self {
            object_id: s.id,
            head: s.head.to_string(),
            v1_created: s.v1_created,
            head_created: s.head_created,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetObjectRequest {
    pub object_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectResponse {
    pub object_id: String,
    pub spec: String,
    pub root_path: String,
    pub digest_algorithm: String,
    pub versions: Vec<VersionItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionItem {
    pub num: String,
    pub message: String,
    pub created: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserItem>,
    pub size: u64,
    pub has_size: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl From<&Version> for VersionItem {
    fn from(v: &Version) -> Self {
        let size = v.size();
        Self {
            num: v.vnum.to_string(),
            message: v.message.clone(),
            created: v.created,
            user: v.user.as_ref().map(|u| UserItem {
                name: u.name.clone(),
                address: u.address.clone(),
            }),
            size: size.unwrap_or(0),
            has_size: size.is_some(),
        }
    }
}

impl From<&IndexedObject> for GetObjectResponse {
    fn from(o: &IndexedObject) -> Self {
        Self {
            object_id: o.id().to_string(),
            spec: o.spec().to_string(),
            root_path: o.root_path().to_string(),
            digest_algorithm: o.digest_algorithm().to_string(),
            versions: o.versions().iter().map(VersionItem::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetObjectStateRequest {
    pub object_id: String,
    pub version: String,
    pub base_path: String,
    pub recursive: bool,
    pub page_token: String,
    pub page_size: i64,
}

impl From<GetObjectStateRequest> for StateRequest {
    fn from(r: GetObjectStateRequest) -> Self {
        Self {
            object_id: r.object_id,
            version: r.version,
            base_path: r.base_path,
            recursive: r.recursive,
            cursor: r.page_token,
            page_size: r.page_size,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectStateResponse {
    pub digest: String,
    pub isdir: bool,
    pub size: u64,
    pub has_size: bool,
    pub children: Vec<StateItem>,
    pub next_page_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateItem {
    pub name: String,
    pub isdir: bool,
    pub size: u64,
    pub has_size: bool,
    pub digest: String,
}

impl From<ContentItem> for StateItem {
    fn from(item: ContentItem) -> Self {
        Self {
            has_size: item.has_size(),
            size: item.size.unwrap_or(0),
            digest: item.digest.map(|d| d.to_string()).unwrap_or_default(),
            isdir: item.is_dir,
            name: item.name,
        }
    }
}

impl From<StatePage> for GetObjectStateResponse {
    fn from(page: StatePage) -> Self {
        let node = StateItem::from(page.node);
        Self {
            digest: node.digest,
            isdir: node.isdir,
            size: node.size,
            has_size: node.has_size,
            children: page.items.into_iter().map(StateItem::from).collect(),
            next_page_token: page.next_cursor.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetContentRequest {
    pub digest: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSummaryResponse {
    pub root_path: String,
    pub spec: String,
    pub description: String,
    pub num_objects: u64,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl From<Summary> for GetSummaryResponse {
    fn from(s: Summary) -> Self {
        Self {
            root_path: s.root_path,
            spec: s.spec.map(|s| s.to_string()).unwrap_or_default(),
            description: s.description,
            num_objects: s.object_count as u64,
            indexed_at: s.indexed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStatusResponse {
    pub store: GetSummaryResponse,
    /// `"running"` while any job is active, otherwise `"idle"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_all_job: Option<JobItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_ids_job: Option<JobItem>,
}

impl From<Status> for GetStatusResponse {
    fn from(s: Status) -> Self {
        let running = [&s.jobs.all, &s.jobs.ids]
            .into_iter()
            .flatten()
            .any(|job| job.state.is_active());
        Self {
            store: s.summary.into(),
            status: if running { "running" } else { "idle" }.to_string(),
            index_all_job: s.jobs.all.map(JobItem::from),
            index_ids_job: s.jobs.ids.map(JobItem::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    pub job_id: String,
    pub kind: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub found: u64,
    pub indexed: u64,
    pub unchanged: u64,
    pub removed: u64,
    pub failed: u64,
    pub errors: Vec<JobErrorItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorItem {
    pub object: String,
    pub message: String,
}

impl From<JobRecord> for JobItem {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id.to_string(),
            kind: job.kind.to_string(),
            state: job.state.to_string(),
            created_at: job.created_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            found: job.counters.found,
            indexed: job.counters.indexed,
            unchanged: job.counters.unchanged,
            removed: job.counters.removed,
            failed: job.counters.failed,
            errors: job
                .errors
                .into_iter()
                .map(|e| JobErrorItem {
                    object: e.target,
                    message: e.message,
                })
                .collect(),
            failure: job.failure,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAllResponse {
    pub started: bool,
    pub job: JobItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexIdsRequest {
    pub object_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexIdsResponse {
    pub results: Vec<IdResultItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdResultItem {
    pub object_id: String,
    /// One of `indexed`, `unchanged`, `removed`, `not_found`, `failed`.
    pub outcome: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl From<IdResult> for IdResultItem {
    fn from(r: IdResult) -> Self {
        let (outcome, message) = match r.outcome {
            IdOutcome::Indexed => ("indexed", String::new()),
            IdOutcome::Unchanged => ("unchanged", String::new()),
            IdOutcome::Removed => ("removed", String::new()),
            IdOutcome::NotFound => ("not_found", String::new()),
            IdOutcome::Failed(m) => ("failed", m),
        };
        Self {
            object_id: r.id,
            outcome: outcome.to_string(),
            message,
        }
    }
}

/// One line of the `FollowLogs` stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryItem {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub message: String,
    pub job_id: String,
}

impl From<LogEntry> for LogEntryItem {
    fn from(e: LogEntry) -> Self {
        Self {
            seq: e.seq,
            timestamp: e.timestamp,
            severity: e.severity.to_string(),
            message: e.message,
            job_id: e.job_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}

/// Decode a request body. An empty body is the default message.
pub fn decode<T: serde::de::DeserializeOwned + Default>(body: &[u8]) -> ServerResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidArgument(format!("invalid request body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_names() {
        let spec = SortSpec {
            field: "FIELD_HEAD_CREATED".into(),
            order: "ORDER_DESC".into(),
        };
        assert_eq!(
            spec.to_sort().unwrap(),
            ObjectSort::new(SortField::HeadCreated, SortOrder::Desc)
        );
        let bare = SortSpec {
            field: "v1_created".into(),
            order: "".into(),
        };
        assert_eq!(
            bare.to_sort().unwrap(),
            ObjectSort::new(SortField::V1Created, SortOrder::Asc)
        );
        let unspecified = SortSpec {
            field: "FIELD_UNSPECIFIED".into(),
            order: "ORDER_UNSPECIFIED".into(),
        };
        assert_eq!(unspecified.to_sort().unwrap(), ObjectSort::default());
        let bad = SortSpec {
            field: "FIELD_SIZE".into(),
            order: String::new(),
        };
        assert!(matches!(bad.to_sort(), Err(ServerError::InvalidArgument(_))));
    }

    #[test]
    fn empty_body_is_default() {
        let rq: ListObjectsRequest = decode(b"").unwrap();
        assert_eq!(rq.page_size, 0);
        let rq: GetObjectStateRequest =
            decode(br#"{"objectId":"a","basePath":"dir","recursive":true}"#).unwrap();
        assert_eq!(rq.object_id, "a");
        assert!(rq.recursive);
        assert!(decode::<GetObjectRequest>(b"{not json").is_err());
    }

    #[test]
    fn size_presence_is_explicit() {
        let unknown = StateItem::from(ContentItem {
            name: "f".into(),
            is_dir: false,
            digest: None,
            size: None,
        });
        let zero = StateItem::from(ContentItem {
            name: "g".into(),
            is_dir: false,
            digest: None,
            size: Some(0),
        });
        assert_eq!((unknown.size, unknown.has_size), (0, false));
        assert_eq!((zero.size, zero.has_size), (0, true));
        let json = serde_json::to_value(&zero).unwrap();
        assert_eq!(json["hasSize"], true);
    }

    #[test]
    fn user_address_is_optional() {
        use chrono::TimeZone;
        use ocfl_types::{ContentNode, User, VNum};

        let version = |address: Option<&str>| Version {
            vnum: VNum::v1(),
            created: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .unwrap(),
            message: "init".into(),
            user: Some(User {
                name: "Archivist".into(),
                address: address.map(String::from),
            }),
            state: ContentNode::empty_dir(),
        };

        let json = serde_json::to_value(VersionItem::from(&version(None))).unwrap();
        assert_eq!(json["user"]["name"], "Archivist");
        assert!(json["user"].get("address").is_none());

        let json = serde_json::to_value(VersionItem::from(&version(Some("mailto:a@example.org")))).unwrap();
        assert_eq!(json["user"]["address"], "mailto:a@example.org");

        let json = serde_json::to_value(VersionItem::from(&version(Some("")))).unwrap();
        assert_eq!(json["user"]["address"], "");
    }
}
