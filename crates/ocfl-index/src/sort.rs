use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ocfl_types::ObjectSummary;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{IndexError, IndexResult};

/// Field to order object listings by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortField {
    #[default]
    Id,
    V1Created,
    HeadCreated,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Ordering for [`IndexStore::scan`](crate::IndexStore::scan).
///
/// Ties on the sort field are broken by object id, so every sort is total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectSort {
    pub field: SortField,
    pub order: SortOrder,
}

/// Position of one object under a sort. Ordered by `time` then `id`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct SortKey {
    time: Option<DateTime<Utc>>,
    id: String,
}

#[derive(Serialize, Deserialize)]
struct ScanCursor {
    sort: String,
    #[serde(flatten)]
    key: SortKey,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::V1Created => "v1_created",
            Self::HeadCreated => "head_created",
        }
    }
}

impl FromStr for SortField {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "v1_created" => Ok(Self::V1Created),
            "head_created" => Ok(Self::HeadCreated),
            _ => Err(IndexError::InvalidSort(format!("unknown sort field {s:?}"))),
        }
    }
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(IndexError::InvalidSort(format!("unknown sort order {s:?}"))),
        }
    }
}

impl ObjectSort {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    pub(crate) fn key(&self, summary: &ObjectSummary) -> SortKey {
        let time = match self.field {
            SortField::Id => None,
            SortField::V1Created => Some(summary.v1_created.with_timezone(&Utc)),
            SortField::HeadCreated => Some(summary.head_created.with_timezone(&Utc)),
        };
        SortKey {
            time,
            id: summary.id.clone(),
        }
    }

    pub(crate) fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        match self.order {
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
        }
    }

    pub(crate) fn encode(&self, key: &SortKey) -> IndexResult<String> {
        encode_cursor(&ScanCursor {
            sort: self.to_string(),
            key: key.clone(),
        })
    }

    /// Decode a cursor, rejecting one issued under a different sort.
    pub(crate) fn decode(&self, token: &str) -> IndexResult<SortKey> {
        let cursor: ScanCursor = decode_cursor(token)?;
        if cursor.sort != self.to_string() {
            return Err(IndexError::InvalidCursor(format!(
                "cursor was issued for sort {}, not {self}",
                cursor.sort
            )));
        }
        if (self.field == SortField::Id) != cursor.key.time.is_none() {
            return Err(IndexError::InvalidCursor("cursor key does not match sort field".into()));
        }
        Ok(cursor.key)
    }
}

impl fmt::Display for ObjectSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field.as_str(), self.order.as_str())
    }
}
