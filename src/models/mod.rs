use crate::error::FetchError;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// One flat output row. Field order is the order fields were inserted.
pub type Record = Map<String, Value>;

/// What a unit asks the remote site for
#[derive(Debug, Clone, PartialEq)]
pub enum UnitParams {
    /// A page of the paginated listing API (1-based)
    Page { page: u32 },
    /// A keyword search inside a named region
    Area { keyword: String, region: String },
    /// A listing whose booking calendar is polled; `row` is the input row it came from
    Listing { rid: String, row: Record },
}

/// One schedulable fetch task.
///
/// `index` is the unit's position in the full input sequence, so a resumed
/// run keeps reporting the same positions as the run it continues.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub index: usize,
    pub id: String,
    /// Coarse class used to look up the request delay band
    pub category: Option<String>,
    pub params: UnitParams,
}

impl WorkUnit {
    pub fn page(page: u32) -> Self {
        Self {
            index: page.saturating_sub(1) as usize,
            id: format!("page {}", page),
            category: None,
            params: UnitParams::Page { page },
        }
    }

    pub fn area(index: usize, region: &str, keyword: &str, category: Option<String>) -> Self {
        Self {
            index,
            id: format!("{} {}", region, keyword),
            category,
            params: UnitParams::Area {
                keyword: keyword.to_string(),
                region: region.to_string(),
            },
        }
    }

    pub fn listing(index: usize, rid: &str, row: Record) -> Self {
        Self {
            index,
            id: format!("rid {}", rid),
            category: None,
            params: UnitParams::Listing {
                rid: rid.to_string(),
                row,
            },
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.id)
    }
}

/// A unit that ran out of attempts
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReason {
    pub attempts: u32,
    pub last_error: FetchError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exhausted {} attempts, last error: {}", self.attempts, self.last_error)
    }
}

/// Terminal result of fetching one unit
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<Record>),
    /// Well-formed but empty result: the paginated source has no more data
    EmptySuccess,
    Failure(FailureReason),
}

/// Union of field names across records, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    fields: Vec<String>,
    seen: HashSet<String>,
}

impl Schema {
    /// Adds the record's unseen fields and returns them.
    pub fn observe(&mut self, record: &Record) -> Vec<String> {
        let mut added = Vec::new();
        for key in record.keys() {
            if self.seen.insert(key.clone()) {
                self.fields.push(key.clone());
                added.push(key.clone());
            }
        }
        added
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Flattens nested objects into `parent.child` keys. Arrays stay as values.
pub fn flatten(object: &Map<String, Value>) -> Record {
    let mut out = Record::new();
    flatten_into(&mut out, None, object);
    out
}

fn flatten_into(out: &mut Record, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let name = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&name), inner),
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}
