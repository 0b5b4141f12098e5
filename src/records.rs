//! Trade record store: one record per swap request
//!
//! Records are created `Submitted` when a request enters the pipeline and
//! move at most once to a terminal status (`Confirmed` or `Failed`). They
//! are never deleted. Two implementations share one capability trait:
//! an in-process map and a sled-backed durable store, selected at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::SwapError;

/// Lifecycle status of a trade record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Submitted,
    Confirmed,
    Failed,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// Fields supplied when a record is created
#[derive(Debug, Clone)]
pub struct NewTradeRecord {
    pub wallet: String,
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub wallet: String,
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub status: TradeStatus,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/update contract the pipeline depends on. The store may be
/// in-process or durable; the pipeline does not care which.
#[async_trait]
pub trait TradeRecordStore: Send + Sync {
    /// Create a record in `Submitted` state and return it with its id
    async fn create(&self, fields: NewTradeRecord) -> Result<TradeRecord, SwapError>;

    /// Move a record toward a new status. A record already in a terminal
    /// state is left untouched (logged, not an error): the first terminal
    /// transition wins.
    async fn update_status(
        &self,
        id: &str,
        status: TradeStatus,
        signature: Option<String>,
        error: Option<String>,
    ) -> Result<(), SwapError>;

    /// Fetch a record by id
    async fn get(&self, id: &str) -> Result<Option<TradeRecord>, SwapError>;
}

fn new_record(fields: NewTradeRecord) -> TradeRecord {
    let now = Utc::now();
    TradeRecord {
        id: Uuid::new_v4().to_string(),
        wallet: fields.wallet,
        input_mint: fields.input_mint,
        output_mint: fields.output_mint,
        amount: fields.amount,
        status: TradeStatus::Submitted,
        signature: None,
        error: None,
        created_at: now,
        updated_at: now,
    }
}

fn apply_update(
    record: &mut TradeRecord,
    status: TradeStatus,
    signature: Option<String>,
    error: Option<String>,
) -> bool {
    if record.status.is_terminal() {
        warn!(
            id = %record.id,
            current = ?record.status,
            requested = ?status,
            "ignoring status update on terminal record"
        );
        return false;
    }
    record.status = status;
    if signature.is_some() {
        record.signature = signature;
    }
    if error.is_some() {
        record.error = error;
    }
    record.updated_at = Utc::now();
    true
}

/// Ephemeral in-process store
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, TradeRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, unordered
    pub fn all(&self) -> Vec<TradeRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

#[async_trait]
impl TradeRecordStore for MemoryRecordStore {
    async fn create(&self, fields: NewTradeRecord) -> Result<TradeRecord, SwapError> {
        let record = new_record(fields);
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        id: &str,
        status: TradeStatus,
        signature: Option<String>,
        error: Option<String>,
    ) -> Result<(), SwapError> {
        match self.records.get_mut(id) {
            Some(mut entry) => {
                apply_update(entry.value_mut(), status, signature, error);
                Ok(())
            }
            None => Err(SwapError::Unknown(format!("no trade record {id}"))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<TradeRecord>, SwapError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }
}

/// Durable store backed by a sled tree, records serialized as JSON
pub struct SledRecordStore {
    tree: sled::Db,
}

impl SledRecordStore {
    pub fn open(path: &str) -> Result<Self, SwapError> {
        let tree = sled::open(path)
            .map_err(|e| SwapError::Unknown(format!("opening record store: {e}")))?;
        Ok(Self { tree })
    }

    fn read(&self, id: &str) -> Result<Option<TradeRecord>, SwapError> {
        match self
            .tree
            .get(id.as_bytes())
            .map_err(|e| SwapError::Unknown(format!("record store read: {e}")))?
        {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SwapError::Unknown(format!("corrupt trade record {id}: {e}"))),
            None => Ok(None),
        }
    }

    fn write(&self, record: &TradeRecord) -> Result<(), SwapError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| SwapError::Unknown(format!("record serialization: {e}")))?;
        self.tree
            .insert(record.id.as_bytes(), bytes)
            .map_err(|e| SwapError::Unknown(format!("record store write: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TradeRecordStore for SledRecordStore {
    async fn create(&self, fields: NewTradeRecord) -> Result<TradeRecord, SwapError> {
        let record = new_record(fields);
        self.write(&record)?;
        Ok(record)
    }

    async fn update_status(
        &self,
        id: &str,
        status: TradeStatus,
        signature: Option<String>,
        error: Option<String>,
    ) -> Result<(), SwapError> {
        let mut record = self
            .read(id)?
            .ok_or_else(|| SwapError::Unknown(format!("no trade record {id}")))?;
        if apply_update(&mut record, status, signature, error) {
            self.write(&record)?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<TradeRecord>, SwapError> {
        self.read(id)
    }
}
