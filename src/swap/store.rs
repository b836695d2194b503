use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension as _, params};

use super::{SwapContract, SwapCost, SwapHash, SwapState, SwapStateData, SwapType};

/// One state transition as recorded for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapUpdate {
    pub update_time: SystemTime,
    pub state_data: SwapStateData,
}

/// A swap as loaded from the store: the immutable contract plus the ordered
/// list of recorded transitions.
#[derive(Debug, Clone)]
pub struct StoredSwap {
    pub hash: SwapHash,
    pub swap_type: SwapType,
    pub contract: SwapContract,
    pub htlc_address: String,
    pub updates: Vec<SwapUpdate>,
}

impl StoredSwap {
    pub fn state(&self) -> SwapState {
        self.updates
            .last()
            .map_or(SwapState::Initiated, |u| u.state_data.state)
    }

    pub fn cost(&self) -> SwapCost {
        self.updates
            .last()
            .map_or_else(SwapCost::default, |u| u.state_data.cost)
    }
}

/// Durable swap storage. Drivers write through it; the kernel only defines
/// the data shape.
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Record a new swap. Fails if the hash is already present; the primary
    /// key is the guard against two drivers running one swap.
    async fn create_swap(
        &self,
        hash: SwapHash,
        swap_type: SwapType,
        contract: &SwapContract,
        htlc_address: &str,
    ) -> Result<()>;

    /// Append a state transition to an existing swap.
    async fn update_swap(&self, hash: SwapHash, update: SwapUpdate) -> Result<()>;

    async fn fetch_swap(&self, hash: SwapHash) -> Result<Option<StoredSwap>>;

    async fn fetch_swaps(&self) -> Result<Vec<StoredSwap>>;
}

#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_swap(
        &self,
        hash: SwapHash,
        swap_type: SwapType,
        contract: &SwapContract,
        htlc_address: &str,
    ) -> Result<()> {
        let initiation_time = unix_secs(contract.initiation_time)?;

        self.conn
            .lock()
            .expect("store mutex poisoned")
            .execute(
                r#"
INSERT INTO swaps (
  swap_hash,
  swap_type,
  cltv_expiry,
  amount_sats,
  sender_key,
  receiver_key,
  initiation_height,
  initiation_time,
  htlc_address
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
)
"#,
                params![
                    hash.to_string(),
                    swap_type.as_str(),
                    contract.cltv_expiry,
                    contract.amount_sats,
                    hex::encode(contract.sender_key),
                    hex::encode(contract.receiver_key),
                    contract.initiation_height,
                    initiation_time,
                    htlc_address,
                ],
            )
            .with_context(|| format!("insert swap {hash}"))?;
        Ok(())
    }

    pub fn insert_update(&self, hash: SwapHash, update: &SwapUpdate) -> Result<()> {
        let update_time = unix_secs(update.update_time)?;

        self.conn
            .lock()
            .expect("store mutex poisoned")
            .execute(
                r#"
INSERT INTO swap_updates (
  swap_hash,
  update_time,
  state,
  server_cost_sats,
  onchain_cost_sats,
  offchain_cost_sats
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6
)
"#,
                params![
                    hash.to_string(),
                    update_time,
                    update.state_data.state.as_str(),
                    update.state_data.cost.server_sats,
                    update.state_data.cost.onchain_sats,
                    update.state_data.cost.offchain_sats,
                ],
            )
            .with_context(|| format!("insert swap update {hash}"))?;
        Ok(())
    }

    pub fn get_swap(&self, hash: SwapHash) -> Result<Option<StoredSwap>> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let swap = conn
            .query_row(
                r#"
SELECT
  swap_hash,
  swap_type,
  cltv_expiry,
  amount_sats,
  sender_key,
  receiver_key,
  initiation_height,
  initiation_time,
  htlc_address
FROM swaps
WHERE swap_hash = ?1
"#,
                params![hash.to_string()],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {hash}"))?;

        let Some(mut swap) = swap else {
            return Ok(None);
        };
        swap.updates = updates_for(&conn, swap.hash)?;
        Ok(Some(swap))
    }

    pub fn list_swaps(&self) -> Result<Vec<StoredSwap>> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let mut stmt = conn
            .prepare(
                r#"
SELECT
  swap_hash,
  swap_type,
  cltv_expiry,
  amount_sats,
  sender_key,
  receiver_key,
  initiation_height,
  initiation_time,
  htlc_address
FROM swaps
ORDER BY swap_hash
"#,
            )
            .context("prepare list swaps")?;

        let rows = stmt
            .query_map([], swap_from_row)
            .context("query list swaps")?;

        let mut out = Vec::new();
        for row in rows {
            let mut swap = row.context("read swap row")?;
            swap.updates = updates_for(&conn, swap.hash)?;
            out.push(swap);
        }
        Ok(out)
    }
}

#[async_trait]
impl SwapStore for SqliteSwapStore {
    async fn create_swap(
        &self,
        hash: SwapHash,
        swap_type: SwapType,
        contract: &SwapContract,
        htlc_address: &str,
    ) -> Result<()> {
        self.insert_swap(hash, swap_type, contract, htlc_address)
    }

    async fn update_swap(&self, hash: SwapHash, update: SwapUpdate) -> Result<()> {
        self.insert_update(hash, &update)
    }

    async fn fetch_swap(&self, hash: SwapHash) -> Result<Option<StoredSwap>> {
        self.get_swap(hash)
    }

    async fn fetch_swaps(&self) -> Result<Vec<StoredSwap>> {
        self.list_swaps()
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  swap_hash TEXT PRIMARY KEY,
  swap_type TEXT NOT NULL,
  cltv_expiry INTEGER NOT NULL,
  amount_sats INTEGER NOT NULL,
  sender_key TEXT NOT NULL,
  receiver_key TEXT NOT NULL,
  initiation_height INTEGER NOT NULL,
  initiation_time INTEGER NOT NULL,
  htlc_address TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS swap_updates (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  swap_hash TEXT NOT NULL REFERENCES swaps(swap_hash),
  update_time INTEGER NOT NULL,
  state TEXT NOT NULL,
  server_cost_sats INTEGER NOT NULL,
  onchain_cost_sats INTEGER NOT NULL,
  offchain_cost_sats INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS swap_updates_hash_idx ON swap_updates(swap_hash);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn swap_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredSwap> {
    let hash_hex: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let cltv_expiry: i64 = row.get(2)?;
    let amount_sats: i64 = row.get(3)?;
    let sender_key_hex: String = row.get(4)?;
    let receiver_key_hex: String = row.get(5)?;
    let initiation_height: i64 = row.get(6)?;
    let initiation_time: i64 = row.get(7)?;
    let htlc_address: String = row.get(8)?;

    Ok(StoredSwap {
        hash: hash_from_hex(&hash_hex, 0)?,
        swap_type: swap_type_from_str(&type_str, 1)?,
        contract: SwapContract {
            cltv_expiry: u32_col(cltv_expiry, 2)?,
            amount_sats: u64_col(amount_sats, 3)?,
            sender_key: key_from_hex(&sender_key_hex, 4)?,
            receiver_key: key_from_hex(&receiver_key_hex, 5)?,
            initiation_height: u32_col(initiation_height, 6)?,
            initiation_time: time_from_secs(initiation_time, 7)?,
        },
        htlc_address,
        updates: Vec::new(),
    })
}

fn updates_for(conn: &Connection, hash: SwapHash) -> Result<Vec<SwapUpdate>> {
    let mut stmt = conn
        .prepare(
            r#"
SELECT
  update_time,
  state,
  server_cost_sats,
  onchain_cost_sats,
  offchain_cost_sats
FROM swap_updates
WHERE swap_hash = ?1
ORDER BY id
"#,
        )
        .context("prepare swap updates")?;

    let rows = stmt
        .query_map(params![hash.to_string()], |row| {
            let update_time: i64 = row.get(0)?;
            let state_str: String = row.get(1)?;
            let server_cost_sats: i64 = row.get(2)?;
            let onchain_cost_sats: i64 = row.get(3)?;
            let offchain_cost_sats: i64 = row.get(4)?;

            Ok(SwapUpdate {
                update_time: time_from_secs(update_time, 0)?,
                state_data: SwapStateData {
                    state: state_from_str(&state_str, 1)?,
                    cost: SwapCost {
                        server_sats: u64_col(server_cost_sats, 2)?,
                        onchain_sats: u64_col(onchain_cost_sats, 3)?,
                        offchain_sats: u64_col(offchain_cost_sats, 4)?,
                    },
                },
            })
        })
        .with_context(|| format!("query swap updates {hash}"))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read swap update row")?);
    }
    Ok(out)
}

fn unix_secs(time: SystemTime) -> Result<i64> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .context("time before unix epoch")?
        .as_secs();
    i64::try_from(secs).context("time out of range")
}

fn conversion_err(col: usize, ty: rusqlite::types::Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, ty, msg.into())
}

fn u32_col(value: i64, col: usize) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Integer,
            format!("invalid u32 column value {value}"),
        )
    })
}

fn u64_col(value: i64, col: usize) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Integer,
            format!("invalid u64 column value {value}"),
        )
    })
}

fn time_from_secs(value: i64, col: usize) -> rusqlite::Result<SystemTime> {
    let secs = u64_col(value, col)?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}

fn hash_from_hex(s: &str, col: usize) -> rusqlite::Result<SwapHash> {
    s.parse().map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Text,
            format!("invalid swap hash: {s}"),
        )
    })
}

fn key_from_hex(s: &str, col: usize) -> rusqlite::Result<[u8; 33]> {
    let bytes = hex::decode(s).map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Text,
            format!("invalid key hex: {s}"),
        )
    })?;
    bytes.try_into().map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Text,
            format!("key must be 33 bytes: {s}"),
        )
    })
}

fn swap_type_from_str(s: &str, col: usize) -> rusqlite::Result<SwapType> {
    match s {
        "loop_out" => Ok(SwapType::LoopOut),
        "loop_in" => Ok(SwapType::LoopIn),
        other => Err(conversion_err(
            col,
            rusqlite::types::Type::Text,
            format!("unknown swap type: {other}"),
        )),
    }
}

fn state_from_str(s: &str, col: usize) -> rusqlite::Result<SwapState> {
    s.parse().map_err(|_| {
        conversion_err(
            col,
            rusqlite::types::Type::Text,
            format!("unknown swap state: {s}"),
        )
    })
}
