//! SQLite persistence gateway (sqlx).
//!
//! Schema is created idempotently on connect. Money, ratios and
//! timestamps are stored as INTEGER; enums as their upper-case names.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use tracing::info;

use super::{AccountRow, BetRow, PersistenceGateway, RoundRow, TransactionEntry};
use crate::types::{Bet, Odds, OddsStatus, RoundResult, SideRatios, Transaction};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id        TEXT PRIMARY KEY,
        short_id  INTEGER NOT NULL,
        role      TEXT NOT NULL DEFAULT 'CUSTOMER',
        credit    INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS rounds (
        id          INTEGER PRIMARY KEY,
        status      TEXT NOT NULL,
        result      TEXT,
        created_at  INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS odds (
        round_id    INTEGER NOT NULL,
        odds_index  INTEGER NOT NULL,
        red_loss    INTEGER NOT NULL,
        red_win     INTEGER NOT NULL,
        blue_loss   INTEGER NOT NULL,
        blue_win    INTEGER NOT NULL,
        max_bet     INTEGER NOT NULL,
        min_bet     INTEGER NOT NULL,
        user_limit  INTEGER NOT NULL,
        vig         INTEGER NOT NULL,
        status      TEXT NOT NULL,
        PRIMARY KEY (round_id, odds_index)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS bets (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT NOT NULL,
        round_id    INTEGER NOT NULL,
        odds_index  INTEGER NOT NULL DEFAULT 0,
        side        TEXT NOT NULL,
        amount      INTEGER NOT NULL,
        win_amount  INTEGER NOT NULL,
        loss_amount INTEGER NOT NULL,
        status      TEXT NOT NULL DEFAULT 'PENDING',
        created_at  INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS transactions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT NOT NULL,
        amount      INTEGER NOT NULL,
        type        TEXT NOT NULL,
        ref_id      TEXT NOT NULL DEFAULT '',
        created_at  INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tx_user ON transactions (user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_bets_round ON bets (round_id, odds_index)",
];

// ---------------------------------------------------------------------------
// Raw rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRecord {
    id: String,
    short_id: i64,
    role: String,
    credit: i64,
}

impl TryFrom<UserRecord> for AccountRow {
    type Error = anyhow::Error;

    fn try_from(r: UserRecord) -> Result<Self> {
        Ok(Self {
            user_id: r.id,
            short_id: u32::try_from(r.short_id).context("short_id out of range")?,
            role: r.role.parse()?,
            credit: r.credit,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoundRecord {
    id: i64,
    status: String,
    result: Option<String>,
    created_at: i64,
}

impl TryFrom<RoundRecord> for RoundRow {
    type Error = anyhow::Error;

    fn try_from(r: RoundRecord) -> Result<Self> {
        Ok(Self {
            id: u64::try_from(r.id).context("round id out of range")?,
            status: r.status.parse()?,
            result: r.result.as_deref().map(RoundResult::from_str).transpose()?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OddsRecord {
    odds_index: i64,
    red_loss: i64,
    red_win: i64,
    blue_loss: i64,
    blue_win: i64,
    max_bet: i64,
    min_bet: i64,
    user_limit: i64,
    vig: i64,
    status: String,
}

impl TryFrom<OddsRecord> for (usize, Odds) {
    type Error = anyhow::Error;

    fn try_from(r: OddsRecord) -> Result<Self> {
        let odds = Odds {
            red: SideRatios {
                loss: r.red_loss,
                win: r.red_win,
            },
            blue: SideRatios {
                loss: r.blue_loss,
                win: r.blue_win,
            },
            max_bet: r.max_bet,
            min_bet: r.min_bet,
            user_limit: u32::try_from(r.user_limit).context("user_limit out of range")?,
            vig: r.vig,
            status: OddsStatus::from_str(&r.status)?,
        };
        Ok((usize::try_from(r.odds_index).context("odds_index out of range")?, odds))
    }
}

#[derive(sqlx::FromRow)]
struct BetRecord {
    user_id: String,
    odds_index: i64,
    side: String,
    amount: i64,
    win_amount: i64,
    loss_amount: i64,
    status: String,
    created_at: i64,
}

impl TryFrom<BetRecord> for BetRow {
    type Error = anyhow::Error;

    fn try_from(r: BetRecord) -> Result<Self> {
        Ok(Self {
            user_id: r.user_id,
            odds_index: usize::try_from(r.odds_index).context("odds_index out of range")?,
            side: r.side.parse()?,
            amount: r.amount,
            win_amount: r.win_amount,
            loss_amount: r.loss_amount,
            status: r.status.parse()?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRecord {
    id: i64,
    user_id: String,
    amount: i64,
    #[sqlx(rename = "type")]
    kind: String,
    ref_id: String,
    created_at: i64,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = anyhow::Error;

    fn try_from(r: TransactionRecord) -> Result<Self> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            amount: r.amount,
            kind: r.kind.parse()?,
            reference: r.ref_id,
            created_at: r.created_at,
        })
    }
}

fn convert_all<R, T>(records: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    records.into_iter().map(T::try_from).collect()
}

fn db_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| anyhow!("id {id} does not fit in INTEGER"))
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        info!(url, "Database ready");
        Ok(gateway)
    }

    /// A private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        Ok(gateway)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn save_account(&self, account: &AccountRow) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO users (id, short_id, role, credit) VALUES (?, ?, ?, ?)")
            .bind(&account.user_id)
            .bind(i64::from(account.short_id))
            .bind(account.role.as_str())
            .bind(account.credit)
            .execute(&self.pool)
            .await
            .context("save_account")?;
        Ok(())
    }

    async fn save_round(&self, round: &RoundRow) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO rounds (id, status, result, created_at) VALUES (?, ?, ?, ?)")
            .bind(db_id(round.id)?)
            .bind(round.status.as_str())
            .bind(round.result.map(|r| r.as_str()))
            .bind(round.created_at)
            .execute(&self.pool)
            .await
            .context("save_round")?;
        Ok(())
    }

    async fn save_odds(&self, round_id: u64, odds_index: usize, odds: &Odds) -> Result<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO odds
                (round_id, odds_index, red_loss, red_win, blue_loss, blue_win,
                 max_bet, min_bet, user_limit, vig, status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(db_id(round_id)?)
        .bind(odds_index as i64)
        .bind(odds.red.loss)
        .bind(odds.red.win)
        .bind(odds.blue.loss)
        .bind(odds.blue.win)
        .bind(odds.max_bet)
        .bind(odds.min_bet)
        .bind(i64::from(odds.user_limit))
        .bind(odds.vig)
        .bind(odds.status.as_str())
        .execute(&self.pool)
        .await
        .context("save_odds")?;
        Ok(())
    }

    async fn save_bet(&self, round_id: u64, bet: &Bet) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO bets
                (user_id, round_id, odds_index, side, amount, win_amount, loss_amount, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&bet.user_id)
        .bind(db_id(round_id)?)
        .bind(bet.odds_index as i64)
        .bind(bet.side.as_str())
        .bind(bet.amount)
        .bind(bet.win_amount)
        .bind(bet.loss_amount)
        .bind(bet.status.as_str())
        .bind(bet.timestamp)
        .execute(&self.pool)
        .await
        .context("save_bet")?;
        Ok(())
    }

    async fn void_bets(&self, round_id: u64, odds_index: usize) -> Result<()> {
        sqlx::query("UPDATE bets SET status = 'VOID' WHERE round_id = ? AND odds_index = ?")
            .bind(db_id(round_id)?)
            .bind(odds_index as i64)
            .execute(&self.pool)
            .await
            .context("void_bets")?;
        Ok(())
    }

    async fn settle_bets_bulk(&self, round_id: u64, result: RoundResult) -> Result<()> {
        // DRAW is checked before the side match so both settlement paths agree.
        sqlx::query(
            r#"UPDATE bets SET status = CASE
                   WHEN ?1 = 'DRAW' THEN 'DRAW'
                   WHEN side = ?1 THEN 'WON'
                   ELSE 'LOST'
               END
               WHERE round_id = ?2 AND status = 'PENDING'"#,
        )
        .bind(result.as_str())
        .bind(db_id(round_id)?)
        .execute(&self.pool)
        .await
        .context("settle_bets_bulk")?;
        Ok(())
    }

    async fn log_transaction(&self, entry: &TransactionEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO transactions (user_id, amount, type, ref_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.user_id)
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .bind(&entry.reference)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .context("log_transaction")?;
        Ok(())
    }

    async fn mark_bets_pending(&self, round_id: u64) -> Result<()> {
        sqlx::query("UPDATE bets SET status = 'PENDING' WHERE round_id = ? AND status IN ('WON', 'LOST')")
            .bind(db_id(round_id)?)
            .execute(&self.pool)
            .await
            .context("mark_bets_pending")?;
        Ok(())
    }

    async fn reopen_round_for_reversal(&self, round_id: u64) -> Result<()> {
        let id = db_id(round_id)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE rounds SET status = 'CLOSED', result = NULL WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("reopen_round_for_reversal")?;
        // a reversed round starts without prices
        sqlx::query("DELETE FROM odds WHERE round_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("reopen_round_for_reversal: odds")?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_betting_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["bets", "odds", "rounds"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("clear {table}"))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_all_accounts(&self) -> Result<Vec<AccountRow>> {
        let records: Vec<UserRecord> =
            sqlx::query_as("SELECT id, short_id, role, credit FROM users ORDER BY short_id")
                .fetch_all(&self.pool)
                .await
                .context("load_all_accounts")?;
        convert_all(records)
    }

    async fn load_active_round(&self) -> Result<Option<RoundRow>> {
        let record: Option<RoundRecord> = sqlx::query_as(
            "SELECT id, status, result, created_at FROM rounds WHERE status != 'COMPLETED' ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("load_active_round")?;
        record.map(RoundRow::try_from).transpose()
    }

    async fn last_round_id(&self) -> Result<Option<u64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM rounds")
            .fetch_one(&self.pool)
            .await
            .context("last_round_id")?;
        max.map(|id| u64::try_from(id).context("round id out of range"))
            .transpose()
    }

    async fn load_round_odds(&self, round_id: u64) -> Result<Vec<(usize, Odds)>> {
        let records: Vec<OddsRecord> = sqlx::query_as(
            r#"SELECT odds_index, red_loss, red_win, blue_loss, blue_win,
                      max_bet, min_bet, user_limit, vig, status
               FROM odds WHERE round_id = ? ORDER BY odds_index"#,
        )
        .bind(db_id(round_id)?)
        .fetch_all(&self.pool)
        .await
        .context("load_round_odds")?;
        convert_all(records)
    }

    async fn load_round_bets(&self, round_id: u64) -> Result<Vec<BetRow>> {
        let records: Vec<BetRecord> = sqlx::query_as(
            r#"SELECT user_id, odds_index, side, amount, win_amount, loss_amount, status, created_at
               FROM bets WHERE round_id = ? ORDER BY id"#,
        )
        .bind(db_id(round_id)?)
        .fetch_all(&self.pool)
        .await
        .context("load_round_bets")?;
        convert_all(records)
    }

    async fn find_round_for_reversal(&self, round_id: Option<u64>) -> Result<Option<RoundRow>> {
        let record: Option<RoundRecord> = match round_id {
            Some(id) => {
                sqlx::query_as("SELECT id, status, result, created_at FROM rounds WHERE id = ?")
                    .bind(db_id(id)?)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as(
                    "SELECT id, status, result, created_at FROM rounds WHERE status = 'COMPLETED' ORDER BY id DESC LIMIT 1",
                )
                .fetch_optional(&self.pool)
                .await
            }
        }
        .context("find_round_for_reversal")?;
        record.map(RoundRow::try_from).transpose()
    }

    async fn load_settled_bets(&self, round_id: u64) -> Result<Vec<BetRow>> {
        let records: Vec<BetRecord> = sqlx::query_as(
            r#"SELECT user_id, odds_index, side, amount, win_amount, loss_amount, status, created_at
               FROM bets WHERE round_id = ? AND status IN ('WON', 'LOST') ORDER BY id"#,
        )
        .bind(db_id(round_id)?)
        .fetch_all(&self.pool)
        .await
        .context("load_settled_bets")?;
        convert_all(records)
    }

    async fn recent_transactions(&self, user_id: &str, limit: u32) -> Result<Vec<Transaction>> {
        let records: Vec<TransactionRecord> = sqlx::query_as(
            r#"SELECT id, user_id, amount, type, ref_id, created_at
               FROM transactions WHERE user_id = ?
               ORDER BY created_at DESC, id DESC LIMIT ?"#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("recent_transactions")?;
        convert_all(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
