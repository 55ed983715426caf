// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Tally.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Metering accounts: billing cycles and consumption widgets.
//!
//! Both follow the same protocol. A binding captures the oldest unexported
//! ledger entry as its baseline and a live read as its current value; an
//! export (see [`crate::exporter`]) advances the baseline. The two flows
//! differ only in their [`AccountProfile`].

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::sync::Arc;
use tally_types::{
    AccountDraft, AccountId, AccountKind, AccountUpdate, LedgerPartition, MeteringAccount,
    TrendLogBinding, TrendLogEntry, TrendLogId,
};
use tracing::{debug, info, warn};

use crate::db::{Database, decode_tag, millis, time_column};
use crate::error::{ErrorKind, Result, TallyError};
use crate::ledger;
use crate::locks::TrendLogLocks;
use crate::registry;
use crate::value_source::ValueSource;

/// Which ledger partition an account reads baselines from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSelector {
    /// The partition the trend log's mode routes to.
    ByMode,
    /// Only trend logs stored in this partition may be bound.
    Pinned(LedgerPartition),
}

impl LedgerSelector {
    fn select(self, trend_log_id: TrendLogId, owner: LedgerPartition) -> Result<LedgerPartition> {
        match self {
            Self::ByMode => Ok(owner),
            Self::Pinned(pinned) if pinned == owner => Ok(pinned),
            Self::Pinned(pinned) => Err(TallyError::validation(format!(
                "trend log {trend_log_id} is stored in {owner}, this account reads only {pinned}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountProfile {
    pub kind: AccountKind,
    pub selector: LedgerSelector,
}

impl AccountProfile {
    pub const BILLING: Self = Self {
        kind: AccountKind::Billing,
        selector: LedgerSelector::ByMode,
    };

    pub const WIDGET: Self = Self {
        kind: AccountKind::Widget,
        selector: LedgerSelector::ByMode,
    };

    fn entity(self) -> &'static str {
        match self.kind {
            AccountKind::Billing => "billing cycle",
            AccountKind::Widget => "consumption widget",
        }
    }
}

/// Oldest unexported entry of `trend_log_id` in the partition `selector` picks.
pub(crate) fn baseline(
    conn: &Connection,
    selector: LedgerSelector,
    trend_log_id: TrendLogId,
) -> Result<(LedgerPartition, Option<TrendLogEntry>)> {
    let owner = registry::resolve_partition(conn, trend_log_id)?;
    let partition = selector.select(trend_log_id, owner)?;
    Ok((
        partition,
        ledger::first_unexported(conn, partition, trend_log_id)?,
    ))
}

/// Stored snapshot of an account, without any ledger refresh.
pub(crate) fn load(conn: &Connection, profile: AccountProfile, id: AccountId) -> Result<MeteringAccount> {
    let head = conn
        .query_row(
            "SELECT kind, name, price, currency, start_time_ms, created_at_ms
             FROM metering_accounts WHERE id = ?1 AND kind = ?2",
            params![id.0, profile.kind.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    time_column(row, 4)?,
                    time_column(row, 5)?,
                ))
            },
        )
        .optional()?;
    let (kind, name, price, currency, start_time, created_at) =
        head.ok_or(TallyError::NotFound {
            entity: profile.entity(),
            id: id.0,
        })?;

    let mut stmt = conn.prepare(
        "SELECT trend_log_id, register_json, first_value, current_value
         FROM account_bindings WHERE account_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![id.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let bindings = rows
        .into_iter()
        .map(|(trend_log_id, register_json, first_value, current_value)| {
            Ok(TrendLogBinding {
                trend_log_id: TrendLogId(trend_log_id),
                register: serde_json::from_str(&register_json)?,
                first_value,
                current_value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MeteringAccount {
        id,
        kind: decode_tag(kind)?,
        name,
        price,
        currency,
        start_time,
        bindings,
        created_at,
    })
}

fn insert_bindings(conn: &Connection, id: AccountId, bindings: &[TrendLogBinding]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO account_bindings (account_id, position, trend_log_id, register_json, first_value, current_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (position, binding) in bindings.iter().enumerate() {
        stmt.execute(params![
            id.0,
            position,
            binding.trend_log_id.0,
            serde_json::to_string(&binding.register)?,
            binding.first_value,
            binding.current_value,
        ])?;
    }
    Ok(())
}

fn validate_trend_log_ids(ids: &[TrendLogId]) -> Result<()> {
    if ids.is_empty() {
        return Err(TallyError::validation("at least one trend log must be bound"));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(TallyError::validation(format!(
            "trend log {dup} is listed more than once"
        )));
    }
    Ok(())
}

/// Billing cycles or consumption widgets, depending on the profile.
#[derive(Debug, Clone)]
pub struct MeteringAccounts {
    db: Arc<Database>,
    source: Arc<dyn ValueSource>,
    locks: Arc<TrendLogLocks>,
    profile: AccountProfile,
}

impl MeteringAccounts {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ValueSource>,
        locks: Arc<TrendLogLocks>,
        profile: AccountProfile,
    ) -> Self {
        Self {
            db,
            source,
            locks,
            profile,
        }
    }

    pub fn billing_cycles(
        db: Arc<Database>,
        source: Arc<dyn ValueSource>,
        locks: Arc<TrendLogLocks>,
    ) -> Self {
        Self::new(db, source, locks, AccountProfile::BILLING)
    }

    pub fn consumption_widgets(
        db: Arc<Database>,
        source: Arc<dyn ValueSource>,
        locks: Arc<TrendLogLocks>,
    ) -> Self {
        Self::new(db, source, locks, AccountProfile::WIDGET)
    }

    pub fn profile(&self) -> AccountProfile {
        self.profile
    }

    fn validate_header(&self, name: &str, price: f64, currency: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(TallyError::validation("name must be set"));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(TallyError::validation(
                "price must be a non-negative number",
            ));
        }
        if self.profile.kind == AccountKind::Billing && currency.trim().is_empty() {
            return Err(TallyError::validation("currency must be set"));
        }
        Ok(())
    }

    /// Reads every baseline first, then every live value. Nothing is
    /// written here; any failure leaves storage untouched.
    async fn capture_bindings(&self, ids: &[TrendLogId]) -> Result<Vec<TrendLogBinding>> {
        let baselines = self.db.with_conn(|conn| {
            ids.iter()
                .map(|&id| {
                    let config = registry::load(conn, id)?;
                    let (partition, first) = baseline(conn, self.profile.selector, id)?;
                    let first = first.ok_or_else(|| {
                        warn!(trend_log_id = %id, partition = %partition, "Trend log has no baseline yet");
                        TallyError::MissingBaseline { trend_log_id: id }
                    })?;
                    Ok((config, first.value))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let current = try_join_all(
            baselines
                .iter()
                .map(|(config, _)| self.source.current_value(&config.register)),
        )
        .await?;

        Ok(baselines
            .into_iter()
            .zip(current)
            .map(|((config, first_value), current_value)| TrendLogBinding {
                trend_log_id: config.id,
                register: config.register,
                first_value,
                current_value,
            })
            .collect())
    }

    /// Replaces each binding's baseline with the ledger's current oldest
    /// unexported value. Read-only. A log whose ledger has nothing
    /// unexported keeps its stored snapshot; zero is never substituted.
    fn refresh_baselines(&self, conn: &Connection, account: &mut MeteringAccount) -> Result<()> {
        for binding in &mut account.bindings {
            match baseline(conn, self.profile.selector, binding.trend_log_id) {
                Ok((_, Some(entry))) => binding.first_value = entry.value,
                Ok((partition, None)) => warn!(
                    account_id = %account.id,
                    trend_log_id = %binding.trend_log_id,
                    partition = %partition,
                    stored = binding.first_value,
                    "No unexported entry, showing stored baseline"
                ),
                Err(e) if e.kind() == ErrorKind::Storage => return Err(e),
                Err(e) => warn!(
                    account_id = %account.id,
                    trend_log_id = %binding.trend_log_id,
                    error = %e,
                    "Cannot refresh baseline, showing stored value"
                ),
            }
        }
        Ok(())
    }

    pub async fn create(&self, draft: AccountDraft) -> Result<MeteringAccount> {
        self.create_at(draft, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        draft: AccountDraft,
        now: DateTime<Utc>,
    ) -> Result<MeteringAccount> {
        self.validate_header(&draft.name, draft.price, &draft.currency)?;
        validate_trend_log_ids(&draft.trend_log_ids)?;

        let _guard = self.locks.acquire(&draft.trend_log_ids).await;
        let bindings = self.capture_bindings(&draft.trend_log_ids).await?;

        let account = self.db.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO metering_accounts (kind, name, price, currency, start_time_ms, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    self.profile.kind.as_str(),
                    draft.name.trim(),
                    draft.price,
                    draft.currency.trim(),
                    millis(now),
                ],
            )?;
            let id = AccountId(conn.last_insert_rowid());
            insert_bindings(conn, id, &bindings)?;
            load(conn, self.profile, id)
        })?;

        info!(
            account_id = %account.id,
            kind = account.kind.as_str(),
            bindings = account.bindings.len(),
            "Created metering account"
        );
        Ok(account)
    }

    /// All accounts of this profile, baselines refreshed from the ledgers.
    pub fn list(&self) -> Result<Vec<MeteringAccount>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM metering_accounts WHERE kind = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map(params![self.profile.kind.as_str()], |row| {
                    Ok(AccountId(row.get(0)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.into_iter()
                .map(|id| {
                    let mut account = load(conn, self.profile, id)?;
                    self.refresh_baselines(conn, &mut account)?;
                    Ok(account)
                })
                .collect()
        })
    }

    pub fn get(&self, id: AccountId) -> Result<MeteringAccount> {
        self.db.with_conn(|conn| {
            let mut account = load(conn, self.profile, id)?;
            self.refresh_baselines(conn, &mut account)?;
            Ok(account)
        })
    }

    /// Header fields change in place. A different trend-log list replaces
    /// the bindings wholesale, captured exactly as on creation.
    pub async fn update(&self, id: AccountId, patch: AccountUpdate) -> Result<MeteringAccount> {
        let current = self.db.with_conn(|conn| load(conn, self.profile, id))?;
        self.validate_header(
            patch.name.as_deref().unwrap_or(&current.name),
            patch.price.unwrap_or(current.price),
            patch.currency.as_deref().unwrap_or(&current.currency),
        )?;

        let rebind = patch
            .trend_log_ids
            .filter(|ids| *ids != current.trend_log_ids());
        // Old logs are locked too: an export still closing them must finish
        // before their bindings disappear.
        let (_guard, bindings) = match &rebind {
            Some(ids) => {
                validate_trend_log_ids(ids)?;
                let mut locked = current.trend_log_ids();
                locked.extend_from_slice(ids);
                let guard = self.locks.acquire(&locked).await;
                let bindings = self.capture_bindings(ids).await?;
                (Some(guard), Some(bindings))
            }
            None => (None, None),
        };

        let account = self.db.with_transaction(|conn| {
            let stored = load(conn, self.profile, id)?;
            if bindings.is_some() && stored.trend_log_ids() != current.trend_log_ids() {
                return Err(TallyError::Conflict(format!(
                    "bindings of {} {id} changed during the update",
                    self.profile.entity()
                )));
            }
            conn.execute(
                "UPDATE metering_accounts SET name = COALESCE(?1, name), price = COALESCE(?2, price),
                        currency = COALESCE(?3, currency)
                 WHERE id = ?4",
                params![
                    patch.name.as_deref().map(str::trim),
                    patch.price,
                    patch.currency.as_deref().map(str::trim),
                    id.0
                ],
            )?;
            if let Some(bindings) = &bindings {
                conn.execute(
                    "DELETE FROM account_bindings WHERE account_id = ?1",
                    params![id.0],
                )?;
                insert_bindings(conn, id, bindings)?;
            }
            let mut account = load(conn, self.profile, id)?;
            self.refresh_baselines(conn, &mut account)?;
            Ok(account)
        })?;

        debug!(account_id = %id, rebound = bindings.is_some(), "Updated metering account");
        Ok(account)
    }

    /// Unconditional. Ledger entries are left alone.
    pub fn delete(&self, id: AccountId) -> Result<()> {
        self.db.with_transaction(|conn| {
            conn.execute(
                "DELETE FROM account_bindings WHERE account_id IN
                    (SELECT id FROM metering_accounts WHERE id = ?1 AND kind = ?2)",
                params![id.0, self.profile.kind.as_str()],
            )?;
            let deleted = conn.execute(
                "DELETE FROM metering_accounts WHERE id = ?1 AND kind = ?2",
                params![id.0, self.profile.kind.as_str()],
            )?;
            if deleted == 0 {
                return Err(TallyError::NotFound {
                    entity: self.profile.entity(),
                    id: id.0,
                });
            }
            Ok(())
        })?;

        info!(account_id = %id, kind = self.profile.kind.as_str(), "Deleted metering account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TrendLogRegistry;
    use crate::value_source::StaticValueSource;
    use chrono::{Duration, TimeZone};
    use tally_types::{ByteOrder, DataType, LogMode, NewTrendLog, RegisterRef};

    struct Fixture {
        db: Arc<Database>,
        source: Arc<StaticValueSource>,
        registry: TrendLogRegistry,
        billing: MeteringAccounts,
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let source = Arc::new(StaticValueSource::new());
        let locks = Arc::new(TrendLogLocks::new());
        Fixture {
            registry: TrendLogRegistry::new(Arc::clone(&db), source.clone()),
            billing: MeteringAccounts::billing_cycles(Arc::clone(&db), source.clone(), locks),
            db,
            source,
        }
    }

    async fn counter(fx: &Fixture, register_id: &str) -> TrendLogId {
        fx.registry
            .create_at(
                NewTrendLog {
                    register: RegisterRef {
                        analyzer_id: "an-1".to_owned(),
                        analyzer_name: None,
                        register_id: register_id.to_owned(),
                        address: 1,
                        data_type: DataType::Uint32,
                        scale: 1.0,
                        byte_order: ByteOrder::Abcd,
                    },
                    mode: LogMode::CumulativeCounter,
                    interval: None,
                    on_change: None,
                    active_until: t(0) + Duration::days(365),
                },
                t(0),
            )
            .await
            .unwrap()
            .id
    }

    fn draft(ids: Vec<TrendLogId>) -> AccountDraft {
        AccountDraft {
            name: "Tenant A".to_owned(),
            price: 2.0,
            currency: "USD".to_owned(),
            trend_log_ids: ids,
        }
    }

    #[tokio::test]
    async fn create_binds_ledger_baseline_and_live_value() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        for (minute, value) in [(1, 10.0), (2, 15.0)] {
            fx.registry.record(id, value, t(minute)).unwrap();
        }
        fx.source.set("reg-1", 22.0);

        let account = fx.billing.create_at(draft(vec![id]), t(10)).await.unwrap();

        assert_eq!(account.bindings.len(), 1);
        assert!((account.bindings[0].first_value - 10.0).abs() < f64::EPSILON);
        assert!((account.bindings[0].current_value - 22.0).abs() < f64::EPSILON);
        assert_eq!(account.start_time, t(10));
    }

    #[tokio::test]
    async fn create_without_entries_is_missing_baseline() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.source.set("reg-1", 22.0);

        let err = fx.billing.create_at(draft(vec![id]), t(10)).await.unwrap_err();
        assert!(matches!(err, TallyError::MissingBaseline { trend_log_id } if trend_log_id == id));
        assert!(fx.billing.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_fails_whole_when_one_read_fails() {
        let fx = fixture();
        let a = counter(&fx, "reg-a").await;
        let b = counter(&fx, "reg-b").await;
        fx.registry.record(a, 1.0, t(1)).unwrap();
        fx.registry.record(b, 1.0, t(1)).unwrap();
        fx.source.set("reg-a", 5.0);

        let err = fx
            .billing
            .create_at(draft(vec![a, b]), t(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueSourceUnavailable);
        assert!(fx.billing.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_and_empty_bindings_are_rejected() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;

        let err = fx.billing.create_at(draft(vec![]), t(1)).await.unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
        let err = fx
            .billing
            .create_at(draft(vec![id, id]), t(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[tokio::test]
    async fn pinned_selector_rejects_other_partitions() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.registry.record(id, 1.0, t(1)).unwrap();
        fx.source.set("reg-1", 2.0);

        let pinned = MeteringAccounts::new(
            Arc::clone(&fx.db),
            fx.source.clone(),
            Arc::new(TrendLogLocks::new()),
            AccountProfile {
                kind: AccountKind::Widget,
                selector: LedgerSelector::Pinned(LedgerPartition::FixedInterval),
            },
        );
        let err = pinned.create_at(draft(vec![id]), t(2)).await.unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[tokio::test]
    async fn list_refreshes_baseline_from_ledger() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.registry.record(id, 10.0, t(1)).unwrap();
        fx.registry.record(id, 14.0, t(2)).unwrap();
        fx.source.set("reg-1", 14.0);
        let account = fx.billing.create_at(draft(vec![id]), t(3)).await.unwrap();

        // Another path rebases the ledger behind the account's back.
        fx.db
            .with_transaction(|conn| {
                ledger::close_older_than_latest_unexported(
                    conn,
                    LedgerPartition::CumulativeCounter,
                    id,
                    t(4),
                )
            })
            .unwrap();

        let listed = fx.billing.list().unwrap();
        assert!((listed[0].bindings[0].first_value - 14.0).abs() < f64::EPSILON);
        assert_eq!(fx.billing.get(account.id).unwrap(), listed[0]);
    }

    #[tokio::test]
    async fn list_is_idempotent_without_exports() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.registry.record(id, 3.0, t(1)).unwrap();
        fx.source.set("reg-1", 9.0);
        fx.billing.create_at(draft(vec![id]), t(2)).await.unwrap();

        assert_eq!(fx.billing.list().unwrap(), fx.billing.list().unwrap());
    }

    #[tokio::test]
    async fn update_rebinds_only_when_logs_change() {
        let fx = fixture();
        let a = counter(&fx, "reg-a").await;
        let b = counter(&fx, "reg-b").await;
        fx.registry.record(a, 1.0, t(1)).unwrap();
        fx.registry.record(b, 100.0, t(1)).unwrap();
        fx.source.set("reg-a", 2.0);
        fx.source.set("reg-b", 150.0);
        let account = fx.billing.create_at(draft(vec![a]), t(2)).await.unwrap();

        let renamed = fx
            .billing
            .update(
                account.id,
                AccountUpdate {
                    name: Some("Tenant B".to_owned()),
                    price: Some(3.5),
                    trend_log_ids: Some(vec![a]),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Tenant B");
        assert!((renamed.price - 3.5).abs() < f64::EPSILON);
        assert_eq!(renamed.bindings, account.bindings);

        let rebound = fx
            .billing
            .update(
                account.id,
                AccountUpdate {
                    trend_log_ids: Some(vec![b]),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rebound.trend_log_ids(), vec![b]);
        assert!((rebound.bindings[0].first_value - 100.0).abs() < f64::EPSILON);
        assert!((rebound.bindings[0].current_value - 150.0).abs() < f64::EPSILON);
        assert_eq!(rebound.name, "Tenant B");
    }

    #[tokio::test]
    async fn delete_leaves_ledger_untouched() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.registry.record(id, 1.0, t(1)).unwrap();
        fx.source.set("reg-1", 2.0);
        let account = fx.billing.create_at(draft(vec![id]), t(2)).await.unwrap();

        fx.billing.delete(account.id).unwrap();

        assert!(matches!(
            fx.billing.get(account.id),
            Err(TallyError::NotFound { .. })
        ));
        let entries = fx
            .db
            .with_conn(|conn| ledger::entries(conn, LedgerPartition::CumulativeCounter, id, None))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].exported);
        // With the binding gone the trend log can be deleted again.
        fx.registry.delete(id).unwrap();
    }

    #[tokio::test]
    async fn billing_and_widgets_are_separate() {
        let fx = fixture();
        let id = counter(&fx, "reg-1").await;
        fx.registry.record(id, 1.0, t(1)).unwrap();
        fx.source.set("reg-1", 2.0);
        let widgets = MeteringAccounts::consumption_widgets(
            Arc::clone(&fx.db),
            fx.source.clone(),
            Arc::new(TrendLogLocks::new()),
        );

        let widget = widgets
            .create_at(
                AccountDraft {
                    name: "Lobby".to_owned(),
                    price: 0.0,
                    currency: String::new(),
                    trend_log_ids: vec![id],
                },
                t(2),
            )
            .await
            .unwrap();

        assert!(fx.billing.list().unwrap().is_empty());
        assert!(matches!(
            fx.billing.get(widget.id),
            Err(TallyError::NotFound { .. })
        ));
        assert_eq!(widgets.list().unwrap().len(), 1);
    }
}
