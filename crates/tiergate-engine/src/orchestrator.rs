//! # Transfer Orchestrator
//!
//! Runs one guarded transfer as a linear state machine and exposes the admin
//! surface (oracle, tiers, counters, custom discounts, pause, roster).
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      custom_transfer(request)                           │
//! │                                                                         │
//! │  Validating              pause flag, initialized, ids, amount, memo    │
//! │      │                   guard(sender, source, destination, trace)     │
//! │      ▼                                                                  │
//! │  CheckingAccountsActive  sender ─► source ─► destination               │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  CheckingSourceBalance   balance(source) >= original amount            │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ComputingDiscount       count BEFORE increment, flags, override       │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ExecutingSettlement     ledger.stage ─► service.execute(discounted)   │
//! │      │                   declined/failed ─► ledger.rollback, abort     │
//! │      ▼                                                                  │
//! │  UpdatingLedger          ledger.commit (count + 1, record appended)    │
//! │      │                   commit failed ─► service.reverse, abort       │
//! │      ▼                                                                  │
//! │  Emitting                DiscountApplied, TransferCommitted,           │
//! │                          PurchaseCountChanged                          │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  Done                    guard released (also on every abort)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure before `UpdatingLedger` leaves the ledger and the external
//! balances exactly as they were.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::access::AccessControl;
use crate::config::{ConfigError, ConfigResult, EngineConfig};
use crate::error::{TransferError, TransferResult};
use crate::events::{DomainEvent, EventEmitter, NoOpEmitter};
use crate::gateway::{loyalty_key, read_flag, referral_key, AccountStateGateway};
use crate::guard::{GuardKey, GuardToken, ReentrancyGuard};
use crate::ledger::PurchaseLedger;
use crate::settlement::{SettlementOrder, TransferService};
use tiergate_core::validation::{
    validate_account_id, validate_batch, validate_batch_size, validate_quantity, validate_rate,
    validate_request,
};
use tiergate_core::{
    AccountId, AccountRole, Amount, DiscountBreakdown, DiscountContext, DiscountEngine,
    DiscountRate, DiscountTier, ModifierKind, PurchaseCount, PurchaseStats, TierTable, TraceId,
    TransferRecord, TransferRequest, ValidationError, MAX_BATCH_SIZE,
};

// =============================================================================
// Collaborator References
// =============================================================================

/// The state gateway together with its on-ledger identity.
#[derive(Clone)]
pub struct OracleRef {
    pub id: AccountId,
    pub gateway: Arc<dyn AccountStateGateway>,
}

impl OracleRef {
    pub fn new<G: AccountStateGateway + 'static>(id: AccountId, gateway: Arc<G>) -> Self {
        OracleRef { id, gateway }
    }
}

/// The transfer service together with its on-ledger identity.
#[derive(Clone)]
pub struct ServiceRef {
    pub id: AccountId,
    pub service: Arc<dyn TransferService>,
}

impl ServiceRef {
    pub fn new<S: TransferService + 'static>(id: AccountId, service: Arc<S>) -> Self {
        ServiceRef { id, service }
    }
}

#[derive(Clone)]
struct Collaborators {
    oracle: OracleRef,
    service: ServiceRef,
}

// =============================================================================
// Stages and Receipt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Validating,
    CheckingAccountsActive,
    CheckingSourceBalance,
    ComputingDiscount,
    ExecutingSettlement,
    UpdatingLedger,
    Emitting,
    Done,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Validating => "validating",
            TransferStage::CheckingAccountsActive => "checking_accounts_active",
            TransferStage::CheckingSourceBalance => "checking_source_balance",
            TransferStage::ComputingDiscount => "computing_discount",
            TransferStage::ExecutingSettlement => "executing_settlement",
            TransferStage::UpdatingLedger => "updating_ledger",
            TransferStage::Emitting => "emitting",
            TransferStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub trace_id: TraceId,
    pub original: Amount,
    pub charged: Amount,
    pub breakdown: DiscountBreakdown,
    /// Sender count the discount was computed from.
    pub purchase_count_before: PurchaseCount,
    pub purchase_count_after: PurchaseCount,
    pub committed_at: DateTime<Utc>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Guarded transfer flow in front of an external ledger.
///
/// All methods take `&self`; share the orchestrator behind an `Arc`.
pub struct TransferOrchestrator<L: PurchaseLedger> {
    engine: RwLock<DiscountEngine>,
    custom_rates: RwLock<HashMap<AccountId, DiscountRate>>,
    access: RwLock<AccessControl>,
    collaborators: RwLock<Option<Collaborators>>,
    ledger: L,
    guard: ReentrancyGuard,
    paused: AtomicBool,
    emitter: Arc<dyn EventEmitter>,
    max_batch_size: usize,
}

impl<L: PurchaseLedger> TransferOrchestrator<L> {
    /// Creates an uninitialized orchestrator owned by `owner`.
    pub fn new(owner: AccountId, engine: DiscountEngine, ledger: L) -> Self {
        Self::with_access(AccessControl::new(owner), engine, ledger)
    }

    fn with_access(access: AccessControl, engine: DiscountEngine, ledger: L) -> Self {
        TransferOrchestrator {
            engine: RwLock::new(engine),
            custom_rates: RwLock::new(HashMap::new()),
            access: RwLock::new(access),
            collaborators: RwLock::new(None),
            ledger,
            guard: ReentrancyGuard::new(),
            paused: AtomicBool::new(false),
            emitter: Arc::new(NoOpEmitter),
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Builds an orchestrator from configuration. `access.owner` is required.
    pub fn from_config(config: &EngineConfig, ledger: L) -> ConfigResult<Self> {
        config.validate()?;
        let owner = config
            .access
            .owner
            .ok_or_else(|| ConfigError::Invalid("access.owner is required".into()))?;

        let mut access = AccessControl::new(owner);
        for admin in &config.access.admins {
            access.grant(*admin);
        }

        let engine = DiscountEngine::with_policy(config.discount.clone())?;
        Ok(Self::with_access(access, engine, ledger).with_max_batch_size(config.limits.max_batch_size))
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Sets the bulk element limit, clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// One-time wiring of the state gateway and the transfer service.
    ///
    /// ## Errors
    /// - `Unauthorized` when `caller` is not the owner
    /// - `InvalidArgument` for a zero oracle or service id
    /// - `AlreadyInitialized` on any second call
    pub async fn initialize(
        &self,
        caller: AccountId,
        oracle: OracleRef,
        service: ServiceRef,
    ) -> TransferResult<()> {
        let owner = {
            let access = self.access.read().await;
            access.require_owner(caller)?;
            access.owner()
        };
        validate_account_id("oracle", oracle.id)?;
        validate_account_id("transfer service", service.id)?;

        let mut collaborators = self.collaborators.write().await;
        if collaborators.is_some() {
            return Err(TransferError::AlreadyInitialized);
        }

        let event = DomainEvent::Initialized {
            owner,
            oracle: oracle.id,
            transfer_service: service.id,
        };
        info!(oracle = %oracle.id, transfer_service = %service.id, "Orchestrator initialized");
        *collaborators = Some(Collaborators { oracle, service });
        drop(collaborators);

        self.emitter.emit(&event);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.collaborators.read().await.is_some()
    }

    /// Id of the current state gateway.
    pub async fn oracle_id(&self) -> Option<AccountId> {
        self.collaborators
            .read()
            .await
            .as_ref()
            .map(|c| c.oracle.id)
    }

    async fn collaborators(&self) -> TransferResult<Collaborators> {
        self.collaborators
            .read()
            .await
            .clone()
            .ok_or(TransferError::NotInitialized)
    }

    // =========================================================================
    // Guarded Transfer
    // =========================================================================

    /// Runs the full transfer state machine for `request`.
    ///
    /// The guard is held from validation until the method returns, so a
    /// concurrent call touching any participant or the same trace id is
    /// rejected with `Reentrant` / `DuplicateTrace` instead of waiting.
    pub async fn custom_transfer(&self, request: &TransferRequest) -> TransferResult<TransferReceipt> {
        let mut stage = TransferStage::Validating;
        let result = self.run_transfer(request, &mut stage).await;

        match &result {
            Ok(receipt) => info!(
                trace_id = %receipt.trace_id,
                sender = %request.sender,
                original = %receipt.original,
                charged = %receipt.charged,
                purchase_count = receipt.purchase_count_after,
                "Transfer committed"
            ),
            Err(e) => warn!(
                trace_id = %request.trace_id,
                stage = %stage,
                category = %e.category(),
                error = %e,
                "Transfer aborted"
            ),
        }
        result
    }

    async fn run_transfer(
        &self,
        request: &TransferRequest,
        stage: &mut TransferStage,
    ) -> TransferResult<TransferReceipt> {
        let trace_id = request.trace_id;

        // ---------------------------------------------------------------------
        // Validating
        // ---------------------------------------------------------------------
        if self.is_paused() {
            return Err(TransferError::Paused);
        }
        let Collaborators { oracle, service } = self.collaborators().await?;
        validate_request(request)?;

        let keys = request
            .participants()
            .into_iter()
            .map(|(_, account)| GuardKey::Account(account))
            .chain(iter::once(GuardKey::Trace(trace_id)));
        let _token = self.enter_guard(keys)?;

        if self.ledger.contains_trace(trace_id).await? {
            return Err(TransferError::DuplicateTrace(trace_id));
        }

        // ---------------------------------------------------------------------
        // CheckingAccountsActive
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::CheckingAccountsActive, trace_id);
        let gateway = oracle.gateway.as_ref();
        for (role, account) in request.participants() {
            if !gateway.is_active(account).await? {
                return Err(TransferError::NotActive { role, account });
            }
        }

        // ---------------------------------------------------------------------
        // CheckingSourceBalance
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::CheckingSourceBalance, trace_id);
        let balance = gateway.balance(request.source).await?;
        if balance < request.amount {
            return Err(TransferError::InsufficientBalance {
                account: request.source,
                balance,
                required: request.amount,
            });
        }

        // ---------------------------------------------------------------------
        // ComputingDiscount
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::ComputingDiscount, trace_id);
        let now = Utc::now();
        let purchase_count_before = self.ledger.purchase_count(request.sender).await?;
        let breakdown = self
            .evaluate_for(
                gateway,
                request.sender,
                request.amount,
                request.quantity,
                purchase_count_before,
                now,
            )
            .await?;
        debug!(
            trace_id = %trace_id,
            purchase_count = purchase_count_before,
            base_rate = %breakdown.base_rate,
            modifiers = breakdown.steps.len(),
            charged = %breakdown.charged,
            "Discount computed"
        );

        // ---------------------------------------------------------------------
        // ExecutingSettlement
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::ExecutingSettlement, trace_id);
        let record =
            TransferRecord::from_request(request, breakdown.charged, purchase_count_before, now);
        let staged = self.ledger.stage(record).await?;

        let order = SettlementOrder::new(request, breakdown.charged);
        let refusal = match service.service.execute(&order).await {
            Ok(true) => None,
            Ok(false) => Some("declined by the transfer service".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = refusal {
            if let Err(e) = self.ledger.rollback(staged).await {
                warn!(trace_id = %trace_id, error = %e, "Ledger rollback failed");
            }
            return Err(TransferError::SettlementFailure { trace_id, reason });
        }

        // ---------------------------------------------------------------------
        // UpdatingLedger
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::UpdatingLedger, trace_id);
        let purchase_count_after = match self.ledger.commit(staged).await {
            Ok(count) => count,
            Err(e) => {
                error!(
                    trace_id = %trace_id,
                    error = %e,
                    "Settled transfer could not be recorded, reversing settlement"
                );
                if let Err(reverse_err) = service.service.reverse(&order).await {
                    error!(
                        trace_id = %trace_id,
                        error = %reverse_err,
                        "Reversal failed, manual reconciliation required"
                    );
                }
                return Err(e.into());
            }
        };

        // ---------------------------------------------------------------------
        // Emitting
        // ---------------------------------------------------------------------
        advance(stage, TransferStage::Emitting, trace_id);
        self.emitter.emit(&DomainEvent::DiscountApplied {
            account: request.sender,
            aux1: request.aux1,
            original: request.amount,
            discounted: breakdown.charged,
        });
        self.emitter.emit(&DomainEvent::TransferCommitted {
            trace_id,
            sender: request.sender,
            source: request.source,
            destination: request.destination,
            discounted: breakdown.charged,
            aux1: request.aux1,
            aux2: request.aux2,
        });
        self.emitter.emit(&DomainEvent::PurchaseCountChanged {
            account: request.sender,
            previous: purchase_count_before,
            current: purchase_count_after,
        });

        advance(stage, TransferStage::Done, trace_id);
        Ok(TransferReceipt {
            trace_id,
            original: request.amount,
            charged: breakdown.charged,
            breakdown,
            purchase_count_before,
            purchase_count_after,
            committed_at: now,
        })
    }

    /// Runs [`custom_transfer`](Self::custom_transfer) for each request, in
    /// order. One failing element does not stop the others.
    pub async fn custom_transfer_batch(
        &self,
        requests: &[TransferRequest],
    ) -> TransferResult<Vec<TransferResult<TransferReceipt>>> {
        validate_batch_size(requests.len(), self.max_batch_size)?;

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.custom_transfer(request).await);
        }
        Ok(results)
    }

    // =========================================================================
    // Discount Queries
    // =========================================================================

    /// Tier-only price of `amount` after `purchase_count` purchases.
    pub async fn discount(
        &self,
        amount: Amount,
        purchase_count: PurchaseCount,
    ) -> TransferResult<Amount> {
        Ok(self.engine.read().await.compute_discount(amount, purchase_count)?)
    }

    /// Element-wise [`discount`](Self::discount).
    ///
    /// Lengths and the batch limit are checked before any element.
    pub async fn discount_batch(
        &self,
        amounts: &[Amount],
        counts: &[PurchaseCount],
    ) -> TransferResult<Vec<TransferResult<Amount>>> {
        validate_batch(amounts.len(), counts.len(), self.max_batch_size)?;

        let engine = self.engine.read().await;
        Ok(amounts
            .iter()
            .zip(counts)
            .map(|(amount, count)| {
                engine
                    .compute_discount(*amount, *count)
                    .map_err(TransferError::from)
            })
            .collect())
    }

    /// What `account` would be charged for `amount` right now, with every
    /// modifier. Reads state, writes nothing.
    pub async fn preview(
        &self,
        account: AccountId,
        amount: Amount,
        quantity: u64,
        at: DateTime<Utc>,
    ) -> TransferResult<DiscountBreakdown> {
        validate_account_id("account", account)?;
        validate_quantity(quantity)?;
        let Collaborators { oracle, .. } = self.collaborators().await?;

        let count = self.ledger.purchase_count(account).await?;
        self.evaluate_for(oracle.gateway.as_ref(), account, amount, quantity, count, at)
            .await
    }

    /// Full evaluation against one engine snapshot. Gateway flags are only
    /// read when a modifier depends on them.
    async fn evaluate_for(
        &self,
        gateway: &dyn AccountStateGateway,
        account: AccountId,
        amount: Amount,
        quantity: u64,
        purchase_count: PurchaseCount,
        at: DateTime<Utc>,
    ) -> TransferResult<DiscountBreakdown> {
        let engine = self.engine.read().await.clone();
        let uses = |kind: ModifierKind| engine.policy().modifiers.iter().any(|m| m.kind() == kind);

        let loyalty_member = if uses(ModifierKind::Loyalty) {
            read_flag(gateway, &loyalty_key(account)).await?
        } else {
            false
        };
        let referred = if uses(ModifierKind::Referral) {
            read_flag(gateway, &referral_key(account)).await?
        } else {
            false
        };
        let custom_rate = self.custom_rates.read().await.get(&account).copied();

        let ctx = DiscountContext::new(purchase_count, at)
            .with_quantity(quantity)
            .with_loyalty(loyalty_member)
            .with_referral(referred);
        Ok(engine.evaluate(amount, &ctx, custom_rate)?)
    }

    // =========================================================================
    // Admin: Oracle
    // =========================================================================

    /// Replaces the state gateway.
    ///
    /// The new oracle must be reported active by the CURRENT gateway.
    pub async fn set_oracle(&self, caller: AccountId, oracle: OracleRef) -> TransferResult<()> {
        self.access.read().await.require_admin(caller)?;
        validate_account_id("oracle", oracle.id)?;

        let current = self.collaborators().await?;
        if !current.oracle.gateway.is_active(oracle.id).await? {
            return Err(TransferError::NotActive {
                role: AccountRole::Oracle,
                account: oracle.id,
            });
        }

        let previous = {
            let mut collaborators = self.collaborators.write().await;
            let slot = collaborators.as_mut().ok_or(TransferError::NotInitialized)?;
            std::mem::replace(&mut slot.oracle, oracle.clone()).id
        };

        info!(previous = %previous, current = %oracle.id, "Oracle changed");
        self.emitter.emit(&DomainEvent::OracleChanged {
            previous,
            current: oracle.id,
        });
        Ok(())
    }

    // =========================================================================
    // Admin: Tiers
    // =========================================================================

    pub async fn tiers(&self) -> TierTable {
        self.engine.read().await.tiers().clone()
    }

    pub async fn add_tier(&self, caller: AccountId, tier: DiscountTier) -> TransferResult<()> {
        self.access.read().await.require_admin(caller)?;
        let tiers = {
            let mut engine = self.engine.write().await;
            engine.add_tier(tier)?;
            engine.tiers().tiers().to_vec()
        };
        info!(threshold = tier.threshold, rate = %tier.rate, "Tier added");
        self.emitter.emit(&DomainEvent::TiersChanged { tiers });
        Ok(())
    }

    /// Removes the tier starting at `threshold` and returns it.
    pub async fn remove_tier(
        &self,
        caller: AccountId,
        threshold: PurchaseCount,
    ) -> TransferResult<DiscountTier> {
        self.access.read().await.require_admin(caller)?;
        let (removed, tiers) = {
            let mut engine = self.engine.write().await;
            let removed = engine.remove_tier(threshold)?;
            (removed, engine.tiers().tiers().to_vec())
        };
        info!(threshold, "Tier removed");
        self.emitter.emit(&DomainEvent::TiersChanged { tiers });
        Ok(removed)
    }

    /// Changes the rate of the tier at `threshold`, returning the old tier.
    pub async fn update_tier(
        &self,
        caller: AccountId,
        threshold: PurchaseCount,
        rate: DiscountRate,
    ) -> TransferResult<DiscountTier> {
        self.access.read().await.require_admin(caller)?;
        let (previous, tiers) = {
            let mut engine = self.engine.write().await;
            let previous = engine.update_tier(threshold, rate)?;
            (previous, engine.tiers().tiers().to_vec())
        };
        info!(threshold, from = %previous.rate, to = %rate, "Tier updated");
        self.emitter.emit(&DomainEvent::TiersChanged { tiers });
        Ok(previous)
    }

    // =========================================================================
    // Admin: Purchase Counts
    // =========================================================================

    /// Sets `account` back to zero and returns the previous count.
    pub async fn reset_purchase_count(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> TransferResult<PurchaseCount> {
        self.access.read().await.require_admin(caller)?;
        validate_account_id("account", account)?;
        let _token = self.enter_guard([GuardKey::Account(account)])?;

        let previous = self.ledger.reset(account).await?;
        info!(account = %account, previous, "Purchase count reset");
        self.emitter.emit(&DomainEvent::PurchaseCountChanged {
            account,
            previous,
            current: 0,
        });
        Ok(previous)
    }

    /// Overwrites the counts of `accounts` with `counts`, pairwise.
    ///
    /// Lengths, the batch limit and every id are checked before anything is
    /// written. For a repeated account the last value wins.
    pub async fn bulk_set_purchase_counts(
        &self,
        caller: AccountId,
        accounts: &[AccountId],
        counts: &[PurchaseCount],
    ) -> TransferResult<()> {
        self.access.read().await.require_admin(caller)?;
        validate_batch(accounts.len(), counts.len(), self.max_batch_size)?;
        for account in accounts {
            validate_account_id("account", *account)?;
        }
        let _token = self.enter_guard(accounts.iter().map(|a| GuardKey::Account(*a)))?;

        let mut previous = HashMap::with_capacity(accounts.len());
        for account in accounts {
            if !previous.contains_key(account) {
                previous.insert(*account, self.ledger.purchase_count(*account).await?);
            }
        }

        let entries: Vec<(AccountId, PurchaseCount)> =
            accounts.iter().copied().zip(counts.iter().copied()).collect();
        self.ledger.bulk_set(&entries).await?;
        info!(accounts = entries.len(), "Purchase counts bulk set");

        let mut finals: HashMap<AccountId, PurchaseCount> = HashMap::with_capacity(entries.len());
        for (account, count) in &entries {
            finals.insert(*account, *count);
        }
        for (account, current) in finals {
            self.emitter.emit(&DomainEvent::PurchaseCountChanged {
                account,
                previous: previous.get(&account).copied().unwrap_or(0),
                current,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Admin: Custom Discounts
    // =========================================================================

    /// Sets a per-account rate that replaces the tier rate. The rate may not
    /// exceed the combined cap.
    pub async fn set_custom_discount(
        &self,
        caller: AccountId,
        account: AccountId,
        rate: DiscountRate,
    ) -> TransferResult<()> {
        self.access.read().await.require_admin(caller)?;
        validate_account_id("account", account)?;
        validate_rate("custom discount", rate)?;
        self.engine
            .read()
            .await
            .policy()
            .check_base_rate("custom discount", rate)?;

        self.custom_rates.write().await.insert(account, rate);
        info!(account = %account, rate = %rate, "Custom discount set");
        self.emitter.emit(&DomainEvent::CustomDiscountChanged {
            account,
            rate: Some(rate),
        });
        Ok(())
    }

    /// Removes the override and returns it, if one was set.
    pub async fn remove_custom_discount(
        &self,
        caller: AccountId,
        account: AccountId,
    ) -> TransferResult<Option<DiscountRate>> {
        self.access.read().await.require_admin(caller)?;
        validate_account_id("account", account)?;

        let removed = self.custom_rates.write().await.remove(&account);
        if removed.is_some() {
            info!(account = %account, "Custom discount removed");
            self.emitter.emit(&DomainEvent::CustomDiscountChanged {
                account,
                rate: None,
            });
        }
        Ok(removed)
    }

    pub async fn custom_discount(&self, account: AccountId) -> Option<DiscountRate> {
        self.custom_rates.read().await.get(&account).copied()
    }

    // =========================================================================
    // Admin: Pause and Roster
    // =========================================================================

    /// Stops new transfers. Returns false when already paused.
    pub async fn pause(&self, caller: AccountId) -> TransferResult<bool> {
        self.access.read().await.require_admin(caller)?;
        let changed = !self.paused.swap(true, Ordering::SeqCst);
        if changed {
            info!(by = %caller, "Transfers paused");
            self.emitter.emit(&DomainEvent::Paused { by: caller });
        }
        Ok(changed)
    }

    /// Resumes transfers. Returns false when not paused.
    pub async fn unpause(&self, caller: AccountId) -> TransferResult<bool> {
        self.access.read().await.require_admin(caller)?;
        let changed = self.paused.swap(false, Ordering::SeqCst);
        if changed {
            info!(by = %caller, "Transfers unpaused");
            self.emitter.emit(&DomainEvent::Unpaused { by: caller });
        }
        Ok(changed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn grant_admin(&self, caller: AccountId, account: AccountId) -> TransferResult<bool> {
        validate_account_id("account", account)?;
        let granted = {
            let mut access = self.access.write().await;
            access.require_owner(caller)?;
            access.grant(account)
        };
        if granted {
            info!(account = %account, "Admin granted");
            self.emitter.emit(&DomainEvent::AdminGranted { account });
        }
        Ok(granted)
    }

    pub async fn revoke_admin(&self, caller: AccountId, account: AccountId) -> TransferResult<bool> {
        let revoked = {
            let mut access = self.access.write().await;
            access.require_owner(caller)?;
            access.revoke(account)
        };
        if revoked {
            info!(account = %account, "Admin revoked");
            self.emitter.emit(&DomainEvent::AdminRevoked { account });
        }
        Ok(revoked)
    }

    pub async fn is_admin(&self, account: AccountId) -> bool {
        self.access.read().await.is_admin(account)
    }

    pub async fn admins(&self) -> Vec<AccountId> {
        self.access.read().await.admins()
    }

    // =========================================================================
    // Ledger Queries
    // =========================================================================

    pub async fn purchase_count(&self, account: AccountId) -> TransferResult<PurchaseCount> {
        Ok(self.ledger.purchase_count(account).await?)
    }

    pub async fn purchase_stats(&self, account: AccountId) -> TransferResult<PurchaseStats> {
        Ok(self.ledger.stats(account).await?)
    }

    pub async fn transfer_record(&self, trace_id: TraceId) -> TransferResult<Option<TransferRecord>> {
        Ok(self.ledger.record(trace_id).await?)
    }

    /// Records `account` took part in (any role), newest first.
    pub async fn transfer_history(
        &self,
        account: AccountId,
        limit: usize,
    ) -> TransferResult<Vec<TransferRecord>> {
        Ok(self.ledger.history(account, limit).await?)
    }

    /// Deletes an audit record. Returns false when none matched.
    pub async fn purge_transfer_record(
        &self,
        caller: AccountId,
        trace_id: TraceId,
    ) -> TransferResult<bool> {
        self.access.read().await.require_admin(caller)?;
        if trace_id.is_zero() {
            return Err(TransferError::InvalidArgument(ValidationError::ZeroIdentifier {
                field: "trace_id".to_string(),
            }));
        }
        let _token = self.enter_guard([GuardKey::Trace(trace_id)])?;

        let purged = self.ledger.purge(trace_id).await?;
        if purged {
            info!(trace_id = %trace_id, "Transfer record purged");
            self.emitter.emit(&DomainEvent::TransferRecordPurged { trace_id });
        }
        Ok(purged)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn enter_guard<I>(&self, keys: I) -> TransferResult<GuardToken>
    where
        I: IntoIterator<Item = GuardKey>,
    {
        self.guard.enter(keys).map_err(|busy| match busy {
            GuardKey::Trace(trace_id) => TransferError::DuplicateTrace(trace_id),
            key @ GuardKey::Account(_) => TransferError::reentrant(key),
        })
    }
}

fn advance(stage: &mut TransferStage, next: TransferStage, trace_id: TraceId) {
    debug!(trace_id = %trace_id, from = %stage, to = %next, "Transfer stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::ledger::InMemoryLedger;
    use crate::settlement::InMemoryTransferService;

    const OWNER: AccountId = AccountId::from_u128(0xA0);

    fn orchestrator() -> TransferOrchestrator<InMemoryLedger> {
        TransferOrchestrator::new(OWNER, DiscountEngine::default(), InMemoryLedger::new())
    }

    async fn initialized() -> TransferOrchestrator<InMemoryLedger> {
        let orchestrator = orchestrator();
        let gateway = Arc::new(InMemoryGateway::new());
        let service = Arc::new(InMemoryTransferService::new(Arc::clone(&gateway)));
        orchestrator
            .initialize(
                OWNER,
                OracleRef::new(AccountId::from_u128(0xB0), gateway),
                ServiceRef::new(AccountId::from_u128(0xC0), service),
            )
            .await
            .unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_initialize_rules() {
        let orchestrator = orchestrator();
        let gateway = Arc::new(InMemoryGateway::new());
        let service = Arc::new(InMemoryTransferService::new(Arc::clone(&gateway)));
        let oracle = OracleRef::new(AccountId::from_u128(0xB0), Arc::clone(&gateway));
        let transfer = ServiceRef::new(AccountId::from_u128(0xC0), Arc::clone(&service));

        let stranger = AccountId::from_u128(5);
        assert!(matches!(
            orchestrator.initialize(stranger, oracle.clone(), transfer.clone()).await,
            Err(TransferError::Unauthorized { .. })
        ));
        assert!(matches!(
            orchestrator
                .initialize(OWNER, OracleRef::new(AccountId::ZERO, Arc::clone(&gateway)), transfer.clone())
                .await,
            Err(TransferError::InvalidArgument(_))
        ));
        assert!(!orchestrator.is_initialized().await);

        orchestrator.initialize(OWNER, oracle.clone(), transfer.clone()).await.unwrap();
        assert!(matches!(
            orchestrator.initialize(OWNER, oracle, transfer).await,
            Err(TransferError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_transfer_requires_initialization() {
        let orchestrator = orchestrator();
        let request = TransferRequest::new(
            AccountId::from_u128(1),
            AccountId::from_u128(2),
            AccountId::from_u128(3),
            Amount::from_units(100),
            "order",
            TraceId::from_u128(1),
        );
        assert!(matches!(
            orchestrator.custom_transfer(&request).await,
            Err(TransferError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_guard_maps_trace_to_duplicate() {
        let orchestrator = initialized().await;
        let trace = TraceId::from_u128(9);
        let _held = orchestrator.enter_guard([GuardKey::Trace(trace)]).unwrap();

        assert!(matches!(
            orchestrator.enter_guard([GuardKey::Trace(trace)]),
            Err(TransferError::DuplicateTrace(t)) if t == trace
        ));
        let account = AccountId::from_u128(1);
        let _account = orchestrator.enter_guard([GuardKey::Account(account)]).unwrap();
        assert!(matches!(
            orchestrator.enter_guard([GuardKey::Account(account)]),
            Err(TransferError::Reentrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_tier_admin_requires_rights() {
        let orchestrator = initialized().await;
        let stranger = AccountId::from_u128(5);
        let tier = DiscountTier::new(50, DiscountRate::from_percent(20));

        assert!(matches!(
            orchestrator.add_tier(stranger, tier).await,
            Err(TransferError::Unauthorized { .. })
        ));
        orchestrator.add_tier(OWNER, tier).await.unwrap();
        assert_eq!(orchestrator.tiers().await.len(), 4);

        // 25% at 20 would exceed the new 20% tier
        assert!(matches!(
            orchestrator
                .update_tier(OWNER, 20, DiscountRate::from_percent(25))
                .await,
            Err(TransferError::TierConfigurationInvalid { .. })
        ));
        assert_eq!(orchestrator.remove_tier(OWNER, 50).await.unwrap(), tier);
        assert!(orchestrator.remove_tier(OWNER, 50).await.is_err());
    }

    #[tokio::test]
    async fn test_discount_batch_checks_shape_first() {
        let orchestrator = orchestrator().with_max_batch_size(2);
        let amounts = [Amount::from_units(1000); 3];

        assert!(matches!(
            orchestrator.discount_batch(&amounts, &[0, 5]).await,
            Err(TransferError::ArrayLengthMismatch { left: 3, right: 2 })
        ));
        assert!(matches!(
            orchestrator.discount_batch(&amounts, &[0, 5, 10]).await,
            Err(TransferError::BatchTooLarge { len: 3, max: 2 })
        ));

        let results = orchestrator
            .discount_batch(&[Amount::from_units(1000), Amount::zero()], &[5, 5])
            .await
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().units(), 950);
        assert!(matches!(results[1], Err(TransferError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let orchestrator = initialized().await;
        assert!(orchestrator.pause(OWNER).await.unwrap());
        assert!(!orchestrator.pause(OWNER).await.unwrap());
        assert!(orchestrator.is_paused());
        assert!(orchestrator.unpause(OWNER).await.unwrap());
        assert!(!orchestrator.unpause(OWNER).await.unwrap());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(TransferStage::CheckingSourceBalance.to_string(), "checking_source_balance");
        assert_eq!(TransferStage::Done.to_string(), "done");
    }
}
