//! # Group Orchestrator
//!
//! One sequential loop per member. Each tick runs the phases in a fixed
//! order:
//!
//! ```text
//! drain(created) → drain(updated) → boot-synced → actions
//!     → sign fungible → publish fungible → sign collectible → publish collectible
//! ```
//!
//! A failed drain pauses and ends the tick. Any other failing phase is
//! logged and the tick goes on. Only a consistency violation stops the
//! loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::ExtraPack;
use crate::config::{EngineSettings, GroupConfig};
use crate::domain::{
    active_nodes, genesis_id, hash_members, ActiveNodes, CollectibleTransferParams, Hash32,
    Iteration, IterationAction, MtgError, Output, OutputState, Transaction, TransferParams,
};
use crate::ports::inbound::GroupApi;
use crate::ports::outbound::{CustodialNetwork, OutputsOrder, Store, TimeSource, Worker};
use crate::service::clock::Clock;

/// Property holding the genesis id, immutable once written.
pub const GENESIS_ID_KEY: &str = "group-genesis-id";

/// Property set to `[1]` once both orderings drained since boot.
pub const BOOT_SYNCED_KEY: &str = "group-boot-synced";

/// Assigns a group id to outputs whose memo carries none.
pub type OutputGrouper = Arc<dyn Fn(&Output) -> String + Send + Sync>;

/// A running MTG member.
pub struct Group {
    pub(super) store: Arc<dyn Store>,
    pub(super) network: Arc<dyn CustodialNetwork>,
    pub(super) workers: Vec<Arc<dyn Worker>>,
    pub(super) grouper: Option<OutputGrouper>,
    pub(super) clock: Clock,
    pub(super) genesis_id: Hash32,
    pub(super) members: Vec<Uuid>,
    pub(super) threshold: u8,
    pub(super) epoch: DateTime<Utc>,
    pub(super) pin: String,
    pub(super) group_size: usize,
    pub(super) loop_wait: Duration,
    pub(super) settings: EngineSettings,
    pub(super) filter: Mutex<LruCache<String, ()>>,
}

impl Group {
    /// Boot a member.
    ///
    /// Verifies the PIN, pins the genesis id, resets the boot-synced flag
    /// and replays the genesis membership into the iteration log.
    ///
    /// # Errors
    ///
    /// - `Config` when the genesis descriptor is invalid
    /// - `Consistency` when the stored genesis id differs
    /// - `Network` when the PIN is rejected
    pub async fn build(
        config: &GroupConfig,
        store: Arc<dyn Store>,
        network: Arc<dyn CustodialNetwork>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, MtgError> {
        config.validate()?;
        network.verify_pin(&config.app.pin).await?;

        let threshold = config.genesis.threshold as u8;
        let id = genesis_id(&config.genesis.members, threshold, config.genesis.timestamp);
        let clock = Clock::new(store.clone(), time)?;

        if let Some(old) = store.read_property(GENESIS_ID_KEY)? {
            if !old.is_empty() && old != id.to_hex().as_bytes() {
                return Err(MtgError::Consistency(format!(
                    "malformed group genesis id {} {}",
                    String::from_utf8_lossy(&old),
                    id
                )));
            }
        }
        store.write_property(GENESIS_ID_KEY, id.to_hex().as_bytes())?;
        store.write_property(BOOT_SYNCED_KEY, &[0])?;

        let genesis_time = config.genesis_time();
        for member in &config.genesis.members {
            store.write_iteration(&Iteration {
                action: IterationAction::Add,
                node_id: *member,
                threshold,
                created_at: genesis_time,
            })?;
        }
        let nodes = active_nodes(&store.list_iterations()?)
            .ok_or_else(|| MtgError::Consistency("empty group membership".to_string()))?;

        let capacity =
            NonZeroUsize::new(config.engine.dedup_capacity).unwrap_or(NonZeroUsize::MIN);
        info!(
            genesis = %id,
            members = nodes.members.len(),
            threshold = nodes.threshold,
            "[mtg] group built"
        );
        Ok(Self {
            store,
            network,
            workers: Vec::new(),
            grouper: None,
            clock,
            genesis_id: id,
            members: nodes.members,
            threshold: nodes.threshold,
            epoch: nodes.epoch,
            pin: config.app.pin.clone(),
            group_size: config.group_size(),
            loop_wait: config.loop_wait(),
            settings: config.engine.clone(),
            filter: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Register a worker. Workers are offered outputs in registration order.
    pub fn add_worker(&mut self, worker: Arc<dyn Worker>) {
        self.workers.push(worker);
    }

    /// Install the output grouper.
    pub fn set_output_grouper(&mut self, grouper: OutputGrouper) {
        self.grouper = Some(grouper);
    }

    /// Outputs updated before this time are ignored.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Append an Add iteration.
    pub fn add_node(&self, id: Uuid, threshold: u8, at: DateTime<Utc>) -> Result<(), MtgError> {
        self.write_iteration(IterationAction::Add, id, threshold, at)
    }

    /// Append a Remove iteration.
    pub fn remove_node(&self, id: Uuid, threshold: u8, at: DateTime<Utc>) -> Result<(), MtgError> {
        self.write_iteration(IterationAction::Remove, id, threshold, at)
    }

    fn write_iteration(
        &self,
        action: IterationAction,
        node_id: Uuid,
        threshold: u8,
        created_at: DateTime<Utc>,
    ) -> Result<(), MtgError> {
        self.store.write_iteration(&Iteration {
            action,
            node_id,
            threshold,
            created_at,
        })?;
        Ok(())
    }

    /// Membership folded from the iteration log.
    pub fn list_active_nodes(&self) -> Result<Option<ActiveNodes>, MtgError> {
        Ok(active_nodes(&self.store.list_iterations()?))
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// Returns an error only for a consistency violation; the host process
    /// must then exit.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MtgError> {
        info!(
            members = %hash_members(&self.members),
            threshold = self.threshold,
            genesis = %self.genesis_id,
            "[mtg] group running"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await?;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.loop_wait) => {}
            }
        }
        info!("[mtg] group stopped");
        Ok(())
    }

    /// One pass over every phase.
    pub async fn tick(&self) -> Result<(), MtgError> {
        for order in [OutputsOrder::Created, OutputsOrder::Updated] {
            if let Err(e) = self.drain_outputs(order).await {
                if e.is_fatal() {
                    error!(order = order.as_str(), "[mtg] drain failed: {}", e);
                    return Err(e);
                }
                warn!(order = order.as_str(), "[mtg] drain failed: {}", e);
                tokio::time::sleep(self.settings.drain_retry_delay()).await;
                return Ok(());
            }
        }
        if let Err(e) = self.store.write_property(BOOT_SYNCED_KEY, &[1]) {
            warn!("[mtg] boot synced flag not written: {}", e);
        }

        self.phase("actions", self.handle_actions().await)?;
        self.phase("sign", self.sign_transactions().await)?;
        self.phase("publish", self.publish_transactions().await)?;
        self.phase("sign collectible", self.sign_collectible_transactions().await)?;
        self.phase(
            "publish collectible",
            self.publish_collectible_transactions().await,
        )?;
        Ok(())
    }

    fn phase(&self, name: &'static str, result: Result<(), MtgError>) -> Result<(), MtgError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!(phase = name, "[mtg] fatal: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!(phase = name, "[mtg] phase failed: {}", e);
                Ok(())
            }
        }
    }

    /// Group id from the memo pack, else from the grouper.
    pub(super) fn assign_group_id(&self, out: &mut Output) {
        match ExtraPack::decode(&out.memo) {
            Ok(pack) if !pack.group_id.is_empty() => out.group_id = pack.group_id,
            _ => {
                if let Some(grouper) = &self.grouper {
                    out.group_id = grouper(out);
                }
            }
        }
    }

    /// Whether `key` was already processed this run.
    pub(super) fn seen(&self, key: &str) -> bool {
        self.filter.lock().contains(key)
    }

    pub(super) fn remember(&self, key: String) {
        debug!(key = %key, "[mtg] processed");
        self.filter.lock().put(key, ());
    }
}

#[async_trait]
impl GroupApi for Group {
    fn genesis_id(&self) -> Hash32 {
        self.genesis_id
    }

    fn members(&self) -> &[Uuid] {
        &self.members
    }

    fn threshold(&self) -> u8 {
        self.threshold
    }

    fn synced(&self) -> Result<bool, MtgError> {
        Ok(self.store.read_property(BOOT_SYNCED_KEY)?.as_deref() == Some(&[1u8][..]))
    }

    async fn build_transaction(&self, params: TransferParams) -> Result<Uuid, MtgError> {
        self.build_transfer(params).await
    }

    async fn build_storage_transaction(
        &self,
        data: &[u8],
        group_id: &str,
    ) -> Result<Transaction, MtgError> {
        self.build_storage(data, group_id).await
    }

    async fn build_collectible_mint_transaction(
        &self,
        receivers: &[String],
        threshold: usize,
        nfo: &[u8],
    ) -> Result<Uuid, MtgError> {
        self.build_collectible_mint(receivers, threshold, nfo).await
    }

    async fn build_collectible_transfer_transaction(
        &self,
        params: CollectibleTransferParams,
    ) -> Result<Uuid, MtgError> {
        self.build_collectible_transfer(params).await
    }

    fn list_outputs_for_asset(
        &self,
        group_id: &str,
        asset_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<Output>, MtgError> {
        Ok(self
            .store
            .list_outputs_for_asset(group_id, asset_id, state, limit)?)
    }

    fn list_outputs_for_transaction(&self, trace_id: Uuid) -> Result<Vec<Output>, MtgError> {
        Ok(self.store.list_outputs_for_transaction(trace_id)?)
    }
}
