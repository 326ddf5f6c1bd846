//! # Inbound Ports
//!
//! API trait defining what a running group offers to applications and
//! workers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    CollectibleTransferParams, Hash32, MtgError, Output, OutputState, Transaction,
    TransferParams,
};

/// Group API - inbound port.
#[async_trait]
pub trait GroupApi: Send + Sync {
    /// Genesis id of the group.
    fn genesis_id(&self) -> Hash32;

    /// Active members.
    fn members(&self) -> &[Uuid];

    /// Group threshold.
    fn threshold(&self) -> u8;

    /// Whether both drain orderings completed at least once since boot.
    fn synced(&self) -> Result<bool, MtgError>;

    /// Queue a fungible transfer. Idempotent by trace id.
    async fn build_transaction(&self, params: TransferParams) -> Result<Uuid, MtgError>;

    /// Queue a storage payment carrying `data`. Idempotent by content.
    async fn build_storage_transaction(
        &self,
        data: &[u8],
        group_id: &str,
    ) -> Result<Transaction, MtgError>;

    /// Queue a collectible mint. The trace id derives from the NFO bytes.
    async fn build_collectible_mint_transaction(
        &self,
        receivers: &[String],
        threshold: usize,
        nfo: &[u8],
    ) -> Result<Uuid, MtgError>;

    /// Queue a collectible transfer. Idempotent by trace id.
    async fn build_collectible_transfer_transaction(
        &self,
        params: CollectibleTransferParams,
    ) -> Result<Uuid, MtgError>;

    /// Outputs of one group and asset, oldest first.
    fn list_outputs_for_asset(
        &self,
        group_id: &str,
        asset_id: Uuid,
        state: OutputState,
        limit: usize,
    ) -> Result<Vec<Output>, MtgError>;

    /// Outputs assigned to a transaction, oldest first.
    fn list_outputs_for_transaction(&self, trace_id: Uuid) -> Result<Vec<Output>, MtgError>;
}
