//! Worker dispatch for pending actions.

use tracing::debug;

use super::group::Group;
use crate::domain::{ActionState, MtgError, OutputType};

impl Group {
    /// Offer the oldest pending outputs to the workers, then close them.
    ///
    /// The first worker returning `true` claims an output. Unclaimed outputs
    /// are closed too and never offered again.
    pub(super) async fn handle_actions(&self) -> Result<(), MtgError> {
        let pending = self.store.list_actions(self.settings.actions_batch)?;
        for out in pending {
            let mut claimed = false;
            match out.output_type {
                OutputType::Multisig => {
                    if let Some(mut utxo) = out.as_multisig() {
                        self.assign_group_id(&mut utxo);
                        for worker in &self.workers {
                            if worker.process_output(self, &utxo).await {
                                claimed = true;
                                break;
                            }
                        }
                    }
                }
                OutputType::Collectible => {
                    if let Some(cout) = out.as_collectible() {
                        for worker in &self.workers {
                            if worker.process_collectible_output(self, &cout).await {
                                claimed = true;
                                break;
                            }
                        }
                    }
                }
            }
            debug!(output = %out.unique_id(), claimed, "[mtg] action done");
            self.store.write_action(&out, ActionState::Done)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollectibleOutput, Output};
    use crate::ports::inbound::GroupApi;
    use crate::ports::outbound::{OutputsOrder, Worker};
    use crate::service::testing::harness;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Recorder {
        name: &'static str,
        claim: bool,
        log: Arc<Mutex<Vec<(&'static str, Uuid)>>>,
    }

    #[async_trait]
    impl Worker for Recorder {
        async fn process_output(&self, _group: &dyn GroupApi, out: &Output) -> bool {
            self.log.lock().push((self.name, out.utxo_id));
            self.claim
        }

        async fn process_collectible_output(
            &self,
            _group: &dyn GroupApi,
            out: &CollectibleOutput,
        ) -> bool {
            self.log.lock().push((self.name, out.output_id));
            self.claim
        }
    }

    #[tokio::test]
    async fn test_first_claim_stops_delegation() {
        let mut h = harness(1).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, claim) in [("a", false), ("b", true), ("c", true)] {
            h.group.add_worker(Arc::new(Recorder {
                name,
                claim,
                log: log.clone(),
            }));
        }
        let deposit = h.network.deposit(Uuid::new_v4(), "1".parse().unwrap(), "");
        h.group.drain_outputs(OutputsOrder::Created).await.unwrap();
        h.group.handle_actions().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![("a", deposit.utxo_id), ("b", deposit.utxo_id)]
        );
        assert!(h.store.list_actions(0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unclaimed_action_is_not_retried() {
        let mut h = harness(1).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        h.group.add_worker(Arc::new(Recorder {
            name: "a",
            claim: false,
            log: log.clone(),
        }));
        h.network.deposit_collectible(Uuid::new_v4(), "");
        h.group.drain_outputs(OutputsOrder::Created).await.unwrap();
        h.group.handle_actions().await.unwrap();
        h.group.handle_actions().await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_actions_batch_limits_dispatch() {
        let mut h = harness(1).await;
        let log = Arc::new(Mutex::new(Vec::new()));
        h.group.add_worker(Arc::new(Recorder {
            name: "a",
            claim: true,
            log: log.clone(),
        }));
        let asset = Uuid::new_v4();
        for _ in 0..20 {
            h.network.deposit(asset, "1".parse().unwrap(), "");
        }
        h.group.drain_outputs(OutputsOrder::Created).await.unwrap();
        h.group.handle_actions().await.unwrap();
        assert_eq!(log.lock().len(), 16);
        assert_eq!(h.store.list_actions(0).unwrap().len(), 4);
    }
}
