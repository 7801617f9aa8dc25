use crate::amount::{is_positive, scale_amount};
use crate::chain::{ChainClient, call_contract};
use crate::classifier::TokenMetadata;
use crate::error::IngestError;
use crate::events::balanceOfCall;
use crate::locks::TokenLocks;
use crate::repository::{TokenRecord, TokenRepository};
use crate::store::Store;
use alloy_primitives::Address;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub token: Address,
    pub from_balance: String,
    pub to_balance: String,
    pub holders_count: u64,
}

/// Re-reads both sides of a Transfer from the token contract and rewrites
/// the token's balance map and record from that state.
pub struct BalanceReconciler<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    locks: TokenLocks,
}

impl<C: ChainClient, S: Store> BalanceReconciler<C, S> {
    pub fn new(client: Arc<C>, store: Arc<S>, locks: TokenLocks) -> Self {
        Self {
            client,
            store,
            locks,
        }
    }

    pub async fn reconcile(
        &self,
        token: &TokenMetadata,
        from: Address,
        to: Address,
    ) -> Result<ReconciliationResult, IngestError> {
        let _guard = self.locks.lock(token.address).await;

        let from_balance = self.balance_of(token, from).await?;
        let to_balance = self.balance_of(token, to).await?;

        let repo = TokenRepository::new(self.store.as_ref());
        repo.upsert_balance(&token.address, &from, &from_balance)
            .await
            .map_err(IngestError::store)?;
        repo.upsert_balance(&token.address, &to, &to_balance)
            .await
            .map_err(IngestError::store)?;

        let holders_count = repo
            .balances(&token.address)
            .await
            .map_err(IngestError::store)?
            .values()
            .filter(|balance| is_positive(balance))
            .count() as u64;

        let record = TokenRecord {
            address: token.address,
            name: token.name.clone(),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
            total_supply: token.scaled_total_supply()?,
            holders_count,
        };
        repo.put_token(&record).await.map_err(IngestError::store)?;

        debug!(
            "Reconciled {:?}: {:?}={} {:?}={} holders={}",
            token.address, from, from_balance, to, to_balance, holders_count
        );

        Ok(ReconciliationResult {
            token: token.address,
            from_balance,
            to_balance,
            holders_count,
        })
    }

    async fn balance_of(
        &self,
        token: &TokenMetadata,
        holder: Address,
    ) -> Result<String, IngestError> {
        let raw = call_contract(
            self.client.as_ref(),
            token.address,
            balanceOfCall { owner: holder },
        )
        .await?;
        scale_amount(raw, token.decimals).map_err(IngestError::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::store::MemoryStore;
    use crate::testing::{MockChain, MockToken, units};
    use alloy_primitives::U256;

    fn metadata(address: Address) -> TokenMetadata {
        TokenMetadata {
            address,
            name: "Sample".to_string(),
            symbol: "SMP".to_string(),
            decimals: 18,
            total_supply: units(15, 18),
        }
    }

    type Setup = (
        Arc<MockChain>,
        Arc<MemoryStore>,
        BalanceReconciler<MockChain, MemoryStore>,
    );

    fn setup(token: Address) -> Setup {
        let chain = Arc::new(MockChain::new());
        chain.deploy_token(token, MockToken::new("Sample", "SMP", 18, units(15, 18)));
        let store = Arc::new(MemoryStore::new());
        let reconciler =
            BalanceReconciler::new(Arc::clone(&chain), Arc::clone(&store), TokenLocks::new());
        (chain, store, reconciler)
    }

    #[tokio::test]
    async fn overwrites_prior_balances_with_chain_state() {
        let token = Address::repeat_byte(0x70);
        let (alice, bob) = (Address::repeat_byte(0xa1), Address::repeat_byte(0xb2));
        let (chain, store, reconciler) = setup(token);
        chain.set_balance(token, alice, units(5, 18));
        chain.set_balance(token, bob, units(10, 18));

        let repo = TokenRepository::new(store.as_ref());
        repo.upsert_balance(&token, &alice, "99.0").await.unwrap();
        repo.upsert_balance(&token, &bob, "1.0").await.unwrap();

        let result = reconciler.reconcile(&metadata(token), alice, bob).await.unwrap();

        assert_eq!(result.from_balance, "5.0");
        assert_eq!(result.to_balance, "10.0");
        assert_eq!(repo.balance_of(&token, &alice).await.unwrap().as_deref(), Some("5.0"));
        assert_eq!(repo.balance_of(&token, &bob).await.unwrap().as_deref(), Some("10.0"));
    }

    #[tokio::test]
    async fn holder_count_tracks_positive_balances() {
        let token = Address::repeat_byte(0x71);
        let (alice, bob, carol) = (
            Address::repeat_byte(0xa1),
            Address::repeat_byte(0xb2),
            Address::repeat_byte(0xc3),
        );
        let (chain, store, reconciler) = setup(token);
        chain.set_balance(token, alice, units(10, 18));
        reconciler.reconcile(&metadata(token), Address::ZERO, alice).await.unwrap();

        chain.set_balance(token, alice, U256::ZERO);
        chain.set_balance(token, bob, units(10, 18));
        let result = reconciler.reconcile(&metadata(token), alice, bob).await.unwrap();
        assert_eq!(result.holders_count, 1);

        chain.set_balance(token, bob, units(4, 18));
        chain.set_balance(token, carol, units(6, 18));
        let result = reconciler.reconcile(&metadata(token), bob, carol).await.unwrap();
        assert_eq!(result.holders_count, 2);

        let repo = TokenRepository::new(store.as_ref());
        let record = repo.get_token(&token).await.unwrap().unwrap();
        let positive = repo
            .balances(&token)
            .await
            .unwrap()
            .values()
            .filter(|b| is_positive(b))
            .count() as u64;
        assert_eq!(record.holders_count, positive);
        assert_eq!(record.total_supply, "15.0");
    }

    #[tokio::test]
    async fn failed_balance_call_leaves_store_untouched() {
        let token = Address::repeat_byte(0x72);
        let (chain, store, reconciler) = setup(token);
        chain.fail_calls_to(token);

        let err = reconciler
            .reconcile(&metadata(token), Address::repeat_byte(1), Address::repeat_byte(2))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Chain);
        assert!(TokenRepository::new(store.as_ref()).get_token(&token).await.unwrap().is_none());
    }
}
